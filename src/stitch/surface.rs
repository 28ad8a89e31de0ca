//! Fixed-size RGBA drawing surface the pipeline composes frames onto.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba};

use super::player::VideoFrame;
use super::CanvasSize;

const BLACK: [u8; 4] = [0, 0, 0, 255];

/// Opaque RGBA canvas. Its size is fixed for the lifetime of a stitch.
pub struct Surface {
    canvas: CanvasSize,
    pixels: Vec<u8>,
}

impl Surface {
    pub fn new(canvas: CanvasSize) -> Self {
        let mut surface = Self {
            canvas,
            pixels: vec![0; canvas.frame_bytes()],
        };
        surface.clear();
        surface
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    /// Raw RGBA bytes, row-major, `width * height * 4` long.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn clear(&mut self) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&BLACK);
        }
    }

    /// Stretch `frame` over the whole canvas.
    ///
    /// Returns `false` (leaving the surface untouched) if the frame's buffer
    /// does not match its declared size.
    pub fn draw_scaled(&mut self, frame: &VideoFrame) -> bool {
        if frame.width == self.canvas.width && frame.height == self.canvas.height {
            if frame.data.len() != self.pixels.len() {
                return false;
            }
            self.pixels.copy_from_slice(&frame.data);
            return true;
        }

        let Some(source) = ImageBuffer::<Rgba<u8>, &[u8]>::from_raw(
            frame.width,
            frame.height,
            frame.data.as_slice(),
        ) else {
            return false;
        };

        let scaled = imageops::resize(
            &source,
            self.canvas.width,
            self.canvas.height,
            FilterType::Triangle,
        );
        self.pixels.copy_from_slice(scaled.as_raw());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> VideoFrame {
        VideoFrame {
            width,
            height,
            data: rgba.repeat((width * height) as usize),
        }
    }

    #[test]
    fn test_new_surface_is_opaque_black() {
        let surface = Surface::new(CanvasSize::new(4, 2));
        assert_eq!(surface.pixels().len(), 32);
        assert!(surface.pixels().chunks(4).all(|px| px == BLACK));
    }

    #[test]
    fn test_draw_scaled_fills_canvas() {
        let mut surface = Surface::new(CanvasSize::new(8, 4));
        assert!(surface.draw_scaled(&solid(2, 2, [200, 10, 10, 255])));
        assert_eq!(surface.canvas(), CanvasSize::new(8, 4));
        assert!(surface
            .pixels()
            .chunks(4)
            .all(|px| px == [200, 10, 10, 255]));
    }

    #[test]
    fn test_draw_scaled_same_size_copies() {
        let mut surface = Surface::new(CanvasSize::new(2, 2));
        let frame = solid(2, 2, [1, 2, 3, 255]);
        assert!(surface.draw_scaled(&frame));
        assert_eq!(surface.pixels(), frame.data.as_slice());
    }

    #[test]
    fn test_draw_scaled_rejects_short_buffer() {
        let mut surface = Surface::new(CanvasSize::new(2, 2));
        let frame = VideoFrame {
            width: 3,
            height: 3,
            data: vec![255; 8],
        };
        assert!(!surface.draw_scaled(&frame));
        assert!(surface.pixels().chunks(4).all(|px| px == BLACK));
    }
}
