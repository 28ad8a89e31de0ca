//! Audio routing: player taps feeding a single mixing destination.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// A player's audio output node.
///
/// Holds interleaved f32 samples waiting to be mixed. Clones share the same
/// buffer, so the player can swap in a new clip's audio while the tap stays
/// connected to the graph.
#[derive(Debug, Clone, Default)]
pub struct AudioTap {
    buffer: Arc<Mutex<VecDeque<f32>>>,
}

impl AudioTap {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<f32>> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the pending samples with a new clip's audio.
    pub fn replace(&self, samples: Vec<f32>) {
        *self.lock() = VecDeque::from(samples);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Same underlying node.
    pub fn ptr_eq(&self, other: &AudioTap) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    /// Add up to `out.len()` pending samples into `out`.
    fn mix_into(&self, out: &mut [f32]) {
        let mut buffer = self.lock();
        let n = out.len().min(buffer.len());
        for (dst, src) in out.iter_mut().zip(buffer.drain(..n)) {
            *dst += src;
        }
    }
}

/// Single-destination mixer producing fixed-format interleaved audio.
#[derive(Debug)]
pub struct MixingGraph {
    sample_rate: u32,
    channels: u16,
    inputs: Vec<AudioTap>,
    closed: bool,
}

impl MixingGraph {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            inputs: Vec::new(),
            closed: false,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Connect a tap. Connecting the same node twice is a no-op that
    /// returns `false`.
    pub fn connect(&mut self, tap: &AudioTap) -> bool {
        if self.inputs.iter().any(|t| t.ptr_eq(tap)) {
            return false;
        }
        self.inputs.push(tap.clone());
        true
    }

    /// Render `frames` sample frames. Inputs that run dry contribute
    /// silence; the sum is clamped to [-1, 1]. A closed graph renders
    /// nothing.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        if self.closed {
            return Vec::new();
        }
        let mut out = vec![0.0f32; frames * self.channels as usize];
        for input in &self.inputs {
            input.mix_into(&mut out);
        }
        for sample in &mut out {
            *sample = sample.clamp(-1.0, 1.0);
        }
        out
    }

    /// Disconnect all inputs. Idempotent.
    pub fn close(&mut self) {
        if !self.closed {
            self.inputs.clear();
            self.closed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_is_once_per_tap() {
        let mut graph = MixingGraph::new(48_000, 2);
        let tap = AudioTap::new();
        assert!(graph.connect(&tap));
        assert!(!graph.connect(&tap.clone()));
        assert_eq!(graph.input_count(), 1);
    }

    #[test]
    fn test_render_pads_with_silence() {
        let mut graph = MixingGraph::new(48_000, 2);
        let tap = AudioTap::new();
        graph.connect(&tap);
        tap.replace(vec![0.5, -0.5]);

        let out = graph.render(2);
        assert_eq!(out, vec![0.5, -0.5, 0.0, 0.0]);
        assert!(tap.is_empty());
    }

    #[test]
    fn test_render_sums_and_clamps() {
        let mut graph = MixingGraph::new(48_000, 1);
        let a = AudioTap::new();
        let b = AudioTap::new();
        graph.connect(&a);
        graph.connect(&b);
        a.replace(vec![0.8, 0.1]);
        b.replace(vec![0.8, 0.1]);

        let out = graph.render(2);
        assert_eq!(out[0], 1.0);
        assert!((out[1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_replace_swaps_contents_while_connected() {
        let mut graph = MixingGraph::new(48_000, 1);
        let tap = AudioTap::new();
        graph.connect(&tap);
        tap.replace(vec![0.1; 10]);
        tap.replace(vec![0.3]);
        assert_eq!(graph.render(1), vec![0.3]);
    }

    #[test]
    fn test_closed_graph_renders_nothing() {
        let mut graph = MixingGraph::new(48_000, 2);
        graph.connect(&AudioTap::new());
        graph.close();
        graph.close();
        assert!(graph.is_closed());
        assert_eq!(graph.input_count(), 0);
        assert!(graph.render(10).is_empty());
    }
}
