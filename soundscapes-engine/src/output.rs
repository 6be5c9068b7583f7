//! Where rendered audio goes.
//!
//! An [`Output`] is asked twice when the engine creates its context: first
//! for the stream format, then to take ownership of the [`Renderer`]. A
//! real-time output moves the renderer into its audio callback; the
//! [`PullOutput`] parks it behind a mutex so a host (tests, FFI) can render
//! on demand.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::EngineError;
use crate::graph::Renderer;

/// Negotiated stream format.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

pub trait Output: Send {
    /// Open whatever the output needs and report the stream format.
    fn prepare(&mut self) -> Result<StreamSpec, EngineError>;

    /// Take the renderer and start pulling audio from it.
    fn attach(&mut self, renderer: Renderer) -> Result<(), EngineError>;

    /// Stop pulling and drop the renderer.
    fn detach(&mut self) {}
}

impl<O: Output + ?Sized> Output for Box<O> {
    fn prepare(&mut self) -> Result<StreamSpec, EngineError> {
        (**self).prepare()
    }

    fn attach(&mut self, renderer: Renderer) -> Result<(), EngineError> {
        (**self).attach(renderer)
    }

    fn detach(&mut self) {
        (**self).detach()
    }
}

type Slot = Arc<Mutex<Option<Renderer>>>;

/// Host-driven output. Nothing renders until someone calls
/// [`PullHandle::render`].
#[derive(Debug)]
pub struct PullOutput {
    spec: StreamSpec,
    slot: Slot,
}

impl PullOutput {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            spec: StreamSpec { sample_rate, channels },
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// A handle for the rendering side. Any number may exist.
    pub fn handle(&self) -> PullHandle {
        PullHandle { spec: self.spec, slot: self.slot.clone() }
    }
}

impl Output for PullOutput {
    fn prepare(&mut self) -> Result<StreamSpec, EngineError> {
        if self.spec.sample_rate == 0 || self.spec.channels == 0 {
            return Err(EngineError::unavailable(format!(
                "unusable stream format {} Hz x {} ch",
                self.spec.sample_rate, self.spec.channels
            )));
        }
        Ok(self.spec)
    }

    fn attach(&mut self, renderer: Renderer) -> Result<(), EngineError> {
        *self.slot.lock() = Some(renderer);
        Ok(())
    }

    fn detach(&mut self) {
        self.slot.lock().take();
    }
}

#[derive(Clone, Debug)]
pub struct PullHandle {
    spec: StreamSpec,
    slot: Slot,
}

impl PullHandle {
    #[inline] pub fn spec(&self) -> StreamSpec { self.spec }

    pub fn is_attached(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Fill `out` with interleaved frames. Writes silence and returns 0 when
    /// no context is attached; otherwise returns the frames rendered.
    pub fn render(&self, out: &mut [f32]) -> usize {
        let channels = usize::from(self.spec.channels.max(1));
        match self.slot.lock().as_mut() {
            Some(r) => {
                r.render(out, channels);
                out.len() / channels
            }
            None => {
                out.fill(0.0);
                0
            }
        }
    }

    /// Render `frames` frames into a fresh buffer.
    pub fn render_frames(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * usize::from(self.spec.channels.max(1))];
        self.render(&mut out);
        out
    }

    /// Render `seconds` of audio and throw it away; advances the clock.
    pub fn advance(&self, seconds: f64) -> usize {
        let frames = (seconds * f64::from(self.spec.sample_rate)).round() as usize;
        let mut scratch = vec![0.0; 1024 * usize::from(self.spec.channels.max(1))];
        let mut left = frames;
        while left > 0 {
            let n = left.min(1024);
            let len = n * usize::from(self.spec.channels.max(1));
            if self.render(&mut scratch[..len]) == 0 {
                break;
            }
            left -= n;
        }
        frames - left
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unattached_handle_renders_silence() {
        let out = PullOutput::new(8_000, 2);
        let h = out.handle();
        assert!(!h.is_attached());
        let mut buf = vec![1.0; 64];
        assert_eq!(h.render(&mut buf), 0);
        assert!(buf.iter().all(|s| *s == 0.0));
        assert_eq!(h.advance(1.0), 0);
    }

    #[test]
    fn zero_rate_is_unavailable() {
        let mut out = PullOutput::new(0, 2);
        assert!(matches!(out.prepare(), Err(EngineError::ContextUnavailable { .. })));
    }
}
