//! Render-side signal graph.
//!
//! The [`Renderer`] lives on the audio thread. It owns the master gain, every
//! active [`LayerVoice`], and the consumer end of a lock-free command queue.
//! The control path never touches the graph directly: it pushes [`Command`]s
//! (new voices, parameter events, burst triggers) and flips layer
//! cancellation tokens.
//!
//! Per block:
//! 1. drain all pending commands
//! 2. hand voices whose layer token was cancelled back to the control thread
//! 3. render each voice into scratch and sum into the bus
//! 4. apply the master gain, clamp, publish telemetry
//!
//! Context time is `frames_rendered / sample_rate`. Nothing here logs, locks
//! or frees: released voices travel back through a return queue and are
//! dropped by the engine on its next call.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer};
use soundscapes_core::dsp::{clamp, mix_in_place};
use soundscapes_core::param::ParamEvent;

use crate::layer::{LayerId, LayerVoice};
use crate::nodes::{AutoParam, BurstShape};

/// Anything that can generate one sample at a time.
pub trait Generator: Send {
    /// Generate the next mono sample. `now` is the context time in seconds of
    /// the sample being produced.
    fn next(&mut self, now: f64) -> f32;
}

/// Voices the renderer holds at once; further layers are turned away.
pub const MAX_VOICES: usize = 32;

/// Which automated gain inside a layer a command addresses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParamTarget {
    /// The per-layer output gain feeding the master bus.
    Output,
    /// The inner gain stage (swell/LFO target) of a noise texture.
    Stage,
}

/// Control → render messages.
pub enum Command {
    AddLayer(Box<LayerVoice>),
    Automate { layer: LayerId, target: ParamTarget, event: ParamEvent },
    Cancel { layer: LayerId, target: ParamTarget, from: f64 },
    Trigger { layer: LayerId, shape: BurstShape },
    Master(ParamEvent),
    MasterCancel(f64),
}

impl core::fmt::Debug for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Command::AddLayer(v) => f.debug_tuple("AddLayer").field(&v.id()).finish(),
            Command::Automate { layer, target, event } => f
                .debug_struct("Automate")
                .field("layer", layer)
                .field("target", target)
                .field("event", event)
                .finish(),
            Command::Cancel { layer, target, from } => f
                .debug_struct("Cancel")
                .field("layer", layer)
                .field("target", target)
                .field("from", from)
                .finish(),
            Command::Trigger { layer, shape } => {
                f.debug_struct("Trigger").field("layer", layer).field("shape", shape).finish()
            }
            Command::Master(e) => f.debug_tuple("Master").field(e).finish(),
            Command::MasterCancel(t) => f.debug_tuple("MasterCancel").field(t).finish(),
        }
    }
}

/// Counters published by the render thread once per block.
#[derive(Debug, Default)]
pub struct Telemetry {
    frames: AtomicU64,
    master_bits: AtomicU32,
    peak_bits: AtomicU32,
    voices: AtomicUsize,
    rejected: AtomicUsize,
}

impl Telemetry {
    /// Frames rendered since the context was created.
    #[inline] pub fn frames(&self) -> u64 { self.frames.load(Ordering::Acquire) }

    /// Master gain as evaluated at the end of the last block.
    #[inline] pub fn master_level(&self) -> f32 { f32::from_bits(self.master_bits.load(Ordering::Relaxed)) }

    /// Voices alive after the last block.
    #[inline] pub fn voices(&self) -> usize { self.voices.load(Ordering::Relaxed) }

    /// Parameter events dropped because an automation queue was full, plus
    /// layers turned away because the voice table was full.
    #[inline] pub fn rejected_events(&self) -> usize { self.rejected.load(Ordering::Relaxed) }

    /// Absolute output peak since the previous call; resets the meter.
    #[inline] pub fn take_peak(&self) -> f32 { f32::from_bits(self.peak_bits.swap(0, Ordering::Relaxed)) }

    fn publish(&self, frames: u64, master: f32, peak: f32, voices: usize) {
        self.master_bits.store(master.to_bits(), Ordering::Relaxed);
        self.voices.store(voices, Ordering::Relaxed);
        // fetch_max on the bit pattern is valid for non-negative floats
        self.peak_bits.fetch_max(peak.to_bits(), Ordering::Relaxed);
        self.frames.store(frames, Ordering::Release);
    }
}

/// The audio-thread half of the engine.
pub struct Renderer {
    sr: f32,
    frame: u64,
    commands: Consumer<Command>,
    retired: Producer<Box<LayerVoice>>,
    master: AutoParam,
    voices: Vec<Box<LayerVoice>>,
    bus: Vec<f32>,
    scratch: Vec<f32>,
    telemetry: Arc<Telemetry>,
}

impl core::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Renderer")
            .field("sr", &self.sr)
            .field("frame", &self.frame)
            .field("voices", &self.voices.len())
            .finish()
    }
}

impl Renderer {
    pub(crate) fn new(
        sr: f32,
        master: f32,
        max_block: usize,
        commands: Consumer<Command>,
        retired: Producer<Box<LayerVoice>>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        let max_block = max_block.max(1);
        telemetry.publish(0, master, 0.0, 0);
        Self {
            sr: sr.max(1.0),
            frame: 0,
            commands,
            retired,
            master: AutoParam::new(master),
            voices: Vec::with_capacity(MAX_VOICES),
            bus: vec![0.0; max_block],
            scratch: vec![0.0; max_block],
            telemetry,
        }
    }

    #[inline] pub fn sample_rate(&self) -> f32 { self.sr }
    #[inline] pub fn voices(&self) -> usize { self.voices.len() }

    /// Context time of the next sample to be rendered.
    #[inline]
    pub fn now(&self) -> f64 {
        self.frame as f64 / f64::from(self.sr)
    }

    /// Render `out.len() / channels` frames of interleaved audio. The graph is
    /// mono; each frame is copied to every channel.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let max_block = self.bus.len();
        for chunk in out.chunks_mut(max_block * channels) {
            let frames = chunk.len() / channels;
            self.render_block(frames);
            for (frame, &s) in chunk.chunks_mut(channels).zip(&self.bus[..frames]) {
                frame.fill(s);
            }
            // a trailing partial frame (malformed buffer) stays silent
            let tail = frames * channels;
            chunk[tail..].fill(0.0);
        }
    }

    fn drain(&mut self) {
        let now = self.now();
        while let Ok(cmd) = self.commands.pop() {
            match cmd {
                Command::AddLayer(voice) => {
                    if voice.is_released() {
                        self.retire(voice);
                    } else if self.voices.len() < MAX_VOICES {
                        self.voices.push(voice);
                    } else {
                        self.telemetry.rejected.fetch_add(1, Ordering::Relaxed);
                        voice.release();
                        self.retire(voice);
                    }
                }
                Command::Automate { layer, target, event } => {
                    if let Some(v) = self.voice_mut(layer) {
                        if v.automate(target, event).is_err() {
                            self.telemetry.rejected.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                Command::Cancel { layer, target, from } => {
                    if let Some(v) = self.voice_mut(layer) {
                        v.cancel(target, from);
                    }
                }
                Command::Trigger { layer, shape } => {
                    if let Some(v) = self.voice_mut(layer) {
                        v.trigger(&shape, now);
                    }
                }
                Command::Master(event) => {
                    if self.master.schedule(event).is_err() {
                        self.telemetry.rejected.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Command::MasterCancel(from) => self.master.cancel(from),
            }
        }
    }

    /// Send a voice back for the control thread to free. The return queue
    /// holds every voice that can be in flight, so this only drops in place
    /// when the engine stopped draining it.
    fn retire(&mut self, voice: Box<LayerVoice>) {
        let _ = self.retired.push(voice);
    }

    fn retire_released(&mut self) {
        let mut i = 0;
        while i < self.voices.len() {
            if self.voices[i].is_released() && !self.retired.is_full() {
                let voice = self.voices.remove(i);
                self.retire(voice);
            } else {
                i += 1;
            }
        }
    }

    #[inline]
    fn voice_mut(&mut self, id: LayerId) -> Option<&mut LayerVoice> {
        self.voices.iter_mut().find(|v| v.id() == id).map(|v| &mut **v)
    }

    fn render_block(&mut self, frames: usize) {
        self.drain();
        self.retire_released();

        let t0 = self.now();
        let dt = 1.0 / f64::from(self.sr);
        let bus = &mut self.bus[..frames];
        bus.fill(0.0);

        let mut live = 0;
        for voice in self.voices.iter_mut().filter(|v| !v.is_released()) {
            live += 1;
            let scratch = &mut self.scratch[..frames];
            voice.render(scratch, t0, dt);
            mix_in_place(bus, scratch, 1.0);
        }

        let mut peak = 0.0_f32;
        for (i, s) in bus.iter_mut().enumerate() {
            let g = self.master.tick(t0 + i as f64 * dt);
            *s = clamp(*s * g, -1.0, 1.0);
            peak = peak.max(s.abs());
        }

        self.frame += frames as u64;
        self.telemetry.publish(self.frame, self.master.value(), peak, live);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{CancelToken, LayerVoice, Voice};
    use crate::nodes::{GainStage, NoiseLoop};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rtrb::RingBuffer;

    const SR: f32 = 8_000.0;

    fn rig() -> (Renderer, rtrb::Producer<Command>, Arc<Telemetry>) {
        let (r, tx, _back, telemetry) = rig_with_returns(64);
        (r, tx, telemetry)
    }

    fn rig_with_returns(
        returns: usize,
    ) -> (Renderer, rtrb::Producer<Command>, Consumer<Box<LayerVoice>>, Arc<Telemetry>) {
        let (tx, rx) = RingBuffer::new(64);
        let (back_tx, back_rx) = RingBuffer::new(returns);
        let telemetry = Arc::new(Telemetry::default());
        (Renderer::new(SR, 0.8, 256, rx, back_tx, telemetry.clone()), tx, back_rx, telemetry)
    }

    fn noise_voice(id: u32, token: &CancelToken) -> Box<LayerVoice> {
        let mut rng = StdRng::seed_from_u64(u64::from(id));
        let voice = Voice::texture(NoiseLoop::new(SR, &mut rng), Vec::new(), Some(GainStage::fixed(1.0, SR)));
        Box::new(LayerVoice::new(LayerId(id), token.clone(), 0.5, voice))
    }

    #[test]
    fn silent_without_voices() {
        let (mut r, _tx, t) = rig();
        let mut out = vec![1.0; 512];
        r.render(&mut out, 2);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(t.frames(), 256);
    }

    #[test]
    fn added_voice_is_heard_and_released() {
        let (mut r, mut tx, t) = rig();
        let token = CancelToken::new();
        tx.push(Command::AddLayer(noise_voice(1, &token))).unwrap();

        let mut out = vec![0.0; 256];
        r.render(&mut out, 1);
        assert_eq!(t.voices(), 1);
        assert!(out.iter().any(|&s| s != 0.0));

        token.cancel();
        r.render(&mut out, 1);
        assert_eq!(t.voices(), 0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn commands_for_unknown_layers_are_ignored() {
        let (mut r, mut tx, _t) = rig();
        tx.push(Command::Automate {
            layer: LayerId(9),
            target: ParamTarget::Output,
            event: ParamEvent::SetValue { value: 0.0, at: 0.0 },
        })
        .unwrap();
        let mut out = vec![0.0; 16];
        r.render(&mut out, 1);
        assert_eq!(r.voices(), 0);
    }

    #[test]
    fn master_event_moves_published_level() {
        let (mut r, mut tx, t) = rig();
        tx.push(Command::Master(ParamEvent::SetValue { value: 0.3, at: 0.0 })).unwrap();
        let mut out = vec![0.0; 64];
        r.render(&mut out, 1);
        assert!((t.master_level() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn output_is_clamped() {
        let (mut r, mut tx, t) = rig();
        let token = CancelToken::new();
        for id in 0..8 {
            let mut v = noise_voice(id, &token);
            v.automate(ParamTarget::Output, ParamEvent::SetValue { value: 1.0, at: 0.0 }).unwrap();
            tx.push(Command::AddLayer(v)).unwrap();
        }
        tx.push(Command::Master(ParamEvent::SetValue { value: 1.0, at: 0.0 })).unwrap();
        let mut out = vec![0.0; 2048];
        r.render(&mut out, 1);
        assert!(out.iter().all(|s| s.abs() <= 1.0));
        assert!(t.take_peak() <= 1.0);
        assert_eq!(t.take_peak(), 0.0);
    }

    #[test]
    fn interleaves_mono_to_all_channels() {
        let (mut r, mut tx, _t) = rig();
        let token = CancelToken::new();
        tx.push(Command::AddLayer(noise_voice(3, &token))).unwrap();
        let mut out = vec![0.0; 300];
        r.render(&mut out, 3);
        for frame in out.chunks(3) {
            assert_eq!(frame[0], frame[1]);
            assert_eq!(frame[1], frame[2]);
        }
    }

    #[test]
    fn released_voices_come_back_to_the_control_side() {
        let (mut r, mut tx, mut back, t) = rig_with_returns(4);
        let token = CancelToken::new();
        tx.push(Command::AddLayer(noise_voice(1, &token))).unwrap();
        let mut out = vec![0.0; 64];
        r.render(&mut out, 1);
        assert!(back.pop().is_err());

        token.cancel();
        r.render(&mut out, 1);
        assert_eq!(back.pop().map(|v| v.id()).ok(), Some(LayerId(1)));
        assert_eq!(r.voices(), 0);
        assert_eq!(t.voices(), 0);
    }

    #[test]
    fn full_return_queue_parks_released_voices_silently() {
        let (mut r, mut tx, mut back, t) = rig_with_returns(1);
        let token = CancelToken::new();
        tx.push(Command::AddLayer(noise_voice(1, &token))).unwrap();
        tx.push(Command::AddLayer(noise_voice(2, &token))).unwrap();
        let mut out = vec![0.0; 64];
        r.render(&mut out, 1);
        assert_eq!(t.voices(), 2);

        token.cancel();
        r.render(&mut out, 1);
        assert_eq!(r.voices(), 1);
        assert_eq!(t.voices(), 0);
        assert!(out.iter().all(|&s| s == 0.0));

        assert!(back.pop().is_ok());
        r.render(&mut out, 1);
        assert_eq!(r.voices(), 0);
    }

    #[test]
    fn voice_table_is_capped() {
        let (mut r, mut tx, mut back, t) = rig_with_returns(MAX_VOICES + 4);
        let mut out = vec![0.0; 16];
        for id in 0..=MAX_VOICES as u32 {
            tx.push(Command::AddLayer(noise_voice(id, &CancelToken::new()))).unwrap();
        }
        r.render(&mut out, 1);
        assert_eq!(r.voices(), MAX_VOICES);
        assert_eq!(t.rejected_events(), 1);
        let turned_away = back.pop().unwrap();
        assert!(turned_away.is_released());
    }
}
