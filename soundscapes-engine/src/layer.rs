//! Layers: one independent sound texture, split across the two threads.
//!
//! - [`LayerVoice`] is the render half. It owns the generators, filters and
//!   gains and is moved into the [`Renderer`](crate::graph::Renderer) when the
//!   layer starts.
//! - [`Layer`] is the control half. The engine owns it. It keeps the
//!   layer's [`CancelToken`], the automation tasks waiting to be scheduled,
//!   and the voice until `start()` hands it over.
//!
//! Releasing a layer means flipping its token. The renderer goes silent on
//! cancelled voices at the next block boundary and returns them to the
//! engine to be freed; the scheduler never fires a
//! cancelled task again, so `stop()` cannot fail.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rtrb::{Producer, PushError};
use soundscapes_core::dsp::clamp01;
use soundscapes_core::filters::SvfTpt;
use soundscapes_core::param::{ParamEvent, ScheduleError};

use crate::error::BuildError;
use crate::graph::{Command, Generator, ParamTarget};
use crate::nodes::{AutoParam, BurstPool, BurstShape, GainStage, NoiseLoop};
use crate::recipe::SoundKind;
use crate::scheduler::{RepeatingTask, Scheduler};

/// Bursts a pulse layer can have sounding at once.
pub const PULSE_VOICES: usize = 4;

/// Engine-unique layer identifier. Never reused within one engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u32);

impl core::fmt::Display for LayerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// Shared one-way flag. Once cancelled it stays cancelled.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What produces a layer's raw signal.
pub enum Voice {
    /// Looping noise through a filter chain and an optional inner gain.
    Texture {
        noise: NoiseLoop,
        filters: Vec<SvfTpt>,
        stage: Option<GainStage>,
    },
    /// Short oscillator bursts fired by a pulse scheduler.
    Pulses { pool: BurstPool<PULSE_VOICES> },
}

impl Voice {
    pub fn texture(noise: NoiseLoop, filters: Vec<SvfTpt>, stage: Option<GainStage>) -> Self {
        Voice::Texture { noise, filters, stage }
    }

    pub fn pulses(sr: f32) -> Self {
        Voice::Pulses { pool: BurstPool::new(sr) }
    }

    #[inline]
    fn next(&mut self, now: f64) -> f32 {
        match self {
            Voice::Texture { noise, filters, stage } => {
                let mut x = noise.next(now);
                for f in filters.iter_mut() {
                    x = f.process(x);
                }
                match stage {
                    Some(g) => g.process(x, now),
                    None => x,
                }
            }
            Voice::Pulses { pool } => pool.next(now),
        }
    }
}

/// Render half of a layer.
pub struct LayerVoice {
    id: LayerId,
    token: CancelToken,
    out: AutoParam,
    body: Voice,
}

impl LayerVoice {
    pub fn new(id: LayerId, token: CancelToken, gain: f32, body: Voice) -> Self {
        Self { id, token, out: AutoParam::new(clamp01(gain)), body }
    }

    #[inline] pub fn id(&self) -> LayerId { self.id }
    #[inline] pub fn is_released(&self) -> bool { self.token.is_cancelled() }
    #[inline] pub fn release(&self) { self.token.cancel() }
    #[inline] pub fn output_gain(&self) -> f32 { self.out.value() }
    #[inline] pub fn body(&self) -> &Voice { &self.body }

    /// Render `out.len()` samples starting at context time `t0`.
    pub fn render(&mut self, out: &mut [f32], t0: f64, dt: f64) {
        for (i, y) in out.iter_mut().enumerate() {
            let now = t0 + i as f64 * dt;
            *y = self.body.next(now) * self.out.tick(now);
        }
    }

    /// Queue an automation event. A texture without an inner stage ignores
    /// `ParamTarget::Stage`; so does a pulse layer.
    pub fn automate(&mut self, target: ParamTarget, event: ParamEvent) -> Result<(), ScheduleError> {
        match self.param_mut(target) {
            Some(p) => p.schedule(event),
            None => Ok(()),
        }
    }

    pub fn cancel(&mut self, target: ParamTarget, from: f64) {
        if let Some(p) = self.param_mut(target) {
            p.cancel(from);
        }
    }

    /// Fire a burst. Only pulse layers react.
    pub fn trigger(&mut self, shape: &BurstShape, at: f64) {
        if let Voice::Pulses { pool } = &mut self.body {
            pool.trigger(shape, at);
        }
    }

    fn param_mut(&mut self, target: ParamTarget) -> Option<&mut AutoParam> {
        match (target, &mut self.body) {
            (ParamTarget::Output, _) => Some(&mut self.out),
            (ParamTarget::Stage, Voice::Texture { stage: Some(g), .. }) => Some(g.param_mut()),
            (ParamTarget::Stage, _) => None,
        }
    }
}

/// What a UI needs to draw a layer row.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LayerInfo {
    pub id: LayerId,
    pub kind: SoundKind,
    pub gain: f32,
}

/// Control half of a layer: the owned-resource bundle with a single release.
pub struct Layer {
    id: LayerId,
    kind: SoundKind,
    gain: f32,
    token: CancelToken,
    voice: Option<Box<LayerVoice>>,
    tasks: Vec<Box<dyn RepeatingTask>>,
    started: bool,
}

impl core::fmt::Debug for Layer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("gain", &self.gain)
            .field("started", &self.started)
            .field("stopped", &self.token.is_cancelled())
            .finish()
    }
}

impl Layer {
    pub fn new(id: LayerId, kind: SoundKind, gain: f32, body: Voice, tasks: Vec<Box<dyn RepeatingTask>>) -> Self {
        let gain = clamp01(gain);
        let token = CancelToken::new();
        let voice = Box::new(LayerVoice::new(id, token.clone(), gain, body));
        Self { id, kind, gain, token, voice: Some(voice), tasks, started: false }
    }

    #[inline] pub fn id(&self) -> LayerId { self.id }
    #[inline] pub fn kind(&self) -> SoundKind { self.kind }
    #[inline] pub fn gain(&self) -> f32 { self.gain }
    #[inline] pub fn token(&self) -> &CancelToken { &self.token }
    #[inline] pub fn is_started(&self) -> bool { self.started }
    #[inline] pub fn is_stopped(&self) -> bool { self.token.is_cancelled() }

    /// Automation tasks not yet handed to a scheduler.
    #[inline] pub fn pending_tasks(&self) -> usize { self.tasks.len() }

    pub fn info(&self) -> LayerInfo {
        LayerInfo { id: self.id, kind: self.kind, gain: self.gain }
    }

    /// Hand the voice to the renderer and the automation to the scheduler,
    /// due at `now`. Calling it again, or after `stop()`, does nothing.
    ///
    /// On `QueueFull` the layer keeps its voice and can be started later.
    pub fn start(
        &mut self,
        commands: &mut Producer<Command>,
        scheduler: &mut Scheduler,
        now: f64,
    ) -> Result<(), BuildError> {
        if self.started || self.is_stopped() {
            return Ok(());
        }
        if let Some(voice) = self.voice.take() {
            if let Err(PushError::Full(cmd)) = commands.push(Command::AddLayer(voice)) {
                if let Command::AddLayer(voice) = cmd {
                    self.voice = Some(voice);
                }
                return Err(BuildError::QueueFull);
            }
        }
        for task in self.tasks.drain(..) {
            scheduler.schedule(now, self.token.clone(), task);
        }
        self.started = true;
        Ok(())
    }

    /// Release the voice and every automation task. Idempotent.
    pub fn stop(&mut self) {
        self.token.cancel();
        self.voice = None;
        self.tasks.clear();
    }

    /// Smoothly move the layer output gain to `g` (clamped to [0,1]).
    pub fn set_gain(
        &mut self,
        g: f32,
        commands: &mut Producer<Command>,
        now: f64,
        tau: f32,
    ) -> Result<(), BuildError> {
        let g = clamp01(g);
        if self.is_stopped() {
            return Ok(());
        }
        if let Some(voice) = self.voice.as_mut() {
            // not started yet: the renderer has not seen it
            voice.out.set_immediate(g, now);
            self.gain = g;
            return Ok(());
        }
        if commands.slots() < 2 {
            return Err(BuildError::QueueFull);
        }
        let layer = self.id;
        let target = ParamTarget::Output;
        let event = ParamEvent::SetTarget { target: g, start: now, tau };
        for cmd in [Command::Cancel { layer, target, from: now }, Command::Automate { layer, target, event }] {
            if commands.push(cmd).is_err() {
                return Err(BuildError::QueueFull);
            }
        }
        self.gain = g;
        Ok(())
    }
}

impl Drop for Layer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
