//! The audio engine: rendering context, master bus, active layers and their
//! lifecycle.
//!
//! ```text
//!  play(recipe) ──► ensure_context ──► set master ──► stop old layers
//!                        │                               │
//!                        ▼                               ▼
//!               Output::attach(Renderer)      build + start each layer
//!                                                        │
//!        poll() ◄── timers (swells, pulses) ◄────────────┘
//! ```
//!
//! The engine is the single writer. Wrap it in
//! [`SharedEngine`](crate::control::SharedEngine) when several threads need
//! to drive it.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rtrb::{Consumer, Producer, RingBuffer};
use soundscapes_core::dsp::clamp01;
use soundscapes_core::param::ParamEvent;
use tracing::{debug, info, warn};

use crate::builders::{self, BuildContext};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::graph::{Command, Renderer, Telemetry, MAX_VOICES};
use crate::layer::{Layer, LayerId, LayerInfo, LayerVoice};
use crate::output::{Output, StreamSpec};
use crate::recipe::Recipe;
use crate::scheduler::Scheduler;

struct Context {
    spec: StreamSpec,
    commands: Producer<Command>,
    retired: Consumer<Box<LayerVoice>>,
    telemetry: Arc<Telemetry>,
}

impl Context {
    #[inline]
    fn now(&self) -> f64 {
        self.telemetry.frames() as f64 / f64::from(self.spec.sample_rate)
    }

    /// Free voices the renderer has finished with.
    fn collect_retired(&mut self) -> usize {
        let mut n = 0;
        while self.retired.pop().is_ok() {
            n += 1;
        }
        n
    }
}

pub struct Engine {
    config: EngineConfig,
    output: Box<dyn Output>,
    context: Option<Context>,
    master: f32,
    layers: Vec<Layer>,
    scheduler: Scheduler,
    rng: StdRng,
    next_id: u32,
}

impl core::fmt::Debug for Engine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("stream", &self.context.as_ref().map(|c| c.spec))
            .field("master", &self.master)
            .field("layers", &self.layers)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl Engine {
    pub fn new(output: impl Output + 'static) -> Self {
        Self::with_config(output, EngineConfig::default())
    }

    pub fn with_config(output: impl Output + 'static, config: EngineConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            master: clamp01(config.default_master),
            config,
            output: Box::new(output),
            context: None,
            layers: Vec::new(),
            scheduler: Scheduler::new(),
            rng,
            next_id: 0,
        }
    }

    #[inline] pub fn config(&self) -> &EngineConfig { &self.config }
    #[inline] pub fn has_context(&self) -> bool { self.context.is_some() }

    /// Create the rendering context and master bus. No-op once it exists.
    pub fn ensure_context(&mut self) -> Result<(), EngineError> {
        if self.context.is_some() {
            return Ok(());
        }
        let spec = self.output.prepare()?;
        if spec.sample_rate == 0 || spec.channels == 0 {
            return Err(EngineError::unavailable(format!(
                "output reported {} Hz x {} ch",
                spec.sample_rate, spec.channels
            )));
        }

        let capacity = self.config.command_capacity.max(16);
        let (commands, consumer) = RingBuffer::new(capacity);
        // every voice queued or playing fits, so the renderer never frees one
        let (returns, retired) = RingBuffer::new(capacity + MAX_VOICES);
        let telemetry = Arc::new(Telemetry::default());
        let renderer = Renderer::new(
            spec.sample_rate as f32,
            self.master,
            self.config.max_block,
            consumer,
            returns,
            telemetry.clone(),
        );
        self.output.attach(renderer)?;

        info!(
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            master = self.master,
            "audio context created"
        );
        self.context = Some(Context { spec, commands, retired, telemetry });
        Ok(())
    }

    /// Move the master gain to `v` (clamped to [0,1]) with exponential
    /// smoothing. Before the context exists the value becomes its initial
    /// gain. Non-finite values are ignored.
    pub fn set_master_volume(&mut self, v: f32) {
        if !v.is_finite() {
            warn!(value = v, "ignoring non-finite master volume");
            return;
        }
        let v = clamp01(v);
        self.master = v;
        let tau = self.config.smoothing_tau();
        let Some(cx) = self.context.as_mut() else { return };
        if cx.commands.slots() < 2 {
            warn!(value = v, "command queue full, master volume change dropped");
            return;
        }
        let now = cx.now();
        let _ = cx.commands.push(Command::MasterCancel(now));
        let _ = cx.commands.push(Command::Master(ParamEvent::SetTarget { target: v, start: now, tau }));
    }

    /// The most recently requested master volume.
    #[inline]
    pub fn master_volume(&self) -> f32 {
        self.master
    }

    /// The master gain the renderer actually applied last block.
    pub fn master_level(&self) -> f32 {
        self.context.as_ref().map_or(self.master, |c| c.telemetry.master_level())
    }

    /// Replace the active layer set with the layers of `recipe`.
    pub fn play(&mut self, recipe: &Recipe) -> Result<(), EngineError> {
        self.ensure_context()?;
        self.set_master_volume(recipe.master_volume.unwrap_or(self.config.default_master));
        self.stop();

        let now = self.now();
        let sample_rate = self.context.as_ref().map_or(0.0, |c| c.spec.sample_rate as f32);

        for spec in &recipe.layers {
            let kind = match spec.sound_kind() {
                Ok(kind) => kind,
                Err(e) => {
                    debug!(error = %e, "skipping layer");
                    continue;
                }
            };
            let id = self.alloc_id();
            let mut bcx = BuildContext { sample_rate, rng: &mut self.rng, id };
            let mut layer = match builders::build(kind, spec, &mut bcx) {
                Ok(layer) => layer,
                Err(e) => {
                    warn!(%id, %kind, error = %e, "layer abandoned");
                    continue;
                }
            };
            let Some(cx) = self.context.as_mut() else { break };
            match layer.start(&mut cx.commands, &mut self.scheduler, now) {
                Ok(()) => {
                    debug!(%id, %kind, gain = layer.gain(), "layer started");
                    self.layers.push(layer);
                }
                Err(e) => {
                    warn!(%id, %kind, error = %e, "layer abandoned");
                    layer.stop();
                }
            }
        }

        self.poll();
        info!(layers = self.layers.len(), master = self.master, "recipe playing");
        Ok(())
    }

    /// Parse `json` as a recipe and play it.
    pub fn play_json(&mut self, json: &str) -> Result<(), EngineError> {
        let recipe = Recipe::from_json(json)?;
        self.play(&recipe)
    }

    /// Release every active layer and drop every pending timer. Never fails;
    /// calling it with nothing playing does nothing.
    pub fn stop(&mut self) {
        if self.layers.is_empty() && self.scheduler.pending() == 0 {
            return;
        }
        let n = self.layers.len();
        for layer in &mut self.layers {
            layer.stop();
        }
        self.layers.clear();
        self.scheduler.clear();
        debug!(layers = n, "layers stopped");
    }

    /// Fire due automation. Call regularly (tens of ms) while playing.
    pub fn poll(&mut self) -> usize {
        let Some(cx) = self.context.as_mut() else { return 0 };
        let now = cx.now();
        let freed = cx.collect_retired();
        if freed > 0 {
            debug!(voices = freed, "released voices freed");
        }
        self.scheduler.purge();
        self.scheduler.poll(now, &mut cx.commands, &mut self.rng)
    }

    /// Smoothly change the gain of the `index`th active layer. Returns false
    /// when there is no such layer or the change could not be queued.
    pub fn set_layer_gain(&mut self, index: usize, g: f32) -> bool {
        if !g.is_finite() {
            warn!(index, value = g, "ignoring non-finite layer gain");
            return false;
        }
        let tau = self.config.smoothing_tau();
        let Some(cx) = self.context.as_mut() else { return false };
        let now = cx.now();
        let Some(layer) = self.layers.get_mut(index) else { return false };
        match layer.set_gain(g, &mut cx.commands, now, tau) {
            Ok(()) => true,
            Err(e) => {
                warn!(index, error = %e, "layer gain change dropped");
                false
            }
        }
    }

    /// Kind and gain of each active layer, in recipe order.
    pub fn layers(&self) -> Vec<LayerInfo> {
        self.layers.iter().map(Layer::info).collect()
    }

    #[inline] pub fn layer_count(&self) -> usize { self.layers.len() }

    /// Timers still waiting to fire.
    #[inline] pub fn pending_timers(&self) -> usize { self.scheduler.pending() }

    /// Context time in seconds; 0 before the context exists.
    pub fn now(&self) -> f64 {
        self.context.as_ref().map_or(0.0, Context::now)
    }

    pub fn stream_spec(&self) -> Option<StreamSpec> {
        self.context.as_ref().map(|c| c.spec)
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.stream_spec().map(|s| s.sample_rate)
    }

    pub fn telemetry(&self) -> Option<Arc<Telemetry>> {
        self.context.as_ref().map(|c| c.telemetry.clone())
    }

    /// Stop everything and tear the context down. A later `play()` creates a
    /// fresh one.
    pub fn shutdown(&mut self) {
        self.stop();
        if self.context.take().is_some() {
            self.output.detach();
            info!("audio context closed");
        }
    }

    fn alloc_id(&mut self) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        id
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
