//! Layer builders: one assembly rule per [`SoundKind`].
//!
//! Noise textures are `noise → filter chain → optional inner gain`; the inner
//! gain is fixed, LFO-modulated, or driven by a [`Swell`]. Pulse layers are a
//! burst pool fed by a [`PulseTrain`]. Everything ends in the layer output
//! gain.
//!
//! | kind           | chain                                            |
//! |----------------|--------------------------------------------------|
//! | rain           | BP 1200 Hz Q0.8 → LP 4000 Hz Q0.2                 |
//! | thunder        | LP 200 Hz Q0.5 → swell                           |
//! | wind           | LP 600 Hz Q0.2 → 0.5 + LFO U(0.07,0.12) Hz × 0.25 |
//! | forest_floor   | HP 200 Hz Q0.7 → LP 800 Hz Q0.7                  |
//! | birds          | chirps                                           |
//! | river          | BP 500 Hz Q1.0 → 0.6                             |
//! | waves          | LP 500 Hz Q0.7 → swell                           |
//! | fireplace      | HP 1500 Hz Q0.5 → 0.3                            |
//! | cafe           | BP 300 Hz Q0.7 → 0.5 + LFO 0.05 Hz × 0.3          |
//! | train          | BP 120 Hz Q1.0 → 0.5 + LFO 0.8 Hz × 0.25          |
//! | night_crickets | ticks                                            |
//!
//! Low/high-pass `Q` figures are resonance in dB at the cutoff (0.2 dB is
//! practically flat); band-pass `Q` is linear. A `q` override is read in the
//! units of the filter it lands on.

use rand::rngs::StdRng;
use soundscapes_core::dsp::clamp01;
use soundscapes_core::filters::{q_from_resonance_db, SvfMode, SvfTpt};

use crate::automation::{uniform, PulseProfile, PulseTrain, Swell, SwellProfile};
use crate::error::BuildError;
use crate::graph::ParamTarget;
use crate::layer::{Layer, LayerId, Voice};
use crate::nodes::{GainStage, Lfo, NoiseLoop};
use crate::recipe::{LayerOverrides, LayerSpec, SoundKind};
use crate::scheduler::RepeatingTask;

/// What a builder needs from the engine.
pub struct BuildContext<'a> {
    pub sample_rate: f32,
    pub rng: &'a mut StdRng,
    pub id: LayerId,
}

#[derive(Copy, Clone, Debug)]
struct FilterPlan {
    mode: SvfMode,
    cutoff: f32,
    /// dB of resonance for low/high-pass, linear Q for band-pass.
    q: f32,
}

impl FilterPlan {
    fn linear_q(&self) -> f32 {
        match self.mode {
            SvfMode::Lowpass | SvfMode::Highpass => q_from_resonance_db(self.q),
            SvfMode::Bandpass => self.q,
        }
    }

    fn filter(&self, sr: f32) -> SvfTpt {
        SvfTpt::new(self.mode, self.cutoff, self.linear_q(), sr)
    }
}

const fn f(mode: SvfMode, cutoff: f32, q: f32) -> FilterPlan {
    FilterPlan { mode, cutoff, q }
}

#[derive(Copy, Clone, Debug)]
enum StagePlan {
    None,
    Fixed(f32),
    Lfo { base: f32, rate: f32, depth: f32 },
    Swell(SwellProfile),
}

enum Plan {
    Texture { filters: Vec<FilterPlan>, stage: StagePlan },
    Pulses(PulseProfile),
}

fn plan_for(kind: SoundKind, rng: &mut StdRng) -> Plan {
    use SvfMode::*;
    let texture = |filters: Vec<FilterPlan>, stage| Plan::Texture { filters, stage };
    match kind {
        SoundKind::Rain => texture(vec![f(Bandpass, 1200.0, 0.8), f(Lowpass, 4000.0, 0.2)], StagePlan::None),
        SoundKind::Thunder => texture(vec![f(Lowpass, 200.0, 0.5)], StagePlan::Swell(SwellProfile::THUNDER)),
        SoundKind::Wind => texture(
            vec![f(Lowpass, 600.0, 0.2)],
            StagePlan::Lfo { base: 0.5, rate: uniform(rng, (0.07, 0.12)), depth: 0.25 },
        ),
        SoundKind::ForestFloor => texture(vec![f(Highpass, 200.0, 0.7), f(Lowpass, 800.0, 0.7)], StagePlan::None),
        SoundKind::Birds => Plan::Pulses(PulseProfile::BIRD_CHIRP),
        SoundKind::River => texture(vec![f(Bandpass, 500.0, 1.0)], StagePlan::Fixed(0.6)),
        SoundKind::Waves => texture(vec![f(Lowpass, 500.0, 0.7)], StagePlan::Swell(SwellProfile::WAVES)),
        SoundKind::Fireplace => texture(vec![f(Highpass, 1500.0, 0.5)], StagePlan::Fixed(0.3)),
        SoundKind::Cafe => texture(
            vec![f(Bandpass, 300.0, 0.7)],
            StagePlan::Lfo { base: 0.5, rate: 0.05, depth: 0.3 },
        ),
        SoundKind::Train => texture(
            vec![f(Bandpass, 120.0, 1.0)],
            StagePlan::Lfo { base: 0.5, rate: 0.8, depth: 0.25 },
        ),
        SoundKind::NightCrickets => Plan::Pulses(PulseProfile::CRICKET_TICK),
    }
}

fn check(name: &'static str, value: f32, ok: bool) -> Result<f32, BuildError> {
    if value.is_finite() && ok {
        Ok(value)
    } else {
        Err(BuildError::InvalidParameter { name, value })
    }
}

/// Reject overrides no layer could use sensibly.
pub fn validate(overrides: &LayerOverrides, sample_rate: f32) -> Result<(), BuildError> {
    let nyquist = 0.5 * sample_rate;
    if let Some(c) = overrides.cutoff {
        check("cutoff", c, c > 0.0 && c < nyquist)?;
    }
    if let Some(q) = overrides.q {
        check("q", q, q > 0.0)?;
    }
    if let Some(r) = overrides.lfo_rate {
        check("lfoRate", r, r >= 0.0)?;
    }
    if let Some(d) = overrides.lfo_depth {
        check("lfoDepth", d, (0.0..=1.0).contains(&d))?;
    }
    Ok(())
}

fn apply(plan: &mut Plan, o: &LayerOverrides) {
    let Plan::Texture { filters, stage } = plan else { return };
    if let Some(first) = filters.first_mut() {
        if let Some(c) = o.cutoff { first.cutoff = c; }
        if let Some(q) = o.q { first.q = q; }
    }
    if let StagePlan::Lfo { rate, depth, .. } = stage {
        if let Some(r) = o.lfo_rate { *rate = r; }
        if let Some(d) = o.lfo_depth { *depth = d; }
    }
}

/// Assemble a layer for `kind`. The layer is built but not started.
pub fn build(kind: SoundKind, spec: &LayerSpec, cx: &mut BuildContext<'_>) -> Result<Layer, BuildError> {
    let sr = cx.sample_rate;
    validate(&spec.overrides, sr)?;
    let gain = clamp01(spec.gain());

    let mut plan = plan_for(kind, cx.rng);
    apply(&mut plan, &spec.overrides);

    let mut tasks: Vec<Box<dyn RepeatingTask>> = Vec::new();
    let body = match plan {
        Plan::Texture { filters, stage } => {
            let chain = filters.iter().map(|p| p.filter(sr)).collect();
            let stage = match stage {
                StagePlan::None => None,
                StagePlan::Fixed(v) => Some(GainStage::fixed(v, sr)),
                StagePlan::Lfo { base, rate, depth } => Some(GainStage::modulated(base, Lfo::sine(rate, depth), sr)),
                StagePlan::Swell(profile) => {
                    tasks.push(Box::new(Swell::new(cx.id, ParamTarget::Stage, profile)));
                    Some(GainStage::fixed(0.0, sr))
                }
            };
            Voice::texture(NoiseLoop::new(sr, cx.rng), chain, stage)
        }
        Plan::Pulses(profile) => {
            tasks.push(Box::new(PulseTrain::new(cx.id, profile)));
            Voice::pulses(sr)
        }
    };

    Ok(Layer::new(cx.id, kind, gain, body, tasks))
}
