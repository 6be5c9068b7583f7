//! Automation units driven by the [`Scheduler`](crate::scheduler::Scheduler).
//!
//! - [`Swell`]: cancels whatever is queued on a gain, writes a rise/fall
//!   envelope starting now, then re-arms after a randomized gap.
//! - [`PulseTrain`]: fires one burst on a pulse layer, then re-arms after a
//!   randomized gap.
//!
//! Continuous LFOs need no scheduling; they live inside
//! [`GainStage`](crate::nodes::GainStage).
//!
//! All random draws are uniform within the stated bounds.

use rand::Rng;
use soundscapes_core::param::ParamEvent;

use crate::graph::ParamTarget;
use crate::layer::LayerId;
use crate::nodes::{BurstShape, Wave};
use crate::scheduler::{Control, RepeatingTask};

/// Uniform draw in `[lo, hi)`; returns `lo` when the range is empty.
#[inline]
pub fn uniform<R: Rng + ?Sized>(rng: &mut R, (lo, hi): (f32, f32)) -> f32 {
    lo + (hi - lo) * rng.gen::<f32>()
}

/// How the falling half of a swell is shaped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Fall { Linear, Exponential }

/// Rise/fall envelope plus its re-arm rule. Times are seconds after firing.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SwellProfile {
    pub floor: f32,
    pub peak: f32,
    pub peak_at: f32,
    pub tail: f32,
    pub tail_at: f32,
    pub fall: Fall,
    /// Random gap bounds, seconds.
    pub gap: (f32, f32),
    /// When set the gap also delays the envelope (long, lazy rises).
    pub gap_stretches_envelope: bool,
    /// Re-arm delay before the gap is added.
    pub rearm_base: f32,
}

impl SwellProfile {
    /// Distant rumble: silent start, rise over 0.8 s + gap, exponential
    /// decay to 0.05, gap U(2, 8) s.
    pub const THUNDER: Self = Self {
        floor: 0.0,
        peak: 0.7,
        peak_at: 0.8,
        tail: 0.05,
        tail_at: 3.2,
        fall: Fall::Exponential,
        gap: (2.0, 8.0),
        gap_stretches_envelope: true,
        rearm_base: 3.5,
    };

    /// Surf: 0.05 → 0.8 over 1.5 s → 0.1 at 3 s, cycle U(2.5, 3.7) s.
    pub const WAVES: Self = Self {
        floor: 0.05,
        peak: 0.8,
        peak_at: 1.5,
        tail: 0.1,
        tail_at: 3.0,
        fall: Fall::Linear,
        gap: (2.5, 3.7),
        gap_stretches_envelope: false,
        rearm_base: 0.0,
    };

    pub fn draw_gap<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        uniform(rng, self.gap)
    }

    /// The three events of one swell fired at `now`.
    pub fn envelope(&self, now: f64, gap: f32) -> [ParamEvent; 3] {
        let offset = if self.gap_stretches_envelope { f64::from(gap) } else { 0.0 };
        let peak_end = now + f64::from(self.peak_at) + offset;
        let tail_end = now + f64::from(self.tail_at) + offset;
        let fall = match self.fall {
            Fall::Linear => ParamEvent::LinearRamp { value: self.tail, end: tail_end },
            Fall::Exponential => ParamEvent::ExponentialRamp { value: self.tail, end: tail_end },
        };
        [
            ParamEvent::SetValue { value: self.floor, at: now },
            ParamEvent::LinearRamp { value: self.peak, end: peak_end },
            fall,
        ]
    }

    #[inline]
    pub fn rearm_after(&self, gap: f32) -> f64 {
        f64::from(self.rearm_base + gap)
    }
}

/// Periodic swell on one gain of one layer.
#[derive(Debug)]
pub struct Swell {
    layer: LayerId,
    target: ParamTarget,
    profile: SwellProfile,
}

impl Swell {
    pub fn new(layer: LayerId, target: ParamTarget, profile: SwellProfile) -> Self {
        Self { layer, target, profile }
    }
}

impl RepeatingTask for Swell {
    fn fire(&mut self, cx: &mut Control<'_>) -> Option<f64> {
        let now = cx.now();
        let gap = self.profile.draw_gap(cx.rng());
        cx.cancel(self.layer, self.target, now);
        for event in self.profile.envelope(now, gap) {
            cx.automate(self.layer, self.target, event);
        }
        Some(self.profile.rearm_after(gap))
    }
}

/// Random shape and spacing of the bursts of a pulse layer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PulseProfile {
    pub wave: Wave,
    pub start_hz: (f32, f32),
    /// `None` keeps the start pitch for the whole burst.
    pub end_hz: Option<(f32, f32)>,
    pub sweep_s: f32,
    pub peak: f32,
    pub attack_s: f32,
    pub floor: f32,
    pub decay_s: f32,
    pub length_s: f32,
    /// Random gap bounds between bursts, seconds.
    pub gap: (f32, f32),
}

impl PulseProfile {
    /// Downward sine sweep, 300 ms, every 0.4–2 s.
    pub const BIRD_CHIRP: Self = Self {
        wave: Wave::Sine,
        start_hz: (1200.0, 2400.0),
        end_hz: Some((600.0, 1200.0)),
        sweep_s: 0.2,
        peak: 0.6,
        attack_s: 0.02,
        floor: 0.001,
        decay_s: 0.25,
        length_s: 0.3,
        gap: (0.4, 2.0),
    };

    /// Triangle at 4.5 kHz, 150 ms decay, every 120–320 ms.
    pub const CRICKET_TICK: Self = Self {
        wave: Wave::Tri,
        start_hz: (4500.0, 4500.0),
        end_hz: None,
        sweep_s: 0.0,
        peak: 0.25,
        attack_s: 0.015,
        floor: 0.001,
        decay_s: 0.15,
        length_s: 0.16,
        gap: (0.12, 0.32),
    };

    pub fn draw_shape<R: Rng + ?Sized>(&self, rng: &mut R) -> BurstShape {
        let start_hz = uniform(rng, self.start_hz);
        let end_hz = self.end_hz.map_or(start_hz, |r| uniform(rng, r));
        BurstShape {
            wave: self.wave,
            start_hz,
            end_hz,
            sweep_s: self.sweep_s,
            peak: self.peak,
            attack_s: self.attack_s,
            floor: self.floor,
            decay_s: self.decay_s,
            length_s: self.length_s,
        }
    }

    pub fn draw_gap<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        uniform(rng, self.gap)
    }
}

/// Fires bursts on a pulse layer for as long as the layer lives.
#[derive(Debug)]
pub struct PulseTrain {
    layer: LayerId,
    profile: PulseProfile,
}

impl PulseTrain {
    pub fn new(layer: LayerId, profile: PulseProfile) -> Self {
        Self { layer, profile }
    }
}

impl RepeatingTask for PulseTrain {
    fn fire(&mut self, cx: &mut Control<'_>) -> Option<f64> {
        let shape = self.profile.draw_shape(cx.rng());
        cx.trigger(self.layer, shape);
        Some(f64::from(self.profile.draw_gap(cx.rng())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Command;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rtrb::RingBuffer;

    const DRAWS: usize = 1000;

    fn within(v: f32, (lo, hi): (f32, f32)) -> bool {
        v >= lo && v <= hi
    }

    #[test]
    fn swell_gaps_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(11);
        for p in [SwellProfile::THUNDER, SwellProfile::WAVES] {
            for _ in 0..DRAWS {
                assert!(within(p.draw_gap(&mut rng), p.gap));
            }
        }
    }

    #[test]
    fn pulse_draws_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..DRAWS {
            let p = PulseProfile::BIRD_CHIRP;
            let s = p.draw_shape(&mut rng);
            assert!(within(s.start_hz, (1200.0, 2400.0)));
            assert!(within(s.end_hz, (600.0, 1200.0)));
            assert!(within(p.draw_gap(&mut rng), (0.4, 2.0)));

            let p = PulseProfile::CRICKET_TICK;
            let s = p.draw_shape(&mut rng);
            assert_eq!(s.start_hz, 4500.0);
            assert_eq!(s.end_hz, 4500.0);
            assert!(within(p.draw_gap(&mut rng), (0.12, 0.32)));
        }
    }

    #[test]
    fn wind_rate_draw_in_bounds() {
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..DRAWS {
            assert!(within(uniform(&mut rng, (0.07, 0.12)), (0.07, 0.12)));
        }
    }

    #[test]
    fn thunder_envelope_is_delayed_by_gap() {
        let [set, rise, fall] = SwellProfile::THUNDER.envelope(10.0, 4.0);
        assert_eq!(set, ParamEvent::SetValue { value: 0.0, at: 10.0 });
        assert!((rise.time() - 14.8).abs() < 1e-6);
        assert!(matches!(fall, ParamEvent::ExponentialRamp { value, end } if value == 0.05 && (end - 17.2).abs() < 1e-6));
        assert_eq!(SwellProfile::THUNDER.rearm_after(4.0), 7.5);
    }

    #[test]
    fn waves_envelope_ignores_gap() {
        let [set, rise, fall] = SwellProfile::WAVES.envelope(1.0, 3.0);
        assert_eq!(set.time(), 1.0);
        assert_eq!(rise.time(), 2.5);
        assert_eq!(fall, ParamEvent::LinearRamp { value: 0.1, end: 4.0 });
        assert_eq!(SwellProfile::WAVES.rearm_after(3.0), 3.0);
    }

    #[test]
    fn swell_cancels_then_writes_envelope() {
        let (mut tx, mut rx) = RingBuffer::new(16);
        let mut rng = StdRng::seed_from_u64(1);
        let mut cx = Control::new(2.0, &mut tx, &mut rng);
        let mut swell = Swell::new(LayerId(1), ParamTarget::Stage, SwellProfile::WAVES);
        let next = swell.fire(&mut cx).unwrap();
        assert!((2.5..=3.7).contains(&(next as f32)));
        assert!(matches!(rx.pop(), Ok(Command::Cancel { from, .. }) if from == 2.0));
        for _ in 0..3 {
            assert!(matches!(rx.pop(), Ok(Command::Automate { target: ParamTarget::Stage, .. })));
        }
        assert!(rx.pop().is_err());
    }

    #[test]
    fn pulse_train_triggers_once_per_fire() {
        let (mut tx, mut rx) = RingBuffer::new(16);
        let mut rng = StdRng::seed_from_u64(2);
        let mut cx = Control::new(0.0, &mut tx, &mut rng);
        let mut train = PulseTrain::new(LayerId(4), PulseProfile::CRICKET_TICK);
        let next = train.fire(&mut cx).unwrap();
        assert!((0.12..=0.32).contains(&(next as f32)));
        assert!(matches!(rx.pop(), Ok(Command::Trigger { layer: LayerId(4), .. })));
        assert!(rx.pop().is_err());
    }
}
