//! Building blocks (nodes) for layer voices.
//!
//! Everything here runs on the render thread. Construction (which may
//! allocate, e.g. the noise table) happens on the control path; ticking
//! never allocates.
//!
//! Contents:
//! - `Wave`, `Osc`  : sine/triangle oscillator with stable phase wrap
//! - `Lfo`          : scaled sine used to modulate a gain parameter
//! - `NoiseLoop`    : 2 s looping table of uniform white noise
//! - `GainStage`    : automated gain with optional LFO modulation
//! - `Burst`        : self-terminating chirp/tick voice
//! - `BurstPool`    : fixed set of bursts re-triggered by a pulse scheduler
//!
//! Frequencies are **Hz**, times are absolute context **seconds**.

use rand::Rng;
use soundscapes_core::dsp::{fast_sin, wrap_phase01, TAU};
use soundscapes_core::param::{Param, ParamEvent};

use crate::graph::Generator;

/// Event slots per automated parameter. A swell schedules three events and a
/// burst at most two, so eight leaves room for overlapping re-arms.
pub const PARAM_SLOTS: usize = 8;

/// Automated parameter used throughout the engine.
pub type AutoParam = Param<PARAM_SLOTS>;

/// Oscillator waveform.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Wave { Sine, Tri }

/// Both shapes start at zero and rise, so a freshly started burst never clicks.
#[inline]
fn osc_sample(phase01: f32, wave: Wave) -> f32 {
    match wave {
        Wave::Sine => fast_sin(TAU * phase01),
        Wave::Tri  => 1.0 - 4.0 * (wrap_phase01(phase01 + 0.25) - 0.5).abs(),
    }
}

/// Free-running oscillator. Not anti-aliased; fine for LFO duty and short chirps.
#[derive(Copy, Clone, Debug)]
pub struct Osc {
    phase: f32,   // [0,1)
    freq:  f32,   // Hz
    wave:  Wave,
}

impl Osc {
    #[inline] pub fn new(freq_hz: f32, wave: Wave) -> Self { Self { phase: 0.0, freq: freq_hz.max(0.0), wave } }
    #[inline] pub fn set_freq(&mut self, hz: f32) { self.freq = hz.max(0.0); }
    #[inline] pub fn set_wave(&mut self, w: Wave) { self.wave = w; }
    #[inline] pub fn freq(&self) -> f32 { self.freq }
    #[inline] pub fn reset_phase(&mut self) { self.phase = 0.0; }

    /// Return the sample at the current phase, then advance one sample.
    #[inline]
    pub fn next(&mut self, sr: f32) -> f32 {
        let s = osc_sample(self.phase, self.wave);
        self.phase = wrap_phase01(self.phase + self.freq / sr);
        s
    }
}

/// Low-frequency sine whose output is scaled by `depth` and added to a gain.
#[derive(Copy, Clone, Debug)]
pub struct Lfo {
    osc: Osc,
    depth: f32,
}

impl Lfo {
    #[inline] pub fn sine(rate_hz: f32, depth: f32) -> Self { Self { osc: Osc::new(rate_hz, Wave::Sine), depth } }
    #[inline] pub fn rate(&self) -> f32 { self.osc.freq() }
    #[inline] pub fn depth(&self) -> f32 { self.depth }
    #[inline] pub fn set_rate(&mut self, hz: f32) { self.osc.set_freq(hz); }

    /// Next value in **[-depth, depth]**.
    #[inline] pub fn next(&mut self, sr: f32) -> f32 { self.depth * self.osc.next(sr) }
}

/// Looping table of uniform noise in [-1, 1].
///
/// Every instance draws its own table so two layers never share a realization.
pub struct NoiseLoop {
    table: Box<[f32]>,
    pos: usize,
}

impl NoiseLoop {
    pub const SECONDS: f32 = 2.0;

    pub fn new<R: Rng + ?Sized>(sr: f32, rng: &mut R) -> Self {
        let len = ((sr * Self::SECONDS) as usize).max(1);
        let table = (0..len).map(|_| rng.gen_range(-1.0_f32..=1.0)).collect();
        Self { table, pos: 0 }
    }

    #[inline] pub fn len(&self) -> usize { self.table.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.table.is_empty() }
    #[inline] pub fn table(&self) -> &[f32] { &self.table }
}

impl Generator for NoiseLoop {
    #[inline]
    fn next(&mut self, _now: f64) -> f32 {
        let s = self.table[self.pos];
        self.pos += 1;
        if self.pos == self.table.len() { self.pos = 0; }
        s
    }
}

/// Gain whose coefficient is an automation timeline plus an optional LFO.
/// The effective coefficient never goes below zero.
#[derive(Copy, Clone, Debug)]
pub struct GainStage {
    param: AutoParam,
    lfo: Option<Lfo>,
    sr: f32,
}

impl GainStage {
    #[inline]
    pub fn fixed(value: f32, sr: f32) -> Self {
        Self { param: AutoParam::new(value), lfo: None, sr }
    }

    #[inline]
    pub fn modulated(base: f32, lfo: Lfo, sr: f32) -> Self {
        Self { param: AutoParam::new(base), lfo: Some(lfo), sr }
    }

    #[inline] pub fn param(&self) -> &AutoParam { &self.param }
    #[inline] pub fn param_mut(&mut self) -> &mut AutoParam { &mut self.param }
    #[inline] pub fn lfo(&self) -> Option<&Lfo> { self.lfo.as_ref() }

    #[inline]
    pub fn process(&mut self, x: f32, now: f64) -> f32 {
        let sr = self.sr;
        let m = self.lfo.as_mut().map_or(0.0, |l| l.next(sr));
        x * (self.param.tick(now) + m).max(0.0)
    }
}

/// Shape of a single chirp/tick.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BurstShape {
    pub wave: Wave,
    pub start_hz: f32,
    /// Exponential sweep target; equal to `start_hz` for a fixed tone.
    pub end_hz: f32,
    pub sweep_s: f32,
    pub peak: f32,
    pub attack_s: f32,
    /// Level the exponential decay lands on at `decay_s`.
    pub floor: f32,
    pub decay_s: f32,
    /// The voice is silent and reusable after this long.
    pub length_s: f32,
}

/// One short oscillator event: linear attack, exponential decay, hard stop.
#[derive(Copy, Clone, Debug)]
pub struct Burst {
    osc: Osc,
    freq: AutoParam,
    env: AutoParam,
    until: f64,
    active: bool,
    sr: f32,
}

impl Burst {
    pub fn idle(sr: f32) -> Self {
        Self {
            osc: Osc::new(0.0, Wave::Sine),
            freq: AutoParam::new(0.0),
            env: AutoParam::new(0.0),
            until: 0.0,
            active: false,
            sr,
        }
    }

    /// Start `shape` at context time `at`, discarding whatever was playing.
    pub fn fire(&mut self, shape: &BurstShape, at: f64) {
        self.osc.set_wave(shape.wave);
        self.osc.reset_phase();

        self.freq.set_immediate(shape.start_hz, at);
        if shape.end_hz != shape.start_hz {
            let _ = self.freq.schedule(ParamEvent::ExponentialRamp {
                value: shape.end_hz,
                end: at + f64::from(shape.sweep_s),
            });
        }

        self.env.set_immediate(0.0, at);
        let _ = self.env.schedule(ParamEvent::LinearRamp { value: shape.peak, end: at + f64::from(shape.attack_s) });
        let _ = self.env.schedule(ParamEvent::ExponentialRamp { value: shape.floor, end: at + f64::from(shape.decay_s) });

        self.until = at + f64::from(shape.length_s);
        self.active = true;
    }

    #[inline] pub fn is_active(&self) -> bool { self.active }
    #[inline] pub fn ends_at(&self) -> f64 { self.until }
}

impl Generator for Burst {
    #[inline]
    fn next(&mut self, now: f64) -> f32 {
        if !self.active {
            return 0.0;
        }
        if now >= self.until {
            self.active = false;
            return 0.0;
        }
        self.osc.set_freq(self.freq.tick(now));
        self.osc.next(self.sr) * self.env.tick(now)
    }
}

/// Fixed set of bursts. Triggers reuse a finished voice or steal the oldest.
#[derive(Copy, Clone, Debug)]
pub struct BurstPool<const N: usize> {
    voices: [Burst; N],
}

impl<const N: usize> BurstPool<N> {
    pub fn new(sr: f32) -> Self {
        Self { voices: [Burst::idle(sr); N] }
    }

    pub fn trigger(&mut self, shape: &BurstShape, at: f64) {
        let slot = self
            .voices
            .iter()
            .position(|b| !b.is_active())
            .or_else(|| {
                self.voices
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.ends_at().total_cmp(&b.1.ends_at()))
                    .map(|(i, _)| i)
            });
        if let Some(i) = slot {
            self.voices[i].fire(shape, at);
        }
    }

    #[inline]
    pub fn active(&self) -> usize {
        self.voices.iter().filter(|b| b.is_active()).count()
    }
}

impl<const N: usize> Generator for BurstPool<N> {
    #[inline]
    fn next(&mut self, now: f64) -> f32 {
        self.voices.iter_mut().map(|b| b.next(now)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SR: f32 = 48_000.0;

    fn chirp() -> BurstShape {
        BurstShape {
            wave: Wave::Sine,
            start_hz: 2000.0,
            end_hz: 800.0,
            sweep_s: 0.2,
            peak: 0.6,
            attack_s: 0.02,
            floor: 0.001,
            decay_s: 0.25,
            length_s: 0.3,
        }
    }

    #[test]
    fn noise_table_is_two_seconds_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = NoiseLoop::new(SR, &mut rng);
        assert_eq!(n.len(), 96_000);
        assert!(n.table().iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn noise_loops_seamlessly() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut n = NoiseLoop::new(100.0, &mut rng);
        // 100 Hz * 2 s = 200 samples per lap
        let laps: Vec<f32> = (0..400).map(|_| n.next(0.0)).collect();
        assert_eq!(laps[..200], laps[200..]);
    }

    #[test]
    fn noise_realizations_differ() {
        let mut rng = StdRng::seed_from_u64(3);
        let a = NoiseLoop::new(SR, &mut rng);
        let b = NoiseLoop::new(SR, &mut rng);
        assert_ne!(a.table()[..64], b.table()[..64]);
    }

    #[test]
    fn triangle_starts_at_zero_and_peaks_at_quarter() {
        let mut o = Osc::new(1.0, Wave::Tri);
        assert!(o.next(4.0).abs() < 1e-6);
        assert!((o.next(4.0) - 1.0).abs() < 1e-6);
        assert!(o.next(4.0).abs() < 1e-6);
        assert!((o.next(4.0) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn lfo_stays_within_depth() {
        let mut l = Lfo::sine(0.8, 0.25);
        for _ in 0..(SR as usize) {
            let v = l.next(SR);
            assert!(v.abs() <= 0.25 + 1e-5);
        }
    }

    #[test]
    fn modulated_gain_never_negative() {
        let mut g = GainStage::modulated(0.1, Lfo::sine(5.0, 0.3), SR);
        for i in 0..(SR as usize) {
            let y = g.process(1.0, f64::from(i as u32) / f64::from(SR));
            assert!(y >= 0.0);
        }
    }

    #[test]
    fn burst_self_terminates() {
        let mut b = Burst::idle(SR);
        b.fire(&chirp(), 1.0);
        let mut peak = 0.0_f32;
        let mut t = 1.0;
        while t < 1.35 {
            peak = peak.max(b.next(t).abs());
            t += 1.0 / f64::from(SR);
        }
        assert!(peak > 0.3, "peak={peak}");
        assert!(!b.is_active());
        assert_eq!(b.next(2.0), 0.0);
    }

    #[test]
    fn pool_steals_oldest_when_full() {
        let mut pool = BurstPool::<2>::new(SR);
        pool.trigger(&chirp(), 0.0);
        pool.trigger(&chirp(), 0.1);
        pool.trigger(&chirp(), 0.2);
        assert_eq!(pool.active(), 2);
        // durations are f32, so end times carry its rounding
        assert!(pool.voices.iter().any(|b| (b.ends_at() - 0.5).abs() < 1e-6));
        assert!(pool.voices.iter().all(|b| (b.ends_at() - 0.3).abs() > 1e-6));
    }
}
