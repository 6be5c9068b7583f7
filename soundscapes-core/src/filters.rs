//! State-variable filter used by every layer chain.
//!
//! `SvfTpt` follows the "g = tan(π fc / sr)" topology-preserving transform with
//! damping `R = 1/(2Q)`. It stays stable under modulation and high resonance,
//! which matters because layer cutoffs may be overridden per recipe.
//!
//! The band-pass tap is normalized (`2R * bp`) so its peak gain is unity,
//! matching the way the noise layers are balanced against each other.
//!
//! Low/high-pass resonance is often given in dB at the cutoff rather than as
//! a linear Q; [`q_from_resonance_db`] converts. At the cutoff the TPT
//! low-pass and high-pass taps have a gain of exactly `Q`.

use crate::dsp::{db_to_gain, kill_denormals, tpt_g};
use core::fmt::Debug;

/// Response selected from the SVF taps.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SvfMode {
    Lowpass,
    Highpass,
    Bandpass,
}

/// Linear Q whose low/high-pass response peaks `db` above unity at the
/// cutoff. 0 dB is flat (Q = 1).
#[inline]
pub fn q_from_resonance_db(db: f32) -> f32 {
    db_to_gain(db)
}

/// Topology-Preserving Transform SVF (State-Variable Filter).
///
/// Parameters:
/// - `cut_hz`  : cutoff / center frequency in Hz, kept below Nyquist
/// - `q`       : quality factor (resonance); values below ~0.5 are heavily damped
#[derive(Copy, Clone, Debug)]
pub struct SvfTpt {
    mode: SvfMode,
    sr: f32,
    cut: f32,
    q: f32,
    // derived
    g: f32,
    r: f32,
    // states
    ic1eq: f32,
    ic2eq: f32,
}

impl SvfTpt {
    #[inline]
    pub fn new(mode: SvfMode, cut_hz: f32, q: f32, sr: f32) -> Self {
        let mut s = Self {
            mode,
            sr: sr.max(1.0),
            cut: cut_hz.max(0.0),
            q: q.max(1e-4),
            g: 0.0,
            r: 0.0,
            ic1eq: 0.0,
            ic2eq: 0.0,
        };
        s.recalc();
        s
    }

    #[inline] pub fn lowpass(cut_hz: f32, q: f32, sr: f32) -> Self { Self::new(SvfMode::Lowpass, cut_hz, q, sr) }
    #[inline] pub fn highpass(cut_hz: f32, q: f32, sr: f32) -> Self { Self::new(SvfMode::Highpass, cut_hz, q, sr) }
    #[inline] pub fn bandpass(cut_hz: f32, q: f32, sr: f32) -> Self { Self::new(SvfMode::Bandpass, cut_hz, q, sr) }

    #[inline] pub fn set_sample_rate(&mut self, sr: f32) { self.sr = sr.max(1.0); self.recalc(); }
    #[inline] pub fn set_cutoff_hz(&mut self, cut_hz: f32) { self.cut = cut_hz.max(0.0); self.recalc(); }
    #[inline] pub fn set_q(&mut self, q: f32) { self.q = q.max(1e-4); self.recalc(); }

    #[inline] pub fn mode(&self) -> SvfMode { self.mode }
    #[inline] pub fn cutoff_hz(&self) -> f32 { self.cut }
    #[inline] pub fn q(&self) -> f32 { self.q }

    #[inline]
    fn recalc(&mut self) {
        // tan() blows up at Nyquist
        let fc = self.cut.min(0.49 * self.sr);
        self.g = tpt_g(fc, self.sr);
        self.r = 1.0 / (2.0 * self.q);
    }

    /// Clear the integrator states.
    #[inline]
    pub fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }

    /// Process one sample through the configured response.
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        // Zavalishin's solved form with h = 1 / (1 + 2Rg + g²)
        let g = self.g;
        let h = 1.0 / (1.0 + 2.0 * self.r * g + g * g);
        let hp = (x - (2.0 * self.r + g) * self.ic1eq - self.ic2eq) * h;
        let bp = g * hp + self.ic1eq;
        let lp = g * bp + self.ic2eq;

        self.ic1eq = kill_denormals(g * hp + bp);
        self.ic2eq = kill_denormals(g * bp + lp);

        match self.mode {
            SvfMode::Lowpass => lp,
            SvfMode::Highpass => hp,
            SvfMode::Bandpass => 2.0 * self.r * bp,
        }
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    fn settle(f: &mut SvfTpt, x: f32, n: usize) -> f32 {
        let mut y = 0.0;
        for _ in 0..n {
            y = f.process(x);
        }
        y
    }

    fn sine_rms(f: &mut SvfTpt, hz: f32) -> f32 {
        let n = SR as usize / 2;
        let mut acc = 0.0;
        for i in 0..n {
            let x = (crate::dsp::TAU * hz * i as f32 / SR).sin();
            let y = f.process(x);
            if i > n / 2 {
                acc += y * y;
            }
        }
        (acc / (n / 2) as f32).sqrt()
    }

    #[test]
    fn lowpass_passes_dc() {
        let mut lp = SvfTpt::lowpass(1000.0, 0.707, SR);
        let y = settle(&mut lp, 1.0, SR as usize);
        assert!((y - 1.0).abs() < 1e-3, "y={y}");
    }

    #[test]
    fn highpass_blocks_dc() {
        let mut hp = SvfTpt::highpass(200.0, 0.7, SR);
        let y = settle(&mut hp, 1.0, SR as usize);
        assert!(y.abs() < 1e-3, "y={y}");
    }

    #[test]
    fn bandpass_peaks_near_center() {
        let mut at_center = SvfTpt::bandpass(1200.0, 0.8, SR);
        let mut far_below = SvfTpt::bandpass(1200.0, 0.8, SR);
        let center = sine_rms(&mut at_center, 1200.0);
        let below = sine_rms(&mut far_below, 60.0);
        // unity peak: a unit sine has rms ~0.707
        assert!((center - 0.707).abs() < 0.05, "center={center}");
        assert!(below < center * 0.2, "below={below} center={center}");
    }

    #[test]
    fn resonance_in_db_is_near_flat_at_cutoff() {
        for (fc, db) in [(4000.0, 0.2), (600.0, 0.2), (200.0, 0.5), (800.0, 0.7)] {
            let q = q_from_resonance_db(db);
            for mut f in [SvfTpt::lowpass(fc, q, SR), SvfTpt::highpass(fc, q, SR)] {
                let gain_db = 20.0 * (sine_rms(&mut f, fc) / core::f32::consts::FRAC_1_SQRT_2).log10();
                assert!((gain_db - db).abs() < 0.3, "{:?} fc={fc} want {db} dB got {gain_db}", f.mode());
            }
        }
    }

    #[test]
    fn low_linear_q_sags_at_cutoff() {
        // Q = 0.2 read linearly is 14 dB down at the cutoff
        let mut lp = SvfTpt::lowpass(4000.0, 0.2, SR);
        let gain = sine_rms(&mut lp, 4000.0) / core::f32::consts::FRAC_1_SQRT_2;
        assert!((gain - 0.2).abs() < 0.02, "gain={gain}");
    }

    #[test]
    fn cutoff_above_nyquist_stays_stable() {
        let mut lp = SvfTpt::lowpass(40_000.0, 4.0, SR);
        let y = settle(&mut lp, 1.0, 4096);
        assert!(y.is_finite() && y.abs() < 4.0, "y={y}");
    }
}
