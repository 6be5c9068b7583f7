//! Generic DSP utilities and math helpers.
//!
//! Design goals:
//! - `no_std` ready (guarded by the crate feature `no-std`)
//! - Math backend selection that works in both `std` and `no_std` contexts
//! - Optional `fast-math` approximations for hot paths
//! - Side-effect free helpers that are easy to test
//!
//! Features used by this file:
//! - `fast-math` : polynomial sine for oscillators
//! - `simd`      : vectorized `mix_in_place` for the master bus
//!
//! Conventions:
//! - All functions are `#[inline]` where useful to help the optimizer.
//! - Argument and return domains are documented per function.

#![allow(clippy::excessive_precision)]

use core::f32::consts::PI;

use cfg_if::cfg_if;

// ----------------------------- Math backend selection -----------------------------

cfg_if! {
    // micromath preferred if explicitly requested (works in no_std)
    if #[cfg(feature = "micromath")] {
        use micromath::F32Ext as _;
        #[inline] fn m_sin(x: f32) -> f32 { x.sin() }
        #[inline] fn m_cos(x: f32) -> f32 { x.cos() }
        #[inline] fn m_exp(x: f32) -> f32 { x.exp() }
        #[inline] fn m_ln(x: f32) -> f32 { x.ln() }
        #[inline] fn m_tan(x: f32) -> f32 { (x.sin()) / (x.cos()) }
        #[inline] fn m_abs(x: f32) -> f32 { x.abs() }
        #[inline] fn m_floor(x: f32) -> f32 { x.floor() }
    // libm (C math) in no_std
    } else if #[cfg(feature = "no-std")] {
        #[inline] fn m_sin(x: f32) -> f32 { libm::sinf(x) }
        #[inline] fn m_cos(x: f32) -> f32 { libm::cosf(x) }
        #[inline] fn m_exp(x: f32) -> f32 { libm::expf(x) }
        #[inline] fn m_ln(x: f32) -> f32 { libm::logf(x) }
        #[inline] fn m_tan(x: f32) -> f32 { libm::tanf(x) }
        #[inline] fn m_abs(x: f32) -> f32 { libm::fabsf(x) }
        #[inline] fn m_floor(x: f32) -> f32 { libm::floorf(x) }
    // std backend
    } else {
        #[inline] fn m_sin(x: f32) -> f32 { x.sin() }
        #[inline] fn m_cos(x: f32) -> f32 { x.cos() }
        #[inline] fn m_exp(x: f32) -> f32 { x.exp() }
        #[inline] fn m_ln(x: f32) -> f32 { x.ln() }
        #[inline] fn m_tan(x: f32) -> f32 { x.tan() }
        #[inline] fn m_abs(x: f32) -> f32 { x.abs() }
        #[inline] fn m_floor(x: f32) -> f32 { x.floor() }
    }
}

// --------------------------------- Constants -------------------------------------

/// 2π (commonly useful)
pub const TAU: f32 = 2.0 * PI;

/// A very small epsilon used in denormal handling and safe divisions.
pub const EPS_SMALL: f32 = 1.0e-20;

// --------------------------------- Utilities -------------------------------------

#[inline]
pub fn clamp(x: f32, lo: f32, hi: f32) -> f32 {
    if x < lo { lo } else if x > hi { hi } else { x }
}

/// Clamp into the unit interval. NaN maps to 0.
#[inline]
pub fn clamp01(x: f32) -> f32 {
    if x.is_nan() { 0.0 } else { clamp(x, 0.0, 1.0) }
}

#[inline]
pub fn abs(x: f32) -> f32 {
    m_abs(x)
}

#[inline]
pub fn exp(x: f32) -> f32 {
    m_exp(x)
}

/// Natural log. Callers must pass `x > 0`.
#[inline]
pub fn ln(x: f32) -> f32 {
    m_ln(x)
}

/// Wrap phase into [0, 1).
#[inline]
pub fn wrap_phase01(p: f32) -> f32 {
    let w = p - m_floor(p);
    if w >= 1.0 { 0.0 } else { w }
}

/// Kill denormal/subnormal values. Returns 0.0 if |x| < EPS_SMALL.
#[inline]
pub fn kill_denormals(x: f32) -> f32 {
    if m_abs(x) < EPS_SMALL { 0.0 } else { x }
}

// --------------------------------- Fast trig -------------------------------------

/// Sine with optional 5th-order polynomial under `fast-math`.
/// Max abs error ~1e-3 when approximated; exact backend otherwise.
#[inline]
pub fn fast_sin(x: f32) -> f32 {
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            // Range reduce to [-π, π]
            let k = m_floor(x / TAU + 0.5);
            let xr = x - k * TAU;

            // sin(x) ≈ x * (a + b x^2 + c x^4)
            let x2 = xr * xr;
            xr * (0.999_979_313_3 + x2 * (-0.166_624_432_0 + x2 * 0.008_308_978_98))
        } else {
            m_sin(x)
        }
    }
}

#[inline]
pub fn fast_cos(x: f32) -> f32 {
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            fast_sin(x + core::f32::consts::PI * 0.5)
        } else {
            m_cos(x)
        }
    }
}

// --------------------------------- Levels / filter coefficients ----------------

/// Decibels to linear amplitude.
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    m_exp(db * (core::f32::consts::LN_10 / 20.0))
}

/// TPT (Topology-Preserving Transform) `g = tan(π fc / sr)` helper for state-variable filters.
///
/// Under `fast-math` we compute `tan(x)` as `sin(x)/cos(x)` with the fast approximations.
#[inline]
pub fn tpt_g(cut_hz: f32, sr: f32) -> f32 {
    let x = core::f32::consts::PI * (cut_hz / sr);
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            fast_sin(x) / fast_cos(x)
        } else {
            m_tan(x)
        }
    }
}

// --------------------------------- Bus mixing ------------------------------------

/// In-place mix: `dst[i] += src[i] * gain`. Mismatched lengths mix the common prefix.
#[inline]
pub fn mix_in_place(dst: &mut [f32], src: &[f32], gain: f32) {
    let n = dst.len().min(src.len());
    let (dst, src) = (&mut dst[..n], &src[..n]);

    cfg_if! {
        if #[cfg(feature = "simd")] {
            use wide::f32x8;
            let g = f32x8::splat(gain);
            let mut d_chunks = dst.chunks_exact_mut(8);
            let mut s_chunks = src.chunks_exact(8);
            for (d, s) in (&mut d_chunks).zip(&mut s_chunks) {
                let mut dv = [0.0_f32; 8];
                let mut sv = [0.0_f32; 8];
                dv.copy_from_slice(d);
                sv.copy_from_slice(s);
                let y = f32x8::from(dv) + f32x8::from(sv) * g;
                d.copy_from_slice(&y.to_array());
            }
            for (d, s) in d_chunks.into_remainder().iter_mut().zip(s_chunks.remainder()) {
                *d += *s * gain;
            }
        } else {
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                *d += *s * gain;
            }
        }
    }
}

// --------------------------------- Tests (std only) ------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_respects_both_bounds() {
        assert_eq!(clamp(2.0, 0.0, 1.0), 1.0);
        assert_eq!(clamp(-2.0, 0.0, 1.0), 0.0);
        assert_eq!(clamp(0.3, 0.0, 1.0), 0.3);
        assert_eq!(clamp01(f32::NAN), 0.0);
    }

    #[test]
    fn wrap_phase_stays_in_unit_interval() {
        for p in [-2.25, -0.5, 0.0, 0.999, 1.0, 3.75] {
            let w = wrap_phase01(p);
            assert!((0.0..1.0).contains(&w), "p={p} w={w}");
        }
    }

    #[test]
    fn db_to_gain_reference_points() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_gain(20.0) - 10.0).abs() < 1e-4);
        assert!((db_to_gain(-6.0) - 0.501).abs() < 1e-3);
    }

    #[test]
    fn mix_accumulates_scaled_source() {
        let mut bus = [1.0_f32; 19];
        let src = [2.0_f32; 19];
        mix_in_place(&mut bus, &src, 0.25);
        assert!(bus.iter().all(|&x| (x - 1.5).abs() < 1e-6));
    }

    #[test]
    fn mix_handles_length_mismatch() {
        let mut bus = [0.0_f32; 4];
        mix_in_place(&mut bus, &[1.0, 1.0], 1.0);
        assert_eq!(bus, [1.0, 1.0, 0.0, 0.0]);
    }
}
