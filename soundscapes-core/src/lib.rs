#![cfg_attr(not(feature = "std"), no_std)]
//! Soundscapes Core: no_std-ready DSP primitives with optional fast-math and SIMD hooks.
//!
//! Features
//! - `std`      : (default) use the Rust standard library
//! - `no-std`   : build with `#![no_std]` and use `libm`/`micromath` math backends
//! - `fast-math`: polynomial sine / tangent approximations
//! - `simd`     : vectorized bus mixing (wide)
//!
//! Modules
//! - [`dsp`]     : math backend, clamping, level conversion, bus mixing
//! - [`filters`] : TPT state-variable filter (low/high/band-pass)
//! - [`param`]   : sample-accurate automation timeline for gains and frequencies
//!
//! Nothing in this crate allocates; every primitive is safe to tick on the
//! render thread.

pub mod dsp;
pub mod filters;
pub mod param;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::dsp::{clamp, clamp01, db_to_gain, fast_sin, kill_denormals, mix_in_place, tpt_g, wrap_phase01, TAU};
    pub use crate::filters::{q_from_resonance_db, SvfMode, SvfTpt};
    pub use crate::param::{Param, ParamEvent, ScheduleError};
}
