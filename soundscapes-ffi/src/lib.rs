//! C ABI wrapper for the Soundscapes engine.
//!
//! Exposes a small set of functions to create/destroy an engine, play a JSON
//! recipe, adjust volumes, and pull-render interleaved f32 samples.
//!
//! ABI notes
//! - All functions are `extern "C"` and `#[no_mangle]`.
//! - Opaque handle type: `SoundscapesEngine` (heap-allocated; you own/delete it).
//! - The host owns the audio device and calls
//!   `soundscapes_render_interleaved_f32` from its callback. Rendering also
//!   advances the engine's timers (swells, chirps).
//!
//! Threading
//! - Not thread-safe; serialize all calls on one handle.

use std::ffi::{c_char, CStr};

use soundscapes_engine::{Engine, EngineConfig, EngineError, PullHandle, PullOutput};

/// `soundscapes_play_json` status codes.
pub const SOUNDSCAPES_OK: i32 = 0;
pub const SOUNDSCAPES_ERR_ARGUMENT: i32 = -1;
pub const SOUNDSCAPES_ERR_RECIPE: i32 = -2;
pub const SOUNDSCAPES_ERR_CONTEXT: i32 = -3;

/// Opaque engine wrapper we hand to C.
pub struct SoundscapesEngine {
    engine: Engine,
    pull: PullHandle,
    channels: usize,
}

impl SoundscapesEngine {
    fn new(sample_rate: u32, channels: u16) -> Self {
        let out = PullOutput::new(sample_rate, channels);
        let pull = out.handle();
        Self {
            engine: Engine::with_config(out, EngineConfig::default()),
            pull,
            channels: usize::from(channels),
        }
    }
}

/// Borrow the engine behind a handle; `None` for null.
///
/// # Safety
/// `engine` must be null or a live pointer from `soundscapes_create`.
unsafe fn handle<'a>(engine: *mut SoundscapesEngine) -> Option<&'a mut SoundscapesEngine> {
    engine.as_mut()
}

// --- Creation / destruction -------------------------------------------------------

/// Create an engine rendering at `sample_rate` Hz with `channels` interleaved
/// channels. Returns null if either is zero.
#[no_mangle]
pub extern "C" fn soundscapes_create(sample_rate: u32, channels: u32) -> *mut SoundscapesEngine {
    let Ok(ch) = u16::try_from(channels) else { return std::ptr::null_mut() };
    if sample_rate == 0 || ch == 0 {
        return std::ptr::null_mut();
    }
    Box::into_raw(Box::new(SoundscapesEngine::new(sample_rate, ch)))
}

/// Destroy an engine previously returned by `soundscapes_create`.
///
/// # Safety
/// `engine` must be null or a pointer from `soundscapes_create` not yet destroyed.
#[no_mangle]
pub unsafe extern "C" fn soundscapes_destroy(engine: *mut SoundscapesEngine) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

// --- Playback ---------------------------------------------------------------------

/// Replace the current layers with the recipe in `json` (UTF-8, NUL-terminated).
///
/// # Safety
/// `engine` as for `soundscapes_destroy`; `json` null or a valid C string.
#[no_mangle]
pub unsafe extern "C" fn soundscapes_play_json(engine: *mut SoundscapesEngine, json: *const c_char) -> i32 {
    let Some(e) = handle(engine) else { return SOUNDSCAPES_ERR_ARGUMENT };
    if json.is_null() {
        return SOUNDSCAPES_ERR_ARGUMENT;
    }
    let Ok(text) = CStr::from_ptr(json).to_str() else { return SOUNDSCAPES_ERR_ARGUMENT };
    match e.engine.play_json(text) {
        Ok(()) => SOUNDSCAPES_OK,
        Err(err @ EngineError::Recipe(_)) => {
            tracing::warn!(error = %err, "rejected recipe");
            SOUNDSCAPES_ERR_RECIPE
        }
        Err(err @ EngineError::ContextUnavailable { .. }) => {
            tracing::error!(error = %err, "cannot play");
            SOUNDSCAPES_ERR_CONTEXT
        }
    }
}

/// Stop every layer. Safe to call repeatedly.
///
/// # Safety
/// As for `soundscapes_destroy`.
#[no_mangle]
pub unsafe extern "C" fn soundscapes_stop(engine: *mut SoundscapesEngine) {
    if let Some(e) = handle(engine) {
        e.engine.stop();
    }
}

/// Smoothly set the master volume. Clamped to [0,1]; NaN is ignored.
///
/// # Safety
/// As for `soundscapes_destroy`.
#[no_mangle]
pub unsafe extern "C" fn soundscapes_set_master_volume(engine: *mut SoundscapesEngine, volume: f32) {
    if let Some(e) = handle(engine) {
        e.engine.set_master_volume(volume);
    }
}

/// Smoothly set the gain of the `index`th active layer. Returns 1 if applied.
///
/// # Safety
/// As for `soundscapes_destroy`.
#[no_mangle]
pub unsafe extern "C" fn soundscapes_set_layer_gain(engine: *mut SoundscapesEngine, index: u32, gain: f32) -> i32 {
    match handle(engine) {
        Some(e) => i32::from(e.engine.set_layer_gain(index as usize, gain)),
        None => 0,
    }
}

/// Number of active layers.
///
/// # Safety
/// As for `soundscapes_destroy`.
#[no_mangle]
pub unsafe extern "C" fn soundscapes_layer_count(engine: *mut SoundscapesEngine) -> u32 {
    handle(engine).map_or(0, |e| e.engine.layer_count() as u32)
}

// --- Rendering -------------------------------------------------------------------

/// Render `frames` interleaved frames (channel count fixed at creation) into
/// `out`, then fire any automation that became due.
///
/// Returns the number of frames written (0 on error). Before the first
/// recipe is played the frames are silent.
///
/// # Safety
/// `engine` as for `soundscapes_destroy`; `out` must hold
/// `frames * channels` floats.
#[no_mangle]
pub unsafe extern "C" fn soundscapes_render_interleaved_f32(
    engine: *mut SoundscapesEngine,
    out: *mut f32,
    frames: u32,
) -> u32 {
    let Some(e) = handle(engine) else { return 0 };
    if out.is_null() || frames == 0 {
        return 0;
    }
    let out = std::slice::from_raw_parts_mut(out, frames as usize * e.channels);
    e.pull.render(out);
    e.engine.poll();
    frames
}
