//! Soundscapes Engine: procedural layered ambience.
//!
//! A [`Recipe`] names a master volume and an ordered list of typed layers
//! (rain, wind, birds, …). The [`Engine`] builds one signal subgraph per
//! layer, hands it to the render thread, and keeps the swells and pulses
//! that animate it running on the control path.
//!
//! Crate layout:
//! - [`graph`]      : `Generator` trait, render-side `Renderer`, commands, telemetry
//! - [`nodes`]      : oscillators, LFO, looping noise, gain stages, bursts
//! - [`layer`]      : `Layer` (control half) / `LayerVoice` (render half), cancel tokens
//! - [`builders`]   : per-sound-type assembly rules
//! - [`automation`] : swell and pulse tasks with their randomized profiles
//! - [`scheduler`]  : min-heap of cancellable repeating tasks
//! - [`engine`]     : lifecycle (`ensure_context`, `play`, `stop`, volumes)
//! - [`control`]    : `SharedEngine` lock wrapper and background ticker
//! - [`output`]     : `Output` trait and the host-driven `PullOutput`
//! - [`device`]     : CPAL output (feature `realtime`)
//! - [`recipe`], [`presets`], [`config`], [`error`]
//!
//! The render thread does not allocate or free memory, take locks, or log.
//! Everything it learns about arrives through a lock-free command queue or a
//! layer's cancel token, and voices it has finished with go back to the
//! engine through a second queue to be dropped there.

pub mod automation;
pub mod builders;
pub mod config;
pub mod control;
#[cfg(feature = "realtime")]
pub mod device;
pub mod engine;
pub mod error;
pub mod graph;
pub mod layer;
pub mod nodes;
pub mod output;
pub mod presets;
pub mod recipe;
pub mod scheduler;

pub use config::EngineConfig;
pub use control::{SharedEngine, Ticker};
#[cfg(feature = "realtime")]
pub use device::{list_output_devices, CpalOutput};
pub use engine::Engine;
pub use error::{BuildError, EngineError};
pub use graph::{Generator, Telemetry};
pub use layer::{LayerId, LayerInfo};
pub use output::{Output, PullHandle, PullOutput, StreamSpec};
pub use recipe::{LayerOverrides, LayerSpec, Recipe, SoundKind};
