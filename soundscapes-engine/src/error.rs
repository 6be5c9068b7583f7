use thiserror::Error;

/// Errors surfaced by [`Engine`](crate::engine::Engine) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The output cannot provide real-time audio. Fatal to playback; the
    /// engine does not retry.
    #[error("audio context unavailable: {reason}")]
    ContextUnavailable { reason: String },

    #[error("malformed recipe: {0}")]
    Recipe(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        EngineError::ContextUnavailable { reason: reason.into() }
    }
}

/// A single layer could not be wired. The engine logs it, drops the layer
/// and carries on with the rest of the recipe.
#[derive(Copy, Clone, Debug, Error, PartialEq)]
pub enum BuildError {
    #[error("invalid value {value} for `{name}`")]
    InvalidParameter { name: &'static str, value: f32 },

    #[error("render command queue is full")]
    QueueFull,
}

/// A layer `type` no builder knows. Skipped, never fatal.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown sound type `{0}`")]
pub struct UnknownSound(pub String);
