use serde::{Deserialize, Serialize};

/// Engine tuning. Every field has a default, so `{}` is a valid config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Slots in the control → render command queue.
    pub command_capacity: usize,
    /// Largest block the renderer processes at once, in frames.
    pub max_block: usize,
    /// Master volume for recipes that do not name one.
    pub default_master: f32,
    /// Time constant of master and layer gain changes.
    pub smoothing_ms: f32,
    /// Fixed RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_capacity: 1024,
            max_block: 1024,
            default_master: 0.8,
            smoothing_ms: 50.0,
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Smoothing time constant in seconds.
    #[inline]
    pub fn smoothing_tau(&self) -> f32 {
        (self.smoothing_ms / 1000.0).max(0.0)
    }
}
