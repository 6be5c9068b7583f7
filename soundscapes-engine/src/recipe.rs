//! The recipe document: master volume plus an ordered list of typed layers.
//!
//! ```json
//! { "masterVolume": 0.8,
//!   "layers": [ { "type": "rain", "gain": 0.5 },
//!               { "type": "wind", "gain": 0.3, "lfoRate": 0.1 } ] }
//! ```
//!
//! Unknown fields are ignored. A missing or `null` `gain` means 0.5; a missing
//! `masterVolume` means "use the engine default".

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, UnknownSound};

pub const DEFAULT_LAYER_GAIN: f32 = 0.5;

/// Every sound type a builder exists for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SoundKind {
    Rain,
    Thunder,
    Wind,
    ForestFloor,
    Birds,
    River,
    Waves,
    Fireplace,
    Cafe,
    Train,
    NightCrickets,
}

impl SoundKind {
    pub const ALL: [SoundKind; 11] = [
        SoundKind::Rain,
        SoundKind::Thunder,
        SoundKind::Wind,
        SoundKind::ForestFloor,
        SoundKind::Birds,
        SoundKind::River,
        SoundKind::Waves,
        SoundKind::Fireplace,
        SoundKind::Cafe,
        SoundKind::Train,
        SoundKind::NightCrickets,
    ];

    /// The tag used in recipe documents.
    pub fn as_str(self) -> &'static str {
        match self {
            SoundKind::Rain => "rain",
            SoundKind::Thunder => "thunder",
            SoundKind::Wind => "wind",
            SoundKind::ForestFloor => "forest_floor",
            SoundKind::Birds => "birds",
            SoundKind::River => "river",
            SoundKind::Waves => "waves",
            SoundKind::Fireplace => "fireplace",
            SoundKind::Cafe => "cafe",
            SoundKind::Train => "train",
            SoundKind::NightCrickets => "night_crickets",
        }
    }

    /// Pulse layers are made of bursts rather than filtered noise.
    pub fn is_pulsed(self) -> bool {
        matches!(self, SoundKind::Birds | SoundKind::NightCrickets)
    }
}

impl fmt::Display for SoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SoundKind {
    type Err = UnknownSound;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SoundKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownSound(s.to_owned()))
    }
}

/// Optional per-layer tweaks. Each applies only where the layer has the
/// matching element (primary filter, LFO).
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cutoff: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lfo_rate: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lfo_depth: Option<f32>,
}

impl LayerOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Sound type tag. Kept as a string so unknown tags survive parsing.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain: Option<f32>,
    #[serde(flatten)]
    pub overrides: LayerOverrides,
}

impl LayerSpec {
    pub fn new(kind: impl Into<String>, gain: f32) -> Self {
        Self { kind: kind.into(), gain: Some(gain), overrides: LayerOverrides::default() }
    }

    pub fn with_overrides(mut self, overrides: LayerOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Requested gain, defaulting to 0.5. Not yet clamped.
    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain.unwrap_or(DEFAULT_LAYER_GAIN)
    }

    pub fn sound_kind(&self) -> Result<SoundKind, UnknownSound> {
        self.kind.parse()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_volume: Option<f32>,
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
}

impl Recipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn with_master_volume(mut self, v: f32) -> Self {
        self.master_volume = Some(v);
        self
    }

    pub fn with_layer(mut self, kind: impl Into<String>, gain: f32) -> Self {
        self.layers.push(LayerSpec::new(kind, gain));
        self
    }
}
