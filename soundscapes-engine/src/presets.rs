//! Tag vocabulary and the tag → layer table used to compose a recipe from
//! keywords (e.g. what a prompt classifier returns).

use crate::recipe::{LayerSpec, Recipe, SoundKind};

pub const AVAILABLE_TAGS: [&str; 11] = [
    "rain", "thunder", "wind", "forest", "birds", "river", "waves", "fireplace", "cafe", "train", "night",
];

/// Layers beyond this are dropped to bound CPU use.
pub const MAX_LAYERS: usize = 8;

pub const BASE_MASTER_VOLUME: f32 = 0.8;

/// Layers contributed by one tag. Unknown tags contribute nothing.
pub fn layers_for_tag(tag: &str) -> &'static [(SoundKind, f32)] {
    match tag {
        "rain" => &[(SoundKind::Rain, 0.7)],
        "thunder" => &[(SoundKind::Thunder, 0.5)],
        "wind" => &[(SoundKind::Wind, 0.6)],
        "forest" => &[(SoundKind::Wind, 0.3), (SoundKind::ForestFloor, 0.3)],
        "birds" => &[(SoundKind::Birds, 0.5)],
        "river" => &[(SoundKind::River, 0.6)],
        "waves" => &[(SoundKind::Waves, 0.6)],
        "fireplace" => &[(SoundKind::Fireplace, 0.5)],
        "cafe" => &[(SoundKind::Cafe, 0.6)],
        "train" => &[(SoundKind::Train, 0.5)],
        "night" => &[(SoundKind::NightCrickets, 0.4)],
        _ => &[],
    }
}

/// Concatenate the layers of every tag in order, capped at [`MAX_LAYERS`].
pub fn recipe_for_tags<I, S>(tags: I) -> Recipe
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let layers = tags
        .into_iter()
        .flat_map(|t| layers_for_tag(t.as_ref().trim()).iter())
        .take(MAX_LAYERS)
        .map(|&(kind, gain)| LayerSpec::new(kind.as_str(), gain))
        .collect();
    Recipe { master_volume: Some(BASE_MASTER_VOLUME), layers }
}
