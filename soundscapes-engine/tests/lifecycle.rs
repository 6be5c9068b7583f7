//! Engine lifecycle driven through a host-pulled output, no audio hardware.

use approx::assert_abs_diff_eq;
use soundscapes_engine::presets::recipe_for_tags;
use soundscapes_engine::{
    Engine, EngineConfig, EngineError, LayerOverrides, LayerSpec, Output, PullHandle, PullOutput, Recipe,
    SoundKind, StreamSpec,
};

const SR: u32 = 8_000;

fn rig() -> (Engine, PullHandle) {
    let out = PullOutput::new(SR, 2);
    let handle = out.handle();
    (Engine::with_config(out, EngineConfig::default().with_seed(42)), handle)
}

fn rain_and_birds() -> Recipe {
    Recipe::from_json(r#"{"layers": [{"type": "rain", "gain": 0.5}, {"type": "birds", "gain": 0.3}]}"#).unwrap()
}

#[test]
fn play_then_stop_leaves_nothing_behind() {
    let (mut e, h) = rig();
    e.play(&rain_and_birds()).unwrap();
    assert_eq!(e.layer_count(), 2);
    assert!(e.pending_timers() > 0);

    e.stop();
    assert_eq!(e.layer_count(), 0);
    assert_eq!(e.pending_timers(), 0);

    h.advance(0.05);
    let t = e.telemetry().unwrap();
    assert_eq!(t.voices(), 0);
    assert!(h.render_frames(256).iter().all(|s| *s == 0.0));
}

#[test]
fn stop_twice_or_before_play_is_a_no_op() {
    let (mut e, _h) = rig();
    e.stop();
    e.stop();
    assert!(!e.has_context());
    e.play(&rain_and_birds()).unwrap();
    e.stop();
    e.stop();
    assert_eq!(e.layer_count(), 0);
    assert_eq!(e.pending_timers(), 0);
}

#[test]
fn rain_and_birds_are_two_independent_layers() {
    let (mut e, h) = rig();
    e.play(&rain_and_birds()).unwrap();

    let layers = e.layers();
    assert_eq!(layers.len(), 2);
    assert_eq!(layers[0].kind, SoundKind::Rain);
    assert_eq!(layers[1].kind, SoundKind::Birds);
    assert_ne!(layers[0].id, layers[1].id);
    assert_abs_diff_eq!(layers[1].gain, 0.3);

    h.advance(0.1);
    assert_eq!(e.telemetry().unwrap().voices(), 2);

    e.stop();
    h.advance(0.01);
    assert_eq!(e.telemetry().unwrap().voices(), 0);
}

#[test]
fn unknown_type_is_skipped_silently() {
    let (mut e, _h) = rig();
    let r = Recipe::new().with_layer("rain", 0.5).with_layer("didgeridoo", 0.9).with_layer("river", 0.5);
    e.play(&r).unwrap();
    assert_eq!(e.layer_count(), 2);

    e.play(&Recipe::new().with_layer("didgeridoo", 0.9)).unwrap();
    assert_eq!(e.layer_count(), 0);
}

#[test]
fn second_recipe_replaces_the_first_immediately() {
    let (mut e, h) = rig();
    e.play(&Recipe::new().with_master_volume(1.0).with_layer("rain", 1.0)).unwrap();
    h.advance(0.2);
    assert!(h.render_frames(256).iter().any(|s| *s != 0.0));

    // nothing from the first recipe may reach the very first block after the switch
    e.play(&Recipe::new().with_master_volume(1.0)).unwrap();
    assert!(h.render_frames(256).iter().all(|s| *s == 0.0));

    e.play(&Recipe::new().with_layer("fireplace", 0.5)).unwrap();
    h.advance(0.01);
    assert_eq!(e.telemetry().unwrap().voices(), 1);
}

#[test]
fn master_converges_monotonically_without_overshoot() {
    for &g in &[0.0_f32, 0.1, 0.5, 0.8, 1.0] {
        let (mut e, h) = rig();
        e.ensure_context().unwrap();
        let t = e.telemetry().unwrap();
        let start = t.master_level();
        e.set_master_volume(g);

        let mut prev = start;
        for _ in 0..200 {
            h.render_frames(40);
            let level = t.master_level();
            assert!((0.0..=1.0).contains(&level), "level {level} outside [0,1]");
            if g < start {
                assert!(level <= prev + 1e-6, "rose from {prev} to {level} towards {g}");
            } else {
                assert!(level >= prev - 1e-6, "fell from {prev} to {level} towards {g}");
            }
            prev = level;
        }
        // one second is twenty time constants
        assert_abs_diff_eq!(prev, g, epsilon = 1e-4);
        assert_eq!(e.master_volume(), g);
    }
}

#[test]
fn out_of_range_master_is_clamped() {
    let (mut e, h) = rig();
    e.ensure_context().unwrap();
    e.set_master_volume(-3.0);
    h.advance(1.0);
    assert_abs_diff_eq!(e.master_level(), 0.0, epsilon = 1e-4);
    e.set_master_volume(4.0);
    h.advance(1.0);
    assert_abs_diff_eq!(e.master_level(), 1.0, epsilon = 1e-4);
}

#[test]
fn recipe_master_defaults_to_point_eight() {
    let (mut e, h) = rig();
    e.set_master_volume(0.2);
    e.play(&Recipe::new().with_layer("rain", 0.5)).unwrap();
    assert_eq!(e.master_volume(), 0.8);
    h.advance(1.0);
    assert_abs_diff_eq!(e.master_level(), 0.8, epsilon = 1e-4);
}

#[test]
fn birds_chirp_once_time_moves() {
    let (mut e, h) = rig();
    e.play(&Recipe::new().with_master_volume(1.0).with_layer("birds", 1.0)).unwrap();
    let audio = h.render_frames(2_400);
    assert!(audio.iter().any(|s| s.abs() > 0.01));

    let t = e.telemetry().unwrap();
    for _ in 0..50 {
        h.advance(0.1);
        e.poll();
    }
    assert!(t.take_peak() > 0.0);
    assert_eq!(e.pending_timers(), 1);
}

#[test]
fn swells_keep_rearming_while_polled() {
    let (mut e, h) = rig();
    e.play(&Recipe::new().with_layer("waves", 0.6).with_layer("thunder", 0.5)).unwrap();
    assert_eq!(e.pending_timers(), 2);
    for _ in 0..200 {
        h.advance(0.1);
        e.poll();
    }
    assert_eq!(e.pending_timers(), 2);
    let peak = e.telemetry().unwrap().take_peak();
    assert!(peak > 0.0 && peak <= 1.0);
}

#[test]
fn invalid_layer_is_abandoned_and_the_rest_still_play() {
    let (mut e, _h) = rig();
    let bad = LayerSpec::new("wind", 0.5)
        .with_overrides(LayerOverrides { cutoff: Some(f32::NAN), ..Default::default() });
    let r = Recipe { master_volume: None, layers: vec![bad, LayerSpec::new("train", 0.5)] };
    e.play(&r).unwrap();
    let kinds: Vec<_> = e.layers().iter().map(|l| l.kind).collect();
    assert_eq!(kinds, [SoundKind::Train]);
}

#[test]
fn malformed_json_leaves_engine_untouched() {
    let (mut e, _h) = rig();
    e.play(&rain_and_birds()).unwrap();
    assert!(matches!(e.play_json("{ nope"), Err(EngineError::Recipe(_))));
    assert_eq!(e.layer_count(), 2);
}

#[test]
fn tags_compose_a_playable_recipe() {
    let (mut e, _h) = rig();
    e.play(&recipe_for_tags(["forest", "night"])).unwrap();
    let kinds: Vec<_> = e.layers().iter().map(|l| l.kind).collect();
    assert_eq!(kinds, [SoundKind::Wind, SoundKind::ForestFloor, SoundKind::NightCrickets]);
}

#[test]
fn layer_gain_moves_smoothly() {
    let (mut e, h) = rig();
    e.play(&Recipe::new().with_layer("river", 1.0)).unwrap();
    assert!(e.set_layer_gain(0, 0.0));
    h.advance(1.0);
    assert!(h.render_frames(128).iter().all(|s| s.abs() < 1e-3));
    assert_eq!(e.layers()[0].gain, 0.0);
}

struct NoDevice;

impl Output for NoDevice {
    fn prepare(&mut self) -> Result<StreamSpec, EngineError> {
        Err(EngineError::ContextUnavailable { reason: "no audio device".into() })
    }

    fn attach(&mut self, _renderer: soundscapes_engine::graph::Renderer) -> Result<(), EngineError> {
        unreachable!("never prepared")
    }
}

#[test]
fn unavailable_context_is_surfaced() {
    let mut e = Engine::new(NoDevice);
    assert!(matches!(e.ensure_context(), Err(EngineError::ContextUnavailable { .. })));
    assert!(matches!(e.play(&rain_and_birds()), Err(EngineError::ContextUnavailable { .. })));
    assert_eq!(e.layer_count(), 0);
    assert_eq!(e.pending_timers(), 0);
    e.stop();
}
