mod common;

use common::init_logging;
use dicom_reslice::blend::{
    BlendCache, BlendInput, BlendRequest, BlendUpdate, Layer, LayerBlender, SliceCompositor, SourceId,
};
use dicom_reslice::enums::{CompositeMode, LayerRole, SliceResolutionMode};

const MODES: [CompositeMode; 4] = [
    CompositeMode::Alpha,
    CompositeMode::ReverseAlpha,
    CompositeMode::Add,
    CompositeMode::Subtract,
];

#[test]
fn alpha_blends_background_then_foreground() {
    init_logging();
    let layers = [
        Layer::new(SourceId(1), 1.0, LayerRole::Background),
        Layer::new(SourceId(2), 0.4, LayerRole::Foreground),
    ];
    let request = BlendRequest::from_layers(&layers, CompositeMode::Alpha, true);
    let pipeline = LayerBlender::build(&request);
    assert_eq!(pipeline.sources(), vec![(SourceId(1), 1.0), (SourceId(2), 0.4)]);
    assert!(pipeline.clip_to_background);
}

#[test]
fn add_without_foreground_falls_back_to_alpha() {
    init_logging();
    for mode in [CompositeMode::Add, CompositeMode::Subtract] {
        let background_only = BlendRequest {
            background: Some(SourceId(1)),
            mode,
            ..BlendRequest::default()
        };
        let pipeline = LayerBlender::build(&background_only);
        assert_eq!(pipeline.sources(), vec![(SourceId(1), 1.0)]);

        let foreground_only = BlendRequest {
            foreground: Some(SourceId(2)),
            foreground_opacity: 0.7,
            mode,
            ..BlendRequest::default()
        };
        let alpha = BlendRequest {
            mode: CompositeMode::Alpha,
            ..foreground_only
        };
        assert_eq!(LayerBlender::build(&foreground_only), LayerBlender::build(&alpha));
    }
}

#[test]
fn label_is_always_the_last_stage() {
    init_logging();
    let presence = [(true, true), (true, false), (false, true), (false, false)];
    for mode in MODES {
        for (has_background, has_foreground) in presence {
            let request = BlendRequest {
                background: has_background.then_some(SourceId(1)),
                foreground: has_foreground.then_some(SourceId(2)),
                label: Some(SourceId(3)),
                foreground_opacity: 0.5,
                label_opacity: 0.25,
                mode,
                clip_to_background: false,
            };
            let pipeline = LayerBlender::build(&request);
            let last = pipeline.stages.last().expect("label stage");
            assert_eq!(last.input, BlendInput::Source(SourceId(3)), "{mode:?}");
            assert_eq!(last.weight, 0.25);
        }
    }
}

#[test]
fn subtract_combines_both_sources_in_one_stage() {
    init_logging();
    let request = BlendRequest {
        background: Some(SourceId(1)),
        foreground: Some(SourceId(2)),
        foreground_opacity: 0.3,
        mode: CompositeMode::Subtract,
        clip_to_background: false,
        ..BlendRequest::default()
    };
    let pipeline = LayerBlender::build(&request);
    assert_eq!(pipeline.stages.len(), 1);
    let BlendInput::Combined(combined) = pipeline.stages[0].input else {
        panic!("expected a combined stage");
    };
    assert_eq!(combined.foreground_fraction, 0.3);
    assert_eq!(combined.alpha_weights, [0.5, 0.5]);
}

#[test]
fn cache_rebuilds_only_on_structural_change() {
    init_logging();
    let mut cache = BlendCache::new();
    let mut request = BlendRequest {
        background: Some(SourceId(1)),
        foreground: Some(SourceId(2)),
        foreground_opacity: 0.2,
        ..BlendRequest::default()
    };
    assert_eq!(cache.update(&request), BlendUpdate::Rebuilt);
    assert_eq!(cache.update(&request), BlendUpdate::Unchanged);

    request.foreground_opacity = 0.9;
    assert_eq!(cache.update(&request), BlendUpdate::WeightsUpdated);
    assert_eq!(cache.pipeline().sources()[1], (SourceId(2), 0.9));

    request.mode = CompositeMode::ReverseAlpha;
    assert_eq!(cache.update(&request), BlendUpdate::Rebuilt);
    assert_eq!(cache.rebuilds(), 2);
}

#[test]
fn compositor_picks_texture_blend_by_resolution_mode() {
    init_logging();
    let mut compositor = SliceCompositor::new();
    let xy = BlendRequest {
        background: Some(SourceId(1)),
        label: Some(SourceId(9)),
        ..BlendRequest::default()
    };
    assert!(compositor.update(&xy, &BlendRequest::default()));
    assert!(!compositor.update(&xy, &BlendRequest::default()));

    assert!(compositor.texture_pipeline(SliceResolutionMode::Match2DView).is_some());
    assert!(compositor.texture_pipeline(SliceResolutionMode::MatchVolumes).is_none());
    assert!(!compositor.interpolate_texture());
}

#[test]
fn unknown_stored_mode_composites_as_alpha() {
    init_logging();
    let layers = [
        Layer::new(SourceId(1), 1.0, LayerRole::Background),
        Layer::new(SourceId(2), 0.6, LayerRole::Foreground),
        Layer::new(SourceId(3), 0.5, LayerRole::Label),
    ];
    let stored = BlendRequest::from_layers(&layers, CompositeMode::from_index(7), true);
    let alpha = BlendRequest::from_layers(&layers, CompositeMode::Alpha, true);
    assert_eq!(LayerBlender::build(&stored), LayerBlender::build(&alpha));
    assert_eq!(
        LayerBlender::build(&stored).sources(),
        vec![(SourceId(1), 1.0), (SourceId(2), 0.6), (SourceId(3), 0.5)]
    );
}

#[test]
fn reverse_alpha_background_uses_composite_opacity() {
    init_logging();
    let layers = [Layer::new(SourceId(1), 1.0, LayerRole::Background)];
    let from_layers = BlendRequest::from_layers(&layers, CompositeMode::ReverseAlpha, true);
    assert_eq!(LayerBlender::build(&from_layers).sources(), vec![(SourceId(1), 1.0)]);

    let with_opacity = from_layers.with_foreground_opacity(0.3);
    assert_eq!(LayerBlender::build(&with_opacity).sources(), vec![(SourceId(1), 0.3)]);
}
