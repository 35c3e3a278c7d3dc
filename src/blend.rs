//! Layer compositing for slice views.
//!
//! A slice view shows up to three layers (background, foreground, label).
//! [`LayerBlender::build`] turns the layers and a [`CompositeMode`] into an
//! ordered list of `(input, weight)` stages that a renderer composites one
//! after the other. [`BlendCache`] keeps the last pipeline and only rebuilds it
//! when its structure changes.

use crate::enums::{CompositeMode, LayerRole, SliceResolutionMode};

use image::{Rgba, RgbaImage};
use log::debug;

/// Opaque handle of an image source owned by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u32);

/// An image source with its opacity and the role it plays in the view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Layer {
    pub source: SourceId,
    pub opacity: f64,
    pub role: LayerRole,
}

impl Layer {
    pub fn new(source: SourceId, opacity: f64, role: LayerRole) -> Self {
        Self {
            source,
            opacity,
            role,
        }
    }
}

/// Everything that determines a blend pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlendRequest {
    pub background: Option<SourceId>,
    pub foreground: Option<SourceId>,
    pub label: Option<SourceId>,
    pub foreground_opacity: f64,
    pub label_opacity: f64,
    pub mode: CompositeMode,
    pub clip_to_background: bool,
}

impl Default for BlendRequest {
    fn default() -> Self {
        Self {
            background: None,
            foreground: None,
            label: None,
            foreground_opacity: 1.0,
            label_opacity: 1.0,
            mode: CompositeMode::Alpha,
            clip_to_background: true,
        }
    }
}

impl BlendRequest {
    /// Picks the first layer of every role. The background opacity is not
    /// used: the background is always the base of the composite.
    ///
    /// The foreground opacity is taken from the foreground layer and is 1.0
    /// when there is none. ReverseAlpha weighs the background with it even
    /// without a foreground, so callers holding a composite opacity set it
    /// with [`Self::with_foreground_opacity`].
    pub fn from_layers(layers: &[Layer], mode: CompositeMode, clip_to_background: bool) -> Self {
        let find = |role| layers.iter().find(|layer| layer.role == role);
        let foreground = find(LayerRole::Foreground);
        let label = find(LayerRole::Label);
        Self {
            background: find(LayerRole::Background).map(|l| l.source),
            foreground: foreground.map(|l| l.source),
            label: label.map(|l| l.source),
            foreground_opacity: foreground.map_or(1.0, |l| l.opacity),
            label_opacity: label.map_or(1.0, |l| l.opacity),
            mode,
            clip_to_background,
        }
    }

    pub fn with_foreground_opacity(mut self, opacity: f64) -> Self {
        self.foreground_opacity = opacity;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arithmetic {
    Add,
    Subtract,
}

/// Background and foreground merged arithmetically into a single RGBA input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CombinedLayer {
    pub background: SourceId,
    pub foreground: SourceId,
    pub operation: Arithmetic,
    /// Factor applied to the foreground before it is added or subtracted.
    pub foreground_fraction: f64,
    /// Weights of the background and foreground alpha channels.
    pub alpha_weights: [f64; 2],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BlendInput {
    Source(SourceId),
    Combined(CombinedLayer),
}

impl BlendInput {
    /// Same upstream sources in the same arrangement, ignoring weights.
    fn same_structure(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Source(a), Self::Source(b)) => a == b,
            (Self::Combined(a), Self::Combined(b)) => {
                a.background == b.background
                    && a.foreground == b.foreground
                    && a.operation == b.operation
            }
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlendStage {
    pub input: BlendInput,
    pub weight: f64,
}

/// Ordered stages plus the clipping mode of the final blend.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlendPipeline {
    pub stages: Vec<BlendStage>,
    pub clip_to_background: bool,
}

impl BlendPipeline {
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// `(source, weight)` pairs for the plain source stages.
    pub fn sources(&self) -> Vec<(SourceId, f64)> {
        self.stages
            .iter()
            .filter_map(|stage| match stage.input {
                BlendInput::Source(id) => Some((id, stage.weight)),
                BlendInput::Combined(_) => None,
            })
            .collect()
    }

    pub fn same_structure(&self, other: &Self) -> bool {
        self.stages.len() == other.stages.len()
            && self
                .stages
                .iter()
                .zip(&other.stages)
                .all(|(a, b)| a.input.same_structure(&b.input))
    }
}

pub struct LayerBlender;

impl LayerBlender {
    /// Builds the stage list for `request`.
    ///
    /// Add and Subtract need both background and foreground; with either one
    /// missing the request is composited as Alpha. The label layer is always
    /// the last stage.
    pub fn build(request: &BlendRequest) -> BlendPipeline {
        let mut mode = request.mode;
        if matches!(mode, CompositeMode::Add | CompositeMode::Subtract)
            && (request.background.is_none() || request.foreground.is_none())
        {
            debug!("{mode:?} compositing needs background and foreground, using Alpha");
            mode = CompositeMode::Alpha;
        }

        let mut stages = Vec::with_capacity(3);
        let mut push = |input, weight| stages.push(BlendStage { input, weight });
        match mode {
            CompositeMode::Alpha => {
                if let Some(bg) = request.background {
                    push(BlendInput::Source(bg), 1.0);
                }
                if let Some(fg) = request.foreground {
                    push(BlendInput::Source(fg), request.foreground_opacity);
                }
            }
            CompositeMode::ReverseAlpha => {
                if let Some(fg) = request.foreground {
                    push(BlendInput::Source(fg), 1.0);
                }
                if let Some(bg) = request.background {
                    push(BlendInput::Source(bg), request.foreground_opacity);
                }
            }
            CompositeMode::Add | CompositeMode::Subtract => {
                if let (Some(background), Some(foreground)) = (request.background, request.foreground) {
                    let operation = if mode == CompositeMode::Add {
                        Arithmetic::Add
                    } else {
                        Arithmetic::Subtract
                    };
                    let alpha_weights = if request.clip_to_background {
                        [1.0, 0.0]
                    } else {
                        [0.5, 0.5]
                    };
                    push(
                        BlendInput::Combined(CombinedLayer {
                            background,
                            foreground,
                            operation,
                            foreground_fraction: request.foreground_opacity,
                            alpha_weights,
                        }),
                        1.0,
                    );
                }
            }
        }

        if let Some(label) = request.label {
            push(BlendInput::Source(label), request.label_opacity);
        }

        BlendPipeline {
            stages,
            clip_to_background: request.clip_to_background,
        }
    }
}

/// What [`BlendCache::update`] had to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendUpdate {
    /// Same request as last time.
    Unchanged,
    /// Same inputs in the same order; only weights or clipping changed.
    WeightsUpdated,
    /// The input list changed and the pipeline was rebuilt.
    Rebuilt,
}

impl BlendUpdate {
    pub fn is_modified(self) -> bool {
        self != Self::Unchanged
    }
}

/// Last request and pipeline of one blend.
#[derive(Debug, Default)]
pub struct BlendCache {
    request: Option<BlendRequest>,
    pipeline: BlendPipeline,
    rebuilds: usize,
}

impl BlendCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pipeline(&self) -> &BlendPipeline {
        &self.pipeline
    }

    pub fn request(&self) -> Option<&BlendRequest> {
        self.request.as_ref()
    }

    /// Number of structural rebuilds since creation.
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    pub fn update(&mut self, request: &BlendRequest) -> BlendUpdate {
        if self.request.as_ref() == Some(request) {
            return BlendUpdate::Unchanged;
        }
        let pipeline = LayerBlender::build(request);
        let outcome = if self.request.is_some() && pipeline.same_structure(&self.pipeline) {
            for (stage, updated) in self.pipeline.stages.iter_mut().zip(&pipeline.stages) {
                *stage = *updated;
            }
            self.pipeline.clip_to_background = pipeline.clip_to_background;
            BlendUpdate::WeightsUpdated
        } else {
            self.pipeline = pipeline;
            self.rebuilds += 1;
            BlendUpdate::Rebuilt
        };
        self.request = Some(*request);
        debug!("Blend update: {outcome:?}, {} stages", self.pipeline.stages.len());
        outcome
    }
}

/// Screen-space (XY) and texture-space (UVW) blends of one slice view.
#[derive(Debug, Default)]
pub struct SliceCompositor {
    pub xy: BlendCache,
    pub uvw: BlendCache,
}

impl SliceCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates both blends. Returns `true` when either changed.
    pub fn update(&mut self, xy: &BlendRequest, uvw: &BlendRequest) -> bool {
        let xy_modified = self.xy.update(xy).is_modified();
        let uvw_modified = self.uvw.update(uvw).is_modified();
        xy_modified || uvw_modified
    }

    /// Pipeline feeding the slice texture: the screen-space blend when the
    /// texture matches the 2D view, the UVW blend otherwise. `None` when that
    /// blend has no inputs.
    pub fn texture_pipeline(&self, mode: SliceResolutionMode) -> Option<&BlendPipeline> {
        let cache = match mode {
            SliceResolutionMode::Match2DView => &self.xy,
            _ => &self.uvw,
        };
        let pipeline = cache.pipeline();
        (!pipeline.is_empty()).then_some(pipeline)
    }

    /// Texture interpolation would smear label values, so it is disabled
    /// whenever a label layer is shown.
    pub fn interpolate_texture(&self) -> bool {
        self.xy.request().is_none_or(|request| request.label.is_none())
    }
}

/// Raster math of an Add/Subtract stage.
///
/// Colour channels are `background ± trunc(foreground * fraction)`, computed
/// in `i32` and clamped to `0..=255`. The alpha channel blends the two input
/// alphas with `alpha_weights`. Returns `None` when the images differ in size.
pub fn combine_add_subtract(
    background: &RgbaImage,
    foreground: &RgbaImage,
    layer: &CombinedLayer,
) -> Option<RgbaImage> {
    if background.dimensions() != foreground.dimensions() {
        return None;
    }
    let sign = match layer.operation {
        Arithmetic::Add => 1,
        Arithmetic::Subtract => -1,
    };
    let foreground_alpha_weight = layer.alpha_weights[1];
    let (width, height) = background.dimensions();
    Some(RgbaImage::from_fn(width, height, |x, y| {
        let bg = background.get_pixel(x, y).0;
        let fg = foreground.get_pixel(x, y).0;
        let mut out = [0u8; 4];
        for c in 0..3 {
            let scaled = (f64::from(fg[c]) * layer.foreground_fraction) as i32;
            out[c] = (i32::from(bg[c]) + sign * scaled).clamp(0, 255) as u8;
        }
        let alpha = f64::from(bg[3]) * (1.0 - foreground_alpha_weight)
            + f64::from(fg[3]) * foreground_alpha_weight;
        out[3] = alpha.round().clamp(0.0, 255.0) as u8;
        Rgba(out)
    }))
}
