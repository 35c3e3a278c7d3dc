use serde::Deserialize;

/// Policy used to combine the background and foreground layers of a slice view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompositeMode {
    #[default]
    Alpha,
    ReverseAlpha,
    Add,
    Subtract,
}

impl CompositeMode {
    /// Maps a stored compositing index to a mode. Unknown values fall back to
    /// [`CompositeMode::Alpha`].
    pub fn from_index(index: i32) -> Self {
        match index {
            1 => Self::ReverseAlpha,
            2 => Self::Add,
            3 => Self::Subtract,
            _ => Self::Alpha,
        }
    }
}

/// Role of an image layer inside a slice view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerRole {
    Background,
    Foreground,
    Label,
}

/// How the sampling raster of the slice texture (UVW space) is sized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SliceResolutionMode {
    #[default]
    Match2DView,
    MatchVolumes,
    FOVMatch2DViewSpacingMatchVolumes,
    FOVMatchVolumesSpacingMatch2DView,
}

/// Axis-aligned anatomical orientations of a slice plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

/// Voxel interpolation requested from a [`crate::resampler::VolumeResampler`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InterpolationKind {
    NearestNeighbor,
    #[default]
    Linear,
}

/// Scalar volumes are interpolated smoothly, label maps keep discrete values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VolumeKind {
    #[default]
    Scalar,
    Label,
}

/// Thick-slab reconstruction operator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlabMode {
    #[default]
    Max,
    Min,
    Mean,
    Sum,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}
