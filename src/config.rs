//! JSON configuration of the `dicom-reslice` command-line tool.

use crate::enums::SortBy;
use crate::straighten::DEFAULT_SAMPLING_FACTOR;

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Curve needs at least two control points, got {0}")]
    TooFewCurvePoints(usize),
}

#[derive(Debug, Deserialize)]
pub struct ReformatConfig {
    pub input: InputConfig,
    pub curve: CurveConfig,
    #[serde(default)]
    pub straightening: StraighteningConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct InputConfig {
    /// Directory holding the `.dcm` files of one series.
    pub directory: PathBuf,
    #[serde(default)]
    pub sort_by: SortBy,
}

#[derive(Debug, Deserialize)]
pub struct CurveConfig {
    /// Control points in world millimetres.
    pub points: Vec<[f64; 3]>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StraighteningConfig {
    /// In-plane size of the straightened volume in mm.
    pub slice_size_mm: [f64; 2],
    /// Voxel spacing of the straightened volume in mm.
    pub output_spacing_mm: [f64; 3],
    /// Keep the curve's in-plane length instead of straightening along its chord.
    pub stretching: bool,
    /// Rotation of the in-plane axes about the curve axis in degrees.
    pub rotation_deg: f64,
    pub sampling_factor: f64,
}

impl Default for StraighteningConfig {
    fn default() -> Self {
        Self {
            slice_size_mm: [40.0, 40.0],
            output_spacing_mm: [0.5, 0.5, 1.0],
            stretching: false,
            rotation_deg: 0.0,
            sampling_factor: DEFAULT_SAMPLING_FACTOR,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub projection_image: PathBuf,
    /// Optional JSON summary of the straightened volume.
    pub summary_json: Option<PathBuf>,
    /// IJK axis of the straightened volume averaged by the projection.
    pub projection_axis: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            projection_image: PathBuf::from("projection.png"),
            summary_json: None,
            projection_axis: 0,
        }
    }
}

pub fn parse_config(data: &str, path: &Path) -> Result<ReformatConfig, ConfigError> {
    let config: ReformatConfig = serde_json::from_str(data).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    if config.curve.points.len() < 2 {
        return Err(ConfigError::TooFewCurvePoints(config.curve.points.len()));
    }
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<ReformatConfig, ConfigError> {
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&data, path)
}
