//! # DICOM-reslice library
//!
//! This crate computes what an interactive slice viewer needs to show DICOM
//! volumes on arbitrary planes, and "unrolls" curved anatomy into straight
//! volumes (curved planar reformation, CPR).
//!
//! It is built on the dicom-rs ecosystem: volumes are loaded from a folder of
//! ".dcm" files (or from [`FileDicomObject<InMemDicomObject>`]s) together
//! with their placement in patient space. On top of that the crate provides:
//!
//!  - Layer blending: the ordered (source, weight) pipeline that composites
//!    the background, foreground and label layers of a slice view under the
//!    Alpha, ReverseAlpha, Add and Subtract policies ([`blend`]).
//!  - Slice geometry: slice spacing and bounds in slice space, field-of-view
//!    fitting, snapping the slice offset onto voxel centres, slice-number
//!    lookup and sizing of the texture raster ([`slice_logic`]).
//!  - Curve straightening: a displacement-grid transform that maps a straight
//!    box onto a curved structure, resampling of a volume through it and
//!    panoramic mean-intensity projections ([`straighten`]).
//!
//! Geometry is expressed with nalgebra matrices, voxel rasters with ndarray.
//! Resampling goes through the [`resampler::VolumeResampler`] trait; the
//! bundled [`resampler::CpuResampler`] processes output slices in parallel
//! using rayon.
//!
//! DICOM files are assumed to have the following attributes:
//!   - No multiframe (always the first frame is used)
//!   - Images from the same series (Series Instance UID) and acquisition
//!     (Acquisition Number)
//!
//! # Examples
//!
//! ## Straightening a volume along a curve
//!
//! Load all DICOM files from the dicom/ directory, straighten the volume
//! along a curve given in patient coordinates and save the panoramic
//! projection.
//!
//! ```no_run
//! # use dicom_reslice::{curve::Curve, enums::{Orientation, SortBy}};
//! # use dicom_reslice::resampler::CpuResampler;
//! # use dicom_reslice::straighten::{CurveStraightener, project_volume};
//! # use dicom_reslice::volume_loader::VolumeLoader;
//! # use std::path::PathBuf;
//! let volume = VolumeLoader::load_from_directory(&PathBuf::from("dicom"), SortBy::InstanceNumber)
//!     .expect("should have loaded files from directory");
//! let curve = Curve::from_arrays(&[[0.0, 0.0, 0.0], [5.0, 0.0, 40.0], [0.0, 0.0, 80.0]]);
//!
//! let straightener = CurveStraightener::new(Box::new(CpuResampler));
//! let straightening = straightener
//!     .compute_straightening_transform(&curve, [40.0, 40.0], 1.0, false, 0.0, false)
//!     .expect("should have computed the straightening transform");
//! let straightened = straightener
//!     .straighten_volume(&volume, [0.5, 0.5, 1.0], &straightening.transform)
//!     .expect("should have resampled the volume");
//!
//! let projected = project_volume(&straightened, 0).expect("axis 0 is valid");
//! let image = projected
//!     .get_image_from_axis(0, Orientation::Sagittal)
//!     .expect("should have returned the projection image");
//! image.save("projection.png");
//! ```
//!
//! ## Fitting a slice view to its background
//!
//! ```
//! # use dicom_reslice::{enums::Orientation, volume::Volume};
//! # use dicom_reslice::slice_geometry::{SliceGeometry, SliceIndex};
//! # use dicom_reslice::slice_logic::{SliceLayers, SliceLogic};
//! # use ndarray::Array3;
//! let background = Volume::new(Array3::zeros((20, 64, 64)), [0.8, 0.8, 2.5], [0.0; 3]);
//! let layers = SliceLayers::new(Some(&background));
//!
//! let mut logic = SliceLogic::new(SliceGeometry::new(Orientation::Axial));
//! logic.fit_slice_to_background(&layers, Some([512, 512]));
//! let index = logic.resolve_slice_index_for_layers(logic.slice_offset(), &layers);
//! assert_eq!(index, SliceIndex::Index(11));
//! ```
//!
//! [`FileDicomObject<InMemDicomObject>`]: https://docs.rs/dicom-object/latest/dicom_object/struct.FileDicomObject.html

pub mod blend;
pub mod config;
pub mod curve;
pub mod displacement_grid;
pub mod enums;
mod interpolator;
pub mod math;
pub mod resampler;
pub mod slice_geometry;
pub mod slice_logic;
pub mod straighten;
pub mod volume;
pub mod volume_loader;
