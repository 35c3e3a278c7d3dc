use std::{env, error::Error, fs::File, path::Path};

use dicom_reslice::{
    config::{self, ReformatConfig},
    curve::Curve,
    enums::Orientation,
    resampler::CpuResampler,
    straighten::{CurveStraightener, project_volume},
    volume::Volume,
    volume_loader::VolumeLoader,
};
use log::{error, info};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct VolumeSummary {
    extent: [usize; 3],
    spacing: [f64; 3],
    origin: [f64; 3],
    slab_count: usize,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config_path = env::args().nth(1).ok_or_else(usage)?;
    let config = config::load_config(Path::new(&config_path))?;

    let volume = VolumeLoader::load_from_directory(&config.input.directory, config.input.sort_by)?;
    let straightened = straighten(&volume, &config)?;

    let axis = config.output.projection_axis;
    let projected = project_volume(&straightened, axis)?;
    // the projected IJK axis has a single voxel; view the volume across it
    let orientation = match axis {
        0 => Orientation::Sagittal,
        1 => Orientation::Coronal,
        _ => Orientation::Axial,
    };
    let image = projected
        .get_image_from_axis(0, orientation)
        .ok_or("Projected volume has no image")?;
    image.save(&config.output.projection_image)?;
    info!(
        "Saved panoramic projection to {}",
        config.output.projection_image.display()
    );

    if let Some(path) = &config.output.summary_json {
        let summary = VolumeSummary {
            extent: straightened.extent(),
            spacing: straightened.spacing(),
            origin: straightened.origin().into(),
            slab_count: straightened.extent()[2],
        };
        serde_json::to_writer_pretty(File::create(path)?, &summary)?;
        info!("Saved straightened volume summary to {}", path.display());
    }
    Ok(())
}

fn straighten(volume: &Volume, config: &ReformatConfig) -> Result<Volume, Box<dyn Error>> {
    let settings = &config.straightening;
    let curve = Curve::from_arrays(&config.curve.points);
    let straightener = CurveStraightener::new(Box::new(CpuResampler))
        .with_sampling_factor(settings.sampling_factor);
    let straightening = straightener.compute_straightening_transform(
        &curve,
        settings.slice_size_mm,
        settings.output_spacing_mm[2],
        settings.stretching,
        settings.rotation_deg,
        false,
    )?;
    let straightened =
        straightener.straighten_volume(volume, settings.output_spacing_mm, &straightening.transform)?;
    info!("Straightened volume extent {:?}", straightened.extent());
    Ok(straightened)
}

fn usage() -> String {
    "Usage: dicom-reslice <config.json>".to_string()
}
