//! Defocus and astigmatism sweep
//!
//! Computes the PSF of every aberration pair of a grid and writes the
//! Strehl ratio and the kernel metrics to a CSV file, one row per pair.

use std::{path::PathBuf, time::Instant};

use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use psf_engine::{metrics, EngineConfig, PsfEngine, PsfParameters};
use rayon::prelude::*;
use serde::Serialize;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "psf-sweep", about = "PSF metrics versus defocus and astigmatism")]
struct Opt {
    #[structopt(long, default_value = "256")]
    grid_size: usize,
    /// wavelength [micron]
    #[structopt(long, default_value = "0.555")]
    wavelength: f64,
    /// width of the sampled pupil plane [pupil radius]
    #[structopt(long, default_value = "8")]
    aperture_diameter: f64,
    #[structopt(long, default_value = "1")]
    coverage: f64,
    /// largest defocus coefficient [micron]
    #[structopt(long, default_value = "0.5")]
    max_defocus: f64,
    /// largest astigmatism coefficient [micron]
    #[structopt(long, default_value = "0")]
    max_astigmatism: f64,
    /// samples along each aberration axis
    #[structopt(long, default_value = "11")]
    steps: usize,
    #[structopt(long, parse(from_os_str), default_value = "sweep.csv")]
    output: PathBuf,
}

#[derive(Debug, Serialize)]
struct Record {
    #[serde(rename = "defocus [micron]")]
    defocus: f64,
    #[serde(rename = "astigmatism [micron]")]
    astigmatism: f64,
    #[serde(rename = "Strehl ratio")]
    strehl: f64,
    #[serde(rename = "peak/mean")]
    peak_to_mean: f64,
    #[serde(rename = "second moment [px^2]")]
    second_moment: f64,
    #[serde(rename = "Airy core energy")]
    airy_core_energy: Option<f64>,
}

/// `steps` evenly spaced values from 0 to `max`
fn linspace(max: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => vec![],
        1 => vec![0.0],
        n => (0..n).map(|i| max * i as f64 / (n - 1) as f64).collect(),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let optics = PsfParameters::default()
        .grid_size(opt.grid_size)
        .wavelength(opt.wavelength)
        .aperture_diameter(opt.aperture_diameter)
        .pupil_coverage(opt.coverage);
    let astigmatism = if opt.max_astigmatism == 0.0 {
        vec![0.0]
    } else {
        linspace(opt.max_astigmatism, opt.steps)
    };
    let grid: Vec<(f64, f64)> = linspace(opt.max_defocus, opt.steps)
        .into_iter()
        .flat_map(|d| astigmatism.iter().map(move |&a| (d, a)))
        .collect();

    let engine = PsfEngine::new(EngineConfig::default());
    let now = Instant::now();
    let pb = ProgressBar::new(grid.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );
    let records = grid
        .into_par_iter()
        .progress_with(pb)
        .map(|(defocus, astigmatism)| {
            let params = optics.defocus(defocus).astigmatism(astigmatism);
            let kernel = engine.compute(&params)?;
            let summary = metrics::Summary::new(&kernel);
            Ok(Record {
                defocus,
                astigmatism,
                strehl: engine.strehl_ratio(&params)?,
                peak_to_mean: summary.peak_to_mean,
                second_moment: summary.second_moment,
                airy_core_energy: summary.airy_core_energy,
            })
        })
        .collect::<psf_engine::Result<Vec<Record>>>()?;
    log::info!(
        "{} PSFs computed in {:.3}s",
        records.len(),
        now.elapsed().as_secs_f64()
    );

    let mut wtr = csv::Writer::from_path(&opt.output)?;
    for record in &records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    log::info!("sweep saved to {:?}", opt.output);
    Ok(())
}
