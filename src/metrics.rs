//! Kernel diagnostics

use serde::Serialize;
use strum_macros::{Display, EnumIter, EnumString};

use crate::{Error, PsfKernel, Result, Sampling};

/// First dark ring radius of the Airy pattern [λ/NA]
const AIRY_FIRST_ZERO: f64 = 0.61;

/// Length units of the image plane coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Units {
    Pixels,
    /// λ/NA
    Canonical,
    Microns,
}
impl Units {
    /// Sample spacing of the kernel in these units
    pub fn step(&self, kernel: &PsfKernel) -> Result<f64> {
        match (self, kernel.sampling()) {
            (Units::Pixels, _) => Ok(1.0),
            (Units::Canonical, Some(sampling)) => Ok(sampling.image_step_canonical),
            (Units::Microns, Some(sampling)) => Ok(sampling.image_step_microns),
            (units, None) => Err(Error::invalid(
                "units",
                format!("{units} coordinates need a kernel computed from optical parameters"),
            )),
        }
    }
}

/// Sections through the kernel center, normalized to the peak
#[derive(Debug, Clone, Serialize)]
pub struct CrossSections {
    pub x_coordinates: Vec<f64>,
    pub x: Vec<f64>,
    pub y_coordinates: Vec<f64>,
    pub y: Vec<f64>,
}

pub fn cross_sections(kernel: &PsfKernel, units: Units) -> Result<CrossSections> {
    let step = units.step(kernel)?;
    let view = kernel.view();
    let (ci, cj) = kernel.center();
    let peak = kernel.peak();
    let coordinates = |n: usize, c: usize| -> Vec<f64> {
        (0..n).map(|k| (k as f64 - c as f64) * step).collect()
    };
    let (rows, cols) = kernel.dim();
    Ok(CrossSections {
        x_coordinates: coordinates(cols, cj),
        x: view.row(ci).iter().map(|v| v / peak).collect(),
        y_coordinates: coordinates(rows, ci),
        y: view.column(cj).iter().map(|v| v / peak).collect(),
    })
}

/// Peak over mean sample value
pub fn peak_to_mean_ratio(kernel: &PsfKernel) -> f64 {
    let mean = kernel.sum() / kernel.view().len() as f64;
    kernel.peak() / mean
}

/// Intensity weighted (row, column) position
pub fn centroid(kernel: &PsfKernel) -> (f64, f64) {
    let sum = kernel.sum();
    let (ri, rj) = kernel
        .view()
        .indexed_iter()
        .fold((0.0, 0.0), |(ri, rj), ((i, j), &v)| {
            (ri + i as f64 * v, rj + j as f64 * v)
        });
    (ri / sum, rj / sum)
}

/// Variances along the rows and the columns about the centroid [pixels²]
pub fn axis_variances(kernel: &PsfKernel) -> (f64, f64) {
    let sum = kernel.sum();
    let (ci, cj) = centroid(kernel);
    let (vi, vj) = kernel
        .view()
        .indexed_iter()
        .fold((0.0, 0.0), |(vi, vj), ((i, j), &v)| {
            let (di, dj) = (i as f64 - ci, j as f64 - cj);
            (vi + di * di * v, vj + dj * dj * v)
        });
    (vi / sum, vj / sum)
}

/// Radial second moment about the centroid [pixels²]
pub fn second_moment(kernel: &PsfKernel) -> f64 {
    let (vi, vj) = axis_variances(kernel);
    vi + vj
}

/// Energy within `radius` pixels of the kernel center
pub fn encircled_energy(kernel: &PsfKernel, radius: f64) -> f64 {
    let (ci, cj) = kernel.center();
    let r2 = radius * radius;
    kernel
        .view()
        .indexed_iter()
        .filter(|((i, j), _)| {
            let (di, dj) = (*i as f64 - ci as f64, *j as f64 - cj as f64);
            di * di + dj * dj <= r2
        })
        .map(|(_, v)| v)
        .sum::<f64>()
        / kernel.sum()
}

/// Headline numbers of a kernel
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Summary {
    pub rows: usize,
    pub cols: usize,
    pub peak: f64,
    pub peak_to_mean: f64,
    pub second_moment: f64,
    pub retained_energy: f64,
    /// energy inside the diffraction-limited first dark ring
    pub airy_core_energy: Option<f64>,
    pub sampling: Option<Sampling>,
}
impl Summary {
    pub fn new(kernel: &PsfKernel) -> Self {
        let (rows, cols) = kernel.dim();
        Self {
            rows,
            cols,
            peak: kernel.peak(),
            peak_to_mean: peak_to_mean_ratio(kernel),
            second_moment: second_moment(kernel),
            retained_energy: kernel.retained_energy(),
            airy_core_energy: kernel.sampling().map(|sampling| {
                encircled_energy(kernel, AIRY_FIRST_ZERO / sampling.image_step_canonical)
            }),
            sampling: kernel.sampling().copied(),
        }
    }
}
