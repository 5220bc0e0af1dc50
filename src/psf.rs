/*!
# PSF engine

Under the Fraunhofer approximation the image plane intensity is the squared
magnitude of the Fourier transform of the pupil field. The engine transforms
the [`PupilFunction`], moves the zero frequency to the grid center, normalizes
the intensity to unit energy and optionally crops it.

## Cropping

With [`EngineConfig::crop_energy`] set, the kernel is cut down to the smallest
centered odd window `(2h+1)²` around the optical axis `(⌊N/2⌋, ⌊N/2⌋)` that
retains at least that fraction of the energy. The cropped kernel is
renormalized and keeps the retained fraction in
[`PsfKernel::retained_energy`]. If no centered odd window inside the grid meets
the target, the full grid is kept, so cropping never loses more energy than
requested.
*/

use std::time::Instant;

use ndarray::{s, Array2, ArrayView2};
use rustfft::{FftDirection, FftPlanner};

use crate::{
    fft::{fftshift, ifftshift, Fft2},
    EngineConfig, Error, PsfParameters, PupilFunction, PupilModel, Result, Sampling,
};

/// Largest distance of a user kernel sum from 1
pub const NORMALIZATION_TOLERANCE: f64 = 1e-6;

/// Normalized, non-negative blur kernel
#[derive(Debug, Clone, PartialEq)]
pub struct PsfKernel {
    data: Array2<f64>,
    sampling: Option<Sampling>,
    retained_energy: f64,
}
impl PsfKernel {
    /// Wraps an array that is already a valid kernel
    pub fn from_array(data: Array2<f64>) -> Result<Self> {
        let this = Self {
            data,
            sampling: None,
            retained_energy: 1.0,
        };
        this.check()?;
        Ok(this)
    }
    /// Divides a non-negative array by its sum
    pub fn normalized(data: Array2<f64>) -> Result<Self> {
        let this = Self {
            data: normalize(data)?,
            sampling: None,
            retained_energy: 1.0,
        };
        this.check()?;
        Ok(this)
    }
    /// A kernel with all its energy in a single center sample
    pub fn identity(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::invalid("size", "an identity kernel needs one sample"));
        }
        let mut data = Array2::zeros((size, size));
        data[[size / 2, size / 2]] = 1.0;
        Self::from_array(data)
    }
    pub(crate) fn with_sampling(self, sampling: Option<Sampling>) -> Self {
        Self { sampling, ..self }
    }
    /// Checks that the samples are finite, non-negative and sum to 1
    pub fn check(&self) -> Result<()> {
        if self.data.is_empty() {
            return Err(Error::InvalidKernel("the kernel is empty".into()));
        }
        if let Some(((i, j), value)) = self
            .data
            .indexed_iter()
            .find(|(_, v)| !(v.is_finite() && **v >= 0.0))
        {
            return Err(Error::InvalidKernel(format!(
                "sample ({i},{j}) is {value}, samples must be finite and non-negative"
            )));
        }
        let sum = self.data.sum();
        if (sum - 1.0).abs() > NORMALIZATION_TOLERANCE {
            return Err(Error::InvalidKernel(format!(
                "the samples sum to {sum}, not to 1"
            )));
        }
        Ok(())
    }
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }
    pub fn into_array(self) -> Array2<f64> {
        self.data
    }
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }
    /// Sample of the optical axis
    pub fn center(&self) -> (usize, usize) {
        let (rows, cols) = self.data.dim();
        (rows / 2, cols / 2)
    }
    pub fn sum(&self) -> f64 {
        self.data.sum()
    }
    pub fn peak(&self) -> f64 {
        self.data.iter().copied().fold(0.0, f64::max)
    }
    /// Sampling of the optics the kernel was computed for
    pub fn sampling(&self) -> Option<&Sampling> {
        self.sampling.as_ref()
    }
    /// Energy fraction of the uncropped kernel kept by the window
    pub fn retained_energy(&self) -> f64 {
        self.retained_energy
    }
}

pub(crate) fn normalize(mut data: Array2<f64>) -> Result<Array2<f64>> {
    let energy = data.sum();
    if !energy.is_finite() || energy <= f64::MIN_POSITIVE {
        return Err(Error::DegenerateKernel { energy });
    }
    data.mapv_inplace(|x| x / energy);
    Ok(data)
}

/// Pupil to kernel transform
#[derive(Debug, Clone, Default)]
pub struct PsfEngine {
    config: EngineConfig,
}
impl PsfEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
    /// Computes the kernel of the imaging system described by `params`
    pub fn compute(&self, params: &PsfParameters) -> Result<PsfKernel> {
        self.config.validate()?;
        let pupil = PupilModel::new(params, &self.config)?.build();
        self.kernel(&pupil)
    }
    /// Transforms a pupil function into its normalized (and optionally cropped) kernel
    pub fn kernel(&self, pupil: &PupilFunction) -> Result<PsfKernel> {
        self.config.validate()?;
        let now = Instant::now();
        let shape = pupil.data().dim();
        let mut field = ifftshift(pupil.data());
        let mut planner = FftPlanner::new();
        Fft2::new(&mut planner, shape, FftDirection::Forward).process(&mut field);
        let intensity = fftshift(&field.mapv(|f| f.norm_sqr()));
        let data = normalize(intensity)?;
        log::debug!(
            "{}x{} PSF computed in {:.3}ms",
            shape.0,
            shape.1,
            now.elapsed().as_secs_f64() * 1e3
        );
        let kernel = PsfKernel {
            data,
            sampling: Some(*pupil.sampling()),
            retained_energy: 1.0,
        };
        match self.config.crop_energy {
            Some(fraction) => crop(kernel, fraction),
            None => Ok(kernel),
        }
    }
    /// Strehl ratio of the aberrations in `params`
    pub fn strehl_ratio(&self, params: &PsfParameters) -> Result<f64> {
        Ok(PupilModel::new(params, &self.config)?.build().strehl_ratio())
    }
}

/// Summed-area table with a leading row and column of zeros
fn summed_area(data: &Array2<f64>) -> Array2<f64> {
    let (rows, cols) = data.dim();
    let mut table = Array2::zeros((rows + 1, cols + 1));
    for i in 0..rows {
        let mut row_sum = 0.0;
        for j in 0..cols {
            row_sum += data[[i, j]];
            table[[i + 1, j + 1]] = table[[i, j + 1]] + row_sum;
        }
    }
    table
}

fn crop(kernel: PsfKernel, fraction: f64) -> Result<PsfKernel> {
    let (rows, cols) = kernel.dim();
    let (ci, cj) = kernel.center();
    let h_max = ci.min(rows - 1 - ci).min(cj).min(cols - 1 - cj);
    let table = summed_area(&kernel.data);
    let window_energy = |h: usize| {
        let (i0, i1, j0, j1) = (ci - h, ci + h + 1, cj - h, cj + h + 1);
        table[[i1, j1]] - table[[i0, j1]] - table[[i1, j0]] + table[[i0, j0]]
    };
    let Some(h) = (0..=h_max).find(|&h| window_energy(h) >= fraction) else {
        log::debug!(
            "no centered odd window retains {fraction} of the energy, keeping the {rows}x{cols} grid"
        );
        return Ok(kernel);
    };
    let retained = window_energy(h);
    log::debug!(
        "PSF cropped to {size}x{size}, retaining {retained:.6} of the energy",
        size = 2 * h + 1
    );
    let window = kernel
        .data
        .slice(s![ci - h..=ci + h, cj - h..=cj + h])
        .to_owned();
    Ok(PsfKernel {
        data: normalize(window)?,
        sampling: kernel.sampling,
        retained_energy: retained,
    })
}
