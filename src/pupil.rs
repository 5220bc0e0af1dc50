/*!
# Pupil model

The pupil function P = A(ρ) exp(i φ(ρ,θ)) is sampled on a centered N×N grid
with the aperture edge at unit radius. The amplitude A is a clear disk of
radius `pupil_coverage`, the phase is φ = (2π/λ) W with the wavefront W the sum
of the model [`PhaseTerm`]s.
*/

use std::f64::consts::PI;

use ndarray::Array2;
use rustfft::num_complex::Complex64;

use crate::{EngineConfig, PsfParameters, Result, Sampling};

/// Complex samples held by one computation: the pupil and the transformed field
const COMPLEX_ARRAYS: usize = 2;

/// An additive wavefront aberration
pub trait PhaseTerm: Send + Sync {
    /// Wavefront error at normalized pupil radius `rho` and azimuth `theta`,
    /// in the length units of the wavelength
    fn wavefront(&self, rho: f64, theta: f64) -> f64;
}

/// Defocus: W = c ρ²
#[derive(Debug, Clone, Copy)]
pub struct Defocus(pub f64);
impl PhaseTerm for Defocus {
    fn wavefront(&self, rho: f64, _theta: f64) -> f64 {
        self.0 * rho * rho
    }
}

/// Astigmatism along the x axis: W = c ρ² cos 2θ
#[derive(Debug, Clone, Copy)]
pub struct Astigmatism(pub f64);
impl PhaseTerm for Astigmatism {
    fn wavefront(&self, rho: f64, theta: f64) -> f64 {
        self.0 * rho * rho * (2.0 * theta).cos()
    }
}

/// Builder of the pupil function of one parameter set
pub struct PupilModel {
    params: PsfParameters,
    terms: Vec<Box<dyn PhaseTerm>>,
}
impl PupilModel {
    /// Validates the parameters and the memory footprint, nothing is allocated on failure
    pub fn new(params: &PsfParameters, config: &EngineConfig) -> Result<Self> {
        params.validate(config)?;
        let n = params.grid_size;
        config.check_memory(
            n,
            n,
            COMPLEX_ARRAYS * std::mem::size_of::<Complex64>() + std::mem::size_of::<f64>(),
        )?;
        let mut terms: Vec<Box<dyn PhaseTerm>> = Vec::new();
        if params.defocus_coefficient != 0.0 {
            terms.push(Box::new(Defocus(params.defocus_coefficient)));
        }
        if params.astigmatism_coefficient != 0.0 {
            terms.push(Box::new(Astigmatism(params.astigmatism_coefficient)));
        }
        Ok(Self {
            params: *params,
            terms,
        })
    }
    /// Adds a wavefront term to the model
    pub fn with_term<T: PhaseTerm + 'static>(mut self, term: T) -> Self {
        self.terms.push(Box::new(term));
        self
    }
    pub fn params(&self) -> &PsfParameters {
        &self.params
    }
    /// Total wavefront at (ρ,θ)
    pub fn wavefront(&self, rho: f64, theta: f64) -> f64 {
        self.terms.iter().map(|t| t.wavefront(rho, theta)).sum()
    }
    /// Samples the pupil function
    pub fn build(&self) -> PupilFunction {
        let sampling = self.params.sampling();
        let n = self.params.grid_size;
        let half = (n / 2) as f64;
        let k = 2.0 * PI / self.params.wavelength;
        let coverage = self.params.pupil_coverage;
        if 2.0 * coverage > self.params.aperture_diameter {
            log::debug!(
                "clear aperture of radius {coverage} cut off by the {} wide pupil plane",
                self.params.aperture_diameter
            );
        }
        let mut transmissive = 0;
        let data = Array2::from_shape_fn((n, n), |(i, j)| {
            let x = (j as f64 - half) * sampling.pupil_step;
            let y = (i as f64 - half) * sampling.pupil_step;
            let rho = x.hypot(y);
            if rho <= coverage {
                transmissive += 1;
                let theta = y.atan2(x);
                Complex64::from_polar(1.0, k * self.wavefront(rho, theta))
            } else {
                Complex64::new(0.0, 0.0)
            }
        });
        PupilFunction {
            data,
            transmissive,
            sampling,
        }
    }
}

/// Sampled complex pupil function
#[derive(Debug, Clone)]
pub struct PupilFunction {
    data: Array2<Complex64>,
    transmissive: usize,
    sampling: Sampling,
}
impl PupilFunction {
    pub fn data(&self) -> &Array2<Complex64> {
        &self.data
    }
    pub fn grid_size(&self) -> usize {
        self.data.nrows()
    }
    /// Number of samples inside the clear aperture
    pub fn transmissive_samples(&self) -> usize {
        self.transmissive
    }
    pub fn sampling(&self) -> &Sampling {
        &self.sampling
    }
    /// Transmitted intensity |P|²
    pub fn intensity(&self) -> Array2<f64> {
        self.data.mapv(|p| p.norm_sqr())
    }
    /// Aberrated over diffraction-limited on-axis intensity, |Σ P|² / M²
    pub fn strehl_ratio(&self) -> f64 {
        if self.transmissive == 0 {
            return 0.0;
        }
        let m = self.transmissive as f64;
        self.data.sum().norm_sqr() / (m * m)
    }
}
