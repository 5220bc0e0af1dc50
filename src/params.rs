use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::{EngineConfig, Error, Result};

/// First dark ring diameter of the Airy pattern [λ/NA]
const AIRY_CORE_DIAMETER: f64 = 1.22;

/// Quantity the sampling of a parameter set is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum SamplingSource {
    ApertureDiameter,
    PupilStep,
    ObjectStep,
    ImageStep,
}

/// Length units of an image or object plane step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum StepUnits {
    /// λ/NA
    Canonical,
    Microns,
}

/// Imaging system parameters of one PSF computation
///
/// Lengths in micrometers except `aperture_diameter`, the full width of the
/// sampled pupil plane in pupil radius units (the aperture edge is at radius 1).
/// Below 2 the grid is narrower than the aperture and cuts the disk off.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PsfParameters {
    /// side of the square sampling grid
    pub grid_size: usize,
    /// wavelength [μm]
    pub wavelength: f64,
    /// width of the sampled pupil plane [pupil radius]
    pub aperture_diameter: f64,
    pub magnification: f64,
    /// image-side numerical aperture
    pub numerical_aperture: f64,
    /// defocus wavefront coefficient [μm]
    pub defocus_coefficient: f64,
    /// astigmatism wavefront coefficient [μm]
    pub astigmatism_coefficient: f64,
    /// transmissive fraction of the aperture radius
    pub pupil_coverage: f64,
}
impl Default for PsfParameters {
    fn default() -> Self {
        Self {
            grid_size: 512,
            wavelength: 0.555,
            aperture_diameter: 8.0,
            magnification: 1.0,
            numerical_aperture: 0.5,
            defocus_coefficient: 0.0,
            astigmatism_coefficient: 0.0,
            pupil_coverage: 1.0,
        }
    }
}
impl PsfParameters {
    pub fn grid_size(self, grid_size: usize) -> Self {
        Self { grid_size, ..self }
    }
    pub fn wavelength(self, wavelength: f64) -> Self {
        Self { wavelength, ..self }
    }
    pub fn aperture_diameter(self, aperture_diameter: f64) -> Self {
        Self {
            aperture_diameter,
            ..self
        }
    }
    pub fn magnification(self, magnification: f64) -> Self {
        Self {
            magnification,
            ..self
        }
    }
    pub fn numerical_aperture(self, numerical_aperture: f64) -> Self {
        Self {
            numerical_aperture,
            ..self
        }
    }
    pub fn defocus(self, defocus_coefficient: f64) -> Self {
        Self {
            defocus_coefficient,
            ..self
        }
    }
    pub fn astigmatism(self, astigmatism_coefficient: f64) -> Self {
        Self {
            astigmatism_coefficient,
            ..self
        }
    }
    pub fn pupil_coverage(self, pupil_coverage: f64) -> Self {
        Self {
            pupil_coverage,
            ..self
        }
    }
    /// Pupil plane width giving a pupil sample spacing of `step` [pupil radius]
    ///
    /// The step setters derive `aperture_diameter` from the current
    /// `grid_size`, `wavelength`, `numerical_aperture` and `magnification`,
    /// so they come after those in a builder chain.
    pub fn with_pupil_step(self, step: f64) -> Self {
        self.aperture_diameter(step * self.grid_size as f64)
    }
    /// Pupil plane width giving an image sample spacing of `step`
    pub fn with_image_step(self, step: f64, units: StepUnits) -> Self {
        let canonical = match units {
            StepUnits::Canonical => step,
            StepUnits::Microns => step * self.numerical_aperture / self.wavelength,
        };
        self.aperture_diameter(1.0 / canonical)
    }
    /// Pupil plane width giving an object sample spacing of `step`
    ///
    /// The object canonical unit is λ/(NA M), so canonical steps are equal in
    /// the object and the image planes.
    pub fn with_object_step(self, step: f64, units: StepUnits) -> Self {
        match units {
            StepUnits::Canonical => self.with_image_step(step, units),
            StepUnits::Microns => self.with_image_step(step * self.magnification, units),
        }
    }
    /// Sets the sampling from whichever quantity `source` names
    ///
    /// `units` only applies to the image and object steps.
    pub fn with_sampling(self, source: SamplingSource, value: f64, units: StepUnits) -> Self {
        match source {
            SamplingSource::ApertureDiameter => self.aperture_diameter(value),
            SamplingSource::PupilStep => self.with_pupil_step(value),
            SamplingSource::ObjectStep => self.with_object_step(value, units),
            SamplingSource::ImageStep => self.with_image_step(value, units),
        }
    }
    /// Same system without any aberration
    pub fn unaberrated(self) -> Self {
        Self {
            defocus_coefficient: 0.0,
            astigmatism_coefficient: 0.0,
            ..self
        }
    }
    /// Checks the parameters against their physical range and the engine limits
    pub fn validate(&self, config: &EngineConfig) -> Result<()> {
        if self.grid_size < config.min_grid_size {
            return Err(Error::invalid(
                "grid_size",
                format!(
                    "{} is below the minimum of {}",
                    self.grid_size, config.min_grid_size
                ),
            ));
        }
        for (name, value) in [
            ("wavelength", self.wavelength),
            ("aperture_diameter", self.aperture_diameter),
            ("magnification", self.magnification),
            ("numerical_aperture", self.numerical_aperture),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::invalid(
                    name,
                    format!("{value} must be finite and strictly positive"),
                ));
            }
        }
        for (name, value) in [
            ("defocus_coefficient", self.defocus_coefficient),
            ("astigmatism_coefficient", self.astigmatism_coefficient),
        ] {
            if !value.is_finite() {
                return Err(Error::invalid(name, format!("{value} is not finite")));
            }
        }
        if !(self.pupil_coverage > 0.0 && self.pupil_coverage <= 1.0) {
            return Err(Error::invalid(
                "pupil_coverage",
                format!("{} is outside (0, 1]", self.pupil_coverage),
            ));
        }
        Ok(())
    }
    /// Sampling steps of the pupil and image planes
    pub fn sampling(&self) -> Sampling {
        Sampling::new(self)
    }
    fn key(&self) -> [u64; 8] {
        // -0.0 and 0.0 describe the same system
        let bits = |x: f64| if x == 0.0 { 0u64 } else { x.to_bits() };
        [
            self.grid_size as u64,
            bits(self.wavelength),
            bits(self.aperture_diameter),
            bits(self.magnification),
            bits(self.numerical_aperture),
            bits(self.defocus_coefficient),
            bits(self.astigmatism_coefficient),
            bits(self.pupil_coverage),
        ]
    }
}
impl PartialEq for PsfParameters {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for PsfParameters {}
impl Hash for PsfParameters {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state)
    }
}

/// Pupil and image plane sample spacings
///
/// The image plane sample spacing follows from the DFT: Δ_psf = 1/(N Δ_pupil)
/// in canonical units (λ/NA), or λ/(N Δ_pupil NA) micrometers. A larger
/// `aperture_diameter` gives a finer image sampling at fixed N, a larger N
/// widens the image field at a quadratic memory and time cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sampling {
    pub grid_size: usize,
    /// pupil sample spacing [pupil radius]
    pub pupil_step: f64,
    /// image sample spacing [λ/NA]
    pub image_step_canonical: f64,
    /// image sample spacing [μm]
    pub image_step_microns: f64,
    /// object sample spacing [μm]
    pub object_step_microns: f64,
}
impl Sampling {
    pub fn new(params: &PsfParameters) -> Self {
        let n = params.grid_size as f64;
        let pupil_step = params.aperture_diameter / n;
        let image_step_canonical = 1.0 / (n * pupil_step);
        let image_step_microns = image_step_canonical * params.wavelength / params.numerical_aperture;
        Self {
            grid_size: params.grid_size,
            pupil_step,
            image_step_canonical,
            image_step_microns,
            object_step_microns: image_step_microns / params.magnification,
        }
    }
    /// Number of samples across the diffraction-limited core (first dark ring diameter)
    pub fn samples_across_airy_core(&self) -> f64 {
        AIRY_CORE_DIAMETER / self.image_step_canonical
    }
}
