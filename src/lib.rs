/*!
# Optical point spread functions

The crate models a microscope or camera objective by its pupil function,
derives the incoherent point spread function (PSF) under the Fraunhofer
approximation and blurs images with it.

The pipeline has three stages:
 1. [`PupilModel`] samples the pupil aperture and its aberration phase on an N×N grid,
 2. [`PsfEngine`] Fourier transforms the pupil into a normalized [`PsfKernel`],
 3. [`ConvolutionApplicator`] convolves every channel of an [`Image`] with the kernel.

```no_run
use psf_engine::{apply_psf, compute_psf, Image, PsfParameters};

let params = PsfParameters::default()
    .grid_size(256)
    .wavelength(0.55)
    .defocus(0.1);
let kernel = compute_psf(&params)?;
let blurred = apply_psf(&Image::uniform(512, 512, 3, 1.0)?, &kernel)?;
# Ok::<(), psf_engine::Error>(())
```
*/

mod cache;
mod config;
mod convolution;
mod error;
pub mod fft;
pub mod metrics;
mod params;
mod psf;
mod pupil;
mod raster;
mod system;

pub use cache::PsfCache;
pub use config::{ConfigError, EngineConfig, OpticalSystem, MAX_MEMORY_BYTES, MIN_GRID_SIZE};
pub use convolution::ConvolutionApplicator;
pub use error::{Error, Result};
pub use metrics::{CrossSections, Summary, Units};
pub use params::{PsfParameters, Sampling, SamplingSource, StepUnits};
pub use psf::{PsfEngine, PsfKernel, NORMALIZATION_TOLERANCE};
pub use pupil::{Astigmatism, Defocus, PhaseTerm, PupilFunction, PupilModel};
pub use raster::Image;
pub use system::{system_psf, system_psf_with};

/// Computes the kernel of `params` with the default [`EngineConfig`]
pub fn compute_psf(params: &PsfParameters) -> Result<PsfKernel> {
    PsfEngine::default().compute(params)
}

/// Blurs `image` with `kernel` with the default [`EngineConfig`]
pub fn apply_psf(image: &Image, kernel: &PsfKernel) -> Result<Image> {
    ConvolutionApplicator::default().apply(image, kernel)
}
