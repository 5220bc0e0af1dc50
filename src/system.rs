/*!
# System PSF

The PSF of optics in series is the convolution of the component PSFs. The
first kernel sets the output grid and sampling, every following kernel must
fit inside it and is assumed to share its sample pitch.
*/

use crate::{convolution::convolve_same, psf::normalize, EngineConfig, Error, PsfKernel, Result};

/// Combines cascaded kernels into a single normalized kernel
pub fn system_psf(kernels: &[PsfKernel]) -> Result<PsfKernel> {
    system_psf_with(kernels, &EngineConfig::default())
}

/// [`system_psf`] under the resource limits of `config`
pub fn system_psf_with(kernels: &[PsfKernel], config: &EngineConfig) -> Result<PsfKernel> {
    let Some((first, others)) = kernels.split_first() else {
        return Err(Error::invalid("kernels", "at least one kernel is required"));
    };
    first.check()?;
    let mut data = first.view().to_owned();
    for kernel in others {
        kernel.check()?;
        data = normalize(convolve_same(data.view(), kernel.view(), config)?)?;
    }
    log::debug!(
        "{} kernels combined into a {:?} system PSF",
        kernels.len(),
        first.dim()
    );
    Ok(PsfKernel::from_array(data)?.with_sampling(first.sampling().copied()))
}
