/*!
# Frequency-domain convolution

Image channels and kernel are zero-padded to a common 5-smooth size of at least
`(H + k_r - 1) x (W + k_c - 1)`, so the circular product of their spectra is
the linear convolution. The output keeps the H×W window aligned on the kernel
center `(k_r/2, k_c/2)`.

Zero padding means the region outside the image contributes no intensity:
pixels closer to the border than the kernel half-width come out darker than
with reflect or replicate padding, the energy spread off the canvas is lost.
Negative round-off residue of the inverse transform is clipped to zero, the
output range is otherwise left as is.
*/

use std::time::Instant;

use ndarray::{s, Array2, ArrayView2};
use rayon::prelude::*;
use rustfft::{num_complex::Complex64, FftDirection, FftPlanner};

use crate::{
    fft::{fast_len, Fft2},
    EngineConfig, Error, Image, PsfKernel, Result,
};

/// Blurs images with a PSF kernel
#[derive(Debug, Clone, Default)]
pub struct ConvolutionApplicator {
    config: EngineConfig,
}
impl ConvolutionApplicator {
    pub fn new(config: &EngineConfig) -> Self {
        Self { config: *config }
    }
    /// Convolves every channel of `image` with `kernel`
    pub fn apply(&self, image: &Image, kernel: &PsfKernel) -> Result<Image> {
        kernel.check()?;
        let (height, width, channels) = image.dim();
        let now = Instant::now();
        let spectral = SpectralKernel::new(kernel.view(), (height, width), channels, &self.config)?;
        let planes: Vec<Array2<f64>> = (0..channels)
            .into_par_iter()
            .map(|c| spectral.convolve(image.channel(c)))
            .collect();
        log::debug!(
            "{height}x{width}x{channels} image convolved with a {:?} kernel in {:.3}ms",
            kernel.dim(),
            now.elapsed().as_secs_f64() * 1e3
        );
        Image::from_channels(&planes)
    }
}

/// "Same" size convolution of a single plane
pub(crate) fn convolve_same(
    plane: ArrayView2<'_, f64>,
    kernel: ArrayView2<'_, f64>,
    config: &EngineConfig,
) -> Result<Array2<f64>> {
    SpectralKernel::new(kernel, plane.dim(), 1, config).map(|spectral| spectral.convolve(plane))
}

/// Kernel spectrum on the padded grid of a given image size
struct SpectralKernel {
    forward: Fft2,
    inverse: Fft2,
    spectrum: Array2<Complex64>,
    image: (usize, usize),
    offset: (usize, usize),
}
impl SpectralKernel {
    fn new(
        kernel: ArrayView2<'_, f64>,
        image: (usize, usize),
        planes: usize,
        config: &EngineConfig,
    ) -> Result<Self> {
        let (kr, kc) = kernel.dim();
        let (height, width) = image;
        if kr == 0 || kc == 0 || kr > height || kc > width {
            return Err(Error::ShapeMismatch {
                kernel: (kr, kc),
                image,
            });
        }
        let padded = (fast_len(height + kr - 1), fast_len(width + kc - 1));
        // the kernel spectrum and one working buffer per plane
        config.check_memory(
            padded.0,
            padded.1,
            (planes + 1) * std::mem::size_of::<Complex64>(),
        )?;
        let mut planner = FftPlanner::new();
        let forward = Fft2::new(&mut planner, padded, FftDirection::Forward);
        let inverse = Fft2::new(&mut planner, padded, FftDirection::Inverse);
        let mut spectrum = Array2::<Complex64>::zeros(padded);
        spectrum
            .slice_mut(s![..kr, ..kc])
            .zip_mut_with(&kernel, |z, &k| *z = Complex64::new(k, 0.0));
        forward.process(&mut spectrum);
        Ok(Self {
            forward,
            inverse,
            spectrum,
            image,
            offset: (kr / 2, kc / 2),
        })
    }
    fn convolve(&self, plane: ArrayView2<'_, f64>) -> Array2<f64> {
        let (height, width) = self.image;
        let (pr, pc) = self.forward.shape();
        let mut buffer = Array2::<Complex64>::zeros((pr, pc));
        buffer
            .slice_mut(s![..height, ..width])
            .zip_mut_with(&plane, |z, &v| *z = Complex64::new(v, 0.0));
        self.forward.process(&mut buffer);
        buffer.zip_mut_with(&self.spectrum, |z, &k| *z *= k);
        self.inverse.process(&mut buffer);
        let scale = 1.0 / (pr * pc) as f64;
        let (oi, oj) = self.offset;
        buffer
            .slice(s![oi..oi + height, oj..oj + width])
            .mapv(|z| (z.re * scale).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array3};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_image(height: usize, width: usize, channels: usize) -> Image {
        let mut rng = StdRng::seed_from_u64(7);
        Image::new(Array3::from_shape_fn((height, width, channels), |_| {
            rng.gen_range(0.0..255.0)
        }))
        .unwrap()
    }

    /// Zero-padded direct convolution
    fn direct(plane: ArrayView2<f64>, kernel: ArrayView2<f64>) -> Array2<f64> {
        let (h, w) = plane.dim();
        let (kr, kc) = kernel.dim();
        let (ci, cj) = ((kr / 2) as isize, (kc / 2) as isize);
        Array2::from_shape_fn((h, w), |(i, j)| {
            let mut sum = 0.0;
            for a in 0..kr {
                for b in 0..kc {
                    let y = i as isize - a as isize + ci;
                    let x = j as isize - b as isize + cj;
                    if y >= 0 && y < h as isize && x >= 0 && x < w as isize {
                        sum += plane[[y as usize, x as usize]] * kernel[[a, b]];
                    }
                }
            }
            sum
        })
    }

    #[test]
    fn shape_preserving() -> Result<()> {
        let kernel = PsfKernel::normalized(Array2::from_elem((5, 3), 1.0))?;
        for (h, w, c) in [(17, 9, 1), (8, 8, 3), (5, 30, 4)] {
            let blurred = ConvolutionApplicator::default().apply(&random_image(h, w, c), &kernel)?;
            assert_eq!(blurred.dim(), (h, w, c));
        }
        Ok(())
    }

    #[test]
    fn identity_kernel() -> Result<()> {
        let image = random_image(20, 13, 3);
        for size in [1, 3, 4, 7] {
            let blurred = ConvolutionApplicator::default().apply(&image, &PsfKernel::identity(size)?)?;
            for (a, b) in image.view().iter().zip(blurred.view().iter()) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-9);
            }
        }
        Ok(())
    }

    #[test]
    fn matches_direct_convolution() -> Result<()> {
        let kernel = PsfKernel::normalized(array![
            [0.0, 1.0, 2.0, 0.5],
            [1.0, 4.0, 1.0, 0.0],
            [0.5, 2.0, 1.0, 3.0]
        ])?;
        let image = random_image(11, 14, 2);
        let blurred = ConvolutionApplicator::default().apply(&image, &kernel)?;
        for c in 0..2 {
            let expected = direct(image.channel(c), kernel.view());
            for (a, b) in expected.iter().zip(blurred.channel(c).iter()) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-9);
            }
        }
        Ok(())
    }

    #[test]
    fn shifted_kernel_moves_the_image() -> Result<()> {
        // all the energy one sample right of the center
        let mut data = Array2::zeros((3, 3));
        data[[1, 2]] = 1.0;
        let kernel = PsfKernel::from_array(data)?;
        let mut plane = Array2::zeros((6, 6));
        plane[[2, 2]] = 1.0;
        let blurred = ConvolutionApplicator::default().apply(&Image::from_gray(plane)?, &kernel)?;
        assert_abs_diff_eq!(blurred.channel(0)[[2, 3]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(blurred.sum(), 1.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn zero_padded_border() -> Result<()> {
        let kernel = PsfKernel::normalized(Array2::from_elem((3, 3), 1.0))?;
        let blurred = ConvolutionApplicator::default().apply(&Image::uniform(6, 6, 1, 9.0)?, &kernel)?;
        let plane = blurred.channel(0);
        assert_abs_diff_eq!(plane[[3, 3]], 9.0, epsilon = 1e-9);
        assert_abs_diff_eq!(plane[[0, 3]], 6.0, epsilon = 1e-9);
        assert_abs_diff_eq!(plane[[0, 0]], 4.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn non_negative_output() -> Result<()> {
        let mut plane = Array2::zeros((32, 32));
        plane[[16, 16]] = 1e6;
        let kernel = PsfKernel::normalized(Array2::from_shape_fn((9, 9), |(i, j)| {
            ((i as f64 - 4.0).powi(2) + (j as f64 - 4.0).powi(2) + 1.0).recip()
        }))?;
        let blurred = ConvolutionApplicator::default().apply(&Image::from_gray(plane)?, &kernel)?;
        assert!(blurred.view().iter().all(|&x| x >= 0.0));
        Ok(())
    }

    #[test]
    fn misuse() -> Result<()> {
        let image = Image::uniform(8, 8, 1, 1.0)?;
        let applicator = ConvolutionApplicator::default();
        let too_wide = PsfKernel::normalized(Array2::from_elem((3, 9), 1.0))?;
        assert!(matches!(
            applicator.apply(&image, &too_wide),
            Err(Error::ShapeMismatch {
                kernel: (3, 9),
                image: (8, 8)
            })
        ));
        let mut data = Array2::from_elem((3, 3), 0.0);
        data[[1, 1]] = 2.0;
        let rescaled = PsfKernel::normalized(data.clone())?;
        assert!(applicator.apply(&image, &rescaled).is_ok());
        assert!(PsfKernel::from_array(data).is_err());
        Ok(())
    }

    #[test]
    fn padded_size_ceiling() -> Result<()> {
        let applicator = ConvolutionApplicator::new(&EngineConfig::default().max_memory_bytes(1 << 10));
        let result = applicator.apply(&Image::uniform(64, 64, 1, 1.0)?, &PsfKernel::identity(3)?);
        assert!(matches!(result, Err(Error::ResourceLimit { .. })));
        Ok(())
    }
}
