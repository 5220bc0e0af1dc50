//! Two-dimensional FFT on `ndarray` arrays

use std::sync::Arc;

use ndarray::{Array2, Axis};
use rustfft::{
    num_complex::Complex64,
    num_traits::Zero,
    Fft, FftDirection, FftPlanner,
};

/// Separable 2D transform of a fixed shape
///
/// Plans are `Send + Sync` so one instance serves every worker thread.
#[derive(Clone)]
pub struct Fft2 {
    shape: (usize, usize),
    along_rows: Arc<dyn Fft<f64>>,
    along_cols: Arc<dyn Fft<f64>>,
}
impl Fft2 {
    pub fn new(
        planner: &mut FftPlanner<f64>,
        shape: (usize, usize),
        direction: FftDirection,
    ) -> Self {
        let (rows, cols) = shape;
        Self {
            shape,
            along_rows: planner.plan_fft(cols, direction),
            along_cols: planner.plan_fft(rows, direction),
        }
    }
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }
    /// Unnormalized in-place transform of `data`, whose shape must match the plan
    pub fn process(&self, data: &mut Array2<Complex64>) {
        debug_assert_eq!(data.dim(), self.shape);
        transform_lanes(data, Axis(1), self.along_rows.as_ref());
        transform_lanes(data, Axis(0), self.along_cols.as_ref());
    }
}

fn transform_lanes(data: &mut Array2<Complex64>, axis: Axis, fft: &dyn Fft<f64>) {
    let mut buffer = vec![Complex64::zero(); data.len_of(axis)];
    let mut scratch = vec![Complex64::zero(); fft.get_inplace_scratch_len()];
    for mut lane in data.lanes_mut(axis) {
        buffer
            .iter_mut()
            .zip(lane.iter())
            .for_each(|(b, &v)| *b = v);
        fft.process_with_scratch(&mut buffer, &mut scratch);
        lane.iter_mut().zip(&buffer).for_each(|(v, &b)| *v = b);
    }
}

/// Moves index 0 to index ⌊n/2⌋ along both axes
pub fn fftshift<T: Clone>(data: &Array2<T>) -> Array2<T> {
    let (rows, cols) = data.dim();
    let (sr, sc) = (rows - rows / 2, cols - cols / 2);
    Array2::from_shape_fn((rows, cols), |(i, j)| {
        data[[(i + sr) % rows, (j + sc) % cols]].clone()
    })
}

/// Moves index ⌊n/2⌋ to index 0 along both axes, the inverse of [`fftshift`]
pub fn ifftshift<T: Clone>(data: &Array2<T>) -> Array2<T> {
    let (rows, cols) = data.dim();
    let (sr, sc) = (rows / 2, cols / 2);
    Array2::from_shape_fn((rows, cols), |(i, j)| {
        data[[(i + sr) % rows, (j + sc) % cols]].clone()
    })
}

/// Smallest length `>= n` with no prime factor above 5
pub fn fast_len(n: usize) -> usize {
    let mut len = n.max(1);
    loop {
        let mut m = len;
        for p in [2, 3, 5] {
            while m % p == 0 {
                m /= p;
            }
        }
        if m == 1 {
            return len;
        }
        len += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn shifts_are_inverse() {
        for (rows, cols) in [(4, 4), (5, 3), (6, 7)] {
            let a = Array2::from_shape_fn((rows, cols), |(i, j)| i * cols + j);
            assert_eq!(ifftshift(&fftshift(&a)), a);
            assert_eq!(fftshift(&ifftshift(&a)), a);
            let shifted = fftshift(&a);
            assert_eq!(shifted[[rows / 2, cols / 2]], a[[0, 0]]);
        }
    }

    #[test]
    fn shift_odd() {
        let a = array![[0, 1, 2], [3, 4, 5], [6, 7, 8]];
        assert_eq!(fftshift(&a), array![[8, 6, 7], [2, 0, 1], [5, 3, 4]]);
    }

    #[test]
    fn forward_inverse() {
        let mut planner = FftPlanner::new();
        let shape = (6, 10);
        let forward = Fft2::new(&mut planner, shape, FftDirection::Forward);
        let inverse = Fft2::new(&mut planner, shape, FftDirection::Inverse);
        let a = Array2::from_shape_fn(shape, |(i, j)| {
            Complex64::new((i * 3 + j) as f64, (i as f64 - j as f64) * 0.5)
        });
        let mut b = a.clone();
        forward.process(&mut b);
        inverse.process(&mut b);
        let scale = (shape.0 * shape.1) as f64;
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(x.re, y.re / scale, epsilon = 1e-10);
            assert_abs_diff_eq!(x.im, y.im / scale, epsilon = 1e-10);
        }
    }

    #[test]
    fn impulse_is_flat() {
        let mut planner = FftPlanner::new();
        let forward = Fft2::new(&mut planner, (8, 8), FftDirection::Forward);
        let mut a = Array2::<Complex64>::zeros((8, 8));
        a[[0, 0]] = Complex64::new(1.0, 0.0);
        forward.process(&mut a);
        a.iter().for_each(|x| assert_abs_diff_eq!(x.norm(), 1.0, epsilon = 1e-12));
    }

    #[test]
    fn five_smooth_lengths() {
        assert_eq!(fast_len(0), 1);
        assert_eq!(fast_len(7), 8);
        assert_eq!(fast_len(287), 288);
        assert_eq!(fast_len(97), 100);
        assert_eq!(fast_len(128), 128);
    }
}
