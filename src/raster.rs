//! In-memory raster of H×W×C non-negative samples

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    data: Array3<f64>,
}
impl Image {
    /// Wraps a (height, width, channels) array
    pub fn new(data: Array3<f64>) -> Result<Self> {
        let (height, width, channels) = data.dim();
        if height == 0 || width == 0 || channels == 0 {
            return Err(Error::InvalidImage(format!(
                "empty raster of shape {height}x{width}x{channels}"
            )));
        }
        if let Some(((i, j, c), value)) = data
            .indexed_iter()
            .find(|(_, v)| !(v.is_finite() && **v >= 0.0))
        {
            return Err(Error::InvalidImage(format!(
                "sample ({i},{j},{c}) is {value}, samples must be finite and non-negative"
            )));
        }
        Ok(Self { data })
    }
    /// Single channel image
    pub fn from_gray(plane: Array2<f64>) -> Result<Self> {
        Self::new(plane.insert_axis(Axis(2)))
    }
    /// Stacks equally sized planes as channels
    pub fn from_channels(planes: &[Array2<f64>]) -> Result<Self> {
        let views: Vec<_> = planes.iter().map(|p| p.view()).collect();
        let data = ndarray::stack(Axis(2), &views)
            .map_err(|e| Error::InvalidImage(format!("channels cannot be stacked: {e}")))?;
        Self::new(data)
    }
    /// Image of constant value
    pub fn uniform(height: usize, width: usize, channels: usize, value: f64) -> Result<Self> {
        Self::new(Array3::from_elem((height, width, channels), value))
    }
    pub fn height(&self) -> usize {
        self.data.dim().0
    }
    pub fn width(&self) -> usize {
        self.data.dim().1
    }
    pub fn channels(&self) -> usize {
        self.data.dim().2
    }
    /// (height, width, channels)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }
    pub fn channel(&self, c: usize) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(2), c)
    }
    pub fn view(&self) -> ArrayView3<'_, f64> {
        self.data.view()
    }
    pub fn into_array(self) -> Array3<f64> {
        self.data
    }
    /// Total intensity
    pub fn sum(&self) -> f64 {
        self.data.sum()
    }
}
