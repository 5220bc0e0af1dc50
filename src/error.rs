use crate::config::ConfigError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error(
        "grid of {grid_size}x{grid_size} samples needs {required} bytes, above the {ceiling} bytes ceiling; reduce `grid_size`"
    )]
    ResourceLimit {
        grid_size: usize,
        required: usize,
        ceiling: usize,
    },
    #[error("degenerate kernel: total energy {energy:e} is not usable")]
    DegenerateKernel { energy: f64 },
    #[error("kernel of {kernel:?} samples does not fit an image of {image:?} samples")]
    ShapeMismatch {
        kernel: (usize, usize),
        image: (usize, usize),
    },
    #[error("invalid kernel: {0}")]
    InvalidKernel(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("failed to load the configuration")]
    Config(#[from] ConfigError),
}
impl Error {
    pub(crate) fn invalid(name: &'static str, reason: impl ToString) -> Self {
        Error::InvalidParameter {
            name,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
