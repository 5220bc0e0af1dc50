/*!
# Engine and optical system configuration

[`EngineConfig`] holds the limits every computation is checked against and the
kernel cropping policy. [`OpticalSystem`] is the JSON description of a chain of
optical stages, one [`PsfParameters`] row per stage:

```json
{
  "version": "1.0",
  "engine": { "crop_energy": 0.999 },
  "rows": [
    { "grid_size": 256, "wavelength": 0.555, "aperture_diameter": 8.0 },
    { "grid_size": 256, "wavelength": 0.555, "defocus_coefficient": 0.1 }
  ]
}
```
Fields missing from a row take their [`Default`] value.
*/

use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{Error, PsfParameters, Result};

/// Default smallest grid the discrete Fourier approximation is trusted for
pub const MIN_GRID_SIZE: usize = 32;
/// Default working memory ceiling [bytes]
pub const MAX_MEMORY_BYTES: usize = 2 << 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to open the configuration file {1:?}")]
    Io(#[source] io::Error, PathBuf),
    #[error("failed to deserialize the JSON configuration")]
    Json(#[from] serde_json::Error),
    #[error("the optical system has no rows")]
    Empty,
}

/// Limits and policies shared by every computation of an engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// smallest accepted `grid_size`
    pub min_grid_size: usize,
    /// ceiling on the estimated working memory of one computation [bytes]
    pub max_memory_bytes: usize,
    /// energy fraction the cropped kernel must retain, `None` keeps the full grid
    pub crop_energy: Option<f64>,
}
impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_grid_size: MIN_GRID_SIZE,
            max_memory_bytes: MAX_MEMORY_BYTES,
            crop_energy: None,
        }
    }
}
impl EngineConfig {
    pub fn min_grid_size(self, min_grid_size: usize) -> Self {
        Self {
            min_grid_size,
            ..self
        }
    }
    pub fn max_memory_bytes(self, max_memory_bytes: usize) -> Self {
        Self {
            max_memory_bytes,
            ..self
        }
    }
    /// Crops kernels to the smallest centered odd window retaining `fraction` of the energy
    pub fn crop_energy(self, fraction: f64) -> Self {
        Self {
            crop_energy: Some(fraction),
            ..self
        }
    }
    pub fn validate(&self) -> Result<()> {
        if self.min_grid_size < 2 {
            return Err(Error::invalid("min_grid_size", "must be at least 2"));
        }
        match self.crop_energy {
            Some(fraction) if !(fraction > 0.0 && fraction <= 1.0) => Err(Error::invalid(
                "crop_energy",
                format!("{fraction} is outside (0, 1]"),
            )),
            _ => Ok(()),
        }
    }
    /// Checks `bytes_per_sample` x `rows` x `cols` against the memory ceiling
    pub(crate) fn check_memory(
        &self,
        rows: usize,
        cols: usize,
        bytes_per_sample: usize,
    ) -> Result<()> {
        let required = rows
            .checked_mul(cols)
            .and_then(|n| n.checked_mul(bytes_per_sample));
        match required {
            Some(required) if required <= self.max_memory_bytes => Ok(()),
            _ => Err(Error::ResourceLimit {
                grid_size: rows.max(cols),
                required: required.unwrap_or(usize::MAX),
                ceiling: self.max_memory_bytes,
            }),
        }
    }
}

/// A chain of optical stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpticalSystem {
    pub version: String,
    #[serde(default)]
    pub engine: EngineConfig,
    pub rows: Vec<PsfParameters>,
}
impl OpticalSystem {
    /// Loads the optical system from a JSON file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;
        Self::from_reader(BufReader::new(file))
    }
    /// Loads the optical system from any JSON source
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let this: Self = serde_json::from_reader(reader).map_err(ConfigError::from)?;
        if this.rows.is_empty() {
            return Err(ConfigError::Empty.into());
        }
        this.engine.validate()?;
        Ok(this)
    }
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optical_system_defaults() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let json = r#"{
            "version": "1.0",
            "rows": [
                { "grid_size": 64, "wavelength": 0.6 },
                { "defocus_coefficient": 0.25 }
            ]
        }"#;
        let system = OpticalSystem::from_reader(json.as_bytes())?;
        assert_eq!(system.len(), 2);
        assert_eq!(system.engine, EngineConfig::default());
        assert_eq!(system.rows[0].grid_size, 64);
        assert_eq!(system.rows[0].wavelength, 0.6);
        assert_eq!(
            system.rows[1].aperture_diameter,
            PsfParameters::default().aperture_diameter
        );
        assert_eq!(system.rows[1].defocus_coefficient, 0.25);
        Ok(())
    }

    #[test]
    fn optical_system_without_rows() {
        let json = r#"{ "version": "1.0", "rows": [] }"#;
        assert!(matches!(
            OpticalSystem::from_reader(json.as_bytes()),
            Err(Error::Config(ConfigError::Empty))
        ));
        let json = r#"{ "rows": [ {} ] }"#;
        assert!(matches!(
            OpticalSystem::from_reader(json.as_bytes()),
            Err(Error::Config(ConfigError::Json(_)))
        ));
    }

    #[test]
    fn crop_energy_range() {
        assert!(EngineConfig::default().crop_energy(0.999).validate().is_ok());
        assert!(EngineConfig::default().crop_energy(1.0).validate().is_ok());
        assert!(EngineConfig::default().crop_energy(0.0).validate().is_err());
        assert!(EngineConfig::default().crop_energy(1.5).validate().is_err());
        assert!(EngineConfig::default()
            .crop_energy(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn memory_ceiling() {
        let config = EngineConfig::default().max_memory_bytes(1 << 20);
        assert!(config.check_memory(128, 128, 16).is_ok());
        assert!(matches!(
            config.check_memory(1024, 1024, 16),
            Err(Error::ResourceLimit {
                grid_size: 1024,
                ..
            })
        ));
        assert!(config.check_memory(usize::MAX, 2, 16).is_err());
    }
}
