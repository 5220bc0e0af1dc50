//! Memoized kernels keyed on their optical parameters

use std::{collections::HashMap, sync::Arc};

use crate::{EngineConfig, PsfEngine, PsfKernel, PsfParameters, Result};

/// Engine front that computes each parameter set once
#[derive(Debug, Default)]
pub struct PsfCache {
    engine: PsfEngine,
    kernels: HashMap<PsfParameters, Arc<PsfKernel>>,
    hits: usize,
    misses: usize,
}
impl PsfCache {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engine: PsfEngine::new(config),
            ..Default::default()
        }
    }
    /// Returns the cached kernel of `params`, computing it on the first request
    ///
    /// Failures are not cached.
    pub fn get_or_compute(&mut self, params: &PsfParameters) -> Result<Arc<PsfKernel>> {
        if let Some(kernel) = self.kernels.get(params) {
            self.hits += 1;
            return Ok(Arc::clone(kernel));
        }
        let kernel = Arc::new(self.engine.compute(params)?);
        self.misses += 1;
        self.kernels.insert(*params, Arc::clone(&kernel));
        log::debug!("PSF cache holds {} kernels", self.kernels.len());
        Ok(kernel)
    }
    pub fn len(&self) -> usize {
        self.kernels.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
    pub fn hits(&self) -> usize {
        self.hits
    }
    pub fn misses(&self) -> usize {
        self.misses
    }
    pub fn clear(&mut self) {
        self.kernels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_once() -> Result<()> {
        let mut cache = PsfCache::new(EngineConfig::default());
        let p = PsfParameters::default().grid_size(64).defocus(0.1);
        let a = cache.get_or_compute(&p)?;
        let b = cache.get_or_compute(&p)?;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
        // -0.0 and 0.0 are the same aberration
        cache.get_or_compute(&p.astigmatism(-0.0))?;
        assert_eq!(cache.len(), 1);
        cache.get_or_compute(&p.defocus(0.2))?;
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
        Ok(())
    }

    #[test]
    fn errors_are_not_cached() {
        let mut cache = PsfCache::default();
        let p = PsfParameters::default().grid_size(8);
        assert!(cache.get_or_compute(&p).is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.misses(), 0);
    }
}
