use std::error::Error;

use approx::assert_relative_eq;
use ndarray::{s, Array2};
use psf_engine::{
    apply_psf, compute_psf, metrics, system_psf_with, ConvolutionApplicator, EngineConfig, Image,
    OpticalSystem, PsfCache, PsfEngine, PsfParameters, PupilModel, StepUnits,
};

fn optics() -> PsfParameters {
    PsfParameters::default()
        .grid_size(128)
        .wavelength(0.55)
        .aperture_diameter(10.0)
}

#[test]
fn peak_to_mean_matches_aperture_samples() -> Result<(), Box<dyn Error>> {
    let params = optics();
    let kernel = compute_psf(&params)?;
    let pupil = PupilModel::new(&params, &EngineConfig::default())?.build();
    assert_relative_eq!(
        metrics::peak_to_mean_ratio(&kernel),
        pupil.transmissive_samples() as f64,
        max_relative = 1e-9
    );
    Ok(())
}

#[test]
fn uniform_image_interior_is_unchanged() -> Result<(), Box<dyn Error>> {
    let kernel = compute_psf(&optics().defocus(0.05))?;
    let value = 3.0;
    let blurred = apply_psf(&Image::uniform(160, 160, 2, value)?, &kernel)?;
    assert_eq!(blurred.dim(), (160, 160, 2));
    // samples where the 128x128 kernel lies entirely inside the image
    for c in 0..2 {
        let plane = blurred.channel(c);
        for &x in plane.slice(s![63..=95, 63..=95]).iter() {
            assert_relative_eq!(x, value, max_relative = 1e-9);
        }
        // zero padding darkens the corners
        assert!(plane[[0, 0]] < value);
    }
    Ok(())
}

#[test]
fn point_source_energy_is_conserved() -> Result<(), Box<dyn Error>> {
    let config = EngineConfig::default().crop_energy(0.95);
    let kernel = PsfEngine::new(config).compute(&optics())?;
    assert!(kernel.retained_energy() >= 0.95);
    let (rows, _) = kernel.dim();
    assert!(rows < 128);
    let mut plane = Array2::zeros((200, 200));
    plane[[100, 100]] = 10.0;
    let blurred = ConvolutionApplicator::new(&config).apply(&Image::from_gray(plane)?, &kernel)?;
    assert_relative_eq!(blurred.sum(), 10.0, max_relative = 1e-9);
    // the image of a point is the kernel
    let h = rows / 2;
    let window = blurred.channel(0).slice(s![100 - h..=100 + h, 100 - h..=100 + h]).to_owned();
    for (a, b) in window.iter().zip(kernel.view().iter()) {
        assert!((a - 10.0 * b).abs() < 1e-9);
    }
    Ok(())
}

#[test]
fn defocus_lowers_the_peak() -> Result<(), Box<dyn Error>> {
    let engine = PsfEngine::default();
    let focused = engine.compute(&optics())?;
    let blurred = engine.compute(&optics().defocus(0.2))?;
    assert!(blurred.peak() < focused.peak());
    assert!(metrics::second_moment(&blurred) > metrics::second_moment(&focused));
    Ok(())
}

#[test]
fn invalid_parameters_are_reported() {
    for params in [
        optics().grid_size(16),
        optics().wavelength(f64::NAN),
        optics().aperture_diameter(0.0),
        optics().pupil_coverage(0.0),
        optics().pupil_coverage(1.5),
        optics().magnification(0.0),
    ] {
        assert!(matches!(
            compute_psf(&params),
            Err(psf_engine::Error::InvalidParameter { .. })
        ));
    }
}

#[test]
fn narrow_pupil_plane_gives_a_full_kernel() -> Result<(), Box<dyn Error>> {
    let kernel = compute_psf(&PsfParameters::default().grid_size(64).aperture_diameter(1.5))?;
    assert_eq!(kernel.dim(), (64, 64));
    assert_relative_eq!(kernel.sum(), 1.0, epsilon = 1e-12);
    Ok(())
}

#[test]
fn image_step_in_microns() -> Result<(), Box<dyn Error>> {
    let params = optics()
        .numerical_aperture(0.9)
        .with_image_step(0.05, StepUnits::Microns);
    let kernel = compute_psf(&params)?;
    let sampling = kernel.sampling().ok_or("missing sampling")?;
    assert_relative_eq!(sampling.image_step_microns, 0.05, max_relative = 1e-12);
    Ok(())
}

#[test]
fn optical_system_from_json() -> Result<(), Box<dyn Error>> {
    let json = r#"{
        "version": "1.0",
        "engine": { "crop_energy": 0.99 },
        "rows": [
            { "grid_size": 64, "wavelength": 0.55, "aperture_diameter": 6.0 },
            { "grid_size": 64, "wavelength": 0.55, "aperture_diameter": 6.0 },
            { "grid_size": 64, "wavelength": 0.55, "aperture_diameter": 3.0 }
        ]
    }"#;
    let system = OpticalSystem::from_reader(json.as_bytes())?;
    assert_eq!(system.len(), 3);
    let mut cache = PsfCache::new(system.engine);
    let kernels = system
        .rows
        .iter()
        .map(|row| cache.get_or_compute(row).map(|kernel| kernel.as_ref().clone()))
        .collect::<psf_engine::Result<Vec<_>>>()?;
    assert_eq!((cache.hits(), cache.misses()), (1, 2));
    // the largest kernel sets the output grid
    let mut stages = kernels.clone();
    stages.sort_by_key(|kernel| std::cmp::Reverse(kernel.dim().0));
    let combined = system_psf_with(&stages, &system.engine)?;
    assert_eq!(combined.dim(), stages[0].dim());
    assert_relative_eq!(combined.sum(), 1.0, epsilon = 1e-9);
    combined.check()?;
    Ok(())
}
