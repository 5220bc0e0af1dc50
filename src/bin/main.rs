//! PSF engine command line
//!
//! Computes kernels, blurs images and combines cascaded optics

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{anyhow, Context};
use image::{GrayImage, RgbImage};
use itertools::{Itertools, MinMaxResult};
use ndarray::{Array2, Array3};
use npyz::WriterBuilder;
use psf_engine::{
    metrics, system_psf_with, ConvolutionApplicator, EngineConfig, Image, OpticalSystem, PsfCache,
    PsfEngine, PsfKernel, PsfParameters, SamplingSource, StepUnits, Summary, Units,
};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
struct Optics {
    /// grid size N (N×N samples)
    #[structopt(long, default_value = "512")]
    grid_size: usize,
    /// wavelength [micron]
    #[structopt(long, default_value = "0.555")]
    wavelength: f64,
    /// width of the sampled pupil plane [pupil radius]
    #[structopt(long, default_value = "8")]
    aperture_diameter: f64,
    #[structopt(long, default_value = "1")]
    magnification: f64,
    #[structopt(long, default_value = "0.5")]
    numerical_aperture: f64,
    /// defocus coefficient [micron]
    #[structopt(long, default_value = "0", allow_hyphen_values = true)]
    defocus: f64,
    /// astigmatism coefficient [micron]
    #[structopt(long, default_value = "0", allow_hyphen_values = true)]
    astigmatism: f64,
    /// transmissive fraction of the pupil radius
    #[structopt(long, default_value = "1")]
    coverage: f64,
    /// image plane sample step, overrides `--aperture-diameter`
    #[structopt(long, conflicts_with_all = &["object-step", "pupil-step"])]
    image_step: Option<f64>,
    /// object plane sample step, overrides `--aperture-diameter`
    #[structopt(long, conflicts_with = "pupil-step")]
    object_step: Option<f64>,
    /// pupil plane sample step [pupil radius], overrides `--aperture-diameter`
    #[structopt(long)]
    pupil_step: Option<f64>,
    /// image and object step units: canonical (λ/NA) or microns
    #[structopt(long, default_value = "microns")]
    step_units: StepUnits,
}
impl Optics {
    /// The sample step given on the command line, if any
    fn step(&self) -> Option<(SamplingSource, f64)> {
        [
            (SamplingSource::ImageStep, self.image_step),
            (SamplingSource::ObjectStep, self.object_step),
            (SamplingSource::PupilStep, self.pupil_step),
        ]
        .into_iter()
        .find_map(|(source, step)| step.map(|step| (source, step)))
    }
}
impl From<&Optics> for PsfParameters {
    fn from(optics: &Optics) -> Self {
        let params = PsfParameters::default()
            .grid_size(optics.grid_size)
            .wavelength(optics.wavelength)
            .aperture_diameter(optics.aperture_diameter)
            .magnification(optics.magnification)
            .numerical_aperture(optics.numerical_aperture)
            .defocus(optics.defocus)
            .astigmatism(optics.astigmatism)
            .pupil_coverage(optics.coverage);
        match optics.step() {
            Some((source, step)) => params.with_sampling(source, step, optics.step_units),
            None => params,
        }
    }
}

#[derive(Debug, StructOpt)]
struct Output {
    /// kernel saved as a NumPy .npy file
    #[structopt(long, parse(from_os_str))]
    npy: Option<PathBuf>,
    /// kernel preview saved as a PNG file
    #[structopt(long, parse(from_os_str))]
    png: Option<PathBuf>,
    /// cross sections of the kernel saved as a JSON file
    #[structopt(long, parse(from_os_str))]
    sections: Option<PathBuf>,
    /// cross sections units: pixels, canonical or microns
    #[structopt(long, default_value = "pixels")]
    units: Units,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Computes the PSF of a single optical stage
    Kernel {
        /// parameters read from a JSON object instead of the optics flags
        #[structopt(long, parse(from_os_str))]
        params: Option<PathBuf>,
        #[structopt(flatten)]
        optics: Optics,
        #[structopt(flatten)]
        output: Output,
    },
    /// Blurs an image with a computed or a NumPy kernel
    Blur {
        #[structopt(parse(from_os_str))]
        input: PathBuf,
        #[structopt(parse(from_os_str))]
        output: PathBuf,
        /// kernel read from a NumPy .npy file instead of the optics
        #[structopt(long, parse(from_os_str))]
        kernel: Option<PathBuf>,
        /// converts the image to grayscale first
        #[structopt(long)]
        gray: bool,
        #[structopt(flatten)]
        optics: Optics,
    },
    /// Computes the PSF of the cascaded stages of a JSON optical system
    System {
        #[structopt(parse(from_os_str))]
        config: PathBuf,
        #[structopt(flatten)]
        output: Output,
    },
}

#[derive(Debug, StructOpt)]
#[structopt(name = "psf-engine", about = "Optical PSF computation and image blurring")]
struct Opt {
    /// kernel energy fraction retained by cropping
    #[structopt(long)]
    crop: Option<f64>,
    /// working memory ceiling [GiB]
    #[structopt(long)]
    max_memory: Option<f64>,
    /// worker threads, all the cores by default
    #[structopt(long)]
    threads: Option<usize>,
    #[structopt(subcommand)]
    command: Command,
}
impl Opt {
    fn engine_config(&self) -> EngineConfig {
        self.override_config(EngineConfig::default())
    }
    /// Applies the command line limits and cropping on top of `config`
    fn override_config(&self, mut config: EngineConfig) -> EngineConfig {
        if let Some(fraction) = self.crop {
            config = config.crop_energy(fraction);
        }
        if let Some(gib) = self.max_memory {
            config = config.max_memory_bytes((gib * (1u64 << 30) as f64) as usize);
        }
        config
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();
    if let Some(threads) = opt.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }
    let config = opt.engine_config();

    match &opt.command {
        Command::Kernel {
            params,
            optics,
            output,
        } => {
            let params: PsfParameters = match params {
                Some(path) => serde_json::from_reader(BufReader::new(
                    File::open(path).with_context(|| format!("failed to open {:?}", path))?,
                ))?,
                None => optics.into(),
            };
            let sampling = params.sampling();
            log::info!(
                "image sample {:.4}λ/NA ({:.4}μm), {:.2} samples across the Airy core",
                sampling.image_step_canonical,
                sampling.image_step_microns,
                sampling.samples_across_airy_core()
            );
            let now = Instant::now();
            let kernel = PsfEngine::new(config).compute(&params)?;
            log::info!("PSF computed in {:.3}s", now.elapsed().as_secs_f64());
            save(&kernel, output)?;
        }
        Command::Blur {
            input,
            output,
            kernel,
            gray,
            optics,
        } => {
            let kernel = match kernel {
                Some(path) => read_npy(path)?,
                None => PsfEngine::new(config).compute(&optics.into())?,
            };
            let now = Instant::now();
            let image = read_image(input, *gray)?;
            log::info!(
                "{:?} loaded in {:.3}s",
                input,
                now.elapsed().as_secs_f64()
            );
            let now = Instant::now();
            let blurred = ConvolutionApplicator::new(&config).apply(&image, &kernel)?;
            log::info!(
                "{}x{}x{} image blurred in {:.3}s",
                image.height(),
                image.width(),
                image.channels(),
                now.elapsed().as_secs_f64()
            );
            write_image(&blurred, output)?;
        }
        Command::System {
            config: path,
            output,
        } => {
            let system = OpticalSystem::from_path(path)?;
            let engine = opt.override_config(system.engine);
            let mut cache = PsfCache::new(engine);
            let kernels = system
                .rows
                .iter()
                .map(|row| cache.get_or_compute(row).map(|kernel| kernel.as_ref().clone()))
                .collect::<psf_engine::Result<Vec<_>>>()?;
            log::info!(
                "{} stages, {} distinct PSFs computed",
                system.len(),
                cache.misses()
            );
            let kernel = system_psf_with(&kernels, &engine)?;
            save(&kernel, output)?;
        }
    }
    Ok(())
}

/// Prints the kernel summary and writes the requested outputs
fn save(kernel: &PsfKernel, output: &Output) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &Summary::new(kernel))?;
    writeln!(stdout)?;
    if let Some(path) = &output.npy {
        write_npy(kernel, path)?;
        log::info!("kernel saved to {:?}", path);
    }
    if let Some(path) = &output.png {
        preview(kernel)?
            .save(path)
            .with_context(|| format!("failed to save {:?}", path))?;
        log::info!("kernel preview saved to {:?}", path);
    }
    if let Some(path) = &output.sections {
        let sections = metrics::cross_sections(kernel, output.units)?;
        serde_json::to_writer(BufWriter::new(File::create(path)?), &sections)?;
        log::info!("cross sections saved to {:?}", path);
    }
    Ok(())
}

fn write_npy(kernel: &PsfKernel, path: &Path) -> anyhow::Result<()> {
    let (rows, cols) = kernel.dim();
    let mut file = BufWriter::new(File::create(path)?);
    let mut writer = npyz::WriteOptions::<f64>::new()
        .default_dtype()
        .shape(&[rows as u64, cols as u64])
        .writer(&mut file)
        .begin_nd()?;
    writer.extend(kernel.view().iter().copied())?;
    writer.finish()?;
    Ok(())
}

fn read_npy(path: &Path) -> anyhow::Result<PsfKernel> {
    let npy = npyz::NpyFile::new(BufReader::new(File::open(path)?))?;
    let shape = npy.shape().to_vec();
    let &[rows, cols] = shape.as_slice() else {
        return Err(anyhow!("{:?} is not a 2D array: {:?}", path, shape));
    };
    let data = Array2::from_shape_vec((rows as usize, cols as usize), npy.into_vec::<f64>()?)?;
    Ok(PsfKernel::from_array(data)?)
}

/// Kernel intensity mapped on the cubehelix color map
fn preview(kernel: &PsfKernel) -> anyhow::Result<RgbImage> {
    let (rows, cols) = kernel.dim();
    let (min, max) = match kernel.view().iter().copied().minmax() {
        MinMaxResult::MinMax(min, max) => (min, max),
        MinMaxResult::OneElement(value) => (value, value),
        MinMaxResult::NoElements => return Err(anyhow!("empty kernel")),
    };
    let range = max - min;
    let rgb: Vec<u8> = kernel
        .view()
        .iter()
        .flat_map(|&x| {
            let value = if range > 0.0 { (x - min) / range } else { 0.5 };
            let color = colorous::CUBEHELIX.eval_continuous(value);
            [color.r, color.g, color.b]
        })
        .collect();
    RgbImage::from_raw(cols as u32, rows as u32, rgb).ok_or_else(|| anyhow!("preview buffer size"))
}

fn read_image(path: &Path, gray: bool) -> anyhow::Result<Image> {
    let picture = image::open(path).with_context(|| format!("failed to open {:?}", path))?;
    if gray {
        let luma = picture.to_luma8();
        let (width, height) = luma.dimensions();
        let plane = Array2::from_shape_fn((height as usize, width as usize), |(i, j)| {
            luma.get_pixel(j as u32, i as u32)[0] as f64
        });
        Ok(Image::from_gray(plane)?)
    } else {
        let rgb = picture.to_rgb8();
        let (width, height) = rgb.dimensions();
        let data = Array3::from_shape_fn((height as usize, width as usize, 3), |(i, j, c)| {
            rgb.get_pixel(j as u32, i as u32)[c] as f64
        });
        Ok(Image::new(data)?)
    }
}

fn write_image(image: &Image, path: &Path) -> anyhow::Result<()> {
    let (height, width, channels) = image.dim();
    let bytes: Vec<u8> = image
        .view()
        .iter()
        .map(|&x| x.round().clamp(0.0, 255.0) as u8)
        .collect();
    let (w, h) = (width as u32, height as u32);
    let saved = match channels {
        1 => GrayImage::from_raw(w, h, bytes).map(|buffer| buffer.save(path)),
        3 => RgbImage::from_raw(w, h, bytes).map(|buffer| buffer.save(path)),
        n => return Err(anyhow!("cannot save a {} channels image", n)),
    };
    saved
        .ok_or_else(|| anyhow!("image buffer size"))?
        .with_context(|| format!("failed to save {:?}", path))?;
    log::info!("{:?} saved", path);
    Ok(())
}
