//! Synthesize a model image from a configuration file.
//!
//! Reads a `FUNCTION` block configuration, builds the model at the
//! requested geometry (optionally convolved with a synthetic Gaussian or
//! Moffat PSF), and writes a PNG preview and/or a plain-text pixel dump.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use galmodel::config::parse_config_file;
use galmodel::functions::describe_functions;
use galmodel::{ModelBuilder, ModelSettings, PsfKernel};

#[derive(Parser, Debug)]
#[command(author, version, about = "Synthesize a surface-brightness model image")]
struct Args {
    /// Model configuration file (FUNCTION blocks)
    config: Option<PathBuf>,

    /// Image width in pixels
    #[arg(long, default_value_t = 256)]
    ncols: usize,

    /// Image height in pixels
    #[arg(long, default_value_t = 256)]
    nrows: usize,

    /// Output PNG preview (asinh-stretched)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Output plain-text pixel dump (one row per line)
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Convolve with a synthetic PSF of this FWHM (pixels)
    #[arg(long)]
    psf_fwhm: Option<f64>,

    /// Synthetic PSF kernel size (odd, pixels)
    #[arg(long, default_value_t = 31)]
    psf_size: usize,

    /// Use a Moffat PSF with this beta instead of a Gaussian
    #[arg(long)]
    psf_beta: Option<f64>,

    /// Photometric zero point for magnitude parameters
    #[arg(long, default_value_t = 25.0)]
    zero_point: f64,

    /// Worker threads (default: all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Sub-pixel sampling grid edge near steep peaks
    #[arg(long, default_value_t = 5)]
    subpixel: usize,

    /// List the available functions and their parameters, then exit
    #[arg(long, default_value_t = false)]
    list_functions: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list_functions {
        print!("{}", describe_functions());
        return Ok(());
    }

    let config_path = match &args.config {
        Some(path) => path,
        None => bail!("a configuration file is required (or use --list-functions)"),
    };
    let descriptors = parse_config_file(config_path)
        .with_context(|| format!("parsing {}", config_path.display()))?;
    info!("{} component(s) from {}", descriptors.len(), config_path.display());

    let psf = match args.psf_fwhm {
        Some(fwhm) => {
            // Gaussian sigma from FWHM: fwhm / (2 sqrt(2 ln 2))
            let kernel = match args.psf_beta {
                Some(beta) => PsfKernel::moffat(args.psf_size, fwhm, beta),
                None => PsfKernel::gaussian(args.psf_size, fwhm / 2.354_820_045),
            }?;
            Some(kernel)
        }
        None => None,
    };

    let mut settings = ModelSettings::new(args.ncols, args.nrows);
    settings.zero_point = args.zero_point;
    settings.threads = args.threads;
    settings.subpixel_k = args.subpixel;

    let mut model = ModelBuilder::new(settings, descriptors, psf, Vec::new())?;
    let params = model.initial_parameters();
    model.set_parameters(&params)?;
    let report = model.compute_model_image()?;
    if !report.finite {
        bail!("model image contains non-finite pixels; check the configuration");
    }
    if report.non_converged > 0 {
        log::warn!(
            "{} line-of-sight integrations did not converge",
            report.non_converged
        );
    }

    let image = model.image().expect("image was just computed");

    if let Some(path) = &args.dump {
        let mut text = String::new();
        for row in image.rows() {
            let line: Vec<String> = row.iter().map(|v| format!("{v:.10e}")).collect();
            text.push_str(&line.join(" "));
            text.push('\n');
        }
        std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
        info!("wrote pixel dump to {}", path.display());
    }

    if let Some(path) = &args.output {
        write_png(&image, path)?;
        info!("wrote preview to {}", path.display());
    }

    if args.output.is_none() && args.dump.is_none() {
        let total: f64 = image.sum();
        println!("total flux: {total:.6}");
    }
    Ok(())
}

/// Save an asinh-stretched 8-bit preview of the model image.
fn write_png(image: &ndarray::ArrayView2<f64>, path: &PathBuf) -> Result<()> {
    let (rows, cols) = image.dim();
    let max = galmodel::stats::PixelScan::over(image.iter().copied())
        .max()
        .unwrap_or(0.0);
    let scale = if max > 0.0 { max } else { 1.0 };

    let mut out = image::GrayImage::new(cols as u32, rows as u32);
    for ((row, col), &v) in image.indexed_iter() {
        // asinh stretch keeps faint structure visible next to bright peaks
        let stretched = (10.0 * (v.max(0.0) / scale)).asinh() / 10.0f64.asinh();
        let level = (stretched * 255.0).round().clamp(0.0, 255.0) as u8;
        out.put_pixel(col as u32, row as u32, image::Luma([level]));
    }
    out.save(path).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
