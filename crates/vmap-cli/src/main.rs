//! vmap CLI - build and inspect view maps
//!
//! Builds the view map of a demo scene, prints a summary, saves it in
//! the binary view-map format, and dumps steerable density pyramids as
//! PNG images.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};
use vmap::io::SaveOptions;
use vmap::{Controller, ViewMap, ViewMapConfig, ViewMapStats, VisibilityAlgorithm};
use vmap_math::{CameraSnapshot, CancelToken};
use vmap_steerable::SteerableViewMap;

mod scene;

use scene::Scene;

#[derive(Parser)]
#[command(name = "vmap")]
#[command(about = "View-map construction for line drawing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the view map of a demo scene
    Build {
        /// Scene to build
        #[arg(short, long, value_enum, default_value = "cube")]
        scene: Scene,
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Visibility algorithm, overriding the configuration
        #[arg(short, long)]
        algorithm: Option<VisibilityAlgorithm>,
        /// Camera position (default: framed three-quarter view)
        #[arg(long, value_delimiter = ',', num_args = 3)]
        eye: Option<Vec<f64>>,
        /// Vertical field of view in degrees
        #[arg(long, default_value = "45")]
        fov: f64,
        /// Viewport width in pixels
        #[arg(long, default_value = "640")]
        width: i32,
        /// Viewport height in pixels
        #[arg(long, default_value = "480")]
        height: i32,
        /// Write the view map to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Store vectors in single precision
        #[arg(long)]
        float: bool,
        /// Leave occluder lists out of the saved file
        #[arg(long)]
        no_occluders: bool,
        /// Write big-endian numbers
        #[arg(long)]
        big_endian: bool,
    },
    /// Display information about a saved view map
    Info {
        /// Path to the view-map file
        file: PathBuf,
    },
    /// Write steerable density pyramids of a saved view map as PNG files
    Density {
        /// Path to the view-map file
        file: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Image width in pixels (the viewport the map was built for)
        #[arg(long, default_value = "640")]
        width: usize,
        /// Image height in pixels
        #[arg(long, default_value = "480")]
        height: usize,
        /// Orientation bins
        #[arg(long, default_value = "4")]
        orientations: usize,
        /// Pyramid levels (0: down to one pixel)
        #[arg(long, default_value = "0")]
        levels: usize,
        /// Gaussian blur sigma between levels
        #[arg(long, default_value = "1.0")]
        sigma: f32,
    },
}

/// Printed after `build` and `info`.
#[derive(Serialize)]
struct Summary<'a> {
    models: &'a [String],
    camera: CameraSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    algorithm: Option<VisibilityAlgorithm>,
    stats: ViewMapStats,
    qi_histogram: Vec<(u32, usize)>,
}

impl<'a> Summary<'a> {
    fn new(vm: &'a ViewMap, algorithm: Option<VisibilityAlgorithm>) -> Self {
        let mut qi: Vec<u32> = vm.view_edges().iter().map(|e| e.qi).collect();
        qi.sort_unstable();
        let mut qi_histogram: Vec<(u32, usize)> = Vec::new();
        for q in qi {
            match qi_histogram.last_mut() {
                Some((last, n)) if *last == q => *n += 1,
                _ => qi_histogram.push((q, 1)),
            }
        }
        Self {
            models: vm.model_names(),
            camera: vm.camera(),
            algorithm,
            stats: vm.stats(),
            qi_histogram,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            scene,
            config,
            algorithm,
            eye,
            fov,
            width,
            height,
            output,
            float,
            no_occluders,
            big_endian,
        } => {
            let mut config = match config {
                Some(path) => ViewMapConfig::from_toml_file(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => ViewMapConfig::default(),
            };
            if let Some(a) = algorithm {
                config.visibility = a;
            }
            let eye = eye.map(|v| [v[0], v[1], v[2]]);
            let options = SaveOptions {
                float_vectors: float,
                no_occluders,
                big_endian,
            };
            build(scene, config, eye, fov, (width, height), output.as_deref(), &options)?;
        }
        Commands::Info { file } => {
            let vm = vmap::io::load_file(&file)
                .with_context(|| format!("loading {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&Summary::new(&vm, None))?);
        }
        Commands::Density {
            file,
            output,
            width,
            height,
            orientations,
            levels,
            sigma,
        } => {
            density(&file, &output, (width, height), orientations, levels, sigma)?;
        }
    }

    Ok(())
}

fn build(
    scene: Scene,
    config: ViewMapConfig,
    eye: Option<[f64; 3]>,
    fov: f64,
    (width, height): (i32, i32),
    output: Option<&Path>,
    options: &SaveOptions,
) -> Result<()> {
    if width <= 0 || height <= 0 {
        anyhow::bail!("viewport must be positive, got {width}x{height}");
    }
    let algorithm = config.visibility;
    let mut controller = Controller::new(config);
    controller.load_triangle_meshes(&scene.meshes())?;
    let camera = scene::frame(&controller.mesh().bbox(), eye, fov, width, height);
    info!("building {scene:?} with {algorithm}");

    let vm = controller
        .compute_view_map(&camera, &CancelToken::new())
        .context("view-map build was cancelled")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&Summary::new(&vm, Some(algorithm)))?
    );

    if let Some(path) = output {
        vmap::io::save_file(path, &vm, options)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Saved view map to {}", path.display());
    }
    Ok(())
}

fn density(
    file: &Path,
    output: &Path,
    (width, height): (usize, usize),
    orientations: usize,
    levels: usize,
    sigma: f32,
) -> Result<()> {
    let vm = vmap::io::load_file(file).with_context(|| format!("loading {}", file.display()))?;
    let mut svm = SteerableViewMap::new(orientations);
    let images = svm.rasterize_orientations(&vm, width, height);
    svm.build_images_pyramids(images, levels, sigma)?;
    std::fs::create_dir_all(output)?;

    for orientation in 0..=svm.nb_orientations() {
        let Some(pyramid) = svm.pyramid(orientation) else {
            continue;
        };
        for level in 0..pyramid.nb_levels() {
            let Some(img) = pyramid.level(level) else {
                continue;
            };
            let name = if orientation == svm.nb_orientations() {
                format!("complete_{level}.png")
            } else {
                format!("orientation{orientation}_{level}.png")
            };
            image::save_buffer(
                output.join(name),
                &img.to_u8(),
                img.width() as u32,
                img.height() as u32,
                image::ColorType::L8,
            )?;
        }
    }
    println!(
        "Wrote {} pyramids of {} levels to {}",
        svm.nb_orientations() + 1,
        svm.nb_levels(),
        output.display()
    );
    Ok(())
}
