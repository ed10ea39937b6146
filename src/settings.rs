use anyhow::{ensure, Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use log::info;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::light::PointLight;


/// Thresholds used when pairing triangles into frames and when deciding
/// which texels of a frame are legal sample points.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Tolerances {
    /// Maximum angle between two normals, in degrees, for triangles to pair.
    pub coplanar_angle_deg: f32,
    /// Maximum distance of a vertex from the first triangle's plane when pairing.
    pub plane_distance: f32,
    /// Maximum plane distance for a nearby coplanar triangle to cover a texel.
    pub coverage_distance: f32,
    /// Minimum normal dot product for a nearby same-facing triangle to count as coplanar.
    pub coverage_dot: f32,
    /// Vertex distances within this band of the frame plane are treated as lying on it.
    pub crossing_noise: f32,
    /// Rejection distance from a crossing segment, in patch sizes.
    pub crossing_distance_factor: f32,
    /// Minimum dot product between a crossing triangle's normal and the direction to the texel.
    pub crossing_facing_dot: f32,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            coplanar_angle_deg: 1.0,
            plane_distance: 1e-3,
            coverage_distance: 0.01,
            coverage_dot: 0.999,
            crossing_noise: 0.1,
            crossing_distance_factor: 1.0,
            crossing_facing_dot: 0.99,
        }
    }
}

impl Tolerances {
    /// Minimum normal dot product for two triangles to be paired.
    pub fn coplanar_min_dot(&self) -> f32 {
        self.coplanar_angle_deg.to_radians().cos()
    }
}

/// Runtime configuration for a bake.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Settings {
    /// Path to the scene file, relative to the working directory.
    pub scene: String,
    /// Directory holding `textures/`. Defaults to the scene's directory.
    #[serde(default)]
    pub assets_dir: Option<String>,
    pub output_dir: String,
    pub name: String,
    /// Patches (texels) per world unit.
    pub patch_resolution: f32,
    /// Number of radiosity bounces.
    pub iterations: usize,
    /// Hemicube view side in pixels.
    pub viewport_size: usize,
    pub exposure: f32,
    #[serde(default = "default_atmosphere")]
    pub atmosphere_color: [f32; 3],
    #[serde(default = "default_albedo")]
    pub default_albedo: [f32; 3],
    /// Seed the first bounce with direct point-light irradiance.
    #[serde(default = "default_true")]
    pub seed_direct: bool,
    /// Trace shadow rays while seeding direct light.
    #[serde(default = "default_true")]
    pub direct_shadows: bool,
    #[serde(default)]
    pub lights: Vec<PointLight>,
    #[serde(default)]
    pub tolerances: Tolerances,
}

fn default_atmosphere() -> [f32; 3] {
    [0.0, 0.0, 0.0]
}

fn default_albedo() -> [f32; 3] {
    [0.5, 0.5, 0.5]
}

fn default_true() -> bool {
    true
}

impl Settings {
    /// World size of one patch.
    pub fn patch_size(&self) -> f32 {
        1.0 / self.patch_resolution
    }

    /// Directory searched for textures.
    pub fn assets_path(&self) -> PathBuf {
        match &self.assets_dir {
            Some(dir) => PathBuf::from(dir),
            None => Path::new(&self.scene)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        }
    }
}

pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let default_config_file = root.join("config/default.toml");

    let settings: Config = Config::builder()
        .add_source(File::from(default_config_file).required(true))
        .build()
        .context("Error loading configuration")?;

    let config: Settings = settings
        .try_deserialize()
        .context("Error deserializing configuration")?;

    validate_config(&config)?;

    Ok(config)
}

pub fn load_config() -> Result<Settings> {
    let root = retrieve_project_root()?;

    let default_config_file = root.join("config/default.toml");
    let local_config = root.join("config/local.toml");

    // Check if local config exists, if not use default
    let config_file = if local_config.exists() {
        info!("Using local configuration: {:?}", local_config);
        local_config
    } else {
        info!("Using default configuration: {:?}", default_config_file);
        default_config_file
    };

    let settings: Config = Config::builder()
        .add_source(File::from(config_file).required(true))
        .add_source(Environment::with_prefix("hemibake").separator("__"))
        .build()
        .context("Error loading configuration")?;

    let mut config: Settings = settings
        .try_deserialize()
        .context("Error deserializing configuration")?;

    apply_cli_overrides(&mut config, CliArgs::parse());

    validate_config(&config)?;

    info!("{:#?}", config);

    Ok(config)
}

/// Overwrite configuration values with any given on the command line.
pub fn apply_cli_overrides(config: &mut Settings, args: CliArgs) {
    if let Some(scene) = args.scene {
        config.scene = scene;
    }
    if let Some(assets) = args.assets {
        config.assets_dir = Some(assets);
    }
    if let Some(dir) = args.dir {
        config.output_dir = dir;
    }
    if let Some(name) = args.name {
        config.name = name;
    }
    if let Some(res) = args.res {
        config.patch_resolution = res;
    }
    if let Some(iterations) = args.iterations {
        config.iterations = iterations;
    }
    if let Some(viewport) = args.viewport {
        config.viewport_size = viewport;
    }
    if let Some(exposure) = args.exposure {
        config.exposure = exposure;
    }
    if args.no_direct {
        config.seed_direct = false;
    }
    if args.no_shadows {
        config.direct_shadows = false;
    }
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the HEMIBAKE_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its parents, use it.
pub fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        // When running through cargo (e.g. cargo run, cargo test)
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("HEMIBAKE_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }

    // Walk upward from the executable looking for a "config" subdirectory
    let exe_path = env::current_exe().context("Failed to get current executable path")?;
    exe_path
        .ancestors()
        .skip(1)
        .find(|dir| dir.join("config").is_dir())
        .map(Path::to_path_buf)
        .context("Could not find project root directory")
}

pub fn validate_config(config: &Settings) -> Result<()> {
    ensure!(
        config.patch_resolution > 0.0,
        "Patch resolution must be greater than 0"
    );
    ensure!(config.iterations > 0, "At least one bounce is required");
    ensure!(
        config.viewport_size > 0 && config.viewport_size % 2 == 0,
        "Viewport size must be a positive even number"
    );
    ensure!(config.exposure > 0.0, "Exposure must be greater than 0");
    for light in &config.lights {
        ensure!(light.range >= 0.0, "Light range must not be negative");
    }
    ensure!(
        (0.0..=90.0).contains(&config.tolerances.coplanar_angle_deg),
        "Coplanar angle must lie in [0, 90] degrees"
    );
    Ok(())
}

#[derive(Parser, Debug)]
#[command(version, about = "hemibake - hemicube radiosity lightmap baker")]
pub struct CliArgs {
    /// Path to the scene file. Souper JSON and Wavefront .obj are supported.
    #[arg(short, long)]
    scene: Option<String>,

    /// Directory containing the `textures/` folder.
    #[arg(long)]
    assets: Option<String>,

    /// Output directory for the lightmap and exported scene.
    #[arg(short, long)]
    dir: Option<String>,

    /// Base name for output files.
    #[arg(short, long)]
    name: Option<String>,

    /// Patch resolution in texels per world unit.
    #[arg(long)]
    res: Option<f32>,

    /// Number of radiosity bounces.
    #[arg(short, long)]
    iterations: Option<usize>,

    /// Hemicube viewport size in pixels. Must be even.
    #[arg(short, long)]
    viewport: Option<usize>,

    /// Exposure used when tone-mapping the preview image.
    #[arg(short, long)]
    exposure: Option<f32>,

    /// Skip seeding the lightmap with direct point-light irradiance.
    #[arg(long)]
    no_direct: bool,

    /// Disable shadow rays during direct seeding.
    #[arg(long)]
    no_shadows: bool,
}
