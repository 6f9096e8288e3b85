//! # Tessera CLI
//!
//! Command-line interface for the Tessera LOD builder.
//!
//! ## Commands
//! - `build` - Build the cluster DAG and BVH, print stats and optionally save it
//! - `stats` - Print per-level statistics of a build
//! - `export-obj` - Write one LOD level's clusters as OBJ
//! - `config` - Print a build configuration as JSON

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use tessera_builder::{BuildOutput, build, obj};
use tessera_core::mesh::primitives;
use tessera_core::{BuildConfig, MeshInputData};

/// Tessera LOD builder CLI
#[derive(Parser)]
#[command(name = "tessera")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Build configuration file (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Use the preview preset instead of the default settings
    #[arg(long)]
    pub preview: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Procedural input shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shape {
    Cube,
    Grid,
    Sphere,
}

/// Output encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Bincode,
    Json,
}

/// Input mesh selection
#[derive(Debug, Clone, Args)]
pub struct MeshArgs {
    /// Mesh file (JSON); overrides the procedural shape
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Procedural shape
    #[arg(short = 'm', long = "mesh", value_enum, default_value = "sphere")]
    pub shape: Shape,

    /// Shape resolution (grid quads per side, sphere rings)
    #[arg(short, long, default_value = "32")]
    pub resolution: u32,
}

impl MeshArgs {
    /// Load or generate the input mesh
    pub fn load(&self) -> Result<MeshInputData> {
        if let Some(path) = &self.input {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read mesh {}", path.display()))?;
            return serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse mesh {}", path.display()));
        }

        let resolution = self.resolution.max(2);
        Ok(match self.shape {
            Shape::Cube => primitives::cube(),
            Shape::Grid => primitives::grid(resolution, resolution),
            Shape::Sphere => primitives::uv_sphere(resolution * 2, resolution),
        })
    }
}

/// CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Build the DAG and BVH, optionally writing them to disk
    Build {
        #[command(flatten)]
        mesh: MeshArgs,

        /// Output file, stats only when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output encoding
        #[arg(short, long, value_enum, default_value = "bincode")]
        format: Format,
    },

    /// Print per-level statistics
    Stats {
        #[command(flatten)]
        mesh: MeshArgs,
    },

    /// Export the clusters of one LOD level as OBJ
    ExportObj {
        #[command(flatten)]
        mesh: MeshArgs,

        /// LOD level to export
        #[arg(short, long, default_value = "0")]
        level: u32,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print the effective build configuration as JSON
    Config,
}

/// Resolve the build configuration from the command line
pub fn load_config(path: Option<&Path>, preview: bool) -> Result<BuildConfig> {
    let config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        }
        None if preview => BuildConfig::preview(),
        None => BuildConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn run_build(mesh: &MeshArgs, config: &BuildConfig) -> Result<BuildOutput> {
    let input = mesh.load()?;
    log::info!(
        "Building {} triangles in {} submeshes...",
        input.triangle_count(),
        input.submesh_count()
    );
    let output = build(&input, config)?;
    for diagnostic in output.diagnostics.iter() {
        log::debug!("  {}", diagnostic);
    }
    Ok(output)
}

/// Encode a build output in the requested format
pub fn write_output<W: Write>(output: &BuildOutput, format: Format, out: W) -> Result<()> {
    match format {
        Format::Bincode => bincode::serialize_into(out, output).context("Failed to encode build output")?,
        Format::Json => serde_json::to_writer(out, output).context("Failed to encode build output")?,
    }
    Ok(())
}

/// Execute the CLI command
pub fn execute(cli: Cli) -> Result<()> {
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let config = load_config(cli.config.as_deref(), cli.preview)?;

    match cli.command {
        Commands::Build { mesh, output, format } => {
            let result = run_build(&mesh, &config)?;
            println!("{}", result.stats);
            if let Some(output) = output {
                let file = File::create(&output)
                    .with_context(|| format!("Failed to create {}", output.display()))?;
                let mut writer = BufWriter::new(file);
                write_output(&result, format, &mut writer)?;
                writer.flush()?;
                log::info!("Wrote {}", output.display());
            }
        }

        Commands::Stats { mesh } => {
            let result = run_build(&mesh, &config)?;
            println!("{}", result.stats);
            if !result.diagnostics.is_empty() {
                println!("{} diagnostics", result.diagnostics.len());
            }
        }

        Commands::ExportObj { mesh, level, output } => {
            let result = run_build(&mesh, &config)?;
            let levels = result.stats.levels.len() as u32;
            anyhow::ensure!(level < levels, "LOD level {} out of range (build has {})", level, levels);

            let file = File::create(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            let mut writer = BufWriter::new(file);
            obj::write_level(&result.bvh.clusters, level, &mut writer)?;
            writer.flush()?;
            log::info!("Exported LOD level {} to {}", level, output.display());
        }

        Commands::Config => {
            let stdout = io::stdout();
            serde_json::to_writer_pretty(stdout.lock(), &config)?;
            println!();
        }
    }

    Ok(())
}
