//! Main executable for dockpipe

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use dockpipe::batch::{BatchReport, LigandManifest, DEFAULT_EXTENSION};
use dockpipe::math::triplet;
use dockpipe::parser::VinaRemarkParser;
use dockpipe::pipeline::{score_poses_file, Pipeline, PipelineSettings};
use dockpipe::plot::{plot_directory, DEFAULT_BINS};
use dockpipe::render::{render_complex, RenderStyle};
use dockpipe::request::{parse_config, DockingConfig, SearchBox, SearchParams};
use dockpipe::structure::read_structure;
use dockpipe::VinaCli;

/// Command-line arguments for the application
#[derive(Parser, Debug)]
#[clap(
    name = "dockpipe",
    version = dockpipe::VERSION,
    about = "Batch docking with AutoDock Vina: score tables, histograms and PyMOL renderings"
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

/// Where the search box comes from
#[derive(Args, Debug)]
struct BoxArgs {
    /// Center of the search box (x,y,z)
    #[clap(long, value_parser, value_delimiter = ',', allow_hyphen_values = true)]
    center: Option<Vec<f64>>,

    /// Size of the search box (x,y,z)
    #[clap(long, value_parser, value_delimiter = ',')]
    size: Option<Vec<f64>>,

    /// Vina configuration file (center_x, size_x, exhaustiveness, ...)
    #[clap(long, short, value_parser)]
    config: Option<PathBuf>,

    /// Reference ligand whose bounding box, plus padding, becomes the search box
    #[clap(long, value_parser)]
    autobox_ligand: Option<PathBuf>,

    /// Padding around the reference ligand in Angstroms
    #[clap(long, default_value_t = 4.0)]
    padding: f64,
}

/// Search effort and engine settings
#[derive(Args, Debug)]
struct SearchArgs {
    /// Exhaustiveness of the search [default: 8]
    #[clap(long)]
    exhaustiveness: Option<usize>,

    /// Maximum number of poses to keep per ligand [default: 10]
    #[clap(long)]
    num_modes: Option<usize>,

    /// Random seed passed to the engine
    #[clap(long)]
    seed: Option<u64>,

    /// AutoDock Vina executable
    #[clap(long, value_parser, default_value = "vina")]
    vina: PathBuf,

    /// Give up on a ligand after this many seconds
    #[clap(long)]
    timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Dock a single ligand to a receptor
    Dock {
        /// PDBQT file containing the receptor
        #[clap(long, value_parser)]
        receptor: PathBuf,

        /// PDBQT file containing the ligand to dock
        #[clap(long, value_parser)]
        ligand: PathBuf,

        /// Output directory for score tables and docked poses
        #[clap(long, value_parser, default_value = "results")]
        out_dir: PathBuf,

        #[clap(flatten)]
        search_box: BoxArgs,

        #[clap(flatten)]
        search: SearchArgs,
    },

    /// Dock every ligand found in a directory
    Batch {
        /// PDBQT file containing the receptor
        #[clap(long, value_parser)]
        receptor: PathBuf,

        /// Directory with ligand files
        #[clap(long, value_parser, default_value = "data")]
        ligand_dir: PathBuf,

        /// Output directory for score tables, docked poses and the batch report
        #[clap(long, value_parser)]
        out_dir: PathBuf,

        /// Ligand file extension
        #[clap(long, default_value = DEFAULT_EXTENSION)]
        extension: String,

        #[clap(flatten)]
        search_box: BoxArgs,

        #[clap(flatten)]
        search: SearchArgs,
    },

    /// Build a score table from an existing docked poses file
    Parse {
        /// Docked poses file written by the engine
        #[clap(long, value_parser)]
        poses: PathBuf,

        /// Output directory for the score table
        #[clap(long, value_parser, default_value = "results")]
        out_dir: PathBuf,

        /// Maximum number of poses to keep
        #[clap(long, default_value_t = 10)]
        num_modes: usize,
    },

    /// Plot the affinity distribution of every score table in a directory
    Plot {
        /// Directory holding *_scores.csv tables
        #[clap(long, value_parser, default_value = "results")]
        dir: PathBuf,

        /// Number of histogram buckets
        #[clap(long, default_value_t = DEFAULT_BINS)]
        bins: usize,
    },

    /// Render a receptor/ligand complex to a PNG image with PyMOL
    Render {
        /// Receptor structure file
        #[clap(long, value_parser)]
        receptor: PathBuf,

        /// Ligand (or docked poses) structure file
        #[clap(long, value_parser)]
        ligand: PathBuf,

        /// Output directory for the image
        #[clap(long, value_parser, default_value = "results")]
        out_dir: PathBuf,

        /// Residue name of the ligand
        #[clap(long, default_value = "MK1")]
        resname: String,

        /// Receptor chain drawn as cartoon
        #[clap(long, default_value = "A")]
        chain: String,

        /// PyMOL executable
        #[clap(long, value_parser, default_value = "pymol")]
        pymol: PathBuf,
    },
}

fn main() -> Result<ExitCode> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command-line arguments
    let cli = Cli::parse();

    match cli.command {
        Commands::Dock {
            receptor,
            ligand,
            out_dir,
            search_box,
            search,
        } => {
            if !ligand.exists() {
                bail!("Ligand file {} not found", ligand.display());
            }
            let pipeline = build_pipeline(receptor, out_dir, &search_box, &search)?;
            let settings = pipeline.settings();

            let mut report = BatchReport::new(&settings.receptor)
                .with_search(&settings.search_box, settings.params);
            report.push(pipeline.process_ligand(&ligand));
            info!("Docking finished: {:?}", report.status());
            Ok(report.status().exit_code())
        }

        Commands::Batch {
            receptor,
            ligand_dir,
            out_dir,
            extension,
            search_box,
            search,
        } => {
            let pipeline = build_pipeline(receptor, out_dir, &search_box, &search)?;
            let settings = pipeline.settings();

            let manifest = LigandManifest::discover(&ligand_dir, &settings.receptor, &extension)
                .with_context(|| format!("No ligands to dock in {}", ligand_dir.display()))?;
            info!(
                "Found {} ligands in {}",
                manifest.len(),
                ligand_dir.display()
            );

            let report = pipeline.run(&manifest);
            let report_path = report
                .write_json(&settings.out_dir)
                .context("Failed to write batch report")?;

            let status = report.status();
            info!(
                "Batch {:?}: {} of {} ligands docked, report at {}",
                status,
                report.docked(),
                report.ligands.len(),
                report_path.display()
            );
            Ok(status.exit_code())
        }

        Commands::Parse {
            poses,
            out_dir,
            num_modes,
        } => {
            if num_modes == 0 {
                bail!("--num-modes must be at least 1");
            }
            let (table, path) = score_poses_file(&VinaRemarkParser, &poses, num_modes, &out_dir)
                .with_context(|| format!("Failed to score poses file: {}", poses.display()))?;
            info!("Saved {} poses to {}", table.len(), path.display());
            Ok(ExitCode::SUCCESS)
        }

        Commands::Plot { dir, bins } => {
            let plots = plot_directory(&dir, bins)
                .with_context(|| format!("Failed to plot score tables in {}", dir.display()))?;
            if plots.is_empty() {
                warn!("No non-empty score tables found in {}", dir.display());
            }
            info!("Wrote {} plots", plots.len());
            Ok(ExitCode::SUCCESS)
        }

        Commands::Render {
            receptor,
            ligand,
            out_dir,
            resname,
            chain,
            pymol,
        } => {
            let style = RenderStyle {
                ligand_resname: resname,
                receptor_chain: chain,
                ..RenderStyle::default()
            };
            render_complex(&pymol, &receptor, &ligand, &out_dir, &style)
                .with_context(|| format!("Failed to render {}", ligand.display()))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Resolve the box and search settings, check the engine, and assemble the pipeline
fn build_pipeline(
    receptor: PathBuf,
    out_dir: PathBuf,
    box_args: &BoxArgs,
    search: &SearchArgs,
) -> Result<Pipeline> {
    if !receptor.exists() {
        bail!("Receptor file {} not found", receptor.display());
    }
    if search.timeout == Some(0) {
        bail!("--timeout must be at least 1 second");
    }

    let config = match &box_args.config {
        Some(path) => load_config(path)?,
        None => DockingConfig::default(),
    };

    let search_box = resolve_box(box_args, &config)?;
    let defaults = SearchParams::default();
    let params = SearchParams {
        exhaustiveness: search
            .exhaustiveness
            .or(config.exhaustiveness)
            .unwrap_or(defaults.exhaustiveness),
        num_modes: search
            .num_modes
            .or(config.num_modes)
            .unwrap_or(defaults.num_modes),
        seed: search.seed.or(config.seed),
    };

    info!(
        "Search box center: ({}, {}, {})",
        search_box.center.x, search_box.center.y, search_box.center.z
    );
    info!(
        "Search box size: ({}, {}, {})",
        search_box.size.x, search_box.size.y, search_box.size.z
    );

    let mut engine = VinaCli::new(&search.vina);
    if let Some(secs) = search.timeout {
        engine = engine.with_timeout(Duration::from_secs(secs));
    }
    if !engine.check_available() {
        bail!(
            "Docking engine {} could not be launched",
            engine.executable().display()
        );
    }

    Ok(Pipeline::new(
        Box::new(engine),
        PipelineSettings {
            receptor,
            out_dir,
            search_box,
            params,
        },
    ))
}

fn load_config(path: &Path) -> Result<DockingConfig> {
    let config_str = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&config_str)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Flags win over the config file, which wins over an autobox reference
fn resolve_box(box_args: &BoxArgs, config: &DockingConfig) -> Result<SearchBox> {
    match (&box_args.center, &box_args.size) {
        (Some(center), Some(size)) => {
            let center =
                triplet(center).ok_or_else(|| anyhow!("--center needs three values: x,y,z"))?;
            let size = triplet(size).ok_or_else(|| anyhow!("--size needs three values: x,y,z"))?;
            Ok(SearchBox::new(center, size))
        }
        (Some(_), None) | (None, Some(_)) => bail!("--center and --size must be given together"),
        (None, None) => {
            if let Some(search_box) = config.search_box {
                return Ok(search_box);
            }
            if let Some(reference) = &box_args.autobox_ligand {
                let structure = read_structure(reference).with_context(|| {
                    format!("Failed to read reference ligand: {}", reference.display())
                })?;
                return Ok(SearchBox::around(&structure, box_args.padding)?);
            }
            bail!("Either --center and --size, a config file with a box, or --autobox-ligand must be provided")
        }
    }
}
