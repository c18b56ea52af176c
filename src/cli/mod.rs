//! Command-line interface for the analysis pipeline.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};

use crate::config::{SimConfig, SimConfigTemplate};
use crate::core::loaders::{self, Extent, Table};
use crate::core::{transforms, writers};
use crate::processors::{accumulate, grouping, relimit};
use crate::AnalysisConfig;

#[derive(Parser)]
#[command(name = "simdata")]
#[command(about = "Post-processing for simulation data tables and images", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what a simulation config produces
    Info {
        /// Simulation config file (`key = value` lines)
        sim_config: PathBuf,
    },

    /// Collapse repeated x-values into mean/error points
    Accumulate {
        /// Data table to read (defaults to the one named by --sim-config)
        #[arg(long)]
        data: Option<PathBuf>,
        /// Simulation config naming the data table
        #[arg(long)]
        sim_config: Option<PathBuf>,
        /// Column holding x
        #[arg(short = 'x', long)]
        x_col: usize,
        /// Column holding y
        #[arg(short = 'y', long)]
        y_col: usize,
        /// Column holding the intrinsic error of y
        #[arg(long)]
        dy_col: Option<usize>,
        /// Accumulate each group of this column separately
        #[arg(short, long)]
        group_by: Option<usize>,
        /// Output CSV path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Split a data table into one file per value of a column
    Group {
        /// Data table to read
        data: PathBuf,
        /// Column to group by
        #[arg(long)]
        column: usize,
        /// Output directory for the group tables
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Append the mean and spread of several columns to a table
    Combine {
        /// Data table to read
        data: PathBuf,
        /// Columns holding repeated measurements
        #[arg(long, num_args = 1.., required = true)]
        values: Vec<usize>,
        /// Columns holding intrinsic errors
        #[arg(long, num_args = 1..)]
        errors: Vec<usize>,
        /// Output table path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Crop an image file to a coordinate window
    Crop {
        /// Image file to read
        image: PathBuf,
        /// Window as XMIN XMAX YMIN YMAX
        #[arg(long, num_args = 4, required = true, allow_negative_numbers = true, value_names = ["XMIN", "XMAX", "YMIN", "YMAX"])]
        window: Vec<f64>,
        /// Output image path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Crop every per-shape image of a simulation run
    CropShapes {
        /// Simulation config file
        sim_config: PathBuf,
        /// Window as XMIN XMAX YMIN YMAX
        #[arg(long, num_args = 4, required = true, allow_negative_numbers = true, value_names = ["XMIN", "XMAX", "YMIN", "YMAX"])]
        window: Vec<f64>,
        /// Output directory for cropped images
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Write a simulation config from a YAML template
    WriteConfig {
        /// YAML template describing the header and shapes
        template: PathBuf,
        /// Config file to write
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let config = match &cli.config {
        Some(path) => match AnalysisConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                AnalysisConfig::default()
            }
        },
        None => AnalysisConfig::default(),
    };

    let result = match cli.command {
        Commands::Info { sim_config } => cmd_info(&sim_config, &config),
        Commands::Accumulate {
            data,
            sim_config,
            x_col,
            y_col,
            dy_col,
            group_by,
            output,
        } => cmd_accumulate(
            data,
            sim_config,
            (x_col, y_col, dy_col),
            group_by,
            output,
            &config,
        ),
        Commands::Group {
            data,
            column,
            output_dir,
        } => cmd_group(&data, column, output_dir, &config),
        Commands::Combine {
            data,
            values,
            errors,
            output,
        } => cmd_combine(&data, &values, &errors, &output, &config),
        Commands::Crop {
            image,
            window,
            output,
        } => cmd_crop(&image, &window, &output, &config),
        Commands::CropShapes {
            sim_config,
            window,
            output_dir,
        } => cmd_crop_shapes(&sim_config, &window, output_dir, &config),
        Commands::WriteConfig { template, output } => cmd_write_config(&template, &output),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn window_extent(window: &[f64]) -> Result<Extent> {
    match window {
        [xmin, xmax, ymin, ymax] => Ok(Extent::new(*xmin, *xmax, *ymin, *ymax)),
        _ => bail!("window needs 4 values, got {}", window.len()),
    }
}

fn load_sim_config(path: &Path) -> Result<SimConfig> {
    let sim = SimConfig::from_file(path)
        .with_context(|| format!("failed to read simulation config {}", path.display()))?;
    info!("Loaded simulation config from: {}", path.display());
    Ok(sim)
}

/// Load the data table named directly or through a simulation config.
fn load_data(
    data: Option<PathBuf>,
    sim_config: Option<PathBuf>,
    config: &AnalysisConfig,
) -> Result<(PathBuf, Table)> {
    let (path, config_path) = match (data, sim_config) {
        (Some(path), _) => (path, None),
        (None, Some(cfg)) => {
            let sim = load_sim_config(&cfg)?;
            (sim.data_path(&config.input.data_suffix), Some(cfg))
        }
        (None, None) => bail!("either --data or --sim-config is required"),
    };

    if !path.exists() {
        if let Some(cfg) = &config_path {
            warn!(
                "Data must be produced by running the simulation executable on {} first",
                cfg.display()
            );
        }
    }

    let table = loaders::load_table(&path)
        .with_context(|| format!("failed to load data table {}", path.display()))?;
    Ok((path, table))
}

fn cmd_info(sim_config: &Path, config: &AnalysisConfig) -> Result<()> {
    let sim = load_sim_config(sim_config)?;
    let data_path = sim.data_path(&config.input.data_suffix);
    let figs = sim.figs();

    let n_images = sim.n_shapes.unwrap_or(0) * figs.len();
    let missing = (0..sim.n_shapes.unwrap_or(0))
        .flat_map(|shape| figs.iter().map(move |fig| (shape, fig)))
        .filter(|(shape, fig)| !sim.image_path(*shape, fig).exists())
        .count();

    print_summary(
        "Simulation Config",
        &[
            ("Config", sim_config.display().to_string()),
            ("Prefix", sim.prefix.clone()),
            (
                "Shapes",
                sim.n_shapes.map_or("-".to_string(), |n| n.to_string()),
            ),
            ("Figures", figs.join(", ")),
            ("Data file", data_path.display().to_string()),
            ("Data present", data_path.exists().to_string()),
            ("Images expected", n_images.to_string()),
            ("Images missing", missing.to_string()),
        ],
    );

    Ok(())
}

fn cmd_accumulate(
    data: Option<PathBuf>,
    sim_config: Option<PathBuf>,
    (x_col, y_col, dy_col): (usize, usize, Option<usize>),
    group_by: Option<usize>,
    output: Option<PathBuf>,
    config: &AnalysisConfig,
) -> Result<()> {
    let start = Instant::now();
    let (data_path, table) = load_data(data, sim_config, config)?;

    let output_path = output.unwrap_or_else(|| config.output.dir.join("accumulated.csv"));

    let series: Vec<(Option<f64>, accumulate::Accumulated)> = match group_by {
        Some(col) => {
            let groups = grouping::group_by(&table, col)?;
            let mut series = Vec::with_capacity(groups.len());
            for (key, group) in groups.sorted() {
                let acc = accumulate::accumulate(group, x_col, y_col, dy_col)
                    .with_context(|| format!("failed to accumulate group {}", key))?;
                series.push((Some(key), acc));
            }
            series
        }
        None => vec![(None, accumulate::accumulate(&table, x_col, y_col, dy_col)?)],
    };

    let refs: Vec<(Option<f64>, &accumulate::Accumulated)> =
        series.iter().map(|(k, acc)| (*k, acc)).collect();
    writers::write_accumulated_csv(&output_path, &refs, config.output.precision)?;

    let points: usize = series.iter().map(|(_, acc)| acc.len()).sum();

    print_summary(
        "Accumulation Complete",
        &[
            ("Data file", data_path.display().to_string()),
            ("Rows read", table.num_rows().to_string()),
            ("Series", series.len().to_string()),
            ("Points written", points.to_string()),
            ("Output CSV", output_path.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_group(
    data: &Path,
    column: usize,
    output_dir: Option<PathBuf>,
    config: &AnalysisConfig,
) -> Result<()> {
    let start = Instant::now();
    let table = loaders::load_table(data)
        .with_context(|| format!("failed to load data table {}", data.display()))?;

    let output_dir = output_dir.unwrap_or_else(|| config.output.dir.clone());
    let groups = grouping::group_by(&table, column)?;

    for (idx, (key, group)) in groups.sorted().into_iter().enumerate() {
        writers::write_table(&group_path(&output_dir, idx, key), group, config.output.precision)?;
    }

    print_summary(
        "Grouping Complete",
        &[
            ("Data file", data.display().to_string()),
            ("Column", column.to_string()),
            ("Groups", groups.len().to_string()),
            ("Output directory", output_dir.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

/// File for the `idx`-th group in ascending key order.
///
/// The index keeps names unique when keys differ only past the printed
/// precision; `{}` gives the shortest form that round-trips the key.
fn group_path(output_dir: &Path, idx: usize, key: f64) -> PathBuf {
    output_dir.join(format!("group_{}_{}.txt", idx, key))
}

fn cmd_combine(
    data: &Path,
    values: &[usize],
    errors: &[usize],
    output: &Path,
    config: &AnalysisConfig,
) -> Result<()> {
    let start = Instant::now();
    let table = loaders::load_table(data)
        .with_context(|| format!("failed to load data table {}", data.display()))?;

    let (means, spreads) = transforms::combine_columns(&table, values, errors)?;
    let mean_col = table.num_columns();
    let table = table.with_column(means)?.with_column(spreads)?;

    writers::write_table(output, &table, config.output.precision)?;

    print_summary(
        "Combine Complete",
        &[
            ("Data file", data.display().to_string()),
            ("Value columns", format!("{:?}", values)),
            ("Error columns", format!("{:?}", errors)),
            ("Mean column", mean_col.to_string()),
            ("Spread column", (mean_col + 1).to_string()),
            ("Output", output.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_crop(image: &Path, window: &[f64], output: &Path, config: &AnalysisConfig) -> Result<()> {
    let start = Instant::now();
    let window = window_extent(window)?;

    let source = loaders::load_image(image)
        .with_context(|| format!("failed to load image {}", image.display()))?;
    let cropped = source.crop(window)?;

    writers::write_image(output, &cropped, config.output.precision)?;

    let (xmin, xmax, ymin, ymax) = cropped.extent.as_tuple();
    print_summary(
        "Crop Complete",
        &[
            ("Input image", image.display().to_string()),
            ("Input shape", format!("{:?}", source.shape())),
            ("Output shape", format!("{:?}", cropped.shape())),
            ("Extent", format!("{} {} {} {}", xmin, xmax, ymin, ymax)),
            ("Output", output.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_crop_shapes(
    sim_config: &Path,
    window: &[f64],
    output_dir: Option<PathBuf>,
    config: &AnalysisConfig,
) -> Result<()> {
    let start = Instant::now();
    let window = window_extent(window)?;
    let sim = load_sim_config(sim_config)?;

    let Some(n_shapes) = sim.n_shapes else {
        bail!("{} does not set n_shapes", sim_config.display());
    };
    let figs = sim.figs();
    if figs.is_empty() {
        warn!("{} has no print_ tasks; nothing to crop", sim_config.display());
    }

    let output_dir = output_dir.unwrap_or_else(|| config.output.dir.clone());

    let spinner = create_spinner("Cropping shape images...");
    let cropped = relimit::crop_shape_images(&sim.prefix, n_shapes, &figs, window);
    spinner.finish_and_clear();

    let cropped = cropped.map_err(|e| {
        if matches!(e, relimit::RelimitError::Load { .. }) {
            warn!(
                "Images must be produced by running the simulation executable on {} first",
                sim_config.display()
            );
        }
        e
    })?;

    for item in &cropped {
        let path = output_dir.join(format!("{}{}.txt", item.shape, item.fig));
        writers::write_image(&path, &item.image, config.output.precision)?;
    }

    print_summary(
        "Shape Crop Complete",
        &[
            ("Config", sim_config.display().to_string()),
            ("Shapes", n_shapes.to_string()),
            ("Figures", figs.join(", ")),
            ("Images cropped", cropped.len().to_string()),
            ("Output directory", output_dir.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_write_config(template: &Path, output: &Path) -> Result<()> {
    let template = SimConfigTemplate::from_yaml(template)
        .with_context(|| format!("failed to read config template {}", template.display()))?;
    template.write(output)?;

    print_summary(
        "Config Written",
        &[
            ("Prefix", template.prefix.clone()),
            ("Tasks", template.tasks.join(" ")),
            ("Shapes", template.shapes.len().to_string()),
            ("Output", output.display().to_string()),
        ],
    );

    Ok(())
}
