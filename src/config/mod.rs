//! Configuration types for the analysis pipeline.
//!
//! Two layers are read here: the simulation's own `key = value` config,
//! which names the files a run produced, and an optional YAML file with
//! settings for this tool.

use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing required key '{0}'")]
    MissingKey(&'static str),

    #[error("Invalid value for '{key}': {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("IO error writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Task prefix marking a task that writes an image per shape.
const PRINT_TASK_PREFIX: &str = "print_";

fn separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r"\s+=\s+").expect("separator pattern is valid"))
}

/// Value of a `key = value` line: everything after the last separator.
fn extract_value(line: &str) -> &str {
    separator()
        .split(line)
        .last()
        .unwrap_or_default()
        .trim()
}

/// The parts of a simulation config this tool needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Path prefix of every file the run wrote
    pub prefix: String,
    /// Number of shapes simulated, if given
    pub n_shapes: Option<usize>,
    /// Tasks the executable ran
    pub tasks: Vec<String>,
}

impl SimConfig {
    /// Parse the text of a simulation config.
    ///
    /// Only `prefix`, `n_shapes` and `tasks` lines are read; every other key
    /// (including per-shape blocks) is ignored. Later lines override earlier
    /// ones.
    pub fn parse(text: &str) -> Result<Self> {
        let mut prefix = None;
        let mut n_shapes = None;
        let mut tasks = None;

        for line in text.lines() {
            if line.starts_with("n_shapes") {
                let value = extract_value(line);
                n_shapes = Some(value.parse::<usize>().map_err(|_| ConfigError::InvalidValue {
                    key: "n_shapes",
                    value: value.to_string(),
                })?);
            } else if line.starts_with("prefix") {
                prefix = Some(extract_value(line).to_string());
            } else if line.starts_with("tasks") {
                tasks = Some(
                    extract_value(line)
                        .split_whitespace()
                        .map(str::to_string)
                        .collect(),
                );
            }
        }

        Ok(Self {
            prefix: prefix.ok_or(ConfigError::MissingKey("prefix"))?,
            n_shapes,
            tasks: tasks.unwrap_or_default(),
        })
    }

    /// Read and parse a simulation config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Figures written per shape: each `print_<fig>` task yields `<fig>`.
    pub fn figs(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter_map(|t| t.strip_prefix(PRINT_TASK_PREFIX))
            .map(str::to_string)
            .collect()
    }

    /// Path of the run's data table, `<prefix><suffix>`.
    pub fn data_path(&self, suffix: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", self.prefix, suffix))
    }

    /// Path of one shape's image, `<prefix><shape><fig>.txt`.
    pub fn image_path(&self, shape: usize, fig: &str) -> PathBuf {
        shape_image_path(&self.prefix, shape, fig)
    }
}

/// Path of one shape's image file, `<prefix><shape><fig>.txt`.
pub fn shape_image_path(prefix: &str, shape: usize, fig: &str) -> PathBuf {
    PathBuf::from(format!("{}{}{}.txt", prefix, shape, fig))
}

/// Write one `key = value` line.
pub fn write_option<W: Write>(
    out: &mut W,
    name: &str,
    value: impl Display,
) -> std::io::Result<()> {
    writeln!(out, "{} = {}", name, value)
}

/// Shape parameters, each with a sign column and five decimals.
fn format_params(params: &[f64]) -> String {
    params
        .iter()
        .map(|p| {
            if p.is_sign_negative() {
                format!("{:.5}", p)
            } else {
                format!(" {:.5}", p)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn default_grid_size() -> usize {
    8192
}

fn default_shape_size() -> usize {
    512
}

/// One shape block of a simulation config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeBlock {
    /// Shape type understood by the executable, e.g. `gaussian`
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default = "default_shape_size")]
    pub lx: usize,

    #[serde(default = "default_shape_size")]
    pub ly: usize,

    #[serde(default)]
    pub params: Vec<f64>,
}

/// Everything needed to write a simulation config for the executable.
///
/// The header carries grid size, output prefix, tasks and sensitivities;
/// `n_shapes` is derived from `shapes`, one block per shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfigTemplate {
    #[serde(default = "default_grid_size")]
    pub nx: usize,

    #[serde(default = "default_grid_size")]
    pub ny: usize,

    pub prefix: String,

    #[serde(default)]
    pub tasks: Vec<String>,

    #[serde(default)]
    pub rel_sens: f64,

    #[serde(default)]
    pub abs_sens: f64,

    #[serde(default)]
    pub shapes: Vec<ShapeBlock>,
}

impl SimConfigTemplate {
    /// Load a template from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Write the config as `key = value` lines.
    ///
    /// The header comes first, then each shape block preceded by a blank
    /// line.
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        write_option(out, "nx", self.nx)?;
        write_option(out, "ny", self.ny)?;
        write_option(out, "prefix", &self.prefix)?;
        write_option(out, "tasks", self.tasks.join(" "))?;
        write_option(out, "rel_sens", self.rel_sens)?;
        write_option(out, "abs_sens", self.abs_sens)?;
        write_option(out, "n_shapes", self.shapes.len())?;

        for shape in &self.shapes {
            writeln!(out)?;
            write_option(out, "type", &shape.kind)?;
            write_option(out, "lx", shape.lx)?;
            write_option(out, "ly", shape.ly)?;
            write_option(out, "params", format_params(&shape.params))?;
        }
        Ok(())
    }

    /// Render the config text.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Write the config file, creating parent directories as needed.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let write_err = |source: std::io::Error| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let mut out = BufWriter::new(File::create(path).map_err(write_err)?);
        self.write_to(&mut out).map_err(write_err)?;
        out.flush().map_err(write_err)?;

        log::info!("Wrote simulation config: {}", path.display());
        Ok(())
    }
}

/// Settings for locating input files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Suffix appended to the run prefix to name the data table
    #[serde(default = "default_data_suffix")]
    pub data_suffix: String,
}

fn default_data_suffix() -> String {
    "dat.txt".to_string()
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            data_suffix: default_data_suffix(),
        }
    }
}

/// Settings for written results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory results are written to
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// Digits after the decimal point in written values
    #[serde(default = "default_precision")]
    pub precision: usize,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("fig")
}

fn default_precision() -> usize {
    6
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            precision: default_precision(),
        }
    }
}

/// Tool configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl AnalysisConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }
}
