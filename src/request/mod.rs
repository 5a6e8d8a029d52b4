//! Docking request construction and validation

use nalgebra::Vector3;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::structure::Structure;

/// Errors raised while assembling a docking request
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Input file not found: {0}")]
    MissingFile(PathBuf),

    #[error("Box size along {axis} must be positive, got {value}")]
    InvalidBoxSize { axis: char, value: f64 },

    #[error("Box center along {axis} must be finite, got {value}")]
    InvalidCenter { axis: char, value: f64 },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Config error at line {line}: {message}")]
    Config { line: usize, message: String },

    #[error("Structure error: {0}")]
    Structure(#[from] crate::structure::StructureError),
}

/// The region the docking engine searches, in Angstroms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchBox {
    pub center: Vector3<f64>,
    pub size: Vector3<f64>,
}

impl SearchBox {
    pub fn new(center: Vector3<f64>, size: Vector3<f64>) -> Self {
        Self { center, size }
    }

    /// Box enclosing a reference structure with `padding` added on every side
    pub fn around(structure: &Structure, padding: f64) -> Result<Self, RequestError> {
        if !padding.is_finite() || padding < 0.0 {
            return Err(RequestError::InvalidParameter(format!(
                "autobox padding must be non-negative, got {}",
                padding
            )));
        }

        let (min, max) = structure.bounding_box()?;
        let center = (min + max) / 2.0;
        let size = (max - min).add_scalar(2.0 * padding);

        Ok(Self { center, size })
    }

    fn validate(&self) -> Result<(), RequestError> {
        for (axis, value) in ['x', 'y', 'z'].into_iter().zip(self.center.iter()) {
            if !value.is_finite() {
                return Err(RequestError::InvalidCenter {
                    axis,
                    value: *value,
                });
            }
        }

        for (axis, value) in ['x', 'y', 'z'].into_iter().zip(self.size.iter()) {
            // Written so that NaN is rejected too
            if !(*value > 0.0 && value.is_finite()) {
                return Err(RequestError::InvalidBoxSize {
                    axis,
                    value: *value,
                });
            }
        }

        Ok(())
    }
}

/// Search effort settings passed through to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchParams {
    /// Exhaustiveness of the global search
    pub exhaustiveness: usize,

    /// Maximum number of poses to report
    pub num_modes: usize,

    /// Random seed; the engine picks one when absent
    pub seed: Option<u64>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            exhaustiveness: 8,
            num_modes: 10,
            seed: None,
        }
    }
}

/// A validated request to dock one ligand against one receptor
#[derive(Debug, Clone, PartialEq)]
pub struct DockingRequest {
    receptor: PathBuf,
    ligand: PathBuf,
    search_box: SearchBox,
    params: SearchParams,
}

impl DockingRequest {
    /// Validate the inputs and build a request
    ///
    /// Values are never adjusted: anything out of range is rejected.
    pub fn new(
        receptor: impl Into<PathBuf>,
        ligand: impl Into<PathBuf>,
        search_box: SearchBox,
        params: SearchParams,
    ) -> Result<Self, RequestError> {
        let receptor = receptor.into();
        let ligand = ligand.into();

        for path in [&receptor, &ligand] {
            if !path.exists() {
                return Err(RequestError::MissingFile(path.clone()));
            }
        }

        search_box.validate()?;

        if params.exhaustiveness == 0 {
            return Err(RequestError::InvalidParameter(
                "exhaustiveness must be at least 1".to_string(),
            ));
        }
        if params.num_modes == 0 {
            return Err(RequestError::InvalidParameter(
                "number of poses must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            receptor,
            ligand,
            search_box,
            params,
        })
    }

    pub fn receptor(&self) -> &Path {
        &self.receptor
    }

    pub fn ligand(&self) -> &Path {
        &self.ligand
    }

    pub fn center(&self) -> Vector3<f64> {
        self.search_box.center
    }

    pub fn box_size(&self) -> Vector3<f64> {
        self.search_box.size
    }

    pub fn params(&self) -> SearchParams {
        self.params
    }

    /// Identifier used in logs and table names: the ligand file stem
    pub fn ligand_id(&self) -> String {
        ligand_id(&self.ligand)
    }
}

/// File stem of a ligand path, falling back to the whole file name
pub fn ligand_id(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Settings read from a Vina-style `key = value` config file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DockingConfig {
    pub search_box: Option<SearchBox>,
    pub exhaustiveness: Option<usize>,
    pub num_modes: Option<usize>,
    pub seed: Option<u64>,
}

/// Parse a Vina configuration file body
///
/// Blank lines, `#` comments and keys that are not about the search box or
/// search effort (receptor, ligand, out, cpu, ...) are ignored. The box is only
/// reported when all six coordinates are present.
pub fn parse_config(config_str: &str) -> Result<DockingConfig, RequestError> {
    let mut center = [None; 3];
    let mut size = [None; 3];
    let mut config = DockingConfig::default();

    for (idx, line) in config_str.lines().enumerate() {
        let line_number = idx + 1;
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        let float = || {
            value.parse::<f64>().map_err(|_| RequestError::Config {
                line: line_number,
                message: format!("{} is not a number: {}", key, value),
            })
        };
        let integer = || {
            value.parse::<u64>().map_err(|_| RequestError::Config {
                line: line_number,
                message: format!("{} is not a non-negative integer: {}", key, value),
            })
        };

        match key {
            "center_x" => center[0] = Some(float()?),
            "center_y" => center[1] = Some(float()?),
            "center_z" => center[2] = Some(float()?),
            "size_x" => size[0] = Some(float()?),
            "size_y" => size[1] = Some(float()?),
            "size_z" => size[2] = Some(float()?),
            "exhaustiveness" => config.exhaustiveness = Some(integer()? as usize),
            "num_modes" => config.num_modes = Some(integer()? as usize),
            "seed" => config.seed = Some(integer()?),
            _ => {} // Ignore other keys
        }
    }

    match (center, size) {
        ([Some(cx), Some(cy), Some(cz)], [Some(sx), Some(sy), Some(sz)]) => {
            config.search_box = Some(SearchBox::new(
                Vector3::new(cx, cy, cz),
                Vector3::new(sx, sy, sz),
            ));
        }
        ([None, None, None], [None, None, None]) => {}
        _ => {
            return Err(RequestError::Config {
                line: 0,
                message: "center_x/y/z and size_x/y/z must all be given together".to_string(),
            })
        }
    }

    Ok(config)
}
