//! Interface to the external docking engine
//!
//! The engine owns receptor preparation, grid maps, the pose search and the
//! scoring function. This crate only hands it a [`DockingRequest`] and collects
//! what it reports back.

pub mod vina;

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::request::DockingRequest;

/// Errors raised by the external docking service
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Docking engine exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Docking engine did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Docking engine reported success but wrote no poses to {0}")]
    MissingPoses(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the engine hands back for one ligand
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutput {
    /// Already structured `(affinity, rmsd lb, rmsd ub)` tuples in engine order
    Poses(Vec<(f64, f64, f64)>),

    /// Opaque text that still has to go through a [`crate::parser::ResultParser`]
    Report(String),
}

/// Result of one successful engine invocation
#[derive(Debug, Clone)]
pub struct DockingRun {
    pub output: EngineOutput,

    /// Docked poses file, when the engine wrote one
    pub poses_path: Option<PathBuf>,
}

/// A blocking docking service
pub trait DockingEngine {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Dock one ligand, writing the docked poses to `poses_out`
    fn dock(&self, request: &DockingRequest, poses_out: &Path) -> Result<DockingRun, EngineError>;
}
