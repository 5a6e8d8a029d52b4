//! dockpipe: batch docking pipeline around AutoDock Vina
//!
//! This library prepares docking requests, drives the external docking engine,
//! turns its reports into per-ligand score tables, plots affinity distributions
//! and renders docked complexes with PyMOL. Docking itself is done entirely by
//! the external engine.

pub mod batch;
pub mod engine;
pub mod math;
pub mod parser;
pub mod pipeline;
pub mod plot;
pub mod render;
pub mod request;
pub mod structure;
pub mod table;

// Re-export commonly used types and functions
pub use batch::{BatchReport, BatchStatus, LigandManifest, LigandOutcome};
pub use engine::{vina::VinaCli, DockingEngine, EngineOutput};
pub use parser::{ResultParser, VinaRemarkParser};
pub use pipeline::{Pipeline, PipelineSettings};
pub use request::{DockingRequest, SearchBox, SearchParams};
pub use table::{PoseResult, ResultTable};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
