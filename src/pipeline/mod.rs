//! Per-ligand docking pipeline: request, engine, parser, score table

use log::{error, info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::batch::{BatchReport, LigandManifest, LigandOutcome, LigandReport, DOCKED_PREFIX};
use crate::engine::{DockingEngine, EngineError, EngineOutput};
use crate::parser::{normalize, ParsedReport, ResultParser, VinaRemarkParser};
use crate::request::{ligand_id, DockingRequest, RequestError, SearchBox, SearchParams};
use crate::table::{write_scores, ResultTable, TableError};

/// Errors that end the processing of a single ligand
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid docking request: {0}")]
    Request(#[from] RequestError),

    #[error("Docking engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Score table error: {0}")]
    Table(#[from] TableError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Settings shared by every ligand of a run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub receptor: PathBuf,
    pub out_dir: PathBuf,
    pub search_box: SearchBox,
    pub params: SearchParams,
}

/// Docks ligands one after another against a fixed receptor and box
pub struct Pipeline {
    engine: Box<dyn DockingEngine>,
    parser: Box<dyn ResultParser>,
    settings: PipelineSettings,
}

impl Pipeline {
    /// Pipeline reading engine reports in the Vina remark format
    pub fn new(engine: Box<dyn DockingEngine>, settings: PipelineSettings) -> Self {
        Self {
            engine,
            parser: Box::new(VinaRemarkParser),
            settings,
        }
    }

    pub fn with_parser(mut self, parser: Box<dyn ResultParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Where the docked poses of `ligand` are written
    pub fn poses_path(&self, ligand: &Path) -> PathBuf {
        let file_name = ligand
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.pdbqt", ligand_id(ligand)));
        self.settings
            .out_dir
            .join(format!("{}{}", DOCKED_PREFIX, file_name))
    }

    /// Dock every ligand of `manifest`, never stopping at a failed one
    ///
    /// Ligands sharing an identifier with an earlier entry would overwrite its
    /// score table, so they are reported as failed without being docked.
    pub fn run(&self, manifest: &LigandManifest) -> BatchReport {
        let settings = &self.settings;
        let mut report =
            BatchReport::new(&settings.receptor).with_search(&settings.search_box, settings.params);
        let mut claimed: HashMap<String, &Path> = HashMap::new();
        let total = manifest.len();

        for (i, ligand) in manifest.ligands().iter().enumerate() {
            let id = ligand_id(ligand);
            if let Some(first) = claimed.get(&id) {
                let reason = format!(
                    "ligand identifier {} is already used by {}",
                    id,
                    first.display()
                );
                error!("Skipping {}: {}", ligand.display(), reason);
                report.push(LigandReport {
                    ligand: id,
                    path: ligand.clone(),
                    outcome: LigandOutcome::Failed { reason },
                });
                continue;
            }
            claimed.insert(id, ligand.as_path());

            info!("Docking {} ({}/{})", ligand.display(), i + 1, total);
            report.push(self.process_ligand(ligand));
        }

        info!(
            "Docked {} of {} ligands with {}",
            report.docked(),
            total,
            self.engine.name()
        );
        report
    }

    /// Dock one ligand, turning any failure into a [`LigandOutcome::Failed`]
    pub fn process_ligand(&self, ligand: &Path) -> LigandReport {
        let id = ligand_id(ligand);
        let outcome = match self.dock_ligand(ligand) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Error docking {}: {}", id, e);
                LigandOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        LigandReport {
            ligand: id,
            path: ligand.to_path_buf(),
            outcome,
        }
    }

    /// Request, dock, parse and persist one ligand
    pub fn dock_ligand(&self, ligand: &Path) -> Result<LigandOutcome, PipelineError> {
        let settings = &self.settings;
        let request = DockingRequest::new(
            &settings.receptor,
            ligand,
            settings.search_box,
            settings.params,
        )?;

        fs::create_dir_all(&settings.out_dir)?;
        let run = self.engine.dock(&request, &self.poses_path(ligand))?;

        let limit = settings.params.num_modes;
        let parsed = match &run.output {
            EngineOutput::Report(text) => self.parser.parse(text, limit),
            EngineOutput::Poses(scores) => normalize(scores.iter().copied(), limit),
        };

        let id = request.ligand_id();
        let (table, table_path) = persist(&id, &parsed, &settings.out_dir)?;

        if table.is_empty() {
            let reason = format!(
                "No valid pose data found in {} output ({} format, {} malformed lines)",
                self.engine.name(),
                self.parser.format(),
                parsed.skipped
            );
            warn!("{} for {}", reason, id);
            return Ok(LigandOutcome::NoPoses {
                table: table_path,
                reason,
            });
        }

        info!(
            "Results for {} saved to {} ({} poses, best {:.2} kcal/mol)",
            id,
            table_path.display(),
            table.len(),
            table.best_affinity().unwrap_or_default()
        );

        Ok(LigandOutcome::Docked {
            table: table_path,
            poses: run.poses_path.filter(|p| p.exists()),
            pose_count: table.len(),
            best_affinity: table.best_affinity(),
        })
    }
}

/// Re-derive a score table from a poses file written by an earlier run
///
/// The `docked_` prefix is dropped from the ligand identifier so the table
/// lands under the same name a fresh docking run would use.
pub fn score_poses_file(
    parser: &dyn ResultParser,
    poses: &Path,
    limit: usize,
    out_dir: &Path,
) -> Result<(ResultTable, PathBuf), PipelineError> {
    let text = fs::read_to_string(poses)?;
    let parsed = parser.parse(&text, limit);

    let id = ligand_id(poses);
    let id = id.strip_prefix(DOCKED_PREFIX).unwrap_or(id.as_str()).to_string();

    if parsed.is_empty() {
        warn!("No valid pose data found in {}", poses.display());
    }
    Ok(persist(&id, &parsed, out_dir)?)
}

fn persist(
    ligand: &str,
    parsed: &ParsedReport,
    out_dir: &Path,
) -> Result<(ResultTable, PathBuf), TableError> {
    let table = ResultTable::from_scores(
        ligand,
        parsed
            .poses
            .iter()
            .map(|p| (p.affinity, p.rmsd_lb, p.rmsd_ub)),
    );
    let path = write_scores(&table, out_dir)?;
    Ok((table, path))
}
