//! Ligand discovery and batch bookkeeping

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;

use crate::math::Vec3;
use crate::request::{SearchBox, SearchParams};

/// Name prefix of docked poses files written next to their inputs
pub const DOCKED_PREFIX: &str = "docked_";

/// Default ligand file extension
pub const DEFAULT_EXTENSION: &str = "pdbqt";

/// File name of the JSON batch report
pub const REPORT_FILE: &str = "batch_report.json";

/// Errors that stop a batch before any ligand is processed
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Ligand directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("No ligand .{extension} files found in {dir}")]
    NoCandidates { dir: PathBuf, extension: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Ligand files to dock in one batch run
#[derive(Debug, Clone, PartialEq)]
pub struct LigandManifest {
    ligands: Vec<PathBuf>,
}

impl LigandManifest {
    /// Find ligand files in `dir`
    ///
    /// Keeps regular files with `extension` (case-insensitive), leaving out the
    /// receptor itself and any earlier docked output. Paths are sorted so
    /// repeated runs process ligands in the same order.
    pub fn discover(dir: &Path, receptor: &Path, extension: &str) -> Result<Self, BatchError> {
        if !dir.is_dir() {
            return Err(BatchError::MissingDirectory(dir.to_path_buf()));
        }

        let receptor = fs::canonicalize(receptor).unwrap_or_else(|_| receptor.to_path_buf());
        let extension = extension.trim_start_matches('.');

        let mut ligands = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            let matches_extension = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| e.eq_ignore_ascii_case(extension));
            if !matches_extension {
                continue;
            }

            let is_prior_output = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with(DOCKED_PREFIX));
            if is_prior_output {
                continue;
            }

            let canonical = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
            if canonical == receptor {
                continue;
            }

            ligands.push(path);
        }

        if ligands.is_empty() {
            return Err(BatchError::NoCandidates {
                dir: dir.to_path_buf(),
                extension: extension.to_string(),
            });
        }

        ligands.sort();
        Ok(Self { ligands })
    }

    /// Manifest of explicitly chosen ligands
    pub fn from_paths(ligands: Vec<PathBuf>) -> Self {
        Self { ligands }
    }

    pub fn ligands(&self) -> &[PathBuf] {
        &self.ligands
    }

    pub fn len(&self) -> usize {
        self.ligands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ligands.is_empty()
    }
}

/// What happened to one ligand
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LigandOutcome {
    /// Poses were found and persisted
    Docked {
        table: PathBuf,
        poses: Option<PathBuf>,
        pose_count: usize,
        best_affinity: Option<f64>,
    },

    /// The engine ran but no pose could be read; a header-only table was written
    NoPoses { table: PathBuf, reason: String },

    /// The ligand could not be docked
    Failed { reason: String },
}

impl LigandOutcome {
    pub fn is_docked(&self) -> bool {
        matches!(self, LigandOutcome::Docked { .. })
    }
}

/// Outcome of one ligand, tagged with its identifier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LigandReport {
    pub ligand: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: LigandOutcome,
}

/// Overall verdict of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every ligand was docked
    Complete,
    /// Some but not all ligands were docked
    Partial,
    /// No ligand was docked
    Failed,
}

impl BatchStatus {
    /// Process exit code for this status
    pub fn exit_code(self) -> ExitCode {
        match self {
            BatchStatus::Complete => ExitCode::SUCCESS,
            BatchStatus::Partial => ExitCode::from(2),
            BatchStatus::Failed => ExitCode::from(3),
        }
    }
}

/// Box and search effort shared by every ligand of a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchRecord {
    pub center: Vec3,
    pub size: Vec3,
    #[serde(flatten)]
    pub params: SearchParams,
}

impl SearchRecord {
    pub fn new(search_box: &SearchBox, params: SearchParams) -> Self {
        Self {
            center: search_box.center.into(),
            size: search_box.size.into(),
            params,
        }
    }
}

/// Everything a batch run attempted, in processing order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub receptor: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchRecord>,
    pub ligands: Vec<LigandReport>,
}

impl BatchReport {
    pub fn new(receptor: impl Into<PathBuf>) -> Self {
        Self {
            receptor: receptor.into(),
            search: None,
            ligands: Vec::new(),
        }
    }

    /// Record the box and search settings the ligands were docked with
    pub fn with_search(mut self, search_box: &SearchBox, params: SearchParams) -> Self {
        self.search = Some(SearchRecord::new(search_box, params));
        self
    }

    pub fn push(&mut self, report: LigandReport) {
        self.ligands.push(report);
    }

    pub fn docked(&self) -> usize {
        self.ligands.iter().filter(|l| l.outcome.is_docked()).count()
    }

    pub fn status(&self) -> BatchStatus {
        let docked = self.docked();
        if docked == self.ligands.len() && docked > 0 {
            BatchStatus::Complete
        } else if docked > 0 {
            BatchStatus::Partial
        } else {
            BatchStatus::Failed
        }
    }

    /// Write the report as pretty JSON to `<dir>/batch_report.json`
    pub fn write_json(&self, dir: &Path) -> Result<PathBuf, BatchError> {
        #[derive(Serialize)]
        struct Document<'a> {
            status: BatchStatus,
            docked: usize,
            total: usize,
            #[serde(flatten)]
            report: &'a BatchReport,
        }

        fs::create_dir_all(dir)?;
        let path = dir.join(REPORT_FILE);
        let document = Document {
            status: self.status(),
            docked: self.docked(),
            total: self.ligands.len(),
            report: self,
        };
        fs::write(&path, serde_json::to_string_pretty(&document)?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "").unwrap();
        path
    }

    #[test]
    fn test_discover_excludes_receptor_and_outputs() {
        let dir = tempdir().unwrap();
        let receptor = touch(dir.path(), "rec.pdbqt");
        touch(dir.path(), "ligB.pdbqt");
        touch(dir.path(), "ligA.PDBQT");
        touch(dir.path(), "docked_ligA.pdbqt");
        touch(dir.path(), "ligA_scores.csv");
        touch(dir.path(), "notes.txt");
        fs::create_dir(dir.path().join("sub.pdbqt")).unwrap();

        let manifest = LigandManifest::discover(dir.path(), &receptor, "pdbqt").unwrap();
        let names: Vec<String> = manifest
            .ligands()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["ligA.PDBQT", "ligB.pdbqt"]);
    }

    #[test]
    fn test_receptor_given_by_other_spelling_is_excluded() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "rec.pdbqt");
        touch(dir.path(), "lig.pdbqt");
        let receptor = dir.path().join(".").join("rec.pdbqt");

        let manifest = LigandManifest::discover(dir.path(), &receptor, ".pdbqt").unwrap();
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempdir().unwrap();
        let err = LigandManifest::discover(
            &dir.path().join("absent"),
            &dir.path().join("rec.pdbqt"),
            "pdbqt",
        )
        .unwrap_err();
        assert!(matches!(err, BatchError::MissingDirectory(_)));
    }

    #[test]
    fn test_no_candidates() {
        let dir = tempdir().unwrap();
        let receptor = touch(dir.path(), "rec.pdbqt");
        touch(dir.path(), "docked_old.pdbqt");
        let err = LigandManifest::discover(dir.path(), &receptor, "pdbqt").unwrap_err();
        assert!(matches!(err, BatchError::NoCandidates { .. }));
    }

    fn report(outcome: LigandOutcome) -> LigandReport {
        LigandReport {
            ligand: "lig".to_string(),
            path: PathBuf::from("lig.pdbqt"),
            outcome,
        }
    }

    fn docked() -> LigandOutcome {
        LigandOutcome::Docked {
            table: PathBuf::from("lig_scores.csv"),
            poses: None,
            pose_count: 1,
            best_affinity: Some(-7.0),
        }
    }

    #[test]
    fn test_status() {
        let mut batch = BatchReport::new("rec.pdbqt");
        assert_eq!(batch.status(), BatchStatus::Failed);

        batch.push(report(docked()));
        assert_eq!(batch.status(), BatchStatus::Complete);

        batch.push(report(LigandOutcome::NoPoses {
            table: PathBuf::from("x_scores.csv"),
            reason: "no result lines".to_string(),
        }));
        assert_eq!(batch.status(), BatchStatus::Partial);

        let mut failed = BatchReport::new("rec.pdbqt");
        failed.push(report(LigandOutcome::Failed {
            reason: "boom".to_string(),
        }));
        assert_eq!(failed.status(), BatchStatus::Failed);
    }

    #[test]
    fn test_report_json() {
        let dir = tempdir().unwrap();
        let search_box = SearchBox::new(Vector3::new(1.0, -2.0, 3.5), Vector3::repeat(20.0));
        let mut batch = BatchReport::new("rec.pdbqt").with_search(
            &search_box,
            SearchParams {
                seed: Some(42),
                ..SearchParams::default()
            },
        );
        batch.push(report(docked()));
        batch.push(report(LigandOutcome::Failed {
            reason: "engine crashed".to_string(),
        }));

        let path = batch.write_json(dir.path()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();

        assert_eq!(value["status"], "partial");
        assert_eq!(value["docked"], 1);
        assert_eq!(value["total"], 2);
        assert_eq!(value["ligands"][0]["status"], "docked");
        assert_eq!(value["ligands"][0]["pose_count"], 1);
        assert_eq!(value["ligands"][1]["status"], "failed");
        assert_eq!(value["ligands"][1]["reason"], "engine crashed");

        assert_eq!(value["search"]["center"]["y"], -2.0);
        assert_eq!(value["search"]["size"]["z"], 20.0);
        assert_eq!(value["search"]["exhaustiveness"], 8);
        assert_eq!(value["search"]["seed"], 42);
    }

    #[test]
    fn test_report_json_without_search() {
        let dir = tempdir().unwrap();
        let path = BatchReport::new("rec.pdbqt").write_json(dir.path()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert!(value.get("search").is_none());
        assert_eq!(value["total"], 0);
    }
}
