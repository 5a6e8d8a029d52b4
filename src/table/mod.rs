//! Per-ligand score tables and their CSV persistence

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Column names of a score table, in order
pub const HEADER: [&str; 4] = ["Pose", "Affinity (kcal/mol)", "RMSD l.b.", "RMSD u.b."];

/// File name suffix identifying score tables
pub const TABLE_SUFFIX: &str = "_scores.csv";

/// Errors that can occur while reading or writing score tables
#[derive(Error, Debug)]
pub enum TableError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unexpected header in {path}: {found}")]
    Header { path: PathBuf, found: String },

    #[error("Pose {found} out of order in {path}, expected {expected}")]
    PoseOrder {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("Not a score table name: {0}")]
    Name(PathBuf),
}

/// One scored pose as reported by the docking engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseResult {
    /// 1-based pose index
    #[serde(rename = "Pose")]
    pub pose: usize,

    /// Predicted binding affinity in kcal/mol (more negative binds tighter)
    #[serde(rename = "Affinity (kcal/mol)")]
    pub affinity: f64,

    /// RMSD lower bound from the best pose
    #[serde(rename = "RMSD l.b.")]
    pub rmsd_lb: f64,

    /// RMSD upper bound from the best pose
    #[serde(rename = "RMSD u.b.")]
    pub rmsd_ub: f64,
}

impl PoseResult {
    /// Whether the bounds satisfy `0 <= lb <= ub` and the affinity is a number
    pub fn is_consistent(&self) -> bool {
        self.affinity.is_finite()
            && self.rmsd_lb.is_finite()
            && self.rmsd_ub.is_finite()
            && self.rmsd_lb >= 0.0
            && self.rmsd_ub >= self.rmsd_lb
    }
}

/// Ordered poses of one ligand
///
/// Pose indices are always 1..=n in order; the constructor numbers them.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    ligand: String,
    poses: Vec<PoseResult>,
}

impl ResultTable {
    /// Number `(affinity, lb, ub)` triples in the order given
    pub fn from_scores<I>(ligand: impl Into<String>, scores: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64, f64)>,
    {
        let poses = scores
            .into_iter()
            .enumerate()
            .map(|(i, (affinity, rmsd_lb, rmsd_ub))| PoseResult {
                pose: i + 1,
                affinity,
                rmsd_lb,
                rmsd_ub,
            })
            .collect();

        Self {
            ligand: ligand.into(),
            poses,
        }
    }

    pub fn empty(ligand: impl Into<String>) -> Self {
        Self {
            ligand: ligand.into(),
            poses: Vec::new(),
        }
    }

    pub fn ligand(&self) -> &str {
        &self.ligand
    }

    pub fn poses(&self) -> &[PoseResult] {
        &self.poses
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Best (most negative) affinity, if any pose exists
    pub fn best_affinity(&self) -> Option<f64> {
        self.poses.iter().map(|p| p.affinity).reduce(f64::min)
    }

    /// Affinity column
    pub fn affinities(&self) -> Vec<f64> {
        self.poses.iter().map(|p| p.affinity).collect()
    }
}

/// Path of the score table for `ligand` inside `dir`
pub fn table_path(dir: &Path, ligand: &str) -> PathBuf {
    dir.join(format!("{}{}", ligand, TABLE_SUFFIX))
}

/// Ligand identifier encoded in a score table's file name
pub fn ligand_from_table_path(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_suffix(TABLE_SUFFIX))
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
}

/// Serialize a table to CSV bytes, header first even when there are no poses
pub fn to_csv_bytes(table: &ResultTable) -> Result<Vec<u8>, TableError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(HEADER)?;
    for pose in table.poses() {
        writer.serialize(pose)?;
    }

    writer
        .into_inner()
        .map_err(|e| TableError::Io(e.into_error()))
}

/// Write `table` to `<dir>/<ligand>_scores.csv`, replacing any previous table
///
/// The table is rendered in memory and moved into place in one rename, so a
/// reader never observes a half-written file.
pub fn write_scores(table: &ResultTable, dir: &Path) -> Result<PathBuf, TableError> {
    fs::create_dir_all(dir)?;

    let bytes = to_csv_bytes(table)?;
    let path = table_path(dir, table.ligand());

    let mut staging = NamedTempFile::new_in(dir)?;
    staging.write_all(&bytes)?;
    staging.flush()?;
    staging.persist(&path).map_err(|e| TableError::Io(e.error))?;

    Ok(path)
}

/// Read a score table written by [`write_scores`]
pub fn read_scores(path: &Path) -> Result<ResultTable, TableError> {
    let ligand =
        ligand_from_table_path(path).ok_or_else(|| TableError::Name(path.to_path_buf()))?;

    let mut reader = csv::Reader::from_path(path)?;

    let headers = reader.headers()?.clone();
    if headers.iter().ne(HEADER.iter().copied()) {
        return Err(TableError::Header {
            path: path.to_path_buf(),
            found: headers.iter().collect::<Vec<_>>().join(","),
        });
    }

    let mut poses = Vec::new();
    for record in reader.deserialize() {
        let pose: PoseResult = record?;
        let expected = poses.len() + 1;
        if pose.pose != expected {
            return Err(TableError::PoseOrder {
                path: path.to_path_buf(),
                expected,
                found: pose.pose,
            });
        }
        poses.push(pose);
    }

    Ok(ResultTable { ligand, poses })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> ResultTable {
        ResultTable::from_scores(
            "ligA",
            vec![(-7.3, 0.0, 0.0), (-6.85, 1.234, 2.5), (-6.1, 3.0, 7.75)],
        )
    }

    #[test]
    fn test_from_scores_numbers_poses() {
        let table = sample();
        let indices: Vec<usize> = table.poses().iter().map(|p| p.pose).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(table.best_affinity(), Some(-7.3));
    }

    #[test]
    fn test_csv_layout() {
        let text = String::from_utf8(to_csv_bytes(&sample()).unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Pose,Affinity (kcal/mol),RMSD l.b.,RMSD u.b.");
        assert_eq!(lines[1], "1,-7.3,0.0,0.0");
        assert_eq!(lines[2], "2,-6.85,1.234,2.5");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_empty_table_is_header_only() {
        let dir = tempdir().unwrap();
        let path = write_scores(&ResultTable::empty("ligZ"), dir.path()).unwrap();
        assert_eq!(path, dir.path().join("ligZ_scores.csv"));

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Pose,Affinity (kcal/mol),RMSD l.b.,RMSD u.b.\n");

        let table = read_scores(&path).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.ligand(), "ligZ");
    }

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        let table = sample();
        let path = write_scores(&table, dir.path()).unwrap();
        assert_eq!(read_scores(&path).unwrap(), table);
    }

    #[test]
    fn test_rewrite_is_byte_identical() {
        let dir = tempdir().unwrap();
        let table = sample();
        let path = write_scores(&table, dir.path()).unwrap();
        let first = fs::read(&path).unwrap();
        write_scores(&table, dir.path()).unwrap();
        assert_eq!(fs::read(&path).unwrap(), first);
    }

    #[test]
    fn test_write_creates_directory_and_overwrites() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("results").join("run1");
        write_scores(&sample(), &nested).unwrap();

        let path = write_scores(&ResultTable::from_scores("ligA", vec![(-5.0, 0.0, 0.0)]), &nested)
            .unwrap();
        assert_eq!(read_scores(&path).unwrap().len(), 1);

        // Only the table itself remains, no staging files
        let entries = fs::read_dir(&nested).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_read_rejects_gaps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ligB_scores.csv");
        fs::write(
            &path,
            "Pose,Affinity (kcal/mol),RMSD l.b.,RMSD u.b.\n1,-7.0,0,0\n3,-6.0,1,2\n",
        )
        .unwrap();
        let err = read_scores(&path).unwrap_err();
        assert!(matches!(err, TableError::PoseOrder { expected: 2, found: 3, .. }));
    }

    #[test]
    fn test_read_rejects_foreign_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ligC_scores.csv");
        fs::write(&path, "mode,energy\n1,-7.0\n").unwrap();
        assert!(matches!(read_scores(&path), Err(TableError::Header { .. })));
    }

    #[test]
    fn test_ligand_from_table_path() {
        assert_eq!(
            ligand_from_table_path(Path::new("out/ligA_scores.csv")),
            Some("ligA".to_string())
        );
        assert_eq!(ligand_from_table_path(Path::new("out/_scores.csv")), None);
        assert_eq!(ligand_from_table_path(Path::new("out/ligA.csv")), None);
    }

    #[test]
    fn test_consistency() {
        let ok = PoseResult {
            pose: 1,
            affinity: -7.0,
            rmsd_lb: 1.0,
            rmsd_ub: 2.0,
        };
        assert!(ok.is_consistent());
        assert!(!PoseResult { rmsd_lb: -0.1, ..ok }.is_consistent());
        assert!(!PoseResult { rmsd_ub: 0.5, ..ok }.is_consistent());
    }
}
