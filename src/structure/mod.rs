//! Lenient PDB/PDBQT coordinate reader
//!
//! Only the fields the pipeline needs are kept: residue names for the
//! rendering fallback and coordinates for deriving a docking box around a
//! reference ligand. Connectivity and torsion trees are left to the docking
//! engine.

use nalgebra::Vector3;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while reading a structure file
#[derive(Error, Debug)]
pub enum StructureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("No atoms in structure")]
    Empty,
}

/// One ATOM/HETATM record
#[derive(Debug, Clone, PartialEq)]
pub struct StructureAtom {
    /// Residue name (e.g. "MK1")
    pub residue_name: String,

    /// Cartesian coordinates in Angstroms
    pub coordinates: Vector3<f64>,
}

/// Atoms of the first model of a structure file
#[derive(Debug, Clone)]
pub struct Structure {
    pub name: String,
    pub atoms: Vec<StructureAtom>,
}

impl Structure {
    /// Number of atoms whose residue name matches `residue_name` (case-insensitive)
    pub fn count_residue_atoms(&self, residue_name: &str) -> usize {
        let wanted = residue_name.trim();
        self.atoms
            .iter()
            .filter(|atom| atom.residue_name.eq_ignore_ascii_case(wanted))
            .count()
    }

    /// Axis-aligned bounding box as (min corner, max corner)
    pub fn bounding_box(&self) -> Result<(Vector3<f64>, Vector3<f64>), StructureError> {
        if self.atoms.is_empty() {
            return Err(StructureError::Empty);
        }

        let mut min = Vector3::repeat(f64::MAX);
        let mut max = Vector3::repeat(f64::MIN);
        for atom in &self.atoms {
            min = min.inf(&atom.coordinates);
            max = max.sup(&atom.coordinates);
        }

        Ok((min, max))
    }
}

/// Read the first model of a PDB or PDBQT file
pub fn read_structure<P: AsRef<Path>>(path: P) -> Result<Structure, StructureError> {
    let file = File::open(path.as_ref())?;
    let name = path
        .as_ref()
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");

    parse_structure(BufReader::new(file), name)
}

/// Parse structure records from any buffered reader
pub fn parse_structure<R: BufRead>(reader: R, name: &str) -> Result<Structure, StructureError> {
    let mut atoms = Vec::new();
    let mut seen_model = false;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = idx + 1;

        if line.starts_with("ATOM") || line.starts_with("HETATM") {
            atoms.push(parse_atom_record(&line, line_number)?);
        } else if line.starts_with("MODEL") {
            // Docked pose files hold one model per pose; the first is the best
            if seen_model {
                break;
            }
            seen_model = true;
        } else if line.starts_with("ENDMDL") {
            break;
        }
    }

    Ok(Structure {
        name: name.to_string(),
        atoms,
    })
}

/// Fixed-column field, tolerating lines shorter than the full record
fn column(line: &str, start: usize, end: usize) -> &str {
    let end = end.min(line.len());
    line.get(start..end).map(str::trim).unwrap_or("")
}

fn parse_atom_record(line: &str, line_number: usize) -> Result<StructureAtom, StructureError> {
    if line.len() < 54 {
        return Err(StructureError::Parse {
            line: line_number,
            message: format!("Line too short for atom record: {}", line),
        });
    }

    let coordinate = |start: usize, end: usize, axis: &str| {
        column(line, start, end)
            .parse::<f64>()
            .map_err(|_| StructureError::Parse {
                line: line_number,
                message: format!("Invalid {} coordinate: {}", axis, column(line, start, end)),
            })
    };

    let x = coordinate(30, 38, "x")?;
    let y = coordinate(38, 46, "y")?;
    let z = coordinate(46, 54, "z")?;

    Ok(StructureAtom {
        residue_name: column(line, 17, 20).to_string(),
        coordinates: Vector3::new(x, y, z),
    })
}
