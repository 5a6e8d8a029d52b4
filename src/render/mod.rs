//! Rendering docked complexes with PyMOL
//!
//! PyMOL runs headless (`-c`), quiet (`-q`) and reads commands from stdin
//! (`-p`). A [`RenderSession`] owns that process: it is launched explicitly,
//! fed commands, and either finished cleanly or killed when dropped.

use log::{debug, error, info, warn};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use thiserror::Error;

use crate::request::ligand_id;
use crate::structure::read_structure;

/// Selection used when the named ligand residue has no atoms
pub const FALLBACK_LIGAND_SELECTION: &str = "ligand and not resn HOH";

/// Errors raised while rendering a complex
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Input file not found: {0}")]
    MissingFile(PathBuf),

    #[error("Path cannot be passed to PyMOL: {0}")]
    UnsafePath(PathBuf),

    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Renderer error: {0}")]
    Service(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fixed look of a rendered complex
#[derive(Debug, Clone, PartialEq)]
pub struct RenderStyle {
    /// Residue name of the ligand, shown as sticks
    pub ligand_resname: String,

    /// Receptor chain shown as cartoon
    pub receptor_chain: String,

    pub width: u32,
    pub height: u32,
    pub dpi: u32,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            ligand_resname: "MK1".to_string(),
            receptor_chain: "A".to_string(),
            width: 800,
            height: 600,
            dpi: 300,
        }
    }
}

impl RenderStyle {
    fn ligand_selection(&self) -> String {
        format!("ligand and resn {}", self.ligand_resname)
    }
}

/// Characters that end or chain PyMOL command arguments
const COMMAND_SEPARATORS: [char; 5] = [',', ';', '"', '\n', '\r'];

/// Whether `path` can be spliced into a PyMOL command unchanged
pub fn is_command_safe(path: &Path) -> bool {
    !path.to_string_lossy().contains(&COMMAND_SEPARATORS[..])
}

/// Whether a PyMOL console line reports a failure
fn is_error_line(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("Error") || line.starts_with("Traceback")
}

/// Image path for a ligand: `<out_dir>/<ligand stem>_viz.png`
pub fn image_path(out_dir: &Path, ligand: &Path) -> PathBuf {
    out_dir.join(format!("{}_viz.png", ligand_id(ligand)))
}

/// PyMOL commands that load, style and export one complex
///
/// `ligand_atoms` is the number of atoms in the named ligand residue; zero
/// switches the sticks to [`FALLBACK_LIGAND_SELECTION`].
pub fn complex_commands(
    receptor: &Path,
    ligand: &Path,
    image: &Path,
    style: &RenderStyle,
    ligand_atoms: usize,
) -> Vec<String> {
    let sticks = if ligand_atoms == 0 {
        FALLBACK_LIGAND_SELECTION.to_string()
    } else {
        style.ligand_selection()
    };

    vec![
        format!("load {}, protein", receptor.display()),
        format!("load {}, ligand", ligand.display()),
        format!("show cartoon, protein and chain {}", style.receptor_chain),
        format!("show sticks, {}", sticks),
        "zoom".to_string(),
        "set ray_trace_frames, 1".to_string(),
        "set ray_shadow, 0".to_string(),
        format!(
            "png {}, width={}, height={}, dpi={}, ray=1",
            image.display(),
            style.width,
            style.height,
            style.dpi
        ),
        "delete all".to_string(),
    ]
}

/// A running PyMOL process
pub struct RenderSession {
    program: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: File,
    stderr: File,
}

impl RenderSession {
    /// Launch PyMOL in headless command mode
    pub fn launch(pymol: &Path) -> Result<Self, RenderError> {
        let program = pymol.display().to_string();
        let stdout = tempfile::tempfile()?;
        let stderr = tempfile::tempfile()?;

        let mut child = Command::new(pymol)
            .arg("-cqp")
            .stdin(Stdio::piped())
            .stdout(stdout.try_clone()?)
            .stderr(stderr.try_clone()?)
            .spawn()
            .map_err(|source| RenderError::Launch {
                program: program.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        debug!("Launched {} (pid {})", program, child.id());

        Ok(Self {
            program,
            child: Some(child),
            stdin,
            stdout,
            stderr,
        })
    }

    /// Send one command line
    pub fn command(&mut self, command: &str) -> Result<(), RenderError> {
        debug!("{}> {}", self.program, command);
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| RenderError::Service("session already closed".to_string()))?;
        writeln!(stdin, "{}", command).map_err(|e| {
            RenderError::Service(format!(
                "{} stopped accepting commands: {}",
                self.program, e
            ))
        })
    }

    /// Quit PyMOL, wait for it, and return its console output
    ///
    /// Fails when PyMOL exits unsuccessfully or reports an error line.
    pub fn finish(mut self) -> Result<String, RenderError> {
        // A closed pipe here means PyMOL already exited; its status tells the rest
        let _ = self.command("quit");
        drop(self.stdin.take());

        let status = match self.child.take() {
            Some(mut child) => child.wait()?,
            None => return Err(RenderError::Service("session already closed".to_string())),
        };

        let output = read_back(&mut self.stdout)? + &read_back(&mut self.stderr)?;

        if !status.success() {
            return Err(RenderError::Service(format!(
                "{} exited with {}: {}",
                self.program,
                status,
                output.trim()
            )));
        }

        if let Some(line) = output.lines().find(|line| is_error_line(line)) {
            return Err(RenderError::Service(line.trim().to_string()));
        }

        Ok(output)
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn read_back(file: &mut File) -> std::io::Result<String> {
    let mut bytes = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Render one receptor/ligand complex to `<out_dir>/<ligand stem>_viz.png`
///
/// Missing inputs and paths PyMOL would misread are reported before PyMOL is
/// launched. Any failure is logged and returned.
pub fn render_complex(
    pymol: &Path,
    receptor: &Path,
    ligand: &Path,
    out_dir: &Path,
    style: &RenderStyle,
) -> Result<PathBuf, RenderError> {
    info!(
        "Processing: protein={}, ligand={}",
        receptor.display(),
        ligand.display()
    );

    for path in [receptor, ligand] {
        if !path.exists() {
            let err = RenderError::MissingFile(path.to_path_buf());
            error!("Error processing {}: {}", ligand.display(), err);
            return Err(err);
        }
    }

    let image = image_path(out_dir, ligand);
    for path in [receptor, ligand, image.as_path()] {
        if !is_command_safe(path) {
            let err = RenderError::UnsafePath(path.to_path_buf());
            error!("Error processing {}: {}", ligand.display(), err);
            return Err(err);
        }
    }

    render_existing(pymol, receptor, ligand, out_dir, style).map_err(|e| {
        error!("Error processing {}: {}", ligand.display(), e);
        e
    })
}

fn render_existing(
    pymol: &Path,
    receptor: &Path,
    ligand: &Path,
    out_dir: &Path,
    style: &RenderStyle,
) -> Result<PathBuf, RenderError> {
    let ligand_atoms = match read_structure(ligand) {
        Ok(structure) => structure.count_residue_atoms(&style.ligand_resname),
        Err(e) => {
            warn!("Could not read {}: {}", ligand.display(), e);
            0
        }
    };
    info!("Ligand atoms selected: {}", ligand_atoms);
    if ligand_atoms == 0 {
        warn!(
            "No atoms for resn {}. Using generic selection.",
            style.ligand_resname
        );
    }

    fs::create_dir_all(out_dir)?;
    let image = image_path(out_dir, ligand);
    if image.exists() {
        fs::remove_file(&image)?;
    }

    let mut session = RenderSession::launch(pymol)?;
    for command in complex_commands(receptor, ligand, &image, style, ligand_atoms) {
        session.command(&command)?;
    }
    session.finish()?;

    if !image.exists() {
        return Err(RenderError::Service(format!(
            "no image written to {}",
            image.display()
        )));
    }

    info!("Saved PNG: {}", image.display());
    Ok(image)
}
