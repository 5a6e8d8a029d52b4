//! AutoDock Vina driven through its command-line executable

use log::{debug, info};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::engine::{DockingEngine, DockingRun, EngineError, EngineOutput};
use crate::request::DockingRequest;

/// How often a running engine is checked when a timeout is set
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Characters of engine output echoed at debug level
const ECHO_LIMIT: usize = 500;

/// Runs the `vina` executable once per ligand
///
/// A single invocation loads the receptor and ligand, computes the grid maps
/// for the box, runs the search and writes the poses file; the poses file is
/// then read back as the text report.
#[derive(Debug, Clone)]
pub struct VinaCli {
    executable: PathBuf,
    timeout: Option<Duration>,
}

impl Default for VinaCli {
    fn default() -> Self {
        Self::new("vina")
    }
}

impl VinaCli {
    pub fn new<P: AsRef<Path>>(executable: P) -> Self {
        Self {
            executable: executable.as_ref().to_path_buf(),
            timeout: None,
        }
    }

    /// Kill the engine when a single ligand takes longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Whether the executable can be launched at all
    pub fn check_available(&self) -> bool {
        Command::new(&self.executable)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }

    /// Command-line arguments for one docking request
    pub fn arguments(request: &DockingRequest, poses_out: &Path) -> Vec<OsString> {
        let center = request.center();
        let size = request.box_size();
        let params = request.params();

        let mut args: Vec<OsString> = vec![
            "--receptor".into(),
            request.receptor().into(),
            "--ligand".into(),
            request.ligand().into(),
        ];

        for (flag, value) in [
            ("--center_x", center.x),
            ("--center_y", center.y),
            ("--center_z", center.z),
            ("--size_x", size.x),
            ("--size_y", size.y),
            ("--size_z", size.z),
        ] {
            args.push(flag.into());
            args.push(value.to_string().into());
        }

        args.push("--exhaustiveness".into());
        args.push(params.exhaustiveness.to_string().into());
        args.push("--num_modes".into());
        args.push(params.num_modes.to_string().into());
        if let Some(seed) = params.seed {
            args.push("--seed".into());
            args.push(seed.to_string().into());
        }

        args.push("--out".into());
        args.push(poses_out.into());
        args
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, EngineError> {
        let Some(limit) = self.timeout else {
            return Ok(child.wait()?);
        };

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }

            let elapsed = started.elapsed();
            if elapsed >= limit {
                // The child may already be gone; either way it must not outlive the deadline
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::Timeout(limit));
            }
            thread::sleep(POLL_INTERVAL.min(limit - elapsed));
        }
    }
}

impl DockingEngine for VinaCli {
    fn name(&self) -> &str {
        "AutoDock Vina"
    }

    fn dock(&self, request: &DockingRequest, poses_out: &Path) -> Result<DockingRun, EngineError> {
        if let Some(parent) = poses_out.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        // Poses left by an earlier run must not pass for this run's output
        if poses_out.exists() {
            debug!("Removing stale poses file {}", poses_out.display());
            fs::remove_file(poses_out)?;
        }

        // Captured in files; a full pipe would stall the engine
        let mut stdout = tempfile::tempfile()?;
        let mut stderr = tempfile::tempfile()?;

        info!(
            "Running {} on {} (exhaustiveness {}, {} poses)",
            self.executable.display(),
            request.ligand().display(),
            request.params().exhaustiveness,
            request.params().num_modes
        );

        let mut child = Command::new(&self.executable)
            .args(Self::arguments(request, poses_out))
            .stdin(Stdio::null())
            .stdout(stdout.try_clone()?)
            .stderr(stderr.try_clone()?)
            .spawn()
            .map_err(|source| EngineError::Launch {
                program: self.executable.display().to_string(),
                source,
            })?;

        let status = self.wait(&mut child)?;
        let out_text = read_back(&mut stdout)?;
        let err_text = read_back(&mut stderr)?;

        debug!(
            "Engine output for {}: {}",
            request.ligand_id(),
            out_text.chars().take(ECHO_LIMIT).collect::<String>()
        );

        if !status.success() {
            let message = if err_text.trim().is_empty() {
                out_text.trim()
            } else {
                err_text.trim()
            };
            return Err(EngineError::Failed {
                status: status.to_string(),
                stderr: message.to_string(),
            });
        }

        if !poses_out.exists() {
            return Err(EngineError::MissingPoses(poses_out.to_path_buf()));
        }

        let report = fs::read_to_string(poses_out)?;
        Ok(DockingRun {
            output: EngineOutput::Report(report),
            poses_path: Some(poses_out.to_path_buf()),
        })
    }
}

fn read_back(file: &mut File) -> std::io::Result<String> {
    let mut bytes = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{SearchBox, SearchParams};
    use nalgebra::Vector3;
    use tempfile::tempdir;

    #[test]
    fn test_arguments() {
        let dir = tempdir().unwrap();
        let receptor = dir.path().join("rec.pdbqt");
        let ligand = dir.path().join("ligA.pdbqt");
        fs::write(&receptor, "").unwrap();
        fs::write(&ligand, "").unwrap();

        let request = DockingRequest::new(
            &receptor,
            &ligand,
            SearchBox::new(Vector3::new(16.0, 25.5, 4.0), Vector3::new(20.0, 20.0, 24.0)),
            SearchParams {
                seed: Some(42),
                ..SearchParams::default()
            },
        )
        .unwrap();

        let out = dir.path().join("docked_ligA.pdbqt");
        let args: Vec<String> = VinaCli::arguments(&request, &out)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let pairs: Vec<(&str, &str)> = args
            .chunks(2)
            .map(|pair| (pair[0].as_str(), pair[1].as_str()))
            .collect();

        assert_eq!(pairs[0], ("--receptor", receptor.to_str().unwrap()));
        assert_eq!(pairs[1], ("--ligand", ligand.to_str().unwrap()));
        assert_eq!(pairs[2], ("--center_x", "16"));
        assert_eq!(pairs[3], ("--center_y", "25.5"));
        assert_eq!(pairs[7], ("--size_z", "24"));
        assert_eq!(pairs[8], ("--exhaustiveness", "8"));
        assert_eq!(pairs[9], ("--num_modes", "10"));
        assert_eq!(pairs[10], ("--seed", "42"));
        assert_eq!(pairs[11], ("--out", out.to_str().unwrap()));
        assert_eq!(pairs.len(), 12);
    }

    #[test]
    fn test_missing_executable_is_a_launch_error() {
        let dir = tempdir().unwrap();
        let receptor = dir.path().join("rec.pdbqt");
        let ligand = dir.path().join("ligA.pdbqt");
        fs::write(&receptor, "").unwrap();
        fs::write(&ligand, "").unwrap();
        let request = DockingRequest::new(
            &receptor,
            &ligand,
            SearchBox::new(Vector3::zeros(), Vector3::repeat(10.0)),
            SearchParams::default(),
        )
        .unwrap();

        let engine = VinaCli::new(dir.path().join("no-such-vina"));
        assert!(!engine.check_available());

        let err = engine
            .dock(&request, &dir.path().join("docked_ligA.pdbqt"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Launch { .. }));
    }
}
