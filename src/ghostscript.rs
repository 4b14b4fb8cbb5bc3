//! # Ghostscript Invocation
//!
//! Runs the external `gs` binary. The [`ToolRunner`] trait is the seam
//! between the compressor's search policy and actual process spawning, so
//! the policy can be exercised without Ghostscript installed.

use crate::error::{AttemptError, CompressError, Result};
use crate::profile::{Profile, QualityPreset};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Ceiling for a single compression pass.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(60);

/// Ceiling for the `--version` availability probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs an external program to completion under a deadline.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String], timeout: Duration)
        -> std::result::Result<(), AttemptError>;
}

/// Spawns real processes with `tokio::process`.
///
/// stdin is closed, stdout discarded and stderr captured for diagnostics.
/// The child is killed if the deadline passes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> std::result::Result<(), AttemptError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| launch_error(program, e))?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| launch_error(program, e))?,
            Err(_) => {
                return Err(AttemptError::TimedOut {
                    program: program.to_string(),
                    after: timeout,
                })
            }
        };

        if output.status.success() {
            Ok(())
        } else {
            Err(AttemptError::ToolExecutionFailed {
                program: program.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

fn launch_error(program: &str, e: std::io::Error) -> AttemptError {
    if e.kind() == ErrorKind::NotFound {
        AttemptError::ExecutableNotFound {
            program: program.to_string(),
        }
    } else {
        AttemptError::Launch {
            program: program.to_string(),
            source: e,
        }
    }
}

/// Arguments for one `pdfwrite` pass from `input` to `output`.
pub fn pdfwrite_args(profile: &Profile, output: &Path, input: &Path) -> Vec<String> {
    let mut args = vec![
        "-sDEVICE=pdfwrite".to_string(),
        "-dCompatibilityLevel=1.4".to_string(),
        profile.quality.directive(),
        "-dNOPAUSE".to_string(),
        "-dQUIET".to_string(),
        "-dBATCH".to_string(),
    ];
    args.extend(profile.extra_args.iter().cloned());
    args.push(format!("-sOutputFile={}", output.display()));
    args.push(input.display().to_string());
    args
}

/// Checks whether `program` answers `--version` within `timeout`.
///
/// Every failure, including the timeout, counts as unavailable.
pub async fn probe(runner: &dyn ToolRunner, program: &str, timeout: Duration) -> bool {
    let args = ["--version".to_string()];
    match runner.run(program, &args, timeout).await {
        Ok(()) => true,
        Err(e) => {
            log::debug!("probe of {program} failed: {e}");
            false
        }
    }
}

/// Returns the first candidate that passes [`probe`].
pub async fn probe_any(
    runner: &dyn ToolRunner,
    candidates: &[String],
    timeout: Duration,
) -> Option<String> {
    for candidate in candidates {
        if probe(runner, candidate, timeout).await {
            return Some(candidate.clone());
        }
    }
    None
}

/// Compresses an in-memory PDF with a single preset.
///
/// The buffer is staged in `temp_dir`; both the staged input and the output
/// are removed before returning, whatever the outcome. Candidates are tried
/// in order until one runs.
pub async fn compress_bytes(
    runner: &dyn ToolRunner,
    candidates: &[String],
    data: &[u8],
    quality: QualityPreset,
    timeout: Duration,
    temp_dir: &Path,
) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Err(CompressError::EmptyInput.into());
    }
    if candidates.is_empty() {
        return Err(CompressError::NoCandidates.into());
    }

    let stamp = chrono::Local::now().timestamp_millis();
    let input = tempfile::Builder::new()
        .prefix(&format!("gs_input_{stamp}_"))
        .suffix(".pdf")
        .tempfile_in(temp_dir)?
        .into_temp_path();
    let output = tempfile::Builder::new()
        .prefix(&format!("gs_output_{stamp}_"))
        .suffix(".pdf")
        .tempfile_in(temp_dir)?
        .into_temp_path();

    tokio::fs::write(&input, data).await?;

    let args = pdfwrite_args(&Profile::preset(quality), &output, &input);
    let mut last_err = None;
    for program in candidates {
        match runner.run(program, &args, timeout).await {
            Ok(()) => {
                let bytes = tokio::fs::read(&output).await?;
                if !bytes.is_empty() {
                    return Ok(bytes);
                }
                log::warn!("{program} exited cleanly but wrote nothing");
                last_err = Some(AttemptError::MissingOutput {
                    program: program.clone(),
                    source: None,
                });
            }
            Err(e) => {
                log::warn!("single-pass compression with {program} failed: {e}");
                last_err = Some(e);
            }
        }
    }

    match last_err {
        Some(source) => Err(CompressError::Unavailable { source }.into()),
        None => Err(CompressError::NoCandidates.into()),
    }
}
