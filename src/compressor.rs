//! # Best-Effort Compressor
//!
//! Shrinks an uploaded PDF below a size budget by walking a ladder of
//! Ghostscript profiles, from the gentlest preset to the aggressive
//! downsampling pass.
//!
//! ## Search
//!
//! ```text
//!  profiles × candidates, flattened in order
//!  ┌──────────────┬──────────────┬──────────────┬─────
//!  │ ebook × gs64 │ ebook × gs   │ screen × gs64│ ...
//!  └──────────────┴──────────────┴──────────────┴─────
//!     fail → next     ok → profile settled, skip its remaining candidates
//!                     size <= budget → stop, return it
//! ```
//!
//! The smallest successful output is kept as best-so-far and returned if no
//! trial meets the budget. Every output file is held by a [`TempPath`] guard,
//! so anything not handed back to the caller is deleted on every exit path,
//! including early `?` returns.

use crate::error::{AttemptError, CompressError, Result};
use crate::ghostscript::{pdfwrite_args, ProcessRunner, ToolRunner, DEFAULT_RUN_TIMEOUT};
use crate::profile::Profile;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempPath;

/// Everything the compressor needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct CompressorConfig {
    /// Maximum acceptable output size in bytes.
    pub max_bytes: u64,
    /// Profiles in the order they are tried.
    pub profiles: Vec<Profile>,
    /// Ghostscript executables in the order they are tried.
    pub candidates: Vec<String>,
    /// Ceiling for each Ghostscript run.
    pub timeout: Duration,
    /// Where output files are created.
    pub temp_dir: PathBuf,
}

impl CompressorConfig {
    pub fn new(max_bytes: u64, profiles: Vec<Profile>, candidates: Vec<String>) -> Self {
        Self {
            max_bytes,
            profiles,
            candidates,
            timeout: DEFAULT_RUN_TIMEOUT,
            temp_dir: std::env::temp_dir(),
        }
    }
}

/// Per-call overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressOptions {
    /// Budget in bytes, replacing the configured one.
    pub max_bytes: Option<u64>,
}

/// Outcome handed back to the upload flow.
///
/// When `compressed` is true, `path` is a temporary file now owned by the
/// caller; otherwise it is the untouched input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Compressed {
    pub path: PathBuf,
    pub size: u64,
    pub compressed: bool,
}

/// One (profile, candidate) pair of the search.
#[derive(Debug, Clone, Copy)]
pub struct Trial<'a> {
    pub profile_index: usize,
    pub profile: &'a Profile,
    pub program: &'a str,
}

/// A successful trial's output, deleted on drop unless kept.
struct Attempt {
    path: TempPath,
    size: u64,
}

impl Attempt {
    fn keep(self) -> Result<Compressed> {
        let path = self.path.keep().map_err(std::io::Error::from)?;
        Ok(Compressed {
            path,
            size: self.size,
            compressed: true,
        })
    }
}

pub struct Compressor<R = ProcessRunner> {
    config: CompressorConfig,
    runner: R,
    progress: bool,
}

impl Compressor<ProcessRunner> {
    pub fn new(config: CompressorConfig) -> Self {
        Self::with_runner(config, ProcessRunner)
    }
}

impl<R: ToolRunner> Compressor<R> {
    pub fn with_runner(config: CompressorConfig, runner: R) -> Self {
        Self {
            config,
            runner,
            progress: false,
        }
    }

    /// Shows a spinner naming the current trial.
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }

    /// The flattened search order: every candidate under each profile.
    pub fn trials(&self) -> Vec<Trial<'_>> {
        self.config
            .profiles
            .iter()
            .enumerate()
            .flat_map(|(profile_index, profile)| {
                self.config.candidates.iter().map(move |program| Trial {
                    profile_index,
                    profile,
                    program: program.as_str(),
                })
            })
            .collect()
    }

    /// Compresses `input` until it fits the budget, or returns the smallest
    /// result obtained.
    ///
    /// Inputs already within budget are returned as-is after a size check;
    /// no process is spawned. Fails only when no trial succeeded at all.
    pub async fn compress(&self, input: &Path, options: &CompressOptions) -> Result<Compressed> {
        let max_bytes = options.max_bytes.unwrap_or(self.config.max_bytes);
        let size = tokio::fs::metadata(input).await?.len();

        if size <= max_bytes {
            log::info!(
                "{} is {size} bytes, within budget of {max_bytes}; not compressing",
                input.display()
            );
            return Ok(Compressed {
                path: input.to_path_buf(),
                size,
                compressed: false,
            });
        }

        if self.config.profiles.is_empty() {
            return Err(CompressError::NoProfiles.into());
        }
        if self.config.candidates.is_empty() {
            return Err(CompressError::NoCandidates.into());
        }

        let file_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input.pdf".to_string());
        let stamp = chrono::Local::now().timestamp_millis();
        let temp_dir = &self.config.temp_dir;

        self.search(input, size, max_bytes, |trial| {
            Ok(tempfile::Builder::new()
                .prefix(&format!("noteflow_compressed_{stamp}_{}_", trial.profile_index))
                .suffix(&format!("_{file_name}"))
                .tempfile_in(temp_dir)?
                .into_temp_path())
        })
        .await
    }

    /// Walks the trial list. `reserve` names the output file of each trial.
    async fn search<F>(
        &self,
        input: &Path,
        size: u64,
        max_bytes: u64,
        mut reserve: F,
    ) -> Result<Compressed>
    where
        F: FnMut(&Trial<'_>) -> std::io::Result<TempPath>,
    {
        let pb = self.spinner();

        let mut best: Option<Attempt> = None;
        let mut settled: Option<usize> = None;
        let mut last_err: Option<AttemptError> = None;

        for trial in self.trials() {
            if settled == Some(trial.profile_index) {
                continue;
            }

            pb.set_message(format!("{} via {}", trial.profile, trial.program));
            let output = reserve(&trial)?;
            let args = pdfwrite_args(trial.profile, &output, input);

            log::debug!("trying {} with {}", trial.profile, trial.program);
            let out_size = match self.run_trial(trial.program, &args, &output).await {
                Ok(out_size) => out_size,
                Err(e) => {
                    log::warn!("{} with {} failed: {e}", trial.profile, trial.program);
                    last_err = Some(e);
                    continue;
                }
            };
            settled = Some(trial.profile_index);
            log::debug!(
                "{} with {} produced {out_size} bytes",
                trial.profile,
                trial.program
            );

            let attempt = Attempt {
                path: output,
                size: out_size,
            };

            if out_size <= max_bytes {
                pb.finish_and_clear();
                log::info!(
                    "compressed {} from {size} to {out_size} bytes with {}",
                    input.display(),
                    trial.profile
                );
                return attempt.keep();
            }

            if best.as_ref().map_or(true, |b| out_size < b.size) {
                best = Some(attempt);
            }
        }

        pb.finish_and_clear();

        if let Some(best) = best {
            log::info!(
                "no profile met the {max_bytes} byte budget for {}; smallest result is {} bytes",
                input.display(),
                best.size
            );
            return best.keep();
        }

        let source = last_err.ok_or(CompressError::NoCandidates)?;
        Err(CompressError::Unavailable { source }.into())
    }

    /// Runs one trial and measures its output.
    async fn run_trial(
        &self,
        program: &str,
        args: &[String],
        output: &Path,
    ) -> std::result::Result<u64, AttemptError> {
        self.runner.run(program, args, self.config.timeout).await?;
        // The output file exists before the run, so an empty one means the
        // tool never wrote it.
        let len = tokio::fs::metadata(output)
            .await
            .map_err(|e| AttemptError::MissingOutput {
                program: program.to_string(),
                source: Some(e),
            })?
            .len();
        if len == 0 {
            return Err(AttemptError::MissingOutput {
                program: program.to_string(),
                source: None,
            });
        }
        Ok(len)
    }

    fn spinner(&self) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.green} compressing {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NoteflowError;
    use crate::profile::{build_profiles, default_ladder, Downsampling, QualityPreset};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Stands in for Ghostscript: writes an output of a fixed size per profile.
    struct FakeGs {
        sizes: HashMap<&'static str, u64>,
        missing: Vec<&'static str>,
        broken: Vec<&'static str>,
        silent: Vec<&'static str>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeGs {
        fn new(sizes: &[(&'static str, u64)]) -> Self {
            Self {
                sizes: sizes.iter().copied().collect(),
                missing: Vec::new(),
                broken: Vec::new(),
                silent: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn profile_key(args: &[String]) -> String {
        if args.iter().any(|a| a == "-dDetectDuplicateImages=true") {
            return "aggressive".to_string();
        }
        args.iter()
            .find_map(|a| a.strip_prefix("-dPDFSETTINGS=/"))
            .unwrap_or_default()
            .to_string()
    }

    #[async_trait]
    impl ToolRunner for FakeGs {
        async fn run(
            &self,
            program: &str,
            args: &[String],
            _timeout: Duration,
        ) -> std::result::Result<(), AttemptError> {
            let key = profile_key(args);
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), key.clone()));

            if self.missing.contains(&program) {
                return Err(AttemptError::ExecutableNotFound {
                    program: program.to_string(),
                });
            }
            if self.broken.contains(&program) {
                return Err(AttemptError::ToolExecutionFailed {
                    program: program.to_string(),
                    code: Some(1),
                    stderr: "Error: /undefined in --run--".to_string(),
                });
            }

            // Exits 0 without touching -sOutputFile.
            if self.silent.contains(&program) {
                return Ok(());
            }

            let size = self.sizes[key.as_str()];
            let out = args
                .iter()
                .find_map(|a| a.strip_prefix("-sOutputFile="))
                .unwrap();
            std::fs::write(out, vec![0u8; size as usize]).unwrap();
            Ok(())
        }
    }

    struct Fixture {
        _input_dir: tempfile::TempDir,
        temp_dir: tempfile::TempDir,
        input: PathBuf,
    }

    fn fixture(input_size: usize) -> Fixture {
        let input_dir = tempfile::tempdir().unwrap();
        let input = input_dir.path().join("notes.pdf");
        std::fs::write(&input, vec![7u8; input_size]).unwrap();
        Fixture {
            _input_dir: input_dir,
            temp_dir: tempfile::tempdir().unwrap(),
            input,
        }
    }

    fn compressor(
        fx: &Fixture,
        max_bytes: u64,
        candidates: &[&str],
        runner: FakeGs,
    ) -> Compressor<FakeGs> {
        let mut config = CompressorConfig::new(
            max_bytes,
            build_profiles(&default_ladder(), Some(&Downsampling::default())),
            candidates.iter().map(|c| c.to_string()).collect(),
        );
        config.temp_dir = fx.temp_dir.path().to_path_buf();
        Compressor::with_runner(config, runner)
    }

    fn temp_files(fx: &Fixture) -> Vec<PathBuf> {
        std::fs::read_dir(fx.temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    #[tokio::test]
    async fn within_budget_is_returned_untouched() {
        let fx = fixture(9_000);
        let c = compressor(&fx, 10_000, &["gs"], FakeGs::new(&[]));

        let result = c.compress(&fx.input, &CompressOptions::default()).await.unwrap();
        assert_eq!(
            result,
            Compressed {
                path: fx.input.clone(),
                size: 9_000,
                compressed: false
            }
        );
        assert!(c.runner.calls().is_empty());
        assert!(temp_files(&fx).is_empty());
    }

    #[tokio::test]
    async fn second_preset_meets_budget() {
        let fx = fixture(15_000);
        let runner = FakeGs::new(&[("ebook", 12_000), ("screen", 8_000), ("aggressive", 5_000)]);
        let c = compressor(&fx, 10_000, &["gs"], runner);

        let result = c.compress(&fx.input, &CompressOptions::default()).await.unwrap();
        assert!(result.compressed);
        assert_eq!(result.size, 8_000);
        assert_eq!(std::fs::metadata(&result.path).unwrap().len(), 8_000);
        // The 12 000 byte ebook output is gone; only the returned file remains.
        assert_eq!(temp_files(&fx), vec![result.path.clone()]);
        assert_eq!(
            c.runner.calls(),
            vec![
                ("gs".to_string(), "ebook".to_string()),
                ("gs".to_string(), "screen".to_string()),
            ]
        );
        let name = result.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("noteflow_compressed_"));
        assert!(name.ends_with("_notes.pdf"));
        assert!(fx.input.exists());
    }

    #[tokio::test]
    async fn first_preset_within_budget_stops_search() {
        let fx = fixture(15_000);
        let runner = FakeGs::new(&[("ebook", 9_000), ("screen", 1_000), ("aggressive", 500)]);
        let c = compressor(&fx, 10_000, &["gs"], runner);

        let result = c.compress(&fx.input, &CompressOptions::default()).await.unwrap();
        assert_eq!(result.size, 9_000);
        assert_eq!(c.runner.calls().len(), 1);
        assert_eq!(temp_files(&fx).len(), 1);
    }

    #[tokio::test]
    async fn unreachable_budget_returns_smallest() {
        let fx = fixture(15_000);
        let runner = FakeGs::new(&[("ebook", 14_000), ("screen", 11_000), ("aggressive", 12_000)]);
        let c = compressor(&fx, 10_000, &["gs"], runner);

        let result = c.compress(&fx.input, &CompressOptions::default()).await.unwrap();
        assert!(result.compressed);
        assert_eq!(result.size, 11_000);
        assert_eq!(c.runner.calls().len(), 3);
        assert_eq!(temp_files(&fx), vec![result.path.clone()]);
    }

    #[tokio::test]
    async fn missing_tool_fails_and_leaves_nothing() {
        let fx = fixture(15_000);
        let mut runner = FakeGs::new(&[]);
        runner.missing = vec!["gswin64c", "gs"];
        let c = compressor(&fx, 10_000, &["gswin64c", "gs"], runner);

        let err = c
            .compress(&fx.input, &CompressOptions::default())
            .await
            .unwrap_err();
        match &err {
            NoteflowError::Compress(e) => assert!(e.is_executable_not_found()),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("GHOSTSCRIPT_PATH"));
        // Three profiles, two candidates each.
        assert_eq!(c.runner.calls().len(), 6);
        assert!(temp_files(&fx).is_empty());
    }

    #[tokio::test]
    async fn failing_tool_wraps_last_error() {
        let fx = fixture(15_000);
        let mut runner = FakeGs::new(&[]);
        runner.broken = vec!["gs"];
        let c = compressor(&fx, 10_000, &["gs"], runner);

        let err = c
            .compress(&fx.input, &CompressOptions::default())
            .await
            .unwrap_err();
        match err {
            NoteflowError::Compress(CompressError::Unavailable { source }) => {
                assert!(matches!(source, AttemptError::ToolExecutionFailed { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(temp_files(&fx).is_empty());
    }

    #[tokio::test]
    async fn clean_exit_without_output_is_a_failed_trial() {
        let fx = fixture(15_000);
        let mut runner = FakeGs::new(&[]);
        runner.silent = vec!["gs"];
        let c = compressor(&fx, 10_000, &["gs"], runner);

        let err = c
            .compress(&fx.input, &CompressOptions::default())
            .await
            .unwrap_err();
        match err {
            NoteflowError::Compress(CompressError::Unavailable { source }) => {
                assert!(matches!(
                    source,
                    AttemptError::MissingOutput { source: None, .. }
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(c.runner.calls().len(), 3);
        assert!(temp_files(&fx).is_empty());
    }

    #[tokio::test]
    async fn silent_candidate_falls_through_to_next() {
        let fx = fixture(15_000);
        let mut runner = FakeGs::new(&[("ebook", 9_000)]);
        runner.silent = vec!["gswin64c"];
        let c = compressor(&fx, 10_000, &["gswin64c", "gs"], runner);

        let result = c.compress(&fx.input, &CompressOptions::default()).await.unwrap();
        assert!(result.compressed);
        assert_eq!(result.size, 9_000);
        assert_eq!(temp_files(&fx), vec![result.path.clone()]);
    }

    #[tokio::test]
    async fn failure_mid_search_removes_best_so_far() {
        let fx = fixture(15_000);
        let runner = FakeGs::new(&[("ebook", 12_000), ("screen", 11_000), ("aggressive", 10_500)]);
        let c = compressor(&fx, 10_000, &["gs"], runner);

        let dir = fx.temp_dir.path().to_path_buf();
        let mut reserved = 0;
        let err = c
            .search(&fx.input, 15_000, 10_000, |_trial| {
                reserved += 1;
                if reserved > 1 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "no space left on device",
                    ));
                }
                Ok(tempfile::Builder::new()
                    .prefix("noteflow_compressed_")
                    .tempfile_in(&dir)?
                    .into_temp_path())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, NoteflowError::Io(_)));
        // The ebook output was best-so-far when the second reservation failed.
        assert_eq!(c.runner.calls().len(), 1);
        assert!(temp_files(&fx).is_empty());
    }

    #[tokio::test]
    async fn missing_candidate_falls_through_per_profile() {
        let fx = fixture(15_000);
        let mut runner = FakeGs::new(&[("ebook", 12_000), ("screen", 8_000)]);
        runner.missing = vec!["gswin64c"];
        let c = compressor(&fx, 10_000, &["gswin64c", "gs"], runner);

        let result = c.compress(&fx.input, &CompressOptions::default()).await.unwrap();
        assert_eq!(result.size, 8_000);
        let programs: Vec<String> = c.runner.calls().into_iter().map(|(p, _)| p).collect();
        assert_eq!(programs, vec!["gswin64c", "gs", "gswin64c", "gs"]);
        assert_eq!(temp_files(&fx).len(), 1);
    }

    #[tokio::test]
    async fn success_settles_profile_even_above_budget() {
        let fx = fixture(15_000);
        let runner = FakeGs::new(&[("ebook", 12_000), ("screen", 11_000), ("aggressive", 10_500)]);
        let c = compressor(&fx, 10_000, &["gs", "gs-alt"], runner);

        let result = c.compress(&fx.input, &CompressOptions::default()).await.unwrap();
        assert_eq!(result.size, 10_500);
        assert!(c.runner.calls().iter().all(|(p, _)| p == "gs"));
        assert_eq!(c.runner.calls().len(), 3);
    }

    #[tokio::test]
    async fn options_override_budget() {
        let fx = fixture(15_000);
        let runner = FakeGs::new(&[("ebook", 12_000), ("screen", 8_000), ("aggressive", 5_000)]);
        let c = compressor(&fx, 10_000, &["gs"], runner);

        let opts = CompressOptions {
            max_bytes: Some(6_000),
        };
        let result = c.compress(&fx.input, &opts).await.unwrap();
        assert_eq!(result.size, 5_000);

        let generous = CompressOptions {
            max_bytes: Some(20_000),
        };
        let untouched = c.compress(&fx.input, &generous).await.unwrap();
        assert!(!untouched.compressed);
        assert_eq!(c.runner.calls().len(), 3);
    }

    #[tokio::test]
    async fn missing_input_propagates_io_error() {
        let fx = fixture(0);
        let c = compressor(&fx, 10, &["gs"], FakeGs::new(&[]));
        let err = c
            .compress(&fx.input.with_file_name("absent.pdf"), &CompressOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NoteflowError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
    }

    #[test]
    fn trials_flatten_profiles_then_candidates() {
        let fx = fixture(1);
        let c = compressor(&fx, 10, &["a", "b"], FakeGs::new(&[]));
        let order: Vec<(usize, QualityPreset, &str)> = c
            .trials()
            .iter()
            .map(|t| (t.profile_index, t.profile.quality, t.program))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, QualityPreset::Ebook, "a"),
                (0, QualityPreset::Ebook, "b"),
                (1, QualityPreset::Screen, "a"),
                (1, QualityPreset::Screen, "b"),
                (2, QualityPreset::Screen, "a"),
                (2, QualityPreset::Screen, "b"),
            ]
        );
    }
}
