//! # Ghostscript Discovery
//!
//! Builds the ordered list of places to look for the Ghostscript binary.
//! An explicit path always comes first. On Windows, versioned installs under
//! `<Program Files>\gs\<version>\bin` are scanned (newest version first)
//! because Ghostscript's installer does not put itself on `PATH`; bare
//! command names come last and are resolved through `PATH` at spawn time.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Platform family, which decides the candidate names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Unix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }
}

const WINDOWS_BINARIES: [&str; 2] = ["gswin64c.exe", "gswin32c.exe"];
const WINDOWS_COMMANDS: [&str; 3] = ["gswin64c", "gswin32c", "gs"];
const UNIX_COMMAND: &str = "gs";

/// Program-install roots from `ProgramFiles` and `ProgramFiles(x86)`.
pub fn program_dirs_from_env() -> Vec<PathBuf> {
    ["ProgramFiles", "ProgramFiles(x86)"]
        .iter()
        .filter_map(|key| std::env::var_os(key))
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Returns the ordered, de-duplicated candidate list.
pub fn candidates(
    explicit: Option<&str>,
    platform: Platform,
    program_dirs: &[PathBuf],
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |c: String| {
        if !out.contains(&c) {
            out.push(c);
        }
    };

    if let Some(path) = explicit.map(str::trim).filter(|p| !p.is_empty()) {
        push(path.to_string());
    }

    match platform {
        Platform::Windows => {
            for base in program_dirs {
                for exe in installed_binaries(base) {
                    push(exe.to_string_lossy().into_owned());
                }
            }
            for cmd in WINDOWS_COMMANDS {
                push(cmd.to_string());
            }
        }
        Platform::Unix => push(UNIX_COMMAND.to_string()),
    }

    out
}

/// Lists `<base>/gs/<version>/bin/gswin{64,32}c.exe`, newest version first.
///
/// Unreadable directories are skipped.
fn installed_binaries(base: &Path) -> Vec<PathBuf> {
    let gs_root = base.join("gs");
    if !gs_root.is_dir() {
        return Vec::new();
    }

    let mut versions: Vec<PathBuf> = WalkDir::new(&gs_root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect();
    // Folder names compare as strings, so "gs9.56" ranks above "gs10.02".
    versions.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

    let mut found = Vec::new();
    for dir in versions {
        for name in WINDOWS_BINARIES {
            let exe = dir.join("bin").join(name);
            if exe.is_file() {
                found.push(exe);
            }
        }
    }
    found
}
