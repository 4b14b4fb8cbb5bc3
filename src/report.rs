//! Terminal output for compression results.

use crate::compressor::{Compressed, CompressorConfig};

/// Formats a byte count as a human-readable size string.
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} PiB")
}

/// Output size as a fraction of the original.
pub fn ratio(original_size: u64, compressed_size: u64) -> f64 {
    if original_size == 0 {
        return 1.0;
    }
    compressed_size as f64 / original_size as f64
}

/// Prints the outcome of a `compress` run.
pub fn print_summary(original_size: u64, max_bytes: u64, result: &Compressed) {
    eprintln!();
    if !result.compressed {
        eprintln!(
            "  {} Within budget, left as is: {}",
            colored::Colorize::green("✓"),
            colored::Colorize::bold(result.path.display().to_string().as_str()),
        );
        eprintln!(
            "    Size:    {} (budget {})",
            format_size(result.size),
            format_size(max_bytes),
        );
        return;
    }

    let mark = if result.size <= max_bytes {
        colored::Colorize::green("✓")
    } else {
        colored::Colorize::yellow("!")
    };
    eprintln!(
        "  {mark} Compressed: {}",
        colored::Colorize::bold(result.path.display().to_string().as_str()),
    );
    eprintln!(
        "    Size:    {} → {} ({:.1}% ratio)",
        format_size(original_size),
        format_size(result.size),
        ratio(original_size, result.size) * 100.0,
    );
    eprintln!("    Budget:  {}", format_size(max_bytes));
    if result.size > max_bytes {
        eprintln!(
            "    {}",
            colored::Colorize::yellow("still above budget; this is the smallest result obtained"),
        );
    }
}

/// Prints the search plan without running it.
pub fn print_plan(config: &CompressorConfig) {
    eprintln!("  Budget:     {}", format_size(config.max_bytes));
    eprintln!("  Timeout:    {}s per run", config.timeout.as_secs());
    eprintln!("  Temp dir:   {}", config.temp_dir.display());
    eprintln!();
    eprintln!("  Profiles:");
    for (i, profile) in config.profiles.iter().enumerate() {
        eprintln!("    {:>2}. {profile}", i + 1);
        for arg in &profile.extra_args {
            eprintln!("          {}", colored::Colorize::dimmed(arg.as_str()));
        }
    }
    eprintln!();
    eprintln!("  Candidates:");
    for (i, candidate) in config.candidates.iter().enumerate() {
        eprintln!("    {:>2}. {candidate}", i + 1);
    }
}
