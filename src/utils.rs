use anyhow::Result;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

fn log_level(verbosity: &str) -> Level {
    match verbosity {
        "silent" => Level::ERROR,
        "verbose" => Level::DEBUG,
        _ => Level::INFO,
    }
}

/// Install the global subscriber. Logs go to stderr so the summary printed on
/// stdout stays clean when piped; colour is only used on a terminal.
pub fn setup_logging(verbosity: &str) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("prefix_sift={}", log_level(verbosity)).parse()?);

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

/// Discover input files with the given extension directly inside `dir`.
///
/// The match is case-insensitive and the result is sorted by path.
pub fn discover_input_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() {
            if let Some(ext) = path.extension() {
                if ext.to_string_lossy().eq_ignore_ascii_case(extension) {
                    files.push(path);
                }
            }
        }
    }

    files.sort();
    Ok(files)
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs_f64();
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        format!("{:.1}m", seconds / 60.0)
    } else {
        format!("{:.1}h", seconds / 3600.0)
    }
}
