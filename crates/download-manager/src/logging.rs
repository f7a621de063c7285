//! Tracing subscriber setup
//!
//! Library code only emits `tracing` events. Applications embedding the
//! manager call [`init`] once to get them on stderr and, optionally, in a
//! log file.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

pub use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("subscriber init failed: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
    #[error("cannot open log file: {0}")]
    Io(#[from] io::Error),
}

/// Install a global subscriber at `level`
///
/// With `log_file`, events are also appended to that file, creating its
/// directory if needed. Fails if a global subscriber is already set.
pub fn init(log_file: Option<&Path>, level: LevelFilter) -> Result<(), LogError> {
    let file_layer = log_file
        .map(open_log_file)
        .transpose()?
        .map(|file| {
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file))
                .with_filter(level)
        });

    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(io::stderr)
        .with_filter(level);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;
    Ok(())
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_log_file_creates_directory_and_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("downloads.log");

        {
            use std::io::Write;
            let mut file = open_log_file(&path).unwrap();
            writeln!(file, "first").unwrap();
        }
        {
            use std::io::Write;
            let mut file = open_log_file(&path).unwrap();
            writeln!(file, "second").unwrap();
        }

        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }
}
