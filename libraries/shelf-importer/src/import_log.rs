//! Plain-text import log
//!
//! One `status path; path` line per task outcome that needs a human to look
//! at later: skips, as-is imports and duplicate resolutions.

use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::Result;

#[derive(Debug, Default)]
pub struct ImportLog {
    writer: Option<BufWriter<File>>,
}

impl ImportLog {
    /// Log that discards everything
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Append to the log at `path`, writing a start marker
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "import started {}", Utc::now().to_rfc3339())?;
        writer.flush()?;
        Ok(Self {
            writer: Some(writer),
        })
    }

    /// Record `status` for `paths`
    ///
    /// Write failures are logged, not returned.
    pub fn record(&mut self, status: &str, paths: &[PathBuf]) {
        let Some(writer) = &mut self.writer else {
            return;
        };
        let joined = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("; ");

        let written = writeln!(writer, "{status} {joined}").and_then(|()| writer.flush());
        if let Err(e) = written {
            tracing::warn!("Could not write import log: {}", e);
        }
    }
}
