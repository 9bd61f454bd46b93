//! Moving files into the managed library

use crate::{ImportError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Buffer size for file hashing
const BUFFER_SIZE: usize = 64 * 1024;

/// How imported files reach the library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FileOperation {
    /// Copy files, leaving the originals in place
    #[default]
    Copy,
    /// Move files into the library
    Move,
    /// Symbolic link to the original
    Link,
    /// Hard link to the original
    HardLink,
    /// Copy-on-write clone, falling back to a copy when unsupported
    Reflink,
    /// Copy-on-write clone, failing when unsupported
    ReflinkAlways,
    /// Leave files where they are
    None,
}

impl FileOperation {
    pub fn name(self) -> &'static str {
        match self {
            FileOperation::Copy => "copy",
            FileOperation::Move => "move",
            FileOperation::Link => "link",
            FileOperation::HardLink => "hard_link",
            FileOperation::Reflink => "reflink",
            FileOperation::ReflinkAlways => "reflink_always",
            FileOperation::None => "none",
        }
    }
}

impl FromStr for FileOperation {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        [
            FileOperation::Copy,
            FileOperation::Move,
            FileOperation::Link,
            FileOperation::HardLink,
            FileOperation::Reflink,
            FileOperation::ReflinkAlways,
            FileOperation::None,
        ]
        .into_iter()
        .find(|op| op.name() == s)
        .ok_or_else(|| ImportError::Config(format!("unknown file operation '{s}'")))
    }
}

/// Put `source` at `dest` using `operation`
///
/// Missing parent directories are created and an occupied destination gets
/// a numeric suffix. Returns where the file ended up; for
/// [`FileOperation::None`] that is `source` itself.
pub fn transfer(operation: FileOperation, source: &Path, dest: &Path) -> Result<PathBuf> {
    if operation == FileOperation::None || source == dest {
        return Ok(source.to_path_buf());
    }
    if !source.exists() {
        return Err(ImportError::FileNotFound(source.display().to_string()));
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let dest = if dest.exists() {
        resolve_filename_conflict(dest)?
    } else {
        dest.to_path_buf()
    };

    match operation {
        FileOperation::Copy => copy_file_verified(source, &dest, false)?,
        FileOperation::Move => move_file(source, &dest)?,
        FileOperation::Link => symlink(source, &dest)?,
        FileOperation::HardLink => fs::hard_link(source, &dest)?,
        FileOperation::Reflink => {
            reflink_copy::reflink_or_copy(source, &dest)?;
        }
        FileOperation::ReflinkAlways => reflink_copy::reflink(source, &dest).map_err(|e| {
            ImportError::UnsupportedOperation(format!("reflink {}: {e}", source.display()))
        })?,
        FileOperation::None => {}
    }

    debug!(op = operation.name(), "{:?} -> {:?}", source, dest);
    Ok(dest)
}

#[cfg(unix)]
fn symlink(source: &Path, dest: &Path) -> Result<()> {
    std::os::unix::fs::symlink(source, dest)?;
    Ok(())
}

#[cfg(windows)]
fn symlink(source: &Path, dest: &Path) -> Result<()> {
    std::os::windows::fs::symlink_file(source, dest)?;
    Ok(())
}

/// Find a free name next to `dest` by appending a counter
///
/// "song.mp3" -> "song-1.mp3" -> "song-2.mp3" etc.
pub fn resolve_filename_conflict(dest: &Path) -> Result<PathBuf> {
    let parent = dest.parent().unwrap_or_else(|| Path::new(""));
    let stem = dest
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ImportError::InvalidPath(format!("Invalid filename: {}", dest.display())))?;
    let extension = dest.extension().and_then(|ext| ext.to_str());

    for counter in 1..1000 {
        let new_name = match extension {
            Some(ext) => format!("{stem}-{counter}.{ext}"),
            None => format!("{stem}-{counter}"),
        };

        let new_path = parent.join(&new_name);
        if !new_path.exists() {
            return Ok(new_path);
        }
    }

    Err(ImportError::InvalidPath(format!(
        "Could not resolve filename conflict for {}",
        dest.display()
    )))
}

/// Compute SHA256 hash of a file
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Copy a file with optional verification
pub fn copy_file_verified(source: &Path, dest: &Path, verify: bool) -> Result<()> {
    let source_hash = if verify {
        Some(compute_file_hash(source)?)
    } else {
        None
    };

    fs::copy(source, dest)?;

    if let Some(expected_hash) = source_hash {
        let actual_hash = compute_file_hash(dest)?;
        if expected_hash != actual_hash {
            let _ = fs::remove_file(dest);
            return Err(ImportError::Io(std::io::Error::other(format!(
                "hash mismatch after copying to {}",
                dest.display()
            ))));
        }
        debug!("File verification passed: {:?}", dest);
    }

    Ok(())
}

/// Move a file, falling back to copy + delete across filesystems
pub fn move_file(source: &Path, dest: &Path) -> Result<()> {
    if fs::rename(source, dest).is_ok() {
        return Ok(());
    }

    copy_file_verified(source, dest, true)?;
    fs::remove_file(source)?;

    Ok(())
}

/// Remove empty directories from `dir` upwards, stopping at `stop`
pub fn prune_empty_dirs(dir: &Path, stop: &Path) {
    let mut current = Some(dir);
    while let Some(path) = current {
        if path == stop || !path.starts_with(stop) {
            break;
        }
        let is_empty = fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_none());
        if !is_empty || fs::remove_dir(path).is_err() {
            break;
        }
        debug!("Pruned empty directory {:?}", path);
        current = path.parent();
    }
}

/// Delete a file that lives inside the library and prune emptied directories
///
/// Files outside `library_dir` are left alone.
pub fn remove_library_file(path: &Path, library_dir: &Path) -> Result<()> {
    if !path.starts_with(library_dir) {
        debug!("Not deleting {:?}: outside the library", path);
        return Ok(());
    }
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    }
    if let Some(parent) = path.parent() {
        prune_empty_dirs(parent, library_dir);
    }
    Ok(())
}
