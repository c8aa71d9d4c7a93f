//! Modification-time helpers for cache files and reference artifacts.
//!
//! Times are whole Unix seconds, the resolution every filesystem offers.

use std::fs::{File, FileTimes, OpenOptions};
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current time in Unix seconds.
pub fn now() -> i64 {
    to_secs(SystemTime::now())
}

fn to_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

fn from_secs(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

pub fn exists(path: &Path) -> bool {
    path.is_file()
}

/// Modification time of `path`, or `None` if it does not exist.
pub fn modified_time(path: &Path) -> io::Result<Option<i64>> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some(to_secs(meta.modified()?))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Modification time of a reference artifact. A missing artifact cannot
/// prove anything older, so it counts as modified now.
pub fn reference_time(path: Option<&Path>) -> io::Result<i64> {
    match path {
        Some(path) => Ok(modified_time(path)?.unwrap_or_else(now)),
        None => Ok(now()),
    }
}

/// Set the modification time of an existing file.
pub fn touch(path: &Path, secs: i64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    set_modified(&file, secs)
}

/// Create an empty file with the given modification time. Fails if the file
/// already exists.
pub fn create_empty(path: &Path, secs: i64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).create_new(true).open(path)?;
    set_modified(&file, secs)
}

fn set_modified(file: &File, secs: i64) -> io::Result<()> {
    file.set_times(FileTimes::new().set_modified(from_secs(secs)))
}

/// Whether this process can create files in `dir`. Creates and removes a
/// temporary file.
pub fn is_writable_dir(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    tempfile::Builder::new()
        .prefix(".rowstash-")
        .tempfile_in(dir)
        .is_ok()
}
