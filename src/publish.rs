//! Writes the nodes file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{Error, Result};

/// Mode for the nodes file.  The consumer may run as a different user.
pub const NODES_FILE_MODE: u32 = 0o666;

/// Replaces the content of `path` with `content`.
///
/// The content goes to a temporary sibling first and is renamed into
/// place, so readers see either the old or the new file.  When that is not
/// possible (the directory is read-only, or a bind-mounted file cannot be
/// replaced) the file is overwritten in place instead.  Only files created
/// here get [`NODES_FILE_MODE`]; an existing target keeps its mode.
pub fn publish(path: &Path, content: &str) -> Result<()> {
    publish_with(path, content, |from, to| fs::rename(from, to))
}

fn publish_with<R>(path: &Path, content: &str, rename: R) -> Result<()>
where
    R: FnOnce(&Path, &Path) -> io::Result<()>,
{
    let fail = |source| Error::Publish {
        path: path.to_path_buf(),
        source,
    };

    let tmp = tmp_path_next_to(path).map_err(fail)?;
    if let Err(e) = replace_via(&tmp, path, content, rename) {
        warn!(
            "Could not replace {} through {}: {}. Writing in place.",
            path.display(),
            tmp.display(),
            e
        );
        write_in_place(path, content).map_err(fail)?;
    }

    debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

fn tmp_path_next_to(path: &Path) -> io::Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} does not name a file", path.display()),
        )
    })?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(name);
    tmp_name.push(".tmp");
    Ok(path.with_file_name(tmp_name))
}

/// Writes `tmp` and renames it over `path`.  `tmp` is removed on any error.
fn replace_via<R>(tmp: &Path, path: &Path, content: &str, rename: R) -> io::Result<()>
where
    R: FnOnce(&Path, &Path) -> io::Result<()>,
{
    let result = write_file(tmp, content)
        .and_then(|()| chmod(tmp, NODES_FILE_MODE))
        .and_then(|()| rename(tmp, path));
    if result.is_err() {
        match fs::remove_file(tmp) {
            Ok(()) => debug!("Removed {}", tmp.display()),
            Err(e) => debug!("Could not remove {}: {}", tmp.display(), e),
        }
    }
    result
}

fn write_in_place(path: &Path, content: &str) -> io::Result<()> {
    let created = !path.exists();
    write_file(path, content)?;
    if created {
        chmod(path, NODES_FILE_MODE)?;
    }
    Ok(())
}

fn write_file(path: &Path, content: &str) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()
}

// Explicit so the process umask cannot narrow the mode.
#[cfg(unix)]
fn chmod(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn chmod(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
