//! Low-level filesystem primitives.
//!
//! These functions mutate the disk directly and know nothing about journals
//! or dry runs; [`FileOperator`](crate::txn::operator::FileOperator) wraps
//! them with both.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// Moves a regular file to `dest` without ever overwriting.
///
/// Attempts a fast `rename` first. Only when source and destination are on
/// different filesystems does it fall back to copy + remove. The fallback is
/// not crash-atomic: an interruption can leave both copies on disk.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if `src` does not exist.
/// - [`CoreError::AlreadyExists`] if anything already sits at `dest`.
/// - [`CoreError::Io`] for any other I/O failure. `src` is then still in
///   place and `dest` is absent.
pub fn move_path(src: &Path, dest: &Path) -> CoreResult<()> {
    // symlink_metadata so a dangling link at either end still counts as present
    fs::symlink_metadata(src).map_err(|e| CoreError::from_io(src, e))?;
    if fs::symlink_metadata(dest).is_ok() {
        return Err(CoreError::AlreadyExists(dest.to_path_buf()));
    }

    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(e) if crosses_devices(&e) => {
            tracing::debug!("rename across filesystems, copying {}", src.display());
            copy_then_remove(src, dest, |p| fs::remove_file(p))
        }
        Err(e) => Err(CoreError::from_io(src, e)),
    }
}

fn crosses_devices(e: &io::Error) -> bool {
    // EXDEV on Linux, macOS and the BSDs
    #[cfg(unix)]
    const EXDEV: i32 = 18;
    // ERROR_NOT_SAME_DEVICE
    #[cfg(windows)]
    const EXDEV: i32 = 17;
    #[cfg(not(any(unix, windows)))]
    const EXDEV: i32 = -1;

    e.raw_os_error() == Some(EXDEV)
}

/// Copies `src` to `dest` and removes the source with `remove_source`.
///
/// If either step fails the copy at `dest` is removed again, so the caller
/// sees the move as not having happened.
fn copy_then_remove(
    src: &Path,
    dest: &Path,
    remove_source: impl FnOnce(&Path) -> io::Result<()>,
) -> CoreResult<()> {
    if let Err(e) = fs::copy(src, dest) {
        discard_copy(dest);
        return Err(CoreError::from_io(dest, e));
    }
    if let Err(e) = remove_source(src) {
        discard_copy(dest);
        return Err(CoreError::from_io(src, e));
    }
    Ok(())
}

fn discard_copy(dest: &Path) {
    match fs::remove_file(dest) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::error!("could not remove partial copy {}: {e}", dest.display()),
    }
}

/// Creates a zero-length file, failing if `path` already exists.
pub fn create_empty(path: &Path) -> CoreResult<()> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| CoreError::from_io(path, e))?;
    Ok(())
}

/// Removes a directory that must already be empty.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if `path` does not exist.
/// - [`CoreError::NotADirectory`] if `path` is not a directory.
/// - [`CoreError::Io`] if the directory still has entries.
pub fn remove_empty_dir(path: &Path) -> CoreResult<()> {
    let meta = fs::symlink_metadata(path).map_err(|e| CoreError::from_io(path, e))?;
    if !meta.is_dir() {
        return Err(CoreError::NotADirectory(path.to_path_buf()));
    }
    if !is_empty_dir(path)? {
        return Err(CoreError::Io(std::io::Error::other(format!(
            "directory not empty: {}",
            path.display()
        ))));
    }
    fs::remove_dir(path).map_err(|e| CoreError::from_io(path, e))
}

/// Returns `true` if `path` is a directory with no entries.
pub fn is_empty_dir(path: &Path) -> CoreResult<bool> {
    let mut entries = fs::read_dir(path).map_err(|e| CoreError::from_io(path, e))?;
    Ok(entries.next().is_none())
}

/// Ancestors of `path` (outermost first) that do not exist yet.
///
/// Stops at the first existing ancestor. Creating the returned list in
/// order reproduces `create_dir_all` one level at a time.
pub fn missing_ancestors(path: &Path) -> Vec<PathBuf> {
    let mut missing = Vec::new();
    let mut current = Some(path);
    while let Some(p) = current {
        if p.as_os_str().is_empty() || fs::symlink_metadata(p).is_ok() {
            break;
        }
        missing.push(p.to_path_buf());
        current = p.parent();
    }
    missing.reverse();
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn move_path_renames_file() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.txt");
        let dest = tmp.path().join("b.txt");
        fs::write(&src, "content").unwrap();

        move_path(&src, &dest).unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "content");
    }

    #[test]
    fn move_path_refuses_to_overwrite() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.txt");
        let dest = tmp.path().join("b.txt");
        fs::write(&src, "new").unwrap();
        fs::write(&dest, "old").unwrap();

        let result = move_path(&src, &dest);

        assert!(matches!(result.unwrap_err(), CoreError::AlreadyExists(_)));
        assert_eq!(fs::read_to_string(&dest).unwrap(), "old");
        assert!(src.exists());
    }

    #[test]
    fn move_path_missing_source_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let result = move_path(&tmp.path().join("nope"), &tmp.path().join("dest"));
        assert!(matches!(result.unwrap_err(), CoreError::NotFound(_)));
    }

    #[test]
    fn copy_fallback_moves_content() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.txt");
        let dest = tmp.path().join("b.txt");
        fs::write(&src, "content").unwrap();

        copy_then_remove(&src, &dest, |p| fs::remove_file(p)).unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "content");
    }

    #[test]
    fn copy_fallback_discards_copy_when_source_cannot_be_removed() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.txt");
        let dest = tmp.path().join("b.txt");
        fs::write(&src, "content").unwrap();

        let result = copy_then_remove(&src, &dest, |_| {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        });

        assert!(matches!(result.unwrap_err(), CoreError::PermissionDenied(_)));
        assert_eq!(fs::read_to_string(&src).unwrap(), "content");
        assert!(!dest.exists());
    }

    #[test]
    fn only_cross_device_errors_fall_back_to_copy() {
        assert!(!crosses_devices(&io::Error::from(io::ErrorKind::PermissionDenied)));
        #[cfg(unix)]
        assert!(crosses_devices(&io::Error::from_raw_os_error(18)));
    }

    #[test]
    fn create_empty_writes_zero_bytes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("placeholder.py");

        create_empty(&path).unwrap();

        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn create_empty_does_not_truncate_existing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("keep.txt");
        fs::write(&path, "data").unwrap();

        let result = create_empty(&path);

        assert!(matches!(result.unwrap_err(), CoreError::AlreadyExists(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "data");
    }

    #[test]
    fn remove_empty_dir_removes_only_empty() {
        let tmp = TempDir::new().unwrap();
        let empty = tmp.path().join("empty");
        let full = tmp.path().join("full");
        fs::create_dir(&empty).unwrap();
        fs::create_dir(&full).unwrap();
        fs::write(full.join("f"), "x").unwrap();

        remove_empty_dir(&empty).unwrap();
        assert!(!empty.exists());

        assert!(matches!(remove_empty_dir(&full).unwrap_err(), CoreError::Io(_)));
        assert!(full.exists());
    }

    #[test]
    fn remove_empty_dir_rejects_files() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("f.txt");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            remove_empty_dir(&file).unwrap_err(),
            CoreError::NotADirectory(_)
        ));
    }

    #[test]
    fn missing_ancestors_lists_outermost_first() {
        let tmp = TempDir::new().unwrap();
        let deep = tmp.path().join("a").join("b").join("c");

        let missing = missing_ancestors(&deep);

        assert_eq!(
            missing,
            vec![
                tmp.path().join("a"),
                tmp.path().join("a").join("b"),
                deep.clone(),
            ]
        );
        assert!(missing_ancestors(tmp.path()).is_empty());
    }
}
