//! Path normalization.
//!
//! Every membership check in the engine ("is this path an expected
//! directory?", "is this the canonical target?") compares normalized paths,
//! and every journal or archive entry is rendered from one.

use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

/// Normalises a string to NFC (composed) form.
///
/// macOS stores filenames in NFD (decomposed), which makes the same visible
/// name compare unequal to its composed spelling. This helper re-composes it.
pub fn nfc_string(s: &str) -> String {
    s.nfc().collect()
}

fn nfc_os(name: &OsStr) -> OsString {
    match name.to_str() {
        Some(s) => OsString::from(nfc_string(s)),
        None => name.to_os_string(),
    }
}

/// Returns the canonical absolute spelling of `path`.
///
/// Relative paths are resolved against the current directory, `.` and `..`
/// are folded lexically (never above the filesystem root), separators are
/// rebuilt in the platform's style, and each component is NFC-composed.
/// The filesystem is never consulted, so paths that do not exist normalize
/// just as well as ones that do. Symlinks are not resolved.
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) => out.push(nfc_os(name)),
        }
    }
    out
}

/// Renders `path` relative to `root` when it lies inside it.
///
/// Paths outside `root` are returned unchanged. Both arguments are expected
/// to be normalized already.
pub fn relative_to(path: &Path, root: &Path) -> PathBuf {
    match path.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
        _ => path.to_path_buf(),
    }
}

/// Raw bytes of `path` for storage in a journal.
///
/// Exact on unix, where names are arbitrary bytes. Elsewhere only paths that
/// are valid Unicode can be stored, and `None` is returned for the rest.
#[cfg(unix)]
pub fn path_bytes(path: &Path) -> Option<&[u8]> {
    use std::os::unix::ffi::OsStrExt;
    Some(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
pub fn path_bytes(path: &Path) -> Option<&[u8]> {
    path.to_str().map(str::as_bytes)
}

/// Inverse of [`path_bytes`].
#[cfg(unix)]
pub fn path_from_bytes(bytes: &[u8]) -> Option<PathBuf> {
    use std::os::unix::ffi::OsStrExt;
    Some(PathBuf::from(OsStr::from_bytes(bytes)))
}

#[cfg(not(unix))]
pub fn path_from_bytes(bytes: &[u8]) -> Option<PathBuf> {
    std::str::from_utf8(bytes).ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_is_unchanged() {
        let p = normalize_path("/home/user/file.txt");
        assert_eq!(p, PathBuf::from("/home/user/file.txt"));
    }

    #[test]
    fn dot_components_are_folded() {
        let p = normalize_path("/home/./user/../user/docs/./a.txt");
        assert_eq!(p, PathBuf::from("/home/user/docs/a.txt"));
    }

    #[test]
    fn parent_never_escapes_root() {
        let p = normalize_path("/../../etc");
        assert_eq!(p, PathBuf::from("/etc"));
    }

    #[test]
    fn redundant_separators_are_dropped() {
        let p = normalize_path("/home//user///a.txt");
        assert_eq!(p, PathBuf::from("/home/user/a.txt"));
    }

    #[test]
    fn relative_path_resolves_against_cwd() {
        let cwd = std::env::current_dir().unwrap();
        let p = normalize_path("some/nested/../file.txt");
        assert_eq!(p, normalize_path(cwd.join("some/file.txt")));
        assert!(p.is_absolute());
    }

    #[test]
    fn nonexistent_paths_still_normalize() {
        let p = normalize_path("/no/such/dir/../file");
        assert_eq!(p, PathBuf::from("/no/such/file"));
    }

    #[test]
    fn different_spellings_compare_equal() {
        let a = normalize_path("/data/src/./core/processor.py");
        let b = normalize_path("/data/old/../src/core/processor.py");
        assert_eq!(a, b);
    }

    #[test]
    fn decomposed_names_compose_to_nfc() {
        // "é" as 'e' + U+0301 versus the precomposed U+00E9.
        let decomposed = normalize_path("/tmp/cafe\u{301}.txt");
        let composed = normalize_path("/tmp/caf\u{e9}.txt");
        assert_eq!(decomposed, composed);
    }

    #[test]
    fn hangul_jamo_are_recomposed() {
        let decomposed = "\u{1112}\u{1161}\u{11ab}";
        assert_eq!(nfc_string(decomposed), "\u{d55c}");
    }

    #[test]
    fn relative_to_strips_root() {
        let rel = relative_to(Path::new("/root/a/b.txt"), Path::new("/root"));
        assert_eq!(rel, PathBuf::from("a/b.txt"));
    }

    #[test]
    fn relative_to_keeps_outside_paths() {
        let rel = relative_to(Path::new("/elsewhere/b.txt"), Path::new("/root"));
        assert_eq!(rel, PathBuf::from("/elsewhere/b.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn path_bytes_keep_invalid_utf8() {
        use std::os::unix::ffi::OsStrExt;
        let raw = Path::new(OsStr::from_bytes(b"dir/b\xff.txt"));

        let bytes = path_bytes(raw).unwrap();

        assert_eq!(bytes, b"dir/b\xff.txt");
        assert_eq!(path_from_bytes(bytes).unwrap(), raw);
    }
}
