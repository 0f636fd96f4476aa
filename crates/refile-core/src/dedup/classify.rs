//! Numbered-copy heuristics.
//!
//! A group whose names differ only by a trailing copy counter (`report_1.txt`,
//! `report (2).txt`) is almost certainly the product of repeated downloads or
//! "keep both" prompts. Anything else colliding in content is flagged as
//! suspect. The label only changes how a group is presented; it never decides
//! whether files are duplicates.

use std::cmp::Ordering;
use std::ffi::OsStr;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::group::Classification;

static COPY_COUNTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(_\d+|\s\(\d+\))$").expect("valid copy-counter pattern"));

fn stem_and_extension(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    (stem, ext)
}

/// Strips one trailing `_<digits>` or ` (<digits>)` counter from a stem.
pub fn strip_copy_counter(stem: &str) -> String {
    COPY_COUNTER.replace(stem, "").into_owned()
}

/// Returns `true` if `a` and `b` look like numbered copies of one file.
///
/// Extensions must match exactly, the stems must be equal once a single
/// trailing counter is stripped from each, and the original stems must
/// differ (two files with the same name in different folders are not
/// numbered copies of each other).
pub fn is_numbered_duplicate(a: &Path, b: &Path) -> bool {
    let (stem_a, ext_a) = stem_and_extension(a);
    let (stem_b, ext_b) = stem_and_extension(b);

    if ext_a != ext_b {
        return false;
    }

    stem_a != stem_b && strip_copy_counter(&stem_a) == strip_copy_counter(&stem_b)
}

/// Orders sibling names so an original precedes its numbered copies.
///
/// Names compare by counter-stripped stem, then extension, then unnumbered
/// before numbered, then byte-wise. `a.txt` sorts ahead of `a (1).txt` and
/// `a_2.txt`, which makes the first discovered member of a numbered group
/// the original.
pub fn discovery_order(a: &OsStr, b: &OsStr) -> Ordering {
    let key = |name: &OsStr| {
        let (stem, ext) = stem_and_extension(Path::new(name));
        let base = strip_copy_counter(&stem);
        let numbered = base != stem;
        (base, ext, numbered)
    };
    key(a).cmp(&key(b)).then_with(|| a.cmp(b))
}

/// Classifies a set of same-content paths.
///
/// `Numbered` only when every pair satisfies [`is_numbered_duplicate`].
pub fn classify<P: AsRef<Path>>(paths: &[P]) -> Classification {
    let all_numbered = paths.iter().enumerate().all(|(i, a)| {
        paths[i + 1..]
            .iter()
            .all(|b| is_numbered_duplicate(a.as_ref(), b.as_ref()))
    });

    if all_numbered {
        Classification::Numbered
    } else {
        Classification::Suspect
    }
}
