//! Streaming content fingerprints.

use std::fmt::{self, Write as _};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use crate::error::{CoreError, CoreResult};

/// Block size used when none is configured.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Digest algorithms available for fingerprinting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha224,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashAlgorithm::Sha224 => "sha224",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        };
        f.write_str(name)
    }
}

/// Computes the digest of the file at `path` as a lowercase hex string.
///
/// The file is streamed through a single `block_size` buffer and is never
/// loaded whole. A `block_size` of zero is treated as
/// [`DEFAULT_BLOCK_SIZE`].
///
/// # Errors
///
/// - [`CoreError::Read`] if the file cannot be opened or a read fails
///   mid-stream. Callers in a batch log this and exclude the file.
pub fn fingerprint(path: &Path, algorithm: HashAlgorithm, block_size: usize) -> CoreResult<String> {
    let block_size = if block_size == 0 {
        DEFAULT_BLOCK_SIZE
    } else {
        block_size
    };
    match algorithm {
        HashAlgorithm::Sha224 => stream_digest::<Sha224>(path, block_size),
        HashAlgorithm::Sha256 => stream_digest::<Sha256>(path, block_size),
        HashAlgorithm::Sha384 => stream_digest::<Sha384>(path, block_size),
        HashAlgorithm::Sha512 => stream_digest::<Sha512>(path, block_size),
    }
}

fn stream_digest<D: Digest>(path: &Path, block_size: usize) -> CoreResult<String> {
    let read_error = |source| CoreError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(read_error)?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; block_size];

    loop {
        let bytes_read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_error(e)),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        let _ = write!(hex, "{byte:02x}");
    }
    Ok(hex)
}
