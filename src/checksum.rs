//! SHA-512 checksum files for built images.
//!
//! Writes checksums in `sha512sum` format, `<hash>  <filename>` (two
//! spaces, bare filename), so users can verify with:
//!   cd output && sha512sum -c hello.iso.sha512

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha512};

pub const CHECKSUM_SUFFIX: &str = "sha512";
const SEPARATOR: &str = "  ";

/// Hex SHA-512 of a file, streamed.
pub fn sha512_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("opening {} for hashing", path.display()))?;
    let mut hasher = Sha512::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Write `<iso>.sha512` beside the image and return its path and the hash.
pub fn write_checksum(iso_path: &Path) -> Result<(PathBuf, String)> {
    let hash = sha512_file(iso_path)?;
    let filename = iso_path
        .file_name()
        .context("Could not get ISO filename")?
        .to_string_lossy();

    let mut name = iso_path.as_os_str().to_os_string();
    name.push(".");
    name.push(CHECKSUM_SUFFIX);
    let checksum_path = PathBuf::from(name);

    fs::write(&checksum_path, format!("{}{}{}\n", hash, SEPARATOR, filename))
        .with_context(|| format!("writing {}", checksum_path.display()))?;

    Ok((checksum_path, hash))
}
