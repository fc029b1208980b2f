//! Reading and writing Live set files.
//!
//! A `.als` file is the XML document gzip-compressed. Inputs are accepted
//! either compressed or as plain XML (detected by the gzip magic bytes);
//! outputs are compressed according to [`Compression`].

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::PackageError;

/// Extension of the distributable Live set container.
pub const CONTAINER_EXTENSION: &str = "als";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Output compression policy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Compress when the output path has the `.als` extension.
    #[default]
    Auto,
    Always,
    Never,
}

impl Compression {
    /// Whether a document written to `path` should be gzip-compressed.
    pub fn applies_to(self, path: &Path) -> bool {
        match self {
            Self::Auto => path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(CONTAINER_EXTENSION)),
            Self::Always => true,
            Self::Never => false,
        }
    }
}

impl std::str::FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            other => Err(format!("unknown compression '{other}' (expected auto, always or never)")),
        }
    }
}

pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Read a document file, decompressing it if it is gzip data.
pub fn read_document_bytes(path: &Path) -> Result<Vec<u8>, PackageError> {
    if !path.exists() {
        return Err(PackageError::FileNotFound(path.display().to_string()));
    }
    let raw = std::fs::read(path)?;
    if !is_gzip(&raw) {
        debug!(path = %path.display(), bytes = raw.len(), "read plain XML document");
        return Ok(raw);
    }

    let mut decoded = Vec::new();
    GzDecoder::new(raw.as_slice())
        .read_to_end(&mut decoded)
        .map_err(|e| PackageError::Decompress {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
    debug!(
        path = %path.display(),
        compressed = raw.len(),
        bytes = decoded.len(),
        "read gzip document"
    );
    Ok(decoded)
}

/// Write document text to `path`, gzip-compressed if `compress` is set.
pub fn write_document(path: &Path, xml: &str, compress: bool) -> Result<(), PackageError> {
    if compress {
        let mut encoder = GzEncoder::new(File::create(path)?, flate2::Compression::default());
        encoder.write_all(xml.as_bytes())?;
        encoder.finish()?;
    } else {
        std::fs::write(path, xml)?;
    }
    debug!(path = %path.display(), compress, "wrote document");
    Ok(())
}

/// Gzip `src` into `dst`, leaving `src` in place.
pub fn gzip_file(src: &Path, dst: &Path) -> Result<(), PackageError> {
    let mut input = File::open(src)?;
    let mut encoder = GzEncoder::new(File::create(dst)?, flate2::Compression::default());
    std::io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    Ok(())
}
