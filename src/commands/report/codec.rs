use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum CodecError {
    #[error("decode error: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("failed to write decoded image to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Decodes a base64 image payload. Surrounding whitespace and a
/// `data:<mime>;base64,` prefix are ignored.
pub(crate) fn decode_payload(payload: &str) -> Result<Vec<u8>, CodecError> {
    let trimmed = payload.trim();
    let body = match trimmed.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => trimmed,
    };
    let compact = body
        .chars()
        .filter(|character| !character.is_ascii_whitespace())
        .collect::<String>();

    Ok(STANDARD.decode(compact)?)
}

/// Writes the decoded payload to `target`, replacing any previous content.
pub(crate) fn decode_to_file(payload: &str, target: &Path) -> Result<(), CodecError> {
    let bytes = decode_payload(payload)?;
    fs::write(target, bytes).map_err(|source| CodecError::Write {
        path: target.to_path_buf(),
        source,
    })
}
