//! Artifact content addressing and accepted upload types.
//!
//! Admin-uploaded result artifacts are stored under a key derived from the
//! SHA-256 of their bytes, so uploading the same file twice yields the same
//! public URL.

use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// Upper bound on a single uploaded artifact (100 MiB).
pub const MAX_ARTIFACT_BYTES: usize = 100 * 1024 * 1024;

/// Accepted artifact MIME types and the file extension stored for each.
const ALLOWED_CONTENT_TYPES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
    ("video/mp4", "mp4"),
];

/// Map an upload content type to its stored extension.
pub fn extension_for_content_type(content_type: &str) -> Result<&'static str, CoreError> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    ALLOWED_CONTENT_TYPES
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
        .ok_or_else(|| {
            let allowed: Vec<&str> = ALLOWED_CONTENT_TYPES.iter().map(|(m, _)| *m).collect();
            CoreError::Validation(format!(
                "Unsupported artifact type '{content_type}'. Must be one of: {}",
                allowed.join(", ")
            ))
        })
}

/// Derive the storage key `<sha256-hex>.<ext>` for an artifact.
pub fn content_address(bytes: &[u8], content_type: &str) -> Result<String, CoreError> {
    if bytes.is_empty() {
        return Err(CoreError::Validation("Artifact is empty".to_string()));
    }
    if bytes.len() > MAX_ARTIFACT_BYTES {
        return Err(CoreError::Validation(format!(
            "Artifact is {} bytes; the maximum is {MAX_ARTIFACT_BYTES}",
            bytes.len()
        )));
    }
    let ext = extension_for_content_type(content_type)?;
    let digest = Sha256::digest(bytes);
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    Ok(format!("{hex}.{ext}"))
}
