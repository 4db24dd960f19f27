//! Input validation for new generation requests.
//!
//! Every check returns [`CoreError::Validation`] with a message suitable for
//! showing directly to the user.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// Maximum prompt length in characters (after trimming).
pub const MAX_PROMPT_LEN: usize = 4000;

/// Largest batch a single request may ask for.
pub const MAX_BATCH_SIZE: u8 = 4;

/// Batch size used when the caller does not specify one.
pub const DEFAULT_BATCH_SIZE: u8 = 1;

static ASPECT_RATIO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]{1,2}):([0-9]{1,2})$").expect("valid regex"));

/// Trim a prompt and reject it when empty or too long.
pub fn validate_prompt(prompt: &str) -> Result<String, CoreError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("Prompt must not be empty".to_string()));
    }
    let len = trimmed.chars().count();
    if len > MAX_PROMPT_LEN {
        return Err(CoreError::Validation(format!(
            "Prompt is {len} characters; the maximum is {MAX_PROMPT_LEN}"
        )));
    }
    Ok(trimmed.to_string())
}

/// Validate an optional `W:H` aspect ratio such as `1:1` or `16:9`.
///
/// Blank input is treated as "not provided".
pub fn validate_aspect_ratio(ratio: Option<&str>) -> Result<Option<String>, CoreError> {
    let Some(ratio) = ratio.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };

    let caps = ASPECT_RATIO_RE.captures(ratio).ok_or_else(|| {
        CoreError::Validation(format!(
            "Invalid aspect ratio '{ratio}'. Expected the form W:H, e.g. 16:9"
        ))
    })?;

    let zero = |idx: usize| caps.get(idx).is_some_and(|m| m.as_str().parse::<u32>() == Ok(0));
    if zero(1) || zero(2) {
        return Err(CoreError::Validation(format!(
            "Invalid aspect ratio '{ratio}'. Both sides must be positive"
        )));
    }

    Ok(Some(ratio.to_string()))
}

/// Resolve the requested batch size, defaulting to [`DEFAULT_BATCH_SIZE`].
pub fn validate_batch_size(batch_size: Option<u8>) -> Result<u8, CoreError> {
    match batch_size {
        None => Ok(DEFAULT_BATCH_SIZE),
        Some(n) if (1..=MAX_BATCH_SIZE).contains(&n) => Ok(n),
        Some(n) => Err(CoreError::Validation(format!(
            "Batch size {n} is out of range (1-{MAX_BATCH_SIZE})"
        ))),
    }
}

/// Reference images must be absolute http(s) URLs or `blob:` references.
pub fn validate_reference_image(reference: Option<&str>) -> Result<Option<String>, CoreError> {
    let Some(reference) = reference.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    let ok = ["https://", "http://", "blob:"]
        .iter()
        .any(|prefix| reference.starts_with(prefix));
    if !ok {
        return Err(CoreError::Validation(
            "Reference image must be an http(s) URL or a blob reference".to_string(),
        ));
    }
    Ok(Some(reference.to_string()))
}
