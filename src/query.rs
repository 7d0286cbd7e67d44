//! Search query construction.

use crate::error::CheckError;

/// Phrase appended to every model name to steer the provider toward spec sheets.
pub const STEERING_PHRASE: &str = "technical specifications esim support";

/// Builds the provider query for `model_name`.
///
/// The model name is treated as opaque search text. Surrounding whitespace is
/// trimmed and internal runs collapse to a single space; an empty result is
/// rejected before any network call happens.
pub fn build_query(model_name: &str) -> Result<String, CheckError> {
    let model = normalize_model(model_name)?;
    Ok(format!("{model} {STEERING_PHRASE}"))
}

/// Trims and collapses the caller-supplied model name.
pub fn normalize_model(model_name: &str) -> Result<String, CheckError> {
    let collapsed = model_name.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(CheckError::InvalidInput(
            "model name must not be empty".to_string(),
        ));
    }
    Ok(collapsed)
}
