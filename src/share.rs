//! Share codes for incidents.
//!
//! Clients render the code as a QR image; scanning one yields the same text,
//! which resolves back to the incident id.

use crate::error::{Error, Result};

const SHARE_PREFIX: &str = "DISASTER_ZONE|";

/// Build the share code for an incident.
pub fn share_code(incident_id: &str) -> String {
    format!("{SHARE_PREFIX}{incident_id}")
}

/// Extract the incident id from a scanned share code.
pub fn parse_share_code(code: &str) -> Result<&str> {
    let id = code
        .trim()
        .strip_prefix(SHARE_PREFIX)
        .ok_or_else(|| Error::InvalidShareCode(code.to_string()))?;

    if id.is_empty() || id.contains('|') || id.chars().any(char::is_whitespace) {
        return Err(Error::InvalidShareCode(code.to_string()));
    }

    Ok(id)
}
