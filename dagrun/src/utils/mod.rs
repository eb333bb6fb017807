//! Small shared helpers.

use chrono::Utc;
use uuid::Uuid;

/// Generates a new UUID v4.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// The current time as an RFC 3339 timestamp.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339()
}
