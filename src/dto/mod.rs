use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health endpoint payloads.
pub mod health;
/// Wire shape of a room's state.
pub mod snapshot;
/// Field validators.
pub mod validation;
/// WebSocket frames and client operations.
pub mod ws;

/// Current wall-clock time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    format_system_time(SystemTime::now())
}

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
