use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod chat;
pub mod fixture;
pub mod health;
pub mod presence;
pub mod sse;
pub mod validation;

fn format_system_time(time: SystemTime) -> String {
    format_datetime(OffsetDateTime::from(time))
}

fn format_datetime(time: OffsetDateTime) -> String {
    time.format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
