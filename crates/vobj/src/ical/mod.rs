//! iCalendar (RFC 5545) support: value codecs, behaviors, timezone
//! handling, and recurrence expansion.

pub mod behaviors;
pub mod recurrence;
pub mod timezone;
pub mod values;
