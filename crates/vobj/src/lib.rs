//! Parse, inspect, build, and serialize iCalendar (RFC 5545) and vCard
//! (RFC 2426) streams.
//!
//! The object model is a tree of [`Component`]s and [`ContentLine`]s. Each
//! node can carry a [`Behavior`](behavior::Behavior) that knows how to
//! validate it, decode its wire encoding, and swap its textual value for a
//! typed [`Value`] (the "native" form). Reading with the default
//! [`ReadOptions`] binds behaviors by name and VERSION and transforms the
//! whole tree to native; [`Component::serialize`] runs the inverse,
//! generating required properties (UID, DTSTAMP, PRODID, referenced
//! VTIMEZONEs) along the way.

pub mod behavior;
pub mod build;
pub mod change_tz;
pub mod core;
pub mod diff;
pub mod error;
pub mod ical;
pub mod parse;
pub mod vcard;

pub use crate::behavior::{get_behavior, new_from_behavior, register_behavior};
pub use crate::core::component::{Component, Node};
pub use crate::core::contentline::ContentLine;
pub use crate::core::value::{DateTimeValue, Period, PeriodEnd, Value};
pub use crate::error::{Result, VObjectError};
pub use crate::ical::recurrence::{get_rruleset, set_rruleset};
pub use crate::ical::timezone::{TzProvider, get_tzid, register_tzid};
pub use crate::parse::{ReadOptions, read_components, read_one};
