use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta, Utc};

use crate::vcard::{Address, Name};

/// A date-time as it appears in calendar data: floating (no zone), UTC
/// (trailing `Z`), or anchored to a named timezone via a `TZID` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateTimeValue {
    Floating(NaiveDateTime),
    Utc(DateTime<Utc>),
    Zoned { local: NaiveDateTime, tzid: String },
}

impl DateTimeValue {
    /// The wall-clock reading, ignoring which zone it belongs to.
    #[must_use]
    pub fn naive_local(&self) -> NaiveDateTime {
        match self {
            Self::Floating(dt) | Self::Zoned { local: dt, .. } => *dt,
            Self::Utc(dt) => dt.naive_utc(),
        }
    }

    #[must_use]
    pub fn tzid(&self) -> Option<&str> {
        match self {
            Self::Zoned { tzid, .. } => Some(tzid),
            Self::Floating(_) | Self::Utc(_) => None,
        }
    }

    #[must_use]
    pub fn is_floating(&self) -> bool {
        matches!(self, Self::Floating(_))
    }

    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.naive_local().date()
    }
}

/// End of a `PERIOD` value: either an explicit end instant or a duration
/// added to the start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodEnd {
    End(DateTimeValue),
    Duration(TimeDelta),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    pub start: DateTimeValue,
    pub end: PeriodEnd,
}

/// A property value in either its raw textual form or a decoded native form.
///
/// Freshly parsed lines always hold `Text` with the unescaped-but-unparsed
/// payload; behaviors replace it with a typed variant during the native
/// transform and turn it back into `Text` on serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    TextList(Vec<String>),
    /// Semicolon-separated fields, each holding comma-separated values.
    Structured(Vec<Vec<String>>),
    Date(NaiveDate),
    DateTime(DateTimeValue),
    DateList(Vec<NaiveDate>),
    DateTimeList(Vec<DateTimeValue>),
    PeriodList(Vec<Period>),
    Duration(TimeDelta),
    UtcOffset(FixedOffset),
    Name(Name),
    Address(Address),
    Binary(Vec<u8>),
}

impl Value {
    /// The raw text, when this value has not been decoded.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_datetime(&self) -> Option<&DateTimeValue> {
        match self {
            Self::DateTime(dt) => Some(dt),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}
