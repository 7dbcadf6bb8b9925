//! Text codecs for iCalendar value types: dates, date-times, durations,
//! periods, UTC offsets, and backslash-escaped text lists.

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};

use crate::core::contentline::ContentLine;
use crate::core::value::{DateTimeValue, Period, PeriodEnd};
use crate::error::{Result, VObjectError};

/// Characters a backslash may legally escape. DQUOTE is included to work
/// around iCal's penchant for backslash escaping it, although it isn't
/// supposed to be escaped according to RFC 5545 TEXT.
const ESCAPABLE_CHARS: &str = "\\;,Nn\"";

/// `YYYYMMDD`, exactly eight digits; chrono's `%Y%m%d` tolerates one- and
/// two-digit fields, which the grammar does not.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let trimmed = s.trim();
    if trimmed.len() != 8 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VObjectError::parse(format!("'{s}' is not a valid DATE")));
    }
    NaiveDate::parse_from_str(trimmed, "%Y%m%d")
        .map_err(|_| VObjectError::parse(format!("'{s}' is not a valid DATE")))
}

#[must_use]
pub fn date_to_string(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// `YYYYMMDDTHHMMSS[Z]`; a trailing `Z` means UTC, a TZID parameter means a
/// named zone, and neither means a floating time.
pub fn parse_datetime(s: &str, tzid: Option<&str>) -> Result<DateTimeValue> {
    let s = s.trim();
    let bytes = s.as_bytes();
    let shape_ok = matches!(bytes.len(), 15 | 16)
        && bytes[..8].iter().all(u8::is_ascii_digit)
        && bytes[8] == b'T'
        && bytes[9..15].iter().all(u8::is_ascii_digit)
        && (bytes.len() == 15 || bytes[15] == b'Z');
    if !shape_ok {
        return Err(VObjectError::parse(format!(
            "'{s}' is not a valid DATE-TIME"
        )));
    }
    let naive = NaiveDateTime::parse_from_str(&s[..15], "%Y%m%dT%H%M%S")
        .map_err(|_| VObjectError::parse(format!("'{s}' is not a valid DATE-TIME")))?;
    if s.as_bytes().get(15) == Some(&b'Z') {
        return Ok(DateTimeValue::Utc(Utc.from_utc_datetime(&naive)));
    }
    match tzid {
        Some(tzid) if crate::ical::timezone::get_tzid(tzid).is_some() => {
            Ok(DateTimeValue::Zoned {
                local: naive,
                tzid: tzid.to_owned(),
            })
        }
        _ => Ok(DateTimeValue::Floating(naive)),
    }
}

/// Serializes a date-time; with `convert_to_utc`, zoned values are shifted
/// to UTC first. Floating times never grow a `Z`.
pub fn datetime_to_string(value: &DateTimeValue, convert_to_utc: bool) -> Result<String> {
    let value = if convert_to_utc && !value.is_floating() {
        DateTimeValue::Utc(crate::ical::timezone::to_utc(value)?)
    } else {
        value.clone()
    };
    let mut s = value.naive_local().format("%Y%m%dT%H%M%S").to_string();
    if matches!(value, DateTimeValue::Utc(_)) {
        s.push('Z');
    }
    Ok(s)
}

/// Reads a line's value as DATE or DATE-TIME per its VALUE parameter.
///
/// A variety of clients don't serialize dates with the appropriate VALUE
/// parameter, so with `allow_signature_mismatch` the other variety is tried
/// before failing.
pub fn parse_dtstart(
    line: &ContentLine,
    allow_signature_mismatch: bool,
) -> Result<crate::core::value::Value> {
    use crate::core::value::Value;
    let tzid = line.param("TZID");
    let value_param = line.param("VALUE").unwrap_or("DATE-TIME").to_uppercase();
    let text = line.value_text();
    if value_param == "DATE" {
        return Ok(Value::Date(parse_date(text)?));
    }
    match parse_datetime(text, tzid) {
        Ok(dt) => Ok(Value::DateTime(dt)),
        Err(e) => {
            if allow_signature_mismatch {
                Ok(Value::Date(parse_date(text)?))
            } else {
                Err(e)
            }
        }
    }
}

/// `true` when the string reads as a duration: a `P` within the first two
/// characters (allowing a sign).
#[must_use]
pub fn is_duration(s: &str) -> bool {
    let upper = s.to_uppercase();
    matches!(upper.find('P'), Some(at) if at < 2)
}

/// Parses a comma-separated list of `PnW/PnD/TnH/nM/nS` durations.
pub fn string_to_durations(s: &str) -> Result<Vec<TimeDelta>> {
    let mut durations = Vec::new();
    let mut current = String::new();
    let mut negative = false;
    let mut any = false;
    let (mut weeks, mut days, mut hours, mut minutes, mut seconds) = (0i64, 0, 0, 0, 0);

    let mut flush =
        |negative: &mut bool,
         weeks: &mut i64,
         days: &mut i64,
         hours: &mut i64,
         minutes: &mut i64,
         seconds: &mut i64| {
            let mut delta = TimeDelta::weeks(*weeks)
                + TimeDelta::days(*days)
                + TimeDelta::hours(*hours)
                + TimeDelta::minutes(*minutes)
                + TimeDelta::seconds(*seconds);
            if *negative {
                delta = -delta;
            }
            *negative = false;
            (*weeks, *days, *hours, *minutes, *seconds) = (0, 0, 0, 0, 0);
            delta
        };
    let field = |current: &mut String, s: &str| -> Result<i64> {
        let n = current
            .parse::<i64>()
            .map_err(|_| VObjectError::parse(format!("invalid duration field in: {s}")))?;
        current.clear();
        Ok(n)
    };

    let mut started = false;
    let mut field_set = false;
    for c in s.trim().chars() {
        if !started {
            match c {
                '+' => field_set = true,
                '-' => {
                    negative = true;
                    field_set = true;
                }
                'P' | 'p' => started = true,
                '0'..='9' => {
                    started = true;
                    current.push(c);
                }
                _ => {
                    return Err(VObjectError::parse(format!(
                        "got unexpected character {c} reading in duration: {s}"
                    )));
                }
            }
            continue;
        }
        match c {
            '0'..='9' => current.push(c),
            'T' | 't' => {}
            'W' | 'w' => {
                weeks = field(&mut current, s)?;
                field_set = true;
            }
            'D' | 'd' => {
                days = field(&mut current, s)?;
                field_set = true;
            }
            'H' | 'h' => {
                hours = field(&mut current, s)?;
                field_set = true;
            }
            'M' | 'm' => {
                minutes = field(&mut current, s)?;
                field_set = true;
            }
            'S' | 's' => {
                seconds = field(&mut current, s)?;
                field_set = true;
            }
            ',' => {
                durations.push(flush(
                    &mut negative,
                    &mut weeks,
                    &mut days,
                    &mut hours,
                    &mut minutes,
                    &mut seconds,
                ));
                any = true;
                current.clear();
                started = false;
                field_set = false;
            }
            _ => {
                return Err(VObjectError::parse(format!(
                    "got unexpected character reading in duration: {s}"
                )));
            }
        }
    }
    if !started && !any {
        return Err(VObjectError::parse(format!(
            "got end-of-line while reading in duration: {s}"
        )));
    }
    if started && field_set {
        durations.push(flush(
            &mut negative,
            &mut weeks,
            &mut days,
            &mut hours,
            &mut minutes,
            &mut seconds,
        ));
    }
    Ok(durations)
}

/// Serializes a duration; a zero delta becomes `PT0S`.
#[must_use]
pub fn timedelta_to_string(delta: TimeDelta) -> String {
    let negative = delta < TimeDelta::zero();
    let total = delta.num_seconds().abs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push('P');
    if days != 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours != 0 || minutes != 0 || seconds != 0 {
        out.push('T');
    } else if days == 0 {
        out.push_str("T0S");
    }
    if hours != 0 {
        out.push_str(&format!("{hours}H"));
    }
    if minutes != 0 {
        out.push_str(&format!("{minutes}M"));
    }
    if seconds != 0 {
        out.push_str(&format!("{seconds}S"));
    }
    out
}

/// `start/end` or `start/duration`, disambiguated by [`is_duration`].
pub fn string_to_period(s: &str, tzid: Option<&str>) -> Result<Period> {
    let (start, end) = s
        .split_once('/')
        .ok_or_else(|| VObjectError::parse(format!("'{s}' is not a valid PERIOD")))?;
    let start = parse_datetime(start, tzid)?;
    if is_duration(end) {
        let deltas = string_to_durations(end)?;
        let delta = deltas
            .first()
            .copied()
            .ok_or_else(|| VObjectError::parse(format!("'{s}' is not a valid PERIOD")))?;
        Ok(Period {
            start,
            end: PeriodEnd::Duration(delta),
        })
    } else {
        Ok(Period {
            start,
            end: PeriodEnd::End(parse_datetime(end, tzid)?),
        })
    }
}

pub fn period_to_string(period: &Period, convert_to_utc: bool) -> Result<String> {
    let start = datetime_to_string(&period.start, convert_to_utc)?;
    let end = match &period.end {
        PeriodEnd::Duration(delta) => timedelta_to_string(*delta),
        PeriodEnd::End(dt) => datetime_to_string(dt, convert_to_utc)?,
    };
    Ok(format!("{start}/{end}"))
}

/// `±HHMM` or `±HHMMSS`
pub fn parse_utc_offset(s: &str) -> Result<FixedOffset> {
    let fail = || VObjectError::parse(format!("'{s}' is not a valid UTC offset"));
    let s = s.trim();
    let (sign, digits) = match s.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => return Err(fail()),
    };
    if digits.len() != 4 && digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(fail());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| fail())?;
    let minutes: i32 = digits[2..4].parse().map_err(|_| fail())?;
    let seconds: i32 = if digits.len() == 6 {
        digits[4..6].parse().map_err(|_| fail())?
    } else {
        0
    };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60 + seconds)).ok_or_else(fail)
}

/// `+HHMM` / `-HHMM` from a UTC offset delta.
#[must_use]
pub fn offset_to_string(offset: FixedOffset) -> String {
    let total = offset.local_minus_utc();
    let sign = if total < 0 { '-' } else { '+' };
    let total = total.abs();
    format!("{sign}{:02}{:02}", total / 3600, (total % 3600) / 60)
}

/// Splits backslash-escaped text on `separator`. Recognized escapes are
/// decoded; unrecognized ones keep their backslash for later passes.
#[must_use]
pub fn string_to_text_values(s: &str, separator: char) -> Vec<String> {
    let mut results = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            if ESCAPABLE_CHARS.contains(c) {
                if c == 'n' || c == 'N' {
                    current.push('\n');
                } else {
                    current.push(c);
                }
            } else {
                current.push('\\');
                current.push(c);
            }
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == separator {
            results.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    if escaped {
        current.push('\\');
    }
    if !current.is_empty() || results.is_empty() {
        results.push(current);
    }
    results
}

/// Escapes `\`, `;`, `,` and turns line breaks into `\n`.
#[must_use]
pub fn backslash_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\\n");
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_round_trip() {
        let date = parse_date("20260114").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 1, 14).unwrap());
        assert_eq!(date_to_string(date), "20260114");
        assert!(parse_date("2026011").is_err());
    }

    #[test]
    fn datetime_forms() {
        let utc = parse_datetime("20260114T093000Z", None).unwrap();
        assert!(matches!(utc, DateTimeValue::Utc(_)));

        let floating = parse_datetime("20260114T093000", None).unwrap();
        assert!(floating.is_floating());

        let zoned = parse_datetime("20260114T093000", Some("America/New_York")).unwrap();
        assert_eq!(zoned.tzid(), Some("America/New_York"));

        assert!(parse_datetime("garbage", None).is_err());
        // partial forms must not slide through chrono's lenient field widths
        assert!(parse_datetime("2026011T093000Z", None).is_err());
        assert!(parse_datetime("20260114T0930", None).is_err());
    }

    #[test]
    fn datetime_serialization() {
        let utc = parse_datetime("20260114T093000Z", None).unwrap();
        assert_eq!(datetime_to_string(&utc, false).unwrap(), "20260114T093000Z");

        let floating = parse_datetime("20260114T093000", None).unwrap();
        assert_eq!(
            datetime_to_string(&floating, true).unwrap(),
            "20260114T093000"
        );

        let zoned = parse_datetime("20260114T093000", Some("America/New_York")).unwrap();
        assert_eq!(
            datetime_to_string(&zoned, true).unwrap(),
            "20260114T143000Z"
        );
    }

    #[test]
    fn duration_forms() {
        assert_eq!(
            string_to_durations("P1DT2H30M").unwrap(),
            vec![TimeDelta::days(1) + TimeDelta::hours(2) + TimeDelta::minutes(30)]
        );
        assert_eq!(string_to_durations("P2W").unwrap(), vec![TimeDelta::weeks(2)]);
        assert_eq!(
            string_to_durations("-PT15M").unwrap(),
            vec![-TimeDelta::minutes(15)]
        );
        assert_eq!(
            string_to_durations("PT5M,PT10M").unwrap(),
            vec![TimeDelta::minutes(5), TimeDelta::minutes(10)]
        );
        assert!(string_to_durations("").is_err());
        assert!(string_to_durations("X1D").is_err());
    }

    #[test]
    fn duration_serialization() {
        assert_eq!(timedelta_to_string(TimeDelta::zero()), "PT0S");
        assert_eq!(timedelta_to_string(TimeDelta::days(1)), "P1D");
        assert_eq!(
            timedelta_to_string(TimeDelta::days(1) + TimeDelta::minutes(90)),
            "P1DT1H30M"
        );
        assert_eq!(timedelta_to_string(-TimeDelta::minutes(15)), "-PT15M");
    }

    #[test]
    fn period_disambiguation() {
        let with_end = string_to_period("19970101T180000Z/19970102T070000Z", None).unwrap();
        assert!(matches!(with_end.end, PeriodEnd::End(_)));

        let with_duration = string_to_period("19970101T180000Z/PT5H30M", None).unwrap();
        assert_eq!(
            with_duration.end,
            PeriodEnd::Duration(TimeDelta::hours(5) + TimeDelta::minutes(30))
        );
        assert_eq!(
            period_to_string(&with_duration, false).unwrap(),
            "19970101T180000Z/PT5H30M"
        );
    }

    #[test]
    fn utc_offsets() {
        assert_eq!(
            parse_utc_offset("-0500").unwrap(),
            FixedOffset::west_opt(5 * 3600).unwrap()
        );
        assert_eq!(
            parse_utc_offset("+013045").unwrap(),
            FixedOffset::east_opt(3600 + 30 * 60 + 45).unwrap()
        );
        assert!(parse_utc_offset("0500").is_err());
        assert_eq!(
            offset_to_string(FixedOffset::west_opt(5 * 3600).unwrap()),
            "-0500"
        );
    }

    #[test]
    fn text_value_escapes() {
        assert_eq!(
            string_to_text_values("a\\, b,c\\nd", ','),
            vec!["a, b", "c\nd"]
        );
        // unknown escape passes through with its backslash
        assert_eq!(string_to_text_values("a\\x", ','), vec!["a\\x"]);
        assert_eq!(string_to_text_values("", ','), vec![""]);
    }

    #[test]
    fn escape_round_trip() {
        let escaped = backslash_escape("one;two,three\nfour\\five");
        assert_eq!(escaped, "one\\;two\\,three\\nfour\\\\five");
        assert_eq!(
            string_to_text_values(&escaped, ','),
            vec!["one;two,three\nfour\\five"]
        );
    }

    #[test]
    fn dtstart_signature_fallback() {
        let mut line = ContentLine::new("DTSTART", "20260114");
        assert!(parse_dtstart(&line, false).is_err());
        let parsed = parse_dtstart(&line, true).unwrap();
        assert!(matches!(parsed, crate::core::value::Value::Date(_)));

        line.set_param("VALUE", vec!["DATE".to_owned()]);
        let parsed = parse_dtstart(&line, false).unwrap();
        assert!(matches!(parsed, crate::core::value::Value::Date(_)));
    }
}
