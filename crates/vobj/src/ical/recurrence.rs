//! Recurrence set assembly: turns RRULE/EXRULE/RDATE/EXDATE children into an
//! [`rrule::RRuleSet`] anchored at DTSTART, and derives rule strings back
//! from a set, omitting parameters the expansion engine infers from DTSTART.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Weekday};
use rrule::{Frequency, NWeekday, RRule, RRuleSet, Unvalidated};
use tracing::{debug, error};

use crate::core::component::Component;
use crate::core::contentline::ContentLine;
use crate::core::value::{DateTimeValue, Value};
use crate::error::{Result, VObjectError};
use crate::ical::{timezone, values};

const WEEKDAYS: [&str; 7] = ["MO", "TU", "WE", "TH", "FR", "SA", "SU"];

/// DTSTART (or DUE, for a VTODO) in either of its two shapes.
#[derive(Debug, Clone)]
enum Start {
    Date(NaiveDate),
    DateTime(DateTimeValue),
}

impl Start {
    fn time(&self) -> NaiveTime {
        match self {
            Self::Date(_) => NaiveTime::MIN,
            Self::DateTime(dt) => dt.naive_local().time(),
        }
    }

    /// Whether zone information should be ignored when reading UNTIL.
    fn floating(&self) -> bool {
        match self {
            Self::Date(_) => true,
            Self::DateTime(dt) => dt.is_floating(),
        }
    }
}

fn start_of(component: &Component) -> Option<Start> {
    let line = component.get("DTSTART").or_else(|| {
        if component.name == "VTODO" {
            component.get("DUE")
        } else {
            None
        }
    })?;
    match &line.value {
        Value::Date(d) => Some(Start::Date(*d)),
        Value::DateTime(dt) => Some(Start::DateTime(dt.clone())),
        Value::Text(_) => match values::parse_dtstart(line, true).ok()? {
            Value::Date(d) => Some(Start::Date(d)),
            Value::DateTime(dt) => Some(Start::DateTime(dt)),
            _ => None,
        },
        _ => None,
    }
}

/// The expansion timezone for a start value, and the start as an instant in
/// it. Zones outside the IANA database are expanded in UTC.
fn anchor(start: &Start) -> Result<(rrule::Tz, DateTime<rrule::Tz>)> {
    let tz = match start {
        Start::DateTime(DateTimeValue::Zoned { tzid, .. }) => tzid
            .parse::<chrono_tz::Tz>()
            .map_or(rrule::Tz::UTC, rrule::Tz::Tz),
        Start::Date(_) | Start::DateTime(_) => rrule::Tz::UTC,
    };
    let utc = match start {
        Start::Date(d) => {
            let naive = d
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| VObjectError::native("invalid DTSTART date"))?;
            chrono::Utc.from_utc_datetime(&naive)
        }
        Start::DateTime(dt) => timezone::to_utc(dt)?,
    };
    Ok((tz, utc.with_timezone(&tz)))
}

/// Builds the recurrence set for a component, or `None` when it has no
/// recurrence children or no usable start.
///
/// With `add_start`, DTSTART is injected as an RDATE when the rules don't
/// already produce it, decrementing COUNT to compensate. RDATEs carrying
/// PERIOD values are skipped.
pub fn get_rruleset(component: &Component, add_start: bool) -> Result<Option<RRuleSet>> {
    let has_recurrence = ["RRULE", "EXRULE", "RDATE", "EXDATE"]
        .iter()
        .any(|name| !component.get_all(name).is_empty());
    if !has_recurrence {
        return Ok(None);
    }
    let Some(start) = start_of(component) else {
        error!("failed to find DTSTART or DUE for recurrence expansion");
        return Ok(None);
    };
    let (tz, dtstart) = anchor(&start)?;

    let mut rrules = Vec::new();
    for line in lines_named(component, "RRULE") {
        rrules.push(parse_rule(line.value_text(), &start, tz)?);
    }
    let mut exrules = Vec::new();
    for line in lines_named(component, "EXRULE") {
        exrules.push(parse_rule(line.value_text(), &start, tz)?);
    }
    let rdates = collect_dates(component, "RDATE", tz)?;
    let exdates = collect_dates(component, "EXDATE", tz)?;

    let mut extra_start = false;
    if add_start {
        if let Some(last) = rrules.last() {
            let probe = last.clone().validate(dtstart)?;
            let first = RRuleSet::new(dtstart)
                .rrule(probe.clone())
                .all(1)
                .dates
                .into_iter()
                .next();
            if first != Some(dtstart) {
                extra_start = true;
                if let Some(count) = probe.get_count() {
                    let index = rrules.len() - 1;
                    rrules[index] = rrules[index].clone().count(count.saturating_sub(1));
                }
            }
        } else if !rdates.is_empty() && rdates[0] != dtstart {
            extra_start = true;
        }
    }

    let mut set = RRuleSet::new(dtstart);
    for rule in rrules {
        set = set.rrule(rule.validate(dtstart)?);
    }
    for rule in exrules {
        set = set.exrule(rule.validate(dtstart)?);
    }
    for date in rdates {
        set = set.rdate(date);
    }
    for date in exdates {
        set = set.exdate(date);
    }
    if extra_start {
        set = set.rdate(dtstart);
    }
    Ok(Some(set))
}

fn lines_named<'a>(
    component: &'a Component,
    name: &str,
) -> impl Iterator<Item = &'a ContentLine> {
    component.get_all(name).iter().filter_map(|n| n.as_line())
}

fn collect_dates(
    component: &Component,
    name: &str,
    tz: rrule::Tz,
) -> Result<Vec<DateTime<rrule::Tz>>> {
    let mut out = Vec::new();
    for line in lines_named(component, name) {
        match &line.value {
            Value::DateTimeList(list) => {
                for dt in list {
                    out.push(timezone::to_utc(dt)?.with_timezone(&tz));
                }
            }
            Value::DateList(list) => {
                for d in list {
                    let naive = d
                        .and_hms_opt(0, 0, 0)
                        .ok_or_else(|| VObjectError::native("invalid date"))?;
                    out.push(chrono::Utc.from_utc_datetime(&naive).with_timezone(&tz));
                }
            }
            Value::PeriodList(_) => {
                // no way to feed period occurrences to the expansion engine
                debug!("ignoring PERIOD-valued {name}");
            }
            Value::Text(text) => {
                let tzid = line.param("TZID");
                for piece in text.split(',') {
                    if let Ok(dt) = values::parse_datetime(piece, tzid) {
                        out.push(timezone::to_utc(&dt)?.with_timezone(&tz));
                    } else if let Ok(d) = values::parse_date(piece) {
                        let naive = d
                            .and_hms_opt(0, 0, 0)
                            .ok_or_else(|| VObjectError::native("invalid date"))?;
                        out.push(chrono::Utc.from_utc_datetime(&naive).with_timezone(&tz));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(out)
}

/// Parses one RRULE/EXRULE value, normalizing UNTIL to DTSTART's zone.
///
/// A Ruby iCalendar library escapes semicolons in rules, so backslashes are
/// stripped first. A date-only UNTIL adopts DTSTART's time of day, a
/// floating UNTIL under a zoned DTSTART is read in that zone, and a zoned
/// UNTIL under a floating DTSTART loses its zone.
fn parse_rule(value: &str, start: &Start, tz: rrule::Tz) -> Result<RRule<Unvalidated>> {
    let value = value.replace('\\', "");
    let mut until_token = None;
    let mut kept = Vec::new();
    for part in value.split(';') {
        if part
            .split_once('=')
            .is_some_and(|(key, _)| key.eq_ignore_ascii_case("UNTIL"))
        {
            until_token = part.split_once('=').map(|(_, v)| v.to_owned());
        } else if !part.is_empty() {
            kept.push(part);
        }
    }
    let mut rule: RRule<Unvalidated> = kept.join(";").parse()?;

    if let Some(token) = until_token {
        let until = parse_until(&token, start, tz)?;
        rule = rule.until(until);
    }
    Ok(rule)
}

fn parse_until(token: &str, start: &Start, tz: rrule::Tz) -> Result<DateTime<rrule::Tz>> {
    if token.len() == 8 {
        // date-only UNTIL adopts DTSTART's time of day
        let date = values::parse_date(token)?;
        let naive = date.and_time(start.time());
        return local_instant(naive, start, tz);
    }
    let parsed = values::parse_datetime(token, None)?;
    match parsed {
        DateTimeValue::Utc(dt) => {
            if start.floating() {
                // no zone to compare against; treat UNTIL as floating
                Ok(chrono::Utc.from_utc_datetime(&dt.naive_utc()).with_timezone(&tz))
            } else {
                Ok(dt.with_timezone(&tz))
            }
        }
        DateTimeValue::Floating(naive) => local_instant(naive, start, tz),
        DateTimeValue::Zoned { local, tzid } => {
            let utc = timezone::to_utc(&DateTimeValue::Zoned { local, tzid })?;
            Ok(utc.with_timezone(&tz))
        }
    }
}

/// A wall-clock reading interpreted in DTSTART's zone.
fn local_instant(
    naive: NaiveDateTime,
    start: &Start,
    tz: rrule::Tz,
) -> Result<DateTime<rrule::Tz>> {
    if start.floating() {
        return Ok(chrono::Utc.from_utc_datetime(&naive).with_timezone(&tz));
    }
    match tz.from_local_datetime(&naive) {
        chrono::offset::LocalResult::Single(dt)
        | chrono::offset::LocalResult::Ambiguous(_, dt) => Ok(dt),
        chrono::offset::LocalResult::None => Err(VObjectError::native(format!(
            "UNTIL value {naive} does not exist in DTSTART's timezone"
        ))),
    }
}

/// Replaces the recurrence children of a component with lines derived from
/// a recurrence set. Parameters the engine infers from DTSTART (a WEEKLY
/// BYDAY matching its weekday, a BYMONTHDAY/BYMONTH matching its date) are
/// left out.
pub fn set_rruleset(component: &mut Component, set: &RRuleSet) -> Result<()> {
    let start = start_of(component)
        .ok_or_else(|| VObjectError::native("component has no DTSTART or DUE"))?;
    let is_date = matches!(start, Start::Date(_));
    let (_, dtstart) = anchor(&start)?;

    for name in ["RRULE", "EXRULE", "RDATE", "EXDATE"] {
        component.remove_all(name);
    }

    let mut rdates: Vec<DateTime<rrule::Tz>> = set.get_rdate().clone();
    rdates.retain(|dt| *dt != dtstart);
    if !rdates.is_empty() {
        component.add(date_list_line("RDATE", &rdates, is_date));
    }
    let exdates = set.get_exdate();
    if !exdates.is_empty() {
        component.add(date_list_line("EXDATE", exdates, is_date));
    }

    for rule in set.get_rrule() {
        let text = rule_to_string(rule, dtstart, is_date)?;
        component.add(ContentLine::new("RRULE", text));
    }
    for rule in set.get_exrule() {
        let text = rule_to_string(rule, dtstart, is_date)?;
        component.add(ContentLine::new("EXRULE", text));
    }
    Ok(())
}

fn date_list_line(name: &str, dates: &[DateTime<rrule::Tz>], is_date: bool) -> ContentLine {
    let value = if is_date {
        Value::DateList(dates.iter().map(DateTime::date_naive).collect())
    } else {
        Value::DateTimeList(
            dates
                .iter()
                .map(|dt| DateTimeValue::Utc(dt.with_timezone(&chrono::Utc)))
                .collect(),
        )
    };
    let mut line = ContentLine::new(name, "");
    line.value = value;
    line.is_native = true;
    line.encoded = false;
    line
}

fn freq_name(freq: Frequency) -> &'static str {
    match freq {
        Frequency::Yearly => "YEARLY",
        Frequency::Monthly => "MONTHLY",
        Frequency::Weekly => "WEEKLY",
        Frequency::Daily => "DAILY",
        Frequency::Hourly => "HOURLY",
        Frequency::Minutely => "MINUTELY",
        Frequency::Secondly => "SECONDLY",
    }
}

fn weekday_abbrev(weekday: Weekday) -> &'static str {
    WEEKDAYS[weekday.num_days_from_monday() as usize]
}

fn rule_to_string(
    rule: &RRule,
    dtstart: DateTime<rrule::Tz>,
    is_date: bool,
) -> Result<String> {
    let mut out = format!("FREQ={}", freq_name(rule.get_freq()));
    let mut push = |key: &str, values: &[String]| {
        if !values.is_empty() {
            out.push(';');
            out.push_str(key);
            out.push('=');
            out.push_str(&values.join(","));
        }
    };

    if rule.get_interval() != 1 {
        push("INTERVAL", &[rule.get_interval().to_string()]);
    }
    let wkst = rule.get_week_start().num_days_from_monday() as usize;
    if wkst != 0 {
        push("WKST", &[WEEKDAYS[wkst].to_owned()]);
    }
    let setpos: Vec<String> = rule.get_by_set_pos().iter().map(ToString::to_string).collect();
    push("BYSETPOS", &setpos);

    if let Some(count) = rule.get_count() {
        push("COUNT", &[count.to_string()]);
    } else if let Some(until) = rule.get_until() {
        let text = if is_date {
            values::date_to_string(until.date_naive())
        } else {
            values::datetime_to_string(
                &DateTimeValue::Utc(until.with_timezone(&chrono::Utc)),
                true,
            )?
        };
        push("UNTIL", &[text]);
    }

    let mut days = Vec::new();
    let weekdays = rule.get_by_weekday();
    let plain: Vec<Weekday> = weekdays
        .iter()
        .filter_map(|d| match d {
            NWeekday::Every(wd) => Some(*wd),
            NWeekday::Nth(_, _) => None,
        })
        .collect();
    let auto_weekly = rule.get_freq() == Frequency::Weekly
        && weekdays.len() == 1
        && plain.first() == Some(&dtstart.weekday());
    if !auto_weekly {
        for d in weekdays {
            match d {
                NWeekday::Every(wd) => days.push(weekday_abbrev(*wd).to_owned()),
                NWeekday::Nth(n, wd) => days.push(format!("{n}{}", weekday_abbrev(*wd))),
            }
        }
    }
    push("BYDAY", &days);

    let monthdays = rule.get_by_month_day();
    let auto_monthday = matches!(rule.get_freq(), Frequency::Yearly | Frequency::Monthly)
        && monthdays.len() == 1
        && i32::from(monthdays[0]) == i32::try_from(dtstart.day()).unwrap_or(0);
    if !auto_monthday {
        let values: Vec<String> = monthdays.iter().map(ToString::to_string).collect();
        push("BYMONTHDAY", &values);
    }

    let months = rule.get_by_month();
    let auto_month = rule.get_freq() == Frequency::Yearly
        && months.len() == 1
        && weekdays.is_empty()
        && u32::from(months[0]) == dtstart.month();
    if !auto_month {
        let values: Vec<String> = months.iter().map(ToString::to_string).collect();
        push("BYMONTH", &values);
    }

    let yeardays: Vec<String> = rule.get_by_year_day().iter().map(ToString::to_string).collect();
    push("BYYEARDAY", &yeardays);
    let weeknos: Vec<String> = rule.get_by_week_no().iter().map(ToString::to_string).collect();
    push("BYWEEKNO", &weeknos);

    Ok(out)
}
