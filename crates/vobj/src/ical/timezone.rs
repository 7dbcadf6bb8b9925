//! Timezone plumbing: the [`TzProvider`] seam, a process-wide TZID
//! registry backed by the IANA database, synthesis of VTIMEZONE components
//! from a provider, and the reverse direction building a rule-backed
//! provider out of a parsed VTIMEZONE.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use chrono::offset::LocalResult;
use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeDelta, TimeZone,
    Timelike, Utc, Weekday,
};
use chrono_tz::{OffsetComponents, OffsetName, Tz};

use crate::core::component::Component;
use crate::core::contentline::ContentLine;
use crate::core::value::DateTimeValue;
use crate::error::{Result, VObjectError};
use crate::ical::values;

const WEEKDAYS: [&str; 7] = ["MO", "TU", "WE", "TH", "FR", "SA", "SU"];

/// How a wall-clock reading relates to the zone's offset schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalClass {
    Standard,
    Daylight,
    /// Skipped by a forward transition; the reading never occurs.
    Gap,
    /// Repeated by a backward transition; the reading occurs twice.
    Fold,
}

/// Offset schedule for one timezone, queried by wall-clock time.
///
/// Ambiguous and nonexistent readings are treated as belonging to the later
/// regime, which is what the VTIMEZONE synthesis assumes.
pub trait TzProvider: Sync + Send + std::fmt::Debug {
    /// Stable identifier (the IANA name), when one is known.
    fn id(&self) -> Option<&str> {
        None
    }

    /// UTC offset in effect at the given wall-clock reading.
    fn utc_offset(&self, local: NaiveDateTime) -> FixedOffset;

    fn classify(&self, local: NaiveDateTime) -> LocalClass;

    /// Zone abbreviation (EST, CEST, ...) at the given reading.
    fn tzname(&self, local: NaiveDateTime) -> Option<String>;
}

impl TzProvider for Tz {
    fn id(&self) -> Option<&str> {
        Some(self.name())
    }

    fn utc_offset(&self, local: NaiveDateTime) -> FixedOffset {
        match self.offset_from_local_datetime(&local) {
            LocalResult::Single(offset) => offset.fix(),
            LocalResult::Ambiguous(_, later) => later.fix(),
            // nonexistent reading, use the post-transition regime
            LocalResult::None => match self.offset_from_local_datetime(&(local + TimeDelta::hours(3)))
            {
                LocalResult::Single(offset) | LocalResult::Ambiguous(offset, _) => offset.fix(),
                LocalResult::None => self.offset_from_utc_datetime(&local).fix(),
            },
        }
    }

    fn classify(&self, local: NaiveDateTime) -> LocalClass {
        match self.offset_from_local_datetime(&local) {
            LocalResult::Single(offset) => {
                if offset.dst_offset() == TimeDelta::zero() {
                    LocalClass::Standard
                } else {
                    LocalClass::Daylight
                }
            }
            LocalResult::Ambiguous(_, _) => LocalClass::Fold,
            LocalResult::None => LocalClass::Gap,
        }
    }

    fn tzname(&self, local: NaiveDateTime) -> Option<String> {
        match self.offset_from_local_datetime(&local) {
            LocalResult::Single(offset) | LocalResult::Ambiguous(_, offset) => {
                Some(offset.abbreviation()?.to_owned())
            }
            LocalResult::None => match self.offset_from_local_datetime(&(local + TimeDelta::hours(3)))
            {
                LocalResult::Single(offset) | LocalResult::Ambiguous(offset, _) => {
                    Some(offset.abbreviation()?.to_owned())
                }
                LocalResult::None => None,
            },
        }
    }
}

type TzidMap = HashMap<String, Arc<dyn TzProvider>>;

static TZIDS: LazyLock<RwLock<TzidMap>> = LazyLock::new(|| RwLock::new(TzidMap::new()));

/// Registers a provider under a TZID, overriding any previous registration.
pub fn register_tzid(tzid: &str, provider: Arc<dyn TzProvider>) {
    let mut map = TZIDS.write().unwrap_or_else(PoisonError::into_inner);
    map.insert(tzid.to_owned(), provider);
}

/// Resolves a TZID: explicit registrations first, then the IANA database
/// (successful lookups are cached).
#[must_use]
pub fn get_tzid(tzid: &str) -> Option<Arc<dyn TzProvider>> {
    {
        let map = TZIDS.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(provider) = map.get(tzid) {
            return Some(Arc::clone(provider));
        }
    }
    let tz: Tz = tzid.parse().ok()?;
    let provider: Arc<dyn TzProvider> = Arc::new(tz);
    let mut map = TZIDS.write().unwrap_or_else(PoisonError::into_inner);
    let entry = map.entry(tzid.to_owned()).or_insert(provider);
    Some(Arc::clone(entry))
}

#[must_use]
pub fn utc_provider() -> Arc<dyn TzProvider> {
    Arc::new(Tz::UTC)
}

/// Converts any date-time value to a UTC instant. Floating times are read
/// as if they were UTC.
pub fn to_utc(value: &DateTimeValue) -> Result<DateTime<Utc>> {
    match value {
        DateTimeValue::Utc(dt) => Ok(*dt),
        DateTimeValue::Floating(naive) => Ok(Utc.from_utc_datetime(naive)),
        DateTimeValue::Zoned { local, tzid } => {
            let provider = get_tzid(tzid)
                .ok_or_else(|| VObjectError::config(format!("unknown TZID {tzid}")))?;
            let offset = provider.utc_offset(*local);
            Ok(Utc.from_utc_datetime(&(*local - offset)))
        }
    }
}

/// Converts a UTC instant into the named zone's wall clock.
pub fn from_utc(instant: DateTime<Utc>, tzid: &str) -> Result<DateTimeValue> {
    let provider =
        get_tzid(tzid).ok_or_else(|| VObjectError::config(format!("unknown TZID {tzid}")))?;
    let naive = instant.naive_utc();
    // The offset depends on the local reading; one fixup round suffices for
    // sane zones.
    let offset = provider.utc_offset(naive);
    let offset = provider.utc_offset(naive + offset);
    Ok(DateTimeValue::Zoned {
        local: naive + offset,
        tzid: tzid.to_owned(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DstState {
    Daylight,
    Standard,
}

/// Finds the wall-clock time a zone switches to daylight or standard time
/// in `year`.
///
/// `Some(Jan 1)` means the state holds all year, `None` means it never
/// holds (or the transition falls in December, which is unsupported).
fn get_transition(
    transition_to: DstState,
    year: i32,
    tzinfo: &dyn TzProvider,
) -> Option<NaiveDateTime> {
    let test = |dt: NaiveDateTime| match tzinfo.classify(dt) {
        LocalClass::Standard | LocalClass::Fold => transition_to == DstState::Standard,
        LocalClass::Daylight | LocalClass::Gap => transition_to == DstState::Daylight,
    };

    // the last probe before the predicate first flips to true
    let first_transition = |dates: &mut dyn Iterator<Item = NaiveDateTime>| {
        let mut success = None;
        for dt in dates {
            if test(dt) {
                if success.is_some() {
                    return success;
                }
            } else {
                success = Some(dt);
            }
        }
        success
    };

    let newyear = NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)?;
    let month_dt = first_transition(
        &mut (1..=12).filter_map(|m| Some(NaiveDate::from_ymd_opt(year, m, 1)?.and_hms_opt(0, 0, 0)?)),
    );
    let month_dt = match month_dt {
        None => return Some(newyear),
        Some(dt) if dt.month() == 12 => return None,
        Some(dt) => dt,
    };

    let month = month_dt.month();
    let day = first_transition(
        &mut (1..=31)
            .filter_map(|d| Some(NaiveDate::from_ymd_opt(year, month, d)?.and_hms_opt(0, 0, 0)?)),
    )?
    .day();
    let uncorrected = first_transition(
        &mut (0..24)
            .filter_map(|h| Some(NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(h, 0, 0)?)),
    )?;
    // the predicate flips one probe after the last hour of the old regime,
    // and the offset change itself consumes another hour when entering
    // standard time
    match transition_to {
        DstState::Standard => Some(uncorrected + TimeDelta::hours(2)),
        DstState::Daylight => Some(uncorrected + TimeDelta::hours(1)),
    }
}

/// Compares two offset schedules over `[start_year, end_year)`.
#[must_use]
pub fn tzinfo_eq(a: &dyn TzProvider, b: &dyn TzProvider, start_year: i32, end_year: i32) -> bool {
    let offsets_match = |dt: Option<NaiveDateTime>| match dt {
        None => true,
        Some(dt) => a.utc_offset(dt) == b.utc_offset(dt),
    };
    let jan1 = NaiveDate::from_ymd_opt(start_year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0));
    if !offsets_match(jan1) {
        return false;
    }
    for year in start_year..end_year {
        for transition_to in [DstState::Daylight, DstState::Standard] {
            let t1 = get_transition(transition_to, year, a);
            let t2 = get_transition(transition_to, year, b);
            if t1 != t2 || !offsets_match(t1) {
                return false;
            }
        }
    }
    true
}

/// Determines the TZID for a provider: its stable id if it has one,
/// otherwise the abbreviation it uses for standard time. UTC-equivalent
/// zones yield `None` unless `allow_utc`.
pub fn pick_tzid(tzinfo: &dyn TzProvider, allow_utc: bool) -> Result<Option<String>> {
    if !allow_utc && tzinfo_eq(tzinfo, &Tz::UTC, 2000, 2020) {
        return Ok(None);
    }
    if let Some(id) = tzinfo.id() {
        return Ok(Some(id.to_owned()));
    }
    for month in 1..=12 {
        let Some(dt) = NaiveDate::from_ymd_opt(2000, month, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
        else {
            continue;
        };
        if tzinfo.classify(dt) == LocalClass::Standard {
            return Ok(tzinfo.tzname(dt));
        }
    }
    // there was no standard time in 2000
    Err(VObjectError::config(
        "Unable to guess TZID for timezone".to_owned(),
    ))
}

#[derive(Debug, Clone)]
struct TransitionRule {
    end: Option<i32>,
    start: NaiveDateTime,
    month: u32,
    /// Days from Monday; `None` for an all-year rule.
    weekday: Option<u32>,
    hour: Option<u32>,
    plus: Option<u32>,
    minus: Option<u32>,
    name: Option<String>,
    offset: FixedOffset,
    offset_from: FixedOffset,
}

/// How many weeks from the end of the month a date is, starting from 1.
fn from_last_week(dt: NaiveDateTime) -> u32 {
    let mut n = 1;
    let mut current = dt + TimeDelta::weeks(1);
    while current.month() == dt.month() {
        n += 1;
        current += TimeDelta::weeks(1);
    }
    n
}

/// Date of the nth weekday of a month; negative `n` counts from the end.
fn nth_weekday_of_month(year: i32, month: u32, weekday: Weekday, n: i32) -> Option<NaiveDate> {
    if n > 0 {
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "n is a small week index")]
        return NaiveDate::from_weekday_of_month_opt(year, month, weekday, n as u8);
    }
    let last = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?.pred_opt()?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?.pred_opt()?
    };
    let back = (7 + last.weekday().num_days_from_monday() - weekday.num_days_from_monday()) % 7;
    let date = last - TimeDelta::days(i64::from(back) + 7 * (i64::from(-n) - 1));
    (date.month() == month).then_some(date)
}

/// Builds a VTIMEZONE component describing `tzinfo`, collapsing DST
/// transitions over `[start, end]` into yearly RRULEs where possible.
///
/// Assumptions: transitions occur on the hour, at most twice a year, never
/// within a month of one another, and never in December.
pub fn vtimezone_from_tzinfo(
    tzinfo: &dyn TzProvider,
    start: i32,
    end: i32,
) -> Result<Component> {
    let mut completed: HashMap<DstState, Vec<TransitionRule>> = HashMap::new();
    let mut working: HashMap<DstState, Option<TransitionRule>> =
        HashMap::from([(DstState::Daylight, None), (DstState::Standard, None)]);

    for year in start..=end {
        let newyear = NaiveDate::from_ymd_opt(year, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| VObjectError::config("invalid year range"))?;
        for transition_to in [DstState::Daylight, DstState::Standard] {
            let transition = get_transition(transition_to, year, tzinfo);
            let oldrule = working
                .get_mut(&transition_to)
                .ok_or_else(|| VObjectError::config("state missing"))?;

            match transition {
                Some(t) if t == newyear => {
                    // in effect for the whole year
                    let rule = TransitionRule {
                        end: None,
                        start: newyear,
                        month: 1,
                        weekday: None,
                        hour: None,
                        plus: None,
                        minus: None,
                        name: tzinfo.tzname(newyear),
                        offset: tzinfo.utc_offset(newyear),
                        offset_from: tzinfo.utc_offset(newyear),
                    };
                    match oldrule {
                        None => *oldrule = Some(rule),
                        Some(old) => {
                            if old.offset != tzinfo.utc_offset(newyear) {
                                old.end = Some(year - 1);
                                completed.entry(transition_to).or_default().push(old.clone());
                                *oldrule = Some(rule);
                            }
                        }
                    }
                }
                None => {
                    if let Some(old) = oldrule.take() {
                        let mut old = old;
                        old.end = Some(year - 1);
                        completed.entry(transition_to).or_default().push(old);
                    }
                }
                Some(transition) => {
                    let rule = TransitionRule {
                        end: None,
                        start: transition,
                        month: transition.month(),
                        weekday: Some(transition.weekday().num_days_from_monday()),
                        hour: Some(transition.hour()),
                        plus: Some((transition.day() - 1) / 7 + 1),
                        minus: Some(from_last_week(transition)),
                        name: tzinfo.tzname(transition),
                        offset: tzinfo.utc_offset(transition),
                        offset_from: tzinfo.utc_offset(transition - TimeDelta::hours(2)),
                    };
                    match oldrule {
                        None => *oldrule = Some(rule),
                        Some(old) => {
                            let plus_match = rule.plus == old.plus;
                            let minus_match = rule.minus == old.minus;
                            let matches = (plus_match || minus_match)
                                && rule.month == old.month
                                && rule.weekday == old.weekday
                                && rule.hour == old.hour
                                && rule.offset == old.offset;
                            if matches {
                                // still true, narrow to the matching anchor
                                if !plus_match {
                                    old.plus = None;
                                }
                                if !minus_match {
                                    old.minus = None;
                                }
                            } else {
                                old.end = Some(year - 1);
                                completed.entry(transition_to).or_default().push(old.clone());
                                *oldrule = Some(rule);
                            }
                        }
                    }
                }
            }
        }
    }
    for transition_to in [DstState::Daylight, DstState::Standard] {
        if let Some(Some(rule)) = working.remove(&transition_to) {
            completed.entry(transition_to).or_default().push(rule);
        }
    }

    let mut vtimezone = Component::new("VTIMEZONE");
    let tzid = pick_tzid(tzinfo, true)?
        .ok_or_else(|| VObjectError::config("Unable to guess TZID for timezone"))?;
    vtimezone.add(ContentLine::new("TZID", tzid));

    for (transition_to, comp_name) in [
        (DstState::Daylight, "DAYLIGHT"),
        (DstState::Standard, "STANDARD"),
    ] {
        for rule in completed.get(&transition_to).map_or(&[][..], Vec::as_slice) {
            let mut comp = Component::new(comp_name);
            comp.add(ContentLine::new(
                "DTSTART",
                rule.start.format("%Y%m%dT%H%M%S").to_string(),
            ));
            if let Some(name) = &rule.name {
                comp.add(ContentLine::new("TZNAME", name.as_str()));
            }
            comp.add(ContentLine::new(
                "TZOFFSETTO",
                values::offset_to_string(rule.offset),
            ));
            comp.add(ContentLine::new(
                "TZOFFSETFROM",
                values::offset_to_string(rule.offset_from),
            ));
            comp.add(ContentLine::new("RRULE", rule_string(rule)?));
            vtimezone.add(comp);
        }
    }
    Ok(vtimezone)
}

fn rule_string(rule: &TransitionRule) -> Result<String> {
    let num: Option<i32> = match (rule.plus, rule.minus) {
        (Some(plus), _) => Some(i32::try_from(plus).unwrap_or(0)),
        (None, Some(minus)) => Some(-i32::try_from(minus).unwrap_or(0)),
        (None, None) => None,
    };
    let day_string = match (num, rule.weekday) {
        (Some(num), Some(weekday)) => {
            let abbrev = WEEKDAYS
                .get(weekday as usize)
                .ok_or_else(|| VObjectError::config("weekday out of range"))?;
            format!(";BYDAY={num}{abbrev}")
        }
        _ => String::new(),
    };
    let end_string = match rule.end {
        None => String::new(),
        Some(end_year) => {
            let end_date = match (rule.hour, rule.weekday, num) {
                (Some(hour), Some(weekday), Some(num)) => {
                    let weekday = weekday_from_index(weekday)?;
                    let date = nth_weekday_of_month(end_year, rule.month, weekday, num)
                        .ok_or_else(|| {
                            VObjectError::config("no matching weekday in rule end year")
                        })?;
                    date.and_hms_opt(hour, 0, 0)
                        .ok_or_else(|| VObjectError::config("rule hour out of range"))?
                }
                _ => NaiveDate::from_ymd_opt(end_year, 1, 1)
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .ok_or_else(|| VObjectError::config("invalid rule end year"))?,
            };
            // express the final occurrence as a UTC instant
            let until = end_date - rule.offset_from;
            format!(";UNTIL={}Z", until.format("%Y%m%dT%H%M%S"))
        }
    };
    Ok(format!(
        "FREQ=YEARLY{day_string};BYMONTH={}{end_string}",
        rule.month
    ))
}

fn weekday_from_index(index: u32) -> Result<Weekday> {
    match index {
        0 => Ok(Weekday::Mon),
        1 => Ok(Weekday::Tue),
        2 => Ok(Weekday::Wed),
        3 => Ok(Weekday::Thu),
        4 => Ok(Weekday::Fri),
        5 => Ok(Weekday::Sat),
        6 => Ok(Weekday::Sun),
        _ => Err(VObjectError::config("weekday out of range")),
    }
}

/// One STANDARD or DAYLIGHT observance from a parsed VTIMEZONE.
#[derive(Debug, Clone)]
struct Observance {
    start: NaiveDateTime,
    offset_to: FixedOffset,
    offset_from: FixedOffset,
    name: Option<String>,
    is_daylight: bool,
    rule: Option<YearlyRule>,
    rdates: Vec<NaiveDateTime>,
}

#[derive(Debug, Clone)]
struct YearlyRule {
    month: u32,
    byday: Option<(i32, Weekday)>,
    /// UTC instant of the final occurrence.
    until: Option<NaiveDateTime>,
}

impl Observance {
    /// Wall-clock onsets (in the previous regime) for the given year.
    fn onsets_in_year(&self, year: i32) -> Vec<NaiveDateTime> {
        let mut onsets: Vec<NaiveDateTime> = self
            .rdates
            .iter()
            .copied()
            .filter(|dt| dt.year() == year)
            .collect();
        if self.start.year() == year {
            onsets.push(self.start);
        }
        if let Some(rule) = &self.rule
            && year >= self.start.year()
        {
            let date = match rule.byday {
                Some((n, weekday)) => nth_weekday_of_month(year, rule.month, weekday, n),
                None => NaiveDate::from_ymd_opt(year, rule.month, self.start.day()),
            };
            if let Some(date) = date {
                let onset = date.and_time(self.start.time());
                let expired = rule
                    .until
                    .is_some_and(|until| onset - self.offset_from > until);
                if !expired {
                    onsets.push(onset);
                }
            }
        }
        onsets.sort_unstable();
        onsets.dedup();
        onsets
    }
}

/// A provider reconstructed from VTIMEZONE observance rules.
#[derive(Debug)]
pub struct RuleTz {
    tzid: String,
    observances: Vec<Observance>,
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    start_utc: NaiveDateTime,
    offset: FixedOffset,
    is_daylight: bool,
    name_index: usize,
}

impl RuleTz {
    /// UTC-ordered offset segments covering the years around `year`.
    fn segments(&self, year: i32) -> Vec<Segment> {
        let mut segments = Vec::new();
        for (index, obs) in self.observances.iter().enumerate() {
            for y in (year - 2)..=(year + 1) {
                for onset in obs.onsets_in_year(y) {
                    segments.push(Segment {
                        start_utc: onset - obs.offset_from,
                        offset: obs.offset_to,
                        is_daylight: obs.is_daylight,
                        name_index: index,
                    });
                }
            }
        }
        segments.sort_unstable_by_key(|s| s.start_utc);
        segments
    }

    fn resolve(&self, local: NaiveDateTime) -> (FixedOffset, LocalClass, Option<String>) {
        let fallback = self
            .observances
            .first()
            .map_or_else(|| Utc.fix(), |obs| obs.offset_from);
        let segments = self.segments(local.year());
        if segments.is_empty() {
            return (fallback, LocalClass::Standard, None);
        }

        // Every segment in which this wall-clock reading maps to a UTC
        // instant inside the segment's span.
        let mut hits = Vec::new();
        for (i, segment) in segments.iter().enumerate() {
            let utc = local - segment.offset;
            let next_start = segments.get(i + 1).map(|s| s.start_utc);
            let starts_ok = utc >= segment.start_utc;
            let ends_ok = next_start.is_none_or(|end| utc < end);
            if starts_ok && ends_ok {
                hits.push(*segment);
            }
        }

        match hits.len() {
            0 => {
                // before the first known transition
                if let Some(first) = segments.first()
                    && local - fallback < first.start_utc
                {
                    return (fallback, LocalClass::Standard, None);
                }
                // skipped reading; adopt the later regime
                let after = segments
                    .iter()
                    .find(|s| s.start_utc >= local - fallback)
                    .or_else(|| segments.last());
                after.map_or((fallback, LocalClass::Gap, None), |s| {
                    (s.offset, LocalClass::Gap, self.segment_name(s))
                })
            }
            1 => {
                let s = hits[0];
                let class = if s.is_daylight {
                    LocalClass::Daylight
                } else {
                    LocalClass::Standard
                };
                (s.offset, class, self.segment_name(&s))
            }
            _ => {
                // repeated reading; the later regime is the last hit
                let s = hits[hits.len() - 1];
                (s.offset, LocalClass::Fold, self.segment_name(&s))
            }
        }
    }

    fn segment_name(&self, segment: &Segment) -> Option<String> {
        self.observances
            .get(segment.name_index)
            .and_then(|obs| obs.name.clone())
    }
}

impl TzProvider for RuleTz {
    fn id(&self) -> Option<&str> {
        Some(&self.tzid)
    }

    fn utc_offset(&self, local: NaiveDateTime) -> FixedOffset {
        self.resolve(local).0
    }

    fn classify(&self, local: NaiveDateTime) -> LocalClass {
        self.resolve(local).1
    }

    fn tzname(&self, local: NaiveDateTime) -> Option<String> {
        self.resolve(local).2
    }
}

/// Builds a provider from a parsed VTIMEZONE. Empty components yield
/// `None`, mirroring the tolerance for degenerate exporter output.
pub fn tzinfo_from_vtimezone(vtimezone: &Component) -> Result<Option<Arc<dyn TzProvider>>> {
    if vtimezone.contents.is_empty() {
        return Ok(None);
    }
    let tzid = vtimezone
        .get_text("TZID")
        .ok_or_else(|| VObjectError::validate("VTIMEZONE components must contain a valid TZID"))?
        .to_owned();

    let mut observances = Vec::new();
    for (name, is_daylight) in [("STANDARD", false), ("DAYLIGHT", true)] {
        for comp in vtimezone.components(name) {
            observances.push(parse_observance(comp, is_daylight)?);
        }
    }
    if observances.is_empty() {
        return Ok(None);
    }
    Ok(Some(Arc::new(RuleTz { tzid, observances })))
}

fn parse_observance(comp: &Component, is_daylight: bool) -> Result<Observance> {
    let text = |name: &str| {
        comp.get_text(name).ok_or_else(|| {
            VObjectError::validate(format!(
                "{} must contain a {name}",
                comp.name
            ))
        })
    };
    let start = match comp.get_value("DTSTART") {
        Some(crate::core::value::Value::DateTime(dt)) => dt.naive_local(),
        _ => values::parse_datetime(text("DTSTART")?, None)?.naive_local(),
    };
    let offset_to = values::parse_utc_offset(text("TZOFFSETTO")?)?;
    let offset_from = values::parse_utc_offset(text("TZOFFSETFROM")?)?;
    let name = comp.get_text("TZNAME").map(str::to_owned);

    let rule = comp
        .get_text("RRULE")
        .map(|rrule| parse_yearly_rule(rrule, start))
        .transpose()?;

    let mut rdates = Vec::new();
    for line in comp.get_all("RDATE").iter().filter_map(|n| n.as_line()) {
        for piece in line.value_text().split(',') {
            if let Ok(dt) = values::parse_datetime(piece, None) {
                rdates.push(dt.naive_local());
            }
        }
    }

    Ok(Observance {
        start,
        offset_to,
        offset_from,
        name,
        is_daylight,
        rule,
        rdates,
    })
}

/// Accepts the yearly-rule shapes the synthesizer emits:
/// `FREQ=YEARLY[;BYDAY=nWD];BYMONTH=m[;UNTIL=...Z]`.
fn parse_yearly_rule(rrule: &str, dtstart: NaiveDateTime) -> Result<YearlyRule> {
    let unsupported =
        |msg: &str| VObjectError::config(format!("unsupported timezone rule ({msg}): {rrule}"));
    let mut month = None;
    let mut byday = None;
    let mut until = None;
    for part in rrule.split(';') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.to_uppercase().as_str() {
            "FREQ" => {
                if !value.eq_ignore_ascii_case("YEARLY") {
                    return Err(unsupported("FREQ must be YEARLY"));
                }
            }
            "BYMONTH" => {
                month = Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| unsupported("bad BYMONTH"))?,
                );
            }
            "BYDAY" => {
                if !value.is_ascii() {
                    return Err(unsupported("bad BYDAY"));
                }
                let split = value.len().checked_sub(2).ok_or_else(|| unsupported("bad BYDAY"))?;
                let (num, day) = value.split_at(split);
                let weekday = WEEKDAYS
                    .iter()
                    .position(|w| w.eq_ignore_ascii_case(day))
                    .ok_or_else(|| unsupported("bad BYDAY weekday"))?;
                #[expect(clippy::cast_possible_truncation, reason = "position is < 7")]
                let weekday = weekday_from_index(weekday as u32)?;
                let n: i32 = if num.is_empty() {
                    1
                } else {
                    num.parse().map_err(|_| unsupported("bad BYDAY ordinal"))?
                };
                byday = Some((n, weekday));
            }
            "UNTIL" => {
                until = Some(to_utc(&values::parse_datetime(value, None)?)?.naive_utc());
            }
            _ => {}
        }
    }
    Ok(YearlyRule {
        month: month.unwrap_or(dtstart.month()),
        byday,
        until,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(y: i32, mo: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .unwrap()
    }

    #[test]
    fn chrono_tz_classification() {
        let tz = Tz::America__New_York;
        assert_eq!(tz.classify(naive(2026, 1, 15, 12)), LocalClass::Standard);
        assert_eq!(tz.classify(naive(2026, 7, 15, 12)), LocalClass::Daylight);
        // 2026-03-08 02:30 does not exist
        let gap = naive(2026, 3, 8, 2) + TimeDelta::minutes(30);
        assert_eq!(tz.classify(gap), LocalClass::Gap);
        // 2026-11-01 01:30 happens twice
        let fold = naive(2026, 11, 1, 1) + TimeDelta::minutes(30);
        assert_eq!(tz.classify(fold), LocalClass::Fold);
    }

    #[test]
    fn transitions_for_new_york() {
        let tz = Tz::America__New_York;
        assert_eq!(
            get_transition(DstState::Daylight, 2026, &tz),
            Some(naive(2026, 3, 8, 2))
        );
        assert_eq!(
            get_transition(DstState::Standard, 2026, &tz),
            Some(naive(2026, 11, 1, 2))
        );
    }

    #[test]
    fn utc_has_no_daylight_transition() {
        assert_eq!(get_transition(DstState::Daylight, 2026, &Tz::UTC), None);
        assert_eq!(
            get_transition(DstState::Standard, 2026, &Tz::UTC),
            Some(naive(2026, 1, 1, 0))
        );
    }

    #[test]
    fn synthesized_vtimezone_for_new_york() {
        let vtz = vtimezone_from_tzinfo(&Tz::America__New_York, 2000, 2030).unwrap();
        assert_eq!(vtz.get_text("TZID"), Some("America/New_York"));

        let rules = |name: &str| -> Vec<String> {
            vtz.components(name)
                .filter_map(|c| c.get_text("RRULE").map(str::to_owned))
                .collect()
        };
        // the 2007 Energy Policy Act change splits each kind into two rules
        assert_eq!(
            rules("DAYLIGHT"),
            vec![
                "FREQ=YEARLY;BYDAY=1SU;BYMONTH=4;UNTIL=20060402T070000Z",
                "FREQ=YEARLY;BYDAY=2SU;BYMONTH=3",
            ]
        );
        assert_eq!(
            rules("STANDARD"),
            vec![
                "FREQ=YEARLY;BYDAY=-1SU;BYMONTH=10;UNTIL=20061029T060000Z",
                "FREQ=YEARLY;BYDAY=1SU;BYMONTH=11",
            ]
        );
        let daylight: Vec<_> = vtz.components("DAYLIGHT").collect();
        assert_eq!(daylight[1].get_text("TZOFFSETTO"), Some("-0400"));
        assert_eq!(daylight[1].get_text("TZOFFSETFROM"), Some("-0500"));
        assert_eq!(daylight[1].get_text("TZNAME"), Some("EDT"));
    }

    #[test]
    fn rule_tz_round_trip() {
        let vtz = vtimezone_from_tzinfo(&Tz::America__New_York, 2000, 2030).unwrap();
        let provider = tzinfo_from_vtimezone(&vtz).unwrap().unwrap();
        assert_eq!(provider.id(), Some("America/New_York"));
        assert_eq!(
            provider.utc_offset(naive(2026, 1, 15, 12)),
            FixedOffset::west_opt(5 * 3600).unwrap()
        );
        assert_eq!(
            provider.utc_offset(naive(2026, 7, 15, 12)),
            FixedOffset::west_opt(4 * 3600).unwrap()
        );
        assert_eq!(provider.classify(naive(2026, 7, 15, 12)), LocalClass::Daylight);
    }

    #[test]
    fn empty_vtimezone_is_tolerated() {
        let empty = Component::new("VTIMEZONE");
        assert!(tzinfo_from_vtimezone(&empty).unwrap().is_none());
    }

    #[test]
    fn tzid_lookup_and_registration() {
        assert!(get_tzid("America/Chicago").is_some());
        assert!(get_tzid("Not/A_Zone").is_none());
        register_tzid("X-CUSTOM-CHICAGO", Arc::new(Tz::America__Chicago));
        assert!(get_tzid("X-CUSTOM-CHICAGO").is_some());
    }

    #[test]
    fn to_utc_conversions() {
        let zoned = DateTimeValue::Zoned {
            local: naive(2026, 1, 15, 9),
            tzid: "America/New_York".to_owned(),
        };
        assert_eq!(
            to_utc(&zoned).unwrap().naive_utc(),
            naive(2026, 1, 15, 14)
        );
        let floating = DateTimeValue::Floating(naive(2026, 1, 15, 9));
        assert_eq!(to_utc(&floating).unwrap().naive_utc(), naive(2026, 1, 15, 9));
    }

    #[test]
    fn nth_weekday_helper() {
        assert_eq!(
            nth_weekday_of_month(2026, 3, Weekday::Sun, 2),
            NaiveDate::from_ymd_opt(2026, 3, 8)
        );
        assert_eq!(
            nth_weekday_of_month(2006, 10, Weekday::Sun, -1),
            NaiveDate::from_ymd_opt(2006, 10, 29)
        );
    }

    #[test]
    fn pick_tzid_prefers_stable_ids() {
        assert_eq!(
            pick_tzid(&Tz::America__New_York, false).unwrap(),
            Some("America/New_York".to_owned())
        );
        assert_eq!(pick_tzid(&Tz::UTC, false).unwrap(), None);
        assert_eq!(
            pick_tzid(&Tz::UTC, true).unwrap(),
            Some("UTC".to_owned())
        );
    }
}
