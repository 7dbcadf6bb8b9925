//! Behaviors for RFC 5545 names: per-property codecs for the typed value
//! forms and per-component validation, implicit-property generation, and
//! serialization ordering.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{TimeDelta, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::behavior::{Behavior, KnownChild, RegistryMap, insert_into, validate_structure};
use crate::core::component::{Component, Node};
use crate::core::contentline::ContentLine;
use crate::core::value::{DateTimeValue, Value};
use crate::error::{Result, VObjectError};
use crate::ical::{timezone, values};

pub const PRODID: &str = "-//VOBJ//NONSGML Version 1//EN";

/// Years covered when a VTIMEZONE has to be synthesized for serialization.
const TZ_RANGE: (i32, i32) = (2000, 2030);

// ---------------------------------------------------------------------------
// property codec helpers, shared between behaviors that wrap each other

fn datetime_to_native(line: &mut ContentLine) -> Result<()> {
    line.is_native = true;
    if line.value_text().is_empty() && matches!(line.value, Value::Text(_)) {
        return Ok(());
    }
    let tzid = line.param("TZID").map(str::to_owned);
    let dt = values::parse_datetime(line.value_text(), tzid.as_deref())?;
    if dt.is_floating() {
        line.set_param("X-VOBJ-FLOATINGTIME-ALLOWED", vec!["TRUE".to_owned()]);
    }
    if let Some(tzid) = tzid {
        line.set_param("X-VOBJ-ORIGINAL-TZID", vec![tzid]);
        line.remove_param("TZID");
    }
    line.value = Value::DateTime(dt);
    Ok(())
}

fn datetime_from_native(line: &mut ContentLine, force_utc: bool) -> Result<()> {
    line.is_native = false;
    let Value::DateTime(dt) = line.value.clone() else {
        return Ok(());
    };
    let tzid = dt.tzid().map(str::to_owned);
    line.value = Value::Text(values::datetime_to_string(&dt, force_utc)?);
    if !force_utc && let Some(tzid) = tzid {
        line.set_param("TZID", vec![tzid]);
    }
    if let Some(original) = line.remove_param("X-VOBJ-ORIGINAL-TZID")
        && line.param("TZID").is_none()
    {
        line.set_param("TZID", original);
    }
    Ok(())
}

fn duration_to_native(line: &mut ContentLine) -> Result<()> {
    if line.value_text().is_empty() && matches!(line.value, Value::Text(_)) {
        line.is_native = true;
        return Ok(());
    }
    let deltas = values::string_to_durations(line.value_text())?;
    let [delta] = deltas.as_slice() else {
        return Err(VObjectError::parse(
            "DURATION must have a single duration string",
        ));
    };
    line.value = Value::Duration(*delta);
    line.is_native = true;
    Ok(())
}

fn duration_from_native(line: &mut ContentLine) -> Result<()> {
    line.is_native = false;
    if let Value::Duration(delta) = line.value {
        line.value = Value::Text(values::timedelta_to_string(delta));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// property behaviors

/// Plain TEXT: backslash escaping, or base64 when the ENCODING parameter
/// asks for it.
#[derive(Debug)]
pub struct TextBehavior;

pub static TEXT: TextBehavior = TextBehavior;

impl TextBehavior {
    fn is_base64(line: &ContentLine) -> bool {
        line.param("ENCODING")
            .is_some_and(|e| e.eq_ignore_ascii_case("BASE64"))
    }
}

impl Behavior for TextBehavior {
    fn name(&self) -> &'static str {
        "TEXT"
    }

    fn decode(&self, line: &mut ContentLine) -> Result<()> {
        if line.encoded {
            if Self::is_base64(line) {
                let packed: String = line
                    .value_text()
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                let bytes = BASE64.decode(packed).map_err(|e| {
                    VObjectError::parse(format!("Could not decode base64 value: {e}"))
                })?;
                line.value = Value::Binary(bytes);
            } else if let Value::Text(text) = &line.value {
                let decoded = values::string_to_text_values(text, ',')
                    .into_iter()
                    .next()
                    .unwrap_or_default();
                line.value = Value::Text(decoded);
            }
        }
        line.encoded = false;
        Ok(())
    }

    fn encode(&self, line: &mut ContentLine) -> Result<()> {
        if !line.encoded {
            if Self::is_base64(line) {
                let bytes = match &line.value {
                    Value::Binary(bytes) => bytes.clone(),
                    Value::Text(text) => text.clone().into_bytes(),
                    _ => Vec::new(),
                };
                line.value = Value::Text(BASE64.encode(bytes));
            } else if let Value::Text(text) = &line.value {
                line.value = Value::Text(values::backslash_escape(text));
            }
        }
        line.encoded = true;
        Ok(())
    }
}

/// A list of TEXT values on one line, split on a separator.
#[derive(Debug)]
pub struct MultiTextBehavior {
    name: &'static str,
    separator: char,
}

pub static MULTI_TEXT: MultiTextBehavior = MultiTextBehavior {
    name: "MULTI-TEXT",
    separator: ',',
};
pub static SEMICOLON_MULTI_TEXT: MultiTextBehavior = MultiTextBehavior {
    name: "SEMICOLON-MULTI-TEXT",
    separator: ';',
};

impl Behavior for MultiTextBehavior {
    fn name(&self) -> &'static str {
        self.name
    }

    fn decode(&self, line: &mut ContentLine) -> Result<()> {
        if line.encoded
            && let Value::Text(text) = &line.value
        {
            line.value = Value::TextList(values::string_to_text_values(text, self.separator));
        }
        line.encoded = false;
        Ok(())
    }

    fn encode(&self, line: &mut ContentLine) -> Result<()> {
        if !line.encoded {
            match &line.value {
                Value::TextList(items) => {
                    let joined = items
                        .iter()
                        .map(|item| values::backslash_escape(item))
                        .collect::<Vec<_>>()
                        .join(&self.separator.to_string());
                    line.value = Value::Text(joined);
                }
                Value::Text(text) => {
                    line.value = Value::Text(values::backslash_escape(text));
                }
                _ => {}
            }
        }
        line.encoded = true;
        Ok(())
    }
}

/// DATE-TIME. A TZID parameter is consumed into the value and kept in
/// X-VOBJ-ORIGINAL-TZID so serialization can restore it.
#[derive(Debug)]
pub struct DateTimeBehavior {
    name: &'static str,
    force_utc: bool,
}

pub static DATETIME: DateTimeBehavior = DateTimeBehavior {
    name: "DATE-TIME",
    force_utc: false,
};
/// For properties RFC 5545 requires in UTC: DTSTAMP, CREATED, COMPLETED,
/// LAST-MODIFIED.
pub static UTC_DATETIME: DateTimeBehavior = DateTimeBehavior {
    name: "UTC-DATE-TIME",
    force_utc: true,
};

impl Behavior for DateTimeBehavior {
    fn name(&self) -> &'static str {
        self.name
    }

    fn has_native(&self) -> bool {
        true
    }

    fn force_utc(&self) -> bool {
        self.force_utc
    }

    fn transform_to_native(&self, node: &mut Node) -> Result<()> {
        let Node::Line(line) = node else {
            return Ok(());
        };
        datetime_to_native(line)
    }

    fn transform_from_native(&self, node: &mut Node) -> Result<()> {
        let Node::Line(line) = node else {
            return Ok(());
        };
        datetime_from_native(line, self.force_utc)
    }
}

/// DATE or DATE-TIME, disambiguated by the VALUE parameter. A number of
/// clients serialize dates without VALUE=DATE, so the signature mismatch is
/// tolerated on read.
#[derive(Debug)]
pub struct DateOrDateTimeBehavior;

pub static DATE_OR_DATETIME: DateOrDateTimeBehavior = DateOrDateTimeBehavior;

impl Behavior for DateOrDateTimeBehavior {
    fn name(&self) -> &'static str {
        "DATE-OR-DATE-TIME"
    }

    fn has_native(&self) -> bool {
        true
    }

    fn transform_to_native(&self, node: &mut Node) -> Result<()> {
        let Node::Line(line) = node else {
            return Ok(());
        };
        line.is_native = true;
        if line.value_text().is_empty() && matches!(line.value, Value::Text(_)) {
            return Ok(());
        }
        let parsed = values::parse_dtstart(line, true)?;
        if matches!(parsed, Value::DateTime(_))
            && let Some(tzid) = line.remove_param("TZID")
        {
            line.set_param("X-VOBJ-ORIGINAL-TZID", tzid);
        }
        line.value = parsed;
        Ok(())
    }

    fn transform_from_native(&self, node: &mut Node) -> Result<()> {
        let Node::Line(line) = node else {
            return Ok(());
        };
        match line.value {
            Value::Date(date) => {
                line.is_native = false;
                line.set_param("VALUE", vec!["DATE".to_owned()]);
                line.value = Value::Text(values::date_to_string(date));
                Ok(())
            }
            _ => datetime_from_native(line, false),
        }
    }
}

/// RDATE/EXDATE: a comma-separated list of dates, date-times, or periods
/// per the VALUE parameter.
#[derive(Debug)]
pub struct MultiDateBehavior;

pub static MULTI_DATE: MultiDateBehavior = MultiDateBehavior;

impl Behavior for MultiDateBehavior {
    fn name(&self) -> &'static str {
        "MULTI-DATE"
    }

    fn has_native(&self) -> bool {
        true
    }

    fn transform_to_native(&self, node: &mut Node) -> Result<()> {
        let Node::Line(line) = node else {
            return Ok(());
        };
        let value_param = line.param("VALUE").unwrap_or("DATE-TIME").to_uppercase();
        let tzid = line.param("TZID").map(str::to_owned);
        let text = line.value_text().to_owned();
        line.value = match value_param.as_str() {
            "DATE" => Value::DateList(
                text.split(',')
                    .map(values::parse_date)
                    .collect::<Result<_>>()?,
            ),
            "PERIOD" => Value::PeriodList(
                text.split(',')
                    .map(|p| values::string_to_period(p, tzid.as_deref()))
                    .collect::<Result<_>>()?,
            ),
            _ => Value::DateTimeList(
                text.split(',')
                    .map(|p| values::parse_datetime(p, tzid.as_deref()))
                    .collect::<Result<_>>()?,
            ),
        };
        line.is_native = true;
        Ok(())
    }

    fn transform_from_native(&self, node: &mut Node) -> Result<()> {
        let Node::Line(line) = node else {
            return Ok(());
        };
        line.is_native = false;
        let (joined, is_date) = match &line.value {
            Value::DateList(dates) => (
                dates
                    .iter()
                    .map(|d| values::date_to_string(*d))
                    .collect::<Vec<_>>()
                    .join(","),
                true,
            ),
            Value::PeriodList(periods) => (
                periods
                    .iter()
                    .map(|p| values::period_to_string(p, false))
                    .collect::<Result<Vec<_>>>()?
                    .join(","),
                false,
            ),
            Value::DateTimeList(datetimes) => (
                datetimes
                    .iter()
                    .map(|dt| values::datetime_to_string(dt, false))
                    .collect::<Result<Vec<_>>>()?
                    .join(","),
                false,
            ),
            _ => return Ok(()),
        };
        if is_date {
            line.set_param("VALUE", vec!["DATE".to_owned()]);
        }
        line.value = Value::Text(joined);
        Ok(())
    }
}

#[derive(Debug)]
pub struct DurationBehavior;

pub static DURATION: DurationBehavior = DurationBehavior;

impl Behavior for DurationBehavior {
    fn name(&self) -> &'static str {
        "DURATION"
    }

    fn has_native(&self) -> bool {
        true
    }

    fn transform_to_native(&self, node: &mut Node) -> Result<()> {
        let Node::Line(line) = node else {
            return Ok(());
        };
        duration_to_native(line)
    }

    fn transform_from_native(&self, node: &mut Node) -> Result<()> {
        let Node::Line(line) = node else {
            return Ok(());
        };
        duration_from_native(line)
    }
}

/// TRIGGER: DURATION by default, DATE-TIME when the VALUE parameter says
/// so. Some exporters ship DATE-TIME triggers without VALUE=DATE-TIME, so
/// an unparseable duration falls back to a date-time read.
#[derive(Debug)]
pub struct TriggerBehavior;

pub static TRIGGER: TriggerBehavior = TriggerBehavior;

impl Behavior for TriggerBehavior {
    fn name(&self) -> &'static str {
        "TRIGGER"
    }

    fn has_native(&self) -> bool {
        true
    }

    fn force_utc(&self) -> bool {
        true
    }

    fn transform_to_native(&self, node: &mut Node) -> Result<()> {
        let Node::Line(line) = node else {
            return Ok(());
        };
        if line.value_text().is_empty() && matches!(line.value, Value::Text(_)) {
            line.is_native = true;
            return Ok(());
        }
        let value_param = line
            .remove_param("VALUE")
            .and_then(|v| v.into_iter().next())
            .unwrap_or_else(|| "DURATION".to_owned())
            .to_uppercase();
        match value_param.as_str() {
            "DATE-TIME" => datetime_to_native(line),
            "DURATION" => match duration_to_native(line) {
                Ok(()) => Ok(()),
                Err(_) => {
                    warn!(
                        "TRIGGER not recognized as DURATION, trying DATE-TIME, \
                         because iCal sometimes exports DATE-TIMEs without setting \
                         VALUE=DATE-TIME"
                    );
                    datetime_to_native(line).map_err(|_| {
                        VObjectError::parse(
                            "TRIGGER with no VALUE not recognized as DURATION or as DATE-TIME",
                        )
                    })
                }
            },
            _ => Err(VObjectError::parse("VALUE must be DURATION or DATE-TIME")),
        }
    }

    fn transform_from_native(&self, node: &mut Node) -> Result<()> {
        let Node::Line(line) = node else {
            return Ok(());
        };
        match line.value {
            Value::Duration(_) => duration_from_native(line),
            Value::DateTime(_) => {
                line.set_param("VALUE", vec!["DATE-TIME".to_owned()]);
                datetime_from_native(line, true)
            }
            _ => Err(VObjectError::validate(
                "TRIGGER values must be durations or date-times",
            )),
        }
    }
}

/// FREEBUSY: a comma-separated list of periods, serialized in UTC.
#[derive(Debug)]
pub struct PeriodBehavior;

pub static PERIOD: PeriodBehavior = PeriodBehavior;

impl Behavior for PeriodBehavior {
    fn name(&self) -> &'static str {
        "PERIOD"
    }

    fn has_native(&self) -> bool {
        true
    }

    fn force_utc(&self) -> bool {
        true
    }

    fn transform_to_native(&self, node: &mut Node) -> Result<()> {
        let Node::Line(line) = node else {
            return Ok(());
        };
        let tzid = line.param("TZID").map(str::to_owned);
        let periods = line
            .value_text()
            .split(',')
            .map(|p| values::string_to_period(p, tzid.as_deref()))
            .collect::<Result<Vec<_>>>()?;
        line.value = Value::PeriodList(periods);
        line.is_native = true;
        Ok(())
    }

    fn transform_from_native(&self, node: &mut Node) -> Result<()> {
        let Node::Line(line) = node else {
            return Ok(());
        };
        line.is_native = false;
        if let Value::PeriodList(periods) = &line.value {
            let joined = periods
                .iter()
                .map(|p| values::period_to_string(p, true))
                .collect::<Result<Vec<_>>>()?
                .join(",");
            line.value = Value::Text(joined);
        }
        Ok(())
    }
}

/// Keeps a value opaque. Recurrence rules carry semicolons and commas that
/// must not be unescaped or split, and TZIDs are matched byte for byte
/// against VTIMEZONE blocks.
#[derive(Debug)]
pub struct RawBehavior {
    name: &'static str,
}

pub static RULE: RawBehavior = RawBehavior { name: "RRULE" };
pub static TZID: RawBehavior = RawBehavior { name: "TZID" };

impl Behavior for RawBehavior {
    fn name(&self) -> &'static str {
        self.name
    }
}

// ---------------------------------------------------------------------------
// component behaviors

/// UID and DTSTAMP generation shared by the recurring component kinds.
fn generate_recurring_implicit(component: &mut Component) -> Result<()> {
    if component.get("UID").is_none() {
        let uid = Uuid::new_v4().to_string().to_uppercase();
        component.add_with_behavior(ContentLine::new("UID", uid))?;
    }
    if component.get("DTSTAMP").is_none() {
        let mut line = ContentLine::new("DTSTAMP", "");
        line.value = Value::DateTime(DateTimeValue::Utc(Utc::now()));
        line.is_native = true;
        line.encoded = false;
        component.add_with_behavior(line)?;
    }
    Ok(())
}

fn reject_coexisting(component: &Component, a: &str, b: &str) -> Result<()> {
    if component.get_all(a).is_empty() || component.get_all(b).is_empty() {
        return Ok(());
    }
    Err(VObjectError::validate(format!(
        "{} components cannot contain both {a} and {b} properties",
        component.name
    )))
}

const VCALENDAR_CHILDREN: &[KnownChild] = &[
    KnownChild::new("CALSCALE", 0, Some(1)),
    KnownChild::new("METHOD", 0, Some(1)),
    KnownChild::new("VERSION", 0, Some(1)),
    KnownChild::new("PRODID", 1, Some(1)),
    KnownChild::new("VEVENT", 0, None),
    KnownChild::new("VTODO", 0, None),
    KnownChild::new("VJOURNAL", 0, None),
    KnownChild::new("VFREEBUSY", 0, None),
    KnownChild::new("VTIMEZONE", 0, None),
    KnownChild::new("VAVAILABILITY", 0, None),
];

/// The iCalendar 2.0 stream container.
#[derive(Debug)]
pub struct VCalendar;

pub static VCALENDAR: VCalendar = VCalendar;

impl VCalendar {
    /// TZIDs referenced by lines outside VTIMEZONE subtrees, either through
    /// a parameter or through a zoned native value.
    fn find_tzids(component: &Component, table: &mut Vec<String>) {
        let push = |tzid: &str, table: &mut Vec<String>| {
            if !table.iter().any(|t| t == tzid) {
                table.push(tzid.to_owned());
            }
        };
        for node in component.children() {
            match node {
                Node::Line(line) => {
                    if line.behavior.is_some_and(Behavior::force_utc) {
                        continue;
                    }
                    if let Some(tzid) =
                        line.param("TZID").or_else(|| line.param("X-VOBJ-ORIGINAL-TZID"))
                    {
                        push(tzid, table);
                    } else {
                        match &line.value {
                            Value::DateTime(dt) => {
                                if let Some(tzid) = dt.tzid() {
                                    push(tzid, table);
                                }
                            }
                            Value::DateTimeList(list) => {
                                for dt in list {
                                    if let Some(tzid) = dt.tzid() {
                                        push(tzid, table);
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                }
                Node::Component(child) if child.name != "VTIMEZONE" => {
                    Self::find_tzids(child, table);
                }
                Node::Component(_) => {}
            }
        }
    }
}

impl Behavior for VCalendar {
    fn name(&self) -> &'static str {
        "VCALENDAR"
    }

    fn version_string(&self) -> &'static str {
        "2.0"
    }

    fn is_component(&self) -> bool {
        true
    }

    fn sort_first(&self) -> &'static [&'static str] {
        &["VERSION", "CALSCALE", "METHOD", "PRODID", "VTIMEZONE"]
    }

    fn known_children(&self) -> &'static [KnownChild] {
        VCALENDAR_CHILDREN
    }

    fn default_behavior(&self) -> Option<&'static dyn Behavior> {
        Some(&TEXT)
    }

    /// Creates PRODID and VERSION if absent, and a VTIMEZONE for every
    /// referenced TZID that has none yet.
    fn generate_implicit_parameters(&self, component: &mut Component) -> Result<()> {
        if component.get("PRODID").is_none() {
            component.add_with_behavior(ContentLine::new("PRODID", PRODID))?;
        }
        if component.get("VERSION").is_none() {
            component.add_with_behavior(ContentLine::new("VERSION", self.version_string()))?;
        }

        let mut tzids_used = Vec::new();
        Self::find_tzids(component, &mut tzids_used);
        let existing: Vec<String> = component
            .components("VTIMEZONE")
            .filter_map(|tz| tz.get_text("TZID").map(str::to_owned))
            .collect();
        for tzid in tzids_used {
            if tzid == "UTC" || existing.contains(&tzid) {
                continue;
            }
            let Some(provider) = timezone::get_tzid(&tzid) else {
                warn!("no timezone registered for TZID {tzid}, not serializing one");
                continue;
            };
            let vtz =
                timezone::vtimezone_from_tzinfo(provider.as_ref(), TZ_RANGE.0, TZ_RANGE.1)?;
            component.add_with_behavior(vtz)?;
        }
        Ok(())
    }
}

const VTIMEZONE_CHILDREN: &[KnownChild] = &[
    KnownChild::new("TZID", 1, Some(1)),
    KnownChild::new("LAST-MODIFIED", 0, Some(1)),
    KnownChild::new("TZURL", 0, Some(1)),
    KnownChild::new("STANDARD", 0, None),
    KnownChild::new("DAYLIGHT", 0, None),
];

#[derive(Debug)]
pub struct VTimezone;

pub static VTIMEZONE: VTimezone = VTimezone;

impl Behavior for VTimezone {
    fn name(&self) -> &'static str {
        "VTIMEZONE"
    }

    fn version_string(&self) -> &'static str {
        "2.0"
    }

    fn is_component(&self) -> bool {
        true
    }

    fn has_native(&self) -> bool {
        true
    }

    fn sort_first(&self) -> &'static [&'static str] {
        &["TZID", "LAST-MODIFIED", "TZURL", "STANDARD", "DAYLIGHT"]
    }

    fn known_children(&self) -> &'static [KnownChild] {
        VTIMEZONE_CHILDREN
    }

    fn default_behavior(&self) -> Option<&'static dyn Behavior> {
        Some(&TEXT)
    }

    fn validate(&self, node: &Node) -> Result<()> {
        if let Node::Component(component) = node {
            if component.get_text("TZID").is_none() {
                return Err(VObjectError::validate(
                    "VTIMEZONE components must contain a valid TZID",
                ));
            }
            if component.component("STANDARD").is_none()
                && component.component("DAYLIGHT").is_none()
            {
                return Err(VObjectError::validate(
                    "VTIMEZONE components must contain a STANDARD or a DAYLIGHT component",
                ));
            }
        }
        validate_structure(self, node)
    }

    /// Registers a provider for this timezone's TZID so zoned date-times
    /// elsewhere in the stream can resolve it.
    fn transform_to_native(&self, node: &mut Node) -> Result<()> {
        let Node::Component(component) = node else {
            return Ok(());
        };
        component.is_native = true;
        if let Some(provider) = timezone::tzinfo_from_vtimezone(component)? {
            if let Some(id) = provider.id() {
                let id = id.to_owned();
                timezone::register_tzid(&id, Arc::clone(&provider));
            }
        }
        Ok(())
    }

    fn transform_from_native(&self, node: &mut Node) -> Result<()> {
        if let Node::Component(component) = node {
            component.is_native = false;
        }
        Ok(())
    }
}

const OBSERVANCE_CHILDREN: &[KnownChild] = &[
    KnownChild::new("DTSTART", 1, Some(1)),
    KnownChild::new("TZOFFSETTO", 1, Some(1)),
    KnownChild::new("TZOFFSETFROM", 1, Some(1)),
    KnownChild::new("COMMENT", 0, None),
    KnownChild::new("RDATE", 0, None),
    KnownChild::new("RRULE", 0, None),
    KnownChild::new("TZNAME", 0, None),
];

/// STANDARD and DAYLIGHT observances inside a VTIMEZONE.
#[derive(Debug)]
pub struct TimezoneObservance {
    name: &'static str,
}

pub static STANDARD: TimezoneObservance = TimezoneObservance { name: "STANDARD" };
pub static DAYLIGHT: TimezoneObservance = TimezoneObservance { name: "DAYLIGHT" };

impl Behavior for TimezoneObservance {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version_string(&self) -> &'static str {
        "2.0"
    }

    fn is_component(&self) -> bool {
        true
    }

    fn known_children(&self) -> &'static [KnownChild] {
        OBSERVANCE_CHILDREN
    }

    fn default_behavior(&self) -> Option<&'static dyn Behavior> {
        Some(&TEXT)
    }
}

const VEVENT_CHILDREN: &[KnownChild] = &[
    KnownChild::new("DTSTART", 0, Some(1)),
    KnownChild::new("CLASS", 0, Some(1)),
    KnownChild::new("CREATED", 0, Some(1)),
    KnownChild::new("DESCRIPTION", 0, Some(1)),
    KnownChild::new("GEO", 0, Some(1)),
    KnownChild::new("LAST-MODIFIED", 0, Some(1)),
    KnownChild::new("LOCATION", 0, Some(1)),
    KnownChild::new("ORGANIZER", 0, Some(1)),
    KnownChild::new("PRIORITY", 0, Some(1)),
    KnownChild::new("DTSTAMP", 1, Some(1)),
    KnownChild::new("SEQUENCE", 0, Some(1)),
    KnownChild::new("STATUS", 0, Some(1)),
    KnownChild::new("SUMMARY", 0, Some(1)),
    KnownChild::new("TRANSP", 0, Some(1)),
    KnownChild::new("UID", 1, Some(1)),
    KnownChild::new("URL", 0, Some(1)),
    KnownChild::new("RECURRENCE-ID", 0, Some(1)),
    KnownChild::new("DTEND", 0, Some(1)),
    KnownChild::new("DURATION", 0, Some(1)),
    KnownChild::new("ATTACH", 0, None),
    KnownChild::new("ATTENDEE", 0, None),
    KnownChild::new("CATEGORIES", 0, None),
    KnownChild::new("COMMENT", 0, None),
    KnownChild::new("CONTACT", 0, None),
    KnownChild::new("EXDATE", 0, None),
    KnownChild::new("EXRULE", 0, None),
    KnownChild::new("REQUEST-STATUS", 0, None),
    KnownChild::new("RELATED-TO", 0, None),
    KnownChild::new("RESOURCES", 0, None),
    KnownChild::new("RDATE", 0, None),
    KnownChild::new("RRULE", 0, None),
    KnownChild::new("VALARM", 0, None),
];

#[derive(Debug)]
pub struct VEvent;

pub static VEVENT: VEvent = VEvent;

impl Behavior for VEvent {
    fn name(&self) -> &'static str {
        "VEVENT"
    }

    fn version_string(&self) -> &'static str {
        "2.0"
    }

    fn is_component(&self) -> bool {
        true
    }

    fn has_native(&self) -> bool {
        true
    }

    fn sort_first(&self) -> &'static [&'static str] {
        &["UID", "RECURRENCE-ID", "DTSTART", "DURATION", "DTEND"]
    }

    fn known_children(&self) -> &'static [KnownChild] {
        VEVENT_CHILDREN
    }

    fn default_behavior(&self) -> Option<&'static dyn Behavior> {
        Some(&TEXT)
    }

    fn validate(&self, node: &Node) -> Result<()> {
        if let Node::Component(component) = node {
            reject_coexisting(component, "DTEND", "DURATION")?;
        }
        validate_structure(self, node)
    }

    fn transform_to_native(&self, node: &mut Node) -> Result<()> {
        if let Node::Component(component) = node {
            component.is_native = true;
        }
        Ok(())
    }

    fn transform_from_native(&self, node: &mut Node) -> Result<()> {
        if let Node::Component(component) = node {
            component.is_native = false;
        }
        Ok(())
    }

    fn generate_implicit_parameters(&self, component: &mut Component) -> Result<()> {
        generate_recurring_implicit(component)
    }
}

const VTODO_CHILDREN: &[KnownChild] = &[
    KnownChild::new("DTSTART", 0, Some(1)),
    KnownChild::new("CLASS", 0, Some(1)),
    KnownChild::new("COMPLETED", 0, Some(1)),
    KnownChild::new("CREATED", 0, Some(1)),
    KnownChild::new("DESCRIPTION", 0, Some(1)),
    KnownChild::new("GEO", 0, Some(1)),
    KnownChild::new("LAST-MODIFIED", 0, Some(1)),
    KnownChild::new("LOCATION", 0, Some(1)),
    KnownChild::new("ORGANIZER", 0, Some(1)),
    KnownChild::new("PERCENT-COMPLETE", 0, Some(1)),
    KnownChild::new("PRIORITY", 0, Some(1)),
    KnownChild::new("DTSTAMP", 1, Some(1)),
    KnownChild::new("SEQUENCE", 0, Some(1)),
    KnownChild::new("STATUS", 0, Some(1)),
    KnownChild::new("SUMMARY", 0, Some(1)),
    KnownChild::new("UID", 1, Some(1)),
    KnownChild::new("URL", 0, Some(1)),
    KnownChild::new("RECURRENCE-ID", 0, Some(1)),
    KnownChild::new("DUE", 0, Some(1)),
    KnownChild::new("DURATION", 0, Some(1)),
    KnownChild::new("ATTACH", 0, None),
    KnownChild::new("ATTENDEE", 0, None),
    KnownChild::new("CATEGORIES", 0, None),
    KnownChild::new("COMMENT", 0, None),
    KnownChild::new("CONTACT", 0, None),
    KnownChild::new("EXDATE", 0, None),
    KnownChild::new("EXRULE", 0, None),
    KnownChild::new("REQUEST-STATUS", 0, None),
    KnownChild::new("RELATED-TO", 0, None),
    KnownChild::new("RESOURCES", 0, None),
    KnownChild::new("RDATE", 0, None),
    KnownChild::new("RRULE", 0, None),
    KnownChild::new("VALARM", 0, None),
];

#[derive(Debug)]
pub struct VTodo;

pub static VTODO: VTodo = VTodo;

impl Behavior for VTodo {
    fn name(&self) -> &'static str {
        "VTODO"
    }

    fn version_string(&self) -> &'static str {
        "2.0"
    }

    fn is_component(&self) -> bool {
        true
    }

    fn has_native(&self) -> bool {
        true
    }

    fn sort_first(&self) -> &'static [&'static str] {
        &["UID", "RECURRENCE-ID", "DTSTART", "DURATION", "DUE"]
    }

    fn known_children(&self) -> &'static [KnownChild] {
        VTODO_CHILDREN
    }

    fn default_behavior(&self) -> Option<&'static dyn Behavior> {
        Some(&TEXT)
    }

    fn validate(&self, node: &Node) -> Result<()> {
        if let Node::Component(component) = node {
            reject_coexisting(component, "DUE", "DURATION")?;
        }
        validate_structure(self, node)
    }

    fn transform_to_native(&self, node: &mut Node) -> Result<()> {
        if let Node::Component(component) = node {
            component.is_native = true;
        }
        Ok(())
    }

    fn transform_from_native(&self, node: &mut Node) -> Result<()> {
        if let Node::Component(component) = node {
            component.is_native = false;
        }
        Ok(())
    }

    fn generate_implicit_parameters(&self, component: &mut Component) -> Result<()> {
        generate_recurring_implicit(component)
    }
}

const VJOURNAL_CHILDREN: &[KnownChild] = &[
    KnownChild::new("DTSTART", 0, Some(1)),
    KnownChild::new("CLASS", 0, Some(1)),
    KnownChild::new("CREATED", 0, Some(1)),
    KnownChild::new("DESCRIPTION", 0, Some(1)),
    KnownChild::new("LAST-MODIFIED", 0, Some(1)),
    KnownChild::new("ORGANIZER", 0, Some(1)),
    KnownChild::new("DTSTAMP", 1, Some(1)),
    KnownChild::new("SEQUENCE", 0, Some(1)),
    KnownChild::new("STATUS", 0, Some(1)),
    KnownChild::new("SUMMARY", 0, Some(1)),
    KnownChild::new("UID", 1, Some(1)),
    KnownChild::new("URL", 0, Some(1)),
    KnownChild::new("RECURRENCE-ID", 0, Some(1)),
    KnownChild::new("ATTACH", 0, None),
    KnownChild::new("ATTENDEE", 0, None),
    KnownChild::new("CATEGORIES", 0, None),
    KnownChild::new("COMMENT", 0, None),
    KnownChild::new("CONTACT", 0, None),
    KnownChild::new("EXDATE", 0, None),
    KnownChild::new("EXRULE", 0, None),
    KnownChild::new("RELATED-TO", 0, None),
    KnownChild::new("RDATE", 0, None),
    KnownChild::new("RRULE", 0, None),
    KnownChild::new("REQUEST-STATUS", 0, None),
];

#[derive(Debug)]
pub struct VJournal;

pub static VJOURNAL: VJournal = VJournal;

impl Behavior for VJournal {
    fn name(&self) -> &'static str {
        "VJOURNAL"
    }

    fn version_string(&self) -> &'static str {
        "2.0"
    }

    fn is_component(&self) -> bool {
        true
    }

    fn has_native(&self) -> bool {
        true
    }

    fn known_children(&self) -> &'static [KnownChild] {
        VJOURNAL_CHILDREN
    }

    fn default_behavior(&self) -> Option<&'static dyn Behavior> {
        Some(&TEXT)
    }

    fn transform_to_native(&self, node: &mut Node) -> Result<()> {
        if let Node::Component(component) = node {
            component.is_native = true;
        }
        Ok(())
    }

    fn transform_from_native(&self, node: &mut Node) -> Result<()> {
        if let Node::Component(component) = node {
            component.is_native = false;
        }
        Ok(())
    }

    fn generate_implicit_parameters(&self, component: &mut Component) -> Result<()> {
        generate_recurring_implicit(component)
    }
}

const VFREEBUSY_CHILDREN: &[KnownChild] = &[
    KnownChild::new("DTSTART", 0, Some(1)),
    KnownChild::new("CONTACT", 0, Some(1)),
    KnownChild::new("DTEND", 0, Some(1)),
    KnownChild::new("DURATION", 0, Some(1)),
    KnownChild::new("ORGANIZER", 0, Some(1)),
    KnownChild::new("DTSTAMP", 1, Some(1)),
    KnownChild::new("UID", 0, Some(1)),
    KnownChild::new("URL", 0, Some(1)),
    KnownChild::new("ATTENDEE", 0, None),
    KnownChild::new("COMMENT", 0, None),
    KnownChild::new("FREEBUSY", 0, None),
    KnownChild::new("REQUEST-STATUS", 0, None),
];

#[derive(Debug)]
pub struct VFreeBusy;

pub static VFREEBUSY: VFreeBusy = VFreeBusy;

impl Behavior for VFreeBusy {
    fn name(&self) -> &'static str {
        "VFREEBUSY"
    }

    fn version_string(&self) -> &'static str {
        "2.0"
    }

    fn is_component(&self) -> bool {
        true
    }

    fn sort_first(&self) -> &'static [&'static str] {
        &["UID", "DTSTART", "DURATION", "DTEND"]
    }

    fn known_children(&self) -> &'static [KnownChild] {
        VFREEBUSY_CHILDREN
    }

    fn default_behavior(&self) -> Option<&'static dyn Behavior> {
        Some(&TEXT)
    }
}

const VALARM_CHILDREN: &[KnownChild] = &[
    KnownChild::new("ACTION", 1, Some(1)),
    KnownChild::new("TRIGGER", 1, Some(1)),
    KnownChild::new("DURATION", 0, Some(1)),
    KnownChild::new("REPEAT", 0, Some(1)),
    KnownChild::new("DESCRIPTION", 0, Some(1)),
];

#[derive(Debug)]
pub struct VAlarm;

pub static VALARM: VAlarm = VAlarm;

impl Behavior for VAlarm {
    fn name(&self) -> &'static str {
        "VALARM"
    }

    fn version_string(&self) -> &'static str {
        "2.0"
    }

    fn is_component(&self) -> bool {
        true
    }

    fn known_children(&self) -> &'static [KnownChild] {
        VALARM_CHILDREN
    }

    fn default_behavior(&self) -> Option<&'static dyn Behavior> {
        Some(&TEXT)
    }

    fn generate_implicit_parameters(&self, component: &mut Component) -> Result<()> {
        if component.get("ACTION").is_none() {
            component.add_with_behavior(ContentLine::new("ACTION", "AUDIO"))?;
        }
        if component.get("TRIGGER").is_none() {
            let mut line = ContentLine::new("TRIGGER", "");
            line.value = Value::Duration(TimeDelta::zero());
            line.is_native = true;
            line.encoded = false;
            component.add_with_behavior(line)?;
        }
        Ok(())
    }
}

const VAVAILABILITY_CHILDREN: &[KnownChild] = &[
    KnownChild::new("BUSYTYPE", 0, Some(1)),
    KnownChild::new("CREATED", 0, Some(1)),
    KnownChild::new("DTSTART", 0, Some(1)),
    KnownChild::new("LAST-MODIFIED", 0, Some(1)),
    KnownChild::new("ORGANIZER", 0, Some(1)),
    KnownChild::new("SEQUENCE", 0, Some(1)),
    KnownChild::new("SUMMARY", 0, Some(1)),
    KnownChild::new("URL", 0, Some(1)),
    KnownChild::new("DTSTAMP", 1, Some(1)),
    KnownChild::new("UID", 1, Some(1)),
    KnownChild::new("DTEND", 0, Some(1)),
    KnownChild::new("DURATION", 0, Some(1)),
    KnownChild::new("CATEGORIES", 0, None),
    KnownChild::new("COMMENT", 0, None),
    KnownChild::new("CONTACT", 0, None),
    KnownChild::new("AVAILABLE", 0, None),
];

/// RFC 7953 availability.
#[derive(Debug)]
pub struct VAvailability;

pub static VAVAILABILITY: VAvailability = VAvailability;

impl Behavior for VAvailability {
    fn name(&self) -> &'static str {
        "VAVAILABILITY"
    }

    fn version_string(&self) -> &'static str {
        "2.0"
    }

    fn is_component(&self) -> bool {
        true
    }

    fn known_children(&self) -> &'static [KnownChild] {
        VAVAILABILITY_CHILDREN
    }

    fn default_behavior(&self) -> Option<&'static dyn Behavior> {
        Some(&TEXT)
    }

    fn validate(&self, node: &Node) -> Result<()> {
        if let Node::Component(component) = node {
            reject_coexisting(component, "DTEND", "DURATION")?;
        }
        validate_structure(self, node)
    }
}

const AVAILABLE_CHILDREN: &[KnownChild] = &[
    KnownChild::new("DTSTART", 1, Some(1)),
    KnownChild::new("DTSTAMP", 1, Some(1)),
    KnownChild::new("UID", 1, Some(1)),
    KnownChild::new("DTEND", 0, Some(1)),
    KnownChild::new("DURATION", 0, Some(1)),
    KnownChild::new("CREATED", 0, Some(1)),
    KnownChild::new("LAST-MODIFIED", 0, Some(1)),
    KnownChild::new("RECURRENCE-ID", 0, Some(1)),
    KnownChild::new("RRULE", 0, Some(1)),
    KnownChild::new("SUMMARY", 0, Some(1)),
    KnownChild::new("CATEGORIES", 0, None),
    KnownChild::new("COMMENT", 0, None),
    KnownChild::new("CONTACT", 0, None),
    KnownChild::new("EXDATE", 0, None),
    KnownChild::new("RDATE", 0, None),
];

#[derive(Debug)]
pub struct Available;

pub static AVAILABLE: Available = Available;

impl Behavior for Available {
    fn name(&self) -> &'static str {
        "AVAILABLE"
    }

    fn version_string(&self) -> &'static str {
        "2.0"
    }

    fn is_component(&self) -> bool {
        true
    }

    fn known_children(&self) -> &'static [KnownChild] {
        AVAILABLE_CHILDREN
    }

    fn default_behavior(&self) -> Option<&'static dyn Behavior> {
        Some(&TEXT)
    }

    fn validate(&self, node: &Node) -> Result<()> {
        if let Node::Component(component) = node {
            reject_coexisting(component, "DTEND", "DURATION")?;
        }
        validate_structure(self, node)
    }
}

// ---------------------------------------------------------------------------
// registry seeding

pub(crate) fn register_builtin(map: &mut RegistryMap) {
    insert_into(map, &VCALENDAR, None, false, None);
    insert_into(map, &VTIMEZONE, None, false, None);
    insert_into(map, &STANDARD, None, false, None);
    insert_into(map, &DAYLIGHT, None, false, None);
    insert_into(map, &VEVENT, None, false, None);
    insert_into(map, &VTODO, None, false, None);
    insert_into(map, &VJOURNAL, None, false, None);
    insert_into(map, &VFREEBUSY, None, false, None);
    insert_into(map, &VALARM, None, false, None);
    insert_into(map, &VAVAILABILITY, None, false, None);
    insert_into(map, &AVAILABLE, None, false, None);

    insert_into(map, &DURATION, Some("DURATION"), false, None);
    insert_into(map, &TRIGGER, Some("TRIGGER"), false, None);
    insert_into(map, &PERIOD, Some("FREEBUSY"), false, None);
    insert_into(map, &RULE, Some("RRULE"), false, None);
    insert_into(map, &RULE, Some("EXRULE"), false, None);
    insert_into(map, &TZID, Some("TZID"), false, None);

    for name in ["LAST-MODIFIED", "CREATED", "COMPLETED", "DTSTAMP"] {
        insert_into(map, &UTC_DATETIME, Some(name), false, None);
    }
    for name in ["DTEND", "DTSTART", "DUE", "RECURRENCE-ID"] {
        insert_into(map, &DATE_OR_DATETIME, Some(name), false, None);
    }
    insert_into(map, &MULTI_DATE, Some("RDATE"), false, None);
    insert_into(map, &MULTI_DATE, Some("EXDATE"), false, None);

    for name in [
        "CALSCALE",
        "METHOD",
        "PRODID",
        "CLASS",
        "COMMENT",
        "DESCRIPTION",
        "LOCATION",
        "STATUS",
        "SUMMARY",
        "TRANSP",
        "CONTACT",
        "RELATED-TO",
        "UID",
        "ACTION",
        "BUSYTYPE",
    ] {
        insert_into(map, &TEXT, Some(name), false, None);
    }
    for name in ["CATEGORIES", "RESOURCES"] {
        insert_into(map, &MULTI_TEXT, Some(name), false, None);
    }
    insert_into(map, &SEMICOLON_MULTI_TEXT, Some("REQUEST-STATUS"), false, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{ReadOptions, read_one};

    fn calendar(body: &str) -> Component {
        let text = format!("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n{body}END:VCALENDAR\r\n");
        read_one(&text, ReadOptions::default()).unwrap()
    }

    #[test]
    fn zoned_dtstart_becomes_native() {
        let cal = calendar(
            "BEGIN:VEVENT\r\nUID:z@example.com\r\nDTSTAMP:20260101T000000Z\r\n\
             DTSTART;TZID=America/New_York:20260301T100000\r\nEND:VEVENT\r\n",
        );
        let event = cal.component("VEVENT").unwrap();
        let line = event.get("DTSTART").unwrap();
        let Value::DateTime(DateTimeValue::Zoned { tzid, .. }) = &line.value else {
            panic!("expected a zoned date-time, got {:?}", line.value);
        };
        assert_eq!(tzid, "America/New_York");
        assert_eq!(line.param("X-VOBJ-ORIGINAL-TZID"), Some("America/New_York"));
        assert_eq!(line.param("TZID"), None);
    }

    #[test]
    fn utc_stamp_becomes_native() {
        let cal = calendar(
            "BEGIN:VEVENT\r\nUID:u@example.com\r\nDTSTAMP:20260101T000000Z\r\nEND:VEVENT\r\n",
        );
        let event = cal.component("VEVENT").unwrap();
        let line = event.get("DTSTAMP").unwrap();
        assert!(matches!(
            line.value,
            Value::DateTime(DateTimeValue::Utc(_))
        ));
    }

    #[test]
    fn trigger_duration_and_datetime_fallback() {
        let cal = calendar(
            "BEGIN:VEVENT\r\nUID:t@example.com\r\nDTSTAMP:20260101T000000Z\r\n\
             BEGIN:VALARM\r\nACTION:DISPLAY\r\nTRIGGER:-PT15M\r\nEND:VALARM\r\n\
             BEGIN:VALARM\r\nACTION:DISPLAY\r\nTRIGGER:20260105T093000Z\r\nEND:VALARM\r\n\
             END:VEVENT\r\n",
        );
        let event = cal.component("VEVENT").unwrap();
        let alarms: Vec<_> = event.components("VALARM").collect();
        assert_eq!(alarms.len(), 2);
        assert_eq!(
            alarms[0].get("TRIGGER").unwrap().value,
            Value::Duration(-TimeDelta::minutes(15))
        );
        assert!(matches!(
            alarms[1].get("TRIGGER").unwrap().value,
            Value::DateTime(DateTimeValue::Utc(_))
        ));
    }

    #[test]
    fn exdate_date_list_writes_back_with_value_param() {
        let cal = calendar(
            "BEGIN:VEVENT\r\nUID:x@example.com\r\nDTSTAMP:20260101T000000Z\r\n\
             DTSTART;VALUE=DATE:20260105\r\nEXDATE;VALUE=DATE:20260112,20260119\r\n\
             END:VEVENT\r\n",
        );
        let event = cal.component("VEVENT").unwrap();
        let line = event.get("EXDATE").unwrap();
        assert!(matches!(&line.value, Value::DateList(dates) if dates.len() == 2));

        let mut node = Node::Line(line.clone());
        MULTI_DATE.transform_from_native(&mut node).unwrap();
        let Node::Line(out) = node else { unreachable!() };
        assert_eq!(out.value_text(), "20260112,20260119");
        assert_eq!(out.param("VALUE"), Some("DATE"));
        assert!(!out.is_native);
    }

    #[test]
    fn categories_decode_into_a_list() {
        let cal = calendar(
            "BEGIN:VEVENT\r\nUID:c@example.com\r\nDTSTAMP:20260101T000000Z\r\n\
             CATEGORIES:a\\,b,c\r\nEND:VEVENT\r\n",
        );
        let event = cal.component("VEVENT").unwrap();
        assert_eq!(
            event.get("CATEGORIES").unwrap().value,
            Value::TextList(vec!["a,b".to_owned(), "c".to_owned()])
        );
    }

    #[test]
    fn description_unescapes() {
        let cal = calendar(
            "BEGIN:VEVENT\r\nUID:d@example.com\r\nDTSTAMP:20260101T000000Z\r\n\
             DESCRIPTION:line one\\nline two\\; done\r\nEND:VEVENT\r\n",
        );
        let event = cal.component("VEVENT").unwrap();
        assert_eq!(
            event.get_text("DESCRIPTION"),
            Some("line one\nline two; done")
        );
    }

    #[test]
    fn vevent_rejects_dtend_with_duration() {
        let text = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:x\r\nBEGIN:VEVENT\r\n\
                    UID:b@example.com\r\nDTSTAMP:20260101T000000Z\r\n\
                    DTSTART:20260105T090000Z\r\nDTEND:20260105T100000Z\r\nDURATION:PT1H\r\n\
                    END:VEVENT\r\nEND:VCALENDAR\r\n";
        let options = ReadOptions {
            validate: true,
            ..ReadOptions::default()
        };
        let err = read_one(text, options).unwrap_err();
        assert!(
            err.to_string()
                .contains("cannot contain both DTEND and DURATION")
        );
    }

    #[test]
    fn valarm_implicit_action_and_trigger() {
        let mut alarm = Component::new("VALARM");
        alarm.set_behavior(&VALARM).unwrap();
        VALARM.generate_implicit_parameters(&mut alarm).unwrap();
        assert_eq!(alarm.get_text("ACTION"), Some("AUDIO"));
        assert_eq!(
            alarm.get("TRIGGER").unwrap().value,
            Value::Duration(TimeDelta::zero())
        );
    }

    #[test]
    fn vcalendar_implicit_adds_prodid_version_and_timezone() {
        let mut cal = calendar(
            "BEGIN:VEVENT\r\nUID:tz@example.com\r\nDTSTAMP:20260101T000000Z\r\n\
             DTSTART;TZID=America/New_York:20260301T100000\r\nEND:VEVENT\r\n",
        );
        VCALENDAR.generate_implicit_parameters(&mut cal).unwrap();
        assert_eq!(cal.get_text("PRODID"), Some(PRODID));
        assert_eq!(cal.get_text("VERSION"), Some("2.0"));
        let vtz = cal.component("VTIMEZONE").unwrap();
        assert_eq!(vtz.get_text("TZID"), Some("America/New_York"));
        assert!(vtz.component("DAYLIGHT").is_some());
    }

    #[test]
    fn duration_must_be_single() {
        let mut node = Node::Line(ContentLine::new("DURATION", "PT5M,PT10M"));
        let err = DURATION.transform_to_native(&mut node).unwrap_err();
        assert!(
            err.to_string()
                .contains("DURATION must have a single duration string")
        );
    }
}
