//! Rewrites event times into a different timezone, the library half of an
//! ics-conversion tool.

use crate::core::component::Component;
use crate::core::value::{DateTimeValue, Value};
use crate::error::Result;
use crate::ical::timezone;

/// Moves the DTSTART and DTEND of every VEVENT in `cal` to `new_tzid`.
///
/// Floating times are first anchored in `default_tzid`. With `utc_only`
/// set, only values already in UTC are touched.
pub fn change_tz(
    cal: &mut Component,
    new_tzid: &str,
    default_tzid: &str,
    utc_only: bool,
) -> Result<()> {
    for node in cal.children_mut() {
        let Some(event) = node.as_component_mut() else {
            continue;
        };
        if event.name != "VEVENT" {
            continue;
        }
        for name in ["DTSTART", "DTEND"] {
            let Some(line) = event.get_mut(name) else {
                continue;
            };
            let Value::DateTime(dt) = &line.value else {
                continue;
            };
            if utc_only && !matches!(dt, DateTimeValue::Utc(_)) {
                continue;
            }
            let anchored = match dt {
                DateTimeValue::Floating(naive) => DateTimeValue::Zoned {
                    local: *naive,
                    tzid: default_tzid.to_owned(),
                },
                other => other.clone(),
            };
            let instant = timezone::to_utc(&anchored)?;
            let converted = if new_tzid == "UTC" {
                DateTimeValue::Utc(instant)
            } else {
                timezone::from_utc(instant, new_tzid)?
            };
            line.remove_param("X-VOBJ-ORIGINAL-TZID");
            line.value = Value::DateTime(converted);
        }
    }
    Ok(())
}
