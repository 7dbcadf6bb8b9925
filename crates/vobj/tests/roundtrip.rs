//! End-to-end fixtures: read real-world shaped streams, work on the native
//! tree, serialize, and read the output back.

use vobj::{DateTimeValue, ReadOptions, Value, read_one};

const ZONED_EVENT: &str = "\
BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Example Corp//CalDAV Client//EN\r\n\
BEGIN:VTIMEZONE\r\n\
TZID:US/Eastern\r\n\
BEGIN:DAYLIGHT\r\n\
DTSTART:20000402T020000\r\n\
RRULE:FREQ=YEARLY;BYMONTH=4;BYDAY=1SU\r\n\
TZNAME:EDT\r\n\
TZOFFSETFROM:-0500\r\n\
TZOFFSETTO:-0400\r\n\
END:DAYLIGHT\r\n\
BEGIN:STANDARD\r\n\
DTSTART:20001029T020000\r\n\
RRULE:FREQ=YEARLY;BYMONTH=10;BYDAY=-1SU\r\n\
TZNAME:EST\r\n\
TZOFFSETFROM:-0400\r\n\
TZOFFSETTO:-0500\r\n\
END:STANDARD\r\n\
END:VTIMEZONE\r\n\
BEGIN:VEVENT\r\n\
UID:20260107T052844Z-24155@example.com\r\n\
DTSTAMP:20260107T052844Z\r\n\
DTSTART;TZID=US/Eastern:20260112T140000\r\n\
DTEND;TZID=US/Eastern:20260112T150000\r\n\
SUMMARY:Design review\r\n\
DESCRIPTION:Agenda\\, slides\\, and minutes\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

#[test]
fn zoned_event_roundtrips() {
    let mut cal = read_one(ZONED_EVENT, ReadOptions::default()).unwrap();
    {
        let event = cal.component("VEVENT").unwrap();
        let Some(Value::DateTime(DateTimeValue::Zoned { local, tzid })) =
            event.get_value("DTSTART")
        else {
            panic!("DTSTART should be zoned");
        };
        assert_eq!(tzid, "US/Eastern");
        assert_eq!(local.to_string(), "2026-01-12 14:00:00");
        assert_eq!(
            event.get_text("DESCRIPTION"),
            Some("Agenda, slides, and minutes")
        );
    }

    let out = cal.serialize().unwrap();
    assert!(out.contains("DTSTART;TZID=US/Eastern:20260112T140000\r\n"));
    assert!(out.contains("DESCRIPTION:Agenda\\, slides\\, and minutes\r\n"));
    // the original VTIMEZONE satisfies the TZID, no second copy appears
    assert_eq!(out.matches("BEGIN:VTIMEZONE").count(), 1);

    let again = read_one(&out, ReadOptions::default()).unwrap();
    assert_eq!(
        again.component("VEVENT").unwrap().get_value("DTSTART"),
        cal.component("VEVENT").unwrap().get_value("DTSTART")
    );
}

#[test]
fn recurring_event_expands() {
    let text = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//T//T//EN\r\n\
                BEGIN:VEVENT\r\nUID:r@example.com\r\nDTSTAMP:20260101T000000Z\r\n\
                DTSTART:20260106T090000Z\r\nRRULE:FREQ=WEEKLY;COUNT=3\r\n\
                SUMMARY:Standup\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
    let cal = read_one(text, ReadOptions::default()).unwrap();
    let event = cal.component("VEVENT").unwrap();
    let set = vobj::get_rruleset(event, false).unwrap().unwrap();
    let dates = set.all(10).dates;
    assert_eq!(dates.len(), 3);
    assert_eq!(dates[0].naive_utc().to_string(), "2026-01-06 09:00:00");
    assert_eq!(dates[2].naive_utc().to_string(), "2026-01-20 09:00:00");
}

#[test]
fn rruleset_writes_back_as_children() {
    let text = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//T//T//EN\r\n\
                BEGIN:VEVENT\r\nUID:w@example.com\r\nDTSTAMP:20260101T000000Z\r\n\
                DTSTART:20260106T090000Z\r\nRRULE:FREQ=DAILY;COUNT=5\r\n\
                END:VEVENT\r\nEND:VCALENDAR\r\n";
    let mut cal = read_one(text, ReadOptions::default()).unwrap();
    let event = cal
        .children_mut()
        .find_map(|n| n.as_component_mut())
        .unwrap();
    let set = vobj::get_rruleset(event, false).unwrap().unwrap();
    vobj::set_rruleset(event, &set).unwrap();
    assert_eq!(event.get_text("RRULE"), Some("FREQ=DAILY;COUNT=5"));
}

#[test]
fn vcard_roundtrips() {
    let text = "BEGIN:VCARD\r\nVERSION:3.0\r\n\
                FN:Frank Dobbs\r\n\
                N:Dobbs;Frank;;;\r\n\
                ORG:Example Corp;Engineering\r\n\
                ADR;TYPE=WORK:;;42 Puddle Lane;Springfield;IL;62704;USA\r\n\
                EMAIL;TYPE=INTERNET:frank@example.com\r\n\
                END:VCARD\r\n";
    let mut card = read_one(text, ReadOptions::default()).unwrap();
    {
        let Some(Value::Name(name)) = card.get_value("N") else {
            panic!("N should be structured");
        };
        assert_eq!(name.family, vec!["Dobbs"]);
        let Some(Value::Address(adr)) = card.get_value("ADR") else {
            panic!("ADR should be structured");
        };
        assert_eq!(adr.city, vec!["Springfield"]);
    }
    let out = card.serialize().unwrap();
    assert!(out.contains("N:Dobbs;Frank;;;\r\n"));
    assert!(out.contains("ADR;TYPE=WORK:;;42 Puddle Lane;Springfield;IL;62704;USA\r\n"));
    assert!(out.contains("ORG:Example Corp;Engineering\r\n"));
}

#[test]
fn quoted_printable_vcard21_reads() {
    let text = "BEGIN:VCARD\r\nVERSION:2.1\r\n\
                FN:Andr=C3=A9\r\n\
                LABEL;ENCODING=QUOTED-PRINTABLE:1 Rue du Test=0D=0AParis\r\n\
                END:VCARD\r\n";
    let options = ReadOptions {
        allow_qp: true,
        ..ReadOptions::default()
    };
    let card = read_one(text, options).unwrap();
    assert_eq!(card.get_text("LABEL"), Some("1 Rue du Test\r\nParis"));
}

#[test]
fn change_tz_then_serialize() {
    let text = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//T//T//EN\r\n\
                BEGIN:VEVENT\r\nUID:c@example.com\r\nDTSTAMP:20260101T000000Z\r\n\
                DTSTART:20260105T170000Z\r\nDTEND:20260105T180000Z\r\n\
                END:VEVENT\r\nEND:VCALENDAR\r\n";
    let mut cal = read_one(text, ReadOptions::default()).unwrap();
    vobj::change_tz::change_tz(&mut cal, "America/New_York", "UTC", false).unwrap();
    let out = cal.serialize().unwrap();
    assert!(out.contains("DTSTART;TZID=America/New_York:20260105T120000\r\n"));
    assert!(out.contains("BEGIN:VTIMEZONE"));
    assert!(out.contains("TZID:America/New_York"));
}

#[test]
fn diff_spots_the_changed_event() {
    let base = |summary: &str| {
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//T//T//EN\r\n\
             BEGIN:VEVENT\r\nUID:d@example.com\r\nDTSTAMP:20260101T000000Z\r\n\
             DTSTART:20260105T170000Z\r\nSUMMARY:{summary}\r\nEND:VEVENT\r\n\
             END:VCALENDAR\r\n"
        )
    };
    let left = read_one(&base("Draft"), ReadOptions::default()).unwrap();
    let right = read_one(&base("Final"), ReadOptions::default()).unwrap();
    let pairs = vobj::diff::diff(&left, &right);
    assert_eq!(pairs.len(), 1);
    let (Some(l), Some(r)) = &pairs[0] else {
        panic!("both sides should be present");
    };
    assert_eq!(l.get_text("SUMMARY"), Some("Draft"));
    assert_eq!(r.get_text("SUMMARY"), Some("Final"));
}
