//! Serialization: implicit-parameter generation, validation, encoding, and
//! UTF-8-safe line folding.

use tracing::debug;

use crate::behavior::Behavior;
use crate::core::component::{Component, Node};
use crate::core::contentline::ContentLine;
use crate::error::{Result, VObjectError};

/// RFC 5545 §3.1 default content line byte budget.
pub const FOLD_WIDTH: usize = 75;

/// Serializes a node at the default 75-byte line budget.
///
/// Implicit parameters are generated in place so the caller's tree keeps
/// them; everything after that works on a clone, leaving native values and
/// decoded text visible to the caller untouched.
pub fn write(node: &mut Node) -> Result<String> {
    write_with_line_length(node, FOLD_WIDTH)
}

/// [`write`] with a caller-chosen physical line budget.
pub fn write_with_line_length(node: &mut Node, line_length: usize) -> Result<String> {
    debug!(name = node.name(), "serializing");
    generate_implicit(node)?;
    node.validate()?;

    let mut clone = node.clone();
    clone.transform_from_native()?;
    if let Node::Component(component) = &mut clone {
        component.transform_children_from_native()?;
    }

    let mut out = String::new();
    write_node(&mut clone, &mut out, line_length)?;
    Ok(out)
}

/// Top-down so a container can scan its children (TZID collection) before
/// the children add their own implicit properties.
fn generate_implicit(node: &mut Node) -> Result<()> {
    if let Node::Component(component) = node {
        if let Some(behavior) = component.behavior {
            behavior.generate_implicit_parameters(component)?;
        }
        for child in component.children_mut() {
            generate_implicit(child)?;
        }
    }
    Ok(())
}

fn write_node(node: &mut Node, out: &mut String, width: usize) -> Result<()> {
    match node {
        Node::Component(component) => write_component(component, out, width),
        Node::Line(line) => write_line(line, out, width),
    }
}

fn write_component(component: &mut Component, out: &mut String, width: usize) -> Result<()> {
    let group = component
        .group
        .as_ref()
        .map(|g| format!("{g}."))
        .unwrap_or_default();
    if component.use_begin {
        fold_one_line(out, &format!("{group}BEGIN:{}", component.name), width, true);
    }
    for key in component.sorted_keys() {
        let Some(mut nodes) = component.contents.remove(&key) else {
            continue;
        };
        let result = nodes
            .iter_mut()
            .try_for_each(|child| write_node(child, out, width));
        component.contents.insert(key, nodes);
        result?;
    }
    if component.use_begin {
        fold_one_line(out, &format!("{group}END:{}", component.name), width, true);
    }
    Ok(())
}

fn write_line(line: &mut ContentLine, out: &mut String, width: usize) -> Result<()> {
    if !line.encoded
        && let Some(behavior) = line.behavior
    {
        behavior.encode(line)?;
    }

    let mut text = String::new();
    if let Some(group) = &line.group {
        text.push_str(group);
        text.push('.');
    }
    text.push_str(&line.name.to_uppercase());
    for (key, values) in &line.params {
        let joined = values
            .iter()
            .map(|v| dquote_escape(v))
            .collect::<Result<Vec<_>>>()?
            .join(",");
        text.push(';');
        text.push_str(key);
        text.push('=');
        text.push_str(&joined);
    }
    text.push(':');
    text.push_str(line.value_text());

    let fold = line.behavior.is_none_or(Behavior::fold);
    fold_one_line(out, &text, width, fold);
    Ok(())
}

/// Wraps a parameter value in double quotes when it contains `,`, `;`, or
/// `:`. Embedded double quotes have no escape in the grammar.
fn dquote_escape(param: &str) -> Result<String> {
    if param.contains('"') {
        return Err(VObjectError::validate(
            "Double quotes aren't allowed in parameter values.",
        ));
    }
    if param.contains([',', ';', ':']) {
        Ok(format!("\"{param}\""))
    } else {
        Ok(param.to_owned())
    }
}

/// Folds at the byte budget without splitting a multi-byte sequence; the
/// continuation space counts against the next chunk's budget.
fn fold_one_line(out: &mut String, input: &str, width: usize, fold: bool) {
    let total = input.len();
    let mut start = 0;
    let mut space = 0;
    while fold && start + width < total {
        let mut end = start + width - space;
        while !input.is_char_boundary(end) {
            end -= 1;
        }
        out.push_str(&input[start..end]);
        out.push_str("\r\n ");
        space = 1;
        start = end;
    }
    out.push_str(&input[start..]);
    out.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{ReadOptions, read_one};

    fn roundtrip(text: &str) -> String {
        let mut component = read_one(text, ReadOptions::default()).unwrap();
        component.serialize().unwrap()
    }

    #[test]
    fn event_roundtrips_with_sorted_properties() {
        let text = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//X//X//EN\r\n\
                    BEGIN:VEVENT\r\nSUMMARY:Party\r\nDTSTART:20260105T170000Z\r\n\
                    UID:a@example.com\r\nDTSTAMP:20260101T000000Z\r\nEND:VEVENT\r\n\
                    END:VCALENDAR\r\n";
        let out = roundtrip(text);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "BEGIN:VCALENDAR");
        // VERSION sorts ahead of PRODID, UID ahead of DTSTART
        assert_eq!(lines[1], "VERSION:2.0");
        assert_eq!(lines[2], "PRODID:-//X//X//EN");
        let uid = lines.iter().position(|l| l.starts_with("UID:")).unwrap();
        let dtstart = lines
            .iter()
            .position(|l| l.starts_with("DTSTART:"))
            .unwrap();
        assert!(uid < dtstart);
        assert!(out.ends_with("END:VCALENDAR\r\n"));
    }

    #[test]
    fn native_datetime_serializes_back_with_tzid() {
        let text = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//X//X//EN\r\n\
                    BEGIN:VEVENT\r\nUID:t@example.com\r\nDTSTAMP:20260101T000000Z\r\n\
                    DTSTART;TZID=America/New_York:20260301T100000\r\nEND:VEVENT\r\n\
                    END:VCALENDAR\r\n";
        let out = roundtrip(text);
        assert!(out.contains("DTSTART;TZID=America/New_York:20260301T100000\r\n"));
    }

    #[test]
    fn text_is_escaped_on_the_way_out() {
        let text = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//X//X//EN\r\n\
                    BEGIN:VEVENT\r\nUID:e@example.com\r\nDTSTAMP:20260101T000000Z\r\n\
                    DESCRIPTION:one\\ntwo\\, three\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let out = roundtrip(text);
        assert!(out.contains("DESCRIPTION:one\\ntwo\\, three\r\n"));
    }

    #[test]
    fn long_lines_fold_at_75_bytes() {
        let mut out = String::new();
        let input = format!("DESCRIPTION:{}", "x".repeat(200));
        fold_one_line(&mut out, &input, FOLD_WIDTH, true);
        for line in out.split("\r\n").filter(|l| !l.is_empty()) {
            assert!(line.len() <= FOLD_WIDTH, "line too long: {}", line.len());
        }
        let unfolded: String = out.replace("\r\n ", "").replace("\r\n", "");
        assert_eq!(unfolded, input);
    }

    #[test]
    fn folding_never_splits_multibyte_sequences() {
        let mut out = String::new();
        let input = format!("SUMMARY:{}", "é".repeat(100));
        fold_one_line(&mut out, &input, FOLD_WIDTH, true);
        for line in out.split("\r\n") {
            assert!(line.len() <= FOLD_WIDTH);
            assert!(std::str::from_utf8(line.as_bytes()).is_ok());
        }
    }

    #[test]
    fn param_with_colon_is_quoted() {
        assert_eq!(
            dquote_escape("http://example.com").unwrap(),
            "\"http://example.com\""
        );
        assert_eq!(dquote_escape("plain").unwrap(), "plain");
        assert!(dquote_escape("has\"quote").is_err());
    }

    #[test]
    fn serialization_generates_implicit_properties() {
        let text = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//X//X//EN\r\n\
                    BEGIN:VEVENT\r\nSUMMARY:Bare\r\nDTSTART:20260105T170000Z\r\n\
                    END:VEVENT\r\nEND:VCALENDAR\r\n";
        let out = roundtrip(text);
        assert!(out.contains("UID:"));
        assert!(out.contains("DTSTAMP:"));
    }

    #[test]
    fn custom_line_length_folds_wider() {
        let long = "x".repeat(120);
        let text = format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//X//X//EN\r\n\
             BEGIN:VEVENT\r\nUID:w@example.com\r\nDTSTAMP:20260101T000000Z\r\n\
             DTSTART:20260105T170000Z\r\nDESCRIPTION:{long}\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n"
        );
        let mut component = read_one(&text, ReadOptions::default()).unwrap();
        let out = component.serialize_with_line_length(200).unwrap();
        assert!(out.contains(&format!("DESCRIPTION:{long}\r\n")));
        let default = component.serialize().unwrap();
        assert!(!default.contains(&format!("DESCRIPTION:{long}\r\n")));
    }

    #[test]
    fn serializing_twice_is_stable() {
        let text = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//X//X//EN\r\n\
                    BEGIN:VEVENT\r\nSUMMARY:Bare\r\nDTSTART:20260105T170000Z\r\n\
                    END:VEVENT\r\nEND:VCALENDAR\r\n";
        let mut component = read_one(text, ReadOptions::default()).unwrap();
        let first = component.serialize().unwrap();
        let second = component.serialize().unwrap();
        assert_eq!(first, second);
    }
}
