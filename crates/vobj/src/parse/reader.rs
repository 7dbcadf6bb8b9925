//! Component assembly: turns a stream of content lines into a tree by
//! tracking BEGIN/END nesting, binding behaviors from the VERSION line once
//! a top-level component completes.

use tracing::warn;

use crate::behavior;
use crate::core::component::Component;
use crate::parse::lexer::logical_lines;
use crate::parse::line::parse_content_line;
use crate::error::{Result, VObjectError};

/// Knobs for [`read_components`].
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Run structural validation on each completed component.
    pub validate: bool,
    /// Decode values into their native forms after binding behaviors.
    pub transform: bool,
    /// Log and skip unparseable lines instead of failing.
    pub ignore_unreadable: bool,
    /// Honor vCard 2.1 quoted-printable soft line breaks while unfolding.
    pub allow_qp: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            validate: false,
            transform: true,
            ignore_unreadable: false,
            allow_qp: false,
        }
    }
}

/// Parses every top-level component from `input`, lazily.
///
/// Each yielded item is one finished top-level component; an `Err` item ends
/// the iteration.
pub fn read_components(
    input: &str,
    options: ReadOptions,
) -> impl Iterator<Item = Result<Component>> + '_ {
    Reader {
        lines: logical_lines(input, options.allow_qp).into_iter(),
        stack: Vec::new(),
        version: None,
        last_line: 0,
        options,
        done: false,
    }
}

/// Parses and returns the first component from `input`.
pub fn read_one(input: &str, options: ReadOptions) -> Result<Component> {
    read_components(input, options)
        .next()
        .unwrap_or_else(|| Err(VObjectError::parse("At least one component expected")))
}

struct Reader {
    lines: std::vec::IntoIter<(usize, String)>,
    stack: Vec<Component>,
    version: Option<String>,
    last_line: usize,
    options: ReadOptions,
    done: bool,
}

impl Reader {
    /// A content line outside any component opens an unnamed container.
    fn modify_top(&mut self, node: impl Into<crate::core::component::Node>) {
        if let Some(top) = self.stack.last_mut() {
            top.add(node);
        } else {
            let mut unnamed = Component::unnamed();
            unnamed.add(node);
            self.stack.push(unnamed);
        }
    }

    fn finish_component(&mut self, mut component: Component) -> Result<Component> {
        if let Some(version) = self.version.as_deref() {
            component.set_behavior_from_version(version)?;
        } else if let Some(b) = behavior::get_behavior(&component.name, None) {
            component.set_behavior(b)?;
        }
        if self.options.validate {
            let node = crate::core::component::Node::Component(component);
            node.validate()?;
            let crate::core::component::Node::Component(validated) = node else {
                return Err(VObjectError::validate("component changed shape"));
            };
            component = validated;
        }
        if self.options.transform {
            component.transform_children_to_native()?;
        }
        Ok(component)
    }

    fn step(&mut self) -> Result<Option<Component>> {
        while let Some((number, text)) = self.lines.next() {
            self.last_line = number;
            let line = match parse_content_line(&text, number) {
                Ok(line) => line,
                Err(e) if self.options.ignore_unreadable => {
                    warn!("Skipped line {number}, message: {e}");
                    continue;
                }
                Err(e) => return Err(e),
            };
            match line.name.as_str() {
                "VERSION" => {
                    self.version = Some(line.value_text().to_owned());
                    self.modify_top(line);
                }
                "BEGIN" => {
                    let mut component = Component::new(line.value_text());
                    component.group = line.group.clone();
                    self.stack.push(component);
                }
                "PROFILE" => {
                    if self.stack.is_empty() {
                        self.stack.push(Component::unnamed());
                    }
                    if let Some(top) = self.stack.last_mut() {
                        top.set_profile(line.value_text())?;
                    }
                }
                "END" => {
                    let ended = line.value_text().to_uppercase();
                    let Some(top_name) = self.stack.last().map(|c| c.name.clone()) else {
                        return Err(VObjectError::parse_at(
                            format!(
                                "Attempted to end the {ended} component but it was never opened"
                            ),
                            number,
                        ));
                    };
                    if ended != top_name {
                        return Err(VObjectError::parse_at(
                            format!("{top_name} component wasn't closed"),
                            number,
                        ));
                    }
                    #[expect(clippy::unwrap_used, reason = "stack verified non-empty above")]
                    let component = self.stack.pop().unwrap();
                    if let Some(parent) = self.stack.last_mut() {
                        parent.add(component);
                    } else {
                        return self.finish_component(component).map(Some);
                    }
                }
                _ => self.modify_top(line),
            }
        }

        // end of input with open components
        let Some(top) = self.stack.pop() else {
            return Ok(None);
        };
        self.stack.clear();
        if top.name.is_empty() {
            warn!("Top level component was never named");
        } else if top.use_begin {
            return Err(VObjectError::parse_at(
                format!("Component {} was never closed", top.name),
                self.last_line,
            ));
        }
        Ok(Some(top))
    }
}

impl Iterator for Reader {
    type Item = Result<Component>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(component)) => Some(Ok(component)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Value;

    const SIMPLE_EVENT: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Tests//EN\r\n\
BEGIN:VEVENT\r\n\
UID:1@example.com\r\n\
DTSTART:20260114T090000Z\r\n\
SUMMARY:Staff meeting\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn reads_nested_components() {
        let cal = read_one(SIMPLE_EVENT, ReadOptions::default()).unwrap();
        assert_eq!(cal.name, "VCALENDAR");
        let event = cal.component("VEVENT").unwrap();
        assert_eq!(event.get_text("SUMMARY"), Some("Staff meeting"));
        assert!(matches!(
            event.get_value("DTSTART"),
            Some(Value::DateTime(_))
        ));
    }

    #[test]
    fn unclosed_component_is_an_error() {
        let input = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\n";
        let err = read_one(input, ReadOptions::default());
        assert!(matches!(err, Err(VObjectError::Parse { .. })));
        let msg = err.unwrap_err().to_string();
        assert!(msg.contains("VCALENDAR was never closed"), "{msg}");
    }

    #[test]
    fn mismatched_end_is_an_error() {
        let input = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nEND:VCALENDAR\r\n";
        let msg = read_one(input, ReadOptions::default())
            .unwrap_err()
            .to_string();
        assert!(msg.contains("VEVENT component wasn't closed"), "{msg}");
    }

    #[test]
    fn end_without_begin_is_an_error() {
        let input = "END:VCALENDAR\r\n";
        let msg = read_one(input, ReadOptions::default())
            .unwrap_err()
            .to_string();
        assert!(
            msg.contains("Attempted to end the VCALENDAR component but it was never opened"),
            "{msg}"
        );
    }

    #[test_log::test]
    fn ignore_unreadable_skips_bad_lines() {
        let input = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nTHIS HAS NO COLON\r\nEND:VCALENDAR\r\n";
        assert!(read_one(input, ReadOptions::default()).is_err());
        let options = ReadOptions {
            ignore_unreadable: true,
            ..ReadOptions::default()
        };
        let cal = read_one(input, options).unwrap();
        assert_eq!(cal.name, "VCALENDAR");
    }

    #[test]
    fn profile_names_a_bare_container() {
        let input = "PROFILE:VCARD\r\nFN:Jeffrey Harris\r\n";
        let card = read_one(input, ReadOptions::default()).unwrap();
        assert_eq!(card.name, "VCARD");
        assert!(!card.use_begin);
    }

    #[test]
    fn conflicting_profile_is_an_error() {
        let input = "PROFILE:VCARD\r\nPROFILE:OTHER\r\nFN:Jeffrey Harris\r\n";
        let msg = read_one(input, ReadOptions::default())
            .unwrap_err()
            .to_string();
        assert!(msg.contains("OTHER not allowed"), "{msg}");
    }

    #[test]
    fn multiple_top_level_components() {
        let two = format!("{SIMPLE_EVENT}{SIMPLE_EVENT}");
        let parsed: Vec<_> = read_components(&two, ReadOptions::default())
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(parsed.len(), 2);
    }
}
