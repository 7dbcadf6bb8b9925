use std::collections::BTreeMap;

use crate::behavior::Behavior;
use crate::core::value::Value;

/// A single property line: `[group.]NAME[;PARAM=VALUE,...]*:VALUE`.
///
/// Parameter keys are stored uppercased; bare parameter tokens without an
/// `=` land in `singleton_params`. `encoded` means the textual value still
/// carries its wire encoding (backslash escapes or base64); quoted-printable
/// is absorbed at construction, the rest waits for the behavior's `decode`.
#[derive(Debug, Clone, Default)]
pub struct ContentLine {
    pub name: String,
    pub group: Option<String>,
    pub params: BTreeMap<String, Vec<String>>,
    pub singleton_params: Vec<String>,
    pub value: Value,
    pub encoded: bool,
    pub is_native: bool,
    pub line_number: Option<usize>,
    pub behavior: Option<&'static dyn Behavior>,
    pub parent_behavior: Option<&'static dyn Behavior>,
}

impl ContentLine {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            value: value.into(),
            ..Self::default()
        }
    }

    /// Assembles a line from parsed grammar pieces, normalizing parameter
    /// keys and stripping any quoted-printable transport encoding.
    #[must_use]
    pub fn from_parts(
        name: &str,
        raw_params: Vec<Vec<String>>,
        value: String,
        group: Option<String>,
        line_number: usize,
    ) -> Self {
        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut singleton_params = Vec::new();
        for mut entry in raw_params {
            if entry.len() == 1 {
                singleton_params.push(entry.remove(0));
            } else {
                let key = entry.remove(0).to_uppercase();
                params.entry(key).or_default().extend(entry);
            }
        }

        let mut qp = false;
        if let Some(encodings) = params.get_mut("ENCODING") {
            let before = encodings.len();
            encodings.retain(|e| !e.eq_ignore_ascii_case("QUOTED-PRINTABLE"));
            if encodings.len() < before {
                qp = true;
            }
            if encodings.is_empty() {
                params.remove("ENCODING");
            }
        }
        let before = singleton_params.len();
        singleton_params.retain(|p| !p.eq_ignore_ascii_case("QUOTED-PRINTABLE"));
        if singleton_params.len() < before {
            qp = true;
        }

        let value = if qp {
            decode_quoted_printable(&value)
        } else {
            value
        };

        Self {
            name: name.to_uppercase(),
            group,
            params,
            singleton_params,
            value: Value::Text(value),
            encoded: true,
            is_native: false,
            line_number: Some(line_number),
            behavior: None,
            parent_behavior: None,
        }
    }

    /// All values of a parameter, or `None` if it is absent.
    #[must_use]
    pub fn param_values(&self, name: &str) -> Option<&Vec<String>> {
        self.params.get(&name.to_uppercase())
    }

    /// The first value of a parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.param_values(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn set_param(&mut self, name: &str, values: Vec<String>) {
        self.params.insert(name.to_uppercase(), values);
    }

    pub fn add_param_value(&mut self, name: &str, value: impl Into<String>) {
        self.params
            .entry(name.to_uppercase())
            .or_default()
            .push(value.into());
    }

    pub fn remove_param(&mut self, name: &str) -> Option<Vec<String>> {
        self.params.remove(&name.to_uppercase())
    }

    /// The textual value. Empty for lines already holding a native value.
    #[must_use]
    pub fn value_text(&self) -> &str {
        self.value.as_text().unwrap_or_default()
    }
}

impl PartialEq for ContentLine {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.group == other.group
            && self.params == other.params
            && self.value == other.value
    }
}

/// Quoted-printable decoding. Soft line breaks (`=` before a line break) are
/// dropped, `=XX` hex escapes become bytes, anything malformed passes
/// through untouched.
fn decode_quoted_printable(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'=' {
            if bytes[i + 1..].starts_with(b"\r\n") {
                i += 3;
                continue;
            }
            if matches!(bytes.get(i + 1), Some(b'\n' | b'\r')) {
                i += 2;
                continue;
            }
            if let Some(hex) = bytes.get(i + 1..i + 3)
                && let Ok(hex) = std::str::from_utf8(hex)
                && let Ok(byte) = u8::from_str_radix(hex, 16)
            {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_and_keyed_params_split() {
        let line = ContentLine::from_parts(
            "tel",
            vec![
                vec!["HOME".to_owned()],
                vec!["TYPE".to_owned(), "voice".to_owned(), "cell".to_owned()],
            ],
            "+1 555 0100".to_owned(),
            None,
            1,
        );
        assert_eq!(line.name, "TEL");
        assert_eq!(line.singleton_params, vec!["HOME"]);
        assert_eq!(
            line.param_values("type"),
            Some(&vec!["voice".to_owned(), "cell".to_owned()])
        );
    }

    #[test]
    fn quoted_printable_encoding_absorbed() {
        let line = ContentLine::from_parts(
            "LABEL",
            vec![vec!["ENCODING".to_owned(), "QUOTED-PRINTABLE".to_owned()]],
            "caf=C3=A9=0Abar".to_owned(),
            None,
            1,
        );
        assert_eq!(line.value_text(), "caf\u{e9}\nbar");
        assert!(line.param_values("ENCODING").is_none());
    }

    #[test]
    fn quoted_printable_soft_break_removed() {
        assert_eq!(decode_quoted_printable("foo=\nbar"), "foobar");
        assert_eq!(decode_quoted_printable("foo=\r\nbar"), "foobar");
    }
}
