//! vCard 3.0 (RFC 2426) structured types and behaviors.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::fmt;

use crate::behavior::{Behavior, KnownChild, RegistryMap, insert_into};
use crate::core::component::{Component, Node};
use crate::core::contentline::ContentLine;
use crate::core::value::Value;
use crate::error::{Result, VObjectError};
use crate::ical::values;

/// A structured N value. Each field holds zero or more comma-separated
/// parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Name {
    pub family: Vec<String>,
    pub given: Vec<String>,
    pub additional: Vec<String>,
    pub prefix: Vec<String>,
    pub suffix: Vec<String>,
}

impl fmt::Display for Name {
    /// English reading order, space separated.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = [
            &self.prefix,
            &self.given,
            &self.additional,
            &self.family,
            &self.suffix,
        ];
        let text = order
            .iter()
            .map(|field| field.join(" "))
            .collect::<Vec<_>>()
            .join(" ");
        f.write_str(&text)
    }
}

/// A structured ADR value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub po_box: Vec<String>,
    pub extended: Vec<String>,
    pub street: Vec<String>,
    pub city: Vec<String>,
    pub region: Vec<String>,
    pub code: Vec<String>,
    pub country: Vec<String>,
}

impl fmt::Display for Address {
    /// Postal-label shape: box, extended, and street lines, then
    /// "city, region code", then the country.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines: Vec<String> = [&self.po_box, &self.extended, &self.street]
            .iter()
            .filter(|field| !field.is_empty())
            .map(|field| field.join("\n"))
            .collect();
        lines.push(format!(
            "{}, {} {}",
            self.city.join(" "),
            self.region.join(" "),
            self.code.join(" ")
        ));
        if !self.country.is_empty() {
            lines.push(self.country.join("\n"));
        }
        f.write_str(&lines.join("\n"))
    }
}

/// Splits a structured value into fields on `;` and each field into parts
/// on `,`, decoding backslash escapes in one pass.
#[must_use]
pub fn split_fields(s: &str) -> Vec<Vec<String>> {
    let mut fields = Vec::new();
    let mut field: Vec<String> = Vec::new();
    let mut part = String::new();
    let mut escaped = false;

    let close_part = |field: &mut Vec<String>, part: &mut String| {
        field.push(std::mem::take(part));
    };
    let close_field = |fields: &mut Vec<Vec<String>>, field: &mut Vec<String>, part: &mut String| {
        if !part.is_empty() || !field.is_empty() {
            close_part(field, part);
        }
        fields.push(std::mem::take(field));
    };

    for c in s.chars() {
        if escaped {
            match c {
                'n' | 'N' => part.push('\n'),
                '\\' | ';' | ',' | '"' => part.push(c),
                _ => {
                    part.push('\\');
                    part.push(c);
                }
            }
            escaped = false;
        } else {
            match c {
                '\\' => escaped = true,
                ';' => close_field(&mut fields, &mut field, &mut part),
                ',' => field.push(std::mem::take(&mut part)),
                _ => part.push(c),
            }
        }
    }
    if escaped {
        part.push('\\');
    }
    close_field(&mut fields, &mut field, &mut part);
    fields
}

/// Inverse of [`split_fields`]: escapes each part, joins parts with `,`
/// and fields with `;`.
#[must_use]
pub fn serialize_fields(fields: &[Vec<String>]) -> String {
    fields
        .iter()
        .map(|field| {
            field
                .iter()
                .map(|part| values::backslash_escape(part))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join(";")
}

fn field(fields: &mut std::vec::IntoIter<Vec<String>>) -> Vec<String> {
    fields.next().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// behaviors

/// Backslash escaping for single-valued vCard properties, plus base64
/// when ENCODING=B. Apple's Address Book exports a bare `BASE64`
/// singleton parameter instead, which gets rewritten to ENCODING=B.
#[derive(Debug)]
pub struct VCardTextBehavior {
    name: &'static str,
    fold: bool,
}

pub static VCARD_TEXT: VCardTextBehavior = VCardTextBehavior {
    name: "VCARD-TEXT",
    fold: true,
};
/// Address Book also expects PHOTO base64 data unwrapped.
pub static PHOTO: VCardTextBehavior = VCardTextBehavior {
    name: "PHOTO",
    fold: false,
};

impl Behavior for VCardTextBehavior {
    fn name(&self) -> &'static str {
        self.name
    }

    fn allow_group(&self) -> bool {
        true
    }

    fn fold(&self) -> bool {
        self.fold
    }

    fn decode(&self, line: &mut ContentLine) -> Result<()> {
        if line.encoded {
            let before = line.singleton_params.len();
            line.singleton_params
                .retain(|p| !p.eq_ignore_ascii_case("BASE64"));
            if line.singleton_params.len() < before {
                line.set_param("ENCODING", vec!["B".to_owned()]);
            }
            if line.param("ENCODING").is_some() {
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
            let base64 = line
                .param("ENCODING")
                .is_some_and(|e| e.eq_ignore_ascii_case("B"));
            if base64 {
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

const VCARD_CHILDREN: &[KnownChild] = &[
    KnownChild::new("N", 0, Some(1)),
    KnownChild::new("FN", 1, None),
    KnownChild::new("VERSION", 1, Some(1)),
    KnownChild::new("PRODID", 0, Some(1)),
    KnownChild::new("LABEL", 0, None),
    KnownChild::new("UID", 0, None),
    KnownChild::new("ADR", 0, None),
    KnownChild::new("ORG", 0, None),
    KnownChild::new("PHOTO", 0, None),
    KnownChild::new("CATEGORIES", 0, None),
    KnownChild::new("GEO", 0, None),
];

/// The vCard 3.0 container, defined in RFC 2426.
#[derive(Debug)]
pub struct VCard3;

pub static VCARD: VCard3 = VCard3;

impl Behavior for VCard3 {
    fn name(&self) -> &'static str {
        "VCARD"
    }

    fn version_string(&self) -> &'static str {
        "3.0"
    }

    fn is_component(&self) -> bool {
        true
    }

    fn allow_group(&self) -> bool {
        true
    }

    fn sort_first(&self) -> &'static [&'static str] {
        &["VERSION", "PRODID", "UID"]
    }

    fn known_children(&self) -> &'static [KnownChild] {
        VCARD_CHILDREN
    }

    fn default_behavior(&self) -> Option<&'static dyn Behavior> {
        Some(&VCARD_TEXT)
    }

    fn generate_implicit_parameters(&self, component: &mut Component) -> Result<()> {
        if component.get("VERSION").is_none() {
            component.add_with_behavior(ContentLine::new("VERSION", self.version_string()))?;
        }
        Ok(())
    }
}

/// Opaque vCard property, grouped lines allowed.
#[derive(Debug)]
pub struct VCardBehavior {
    name: &'static str,
}

pub static GEO: VCardBehavior = VCardBehavior { name: "GEO" };

impl Behavior for VCardBehavior {
    fn name(&self) -> &'static str {
        self.name
    }

    fn allow_group(&self) -> bool {
        true
    }
}

#[derive(Debug)]
pub struct NameBehavior;

pub static NAME: NameBehavior = NameBehavior;

impl Behavior for NameBehavior {
    fn name(&self) -> &'static str {
        "N"
    }

    fn allow_group(&self) -> bool {
        true
    }

    fn has_native(&self) -> bool {
        true
    }

    fn transform_to_native(&self, node: &mut Node) -> Result<()> {
        let Node::Line(line) = node else {
            return Ok(());
        };
        let mut fields = split_fields(line.value_text()).into_iter();
        line.value = Value::Name(Name {
            family: field(&mut fields),
            given: field(&mut fields),
            additional: field(&mut fields),
            prefix: field(&mut fields),
            suffix: field(&mut fields),
        });
        line.is_native = true;
        Ok(())
    }

    fn transform_from_native(&self, node: &mut Node) -> Result<()> {
        let Node::Line(line) = node else {
            return Ok(());
        };
        line.is_native = false;
        if let Value::Name(name) = &line.value {
            let fields = [
                name.family.clone(),
                name.given.clone(),
                name.additional.clone(),
                name.prefix.clone(),
                name.suffix.clone(),
            ];
            line.value = Value::Text(serialize_fields(&fields));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct AddressBehavior;

pub static ADDRESS: AddressBehavior = AddressBehavior;

impl Behavior for AddressBehavior {
    fn name(&self) -> &'static str {
        "ADR"
    }

    fn allow_group(&self) -> bool {
        true
    }

    fn has_native(&self) -> bool {
        true
    }

    fn transform_to_native(&self, node: &mut Node) -> Result<()> {
        let Node::Line(line) = node else {
            return Ok(());
        };
        let mut fields = split_fields(line.value_text()).into_iter();
        line.value = Value::Address(Address {
            po_box: field(&mut fields),
            extended: field(&mut fields),
            street: field(&mut fields),
            city: field(&mut fields),
            region: field(&mut fields),
            code: field(&mut fields),
            country: field(&mut fields),
        });
        line.is_native = true;
        Ok(())
    }

    fn transform_from_native(&self, node: &mut Node) -> Result<()> {
        let Node::Line(line) = node else {
            return Ok(());
        };
        line.is_native = false;
        if let Value::Address(adr) = &line.value {
            let fields = [
                adr.po_box.clone(),
                adr.extended.clone(),
                adr.street.clone(),
                adr.city.clone(),
                adr.region.clone(),
                adr.code.clone(),
                adr.country.clone(),
            ];
            line.value = Value::Text(serialize_fields(&fields));
        }
        Ok(())
    }
}

/// ORG: organization name plus sub-organization units.
#[derive(Debug)]
pub struct OrgBehavior;

pub static ORG: OrgBehavior = OrgBehavior;

impl Behavior for OrgBehavior {
    fn name(&self) -> &'static str {
        "ORG"
    }

    fn allow_group(&self) -> bool {
        true
    }

    fn has_native(&self) -> bool {
        true
    }

    fn transform_to_native(&self, node: &mut Node) -> Result<()> {
        let Node::Line(line) = node else {
            return Ok(());
        };
        line.value = Value::Structured(split_fields(line.value_text()));
        line.is_native = true;
        Ok(())
    }

    fn transform_from_native(&self, node: &mut Node) -> Result<()> {
        let Node::Line(line) = node else {
            return Ok(());
        };
        line.is_native = false;
        if let Value::Structured(fields) = &line.value {
            line.value = Value::Text(serialize_fields(fields));
        }
        Ok(())
    }
}

pub(crate) fn register_builtin(map: &mut RegistryMap) {
    insert_into(map, &VCARD, None, true, None);
    insert_into(map, &VCARD_TEXT, Some("FN"), false, None);
    insert_into(map, &VCARD_TEXT, Some("LABEL"), false, None);
    insert_into(map, &PHOTO, Some("PHOTO"), false, None);
    insert_into(map, &GEO, Some("GEO"), false, None);
    insert_into(map, &NAME, Some("N"), false, None);
    insert_into(map, &ADDRESS, Some("ADR"), false, None);
    insert_into(map, &ORG, Some("ORG"), false, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{ReadOptions, read_one};

    fn card(body: &str) -> Component {
        let text = format!("BEGIN:VCARD\r\nVERSION:3.0\r\n{body}END:VCARD\r\n");
        read_one(&text, ReadOptions::default()).unwrap()
    }

    #[test]
    fn n_becomes_structured_name() {
        let card = card("FN:John Q. Public\r\nN:Public;John;Quinlan;Mr.;Esq.\r\n");
        let Value::Name(name) = &card.get("N").unwrap().value else {
            panic!("expected a Name value");
        };
        assert_eq!(name.family, vec!["Public"]);
        assert_eq!(name.given, vec!["John"]);
        assert_eq!(name.to_string(), "Mr. John Quinlan Public Esq.");
    }

    #[test]
    fn adr_becomes_structured_address() {
        let card = card(
            "FN:Jane Doe\r\nN:Doe;Jane\r\n\
             ADR;TYPE=HOME:;;123 Main Street;Any Town;CA;91921-1234;USA\r\n",
        );
        let Value::Address(adr) = &card.get("ADR").unwrap().value else {
            panic!("expected an Address value");
        };
        assert!(adr.po_box.is_empty());
        assert_eq!(adr.street, vec!["123 Main Street"]);
        assert_eq!(
            adr.to_string(),
            "123 Main Street\nAny Town, CA 91921-1234\nUSA"
        );
    }

    #[test]
    fn org_keeps_units() {
        let card = card("FN:X\r\nN:X\r\nORG:Example Corp;Research;Widgets\\, Ltd.\r\n");
        assert_eq!(
            card.get("ORG").unwrap().value,
            Value::Structured(vec![
                vec!["Example Corp".to_owned()],
                vec!["Research".to_owned()],
                vec!["Widgets, Ltd.".to_owned()],
            ])
        );
    }

    #[test]
    fn split_and_serialize_invert() {
        let fields = split_fields("Doe;Jane;Anne,Marie;;PhD\\,MD");
        assert_eq!(fields[2], vec!["Anne", "Marie"]);
        assert_eq!(fields[3], Vec::<String>::new());
        assert_eq!(fields[4], vec!["PhD,MD"]);
        assert_eq!(serialize_fields(&fields), "Doe;Jane;Anne,Marie;;PhD\\,MD");
    }

    #[test]
    fn apple_base64_singleton_is_absorbed() {
        let card = card("FN:P\r\nN:P\r\nPHOTO;BASE64;TYPE=JPEG:aGVsbG8=\r\n");
        let photo = card.get("PHOTO").unwrap();
        assert_eq!(photo.value, Value::Binary(b"hello".to_vec()));
        assert_eq!(photo.param("ENCODING"), Some("B"));
        assert!(photo.singleton_params.is_empty());
    }

    #[test]
    fn grouped_lines_are_allowed() {
        let card = card("FN:G\r\nN:G\r\nitem1.ADR:;;1 Infinite Loop;Cupertino;CA;95014\r\n");
        let adr = card.get("ADR").unwrap();
        assert_eq!(adr.group.as_deref(), Some("item1"));
    }

    #[test]
    fn implicit_version() {
        let mut empty = Component::new("VCARD");
        empty.set_behavior(&VCARD).unwrap();
        VCARD.generate_implicit_parameters(&mut empty).unwrap();
        assert_eq!(empty.get_text("VERSION"), Some("3.0"));
    }
}
