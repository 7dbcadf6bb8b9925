use std::collections::HashMap;
use std::sync::{LazyLock, PoisonError, RwLock};

use crate::core::component::{Component, Node};
use crate::core::contentline::ContentLine;
use crate::error::{Result, VObjectError};

/// Cardinality entry for a component behavior's expected children.
#[derive(Debug, Clone, Copy)]
pub struct KnownChild {
    pub name: &'static str,
    pub min: u32,
    pub max: Option<u32>,
    /// Version id used to pick the child's behavior from the registry.
    pub id: Option<&'static str>,
}

impl KnownChild {
    #[must_use]
    pub const fn new(name: &'static str, min: u32, max: Option<u32>) -> Self {
        Self {
            name,
            min,
            max,
            id: None,
        }
    }

    #[must_use]
    pub const fn with_id(
        name: &'static str,
        min: u32,
        max: Option<u32>,
        id: &'static str,
    ) -> Self {
        Self {
            name,
            min,
            max,
            id: Some(id),
        }
    }
}

/// Per-name parsing, validation, and serialization rules.
///
/// A behavior never holds data about a particular line or component; it is
/// attached by reference and consulted for every operation that depends on
/// what the name means in the bound profile and version.
pub trait Behavior: Sync + Send + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// The VERSION value this behavior implements, e.g. `2.0`.
    fn version_string(&self) -> &'static str {
        ""
    }

    fn is_component(&self) -> bool {
        false
    }

    /// Whether `transform_to_native` yields something other than text.
    fn has_native(&self) -> bool {
        false
    }

    /// Whether date-time values under this behavior must serialize as UTC.
    fn force_utc(&self) -> bool {
        false
    }

    fn allow_group(&self) -> bool {
        false
    }

    /// Child names serialized ahead of the alphabetical remainder.
    fn sort_first(&self) -> &'static [&'static str] {
        &[]
    }

    fn known_children(&self) -> &'static [KnownChild] {
        &[]
    }

    /// Whether serialized lines get folded at the 75-byte limit. PHOTO
    /// turns this off, as Apple's Address Book chokes on wrapped base64.
    fn fold(&self) -> bool {
        true
    }

    /// Behavior for child lines not covered by `known_children`.
    fn default_behavior(&self) -> Option<&'static dyn Behavior> {
        None
    }

    /// Structural validation. The default checks the group rule and the
    /// known-children cardinalities, recursing into children.
    fn validate(&self, node: &Node) -> Result<()> {
        validate_structure(self, node)
    }

    /// Removes a transport encoding from the raw value.
    fn decode(&self, line: &mut ContentLine) -> Result<()> {
        line.encoded = false;
        Ok(())
    }

    /// Applies a transport encoding to the raw value.
    fn encode(&self, line: &mut ContentLine) -> Result<()> {
        line.encoded = true;
        Ok(())
    }

    /// Replaces a textual value with its typed form.
    fn transform_to_native(&self, _node: &mut Node) -> Result<()> {
        Ok(())
    }

    /// Replaces a typed value with its textual form.
    fn transform_from_native(&self, _node: &mut Node) -> Result<()> {
        Ok(())
    }

    /// Inserts properties and parameters the profile requires but the
    /// caller did not supply. Must be idempotent.
    fn generate_implicit_parameters(&self, _component: &mut Component) -> Result<()> {
        Ok(())
    }
}

/// Default structural validation: group rule plus known-children
/// cardinalities. Overriding behaviors call this first, then add their own
/// rules.
pub fn validate_structure<B: Behavior + ?Sized>(behavior: &B, node: &Node) -> Result<()> {
    if !behavior.allow_group() && node.group().is_some() {
        return Err(VObjectError::validate(format!(
            "{} has a group, but this object doesn't support groups",
            node.name()
        )));
    }
    if let Node::Component(component) = node {
        for child in component.children() {
            child.validate()?;
        }
        for known in behavior.known_children() {
            let count = component.get_all(known.name).len();
            if count < known.min as usize {
                return Err(VObjectError::validate(format!(
                    "{} components must contain at least {} {}",
                    behavior.name(),
                    known.min,
                    known.name
                )));
            }
            if let Some(max) = known.max
                && count > max as usize
            {
                return Err(VObjectError::validate(format!(
                    "{} components cannot contain more than {} {}",
                    behavior.name(),
                    max,
                    known.name
                )));
            }
        }
    }
    Ok(())
}

pub(crate) type RegistryMap = HashMap<String, Vec<(String, &'static dyn Behavior)>>;

static REGISTRY: LazyLock<RwLock<RegistryMap>> = LazyLock::new(|| {
    let mut map = RegistryMap::new();
    crate::ical::behaviors::register_builtin(&mut map);
    crate::vcard::register_builtin(&mut map);
    RwLock::new(map)
});

/// Inserts into a registry map directly; default registrations go to the
/// front so they win id-less lookups.
pub(crate) fn insert_into(
    map: &mut RegistryMap,
    behavior: &'static dyn Behavior,
    name: Option<&str>,
    default: bool,
    id: Option<&str>,
) {
    let name = name.unwrap_or_else(|| behavior.name()).to_uppercase();
    let id = id.unwrap_or_else(|| behavior.version_string()).to_owned();
    let entries = map.entry(name).or_default();
    if default {
        entries.insert(0, (id, behavior));
    } else {
        entries.push((id, behavior));
    }
}

/// Registers a behavior under `name` (defaults to the behavior's own name)
/// with version id `id` (defaults to its version string). A `default`
/// registration takes precedence for lookups without an id.
pub fn register_behavior(
    behavior: &'static dyn Behavior,
    name: Option<&str>,
    default: bool,
    id: Option<&str>,
) {
    let mut map = REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    insert_into(&mut map, behavior, name, default, id);
}

/// Looks up a behavior by name and optional version id. An id with no match
/// falls back to the default registration for that name.
#[must_use]
pub fn get_behavior(name: &str, id: Option<&str>) -> Option<&'static dyn Behavior> {
    let map = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    let entries = map.get(&name.to_uppercase())?;
    if let Some(id) = id
        && let Some((_, behavior)) = entries.iter().find(|(eid, _)| eid == id)
    {
        return Some(*behavior);
    }
    entries.first().map(|(_, behavior)| *behavior)
}

/// Creates an empty component or content line pre-bound to the registered
/// behavior for `name`.
pub fn new_from_behavior(name: &str, id: Option<&str>) -> Result<Node> {
    let name = name.to_uppercase();
    let behavior = get_behavior(&name, id).ok_or_else(|| {
        VObjectError::config(format!("No behavior found named {name}"))
    })?;
    let mut node = if behavior.is_component() {
        Node::Component(Component::new(&name))
    } else {
        Node::Line(ContentLine::new(&name, ""))
    };
    node.set_behavior(behavior, false)?;
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_falls_back_to_default_on_unknown_id() {
        let by_id = get_behavior("VCALENDAR", Some("2.0"));
        let fallback = get_behavior("VCALENDAR", Some("99.0"));
        assert!(by_id.is_some());
        assert!(fallback.is_some());
        assert_eq!(
            by_id.map(|b| b.version_string()),
            fallback.map(|b| b.version_string())
        );
    }

    #[test]
    fn new_from_behavior_unknown_name_errors() {
        let err = new_from_behavior("NO-SUCH-THING", None);
        assert!(matches!(err, Err(VObjectError::Config { .. })));
    }

    #[test]
    fn new_from_behavior_builds_components() {
        let node = new_from_behavior("vevent", None).ok();
        let Some(Node::Component(event)) = node else {
            panic!("expected a component");
        };
        assert_eq!(event.name, "VEVENT");
        assert!(event.behavior.is_some());
    }
}
