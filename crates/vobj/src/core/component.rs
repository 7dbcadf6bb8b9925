use std::collections::BTreeMap;

use crate::behavior::{self, Behavior};
use crate::core::contentline::ContentLine;
use crate::core::value::Value;
use crate::error::{Result, VObjectError};

/// Either shape a component may contain.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Line(ContentLine),
    Component(Component),
}

impl Node {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Line(line) => &line.name,
            Self::Component(component) => &component.name,
        }
    }

    #[must_use]
    pub fn group(&self) -> Option<&str> {
        match self {
            Self::Line(line) => line.group.as_deref(),
            Self::Component(component) => component.group.as_deref(),
        }
    }

    #[must_use]
    pub fn behavior(&self) -> Option<&'static dyn Behavior> {
        match self {
            Self::Line(line) => line.behavior,
            Self::Component(component) => component.behavior,
        }
    }

    #[must_use]
    pub fn parent_behavior(&self) -> Option<&'static dyn Behavior> {
        match self {
            Self::Line(line) => line.parent_behavior,
            Self::Component(component) => component.parent_behavior,
        }
    }

    pub fn set_parent_behavior(&mut self, behavior: Option<&'static dyn Behavior>) {
        match self {
            Self::Line(line) => line.parent_behavior = behavior,
            Self::Component(component) => component.parent_behavior = behavior,
        }
    }

    #[must_use]
    pub fn is_native(&self) -> bool {
        match self {
            Self::Line(line) => line.is_native,
            Self::Component(component) => component.is_native,
        }
    }

    #[must_use]
    pub fn as_line(&self) -> Option<&ContentLine> {
        match self {
            Self::Line(line) => Some(line),
            Self::Component(_) => None,
        }
    }

    #[must_use]
    pub fn as_component(&self) -> Option<&Component> {
        match self {
            Self::Component(component) => Some(component),
            Self::Line(_) => None,
        }
    }

    #[must_use]
    pub fn as_component_mut(&mut self) -> Option<&mut Component> {
        match self {
            Self::Component(component) => Some(component),
            Self::Line(_) => None,
        }
    }

    /// Binds a behavior to this node and, when cascading, re-derives the
    /// behaviors of every child from the new parent's known-children table.
    pub fn set_behavior(&mut self, behavior: &'static dyn Behavior, cascade: bool) -> Result<()> {
        match self {
            Self::Line(line) => line.behavior = Some(behavior),
            Self::Component(component) => {
                if cascade {
                    component.set_behavior(behavior)?;
                } else {
                    component.behavior = Some(behavior);
                }
            }
        }
        Ok(())
    }

    /// Derives this node's behavior from its parent's known-children table,
    /// falling back to the parent's default behavior for unknown lines.
    /// Decodes transport encodings once a behavior is in place.
    pub fn auto_behavior(&mut self, cascade: bool) -> Result<()> {
        let Some(parent) = self.parent_behavior() else {
            return Ok(());
        };
        let known = parent
            .known_children()
            .iter()
            .find(|child| child.name == self.name());
        if let Some(known) = known {
            if let Some(behavior) = behavior::get_behavior(self.name(), known.id) {
                self.set_behavior(behavior, cascade)?;
                if let Self::Line(line) = self
                    && line.encoded
                {
                    behavior.decode(line)?;
                }
            }
        } else if let Self::Line(line) = self {
            line.behavior = parent.default_behavior();
            if line.encoded
                && let Some(behavior) = line.behavior
            {
                behavior.decode(line)?;
            }
        }
        Ok(())
    }

    /// Replaces the value with its decoded, typed form. No-op when already
    /// native or when no behavior with a native form is bound.
    pub fn transform_to_native(&mut self) -> Result<()> {
        let Some(behavior) = self.behavior() else {
            return Ok(());
        };
        if self.is_native() || !behavior.has_native() {
            return Ok(());
        }
        behavior.transform_to_native(self).map_err(|e| match e {
            VObjectError::Native { .. } => e,
            other => {
                let line = match self {
                    Self::Line(l) => l.line_number,
                    Self::Component(_) => None,
                };
                VObjectError::Native {
                    msg: other.to_string(),
                    line,
                }
            }
        })
    }

    /// Inverse of [`Node::transform_to_native`].
    pub fn transform_from_native(&mut self) -> Result<()> {
        let Some(behavior) = self.behavior() else {
            return Ok(());
        };
        if !self.is_native() || !behavior.has_native() {
            return Ok(());
        }
        behavior.transform_from_native(self)
    }

    /// Validates this node with its bound behavior, then recurses.
    pub fn validate(&self) -> Result<()> {
        if let Some(behavior) = self.behavior() {
            behavior.validate(self)?;
        } else if let Self::Component(component) = self {
            for child in component.children() {
                child.validate()?;
            }
        }
        Ok(())
    }
}

impl From<ContentLine> for Node {
    fn from(line: ContentLine) -> Self {
        Self::Line(line)
    }
}

impl From<Component> for Node {
    fn from(component: Component) -> Self {
        Self::Component(component)
    }
}

/// A node with children: a `BEGIN:NAME ... END:NAME` block, or a nameless
/// top-level container for formats that use `PROFILE` instead.
///
/// Children are kept in a map from uppercased name to the ordered list of
/// nodes carrying that name.
#[derive(Debug, Clone, Default)]
pub struct Component {
    pub name: String,
    pub group: Option<String>,
    pub use_begin: bool,
    pub contents: BTreeMap<String, Vec<Node>>,
    pub is_native: bool,
    pub behavior: Option<&'static dyn Behavior>,
    pub parent_behavior: Option<&'static dyn Behavior>,
}

impl Component {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            use_begin: true,
            ..Self::default()
        }
    }

    /// A container with no name yet; it prints neither BEGIN/END nor
    /// PROFILE until one is assigned.
    #[must_use]
    pub fn unnamed() -> Self {
        Self::default()
    }

    /// Assigns a profile name to a container that has no BEGIN line.
    /// Re-assigning the same name is a no-op; a different name is an error.
    pub fn set_profile(&mut self, name: &str) -> Result<()> {
        let name = name.to_uppercase();
        if self.use_begin || (!self.name.is_empty() && self.name != name) {
            return Err(VObjectError::validate(format!(
                "This component already has a PROFILE or uses BEGIN, {name} not allowed"
            )));
        }
        self.name = name;
        Ok(())
    }

    pub fn add(&mut self, node: impl Into<Node>) -> &mut Node {
        let node = node.into();
        let key = node.name().to_uppercase();
        let nodes = self.contents.entry(key).or_default();
        nodes.push(node);
        #[expect(clippy::unwrap_used, reason = "pushed one element above")]
        nodes.last_mut().unwrap()
    }

    /// Adds a child and immediately binds its behavior from this
    /// component's behavior table.
    pub fn add_with_behavior(&mut self, node: impl Into<Node>) -> Result<&mut Node> {
        let parent = self.behavior;
        let node = self.add(node);
        node.set_parent_behavior(parent);
        node.auto_behavior(false)?;
        Ok(node)
    }

    /// Removes the first child carrying `name`, if any.
    pub fn remove(&mut self, name: &str) -> Option<Node> {
        self.remove_at(name, 0)
    }

    /// Removes the `index`-th child carrying `name`, so one of several
    /// same-named children can be targeted.
    pub fn remove_at(&mut self, name: &str, index: usize) -> Option<Node> {
        let key = name.to_uppercase();
        let nodes = self.contents.get_mut(&key)?;
        if index >= nodes.len() {
            return None;
        }
        let node = nodes.remove(index);
        if nodes.is_empty() {
            self.contents.remove(&key);
        }
        Some(node)
    }

    /// Removes every child carrying `name`.
    pub fn remove_all(&mut self, name: &str) -> Vec<Node> {
        self.contents.remove(&name.to_uppercase()).unwrap_or_default()
    }

    /// The first property line named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ContentLine> {
        self.get_all(name).iter().find_map(|node| node.as_line())
    }

    #[must_use]
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ContentLine> {
        self.contents
            .get_mut(&name.to_uppercase())?
            .iter_mut()
            .find_map(|node| match node {
                Node::Line(line) => Some(line),
                Node::Component(_) => None,
            })
    }

    /// All children named `name`, lines and components alike.
    #[must_use]
    pub fn get_all(&self, name: &str) -> &[Node] {
        self.contents
            .get(&name.to_uppercase())
            .map_or(&[], Vec::as_slice)
    }

    /// The value of the first property line named `name`.
    #[must_use]
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.get(name).map(|line| &line.value)
    }

    /// The raw text of the first property line named `name`.
    #[must_use]
    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).map(ContentLine::value_text)
    }

    /// The first sub-component named `name`.
    #[must_use]
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.get_all(name).iter().find_map(Node::as_component)
    }

    pub fn components(&self, name: &str) -> impl Iterator<Item = &Component> {
        self.get_all(name).iter().filter_map(Node::as_component)
    }

    /// Every child, grouped by name in sorted-key order.
    pub fn children(&self) -> impl Iterator<Item = &Node> {
        self.contents.values().flatten()
    }

    pub fn children_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.contents.values_mut().flatten()
    }

    /// Child names ordered for serialization: the behavior's `sort_first`
    /// names lead (in their given order), the rest follow alphabetically.
    #[must_use]
    pub fn sorted_keys(&self) -> Vec<String> {
        let sort_first = self.behavior.map_or(&[][..], |b| b.sort_first());
        let mut keys: Vec<String> = sort_first
            .iter()
            .map(|name| name.to_uppercase())
            .filter(|name| self.contents.contains_key(name))
            .collect();
        for key in self.contents.keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        // BTreeMap iteration already yields the remainder alphabetically.
        keys
    }

    /// Binds a behavior to this component and cascades it to all children.
    pub fn set_behavior(&mut self, behavior: &'static dyn Behavior) -> Result<()> {
        self.behavior = Some(behavior);
        for child in self.children_mut() {
            child.set_parent_behavior(Some(behavior));
            child.auto_behavior(true)?;
        }
        Ok(())
    }

    /// Binds behaviors across the tree from a VERSION property value.
    pub fn set_behavior_from_version(&mut self, version: &str) -> Result<()> {
        if let Some(b) = behavior::get_behavior(&self.name, Some(version)) {
            self.set_behavior(b)?;
        }
        Ok(())
    }

    /// Decodes every child into its native form, depth first, in sorted
    /// key order so that intra-component dependencies (DTSTART before
    /// RRULE, TZID before observances) resolve correctly.
    pub fn transform_children_to_native(&mut self) -> Result<()> {
        for key in self.sorted_keys() {
            let Some(mut nodes) = self.contents.remove(&key) else {
                continue;
            };
            let result: Result<()> = nodes.iter_mut().try_for_each(|node| {
                node.transform_to_native()?;
                if let Node::Component(child) = node {
                    child.transform_children_to_native()?;
                }
                Ok(())
            });
            self.contents.insert(key, nodes);
            result?;
        }
        Ok(())
    }

    /// Inverse of [`Component::transform_children_to_native`].
    pub fn transform_children_from_native(&mut self) -> Result<()> {
        for nodes in self.contents.values_mut() {
            for node in nodes {
                node.transform_from_native()?;
                if let Node::Component(child) = node {
                    child.transform_children_from_native()?;
                }
            }
        }
        Ok(())
    }

    /// Serializes this component, generating implicit parameters in place
    /// first so repeated serialization is stable.
    pub fn serialize(&mut self) -> Result<String> {
        self.serialize_with_line_length(crate::build::FOLD_WIDTH)
    }

    /// [`Component::serialize`] with a physical line budget other than the
    /// RFC's 75 bytes.
    pub fn serialize_with_line_length(&mut self, line_length: usize) -> Result<String> {
        let mut node = Node::Component(std::mem::take(self));
        let result = crate::build::write_with_line_length(&mut node, line_length);
        *self = match node {
            Node::Component(c) => c,
            Node::Line(_) => Component::default(),
        };
        result
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.group == other.group && self.contents == other.contents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_get_remove() {
        let mut card = Component::new("vcard");
        card.add(ContentLine::new("FN", "Jeffrey Harris"));
        card.add(ContentLine::new("EMAIL", "a@example.com"));
        card.add(ContentLine::new("EMAIL", "b@example.com"));

        assert_eq!(card.name, "VCARD");
        assert_eq!(card.get_text("fn"), Some("Jeffrey Harris"));
        assert_eq!(card.get_all("email").len(), 2);

        let removed = card.remove("email");
        assert!(removed.is_some());
        assert_eq!(card.get_all("EMAIL").len(), 1);
        assert_eq!(card.get_text("EMAIL"), Some("b@example.com"));
    }

    #[test]
    fn remove_at_targets_one_of_several() {
        let mut card = Component::new("vcard");
        card.add(ContentLine::new("EMAIL", "a@example.com"));
        card.add(ContentLine::new("EMAIL", "b@example.com"));
        card.add(ContentLine::new("EMAIL", "c@example.com"));

        let removed = card.remove_at("email", 1).unwrap();
        assert_eq!(removed.as_line().map(ContentLine::value_text), Some("b@example.com"));
        assert_eq!(card.get_all("EMAIL").len(), 2);
        assert!(card.remove_at("email", 5).is_none());
    }

    #[test]
    fn set_profile_rejected_with_begin() {
        let mut c = Component::new("VCALENDAR");
        assert!(c.set_profile("VCARD").is_err());

        let mut unnamed = Component::unnamed();
        unnamed.set_profile("vcard").ok();
        assert_eq!(unnamed.name, "VCARD");

        // the same name again is fine; a different one is not
        assert!(unnamed.set_profile("VCARD").is_ok());
        assert!(unnamed.set_profile("OTHER").is_err());
        assert_eq!(unnamed.name, "VCARD");
    }

    #[test]
    fn sorted_keys_alphabetical_without_behavior() {
        let mut c = Component::new("X");
        c.add(ContentLine::new("ZEBRA", "1"));
        c.add(ContentLine::new("ALPHA", "2"));
        assert_eq!(c.sorted_keys(), vec!["ALPHA", "ZEBRA"]);
    }
}
