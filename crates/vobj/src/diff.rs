//! Pairwise comparison of two calendars, the library half of an ics-diff
//! tool.

use crate::behavior;
use crate::core::component::{Component, Node};
use crate::core::value::Value;

/// One mismatch: the differing pieces of a component on each side. `None`
/// means the component only exists on the other side.
pub type DiffPair = (Option<Component>, Option<Component>);

/// Compares the VEVENTs and VTODOs of two VCALENDARs, pairing them up by
/// (UID, SEQUENCE, RECURRENCE-ID) and reporting only the children that
/// differ. Repeated lines of the same name compare in original order.
#[must_use]
pub fn diff(left: &Component, right: &Component) -> Vec<DiffPair> {
    let mut output = Vec::new();
    for kind in ["VEVENT", "VTODO"] {
        process_component_lists(
            &sorted_by_uid(left, kind),
            &sorted_by_uid(right, kind),
            &mut output,
        );
    }
    output
}

/// Strips details that two otherwise-equal calendars legitimately disagree
/// on: `X-VOBJ-ORIGINAL-TZID` parameters and, optionally, DTSTAMP lines.
pub fn delete_extraneous(component: &mut Component, ignore_dtstamp: bool) {
    for node in component.children_mut() {
        match node {
            Node::Component(child) => delete_extraneous(child, ignore_dtstamp),
            Node::Line(line) => {
                line.remove_param("X-VOBJ-ORIGINAL-TZID");
            }
        }
    }
    if ignore_dtstamp {
        component.remove_all("DTSTAMP");
    }
}

/// UID, then zero-padded SEQUENCE, then RECURRENCE-ID (date-less
/// components sort first).
fn sort_key(component: &Component) -> String {
    let uid = component.get_text("UID").unwrap_or_default();
    let sequence = component
        .get_text("SEQUENCE")
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0);
    let recurrence_id = component.get("RECURRENCE-ID").map_or_else(
        || "0000-00-00".to_owned(),
        |line| match &line.value {
            Value::DateTime(dt) => dt.naive_local().to_string(),
            Value::Date(date) => date.to_string(),
            _ => line.value_text().to_owned(),
        },
    );
    format!("{uid}{sequence:05}{recurrence_id}")
}

fn sorted_by_uid<'a>(calendar: &'a Component, kind: &str) -> Vec<&'a Component> {
    let mut components: Vec<&Component> = calendar.components(kind).collect();
    components.sort_by_key(|c| sort_key(c));
    components
}

/// Merge walk over two sorted lists; unmatched entries pair with `None`,
/// matched entries get a field-level comparison.
fn process_component_lists(
    left_list: &[&Component],
    right_list: &[&Component],
    output: &mut Vec<DiffPair>,
) {
    let mut right_index = 0;
    for left in left_list {
        let left_key = sort_key(left);
        while right_index < right_list.len() && sort_key(right_list[right_index]) < left_key {
            output.push((None, Some(right_list[right_index].clone())));
            right_index += 1;
        }
        if right_index < right_list.len() && sort_key(right_list[right_index]) == left_key {
            let right = right_list[right_index];
            right_index += 1;
            if let Some(pair) = process_component_pair(left, right) {
                output.push(pair);
            }
        } else {
            output.push((Some((*left).clone()), None));
        }
    }
    while right_index < right_list.len() {
        output.push((None, Some(right_list[right_index].clone())));
        right_index += 1;
    }
}

/// `None` on a full match, otherwise a skeleton pair holding the UID and
/// every child that differs.
fn process_component_pair(left: &Component, right: &Component) -> Option<DiffPair> {
    let mut left_out = skeleton(left);
    let mut right_out = skeleton(left);
    let mut differs = false;

    for (key, left_nodes) in &left.contents {
        let right_nodes = right.get_all(key);
        if left_nodes.first().is_some_and(|n| n.as_component().is_some()) {
            let left_children: Vec<&Component> =
                left_nodes.iter().filter_map(Node::as_component).collect();
            let right_children: Vec<&Component> =
                right_nodes.iter().filter_map(Node::as_component).collect();
            let mut pairs = Vec::new();
            process_component_lists(&left_children, &right_children, &mut pairs);
            if !pairs.is_empty() {
                differs = true;
                for (l, r) in pairs {
                    if let Some(l) = l {
                        left_out.add(l);
                    }
                    if let Some(r) = r {
                        right_out.add(r);
                    }
                }
            }
        } else if left_nodes.as_slice() != right_nodes {
            differs = true;
            left_out.contents.insert(key.clone(), left_nodes.clone());
            if !right_nodes.is_empty() {
                right_out
                    .contents
                    .insert(key.clone(), right_nodes.to_vec());
            }
        }
    }
    for (key, right_nodes) in &right.contents {
        if !left.contents.contains_key(key) {
            differs = true;
            right_out.contents.insert(key.clone(), right_nodes.clone());
        }
    }

    if differs {
        Some((Some(left_out), Some(right_out)))
    } else {
        None
    }
}

/// An empty component of the same kind, carrying just the UID.
fn skeleton(model: &Component) -> Component {
    let mut out = match behavior::new_from_behavior(&model.name, None) {
        Ok(Node::Component(component)) => component,
        _ => Component::new(&model.name),
    };
    if let Some(uid) = model.get("UID") {
        out.add(uid.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{ReadOptions, read_one};

    fn calendar(events: &str) -> Component {
        let text = format!("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n{events}END:VCALENDAR\r\n");
        read_one(&text, ReadOptions::default()).unwrap()
    }

    fn event(uid: &str, summary: &str) -> String {
        format!(
            "BEGIN:VEVENT\r\nUID:{uid}\r\nDTSTAMP:20260101T000000Z\r\n\
             DTSTART:20260105T170000Z\r\nSUMMARY:{summary}\r\nEND:VEVENT\r\n"
        )
    }

    #[test]
    fn identical_calendars_are_empty_diff() {
        let left = calendar(&event("a@example.com", "Same"));
        let right = calendar(&event("a@example.com", "Same"));
        assert!(diff(&left, &right).is_empty());
    }

    #[test]
    fn changed_summary_pairs_up() {
        let left = calendar(&event("a@example.com", "Before"));
        let right = calendar(&event("a@example.com", "After"));
        let pairs = diff(&left, &right);
        assert_eq!(pairs.len(), 1);
        let (Some(l), Some(r)) = &pairs[0] else {
            panic!("expected a pair with both sides");
        };
        assert_eq!(l.get_text("UID"), Some("a@example.com"));
        assert_eq!(l.get_text("SUMMARY"), Some("Before"));
        assert_eq!(r.get_text("SUMMARY"), Some("After"));
        // matching children are not repeated
        assert!(l.get("DTSTART").is_none());
    }

    #[test]
    fn missing_event_pairs_with_none() {
        let left = calendar(&format!(
            "{}{}",
            event("a@example.com", "Kept"),
            event("b@example.com", "Removed")
        ));
        let right = calendar(&event("a@example.com", "Kept"));
        let pairs = diff(&left, &right);
        assert_eq!(pairs.len(), 1);
        let (Some(l), None) = &pairs[0] else {
            panic!("expected a left-only pair");
        };
        assert_eq!(l.get_text("UID"), Some("b@example.com"));
    }

    #[test]
    fn dtstamp_ignored_after_delete_extraneous() {
        let mut left = calendar(&event("a@example.com", "Same"));
        let mut right = calendar(
            "BEGIN:VEVENT\r\nUID:a@example.com\r\nDTSTAMP:20261231T000000Z\r\n\
             DTSTART:20260105T170000Z\r\nSUMMARY:Same\r\nEND:VEVENT\r\n",
        );
        delete_extraneous(&mut left, true);
        delete_extraneous(&mut right, true);
        assert!(diff(&left, &right).is_empty());
    }
}
