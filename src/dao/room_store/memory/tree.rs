//! Helpers manipulating the JSON tree backing the in-memory store.
//!
//! Like most realtime trees, `null` and empty objects are never stored: writing
//! one removes the node, and parents left empty disappear with it.

use serde_json::{Map, Value};

/// Borrow the node stored at `segments`, if any.
pub(super) fn value_at<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments {
        node = node.as_object()?.get(segment)?;
    }
    if is_empty(node) { None } else { Some(node) }
}

/// Clone the node stored at `segments` for delivery to a caller.
pub(super) fn snapshot_at(root: &Value, segments: &[String]) -> Option<Value> {
    value_at(root, segments).cloned()
}

/// Replace (or remove, when `value` is `None`) the node at `segments`.
pub(super) fn write_at(node: &mut Value, segments: &[String], value: Option<Value>) {
    let Some((head, rest)) = segments.split_first() else {
        *node = normalize(value).unwrap_or(Value::Null);
        return;
    };

    if !node.is_object() {
        if value.is_none() {
            return;
        }
        *node = Value::Object(Map::new());
    }

    let Value::Object(children) = node else {
        return;
    };
    let child = children.entry(head.clone()).or_insert(Value::Null);
    write_at(child, rest, value);
    if is_empty(child) {
        children.remove(head);
    }
}

fn is_empty(node: &Value) -> bool {
    match node {
        Value::Null => true,
        Value::Object(children) => children.is_empty(),
        _ => false,
    }
}

/// Strip nulls and empty objects recursively.
fn normalize(value: Option<Value>) -> Option<Value> {
    match value? {
        Value::Null => None,
        Value::Object(children) => {
            let cleaned: Map<String, Value> = children
                .into_iter()
                .filter_map(|(key, child)| normalize(Some(child)).map(|child| (key, child)))
                .collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(Value::Object(cleaned))
            }
        }
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn segs(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn write_creates_intermediate_nodes() {
        let mut root = Value::Null;
        write_at(&mut root, &segs(&["rooms", "r1", "locked"]), Some(json!(false)));
        assert_eq!(
            value_at(&root, &segs(&["rooms", "r1", "locked"])),
            Some(&json!(false))
        );
    }

    #[test]
    fn removing_last_child_prunes_parents() {
        let mut root = Value::Null;
        write_at(&mut root, &segs(&["a", "b", "c"]), Some(json!(1)));
        write_at(&mut root, &segs(&["a", "b", "c"]), None);
        assert!(value_at(&root, &segs(&["a"])).is_none());
    }

    #[test]
    fn empty_objects_are_not_stored() {
        let mut root = Value::Null;
        write_at(&mut root, &segs(&["rooms", "r1", "blockList"]), Some(json!({})));
        assert!(value_at(&root, &segs(&["rooms", "r1"])).is_none());

        write_at(
            &mut root,
            &segs(&["x"]),
            Some(json!({"keep": 1, "drop": null, "nested": {}})),
        );
        assert_eq!(value_at(&root, &segs(&["x"])), Some(&json!({"keep": 1})));
    }
}
