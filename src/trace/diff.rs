// Binding-level differences between two frame snapshots

use crate::memory::value::Value;
use crate::snapshot::Bindings;

/// Names reserved by the runtime (`__name__`, ...); never reported
pub fn is_reserved(name: &str) -> bool {
    name.starts_with("__")
}

/// Changes from one snapshot to the next, in binding order
#[derive(Debug, Default)]
pub struct BindingDiff<'a> {
    pub added: Vec<(&'a str, &'a Value)>,
    /// (name, old, new)
    pub updated: Vec<(&'a str, &'a Value, &'a Value)>,
    pub removed: Vec<&'a str>,
}

impl BindingDiff<'_> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Whether a binding kept its value; a comparison that fails counts as a change
fn unchanged(old: &Value, new: &Value) -> bool {
    old.is_same(new) || matches!(old.equals(new), Ok(true))
}

/// Compare two snapshots of the same frame
pub fn diff<'a>(previous: &'a Bindings, current: &'a Bindings) -> BindingDiff<'a> {
    let mut changes = BindingDiff::default();
    for (name, value) in current {
        if is_reserved(name) {
            continue;
        }
        match previous.get(name) {
            None => changes.added.push((name, value)),
            Some(old) if !unchanged(old, value) => changes.updated.push((name, old, value)),
            Some(_) => {}
        }
    }
    for name in previous.keys() {
        if !is_reserved(name) && !current.contains_key(name) {
            changes.removed.push(name);
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, Value)]) -> Bindings {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_added_updated_removed() {
        let before = bindings(&[("a", Value::Int(1)), ("b", Value::Int(2))]);
        let after = bindings(&[("a", Value::Int(1)), ("b", Value::Int(3)), ("c", Value::None)]);
        let changes = diff(&before, &after);
        assert_eq!(changes.added.len(), 1);
        assert_eq!(changes.added[0].0, "c");
        assert_eq!(changes.updated.len(), 1);
        assert_eq!(changes.updated[0].0, "b");
        assert!(changes.removed.is_empty());

        let changes = diff(&after, &before);
        assert_eq!(changes.removed, ["c"]);
    }

    #[test]
    fn test_same_snapshot_is_empty() {
        let looped = Value::list(Vec::new());
        if let Value::List(items) = &looped {
            items.borrow_mut().push(looped.clone());
        }
        let snapshot = bindings(&[
            ("x", Value::Float(f64::NAN)),
            ("items", looped),
            ("d", Value::dict(Default::default())),
        ]);
        assert!(diff(&snapshot, &snapshot).is_empty());
    }

    #[test]
    fn test_equal_copies_are_unchanged() {
        let before = bindings(&[("items", Value::list(vec![Value::Int(1)]))]);
        let after = bindings(&[("items", Value::list(vec![Value::Int(1)]))]);
        assert!(diff(&before, &after).is_empty());

        let after = bindings(&[("items", Value::list(vec![Value::Int(1), Value::Int(2)]))]);
        assert_eq!(diff(&before, &after).updated.len(), 1);
    }

    #[test]
    fn test_incomparable_counts_as_changed() {
        let cyclic = || {
            let list = Value::list(Vec::new());
            if let Value::List(items) = &list {
                items.borrow_mut().push(list.clone());
            }
            list
        };
        let before = bindings(&[("a", cyclic())]);
        let after = bindings(&[("a", cyclic())]);
        assert_eq!(diff(&before, &after).updated.len(), 1);
    }

    #[test]
    fn test_reserved_names_ignored() {
        let before = bindings(&[("__name__", Value::str("__main__"))]);
        let after = bindings(&[("__builtins__", Value::None)]);
        assert!(diff(&before, &after).is_empty());
    }
}
