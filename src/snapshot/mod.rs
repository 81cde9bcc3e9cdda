// Per-frame binding snapshots for the step tracer

use crate::memory::stack::FrameId;
use crate::memory::value::{Namespace, Value};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;

/// Name -> value view of one frame's locals at a point in time
pub type Bindings = IndexMap<String, Value>;

/// Copy a namespace so later mutation by the program cannot alter it
///
/// Aliasing between bindings is preserved: two names bound to the same list
/// still share one copy.
pub fn capture(namespace: &Namespace) -> Bindings {
    let Ok(names) = namespace.try_borrow() else {
        return Bindings::new();
    };
    let mut memo = FxHashMap::default();
    names
        .iter()
        .map(|(name, value)| (name.clone(), value.deep_copy_with(&mut memo, 0)))
        .collect()
}

/// Last observed bindings of every live traced frame
///
/// Entries are created on frame entry and dropped on frame exit. Frame ids
/// are never reused within a run, so a stale entry can never be mistaken
/// for a new frame's.
#[derive(Debug, Default)]
pub struct FrameSnapshots {
    snapshots: FxHashMap<FrameId, Bindings>,
}

impl FrameSnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the snapshot for `frame`, returning the one it replaces
    pub fn replace(&mut self, frame: FrameId, bindings: Bindings) -> Option<Bindings> {
        self.snapshots.insert(frame, bindings)
    }

    pub fn get(&self, frame: FrameId) -> Option<&Bindings> {
        self.snapshots.get(&frame)
    }

    /// Forget a frame that has ended
    pub fn remove(&mut self, frame: FrameId) -> Option<Bindings> {
        self.snapshots.remove(&frame)
    }

    /// Number of frames currently tracked
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::value::new_namespace;

    #[test]
    fn test_capture_is_independent() {
        let namespace = new_namespace();
        let items = Value::list(vec![Value::Int(1)]);
        namespace.borrow_mut().insert("items".to_string(), items.clone());
        namespace.borrow_mut().insert("alias".to_string(), items.clone());

        let snapshot = capture(&namespace);
        if let Value::List(list) = &items {
            list.borrow_mut().push(Value::Int(2));
        }

        let (Value::List(copy), Value::List(alias)) = (&snapshot["items"], &snapshot["alias"]) else {
            panic!("expected lists");
        };
        assert_eq!(copy.borrow().len(), 1);
        assert!(std::rc::Rc::ptr_eq(copy, alias));
    }

    #[test]
    fn test_frame_lifecycle() {
        let mut snapshots = FrameSnapshots::new();
        assert!(snapshots.replace(FrameId(1), Bindings::new()).is_none());
        assert!(snapshots.replace(FrameId(1), Bindings::new()).is_some());
        snapshots.replace(FrameId(2), Bindings::new());
        assert_eq!(snapshots.len(), 2);

        assert!(snapshots.remove(FrameId(1)).is_some());
        assert!(snapshots.get(FrameId(1)).is_none());
        assert!(snapshots.get(FrameId(2)).is_some());
        snapshots.clear();
        assert!(snapshots.is_empty());
    }
}
