//! Trace event records
//!
//! Events carry rendered strings only, never runtime values, so they stay
//! valid after the executor process is gone.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One observable execution step of the traced program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    /// A function (or the module) was entered
    Call {
        line: usize,
        source_text: String,
        function_name: String,
        depth: usize,
    },
    /// A line is about to run; the binding changes since the previous event
    /// of the same frame
    Line {
        line: usize,
        source_text: String,
        depth: usize,
        locals: IndexMap<String, String>,
        added: IndexMap<String, String>,
        /// Name -> (old, new)
        updated: IndexMap<String, (String, String)>,
        removed: Vec<String>,
    },
    Return {
        line: usize,
        source_text: String,
        depth: usize,
        function_name: String,
        return_value: String,
    },
    Exception {
        line: usize,
        source_text: String,
        depth: usize,
        error_summary: String,
    },
    /// The step or time budget ran out; always the last trace event
    BudgetExceeded {
        line: usize,
        source_text: String,
        depth: usize,
        reason: String,
    },
}

impl TraceEvent {
    /// Wire tag of the event
    pub fn tag(&self) -> &'static str {
        match self {
            TraceEvent::Call { .. } => "call",
            TraceEvent::Line { .. } => "line",
            TraceEvent::Return { .. } => "return",
            TraceEvent::Exception { .. } => "exception",
            TraceEvent::BudgetExceeded { .. } => "budget_exceeded",
        }
    }

    pub fn line(&self) -> usize {
        match self {
            TraceEvent::Call { line, .. }
            | TraceEvent::Line { line, .. }
            | TraceEvent::Return { line, .. }
            | TraceEvent::Exception { line, .. }
            | TraceEvent::BudgetExceeded { line, .. } => *line,
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            TraceEvent::Call { depth, .. }
            | TraceEvent::Line { depth, .. }
            | TraceEvent::Return { depth, .. }
            | TraceEvent::Exception { depth, .. }
            | TraceEvent::BudgetExceeded { depth, .. } => *depth,
        }
    }

    /// The traced source line, without indentation
    pub fn source_text(&self) -> &str {
        match self {
            TraceEvent::Call { source_text, .. }
            | TraceEvent::Line { source_text, .. }
            | TraceEvent::Return { source_text, .. }
            | TraceEvent::Exception { source_text, .. }
            | TraceEvent::BudgetExceeded { source_text, .. } => source_text,
        }
    }

    /// True for `line` events whose bindings changed
    pub fn has_changes(&self) -> bool {
        match self {
            TraceEvent::Line {
                added,
                updated,
                removed,
                ..
            } => !(added.is_empty() && updated.is_empty() && removed.is_empty()),
            _ => false,
        }
    }

    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, TraceEvent::BudgetExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let event = TraceEvent::Line {
            line: 2,
            source_text: "x = 2".to_string(),
            depth: 0,
            locals: IndexMap::from([("x".to_string(), "1".to_string())]),
            added: IndexMap::new(),
            updated: IndexMap::from([("x".to_string(), ("1".to_string(), "2".to_string()))]),
            removed: Vec::new(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "line");
        assert_eq!(json["updated"]["x"][0], "1");
        assert_eq!(json["updated"]["x"][1], "2");

        let back: TraceEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert!(back.has_changes());
    }

    #[test]
    fn test_budget_tag() {
        let event = TraceEvent::BudgetExceeded {
            line: 1,
            source_text: "while True:".to_string(),
            depth: 0,
            reason: "step limit of 10 exceeded".to_string(),
        };
        assert_eq!(serde_json::to_value(&event).unwrap()["type"], "budget_exceeded");
        assert!(event.is_budget_exceeded());
        assert!(!event.has_changes());
    }
}
