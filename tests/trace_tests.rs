// Integration tests for the step tracer

use steptrace::interpreter::errors::RuntimeError;
use steptrace::interpreter::terminal::Terminal;
use steptrace::interpreter::Interpreter;
use steptrace::parser::parse_source;
use steptrace::sandbox::TraceLimits;
use steptrace::trace::{StepTracer, TraceEvent};

fn trace_with(source: &str, limits: TraceLimits) -> (Vec<TraceEvent>, Result<(), RuntimeError>) {
    let program = parse_source(source).expect("Parsing failed");
    let mut tracer = StepTracer::new(source, &limits, Vec::new());
    let result = Interpreter::new(program, Terminal::new("", 1 << 16))
        .with_hook(&mut tracer)
        .run();
    (tracer.into_sink(), result)
}

fn trace(source: &str) -> Vec<TraceEvent> {
    let (events, result) = trace_with(source, TraceLimits::default());
    assert!(result.is_ok(), "Execution failed: {:?}", result);
    events
}

fn line_events(events: &[TraceEvent]) -> Vec<&TraceEvent> {
    events
        .iter()
        .filter(|event| matches!(event, TraceEvent::Line { .. }))
        .collect()
}

#[test]
fn test_in_place_mutation_is_an_update() {
    let events = trace("items = []\nitems.append(1)\nprint(items)\n");
    let lines = line_events(&events);
    let TraceEvent::Line { updated, added, .. } = lines[2] else {
        unreachable!()
    };
    assert!(added.is_empty());
    assert_eq!(updated["items"], ("[]".to_string(), "[1]".to_string()));
}

#[test]
fn test_deleted_binding_is_removed() {
    let events = trace("x = 1\ndel x\nprint('ok')\n");
    let lines = line_events(&events);
    let TraceEvent::Line { removed, locals, .. } = lines[2] else {
        unreachable!()
    };
    assert_eq!(removed, &["x".to_string()]);
    assert!(!locals.contains_key("x"));
}

#[test]
fn test_long_values_are_shortened() {
    let limits = TraceLimits {
        render_limit: 20,
        ..TraceLimits::default()
    };
    let (events, result) = trace_with("s = 'a' * 500\nn = len(s)\n", limits);
    assert!(result.is_ok());
    let lines = line_events(&events);
    let TraceEvent::Line { added, .. } = lines[1] else {
        unreachable!()
    };
    assert_eq!(added["s"], format!("'{}...", "a".repeat(16)));
}

#[test]
fn test_recursion_depth() {
    let source = "def fact(n):\n    if n <= 1:\n        return 1\n    return n * fact(n - 1)\n\nresult = fact(3)\n";
    let events = trace(source);
    let calls: Vec<&TraceEvent> = events
        .iter()
        .filter(|event| matches!(event, TraceEvent::Call { function_name, .. } if function_name == "fact"))
        .collect();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls.iter().map(|event| event.depth()).collect::<Vec<_>>(), [1, 2, 3]);

    let TraceEvent::Return { return_value, depth, .. } = events.last().unwrap() else {
        panic!("trace should end with the module return");
    };
    assert_eq!(*depth, 0);
    assert_eq!(return_value, "None");
}

#[test]
fn test_handled_exception_keeps_tracing() {
    let source = "def risky():\n    return 1 / 0\n\ntry:\n    risky()\nexcept ZeroDivisionError:\n    caught = True\nprint(caught)\n";
    let events = trace(source);
    assert!(events.iter().any(|event| matches!(
        event,
        TraceEvent::Exception { line: 2, depth: 1, error_summary, .. }
            if error_summary == "ZeroDivisionError: division by zero"
    )));
    let last_line = line_events(&events).pop().unwrap();
    let TraceEvent::Line { locals, line, .. } = last_line else {
        unreachable!()
    };
    assert_eq!(*line, 8);
    assert_eq!(locals["caught"], "True");
}

#[test]
fn test_time_budget() {
    let limits = TraceLimits {
        max_steps: u64::MAX,
        hard_timeout_secs: 0.05,
        ..TraceLimits::default()
    };
    let (events, result) = trace_with("while True:\n    pass\n", limits);
    assert!(matches!(result, Err(RuntimeError::Halted)));
    let Some(TraceEvent::BudgetExceeded { reason, .. }) = events.last() else {
        panic!("trace should end with the budget event");
    };
    assert!(reason.starts_with("time limit of"), "{}", reason);
}

#[test]
fn test_events_serialize_with_type_tag() {
    let events = trace("x = 1\n");
    let json = serde_json::to_value(&events).unwrap();
    let tags: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|event| event["type"].as_str().unwrap())
        .collect();
    assert_eq!(tags, ["call", "line", "return"]);
}
