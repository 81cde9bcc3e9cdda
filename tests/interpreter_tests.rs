// Integration tests for the interpreter

use std::thread;

use steptrace::interpreter::errors::{ExceptionKind, RuntimeError};
use steptrace::interpreter::terminal::Terminal;
use steptrace::interpreter::Interpreter;
use steptrace::parser::parse_source;

/// Run `source` on a thread with room for deep recursion; returns the result
/// and the captured stdout
fn run_with_stdin(source: &'static str, stdin: &'static str) -> (Result<(), String>, String) {
    thread::Builder::new()
        .stack_size(256 << 20)
        .spawn(move || {
            let program = parse_source(source).expect("Parsing failed");
            let mut interpreter = Interpreter::new(program, Terminal::new(stdin, 1 << 20));
            let result = interpreter.run().map_err(|err| err.to_string());
            (result, interpreter.terminal().stdout().to_string())
        })
        .unwrap()
        .join()
        .unwrap()
}

fn run_ok(source: &'static str) -> String {
    let (result, stdout) = run_with_stdin(source, "");
    assert!(result.is_ok(), "Execution failed: {:?}", result);
    stdout
}

fn run_err(source: &'static str) -> String {
    let (result, _) = run_with_stdin(source, "");
    result.expect_err("Execution should fail")
}

#[test]
fn test_recursive_function() {
    let source = r#"
def fib(n):
    if n < 2:
        return n
    return fib(n - 1) + fib(n - 2)

print(fib(15))
"#;
    assert_eq!(run_ok(source), "610\n");
}

#[test]
fn test_dict_counting() {
    let source = r#"
counts = {}
for word in "a b a c b a".split():
    counts[word] = counts.get(word, 0) + 1
print(sorted(counts.items()))
"#;
    assert_eq!(run_ok(source), "[('a', 3), ('b', 2), ('c', 1)]\n");
}

#[test]
fn test_fstring_and_comprehension() {
    let source = r#"
name = "squares"
values = [x * x for x in range(5) if x % 2 == 0]
print(f"{name}={values}")
"#;
    assert_eq!(run_ok(source), "squares=[0, 4, 16]\n");
}

#[test]
fn test_try_except_finally() {
    let source = r#"
try:
    [1][5]
except IndexError as err:
    print("caught", err)
finally:
    print("done")
"#;
    assert_eq!(run_ok(source), "caught list index out of range\ndone\n");
}

#[test]
fn test_closure_with_nonlocal() {
    let source = r#"
def counter():
    count = 0
    def inc():
        nonlocal count
        count += 1
        return count
    return inc

c = counter()
c()
print(c())
"#;
    assert_eq!(run_ok(source), "2\n");
}

#[test]
fn test_reads_stdin() {
    let (result, stdout) = run_with_stdin("a = int(input())\nb = int(input())\nprint(a * b)\n", "3\n4\n");
    assert!(result.is_ok());
    assert_eq!(stdout, "12\n");
}

#[test]
fn test_uncaught_name_error() {
    let message = run_err("print(missing)\n");
    assert_eq!(message, "NameError: name 'missing' is not defined");
}

#[test]
fn test_zero_division() {
    assert_eq!(run_err("x = 1 // 0\n"), "ZeroDivisionError: integer division or modulo by zero");
}

#[test]
fn test_runaway_recursion() {
    let message = run_err("def f(n):\n    return f(n + 1)\n\nf(0)\n");
    assert!(message.starts_with("RecursionError: maximum recursion depth exceeded"), "{}", message);
}

#[test]
fn test_error_kind_is_preserved() {
    let program = parse_source("raise ValueError('bad')\n").unwrap();
    let err = Interpreter::new(program, Terminal::new("", 1024)).run().unwrap_err();
    assert!(err.is_kind(ExceptionKind::ValueError));
    assert!(matches!(err, RuntimeError::Exception(_)));
}
