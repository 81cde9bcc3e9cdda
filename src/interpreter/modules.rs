//! Importable modules and the prelude
//!
//! `math`, `time`, `os`, `signal` and `sys` are native: their members are
//! [`Builtin`]s and constants. `functools` and the `map`/`filter` built-ins
//! are written in the traced language itself ([`PRELUDE_SOURCE`]) and run
//! from the `<prelude>` file, whose frames the tracer skips.

use crate::interpreter::builtins::Builtin;
use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::{ExceptionKind, RuntimeError};
use crate::memory::value::{new_namespace, Module, Value};
use std::rc::Rc;

/// Library code run before the program
pub const PRELUDE_SOURCE: &str = r#"
_MISSING = []


def map(function, iterable, other=_MISSING):
    result = []
    if other is _MISSING:
        for item in iterable:
            result.append(function(item))
    else:
        for first, second in zip(iterable, other):
            result.append(function(first, second))
    return iter(result)


def filter(function, iterable):
    result = []
    for item in iterable:
        if function is None:
            if item:
                result.append(item)
        elif function(item):
            result.append(item)
    return iter(result)


def reduce(function, iterable, initial=_MISSING):
    items = iter(iterable)
    if initial is _MISSING:
        try:
            value = next(items)
        except StopIteration:
            raise TypeError("reduce() of empty iterable with no initial value")
    else:
        value = initial
    for element in items:
        value = function(value, element)
    return value
"#;

/// Prelude functions bound as built-ins
pub const PRELUDE_BUILTINS: &[&str] = &["map", "filter"];

#[cfg(unix)]
fn signal_numbers() -> Vec<(&'static str, i64)> {
    vec![
        ("SIGHUP", libc::SIGHUP as i64),
        ("SIGINT", libc::SIGINT as i64),
        ("SIGQUIT", libc::SIGQUIT as i64),
        ("SIGILL", libc::SIGILL as i64),
        ("SIGTRAP", libc::SIGTRAP as i64),
        ("SIGABRT", libc::SIGABRT as i64),
        ("SIGBUS", libc::SIGBUS as i64),
        ("SIGFPE", libc::SIGFPE as i64),
        ("SIGKILL", libc::SIGKILL as i64),
        ("SIGUSR1", libc::SIGUSR1 as i64),
        ("SIGSEGV", libc::SIGSEGV as i64),
        ("SIGUSR2", libc::SIGUSR2 as i64),
        ("SIGPIPE", libc::SIGPIPE as i64),
        ("SIGALRM", libc::SIGALRM as i64),
        ("SIGTERM", libc::SIGTERM as i64),
        ("SIGSYS", libc::SIGSYS as i64),
    ]
}

#[cfg(not(unix))]
fn signal_numbers() -> Vec<(&'static str, i64)> {
    vec![
        ("SIGINT", libc::SIGINT as i64),
        ("SIGILL", libc::SIGILL as i64),
        ("SIGFPE", libc::SIGFPE as i64),
        ("SIGSEGV", libc::SIGSEGV as i64),
        ("SIGTERM", libc::SIGTERM as i64),
        ("SIGABRT", libc::SIGABRT as i64),
    ]
}

fn os_error(err: std::io::Error) -> RuntimeError {
    let text = err.to_string();
    let description = text.split(" (os error").next().unwrap_or(&text);
    let message = match err.raw_os_error() {
        Some(code) => format!("[Errno {}] {}", code, description),
        None => description.to_string(),
    };
    RuntimeError::new(ExceptionKind::OSError, message)
}

/// `os.kill(pid, signal)`
///
/// A program may only signal its own process; any other pid, including the
/// process-group forms `0` and `-1`, fails with `EPERM`.
#[cfg(unix)]
pub(crate) fn send_signal(pid: i64, signal: i64) -> Result<(), RuntimeError> {
    let pid = libc::pid_t::try_from(pid).map_err(|_| RuntimeError::overflow())?;
    let signal = libc::c_int::try_from(signal)
        .map_err(|_| RuntimeError::value_error("signal number out of range"))?;
    if u32::try_from(pid).ok() != Some(std::process::id()) {
        return Err(os_error(std::io::Error::from_raw_os_error(libc::EPERM)));
    }

    if signal == libc::SIGSEGV || signal == libc::SIGBUS {
        // The runtime's stack-overflow handler swallows synthetic faults;
        // restore the default disposition so the signal terminates us.
        // SAFETY: installing SIG_DFL has no memory-safety preconditions.
        unsafe {
            libc::signal(signal, libc::SIG_DFL);
        }
    }

    // SAFETY: kill(2) only takes integer arguments.
    let result = unsafe { libc::kill(pid, signal) };
    if result == -1 {
        return Err(os_error(std::io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn send_signal(_pid: i64, _signal: i64) -> Result<(), RuntimeError> {
    Err(os_error(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "os.kill is not supported on this platform",
    )))
}

fn functions(builtins: &[Builtin]) -> Vec<(&'static str, Value)> {
    builtins
        .iter()
        .map(|builtin| (builtin.name(), Value::Builtin(*builtin)))
        .collect()
}

impl Interpreter<'_> {
    /// `import name`: native modules are built once per run and cached
    pub(crate) fn import_module(&mut self, name: &str) -> Result<Value, RuntimeError> {
        if let Some(module) = self.modules.get(name) {
            return Ok(module.clone());
        }

        let members: Vec<(&'static str, Value)> = match name {
            "math" => {
                let mut members = functions(&[
                    Builtin::Sqrt,
                    Builtin::Floor,
                    Builtin::Ceil,
                    Builtin::Gcd,
                    Builtin::Isqrt,
                    Builtin::Log,
                    Builtin::Fabs,
                ]);
                members.extend([
                    ("pi", Value::Float(std::f64::consts::PI)),
                    ("e", Value::Float(std::f64::consts::E)),
                    ("tau", Value::Float(std::f64::consts::TAU)),
                    ("inf", Value::Float(f64::INFINITY)),
                    ("nan", Value::Float(f64::NAN)),
                ]);
                members
            }
            "time" => functions(&[Builtin::Sleep, Builtin::Time, Builtin::PerfCounter]),
            "os" => functions(&[Builtin::Getpid, Builtin::Abort, Builtin::Kill]),
            "signal" => signal_numbers()
                .into_iter()
                .map(|(name, number)| (name, Value::Int(number)))
                .collect(),
            "sys" => {
                let mut members = functions(&[
                    Builtin::Exit,
                    Builtin::SetRecursionLimit,
                    Builtin::GetRecursionLimit,
                ]);
                members.push(("maxsize", Value::Int(i64::MAX)));
                members
            }
            "functools" => {
                let reduce = self.prelude.borrow().get("reduce").cloned();
                reduce.map(|reduce| vec![("reduce", reduce)]).unwrap_or_default()
            }
            _ => {
                return Err(RuntimeError::new(
                    ExceptionKind::ModuleNotFoundError,
                    format!("No module named '{}'", name),
                ))
            }
        };

        let namespace = new_namespace();
        namespace
            .borrow_mut()
            .extend(members.into_iter().map(|(key, value)| (key.to_string(), value)));
        let module = Value::Module(Rc::new(Module {
            name: name.to_string(),
            namespace,
        }));
        self.modules.insert(name.to_string(), module.clone());
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    #[test]
    fn test_prelude_parses() {
        let program = parse_source(PRELUDE_SOURCE).unwrap();
        assert_eq!(program.body.len(), 4);
    }

    #[test]
    fn test_signal_table() {
        let numbers = signal_numbers();
        assert!(numbers.iter().any(|(name, _)| *name == "SIGSEGV"));
        assert!(numbers.iter().all(|(_, number)| *number > 0));
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_other_processes_is_refused() {
        for pid in [0, -1, 1, i32::MAX as i64] {
            let err = send_signal(pid, libc::SIGTERM as i64).unwrap_err();
            assert!(err.is_kind(ExceptionKind::OSError));
            assert_eq!(err.to_string(), "OSError: [Errno 1] Operation not permitted");
        }
        // Signal 0 only checks that the target exists
        send_signal(std::process::id() as i64, 0).unwrap();
    }
}
