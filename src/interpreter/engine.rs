// Execution engine for the traced language

use crate::interpreter::builtins::Builtin;
use crate::interpreter::errors::{ExceptionKind, RaisedException, RuntimeError, TracebackEntry};
use crate::interpreter::hook::{Hook, HookEvent, TraceControl};
use crate::interpreter::modules::{PRELUDE_BUILTINS, PRELUDE_SOURCE};
use crate::interpreter::statements::Flow;
use crate::interpreter::terminal::Terminal;
use crate::interpreter::{PRELUDE_FILENAME, USER_FILENAME};
use crate::memory::stack::{FrameSpec, Stack, StackFrame};
use crate::memory::value::{new_namespace, Class, Function, Namespace, Value};
use crate::parser::ast::{FunctionDef, Program};
use crate::parser::parse_source;
use rustc_hash::FxHashMap;
use std::rc::Rc;
use std::time::Instant;

/// Default maximum call depth
pub const DEFAULT_RECURSION_LIMIT: usize = 1000;

/// The interpreter for one program run
pub struct Interpreter<'h> {
    /// Parsed program
    program: Program,

    /// File name reported for the program's frames
    filename: Rc<str>,

    /// Call stack
    pub(crate) stack: Stack,

    /// Module namespace of the program
    pub(crate) globals: Namespace,

    /// Built-in functions and classes, consulted after globals
    pub(crate) builtins: Namespace,

    /// Globals of the prelude
    pub(crate) prelude: Namespace,

    /// Imported modules by name
    pub(crate) modules: FxHashMap<String, Value>,

    /// Captured standard streams
    pub(crate) terminal: Terminal,

    /// Instrumentation hook; dropped once it halts execution
    hook: Option<&'h mut dyn Hook>,

    /// Exceptions being handled by active `except` clauses, innermost last
    pub(crate) handling: Vec<RaisedException>,

    /// Maximum number of frames before `RecursionError`
    pub(crate) recursion_limit: usize,

    /// Start of the run, the origin of `time.perf_counter()`
    pub(crate) started: Instant,
}

fn builtin_namespace() -> Namespace {
    let builtins = new_namespace();
    {
        let mut names = builtins.borrow_mut();
        for builtin in Builtin::GLOBAL {
            names.insert(builtin.name().to_string(), Value::Builtin(builtin));
        }
        for class in [
            Class::Int,
            Class::Float,
            Class::Str,
            Class::Bool,
            Class::List,
            Class::Tuple,
            Class::Dict,
            Class::Range,
            Class::Type,
        ] {
            names.insert(class.name().to_string(), Value::Class(class));
        }
        for kind in ExceptionKind::ALL {
            names.insert(kind.name().to_string(), Value::Class(Class::Exception(kind)));
        }
    }
    builtins
}

impl<'h> Interpreter<'h> {
    /// Create an interpreter for `program` with the given streams
    pub fn new(program: Program, terminal: Terminal) -> Self {
        Interpreter {
            program,
            filename: Rc::from(USER_FILENAME),
            stack: Stack::new(),
            globals: new_namespace(),
            builtins: builtin_namespace(),
            prelude: new_namespace(),
            modules: FxHashMap::default(),
            terminal,
            hook: None,
            handling: Vec::new(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            started: Instant::now(),
        }
    }

    /// Report execution to `hook`
    pub fn with_hook(mut self, hook: &'h mut dyn Hook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Run the program from start to finish
    ///
    /// Returns the uncaught exception (with its traceback), or
    /// [`RuntimeError::Halted`] if the hook stopped execution.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        self.load_prelude()?;
        self.globals
            .borrow_mut()
            .insert("__name__".to_string(), Value::str("__main__"));

        let body = self.program.body.clone();
        self.stack.push_frame(FrameSpec {
            function_name: Rc::from("<module>"),
            filename: self.filename.clone(),
            line: self.program.first_line(),
            locals: self.globals.clone(),
            globals: self.globals.clone(),
            code: None,
            closure: Vec::new(),
        });
        let result = self
            .fire(HookEvent::Call)
            .and_then(|()| self.execute_block(&body))
            .map(|_| Value::None);
        self.leave_frame(result).map(|_| ())
    }

    /// Define the prelude's functions with the hook detached
    fn load_prelude(&mut self) -> Result<(), RuntimeError> {
        let prelude = parse_source(PRELUDE_SOURCE)
            .map_err(|err| RuntimeError::new(ExceptionKind::SyntaxError, err.to_string()))?;

        let hook = self.hook.take();
        self.stack.push_frame(FrameSpec {
            function_name: Rc::from("<module>"),
            filename: Rc::from(PRELUDE_FILENAME),
            line: prelude.first_line(),
            locals: self.prelude.clone(),
            globals: self.prelude.clone(),
            code: None,
            closure: Vec::new(),
        });
        let result = self.execute_block(&prelude.body);
        self.stack.pop_frame();
        self.hook = hook;
        result?;

        let prelude = self.prelude.borrow();
        let mut builtins = self.builtins.borrow_mut();
        for name in PRELUDE_BUILTINS {
            if let Some(value) = prelude.get(*name) {
                builtins.insert(name.to_string(), value.clone());
            }
        }
        Ok(())
    }

    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    /// Consume the interpreter, returning its captured streams
    pub fn into_terminal(self) -> Terminal {
        self.terminal
    }

    pub fn globals(&self) -> &Namespace {
        &self.globals
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Report an event to the hook
    pub(crate) fn fire(&mut self, event: HookEvent<'_>) -> Result<(), RuntimeError> {
        let Some(hook) = self.hook.as_deref_mut() else {
            return Ok(());
        };
        match hook.on_event(&self.stack, event) {
            TraceControl::Continue => Ok(()),
            TraceControl::Halt => {
                self.hook = None;
                Err(RuntimeError::Halted)
            }
        }
    }

    /// Move the current frame to `line` and report it
    pub(crate) fn mark_line(&mut self, line: usize) -> Result<(), RuntimeError> {
        if let Some(frame) = self.stack.current_frame_mut() {
            frame.line = line;
        }
        self.fire(HookEvent::Line)
    }

    /// Record an exception passing through the current frame (once per frame)
    pub(crate) fn report_exception(&mut self, err: RuntimeError) -> RuntimeError {
        let RuntimeError::Exception(mut raised) = err else {
            return err;
        };
        let Some(frame) = self.stack.current_frame() else {
            return RuntimeError::Exception(raised);
        };
        if raised.reported_in == Some(frame.id) {
            return RuntimeError::Exception(raised);
        }

        raised.reported_in = Some(frame.id);
        if &*frame.filename != PRELUDE_FILENAME {
            raised.traceback.insert(
                0,
                TracebackEntry {
                    filename: frame.filename.clone(),
                    line: frame.line,
                    function_name: frame.function_name.clone(),
                },
            );
        }
        let object = raised.object.clone();
        match self.fire(HookEvent::Exception(&object)) {
            Ok(()) => RuntimeError::Exception(raised),
            Err(halted) => halted,
        }
    }

    /// Report the frame's exit and pop it
    fn leave_frame(&mut self, result: Result<Value, RuntimeError>) -> Result<Value, RuntimeError> {
        let fired = match &result {
            Ok(value) => self.fire(HookEvent::Return(value)),
            Err(RuntimeError::Exception(_)) => self.fire(HookEvent::Return(&Value::None)),
            Err(RuntimeError::Halted) => Ok(()),
        };
        self.stack.pop_frame();
        fired?;
        result
    }

    pub(crate) fn frame(&self) -> Result<&StackFrame, RuntimeError> {
        self.stack
            .current_frame()
            .ok_or_else(|| RuntimeError::new(ExceptionKind::RuntimeError, "no active frame"))
    }

    /// Call any callable value
    pub(crate) fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(function) => self.call_function(function, args, kwargs),
            Value::Builtin(builtin) => self.call_builtin(*builtin, args, kwargs),
            Value::Method(method) => {
                let method = method.clone();
                self.call_method(&method, args, kwargs)
            }
            Value::Class(class) => self.construct(*class, args, kwargs),
            other => Err(RuntimeError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// Call a user-defined function in a new frame
    pub(crate) fn call_function(
        &mut self,
        function: &Rc<Function>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError> {
        if self.stack.depth() >= self.recursion_limit {
            return Err(RuntimeError::recursion_error());
        }
        let locals = bind_arguments(function, args, kwargs)?;
        let def = function.def.clone();

        self.stack.push_frame(FrameSpec {
            function_name: Rc::from(def.name.as_str()),
            filename: function.filename.clone(),
            line: def.location.line,
            locals,
            globals: function.globals.clone(),
            code: Some(def.clone()),
            closure: function.closure.clone(),
        });
        let result = self
            .fire(HookEvent::Call)
            .and_then(|()| self.execute_block(&def.body))
            .map(|flow| match flow {
                Flow::Return(value) => value,
                _ => Value::None,
            });
        self.leave_frame(result)
    }

    /// Create a function value for `def` or `lambda` in the current frame
    pub(crate) fn make_function(&mut self, def: &Rc<FunctionDef>) -> Result<Value, RuntimeError> {
        let mut defaults = Vec::new();
        for param in &def.params {
            if let Some(default) = &param.default {
                defaults.push(self.evaluate_expr(default)?);
            }
        }

        let frame = self.frame()?;
        let closure = if frame.is_module() {
            Vec::new()
        } else {
            std::iter::once(frame.locals.clone())
                .chain(frame.closure.iter().cloned())
                .collect()
        };
        Ok(Value::Function(Rc::new(Function {
            def: def.clone(),
            defaults,
            globals: frame.globals.clone(),
            closure,
            filename: frame.filename.clone(),
        })))
    }

    /// Resolve a name: locals, enclosing functions, globals, built-ins
    pub(crate) fn load_name(&self, name: &str) -> Result<Value, RuntimeError> {
        let frame = self.frame()?;
        let declared_global = frame
            .code
            .as_ref()
            .is_some_and(|code| code.scope.globals.contains(name));

        if !declared_global {
            if let Some(value) = frame.locals.borrow().get(name) {
                return Ok(value.clone());
            }
            if let Some(code) = &frame.code {
                if code.scope.locals.contains(name) {
                    return Err(unbound_local(name));
                }
            }
            for namespace in &frame.closure {
                if let Some(value) = namespace.borrow().get(name) {
                    return Ok(value.clone());
                }
            }
        }

        if let Some(value) = frame.globals.borrow().get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.builtins.borrow().get(name) {
            return Ok(value.clone());
        }
        Err(RuntimeError::name_error(name))
    }

    /// Namespace a store to `name` goes to in the current frame
    fn binding_namespace(&self, name: &str) -> Result<Namespace, RuntimeError> {
        let frame = self.frame()?;
        let Some(code) = &frame.code else {
            return Ok(frame.locals.clone());
        };
        if code.scope.globals.contains(name) {
            return Ok(frame.globals.clone());
        }
        if code.scope.nonlocals.contains(name) {
            let owner = frame
                .closure
                .iter()
                .find(|namespace| namespace.borrow().contains_key(name))
                .or_else(|| frame.closure.first());
            return owner.cloned().ok_or_else(|| {
                RuntimeError::new(
                    ExceptionKind::SyntaxError,
                    format!("no binding for nonlocal '{}' found", name),
                )
            });
        }
        Ok(frame.locals.clone())
    }

    pub(crate) fn store_name(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let namespace = self.binding_namespace(name)?;
        namespace.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }

    /// `del name`
    pub(crate) fn delete_name(&mut self, name: &str) -> Result<(), RuntimeError> {
        let namespace = self.binding_namespace(name)?;
        let removed = namespace.borrow_mut().shift_remove(name);
        match removed {
            Some(_) => Ok(()),
            None => {
                let frame = self.frame()?;
                let is_local = frame
                    .code
                    .as_ref()
                    .is_some_and(|code| code.scope.locals.contains(name));
                if is_local {
                    Err(unbound_local(name))
                } else {
                    Err(RuntimeError::name_error(name))
                }
            }
        }
    }
}

fn unbound_local(name: &str) -> RuntimeError {
    RuntimeError::new(
        ExceptionKind::UnboundLocalError,
        format!(
            "cannot access local variable '{}' where it is not associated with a value",
            name
        ),
    )
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else {
        format!("{} {}s", count, word)
    }
}

/// `'a'`, `'a' and 'b'`, `'a', 'b', and 'c'`
fn name_list(names: &[&str]) -> String {
    let quoted: Vec<String> = names.iter().map(|name| format!("'{}'", name)).collect();
    match quoted.as_slice() {
        [] => String::new(),
        [one] => one.clone(),
        [first, second] => format!("{} and {}", first, second),
        [rest @ .., last] => format!("{}, and {}", rest.join(", "), last),
    }
}

/// Match call arguments to parameters, producing the new frame's locals
fn bind_arguments(
    function: &Function,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<Namespace, RuntimeError> {
    let def = &function.def;
    let params = &def.params;
    let first_default = params.len() - function.defaults.len().min(params.len());

    if args.len() > params.len() {
        let takes = if first_default == params.len() {
            plural(params.len(), "positional argument")
        } else {
            format!("from {} to {} positional arguments", first_default, params.len())
        };
        let given = if args.len() == 1 {
            "1 was given".to_string()
        } else {
            format!("{} were given", args.len())
        };
        return Err(RuntimeError::type_error(format!(
            "{}() takes {} but {}",
            def.name, takes, given
        )));
    }

    let mut slots: Vec<Option<Value>> = vec![None; params.len()];
    for (slot, value) in slots.iter_mut().zip(args) {
        *slot = Some(value);
    }
    for (name, value) in kwargs {
        let Some(index) = params.iter().position(|param| param.name == name) else {
            return Err(RuntimeError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                def.name, name
            )));
        };
        if slots[index].is_some() {
            return Err(RuntimeError::type_error(format!(
                "{}() got multiple values for argument '{}'",
                def.name, name
            )));
        }
        slots[index] = Some(value);
    }

    let mut missing = Vec::new();
    for (index, slot) in slots.iter_mut().enumerate() {
        if slot.is_none() {
            match index.checked_sub(first_default) {
                Some(offset) => *slot = function.defaults.get(offset).cloned(),
                None => missing.push(params[index].name.as_str()),
            }
        }
    }
    if !missing.is_empty() {
        return Err(RuntimeError::type_error(format!(
            "{}() missing {}: {}",
            def.name,
            plural(missing.len(), "required positional argument"),
            name_list(&missing)
        )));
    }

    let locals = new_namespace();
    locals.borrow_mut().extend(
        params
            .iter()
            .zip(slots)
            .map(|(param, value)| (param.name.clone(), value.unwrap_or_default())),
    );
    Ok(locals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::Stmt;

    fn function(source: &str) -> Function {
        let program = parse_source(source).unwrap();
        let Stmt::FunctionDef { def, .. } = &program.body[0] else {
            panic!("expected a function definition");
        };
        let defaults = def
            .params
            .iter()
            .filter(|param| param.default.is_some())
            .map(|_| Value::Int(0))
            .collect();
        Function {
            def: def.clone(),
            defaults,
            globals: new_namespace(),
            closure: Vec::new(),
            filename: Rc::from(USER_FILENAME),
        }
    }

    fn bind_error(source: &str, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> String {
        bind_arguments(&function(source), args, kwargs)
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn test_bind_defaults_and_keywords() {
        let f = function("def f(a, b, c=1):\n    pass\n");
        let locals = bind_arguments(
            &f,
            vec![Value::Int(1)],
            vec![("b".to_string(), Value::Int(2))],
        )
        .unwrap();
        let locals = locals.borrow();
        let names: Vec<&str> = locals.keys().map(String::as_str).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert!(matches!(locals["c"], Value::Int(0)));
    }

    #[test]
    fn test_bind_errors() {
        let source = "def f(a, b):\n    pass\n";
        assert_eq!(
            bind_error(source, vec![Value::Int(1)], Vec::new()),
            "TypeError: f() missing 1 required positional argument: 'b'"
        );
        assert_eq!(
            bind_error(source, Vec::new(), Vec::new()),
            "TypeError: f() missing 2 required positional arguments: 'a' and 'b'"
        );
        assert_eq!(
            bind_error(source, vec![Value::Int(1), Value::Int(2), Value::Int(3)], Vec::new()),
            "TypeError: f() takes 2 positional arguments but 3 were given"
        );
        assert_eq!(
            bind_error(source, vec![Value::Int(1)], vec![("a".to_string(), Value::Int(2))]),
            "TypeError: f() got multiple values for argument 'a'"
        );
        assert_eq!(
            bind_error(source, Vec::new(), vec![("z".to_string(), Value::Int(2))]),
            "TypeError: f() got an unexpected keyword argument 'z'"
        );
        assert_eq!(
            bind_error("def g(a, b=1):\n    pass\n", vec![Value::Int(1); 3], Vec::new()),
            "TypeError: g() takes from 1 to 2 positional arguments but 3 were given"
        );
    }

    #[test]
    fn test_name_list() {
        assert_eq!(name_list(&["a"]), "'a'");
        assert_eq!(name_list(&["a", "b", "c"]), "'a', 'b', and 'c'");
    }
}
