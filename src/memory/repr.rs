//! Textual conversion of runtime values (`repr` and `str`)
//!
//! Floats use the shortest round-trip form, strings pick the quote that
//! needs no escaping, and a container that contains itself prints as `[...]`.
//!
//! Everything is written through [`std::fmt::Write`], so callers can stream
//! into a bounded buffer and stop early (see `trace::render`). A write error
//! aborts the conversion.

use super::value::{Value, ValueError, MAX_VALUE_DEPTH};
use std::fmt::{self, Write};
use std::rc::Rc;

/// Conversion state: containers currently being written, for cycle detection
struct ReprWriter<'w, W: Write> {
    out: &'w mut W,
    active: Vec<usize>,
    too_deep: bool,
}

impl<W: Write> ReprWriter<'_, W> {
    fn write_value(&mut self, value: &Value) -> fmt::Result {
        if self.active.len() > MAX_VALUE_DEPTH {
            self.too_deep = true;
            return Err(fmt::Error);
        }

        match value {
            Value::None => self.out.write_str("None"),
            Value::Bool(true) => self.out.write_str("True"),
            Value::Bool(false) => self.out.write_str("False"),
            Value::Int(n) => write!(self.out, "{}", n),
            Value::Float(f) => self.out.write_str(&format_float(*f)),
            Value::Str(s) => write_quoted(self.out, s),
            Value::List(items) => {
                let id = Rc::as_ptr(items) as usize;
                if self.active.contains(&id) {
                    return self.out.write_str("[...]");
                }
                let items = items.try_borrow().map_err(|_| fmt::Error)?.clone();
                self.active.push(id);
                let result = self.write_sequence("[", &items, "]", false);
                self.active.pop();
                result
            }
            Value::Tuple(items) => {
                let id = Rc::as_ptr(items) as *const Value as usize;
                self.active.push(id);
                let result = self.write_sequence("(", items, ")", items.len() == 1);
                self.active.pop();
                result
            }
            Value::Dict(map) => {
                let id = Rc::as_ptr(map) as usize;
                if self.active.contains(&id) {
                    return self.out.write_str("{...}");
                }
                let entries: Vec<(Value, Value)> = map
                    .try_borrow()
                    .map_err(|_| fmt::Error)?
                    .values()
                    .cloned()
                    .collect();
                self.active.push(id);
                let result = self.write_entries(&entries);
                self.active.pop();
                result
            }
            Value::Range(range) => {
                if range.step == 1 {
                    write!(self.out, "range({}, {})", range.start, range.stop)
                } else {
                    write!(
                        self.out,
                        "range({}, {}, {})",
                        range.start, range.stop, range.step
                    )
                }
            }
            Value::Function(function) => write!(self.out, "<function {}>", function.def.name),
            Value::Builtin(builtin) => write!(self.out, "<built-in function {}>", builtin.name()),
            Value::Method(method) => write!(
                self.out,
                "<built-in method {} of {} object>",
                method.name,
                method.receiver.type_name()
            ),
            Value::Class(class) => write!(self.out, "<class '{}'>", class.name()),
            Value::Module(module) => write!(self.out, "<module '{}'>", module.name),
            Value::Exception(exception) => {
                self.out.write_str(exception.kind.name())?;
                if exception.args.len() == 1 {
                    self.out.write_char('(')?;
                    self.write_value(&exception.args[0])?;
                    self.out.write_char(')')
                } else {
                    let args = exception.args.clone();
                    self.write_sequence("(", &args, ")", false)
                }
            }
            Value::Iterator(_) => write!(self.out, "<{} object>", value.type_name()),
        }
    }

    fn write_sequence(
        &mut self,
        open: &str,
        items: &[Value],
        close: &str,
        trailing_comma: bool,
    ) -> fmt::Result {
        self.out.write_str(open)?;
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.out.write_str(", ")?;
            }
            self.write_value(item)?;
        }
        if trailing_comma {
            self.out.write_char(',')?;
        }
        self.out.write_str(close)
    }

    fn write_entries(&mut self, entries: &[(Value, Value)]) -> fmt::Result {
        self.out.write_char('{')?;
        for (i, (key, value)) in entries.iter().enumerate() {
            if i > 0 {
                self.out.write_str(", ")?;
            }
            self.write_value(key)?;
            self.out.write_str(": ")?;
            self.write_value(value)?;
        }
        self.out.write_char('}')
    }
}

/// Write `repr(value)` into `out`
pub fn write_repr<W: Write>(out: &mut W, value: &Value) -> fmt::Result {
    let mut writer = ReprWriter {
        out,
        active: Vec::new(),
        too_deep: false,
    };
    writer.write_value(value)
}

/// Write `str(value)` into `out`
pub fn write_str<W: Write>(out: &mut W, value: &Value) -> fmt::Result {
    match value {
        Value::Str(s) => out.write_str(s),
        Value::Exception(exception) => match exception.args.as_slice() {
            [] => Ok(()),
            [arg] if exception.kind != crate::interpreter::errors::ExceptionKind::KeyError => {
                write_str(out, arg)
            }
            [arg] => write_repr(out, arg),
            args => write_repr(out, &Value::tuple(args.to_vec())),
        },
        other => write_repr(out, other),
    }
}

/// `repr(value)`; fails only when nesting is too deep to convert
pub fn try_repr(value: &Value) -> Result<String, ValueError> {
    let mut out = String::new();
    let mut writer = ReprWriter {
        out: &mut out,
        active: Vec::new(),
        too_deep: false,
    };
    match writer.write_value(value) {
        Ok(()) => Ok(out),
        Err(_) if writer.too_deep => Err(ValueError::TooDeep),
        Err(_) => Err(ValueError::Busy(value.type_name())),
    }
}

/// `str(value)`; fails only when nesting is too deep to convert
pub fn try_str(value: &Value) -> Result<String, ValueError> {
    match value {
        Value::Str(s) => Ok(s.to_string()),
        Value::Exception(_) => {
            let mut out = String::new();
            match write_str(&mut out, value) {
                Ok(()) => Ok(out),
                Err(_) => Err(ValueError::TooDeep),
            }
        }
        other => try_repr(other),
    }
}

/// `repr(value)` with a placeholder for values that cannot be converted
pub fn repr_string(value: &Value) -> String {
    try_repr(value).unwrap_or_else(|_| format!("<unrepresentable {}>", value.type_name()))
}

/// `str(value)` with a placeholder for values that cannot be converted
pub fn str_string(value: &Value) -> String {
    try_str(value).unwrap_or_else(|_| format!("<unrepresentable {}>", value.type_name()))
}

/// Write `text` as a quoted string literal
pub fn write_quoted<W: Write>(out: &mut W, text: &str) -> fmt::Result {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    out.write_char(quote)?;
    for ch in text.chars() {
        match ch {
            '\\' => out.write_str("\\\\")?,
            '\n' => out.write_str("\\n")?,
            '\r' => out.write_str("\\r")?,
            '\t' => out.write_str("\\t")?,
            c if c == quote => {
                out.write_char('\\')?;
                out.write_char(c)?;
            }
            c if c.is_control() => {
                let code = c as u32;
                if code <= 0xff {
                    write!(out, "\\x{:02x}", code)?;
                } else {
                    write!(out, "\\u{:04x}", code)?;
                }
            }
            c => out.write_char(c)?,
        }
    }
    out.write_char(quote)
}

/// Format a float the way `repr(float)` does
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    // Shortest round-trip digits, in the form d.ddde±x
    let scientific = format!("{:e}", value.abs());
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some(parts) => parts,
        None => return scientific,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let sign = if value < 0.0 { "-" } else { "" };

    if (-4..16).contains(&exponent) {
        let body = if exponent >= 0 {
            let point = exponent as usize + 1;
            if digits.len() <= point {
                format!("{}{}.0", digits, "0".repeat(point - digits.len()))
            } else {
                format!("{}.{}", &digits[..point], &digits[point..])
            }
        } else {
            format!("0.{}{}", "0".repeat((-exponent - 1) as usize), digits)
        };
        format!("{}{}", sign, body)
    } else {
        let fraction = if digits.len() > 1 {
            format!("{}.{}", &digits[..1], &digits[1..])
        } else {
            digits
        };
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        format!("{}{}e{}{:02}", sign, fraction, exp_sign, exponent.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::errors::{ExceptionKind, ExceptionObject};
    use crate::memory::value::{DictMap, RangeValue};

    #[test]
    fn test_float_formatting() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(1.5e-5), "1.5e-05");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(123456789.0), "123456789.0");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(-0.0), "-0.0");
        assert_eq!(format_float(1.0 / 3.0), "0.3333333333333333");
    }

    #[test]
    fn test_string_quoting() {
        assert_eq!(repr_string(&Value::str("hi")), "'hi'");
        assert_eq!(repr_string(&Value::str("it's")), "\"it's\"");
        assert_eq!(repr_string(&Value::str("a\nb")), "'a\\nb'");
        assert_eq!(repr_string(&Value::str("both ' \"")), "'both \\' \"'");
        assert_eq!(str_string(&Value::str("raw")), "raw");
    }

    #[test]
    fn test_containers() {
        let tuple = Value::tuple(vec![Value::Int(1)]);
        assert_eq!(repr_string(&tuple), "(1,)");

        let list = Value::list(vec![Value::None, Value::Bool(true), Value::Float(2.0)]);
        assert_eq!(repr_string(&list), "[None, True, 2.0]");

        let mut map = DictMap::new();
        let key = Value::str("k");
        map.insert(key.to_key().unwrap(), (key, Value::list(Vec::new())));
        assert_eq!(repr_string(&Value::dict(map)), "{'k': []}");

        let range = Value::Range(RangeValue { start: 0, stop: 5, step: 1 });
        assert_eq!(repr_string(&range), "range(0, 5)");
    }

    #[test]
    fn test_self_reference() {
        let list = Value::list(vec![Value::Int(1)]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert_eq!(repr_string(&list), "[1, [...]]");
    }

    #[test]
    fn test_exception_repr_and_str() {
        let exc = Value::Exception(Rc::new(ExceptionObject::new(
            ExceptionKind::ValueError,
            vec![Value::str("bad")],
        )));
        assert_eq!(repr_string(&exc), "ValueError('bad')");
        assert_eq!(str_string(&exc), "bad");
    }

    #[test]
    fn test_too_deep() {
        let mut value = Value::list(Vec::new());
        for _ in 0..(MAX_VALUE_DEPTH + 5) {
            value = Value::list(vec![value]);
        }
        assert_eq!(try_repr(&value), Err(ValueError::TooDeep));
    }
}
