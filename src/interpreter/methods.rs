//! Attribute access and the methods of the built-in container types
//!
//! Methods are looked up by name in fixed tables and returned as
//! [`BoundMethod`] values; calling one dispatches on the receiver's type.
//! Dictionary views (`keys()`, `values()`, `items()`) are returned as lists.

use crate::interpreter::builtins::{items_of, CallArgs};
use crate::interpreter::engine::Interpreter;
use crate::interpreter::errors::{ExceptionKind, RuntimeError};
use crate::interpreter::format::format_template;
use crate::interpreter::ops::access::{dict_insert, normalize_index};
use crate::interpreter::ops::check_length;
use crate::memory::repr::repr_string;
use crate::memory::value::{BoundMethod, DictMap, Value};
use std::cell::RefCell;
use std::rc::Rc;

const LIST_METHODS: &[&str] = &[
    "append", "pop", "insert", "extend", "remove", "index", "count", "sort", "reverse", "copy",
    "clear",
];

const STR_METHODS: &[&str] = &[
    "split",
    "rsplit",
    "join",
    "strip",
    "lstrip",
    "rstrip",
    "upper",
    "lower",
    "replace",
    "startswith",
    "endswith",
    "find",
    "rfind",
    "index",
    "count",
    "isdigit",
    "isalpha",
    "isalnum",
    "isspace",
    "isupper",
    "islower",
    "format",
    "splitlines",
    "title",
    "capitalize",
    "zfill",
    "ljust",
    "rjust",
    "center",
];

const DICT_METHODS: &[&str] = &[
    "get",
    "keys",
    "values",
    "items",
    "pop",
    "popitem",
    "update",
    "setdefault",
    "copy",
    "clear",
];

fn method_table(value: &Value) -> &'static [&'static str] {
    match value {
        Value::List(_) => LIST_METHODS,
        Value::Str(_) => STR_METHODS,
        Value::Dict(_) => DICT_METHODS,
        _ => &[],
    }
}

/// Character index of a byte offset
fn char_index(text: &str, byte_offset: usize) -> i64 {
    text[..byte_offset].chars().count() as i64
}

/// Byte offset of a (normalized, clamped) character index
fn byte_offset(text: &str, index: i64) -> usize {
    let len = text.chars().count() as i64;
    let index = if index < 0 { (index + len).max(0) } else { index.min(len) };
    text.char_indices()
        .nth(index as usize)
        .map_or(text.len(), |(offset, _)| offset)
}

fn expect_str<'a>(value: &'a Value, method: &str) -> Result<&'a str, RuntimeError> {
    value.as_str().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "{}() argument must be str, not {}",
            method,
            value.type_name()
        ))
    })
}

/// `strip` family: `None` strips whitespace
fn strip_chars<'a>(text: &'a str, chars: Option<&str>, left: bool, right: bool) -> &'a str {
    let matches = |c: char| match chars {
        Some(set) => set.contains(c),
        None => c.is_whitespace(),
    };
    let text = if left { text.trim_start_matches(matches) } else { text };
    if right {
        text.trim_end_matches(matches)
    } else {
        text
    }
}

fn split_whitespace(text: &str, maxsplit: i64, from_right: bool) -> Vec<Value> {
    if maxsplit < 0 {
        return text.split_whitespace().map(Value::str).collect();
    }
    let mut parts = Vec::new();
    let mut rest = if from_right { text.trim_end() } else { text.trim_start() };
    while !rest.is_empty() && (parts.len() as i64) < maxsplit {
        if from_right {
            match rest.rfind(char::is_whitespace) {
                Some(pos) => {
                    let width = rest[pos..].chars().next().map_or(1, char::len_utf8);
                    parts.push(Value::str(&rest[pos + width..]));
                    rest = rest[..pos].trim_end();
                }
                None => break,
            }
        } else {
            match rest.find(char::is_whitespace) {
                Some(pos) => {
                    parts.push(Value::str(&rest[..pos]));
                    rest = rest[pos..].trim_start();
                }
                None => break,
            }
        }
    }
    if !rest.is_empty() {
        parts.push(Value::str(rest));
    }
    if from_right {
        parts.reverse();
    }
    parts
}

fn split_on(text: &str, sep: &str, maxsplit: i64, from_right: bool) -> Vec<Value> {
    let limit = if maxsplit < 0 { usize::MAX } else { maxsplit as usize + 1 };
    if from_right {
        let mut parts: Vec<Value> = text.rsplitn(limit, sep).map(Value::str).collect();
        parts.reverse();
        parts
    } else {
        text.splitn(limit, sep).map(Value::str).collect()
    }
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_cased = false;
    for c in text.chars() {
        if previous_cased {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_cased = c.is_alphabetic();
    }
    out
}

fn pad_to(text: &str, width: i64, fill: char, align: char) -> String {
    let len = text.chars().count() as i64;
    if width <= len {
        return text.to_string();
    }
    let padding = (width - len) as usize;
    let fill = |n: usize| fill.to_string().repeat(n);
    match align {
        '<' => format!("{}{}", text, fill(padding)),
        '>' => format!("{}{}", fill(padding), text),
        _ => {
            let left = padding / 2 + (padding & width as usize & 1);
            format!("{}{}{}", fill(left), text, fill(padding - left))
        }
    }
}

impl Interpreter<'_> {
    /// `object.name`
    pub(crate) fn get_attribute(&self, object: &Value, name: &str) -> Result<Value, RuntimeError> {
        match object {
            Value::Module(module) => {
                if name == "__name__" {
                    return Ok(Value::str(&module.name));
                }
                module.namespace.borrow().get(name).cloned().ok_or_else(|| {
                    RuntimeError::new(
                        ExceptionKind::AttributeError,
                        format!("module '{}' has no attribute '{}'", module.name, name),
                    )
                })
            }
            Value::Exception(exception) if name == "args" => {
                Ok(Value::tuple(exception.args.clone()))
            }
            Value::Function(function) if name == "__name__" => Ok(Value::str(&function.def.name)),
            Value::Builtin(builtin) if name == "__name__" => Ok(Value::str(builtin.name())),
            Value::Class(class) if name == "__name__" => Ok(Value::str(class.name())),
            _ => match method_table(object).iter().find(|method| **method == name) {
                Some(method) => Ok(Value::Method(Rc::new(BoundMethod {
                    receiver: object.clone(),
                    name: method,
                }))),
                None => Err(RuntimeError::attribute_error(object.type_name(), name)),
            },
        }
    }

    /// Call a bound method
    pub(crate) fn call_method(
        &mut self,
        method: &BoundMethod,
        positional: Vec<Value>,
        keywords: Vec<(String, Value)>,
    ) -> Result<Value, RuntimeError> {
        let args = CallArgs::new(method.name, positional, keywords);
        match &method.receiver {
            Value::List(list) => self.call_list_method(list, method.name, args),
            Value::Str(text) => call_str_method(text, method.name, args),
            Value::Dict(map) => self.call_dict_method(map, method.name, args),
            other => Err(RuntimeError::attribute_error(other.type_name(), method.name)),
        }
    }

    fn call_list_method(
        &mut self,
        list: &Rc<RefCell<Vec<Value>>>,
        name: &str,
        args: CallArgs,
    ) -> Result<Value, RuntimeError> {
        match name {
            "append" => {
                args.expect(1, 1, &[])?;
                check_length(list.borrow().len() + 1)?;
                list.borrow_mut().push(args.arg(0).clone());
                Ok(Value::None)
            }
            "pop" => {
                args.expect(0, 1, &[])?;
                let index = if args.len() == 1 { args.int(0)? } else { -1 };
                let mut items = list.borrow_mut();
                if items.is_empty() {
                    return Err(RuntimeError::index_error("pop from empty list"));
                }
                let index = normalize_index(index, items.len())
                    .ok_or_else(|| RuntimeError::index_error("pop index out of range"))?;
                Ok(items.remove(index))
            }
            "insert" => {
                args.expect(2, 2, &[])?;
                let index = args.int(0)?;
                check_length(list.borrow().len() + 1)?;
                let mut items = list.borrow_mut();
                let len = items.len() as i64;
                let position = if index < 0 { (index + len).max(0) } else { index.min(len) };
                items.insert(position as usize, args.arg(1).clone());
                Ok(Value::None)
            }
            "extend" => {
                args.expect(1, 1, &[])?;
                let extra = items_of(args.arg(0))?;
                check_length(list.borrow().len() + extra.len())?;
                list.borrow_mut().extend(extra);
                Ok(Value::None)
            }
            "remove" => {
                args.expect(1, 1, &[])?;
                let target = args.arg(0);
                let position = self.position_in(list, target, 0, i64::MAX)?;
                match position {
                    Some(index) => {
                        list.borrow_mut().remove(index);
                        Ok(Value::None)
                    }
                    None => Err(RuntimeError::value_error("list.remove(x): x not in list")),
                }
            }
            "index" => {
                args.expect(1, 3, &[])?;
                let start = if args.len() > 1 { args.int(1)? } else { 0 };
                let end = if args.len() > 2 { args.int(2)? } else { i64::MAX };
                match self.position_in(list, args.arg(0), start, end)? {
                    Some(index) => Ok(Value::Int(index as i64)),
                    None => Err(RuntimeError::value_error(format!(
                        "{} is not in list",
                        repr_string(args.arg(0))
                    ))),
                }
            }
            "count" => {
                args.expect(1, 1, &[])?;
                let items = list.borrow().clone();
                let mut count = 0;
                for item in &items {
                    if item.equals(args.arg(0))? {
                        count += 1;
                    }
                }
                Ok(Value::Int(count))
            }
            "sort" => {
                args.expect(0, 0, &["key", "reverse"])?;
                let key = args.keyword("key").cloned();
                let reverse = args.keyword("reverse").is_some_and(Value::is_truthy);
                let items = list.borrow().clone();
                let sorted = self.sort_values(items, key.as_ref(), reverse)?;
                *list.borrow_mut() = sorted;
                Ok(Value::None)
            }
            "reverse" => {
                args.expect(0, 0, &[])?;
                list.borrow_mut().reverse();
                Ok(Value::None)
            }
            "copy" => {
                args.expect(0, 0, &[])?;
                Ok(Value::list(list.borrow().clone()))
            }
            "clear" => {
                args.expect(0, 0, &[])?;
                list.borrow_mut().clear();
                Ok(Value::None)
            }
            other => Err(RuntimeError::attribute_error("list", other)),
        }
    }

    /// First index in `start..end` holding a value equal to `target`
    fn position_in(
        &self,
        list: &Rc<RefCell<Vec<Value>>>,
        target: &Value,
        start: i64,
        end: i64,
    ) -> Result<Option<usize>, RuntimeError> {
        let items = list.borrow().clone();
        let len = items.len() as i64;
        let clamp = |index: i64| {
            if index < 0 {
                (index + len).max(0)
            } else {
                index.min(len)
            }
        };
        for index in clamp(start)..clamp(end) {
            if items[index as usize].equals(target)? {
                return Ok(Some(index as usize));
            }
        }
        Ok(None)
    }

    fn call_dict_method(
        &mut self,
        map: &Rc<RefCell<DictMap>>,
        name: &str,
        args: CallArgs,
    ) -> Result<Value, RuntimeError> {
        match name {
            "get" => {
                args.expect(1, 2, &[])?;
                let key = args.arg(0).to_key()?;
                let found = map.borrow().get(&key).map(|(_, value)| value.clone());
                Ok(found.unwrap_or_else(|| args.arg(1).clone()))
            }
            "keys" => {
                args.expect(0, 0, &[])?;
                Ok(Value::list(map.borrow().values().map(|(key, _)| key.clone()).collect()))
            }
            "values" => {
                args.expect(0, 0, &[])?;
                Ok(Value::list(map.borrow().values().map(|(_, value)| value.clone()).collect()))
            }
            "items" => {
                args.expect(0, 0, &[])?;
                Ok(Value::list(
                    map.borrow()
                        .values()
                        .map(|(key, value)| Value::tuple(vec![key.clone(), value.clone()]))
                        .collect(),
                ))
            }
            "pop" => {
                args.expect(1, 2, &[])?;
                let key = args.arg(0).to_key()?;
                let removed = map.borrow_mut().shift_remove(&key);
                match (removed, args.get(1)) {
                    (Some((_, value)), _) => Ok(value),
                    (None, Some(default)) => Ok(default.clone()),
                    (None, None) => Err(RuntimeError::key_error(args.arg(0).clone())),
                }
            }
            "popitem" => {
                args.expect(0, 0, &[])?;
                let last = map.borrow_mut().pop();
                match last {
                    Some((_, (key, value))) => Ok(Value::tuple(vec![key, value])),
                    None => Err(RuntimeError::key_error(Value::str(
                        "popitem(): dictionary is empty",
                    ))),
                }
            }
            "update" => {
                let (positional, keywords) = args.into_parts();
                if positional.len() > 1 {
                    return Err(RuntimeError::type_error(format!(
                        "update expected at most 1 argument, got {}",
                        positional.len()
                    )));
                }
                if let Some(source) = positional.first() {
                    self.dict_update(map, source)?;
                }
                for (key, value) in keywords {
                    dict_insert(map, Value::str(key), value)?;
                }
                Ok(Value::None)
            }
            "setdefault" => {
                args.expect(1, 2, &[])?;
                let key = args.arg(0).to_key()?;
                let existing = map.borrow().get(&key).map(|(_, value)| value.clone());
                match existing {
                    Some(value) => Ok(value),
                    None => {
                        let default = args.arg(1).clone();
                        dict_insert(map, args.arg(0).clone(), default.clone())?;
                        Ok(default)
                    }
                }
            }
            "copy" => {
                args.expect(0, 0, &[])?;
                Ok(Value::dict(map.borrow().clone()))
            }
            "clear" => {
                args.expect(0, 0, &[])?;
                map.borrow_mut().clear();
                Ok(Value::None)
            }
            other => Err(RuntimeError::attribute_error("dict", other)),
        }
    }
}

fn call_str_method(text: &Rc<str>, name: &str, args: CallArgs) -> Result<Value, RuntimeError> {
    let text: &str = text;
    match name {
        "split" | "rsplit" => {
            args.expect(0, 2, &["sep", "maxsplit"])?;
            let sep = args.get(0).or_else(|| args.keyword("sep")).cloned();
            let maxsplit = match args.get(1).or_else(|| args.keyword("maxsplit")) {
                Some(value) => crate::interpreter::ops::index_value(value, "")?,
                None => -1,
            };
            let from_right = name == "rsplit";
            let parts = match sep {
                None | Some(Value::None) => split_whitespace(text, maxsplit, from_right),
                Some(sep) => {
                    let sep = expect_str(&sep, name)?.to_string();
                    if sep.is_empty() {
                        return Err(RuntimeError::value_error("empty separator"));
                    }
                    split_on(text, &sep, maxsplit, from_right)
                }
            };
            Ok(Value::list(parts))
        }
        "join" => {
            args.expect(1, 1, &[])?;
            let items = items_of(args.arg(0))?;
            let mut parts = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                match item {
                    Value::Str(s) => parts.push(s.to_string()),
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "sequence item {}: expected str instance, {} found",
                            index,
                            other.type_name()
                        )))
                    }
                }
            }
            let joined = parts.join(text);
            check_length(joined.len())?;
            Ok(Value::str(joined))
        }
        "strip" | "lstrip" | "rstrip" => {
            args.expect(0, 1, &[])?;
            let chars = match args.get(0) {
                None | Some(Value::None) => None,
                Some(value) => Some(expect_str(value, name)?),
            };
            let stripped = strip_chars(text, chars, name != "rstrip", name != "lstrip");
            Ok(Value::str(stripped))
        }
        "upper" => {
            args.expect(0, 0, &[])?;
            Ok(Value::str(text.to_uppercase()))
        }
        "lower" => {
            args.expect(0, 0, &[])?;
            Ok(Value::str(text.to_lowercase()))
        }
        "title" => {
            args.expect(0, 0, &[])?;
            Ok(Value::str(title_case(text)))
        }
        "capitalize" => {
            args.expect(0, 0, &[])?;
            let mut chars = text.chars();
            let capitalized = match chars.next() {
                Some(first) => {
                    let rest = chars.as_str().to_lowercase();
                    first.to_uppercase().collect::<String>() + &rest
                }
                None => String::new(),
            };
            Ok(Value::str(capitalized))
        }
        "replace" => {
            args.expect(2, 3, &[])?;
            let old = expect_str(args.arg(0), name)?;
            let new = expect_str(args.arg(1), name)?;
            let count = if args.len() == 3 { args.int(2)? } else { -1 };
            let replaced = if count < 0 {
                text.replace(old, new)
            } else {
                text.replacen(old, new, count as usize)
            };
            check_length(replaced.len())?;
            Ok(Value::str(replaced))
        }
        "startswith" | "endswith" => {
            args.expect(1, 1, &[])?;
            let candidates = match args.arg(0) {
                Value::Tuple(items) => items.to_vec(),
                other => vec![other.clone()],
            };
            for candidate in &candidates {
                let candidate = candidate.as_str().ok_or_else(|| {
                    RuntimeError::type_error(format!(
                        "{} first arg must be str or a tuple of str, not {}",
                        name,
                        candidate.type_name()
                    ))
                })?;
                let hit = if name == "startswith" {
                    text.starts_with(candidate)
                } else {
                    text.ends_with(candidate)
                };
                if hit {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "find" | "rfind" | "index" => {
            args.expect(1, 3, &[])?;
            let needle = expect_str(args.arg(0), name)?;
            let start = if args.len() > 1 { byte_offset(text, args.int(1)?) } else { 0 };
            let end = if args.len() > 2 { byte_offset(text, args.int(2)?) } else { text.len() };
            let found = if start > end {
                None
            } else {
                let window = &text[start..end];
                let position = if name == "rfind" { window.rfind(needle) } else { window.find(needle) };
                position.map(|pos| char_index(text, start + pos))
            };
            match (found, name) {
                (Some(index), _) => Ok(Value::Int(index)),
                (None, "index") => Err(RuntimeError::value_error("substring not found")),
                (None, _) => Ok(Value::Int(-1)),
            }
        }
        "count" => {
            args.expect(1, 1, &[])?;
            let needle = expect_str(args.arg(0), name)?;
            let count = if needle.is_empty() {
                text.chars().count() + 1
            } else {
                text.matches(needle).count()
            };
            Ok(Value::Int(count as i64))
        }
        "isdigit" | "isalpha" | "isalnum" | "isspace" => {
            args.expect(0, 0, &[])?;
            let test: fn(char) -> bool = match name {
                "isdigit" => |c: char| c.is_ascii_digit(),
                "isalpha" => char::is_alphabetic,
                "isalnum" => char::is_alphanumeric,
                _ => char::is_whitespace,
            };
            Ok(Value::Bool(!text.is_empty() && text.chars().all(test)))
        }
        "isupper" | "islower" => {
            args.expect(0, 0, &[])?;
            let mut cased = false;
            let mut all_match = true;
            for c in text.chars() {
                if c.is_uppercase() || c.is_lowercase() {
                    cased = true;
                    if (name == "isupper" && c.is_lowercase()) || (name == "islower" && c.is_uppercase()) {
                        all_match = false;
                    }
                }
            }
            Ok(Value::Bool(cased && all_match))
        }
        "format" => {
            let (positional, keywords) = args.into_parts();
            Ok(Value::str(format_template(text, &positional, &keywords)?))
        }
        "splitlines" => {
            args.expect(0, 0, &[])?;
            Ok(Value::list(text.lines().map(Value::str).collect()))
        }
        "zfill" => {
            args.expect(1, 1, &[])?;
            let width = args.int(0)?;
            let len = text.chars().count() as i64;
            if width <= len {
                return Ok(Value::str(text));
            }
            let zeros = "0".repeat((width - len) as usize);
            let filled = match text.strip_prefix(|c| c == '-' || c == '+') {
                Some(rest) => format!("{}{}{}", &text[..1], zeros, rest),
                None => format!("{}{}", zeros, text),
            };
            Ok(Value::str(filled))
        }
        "ljust" | "rjust" | "center" => {
            args.expect(1, 2, &[])?;
            let width = args.int(0)?;
            let fill = match args.get(1) {
                None => ' ',
                Some(value) => {
                    let fill = expect_str(value, name)?;
                    let mut chars = fill.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => c,
                        _ => {
                            return Err(RuntimeError::type_error(
                                "The fill character must be exactly one character long",
                            ))
                        }
                    }
                }
            };
            check_length(width.max(0) as usize)?;
            let align = match name {
                "ljust" => '<',
                "rjust" => '>',
                _ => '^',
            };
            Ok(Value::str(pad_to(text, width, fill, align)))
        }
        other => Err(RuntimeError::attribute_error("str", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(values: &[Value]) -> Vec<String> {
        values
            .iter()
            .map(|value| value.as_str().unwrap().to_string())
            .collect()
    }

    fn call(text: &str, name: &'static str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        call_str_method(&Rc::from(text), name, CallArgs::new(name, args, Vec::new()))
    }

    #[test]
    fn test_split() {
        assert_eq!(strs(&split_whitespace("  a b  c ", -1, false)), ["a", "b", "c"]);
        assert_eq!(strs(&split_whitespace("a b c", 1, false)), ["a", "b c"]);
        assert_eq!(strs(&split_whitespace("a b c", 1, true)), ["a b", "c"]);
        assert_eq!(strs(&split_on("a,b,,c", ",", -1, false)), ["a", "b", "", "c"]);
        assert_eq!(strs(&split_on("a,b,c", ",", 1, true)), ["a,b", "c"]);
    }

    #[test]
    fn test_strip_and_case() {
        assert_eq!(strip_chars("xxhixx", Some("x"), true, false), "hixx");
        assert_eq!(strip_chars("  hi \n", None, true, true), "hi");
        assert_eq!(title_case("hello wORLD"), "Hello World");
    }

    #[test]
    fn test_find_uses_char_indices() {
        let found = call("héllo", "find", vec![Value::str("l")]).unwrap();
        assert!(matches!(found, Value::Int(2)));
        let missing = call("abc", "find", vec![Value::str("z")]).unwrap();
        assert!(matches!(missing, Value::Int(-1)));
        let err = call("abc", "index", vec![Value::str("z")]).unwrap_err();
        assert_eq!(err.to_string(), "ValueError: substring not found");
    }

    #[test]
    fn test_padding() {
        assert_eq!(pad_to("ab", 5, '*', '<'), "ab***");
        assert_eq!(pad_to("ab", 5, '*', '>'), "***ab");
        assert_eq!(pad_to("ab", 6, '*', '^'), "**ab**");
        let filled = call("-42", "zfill", vec![Value::Int(6)]).unwrap();
        assert_eq!(filled.as_str(), Some("-00042"));
    }

    #[test]
    fn test_join_type_error() {
        let err = call(",", "join", vec![Value::list(vec![Value::str("a"), Value::Int(1)])]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: sequence item 1: expected str instance, int found"
        );
    }
}
