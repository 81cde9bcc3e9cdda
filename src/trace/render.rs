// Bounded, crash-safe rendering of runtime values

use crate::memory::repr::write_repr;
use crate::memory::value::Value;
use std::fmt::{self, Write};

/// Default maximum rendered length, in characters
pub const DEFAULT_RENDER_LIMIT: usize = 160;

const ELLIPSIS: &str = "...";

/// A `fmt::Write` sink that refuses to grow past `limit` characters
///
/// Rendering stops at the first character past the limit, so a huge list
/// costs no more than a short one.
struct BoundedWriter {
    text: String,
    chars: usize,
    limit: usize,
    overflowed: bool,
}

impl BoundedWriter {
    fn new(limit: usize) -> Self {
        BoundedWriter {
            text: String::new(),
            chars: 0,
            limit,
            overflowed: false,
        }
    }
}

impl Write for BoundedWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            if self.chars == self.limit {
                self.overflowed = true;
                return Err(fmt::Error);
            }
            self.text.push(ch);
            self.chars += 1;
        }
        Ok(())
    }
}

/// Cut `text` to `max_len - 3` characters plus `...`
fn truncate(text: &str, max_len: usize) -> String {
    if max_len < ELLIPSIS.len() {
        return text.chars().take(max_len).collect();
    }
    let mut cut: String = text.chars().take(max_len - ELLIPSIS.len()).collect();
    cut.push_str(ELLIPSIS);
    cut
}

/// Bound an already-built string to `max_len` characters
pub fn shorten(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        truncate(text, max_len)
    }
}

/// `repr(value)`, at most `max_len` characters long
///
/// Never fails: a value that cannot be converted renders as
/// `<unrenderable TYPE>`.
pub fn render(value: &Value, max_len: usize) -> String {
    let mut out = BoundedWriter::new(max_len);
    match write_repr(&mut out, value) {
        Ok(()) => out.text,
        Err(_) if out.overflowed => truncate(&out.text, max_len),
        Err(_) => shorten(&format!("<unrenderable {}>", value.type_name()), max_len),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deep_list(depth: usize) -> Value {
        let mut value = Value::list(Vec::new());
        for _ in 0..depth {
            value = Value::list(vec![value]);
        }
        value
    }

    #[test]
    fn test_short_values() {
        assert_eq!(render(&Value::Int(42), 160), "42");
        assert_eq!(render(&Value::str("hi"), 160), "'hi'");
        assert_eq!(render(&Value::None, 160), "None");
    }

    #[test]
    fn test_truncation() {
        let long = Value::list((0..1000).map(Value::Int).collect());
        let rendered = render(&long, 20);
        assert_eq!(rendered.chars().count(), 20);
        assert!(rendered.starts_with("[0, 1, 2"));
        assert!(rendered.ends_with("..."));

        let exact = Value::str("abcdefgh");
        assert_eq!(render(&exact, 10), "'abcdefgh'");
        assert_eq!(render(&exact, 9), "'abcde...");
    }

    #[test]
    fn test_unrenderable() {
        let value = deep_list(1_000);
        let rendered = render(&value, 160);
        assert!(rendered.chars().count() <= 160);
        // Too deep: either cut off by the bound or replaced by the placeholder
        assert!(rendered.ends_with("...") || rendered == "<unrenderable list>");

        let busy = Value::list(vec![Value::Int(1)]);
        let Value::List(items) = &busy else {
            unreachable!()
        };
        let _guard = items.borrow_mut();
        assert_eq!(render(&busy, 160), "<unrenderable list>");
        assert_eq!(render(&busy, 8), "<unre...");
    }

    #[test]
    fn test_length_bound_holds_for_all_limits() {
        let value = Value::str("é".repeat(50));
        for limit in 0..60 {
            assert!(render(&value, limit).chars().count() <= limit);
        }
    }

    #[test]
    fn test_shorten() {
        assert_eq!(shorten("abc", 3), "abc");
        assert_eq!(shorten("abcdef", 5), "ab...");
    }
}
