//! String formatting
//!
//! - [`format_value`]: the format-spec mini-language (`f"{x:>8.2f}"`,
//!   `format(x, spec)`)
//! - [`format_template`]: `str.format` replacement fields
//! - [`percent_format`]: `%`-style interpolation

use crate::interpreter::errors::RuntimeError;
use crate::memory::repr::{format_float, try_repr, try_str};
use crate::memory::value::Value;

/// Parsed `[[fill]align][sign][#][0][width][grouping][.precision][type]`
#[derive(Debug, Clone, PartialEq)]
struct FormatSpec {
    fill: char,
    align: Option<char>,
    sign: char,
    alternate: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

impl Default for FormatSpec {
    fn default() -> Self {
        FormatSpec {
            fill: ' ',
            align: None,
            sign: '-',
            alternate: false,
            width: 0,
            grouping: None,
            precision: None,
            kind: None,
        }
    }
}

fn is_align(c: char) -> bool {
    matches!(c, '<' | '>' | '^' | '=')
}

fn parse_spec(spec: &str) -> Result<FormatSpec, RuntimeError> {
    let chars: Vec<char> = spec.chars().collect();
    let mut parsed = FormatSpec::default();
    let mut i = 0;

    if chars.len() >= 2 && is_align(chars[1]) {
        parsed.fill = chars[0];
        parsed.align = Some(chars[1]);
        i = 2;
    } else if !chars.is_empty() && is_align(chars[0]) {
        parsed.align = Some(chars[0]);
        i = 1;
    }

    if let Some(&c) = chars.get(i) {
        if matches!(c, '+' | '-' | ' ') {
            parsed.sign = c;
            i += 1;
        }
    }
    if chars.get(i) == Some(&'#') {
        parsed.alternate = true;
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        if parsed.align.is_none() {
            parsed.fill = '0';
            parsed.align = Some('=');
        }
        i += 1;
    }

    let mut width = String::new();
    while let Some(c) = chars.get(i).filter(|c| c.is_ascii_digit()) {
        width.push(*c);
        i += 1;
    }
    if !width.is_empty() {
        parsed.width = width
            .parse()
            .map_err(|_| RuntimeError::value_error("Too many decimal digits in format string"))?;
    }

    if let Some(&c) = chars.get(i) {
        if c == ',' || c == '_' {
            parsed.grouping = Some(c);
            i += 1;
        }
    }

    if chars.get(i) == Some(&'.') {
        i += 1;
        let mut precision = String::new();
        while let Some(c) = chars.get(i).filter(|c| c.is_ascii_digit()) {
            precision.push(*c);
            i += 1;
        }
        if precision.is_empty() {
            return Err(RuntimeError::value_error("Format specifier missing precision"));
        }
        parsed.precision = Some(
            precision
                .parse()
                .map_err(|_| RuntimeError::value_error("Too many decimal digits in format string"))?,
        );
    }

    if let Some(&c) = chars.get(i) {
        parsed.kind = Some(c);
        i += 1;
    }
    if i != chars.len() {
        return Err(RuntimeError::value_error("Invalid format specifier"));
    }
    Ok(parsed)
}

/// Apply `format(value, spec)`
pub fn format_value(value: &Value, spec: &str) -> Result<String, RuntimeError> {
    if spec.is_empty() {
        return Ok(try_str(value)?);
    }
    let spec = parse_spec(spec)?;

    match value {
        Value::Str(text) => {
            if !matches!(spec.kind, None | Some('s')) {
                return Err(unknown_code(&spec, value));
            }
            let body: String = match spec.precision {
                Some(precision) => text.chars().take(precision).collect(),
                None => text.to_string(),
            };
            Ok(pad(&body, "", &spec, '<'))
        }
        Value::Int(_) | Value::Bool(_) => {
            let n = value.as_int().unwrap_or(0);
            match spec.kind {
                None | Some('d') | Some('n') => {
                    let digits = group(&n.unsigned_abs().to_string(), spec.grouping);
                    Ok(pad(&digits, sign_of(n < 0, spec.sign), &spec, '>'))
                }
                Some(radix @ ('b' | 'o' | 'x' | 'X')) => {
                    let magnitude = n.unsigned_abs();
                    let (digits, prefix) = match radix {
                        'b' => (format!("{:b}", magnitude), "0b"),
                        'o' => (format!("{:o}", magnitude), "0o"),
                        'x' => (format!("{:x}", magnitude), "0x"),
                        _ => (format!("{:X}", magnitude), "0X"),
                    };
                    let mut sign = sign_of(n < 0, spec.sign).to_string();
                    if spec.alternate {
                        sign.push_str(prefix);
                    }
                    Ok(pad(&digits, &sign, &spec, '>'))
                }
                Some('c') => {
                    let c = u32::try_from(n)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| RuntimeError::new(
                            crate::interpreter::errors::ExceptionKind::OverflowError,
                            "%c arg not in range(0x110000)",
                        ))?;
                    Ok(pad(&c.to_string(), "", &spec, '<'))
                }
                Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%') => format_float_spec(n as f64, &spec),
                Some(_) => Err(unknown_code(&spec, value)),
            }
        }
        Value::Float(f) => match spec.kind {
            None | Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%') => format_float_spec(*f, &spec),
            Some(_) => Err(unknown_code(&spec, value)),
        },
        other => Err(RuntimeError::type_error(format!(
            "unsupported format string passed to {}.__format__",
            other.type_name()
        ))),
    }
}

fn unknown_code(spec: &FormatSpec, value: &Value) -> RuntimeError {
    RuntimeError::value_error(format!(
        "Unknown format code '{}' for object of type '{}'",
        spec.kind.unwrap_or('?'),
        value.type_name()
    ))
}

fn sign_of(negative: bool, sign: char) -> &'static str {
    match (negative, sign) {
        (true, _) => "-",
        (false, '+') => "+",
        (false, ' ') => " ",
        _ => "",
    }
}

/// Insert a grouping separator every three digits of the integer part
fn group(digits: &str, separator: Option<char>) -> String {
    let Some(separator) = separator else {
        return digits.to_string();
    };
    let (int_part, rest) = match digits.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => digits.split_at(pos),
        None => (digits, ""),
    };
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(separator);
        }
        grouped.push(c);
    }
    grouped.push_str(rest);
    grouped
}

fn pad(body: &str, sign: &str, spec: &FormatSpec, default_align: char) -> String {
    let len = sign.chars().count() + body.chars().count();
    if spec.width <= len {
        return format!("{}{}", sign, body);
    }
    let padding = spec.width - len;
    let fill = |n: usize| spec.fill.to_string().repeat(n);
    match spec.align.unwrap_or(default_align) {
        '<' => format!("{}{}{}", sign, body, fill(padding)),
        '^' => format!(
            "{}{}{}{}",
            fill(padding / 2),
            sign,
            body,
            fill(padding - padding / 2)
        ),
        '=' => format!("{}{}{}", sign, fill(padding), body),
        _ => format!("{}{}{}", fill(padding), sign, body),
    }
}

fn format_float_spec(value: f64, spec: &FormatSpec) -> Result<String, RuntimeError> {
    let magnitude = value.abs();
    let negative = value.is_sign_negative() && !value.is_nan();
    let kind = spec.kind;
    let upper = matches!(kind, Some('E' | 'F' | 'G'));

    let body = if !magnitude.is_finite() {
        let text = if magnitude.is_nan() { "nan" } else { "inf" };
        let text = if kind == Some('%') {
            format!("{}%", text)
        } else {
            text.to_string()
        };
        if upper {
            text.to_uppercase()
        } else {
            text
        }
    } else {
        match kind {
            Some('f' | 'F') => format!("{:.*}", spec.precision.unwrap_or(6), magnitude),
            Some('e' | 'E') => scientific(magnitude, spec.precision.unwrap_or(6), upper),
            Some('%') => format!("{:.*}%", spec.precision.unwrap_or(6), magnitude * 100.0),
            Some('g' | 'G') => general(magnitude, spec.precision.unwrap_or(6), spec.alternate, upper),
            _ => match spec.precision {
                Some(precision) => {
                    let text = general(magnitude, precision, spec.alternate, false);
                    if text.contains(|c| c == '.' || c == 'e') {
                        text
                    } else {
                        format!("{}.0", text)
                    }
                }
                None => format_float(magnitude),
            },
        }
    };

    let body = group(&body, spec.grouping);
    Ok(pad(&body, sign_of(negative, spec.sign), spec, '>'))
}

/// `d.ddde±XX`
fn scientific(value: f64, precision: usize, upper: bool) -> String {
    let text = format!("{:.*e}", precision, value);
    let (mantissa, exponent) = text.split_once('e').unwrap_or((&text, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let e = if upper { 'E' } else { 'e' };
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{}{}{}{:02}", mantissa, e, sign, exponent.abs())
}

/// The `g` presentation type
fn general(value: f64, precision: usize, alternate: bool, upper: bool) -> String {
    let precision = precision.max(1);
    if value == 0.0 {
        return if alternate {
            format!("{:.*}", precision - 1, 0.0)
        } else {
            "0".to_string()
        };
    }
    let rounded = format!("{:.*e}", precision - 1, value);
    let exponent: i32 = rounded
        .split_once('e')
        .and_then(|(_, exp)| exp.parse().ok())
        .unwrap_or(0);

    let strip = |text: String| -> String {
        if alternate || !text.contains('.') {
            text
        } else {
            text.trim_end_matches('0').trim_end_matches('.').to_string()
        }
    };

    if exponent >= -4 && exponent < precision as i32 {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        strip(format!("{:.*}", decimals, value))
    } else {
        let text = scientific(value, precision - 1, upper);
        match text.find(|c| c == 'e' || c == 'E') {
            Some(pos) => {
                let (mantissa, exponent) = text.split_at(pos);
                format!("{}{}", strip(mantissa.to_string()), exponent)
            }
            None => text,
        }
    }
}

/// `template.format(*args, **kwargs)`
pub fn format_template(
    template: &str,
    args: &[Value],
    kwargs: &[(String, Value)],
) -> Result<String, RuntimeError> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut auto_index = 0usize;
    let mut manual = false;
    let mut automatic = false;

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(RuntimeError::value_error(
                    "Single '}' encountered in format string",
                ))
            }
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    field.push(c);
                }
                if !closed {
                    return Err(RuntimeError::value_error(
                        "Single '{' encountered in format string",
                    ));
                }

                let (field, spec) = match field.split_once(':') {
                    Some((name, spec)) => (name.to_string(), spec.to_string()),
                    None => (field, String::new()),
                };
                let (name, conversion) = match field.split_once('!') {
                    Some((name, conversion)) => (name.to_string(), conversion.chars().next()),
                    None => (field, None),
                };

                let value = if name.is_empty() {
                    if manual {
                        return Err(RuntimeError::value_error(
                            "cannot switch from manual field specification to automatic field numbering",
                        ));
                    }
                    automatic = true;
                    let value = positional(args, auto_index)?;
                    auto_index += 1;
                    value
                } else if let Ok(index) = name.parse::<usize>() {
                    if automatic {
                        return Err(RuntimeError::value_error(
                            "cannot switch from automatic field numbering to manual field specification",
                        ));
                    }
                    manual = true;
                    positional(args, index)?
                } else {
                    kwargs
                        .iter()
                        .find(|(key, _)| *key == name)
                        .map(|(_, value)| value.clone())
                        .ok_or_else(|| RuntimeError::key_error(Value::str(&name)))?
                };

                out.push_str(&convert_and_format(&value, conversion, &spec)?);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

fn positional(args: &[Value], index: usize) -> Result<Value, RuntimeError> {
    args.get(index).cloned().ok_or_else(|| {
        RuntimeError::index_error(format!(
            "Replacement index {} out of range for positional args tuple",
            index
        ))
    })
}

/// Apply an optional `!r`/`!s` conversion, then a format spec
pub fn convert_and_format(
    value: &Value,
    conversion: Option<char>,
    spec: &str,
) -> Result<String, RuntimeError> {
    let converted = match conversion {
        None => None,
        Some('r' | 'a') => Some(Value::str(try_repr(value)?)),
        Some('s') => Some(Value::str(try_str(value)?)),
        Some(other) => {
            return Err(RuntimeError::value_error(format!(
                "Unknown conversion specifier {}",
                other
            )))
        }
    };
    format_value(converted.as_ref().unwrap_or(value), spec)
}

/// `template % args`
pub fn percent_format(template: &str, args: &Value) -> Result<String, RuntimeError> {
    let values: Vec<Value> = match args {
        Value::Tuple(items) => items.to_vec(),
        other => vec![other.clone()],
    };
    let mut next = values.iter();
    let mut out = String::new();
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let start = i;
        i += 1;

        let mut spec = FormatSpec::default();
        while let Some(&flag) = chars.get(i) {
            match flag {
                '-' => spec.align = Some('<'),
                '+' | ' ' => spec.sign = flag,
                '0' => {
                    if spec.align.is_none() {
                        spec.fill = '0';
                        spec.align = Some('=');
                    }
                }
                '#' => spec.alternate = true,
                _ => break,
            }
            i += 1;
        }
        if spec.align == Some('<') {
            spec.fill = ' ';
        }
        while let Some(digit) = chars.get(i).and_then(|c| c.to_digit(10)) {
            spec.width = spec.width * 10 + digit as usize;
            i += 1;
        }
        if chars.get(i) == Some(&'.') {
            i += 1;
            let mut precision = 0;
            while let Some(digit) = chars.get(i).and_then(|c| c.to_digit(10)) {
                precision = precision * 10 + digit as usize;
                i += 1;
            }
            spec.precision = Some(precision);
        }

        let Some(&conversion) = chars.get(i) else {
            return Err(RuntimeError::value_error("incomplete format"));
        };
        i += 1;

        if conversion == '%' {
            out.push('%');
            continue;
        }
        let value = next.next().ok_or_else(|| {
            RuntimeError::type_error("not enough arguments for format string")
        })?;

        let text = match conversion {
            's' => pad(&try_str(value)?, "", &spec, '>'),
            'r' | 'a' => pad(&try_repr(value)?, "", &spec, '>'),
            'd' | 'i' | 'u' => {
                let n = match value {
                    Value::Float(f) => f.trunc() as i64,
                    other => other.as_int().ok_or_else(|| {
                        RuntimeError::type_error(format!(
                            "%{} format: a real number is required, not {}",
                            conversion,
                            other.type_name()
                        ))
                    })?,
                };
                pad(&n.unsigned_abs().to_string(), sign_of(n < 0, spec.sign), &spec, '>')
            }
            'x' | 'X' | 'o' => {
                spec.kind = Some(conversion);
                if value.as_int().is_none() {
                    return Err(RuntimeError::type_error(format!(
                        "%{} format: an integer is required, not {}",
                        conversion,
                        value.type_name()
                    )));
                }
                format_value(value, &render_spec(&spec))?
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
                let f = value.as_float().ok_or_else(|| {
                    RuntimeError::type_error(format!(
                        "must be real number, not {}",
                        value.type_name()
                    ))
                })?;
                spec.kind = Some(conversion);
                format_float_spec(f, &spec)?
            }
            'c' => match value {
                Value::Str(s) if s.chars().count() == 1 => pad(s, "", &spec, '>'),
                other => {
                    let c = other
                        .as_int()
                        .and_then(|n| u32::try_from(n).ok())
                        .and_then(char::from_u32)
                        .ok_or_else(|| RuntimeError::type_error("%c requires int or char"))?;
                    pad(&c.to_string(), "", &spec, '>')
                }
            },
            other => {
                return Err(RuntimeError::value_error(format!(
                    "unsupported format character '{}' ({:#x}) at index {}",
                    other,
                    other as u32,
                    start + 1
                )))
            }
        };
        out.push_str(&text);
    }

    if next.next().is_some() {
        return Err(RuntimeError::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

/// Rebuild a spec string for integer presentation types
fn render_spec(spec: &FormatSpec) -> String {
    let mut text = String::new();
    if let Some(align) = spec.align {
        text.push(spec.fill);
        text.push(align);
    }
    if spec.sign != '-' {
        text.push(spec.sign);
    }
    if spec.alternate {
        text.push('#');
    }
    if spec.width > 0 {
        text.push_str(&spec.width.to_string());
    }
    if let Some(kind) = spec.kind {
        text.push(kind);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_spec() {
        assert_eq!(format_value(&Value::Float(3.14159), ".2f").unwrap(), "3.14");
        assert_eq!(format_value(&Value::Int(42), ">5").unwrap(), "   42");
        assert_eq!(format_value(&Value::Int(42), "05d").unwrap(), "00042");
        assert_eq!(format_value(&Value::Int(-42), "05d").unwrap(), "-0042");
        assert_eq!(format_value(&Value::str("ab"), "*^6").unwrap(), "**ab**");
        assert_eq!(format_value(&Value::Int(1234567), ",").unwrap(), "1,234,567");
        assert_eq!(format_value(&Value::Int(255), "#x").unwrap(), "0xff");
        assert_eq!(format_value(&Value::Float(0.25), ".0%").unwrap(), "25%");
        assert_eq!(format_value(&Value::Float(12345.678), "e").unwrap(), "1.234568e+04");
    }

    #[test]
    fn test_general_format() {
        assert_eq!(format_value(&Value::Float(0.0001234), "g").unwrap(), "0.0001234");
        assert_eq!(format_value(&Value::Float(1234567.0), "g").unwrap(), "1.23457e+06");
        assert_eq!(format_value(&Value::Float(2.5), "g").unwrap(), "2.5");
        assert_eq!(format_value(&Value::Float(1.0), ".3").unwrap(), "1.0");
    }

    #[test]
    fn test_format_errors() {
        let err = format_value(&Value::str("x"), "d").unwrap_err();
        assert_eq!(
            err.to_string(),
            "ValueError: Unknown format code 'd' for object of type 'str'"
        );
        assert!(format_value(&Value::list(Vec::new()), ">3").is_err());
    }

    #[test]
    fn test_format_template() {
        let args = [Value::Int(1), Value::str("two")];
        let kwargs = [("name".to_string(), Value::str("x"))];
        assert_eq!(
            format_template("{} and {!r}, {name}", &args, &kwargs).unwrap(),
            "1 and 'two', x"
        );
        assert_eq!(format_template("{1}{0}{{}}", &args, &[]).unwrap(), "two1{}");
        assert!(format_template("{5}", &args, &[]).is_err());
    }

    #[test]
    fn test_percent_format() {
        let args = Value::tuple(vec![Value::str("pi"), Value::Float(3.14159)]);
        assert_eq!(percent_format("%s=%.2f", &args).unwrap(), "pi=3.14");
        assert_eq!(percent_format("%5d|%-4d|", &Value::tuple(vec![Value::Int(7), Value::Int(8)])).unwrap(), "    7|8   |");
        assert_eq!(percent_format("100%%", &Value::tuple(Vec::new())).unwrap(), "100%");

        let err = percent_format("%d %d", &Value::Int(1)).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: not enough arguments for format string");
        let err = percent_format("%d", &Value::tuple(vec![Value::Int(1), Value::Int(2)])).unwrap_err();
        assert!(err.to_string().contains("not all arguments converted"));
    }
}
