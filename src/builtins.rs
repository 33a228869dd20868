//! Free-standing builtins callable from any expression position, as
//! opposed to the prototype methods in [`crate::value::prototypes`] which
//! are only reachable through `receiver.method(...)` syntax.

use crate::value::{encode_json, new_cell, print_string, Cell, NativeCtx, NativeResult, Value};

/// A width specifier between `%` and the directive letter: an optional
/// `-` (left-justify) followed by a decimal magnitude, where a leading
/// `0` digit requests zero-padding instead of spaces. Magnitude is
/// capped well below any realistic format string to bound resource use.
struct Width {
    magnitude: usize,
    left_justify: bool,
    zero_pad: bool,
}

const MAX_PRINTF_WIDTH: usize = 65_536;

fn parse_width(chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<Width> {
    let left_justify = chars.peek() == Some(&'-');
    if left_justify {
        chars.next();
    }
    let mut digits = String::new();
    while chars.peek().is_some_and(|c| c.is_ascii_digit()) {
        digits.push(chars.next().unwrap());
    }
    if digits.is_empty() {
        return None;
    }
    let zero_pad = !left_justify && digits.starts_with('0') && digits.len() > 1;
    let magnitude = digits.parse::<usize>().unwrap_or(0).min(MAX_PRINTF_WIDTH);
    Some(Width { magnitude, left_justify, zero_pad })
}

fn apply_width(text: &str, width: &Option<Width>) -> String {
    let Some(width) = width else {
        return text.to_string();
    };
    let len = text.chars().count();
    if len >= width.magnitude {
        return text.to_string();
    }
    let pad = width.magnitude - len;
    if width.left_justify {
        format!("{text}{}", " ".repeat(pad))
    } else if width.zero_pad {
        match text.strip_prefix('-') {
            Some(rest) => format!("-{}{rest}", "0".repeat(pad)),
            None => format!("{}{text}", "0".repeat(pad)),
        }
    } else {
        format!("{}{text}", " ".repeat(pad))
    }
}

/// Directives: `%s` (stringify), `%f` (numeric), `%v` (the same
/// rendering `print` uses for any value), `%%` (literal percent). Each
/// of `%s`/`%f`/`%v` accepts an optional width specifier (e.g. `%-8s`,
/// `%08f`). An unrecognised directive is a runtime error rather than
/// being passed through verbatim.
pub fn printf(_ctx: &mut NativeCtx, args: &[Cell]) -> NativeResult {
    let Some(format_arg) = args.first() else {
        return Err("printf() requires a format string".into());
    };
    let format = match &*format_arg.borrow() {
        Value::Str(s) => s.clone(),
        other => return Err(format!("printf() format must be a string, found {}", other.type_name())),
    };
    let rest = &args[1..];
    let mut out = String::new();
    let mut chars = format.chars().peekable();
    let mut arg_idx = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let width = parse_width(&mut chars);
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') => {
                let arg = next_arg(rest, &mut arg_idx)?;
                out.push_str(&apply_width(&print_string(&arg), &width));
            }
            Some('f') => {
                let arg = next_arg(rest, &mut arg_idx)?;
                let n = arg.borrow().as_num().ok_or_else(|| {
                    format!("printf(): %f expects a number, found {}", arg.borrow().type_name())
                })?;
                out.push_str(&apply_width(&format!("{n}"), &width));
            }
            Some('v') => {
                let arg = next_arg(rest, &mut arg_idx)?;
                out.push_str(&apply_width(&print_string(&arg), &width));
            }
            Some(other) => return Err(format!("printf(): unknown format directive '%{other}'")),
            None => return Err("printf(): dangling '%' at end of format string".into()),
        }
    }

    Ok(new_cell(Value::Str(out)))
}

fn next_arg(args: &[Cell], idx: &mut usize) -> Result<Cell, String> {
    let arg = args
        .get(*idx)
        .cloned()
        .ok_or_else(|| "printf(): not enough arguments for format string".to_string())?;
    *idx += 1;
    Ok(arg)
}

/// `json(value)`: the indented, order-preserving JSON rendering. Unlike
/// `print`, a cycle is a runtime error rather than a placeholder.
pub fn json(_ctx: &mut NativeCtx, args: &[Cell]) -> NativeResult {
    let Some(value) = args.first() else {
        return Err("json() requires one argument".into());
    };
    encode_json(value)
        .map(|text| new_cell(Value::Str(text)))
        .map_err(|_| "error creating JSON: circular reference".to_string())
}

/// `num(value)`: permissive float parse. Trims surrounding whitespace
/// first, then defers to Rust's own `f64` grammar; any value that is
/// already a number passes through, and anything else that fails to
/// parse yields `Null` rather than an error.
pub fn num(_ctx: &mut NativeCtx, args: &[Cell]) -> NativeResult {
    let Some(value) = args.first() else {
        return Err("num() requires one argument".into());
    };
    let result = match &*value.borrow() {
        Value::Num(n) => Value::Num(*n),
        Value::Bool(b) => Value::Num(if *b { 1.0 } else { 0.0 }),
        Value::Str(s) => match s.trim().parse::<f64>() {
            Ok(n) => Value::Num(n),
            Err(_) => Value::Null,
        },
        _ => Value::Null,
    };
    Ok(new_cell(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::new_cell;

    fn ctx<'a>(out: &'a mut Vec<u8>, call: &'a mut dyn FnMut(&Cell, &[Cell]) -> NativeResult) -> NativeCtx<'a> {
        NativeCtx { output: out, call }
    }

    #[test]
    fn printf_interpolates_s_and_f() {
        let mut out = vec![];
        let mut noop = |_: &Cell, _: &[Cell]| -> NativeResult { Err("no calls".into()) };
        let mut c = ctx(&mut out, &mut noop);
        let args = vec![
            new_cell(Value::Str("%s is %f".into())),
            new_cell(Value::Str("x".into())),
            new_cell(Value::Num(3.5)),
        ];
        let result = printf(&mut c, &args).unwrap();
        assert_eq!(print_string(&result), "x is 3.5");
    }

    #[test]
    fn printf_left_justifies_with_a_negative_width() {
        let mut out = vec![];
        let mut noop = |_: &Cell, _: &[Cell]| -> NativeResult { Err("no calls".into()) };
        let mut c = ctx(&mut out, &mut noop);
        let args = vec![new_cell(Value::Str("[%-8f]".into())), new_cell(Value::Num(3.5))];
        let result = printf(&mut c, &args).unwrap();
        assert_eq!(print_string(&result), "[3.5     ]");
    }

    #[test]
    fn printf_zero_pads_with_a_leading_zero_width() {
        let mut out = vec![];
        let mut noop = |_: &Cell, _: &[Cell]| -> NativeResult { Err("no calls".into()) };
        let mut c = ctx(&mut out, &mut noop);
        let args = vec![new_cell(Value::Str("%08f".into())), new_cell(Value::Num(3.5))];
        let result = printf(&mut c, &args).unwrap();
        assert_eq!(print_string(&result), "000003.5");
    }

    #[test]
    fn printf_pads_s_and_v_directives_too() {
        let mut out = vec![];
        let mut noop = |_: &Cell, _: &[Cell]| -> NativeResult { Err("no calls".into()) };
        let mut c = ctx(&mut out, &mut noop);
        let args = vec![new_cell(Value::Str("[%5s]".into())), new_cell(Value::Str("hi".into()))];
        let result = printf(&mut c, &args).unwrap();
        assert_eq!(print_string(&result), "[   hi]");
    }

    #[test]
    fn num_parses_trimmed_floats_and_falls_back_to_null() {
        let mut out = vec![];
        let mut noop = |_: &Cell, _: &[Cell]| -> NativeResult { Err("no calls".into()) };
        let mut c = ctx(&mut out, &mut noop);
        let good = num(&mut c, &[new_cell(Value::Str("  42.5  ".into()))]).unwrap();
        assert_eq!(good.borrow().as_num(), Some(42.5));
        let bad = num(&mut c, &[new_cell(Value::Str("nope".into()))]).unwrap();
        assert!(matches!(&*bad.borrow(), Value::Null));
    }

    #[test]
    fn json_errors_on_cycle() {
        let mut out = vec![];
        let mut noop = |_: &Cell, _: &[Cell]| -> NativeResult { Err("no calls".into()) };
        let mut c = ctx(&mut out, &mut noop);
        let array = new_cell(Value::Array(vec![]));
        if let Value::Array(items) = &mut *array.borrow_mut() {
            items.push(array.clone());
        }
        assert!(json(&mut c, &[array]).is_err());
    }
}
