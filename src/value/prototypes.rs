//! Per-tag singleton method tables. Method lookup is dispatched on a
//! value's tag to a fixed mapping from name to native function — values
//! have no inheritance relationship between each other.

use std::cmp::Ordering;
use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::{new_cell, Cell, NativeCtx, NativeFn, NativeMethod, NativeResult, ObjectValue, Value};

static STRING_METHODS: Lazy<HashMap<&'static str, NativeFn>> = Lazy::new(|| {
    HashMap::from([
        ("length", string_length as NativeFn),
        ("upper", string_upper as NativeFn),
        ("lower", string_lower as NativeFn),
        ("split", string_split as NativeFn),
        ("trim", string_trim as NativeFn),
    ])
});

static ARRAY_METHODS: Lazy<HashMap<&'static str, NativeFn>> = Lazy::new(|| {
    HashMap::from([
        ("length", array_length as NativeFn),
        ("push", array_push as NativeFn),
        ("pop", array_pop as NativeFn),
        ("popfirst", array_popfirst as NativeFn),
        ("contains", array_contains as NativeFn),
        ("sort", array_sort as NativeFn),
    ])
});

static OBJECT_METHODS: Lazy<HashMap<&'static str, NativeFn>> = Lazy::new(|| {
    HashMap::from([
        ("length", object_length as NativeFn),
        ("pluck", object_pluck as NativeFn),
        ("pairs", object_pairs as NativeFn),
    ])
});

static NUMBER_METHODS: Lazy<HashMap<&'static str, NativeFn>> = Lazy::new(|| {
    HashMap::from([
        ("floor", number_floor as NativeFn),
        ("ceil", number_ceil as NativeFn),
        ("round", number_round as NativeFn),
        ("abs", number_abs as NativeFn),
        ("mod", number_mod as NativeFn),
        ("format", number_format as NativeFn),
    ])
});

/// `Unknown` has no real shape to report a length for; `length()` on one
/// is the one prototype method the source is known to call on a
/// never-assigned value, so it resolves to the simplest consistent
/// answer, zero, rather than an error.
static UNKNOWN_METHODS: Lazy<HashMap<&'static str, NativeFn>> =
    Lazy::new(|| HashMap::from([("length", unknown_length as NativeFn)]));

/// Looks a method up on `value`'s prototype. Does not set `binding` — the
/// caller (property access in the evaluator) does that, since a bare
/// reference to the same method obtained another way should have none.
pub fn lookup(value: &Value, name: &str) -> Option<NativeMethod> {
    let table = match value {
        Value::Str(_) => &*STRING_METHODS,
        Value::Array(_) => &*ARRAY_METHODS,
        Value::Object(_) => &*OBJECT_METHODS,
        Value::Num(_) => &*NUMBER_METHODS,
        Value::Unknown => &*UNKNOWN_METHODS,
        _ => return None,
    };
    table.get(name).map(|func| NativeMethod {
        name: leak_name(name),
        func: *func,
        binding: None,
    })
}

/// Method names are looked up by borrowed `&str`; we hand back a
/// `'static` name for display purposes by matching against the known
/// table keys instead of allocating on every lookup.
fn leak_name(name: &str) -> &'static str {
    const KNOWN: &[&str] = &[
        "length", "upper", "lower", "split", "trim", "push", "pop", "popfirst", "contains",
        "sort", "pluck", "pairs", "floor", "ceil", "round", "abs", "mod", "format",
    ];
    KNOWN.iter().find(|k| **k == name).copied().unwrap_or("method")
}

fn this_str(receiver: Option<&Cell>) -> Result<String, String> {
    let Some(cell) = receiver else {
        return Err("method called without a receiver".into());
    };
    match &*cell.borrow() {
        Value::Str(s) => Ok(s.clone()),
        other => Err(format!("expected a string receiver, found {}", other.type_name())),
    }
}

fn this_cell(receiver: Option<&Cell>) -> Result<Cell, String> {
    receiver
        .cloned()
        .ok_or_else(|| "method called without a receiver".to_string())
}

fn this_num(receiver: Option<&Cell>) -> Result<f64, String> {
    let Some(cell) = receiver else {
        return Err("method called without a receiver".into());
    };
    match &*cell.borrow() {
        Value::Num(n) => Ok(*n),
        other => Err(format!("expected a number receiver, found {}", other.type_name())),
    }
}

fn string_length(_ctx: &mut NativeCtx, receiver: Option<&Cell>, _args: &[Cell]) -> NativeResult {
    let s = this_str(receiver)?;
    Ok(new_cell(Value::Num(s.chars().count() as f64)))
}

fn unknown_length(_ctx: &mut NativeCtx, _receiver: Option<&Cell>, _args: &[Cell]) -> NativeResult {
    Ok(new_cell(Value::Num(0.0)))
}

fn string_upper(_ctx: &mut NativeCtx, receiver: Option<&Cell>, _args: &[Cell]) -> NativeResult {
    let s = this_str(receiver)?;
    Ok(new_cell(Value::Str(s.to_uppercase())))
}

fn string_lower(_ctx: &mut NativeCtx, receiver: Option<&Cell>, _args: &[Cell]) -> NativeResult {
    let s = this_str(receiver)?;
    Ok(new_cell(Value::Str(s.to_lowercase())))
}

fn string_trim(_ctx: &mut NativeCtx, receiver: Option<&Cell>, _args: &[Cell]) -> NativeResult {
    let s = this_str(receiver)?;
    Ok(new_cell(Value::Str(s.trim().to_string())))
}

fn string_split(_ctx: &mut NativeCtx, receiver: Option<&Cell>, args: &[Cell]) -> NativeResult {
    let s = this_str(receiver)?;
    let Some(sep) = args.first() else {
        return Err("split() requires a separator argument".into());
    };
    let pieces: Vec<String> = match &*sep.borrow() {
        Value::Regex(pattern) => {
            let re = regex::Regex::new(pattern).map_err(|e| format!("invalid regex: {e}"))?;
            re.split(&s).map(|piece| piece.to_string()).collect()
        }
        Value::Str(literal) => s.split(literal.as_str()).map(|piece| piece.to_string()).collect(),
        other => return Err(format!("split() expects a regex or string, found {}", other.type_name())),
    };
    let items = pieces.into_iter().map(|p| new_cell(Value::Str(p))).collect();
    Ok(new_cell(Value::Array(items)))
}

fn array_length(_ctx: &mut NativeCtx, receiver: Option<&Cell>, _args: &[Cell]) -> NativeResult {
    let cell = this_cell(receiver)?;
    let len = match &*cell.borrow() {
        Value::Array(items) => items.len(),
        other => return Err(format!("expected an array receiver, found {}", other.type_name())),
    };
    Ok(new_cell(Value::Num(len as f64)))
}

fn array_push(_ctx: &mut NativeCtx, receiver: Option<&Cell>, args: &[Cell]) -> NativeResult {
    let cell = this_cell(receiver)?;
    let mut value = cell.borrow_mut();
    match &mut *value {
        Value::Array(items) => {
            for arg in args {
                items.push(new_cell(arg.borrow().clone()));
            }
            Ok(new_cell(Value::Num(items.len() as f64)))
        }
        other => Err(format!("expected an array receiver, found {}", other.type_name())),
    }
}

fn array_pop(_ctx: &mut NativeCtx, receiver: Option<&Cell>, _args: &[Cell]) -> NativeResult {
    let cell = this_cell(receiver)?;
    let mut value = cell.borrow_mut();
    match &mut *value {
        Value::Array(items) => Ok(items.pop().unwrap_or_else(|| new_cell(Value::Null))),
        other => Err(format!("expected an array receiver, found {}", other.type_name())),
    }
}

fn array_popfirst(_ctx: &mut NativeCtx, receiver: Option<&Cell>, _args: &[Cell]) -> NativeResult {
    let cell = this_cell(receiver)?;
    let mut value = cell.borrow_mut();
    match &mut *value {
        Value::Array(items) => {
            if items.is_empty() {
                Ok(new_cell(Value::Null))
            } else {
                Ok(items.remove(0))
            }
        }
        other => Err(format!("expected an array receiver, found {}", other.type_name())),
    }
}

fn array_contains(_ctx: &mut NativeCtx, receiver: Option<&Cell>, args: &[Cell]) -> NativeResult {
    let cell = this_cell(receiver)?;
    let Some(needle) = args.first() else {
        return Err("contains() requires an argument".into());
    };
    let value = cell.borrow();
    match &*value {
        Value::Array(items) => {
            let found = items
                .iter()
                .any(|item| super::equals(item, needle));
            Ok(new_cell(Value::Bool(found)))
        }
        other => Err(format!("expected an array receiver, found {}", other.type_name())),
    }
}

fn array_sort(ctx: &mut NativeCtx, receiver: Option<&Cell>, args: &[Cell]) -> NativeResult {
    let cell = this_cell(receiver)?;
    let comparator = args.first().cloned();
    let mut items = match &*cell.borrow() {
        Value::Array(items) => items.clone(),
        other => return Err(format!("expected an array receiver, found {}", other.type_name())),
    };

    if let Some(comparator) = comparator {
        // Stable sort using a user-supplied `(a, b) -> <0/=0/>0` comparator.
        let mut error = None;
        items.sort_by(|a, b| {
            if error.is_some() {
                return Ordering::Equal;
            }
            match ctx.call_value(&comparator, &[a.clone(), b.clone()]) {
                Ok(result) => {
                    let n = result.borrow().as_num().unwrap_or(0.0);
                    n.partial_cmp(&0.0).unwrap_or(Ordering::Equal)
                }
                Err(e) => {
                    error = Some(e);
                    Ordering::Equal
                }
            }
        });
        if let Some(e) = error {
            return Err(e);
        }
    } else {
        let all_numeric = items.iter().all(|c| matches!(&*c.borrow(), Value::Num(_)));
        if all_numeric {
            items.sort_by(|a, b| {
                let a = a.borrow().as_num().unwrap_or(0.0);
                let b = b.borrow().as_num().unwrap_or(0.0);
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            });
        } else {
            items.sort_by(|a, b| super::print_string(a).cmp(&super::print_string(b)));
        }
    }
    Ok(new_cell(Value::Array(items)))
}

fn object_length(_ctx: &mut NativeCtx, receiver: Option<&Cell>, _args: &[Cell]) -> NativeResult {
    let cell = this_cell(receiver)?;
    let len = match &*cell.borrow() {
        Value::Object(object) => object.len(),
        other => return Err(format!("expected an object receiver, found {}", other.type_name())),
    };
    Ok(new_cell(Value::Num(len as f64)))
}

fn object_pluck(_ctx: &mut NativeCtx, receiver: Option<&Cell>, args: &[Cell]) -> NativeResult {
    let cell = this_cell(receiver)?;
    let value = cell.borrow();
    let Value::Object(object) = &*value else {
        return Err(format!("expected an object receiver, found {}", value.type_name()));
    };
    let mut result = ObjectValue::new();
    for arg in args {
        let key = super::print_string(arg);
        if let Some(existing) = object.get(&key) {
            result.insert(key, new_cell(existing.borrow().clone()));
        }
    }
    Ok(new_cell(Value::Object(result)))
}

fn object_pairs(_ctx: &mut NativeCtx, receiver: Option<&Cell>, _args: &[Cell]) -> NativeResult {
    let cell = this_cell(receiver)?;
    let value = cell.borrow();
    let Value::Object(object) = &*value else {
        return Err(format!("expected an object receiver, found {}", value.type_name()));
    };
    let pairs = object
        .iter()
        .map(|(key, value)| {
            new_cell(Value::Array(vec![new_cell(Value::Str(key.clone())), value.clone()]))
        })
        .collect();
    Ok(new_cell(Value::Array(pairs)))
}

fn number_floor(_ctx: &mut NativeCtx, receiver: Option<&Cell>, _args: &[Cell]) -> NativeResult {
    Ok(new_cell(Value::Num(this_num(receiver)?.floor())))
}

fn number_ceil(_ctx: &mut NativeCtx, receiver: Option<&Cell>, _args: &[Cell]) -> NativeResult {
    Ok(new_cell(Value::Num(this_num(receiver)?.ceil())))
}

fn number_round(_ctx: &mut NativeCtx, receiver: Option<&Cell>, _args: &[Cell]) -> NativeResult {
    let n = this_num(receiver)?;
    let rounded = if n >= 0.0 { (n + 0.5).floor() } else { (n - 0.5).ceil() };
    Ok(new_cell(Value::Num(rounded)))
}

fn number_abs(_ctx: &mut NativeCtx, receiver: Option<&Cell>, _args: &[Cell]) -> NativeResult {
    Ok(new_cell(Value::Num(this_num(receiver)?.abs())))
}

fn number_mod(_ctx: &mut NativeCtx, receiver: Option<&Cell>, args: &[Cell]) -> NativeResult {
    let n = this_num(receiver)?;
    let Some(divisor) = args.first().and_then(|c| c.borrow().as_num()) else {
        return Err("mod() requires a numeric argument".into());
    };
    if divisor == 0.0 {
        return Err("divide by zero".into());
    }
    let result = ((n % divisor) + divisor) % divisor;
    Ok(new_cell(Value::Num(result)))
}

fn number_format(_ctx: &mut NativeCtx, receiver: Option<&Cell>, args: &[Cell]) -> NativeResult {
    let n = this_num(receiver)?;
    let thousands = args
        .first()
        .map(|c| super::print_string(c))
        .unwrap_or_else(|| ",".to_string());
    let decimal = args
        .get(1)
        .map(|c| super::print_string(c))
        .unwrap_or_else(|| ".".to_string());

    let negative = n < 0.0;
    let rendered = format!("{:.2}", n.abs());
    let (int_part, frac_part) = rendered.split_once('.').unwrap_or((rendered.as_str(), "00"));

    let mut grouped = String::new();
    for (idx, ch) in int_part.chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            grouped.push_str(&thousands.chars().rev().collect::<String>());
        }
        grouped.push(ch);
    }
    let int_grouped: String = grouped.chars().rev().collect();

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&int_grouped);
    out.push_str(&decimal);
    out.push_str(frac_part);
    Ok(new_cell(Value::Str(out)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(out: &'a mut Vec<u8>, call: &'a mut dyn FnMut(&Cell, &[Cell]) -> NativeResult) -> NativeCtx<'a> {
        NativeCtx { output: out, call }
    }

    fn no_call(_: &Cell, _: &[Cell]) -> NativeResult {
        Err("no calls".into())
    }

    #[test]
    fn array_push_grows_in_place_and_returns_new_length() {
        let mut out = vec![];
        let mut call = no_call;
        let mut c = ctx(&mut out, &mut call);
        let array = new_cell(Value::Array(vec![]));
        let len = array_push(&mut c, Some(&array), &[new_cell(Value::Num(1.0))]).unwrap();
        assert_eq!(len.borrow().as_num(), Some(1.0));
        assert!(matches!(&*array.borrow(), Value::Array(items) if items.len() == 1));
    }

    #[test]
    fn array_pop_on_empty_array_yields_null() {
        let mut out = vec![];
        let mut call = no_call;
        let mut c = ctx(&mut out, &mut call);
        let array = new_cell(Value::Array(vec![]));
        let popped = array_pop(&mut c, Some(&array), &[]).unwrap();
        assert!(matches!(&*popped.borrow(), Value::Null));
    }

    #[test]
    fn array_contains_compares_by_value_equality() {
        let mut out = vec![];
        let mut call = no_call;
        let mut c = ctx(&mut out, &mut call);
        let array = new_cell(Value::Array(vec![new_cell(Value::Num(3.0))]));
        let found = array_contains(&mut c, Some(&array), &[new_cell(Value::Num(3.0))]).unwrap();
        assert!(found.borrow().is_truthy());
        let missing = array_contains(&mut c, Some(&array), &[new_cell(Value::Num(4.0))]).unwrap();
        assert!(!missing.borrow().is_truthy());
    }

    #[test]
    fn number_mod_is_euclidean_for_negative_operands() {
        let mut out = vec![];
        let mut call = no_call;
        let mut c = ctx(&mut out, &mut call);
        let receiver = new_cell(Value::Num(-1.0));
        let result = number_mod(&mut c, Some(&receiver), &[new_cell(Value::Num(5.0))]).unwrap();
        assert_eq!(result.borrow().as_num(), Some(4.0));
    }

    #[test]
    fn string_split_accepts_a_regex_separator() {
        let mut out = vec![];
        let mut call = no_call;
        let mut c = ctx(&mut out, &mut call);
        let receiver = new_cell(Value::Str("aBCd".into()));
        let result = string_split(&mut c, Some(&receiver), &[new_cell(Value::Regex("BC".into()))]).unwrap();
        match &*result.borrow() {
            Value::Array(items) => {
                let rendered: Vec<String> = items.iter().map(super::super::print_string).collect();
                assert_eq!(rendered, vec!["a", "d"]);
            }
            other => panic!("expected an array, got {other:?}"),
        }
    }

    #[test]
    fn lookup_finds_methods_by_tag_and_leaves_binding_unset() {
        let method = lookup(&Value::Str(String::new()), "upper").expect("upper should resolve");
        assert_eq!(method.name, "upper");
        assert!(method.binding.is_none());
        assert!(lookup(&Value::Num(0.0), "upper").is_none());
    }
}
