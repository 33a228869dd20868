//! The value model: a tagged union with both value-copy and
//! reference-share assignment semantics, mediated by a "cell" layer of
//! indirection that makes every lvalue addressable.

mod object;
pub mod prototypes;

pub use object::ObjectValue;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ast::Block;

/// A single-slot addressable container. Every variable binding, array
/// element and object value is a cell; reads of a variable or member
/// return the cell itself rather than a copy, so later writes through one
/// handle are visible to every other holder of the same cell.
pub type Cell = Rc<RefCell<Value>>;

pub fn new_cell(value: Value) -> Cell {
    Rc::new(RefCell::new(value))
}

#[derive(Clone)]
pub enum Value {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Array(Vec<Cell>),
    Object(ObjectValue),
    Regex(String),
    Function(Rc<FunctionValue>),
    Native(NativeMethod),
    /// Sentinel for a variable that has been referenced but never
    /// assigned a concrete value. Auto-vivifies into an array or object
    /// on first indexed write.
    Unknown,
}

/// A user-defined closure: its definition plus the frame it captured.
pub struct FunctionValue {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Block,
    pub captured: crate::evaluator::FrameRef,
}

/// A built-in or prototype method. `binding` is set whenever the function
/// was obtained via `x.m` property access, so the call site sees
/// `this = x`; a bare method reference obtained another way has no
/// binding.
#[derive(Clone)]
pub struct NativeMethod {
    pub name: &'static str,
    pub func: NativeFn,
    pub binding: Option<Cell>,
}

/// A native function's own error channel: just a message. The evaluator
/// attaches the call-site source position when it turns this into a
/// `JqawkError::Runtime`.
pub type NativeResult = Result<Cell, String>;

pub type NativeFn = fn(ctx: &mut NativeCtx, receiver: Option<&Cell>, args: &[Cell]) -> NativeResult;

/// Threaded through every builtin/prototype-method call: the output sink
/// for `printf`/`print`-like side effects, and a callback into the
/// evaluator for methods (`sort`'s comparator) that need to invoke an
/// arbitrary value as a function. Kept as a closure rather than a direct
/// dependency on the evaluator so this module never depends upward on it.
pub struct NativeCtx<'a> {
    pub output: &'a mut dyn std::io::Write,
    pub call: &'a mut dyn FnMut(&Cell, &[Cell]) -> NativeResult,
}

impl<'a> NativeCtx<'a> {
    pub fn call_value(&mut self, callee: &Cell, args: &[Cell]) -> NativeResult {
        (self.call)(callee, args)
    }
}

/// Produces the cell that should be stored at an assignment target for
/// `source`: a fresh cell holding a copy of the data for primitive tags,
/// or `source`'s own cell for structured/reference tags, so the target
/// slot ends up aliasing the same array/object/function rather than a
/// snapshot of it.
pub fn assign_value(source: &Cell) -> Cell {
    let value = source.borrow();
    match &*value {
        Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Native(_) | Value::Unknown => {
            drop(value);
            source.clone()
        }
        _ => new_cell(value.clone()),
    }
}

/// Language equality (`==`). `Unknown` compares equal to nothing,
/// including another `Unknown` (it is a "never assigned" sentinel, not a
/// value). `Null` compares equal only to `Null`. Other primitives compare
/// by content; structured values (arrays, objects, functions) compare by
/// identity — two distinct arrays with identical contents are not equal.
pub fn equals(a: &Cell, b: &Cell) -> bool {
    let av = a.borrow();
    let bv = b.borrow();
    match (&*av, &*bv) {
        (Value::Unknown, _) | (_, Value::Unknown) => false,
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Num(x), Value::Num(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Regex(x), Value::Regex(y)) => x == y,
        (Value::Num(n), Value::Bool(flag)) | (Value::Bool(flag), Value::Num(n)) => {
            *n == if *flag { 1.0 } else { 0.0 }
        }
        (Value::Array(_), Value::Array(_))
        | (Value::Object(_), Value::Object(_))
        | (Value::Function(_), Value::Function(_))
        | (Value::Native(_), Value::Native(_)) => {
            drop(av);
            drop(bv);
            Rc::ptr_eq(a, b)
        }
        _ => false,
    }
}

impl Value {
    pub fn array(items: Vec<Cell>) -> Self {
        Value::Array(items)
    }

    pub fn object(object: ObjectValue) -> Self {
        Value::Object(object)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Num(_) => "number",
            Value::Bool(_) => "bool",
            Value::Null => "null",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Regex(_) => "regex",
            Value::Function(_) | Value::Native(_) => "function",
            Value::Unknown => "unknown",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Null => false,
            Value::Unknown => false,
            Value::Array(_) | Value::Object(_) | Value::Regex(_) => true,
            Value::Function(_) | Value::Native(_) => true,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".into() } else { "-Infinity".into() };
    }
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Stringifies a value the way `print` and string concatenation do:
/// plain text for strings, AWK-style numbers, and a compact JSON-like
/// rendering for arrays/objects that substitutes `<circular reference>`
/// for cycles instead of erroring (contrast with the `json()` builtin,
/// which treats a cycle as a runtime error).
pub fn print_string(cell: &Cell) -> String {
    let mut seen = Vec::new();
    let mut out = String::new();
    render(cell, &mut seen, &mut out);
    out
}

fn render(cell: &Cell, seen: &mut Vec<*const RefCell<Value>>, out: &mut String) {
    let ptr = Rc::as_ptr(cell);
    if seen.contains(&ptr) {
        out.push_str("<circular reference>");
        return;
    }
    let value = cell.borrow();
    match &*value {
        Value::Str(s) => out.push_str(s),
        Value::Num(n) => out.push_str(&format_number(*n)),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => out.push_str("null"),
        Value::Unknown => out.push_str("null"),
        Value::Regex(pattern) => {
            out.push('/');
            out.push_str(pattern);
            out.push('/');
        }
        Value::Function(_) | Value::Native(_) => out.push_str("<function>"),
        Value::Array(items) => {
            seen.push(ptr);
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                render_quoted(item, seen, out);
            }
            out.push(']');
            seen.pop();
        }
        Value::Object(object) => {
            seen.push(ptr);
            out.push('{');
            for (idx, (key, value)) in object.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                out.push('"');
                out.push_str(key);
                out.push_str("\": ");
                render_quoted(value, seen, out);
            }
            out.push('}');
            seen.pop();
        }
    }
}

fn render_quoted(cell: &Cell, seen: &mut Vec<*const RefCell<Value>>, out: &mut String) {
    let is_str = matches!(&*cell.borrow(), Value::Str(_));
    if is_str {
        out.push('"');
        render(cell, seen, out);
        out.push('"');
    } else {
        render(cell, seen, out);
    }
}

/// Marker error for a cycle found while JSON-encoding a value; the caller
/// attaches source position to turn it into a `JqawkError::Runtime`.
pub struct CircularReference;

/// The `json()` builtin's encoder: two-space indented, preserving object
/// key order, erroring on a cycle instead of printing a placeholder.
pub fn encode_json(cell: &Cell) -> Result<String, CircularReference> {
    let mut seen = Vec::new();
    let mut out = String::new();
    encode(cell, &mut seen, 0, &mut out)?;
    Ok(out)
}

fn encode(
    cell: &Cell,
    seen: &mut Vec<*const RefCell<Value>>,
    indent: usize,
    out: &mut String,
) -> Result<(), CircularReference> {
    let ptr = Rc::as_ptr(cell);
    if seen.contains(&ptr) {
        return Err(CircularReference);
    }
    let value = cell.borrow();
    match &*value {
        Value::Str(s) => out.push_str(&serde_json::to_string(s).unwrap_or_default()),
        Value::Num(n) => out.push_str(&format_number(*n)),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null | Value::Unknown => out.push_str("null"),
        Value::Regex(pattern) => out.push_str(&serde_json::to_string(pattern).unwrap_or_default()),
        Value::Function(_) | Value::Native(_) => out.push_str("null"),
        Value::Array(items) => {
            if items.is_empty() {
                out.push_str("[]");
            } else {
                seen.push(ptr);
                out.push_str("[\n");
                for (idx, item) in items.iter().enumerate() {
                    push_indent(out, indent + 1);
                    encode(item, seen, indent + 1, out)?;
                    if idx + 1 < items.len() {
                        out.push(',');
                    }
                    out.push('\n');
                }
                push_indent(out, indent);
                out.push(']');
                seen.pop();
            }
        }
        Value::Object(object) => {
            if object.len() == 0 {
                out.push_str("{}");
            } else {
                seen.push(ptr);
                out.push_str("{\n");
                let len = object.len();
                for (idx, (key, value)) in object.iter().enumerate() {
                    push_indent(out, indent + 1);
                    out.push_str(&serde_json::to_string(key).unwrap_or_default());
                    out.push_str(": ");
                    encode(value, seen, indent + 1, out)?;
                    if idx + 1 < len {
                        out.push(',');
                    }
                    out.push('\n');
                }
                push_indent(out, indent);
                out.push('}');
                seen.pop();
            }
        }
    }
    Ok(())
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Num(n) => write!(f, "Num({n})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Null => write!(f, "Null"),
            Value::Array(items) => write!(f, "Array(len={})", items.len()),
            Value::Object(object) => write!(f, "Object(len={})", object.len()),
            Value::Regex(r) => write!(f, "Regex({r:?})"),
            Value::Function(func) => write!(f, "Function({:?})", func.name),
            Value::Native(native) => write!(f, "Native({})", native.name),
            Value::Unknown => write!(f, "Unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_value_copies_primitives() {
        let source = new_cell(Value::Num(1.0));
        let copy = assign_value(&source);
        assert!(!Rc::ptr_eq(&source, &copy));
        *source.borrow_mut() = Value::Num(2.0);
        assert_eq!(copy.borrow().as_num(), Some(1.0));
    }

    #[test]
    fn assign_value_aliases_structured_values() {
        let source = new_cell(Value::Array(vec![]));
        let alias = assign_value(&source);
        assert!(Rc::ptr_eq(&source, &alias));
    }

    #[test]
    fn assign_value_aliases_unknown() {
        // Unknown is a shared-reference tag like Array/Object/Function, not
        // a copy tag: a name that auto-vivifies later must be seen by every
        // cell that aliased it before the vivification happened.
        let source = new_cell(Value::Unknown);
        let alias = assign_value(&source);
        assert!(Rc::ptr_eq(&source, &alias));
    }

    #[test]
    fn unknown_equals_nothing_including_itself() {
        let a = new_cell(Value::Unknown);
        let b = new_cell(Value::Unknown);
        assert!(!equals(&a, &a));
        assert!(!equals(&a, &b));
    }

    #[test]
    fn null_equals_only_null() {
        let a = new_cell(Value::Null);
        let b = new_cell(Value::Null);
        let n = new_cell(Value::Num(0.0));
        assert!(equals(&a, &b));
        assert!(!equals(&a, &n));
    }

    #[test]
    fn arrays_compare_by_identity_not_structure() {
        let a = new_cell(Value::Array(vec![new_cell(Value::Num(1.0))]));
        let b = new_cell(Value::Array(vec![new_cell(Value::Num(1.0))]));
        assert!(!equals(&a, &b));
        assert!(equals(&a, &a));
    }

    #[test]
    fn format_number_drops_trailing_zero_for_integral_values() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(3.5), "3.5");
        assert_eq!(format_number(f64::NAN), "NaN");
    }
}
