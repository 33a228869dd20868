//! Tree-walking evaluator: lexically-scoped frames, cell-based
//! assignment, structured control flow via [`Signal`] instead of
//! exceptions, and the call machinery shared by user functions, native
//! builtins and prototype methods.

mod program;
mod statement;

pub use program::{run_program, EvalOptions, Input};

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Expression, ObjectKey, Pattern, UnaryOp};
use crate::builtins;
use crate::error::{JqawkError, SourceLoc};
use crate::lexer::Lexer;
use crate::value::{
    self, equals, new_cell, prototypes, Cell, FunctionValue, NativeCtx, NativeMethod, ObjectValue,
    Value,
};

/// A single lexical scope: a flat map of bindings plus a link to the
/// enclosing scope. Calling a closure does not walk the *caller's*
/// chain; it starts a fresh frame parented directly on the frame the
/// function captured at definition time, so the callee sees live
/// updates to variables the closure captured, never the caller's locals.
pub struct Frame {
    vars: HashMap<String, Cell>,
    parent: Option<FrameRef>,
}

pub type FrameRef = Rc<RefCell<Frame>>;

impl Frame {
    pub fn root() -> FrameRef {
        Rc::new(RefCell::new(Frame {
            vars: HashMap::new(),
            parent: None,
        }))
    }

    pub fn child(parent: &FrameRef) -> FrameRef {
        Rc::new(RefCell::new(Frame {
            vars: HashMap::new(),
            parent: Some(parent.clone()),
        }))
    }

    /// Declares `name` in *this* frame, shadowing any outer binding —
    /// the effect of a `let` statement.
    fn declare(&mut self, name: &str, cell: Cell) {
        self.vars.insert(name.to_string(), cell);
    }

    fn lookup(frame: &FrameRef, name: &str) -> Option<Cell> {
        let this = frame.borrow();
        if let Some(cell) = this.vars.get(name) {
            return Some(cell.clone());
        }
        match &this.parent {
            Some(parent) => Frame::lookup(parent, name),
            None => None,
        }
    }

    /// Updates an existing binding wherever it is in the chain. Returns
    /// `false` if no such binding exists anywhere, in which case the
    /// caller is responsible for declaring it (implicit globals, the
    /// AWK-inherited behaviour for `x = value` on an unseen plain name).
    fn assign_existing(frame: &FrameRef, name: &str, cell: Cell) -> bool {
        let mut this = frame.borrow_mut();
        if this.vars.contains_key(name) {
            this.vars.insert(name.to_string(), cell);
            return true;
        }
        let parent = this.parent.clone();
        drop(this);
        match parent {
            Some(parent) => Frame::assign_existing(&parent, name, cell),
            None => false,
        }
    }

    fn root_of(frame: &FrameRef) -> FrameRef {
        let parent = frame.borrow().parent.clone();
        match parent {
            Some(parent) => Frame::root_of(&parent),
            None => frame.clone(),
        }
    }
}

/// Non-local control flow, threaded back up through statement
/// execution instead of raised as an exception.
#[derive(Clone)]
pub enum Signal {
    None,
    Break,
    Continue,
    Return(Cell),
    Next,
    Exit,
}

/// Call-depth ceiling: guards against unbounded recursion blowing the
/// native stack before Rust itself would.
const MAX_CALL_DEPTH: usize = 4096;

pub struct Evaluator<'a> {
    source: &'a str,
    globals: FrameRef,
    functions: HashMap<String, Rc<FunctionValue>>,
    call_depth: usize,
    output: &'a mut dyn std::io::Write,
    cancelled: &'a (dyn Fn() -> bool + 'a),
}

impl<'a> Evaluator<'a> {
    pub fn new(
        source: &'a str,
        output: &'a mut dyn std::io::Write,
        cancelled: &'a (dyn Fn() -> bool + 'a),
    ) -> Self {
        Self {
            source,
            globals: Frame::root(),
            functions: HashMap::new(),
            call_depth: 0,
            output,
            cancelled,
        }
    }

    pub fn globals(&self) -> &FrameRef {
        &self.globals
    }

    pub fn define_function(&mut self, name: String, func: Rc<FunctionValue>) {
        self.functions.insert(name, func);
    }

    fn loc(&self, pos: usize) -> SourceLoc {
        Lexer::locate(self.source, pos)
    }

    fn runtime_err(&self, message: impl Into<String>, pos: usize) -> JqawkError {
        JqawkError::runtime(message, self.loc(pos))
    }

    fn check_cancelled(&self, pos: usize) -> Result<(), JqawkError> {
        if (self.cancelled)() {
            Err(JqawkError::cancelled(self.loc(pos)))
        } else {
            Ok(())
        }
    }

    /// Looks up a plain (non-`$`) identifier. A name not found anywhere
    /// in the chain is created in the innermost frame as `Unknown`
    /// rather than erroring, so later reads of the same name (and an
    /// assignment through it) see the same cell — required for e.g.
    /// `a.a = a` to tie a true self-reference rather than alias a
    /// throwaway cell nobody else can reach.
    fn read_var(&self, frame: &FrameRef, name: &str, pos: usize) -> Result<Cell, JqawkError> {
        if let Some(name) = name.strip_prefix('$') {
            if name.is_empty() {
                return Frame::lookup(frame, "$").ok_or_else(|| {
                    self.runtime_err("'$' referenced outside of a rule body", pos)
                });
            }
            let key = format!("${name}");
            return Frame::lookup(frame, &key)
                .ok_or_else(|| self.runtime_err(format!("'${name}' is not set here"), pos));
        }
        if let Some(cell) = Frame::lookup(frame, name) {
            return Ok(cell);
        }
        let cell = new_cell(Value::Unknown);
        frame.borrow_mut().declare(name, cell.clone());
        Ok(cell)
    }

    pub fn eval_expr(&mut self, frame: &FrameRef, expr: &Expression) -> Result<Cell, JqawkError> {
        self.check_cancelled(expr.pos())?;
        match expr {
            Expression::Num(n, _) => Ok(new_cell(Value::Num(*n))),
            Expression::Str(s, _) => Ok(new_cell(Value::Str(s.clone()))),
            Expression::Bool(b, _) => Ok(new_cell(Value::Bool(*b))),
            Expression::Null(_) => Ok(new_cell(Value::Null)),
            Expression::RegexLit(pattern, _) => Ok(new_cell(Value::Regex(pattern.clone()))),
            Expression::Var(name, pos) => self.read_var(frame, name, *pos),
            Expression::Array(items, _) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    let cell = self.eval_expr(frame, item)?;
                    values.push(value::assign_value(&cell));
                }
                Ok(new_cell(Value::Array(values)))
            }
            Expression::Object(entries, pos) => {
                let mut object = ObjectValue::new();
                for (key, value_expr) in entries {
                    let key = self.eval_object_key(frame, key, *pos)?;
                    let cell = self.eval_expr(frame, value_expr)?;
                    object.insert(key, value::assign_value(&cell));
                }
                Ok(new_cell(Value::Object(object)))
            }
            Expression::Member { object, property, pos } => {
                let object_cell = self.eval_expr(frame, object)?;
                self.read_member(&object_cell, property, *pos)
            }
            Expression::Index { object, index, pos } => {
                let object_cell = self.eval_expr(frame, object)?;
                let index_cell = self.eval_expr(frame, index)?;
                self.read_index(&object_cell, &index_cell, *pos)
            }
            Expression::Slice { object, start, end, pos } => {
                let object_cell = self.eval_expr(frame, object)?;
                let start = start
                    .as_ref()
                    .map(|e| self.eval_expr(frame, e))
                    .transpose()?;
                let end = end.as_ref().map(|e| self.eval_expr(frame, e)).transpose()?;
                self.eval_slice(&object_cell, start.as_ref(), end.as_ref(), *pos)
            }
            Expression::Call { callee, args, pos } => self.eval_call(frame, callee, args, *pos),
            Expression::Unary { op, operand, pos } => {
                let cell = self.eval_expr(frame, operand)?;
                self.eval_unary(*op, &cell, *pos)
            }
            Expression::IncDec { op, prefix, target, pos } => {
                self.eval_inc_dec(frame, *op, *prefix, target, *pos)
            }
            Expression::Binary { op, lhs, rhs, pos } => {
                let lhs = self.eval_expr(frame, lhs)?;
                let rhs = self.eval_expr(frame, rhs)?;
                self.eval_binary(*op, &lhs, &rhs, *pos)
            }
            Expression::Logical { op, lhs, rhs, .. } => self.eval_logical(frame, *op, lhs, rhs),
            Expression::Is { value, type_name, .. } => {
                let cell = self.eval_expr(frame, value)?;
                let matches = cell.borrow().type_name() == type_name;
                Ok(new_cell(Value::Bool(matches)))
            }
            Expression::Assign { target, value, pos } => {
                let source = self.eval_expr(frame, value)?;
                self.assign(frame, target, &source, *pos)?;
                Ok(source)
            }
            Expression::FunctionLit { name, params, body, .. } => {
                Ok(new_cell(Value::Function(Rc::new(FunctionValue {
                    name: name.clone(),
                    params: params.clone(),
                    body: body.clone(),
                    captured: frame.clone(),
                }))))
            }
            Expression::Match { scrutinee, arms, pos } => self.eval_match(frame, scrutinee, arms, *pos),
        }
    }

    fn eval_object_key(
        &mut self,
        frame: &FrameRef,
        key: &ObjectKey,
        pos: usize,
    ) -> Result<String, JqawkError> {
        match key {
            ObjectKey::Ident(name) => Ok(name.clone()),
            ObjectKey::Str(s) => Ok(s.clone()),
            ObjectKey::Computed(expr) => {
                let cell = self.eval_expr(frame, expr)?;
                match &*cell.borrow() {
                    Value::Str(s) => Ok(s.clone()),
                    Value::Num(n) => Ok(value::format_number(*n)),
                    other => Err(self.runtime_err(
                        format!("object key must be a string or number, found {}", other.type_name()),
                        pos,
                    )),
                }
            }
        }
    }

    fn read_member(&mut self, object: &Cell, property: &str, pos: usize) -> Result<Cell, JqawkError> {
        let found = {
            let value = object.borrow();
            match &*value {
                Value::Object(map) => map.get(property).cloned(),
                _ => None,
            }
        };
        if let Some(cell) = found {
            return Ok(cell);
        }
        if let Some(method) = prototypes::lookup(&object.borrow(), property) {
            return Ok(new_cell(Value::Native(NativeMethod {
                binding: Some(object.clone()),
                ..method
            })));
        }
        let chains_as_unknown = matches!(&*object.borrow(), Value::Object(_) | Value::Unknown);
        if chains_as_unknown {
            Ok(new_cell(Value::Unknown))
        } else {
            Err(self.runtime_err(
                format!("'{}' has no property or method '{property}'", object.borrow().type_name()),
                pos,
            ))
        }
    }

    fn read_index(&mut self, object: &Cell, index: &Cell, pos: usize) -> Result<Cell, JqawkError> {
        let value = object.borrow();
        match &*value {
            Value::Array(items) => {
                let Some(idx) = index.borrow().as_num() else {
                    return Err(self.runtime_err("array index must be a number", pos));
                };
                Ok(resolve_index(items.len(), idx)
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_else(|| new_cell(Value::Null)))
            }
            Value::Str(s) => {
                let Some(idx) = index.borrow().as_num() else {
                    return Err(self.runtime_err("string index must be a number", pos));
                };
                let chars: Vec<char> = s.chars().collect();
                Ok(resolve_index(chars.len(), idx)
                    .and_then(|i| chars.get(i))
                    .map(|c| new_cell(Value::Str(c.to_string())))
                    .unwrap_or_else(|| new_cell(Value::Null)))
            }
            Value::Object(map) => {
                let key = match &*index.borrow() {
                    Value::Str(s) => s.clone(),
                    Value::Num(n) => value::format_number(*n),
                    other => {
                        return Err(self.runtime_err(
                            format!("object index must be a string or number, found {}", other.type_name()),
                            pos,
                        ))
                    }
                };
                Ok(map.get(&key).cloned().unwrap_or_else(|| new_cell(Value::Unknown)))
            }
            Value::Unknown => Ok(new_cell(Value::Unknown)),
            other => Err(self.runtime_err(format!("cannot index into {}", other.type_name()), pos)),
        }
    }

    fn eval_slice(
        &mut self,
        object: &Cell,
        start: Option<&Cell>,
        end: Option<&Cell>,
        pos: usize,
    ) -> Result<Cell, JqawkError> {
        let bound = |cell: Option<&Cell>, default: i64, len: usize| -> Result<usize, JqawkError> {
            match cell {
                None => Ok(clamp_bound(default, len)),
                Some(cell) => {
                    let Some(n) = cell.borrow().as_num() else {
                        return Err(self.runtime_err("slice bound must be a number", pos));
                    };
                    Ok(clamp_bound(n as i64, len))
                }
            }
        };
        let value = object.borrow();
        match &*value {
            Value::Array(items) => {
                let start = bound(start, 0, items.len())?;
                let end = bound(end, items.len() as i64, items.len())?;
                if start > end {
                    return Err(self.runtime_err("index out of range", pos));
                }
                let slice = items[start..end].iter().map(value::assign_value).collect();
                Ok(new_cell(Value::Array(slice)))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let start = bound(start, 0, chars.len())?;
                let end = bound(end, chars.len() as i64, chars.len())?;
                if start > end {
                    return Err(self.runtime_err("index out of range", pos));
                }
                let slice: String = chars[start..end].iter().collect();
                Ok(new_cell(Value::Str(slice)))
            }
            other => Err(self.runtime_err(format!("cannot slice {}", other.type_name()), pos)),
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, cell: &Cell, pos: usize) -> Result<Cell, JqawkError> {
        match op {
            UnaryOp::Not => Ok(new_cell(Value::Bool(!cell.borrow().is_truthy()))),
            UnaryOp::Neg => {
                let n = cell
                    .borrow()
                    .as_num()
                    .ok_or_else(|| self.runtime_err("unary '-' expects a number", pos))?;
                Ok(new_cell(Value::Num(-n)))
            }
            UnaryOp::Plus => {
                let n = cell
                    .borrow()
                    .as_num()
                    .ok_or_else(|| self.runtime_err("unary '+' expects a number", pos))?;
                Ok(new_cell(Value::Num(n)))
            }
        }
    }

    fn eval_logical(
        &mut self,
        frame: &FrameRef,
        op: crate::ast::LogicalOp,
        lhs: &Expression,
        rhs: &Expression,
    ) -> Result<Cell, JqawkError> {
        use crate::ast::LogicalOp::*;
        let lhs_cell = self.eval_expr(frame, lhs)?;
        let truthy = lhs_cell.borrow().is_truthy();
        match (op, truthy) {
            (And, false) => Ok(new_cell(Value::Bool(false))),
            (Or, true) => Ok(new_cell(Value::Bool(true))),
            _ => {
                let rhs_cell = self.eval_expr(frame, rhs)?;
                Ok(new_cell(Value::Bool(rhs_cell.borrow().is_truthy())))
            }
        }
    }

    fn eval_match(
        &mut self,
        frame: &FrameRef,
        scrutinee: &Expression,
        arms: &[crate::ast::MatchArm],
        _pos: usize,
    ) -> Result<Cell, JqawkError> {
        let value = self.eval_expr(frame, scrutinee)?;
        for arm in arms {
            let child = Frame::child(frame);
            if self.match_pattern(&child, &arm.pattern, &value)? {
                return match &arm.body {
                    crate::ast::MatchBody::Expr(expr) => self.eval_expr(&child, expr),
                    crate::ast::MatchBody::Block(block) => {
                        match self.exec_block(&child, block)? {
                            Signal::Return(cell) => Ok(cell),
                            _ => Ok(new_cell(Value::Null)),
                        }
                    }
                };
            }
        }
        // No arm matched: the match expression itself evaluates to `Null`
        // rather than raising a runtime error.
        Ok(new_cell(Value::Null))
    }

    fn match_pattern(&mut self, frame: &FrameRef, pattern: &Pattern, value: &Cell) -> Result<bool, JqawkError> {
        match pattern {
            Pattern::Ident(name) => {
                frame.borrow_mut().declare(name, value::assign_value(value));
                Ok(true)
            }
            Pattern::Literal(expr) => {
                let expected = self.eval_expr(frame, expr)?;
                Ok(equals(&expected, value))
            }
            Pattern::Array(patterns) => {
                let items = match &*value.borrow() {
                    Value::Array(items) => items.clone(),
                    _ => return Ok(false),
                };
                if items.len() != patterns.len() {
                    return Ok(false);
                }
                for (sub_pattern, item) in patterns.iter().zip(items.iter()) {
                    if !self.match_pattern(frame, sub_pattern, item)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    fn eval_inc_dec(
        &mut self,
        frame: &FrameRef,
        op: crate::ast::IncDecOp,
        prefix: bool,
        target: &crate::ast::AssignTarget,
        pos: usize,
    ) -> Result<Cell, JqawkError> {
        let current = self.eval_expr(frame, &target.to_read_expr())?;
        // A missing array slot or object field reads back as `Unknown`;
        // `++`/`--` on one creates it and seeds it at `1`/`-1` rather than
        // erroring, same as any other auto-vivifying write.
        let n = if matches!(&*current.borrow(), Value::Unknown) {
            0.0
        } else {
            current
                .borrow()
                .as_num()
                .ok_or_else(|| self.runtime_err("++/-- operand must be a number", pos))?
        };
        let updated = match op {
            crate::ast::IncDecOp::Inc => n + 1.0,
            crate::ast::IncDecOp::Dec => n - 1.0,
        };
        let updated_cell = new_cell(Value::Num(updated));
        self.assign(frame, target, &updated_cell, pos)?;
        Ok(if prefix { updated_cell } else { new_cell(Value::Num(n)) })
    }

    /// Assigns `source` to `target`, auto-vivifying any `Unknown`
    /// intermediate container along the path. Follows the copy/alias
    /// split: primitives are copied into a fresh cell at the target
    /// slot, structured values make the slot alias `source`'s own cell.
    fn assign(
        &mut self,
        frame: &FrameRef,
        target: &crate::ast::AssignTarget,
        source: &Cell,
        pos: usize,
    ) -> Result<(), JqawkError> {
        let stored = value::assign_value(source);
        if target.path.is_empty() {
            if target.base.starts_with('$') {
                frame.borrow_mut().declare(&target.base, stored);
                return Ok(());
            }
            if !Frame::assign_existing(frame, &target.base, stored.clone()) {
                Frame::root_of(frame).borrow_mut().declare(&target.base, stored);
            }
            return Ok(());
        }

        // `read_var` returns the base's actual cell (declaring it first
        // if unseen), so `step_into`/`write_into` can vivify it in place
        // below without us having to re-bind the name to a new cell.
        let mut container = self.read_var(frame, &target.base, pos)?;

        let last = target.path.len() - 1;
        for segment in &target.path[..last] {
            container = self.step_into(frame, &container, segment, pos)?;
        }
        self.write_into(frame, &container, &target.path[last], stored, pos)
    }

    /// Navigates one path segment deeper, auto-vivifying `Unknown`
    /// containers along the way (a string key vivifies an object, a
    /// numeric key vivifies an array).
    fn step_into(
        &mut self,
        frame: &FrameRef,
        container: &Cell,
        segment: &crate::ast::PathSegment,
        pos: usize,
    ) -> Result<Cell, JqawkError> {
        use crate::ast::PathSegment::*;
        self.vivify(container, segment);
        match segment {
            Field(name) => {
                let mut value = container.borrow_mut();
                match &mut *value {
                    Value::Object(map) => {
                        if let Some(existing) = map.get(name) {
                            return Ok(existing.clone());
                        }
                        let fresh = new_cell(Value::Unknown);
                        map.insert(name.clone(), fresh.clone());
                        Ok(fresh)
                    }
                    other => Err(self.runtime_err(format!("cannot access field '{name}' on {}", other.type_name()), pos)),
                }
            }
            Index(index_expr) => {
                let index_cell = self.eval_expr(frame, index_expr)?;
                let mut value = container.borrow_mut();
                match &mut *value {
                    Value::Array(items) => {
                        let idx = index_cell
                            .borrow()
                            .as_num()
                            .ok_or_else(|| self.runtime_err("array index must be a number", pos))?;
                        let idx = resolve_index_growable(items.len(), idx);
                        while items.len() <= idx {
                            items.push(new_cell(Value::Unknown));
                        }
                        Ok(items[idx].clone())
                    }
                    Value::Object(map) => {
                        let key = match &*index_cell.borrow() {
                            Value::Str(s) => s.clone(),
                            Value::Num(n) => value::format_number(*n),
                            other => {
                                return Err(self.runtime_err(
                                    format!("object index must be a string or number, found {}", other.type_name()),
                                    pos,
                                ))
                            }
                        };
                        if let Some(existing) = map.get(&key) {
                            return Ok(existing.clone());
                        }
                        let fresh = new_cell(Value::Unknown);
                        map.insert(key, fresh.clone());
                        Ok(fresh)
                    }
                    other => Err(self.runtime_err(format!("cannot index into {}", other.type_name()), pos)),
                }
            }
        }
    }

    fn vivify(&self, container: &Cell, segment: &crate::ast::PathSegment) {
        let needs_vivify = matches!(&*container.borrow(), Value::Unknown);
        if !needs_vivify {
            return;
        }
        let mut value = container.borrow_mut();
        *value = match segment {
            crate::ast::PathSegment::Field(_) => Value::Object(ObjectValue::new()),
            crate::ast::PathSegment::Index(_) => Value::Array(vec![]),
        };
    }

    fn write_into(
        &mut self,
        frame: &FrameRef,
        container: &Cell,
        segment: &crate::ast::PathSegment,
        stored: Cell,
        pos: usize,
    ) -> Result<(), JqawkError> {
        use crate::ast::PathSegment::*;
        self.vivify(container, segment);
        match segment {
            Field(name) => {
                let mut value = container.borrow_mut();
                match &mut *value {
                    Value::Object(map) => {
                        map.insert(name.clone(), stored);
                        Ok(())
                    }
                    other => Err(self.runtime_err(format!("cannot assign field '{name}' on {}", other.type_name()), pos)),
                }
            }
            Index(index_expr) => {
                let index_cell = self.eval_expr(frame, index_expr)?;
                let mut value = container.borrow_mut();
                match &mut *value {
                    Value::Array(items) => {
                        let idx = index_cell
                            .borrow()
                            .as_num()
                            .ok_or_else(|| self.runtime_err("array index must be a number", pos))?;
                        let idx = resolve_index_growable(items.len(), idx);
                        while items.len() <= idx {
                            items.push(new_cell(Value::Null));
                        }
                        items[idx] = stored;
                        Ok(())
                    }
                    Value::Object(map) => {
                        let key = match &*index_cell.borrow() {
                            Value::Str(s) => s.clone(),
                            Value::Num(n) => value::format_number(*n),
                            other => {
                                return Err(self.runtime_err(
                                    format!("object index must be a string or number, found {}", other.type_name()),
                                    pos,
                                ))
                            }
                        };
                        map.insert(key, stored);
                        Ok(())
                    }
                    other => Err(self.runtime_err(format!("cannot assign index on {}", other.type_name()), pos)),
                }
            }
        }
    }

    fn eval_binary(&mut self, op: crate::ast::BinaryOp, lhs: &Cell, rhs: &Cell, pos: usize) -> Result<Cell, JqawkError> {
        use crate::ast::BinaryOp::*;
        match op {
            Eq => return Ok(new_cell(Value::Bool(equals(lhs, rhs)))),
            NotEq => return Ok(new_cell(Value::Bool(!equals(lhs, rhs)))),
            Match | NotMatch => return self.eval_regex_match(op, lhs, rhs, pos),
            _ => {}
        }
        if matches!(op, Lt | LtEq | Gt | GtEq) {
            return self.eval_comparison(op, lhs, rhs, pos);
        }
        if op == Add {
            if let (Value::Str(_), _) | (_, Value::Str(_)) = (&*lhs.borrow(), &*rhs.borrow()) {
                return Ok(new_cell(Value::Str(format!(
                    "{}{}",
                    value::print_string(lhs),
                    value::print_string(rhs)
                ))));
            }
        }
        let a = lhs.borrow().as_num().ok_or_else(|| self.runtime_err("operand must be a number", pos))?;
        let b = rhs.borrow().as_num().ok_or_else(|| self.runtime_err("operand must be a number", pos))?;
        let result = match op {
            Add => a + b,
            Sub => a - b,
            Mul => a * b,
            Div => {
                if b == 0.0 {
                    return Err(self.runtime_err("divide by zero", pos));
                }
                a / b
            }
            Mod => {
                if b == 0.0 {
                    return Err(self.runtime_err("divide by zero", pos));
                }
                a % b
            }
            _ => unreachable!("handled above"),
        };
        Ok(new_cell(Value::Num(result)))
    }

    fn eval_comparison(&mut self, op: crate::ast::BinaryOp, lhs: &Cell, rhs: &Cell, pos: usize) -> Result<Cell, JqawkError> {
        use crate::ast::BinaryOp::*;
        // `Unknown` orders before everything (preserves the AWK min/max
        // idiom `$ > max { max = $ }` against an unset `max`); `Null`
        // orders against nothing, per the resolved Null/Unknown split.
        let has_unknown = matches!(&*lhs.borrow(), Value::Unknown) || matches!(&*rhs.borrow(), Value::Unknown);
        if has_unknown {
            return Ok(new_cell(Value::Bool(true)));
        }
        let has_null = matches!(&*lhs.borrow(), Value::Null) || matches!(&*rhs.borrow(), Value::Null);
        if has_null {
            return Ok(new_cell(Value::Bool(false)));
        }
        let ordering = match (&*lhs.borrow(), &*rhs.borrow()) {
            (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
            (a, b) => {
                let a = a.as_num().ok_or_else(|| self.runtime_err("cannot compare these values", pos))?;
                let b = b.as_num().ok_or_else(|| self.runtime_err("cannot compare these values", pos))?;
                a.partial_cmp(&b)
            }
        };
        let Some(ordering) = ordering else {
            return Err(self.runtime_err("cannot compare these values", pos));
        };
        use std::cmp::Ordering::*;
        let result = match op {
            Lt => ordering == Less,
            LtEq => ordering != Greater,
            Gt => ordering == Greater,
            GtEq => ordering != Less,
            _ => unreachable!("caller filtered to comparison operators"),
        };
        Ok(new_cell(Value::Bool(result)))
    }

    fn eval_regex_match(&mut self, op: crate::ast::BinaryOp, lhs: &Cell, rhs: &Cell, pos: usize) -> Result<Cell, JqawkError> {
        let text = value::print_string(lhs);
        let pattern = match &*rhs.borrow() {
            Value::Regex(p) => p.clone(),
            Value::Str(s) => s.clone(),
            other => return Err(self.runtime_err(format!("right-hand side of '~' must be a regex, found {}", other.type_name()), pos)),
        };
        let re = regex::Regex::new(&pattern).map_err(|e| self.runtime_err(format!("invalid regex: {e}"), pos))?;
        let is_match = re.is_match(&text);
        let result = match op {
            crate::ast::BinaryOp::Match => is_match,
            crate::ast::BinaryOp::NotMatch => !is_match,
            _ => unreachable!("caller filtered to match operators"),
        };
        Ok(new_cell(Value::Bool(result)))
    }

    fn eval_call(
        &mut self,
        frame: &FrameRef,
        callee: &Expression,
        args: &[Expression],
        pos: usize,
    ) -> Result<Cell, JqawkError> {
        let arg_cells: Result<Vec<Cell>, JqawkError> =
            args.iter().map(|arg| self.eval_expr(frame, arg)).collect();
        let arg_cells = arg_cells?;

        if let Expression::Var(name, _) = callee {
            match name.as_str() {
                "printf" => return self.call_free_builtin(builtins::printf, &arg_cells, pos),
                "json" => return self.call_free_builtin(builtins::json, &arg_cells, pos),
                "num" => return self.call_free_builtin(builtins::num, &arg_cells, pos),
                _ => {}
            }
            if let Some(func) = self.functions.get(name).cloned() {
                return self.call_user_function(&func, &arg_cells, pos);
            }
        }

        let callee_cell = self.eval_expr(frame, callee)?;
        self.call_value(&callee_cell, &arg_cells, pos)
    }

    fn call_free_builtin(
        &mut self,
        func: fn(&mut NativeCtx, &[Cell]) -> value::NativeResult,
        args: &[Cell],
        pos: usize,
    ) -> Result<Cell, JqawkError> {
        let mut no_calls = |_callee: &Cell, _args: &[Cell]| -> value::NativeResult {
            Err("this builtin does not invoke other values".into())
        };
        let mut ctx = NativeCtx {
            output: &mut *self.output,
            call: &mut no_calls,
        };
        func(&mut ctx, args).map_err(|message| self.runtime_err(message, pos))
    }

    /// The callback handed to every [`NativeCtx`] so prototype methods
    /// (`sort`'s comparator) can invoke an arbitrary value as a
    /// function without this crate's value layer depending on the
    /// evaluator.
    pub fn call_value(&mut self, callee: &Cell, args: &[Cell], pos: usize) -> Result<Cell, JqawkError> {
        let value = callee.borrow().clone();
        match value {
            Value::Function(func) => self.call_user_function(&func, args, pos),
            Value::Native(method) => {
                let receiver = method.binding.clone();
                self.call_native_method(&method, receiver.as_ref(), args, pos)
            }
            other => Err(self.runtime_err(format!("{} is not callable", other.type_name()), pos)),
        }
    }

    fn call_native_method(
        &mut self,
        method: &NativeMethod,
        receiver: Option<&Cell>,
        args: &[Cell],
        pos: usize,
    ) -> Result<Cell, JqawkError> {
        // SAFETY: `evaluator` is reborrowed only inside `call`, which `func`
        // invokes synchronously on this same call stack (e.g. `sort`'s
        // comparator); there is no concurrency and no reentrant alias to
        // `self` outside of this single call chain.
        let evaluator: *mut Evaluator = self;
        let mut call = |callee: &Cell, call_args: &[Cell]| -> value::NativeResult {
            let evaluator = unsafe { &mut *evaluator };
            evaluator
                .call_value(callee, call_args, pos)
                .map_err(|e| e.to_string())
        };
        let mut ctx = NativeCtx {
            output: &mut *self.output,
            call: &mut call,
        };
        (method.func)(&mut ctx, receiver, args).map_err(|message| self.runtime_err(message, pos))
    }

    fn call_user_function(&mut self, func: &Rc<FunctionValue>, args: &[Cell], pos: usize) -> Result<Cell, JqawkError> {
        self.call_depth += 1;
        if self.call_depth > MAX_CALL_DEPTH {
            self.call_depth -= 1;
            return Err(self.runtime_err("call stack depth exceeded", pos));
        }
        let call_frame = Frame::child(&func.captured);
        {
            let mut frame_mut = call_frame.borrow_mut();
            for (idx, param) in func.params.iter().enumerate() {
                let value = args
                    .get(idx)
                    .map(|cell| value::assign_value(cell))
                    .unwrap_or_else(|| new_cell(Value::Null));
                frame_mut.declare(param, value);
            }
        }
        let result = self.exec_block(&call_frame, &func.body);
        self.call_depth -= 1;
        match result? {
            Signal::Return(cell) => Ok(cell),
            _ => Ok(new_cell(Value::Null)),
        }
    }
}

fn resolve_index(len: usize, idx: f64) -> Option<usize> {
    let idx = idx as i64;
    let resolved = if idx < 0 { idx + len as i64 } else { idx };
    if resolved < 0 || resolved as usize >= len {
        None
    } else {
        Some(resolved as usize)
    }
}

fn resolve_index_growable(len: usize, idx: f64) -> usize {
    let idx = idx as i64;
    let resolved = if idx < 0 { idx + len as i64 } else { idx };
    resolved.max(0) as usize
}

fn clamp_bound(n: i64, len: usize) -> usize {
    let resolved = if n < 0 { n + len as i64 } else { n };
    resolved.clamp(0, len as i64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn run(source: &str) -> String {
        let program = parse_program(source).expect("program should parse");
        let mut out = Vec::new();
        let options = EvalOptions { inputs: vec![], root_selectors: vec![] };
        run_program(&program, options, source, &mut out, &|| false).expect("program should run");
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn indexed_write_on_an_unknown_variable_auto_vivifies_an_object() {
        assert_eq!(run("BEGIN { a.b = 1; print a }"), "{\"b\": 1}\n");
    }

    #[test]
    fn indexed_write_on_an_unknown_variable_auto_vivifies_an_array() {
        assert_eq!(run("BEGIN { a[0] = 1; print a }"), "[1]\n");
    }

    #[test]
    fn self_referential_assignment_ties_a_true_cycle() {
        // `a` starts Unknown; reading it for the rhs and vivifying the lhs
        // base must resolve to the very same cell, or this would alias a
        // throwaway Unknown no one else can reach instead of looping back
        // on itself.
        assert_eq!(run("BEGIN { a.a = a; print a }"), "{\"a\": <circular reference>}\n");
    }

    #[test]
    fn implicit_global_persists_across_records() {
        let program = parse_program("$ > max { max = $ } END { print max }").unwrap();
        let mut out = Vec::new();
        let path = std::env::temp_dir().join(format!(
            "jqawk-evaluator-test-{}-{}.json",
            std::process::id(),
            "max"
        ));
        std::fs::write(&path, "[1,5,3,2]").unwrap();
        let options = EvalOptions {
            inputs: vec![Input::File(path.display().to_string())],
            root_selectors: vec![],
        };
        run_program(
            &program,
            options,
            "$ > max { max = $ } END { print max }",
            &mut out,
            &|| false,
        )
        .unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(String::from_utf8(out).unwrap(), "5\n");
    }

    #[test]
    fn match_with_no_matching_arm_evaluates_to_null() {
        assert_eq!(run("BEGIN { print match (5) { 1 => \"one\", 2 => \"two\" } }"), "null\n");
    }

    #[test]
    fn increment_on_an_unset_name_seeds_it_at_one() {
        assert_eq!(run("BEGIN { count++; print count }"), "1\n");
    }

    #[test]
    fn increment_on_a_missing_object_field_creates_it_at_one() {
        assert_eq!(run("BEGIN { a.hits++; print a }"), "{\"hits\": 1}\n");
    }

    #[test]
    fn array_write_past_the_end_pads_with_null() {
        assert_eq!(run("BEGIN { a = [1]; a[3] = 9; print a }"), "[1, null, null, 9]\n");
    }

    #[test]
    fn out_of_range_array_read_yields_null() {
        assert_eq!(run("BEGIN { a = [1, 2]; print a[9] }"), "null\n");
    }
}
