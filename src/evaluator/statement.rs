use super::{Evaluator, Frame, FrameRef, Signal};
use crate::ast::{Block, Statement};
use crate::error::JqawkError;
use crate::value::{self, new_cell, print_string, Value};

impl<'a> Evaluator<'a> {
    pub fn exec_block(&mut self, frame: &FrameRef, block: &Block) -> Result<Signal, JqawkError> {
        for statement in &block.statements {
            match self.exec_statement(frame, statement)? {
                Signal::None => continue,
                other => return Ok(other),
            }
        }
        Ok(Signal::None)
    }

    fn exec_statement(&mut self, frame: &FrameRef, statement: &Statement) -> Result<Signal, JqawkError> {
        match statement {
            Statement::Expr(expr) => {
                self.eval_expr(frame, expr)?;
                Ok(Signal::None)
            }
            Statement::Let { name, value, .. } => {
                let cell = self.eval_expr(frame, value)?;
                frame.borrow_mut().declare(name, value::assign_value(&cell));
                Ok(Signal::None)
            }
            Statement::Print(exprs, _) => {
                let mut rendered = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    let cell = self.eval_expr(frame, expr)?;
                    rendered.push(print_string(&cell));
                }
                if rendered.is_empty() {
                    let current = self.read_var(frame, "$", statement_pos(statement))?;
                    writeln!(self.output, "{}", print_string(&current)).ok();
                } else {
                    writeln!(self.output, "{}", rendered.join(" ")).ok();
                }
                Ok(Signal::None)
            }
            Statement::Return(expr, _) => {
                let cell = match expr {
                    Some(expr) => self.eval_expr(frame, expr)?,
                    None => new_cell(Value::Null),
                };
                Ok(Signal::Return(cell))
            }
            Statement::If { condition, then_block, else_block, .. } => {
                let cond = self.eval_expr(frame, condition)?;
                if cond.borrow().is_truthy() {
                    let child = Frame::child(frame);
                    self.exec_block(&child, then_block)
                } else if let Some(else_block) = else_block {
                    let child = Frame::child(frame);
                    self.exec_block(&child, else_block)
                } else {
                    Ok(Signal::None)
                }
            }
            Statement::While { condition, body, .. } => {
                loop {
                    let cond = self.eval_expr(frame, condition)?;
                    if !cond.borrow().is_truthy() {
                        break;
                    }
                    let child = Frame::child(frame);
                    match self.exec_block(&child, body)? {
                        Signal::Break => break,
                        Signal::Continue | Signal::None => continue,
                        other => return Ok(other),
                    }
                }
                Ok(Signal::None)
            }
            Statement::ForC { init, condition, step, body, .. } => {
                let loop_frame = Frame::child(frame);
                if let Some(init) = init {
                    self.exec_statement(&loop_frame, init)?;
                }
                loop {
                    if let Some(condition) = condition {
                        let cond = self.eval_expr(&loop_frame, condition)?;
                        if !cond.borrow().is_truthy() {
                            break;
                        }
                    }
                    let child = Frame::child(&loop_frame);
                    match self.exec_block(&child, body)? {
                        Signal::Break => break,
                        Signal::Continue | Signal::None => {}
                        other => return Ok(other),
                    }
                    if let Some(step) = step {
                        self.exec_statement(&loop_frame, step)?;
                    }
                }
                Ok(Signal::None)
            }
            Statement::ForIn { first, second, iterable, body, .. } => {
                let iterable_cell = self.eval_expr(frame, iterable)?;
                let entries: Vec<(Value, crate::value::Cell)> = {
                    let value = iterable_cell.borrow();
                    match &*value {
                        Value::Array(items) => items
                            .iter()
                            .enumerate()
                            .map(|(idx, item)| (Value::Num(idx as f64), item.clone()))
                            .collect(),
                        Value::Object(object) => object
                            .iter()
                            .map(|(key, value)| (Value::Str(key.clone()), value.clone()))
                            .collect(),
                        other => {
                            return Err(self.runtime_err(
                                format!("cannot iterate over {}", other.type_name()),
                                statement_pos(statement),
                            ))
                        }
                    }
                };
                for (key, item) in entries {
                    let child = Frame::child(frame);
                    match second {
                        Some(value_name) => {
                            child.borrow_mut().declare(first, new_cell(key));
                            child.borrow_mut().declare(value_name, value::assign_value(&item));
                        }
                        None => {
                            child.borrow_mut().declare(first, value::assign_value(&item));
                        }
                    }
                    match self.exec_block(&child, body)? {
                        Signal::Break => break,
                        Signal::Continue | Signal::None => continue,
                        other => return Ok(other),
                    }
                }
                Ok(Signal::None)
            }
            Statement::Break(_) => Ok(Signal::Break),
            Statement::Continue(_) => Ok(Signal::Continue),
            Statement::Next(_) => Ok(Signal::Next),
            Statement::Exit(_) => Ok(Signal::Exit),
            Statement::Block(block) => {
                let child = Frame::child(frame);
                self.exec_block(&child, block)
            }
            Statement::FunctionDef { name, params, body, .. } => {
                let func = std::rc::Rc::new(crate::value::FunctionValue {
                    name: Some(name.clone()),
                    params: params.clone(),
                    body: body.clone(),
                    captured: frame.clone(),
                });
                self.define_function(name.clone(), func);
                Ok(Signal::None)
            }
        }
    }
}

fn statement_pos(statement: &Statement) -> usize {
    match statement {
        Statement::Expr(expr) => expr.pos(),
        Statement::Let { pos, .. }
        | Statement::Print(_, pos)
        | Statement::Return(_, pos)
        | Statement::If { pos, .. }
        | Statement::While { pos, .. }
        | Statement::ForC { pos, .. }
        | Statement::ForIn { pos, .. }
        | Statement::Break(pos)
        | Statement::Continue(pos)
        | Statement::Next(pos)
        | Statement::Exit(pos)
        | Statement::FunctionDef { pos, .. } => *pos,
        Statement::Block(block) => block.statements.first().map(statement_pos).unwrap_or(0),
    }
}
