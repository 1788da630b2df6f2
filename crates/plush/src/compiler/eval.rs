//! Program evaluation.
//!
//! Walks a compiled program against a context, producing the skeleton text
//! and the ordered hole markers found along the way. Block bodies run in
//! forked child contexts, so `let` bindings inside a block never leak into
//! the entry scope — which is also why a hole re-rendered later against a
//! fork of the entry context sees the entry value, not a block-local one.

use std::collections::HashMap;

use crate::compiler::ast::{BinOp, Expr, Node, Program};
use crate::compiler::error::EvalError;
use crate::context::Context;
use crate::engine::Engine;
use crate::error::RenderError;
use crate::helpers::{Helper, HelperArgs};
use crate::types::{HoleMarker, Value};

/// Evaluate `program`, returning the skeleton and its hole markers.
pub(crate) fn exec(
    program: &Program,
    ctx: &Context,
    engine: &Engine,
) -> Result<(String, Vec<HoleMarker>), RenderError> {
    let mut machine = Machine {
        engine,
        out: String::new(),
        holes: Vec::new(),
    };
    machine.eval_nodes(&program.nodes, ctx)?;
    Ok((machine.out, machine.holes))
}

struct Machine<'a> {
    engine: &'a Engine,
    out: String,
    holes: Vec<HoleMarker>,
}

impl Machine<'_> {
    fn eval_nodes(&mut self, nodes: &[Node], ctx: &Context) -> Result<(), RenderError> {
        for node in nodes {
            match node {
                Node::Text(text) => self.out.push_str(text),
                Node::Output { expr, line } => {
                    let value = self.eval_expr(expr, ctx, *line)?;
                    self.out.push_str(&value.to_string());
                }
                Node::Hole { input, .. } => {
                    let index = self.holes.len();
                    let start = self.out.len();
                    self.out.push_str(&format!("<PLUSH_HOLE_{index}>"));
                    self.holes.push(HoleMarker {
                        start,
                        end: self.out.len(),
                        input: input.clone(),
                        content: String::new(),
                        err: None,
                    });
                }
                Node::Let { name, expr, line } => {
                    let value = self.eval_expr(expr, ctx, *line)?;
                    ctx.set(name, value);
                }
                Node::Assign { name, expr, line } => {
                    let value = self.eval_expr(expr, ctx, *line)?;
                    if !ctx.update(name, value) {
                        return Err(EvalError::UnknownIdentifier {
                            line: *line,
                            name: name.clone(),
                        }
                        .into());
                    }
                }
                Node::ExprStmt { expr, line } => {
                    self.eval_expr(expr, ctx, *line)?;
                }
                Node::If {
                    cond,
                    then,
                    otherwise,
                    emit,
                    line,
                } => {
                    let value = self.eval_expr(cond, ctx, *line)?;
                    let Some(taken) = value.as_bool() else {
                        return Err(EvalError::TypeMismatch {
                            line: *line,
                            message: format!("expected a boolean condition, got {value}"),
                        }
                        .into());
                    };
                    let saved_out = self.out.len();
                    let saved_holes = self.holes.len();
                    let child = ctx.fork();
                    self.eval_nodes(if taken { then } else { otherwise }, &child)?;
                    if !emit {
                        self.out.truncate(saved_out);
                        self.holes.truncate(saved_holes);
                    }
                }
                Node::For {
                    index,
                    item,
                    iterable,
                    body,
                    emit,
                    line,
                } => {
                    let items = match self.eval_expr(iterable, ctx, *line)? {
                        Value::Array(items) => items,
                        other => {
                            return Err(EvalError::TypeMismatch {
                                line: *line,
                                message: format!("cannot iterate over {other}"),
                            }
                            .into());
                        }
                    };
                    let saved_out = self.out.len();
                    let saved_holes = self.holes.len();
                    for (i, item_value) in items.into_iter().enumerate() {
                        let child = ctx.fork();
                        if let Some(index_name) = index {
                            child.set(index_name, Value::from(i));
                        }
                        child.set(item, item_value);
                        self.eval_nodes(body, &child)?;
                    }
                    if !emit {
                        self.out.truncate(saved_out);
                        self.holes.truncate(saved_holes);
                    }
                }
            }
        }
        Ok(())
    }

    fn eval_expr(&mut self, expr: &Expr, ctx: &Context, line: usize) -> Result<Value, RenderError> {
        match expr {
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval_expr(item, ctx, line))
                    .collect::<Result<Vec<Value>, RenderError>>()?;
                Ok(Value::Array(values))
            }
            Expr::Map(entries) => {
                let mut map = HashMap::with_capacity(entries.len());
                for (key, value_expr) in entries {
                    map.insert(key.clone(), self.eval_expr(value_expr, ctx, line)?);
                }
                Ok(Value::Map(map))
            }
            Expr::Ident(name) => {
                if let Some(value) = ctx.get(name) {
                    return Ok(value);
                }
                if let Some(Helper::Constant(value)) = self.engine.helpers().get(name) {
                    return Ok(value.clone());
                }
                Err(EvalError::UnknownIdentifier {
                    line,
                    name: name.clone(),
                }
                .into())
            }
            Expr::Call { name, args } => {
                let values = args
                    .iter()
                    .map(|arg| self.eval_expr(arg, ctx, line))
                    .collect::<Result<Vec<Value>, RenderError>>()?;
                match self.engine.helpers().get(name) {
                    Some(Helper::Function(call)) => call(&HelperArgs {
                        name: name.as_str(),
                        values: &values,
                        context: ctx,
                        engine: self.engine,
                        line,
                    }),
                    Some(Helper::Constant(_)) => Err(EvalError::NotCallable {
                        line,
                        name: name.clone(),
                    }
                    .into()),
                    None => Err(EvalError::UnknownHelper {
                        line,
                        name: name.clone(),
                    }
                    .into()),
                }
            }
            Expr::Infix { op, left, right } => {
                let lhs = self.eval_expr(left, ctx, line)?;
                let rhs = self.eval_expr(right, ctx, line)?;
                apply_infix(*op, lhs, rhs, line)
            }
        }
    }
}

fn apply_infix(op: BinOp, lhs: Value, rhs: Value, line: usize) -> Result<Value, RenderError> {
    match op {
        BinOp::Eq => return Ok(Value::Bool(lhs == rhs)),
        BinOp::Ne => return Ok(Value::Bool(lhs != rhs)),
        _ => {}
    }
    if matches!(op, BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge) {
        return compare(op, &lhs, &rhs, line);
    }
    match (op, lhs, rhs) {
        (BinOp::Add, Value::Number(l), Value::Number(r)) => Ok(Value::Number(l + r)),
        (BinOp::Sub, Value::Number(l), Value::Number(r)) => Ok(Value::Number(l - r)),
        (BinOp::Mul, Value::Number(l), Value::Number(r)) => Ok(Value::Number(l * r)),
        (BinOp::Div, Value::Number(l), Value::Number(r)) => match l.checked_div(r) {
            Some(n) => Ok(Value::Number(n)),
            None => Err(EvalError::TypeMismatch {
                line,
                message: "division by zero".to_string(),
            }
            .into()),
        },
        // String on the left stringifies anything on the right.
        (BinOp::Add, Value::String(l), r) => Ok(Value::String(format!("{l}{r}"))),
        // Array + string flattens the array, then appends.
        (BinOp::Add, Value::Array(items), Value::String(r)) => {
            let mut joined: String = items.iter().map(ToString::to_string).collect();
            joined.push_str(&r);
            Ok(Value::String(joined))
        }
        (BinOp::Add, Value::Array(mut l), Value::Array(r)) => {
            l.extend(r);
            Ok(Value::Array(l))
        }
        (op, l, r) => match (l.as_float(), r.as_float()) {
            (Some(lf), Some(rf)) => {
                let result = match op {
                    BinOp::Add => lf + rf,
                    BinOp::Sub => lf - rf,
                    BinOp::Mul => lf * rf,
                    _ => {
                        if rf == 0.0 {
                            return Err(EvalError::TypeMismatch {
                                line,
                                message: "division by zero".to_string(),
                            }
                            .into());
                        }
                        lf / rf
                    }
                };
                Ok(Value::Float(result))
            }
            _ => Err(EvalError::TypeMismatch {
                line,
                message: format!("cannot apply operator to {l} and {r}"),
            }
            .into()),
        },
    }
}

fn compare(op: BinOp, lhs: &Value, rhs: &Value, line: usize) -> Result<Value, RenderError> {
    let ordering = match (lhs, rhs) {
        (Value::String(l), Value::String(r)) => l.cmp(r),
        (l, r) => match (l.as_float(), r.as_float()) {
            (Some(lf), Some(rf)) => lf.partial_cmp(&rf).ok_or_else(|| EvalError::TypeMismatch {
                line,
                message: "cannot compare NaN".to_string(),
            })?,
            _ => {
                return Err(EvalError::TypeMismatch {
                    line,
                    message: format!("cannot compare {l} and {r}"),
                }
                .into());
            }
        },
    };
    let result = match op {
        BinOp::Lt => ordering.is_lt(),
        BinOp::Le => ordering.is_le(),
        BinOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    };
    Ok(Value::Bool(result))
}
