//! Tree-walking interpreter for parsed statements

use super::parser::{BinOp, Expr, LogicalOp, Stmt, UnaryOp};
use crate::evaluator::value::{MAX_ARRAY_SLOTS, MAX_VALUE_DEPTH};
use crate::evaluator::{Bindings, EvalError, Value};

/// Longest string a concatenation may produce, in bytes
pub const MAX_STRING_BYTES: usize = 1 << 24;

/// Evaluates statements against a mutable set of bindings
pub struct Interpreter<'b> {
    bindings: &'b mut Bindings,
}

impl<'b> Interpreter<'b> {
    pub fn new(bindings: &'b mut Bindings) -> Self {
        Self { bindings }
    }

    /// Run statements in order, returning the value of the last one
    pub fn run(&mut self, stmts: &[Stmt]) -> Result<Value, EvalError> {
        let mut last = Value::Undefined;
        for stmt in stmts {
            last = match stmt {
                Stmt::Declare { name, init } => {
                    let value = match init {
                        Some(expr) => self.eval(expr)?,
                        None => Value::Undefined,
                    };
                    self.bindings.insert(name.clone(), value);
                    Value::Undefined
                }
                Stmt::Expr(expr) => self.eval(expr)?,
            };
        }
        Ok(last)
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                checked_array(values)
            }
            Expr::Ident(name) => self.lookup(name),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                })
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left)?;
                match (op, left.truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                    _ => self.eval(right),
                }
            }
            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(condition)?.truthy() {
                    self.eval(then_branch)
                } else {
                    self.eval(else_branch)
                }
            }
            Expr::Assign { name, op, value } => {
                let rhs = self.eval(value)?;
                let new_value = match op {
                    Some(op) => binary(*op, &self.lookup(name)?, &rhs)?,
                    None => rhs,
                };
                self.bindings.insert(name.clone(), new_value.clone());
                Ok(new_value)
            }
            Expr::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                index_value(&target, &index)
            }
            Expr::Member { target, name } => {
                let target = self.eval(target)?;
                member_value(&target, name)
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, EvalError> {
        match name {
            "NaN" => return Ok(Value::Number(f64::NAN)),
            "Infinity" => return Ok(Value::Number(f64::INFINITY)),
            _ => {}
        }
        self.bindings
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::reference(format!("{} is not defined", name)))
    }
}

/// Build an array value, refusing ones too deep or too large to keep
fn checked_array(values: Vec<Value>) -> Result<Value, EvalError> {
    let depth = 1 + values.iter().map(Value::depth).max().unwrap_or(0);
    if depth > MAX_VALUE_DEPTH {
        return Err(EvalError::range("Maximum array nesting depth exceeded"));
    }
    let slots = values.len() + values.iter().map(Value::slot_count).sum::<usize>();
    if slots > MAX_ARRAY_SLOTS {
        return Err(EvalError::range("Invalid array length"));
    }
    Ok(Value::Array(values))
}

fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    Ok(match op {
        BinOp::Add => {
            let concat = matches!(left, Value::Str(_) | Value::Array(_))
                || matches!(right, Value::Str(_) | Value::Array(_));
            if concat {
                let text = format!("{}{}", left, right);
                if text.len() > MAX_STRING_BYTES {
                    return Err(EvalError::range("Invalid string length"));
                }
                Value::Str(text)
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinOp::Mod => Value::Number(left.to_number() % right.to_number()),
        BinOp::Eq => Value::Bool(loose_equals(left, right)),
        BinOp::NotEq => Value::Bool(!loose_equals(left, right)),
        BinOp::StrictEq => Value::Bool(strict_equals(left, right)),
        BinOp::StrictNotEq => Value::Bool(!strict_equals(left, right)),
        BinOp::Lt => compare(left, right, |o| o.is_lt()),
        BinOp::Le => compare(left, right, |o| o.is_le()),
        BinOp::Gt => compare(left, right, |o| o.is_gt()),
        BinOp::Ge => compare(left, right, |o| o.is_ge()),
    })
}

fn compare(left: &Value, right: &Value, test: fn(std::cmp::Ordering) -> bool) -> Value {
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    // Comparisons involving NaN are always false
    Value::Bool(ordering.is_some_and(test))
}

fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a == b,
        _ => left == right,
    }
}

fn loose_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Array(_), Value::Array(_)) => left == right,
        (Value::Array(_), other) | (other, Value::Array(_)) => {
            let as_text = Value::Str(if matches!(left, Value::Array(_)) {
                left.to_string()
            } else {
                right.to_string()
            });
            loose_equals(&as_text, other)
        }
        _ => left.to_number() == right.to_number(),
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value, EvalError> {
    if target.is_nullish() {
        return Err(EvalError::type_error(format!(
            "Cannot read properties of {} (reading '{}')",
            target, index
        )));
    }
    let position = index.to_number();
    let slot = if position >= 0.0 && position.fract() == 0.0 {
        Some(position as usize)
    } else {
        None
    };
    let value = match (target, slot) {
        (Value::Array(items), Some(i)) => items.get(i).cloned(),
        (Value::Str(s), Some(i)) => s.chars().nth(i).map(|c| Value::Str(c.to_string())),
        _ => None,
    };
    match (value, index) {
        (Some(value), _) => Ok(value),
        (None, Value::Str(name)) => member_value(target, name),
        (None, _) => Ok(Value::Undefined),
    }
}

fn member_value(target: &Value, name: &str) -> Result<Value, EvalError> {
    match (target, name) {
        (Value::Undefined | Value::Null, _) => Err(EvalError::type_error(format!(
            "Cannot read properties of {} (reading '{}')",
            target, name
        ))),
        (Value::Str(s), "length") => Ok(Value::Number(s.chars().count() as f64)),
        (Value::Array(items), "length") => Ok(Value::Number(items.len() as f64)),
        _ => Ok(Value::Undefined),
    }
}
