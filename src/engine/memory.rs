//! In-memory query engine.
//!
//! Evaluates expression trees directly over vectors of records. Used as the
//! source provider in tests and by the CLI demo.

use super::QueryProvider;
use crate::ast::{BinaryOp, Expr, Lambda, Type, UnaryOp, Value};
use crate::error::{MapError, MapResult};
use crate::operators::SeqOp;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// A scalar function callable through [`Expr::Invoke`].
pub type Function = Arc<dyn Fn(&[Value]) -> MapResult<Value> + Send + Sync>;

/// Evaluates queries over in-memory collections keyed by entity name.
#[derive(Clone, Default)]
pub struct InMemoryProvider {
    collections: HashMap<String, Vec<Value>>,
    functions: HashMap<String, Function>,
}

/// Lambda parameter bindings, innermost first.
struct Scope<'a> {
    name: &'a str,
    value: Value,
    parent: Option<&'a Scope<'a>>,
}

impl Scope<'_> {
    fn lookup(scope: Option<&Scope<'_>>, name: &str) -> Option<Value> {
        let mut current = scope;
        while let Some(s) = current {
            if s.name == name {
                return Some(s.value.clone());
            }
            current = s.parent;
        }
        None
    }
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the elements of an entity collection.
    pub fn collection(mut self, entity: &str, items: Vec<Value>) -> Self {
        self.collections.insert(entity.to_string(), items);
        self
    }

    /// Register a function callable from expressions.
    pub fn function(mut self, name: &str, f: Function) -> Self {
        self.functions.insert(name.to_string(), f);
        self
    }

    fn eval(&self, expr: &Expr, scope: Option<&Scope<'_>>) -> MapResult<Value> {
        match expr {
            Expr::Root { element } => {
                let name = element.entity_name().ok_or_else(|| {
                    MapError::NotSupported(format!("query root over {}", element))
                })?;
                self.collections
                    .get(name)
                    .cloned()
                    .map(Value::List)
                    .ok_or_else(|| MapError::Execution(format!("no collection named '{}'", name)))
            }
            Expr::Constant { value, .. } => Ok(value.clone()),
            Expr::Param { name, .. } => Scope::lookup(scope, name)
                .ok_or_else(|| MapError::Execution(format!("unbound parameter '{}'", name))),
            Expr::Member {
                target: Some(target),
                name,
                ..
            } => match self.eval(target, scope)? {
                Value::Null => Err(MapError::Execution(format!(
                    "null reference reading '{}' on {}",
                    name, target
                ))),
                Value::Record { type_name, fields } => fields.get(name).cloned().ok_or_else(|| {
                    MapError::Execution(format!("{} has no member '{}'", type_name, name))
                }),
                other => Err(MapError::Execution(format!(
                    "cannot read '{}' on {}",
                    name,
                    other.runtime_type()
                ))),
            },
            Expr::Member {
                target: None,
                name,
                owner,
                ..
            } => Err(MapError::NotSupported(format!("static member {}.{}", owner, name))),
            Expr::Unary { op, operand } => {
                let v = self.eval(operand, scope)?;
                match (op, v) {
                    (_, Value::Null) => Ok(Value::Null),
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Negate, Value::Int(n)) => Ok(Value::Int(-n)),
                    (UnaryOp::Negate, Value::Float(n)) => Ok(Value::Float(-n)),
                    (op, v) => Err(MapError::Execution(format!(
                        "cannot apply {:?} to {}",
                        op,
                        v.runtime_type()
                    ))),
                }
            }
            Expr::Binary { left, op, right } => self.eval_binary(left, *op, right, scope),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => match self.eval(test, scope)? {
                Value::Bool(true) => self.eval(if_true, scope),
                Value::Bool(false) | Value::Null => self.eval(if_false, scope),
                other => Err(MapError::Execution(format!(
                    "condition must be bool, got {}",
                    other.runtime_type()
                ))),
            },
            Expr::Convert { operand, ty } => {
                let v = self.eval(operand, scope)?;
                match ty {
                    Type::Primitive(p) => v
                        .convert_to(*p)
                        .ok_or_else(|| MapError::conversion(v.runtime_type(), ty)),
                    _ => Ok(v),
                }
            }
            Expr::Lambda(_) => Err(MapError::Execution(
                "a lambda cannot be evaluated as a value".to_string(),
            )),
            Expr::New { ty, fields } => {
                let type_name = match ty {
                    Type::Entity(name) => name.clone(),
                    other => other.to_string(),
                };
                let fields = fields
                    .iter()
                    .map(|(name, e)| self.eval(e, scope).map(|v| (name.clone(), v)))
                    .collect::<MapResult<_>>()?;
                Ok(Value::Record { type_name, fields })
            }
            Expr::Call { op, args, .. } => self.eval_call(*op, args, scope),
            Expr::Invoke { function, args, .. } => {
                let f = self.functions.get(function).ok_or_else(|| {
                    MapError::NotSupported(format!(
                        "function '{}' has no in-memory translation",
                        function
                    ))
                })?;
                let args = args
                    .iter()
                    .map(|a| self.eval(a, scope))
                    .collect::<MapResult<Vec<_>>>()?;
                f(&args)
            }
        }
    }

    fn eval_binary(
        &self,
        left: &Expr,
        op: BinaryOp,
        right: &Expr,
        scope: Option<&Scope<'_>>,
    ) -> MapResult<Value> {
        let l = self.eval(left, scope)?;
        // Short-circuit forms
        match (op, &l) {
            (BinaryOp::And, Value::Bool(false)) => return Ok(Value::Bool(false)),
            (BinaryOp::Or, Value::Bool(true)) => return Ok(Value::Bool(true)),
            (BinaryOp::Coalesce, v) if !v.is_null() => return Ok(l),
            _ => {}
        }
        let r = self.eval(right, scope)?;

        let mismatch = || {
            MapError::Execution(format!(
                "cannot apply '{}' to {} and {}",
                op,
                l.runtime_type(),
                r.runtime_type()
            ))
        };

        match op {
            BinaryOp::Coalesce => Ok(r),
            BinaryOp::And | BinaryOp::Or => match (&l, &r) {
                (Value::Bool(_), Value::Bool(b)) => Ok(Value::Bool(*b)),
                _ => Err(mismatch()),
            },
            BinaryOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
            BinaryOp::Ne => Ok(Value::Bool(!values_equal(&l, &r))),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                if l.is_null() || r.is_null() {
                    return Ok(Value::Bool(false));
                }
                let ord = l.compare(&r).ok_or_else(mismatch)?;
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ord == Ordering::Less,
                    BinaryOp::Le => ord != Ordering::Greater,
                    BinaryOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                }))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                match (&l, &r) {
                    (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                    (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
                        Ok(Value::String(format!("{}{}", a, b)))
                    }
                    (Value::Int(a), Value::Int(b)) => int_arith(op, *a, *b),
                    _ => {
                        let (a, b) = (l.as_f64(), r.as_f64());
                        let (a, b) = a.zip(b).ok_or_else(mismatch)?;
                        Ok(Value::Float(match op {
                            BinaryOp::Add => a + b,
                            BinaryOp::Sub => a - b,
                            BinaryOp::Mul => a * b,
                            BinaryOp::Div => a / b,
                            _ => a % b,
                        }))
                    }
                }
            }
        }
    }

    fn eval_call(&self, op: SeqOp, args: &[Expr], scope: Option<&Scope<'_>>) -> MapResult<Value> {
        let (source, extra) = args
            .split_first()
            .ok_or_else(|| MapError::Execution(format!("{} called without a source", op)))?;
        let items = match self.eval(source, scope)? {
            Value::List(items) => items,
            other => {
                return Err(MapError::Execution(format!(
                    "{} expects a sequence, got {}",
                    op,
                    other.runtime_type()
                )));
            }
        };
        let lambda = extra.first().and_then(|e| match e {
            Expr::Lambda(l) => Some(l),
            _ => None,
        });
        let scalar = |scope| match extra.first() {
            Some(e) => self.eval(e, scope),
            None => Err(MapError::Execution(format!("{} requires an argument", op))),
        };

        let filtered = |items: Vec<Value>| -> MapResult<Vec<Value>> {
            match lambda {
                Some(pred) => {
                    let mut kept = Vec::with_capacity(items.len());
                    for item in items {
                        if self.test(pred, item.clone(), scope)? {
                            kept.push(item);
                        }
                    }
                    Ok(kept)
                }
                None => Ok(items),
            }
        };

        match op {
            SeqOp::Where => filtered(items).map(Value::List),
            SeqOp::Select => {
                let selector = require_lambda(op, lambda)?;
                items
                    .into_iter()
                    .map(|item| self.apply(selector, item, scope))
                    .collect::<MapResult<Vec<_>>>()
                    .map(Value::List)
            }
            SeqOp::OrderBy | SeqOp::OrderByDescending => {
                let key = require_lambda(op, lambda)?;
                let mut keyed = items
                    .into_iter()
                    .map(|item| self.apply(key, item.clone(), scope).map(|k| (k, item)))
                    .collect::<MapResult<Vec<_>>>()?;
                keyed.sort_by(|(a, _), (b, _)| {
                    let ord = a.compare(b).unwrap_or(Ordering::Equal);
                    if op == SeqOp::OrderByDescending {
                        ord.reverse()
                    } else {
                        ord
                    }
                });
                Ok(Value::List(keyed.into_iter().map(|(_, item)| item).collect()))
            }
            SeqOp::Skip | SeqOp::Take => {
                let n = scalar(scope)?
                    .as_i64()
                    .ok_or_else(|| MapError::Execution(format!("{} expects an int", op)))?
                    .max(0) as usize;
                Ok(Value::List(if op == SeqOp::Skip {
                    items.into_iter().skip(n).collect()
                } else {
                    items.into_iter().take(n).collect()
                }))
            }
            SeqOp::Distinct => {
                let mut unique: Vec<Value> = Vec::with_capacity(items.len());
                for item in items {
                    if !unique.contains(&item) {
                        unique.push(item);
                    }
                }
                Ok(Value::List(unique))
            }
            SeqOp::Count | SeqOp::LongCount => Ok(Value::Int(filtered(items)?.len() as i64)),
            SeqOp::Any => Ok(Value::Bool(!filtered(items)?.is_empty())),
            SeqOp::All => {
                let pred = require_lambda(op, lambda)?;
                for item in items {
                    if !self.test(pred, item, scope)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            SeqOp::First | SeqOp::FirstOrDefault => {
                let items = filtered(items)?;
                single_or_default(op, items.into_iter().next(), op == SeqOp::FirstOrDefault)
            }
            SeqOp::Last | SeqOp::LastOrDefault => {
                let items = filtered(items)?;
                single_or_default(op, items.into_iter().last(), op == SeqOp::LastOrDefault)
            }
            SeqOp::Single | SeqOp::SingleOrDefault => {
                let items = filtered(items)?;
                if items.len() > 1 {
                    return Err(MapError::Execution(format!(
                        "{}: sequence contains more than one element",
                        op
                    )));
                }
                single_or_default(op, items.into_iter().next(), op == SeqOp::SingleOrDefault)
            }
            SeqOp::ElementAt => {
                let index = scalar(scope)?
                    .as_i64()
                    .ok_or_else(|| MapError::Execution("ElementAt expects an int".to_string()))?;
                usize::try_from(index)
                    .ok()
                    .and_then(|i| items.into_iter().nth(i))
                    .ok_or_else(|| MapError::Execution(format!("index {} out of range", index)))
            }
            SeqOp::Sum | SeqOp::Min | SeqOp::Max | SeqOp::Average => {
                let values = match lambda {
                    Some(selector) => items
                        .into_iter()
                        .map(|item| self.apply(selector, item, scope))
                        .collect::<MapResult<Vec<_>>>()?,
                    None => items,
                };
                aggregate(op, values)
            }
            SeqOp::Contains => {
                let needle = scalar(scope)?;
                Ok(Value::Bool(items.iter().any(|v| values_equal(v, &needle))))
            }
        }
    }

    fn apply(&self, lambda: &Lambda, arg: Value, scope: Option<&Scope<'_>>) -> MapResult<Value> {
        let param = lambda
            .params
            .first()
            .ok_or_else(|| MapError::Execution("lambda without parameters".to_string()))?;
        let inner = Scope {
            name: &param.name,
            value: arg,
            parent: scope,
        };
        self.eval(&lambda.body, Some(&inner))
    }

    fn test(&self, lambda: &Lambda, arg: Value, scope: Option<&Scope<'_>>) -> MapResult<bool> {
        match self.apply(lambda, arg, scope)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(MapError::Execution(format!(
                "predicate returned {}, expected bool",
                other.runtime_type()
            ))),
        }
    }
}

impl QueryProvider for InMemoryProvider {
    fn execute(&self, expr: &Expr) -> MapResult<Value> {
        tracing::trace!("in-memory execute: {}", expr);
        self.eval(expr, None)
    }
}

fn require_lambda(op: SeqOp, lambda: Option<&Lambda>) -> MapResult<&Lambda> {
    lambda.ok_or_else(|| MapError::Execution(format!("{} requires a lambda argument", op)))
}

fn single_or_default(op: SeqOp, item: Option<Value>, or_default: bool) -> MapResult<Value> {
    match item {
        Some(v) => Ok(v),
        None if or_default => Ok(Value::Null),
        None => Err(MapError::Execution(format!(
            "{}: sequence contains no matching element",
            op
        ))),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
            a.compare(b) == Some(Ordering::Equal)
        }
        _ => a == b,
    }
}

fn int_arith(op: BinaryOp, a: i64, b: i64) -> MapResult<Value> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => a.checked_div(b),
        _ => a.checked_rem(b),
    };
    result
        .map(Value::Int)
        .ok_or_else(|| MapError::Execution(format!("integer overflow or division by zero in {} {} {}", a, op, b)))
}

fn aggregate(op: SeqOp, values: Vec<Value>) -> MapResult<Value> {
    let values: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();
    match op {
        SeqOp::Sum => {
            if values.iter().all(|v| matches!(v, Value::Int(_))) {
                let total = values.iter().filter_map(Value::as_i64).try_fold(0i64, i64::checked_add);
                total
                    .map(Value::Int)
                    .ok_or_else(|| MapError::Execution("integer overflow in Sum".to_string()))
            } else {
                numbers(op, &values).map(|ns| Value::Float(ns.iter().sum()))
            }
        }
        SeqOp::Average => {
            let ns = numbers(op, &values)?;
            if ns.is_empty() {
                return Err(MapError::Execution("Average: sequence contains no elements".to_string()));
            }
            Ok(Value::Float(ns.iter().sum::<f64>() / ns.len() as f64))
        }
        _ => {
            let want = if op == SeqOp::Min { Ordering::Less } else { Ordering::Greater };
            let mut best: Option<Value> = None;
            for v in values {
                best = match best {
                    Some(b) if v.compare(&b) != Some(want) => Some(b),
                    _ => Some(v),
                };
            }
            best.ok_or_else(|| MapError::Execution(format!("{}: sequence contains no elements", op)))
        }
    }
}

fn numbers(op: SeqOp, values: &[Value]) -> MapResult<Vec<f64>> {
    values
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                MapError::Execution(format!("{} over non-numeric {}", op, v.runtime_type()))
            })
        })
        .collect()
}
