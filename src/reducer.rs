//! Reducer detection and neutralization.
//!
//! A reducer (`Count`, `Any`, `First`, ...) collapses a sequence, so a projection
//! cannot be layered on top of it. The finder locates the reducer, the replacer
//! turns it back into a plain sequence, and the caller reapplies the operator
//! after projecting.

use crate::ast::{Expr, Type};
use crate::error::{MapError, MapResult};
use crate::operators::{ArgKind, SeqOp};

/// Outcome of a finder pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindResult {
    pub candidate: Option<Expr>,
    pub reshape_seen: bool,
}

/// Locate the reducer call to neutralize in `expr`.
///
/// Only the query spine is searched: the outermost call and, recursively, the
/// source argument of each call. A reducer nested under a member read, an
/// operator or a lambda body is never a candidate. Calls are visited outermost
/// first; later matches overwrite earlier ones, and a reshape clears whatever
/// was recorded before it.
pub fn find_element_operator(expr: &Expr, element: &Type) -> FindResult {
    fold(expr, element, FindResult::default())
}

fn fold(expr: &Expr, element: &Type, acc: FindResult) -> FindResult {
    let Expr::Call { op, args, ty } = expr else {
        return acc;
    };
    let acc = if *op == SeqOp::RESHAPE {
        FindResult {
            candidate: None,
            reshape_seen: true,
        }
    } else if ty.is_lazy() || (!ty.is_primitive() && ty != element) {
        // Still a sequence, or already shaped by the caller.
        acc
    } else {
        FindResult {
            candidate: Some(expr.clone()),
            ..acc
        }
    };
    match args.first() {
        Some(source) => fold(source, element, acc),
        None => acc,
    }
}

/// How the reducer was neutralized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Neutralized {
    /// `op(source, predicate)` became `Where(source, predicate)`.
    ReplacedWithFilter { op: SeqOp, arity: usize },
    /// `op(source)` was stripped down to `source`.
    Stripped { op: SeqOp },
}

impl Neutralized {
    pub fn op(&self) -> SeqOp {
        match self {
            Neutralized::ReplacedWithFilter { op, .. } | Neutralized::Stripped { op } => *op,
        }
    }

    /// The operator signature to reapply after projection.
    pub fn reapply_signature(&self) -> MapResult<&'static [ArgKind]> {
        match self {
            Neutralized::ReplacedWithFilter { op, arity } => op.predicate_free_sibling(*arity),
            Neutralized::Stripped { op } => op
                .overload(1)
                .ok_or_else(|| MapError::unsupported_reducer(op.name(), 1)),
        }
    }
}

/// Outcome of a replacer pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Replacement {
    pub expr: Expr,
    pub neutralized: Option<Neutralized>,
}

impl Replacement {
    pub fn found_element_operator(&self) -> bool {
        self.neutralized.is_some()
    }
}

/// Neutralize `candidate` in `expr`. At most one node is replaced.
pub fn replace_element_operator(expr: Expr, candidate: Option<&Expr>) -> Replacement {
    let Some(candidate) = candidate else {
        return Replacement {
            expr,
            neutralized: None,
        };
    };
    let mut neutralized = None;
    let expr = replace_first(expr, candidate, &mut neutralized);
    Replacement { expr, neutralized }
}

fn replace_first(expr: Expr, candidate: &Expr, done: &mut Option<Neutralized>) -> Expr {
    if done.is_some() {
        return expr;
    }
    if &expr == candidate {
        return match expr {
            Expr::Call { op, args, ty } => match neutralize(op, args) {
                Ok((replaced, how)) => {
                    *done = Some(how);
                    replaced
                }
                Err(args) => Expr::Call { op, args, ty },
            },
            other => other,
        };
    }
    expr.map_children(&mut |child| replace_first(child, candidate, done))
}

/// Rewrite a reducer call, or hand the arguments back when it has no neutral form.
fn neutralize(op: SeqOp, mut args: Vec<Expr>) -> Result<(Expr, Neutralized), Vec<Expr>> {
    let arity = args.len();
    if op.takes_predicate(arity) {
        let ty = args
            .first()
            .map(|source| SeqOp::FILTER.result_type(&source.ty(), &args[1..]))
            .unwrap_or(Type::Unit);
        let filter = Expr::Call {
            op: SeqOp::FILTER,
            args,
            ty,
        };
        return Ok((filter, Neutralized::ReplacedWithFilter { op, arity }));
    }
    if arity == 1 {
        if let Some(source) = args.pop() {
            return Ok((source, Neutralized::Stripped { op }));
        }
    }
    Err(args)
}
