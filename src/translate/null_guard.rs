//! Null propagation for navigation chains.
//!
//! `e.Manager.Name` becomes `(e.Manager == null ? null : e.Manager.Name)` so that
//! engines which fault on null dereference yield null instead.

use crate::ast::{Expr, Type};
use crate::error::MapResult;
use crate::visit::{ExprTransform, rewrite_bottom_up};

/// Guards every member read whose target is itself an entity-typed member read.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullGuard;

impl ExprTransform for NullGuard {
    fn apply(&self, expr: Expr) -> MapResult<Expr> {
        rewrite_bottom_up(expr, &mut |node| Ok(guard(node)))
    }
}

fn guard(node: Expr) -> Expr {
    let Expr::Member {
        target: Some(target),
        ..
    } = &node
    else {
        return node;
    };
    let guarded_below =
        matches!(target.as_ref(), Expr::Conditional { if_false, .. } if is_navigation(if_false));
    if !(guarded_below || is_navigation(target)) {
        return node;
    }
    let test = target.as_ref().clone().eq(Expr::null(target.ty()));
    let ty = node.ty();
    Expr::conditional(test, Expr::null(ty), node)
}

fn is_navigation(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Member {
            target: Some(_),
            ty: Type::Entity(_),
            ..
        }
    )
}
