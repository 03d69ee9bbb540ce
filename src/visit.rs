//! AST-to-AST transforms.
//!
//! Hooks, the null guard and the translator stages are all expressed as
//! [`ExprTransform`]s and folded left to right.

use crate::ast::{Expr, Lambda};
use crate::error::MapResult;
use std::sync::Arc;

/// A pure rewrite of a query expression.
pub trait ExprTransform: Send + Sync {
    fn apply(&self, expr: Expr) -> MapResult<Expr>;
}

impl<F> ExprTransform for F
where
    F: Fn(Expr) -> Expr + Send + Sync,
{
    fn apply(&self, expr: Expr) -> MapResult<Expr> {
        Ok(self(expr))
    }
}

/// Ordered list of transforms shared by every call.
pub type Hooks = Vec<Arc<dyn ExprTransform>>;

/// Fold `hooks` over `expr`, first to last.
pub fn fold_hooks(hooks: &[Arc<dyn ExprTransform>], expr: Expr) -> MapResult<Expr> {
    hooks.iter().try_fold(expr, |acc, hook| hook.apply(acc))
}

/// Bottom-up rewrite: children first, then `f` on the rebuilt node.
pub fn rewrite_bottom_up<F>(expr: Expr, f: &mut F) -> MapResult<Expr>
where
    F: FnMut(Expr) -> MapResult<Expr>,
{
    let rebuilt = expr.try_map_children(&mut |child| rewrite_bottom_up(child, f))?;
    f(rebuilt)
}

/// Replace every reference to parameter `name` in `body` with `replacement`.
///
/// Nested lambdas that rebind `name` shadow it.
pub fn substitute_param(body: Expr, name: &str, replacement: &Expr) -> Expr {
    match body {
        Expr::Param { name: ref n, .. } if n == name => replacement.clone(),
        Expr::Lambda(ref lambda) if lambda.params.iter().any(|p| p.name == name) => body,
        other => other.map_children(&mut |child| substitute_param(child, name, replacement)),
    }
}

/// Inline a single-parameter lambda applied to `arg`.
pub fn inline_lambda(lambda: &Lambda, arg: &Expr) -> Expr {
    match lambda.params.first() {
        Some(p) => substitute_param((*lambda.body).clone(), &p.name, arg),
        None => (*lambda.body).clone(),
    }
}
