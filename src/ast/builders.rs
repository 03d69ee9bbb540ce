//! Fluent constructors for query expressions.
//!
//! ```
//! use qmap::ast::{Expr, Lambda, Type};
//!
//! let dto = Type::entity("EmployeeDto");
//! let adults = Expr::root(dto.clone())
//!     .filter(Lambda::with("d", dto, |d| d.member("Age", Type::int()).gt(Expr::constant(18))))
//!     .count();
//! assert_eq!(adults.to_string(), "Root(EmployeeDto).Where(d => (d.Age > 18)).Count()");
//! ```

use crate::ast::{BinaryOp, Expr, Lambda, Param, Type, UnaryOp, Value};
use crate::operators::SeqOp;

impl Lambda {
    pub fn new(params: Vec<Param>, body: Expr) -> Self {
        Self {
            params,
            body: Box::new(body),
        }
    }

    /// Single-parameter lambda whose body is built from the parameter expression.
    pub fn with(name: &str, ty: Type, body: impl FnOnce(Expr) -> Expr) -> Self {
        let param = Param {
            name: name.to_string(),
            ty: ty.clone(),
        };
        let body = body(Expr::param(name, ty));
        Self::new(vec![param], body)
    }

    /// Type of the first parameter.
    pub fn param_type(&self) -> Option<&Type> {
        self.params.first().map(|p| &p.ty)
    }
}

impl From<Lambda> for Expr {
    fn from(lambda: Lambda) -> Self {
        Expr::Lambda(lambda)
    }
}

impl Expr {
    pub fn root(element: Type) -> Expr {
        Expr::Root { element }
    }

    /// Constant typed by its runtime value.
    pub fn constant(value: impl Into<Value>) -> Expr {
        let value = value.into();
        let ty = value.runtime_type();
        Expr::Constant { value, ty }
    }

    pub fn typed_constant(value: Value, ty: Type) -> Expr {
        Expr::Constant { value, ty }
    }

    pub fn null(ty: Type) -> Expr {
        Expr::Constant {
            value: Value::Null,
            ty,
        }
    }

    pub fn param(name: &str, ty: Type) -> Expr {
        Expr::Param {
            name: name.to_string(),
            ty,
        }
    }

    /// Access `name` on this expression; the owner is this expression's type.
    pub fn member(self, name: &str, ty: Type) -> Expr {
        Expr::Member {
            owner: self.ty(),
            target: Some(Box::new(self)),
            name: name.to_string(),
            ty,
        }
    }

    /// A value captured from an enclosing scope when the query was built.
    ///
    /// Produces `closure.name` where `closure` is a constant of a closure type
    /// holding the captured value.
    pub fn captured(closure: &str, name: &str, value: impl Into<Value>) -> Expr {
        let value = value.into();
        let ty = value.runtime_type();
        let container = Expr::Constant {
            value: Value::record(closure, [(name, value)]),
            ty: Type::closure(closure),
        };
        container.member(name, ty)
    }

    pub fn binary(self, op: BinaryOp, rhs: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(rhs),
        }
    }

    pub fn eq(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Eq, rhs)
    }

    pub fn ne(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Ne, rhs)
    }

    pub fn gt(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Gt, rhs)
    }

    pub fn ge(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Ge, rhs)
    }

    pub fn lt(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Lt, rhs)
    }

    pub fn le(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Le, rhs)
    }

    pub fn and(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::And, rhs)
    }

    pub fn or(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Or, rhs)
    }

    pub fn add(self, rhs: Expr) -> Expr {
        self.binary(BinaryOp::Add, rhs)
    }

    pub fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }

    pub fn convert(self, ty: Type) -> Expr {
        Expr::Convert {
            operand: Box::new(self),
            ty,
        }
    }

    pub fn conditional(test: Expr, if_true: Expr, if_false: Expr) -> Expr {
        Expr::Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    pub fn new_object(ty: Type, fields: Vec<(&str, Expr)>) -> Expr {
        Expr::New {
            ty,
            fields: fields
                .into_iter()
                .map(|(name, e)| (name.to_string(), e))
                .collect(),
        }
    }

    pub fn invoke(function: &str, args: Vec<Expr>, ty: Type) -> Expr {
        Expr::Invoke {
            function: function.to_string(),
            args,
            ty,
        }
    }

    /// Apply a sequence operator with this expression as the source.
    pub fn call(self, op: SeqOp, extra: Vec<Expr>) -> Expr {
        let ty = op.result_type(&self.ty(), &extra);
        let mut args = Vec::with_capacity(extra.len() + 1);
        args.push(self);
        args.extend(extra);
        Expr::Call { op, args, ty }
    }

    pub fn filter(self, predicate: Lambda) -> Expr {
        self.call(SeqOp::Where, vec![predicate.into()])
    }

    pub fn select(self, selector: Lambda) -> Expr {
        self.call(SeqOp::Select, vec![selector.into()])
    }

    pub fn order_by(self, key: Lambda) -> Expr {
        self.call(SeqOp::OrderBy, vec![key.into()])
    }

    pub fn order_by_desc(self, key: Lambda) -> Expr {
        self.call(SeqOp::OrderByDescending, vec![key.into()])
    }

    pub fn take(self, n: i64) -> Expr {
        self.call(SeqOp::Take, vec![Expr::constant(n)])
    }

    pub fn skip(self, n: i64) -> Expr {
        self.call(SeqOp::Skip, vec![Expr::constant(n)])
    }

    pub fn count(self) -> Expr {
        self.call(SeqOp::Count, vec![])
    }

    pub fn count_where(self, predicate: Lambda) -> Expr {
        self.call(SeqOp::Count, vec![predicate.into()])
    }

    pub fn any(self) -> Expr {
        self.call(SeqOp::Any, vec![])
    }

    pub fn any_where(self, predicate: Lambda) -> Expr {
        self.call(SeqOp::Any, vec![predicate.into()])
    }

    pub fn all(self, predicate: Lambda) -> Expr {
        self.call(SeqOp::All, vec![predicate.into()])
    }

    pub fn first(self) -> Expr {
        self.call(SeqOp::First, vec![])
    }

    pub fn first_where(self, predicate: Lambda) -> Expr {
        self.call(SeqOp::First, vec![predicate.into()])
    }

    pub fn first_or_default(self) -> Expr {
        self.call(SeqOp::FirstOrDefault, vec![])
    }

    pub fn single_where(self, predicate: Lambda) -> Expr {
        self.call(SeqOp::Single, vec![predicate.into()])
    }

    pub fn sum(self) -> Expr {
        self.call(SeqOp::Sum, vec![])
    }

    pub fn sum_by(self, selector: Lambda) -> Expr {
        self.call(SeqOp::Sum, vec![selector.into()])
    }

    pub fn max_by(self, selector: Lambda) -> Expr {
        self.call(SeqOp::Max, vec![selector.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_types() {
        let dto = Type::entity("EmployeeDto");
        let root = Expr::root(dto.clone());
        assert_eq!(root.clone().count().ty(), Type::int());
        assert_eq!(root.clone().first().ty(), dto);
        assert_eq!(root.clone().take(2).ty(), Type::query(dto.clone()));

        let names = root.select(Lambda::with("d", dto, |d| d.member("Name", Type::string())));
        assert_eq!(names.ty(), Type::query(Type::string()));
    }

    #[test]
    fn test_captured_value() {
        let e = Expr::captured("Closure0", "threshold", 18);
        match &e {
            Expr::Member { owner, name, ty, .. } => {
                assert!(owner.is_closure());
                assert_eq!(name, "threshold");
                assert_eq!(ty, &Type::int());
            }
            other => panic!("expected member, got {other:?}"),
        }
    }

    #[test]
    fn test_display_pipeline() {
        let dto = Type::entity("EmployeeDto");
        let q = Expr::root(dto.clone())
            .filter(Lambda::with("d", dto.clone(), |d| {
                d.member("Age", Type::int()).gt(Expr::constant(18))
            }))
            .select(Lambda::with("d", dto, |d| d.member("Name", Type::string())));
        assert_eq!(
            q.to_string(),
            "Root(EmployeeDto).Where(d => (d.Age > 18)).Select(d => d.Name)"
        );
    }
}
