//! Captured-value substitution.
//!
//! Members read off a closure container are values fixed when the query was
//! built. When the parameter bag names them, the bag value wins.

use super::Parameters;
use crate::ast::{Expr, Type, Value};
use crate::error::MapResult;
use crate::visit::rewrite_bottom_up;

/// Prefix some front ends add to hoisted local names.
pub const ALTERNATE_CAPTURE_PREFIX: &str = "$local_";

/// Replace captured members named in `parameters` with typed constants.
pub fn substitute_captures(expr: Expr, parameters: &Parameters) -> MapResult<Expr> {
    rewrite_bottom_up(expr, &mut |node| match node {
        Expr::Member {
            ref name,
            owner: Type::Closure(_),
            ref ty,
            ..
        } => match lookup(parameters, name) {
            Some(value) => Ok(Expr::typed_constant(value.coerce_to(ty)?, ty.clone())),
            None => Ok(node),
        },
        other => Ok(other),
    })
}

fn lookup<'p>(parameters: &'p Parameters, name: &str) -> Option<&'p Value> {
    parameters.get(name).or_else(|| {
        name.strip_prefix(ALTERNATE_CAPTURE_PREFIX)
            .and_then(|stripped| parameters.get(stripped))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Lambda;
    use crate::error::MapError;

    fn threshold_query(name: &str) -> Expr {
        let ty = Type::entity("Employee");
        Expr::root(ty.clone()).filter(Lambda::with("e", ty, |e| {
            e.member("Age", Type::int())
                .gt(Expr::captured("Closure0", name, 18))
        }))
    }

    #[test]
    fn test_bag_value_replaces_capture() {
        let bag = Parameters::from([("threshold".to_string(), Value::Int(25))]);
        let out = substitute_captures(threshold_query("threshold"), &bag).unwrap();
        assert_eq!(out.to_string(), "Root(Employee).Where(e => (e.Age > 25))");
    }

    #[test]
    fn test_prefixed_name_is_retried() {
        let bag = Parameters::from([("threshold".to_string(), Value::Int(30))]);
        let out = substitute_captures(threshold_query("$local_threshold"), &bag).unwrap();
        assert_eq!(out.to_string(), "Root(Employee).Where(e => (e.Age > 30))");
    }

    #[test]
    fn test_unknown_capture_is_left_alone() {
        let bag = Parameters::from([("other".to_string(), Value::Int(1))]);
        let query = threshold_query("threshold");
        assert_eq!(substitute_captures(query.clone(), &bag).unwrap(), query);
    }

    #[test]
    fn test_value_is_converted_to_member_type() {
        let bag = Parameters::from([("threshold".to_string(), Value::from("21"))]);
        let out = substitute_captures(threshold_query("threshold"), &bag).unwrap();
        assert!(out.to_string().contains("(e.Age > 21)"));

        let bag = Parameters::from([("threshold".to_string(), Value::from("old"))]);
        assert!(matches!(
            substitute_captures(threshold_query("threshold"), &bag),
            Err(MapError::Conversion { .. })
        ));
    }

    #[test]
    fn test_regular_members_are_not_candidates() {
        let ty = Type::entity("Employee");
        let query = Expr::param("e", ty).member("threshold", Type::int());
        let bag = Parameters::from([("threshold".to_string(), Value::Int(5))]);
        assert_eq!(substitute_captures(query.clone(), &bag).unwrap(), query);
    }
}
