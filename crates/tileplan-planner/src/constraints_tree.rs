//! Interpreter for the plan-constraints option tree: a nested key -> value map, walked to emit
//! equality constraints into a [`tileplan_solver::Model`].

use tileplan_core::prelude::{ConstraintValue, PlanConstraints};
use tileplan_solver::{Model, Value, Variable};

/// Walks `tree` following `path`, returning the leaf value if every
/// intermediate key resolves to a nested map and the final key exists.
pub fn lookup<'a>(tree: &'a PlanConstraints, path: &[&str]) -> Option<&'a ConstraintValue> {
    let (last, prefix) = path.split_last()?;
    let mut node = tree;
    for key in prefix {
        node = node.get(*key)?.as_map()?;
    }
    node.get(*last)
}

pub fn lookup_int(tree: &PlanConstraints, path: &[&str]) -> Option<i64> {
    lookup(tree, path)?.as_int()
}

pub fn lookup_bool(tree: &PlanConstraints, path: &[&str]) -> Option<bool> {
    lookup(tree, path)?.as_bool()
}

pub fn lookup_str<'a>(tree: &'a PlanConstraints, path: &[&str]) -> Option<&'a str> {
    lookup(tree, path)?.as_str()
}

/// If `path` resolves to an integer in `tree`, pins `var` to that value in
/// `model` and returns `true`. A negative or non-integer value is a
/// configuration error the caller should surface via
/// `tileplan_core::Error::Config`; this function only
/// reports whether a constraint was found, leaving range validation to the
/// caller since the valid range differs per variable.
pub fn apply_int_constraint(
    model: &mut Model,
    tree: &PlanConstraints,
    path: &[&str],
    var: Variable,
) -> Option<i64> {
    let value = lookup_int(tree, path)?;
    if value >= 0 {
        model.equal_to(var, Value(value as u64), path.join("."));
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn nested_tree() -> PlanConstraints {
        let mut inner = BTreeMap::new();
        inner.insert("field".to_string(), ConstraintValue::Int(4));
        let mut outer = BTreeMap::new();
        outer.insert("partition".to_string(), ConstraintValue::Map(inner));
        outer
    }

    #[test]
    fn lookup_walks_nested_maps() {
        let tree = nested_tree();
        assert_eq!(lookup_int(&tree, &["partition", "field"]), Some(4));
        assert_eq!(lookup_int(&tree, &["partition", "missing"]), None);
        assert_eq!(lookup_int(&tree, &["missing", "field"]), None);
    }
}
