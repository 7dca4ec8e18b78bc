use std::sync::Arc;

use crate::call::Memo;
use crate::constraint::{propagate_domains, CallFn, ConstraintKind};
use crate::domain::Domain;
use crate::value::Value;
use crate::variable::Variable;

/// Raised when a model's domains narrow to the point that some variable
/// has no remaining feasible value -- the branch being explored (or, if
/// raised outside a search, the model itself) admits no solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no value satisfies every constraint")]
pub struct Infeasible;

/// A mixed-integer constraint model: a set of [`Variable`]s with bounded
/// domains, and a set of [`ConstraintKind`]s relating them. Variables and
/// constraints are appended as a planner family builds up its plan-shape
/// search space; nothing is solved until a [`crate::Scheduler`] is run
/// over the finished model.
pub struct Model {
    domains: Vec<Domain>,
    names: Vec<String>,
    constraints: Vec<ConstraintKind>,
    memo: Memo,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        Self {
            domains: Vec::new(),
            names: Vec::new(),
            constraints: Vec::new(),
            memo: Memo::new(),
        }
    }

    pub fn add_variable(&mut self, min: Value, max: Value, name: impl Into<String>) -> Variable {
        self.domains.push(Domain::new(min, max));
        self.names.push(name.into());
        Variable(self.domains.len() - 1)
    }

    pub fn add_constant(&mut self, value: Value, name: impl Into<String>) -> Variable {
        self.domains.push(Domain::fixed(value));
        self.names.push(name.into());
        Variable(self.domains.len() - 1)
    }

    pub fn zero(&mut self) -> Variable {
        self.add_constant(Value::ZERO, "0")
    }

    pub fn one(&mut self) -> Variable {
        self.add_constant(Value::ONE, "1")
    }

    pub fn domain(&self, v: Variable) -> Domain {
        self.domains[v.index()]
    }

    pub fn name(&self, v: Variable) -> &str {
        &self.names[v.index()]
    }

    pub fn num_variables(&self) -> usize {
        self.domains.len()
    }

    pub(crate) fn constraints(&self) -> &[ConstraintKind] {
        &self.constraints
    }

    pub(crate) fn memo(&self) -> &Memo {
        &self.memo
    }

    fn derive(&mut self, max: Value, name: impl Into<String>, build: impl FnOnce(Variable) -> ConstraintKind) -> Variable {
        let result = self.add_variable(Value::ZERO, max, name);
        self.constraints.push(build(result));
        result
    }

    pub fn equal(&mut self, a: Variable, b: Variable) {
        self.constraints.push(ConstraintKind::Equal(a, b));
    }

    pub fn equal_to(&mut self, a: Variable, value: Value, name: impl Into<String>) {
        let c = self.add_constant(value, name);
        self.equal(a, c);
    }

    pub fn less_or_equal(&mut self, a: Variable, b: Variable) {
        self.constraints.push(ConstraintKind::LessOrEqual(a, b));
    }

    pub fn less(&mut self, a: Variable, b: Variable) {
        self.constraints.push(ConstraintKind::Less(a, b));
    }

    pub fn factor_of(&mut self, left: Variable, right: Variable) {
        self.constraints.push(ConstraintKind::FactorOf(left, right));
    }

    pub fn product(&mut self, terms: &[Variable], name: impl Into<String>) -> Variable {
        let max = terms
            .iter()
            .fold(Value::ONE, |acc, t| acc.saturating_mul(self.domain(*t).max()));
        let terms = terms.to_vec();
        self.derive(max, name, |r| ConstraintKind::Product(r, terms))
    }

    pub fn sum(&mut self, terms: &[Variable], name: impl Into<String>) -> Variable {
        let max = terms
            .iter()
            .fold(Value::ZERO, |acc, t| acc.saturating_add(self.domain(*t).max()));
        let terms = terms.to_vec();
        self.derive(max, name, |r| ConstraintKind::Sum(r, terms))
    }

    pub fn max(&mut self, terms: &[Variable], name: impl Into<String>) -> Variable {
        let max = terms.iter().map(|t| self.domain(*t).max()).max().unwrap_or(Value::ZERO);
        let terms = terms.to_vec();
        self.derive(max, name, |r| ConstraintKind::Max(r, terms))
    }

    pub fn min(&mut self, terms: &[Variable], name: impl Into<String>) -> Variable {
        let max = terms.iter().map(|t| self.domain(*t).max()).min().unwrap_or(Value::ZERO);
        let terms = terms.to_vec();
        self.derive(max, name, |r| ConstraintKind::Min(r, terms))
    }

    pub fn floordiv(&mut self, a: Variable, b: Variable, name: impl Into<String>) -> Variable {
        let max = self.domain(a).max();
        self.derive(max, name, |r| ConstraintKind::FloorDiv(r, a, b))
    }

    pub fn ceildiv(&mut self, a: Variable, b: Variable, name: impl Into<String>) -> Variable {
        let max = self.domain(a).max();
        self.derive(max, name, |r| ConstraintKind::CeilDiv(r, a, b))
    }

    pub fn modulo(&mut self, a: Variable, b: Variable, name: impl Into<String>) -> Variable {
        let max = Value(self.domain(b).max().get().saturating_sub(1));
        self.derive(max, name, |r| ConstraintKind::Mod(r, a, b))
    }

    pub fn sub(&mut self, a: Variable, b: Variable, name: impl Into<String>) -> Variable {
        let max = self.domain(a).max();
        self.derive(max, name, |r| ConstraintKind::Sub(r, a, b))
    }

    /// Attaches an expensive callback -- typically a `tileplan-estimators`
    /// cost function -- to a handful of already-constrained plan-shape
    /// variables. `max` bounds the callback's possible return value so the
    /// result variable has a finite domain before the callback has run
    /// even once.
    pub fn call(
        &mut self,
        args: &[Variable],
        max: Value,
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> Option<Value> + Send + Sync + 'static,
    ) -> Variable {
        let f: CallFn = Arc::new(f);
        let args = args.to_vec();
        self.derive(max, name, |r| ConstraintKind::Call(r, args, f))
    }

    /// Narrows every domain against every constraint until none of them
    /// can narrow further, or one empties out.
    pub fn propagate_to_fixpoint(&mut self) -> Result<(), Infeasible> {
        if propagate_domains(&self.constraints, &mut self.domains, &self.memo) {
            Ok(())
        } else {
            Err(Infeasible)
        }
    }

    pub(crate) fn domains_mut(&mut self) -> &mut [Domain] {
        &mut self.domains
    }

    pub(crate) fn domains(&self) -> &[Domain] {
        &self.domains
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_and_product_compose() {
        let mut m = Model::new();
        let a = m.add_variable(Value(1), Value(3), "a");
        let b = m.add_variable(Value(2), Value(4), "b");
        let s = m.sum(&[a, b], "s");
        let p = m.product(&[a, b], "p");
        m.propagate_to_fixpoint().unwrap();
        assert_eq!(m.domain(s).min(), Value(3));
        assert_eq!(m.domain(s).max(), Value(7));
        assert_eq!(m.domain(p).min(), Value(2));
        assert_eq!(m.domain(p).max(), Value(12));
    }

    #[test]
    fn equal_to_constant_fixes_the_variable() {
        let mut m = Model::new();
        let a = m.add_variable(Value(0), Value(100), "a");
        m.equal_to(a, Value(42), "forty_two");
        m.propagate_to_fixpoint().unwrap();
        assert_eq!(m.domain(a), Domain::fixed(Value(42)));
    }

    #[test]
    fn empty_domain_after_propagation_is_infeasible() {
        let mut m = Model::new();
        let a = m.add_variable(Value(0), Value(5), "a");
        let b = m.add_constant(Value(10), "b");
        m.equal(a, b);
        assert!(m.propagate_to_fixpoint().is_err());
    }
}
