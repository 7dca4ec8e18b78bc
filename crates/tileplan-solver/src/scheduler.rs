use std::cmp::Ordering;

use crate::constraint::propagate_domains;
use crate::domain::Domain;
use crate::model::{Infeasible, Model};
use crate::solution::Solution;
use crate::value::Value;
use crate::variable::Variable;

/// Branch-and-bound search over a [`Model`]'s variables.
///
/// Finds the assignment that is feasible under every constraint and
/// lexicographically minimal over a caller-supplied tuple of objective
/// variables. Variable choice is most-constrained-first (smallest
/// remaining domain); values are tried in ascending order. Every branch
/// propagates to a fixpoint before recursing, so most of the search tree is
/// pruned by domain narrowing rather than enumerated.
pub struct Scheduler<'a> {
    model: &'a mut Model,
}

struct Search<'a> {
    constraints: &'a [crate::constraint::ConstraintKind],
    memo: &'a crate::call::Memo,
    objectives: &'a [Variable],
    best: Option<(Vec<Value>, Vec<Domain>)>,
}

impl<'a> Scheduler<'a> {
    pub fn new(model: &'a mut Model) -> Self {
        Self { model }
    }

    /// Finds the feasible assignment minimising `objectives` in
    /// lexicographic order. Returns [`Infeasible`] if no assignment
    /// satisfies every constraint.
    pub fn minimize(&mut self, objectives: &[Variable]) -> Result<Solution, Infeasible> {
        let mut domains: Vec<Domain> = self.model.domains().to_vec();
        if !propagate_domains(self.model.constraints(), &mut domains, self.model.memo()) {
            return Err(Infeasible);
        }

        let mut search = Search {
            constraints: self.model.constraints(),
            memo: self.model.memo(),
            objectives,
            best: None,
        };
        search.branch(domains);

        match search.best {
            Some((values, _)) => Ok(Solution::new(values)),
            None => Err(Infeasible),
        }
    }
}

impl<'a> Search<'a> {
    fn objective_tuple(&self, domains: &[Domain]) -> Vec<Value> {
        self.objectives.iter().map(|v| domains[v.index()].min()).collect()
    }

    /// `true` if the partial objective lower bound at `domains` can still
    /// beat the best complete solution found so far, i.e. this branch is
    /// worth exploring further.
    fn still_promising(&self, domains: &[Domain]) -> bool {
        let Some((best_values, _)) = &self.best else {
            return true;
        };
        let partial = self.objective_tuple(domains);
        for (p, b) in partial.iter().zip(best_values.iter()) {
            match p.cmp(b) {
                Ordering::Less => return true,
                Ordering::Greater => return false,
                Ordering::Equal => continue,
            }
        }
        true
    }

    fn consider_complete(&mut self, domains: &[Domain]) {
        let values: Vec<Value> = domains.iter().map(|d| d.min()).collect();
        let objective = self.objective_tuple(domains);
        let better = match &self.best {
            None => true,
            Some((best_values, _)) => {
                let mut ord = Ordering::Equal;
                for (a, b) in objective.iter().zip(best_values.iter()) {
                    ord = a.cmp(b);
                    if ord != Ordering::Equal {
                        break;
                    }
                }
                ord == Ordering::Less
            }
        };
        if better {
            self.best = Some((values, domains.to_vec()));
        }
    }

    /// Picks the unfixed variable with the smallest remaining domain,
    /// ties broken by declaration order.
    fn select_branch_variable(domains: &[Domain]) -> Option<Variable> {
        domains
            .iter()
            .enumerate()
            .filter(|(_, d)| !d.is_fixed())
            .min_by_key(|(_, d)| d.size())
            .map(|(i, _)| Variable(i))
    }

    fn branch(&mut self, domains: Vec<Domain>) {
        if !self.still_promising(&domains) {
            return;
        }
        match Self::select_branch_variable(&domains) {
            None => self.consider_complete(&domains),
            Some(var) => {
                let d = domains[var.index()];
                for raw in d.min().get()..=d.max().get() {
                    let mut next = domains.clone();
                    next[var.index()] = Domain::fixed(Value(raw));
                    if propagate_domains(self.constraints, &mut next, self.memo) {
                        self.branch(next);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;

    #[test]
    fn finds_minimal_product_under_bound() {
        let mut m = Model::new();
        let a = m.add_variable(Value(1), Value(6), "a");
        let b = m.add_variable(Value(1), Value(6), "b");
        let p = m.product(&[a, b], "p");
        let bound = m.add_constant(Value(12), "bound");
        m.less_or_equal(p, bound);

        let cost = m.sum(&[a, b], "cost");
        let mut scheduler = Scheduler::new(&mut m);
        let solution = scheduler.minimize(&[cost]).unwrap();
        assert_eq!(solution.get(cost).get(), 2);
        assert_eq!(solution.get(a).get(), 1);
        assert_eq!(solution.get(b).get(), 1);
    }

    #[test]
    fn reports_infeasible_when_no_assignment_satisfies_constraints() {
        let mut m = Model::new();
        let a = m.add_variable(Value(1), Value(3), "a");
        let b = m.add_constant(Value(10), "b");
        m.equal(a, b);
        let mut scheduler = Scheduler::new(&mut m);
        assert!(scheduler.minimize(&[a]).is_err());
    }

    #[test]
    fn respects_factor_of_constraint() {
        let mut m = Model::new();
        let total = m.add_constant(Value(12), "total");
        let split = m.add_variable(Value(1), Value(12), "split");
        m.factor_of(total, split);
        let mut scheduler = Scheduler::new(&mut m);
        let solution = scheduler.minimize(&[split]).unwrap();
        assert_eq!(12 % solution.get(split).get(), 0);
    }
}
