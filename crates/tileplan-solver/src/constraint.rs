use std::sync::Arc;

use crate::call::Memo;
use crate::domain::Domain;
use crate::value::Value;
use crate::variable::Variable;

/// A closure invoked once per distinct argument tuple while narrowing a
/// [`ConstraintKind::Call`] constraint. Returns `None` when the arguments
/// describe an infeasible candidate.
pub type CallFn = Arc<dyn Fn(&[Value]) -> Option<Value> + Send + Sync>;

/// The closed set of relations this solver understands. Every planner
/// family is built entirely out of these; there is no general-purpose
/// escape hatch beyond [`ConstraintKind::Call`], which exists specifically
/// to hang an estimator function off a small number of plan-shape
/// variables without hand-deriving its monotonicity.
#[derive(Clone)]
pub enum ConstraintKind {
    Equal(Variable, Variable),
    LessOrEqual(Variable, Variable),
    Less(Variable, Variable),
    /// `left` is an integer multiple of `right`, i.e. `right` divides `left`.
    FactorOf(Variable, Variable),
    /// `result == product(of terms)`.
    Product(Variable, Vec<Variable>),
    /// `result == sum(of terms)`.
    Sum(Variable, Vec<Variable>),
    Max(Variable, Vec<Variable>),
    Min(Variable, Vec<Variable>),
    /// `result == floor(left / right)`.
    FloorDiv(Variable, Variable, Variable),
    /// `result == ceil(left / right)`.
    CeilDiv(Variable, Variable, Variable),
    /// `result == left % right`.
    Mod(Variable, Variable, Variable),
    /// `result == left - right` (requires `left >= right`).
    Sub(Variable, Variable, Variable),
    /// `result == f(args)`, memoised per distinct `args` tuple.
    Call(Variable, Vec<Variable>, CallFn),
}

/// Outcome of narrowing one constraint against the current domains.
pub(crate) enum Propagation {
    /// No domain changed.
    NoChange,
    /// At least one domain was narrowed; propagation should run again
    /// until a fixpoint, since a narrower domain here may feed another
    /// constraint's deduction.
    Changed,
    /// A domain became empty; the branch this happened on is infeasible.
    Infeasible,
}

impl ConstraintKind {
    pub(crate) fn variables(&self) -> Vec<Variable> {
        match self {
            ConstraintKind::Equal(a, b)
            | ConstraintKind::LessOrEqual(a, b)
            | ConstraintKind::Less(a, b)
            | ConstraintKind::FactorOf(a, b) => vec![*a, *b],
            ConstraintKind::Product(r, terms)
            | ConstraintKind::Sum(r, terms)
            | ConstraintKind::Max(r, terms)
            | ConstraintKind::Min(r, terms) => {
                let mut v = vec![*r];
                v.extend(terms.iter().copied());
                v
            }
            ConstraintKind::FloorDiv(r, a, b)
            | ConstraintKind::CeilDiv(r, a, b)
            | ConstraintKind::Mod(r, a, b)
            | ConstraintKind::Sub(r, a, b) => vec![*r, *a, *b],
            ConstraintKind::Call(r, args, _) => {
                let mut v = vec![*r];
                v.extend(args.iter().copied());
                v
            }
        }
    }

    /// Narrows `domains` to satisfy this constraint, given the current
    /// bounds of every other variable. Bounds (interval) propagation only:
    /// this never enumerates a domain's values, so it is linear in the
    /// number of terms rather than in domain size.
    pub(crate) fn propagate(&self, domains: &mut [Domain], memo: &Memo) -> Propagation {
        match self {
            ConstraintKind::Equal(a, b) => {
                let lo = domains[a.index()].min().max(domains[b.index()].min());
                let hi = domains[a.index()].max().min(domains[b.index()].max());
                narrow_pair(domains, *a, *b, lo, hi)
            }
            ConstraintKind::LessOrEqual(a, b) => {
                let a_min = domains[a.index()].min();
                let b_max = domains[b.index()].max();
                let mut changed = false;
                changed |= domains[a.index()].narrow_max(b_max);
                changed |= domains[b.index()].narrow_min(a_min);
                result(domains, *a, *b, changed)
            }
            ConstraintKind::Less(a, b) => {
                let mut changed = false;
                let b_max = domains[b.index()].max();
                if b_max.get() > 0 {
                    changed |= domains[a.index()].narrow_max(Value(b_max.get() - 1));
                }
                let a_min = domains[a.index()].min();
                changed |= domains[b.index()].narrow_min(Value(a_min.get() + 1));
                result(domains, *a, *b, changed)
            }
            ConstraintKind::FactorOf(left, right) => {
                // right must divide left; we cannot narrow bounds further
                // than requiring right <= left, so defer the actual
                // divisibility check to `is_consistent`.
                let mut changed = false;
                let left_max = domains[left.index()].max();
                changed |= domains[right.index()].narrow_max(left_max);
                result(domains, *left, *right, changed)
            }
            ConstraintKind::Product(r, terms) => propagate_product(domains, *r, terms),
            ConstraintKind::Sum(r, terms) => propagate_sum(domains, *r, terms),
            ConstraintKind::Max(r, terms) => propagate_extreme(domains, *r, terms, true),
            ConstraintKind::Min(r, terms) => propagate_extreme(domains, *r, terms, false),
            ConstraintKind::FloorDiv(r, a, b) => propagate_div(domains, *r, *a, *b, false),
            ConstraintKind::CeilDiv(r, a, b) => propagate_div(domains, *r, *a, *b, true),
            ConstraintKind::Mod(r, a, b) => {
                let b_max = domains[b.index()].max();
                let changed = domains[r.index()].narrow_to(Value::ZERO, Value(b_max.get().saturating_sub(1)));
                result_single(domains, *r, changed)
            }
            ConstraintKind::Sub(r, a, b) => {
                let a_min = domains[a.index()].min();
                let a_max = domains[a.index()].max();
                let b_min = domains[b.index()].min();
                let b_max = domains[b.index()].max();
                let lo = a_min.get().saturating_sub(b_max.get());
                let hi = a_max.get().saturating_sub(b_min.get());
                let changed = domains[r.index()].narrow_to(Value(lo), Value(hi));
                result_single(domains, *r, changed)
            }
            ConstraintKind::Call(r, args, f) => propagate_call(domains, *r, args, f, memo),
        }
    }

    /// Once every argument domain is fixed, checks that the constraint
    /// actually holds (divisibility and `Call` feasibility cannot be
    /// fully captured by interval narrowing alone).
    pub(crate) fn is_consistent(&self, domains: &[Domain], memo: &Memo) -> bool {
        match self {
            ConstraintKind::FactorOf(left, right) => {
                let l = domains[left.index()].min().get();
                let r = domains[right.index()].min().get();
                r > 0 && l % r == 0
            }
            ConstraintKind::Call(r, args, f) => {
                let arg_values: Vec<Value> = args.iter().map(|a| domains[a.index()].min()).collect();
                match memo.get_or_compute(args, &arg_values, f) {
                    Some(v) => v == domains[r.index()].min(),
                    None => false,
                }
            }
            _ => true,
        }
    }
}

fn narrow_pair(domains: &mut [Domain], a: Variable, b: Variable, lo: Value, hi: Value) -> Propagation {
    let mut changed = false;
    changed |= domains[a.index()].narrow_to(lo, hi);
    changed |= domains[b.index()].narrow_to(lo, hi);
    result(domains, a, b, changed)
}

fn result(domains: &[Domain], a: Variable, b: Variable, changed: bool) -> Propagation {
    if domains[a.index()].is_empty() || domains[b.index()].is_empty() {
        Propagation::Infeasible
    } else if changed {
        Propagation::Changed
    } else {
        Propagation::NoChange
    }
}

fn result_single(domains: &[Domain], v: Variable, changed: bool) -> Propagation {
    if domains[v.index()].is_empty() {
        Propagation::Infeasible
    } else if changed {
        Propagation::Changed
    } else {
        Propagation::NoChange
    }
}

fn propagate_product(domains: &mut [Domain], r: Variable, terms: &[Variable]) -> Propagation {
    let mut lo = Value::ONE;
    let mut hi = Value::ONE;
    for t in terms {
        lo = lo.saturating_mul(domains[t.index()].min());
        hi = hi.saturating_mul(domains[t.index()].max());
    }
    let changed = domains[r.index()].narrow_to(lo, hi);
    result_single(domains, r, changed)
}

fn propagate_sum(domains: &mut [Domain], r: Variable, terms: &[Variable]) -> Propagation {
    let mut lo = Value::ZERO;
    let mut hi = Value::ZERO;
    for t in terms {
        lo = lo.saturating_add(domains[t.index()].min());
        hi = hi.saturating_add(domains[t.index()].max());
    }
    let changed = domains[r.index()].narrow_to(lo, hi);
    result_single(domains, r, changed)
}

fn propagate_extreme(domains: &mut [Domain], r: Variable, terms: &[Variable], is_max: bool) -> Propagation {
    let mut lo = domains[terms[0].index()].min();
    let mut hi = domains[terms[0].index()].max();
    for t in &terms[1..] {
        let d = domains[t.index()];
        if is_max {
            lo = lo.max(d.min());
            hi = hi.max(d.max());
        } else {
            lo = lo.min(d.min());
            hi = hi.min(d.max());
        }
    }
    let changed = domains[r.index()].narrow_to(lo, hi);
    result_single(domains, r, changed)
}

fn propagate_div(domains: &mut [Domain], r: Variable, a: Variable, b: Variable, ceil: bool) -> Propagation {
    let a_min = domains[a.index()].min();
    let a_max = domains[a.index()].max();
    let b_min = domains[b.index()].min().get().max(1);
    let b_max = domains[b.index()].max().get().max(1);
    let (lo, hi) = if ceil {
        (a_min.ceildiv(Value(b_max)), a_max.ceildiv(Value(b_min)))
    } else {
        (a_min.floordiv(Value(b_max)), a_max.floordiv(Value(b_min)))
    };
    let changed = domains[r.index()].narrow_to(lo, hi);
    result_single(domains, r, changed)
}

/// Runs every constraint's [`ConstraintKind::propagate`] to a fixpoint, then
/// checks the constraints whose full consistency cannot be captured by
/// interval narrowing alone (`FactorOf`, `Call`) once their arguments have
/// settled. Returns `false` as soon as any domain empties or a settled
/// constraint turns out not to hold.
pub(crate) fn propagate_domains(constraints: &[ConstraintKind], domains: &mut [Domain], memo: &Memo) -> bool {
    loop {
        let mut changed_any = false;
        for c in constraints {
            match c.propagate(domains, memo) {
                Propagation::Infeasible => return false,
                Propagation::Changed => changed_any = true,
                Propagation::NoChange => {}
            }
        }
        if !changed_any {
            break;
        }
    }
    for c in constraints {
        let vars = c.variables();
        if vars.iter().all(|v| domains[v.index()].is_fixed()) && !c.is_consistent(domains, memo) {
            return false;
        }
    }
    true
}

fn propagate_call(domains: &mut [Domain], r: Variable, args: &[Variable], f: &CallFn, memo: &Memo) -> Propagation {
    // A `Call` constraint is only evaluated once every argument is fixed:
    // the estimator functions it wraps are not generally monotone in
    // their inputs, so there is no sound interval narrowing to do before
    // then.
    if args.iter().any(|a| !domains[a.index()].is_fixed()) {
        return Propagation::NoChange;
    }
    let arg_values: Vec<Value> = args.iter().map(|a| domains[a.index()].min()).collect();
    match memo.get_or_compute(args, &arg_values, f) {
        Some(v) => {
            let changed = domains[r.index()].narrow_to(v, v);
            result_single(domains, r, changed)
        }
        None => Propagation::Infeasible,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;

    #[test]
    fn product_bounds_narrow_result() {
        let mut m = Model::new();
        let a = m.add_variable(Value(2), Value(4), "a");
        let b = m.add_variable(Value(3), Value(5), "b");
        let r = m.product(&[a, b], "r");
        m.propagate_to_fixpoint().unwrap();
        let d = m.domain(r);
        assert_eq!(d.min(), Value(6));
        assert_eq!(d.max(), Value(20));
    }

    #[test]
    fn factor_of_rejects_non_divisor_assignment() {
        let left = Variable(0);
        let right = Variable(1);
        let kind = ConstraintKind::FactorOf(left, right);
        let memo = Memo::new();
        // 3 does not divide 10.
        let domains = [Domain::fixed(Value(10)), Domain::fixed(Value(3))];
        assert!(!kind.is_consistent(&domains, &memo));
        // 5 does divide 10.
        let domains = [Domain::fixed(Value(10)), Domain::fixed(Value(5))];
        assert!(kind.is_consistent(&domains, &memo));
    }
}
