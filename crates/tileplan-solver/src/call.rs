use std::collections::HashMap;
use std::sync::Mutex;

use crate::constraint::CallFn;
use crate::value::Value;
use crate::variable::Variable;

/// Memoises [`crate::ConstraintKind::Call`] evaluations by the tuple of
/// argument variables and their fixed values. A `Scheduler` exploring many
/// branches that disagree only on unrelated variables will re-fix the same
/// handful of argument combinations over and over; this cache means an
/// estimator function -- typically the expensive part of evaluating a
/// branch -- runs once per distinct combination rather than once per node.
#[derive(Default)]
pub struct Memo {
    table: Mutex<HashMap<(Vec<Variable>, Vec<Value>), Option<Value>>>,
}

impl Memo {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn get_or_compute(&self, args: &[Variable], values: &[Value], f: &CallFn) -> Option<Value> {
        let key = (args.to_vec(), values.to_vec());
        if let Some(cached) = self.table.lock().expect("memo lock poisoned").get(&key) {
            return *cached;
        }
        let computed = f(values);
        self.table
            .lock()
            .expect("memo lock poisoned")
            .insert(key, computed);
        computed
    }

    pub fn len(&self) -> usize {
        self.table.lock().expect("memo lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn repeated_calls_with_same_args_hit_the_cache() {
        let memo = Memo::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let f: CallFn = Arc::new(move |args: &[Value]| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Some(args[0])
        });
        let args = [Variable(0)];
        let values = [Value(7)];
        for _ in 0..5 {
            memo.get_or_compute(&args, &values, &f);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
