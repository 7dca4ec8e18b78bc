use crate::value::Value;
use crate::variable::Variable;

/// A complete, constraint-satisfying assignment of values to every
/// [`Variable`] in a [`crate::Model`], as found by [`crate::Scheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    values: Vec<Value>,
}

impl Solution {
    pub(crate) fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, v: Variable) -> Value {
        self.values[v.index()]
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}
