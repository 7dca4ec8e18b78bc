//! Thread-safe plan cache: memoises finished convolution plans keyed by
//! canonical parameters, options, an optional reference plan/cost, the
//! minimise-for-tiles flag, an optional cycle limit, and a starting-tile
//! offset for virtual hierarchies.
//!
//! A single mutex guards inserts; a lookup that only reads takes the same
//! mutex briefly rather than maintaining a separate lock-free snapshot --
//! the cost of a plan search dwarfs a short-lived lock acquisition by
//! several orders of magnitude, so there is no throughput reason to reach
//! for anything fancier than `Mutex<HashMap<..>>`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tileplan_core::hash::{hash_serde, Hash256};
use tileplan_core::prelude::{ConvOptions, ConvParams, ConvPlan, Cost};
use tileplan_core::target::TargetDescriptor;
use tileplan_core::Result;

/// The fields that distinguish two cache entries for what is otherwise
/// the same operator. `reference_cost` and `reference_objective_tag` are
/// `Some` only for a sub-plan of a multi-plan composition, where the cost
/// bound fed to one operator's search depends on an earlier operator's
/// chosen plan.
#[derive(serde::Serialize)]
struct CacheKey<'a> {
    params: &'a ConvParams,
    target: &'a TargetDescriptor,
    options: &'a ConvOptions,
    reference_cost: Option<Cost>,
    starting_tile_offset: u64,
}

/// Thread-safe memoisation of finished `(ConvPlan, Cost)` results.
///
/// Cloning a `PlanCache` shares the same underlying map (it wraps an
/// `Arc`), so a caller can hand copies to worker threads in the multi-plan
/// composer's parallel-for without any of them racing on first use: a
/// losing writer simply overwrites its own insert with an equal value,
/// which is safe because planning is a pure function of the key.
#[derive(Clone, Default)]
pub struct PlanCache {
    entries: Arc<Mutex<HashMap<Hash256, (ConvPlan, Cost)>>>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(
        params: &ConvParams,
        target: &TargetDescriptor,
        options: &ConvOptions,
        reference_cost: Option<Cost>,
        starting_tile_offset: u64,
    ) -> Result<Hash256> {
        hash_serde(&CacheKey {
            params,
            target,
            options,
            reference_cost,
            starting_tile_offset,
        })
    }

    /// Returns a cached plan if one exists for this exact key, without
    /// invoking the planner.
    pub fn get(
        &self,
        params: &ConvParams,
        target: &TargetDescriptor,
        options: &ConvOptions,
        reference_cost: Option<Cost>,
        starting_tile_offset: u64,
    ) -> Result<Option<(ConvPlan, Cost)>> {
        let key = Self::key(params, target, options, reference_cost, starting_tile_offset)?;
        Ok(self.entries.lock().unwrap().get(&key).cloned())
    }

    /// Returns the cached plan for this key, or calls `plan` to produce
    /// one and inserts it. Concurrent callers that race on the same key
    /// each run `plan` and the last insert wins; both results are
    /// required to be equal since planning is a pure function of the key,
    /// so this is observationally indistinguishable from serialising the
    /// two calls.
    pub fn get_or_insert_with(
        &self,
        params: &ConvParams,
        target: &TargetDescriptor,
        options: &ConvOptions,
        reference_cost: Option<Cost>,
        starting_tile_offset: u64,
        plan: impl FnOnce() -> Result<(ConvPlan, Cost)>,
    ) -> Result<(ConvPlan, Cost)> {
        let key = Self::key(params, target, options, reference_cost, starting_tile_offset)?;
        if let Some(hit) = self.entries.lock().unwrap().get(&key).cloned() {
            return Ok(hit);
        }
        let result = plan()?;
        let mut guard = self.entries.lock().unwrap();
        let entry = guard.entry(key).or_insert_with(|| result.clone());
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tileplan_core::prelude::{DimTransform, NumType};

    fn params() -> ConvParams {
        ConvParams {
            input_type: NumType::Half,
            output_type: NumType::Half,
            batch_size: 1,
            num_conv_groups: 1,
            in_chans_per_group: 4,
            out_chans_per_group: 4,
            field_shape: vec![4],
            kernel_shape: vec![1],
            input_transform: vec![DimTransform::identity()],
            output_transform: vec![DimTransform::identity()],
            kernel_transform: vec![DimTransform::identity()],
        }
    }

    fn dummy_plan(cycles: u64) -> (ConvPlan, Cost) {
        let plan = ConvPlan {
            transforms: vec![Default::default()],
            partitions: vec![tileplan_core::prelude::PartitionRecord {
                field_split: vec![1],
                kernel_split: vec![1],
                batch_split: 1,
                conv_group_split: 1,
                out_chan_split: tileplan_core::prelude::ChannelSplit::unit(),
                in_chan_split: tileplan_core::prelude::ChannelSplit::unit(),
            }],
            types: vec![tileplan_core::prelude::TypeRecord {
                partial_type: NumType::Half,
                result_type: NumType::Half,
            }],
            method: tileplan_core::prelude::ConvMethod::Mac,
            grain: Default::default(),
            method_params: Default::default(),
            is_joint_plan: false,
            start_tile: 0,
            direction_ascending: true,
        };
        (
            plan,
            Cost {
                cycles,
                ..Cost::default()
            },
        )
    }

    #[test]
    fn repeated_lookups_do_not_recompute() {
        let cache = PlanCache::new();
        let calls = AtomicUsize::new(0);
        let p = params();
        let target = TargetDescriptor::reference_ipu(16, 1);
        let options = ConvOptions::default();

        for _ in 0..3 {
            let (_, cost) = cache
                .get_or_insert_with(&p, &target, &options, None, 0, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(dummy_plan(42))
                })
                .unwrap();
            assert_eq!(cost.cycles, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distinct_reference_costs_get_distinct_entries() {
        let cache = PlanCache::new();
        let p = params();
        let target = TargetDescriptor::reference_ipu(16, 1);
        let options = ConvOptions::default();

        cache
            .get_or_insert_with(&p, &target, &options, None, 0, || Ok(dummy_plan(1)))
            .unwrap();
        cache
            .get_or_insert_with(
                &p,
                &target,
                &options,
                Some(Cost {
                    cycles: 10,
                    ..Cost::default()
                }),
                0,
                || Ok(dummy_plan(2)),
            )
            .unwrap();
        assert_eq!(cache.len(), 2);
    }
}
