//! Multi-plan composer: plans several convolutions that share one
//! device's tile budget, allocating a tile subrange to each and
//! propagating reference costs between them so no operator regresses the
//! step time set by an earlier, larger one.
//!
//! Algorithm, following the four numbered steps of the composition
//! procedure: sort operators by size (largest last); plan the largest
//! across the whole device, then re-plan it under a relaxed cycles bound
//! to shrink its tile footprint and free tiles for the rest; plan every
//! remaining operator smallest-first against the tiles left over, with a
//! running reference cost each step must not exceed without penalty;
//! plan the final remaining operator on whatever tiles are left, with no
//! further reservation. Falls back to independent full-device plans per
//! operator when the tile allocation cannot be made to fit.

use tileplan_core::prelude::{ConvOptions, ConvParams, ConvPlan, Cost, Objective, SecondaryKey};
use tileplan_core::target::{HierarchyLevel, TargetDescriptor};
use tileplan_core::{Error, Result};

use crate::cache::PlanCache;
use crate::conv::plan_convolution;

/// One operator to co-plan, identified by its position in the caller's
/// original list so results can be matched back up after sorting by size.
pub struct OperatorRequest {
    pub params: ConvParams,
    pub options: ConvOptions,
}

/// One operator's slot in the composed schedule: its plan, its cost, and
/// the tile offset at which its allocation begins within the device.
#[derive(Debug, Clone)]
pub struct ComposedPlan {
    pub original_index: usize,
    pub plan: ConvPlan,
    pub cost: Cost,
    pub tile_offset: u64,
    pub tiles_reserved: u64,
}

/// How aggressively the largest operator's cycles bound is relaxed to
/// free tiles for the rest: effective bound = `baseline * (1 + (n-1) *
/// cycle_back_off)`.
pub const DEFAULT_CYCLE_BACK_OFF: f64 = 0.1;

fn operator_size(params: &ConvParams) -> u128 {
    let field_vol: u128 = params.field_shape.iter().map(|&s| s as u128).product();
    let kernel_vol: u128 = params.kernel_shape.iter().map(|&s| s as u128).product();
    (params.batch_size as u128)
        * (params.num_conv_groups as u128)
        * (params.in_chans_per_group as u128)
        * (params.out_chans_per_group as u128)
        * field_vol.max(1)
        * kernel_vol.max(1)
}

fn sub_target(target: &TargetDescriptor, tiles: u64) -> TargetDescriptor {
    let mut t = target.clone();
    let tiles = tiles.max(1);
    t.num_ipus = 1;
    t.tiles_per_ipu = tiles;
    t.hierarchy = t
        .hierarchy
        .iter()
        .map(|h| HierarchyLevel {
            tiles,
            exchange_bytes_per_cycle: h.exchange_bytes_per_cycle,
        })
        .collect();
    t
}

fn max_cost(a: Cost, b: Cost) -> Cost {
    Cost {
        cycles: a.cycles.max(b.cycles),
        temp_bytes: a.temp_bytes.max(b.temp_bytes),
        tiles: a.tiles.max(b.tiles),
        per_step_cycle_diff: a.per_step_cycle_diff.max(b.per_step_cycle_diff),
    }
}

/// Plans every operator in `requests` independently on the full device,
/// ignoring tile-sharing entirely. The fallback used when the parallel
/// composition below cannot find a feasible allocation.
pub fn plan_serial(
    requests: &[OperatorRequest],
    target: &TargetDescriptor,
    cache: &PlanCache,
) -> Result<Vec<ComposedPlan>> {
    requests
        .iter()
        .enumerate()
        .map(|(original_index, req)| {
            let (plan, cost) = cache.get_or_insert_with(&req.params, target, &req.options, None, 0, || {
                plan_convolution(&req.params, target, &req.options, None)
            })?;
            Ok(ComposedPlan {
                original_index,
                tiles_reserved: cost.tiles,
                plan,
                cost,
                tile_offset: 0,
            })
        })
        .collect()
}

/// Co-plans `requests` on one device, sharing its tile budget across
/// operators per the composition procedure. Falls back to
/// [`plan_serial`] if no feasible tile allocation is found.
pub fn compose_plans(
    requests: &[OperatorRequest],
    target: &TargetDescriptor,
    cache: &PlanCache,
    cycle_back_off: f64,
) -> Result<Vec<ComposedPlan>> {
    if requests.is_empty() {
        return Ok(Vec::new());
    }
    if requests.len() == 1 {
        return plan_serial(requests, target, cache);
    }

    match compose_plans_inner(requests, target, cache, cycle_back_off) {
        Ok(plans) => Ok(plans),
        Err(_) => plan_serial(requests, target, cache),
    }
}

fn compose_plans_inner(
    requests: &[OperatorRequest],
    target: &TargetDescriptor,
    cache: &PlanCache,
    cycle_back_off: f64,
) -> Result<Vec<ComposedPlan>> {
    let n = requests.len();
    let total_tiles = target.total_tiles();

    // Step 1: sort by size, largest last.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| operator_size(&requests[i].params));
    let largest_idx = *order.last().unwrap();

    // Step 2: plan the largest across all tiles to establish a baseline,
    // then re-plan under a relaxed cycles bound, minimising tiles, so it
    // gives tiles back to the rest of the schedule.
    let largest = &requests[largest_idx];
    let (_, baseline_cost) = cache.get_or_insert_with(&largest.params, target, &largest.options, None, 0, || {
        plan_convolution(&largest.params, target, &largest.options, None)
    })?;
    if baseline_cost.is_highest() {
        return Err(Error::Infeasible("largest operator has no feasible full-device plan".to_string()));
    }

    let relaxed_bound = (baseline_cost.cycles as f64 * (1.0 + (n as f64 - 1.0) * cycle_back_off)).ceil() as u64;
    let mut relaxed_options = largest.options.clone();
    relaxed_options.objective = Objective::MinimiseTiles;
    relaxed_options.cycles_bound = Some(relaxed_bound);
    let (largest_plan, largest_cost) =
        cache.get_or_insert_with(&largest.params, target, &relaxed_options, None, 0, || {
            plan_convolution(&largest.params, target, &relaxed_options, None)
        })?;
    if largest_cost.is_highest() {
        return Err(Error::Infeasible("largest operator has no feasible relaxed-tiles plan".to_string()));
    }

    let mut results: Vec<Option<ComposedPlan>> = (0..n).map(|_| None).collect();
    let mut tile_offset = 0u64;
    results[largest_idx] = Some(ComposedPlan {
        original_index: largest_idx,
        tiles_reserved: largest_cost.tiles,
        plan: largest_plan,
        cost: largest_cost,
        tile_offset,
    });
    tile_offset += largest_cost.tiles;

    let remaining: Vec<usize> = order.into_iter().filter(|&i| i != largest_idx).collect();
    let mut reference_cost = largest_cost;
    let mut tiles_left = total_tiles.saturating_sub(tile_offset);

    for (step, &idx) in remaining.iter().enumerate() {
        if tiles_left == 0 {
            return Err(Error::Infeasible("no tiles remain for the rest of the composed schedule".to_string()));
        }
        let req = &requests[idx];
        let sub = sub_target(target, tiles_left);
        let is_final_remaining = step == remaining.len() - 1;

        let (plan, cost) = if is_final_remaining {
            // Step 4: the final operator plans on whatever tiles remain,
            // with no further reservation or cost-diff penalty.
            cache.get_or_insert_with(&req.params, &sub, &req.options, None, tile_offset, || {
                plan_convolution(&req.params, &sub, &req.options, None)
            })?
        } else {
            // Step 3: smallest-first against the current reference cost.
            let mut opts = req.options.clone();
            opts.objective = Objective::MinimiseCostDiff;
            opts.cost_diff_secondary_key = SecondaryKey::Tiles;
            cache.get_or_insert_with(&req.params, &sub, &opts, Some(reference_cost), tile_offset, || {
                plan_convolution(&req.params, &sub, &opts, Some(reference_cost))
            })?
        };

        if cost.is_highest() {
            return Err(Error::Infeasible(format!(
                "operator at original index {idx} has no feasible plan on the remaining tiles"
            )));
        }

        reference_cost = max_cost(reference_cost, cost);
        results[idx] = Some(ComposedPlan {
            original_index: idx,
            tiles_reserved: cost.tiles,
            plan,
            cost,
            tile_offset,
        });
        tile_offset += cost.tiles;
        tiles_left = tiles_left.saturating_sub(cost.tiles);
    }

    Ok(results.into_iter().map(|r| r.expect("every index assigned")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tileplan_core::prelude::{DimTransform, NumType, Pass};

    fn conv(out_chans: u64, field: u64) -> ConvParams {
        ConvParams {
            input_type: NumType::Half,
            output_type: NumType::Half,
            batch_size: 1,
            num_conv_groups: 1,
            in_chans_per_group: 16,
            out_chans_per_group: out_chans,
            field_shape: vec![field, field],
            kernel_shape: vec![1, 1],
            input_transform: vec![DimTransform::identity(); 2],
            output_transform: vec![DimTransform::identity(); 2],
            kernel_transform: vec![DimTransform::identity(); 2],
        }
    }

    fn options() -> ConvOptions {
        ConvOptions {
            pass: Pass::InferenceFwd,
            tiles_per_ipu: 64,
            num_ipus: 1,
            ..ConvOptions::default()
        }
    }

    #[test]
    fn composing_two_operators_assigns_disjoint_tile_ranges() {
        let target = TargetDescriptor::reference_ipu(64, 1);
        let cache = PlanCache::new();
        let requests = vec![
            OperatorRequest {
                params: conv(64, 8),
                options: options(),
            },
            OperatorRequest {
                params: conv(16, 4),
                options: options(),
            },
        ];
        let composed = compose_plans(&requests, &target, &cache, DEFAULT_CYCLE_BACK_OFF).unwrap();
        assert_eq!(composed.len(), 2);
        let mut ranges: Vec<(u64, u64)> = composed
            .iter()
            .map(|c| (c.tile_offset, c.tile_offset + c.tiles_reserved))
            .collect();
        ranges.sort();
        assert!(ranges[0].1 <= ranges[1].0, "tile ranges must not overlap: {ranges:?}");
    }

    #[test]
    fn single_operator_uses_serial_path() {
        let target = TargetDescriptor::reference_ipu(64, 1);
        let cache = PlanCache::new();
        let requests = vec![OperatorRequest {
            params: conv(16, 4),
            options: options(),
        }];
        let composed = compose_plans(&requests, &target, &cache, DEFAULT_CYCLE_BACK_OFF).unwrap();
        assert_eq!(composed.len(), 1);
        assert_eq!(composed[0].tile_offset, 0);
    }
}
