//! Sparse-gather and sparse-dense element-wise cost family, and bucket
//! sizing, for the sparse-dense matmul planner.

use crate::worker::supervisor_cycles;

/// Rounds `ideal_elems_per_bucket` up to a multiple of the exchange-atom
/// element count for a type of `bytes_per_elem` bytes.
pub fn round_up_to_exchange_atom(ideal_elems_per_bucket: u64, bytes_per_elem: u32, exchange_atom_bytes: u32) -> u64 {
    let bytes_per_elem = bytes_per_elem.max(1) as u64;
    let atom_bytes = exchange_atom_bytes.max(1) as u64;
    let g = gcd(bytes_per_elem, atom_bytes);
    let lcm = bytes_per_elem / g * atom_bytes;
    let atom_elems = lcm / bytes_per_elem;
    ideal_elems_per_bucket.div_ceil(atom_elems) * atom_elems
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Expected number of non-zero element groups per row/column for a
/// uniform-random sparsity pattern, using the binomial identity
/// `P(row all zero) = (1 - rho)^cols`.
pub fn expected_nonzero_groups(num_groups: u64, elems_per_group: u64, nz_ratio: f64) -> f64 {
    let groups = num_groups as f64;
    let p_all_zero = (1.0 - nz_ratio).powf(elems_per_group as f64);
    groups * (1.0 - p_all_zero)
}

/// Meta-info and non-zero-value bucket element counts, sized for a
/// perfectly-uniform sparsity pattern and scaled by the oversize
/// proportion, then rounded up to the exchange-atom count.
pub fn bucket_sizes(
    rows: u64,
    cols: u64,
    nz_ratio: f64,
    oversize_proportion: f64,
    meta_info_bytes_per_elem: u32,
    value_bytes_per_elem: u32,
    exchange_atom_bytes: u32,
) -> (u64, u64) {
    let total_elems = rows as f64 * cols as f64;
    let ideal_nz = (total_elems * nz_ratio).ceil();
    let oversized = (ideal_nz * (1.0 + oversize_proportion)).ceil() as u64;
    let meta_info_elems = round_up_to_exchange_atom(oversized, meta_info_bytes_per_elem, exchange_atom_bytes);
    let value_elems = round_up_to_exchange_atom(oversized, value_bytes_per_elem, exchange_atom_bytes);
    (meta_info_elems, value_elems)
}

/// Gathers non-zero values and their meta-info out of a bucket, one
/// worker-context chunk at a time.
pub fn sparse_gather_cycles(num_nonzero_groups: u64, num_worker_contexts: u32) -> u64 {
    supervisor_cycles(num_nonzero_groups, num_worker_contexts, |n| n * 3 + 8)
}

/// Sparse-dense element-wise multiply-accumulate over `num_nonzero_groups`
/// non-zero groups against the densely-held operand.
pub fn sparse_dense_elementwise_cycles(num_nonzero_groups: u64, dense_row_width: u64, num_worker_contexts: u32) -> u64 {
    supervisor_cycles(num_nonzero_groups, num_worker_contexts, move |n| {
        n * (dense_row_width + 4) + 10
    })
}

/// Cost of rotating buckets around a ring during the bucket sweep.
pub fn propagating_exchange_cycles(bucket_bytes: u64, num_steps: u64, exchange_bytes_per_cycle: f64) -> u64 {
    let rate = exchange_bytes_per_cycle.max(1e-6);
    (((bucket_bytes * num_steps) as f64) / rate).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_density_matches_dense_element_count() {
        let (_, value_elems) = bucket_sizes(8, 8, 1.0, 0.0, 4, 4, 4);
        assert!(value_elems >= 64);
    }

    #[test]
    fn round_up_to_exchange_atom_is_a_multiple_of_the_atom() {
        let rounded = round_up_to_exchange_atom(13, 2, 4);
        // atom element count is lcm(2,4)/2 = 2
        assert_eq!(rounded % 2, 0);
        assert!(rounded >= 13);
    }

    #[test]
    fn propagating_exchange_scales_with_steps() {
        let one_step = propagating_exchange_cycles(1024, 1, 4.0);
        let four_steps = propagating_exchange_cycles(1024, 4, 4.0);
        assert_eq!(four_steps, one_step * 4);
    }
}
