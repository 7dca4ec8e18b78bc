//! Worker-distribution model shared by every per-vertex estimator.

/// Splits `total_elements` into `num_workers` contiguous chunks as evenly
/// as possible. Matches the convention used across the estimator library:
/// the first `total % num_workers` chunks get one extra element.
pub fn split_work(total_elements: u64, num_workers: u32) -> Vec<u64> {
    if num_workers == 0 {
        return Vec::new();
    }
    let num_workers = num_workers as u64;
    let base = total_elements / num_workers;
    let remainder = total_elements % num_workers;
    (0..num_workers)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

/// Applies `per_worker` to each chunk from [`split_work`], takes the
/// maximum across workers, and scales by the worker count to produce
/// supervisor cycles, as every estimator in this crate does.
pub fn supervisor_cycles(total_elements: u64, num_workers: u32, per_worker: impl Fn(u64) -> u64) -> u64 {
    let chunks = split_work(total_elements, num_workers);
    let worst = chunks.into_iter().map(per_worker).max().unwrap_or(0);
    worst * num_workers as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_work_distributes_remainder_to_leading_workers() {
        let chunks = split_work(10, 3);
        assert_eq!(chunks, vec![4, 3, 3]);
    }

    #[test]
    fn supervisor_cycles_scales_the_worst_worker() {
        let cycles = supervisor_cycles(10, 3, |n| n * 2);
        // worst chunk is 4 elements -> 8 cycles, times 3 workers.
        assert_eq!(cycles, 24);
    }
}
