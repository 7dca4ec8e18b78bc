//! Exchange-cycle estimation.

/// Cycles to move `bytes` across one hierarchy level's exchange fabric.
///
/// `bytes` is pre-scaled by the caller to preserve precision before
/// dividing by a fractional bytes/cycle rate; `exchange_bytes_per_cycle`
/// is the target's raw rate for this level. When `shared_bus_factor`
/// divides the count of consecutive tiles receiving the same data, the
/// shared-exchange-bus doubles effective bandwidth.
pub fn exchange_cycles(
    bytes: u64,
    exchange_bytes_per_cycle: f64,
    supports_shared_bus: bool,
    tiles_per_shared_bus: u64,
    replicated_tiles: u64,
) -> u64 {
    let mut rate = exchange_bytes_per_cycle.max(1e-6);
    if supports_shared_bus && tiles_per_shared_bus > 0 && replicated_tiles % tiles_per_shared_bus == 0 {
        rate *= 2.0;
    }
    ((bytes as f64) / rate).ceil() as u64
}

/// Two-operand exchange for the sparse-dense planner: a bucket broadcast
/// along one partition axis, and a dense operand broadcast along the other.
pub fn two_operand_exchange_cycles(
    bucket_bytes: u64,
    dense_bytes: u64,
    exchange_bytes_per_cycle: f64,
) -> u64 {
    let rate = exchange_bytes_per_cycle.max(1e-6);
    (((bucket_bytes + dense_bytes) as f64) / rate).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_bus_halves_cycles_when_divisible() {
        let without = exchange_cycles(1024, 4.0, false, 4, 4);
        let with = exchange_cycles(1024, 4.0, true, 4, 4);
        assert!(with < without);
    }

    #[test]
    fn shared_bus_has_no_effect_when_not_divisible() {
        let baseline = exchange_cycles(1024, 4.0, false, 4, 3);
        let with = exchange_cycles(1024, 4.0, true, 4, 3);
        assert_eq!(baseline, with);
    }
}
