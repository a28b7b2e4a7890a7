/// One gigabyte (GiB) in bytes, as the remote panels account traffic.
pub const BYTES_PER_GB: i64 = 1_073_741_824;

/// Converts a plan's traffic ceiling from GB to bytes by exact integer multiplication. Floating point would
/// under- or over-provision large ceilings, so it is never used here. A ceiling of zero means unlimited.
pub fn gb_to_bytes(gb: i64) -> i64 {
    gb * BYTES_PER_GB
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn conversion_is_exact() {
        assert_eq!(gb_to_bytes(10), 10_737_418_240);
        assert_eq!(gb_to_bytes(0), 0);
        assert_eq!(gb_to_bytes(1), BYTES_PER_GB);
    }
}
