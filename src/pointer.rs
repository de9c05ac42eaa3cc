//! Assembly of captured immediate bytes into a pointer value.

/// The raw material a scan captures before it becomes an address offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerValue {
    /// Two independently captured 8-bit halves (R2 low, R3 high).
    SplitPair {
        /// Low byte as captured, unmasked
        low: u64,
        /// High byte as captured, unmasked
        high: u64,
    },
    /// One 16-bit immediate captured whole (a DPTR load).
    Wide(u64),
}

impl PointerValue {
    /// Combine the captured value(s) into a 16-bit address offset.
    pub fn offset(&self) -> u64 {
        match *self {
            PointerValue::SplitPair { low, high } => (low & 0xff) | ((high & 0xff) << 8),
            PointerValue::Wide(value) => value & 0xffff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pair_assembly() {
        let value = PointerValue::SplitPair {
            low: 0x34,
            high: 0x12,
        };
        assert_eq!(value.offset(), 0x1234);
    }

    #[test]
    fn test_split_pair_masks_each_lane() {
        // Anything above bit 7 in a lane is noise and must not leak through
        let value = PointerValue::SplitPair {
            low: 0x1ff,
            high: 0xa55,
        };
        assert_eq!(value.offset(), 0x55ff);
    }

    #[test]
    fn test_wide_assembly() {
        assert_eq!(PointerValue::Wide(0xabcd).offset(), 0xabcd);
        assert_eq!(PointerValue::Wide(0x5_abcd).offset(), 0xabcd);
    }
}
