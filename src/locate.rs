//! Fallback function location.
//!
//! Some firmware images ship without symbols for the print function. When the
//! well-known name is absent, the locator falls back to an executable-only
//! byte-pattern search for code near the function entry, one pattern per known
//! firmware size variant, with a fixed negative offset back to the entry.

use std::fmt;

use crate::{Address, AnalysisError, CancelToken, ProgramDb, TOOL_NAME};

/// Symbol name of the assembly print routine.
pub const PRINT_FUNCTION_SYMBOL: &str = "asm_print_log";

/// Distinctive bytes inside the print function of 64K-image firmware.
const PATTERN_64K: [u8; 6] = [0xe5, 0x18, 0x54, 0x04, 0x70, 0x21];
/// Displacement from the 64K pattern match back to the function entry.
const ENTRY_OFFSET_64K: i64 = -13;

/// Distinctive bytes inside the print function of 128K-image firmware.
const PATTERN_128K: [u8; 6] = [0xea, 0xfe, 0xeb, 0xff, 0x80, 0x0f];
/// Displacement from the 128K pattern match back to the function entry.
const ENTRY_OFFSET_128K: i64 = -5;

const EXACT_MASK: [u8; 6] = [0xff; 6];

/// Which lookup strategy produced the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoundBy {
    /// Exact symbol-table lookup
    Name,
    /// Byte-pattern match against the 64K firmware variant
    Bytes64K,
    /// Byte-pattern match against the 128K firmware variant
    Bytes128K,
}

impl fmt::Display for FoundBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FoundBy::Name => write!(f, "name"),
            FoundBy::Bytes64K => write!(f, "bytes (64K)"),
            FoundBy::Bytes128K => write!(f, "bytes (128K)"),
        }
    }
}

/// Locate the print function, by name first, then by byte pattern.
///
/// Strategies run in order and the first hit wins. A cancelled pattern search
/// aborts only that attempt; the remaining strategies still get their turn.
/// When everything misses, the caller receives a [`AnalysisError::LookupFailure`]
/// and is expected to log it and carry on with the other passes.
pub fn find_print_function(
    db: &dyn ProgramDb,
    cancel: &CancelToken,
) -> Result<(Address, FoundBy), AnalysisError> {
    if let Some(symbol) = db.symbol_named(PRINT_FUNCTION_SYMBOL) {
        log::info!(
            "{}> Found print function by {}: {}",
            TOOL_NAME,
            FoundBy::Name,
            symbol.addr
        );
        return Ok((symbol.addr, FoundBy::Name));
    }

    let attempts = [
        (&PATTERN_64K, ENTRY_OFFSET_64K, FoundBy::Bytes64K),
        (&PATTERN_128K, ENTRY_OFFSET_128K, FoundBy::Bytes128K),
    ];
    for (pattern, entry_offset, found_by) in attempts {
        if let Some(addr) = search_entry(db, pattern, entry_offset, cancel) {
            log::info!(
                "{}> Found print function by {}: {}",
                TOOL_NAME,
                found_by,
                addr
            );
            return Ok((addr, found_by));
        }
    }

    Err(AnalysisError::LookupFailure(
        PRINT_FUNCTION_SYMBOL.to_string(),
    ))
}

/// One pattern attempt: search executable memory and rebase the first match
/// onto the function entry.
fn search_entry(
    db: &dyn ProgramDb,
    pattern: &[u8],
    entry_offset: i64,
    cancel: &CancelToken,
) -> Option<Address> {
    match db.search_bytes(pattern, &EXACT_MASK, cancel) {
        Ok(matches) => matches.first().map(|m| m.displaced(entry_offset)),
        Err(AnalysisError::Cancelled) => {
            log::debug!("{}> Pattern search cancelled, trying next strategy", TOOL_NAME);
            None
        }
        Err(err) => {
            log::debug!("{}> Pattern search failed: {}", TOOL_NAME, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeProgram;

    #[test]
    fn test_symbol_lookup_wins_without_searching() {
        let mut db = FakeProgram::new();
        db.add_symbol(PRINT_FUNCTION_SYMBOL, Address::code(0x800));
        // Image bytes that would also match the 64K pattern
        db.set_image(0x0, PATTERN_64K.to_vec());

        let (addr, found_by) = find_print_function(&db, &CancelToken::new()).unwrap();
        assert_eq!(addr, Address::code(0x800));
        assert_eq!(found_by, FoundBy::Name);
        assert_eq!(db.search_count(), 0);
    }

    #[test]
    fn test_64k_pattern_applies_entry_offset() {
        let mut db = FakeProgram::new();
        let mut image = vec![0u8; 0x20];
        image[0x13..0x19].copy_from_slice(&PATTERN_64K);
        db.set_image(0x1000, image);

        let (addr, found_by) = find_print_function(&db, &CancelToken::new()).unwrap();
        // Match at CODE:1013, entry 13 bytes earlier
        assert_eq!(addr, Address::code(0x1006));
        assert_eq!(found_by, FoundBy::Bytes64K);
    }

    #[test]
    fn test_64k_pattern_tried_before_128k() {
        let mut db = FakeProgram::new();
        let mut image = vec![0u8; 0x40];
        image[0x00..0x06].copy_from_slice(&PATTERN_128K);
        image[0x20..0x26].copy_from_slice(&PATTERN_64K);
        db.set_image(0x1000, image);

        let (_, found_by) = find_print_function(&db, &CancelToken::new()).unwrap();
        assert_eq!(found_by, FoundBy::Bytes64K);
    }

    #[test]
    fn test_128k_fallback() {
        let mut db = FakeProgram::new();
        let mut image = vec![0u8; 0x20];
        image[0x10..0x16].copy_from_slice(&PATTERN_128K);
        db.set_image(0x1000, image);

        let (addr, found_by) = find_print_function(&db, &CancelToken::new()).unwrap();
        assert_eq!(addr, Address::code(0x100b));
        assert_eq!(found_by, FoundBy::Bytes128K);
    }

    #[test]
    fn test_all_strategies_missing_is_lookup_failure() {
        let db = FakeProgram::new();
        let err = find_print_function(&db, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, AnalysisError::LookupFailure(name) if name == PRINT_FUNCTION_SYMBOL));
    }

    #[test]
    fn test_cancellation_is_not_fatal() {
        let mut db = FakeProgram::new();
        let mut image = vec![0u8; 0x20];
        image[0x10..0x16].copy_from_slice(&PATTERN_64K);
        db.set_image(0x1000, image);

        let cancel = CancelToken::new();
        cancel.cancel();

        // Both searches abort; the result is an ordinary lookup failure,
        // not a propagated cancellation.
        let err = find_print_function(&db, &cancel).unwrap_err();
        assert!(matches!(err, AnalysisError::LookupFailure(_)));
        assert_eq!(db.search_count(), 2);
    }
}
