//! Batch orchestration over all known target-function families.
//!
//! One run is a fixed sequence of independent passes: the print-function pass
//! (split-pair scan) followed by one pass per memory-copy helper family
//! (single-pointer scan, tagged with the memory space the helper addresses).
//! A pass that cannot locate its function logs the failure and is skipped;
//! the other passes still run.

use crate::locate::{self, FoundBy, PRINT_FUNCTION_SYMBOL};
use crate::scanner::ScanStrategy;
use crate::{Address, AnalysisError, CancelToken, ProgramDb, Reference, Region, TOOL_NAME};

/// One memory-copy helper family: a symbol-name substring and the memory
/// space its pointer argument addresses.
#[derive(Debug, Clone, Copy)]
pub struct HelperFamily {
    /// Substring matched against symbol names
    pub pattern: &'static str,
    /// Region tag for the synthesized references
    pub region: Region,
}

/// The helper families this firmware line is known to use.
///
/// The `pmem` helpers read program memory through DPTR, the `xram` helpers
/// address external data memory.
pub const COPY_HELPER_FAMILIES: [HelperFamily; 6] = [
    HelperFamily {
        pattern: "from_pmem",
        region: Region::Code,
    },
    HelperFamily {
        pattern: "with_pmem",
        region: Region::Code,
    },
    HelperFamily {
        pattern: "check_equal_u32_iram_pmem",
        region: Region::Code,
    },
    HelperFamily {
        pattern: "from_xram",
        region: Region::ExtMem,
    },
    HelperFamily {
        pattern: "to_xram_from_iram",
        region: Region::ExtMem,
    },
    HelperFamily {
        pattern: "to_xram_with_iram",
        region: Region::ExtMem,
    },
];

/// What one batch run recovered.
#[derive(Debug, Default)]
pub struct PassSummary {
    /// References appended during this run, in discovery order
    pub added: Vec<Reference>,
    /// Where the print function was found, and how
    pub print_function: Option<(Address, FoundBy)>,
    /// Function names that could not be located
    pub lookup_failures: Vec<String>,
}

impl PassSummary {
    /// Number of references this run appended.
    pub fn references_added(&self) -> usize {
        self.added.len()
    }
}

/// Run every pass over the database.
pub fn run_all(db: &mut dyn ProgramDb, cancel: &CancelToken) -> PassSummary {
    let mut summary = PassSummary::default();

    run_print_pass(db, cancel, &mut summary);

    for family in &COPY_HELPER_FAMILIES {
        run_helper_family(db, family, &mut summary);
    }

    log::debug!(
        "{}> Batch complete: {} reference(s) added, {} lookup failure(s)",
        TOOL_NAME,
        summary.references_added(),
        summary.lookup_failures.len()
    );

    summary
}

/// The print-function pass: split-pair scans at every call site.
fn run_print_pass(db: &mut dyn ProgramDb, cancel: &CancelToken, summary: &mut PassSummary) {
    match locate::find_print_function(db, cancel) {
        Ok((addr, found_by)) => {
            summary.print_function = Some((addr, found_by));
            scan_call_sites(db, addr, ScanStrategy::SplitPair, Region::Code, summary);
        }
        Err(AnalysisError::LookupFailure(name)) => {
            log::info!(
                "{}> Failed to find \"{}\" function! Try defining it manually.",
                TOOL_NAME,
                name
            );
            summary.lookup_failures.push(name);
        }
        Err(err) => {
            log::info!(
                "{}> Failed to find \"{}\" function! Try defining it manually. ({})",
                TOOL_NAME,
                PRINT_FUNCTION_SYMBOL,
                err
            );
            summary.lookup_failures.push(PRINT_FUNCTION_SYMBOL.to_string());
        }
    }
}

/// One helper-family pass: single-pointer scans at every call site of every
/// matching symbol.
fn run_helper_family(db: &mut dyn ProgramDb, family: &HelperFamily, summary: &mut PassSummary) {
    let symbols = db.symbols_matching(family.pattern);
    log::debug!(
        "{}> {} symbol(s) match \"{}\"",
        TOOL_NAME,
        symbols.len(),
        family.pattern
    );

    for symbol in symbols {
        scan_call_sites(
            db,
            symbol.addr,
            ScanStrategy::SinglePointer,
            family.region,
            summary,
        );
    }
}

/// Scan backward from every location that references `function`.
fn scan_call_sites(
    db: &mut dyn ProgramDb,
    function: Address,
    strategy: ScanStrategy,
    region: Region,
    summary: &mut PassSummary,
) {
    let call_sites: Vec<Address> = db
        .references_to(function)
        .iter()
        .map(|r| r.from)
        .collect();

    for site in call_sites {
        summary.added.extend(strategy.run(db, site, region));
    }
}
