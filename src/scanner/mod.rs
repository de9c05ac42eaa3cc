//! Backward register-assignment scanning.
//!
//! Starting at a call site that uses an indirect pointer, the scanner walks
//! backward through the instruction stream looking for the immediate loads
//! that constructed the pointer value. Whenever an instruction inside the
//! window is the target of a branch, the scan repeats recursively along that
//! incoming path, because the merge point can be reached with a different
//! pointer in hand.

use std::collections::HashSet;
use std::fmt;

use clap::ValueEnum;

use crate::pointer::PointerValue;
use crate::{flow, xref, Address, Insn, ProgramDb, Reference, Region};

pub mod single_pointer;
pub mod split_pair;

/// How many instructions one frame may walk backward.
pub const SCAN_WINDOW: usize = 10;

/// Hard ceiling on predecessor-following recursion.
///
/// The visited set already guarantees termination; this cap bounds stack use
/// on firmware with pathological branch fan-in.
pub const MAX_SCAN_DEPTH: usize = 64;

/// Available scan variants.
#[derive(Copy, Clone, ValueEnum, Debug, PartialEq, Eq)]
pub enum ScanStrategy {
    /// Track the R3:R2 pair; each 8-bit half is assigned independently
    SplitPair,
    /// Track the 16-bit DPTR register, assigned by one immediate load
    SinglePointer,
}

impl fmt::Display for ScanStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStrategy::SplitPair => write!(f, "Split register pair"),
            ScanStrategy::SinglePointer => write!(f, "Single pointer register"),
        }
    }
}

impl ScanStrategy {
    /// Scan backward from `call_site`, synthesizing data references into
    /// `region` for every pointer value recovered. Returns what was added.
    pub fn run(
        &self,
        db: &mut dyn ProgramDb,
        call_site: Address,
        region: Region,
    ) -> Vec<Reference> {
        match self {
            ScanStrategy::SplitPair => split_pair::run(db, call_site, region),
            ScanStrategy::SinglePointer => single_pointer::run(db, call_site, region),
        }
    }
}

/// What a tracker made of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrackEvent {
    /// A lane was captured
    Captured,
    /// The tracked value became unknowable; stop this frame
    Boundary,
    /// Irrelevant instruction
    Skip,
}

/// A fully captured pointer value and the instruction that completed it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Capture {
    /// Address of the capturing load (the xref source)
    pub site: Address,
    /// Captured value, ready for assembly
    pub value: PointerValue,
}

/// Per-variant policy for classifying assignments to the tracked registers.
///
/// One tracker instance is the mutable lane state of a single scan frame;
/// every recursive branch path gets a fresh one. The split-pair/single-pointer
/// asymmetry on non-immediate writes lives entirely inside `observe`.
pub(crate) trait PointerTracker: Default {
    /// Inspect one instruction on the backward walk.
    fn observe(&mut self, insn: &Insn) -> TrackEvent;

    /// True once every required lane has been captured.
    fn satisfied(&self) -> bool;

    /// The completed capture, if `satisfied`.
    fn capture(&self) -> Option<Capture>;
}

/// State shared by one top-level scan and all its recursive frames.
pub(crate) struct ScanFrame {
    visited: HashSet<Address>,
    depth: usize,
}

impl ScanFrame {
    pub(crate) fn new() -> Self {
        Self {
            visited: HashSet::new(),
            depth: 0,
        }
    }
}

/// The shared backward walk.
///
/// Mirrors the scan loop shape at each of up to [`SCAN_WINDOW`] steps:
/// first follow every primary branch edge targeting the current instruction
/// (recursively, with a fresh tracker), then step to the program-order
/// predecessor and classify it. A frame that captures a complete pointer
/// synthesizes its own reference; a frame that hits a boundary or runs out
/// of window yields nothing, silently.
pub(crate) fn walk<T: PointerTracker>(
    db: &mut dyn ProgramDb,
    start: Address,
    region: Region,
    frame: &mut ScanFrame,
) -> Vec<Reference> {
    if frame.depth >= MAX_SCAN_DEPTH || !frame.visited.insert(start) {
        return Vec::new();
    }
    frame.depth += 1;

    let mut added = Vec::new();
    let mut tracker = T::default();

    if let Some(mut insn) = db.instruction_at(start) {
        for _ in 0..SCAN_WINDOW {
            if tracker.satisfied() {
                break;
            }

            // A branch landing here means the value may have been built along
            // another path; scan that path independently.
            for pred in flow::branch_predecessors(db, &insn) {
                log::debug!("Found branch to {} at {}, following", insn.addr, pred.from);
                added.extend(walk::<T>(db, pred.from, region, frame));
            }

            let Some(prev) = db.instruction_before(insn.addr) else {
                break;
            };
            insn = prev;

            if insn.is_scan_boundary() {
                break;
            }
            if tracker.observe(&insn) == TrackEvent::Boundary {
                break;
            }
        }
    }

    if let Some(capture) = tracker.capture() {
        if let Some(r) = xref::synthesize(db, capture.site, capture.value.offset(), region) {
            added.push(r);
        }
    }

    frame.depth -= 1;
    added
}
