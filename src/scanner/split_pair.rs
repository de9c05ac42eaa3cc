//! Split-pair scan variant: the R3:R2 register pair.
//!
//! The print-style functions take their format-string pointer in R3 (high
//! byte) and R2 (low byte), loaded by two separate `MOV Rn,#imm` instructions
//! that may sit anywhere in the window, in either order.

use super::{walk, Capture, PointerTracker, ScanFrame, TrackEvent};
use crate::pointer::PointerValue;
use crate::{Address, FlowClass, Insn, Operand, ProgramDb, Reference, Region, Register};

/// Run the split-pair scan backward from `call_site`.
pub fn run(db: &mut dyn ProgramDb, call_site: Address, region: Region) -> Vec<Reference> {
    let mut frame = ScanFrame::new();
    walk::<SplitPairTracker>(db, call_site, region, &mut frame)
}

/// Lane state for one split-pair frame.
///
/// A write to R2 or R3 from anything other than an immediate does not stop
/// the walk here; it merely leaves that lane unsatisfied. This is the
/// deliberate asymmetry with the single-pointer variant, which treats such a
/// write as a hard boundary.
#[derive(Debug, Default)]
pub(crate) struct SplitPairTracker {
    low: Option<u64>,
    high: Option<u64>,
    /// Address of the high-byte load; the synthesized xref hangs off it
    site: Option<Address>,
}

impl PointerTracker for SplitPairTracker {
    fn observe(&mut self, insn: &Insn) -> TrackEvent {
        if insn.flow != FlowClass::Move {
            return TrackEvent::Skip;
        }
        let (Some(dst), Some(src)) = (insn.results.first(), insn.inputs.first()) else {
            return TrackEvent::Skip;
        };
        let Operand::Register(reg) = dst else {
            return TrackEvent::Skip;
        };
        let Operand::Imm { value, .. } = *src else {
            return TrackEvent::Skip;
        };

        // Walking backward, the first assignment seen is the one in effect
        // at the call site; older ones are shadowed.
        match reg {
            Register::R2 if self.low.is_none() => {
                self.low = Some(value);
                TrackEvent::Captured
            }
            Register::R3 if self.high.is_none() => {
                self.high = Some(value);
                self.site = Some(insn.addr);
                TrackEvent::Captured
            }
            _ => TrackEvent::Skip,
        }
    }

    fn satisfied(&self) -> bool {
        self.low.is_some() && self.high.is_some()
    }

    fn capture(&self) -> Option<Capture> {
        match (self.low, self.high, self.site) {
            (Some(low), Some(high), Some(site)) => Some(Capture {
                site,
                value: PointerValue::SplitPair { low, high },
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeProgram;

    #[test]
    fn test_recovers_pair_before_call() {
        // MOV R2,#0x34; MOV R3,#0x12; LCALL print
        let mut db = FakeProgram::new();
        db.mov_r_imm(0x100, Register::R2, 0x34);
        db.mov_r_imm(0x102, Register::R3, 0x12);
        db.lcall(0x104, 0x800);

        let added = run(&mut db, Address::code(0x104), Region::Code);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].from, Address::code(0x102));
        assert_eq!(added[0].to, Address::code(0x1234));
    }

    #[test]
    fn test_pair_order_does_not_matter() {
        let mut db = FakeProgram::new();
        db.mov_r_imm(0x100, Register::R3, 0x12);
        db.mov_r_imm(0x102, Register::R2, 0x34);
        db.lcall(0x104, 0x800);

        let added = run(&mut db, Address::code(0x104), Region::Code);
        assert_eq!(added.len(), 1);
        // The xref source is the R3 load wherever it sits
        assert_eq!(added[0].from, Address::code(0x100));
        assert_eq!(added[0].to, Address::code(0x1234));
    }

    #[test]
    fn test_jump_between_loads_and_call_blocks_scan() {
        let mut db = FakeProgram::new();
        db.mov_r_imm(0x100, Register::R2, 0x34);
        db.mov_r_imm(0x102, Register::R3, 0x12);
        db.sjmp(0x104, 0x300);
        db.lcall(0x106, 0x800);

        let added = run(&mut db, Address::code(0x106), Region::Code);
        assert!(added.is_empty());
    }

    #[test]
    fn test_missing_lane_yields_nothing() {
        let mut db = FakeProgram::new();
        db.mov_r_imm(0x102, Register::R3, 0x12);
        db.lcall(0x104, 0x800);

        let added = run(&mut db, Address::code(0x104), Region::Code);
        assert!(added.is_empty());
    }

    #[test]
    fn test_window_exhaustion_yields_nothing() {
        let mut db = FakeProgram::new();
        // The pair sits eleven instructions back; the window is ten.
        db.mov_r_imm(0x80, Register::R2, 0x34);
        db.mov_r_imm(0x82, Register::R3, 0x12);
        for i in 0..10u64 {
            db.push_insn(0x84 + 2 * i, "NOP", vec![], vec![]);
        }
        db.lcall(0x98, 0x800);

        let added = run(&mut db, Address::code(0x98), Region::Code);
        assert!(added.is_empty());
    }

    #[test]
    fn test_non_immediate_write_is_skipped_not_fatal() {
        // MOV R2,ACC between the immediate loads and the call: the lane is
        // not satisfied by it, but the walk keeps going and finds the
        // immediate load further back.
        let mut db = FakeProgram::new();
        db.mov_r_imm(0x100, Register::R2, 0x34);
        db.mov_r_imm(0x102, Register::R3, 0x12);
        db.push_insn(
            0x104,
            "MOV",
            vec![Operand::Register(Register::R2)],
            vec![Operand::Register(Register::Acc)],
        );
        db.lcall(0x106, 0x800);

        let added = run(&mut db, Address::code(0x106), Region::Code);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].to, Address::code(0x1234));
    }

    #[test]
    fn test_nearest_assignment_shadows_older_one() {
        let mut db = FakeProgram::new();
        db.mov_r_imm(0x0fc, Register::R2, 0x99);
        db.mov_r_imm(0x0fe, Register::R3, 0x99);
        db.mov_r_imm(0x100, Register::R2, 0x34);
        db.mov_r_imm(0x102, Register::R3, 0x12);
        db.lcall(0x104, 0x800);

        let added = run(&mut db, Address::code(0x104), Region::Code);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].to, Address::code(0x1234));
    }

    #[test]
    fn test_other_registers_are_ignored() {
        let mut db = FakeProgram::new();
        db.mov_r_imm(0x0fe, Register::R2, 0x34);
        db.mov_r_imm(0x100, Register::R5, 0xaa);
        db.mov_r_imm(0x102, Register::R3, 0x12);
        db.lcall(0x104, 0x800);

        let added = run(&mut db, Address::code(0x104), Region::Code);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].to, Address::code(0x1234));
    }
}
