//! Single-pointer scan variant: the 16-bit DPTR register.
//!
//! The memory-copy helpers take their source or destination address in DPTR,
//! loaded whole by one `MOV DPTR,#imm16`. Unlike the split-pair variant, any
//! other write touching the pointer — its DPL/DPH halves, their SFR aliases,
//! or a computed value — makes the lineage unknowable and stops the frame.

use super::{walk, Capture, PointerTracker, ScanFrame, TrackEvent};
use crate::pointer::PointerValue;
use crate::{Address, FlowClass, Insn, Operand, ProgramDb, Reference, Region, Register};

/// Run the single-pointer scan backward from `call_site`.
pub fn run(db: &mut dyn ProgramDb, call_site: Address, region: Region) -> Vec<Reference> {
    let mut frame = ScanFrame::new();
    walk::<DptrTracker>(db, call_site, region, &mut frame)
}

/// Lane state for one single-pointer frame.
#[derive(Debug, Default)]
pub(crate) struct DptrTracker {
    value: Option<u64>,
    site: Option<Address>,
}

impl DptrTracker {
    /// True if `operand` writes into DPTR or either of its halves, whether
    /// addressed by register name or through the half's SFR alias.
    fn touches_pointer(operand: &Operand) -> bool {
        match operand {
            Operand::Register(Register::Dptr) => true,
            Operand::Register(r) => r.sfr_alias().is_some(),
            Operand::Mem(addr) => [Register::Dpl, Register::Dph]
                .into_iter()
                .any(|r| r.sfr_alias() == Some(*addr)),
            _ => false,
        }
    }
}

impl PointerTracker for DptrTracker {
    fn observe(&mut self, insn: &Insn) -> TrackEvent {
        if insn.flow != FlowClass::Move {
            return TrackEvent::Skip;
        }
        let (Some(dst), Some(src)) = (insn.results.first(), insn.inputs.first()) else {
            return TrackEvent::Skip;
        };
        if !Self::touches_pointer(dst) {
            return TrackEvent::Skip;
        }

        match (dst, src) {
            (Operand::Register(Register::Dptr), Operand::Imm { value, .. }) => {
                self.value = Some(*value);
                self.site = Some(insn.addr);
                TrackEvent::Captured
            }
            // Half-register writes or computed values: the pointer can no
            // longer be recovered from immediates alone.
            _ => TrackEvent::Boundary,
        }
    }

    fn satisfied(&self) -> bool {
        self.value.is_some()
    }

    fn capture(&self) -> Option<Capture> {
        match (self.value, self.site) {
            (Some(value), Some(site)) => Some(Capture {
                site,
                value: PointerValue::Wide(value),
            }),
            _ => None,
        }
    }
}
