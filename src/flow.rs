//! Control-flow predecessor resolution.

use crate::{Insn, ProgramDb, RefKind, Reference};

/// True if `reference` is a primary control-transfer edge landing on `insn`.
///
/// These are the edges the backward scan must follow: an instruction inside
/// the scan window that is a branch target can be reached along a second path
/// carrying its own pointer assignments.
pub fn is_branch_to(reference: &Reference, insn: &Insn) -> bool {
    reference.primary
        && reference.to == insn.addr
        && matches!(
            reference.kind,
            RefKind::UnconditionalCall | RefKind::UnconditionalJump | RefKind::ConditionalJump
        )
}

/// All primary branch/call edges that target `insn`.
pub fn branch_predecessors(db: &dyn ProgramDb, insn: &Insn) -> Vec<Reference> {
    db.references_to(insn.addr)
        .into_iter()
        .filter(|r| is_branch_to(r, insn))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeProgram;
    use crate::{Address, RefSource};

    fn edge(from: u64, to: u64, kind: RefKind, primary: bool) -> Reference {
        Reference {
            from: Address::code(from),
            to: Address::code(to),
            kind,
            source: RefSource::Analysis,
            primary,
            weight: 1,
        }
    }

    #[test]
    fn test_branch_predecessors_filters_kind_and_primary() {
        let mut db = FakeProgram::new();
        db.push_insn(0x100, "NOP", vec![], vec![]);

        db.add_raw_reference(edge(0x10, 0x100, RefKind::ConditionalJump, true));
        db.add_raw_reference(edge(0x20, 0x100, RefKind::UnconditionalJump, true));
        db.add_raw_reference(edge(0x30, 0x100, RefKind::UnconditionalCall, true));
        // Non-primary and data edges must be ignored
        db.add_raw_reference(edge(0x40, 0x100, RefKind::ConditionalJump, false));
        db.add_raw_reference(edge(0x50, 0x100, RefKind::Data, true));

        let insn = db.instruction_at(Address::code(0x100)).unwrap();
        let preds = branch_predecessors(&db, &insn);

        let mut froms: Vec<u64> = preds.iter().map(|r| r.from.offset).collect();
        froms.sort_unstable();
        assert_eq!(froms, vec![0x10, 0x20, 0x30]);
    }

    #[test]
    fn test_branch_to_other_address_is_not_a_predecessor() {
        let mut db = FakeProgram::new();
        db.push_insn(0x100, "NOP", vec![], vec![]);
        db.add_raw_reference(edge(0x10, 0x102, RefKind::UnconditionalJump, true));

        let insn = db.instruction_at(Address::code(0x100)).unwrap();
        assert!(branch_predecessors(&db, &insn).is_empty());
    }
}
