//! In-memory [`ProgramDb`] implementation.
//!
//! The real database is externally owned; this fake exists so the analysis
//! can be exercised deterministically in tests and examples. Instructions
//! live in code space in program order, references and symbols in plain
//! vectors, and the byte-pattern search runs over an optional flat image.

use std::cell::Cell;
use std::collections::BTreeMap;

use crate::{
    Address, AnalysisError, CancelToken, Insn, Operand, ProgramDb, RefKind, RefSource, Reference,
    Region, Register, Symbol,
};

/// A small, fully in-memory program listing.
#[derive(Debug, Default)]
pub struct FakeProgram {
    insns: BTreeMap<u64, Insn>,
    refs: Vec<Reference>,
    symbols: Vec<Symbol>,
    image_base: u64,
    image: Vec<u8>,
    search_calls: Cell<usize>,
}

impl FakeProgram {
    /// An empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instruction at a code-space offset.
    pub fn push_insn(&mut self, offset: u64, mnemonic: &str, results: Vec<Operand>, inputs: Vec<Operand>) {
        let insn = Insn::new(Address::code(offset), mnemonic, results, inputs);
        self.insns.insert(offset, insn);
    }

    /// `MOV reg,#imm8` at `offset`.
    pub fn mov_r_imm(&mut self, offset: u64, reg: Register, value: u64) {
        self.push_insn(
            offset,
            "MOV",
            vec![Operand::Register(reg)],
            vec![Operand::imm8(value)],
        );
    }

    /// `MOV DPTR,#imm16` at `offset`.
    pub fn mov_dptr_imm(&mut self, offset: u64, value: u64) {
        self.push_insn(
            offset,
            "MOV",
            vec![Operand::Register(Register::Dptr)],
            vec![Operand::imm16(value)],
        );
    }

    /// `LCALL target` at `offset`, with the primary call reference the
    /// disassembler would have recorded.
    pub fn lcall(&mut self, offset: u64, target: u64) {
        self.push_insn(offset, "LCALL", vec![], vec![Operand::imm16(target)]);
        self.refs.push(Reference {
            from: Address::code(offset),
            to: Address::code(target),
            kind: RefKind::UnconditionalCall,
            source: RefSource::Analysis,
            primary: true,
            weight: 1,
        });
    }

    /// `SJMP target` at `offset`, with its primary jump reference.
    pub fn sjmp(&mut self, offset: u64, target: u64) {
        self.push_insn(offset, "SJMP", vec![], vec![Operand::imm16(target)]);
        self.refs.push(Reference {
            from: Address::code(offset),
            to: Address::code(target),
            kind: RefKind::UnconditionalJump,
            source: RefSource::Analysis,
            primary: true,
            weight: 1,
        });
    }

    /// Add a reference without any instruction bookkeeping.
    pub fn add_raw_reference(&mut self, reference: Reference) {
        self.refs.push(reference);
    }

    /// Add a symbol.
    pub fn add_symbol(&mut self, name: &str, addr: Address) {
        self.symbols.push(Symbol::new(name, addr));
    }

    /// Drop every symbol with this exact name.
    pub fn remove_symbol(&mut self, name: &str) {
        self.symbols.retain(|s| s.name != name);
    }

    /// Install the executable image the byte-pattern search runs over.
    pub fn set_image(&mut self, base: u64, bytes: Vec<u8>) {
        self.image_base = base;
        self.image = bytes;
    }

    /// How many times `search_bytes` has been invoked.
    pub fn search_count(&self) -> usize {
        self.search_calls.get()
    }
}

impl ProgramDb for FakeProgram {
    fn instruction_at(&self, addr: Address) -> Option<Insn> {
        if addr.region != Region::Code {
            return None;
        }
        self.insns.get(&addr.offset).cloned()
    }

    fn instruction_before(&self, addr: Address) -> Option<Insn> {
        if addr.region != Region::Code {
            return None;
        }
        self.insns
            .range(..addr.offset)
            .next_back()
            .map(|(_, insn)| insn.clone())
    }

    fn references_to(&self, addr: Address) -> Vec<Reference> {
        self.refs.iter().filter(|r| r.to == addr).copied().collect()
    }

    fn add_reference(&mut self, reference: Reference) {
        self.refs.push(reference);
    }

    fn symbol_named(&self, name: &str) -> Option<Symbol> {
        self.symbols.iter().find(|s| s.name == name).cloned()
    }

    fn symbols_matching(&self, pattern: &str) -> Vec<Symbol> {
        self.symbols
            .iter()
            .filter(|s| s.name.contains(pattern))
            .cloned()
            .collect()
    }

    fn search_bytes(
        &self,
        pattern: &[u8],
        mask: &[u8],
        cancel: &CancelToken,
    ) -> Result<Vec<Address>, AnalysisError> {
        self.search_calls.set(self.search_calls.get() + 1);

        let mut matches = Vec::new();
        let Some(last_start) = self.image.len().checked_sub(pattern.len()) else {
            return Ok(matches);
        };
        for start in 0..=last_start {
            if cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }
            let hit = pattern
                .iter()
                .zip(mask)
                .enumerate()
                .all(|(j, (p, m))| self.image[start + j] & m == *p);
            if hit {
                matches.push(Address::code(self.image_base + start as u64));
            }
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_before_walks_program_order() {
        let mut db = FakeProgram::new();
        db.push_insn(0x100, "NOP", vec![], vec![]);
        db.push_insn(0x103, "NOP", vec![], vec![]);

        let prev = db.instruction_before(Address::code(0x103)).unwrap();
        assert_eq!(prev.addr, Address::code(0x100));
        assert!(db.instruction_before(Address::code(0x100)).is_none());
    }

    #[test]
    fn test_search_bytes_masked_match() {
        let mut db = FakeProgram::new();
        db.set_image(0x1000, vec![0x00, 0xe5, 0x18, 0x12, 0xe5, 0x19]);

        // Low nibble of the second byte masked off: both 0x18 and 0x19 hit
        let hits = db
            .search_bytes(&[0xe5, 0x10], &[0xff, 0xf0], &CancelToken::new())
            .unwrap();
        assert_eq!(
            hits,
            vec![Address::code(0x1001), Address::code(0x1004)]
        );
    }

    #[test]
    fn test_search_bytes_honors_cancellation() {
        let mut db = FakeProgram::new();
        db.set_image(0, vec![0u8; 16]);

        let cancel = CancelToken::new();
        cancel.cancel();

        let result = db.search_bytes(&[0x00], &[0xff], &cancel);
        assert!(matches!(result, Err(AnalysisError::Cancelled)));
        assert_eq!(db.search_count(), 1);
    }

    #[test]
    fn test_search_bytes_empty_image() {
        let db = FakeProgram::new();
        let hits = db
            .search_bytes(&[0xe5], &[0xff], &CancelToken::new())
            .unwrap();
        assert!(hits.is_empty());
    }
}
