//! Core data model, traits, and analysis dispatch for the xref_recover library.
//!
//! This library recovers implicit data/code cross-references in a disassembled
//! 8051 firmware image. Disassemblers cannot statically resolve calls made
//! through an indirect pointer (DPTR, or the R3:R2 register pair) because the
//! pointer value is constructed by earlier immediate loads, possibly along
//! several converging control-flow paths. The scanner here walks backward from
//! each call site, follows branch predecessors recursively, finds the
//! immediate loads that built the pointer, and records a data cross-reference
//! from the load instruction to the recovered target.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use xref_recover::{passes, CancelToken};
//! use xref_recover::testutil::FakeProgram;
//!
//! // In production the database is whatever implements `ProgramDb`;
//! // the in-memory fake is used here for illustration.
//! let mut db = FakeProgram::new();
//!
//! // ... populate instructions, symbols, and call references ...
//!
//! let cancel = CancelToken::new();
//! let summary = passes::run_all(&mut db, &cancel);
//!
//! println!("recovered {} references", summary.references_added());
//! ```

pub mod flow;
pub mod format;
pub mod locate;
pub mod passes;
pub mod pointer;
pub mod scanner;
pub mod testutil;
pub mod xref;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Prefix used on every report line this tool emits.
pub const TOOL_NAME: &str = "xref_recover";

/// Memory spaces of the 8051 address map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Region {
    /// Program (code) space
    Code,
    /// External data space
    ExtMem,
    /// Internal data space
    IntMem,
    /// Special-function-register space
    Sfr,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Code => write!(f, "CODE"),
            Region::ExtMem => write!(f, "EXTMEM"),
            Region::IntMem => write!(f, "INTMEM"),
            Region::Sfr => write!(f, "SFR"),
        }
    }
}

impl FromStr for Region {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CODE" => Ok(Region::Code),
            "EXTMEM" => Ok(Region::ExtMem),
            "INTMEM" => Ok(Region::IntMem),
            "SFR" => Ok(Region::Sfr),
            _ => Err(AnalysisError::AddressParse(s.to_string())),
        }
    }
}

/// A region-qualified address: a memory space plus an offset into it.
///
/// Two addresses are equal only when both region and offset match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    /// Memory space this address belongs to
    pub region: Region,
    /// Offset within the region
    pub offset: u64,
}

impl Address {
    /// Construct an address in the given region.
    pub const fn new(region: Region, offset: u64) -> Self {
        Self { region, offset }
    }

    /// Shorthand for a code-space address.
    pub const fn code(offset: u64) -> Self {
        Self::new(Region::Code, offset)
    }

    /// Apply a signed displacement, staying in the same region.
    pub fn displaced(&self, delta: i64) -> Self {
        Self::new(self.region, self.offset.wrapping_add_signed(delta))
    }

    /// Parse a `REGION:hexoffset` string (e.g. `"CODE:1234"`).
    pub fn parse(s: &str) -> Result<Self, AnalysisError> {
        let (region, offset) = s
            .split_once(':')
            .ok_or_else(|| AnalysisError::AddressParse(s.to_string()))?;
        let offset = u64::from_str_radix(offset, 16)
            .map_err(|_| AnalysisError::AddressParse(s.to_string()))?;
        Ok(Self::new(region.parse()?, offset))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The way the listing prints addresses: REGION:hexoffset
        write!(f, "{}:{:04x}", self.region, self.offset)
    }
}

/// Memory-mapped alias of the DPL register half.
pub const DPL_ADDR: Address = Address::new(Region::Sfr, 0x82);
/// Memory-mapped alias of the DPH register half.
pub const DPH_ADDR: Address = Address::new(Region::Sfr, 0x83);
/// Memory-mapped alias of the DPX extension register.
pub const DPX_ADDR: Address = Address::new(Region::Sfr, 0x93);

/// The fixed 8051 register set the analysis cares about.
///
/// Identity is by name; values live in the instruction operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// 16-bit data pointer
    Dptr,
    /// Low half of DPTR
    Dpl,
    /// High half of DPTR
    Dph,
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    /// Accumulator
    Acc,
    B,
}

impl Register {
    /// Look a register up by its listing name (covers `registerNamed`).
    pub fn named(name: &str) -> Option<Register> {
        match name {
            "DPTR" => Some(Register::Dptr),
            "DPL" => Some(Register::Dpl),
            "DPH" => Some(Register::Dph),
            "R0" => Some(Register::R0),
            "R1" => Some(Register::R1),
            "R2" => Some(Register::R2),
            "R3" => Some(Register::R3),
            "R4" => Some(Register::R4),
            "R5" => Some(Register::R5),
            "R6" => Some(Register::R6),
            "R7" => Some(Register::R7),
            "ACC" | "A" => Some(Register::Acc),
            "B" => Some(Register::B),
            _ => None,
        }
    }

    /// The SFR address aliasing this register, if it has one.
    pub fn sfr_alias(&self) -> Option<Address> {
        match self {
            Register::Dpl => Some(DPL_ADDR),
            Register::Dph => Some(DPH_ADDR),
            _ => None,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Register::Dptr => "DPTR",
            Register::Dpl => "DPL",
            Register::Dph => "DPH",
            Register::R0 => "R0",
            Register::R1 => "R1",
            Register::R2 => "R2",
            Register::R3 => "R3",
            Register::R4 => "R4",
            Register::R5 => "R5",
            Register::R6 => "R6",
            Register::R7 => "R7",
            Register::Acc => "ACC",
            Register::B => "B",
        };
        write!(f, "{}", name)
    }
}

/// One instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// A named register
    Register(Register),
    /// A fixed memory-mapped location (e.g. an SFR alias of a register)
    Mem(Address),
    /// An immediate constant encoded in the instruction
    Imm {
        /// Literal value
        value: u64,
        /// Encoded width in bits
        bits: u8,
    },
}

impl Operand {
    /// An 8-bit immediate.
    pub const fn imm8(value: u64) -> Self {
        Operand::Imm { value, bits: 8 }
    }

    /// A 16-bit immediate.
    pub const fn imm16(value: u64) -> Self {
        Operand::Imm { value, bits: 16 }
    }
}

/// Coarse control-flow classification of a mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowClass {
    /// Subroutine call (LCALL, ACALL)
    Call,
    /// Unconditional jump (LJMP, AJMP, SJMP, JMP)
    Jump,
    /// Conditional jump (CJNE, DJNZ, JB, JZ, ...)
    CondJump,
    /// Return (RET, RETI)
    Return,
    /// Plain data move (MOV)
    Move,
    /// Everything else
    Other,
}

impl FlowClass {
    /// Classify an 8051 mnemonic.
    ///
    /// Every `J*` mnemonic that is not one of the unconditional jumps tests a
    /// condition, and `CJNE`/`DJNZ` branch as a side effect of their
    /// compare/decrement. `MOVX`/`MOVC` are deliberately not moves here: their
    /// destinations go through a pointer, never a plain register.
    pub fn classify(mnemonic: &str) -> FlowClass {
        match mnemonic {
            "LCALL" | "ACALL" => FlowClass::Call,
            "LJMP" | "AJMP" | "SJMP" | "JMP" => FlowClass::Jump,
            "RET" | "RETI" => FlowClass::Return,
            "MOV" => FlowClass::Move,
            m if m.starts_with("CJ") || m.starts_with("DJ") || m.starts_with('J') => {
                FlowClass::CondJump
            }
            _ => FlowClass::Other,
        }
    }
}

/// One decoded instruction, as read from the listing.
///
/// Immutable once decoded; the analysis only ever reads these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insn {
    /// Address of the instruction
    pub addr: Address,
    /// Mnemonic as the listing spells it (e.g. "MOV", "LCALL")
    pub mnemonic: String,
    /// Control-flow classification of the mnemonic
    pub flow: FlowClass,
    /// Ordered result (destination) operands
    pub results: Vec<Operand>,
    /// Ordered input (source) operands
    pub inputs: Vec<Operand>,
}

impl Insn {
    /// Build an instruction, classifying its mnemonic.
    pub fn new(addr: Address, mnemonic: &str, results: Vec<Operand>, inputs: Vec<Operand>) -> Self {
        Self {
            addr,
            mnemonic: mnemonic.to_string(),
            flow: FlowClass::classify(mnemonic),
            results,
            inputs,
        }
    }

    /// True if a backward scan must stop at this instruction.
    ///
    /// Calls, jumps, and returns represent a distinct flow that does not
    /// guarantee the tracked value's lineage, so they cannot be crossed.
    pub fn is_scan_boundary(&self) -> bool {
        matches!(
            self.flow,
            FlowClass::Call | FlowClass::Jump | FlowClass::CondJump | FlowClass::Return
        )
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.addr, self.mnemonic)
    }
}

/// Kind of a cross-reference edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    UnconditionalCall,
    UnconditionalJump,
    ConditionalJump,
    /// Data read/write reference
    Data,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefKind::UnconditionalCall => write!(f, "call"),
            RefKind::UnconditionalJump => write!(f, "jump"),
            RefKind::ConditionalJump => write!(f, "cond-jump"),
            RefKind::Data => write!(f, "data"),
        }
    }
}

/// Provenance of a cross-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefSource {
    /// Inferred by the disassembler's own analysis
    Analysis,
    /// Synthesized by a tool or user
    UserDefined,
}

impl fmt::Display for RefSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefSource::Analysis => write!(f, "analysis"),
            RefSource::UserDefined => write!(f, "user-defined"),
        }
    }
}

/// A directed cross-reference between two addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reference {
    /// Referencing address
    pub from: Address,
    /// Referenced address
    pub to: Address,
    /// Edge kind
    pub kind: RefKind,
    /// Provenance
    pub source: RefSource,
    /// Primary references carry the listing's main flow edges
    pub primary: bool,
    /// Confidence weight
    pub weight: u32,
}

impl Reference {
    /// A synthesized data reference, as the xref synthesizer appends them.
    pub fn data(from: Address, to: Address) -> Self {
        Self {
            from,
            to,
            kind: RefKind::Data,
            source: RefSource::UserDefined,
            primary: false,
            weight: 1,
        }
    }

    /// Uniqueness key: references are unique per `(from, to, kind)`.
    pub fn key(&self) -> (Address, Address, RefKind) {
        (self.from, self.to, self.kind)
    }
}

/// A named location in the symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Symbol name
    pub name: String,
    /// Address the symbol labels
    pub addr: Address,
}

impl Symbol {
    /// Construct a symbol.
    pub fn new(name: &str, addr: Address) -> Self {
        Self {
            name: name.to_string(),
            addr,
        }
    }
}

/// Cooperative cancellation flag for long-running lookups.
///
/// Byte-pattern searches may walk the entire program; the caller can cancel
/// one without tearing down the whole batch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// A fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// The disassembly database seam.
///
/// Everything the analysis needs from the externally owned listing: reading
/// instructions, querying and appending references, symbol lookup, and the
/// executable-only byte-pattern search. The database is passed explicitly to
/// every component; there is exactly one logical writer and the analysis only
/// ever appends references.
pub trait ProgramDb {
    /// Instruction starting at `addr`, if one is decoded there.
    fn instruction_at(&self, addr: Address) -> Option<Insn>;

    /// Program-order predecessor of the instruction at `addr`.
    fn instruction_before(&self, addr: Address) -> Option<Insn>;

    /// All references whose destination is `addr`.
    fn references_to(&self, addr: Address) -> Vec<Reference>;

    /// Append a reference. Never removes or edits existing ones.
    fn add_reference(&mut self, reference: Reference);

    /// Exact symbol lookup.
    fn symbol_named(&self, name: &str) -> Option<Symbol>;

    /// All symbols whose name contains `pattern`.
    fn symbols_matching(&self, pattern: &str) -> Vec<Symbol>;

    /// Masked byte-pattern search over executable regions only.
    ///
    /// A position matches when `image[i + j] & mask[j] == pattern[j]` for
    /// every `j`. The search may be long-running and must honor `cancel`.
    fn search_bytes(
        &self,
        pattern: &[u8],
        mask: &[u8],
        cancel: &CancelToken,
    ) -> Result<Vec<Address>, AnalysisError>;
}

/// Error type for analysis operations.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// A named or pattern-located function could not be found
    #[error("failed to find \"{0}\" function")]
    LookupFailure(String),

    /// A long-running lookup was cancelled by the caller
    #[error("lookup cancelled")]
    Cancelled,

    /// A `REGION:hexoffset` string did not parse
    #[error("invalid region-qualified address: {0}")]
    AddressParse(String),

    /// JSON report serialization failed
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// CSV report serialization failed
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}
