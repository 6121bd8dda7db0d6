//! Static instruction records
//!
//! Defines the immutable per-instruction metadata the binary decoder hands to
//! the engine: opcode classification, register/predicate operand lists, and
//! scoreboard barrier read/write/wait sets.

use serde::{Deserialize, Serialize};

/// Memory state space accessed by a memory-class instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemSpace {
    /// Device global memory
    Global,
    /// On-chip shared memory
    Shared,
    /// Thread-local (spill) memory
    Local,
    /// Constant cache
    Constant,
    /// Texture path
    Texture,
    /// Generic pointer (unresolved state space)
    Generic,
}

/// Opcode classification used by the latency model and the pruning pipeline
///
/// This is a closed set: different accelerator generations map the same
/// classes to different latency tables, never to different classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpClass {
    /// Integer ALU
    Integer,
    /// Single-precision floating point
    Float,
    /// Double-precision floating point
    Double,
    /// Predicate manipulation
    Predicate,
    /// Type/width conversion
    Convert,
    /// Branches, calls, returns, barriers
    Control,
    /// Memory access in a specific state space
    Memory(MemSpace),
    /// Anything the decoder could not classify
    Misc,
}

impl OpClass {
    /// True for any memory-class opcode
    #[must_use]
    pub const fn is_memory(self) -> bool {
        matches!(self, Self::Memory(_))
    }

    /// True for shared-memory accesses, which expose execution-dependency
    /// rather than memory-dependency stalls on their consumers
    #[must_use]
    pub const fn is_shared_memory(self) -> bool {
        matches!(self, Self::Memory(MemSpace::Shared))
    }

    /// Parse a decoder classification string
    ///
    /// Decoder boundary only; the engine itself never looks at strings.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "integer" => Self::Integer,
            "float" => Self::Float,
            "double" => Self::Double,
            "predicate" => Self::Predicate,
            "convert" | "conversion" => Self::Convert,
            "control" => Self::Control,
            "memory.global" => Self::Memory(MemSpace::Global),
            "memory.shared" => Self::Memory(MemSpace::Shared),
            "memory.local" => Self::Memory(MemSpace::Local),
            "memory.constant" => Self::Memory(MemSpace::Constant),
            "memory.texture" => Self::Memory(MemSpace::Texture),
            "memory.generic" => Self::Memory(MemSpace::Generic),
            "misc" | "other" => Self::Misc,
            _ => return None,
        })
    }
}

/// Identity of a dependence-carrying resource
///
/// A def of a `Value` by one instruction and a use of the same `Value` by a
/// later instruction is the raw material of the dependency graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    /// General-purpose register
    Register(u16),
    /// Predicate register
    Predicate(u16),
    /// Scoreboard barrier slot
    Barrier(u16),
}

/// One decoded machine instruction
///
/// Created once when the binary is decoded; read-only thereafter.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Instruction address
    pub pc: u64,
    /// Opcode classification
    pub op: OpClass,
    /// Destination general registers, in operand order
    pub dst_regs: Vec<u16>,
    /// Source general registers, in operand order
    pub src_regs: Vec<u16>,
    /// Destination predicate registers
    pub dst_preds: Vec<u16>,
    /// Source predicate registers
    pub src_preds: Vec<u16>,
    /// Scoreboard barriers this instruction writes (signals on completion)
    pub write_barriers: Vec<u16>,
    /// Scoreboard barriers this instruction reads (WAR protection)
    pub read_barriers: Vec<u16>,
    /// Bitmask of barrier indices this instruction blocks on before issue
    pub wait_mask: u64,
    /// Decoder hint: fixed issue-stall cycles encoded in the instruction
    pub issue_stall: u32,
}

impl Instruction {
    /// Create a bare instruction at `pc` with the given classification
    #[must_use]
    pub fn new(pc: u64, op: OpClass) -> Self {
        Self {
            pc,
            op,
            dst_regs: Vec::new(),
            src_regs: Vec::new(),
            dst_preds: Vec::new(),
            src_preds: Vec::new(),
            write_barriers: Vec::new(),
            read_barriers: Vec::new(),
            wait_mask: 0,
            issue_stall: 0,
        }
    }

    /// Add a destination general register
    #[must_use]
    pub fn def_reg(mut self, r: u16) -> Self {
        self.dst_regs.push(r);
        self
    }

    /// Add a source general register
    #[must_use]
    pub fn use_reg(mut self, r: u16) -> Self {
        self.src_regs.push(r);
        self
    }

    /// Add a destination predicate register
    #[must_use]
    pub fn def_pred(mut self, p: u16) -> Self {
        self.dst_preds.push(p);
        self
    }

    /// Add a source predicate register
    #[must_use]
    pub fn use_pred(mut self, p: u16) -> Self {
        self.src_preds.push(p);
        self
    }

    /// Mark a scoreboard barrier this instruction writes
    #[must_use]
    pub fn write_barrier(mut self, b: u16) -> Self {
        self.write_barriers.push(b);
        self
    }

    /// Mark a scoreboard barrier this instruction reads
    #[must_use]
    pub fn read_barrier(mut self, b: u16) -> Self {
        self.read_barriers.push(b);
        self
    }

    /// Block on a barrier index before issuing
    #[must_use]
    pub fn wait_on(mut self, b: u16) -> Self {
        self.wait_mask |= 1 << b;
        self
    }

    /// Set the decoder's fixed issue-stall hint
    #[must_use]
    pub fn with_issue_stall(mut self, cycles: u32) -> Self {
        self.issue_stall = cycles;
        self
    }

    /// All values this instruction defines
    ///
    /// Barrier writes and barrier reads both start a scoreboard that a later
    /// instruction can wait on, so both count as defs of the barrier value.
    pub fn defs(&self) -> impl Iterator<Item = Value> + '_ {
        self.dst_regs
            .iter()
            .map(|&r| Value::Register(r))
            .chain(self.dst_preds.iter().map(|&p| Value::Predicate(p)))
            .chain(self.write_barriers.iter().map(|&b| Value::Barrier(b)))
            .chain(self.read_barriers.iter().map(|&b| Value::Barrier(b)))
    }

    /// All values this instruction consumes
    pub fn uses(&self) -> impl Iterator<Item = Value> + '_ {
        self.src_regs
            .iter()
            .map(|&r| Value::Register(r))
            .chain(self.src_preds.iter().map(|&p| Value::Predicate(p)))
            .chain(
                (0..64)
                    .filter(move |b| self.wait_mask & (1 << b) != 0)
                    .map(|b| Value::Barrier(b as u16)),
            )
    }

    /// Does this instruction define `v`?
    #[must_use]
    pub fn defines(&self, v: Value) -> bool {
        match v {
            Value::Register(r) => self.dst_regs.contains(&r),
            Value::Predicate(p) => self.dst_preds.contains(&p),
            Value::Barrier(b) => {
                self.write_barriers.contains(&b) || self.read_barriers.contains(&b)
            }
        }
    }

    /// Does this instruction block on barrier index `b`?
    #[must_use]
    pub const fn waits_on(&self, b: u16) -> bool {
        self.wait_mask & (1 << b) != 0
    }

    /// Does this instruction touch any scoreboard barrier (write or read)?
    #[must_use]
    pub fn touches_barrier(&self) -> bool {
        !self.write_barriers.is_empty() || !self.read_barriers.is_empty()
    }
}
