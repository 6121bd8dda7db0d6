//! Static kernel model
//!
//! The read-only program representation the binary decoder hands to the
//! engine: instructions with operand and scoreboard metadata
//! ([`instruction`]) and the block/function control-flow graph ([`cfg`]).

pub mod cfg;
pub mod instruction;

pub use cfg::{Block, BlockId, EdgeKind, Function, FunctionId, Location, Program};
pub use instruction::{Instruction, MemSpace, OpClass, Value};
