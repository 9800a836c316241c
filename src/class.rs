//! The class AST handed over by the external class-file parser.
//!
//! Names and descriptors are already resolved to strings, and bytecode is
//! already decoded into [`Instruction`]s tagged with their byte offset.

mod builder;
mod instruction;
mod structs;

pub use builder::*;
pub use instruction::*;
pub use structs::*;
