use std::sync::Arc;

mod constant_pool;

pub use constant_pool::*;

use super::Instruction;
use crate::consts::{ClassAccessFlag, FieldAccessFlag, MethodAccessFlag};

#[derive(Debug, Clone)]
pub struct ClassAst {
    pub name: Arc<str>,
    /// `None` only for `java/lang/Object`.
    pub super_class: Option<Arc<str>>,
    pub interfaces: Vec<Arc<str>>,
    pub access_flags: ClassAccessFlag,
    /// Indexed from 1, as in the class file.
    pub constant_pool: Vec<ConstantPoolInfo>,
    pub fields: Vec<FieldAst>,
    pub methods: Vec<MethodAst>,
    pub source_file: Option<Arc<str>>,
}

impl ClassAst {
    pub fn constant(&self, index: u16) -> Option<&ConstantPoolInfo> {
        let index = index.checked_sub(1)?;
        self.constant_pool.get(index as usize)
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlag::INTERFACE)
    }
}

#[derive(Debug, Clone)]
pub struct FieldAst {
    pub access_flags: FieldAccessFlag,
    pub name: Arc<str>,
    pub descriptor: Arc<str>,
    /// Constant pool index of a `ConstantValue` attribute.
    pub constant_value: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct MethodAst {
    pub access_flags: MethodAccessFlag,
    pub name: Arc<str>,
    pub descriptor: Arc<str>,
    pub code: Option<CodeAst>,
}

#[derive(Debug, Clone)]
pub struct CodeAst {
    pub max_stack: u16,
    pub max_locals: u16,
    /// Decoded instructions with their bytecode offset, in ascending offset order.
    pub instructions: Vec<(u32, Instruction)>,
    pub exception_table: Vec<ExceptionTableItem>,
    pub line_numbers: Vec<LineNumber>,
}

impl CodeAst {
    /// Lays `instructions` out one offset apart, so branch targets and
    /// exception ranges are plain instruction indices.
    pub fn new(max_stack: u16, max_locals: u16, instructions: Vec<Instruction>) -> Self {
        let instructions = instructions
            .into_iter()
            .enumerate()
            .map(|(i, inst)| (i as u32, inst))
            .collect();
        Self::with_offsets(max_stack, max_locals, instructions)
    }

    pub fn with_offsets(
        max_stack: u16,
        max_locals: u16,
        instructions: Vec<(u32, Instruction)>,
    ) -> Self {
        Self {
            max_stack,
            max_locals,
            instructions,
            exception_table: vec![],
            line_numbers: vec![],
        }
    }

    /// `catch_type` 0 matches any throwable.
    pub fn handler(mut self, start_pc: u32, end_pc: u32, handler_pc: u32, catch_type: u16) -> Self {
        self.exception_table.push(ExceptionTableItem {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        });
        self
    }

    pub fn line(mut self, start_pc: u32, line_number: u16) -> Self {
        self.line_numbers.push(LineNumber {
            start_pc,
            line_number,
        });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionTableItem {
    pub start_pc: u32,
    pub end_pc: u32,
    pub handler_pc: u32,
    pub catch_type: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u32,
    pub line_number: u16,
}
