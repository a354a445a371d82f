//! Bytecode compiler: AST → opcode array, constant pool, register count and
//! subroutine table.
//!
//! Not an optimising compiler. Its jobs are register allocation and the
//! mandatory superinstruction fusion, plus splitting subroutines that exceed
//! the per-subroutine bytecode budget into tail-called helpers.

pub mod ast;
mod emit;
mod peephole;

pub use ast::{BinOp, CompileUnit, Expr, Stmt, SubDef, UnOp};

use crate::error::CompileError;
use crate::program::Program;

/// Compile a unit into a verified [`Program`].
pub fn compile(unit: &CompileUnit) -> Result<Program, CompileError> {
    emit::compile(unit)
}
