//! Front end for a small expression language: `lexer` turns text into
//! tokens, `parser` builds the AST, `codegen` lowers it through an
//! `ir::IrBuilder`, and `toplevel` drives the whole thing one statement at
//! a time.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod lexer;
#[cfg(feature = "llvm")]
pub mod llvm;
pub mod logger;
pub mod parser;
pub mod token;
pub mod toplevel;

pub use error::{Error, ErrorKind, Result};
