//! Type definitions for the interpreter
//!
//! This module contains all the core types used by the parser and interpreter:
//! - AST types (Stmt, Expr, Program)
//! - Runtime values (Value)
//! - Control flow and results (Flow, WorkflowResult, ExecutionReport)

pub mod ast;
pub mod control;
pub mod values;

pub use ast::{Expr, Program, Span, Stmt};
pub use control::{ExecutionReport, Flow, WorkflowResult};
pub use values::Value;
