//! Query compilation: typed inline parameters, script section extraction,
//! the aggregate script compiler, and the per-person interpreter.
//!
//! The compiler sits behind [`QueryCompiler`] so a richer script engine can
//! slot in; the built-in [`ScriptCompiler`] covers the aggregate surface the
//! coordinator and the endpoint loops execute.

pub mod compile;
pub mod interp;
pub mod params;
pub mod sections;

pub use compile::{
    disassemble, ColumnVar, CompiledQuery, Filter, FilterOp, QueryCompiler, ScriptCompiler,
};
pub use interp::Interpreter;
pub use params::{inline_params, ParamValue, ParamVars};
pub use sections::{extract_sections, Section};
