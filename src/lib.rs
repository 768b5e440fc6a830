//! # Chigraph
//!
//! Compiles a visual flow-graph language to LLVM IR through `inkwell`.
//! A graph is organized into modules (`.chimod` JSON files, addressed by a
//! slash-separated path) that declare structs, functions, and dependencies
//! on other modules; a [`Context`] loads, caches, and compiles them.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────┐
//! │ .chimod JSON │
//! └──────┬───────┘
//!        │  json::populate_structs / populate_functions
//!        ▼
//! ┌──────────────┐
//! │ GraphModule  │  (struct/function model, node-instance arenas)
//! └──────┬───────┘
//!        │  validate::validate_function
//!        ▼
//! ┌──────────────┐
//! │  Validated   │
//! └──────┬───────┘
//!        │  codegen::function_compiler::compile_function
//!        ▼
//! ┌──────────────┐
//! │  LLVM IR     │
//! └──────────────┘
//! ```
//!
//! Results are accumulated, never short-circuited on the first problem, into
//! a [`diagnostic::DiagnosticRecord`] — see that module for the rendering
//! format errors and warnings are reported in.

pub mod builtins;
pub mod cache;
pub mod codegen;
pub mod context;
pub mod diagnostic;
pub mod error;
pub mod external;
pub mod graph_module;
pub mod json;
pub mod mangle;
pub mod model;
pub mod validate;
pub mod workspace;

pub use context::{CompileOptions, Context};
pub use diagnostic::{DiagnosticEntry, DiagnosticRecord, Severity};
pub use error::{ChiError, Result};
pub use graph_module::GraphModule;
pub use mangle::{mangle, unmangle, UnmangleError};
pub use model::{
    DataType, GraphFunction, GraphStruct, GraphStructError, LocalVariable, Module, NamedDataType,
    NodeCodegenArgs, NodeCodegenFn, NodeInstance, NodeType, NodeTypeFlags, PortRef, Position,
    StaticModule,
};
