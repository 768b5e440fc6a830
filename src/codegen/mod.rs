//! # Codegen
//!
//! Translates one validated [`crate::model::GraphFunction`] into LLVM IR
//! (spec §4.J/K/L). Split the way the spec's own design notes split it:
//!
//! - [`function_compiler`] (K) owns the function's signature, block layout,
//!   and node-execution order.
//! - [`node_compiler`] (J) drives one executed node's codegen callback,
//!   wiring its materialized inputs, output slots, and branch targets.
//! - [`pure_compiler`] (L) rematerializes a pure node's value on demand, once
//!   per consuming edge, with no caching across consumers.

pub mod function_compiler;
pub mod node_compiler;
pub mod pure_compiler;
