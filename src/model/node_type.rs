//! # Node Type
//!
//! The schema of a node kind (spec §3 "Node type"). Node types are
//! immutable once registered into a [`crate::model::Module`]; node
//! instances reference them by qualified name.

use super::types::{DataType, NamedDataType};
use crate::diagnostic::DiagnosticRecord;
use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::debug_info::DIScope;
use inkwell::module::Module as LlvmModule;
use inkwell::values::{BasicValueEnum, FunctionValue, PointerValue};
use rustc_hash::FxHashMap;

/// Flags describing how a node type may be used in a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeTypeFlags {
    /// No execution ports; evaluated lazily per consumer (spec §3, §4.L).
    pub pure: bool,

    /// Pure, with exactly one data input and one data output. The editor
    /// uses this to draw the node as an implicit cast (ported from
    /// `NodeType.cpp`'s converter-validity assertion, see `SPEC_FULL.md` §3).
    pub converter: bool,
}

/// Everything the node compiler needs to emit one node's IR, handed to the
/// node type's codegen callback (spec §4.J "Per-node contract").
pub struct NodeCodegenArgs<'a, 'ctx> {
    /// The owning function's IR function.
    pub function: FunctionValue<'ctx>,

    /// Debug-info scope for this node (the enclosing function's subprogram).
    pub debug_scope: Option<DIScope<'ctx>>,

    /// IR builder, already positioned at this node's dedicated entry block.
    pub builder: &'a Builder<'ctx>,

    /// The shared LLVM module being compiled into, for node types (like
    /// `c`'s `func`) that need to look up a function linked in by another
    /// module's `emit_into_llvm_module`.
    pub llvm_module: &'a LlvmModule<'ctx>,

    /// One materialized value per data input, in declared order.
    pub inputs: &'a [BasicValueEnum<'ctx>],

    /// One output slot per data output, in declared order. The callback
    /// must store a value into each before returning.
    pub outputs: &'a mut [Option<BasicValueEnum<'ctx>>],

    /// One target block per execution output, in declared order. A
    /// single-exit node branches unconditionally to `exec_targets[0]`; a
    /// branching node selects among them; an exit node ignores this and
    /// emits a return instead.
    pub exec_targets: &'a [BasicBlock<'ctx>],

    /// The requesting node instance's opaque JSON payload (spec §6: node
    /// data forwarded to the node type's handler) — `set`/`get` read the
    /// variable name from here.
    pub node_data: &'a serde_json::Value,

    /// Local-variable stack slots, allocated once in the function's
    /// prologue block and keyed by declared name (spec §4.J "Local
    /// variables"); `set`/`get` index into this by the name in `node_data`.
    pub locals: &'a FxHashMap<String, PointerValue<'ctx>>,
}

/// The codegen contract a node type fulfills: given builder + materialized
/// inputs + output slots + branch targets, emit IR and a terminator.
pub type NodeCodegenFn<'ctx> =
    Box<dyn Fn(&mut NodeCodegenArgs<'_, 'ctx>) -> DiagnosticRecord + 'ctx>;

/// The schema of a node kind (spec §3 "Node type").
pub struct NodeType<'ctx> {
    owning_module: String,
    name: String,
    description: String,

    exec_inputs: Vec<String>,
    exec_outputs: Vec<String>,
    data_inputs: Vec<NamedDataType<'ctx>>,
    data_outputs: Vec<NamedDataType<'ctx>>,

    flags: NodeTypeFlags,
    codegen: NodeCodegenFn<'ctx>,
}

impl<'ctx> NodeType<'ctx> {
    /// Constructs a node type. `converter` implies `pure`, exactly one data
    /// input, and exactly one data output — mismatches panic at
    /// construction time since this is always a programming error in a
    /// built-in module (user-authored node types cannot set `converter`).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owning_module: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        exec_inputs: Vec<String>,
        exec_outputs: Vec<String>,
        data_inputs: Vec<NamedDataType<'ctx>>,
        data_outputs: Vec<NamedDataType<'ctx>>,
        flags: NodeTypeFlags,
        codegen: NodeCodegenFn<'ctx>,
    ) -> Self {
        if flags.converter {
            assert!(flags.pure, "a converter node type must also be pure");
            assert_eq!(data_inputs.len(), 1, "a converter node type must have exactly one data input");
            assert_eq!(data_outputs.len(), 1, "a converter node type must have exactly one data output");
        }
        if flags.pure {
            assert!(exec_inputs.is_empty(), "a pure node type cannot declare exec inputs");
            assert!(exec_outputs.is_empty(), "a pure node type cannot declare exec outputs");
        }

        Self {
            owning_module: owning_module.into(),
            name: name.into(),
            description: description.into(),
            exec_inputs,
            exec_outputs,
            data_inputs,
            data_outputs,
            flags,
            codegen,
        }
    }

    #[inline]
    pub fn owning_module(&self) -> &str {
        &self.owning_module
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[inline]
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.owning_module, self.name)
    }

    #[inline]
    pub fn exec_inputs(&self) -> &[String] {
        &self.exec_inputs
    }

    #[inline]
    pub fn exec_outputs(&self) -> &[String] {
        &self.exec_outputs
    }

    #[inline]
    pub fn data_inputs(&self) -> &[NamedDataType<'ctx>] {
        &self.data_inputs
    }

    #[inline]
    pub fn data_outputs(&self) -> &[NamedDataType<'ctx>] {
        &self.data_outputs
    }

    #[inline]
    pub fn flags(&self) -> NodeTypeFlags {
        self.flags
    }

    #[inline]
    pub fn is_pure(&self) -> bool {
        self.flags.pure
    }

    /// Invokes this node type's codegen contract.
    pub fn codegen(&self, args: &mut NodeCodegenArgs<'_, 'ctx>) -> DiagnosticRecord {
        (self.codegen)(args)
    }

    /// The `DataType` of the aggregate value this node type would produce
    /// if it had exactly one data output (used by `converter` nodes and by
    /// callers that only care about the "result type").
    pub fn sole_output_type(&self) -> Option<&DataType<'ctx>> {
        match self.data_outputs.as_slice() {
            [only] => Some(&only.ty),
            _ => None,
        }
    }
}

impl std::fmt::Debug for NodeType<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeType")
            .field("qualified_name", &self.qualified_name())
            .field("flags", &self.flags)
            .field("exec_inputs", &self.exec_inputs)
            .field("exec_outputs", &self.exec_outputs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "converter node type must also be pure")]
    fn converter_without_pure_panics() {
        let flags = NodeTypeFlags { pure: false, converter: true };
        let _ = NodeType::new(
            "lang",
            "bad",
            "",
            vec![],
            vec![],
            vec![],
            vec![],
            flags,
            Box::new(|_args| DiagnosticRecord::new()),
        );
    }

    #[test]
    #[should_panic(expected = "pure node type cannot declare exec")]
    fn pure_with_exec_ports_panics() {
        let flags = NodeTypeFlags { pure: true, converter: false };
        let _ = NodeType::new(
            "lang",
            "bad",
            "",
            vec!["in".to_string()],
            vec![],
            vec![],
            vec![],
            flags,
            Box::new(|_args| DiagnosticRecord::new()),
        );
    }
}
