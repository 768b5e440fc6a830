//! # Node Compiler
//!
//! Drives one executed node's codegen callback (spec §4.J). By the time
//! [`compile_node`] runs, the node's dedicated entry block already exists and
//! every predecessor post-pure block has stored this node's pure-sourced
//! data inputs into their shared stack slots (spec §4.K "Block layout") —
//! this module only has to gather the materialized inputs, hand them to the
//! node type, and cache the outputs it produces.

use std::collections::HashMap;

use inkwell::basic_block::BasicBlock;
use inkwell::values::{BasicValueEnum, PointerValue};
use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::context::Context;
use crate::diagnostic::DiagnosticRecord;
use crate::model::{GraphFunction, NodeCodegenArgs, NodeType};

/// Everything shared across one function's node-by-node codegen pass.
/// Built once by `function_compiler`, threaded through every call into
/// [`compile_node`] and [`crate::codegen::pure_compiler::materialize`].
pub struct FunctionEnv<'a, 'ctx> {
    pub ctx: &'a Context<'ctx>,
    pub llvm_module: &'a inkwell::module::Module<'ctx>,
    pub function: &'a GraphFunction<'ctx>,
    pub ir_function: inkwell::values::FunctionValue<'ctx>,
    pub builder: inkwell::builder::Builder<'ctx>,
    pub debug_scope: Option<inkwell::debug_info::DIScope<'ctx>>,

    /// The subprogram's debug-info builder, kept alive (and unfinalized)
    /// for the whole compile so per-node [`FunctionEnv::set_debug_location_for`]
    /// calls can keep creating `DILocation`s; `None` when `debug` wasn't
    /// requested for this compile.
    pub dibuilder: Option<inkwell::debug_info::DebugInfoBuilder<'ctx>>,

    /// Every node instance's resolved node type, including entry/exit.
    pub node_types: HashMap<Uuid, NodeType<'ctx>>,

    /// Local-variable stack slots, keyed by declared name.
    pub locals: FxHashMap<String, PointerValue<'ctx>>,

    /// This node's dedicated, shared codegen block.
    pub entry_blocks: HashMap<Uuid, BasicBlock<'ctx>>,

    /// Per-node, per-exec-output-index branch target, resolved from the
    /// edge's consumer's post-pure block (or the trap block if unconnected).
    pub exec_targets: HashMap<Uuid, Vec<BasicBlock<'ctx>>>,

    /// Cached SSA value per `(executedNode, outputIndex)` — safe to read
    /// directly since the validator guarantees the producer dominates every
    /// use (spec §3 invariant 3).
    pub executed_values: HashMap<(Uuid, usize), BasicValueEnum<'ctx>>,

    /// Per-`(consumer, inputIndex)` stack slot for a pure-sourced data
    /// input, written once per incoming exec edge and read uniformly here.
    pub pure_slots: HashMap<(Uuid, usize), PointerValue<'ctx>>,

    /// Memo of already-materialized pure values for the post-pure block the
    /// builder is currently emitting into, keyed by `(pureNode,
    /// outputIndex)` (spec §4.L "idempotent within one consumer block").
    /// Cleared at the start of every new post-pure block so materialization
    /// is still duplicated across blocks, only deduplicated within one.
    pub pure_cache: HashMap<(Uuid, usize), BasicValueEnum<'ctx>>,

    pub trap_block: BasicBlock<'ctx>,
}

impl<'a, 'ctx> FunctionEnv<'a, 'ctx> {
    pub fn node_type(&self, id: Uuid) -> &NodeType<'ctx> {
        &self.node_types[&id]
    }

    pub fn is_executed(&self, id: Uuid) -> bool {
        !self.node_types[&id].is_pure()
    }

    /// Points the builder's debug location at `node_id`'s synthetic source
    /// position ahead of emitting its IR: line is a stable hash of the
    /// node's UUID, column is always zero (spec §4.J). A no-op when `debug`
    /// wasn't requested for this compile.
    pub fn set_debug_location_for(&self, node_id: Uuid) {
        let (Some(scope), Some(dibuilder)) = (self.debug_scope, &self.dibuilder) else {
            return;
        };
        let location = dibuilder.create_debug_location(self.ctx.llvm_context(), stable_debug_line(node_id), 0, scope, None);
        self.builder.set_current_debug_location(location);
    }
}

/// Hashes a node's UUID down to a small, stable, strictly-positive line
/// number — the same node always maps to the same synthetic line across
/// recompiles, without needing a real source file to point at.
fn stable_debug_line(id: Uuid) -> u32 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    id.hash(&mut hasher);
    (hasher.finish() % 1_000_000) as u32 + 1
}

/// Emits one executed node's IR: positions the builder at its entry block,
/// gathers its materialized data inputs, invokes the node type's codegen
/// callback, and caches every produced output.
pub fn compile_node(env: &mut FunctionEnv<'_, '_>, node_id: Uuid) -> DiagnosticRecord {
    let entry_block = env.entry_blocks[&node_id];
    env.builder.position_at_end(entry_block);
    env.set_debug_location_for(node_id);

    let node = env.function.node(node_id).expect("resolved node id must exist in the function arena");
    let node_type = &env.node_types[&node_id];

    let mut inputs = Vec::with_capacity(node_type.data_inputs().len());
    for input_index in 0..node_type.data_inputs().len() {
        match load_input_value(env, node_id, input_index) {
            Ok(value) => inputs.push(value),
            Err(record) => return record,
        }
    }

    let mut outputs: Vec<Option<BasicValueEnum<'_>>> = vec![None; node_type.data_outputs().len()];
    let exec_targets = env.exec_targets.get(&node_id).cloned().unwrap_or_default();

    let mut record = {
        let mut args = NodeCodegenArgs {
            function: env.ir_function,
            debug_scope: env.debug_scope,
            builder: &env.builder,
            llvm_module: env.llvm_module,
            inputs: &inputs,
            outputs: &mut outputs,
            exec_targets: &exec_targets,
            node_data: &node.data,
            locals: &env.locals,
        };
        env.node_types[&node_id].codegen(&mut args)
    };

    if !record.success() {
        return record;
    }

    for (output_index, value) in outputs.into_iter().enumerate() {
        match value {
            Some(value) => {
                env.executed_values.insert((node_id, output_index), value);
            }
            None => record.push(
                "ECodegen",
                format!("node {node_id} did not produce output {output_index}"),
                serde_json::json!({ "node": node_id }),
            ),
        }
    }

    record
}

/// Reads one data input's materialized value: either the producer's cached
/// SSA value (executed producer) or a load from this input's shared pure
/// slot (pure producer, written by every incoming post-pure block).
fn load_input_value(
    env: &FunctionEnv<'_, '_>,
    consumer_id: Uuid,
    input_index: usize,
) -> Result<BasicValueEnum<'_>, DiagnosticRecord> {
    let node = env.function.node(consumer_id).expect("resolved node id must exist in the function arena");
    let Some(producer) = node.data_inputs()[input_index] else {
        return Err(DiagnosticRecord::error(
            "ECodegen",
            format!("node {consumer_id} has an unconnected data input {input_index}"),
        ));
    };

    if env.is_executed(producer.node) {
        env.executed_values
            .get(&(producer.node, producer.index))
            .copied()
            .ok_or_else(|| {
                DiagnosticRecord::error(
                    "ECodegen",
                    format!("node {consumer_id} reads {}'s output before it was compiled", producer.node),
                )
            })
    } else {
        let slot = env.pure_slots.get(&(consumer_id, input_index)).ok_or_else(|| {
            DiagnosticRecord::error("ECodegen", format!("no pure slot reserved for {consumer_id} input {input_index}"))
        })?;
        let Some(elem_ty) = env.node_types[&producer.node].data_outputs()[producer.index].ty.llvm_type() else {
            return Err(DiagnosticRecord::error("ECodegen", "pure input's type has no resolved LLVM type"));
        };
        env.builder
            .build_load(elem_ty, *slot, "pure_in")
            .map_err(|e| DiagnosticRecord::error("ECodegen", format!("loading pure input: {e}")))
    }
}
