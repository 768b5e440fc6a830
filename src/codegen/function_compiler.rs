//! # Function Compiler
//!
//! Lays out one [`GraphFunction`]'s IR (spec §4.K). Builds the LLVM
//! signature, pre-allocates one dedicated entry block per executed node plus
//! one "post-pure" predecessor block per incoming exec edge, walks the exec
//! graph in topological order driving [`node_compiler::compile_node`], and
//! verifies the resulting `FunctionValue` before returning.
//!
//! ## Block layout
//!
//! Every executed node gets exactly one shared entry block, regardless of
//! how many exec edges feed it — this is what keeps the design phi-free
//! (spec §4.L): a pure-sourced data input is recomputed and stored into a
//! per-`(consumer, input)` stack slot inside each post-pure predecessor
//! block, then loaded back, identically, the one time the shared entry
//! block runs. An executed-sourced input skips the stack slot entirely and
//! is read straight out of a cached SSA value, since the validator
//! (invariant 3) guarantees the producer dominates every use.
//!
//! Functions with more than one function-level exec-input or exec-output
//! label are represented structurally (the names round-trip through JSON),
//! but only the single-entry/single-exit wiring this spec's scenarios
//! exercise is compiled — see `DESIGN.md`.

use std::collections::{HashMap, HashSet, VecDeque};

use inkwell::debug_info::{DWARFEmissionKind, DWARFSourceLanguage};
use inkwell::module::Module as LlvmModule;
use inkwell::types::BasicMetadataTypeEnum;
use inkwell::values::PointerValue;
use inkwell::AddressSpace;
use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::builtins::lang;
use crate::context::Context;
use crate::diagnostic::DiagnosticRecord;
use crate::error::ChiError;
use crate::model::{GraphFunction, NodeType};
use crate::validate::validate_function;

use super::node_compiler::{self, FunctionEnv};

/// Compiles `function` (declared in `module_full_name`) into `llvm_module`.
pub fn compile_function<'ctx>(
    ctx: &Context<'ctx>,
    llvm_module: &LlvmModule<'ctx>,
    module_full_name: &str,
    function: &GraphFunction<'ctx>,
    debug: bool,
) -> DiagnosticRecord {
    let mut record = validate_function(function);
    if !record.success() {
        return record;
    }

    let llvm_ctx = ctx.llvm_context();

    let (mut node_types, type_record) = resolve_node_types(ctx, function);
    record.extend(type_record);
    if !record.success() {
        return record;
    }

    let param_offset = 0usize;
    let out_param_offset = function.data_inputs().len();
    node_types.insert(function.entry_node(), lang::entry_node_type(function.data_outputs().to_vec(), param_offset));
    for &exit_id in function.exit_nodes() {
        node_types.insert(exit_id, lang::exit_node_type(function.data_inputs().to_vec(), out_param_offset));
    }

    let (fn_type, out_types_ok) = build_signature(llvm_ctx, function, &mut record);
    if !out_types_ok {
        return record;
    }

    let mangled = crate::mangle::mangle(module_full_name, function.name());
    let ir_function = llvm_module.add_function(&mangled, fn_type, None);

    let (debug_scope, dibuilder) = if debug {
        match create_subprogram(llvm_module, &ir_function, module_full_name, function.name()) {
            Some((scope, dibuilder)) => (Some(scope), Some(dibuilder)),
            None => (None, None),
        }
    } else {
        (None, None)
    };

    let executed: HashSet<Uuid> =
        node_types.iter().filter(|(_, nt)| !nt.is_pure()).map(|(&id, _)| id).collect();

    let prologue = llvm_ctx.append_basic_block(ir_function, "prologue");
    let trap_block = llvm_ctx.append_basic_block(ir_function, "trap");
    let builder = llvm_ctx.create_builder();

    let mut entry_blocks = HashMap::new();
    for &id in &executed {
        entry_blocks.insert(id, llvm_ctx.append_basic_block(ir_function, &format!("n{id}")));
    }

    builder.position_at_end(trap_block);
    if let Err(e) = builder.build_unreachable() {
        record.push("ECodegen", format!("building trap block: {e}"), serde_json::Value::Null);
        return record;
    }

    // Every alloca — locals and pure-input slots alike — lives in the
    // prologue block, which runs exactly once per call; a per-node block
    // can re-run inside a loop, and an alloca there would grow the stack on
    // every iteration instead of reusing one slot.
    builder.position_at_end(prologue);
    let locals = match build_locals(&builder, function) {
        Ok(locals) => locals,
        Err(e) => {
            record.extend(e);
            return record;
        }
    };

    // One post-pure predecessor block per incoming exec edge, keyed by the
    // edge's producer/output so the producer's own exec_targets map can
    // find it.
    let mut edge_blocks: HashMap<(Uuid, usize), inkwell::basic_block::BasicBlock<'ctx>> = HashMap::new();
    for &id in &executed {
        if id == function.entry_node() {
            continue;
        }
        let node = function.node(id).expect("executed id must be in the function arena");
        for producers in node.exec_inputs() {
            for producer in producers {
                edge_blocks.entry((producer.node, producer.index)).or_insert_with(|| {
                    llvm_ctx.append_basic_block(ir_function, &format!("pp{}_{}", producer.node, producer.index))
                });
            }
        }
    }

    let exec_targets = build_exec_targets(function, &executed, &edge_blocks, trap_block);

    let mut env = FunctionEnv {
        ctx,
        llvm_module,
        function,
        ir_function,
        builder,
        debug_scope,
        node_types,
        locals,
        entry_blocks,
        exec_targets,
        executed_values: HashMap::new(),
        pure_slots: HashMap::new(),
        pure_cache: HashMap::new(),
        dibuilder,
        trap_block,
    };

    env.builder.position_at_end(prologue);
    if let Err(e) = allocate_pure_slots(&mut env, &executed, prologue) {
        record.extend(e);
        return record;
    }

    env.builder.position_at_end(prologue);
    let entry_block = env.entry_blocks[&function.entry_node()];
    if let Err(e) = env.builder.build_unconditional_branch(entry_block) {
        record.push("ECodegen", format!("building prologue branch: {e}"), serde_json::Value::Null);
        return record;
    }

    for (&(producer_node, producer_index), &block) in &edge_blocks {
        env.builder.position_at_end(block);
        let consumer = edge_consumer(function, producer_node, producer_index);
        if let Some(consumer_id) = consumer {
            if let Err(e) = populate_post_pure_block(&mut env, consumer_id) {
                record.extend(e);
                return record;
            }
        }
        let target = env.entry_blocks[&consumer.unwrap_or(function.entry_node())];
        if let Err(e) = env.builder.build_unconditional_branch(target) {
            record.push("ECodegen", format!("branching out of post-pure block: {e}"), serde_json::Value::Null);
            return record;
        }
    }

    let order = topological_order(function, &executed);
    for id in order {
        record.extend(node_compiler::compile_node(&mut env, id));
        if !record.success() {
            return record;
        }
    }

    if let Some(dibuilder) = &env.dibuilder {
        dibuilder.finalize();
    }

    if !env.ir_function.verify(false) {
        record.extend(DiagnosticRecord::from(ChiError::IrVerify(function.name().to_string())));
    }

    record
}

/// Resolves every non-entry/exit node instance's node type up front.
fn resolve_node_types<'ctx>(
    ctx: &Context<'ctx>,
    function: &GraphFunction<'ctx>,
) -> (HashMap<Uuid, NodeType<'ctx>>, DiagnosticRecord) {
    let mut record = DiagnosticRecord::new();
    let mut node_types = HashMap::new();

    for (&id, instance) in function.nodes() {
        if id == function.entry_node() || function.exit_nodes().contains(&id) {
            continue;
        }
        let Some((module_name, type_name)) = instance.node_type().split_once(':') else {
            record.push(
                "ENodeType",
                format!("malformed node type name {:?} on node {id}", instance.node_type()),
                serde_json::json!({ "node": id }),
            );
            continue;
        };
        match ctx.node_type(module_name, type_name, &instance.data) {
            Ok(node_type) => {
                node_types.insert(id, node_type);
            }
            Err(e) => record.extend(DiagnosticRecord::from(e)),
        }
    }

    (node_types, record)
}

/// Builds the `void(dataInputs..., dataOutputs as out-pointers...)` LLVM
/// signature (spec §4.K step 1), returning `false` in the second slot (and
/// appending error diagnostics) if a port's type has no resolved LLVM type.
fn build_signature<'ctx>(
    llvm_ctx: &'ctx inkwell::context::Context,
    function: &GraphFunction<'ctx>,
    record: &mut DiagnosticRecord,
) -> (inkwell::types::FunctionType<'ctx>, bool) {
    let mut ok = true;
    let mut param_types: Vec<BasicMetadataTypeEnum<'ctx>> = Vec::new();

    for input in function.data_inputs() {
        match input.ty.llvm_type() {
            Some(ty) => param_types.push(ty.into()),
            None => {
                record.push(
                    "ETypeNotResolved",
                    format!("data input {:?} has no resolved LLVM type", input.name),
                    serde_json::Value::Null,
                );
                ok = false;
            }
        }
    }

    let ptr_ty = llvm_ctx.ptr_type(AddressSpace::default());
    for _ in function.data_outputs() {
        param_types.push(ptr_ty.into());
    }

    (llvm_ctx.void_type().fn_type(&param_types, false), ok)
}

fn create_subprogram<'ctx>(
    llvm_module: &LlvmModule<'ctx>,
    ir_function: &inkwell::values::FunctionValue<'ctx>,
    module_full_name: &str,
    function_name: &str,
) -> Option<(inkwell::debug_info::DIScope<'ctx>, inkwell::debug_info::DebugInfoBuilder<'ctx>)> {
    let file_name = format!("{module_full_name}.chimod");
    let (dibuilder, compile_unit) = llvm_module.create_debug_info_builder(
        true,
        DWARFSourceLanguage::C,
        &file_name,
        ".",
        "chigraph",
        false,
        "",
        0,
        "",
        DWARFEmissionKind::Full,
        0,
        false,
        false,
        "",
        "",
    );

    let di_file = compile_unit.get_file();
    let subroutine_type = dibuilder.create_subroutine_type(di_file, None, &[], 0);
    let subprogram = dibuilder.create_function(
        compile_unit.as_debug_info_scope(),
        function_name,
        None,
        di_file,
        1,
        subroutine_type,
        false,
        true,
        1,
        0,
        false,
    );
    ir_function.set_subprogram(subprogram);
    // Not finalized here — node-level debug locations (set while codegen
    // walks the function) still need to be created through `dibuilder`;
    // the caller finalizes once every node has been emitted.
    Some((subprogram.as_debug_info_scope(), dibuilder))
}

/// Allocates one stack slot per declared local variable in the prologue
/// block (spec §4.J "Local variables").
fn build_locals<'ctx>(
    builder: &inkwell::builder::Builder<'ctx>,
    function: &GraphFunction<'ctx>,
) -> Result<FxHashMap<String, PointerValue<'ctx>>, DiagnosticRecord> {
    let mut locals = FxHashMap::default();
    for var in function.local_variables() {
        let Some(ty) = var.ty.llvm_type() else {
            return Err(DiagnosticRecord::error(
                "ETypeNotResolved",
                format!("local variable {} has no resolved LLVM type", var.name),
            ));
        };
        match builder.build_alloca(ty, &var.name) {
            Ok(slot) => {
                locals.insert(var.name.clone(), slot);
            }
            Err(e) => return Err(DiagnosticRecord::error("ECodegen", format!("allocating local {}: {e}", var.name))),
        }
    }
    Ok(locals)
}

/// Allocates one stack slot per `(consumer, inputIndex)` pair whose
/// producer is pure, across every executed node (spec §4.L).
fn allocate_pure_slots<'ctx>(
    env: &mut FunctionEnv<'_, 'ctx>,
    executed: &HashSet<Uuid>,
    prologue: inkwell::basic_block::BasicBlock<'ctx>,
) -> Result<(), DiagnosticRecord> {
    let mut slots = HashMap::new();
    for &id in executed {
        let node = env.function.node(id).expect("executed id must be in the function arena");
        let node_type = &env.node_types[&id];
        for input_index in 0..node_type.data_inputs().len() {
            let Some(producer) = node.data_inputs()[input_index] else { continue };
            if env.is_executed(producer.node) {
                continue;
            }
            let Some(elem_ty) = env.node_types[&producer.node].data_outputs()[producer.index].ty.llvm_type() else {
                return Err(DiagnosticRecord::error(
                    "ETypeNotResolved",
                    format!("pure producer feeding node {id} input {input_index} has no resolved LLVM type"),
                ));
            };
            env.builder.position_at_end(prologue);
            match env.builder.build_alloca(elem_ty, &format!("pure_slot_{id}_{input_index}")) {
                Ok(slot) => {
                    slots.insert((id, input_index), slot);
                }
                Err(e) => return Err(DiagnosticRecord::error("ECodegen", format!("allocating pure slot: {e}"))),
            }
        }
    }
    env.pure_slots = slots;
    Ok(())
}

/// The node that owns `exec_inputs()` slot containing `(producer, output)`.
fn edge_consumer(function: &GraphFunction<'_>, producer: Uuid, output_index: usize) -> Option<Uuid> {
    function.node(producer)?.exec_outputs().get(output_index).copied().flatten().map(|c| c.node)
}

/// Stores every pure-sourced data input feeding `consumer_id` into its
/// shared slot, computed fresh in whatever block `env.builder` currently
/// points at (one of `consumer_id`'s post-pure predecessor blocks).
fn populate_post_pure_block(env: &mut FunctionEnv<'_, '_>, consumer_id: Uuid) -> Result<(), DiagnosticRecord> {
    env.pure_cache.clear();

    let node = env.function.node(consumer_id).expect("consumer id must be in the function arena");
    let node_type_input_count = env.node_types[&consumer_id].data_inputs().len();
    let producers: Vec<_> = (0..node_type_input_count).map(|i| node.data_inputs()[i]).collect();

    for (input_index, producer) in producers.into_iter().enumerate() {
        let Some(producer) = producer else { continue };
        if env.is_executed(producer.node) {
            continue;
        }
        let value = super::pure_compiler::materialize(env, producer.node, producer.index)?;
        let slot = env.pure_slots[&(consumer_id, input_index)];
        env.builder
            .build_store(slot, value)
            .map_err(|e| DiagnosticRecord::error("ECodegen", format!("storing pure input: {e}")))?;
    }
    Ok(())
}

/// Per-node, per-exec-output-index branch target: the target node's entry
/// block if the output feeds a post-pure block directly reachable from the
/// entry node's own prologue wiring, else the edge's dedicated post-pure
/// block, else the trap block for an unconnected output.
fn build_exec_targets<'ctx>(
    function: &GraphFunction<'ctx>,
    executed: &HashSet<Uuid>,
    edge_blocks: &HashMap<(Uuid, usize), inkwell::basic_block::BasicBlock<'ctx>>,
    trap_block: inkwell::basic_block::BasicBlock<'ctx>,
) -> HashMap<Uuid, Vec<inkwell::basic_block::BasicBlock<'ctx>>> {
    let mut map = HashMap::new();
    for &id in executed {
        let node = function.node(id).expect("executed id must be in the function arena");
        let mut targets = Vec::with_capacity(node.exec_outputs().len());
        for (output_index, _) in node.exec_outputs().iter().enumerate() {
            let target = edge_blocks.get(&(id, output_index)).copied().unwrap_or(trap_block);
            targets.push(target);
        }
        map.insert(id, targets);
    }
    map
}

/// A breadth-first walk of the exec-edge subgraph of executed nodes,
/// starting from the function's entry node — every node the validator
/// confirmed is reachable from entry gets ordered before any node it
/// points at. Any nodes left unreached (a cycle not rooted at entry) are
/// appended afterward in arbitrary order (spec: "break arbitrarily").
fn topological_order(function: &GraphFunction<'_>, executed: &HashSet<Uuid>) -> Vec<Uuid> {
    let mut queue: VecDeque<Uuid> = VecDeque::new();
    queue.push_back(function.entry_node());
    let mut visited: HashSet<Uuid> = HashSet::new();
    let mut order = Vec::with_capacity(executed.len());

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        order.push(id);
        let node = function.node(id).expect("executed id must be in the function arena");
        for consumer in node.exec_outputs().iter().flatten() {
            if !visited.contains(&consumer.node) {
                queue.push_back(consumer.node);
            }
        }
    }

    for &id in executed {
        if !visited.contains(&id) {
            order.push(id);
        }
    }

    order
}
