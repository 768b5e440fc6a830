//! # Pure Compiler
//!
//! Rematerializes a pure node's value on demand (spec §3, §4.L). Pure nodes
//! have no execution ports, so they are never scheduled in the exec-edge
//! topological order; instead every consuming edge recomputes the whole
//! pure subgraph feeding it, inline, in whichever block the caller's builder
//! is currently positioned at. Materialization is duplicated across
//! consumer blocks by design, but idempotent *within* one: `env.pure_cache`
//! memoizes each pure node's outputs for the current block, so two
//! references to the same pure ancestor inside one consumer block share a
//! single codegen call instead of emitting the same IR twice.

use uuid::Uuid;

use inkwell::values::BasicValueEnum;

use crate::diagnostic::DiagnosticRecord;
use crate::model::NodeCodegenArgs;

use super::node_compiler::FunctionEnv;

/// Computes `pure_node_id`'s `output_index`'th output, recursing into any
/// pure producers it itself reads from. Assumes `env.builder` is already
/// positioned at the block the result should be emitted into.
pub fn materialize<'ctx>(
    env: &mut FunctionEnv<'_, 'ctx>,
    pure_node_id: Uuid,
    output_index: usize,
) -> Result<BasicValueEnum<'ctx>, DiagnosticRecord> {
    if let Some(cached) = env.pure_cache.get(&(pure_node_id, output_index)) {
        return Ok(*cached);
    }

    let node = env
        .function
        .node(pure_node_id)
        .expect("resolved node id must exist in the function arena");
    let node_type_input_count = env.node_types[&pure_node_id].data_inputs().len();

    // Copy out the producer refs before recursing, so this borrow of
    // `env.function`/`env.node_types` ends before the recursive call needs
    // its own `&mut env`.
    let producers: Vec<_> = (0..node_type_input_count).map(|i| node.data_inputs()[i]).collect();

    let mut inputs = Vec::with_capacity(producers.len());
    for (input_index, producer) in producers.into_iter().enumerate() {
        let Some(producer) = producer else {
            return Err(DiagnosticRecord::error(
                "ECodegen",
                format!("pure node {pure_node_id} has an unconnected data input {input_index}"),
            ));
        };
        let value = if env.is_executed(producer.node) {
            env.executed_values.get(&(producer.node, producer.index)).copied().ok_or_else(|| {
                DiagnosticRecord::error(
                    "ECodegen",
                    format!("pure node {pure_node_id} reads {}'s output before it was compiled", producer.node),
                )
            })?
        } else {
            materialize(env, producer.node, producer.index)?
        };
        inputs.push(value);
    }

    let node = env
        .function
        .node(pure_node_id)
        .expect("resolved node id must exist in the function arena");
    let node_type = &env.node_types[&pure_node_id];
    let mut outputs: Vec<Option<BasicValueEnum<'ctx>>> = vec![None; node_type.data_outputs().len()];

    env.set_debug_location_for(pure_node_id);
    let record = {
        let mut args = NodeCodegenArgs {
            function: env.ir_function,
            debug_scope: env.debug_scope,
            builder: &env.builder,
            llvm_module: env.llvm_module,
            inputs: &inputs,
            outputs: &mut outputs,
            exec_targets: &[],
            node_data: &node.data,
            locals: &env.locals,
        };
        node_type.codegen(&mut args)
    };

    if !record.success() {
        return Err(record);
    }

    // One codegen call produces every output at once; memoize all of them
    // under this node so a later read of a different output index doesn't
    // re-invoke codegen either.
    for (index, value) in outputs.iter().enumerate() {
        if let Some(value) = value {
            env.pure_cache.insert((pure_node_id, index), *value);
        }
    }

    outputs[output_index].ok_or_else(|| {
        DiagnosticRecord::error("ECodegen", format!("pure node {pure_node_id} did not produce output {output_index}"))
    })
}

#[cfg(test)]
mod tests {
    // `materialize` is exercised end-to-end through a compiled function
    // (pure values only ever surface that way), since building a standalone
    // `FunctionEnv` requires the same IR function/module scaffolding those
    // tests already set up.

    use inkwell::context::Context as LlvmContext;
    use tempfile::tempdir;

    use crate::context::{CompileOptions, Context};

    fn write_module(root: &std::path::Path, full_name: &str, json: &str) {
        let path = root.join("src").join(format!("{full_name}.chimod"));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, json).unwrap();
    }

    #[test]
    fn a_shared_pure_ancestor_feeding_two_inputs_of_one_consumer_is_materialized_once() {
        let llvm_ctx = LlvmContext::create();
        let root = tempdir().unwrap();

        // dedup_within_block(i32 a -> i32 result): addA = a + a; mulB =
        // addA * addA — both of mulB's inputs read the same pure ancestor,
        // and mulB is itself read only once, by exit, so the whole
        // materialization happens inside a single consumer block. `add`
        // must appear exactly once in the emitted IR, not twice.
        let json = r#"{
            "dependencies": [],
            "types": {},
            "graphs": {
                "dedup_within_block": {
                    "type": "function",
                    "name": "dedup_within_block",
                    "data_inputs": [{"a": "lang:i32"}],
                    "data_outputs": [{"result": "lang:i32"}],
                    "exec_inputs": ["in"],
                    "exec_outputs": ["out"],
                    "local_variables": {},
                    "nodes": {
                        "11111111-1111-1111-1111-111111111111": {"type": "lang:entry", "location": [0,0], "data": null},
                        "22222222-2222-2222-2222-222222222222": {"type": "lang:exit", "location": [0,0], "data": null},
                        "33333333-3333-3333-3333-333333333333": {"type": "lang:add-i32", "location": [0,0], "data": null},
                        "44444444-4444-4444-4444-444444444444": {"type": "lang:mul-i32", "location": [0,0], "data": null}
                    },
                    "connections": [
                        {"type": "exec", "input": ["11111111-1111-1111-1111-111111111111", 0], "output": ["22222222-2222-2222-2222-222222222222", 0]},
                        {"type": "data", "input": ["11111111-1111-1111-1111-111111111111", 0], "output": ["33333333-3333-3333-3333-333333333333", 0]},
                        {"type": "data", "input": ["11111111-1111-1111-1111-111111111111", 0], "output": ["33333333-3333-3333-3333-333333333333", 1]},
                        {"type": "data", "input": ["33333333-3333-3333-3333-333333333333", 0], "output": ["44444444-4444-4444-4444-444444444444", 0]},
                        {"type": "data", "input": ["33333333-3333-3333-3333-333333333333", 0], "output": ["44444444-4444-4444-4444-444444444444", 1]},
                        {"type": "data", "input": ["44444444-4444-4444-4444-444444444444", 0], "output": ["22222222-2222-2222-2222-222222222222", 0]}
                    ]
                }
            }
        }"#;
        write_module(root.path(), "dedup_module", json);

        let mut ctx = Context::new(root.path(), &llvm_ctx);
        let (module, record) = ctx.compile_module("dedup_module", CompileOptions::default());
        assert!(record.success(), "{}", record.render());

        let module = module.unwrap();
        let mangled = crate::mangle::mangle("dedup_module", "dedup_within_block");
        let function = module.get_function(&mangled).expect("mangled function should exist");
        assert!(function.verify(true));

        let ir = module.print_to_string().to_string();
        let add_count = ir.matches(" = add i32 ").count();
        assert_eq!(add_count, 1, "shared pure ancestor must be materialized once per consumer block, got:\n{ir}");
        let mul_count = ir.matches(" = mul i32 ").count();
        assert_eq!(mul_count, 1, "expected one mul in:\n{ir}");
    }
}
