//! # JSON Serializer
//!
//! Canonical round-trip between the graph model and the module JSON format
//! (spec §6). Unknown top-level keys and unknown per-node keys are carried
//! through rather than discarded — preserved on the graph's and struct's
//! `extra` maps and the node instance's `data` payload respectively.

use std::collections::HashMap;

use uuid::Uuid;

use crate::context::Context;
use crate::error::{ChiError, Result};
use crate::graph_module::GraphModule;
use crate::model::{
    DataType, GraphFunction, GraphStruct, Module, NamedDataType, NodeInstance, Position,
};

/// Reads the top-level `"dependencies"` array, the only thing a module must
/// know about itself before its own dependencies are loaded.
pub fn read_dependencies(raw: &serde_json::Value) -> Result<Vec<String>> {
    match raw.get("dependencies") {
        None => Ok(Vec::new()),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(|| ChiError::Parse("dependencies entries must be strings".to_string())))
            .collect(),
        Some(_) => Err(ChiError::Parse("\"dependencies\" must be an array".to_string())),
    }
}

/// Resolves a `"<module>:<name>"` qualified type name, checking the
/// in-progress module (for self-referencing struct fields and signatures)
/// before falling back to the context's already-loaded modules.
fn resolve_qualified_type<'ctx>(
    ctx: &Context<'ctx>,
    in_progress: &GraphModule<'ctx>,
    qualified: &str,
) -> Result<DataType<'ctx>> {
    let (module_name, type_name) =
        DataType::split_qualified_name(qualified).ok_or_else(|| ChiError::Parse(format!("malformed qualified type name: {qualified:?}")))?;
    if module_name == in_progress.full_name() {
        return in_progress
            .resolve_type(ctx.llvm_context(), type_name)
            .ok_or_else(|| ChiError::TypeNotFound(qualified.to_string()));
    }
    ctx.type_by_qualified_name(qualified)
}

/// Populates `module`'s struct definitions from the top-level `"types"`
/// object, in JSON key order — later structs may reference earlier ones in
/// the same module, but not the reverse (fields resolve against what has
/// already been registered).
pub fn populate_structs<'ctx>(ctx: &Context<'ctx>, module: &mut GraphModule<'ctx>, raw: &serde_json::Value) -> Result<()> {
    let Some(types) = raw.get("types") else {
        return Ok(());
    };
    let types = types.as_object().ok_or_else(|| ChiError::Parse("\"types\" must be an object".to_string()))?;

    for (struct_name, fields) in types {
        let fields = fields.as_array().ok_or_else(|| ChiError::Parse(format!("type {struct_name:?} must be an array of fields")))?;
        let mut graph_struct = GraphStruct::new(struct_name.clone());
        for field in fields {
            let field = field.as_object().ok_or_else(|| ChiError::Parse(format!("field entry in {struct_name:?} must be an object")))?;
            let (field_name, qualified) = field
                .iter()
                .next()
                .ok_or_else(|| ChiError::Parse(format!("empty field entry in {struct_name:?}")))?;
            let qualified = qualified.as_str().ok_or_else(|| ChiError::Parse(format!("field {field_name:?} type must be a string")))?;
            let ty = resolve_qualified_type(ctx, module, qualified)?;
            graph_struct.add_type(NamedDataType::new(field_name.clone(), ty), None);
        }
        module.insert_struct(graph_struct);
    }
    Ok(())
}

/// Populates `module`'s functions from the top-level `"graphs"` object.
pub fn populate_functions<'ctx>(ctx: &Context<'ctx>, module: &mut GraphModule<'ctx>, raw: &serde_json::Value) -> Result<()> {
    let Some(graphs) = raw.get("graphs") else {
        return Ok(());
    };
    let graphs = graphs.as_object().ok_or_else(|| ChiError::Parse("\"graphs\" must be an object".to_string()))?;

    for (name, graph) in graphs {
        let function = parse_function(ctx, module, name, graph)?;
        module.insert_function(function);
    }
    Ok(())
}

fn named_type_list<'ctx>(ctx: &Context<'ctx>, module: &GraphModule<'ctx>, value: &serde_json::Value, field: &str) -> Result<Vec<NamedDataType<'ctx>>> {
    let Some(array) = value.get(field) else {
        return Ok(Vec::new());
    };
    let array = array.as_array().ok_or_else(|| ChiError::Parse(format!("{field:?} must be an array")))?;
    array
        .iter()
        .map(|entry| {
            let entry = entry.as_object().ok_or_else(|| ChiError::Parse(format!("entry in {field:?} must be an object")))?;
            let (name, qualified) = entry.iter().next().ok_or_else(|| ChiError::Parse(format!("empty entry in {field:?}")))?;
            let qualified = qualified.as_str().ok_or_else(|| ChiError::Parse(format!("type for {name:?} must be a string")))?;
            Ok(NamedDataType::new(name.clone(), resolve_qualified_type(ctx, module, qualified)?))
        })
        .collect()
}

fn string_list(value: &serde_json::Value, field: &str) -> Result<Vec<String>> {
    let Some(array) = value.get(field) else {
        return Ok(Vec::new());
    };
    let array = array.as_array().ok_or_else(|| ChiError::Parse(format!("{field:?} must be an array")))?;
    array
        .iter()
        .map(|v| v.as_str().map(str::to_string).ok_or_else(|| ChiError::Parse(format!("entries in {field:?} must be strings"))))
        .collect()
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| ChiError::Parse(format!("invalid node UUID {s:?}: {e}")))
}

fn node_port(value: &serde_json::Value) -> Result<(Uuid, usize)> {
    let pair = value.as_array().ok_or_else(|| ChiError::Parse("connection endpoint must be a [uuid, index] pair".to_string()))?;
    let [node, index] = pair.as_slice() else {
        return Err(ChiError::Parse("connection endpoint must have exactly two elements".to_string()));
    };
    let node = parse_uuid(node.as_str().ok_or_else(|| ChiError::Parse("connection node must be a string".to_string()))?)?;
    let index = index.as_u64().ok_or_else(|| ChiError::Parse("connection index must be an integer".to_string()))? as usize;
    Ok((node, index))
}

fn parse_function<'ctx>(
    ctx: &Context<'ctx>,
    module: &GraphModule<'ctx>,
    name: &str,
    graph: &serde_json::Value,
) -> Result<GraphFunction<'ctx>> {
    let data_inputs = named_type_list(ctx, module, graph, "data_inputs")?;
    let data_outputs = named_type_list(ctx, module, graph, "data_outputs")?;
    let exec_inputs = string_list(graph, "exec_inputs")?;
    let exec_outputs = string_list(graph, "exec_outputs")?;

    let nodes_json = graph
        .get("nodes")
        .and_then(|v| v.as_object())
        .ok_or_else(|| ChiError::Parse(format!("function {name:?} is missing \"nodes\"")))?;

    let mut instances: HashMap<Uuid, NodeInstance> = HashMap::new();
    let mut entry_id: Option<Uuid> = None;
    let mut exit_ids: Vec<Uuid> = Vec::new();

    for (id_str, node_json) in nodes_json {
        let id = parse_uuid(id_str)?;
        let node_type_name = node_json
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChiError::Parse(format!("node {id_str:?} is missing \"type\"")))?;
        let position = match node_json.get("location").and_then(|v| v.as_array()) {
            Some(pair) if pair.len() == 2 => Position::new(pair[0].as_f64().unwrap_or(0.0), pair[1].as_f64().unwrap_or(0.0)),
            _ => Position::zero(),
        };
        let data = node_json.get("data").cloned().unwrap_or(serde_json::Value::Null);

        let (num_data_inputs, num_data_outputs, num_exec_inputs, num_exec_outputs) = if node_type_name == "lang:entry" {
            entry_id = Some(id);
            (0, data_inputs.len(), 0, 1)
        } else if node_type_name == "lang:exit" {
            exit_ids.push(id);
            (data_outputs.len(), 0, 1, 0)
        } else {
            let (owner, unqualified) = node_type_name
                .split_once(':')
                .ok_or_else(|| ChiError::Parse(format!("malformed node type name {node_type_name:?}")))?;
            let node_type = ctx.node_type(owner, unqualified, &data)?;
            (
                node_type.data_inputs().len(),
                node_type.data_outputs().len(),
                node_type.exec_inputs().len(),
                node_type.exec_outputs().len(),
            )
        };

        let mut instance = NodeInstance::new(id, node_type_name, position, num_data_inputs, num_data_outputs, num_exec_inputs, num_exec_outputs);
        instance.data = data;
        instances.insert(id, instance);
    }

    let entry_id = entry_id.ok_or_else(|| ChiError::Parse(format!("function {name:?} has no entry node")))?;
    if exit_ids.is_empty() {
        return Err(ChiError::Parse(format!("function {name:?} has no exit node")));
    }

    if let Some(connections) = graph.get("connections").and_then(|v| v.as_array()) {
        for connection in connections {
            let kind = connection.get("type").and_then(|v| v.as_str()).unwrap_or("");
            let (from_node, from_index) = node_port(connection.get("input").ok_or_else(|| ChiError::Parse("connection missing \"input\"".to_string()))?)?;
            let (to_node, to_index) = node_port(connection.get("output").ok_or_else(|| ChiError::Parse("connection missing \"output\"".to_string()))?)?;

            match kind {
                "exec" => {
                    if let Some(producer) = instances.get_mut(&from_node) {
                        producer.set_exec_output(from_index, to_node, to_index);
                    }
                    if let Some(consumer) = instances.get_mut(&to_node) {
                        consumer.add_exec_input(to_index, from_node, from_index);
                    }
                }
                "data" => {
                    if let Some(producer) = instances.get_mut(&from_node) {
                        producer.connect_data_output(from_index, to_node, to_index);
                    }
                    if let Some(consumer) = instances.get_mut(&to_node) {
                        consumer.set_data_input(to_index, from_node, from_index);
                    }
                }
                other => return Err(ChiError::Parse(format!("unknown connection type {other:?}"))),
            }
        }
    }

    let entry_instance = instances.remove(&entry_id).expect("entry id came from instances");
    let exit_instances: Vec<NodeInstance> = exit_ids.iter().map(|id| instances.remove(id).expect("exit id came from instances")).collect();

    let mut function = GraphFunction::new(name, entry_instance, exit_instances, data_inputs, data_outputs, exec_inputs, exec_outputs);
    for node in instances.into_values() {
        function.insert_node(node);
    }

    if let Some(locals) = graph.get("local_variables").and_then(|v| v.as_object()) {
        for (var_name, qualified) in locals {
            let qualified = qualified.as_str().ok_or_else(|| ChiError::Parse(format!("local variable {var_name:?} type must be a string")))?;
            function.add_local_variable(var_name.clone(), resolve_qualified_type(ctx, module, qualified)?);
        }
    }

    Ok(function)
}

/// Serializes `module` back into the wire format (spec §6), sorting each
/// function's connections as `(type: exec before data, fromUUID, outputIdx)`
/// regardless of insertion order.
pub fn module_to_json(module: &GraphModule<'_>) -> serde_json::Value {
    let mut types = serde_json::Map::new();
    for name in module.enumerate_type_names() {
        if let Some(s) = module.struct_def(&name) {
            types.insert(name, struct_to_json(s));
        }
    }

    let mut graphs = serde_json::Map::new();
    for function in module.functions() {
        graphs.insert(function.name().to_string(), function_to_json(function));
    }

    serde_json::json!({
        "dependencies": module.dependencies(),
        "types": types,
        "graphs": graphs,
    })
}

fn struct_to_json(s: &GraphStruct<'_>) -> serde_json::Value {
    let fields: Vec<serde_json::Value> = s
        .fields()
        .iter()
        .map(|f| serde_json::json!({ f.name.clone(): f.ty.qualified_name() }))
        .collect();
    serde_json::Value::Array(fields)
}

fn named_types_to_json(types: &[NamedDataType<'_>]) -> serde_json::Value {
    serde_json::Value::Array(types.iter().map(|t| serde_json::json!({ t.name.clone(): t.ty.qualified_name() })).collect())
}

pub fn function_to_json(function: &GraphFunction<'_>) -> serde_json::Value {
    let mut nodes = serde_json::Map::new();
    for (id, node) in function.nodes() {
        nodes.insert(
            id.to_string(),
            serde_json::json!({
                "type": node.node_type(),
                "location": [node.position.x, node.position.y],
                "data": node.data.clone(),
            }),
        );
    }

    let mut local_variables = serde_json::Map::new();
    for local in function.local_variables() {
        local_variables.insert(local.name.clone(), serde_json::Value::String(local.ty.qualified_name()));
    }

    let mut connections: Vec<(bool, Uuid, usize, serde_json::Value)> = Vec::new();
    for (id, node) in function.nodes() {
        for (output_index, consumer) in node.exec_outputs().iter().enumerate() {
            if let Some(consumer) = consumer {
                connections.push((
                    true,
                    *id,
                    output_index,
                    serde_json::json!({
                        "type": "exec",
                        "input": [id.to_string(), output_index],
                        "output": [consumer.node.to_string(), consumer.index],
                    }),
                ));
            }
        }
        for (output_index, fanout) in node.data_outputs().iter().enumerate() {
            for consumer in fanout {
                connections.push((
                    false,
                    *id,
                    output_index,
                    serde_json::json!({
                        "type": "data",
                        "input": [id.to_string(), output_index],
                        "output": [consumer.node.to_string(), consumer.index],
                    }),
                ));
            }
        }
    }
    // exec before data, then by (fromUUID, outputIdx) — spec §6.
    connections.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    serde_json::json!({
        "type": "function",
        "name": function.name(),
        "data_inputs": named_types_to_json(function.data_inputs()),
        "data_outputs": named_types_to_json(function.data_outputs()),
        "exec_inputs": function.exec_inputs(),
        "exec_outputs": function.exec_outputs(),
        "local_variables": local_variables,
        "nodes": nodes,
        "connections": connections.into_iter().map(|(_, _, _, v)| v).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell::context::Context as LlvmContextOwned;
    use tempfile::tempdir;

    #[test]
    fn parses_an_identity_function() {
        let llvm_ctx = LlvmContextOwned::create();
        let root = tempdir().unwrap();
        let json = r#"{
            "dependencies": [],
            "types": {},
            "graphs": {
                "id": {
                    "type": "function",
                    "name": "id",
                    "data_inputs": [{"x": "lang:i32"}],
                    "data_outputs": [{"x": "lang:i32"}],
                    "exec_inputs": ["in"],
                    "exec_outputs": ["out"],
                    "local_variables": {},
                    "nodes": {
                        "11111111-1111-1111-1111-111111111111": {"type": "lang:entry", "location": [0,0], "data": null},
                        "22222222-2222-2222-2222-222222222222": {"type": "lang:exit", "location": [0,0], "data": null}
                    },
                    "connections": [
                        {"type": "exec", "input": ["11111111-1111-1111-1111-111111111111", 0], "output": ["22222222-2222-2222-2222-222222222222", 0]},
                        {"type": "data", "input": ["11111111-1111-1111-1111-111111111111", 0], "output": ["22222222-2222-2222-2222-222222222222", 0]}
                    ]
                }
            }
        }"#;

        std::fs::create_dir_all(root.path().join("src")).unwrap();
        std::fs::write(root.path().join("src/id_module.chimod"), json).unwrap();

        let ctx = Context::new(root.path(), &llvm_ctx);
        let mut module = GraphModule::new("id_module", vec![]);
        let raw: serde_json::Value = serde_json::from_str(json).unwrap();
        populate_structs(&ctx, &mut module, &raw).unwrap();
        populate_functions(&ctx, &mut module, &raw).unwrap();

        let function = module.function("id").unwrap();
        assert_eq!(function.data_inputs().len(), 1);
        assert_eq!(function.nodes().len(), 2);
    }

    #[test]
    fn serialization_round_trips_connection_order() {
        let llvm_ctx = LlvmContextOwned::create();
        let root = tempdir().unwrap();
        let ctx = Context::new(root.path(), &llvm_ctx);

        let entry = NodeInstance::new(Uuid::new_v4(), "lang:entry", Position::zero(), 0, 1, 0, 1);
        let exit = NodeInstance::new(Uuid::new_v4(), "lang:exit", Position::zero(), 1, 0, 1, 0);
        let entry_id = entry.id();
        let exit_id = exit.id();

        let mut function: GraphFunction = GraphFunction::new(
            "id",
            entry,
            vec![exit],
            vec![NamedDataType::new("x", ctx.type_by_qualified_name("lang:i32").unwrap())],
            vec![NamedDataType::new("x", ctx.type_by_qualified_name("lang:i32").unwrap())],
            vec!["in".to_string()],
            vec!["out".to_string()],
        );
        function.node_mut(entry_id).unwrap().set_exec_output(0, exit_id, 0);
        function.node_mut(exit_id).unwrap().add_exec_input(0, entry_id, 0);
        function.node_mut(entry_id).unwrap().connect_data_output(0, exit_id, 0);
        function.node_mut(exit_id).unwrap().set_data_input(0, entry_id, 0);

        let mut module = GraphModule::new("id_module", vec![]);
        module.insert_function(function);

        let json = module_to_json(&module);
        let graph = &json["graphs"]["id"];
        let connections = graph["connections"].as_array().unwrap();
        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0]["type"], "exec");
        assert_eq!(connections[1]["type"], "data");
    }
}
