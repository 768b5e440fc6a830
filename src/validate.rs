//! # Function Validator
//!
//! Structural checks on a [`GraphFunction`] before codegen (spec §4.I). A
//! pure function of the graph — editor UIs may call it opportunistically,
//! and the compiler always reruns it before codegen.

use std::collections::HashSet;
use uuid::Uuid;

use crate::diagnostic::DiagnosticRecord;
use crate::model::GraphFunction;

/// Runs both checks and composes their diagnostics.
pub fn validate_function(function: &GraphFunction<'_>) -> DiagnosticRecord {
    let mut record = check_two_way_connections(function);
    record.extend(check_input_availability(function));
    record
}

/// For each data/exec edge, verifies both endpoints agree (spec §4.I.1).
fn check_two_way_connections(function: &GraphFunction<'_>) -> DiagnosticRecord {
    let mut record = DiagnosticRecord::new();

    for (&id, node) in function.nodes() {
        for (output_index, fanout) in node.data_outputs().iter().enumerate() {
            for consumer_ref in fanout {
                let consumer = match function.node(consumer_ref.node) {
                    Some(n) => n,
                    None => {
                        record.push(
                            "EConnErr",
                            format!("node {id} data-output {output_index} points at a nonexistent node"),
                            serde_json::json!({ "node": id }),
                        );
                        continue;
                    }
                };
                match consumer.data_inputs().get(consumer_ref.index) {
                    Some(Some(back)) if back.node == id && back.index == output_index => {}
                    _ => record.push(
                        "EConnErr",
                        format!("data edge {id}.out[{output_index}] -> {}.in[{}] is not two-way consistent", consumer_ref.node, consumer_ref.index),
                        serde_json::json!({ "node": id, "output": output_index }),
                    ),
                }
            }
        }

        for (output_index, consumer_ref) in node.exec_outputs().iter().enumerate() {
            let Some(consumer_ref) = consumer_ref else { continue };
            let consumer = match function.node(consumer_ref.node) {
                Some(n) => n,
                None => {
                    record.push(
                        "EConnErr",
                        format!("node {id} exec-output {output_index} points at a nonexistent node"),
                        serde_json::json!({ "node": id }),
                    );
                    continue;
                }
            };
            let Some(slot) = consumer.exec_inputs().get(consumer_ref.index) else {
                record.push(
                    "EConnErr",
                    format!("exec edge {id}.out[{output_index}] targets a nonexistent input slot"),
                    serde_json::json!({ "node": id }),
                );
                continue;
            };
            if !slot.iter().any(|back| back.node == id && back.index == output_index) {
                record.push(
                    "EConnErr",
                    format!("exec edge {id}.out[{output_index}] -> {}.in[{}] is not two-way consistent", consumer_ref.node, consumer_ref.index),
                    serde_json::json!({ "node": id, "output": output_index }),
                );
            }
        }
    }

    record
}

/// Depth-first walk from the entry node along exec edges; at each visit,
/// every data input must be connected to a pure producer or one already
/// visited earlier on the walk (spec §4.I.2).
fn check_input_availability(function: &GraphFunction<'_>) -> DiagnosticRecord {
    let mut record = DiagnosticRecord::new();
    let mut visited: HashSet<Uuid> = HashSet::new();
    let mut stack = vec![function.entry_node()];
    let mut on_stack_guard: HashSet<Uuid> = HashSet::new();

    while let Some(id) = stack.pop() {
        if visited.contains(&id) {
            continue;
        }
        let Some(node) = function.node(id) else { continue };

        for (input_index, producer) in node.data_inputs().iter().enumerate() {
            match producer {
                None => {
                    record.push(
                        "EUseBeforeDef",
                        format!("node {id} has an unconnected data input {input_index}"),
                        serde_json::json!({ "node": id }),
                    );
                }
                Some(producer_ref) => {
                    let is_available = is_pure_producer(function, producer_ref.node) || visited.contains(&producer_ref.node);
                    if !is_available {
                        record.push(
                            "EUseBeforeDef",
                            format!("node {id} reads data input {input_index} from {} before it executes", producer_ref.node),
                            serde_json::json!({ "node": id }),
                        );
                    }
                }
            }
        }

        visited.insert(id);
        on_stack_guard.insert(id);

        for exec_out in node.exec_outputs().iter().flatten() {
            if !on_stack_guard.contains(&exec_out.node) {
                stack.push(exec_out.node);
            }
        }
    }

    record
}

/// A node is pure, for validation purposes, iff it declares no execution
/// ports at all (entry/exit always have at least one, by invariant 4).
fn is_pure_producer(function: &GraphFunction<'_>, id: Uuid) -> bool {
    match function.node(id) {
        Some(node) => node.exec_inputs().is_empty() && node.exec_outputs().is_empty(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeInstance, Position};

    fn identity_function() -> GraphFunction<'static> {
        let entry = NodeInstance::new(Uuid::new_v4(), "lang:entry", Position::zero(), 0, 1, 0, 1);
        let exit = NodeInstance::new(Uuid::new_v4(), "lang:exit", Position::zero(), 1, 0, 1, 0);
        let entry_id = entry.id();
        let exit_id = exit.id();

        let mut function: GraphFunction = GraphFunction::new("id", entry, vec![exit], vec![], vec![], vec![], vec![]);
        function.node_mut(entry_id).unwrap().set_exec_output(0, exit_id, 0);
        function.node_mut(exit_id).unwrap().add_exec_input(0, entry_id, 0);
        function.node_mut(entry_id).unwrap().connect_data_output(0, exit_id, 0);
        function.node_mut(exit_id).unwrap().set_data_input(0, entry_id, 0);
        function
    }

    #[test]
    fn a_well_formed_function_validates_cleanly() {
        let function = identity_function();
        let record = validate_function(&function);
        assert!(record.success());
    }

    #[test]
    fn a_one_sided_data_edge_is_a_connection_error() {
        let mut function = identity_function();
        let exit_id = function.exit_nodes()[0];
        function.node_mut(exit_id).unwrap().clear_data_input(0);
        let record = validate_function(&function);
        assert!(!record.success());
        assert!(record.entries().iter().any(|e| e.code == "EConnErr"));
    }

    #[test]
    fn reading_from_a_not_yet_executed_node_is_use_before_def() {
        let entry = NodeInstance::new(Uuid::new_v4(), "lang:entry", Position::zero(), 0, 0, 0, 1);
        let mut middle = NodeInstance::new(Uuid::new_v4(), "lang:const-int", Position::zero(), 0, 1, 1, 1);
        let exit = NodeInstance::new(Uuid::new_v4(), "lang:exit", Position::zero(), 1, 0, 1, 0);

        let entry_id = entry.id();
        let middle_id = middle.id();
        let exit_id = exit.id();

        // `middle` reads from `exit` (which executes after it) — use-before-def.
        middle.set_data_input(0, exit_id, 0);

        let mut function: GraphFunction = GraphFunction::new("f", entry, vec![exit], vec![], vec![], vec![], vec![]);
        function.insert_node(middle);

        function.node_mut(entry_id).unwrap().set_exec_output(0, middle_id, 0);
        function.node_mut(middle_id).unwrap().add_exec_input(0, entry_id, 0);
        function.node_mut(middle_id).unwrap().set_exec_output(0, exit_id, 0);
        function.node_mut(exit_id).unwrap().add_exec_input(0, middle_id, 0);

        let record = validate_function(&function);
        assert!(!record.success());
        assert!(record.entries().iter().any(|e| e.code == "EUseBeforeDef"));
    }

    #[test]
    fn a_pure_producer_never_triggers_use_before_def_regardless_of_order() {
        let entry = NodeInstance::new(Uuid::new_v4(), "lang:entry", Position::zero(), 0, 0, 0, 1);
        let pure_const = NodeInstance::new(Uuid::new_v4(), "lang:const-int", Position::zero(), 0, 1, 0, 0);
        let mut exit = NodeInstance::new(Uuid::new_v4(), "lang:exit", Position::zero(), 1, 0, 1, 0);

        let entry_id = entry.id();
        let pure_id = pure_const.id();
        let exit_id = exit.id();

        exit.set_data_input(0, pure_id, 0);

        let mut function: GraphFunction = GraphFunction::new("f", entry, vec![exit], vec![], vec![], vec![], vec![]);
        function.insert_node(pure_const);
        function.node_mut(entry_id).unwrap().set_exec_output(0, exit_id, 0);
        function.node_mut(exit_id).unwrap().add_exec_input(0, entry_id, 0);

        let record = validate_function(&function);
        assert!(!record.entries().iter().any(|e| e.code == "EUseBeforeDef"));
    }
}
