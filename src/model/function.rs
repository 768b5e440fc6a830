//! # Graph Function
//!
//! `(name, entryNode, exitNodes[], dataInputs[], dataOutputs[],
//! executionInputs[], executionOutputs[], localVariables[], nodes{id→NodeInstance})`
//! (spec §3 "Graph function").

use std::collections::HashMap;
use uuid::Uuid;

use super::node_instance::NodeInstance;
use super::types::{DataType, NamedDataType};

/// A named, `DataType`-scoped local variable. Becomes a stack slot at
/// codegen time (spec §3, §4.J "Local variables").
#[derive(Debug, Clone)]
pub struct LocalVariable<'ctx> {
    pub name: String,
    pub ty: DataType<'ctx>,
}

/// A directed graph of typed nodes wired by execution and data edges,
/// representing one function in a module.
pub struct GraphFunction<'ctx> {
    name: String,

    entry_node: Uuid,
    exit_nodes: Vec<Uuid>,

    data_inputs: Vec<NamedDataType<'ctx>>,
    data_outputs: Vec<NamedDataType<'ctx>>,
    exec_inputs: Vec<String>,
    exec_outputs: Vec<String>,

    local_variables: Vec<LocalVariable<'ctx>>,

    /// Per-function arena of node instances, keyed by UUID. Edges between
    /// nodes are UUID + index pairs stored on each `NodeInstance`, not raw
    /// references, so the arena owns every node with no reference cycles
    /// (spec §9 "Graph cycles in ownership").
    nodes: HashMap<Uuid, NodeInstance>,
}

impl<'ctx> GraphFunction<'ctx> {
    /// Constructs an empty function shell, already containing its entry
    /// and exit nodes (spec invariant 4: "A function contains exactly one
    /// entry node and at least one exit node").
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        entry_node: NodeInstance,
        exit_nodes: Vec<NodeInstance>,
        data_inputs: Vec<NamedDataType<'ctx>>,
        data_outputs: Vec<NamedDataType<'ctx>>,
        exec_inputs: Vec<String>,
        exec_outputs: Vec<String>,
    ) -> Self {
        let entry_id = entry_node.id();
        let mut nodes = HashMap::new();
        nodes.insert(entry_id, entry_node);

        let mut exit_ids = Vec::with_capacity(exit_nodes.len());
        for exit in exit_nodes {
            exit_ids.push(exit.id());
            nodes.insert(exit.id(), exit);
        }

        Self {
            name: name.into(),
            entry_node: entry_id,
            exit_nodes: exit_ids,
            data_inputs,
            data_outputs,
            exec_inputs,
            exec_outputs,
            local_variables: Vec::new(),
            nodes,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn entry_node(&self) -> Uuid {
        self.entry_node
    }

    #[inline]
    pub fn exit_nodes(&self) -> &[Uuid] {
        &self.exit_nodes
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
    pub fn exec_inputs(&self) -> &[String] {
        &self.exec_inputs
    }

    #[inline]
    pub fn exec_outputs(&self) -> &[String] {
        &self.exec_outputs
    }

    #[inline]
    pub fn local_variables(&self) -> &[LocalVariable<'ctx>] {
        &self.local_variables
    }

    /// Declares a new local variable scoped to this function.
    pub fn add_local_variable(&mut self, name: impl Into<String>, ty: DataType<'ctx>) {
        self.local_variables.push(LocalVariable { name: name.into(), ty });
    }

    pub fn local_variable(&self, name: &str) -> Option<&LocalVariable<'ctx>> {
        self.local_variables.iter().find(|v| v.name == name)
    }

    #[inline]
    pub fn nodes(&self) -> &HashMap<Uuid, NodeInstance> {
        &self.nodes
    }

    #[inline]
    pub fn node(&self, id: Uuid) -> Option<&NodeInstance> {
        self.nodes.get(&id)
    }

    #[inline]
    pub fn node_mut(&mut self, id: Uuid) -> Option<&mut NodeInstance> {
        self.nodes.get_mut(&id)
    }

    /// Inserts a new node instance into the function's arena.
    pub fn insert_node(&mut self, node: NodeInstance) {
        self.nodes.insert(node.id(), node);
    }

    /// Removes a node from the function, severing every edge that touched
    /// it first so no dangling `PortRef` survives (spec §3 "Lifecycles":
    /// "removing a node first severs every edge touching it").
    pub fn remove_node(&mut self, id: Uuid) -> Option<NodeInstance> {
        let removed = self.nodes.remove(&id)?;
        for other in self.nodes.values_mut() {
            other.sever_references_to(id);
        }
        Some(removed)
    }
}

impl std::fmt::Debug for GraphFunction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphFunction")
            .field("name", &self.name)
            .field("entry_node", &self.entry_node)
            .field("exit_nodes", &self.exit_nodes)
            .field("node_count", &self.nodes.len())
            .finish()
    }
}
