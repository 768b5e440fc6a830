//! # Node Instance
//!
//! An occurrence of a [`crate::model::NodeType`] inside a graph function
//! (spec §3 "Node instance"). Node instances live in a per-function arena
//! keyed by [`Uuid`], and edges are stored as UUID + index pairs rather than
//! raw references — this is how the arena sidesteps the reference-cycle
//! ownership problem spec §9 calls out ("Graph cycles in ownership").

use uuid::Uuid;

use super::types::Position;

/// A single data-edge endpoint: which node, and which of its ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRef {
    pub node: Uuid,
    pub index: usize,
}

impl PortRef {
    #[inline]
    pub fn new(node: Uuid, index: usize) -> Self {
        Self { node, index }
    }
}

/// An occurrence of a node type within a graph function.
///
/// Connection slots are stored directly on the instance, both forward and
/// backward, so that the two-way consistency invariant (spec §3 invariant
/// 2) is literally "do the two sides of an edge still agree" rather than
/// something reconstructed from a flat connection list.
#[derive(Debug, Clone)]
pub struct NodeInstance {
    /// Stable identifier, unique within the owning function.
    id: Uuid,

    /// Qualified name of this instance's node type.
    node_type: String,

    /// Editor-only position; ignored by the compiler.
    pub position: Position,

    /// Per-data-input: at most one producer `(node, output_index)`.
    data_inputs: Vec<Option<PortRef>>,

    /// Per-data-output: unbounded fanout of `(node, input_index)` consumers.
    data_outputs: Vec<Vec<PortRef>>,

    /// Per-exec-input: any number of producers `(node, exec_output_index)`.
    exec_inputs: Vec<Vec<PortRef>>,

    /// Per-exec-output: at most one consumer `(node, exec_input_index)`.
    exec_outputs: Vec<Option<PortRef>>,

    /// Opaque JSON payload forwarded to/from the node type's constructor
    /// (spec §6: "unknown keys inside nodes are forwarded to the node
    /// type's JSON handler").
    pub data: serde_json::Value,
}

impl NodeInstance {
    /// Creates a new, unconnected node instance with `num_data_inputs`,
    /// `num_data_outputs`, `num_exec_inputs`, `num_exec_outputs` empty
    /// slots, matching the shape of the named node type.
    pub fn new(
        id: Uuid,
        node_type: impl Into<String>,
        position: Position,
        num_data_inputs: usize,
        num_data_outputs: usize,
        num_exec_inputs: usize,
        num_exec_outputs: usize,
    ) -> Self {
        Self {
            id,
            node_type: node_type.into(),
            position,
            data_inputs: vec![None; num_data_inputs],
            data_outputs: vec![Vec::new(); num_data_outputs],
            exec_inputs: vec![Vec::new(); num_exec_inputs],
            exec_outputs: vec![None; num_exec_outputs],
            data: serde_json::Value::Null,
        }
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    #[inline]
    pub fn data_inputs(&self) -> &[Option<PortRef>] {
        &self.data_inputs
    }

    #[inline]
    pub fn data_outputs(&self) -> &[Vec<PortRef>] {
        &self.data_outputs
    }

    #[inline]
    pub fn exec_inputs(&self) -> &[Vec<PortRef>] {
        &self.exec_inputs
    }

    #[inline]
    pub fn exec_outputs(&self) -> &[Option<PortRef>] {
        &self.exec_outputs
    }

    /// Connects a data edge from `(self, output_index)` to
    /// `(consumer, input_index)`. Overwrites whatever was previously
    /// connected to the consumer's input slot — callers are responsible
    /// for severing the old edge's reverse link first if one existed.
    pub fn connect_data_output(&mut self, output_index: usize, consumer: Uuid, input_index: usize) {
        self.data_outputs[output_index].push(PortRef::new(consumer, input_index));
    }

    /// Records that `input_index` is now fed from `(producer, output_index)`.
    pub fn set_data_input(&mut self, input_index: usize, producer: Uuid, output_index: usize) {
        self.data_inputs[input_index] = Some(PortRef::new(producer, output_index));
    }

    /// Disconnects `input_index`, if connected.
    pub fn clear_data_input(&mut self, input_index: usize) {
        self.data_inputs[input_index] = None;
    }

    /// Removes a specific fanout entry from a data output, if present.
    pub fn disconnect_data_output(&mut self, output_index: usize, consumer: Uuid, input_index: usize) {
        self.data_outputs[output_index].retain(|p| !(p.node == consumer && p.index == input_index));
    }

    /// Connects an exec edge from `(self, output_index)` to
    /// `(consumer, input_index)`. An exec output holds at most one
    /// consumer; this overwrites any prior one.
    pub fn set_exec_output(&mut self, output_index: usize, consumer: Uuid, input_index: usize) {
        self.exec_outputs[output_index] = Some(PortRef::new(consumer, input_index));
    }

    /// Clears an exec output slot.
    pub fn clear_exec_output(&mut self, output_index: usize) {
        self.exec_outputs[output_index] = None;
    }

    /// Adds a producer to an exec input slot (exec inputs fan in from any
    /// number of producers).
    pub fn add_exec_input(&mut self, input_index: usize, producer: Uuid, output_index: usize) {
        self.exec_inputs[input_index].push(PortRef::new(producer, output_index));
    }

    /// Removes a specific producer from an exec input slot, if present.
    pub fn remove_exec_input(&mut self, input_index: usize, producer: Uuid, output_index: usize) {
        self.exec_inputs[input_index]
            .retain(|p| !(p.node == producer && p.index == output_index));
    }

    /// Removes every reference to `other` from this instance's slots —
    /// called when `other` is deleted from the function, so that no
    /// dangling `PortRef` survives (spec §3 "Lifecycles").
    pub fn sever_references_to(&mut self, other: Uuid) {
        for slot in &mut self.data_inputs {
            if slot.is_some_and(|p| p.node == other) {
                *slot = None;
            }
        }
        for fanout in &mut self.data_outputs {
            fanout.retain(|p| p.node != other);
        }
        for fanin in &mut self.exec_inputs {
            fanin.retain(|p| p.node != other);
        }
        for slot in &mut self.exec_outputs {
            if slot.is_some_and(|p| p.node == other) {
                *slot = None;
            }
        }
    }
}
