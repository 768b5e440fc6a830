//! # Module
//!
//! A [`Module`] is a named, dependency-declaring collection of node types
//! and data types (spec §3 "Module", §4.C). Built-in modules (`lang`, `c`)
//! and graph-backed modules (`GraphModule`, see [`crate::graph_module`])
//! both implement this trait; the [`crate::context::Context`] only ever
//! talks to modules through it.

use std::collections::HashMap;

use inkwell::context::Context as LlvmContext;
use inkwell::debug_info::DIType;
use inkwell::module::Module as LlvmModule;
use inkwell::types::BasicTypeEnum;

use crate::diagnostic::DiagnosticRecord;
use crate::error::{ChiError, Result};

use super::function::GraphFunction;
use super::node_type::NodeType;
use super::types::{DataType, NamedDataType};

/// The six capabilities every module must provide (spec §3 "Module").
pub trait Module<'ctx> {
    /// This module's full, `/`-delimited name.
    fn full_name(&self) -> &str;

    /// Full names of modules this one depends on.
    fn dependencies(&self) -> &[String];

    /// Every node type name this module declares, unqualified.
    fn enumerate_node_type_names(&self) -> Vec<String>;

    /// Every data type name this module declares, unqualified.
    fn enumerate_type_names(&self) -> Vec<String>;

    /// Constructs a fresh node type on demand from its unqualified name and
    /// the requesting instance's JSON payload. Node types are owned by the
    /// instance that requested them, not cached by the module (spec §3
    /// "Lifecycles"); this is also what lets `entry`/`exit` derive their
    /// data ports from the enclosing function's signature instead of being
    /// fixed at registration.
    fn create_node_type(
        &self,
        llvm_ctx: &'ctx LlvmContext,
        name: &str,
        json_data: &serde_json::Value,
    ) -> Result<NodeType<'ctx>>;

    /// Resolves a data type by its unqualified name within this module.
    fn resolve_type(&self, llvm_ctx: &'ctx LlvmContext, name: &str) -> Option<DataType<'ctx>>;

    /// The debug-info type for a data type, if debug info is enabled.
    fn debug_type(&self, name: &str) -> Option<DIType<'ctx>> {
        let _ = name;
        None
    }

    /// Emits this module's own definitions (struct declarations, globals,
    /// any free functions it owns outside of graph functions) into the
    /// shared LLVM module, ahead of function compilation.
    fn emit_into_llvm_module(&self, llvm_module: &LlvmModule<'ctx>) -> DiagnosticRecord;

    /// The graph functions this module contributes to compilation. Only
    /// `GraphModule` overrides this — built-in modules compile to nothing
    /// but node types and struct/global definitions.
    fn functions(&self) -> Vec<&GraphFunction<'ctx>> {
        Vec::new()
    }
}

/// A user-defined aggregate type: an ordered list of named, typed fields
/// (spec §3 "Struct type"). Mutated through a positional API mirroring
/// `GraphStruct::addType`/`modifyType`/`removeType` in the original
/// (`libchigraph/include/chi/GraphStruct.hpp`), rather than by name, so that
/// field reordering is an explicit operation instead of inferred from a map.
#[derive(Debug, Clone, Default)]
pub struct GraphStruct<'ctx> {
    name: String,
    fields: Vec<NamedDataType<'ctx>>,
}

impl<'ctx> GraphStruct<'ctx> {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), fields: Vec::new() }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn fields(&self) -> &[NamedDataType<'ctx>] {
        &self.fields
    }

    /// Appends a field at the end, or inserts it at `position` if given.
    pub fn add_type(&mut self, field: NamedDataType<'ctx>, position: Option<usize>) {
        match position {
            Some(idx) if idx <= self.fields.len() => self.fields.insert(idx, field),
            _ => self.fields.push(field),
        }
    }

    /// Replaces the field at `position` in place, preserving its index.
    pub fn modify_type(&mut self, position: usize, field: NamedDataType<'ctx>) -> Result<(), GraphStructError> {
        if position >= self.fields.len() {
            return Err(GraphStructError::OutOfRange { position, len: self.fields.len() });
        }
        self.fields[position] = field;
        Ok(())
    }

    /// Removes the field at `position`, shifting later fields down by one.
    pub fn remove_type(&mut self, position: usize) -> Result<NamedDataType<'ctx>, GraphStructError> {
        if position >= self.fields.len() {
            return Err(GraphStructError::OutOfRange { position, len: self.fields.len() });
        }
        Ok(self.fields.remove(position))
    }

    /// Builds the LLVM struct type for the current field list, in
    /// declaration order — struct layout is positional, not name-keyed.
    pub fn to_llvm_type(&self, llvm_ctx: &'ctx LlvmContext) -> BasicTypeEnum<'ctx> {
        let field_types: Vec<BasicTypeEnum<'ctx>> = self
            .fields
            .iter()
            .filter_map(|f| f.ty.llvm_type())
            .collect();
        llvm_ctx.struct_type(&field_types, false).into()
    }
}

/// Errors from [`GraphStruct`]'s positional field-mutation API.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphStructError {
    #[error("field position {position} out of range (struct has {len} fields)")]
    OutOfRange { position: usize, len: usize },
}

/// A constructor that consumes a node instance's JSON payload and yields a
/// fresh [`NodeType`] (spec §9 "JSON-driven node construction" — this
/// replaces any dynamic-dispatch-by-string machinery).
pub type NodeTypeConstructor<'ctx> =
    Box<dyn Fn(&'ctx LlvmContext, &serde_json::Value) -> Result<NodeType<'ctx>> + 'ctx>;

/// A [`Module`] whose node types are built on demand from a fixed table of
/// constructors, and whose data types are resolved once and shared. Used
/// for the built-in modules (`lang`, `c`); `GraphModule` implements `Module`
/// directly instead, since its node types come from user JSON.
pub struct StaticModule<'ctx> {
    full_name: String,
    dependencies: Vec<String>,
    node_type_names: Vec<String>,
    constructors: HashMap<String, NodeTypeConstructor<'ctx>>,
    types: HashMap<String, DataType<'ctx>>,
}

impl<'ctx> StaticModule<'ctx> {
    pub fn new(full_name: impl Into<String>, dependencies: Vec<String>) -> Self {
        Self {
            full_name: full_name.into(),
            dependencies,
            node_type_names: Vec::new(),
            constructors: HashMap::new(),
            types: HashMap::new(),
        }
    }

    pub fn register_node_type(&mut self, name: impl Into<String>, constructor: NodeTypeConstructor<'ctx>) {
        let name = name.into();
        self.node_type_names.push(name.clone());
        self.constructors.insert(name, constructor);
    }

    pub fn insert_type(&mut self, ty: DataType<'ctx>) {
        self.types.insert(ty.name().to_string(), ty);
    }
}

impl<'ctx> Module<'ctx> for StaticModule<'ctx> {
    fn full_name(&self) -> &str {
        &self.full_name
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn enumerate_node_type_names(&self) -> Vec<String> {
        self.node_type_names.clone()
    }

    fn enumerate_type_names(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }

    fn create_node_type(
        &self,
        llvm_ctx: &'ctx LlvmContext,
        name: &str,
        json_data: &serde_json::Value,
    ) -> Result<NodeType<'ctx>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| ChiError::NodeTypeNotFound(format!("{}:{}", self.full_name, name)))?;
        constructor(llvm_ctx, json_data)
    }

    fn resolve_type(&self, _llvm_ctx: &'ctx LlvmContext, name: &str) -> Option<DataType<'ctx>> {
        self.types.get(name).cloned()
    }

    fn emit_into_llvm_module(&self, _llvm_module: &LlvmModule<'ctx>) -> DiagnosticRecord {
        DiagnosticRecord::new()
    }
}
