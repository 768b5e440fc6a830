//! # Graph Module
//!
//! The JSON-backed, user-authored [`Module`] variant (spec §3 "Module",
//! §4.G): owns its declared dependencies, its [`GraphStruct`]s, and its
//! [`GraphFunction`]s.

use std::collections::HashMap;

use inkwell::context::Context as LlvmContext;
use inkwell::module::Module as LlvmModule;

use crate::diagnostic::DiagnosticRecord;
use crate::error::{ChiError, Result};
use crate::model::{DataType, GraphFunction, GraphStruct, Module, NodeType};

/// A user module loaded from `<workspace>/src/<fullName>.chimod`.
pub struct GraphModule<'ctx> {
    full_name: String,
    dependencies: Vec<String>,
    structs: HashMap<String, GraphStruct<'ctx>>,
    functions: HashMap<String, GraphFunction<'ctx>>,
}

impl<'ctx> GraphModule<'ctx> {
    pub fn new(full_name: impl Into<String>, dependencies: Vec<String>) -> Self {
        Self {
            full_name: full_name.into(),
            dependencies,
            structs: HashMap::new(),
            functions: HashMap::new(),
        }
    }

    pub fn insert_struct(&mut self, s: GraphStruct<'ctx>) {
        self.structs.insert(s.name().to_string(), s);
    }

    pub fn insert_function(&mut self, f: GraphFunction<'ctx>) {
        self.functions.insert(f.name().to_string(), f);
    }

    pub fn function(&self, name: &str) -> Option<&GraphFunction<'ctx>> {
        self.functions.get(name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut GraphFunction<'ctx>> {
        self.functions.get_mut(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &GraphFunction<'ctx>> {
        self.functions.values()
    }

    pub fn struct_def(&self, name: &str) -> Option<&GraphStruct<'ctx>> {
        self.structs.get(name)
    }
}

impl<'ctx> Module<'ctx> for GraphModule<'ctx> {
    fn full_name(&self) -> &str {
        &self.full_name
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn enumerate_node_type_names(&self) -> Vec<String> {
        // A graph module contributes data types (structs) and functions,
        // never node types of its own — node types always come from a
        // built-in or another graph module's `c`/`lang`-style declarations.
        Vec::new()
    }

    fn enumerate_type_names(&self) -> Vec<String> {
        self.structs.keys().cloned().collect()
    }

    fn create_node_type(
        &self,
        _llvm_ctx: &'ctx LlvmContext,
        name: &str,
        _json_data: &serde_json::Value,
    ) -> Result<NodeType<'ctx>> {
        Err(ChiError::NodeTypeNotFound(format!("{}:{}", self.full_name, name)))
    }

    fn resolve_type(&self, llvm_ctx: &'ctx LlvmContext, name: &str) -> Option<DataType<'ctx>> {
        let s = self.structs.get(name)?;
        Some(DataType::new(self.full_name.clone(), name.to_string(), s.to_llvm_type(llvm_ctx)))
    }

    fn emit_into_llvm_module(&self, _llvm_module: &LlvmModule<'ctx>) -> DiagnosticRecord {
        DiagnosticRecord::new()
    }

    fn functions(&self) -> Vec<&GraphFunction<'ctx>> {
        self.functions.values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NamedDataType;
    use inkwell::context::Context;

    #[test]
    fn resolves_struct_types_by_name() {
        let ctx = Context::create();
        let mut module = GraphModule::new("a/b", vec![]);
        let mut s = GraphStruct::new("Vec2");
        s.add_type(NamedDataType::new("x", DataType::new("lang", "float", ctx.f32_type().into())), None);
        module.insert_struct(s);

        let resolved = module.resolve_type(&ctx, "Vec2").unwrap();
        assert_eq!(resolved.qualified_name(), "a/b:Vec2");
    }

    #[test]
    fn unknown_node_type_is_not_found() {
        let ctx = Context::create();
        let module = GraphModule::new("a/b", vec![]);
        assert!(module.create_node_type(&ctx, "anything", &serde_json::Value::Null).is_err());
    }
}
