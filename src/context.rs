//! # Context
//!
//! Process-scoped, instance-owned registry of loaded modules (spec §3
//! "Context", §4.D). Creation attaches the two built-in modules; everything
//! else is loaded on demand from `<workspaceRoot>/src/<fullName>.chimod`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use inkwell::context::Context as LlvmContext;
use inkwell::module::Module as LlvmModule;

use crate::builtins::{c_module::CModule, lang};
use crate::cache::{DefaultModuleCache, ModuleCache};
use crate::diagnostic::DiagnosticRecord;
use crate::error::{ChiError, Result};
use crate::json;
use crate::model::{DataType, Module, NodeType};

/// Options accepted by [`Context::compile_module`] (spec §4.D).
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub debug: bool,
    pub link: bool,
}

/// Registry of loaded modules, resolved types, and the shared LLVM context
/// (spec §3 "Context"). Not safe for concurrent use — callers wanting
/// parallelism must shard by context (spec §5).
pub struct Context<'ctx> {
    workspace_root: PathBuf,
    modules: HashMap<String, Box<dyn Module<'ctx> + 'ctx>>,
    llvm_context: &'ctx LlvmContext,
    module_cache: Box<dyn ModuleCache>,
}

impl<'ctx> Context<'ctx> {
    /// Creates a context rooted at `workspace_root`, with the `lang` and `c`
    /// built-ins already attached (spec §3 "Creation attaches the two
    /// built-ins").
    pub fn new(workspace_root: impl Into<PathBuf>, llvm_context: &'ctx LlvmContext) -> Self {
        let workspace_root = workspace_root.into();
        let cache = Box::new(DefaultModuleCache::new(&workspace_root));
        Self::with_cache(workspace_root, llvm_context, cache)
    }

    /// As [`Context::new`], but with an injectable [`ModuleCache`] — used by
    /// tests that want to observe cache behavior without touching disk.
    pub fn with_cache(
        workspace_root: impl Into<PathBuf>,
        llvm_context: &'ctx LlvmContext,
        module_cache: Box<dyn ModuleCache>,
    ) -> Self {
        let mut ctx = Self {
            workspace_root: workspace_root.into(),
            modules: HashMap::new(),
            llvm_context,
            module_cache,
        };
        ctx.modules.insert(lang::MODULE_NAME.to_string(), Box::new(lang::build(llvm_context)));
        ctx.modules.insert(crate::builtins::c_module::MODULE_NAME.to_string(), Box::new(CModule::new()));
        ctx
    }

    #[inline]
    pub fn workspace_root(&self) -> &std::path::Path {
        &self.workspace_root
    }

    #[inline]
    pub fn llvm_context(&self) -> &'ctx LlvmContext {
        self.llvm_context
    }

    #[inline]
    pub fn module_cache(&self) -> &dyn ModuleCache {
        self.module_cache.as_ref()
    }

    /// Loads `full_name`, idempotently and recursively over its declared
    /// dependencies (spec §4.D). Built-in names are already loaded at
    /// construction; loading them again is a no-op.
    pub fn load_module(&mut self, full_name: &str) -> DiagnosticRecord {
        let mut in_progress = std::collections::HashSet::new();
        self.load_module_inner(full_name, &mut in_progress)
    }

    fn load_module_inner(
        &mut self,
        full_name: &str,
        in_progress: &mut std::collections::HashSet<String>,
    ) -> DiagnosticRecord {
        if self.modules.contains_key(full_name) {
            tracing::debug!("[CONTEXT] {full_name} already loaded");
            return DiagnosticRecord::new();
        }
        // A dependency cycle re-enters here before the first load finishes;
        // treat it the same as "already loaded" (spec §4.D "cycles are
        // permitted and broken by the idempotence check").
        if in_progress.contains(full_name) {
            tracing::debug!("[CONTEXT] {full_name} already loading, breaking cycle");
            return DiagnosticRecord::new();
        }
        in_progress.insert(full_name.to_string());
        tracing::debug!("[CONTEXT] loading {full_name}");

        let record = self.load_module_from_disk(full_name, in_progress);
        in_progress.remove(full_name);
        record
    }

    fn load_module_from_disk(
        &mut self,
        full_name: &str,
        in_progress: &mut std::collections::HashSet<String>,
    ) -> DiagnosticRecord {
        let path = self.workspace_root.join("src").join(format!("{full_name}.chimod"));
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                let err = ChiError::ModuleNotFound(format!("{full_name} ({e})"));
                tracing::warn!("[CONTEXT] {err}");
                return err.into();
            }
        };
        let raw: serde_json::Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => return ChiError::Parse(format!("{full_name}: {e}")).into(),
        };

        let dependencies = match json::read_dependencies(&raw) {
            Ok(deps) => deps,
            Err(e) => return e.into(),
        };

        let mut record = DiagnosticRecord::new();
        for dep in &dependencies {
            record.extend(self.load_module_inner(dep, in_progress));
        }
        if !record.success() {
            return record;
        }

        let mut module = crate::graph_module::GraphModule::new(full_name, dependencies);
        if let Err(e) = json::populate_structs(self, &mut module, &raw) {
            record.extend(e.into());
            return record;
        }
        if let Err(e) = json::populate_functions(self, &mut module, &raw) {
            record.extend(e.into());
            return record;
        }

        tracing::debug!("[CONTEXT] loaded {full_name}");
        self.modules.insert(full_name.to_string(), Box::new(module));
        record
    }

    /// Refuses while any other loaded module still lists `full_name` as a
    /// dependency (spec §3 "Lifecycles").
    pub fn unload_module(&mut self, full_name: &str) -> Result<()> {
        if let Some((dependent, _)) = self
            .modules
            .iter()
            .find(|(name, module)| name.as_str() != full_name && module.dependencies().iter().any(|d| d == full_name))
        {
            return Err(ChiError::ModuleInUse(full_name.to_string(), dependent.clone()));
        }
        self.modules.remove(full_name);
        Ok(())
    }

    pub fn module_by_name(&self, full_name: &str) -> Result<&(dyn Module<'ctx> + 'ctx)> {
        self.modules
            .get(full_name)
            .map(|m| m.as_ref())
            .ok_or_else(|| ChiError::ModuleNotFound(full_name.to_string()))
    }

    /// Resolves `"<module>:<name>"` into a [`DataType`], failing with
    /// `TypeNotFound` if either half is missing.
    pub fn type_by_qualified_name(&self, qualified: &str) -> Result<DataType<'ctx>> {
        let (module_name, type_name) =
            DataType::split_qualified_name(qualified).ok_or_else(|| ChiError::TypeNotFound(qualified.to_string()))?;
        let module = self.module_by_name(module_name)?;
        module
            .resolve_type(self.llvm_context, type_name)
            .ok_or_else(|| ChiError::TypeNotFound(qualified.to_string()))
    }

    /// Builds a fresh node type on demand (spec §4.D `nodeType`).
    pub fn node_type(&self, module_name: &str, node_name: &str, json_data: &serde_json::Value) -> Result<NodeType<'ctx>> {
        let module = self.module_by_name(module_name)?;
        module.create_node_type(self.llvm_context, node_name, json_data)
    }

    /// Whether `full_name`'s cache entry is fresh: its own mtime must be
    /// strictly newer than `source_mtime`, and strictly newer than every
    /// transitive dependency's own cache mtime (spec §4.E).
    fn is_fresh(&self, full_name: &str, source_mtime: SystemTime) -> bool {
        let Ok(Some(own_mtime)) = self.module_cache.freshness_timestamp(full_name) else {
            return false;
        };
        if own_mtime <= source_mtime {
            return false;
        }
        let Some(module) = self.modules.get(full_name) else {
            return false;
        };
        for dep in module.dependencies() {
            match self.module_cache.freshness_timestamp(dep) {
                Ok(Some(dep_mtime)) if dep_mtime < own_mtime => continue,
                _ => return false,
            }
        }
        true
    }

    /// Loads `full_name` if needed, then either returns its cached bitcode
    /// (deserialized into a fresh `inkwell::module::Module`) or compiles
    /// every function via K, merges the module's own emission, links in
    /// every dependency's compiled module, and stores the result in the
    /// cache (spec §4.D `compileModule`).
    pub fn compile_module(&mut self, full_name: &str, options: CompileOptions) -> (Option<LlvmModule<'ctx>>, DiagnosticRecord) {
        let mut record = self.load_module(full_name);
        if !record.success() {
            return (None, record);
        }

        let source_path = self.workspace_root.join("src").join(format!("{full_name}.chimod"));
        let source_mtime = std::fs::metadata(&source_path).and_then(|m| m.modified()).ok();

        if let Some(source_mtime) = source_mtime {
            if self.is_fresh(full_name, source_mtime) {
                if let Ok(Some(bitcode)) = self.module_cache.retrieve(full_name, source_mtime) {
                    if let Some(llvm_module) = self.parse_cached_bitcode(&bitcode, full_name) {
                        tracing::debug!("[CONTEXT] cache hit for {full_name}, skipping recompilation");
                        return (Some(llvm_module), record);
                    }
                }
            }
        }

        let llvm_module = self.llvm_context.create_module(full_name);
        record.extend(self.compile_module_fresh(full_name, &llvm_module, options));

        if options.link {
            let dependencies: Vec<String> = match self.module_by_name(full_name) {
                Ok(m) => m.dependencies().to_vec(),
                Err(_) => Vec::new(),
            };
            for dep in dependencies {
                let (dep_module, dep_record) = self.compile_module(&dep, options);
                record.extend(dep_record);
                if let Some(dep_module) = dep_module {
                    if let Err(e) = llvm_module.link_in_module(dep_module) {
                        record.push("ECodegen", format!("failed to link dependency {dep}: {e}"), serde_json::Value::Null);
                    }
                }
            }
        }

        if record.success() {
            if let Ok(buffer) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| llvm_module.write_bitcode_to_memory())) {
                if let Err(e) = self.module_cache.store(full_name, buffer.as_slice()) {
                    record.extend(DiagnosticRecord::from(e));
                }
            }
        }

        (Some(llvm_module), record)
    }

    fn compile_module_fresh(&self, full_name: &str, llvm_module: &LlvmModule<'ctx>, options: CompileOptions) -> DiagnosticRecord {
        let mut record = DiagnosticRecord::new();

        let module = match self.modules.get(full_name) {
            Some(module) => module,
            None => return ChiError::ModuleNotFound(full_name.to_string()).into(),
        };

        record.extend(module.emit_into_llvm_module(llvm_module));

        for function in module.functions() {
            record.extend(crate::codegen::function_compiler::compile_function(
                self,
                llvm_module,
                full_name,
                function,
                options.debug,
            ));
        }

        record
    }

    fn parse_cached_bitcode(&self, bitcode: &[u8], full_name: &str) -> Option<LlvmModule<'ctx>> {
        let buffer = inkwell::memory_buffer::MemoryBuffer::create_from_memory_range(bitcode, full_name);
        LlvmModule::parse_bitcode_from_buffer(&buffer, self.llvm_context).ok()
    }
}
