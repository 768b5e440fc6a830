//! # `c` — Compiling C Snippets Into Node Types
//!
//! The second built-in module (spec §4.F). Exposes a single node type,
//! `func`, whose JSON payload carries a C source blob, the name of the
//! function inside it, and extra clang arguments. Creating the node type
//! shells out to the `chi-ctollvm` helper (spec §6 "Dependent subprocesses":
//! stdin is the C source, arguments are extra clang flags, stdout is the
//! resulting LLVM bitcode), parses the returned bitcode to recover the
//! function's signature, and derives the node type's data ports from it.
//! The parsed module is linked into the final IR at
//! [`Module::emit_into_llvm_module`] time.

use std::cell::RefCell;
use std::io::Write;
use std::process::{Command, Stdio};

use inkwell::context::Context as LlvmContext;
use inkwell::memory_buffer::MemoryBuffer;
use inkwell::module::Module as LlvmModule;
use inkwell::types::BasicTypeEnum;

use crate::diagnostic::DiagnosticRecord;
use crate::error::{ChiError, Result};
use crate::external::ExternalCompilerArgs;
use crate::model::{DataType, Module, NamedDataType, NodeType, NodeTypeFlags};

pub const MODULE_NAME: &str = "c";

/// Invokes the `chi-ctollvm` helper: stdin is the C source, argv is extra
/// clang flags, stdout is raw LLVM bitcode.
pub fn invoke_ctollvm(args: &ExternalCompilerArgs) -> Result<Vec<u8>> {
    let mut child = Command::new("chi-ctollvm")
        .args(&args.clang_args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ChiError::Subprocess {
            program: "chi-ctollvm".to_string(),
            detail: e.to_string(),
        })?;

    child
        .stdin
        .take()
        .expect("piped stdin")
        .write_all(args.c_source.as_bytes())
        .map_err(|e| ChiError::Subprocess {
            program: "chi-ctollvm".to_string(),
            detail: e.to_string(),
        })?;

    let output = child.wait_with_output().map_err(|e| ChiError::Subprocess {
        program: "chi-ctollvm".to_string(),
        detail: e.to_string(),
    })?;

    if !output.status.success() {
        return Err(ChiError::Subprocess {
            program: "chi-ctollvm".to_string(),
            detail: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(output.stdout)
}

/// Maps an LLVM basic type back to a `lang`-qualified [`DataType`], the only
/// direction this built-in needs (C parameter/return types it can represent
/// are exactly the ones `lang` already declares).
fn classify_llvm_type<'ctx>(llvm_ctx: &'ctx LlvmContext, ty: BasicTypeEnum<'ctx>) -> Option<DataType<'ctx>> {
    match ty {
        BasicTypeEnum::IntType(int_ty) if int_ty.get_bit_width() == 32 => {
            super::lang::resolve_primitive(llvm_ctx, "i32")
        }
        BasicTypeEnum::IntType(int_ty) if int_ty.get_bit_width() == 1 => {
            super::lang::resolve_primitive(llvm_ctx, "i1")
        }
        BasicTypeEnum::FloatType(_) => super::lang::resolve_primitive(llvm_ctx, "float"),
        BasicTypeEnum::PointerType(_) => super::lang::resolve_primitive(llvm_ctx, "i8*"),
        _ => None,
    }
}

/// The `c` built-in module. `func` node types are built by parsing bitcode
/// returned from [`invoke_ctollvm`]; every successfully parsed module is
/// retained so it can be linked into the final compilation at
/// [`Module::emit_into_llvm_module`].
pub struct CModule<'ctx> {
    pending_links: RefCell<Vec<LlvmModule<'ctx>>>,
}

impl<'ctx> CModule<'ctx> {
    pub fn new() -> Self {
        Self { pending_links: RefCell::new(Vec::new()) }
    }

    /// Builds the `func` node type from a node instance's JSON payload
    /// (`c_source`, `function_name`, `clang_args`), invoking the C-to-
    /// bitcode helper and deriving data ports from the parsed signature.
    fn build_func_node_type(&self, llvm_ctx: &'ctx LlvmContext, json_data: &serde_json::Value) -> Result<NodeType<'ctx>> {
        let c_source = json_data
            .get("c_source")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChiError::Parse("func requires \"c_source\"".to_string()))?
            .to_string();
        let function_name = json_data
            .get("function_name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChiError::Parse("func requires \"function_name\"".to_string()))?
            .to_string();
        let clang_args: Vec<String> = json_data
            .get("clang_args")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let bitcode = invoke_ctollvm(&ExternalCompilerArgs {
            c_source,
            function_name: function_name.clone(),
            clang_args,
        })?;

        let buffer = MemoryBuffer::create_from_memory_range(&bitcode, &function_name);
        let parsed = LlvmModule::parse_bitcode_from_buffer(&buffer, llvm_ctx)
            .map_err(|e| ChiError::Parse(format!("chi-ctollvm returned unparseable bitcode: {e}")))?;

        let function = parsed
            .get_function(&function_name)
            .ok_or_else(|| ChiError::Parse(format!("{function_name} not found in compiled bitcode")))?;

        let data_inputs: Vec<NamedDataType<'ctx>> = function
            .get_param_iter()
            .enumerate()
            .filter_map(|(i, param)| {
                classify_llvm_type(llvm_ctx, param.get_type()).map(|ty| NamedDataType::new(format!("arg{i}"), ty))
            })
            .collect();

        let data_outputs: Vec<NamedDataType<'ctx>> = function
            .get_type()
            .get_return_type()
            .and_then(|ret| classify_llvm_type(llvm_ctx, ret))
            .map(|ty| vec![NamedDataType::new("result", ty)])
            .unwrap_or_default();

        self.pending_links.borrow_mut().push(parsed);

        let node_name = format!("func:{function_name}");
        Ok(NodeType::new(
            MODULE_NAME,
            node_name,
            format!("calls the C function {function_name}"),
            vec!["in".to_string()],
            vec!["out".to_string()],
            data_inputs,
            data_outputs,
            NodeTypeFlags::default(),
            Box::new(move |args| call_linked_function(&function_name, args)),
        ))
    }
}

impl<'ctx> Default for CModule<'ctx> {
    fn default() -> Self {
        Self::new()
    }
}

/// Emits a call to the C function named `function_name`, already linked
/// into `args.llvm_module` by [`Module::emit_into_llvm_module`], forwarding
/// `args.inputs`, storing the result (if any) in `args.outputs`, then
/// branching to the single exec-out target.
fn call_linked_function(function_name: &str, args: &mut crate::model::NodeCodegenArgs<'_, '_>) -> DiagnosticRecord {
    let Some(callee) = args.llvm_module.get_function(function_name) else {
        return DiagnosticRecord::error("ECodegen", format!("func: {function_name} not linked into module"));
    };

    let arg_values: Vec<_> = args.inputs.iter().map(|v| (*v).into()).collect();
    match args.builder.build_call(callee, &arg_values, "func_call") {
        Ok(call_site) => {
            if let Some(result) = call_site.try_as_basic_value().left() {
                if let Some(slot) = args.outputs.first_mut() {
                    *slot = Some(result);
                }
            }
            match args.builder.build_unconditional_branch(args.exec_targets[0]) {
                Ok(_) => DiagnosticRecord::new(),
                Err(e) => DiagnosticRecord::error("ECodegen", format!("func: {e}")),
            }
        }
        Err(e) => DiagnosticRecord::error("ECodegen", format!("func: {e}")),
    }
}

impl<'ctx> Module<'ctx> for CModule<'ctx> {
    fn full_name(&self) -> &str {
        MODULE_NAME
    }

    fn dependencies(&self) -> &[String] {
        &[]
    }

    fn enumerate_node_type_names(&self) -> Vec<String> {
        vec!["func".to_string()]
    }

    fn enumerate_type_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn create_node_type(
        &self,
        llvm_ctx: &'ctx LlvmContext,
        name: &str,
        json_data: &serde_json::Value,
    ) -> Result<NodeType<'ctx>> {
        if name != "func" {
            return Err(ChiError::NodeTypeNotFound(format!("{MODULE_NAME}:{name}")));
        }
        self.build_func_node_type(llvm_ctx, json_data)
    }

    fn resolve_type(&self, _llvm_ctx: &'ctx LlvmContext, _name: &str) -> Option<DataType<'ctx>> {
        None
    }

    fn emit_into_llvm_module(&self, llvm_module: &LlvmModule<'ctx>) -> DiagnosticRecord {
        let mut record = DiagnosticRecord::new();
        for parsed in self.pending_links.borrow_mut().drain(..) {
            if let Err(e) = llvm_module.link_in_module(parsed) {
                record.push("ECodegen", format!("failed to link compiled C module: {e}"), serde_json::Value::Null);
            }
        }
        record
    }
}
