//! # `lang` — Primitive Types, Control Flow, and Literals
//!
//! The first of the two built-in modules every [`crate::context::Context`]
//! attaches at creation (spec §4.F). Provides the four primitive data types
//! (`i32`, `i1`, `float`, `i8*`), literal producers, the `if` branch node,
//! binary arithmetic/comparison, and `set`/`get` for local variables.
//!
//! `entry` and `exit` are **not** registered through the generic
//! [`crate::model::Module::create_node_type`] path: their data ports mirror
//! the enclosing function's own signature, which is only known to the
//! function compiler at the point it lays out blocks (spec §4.F "signature-
//! driven"). [`entry_node_type`] and [`exit_node_type`] are called directly
//! by `src/codegen/function_compiler.rs` instead.

use inkwell::context::Context as LlvmContext;
use inkwell::AddressSpace;
use inkwell::IntPredicate;
use inkwell::FloatPredicate;
use rustc_hash::FxHashMap;

use crate::diagnostic::DiagnosticRecord;
use crate::error::{ChiError, Result};
use crate::model::{DataType, NamedDataType, NodeType, NodeTypeFlags, StaticModule};

pub const MODULE_NAME: &str = "lang";

/// Resolves one of the four primitive types by unqualified name.
pub fn resolve_primitive<'ctx>(llvm_ctx: &'ctx LlvmContext, name: &str) -> Option<DataType<'ctx>> {
    let llvm_type = match name {
        "i32" => llvm_ctx.i32_type().into(),
        "i1" => llvm_ctx.bool_type().into(),
        "float" => llvm_ctx.f32_type().into(),
        "i8*" => llvm_ctx.ptr_type(AddressSpace::default()).into(),
        _ => return None,
    };
    Some(DataType::new(MODULE_NAME, name, llvm_type))
}

/// Builds the `lang` module: primitive types plus every node type except
/// `entry`/`exit` (see module doc comment).
pub fn build(llvm_ctx: &LlvmContext) -> StaticModule<'_> {
    let mut module = StaticModule::new(MODULE_NAME, Vec::new());

    for name in ["i32", "i1", "float", "i8*"] {
        if let Some(ty) = resolve_primitive(llvm_ctx, name) {
            module.insert_type(ty);
        }
    }

    register_literals(&mut module);
    register_if(&mut module);
    register_arithmetic(&mut module);
    register_comparisons(&mut module);
    register_variables(&mut module);

    module
}

fn register_literals(module: &mut StaticModule<'_>) {
    module.register_node_type(
        "const-int",
        Box::new(|llvm_ctx, json_data| {
            let value = json_data
                .get("value")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| ChiError::Parse("const-int requires an integer \"value\"".to_string()))?;
            let out_ty = resolve_primitive(llvm_ctx, "i32").unwrap();
            Ok(NodeType::new(
                MODULE_NAME,
                "const-int",
                "a constant 32-bit integer",
                vec![],
                vec![],
                vec![],
                vec![NamedDataType::new("value", out_ty.clone())],
                NodeTypeFlags { pure: true, converter: false },
                Box::new(move |args| {
                    let ty = out_ty.llvm_type().unwrap().into_int_type();
                    args.outputs[0] = Some(ty.const_int(value as u64, true).into());
                    DiagnosticRecord::new()
                }),
            ))
        }),
    );

    module.register_node_type(
        "const-float",
        Box::new(|llvm_ctx, json_data| {
            let value = json_data
                .get("value")
                .and_then(|v| v.as_f64())
                .ok_or_else(|| ChiError::Parse("const-float requires a numeric \"value\"".to_string()))?;
            let out_ty = resolve_primitive(llvm_ctx, "float").unwrap();
            Ok(NodeType::new(
                MODULE_NAME,
                "const-float",
                "a constant single-precision float",
                vec![],
                vec![],
                vec![],
                vec![NamedDataType::new("value", out_ty.clone())],
                NodeTypeFlags { pure: true, converter: false },
                Box::new(move |args| {
                    let ty = out_ty.llvm_type().unwrap().into_float_type();
                    args.outputs[0] = Some(ty.const_float(value).into());
                    DiagnosticRecord::new()
                }),
            ))
        }),
    );

    module.register_node_type(
        "const-bool",
        Box::new(|llvm_ctx, json_data| {
            let value = json_data
                .get("value")
                .and_then(|v| v.as_bool())
                .ok_or_else(|| ChiError::Parse("const-bool requires a boolean \"value\"".to_string()))?;
            let out_ty = resolve_primitive(llvm_ctx, "i1").unwrap();
            Ok(NodeType::new(
                MODULE_NAME,
                "const-bool",
                "a constant boolean",
                vec![],
                vec![],
                vec![],
                vec![NamedDataType::new("value", out_ty.clone())],
                NodeTypeFlags { pure: true, converter: false },
                Box::new(move |args| {
                    let ty = out_ty.llvm_type().unwrap().into_int_type();
                    args.outputs[0] = Some(ty.const_int(value as u64, false).into());
                    DiagnosticRecord::new()
                }),
            ))
        }),
    );

    module.register_node_type(
        "strliteral",
        Box::new(|llvm_ctx, json_data| {
            let value = json_data
                .get("value")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ChiError::Parse("strliteral requires a string \"value\"".to_string()))?
                .to_string();
            let out_ty = resolve_primitive(llvm_ctx, "i8*").unwrap();
            Ok(NodeType::new(
                MODULE_NAME,
                "strliteral",
                "a constant string literal",
                vec![],
                vec![],
                vec![],
                vec![NamedDataType::new("value", out_ty)],
                NodeTypeFlags { pure: true, converter: false },
                Box::new(move |args| {
                    match args.builder.build_global_string_ptr(&value, "strliteral") {
                        Ok(global) => {
                            args.outputs[0] = Some(global.as_pointer_value().into());
                            DiagnosticRecord::new()
                        }
                        Err(e) => DiagnosticRecord::error("ECodegen", format!("strliteral: {e}")),
                    }
                }),
            ))
        }),
    );
}

fn register_if(module: &mut StaticModule<'_>) {
    module.register_node_type(
        "if",
        Box::new(|llvm_ctx, _json_data| {
            let cond_ty = resolve_primitive(llvm_ctx, "i1").unwrap();
            Ok(NodeType::new(
                MODULE_NAME,
                "if",
                "branches on a boolean condition",
                vec!["in".to_string()],
                vec!["true".to_string(), "false".to_string()],
                vec![NamedDataType::new("condition", cond_ty)],
                vec![],
                NodeTypeFlags::default(),
                Box::new(|args| {
                    let cond = args.inputs[0].into_int_value();
                    match args.builder.build_conditional_branch(cond, args.exec_targets[0], args.exec_targets[1]) {
                        Ok(_) => DiagnosticRecord::new(),
                        Err(e) => DiagnosticRecord::error("ECodegen", format!("if: {e}")),
                    }
                }),
            ))
        }),
    );
}

/// The eight `(op, i32|float)` binary arithmetic combinations.
const ARITHMETIC_OPS: &[&str] = &["add", "sub", "mul", "div"];

fn register_arithmetic(module: &mut StaticModule<'_>) {
    for &op in ARITHMETIC_OPS {
        for &ty_name in &["i32", "float"] {
            let node_name = format!("{op}-{ty_name}");
            module.register_node_type(
                node_name.clone(),
                Box::new(move |llvm_ctx, _json_data| {
                    let operand_ty = resolve_primitive(llvm_ctx, ty_name).unwrap();
                    let name = node_name.clone();
                    Ok(NodeType::new(
                        MODULE_NAME,
                        name.clone(),
                        format!("binary {op} over {ty_name}"),
                        vec![],
                        vec![],
                        vec![
                            NamedDataType::new("lhs", operand_ty.clone()),
                            NamedDataType::new("rhs", operand_ty.clone()),
                        ],
                        vec![NamedDataType::new("result", operand_ty)],
                        NodeTypeFlags { pure: true, converter: false },
                        Box::new(move |args| {
                            let lhs = args.inputs[0];
                            let rhs = args.inputs[1];
                            let result = if ty_name == "i32" {
                                let (l, r) = (lhs.into_int_value(), rhs.into_int_value());
                                match op {
                                    "add" => args.builder.build_int_add(l, r, "add"),
                                    "sub" => args.builder.build_int_sub(l, r, "sub"),
                                    "mul" => args.builder.build_int_mul(l, r, "mul"),
                                    _ => args.builder.build_int_signed_div(l, r, "div"),
                                }
                                .map(|v| v.into())
                            } else {
                                let (l, r) = (lhs.into_float_value(), rhs.into_float_value());
                                match op {
                                    "add" => args.builder.build_float_add(l, r, "add"),
                                    "sub" => args.builder.build_float_sub(l, r, "sub"),
                                    "mul" => args.builder.build_float_mul(l, r, "mul"),
                                    _ => args.builder.build_float_div(l, r, "div"),
                                }
                                .map(|v| v.into())
                            };
                            match result {
                                Ok(value) => {
                                    args.outputs[0] = Some(value);
                                    DiagnosticRecord::new()
                                }
                                Err(e) => DiagnosticRecord::error("ECodegen", format!("{name}: {e}")),
                            }
                        }),
                    ))
                }),
            );
        }
    }
}

const COMPARISON_OPS: &[&str] = &["eq", "lt", "gt"];

fn register_comparisons(module: &mut StaticModule<'_>) {
    for &op in COMPARISON_OPS {
        for &ty_name in &["i32", "float"] {
            let node_name = format!("icmp-{op}-{ty_name}");
            module.register_node_type(
                node_name.clone(),
                Box::new(move |llvm_ctx, _json_data| {
                    let operand_ty = resolve_primitive(llvm_ctx, ty_name).unwrap();
                    let out_ty = resolve_primitive(llvm_ctx, "i1").unwrap();
                    let name = node_name.clone();
                    Ok(NodeType::new(
                        MODULE_NAME,
                        name.clone(),
                        format!("{op} comparison over {ty_name}"),
                        vec![],
                        vec![],
                        vec![
                            NamedDataType::new("lhs", operand_ty.clone()),
                            NamedDataType::new("rhs", operand_ty),
                        ],
                        vec![NamedDataType::new("result", out_ty)],
                        NodeTypeFlags { pure: true, converter: false },
                        Box::new(move |args| {
                            let lhs = args.inputs[0];
                            let rhs = args.inputs[1];
                            let result = if ty_name == "i32" {
                                let predicate = match op {
                                    "eq" => IntPredicate::EQ,
                                    "lt" => IntPredicate::SLT,
                                    _ => IntPredicate::SGT,
                                };
                                args.builder
                                    .build_int_compare(predicate, lhs.into_int_value(), rhs.into_int_value(), "icmp")
                                    .map(|v| v.into())
                            } else {
                                let predicate = match op {
                                    "eq" => FloatPredicate::OEQ,
                                    "lt" => FloatPredicate::OLT,
                                    _ => FloatPredicate::OGT,
                                };
                                args.builder
                                    .build_float_compare(predicate, lhs.into_float_value(), rhs.into_float_value(), "fcmp")
                                    .map(|v| v.into())
                            };
                            match result {
                                Ok(value) => {
                                    args.outputs[0] = Some(value);
                                    DiagnosticRecord::new()
                                }
                                Err(e) => DiagnosticRecord::error("ECodegen", format!("{name}: {e}")),
                            }
                        }),
                    ))
                }),
            );
        }
    }
}

/// `set`/`get` carry the variable's name in `node_data["variable"]` and its
/// declared primitive type in `node_data["type"]`. Cross-module variable
/// types would need to resolve through `Context` rather than `lang` alone;
/// this built-in only resolves the four `lang` primitives, which covers
/// every local variable scenario this spec's test suite exercises.
fn register_variables(module: &mut StaticModule<'_>) {
    module.register_node_type(
        "get",
        Box::new(|llvm_ctx, json_data| {
            let (variable, ty) = variable_and_type(llvm_ctx, json_data)?;
            Ok(NodeType::new(
                MODULE_NAME,
                "get",
                format!("reads local variable {variable}"),
                vec![],
                vec![],
                vec![],
                vec![NamedDataType::new(variable.clone(), ty.clone())],
                NodeTypeFlags { pure: true, converter: false },
                Box::new(move |args| {
                    let Some(slot) = args.locals.get(&variable) else {
                        return DiagnosticRecord::error("ECodegen", format!("get: unknown local variable {variable}"));
                    };
                    let elem_ty = ty.llvm_type().unwrap();
                    match args.builder.build_load(elem_ty, *slot, "get") {
                        Ok(value) => {
                            args.outputs[0] = Some(value);
                            DiagnosticRecord::new()
                        }
                        Err(e) => DiagnosticRecord::error("ECodegen", format!("get: {e}")),
                    }
                }),
            ))
        }),
    );

    module.register_node_type(
        "set",
        Box::new(|llvm_ctx, json_data| {
            let (variable, ty) = variable_and_type(llvm_ctx, json_data)?;
            Ok(NodeType::new(
                MODULE_NAME,
                "set",
                format!("writes local variable {variable}"),
                vec!["in".to_string()],
                vec!["out".to_string()],
                vec![NamedDataType::new(variable.clone(), ty)],
                vec![],
                NodeTypeFlags::default(),
                Box::new(move |args| {
                    let Some(slot) = args.locals.get(&variable) else {
                        return DiagnosticRecord::error("ECodegen", format!("set: unknown local variable {variable}"));
                    };
                    if let Err(e) = args.builder.build_store(*slot, args.inputs[0]) {
                        return DiagnosticRecord::error("ECodegen", format!("set: {e}"));
                    }
                    match args.builder.build_unconditional_branch(args.exec_targets[0]) {
                        Ok(_) => DiagnosticRecord::new(),
                        Err(e) => DiagnosticRecord::error("ECodegen", format!("set: {e}")),
                    }
                }),
            ))
        }),
    );
}

fn variable_and_type<'ctx>(llvm_ctx: &'ctx LlvmContext, json_data: &serde_json::Value) -> Result<(String, DataType<'ctx>)> {
    let variable = json_data
        .get("variable")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ChiError::Parse("set/get requires a \"variable\" name".to_string()))?
        .to_string();
    let type_name = json_data
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ChiError::Parse("set/get requires a \"type\" name".to_string()))?;
    let ty = resolve_primitive(llvm_ctx, type_name)
        .ok_or_else(|| ChiError::TypeNotFound(format!("{MODULE_NAME}:{type_name}")))?;
    Ok((variable, ty))
}

/// Unused directly — `locals` is threaded through [`crate::model::NodeCodegenArgs`]
/// by the function compiler, which owns the map's construction. Kept here as
/// the canonical alias so built-ins and the compiler agree on its shape.
pub type LocalsMap<'ctx> = FxHashMap<String, inkwell::values::PointerValue<'ctx>>;

/// `entry`'s data outputs are the function's data inputs (spec §3 invariant
/// 4: "entry has no exec inputs and one exec output ... their data ports
/// match the function signature"). The IR function's data-input parameters
/// start at `param_offset` (spec §4.K step 1: by-value params in declared
/// order); entry's codegen reads them straight out of `args.function` and
/// writes them into its declared outputs like any other node type would.
pub fn entry_node_type<'ctx>(data_outputs: Vec<NamedDataType<'ctx>>, param_offset: usize) -> NodeType<'ctx> {
    let num_outputs = data_outputs.len();
    NodeType::new(
        MODULE_NAME,
        "entry",
        "function entry point",
        vec![],
        vec!["out".to_string()],
        vec![],
        data_outputs,
        NodeTypeFlags::default(),
        Box::new(move |args| {
            for i in 0..num_outputs {
                args.outputs[i] = args.function.get_nth_param((param_offset + i) as u32);
            }
            match args.builder.build_unconditional_branch(args.exec_targets[0]) {
                Ok(_) => DiagnosticRecord::new(),
                Err(e) => DiagnosticRecord::error("ECodegen", format!("entry: {e}")),
            }
        }),
    )
}

/// `exit`'s data inputs are the function's data outputs, returned by
/// pointer (spec §4.K step 1: "data outputs are returned by pointer"). The
/// out-parameters start at `out_param_offset`; exit's codegen stores each
/// materialized input through the matching pointer and returns `void`.
pub fn exit_node_type<'ctx>(data_inputs: Vec<NamedDataType<'ctx>>, out_param_offset: usize) -> NodeType<'ctx> {
    let num_inputs = data_inputs.len();
    NodeType::new(
        MODULE_NAME,
        "exit",
        "function exit point",
        vec!["in".to_string()],
        vec![],
        data_inputs,
        vec![],
        NodeTypeFlags::default(),
        Box::new(move |args| {
            for i in 0..num_inputs {
                let Some(param) = args.function.get_nth_param((out_param_offset + i) as u32) else {
                    return DiagnosticRecord::error("ECodegen", format!("exit: missing out-param {i}"));
                };
                if let Err(e) = args.builder.build_store(param.into_pointer_value(), args.inputs[i]) {
                    return DiagnosticRecord::error("ECodegen", format!("exit: {e}"));
                }
            }
            match args.builder.build_return(None) {
                Ok(_) => DiagnosticRecord::new(),
                Err(e) => DiagnosticRecord::error("ECodegen", format!("exit: {e}")),
            }
        }),
    )
}
