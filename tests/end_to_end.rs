//! End-to-end compilation scenarios, covering one function from JSON source
//! all the way to verified LLVM IR.

mod common;

use inkwell::context::Context as LlvmContext;
use tempfile::tempdir;

use chigraph::context::{CompileOptions, Context};

use common::{write_module, IDENTITY_MODULE};

#[test]
fn identity_function_compiles_to_a_verified_function() {
    let llvm_ctx = LlvmContext::create();
    let root = tempdir().unwrap();
    write_module(root.path(), "id_module", IDENTITY_MODULE);

    let mut ctx = Context::new(root.path(), &llvm_ctx);
    let (module, record) = ctx.compile_module("id_module", CompileOptions::default());
    assert!(record.success(), "{}", record.render());

    let module = module.unwrap();
    let mangled = chigraph::mangle::mangle("id_module", "id");
    let function = module.get_function(&mangled).expect("mangled function should exist");
    assert!(function.verify(true));
}

#[test]
fn branch_on_bool_emits_a_conditional_branch_to_both_exits() {
    let llvm_ctx = LlvmContext::create();
    let root = tempdir().unwrap();

    let json = r#"{
        "dependencies": [],
        "types": {},
        "graphs": {
            "pick": {
                "type": "function",
                "name": "pick",
                "data_inputs": [{"cond": "lang:i1"}],
                "data_outputs": [{"result": "lang:i32"}],
                "exec_inputs": ["in"],
                "exec_outputs": ["out"],
                "local_variables": {},
                "nodes": {
                    "11111111-1111-1111-1111-111111111111": {"type": "lang:entry", "location": [0,0], "data": null},
                    "22222222-2222-2222-2222-222222222222": {"type": "lang:if", "location": [0,0], "data": null},
                    "33333333-3333-3333-3333-333333333333": {"type": "lang:exit", "location": [0,0], "data": null},
                    "44444444-4444-4444-4444-444444444444": {"type": "lang:exit", "location": [0,0], "data": null},
                    "55555555-5555-5555-5555-555555555555": {"type": "lang:const-int", "location": [0,0], "data": {"value": 1}},
                    "66666666-6666-6666-6666-666666666666": {"type": "lang:const-int", "location": [0,0], "data": {"value": 2}}
                },
                "connections": [
                    {"type": "exec", "input": ["11111111-1111-1111-1111-111111111111", 0], "output": ["22222222-2222-2222-2222-222222222222", 0]},
                    {"type": "exec", "input": ["22222222-2222-2222-2222-222222222222", 0], "output": ["33333333-3333-3333-3333-333333333333", 0]},
                    {"type": "exec", "input": ["22222222-2222-2222-2222-222222222222", 1], "output": ["44444444-4444-4444-4444-444444444444", 0]},
                    {"type": "data", "input": ["11111111-1111-1111-1111-111111111111", 0], "output": ["22222222-2222-2222-2222-222222222222", 0]},
                    {"type": "data", "input": ["55555555-5555-5555-5555-555555555555", 0], "output": ["33333333-3333-3333-3333-333333333333", 0]},
                    {"type": "data", "input": ["66666666-6666-6666-6666-666666666666", 0], "output": ["44444444-4444-4444-4444-444444444444", 0]}
                ]
            }
        }
    }"#;
    write_module(root.path(), "pick_module", json);

    let mut ctx = Context::new(root.path(), &llvm_ctx);
    let (module, record) = ctx.compile_module("pick_module", CompileOptions::default());
    assert!(record.success(), "{}", record.render());

    let module = module.unwrap();
    let mangled = chigraph::mangle::mangle("pick_module", "pick");
    let function = module.get_function(&mangled).expect("mangled function should exist");
    assert!(function.verify(true));

    let ir = module.print_to_string().to_string();
    assert!(ir.contains("br i1"), "expected a conditional branch in:\n{ir}");
}

#[test]
fn pure_fan_in_is_materialized_once_per_consumer_block() {
    let llvm_ctx = LlvmContext::create();
    let root = tempdir().unwrap();

    // double_sum(i32 a -> i32 result): sum = a + a, read by two exits on two
    // exec branches off an `if` — the `add` must appear twice in the IR, once
    // per consuming block, never joined through a phi.
    let json = r#"{
        "dependencies": [],
        "types": {},
        "graphs": {
            "double_sum": {
                "type": "function",
                "name": "double_sum",
                "data_inputs": [{"a": "lang:i32"}],
                "data_outputs": [{"result": "lang:i32"}],
                "exec_inputs": ["in"],
                "exec_outputs": ["out"],
                "local_variables": {},
                "nodes": {
                    "11111111-1111-1111-1111-111111111111": {"type": "lang:entry", "location": [0,0], "data": null},
                    "22222222-2222-2222-2222-222222222222": {"type": "lang:if", "location": [0,0], "data": null},
                    "33333333-3333-3333-3333-333333333333": {"type": "lang:exit", "location": [0,0], "data": null},
                    "44444444-4444-4444-4444-444444444444": {"type": "lang:exit", "location": [0,0], "data": null},
                    "55555555-5555-5555-5555-555555555555": {"type": "lang:add-i32", "location": [0,0], "data": null},
                    "66666666-6666-6666-6666-666666666666": {"type": "lang:const-bool", "location": [0,0], "data": {"value": true}}
                },
                "connections": [
                    {"type": "exec", "input": ["11111111-1111-1111-1111-111111111111", 0], "output": ["22222222-2222-2222-2222-222222222222", 0]},
                    {"type": "exec", "input": ["22222222-2222-2222-2222-222222222222", 0], "output": ["33333333-3333-3333-3333-333333333333", 0]},
                    {"type": "exec", "input": ["22222222-2222-2222-2222-222222222222", 1], "output": ["44444444-4444-4444-4444-444444444444", 0]},

                    {"type": "data", "input": ["66666666-6666-6666-6666-666666666666", 0], "output": ["22222222-2222-2222-2222-222222222222", 0]},

                    {"type": "data", "input": ["11111111-1111-1111-1111-111111111111", 0], "output": ["55555555-5555-5555-5555-555555555555", 0]},
                    {"type": "data", "input": ["11111111-1111-1111-1111-111111111111", 0], "output": ["55555555-5555-5555-5555-555555555555", 1]},

                    {"type": "data", "input": ["55555555-5555-5555-5555-555555555555", 0], "output": ["33333333-3333-3333-3333-333333333333", 0]},
                    {"type": "data", "input": ["55555555-5555-5555-5555-555555555555", 0], "output": ["44444444-4444-4444-4444-444444444444", 0]}
                ]
            }
        }
    }"#;
    write_module(root.path(), "double_sum_module", json);

    let mut ctx = Context::new(root.path(), &llvm_ctx);
    let (module, record) = ctx.compile_module("double_sum_module", CompileOptions::default());
    assert!(record.success(), "{}", record.render());

    let module = module.unwrap();
    let mangled = chigraph::mangle::mangle("double_sum_module", "double_sum");
    let function = module.get_function(&mangled).expect("mangled function should exist");
    assert!(function.verify(true));

    let ir = module.print_to_string().to_string();
    let add_count = ir.matches(" = add i32 ").count();
    assert_eq!(add_count, 2, "expected one `add` per consuming block, got:\n{ir}");
    assert!(!ir.contains("phi"), "pure materialization must never join through a phi:\n{ir}");
}

#[test]
fn use_before_def_is_rejected_before_codegen_is_attempted() {
    use chigraph::model::{GraphFunction, NodeInstance, Position};
    use uuid::Uuid;

    let llvm_ctx = LlvmContext::create();
    let root = tempdir().unwrap();
    let ctx = Context::new(root.path(), &llvm_ctx);

    // `middle` is an executed node (it declares one exec input and one exec
    // output) that reads its data input from `exit`, which only runs after
    // it on the exec path — `exit` appears later than its would-be consumer.
    let entry = NodeInstance::new(Uuid::new_v4(), "lang:entry", Position::zero(), 0, 0, 0, 1);
    let mut middle = NodeInstance::new(Uuid::new_v4(), "lang:const-int", Position::zero(), 0, 1, 1, 1);
    let exit = NodeInstance::new(Uuid::new_v4(), "lang:exit", Position::zero(), 1, 0, 1, 0);

    let entry_id = entry.id();
    let middle_id = middle.id();
    let exit_id = exit.id();

    middle.set_data_input(0, exit_id, 0);

    let mut function: GraphFunction = GraphFunction::new("broken", entry, vec![exit], vec![], vec![], vec![], vec![]);
    function.insert_node(middle);
    function.node_mut(entry_id).unwrap().set_exec_output(0, middle_id, 0);
    function.node_mut(middle_id).unwrap().add_exec_input(0, entry_id, 0);
    function.node_mut(middle_id).unwrap().set_exec_output(0, exit_id, 0);
    function.node_mut(exit_id).unwrap().add_exec_input(0, middle_id, 0);

    let llvm_module = llvm_ctx.create_module("broken_module");
    let record = chigraph::codegen::function_compiler::compile_function(&ctx, &llvm_module, "broken_module", &function, false);

    assert!(!record.success());
    assert!(record.entries().iter().any(|e| e.code == "EUseBeforeDef"), "{}", record.render());
    assert!(llvm_module.get_function(&chigraph::mangle::mangle("broken_module", "broken")).is_none());
}

#[test]
fn compiling_a_module_with_a_dependency_loads_and_caches_both() {
    let llvm_ctx = LlvmContext::create();
    let root = tempdir().unwrap();

    write_module(root.path(), "b", r#"{"dependencies": [], "types": {}, "graphs": {}}"#);
    write_module(root.path(), "a", r#"{"dependencies": ["b"], "types": {}, "graphs": {}}"#);

    let mut ctx = Context::new(root.path(), &llvm_ctx);
    let (_module, record) = ctx.compile_module("a", CompileOptions { debug: false, link: true });
    assert!(record.success(), "{}", record.render());

    assert!(ctx.module_by_name("a").is_ok());
    assert!(ctx.module_by_name("b").is_ok());

    let cache = chigraph::cache::DefaultModuleCache::new(root.path());
    assert!(cache.freshness_timestamp("a").unwrap().is_some());
    assert!(cache.freshness_timestamp("b").unwrap().is_some());

    let a_mtime = cache.freshness_timestamp("a").unwrap().unwrap();
    let a_source_mtime = std::fs::metadata(root.path().join("src/a.chimod")).unwrap().modified().unwrap();
    assert!(a_mtime > a_source_mtime);
}

#[test]
fn recompiling_an_untouched_module_hits_the_cache_and_skips_codegen() {
    let llvm_ctx = LlvmContext::create();
    let root = tempdir().unwrap();
    write_module(root.path(), "id_module", IDENTITY_MODULE);

    let mut ctx = Context::new(root.path(), &llvm_ctx);
    let (_module, record) = ctx.compile_module("id_module", CompileOptions::default());
    assert!(record.success(), "{}", record.render());
    assert!(chigraph::cache::DefaultModuleCache::new(root.path()).freshness_timestamp("id_module").unwrap().is_some());

    // A second compile against the same, untouched source must come back
    // from the cache without re-running K — observed here by swapping in a
    // cache whose `store` would panic if it were ever called again.
    struct PanicsOnStore(chigraph::cache::DefaultModuleCache);
    impl chigraph::cache::ModuleCache for PanicsOnStore {
        fn store(&self, _module_full_name: &str, _bitcode: &[u8]) -> chigraph::error::Result<()> {
            panic!("store() must not be called on a cache hit");
        }
        fn retrieve(&self, module_full_name: &str, must_be_newer_than: std::time::SystemTime) -> chigraph::error::Result<Option<Vec<u8>>> {
            self.0.retrieve(module_full_name, must_be_newer_than)
        }
        fn invalidate(&self, module_full_name: &str) -> chigraph::error::Result<()> {
            self.0.invalidate(module_full_name)
        }
        fn freshness_timestamp(&self, module_full_name: &str) -> chigraph::error::Result<Option<std::time::SystemTime>> {
            self.0.freshness_timestamp(module_full_name)
        }
    }

    let mut ctx2 = Context::with_cache(root.path(), &llvm_ctx, Box::new(PanicsOnStore(chigraph::cache::DefaultModuleCache::new(root.path()))));
    let (module, record) = ctx2.compile_module("id_module", CompileOptions::default());
    assert!(record.success(), "{}", record.render());
    assert!(module.is_some());
}
