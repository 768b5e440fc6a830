//! Shared helpers for the end-to-end integration tests: writing `.chimod`
//! fixtures into a scratch workspace.

#![allow(dead_code)]

use std::path::Path;

/// Writes `json` to `<root>/src/<full_name>.chimod`, creating directories
/// as needed.
pub fn write_module(root: &Path, full_name: &str, json: &str) {
    let path = root.join("src").join(format!("{full_name}.chimod"));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, json).unwrap();
}

pub const IDENTITY_MODULE: &str = r#"{
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
