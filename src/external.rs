//! # External Collaborators
//!
//! Trait boundaries only — the GUI editor, the CLI entry points, the
//! remote-fetch subsystem, and the debugger front-end are out of scope
//! (spec §1) and are never implemented beyond the shape their calling code
//! needs to compile and be testable against a fake.

use crate::error::Result;

/// Boundary for the remote-fetch subsystem: clones a module's dependency
/// closure from a recognized VCS URL form (spec §6 "Dependent subprocesses":
/// `github.com/<user>/<repo>[/<path>]`). The real implementation spawns
/// `git` as a child process and drains its standard streams on the calling
/// thread (spec §5); that process management lives entirely outside this
/// crate's scope.
pub trait Fetcher {
    /// Fetches `module_full_name` (and, if `recursive`, its declared
    /// dependencies) into the workspace, returning the set of full names
    /// that now exist on disk.
    fn fetch(&self, module_full_name: &str, recursive: bool) -> Result<Vec<String>>;
}

/// Arguments passed to the out-of-process C-to-LLVM-bitcode helper
/// (`chi-ctollvm`) invoked by the `c` built-in module (spec §4.F, §6).
/// stdin carries `c_source`; stdout is expected to be the resulting
/// bitcode; `clang_args` are forwarded verbatim.
#[derive(Debug, Clone, Default)]
pub struct ExternalCompilerArgs {
    pub c_source: String,
    pub function_name: String,
    pub clang_args: Vec<String>,
}

/// Boundary for the interactive debugger front-end: a separate listener
/// loop (spec §5) that reads stepping events off the LLVM debug-info
/// handle this crate attaches during codegen. Holds only a weak reference
/// to the shared debugger object so it exits cleanly when strong references
/// drop; not implemented here.
pub trait DebuggerFrontend {
    /// Called once per compiled function, with its mangled symbol name, so
    /// the debugger can map addresses back to source locations.
    fn notify_function_compiled(&self, mangled_symbol: &str);
}
