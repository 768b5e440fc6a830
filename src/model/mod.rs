//! Data model: the in-memory representation of a Chigraph program
//! (spec §4.C).

pub mod function;
pub mod module;
pub mod node_instance;
pub mod node_type;
pub mod types;

pub use function::{GraphFunction, LocalVariable};
pub use module::{GraphStruct, GraphStructError, Module, StaticModule};
pub use node_instance::{NodeInstance, PortRef};
pub use node_type::{NodeCodegenArgs, NodeCodegenFn, NodeType, NodeTypeFlags};
pub use types::{DataType, NamedDataType, Position};
