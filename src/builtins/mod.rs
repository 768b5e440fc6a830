//! Built-in modules attached to every [`crate::context::Context`] at
//! creation (spec §3 "Creation attaches the two built-ins").

pub mod c_module;
pub mod lang;
