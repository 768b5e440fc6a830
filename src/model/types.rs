//! # Type System
//!
//! A [`DataType`] is a `(owningModule, unqualifiedName)` pair plus an opaque
//! handle to a backing LLVM type and an optional debug-info handle (spec
//! §3 "Data type"). Equality is by qualified name, not by the LLVM handles
//! — two `DataType` values for the same module/name pair are always equal
//! even if they were resolved through different `inkwell::context::Context`
//! instances, since handles only ever get compared within one compilation.

use inkwell::debug_info::DIType;
use inkwell::types::BasicTypeEnum;
use std::fmt;

/// A data type owned by a module, backed by an LLVM type.
///
/// A type is *valid* iff both `module` and `name` are non-empty; malformed
/// (partially constructed) types should never escape module loading.
#[derive(Clone)]
pub struct DataType<'ctx> {
    /// Full name of the owning module.
    module: String,

    /// Unqualified name within that module.
    name: String,

    /// Backing LLVM type, resolved once the owning module is loaded.
    llvm_type: Option<BasicTypeEnum<'ctx>>,

    /// Debug-info type handle, present only when compiling with `--debug`.
    debug_type: Option<DIType<'ctx>>,
}

impl<'ctx> DataType<'ctx> {
    /// Constructs a type with a resolved LLVM backing type but no debug info.
    pub fn new(module: impl Into<String>, name: impl Into<String>, llvm_type: BasicTypeEnum<'ctx>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            llvm_type: Some(llvm_type),
            debug_type: None,
        }
    }

    /// Constructs a type with debug info attached.
    pub fn with_debug_info(mut self, debug_type: DIType<'ctx>) -> Self {
        self.debug_type = Some(debug_type);
        self
    }

    /// The owning module's full name.
    #[inline]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// The unqualified name within the owning module.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `"<moduleFullName>:<unqualifiedName>"`.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.module, self.name)
    }

    /// The backing LLVM type, if resolved.
    #[inline]
    pub fn llvm_type(&self) -> Option<BasicTypeEnum<'ctx>> {
        self.llvm_type
    }

    /// The debug-info type handle, if present.
    #[inline]
    pub fn debug_type(&self) -> Option<DIType<'ctx>> {
        self.debug_type
    }

    /// A type is valid iff both halves of its qualified name are non-empty.
    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.module.is_empty() && !self.name.is_empty()
    }

    /// Parses a `"<module>:<name>"` qualified name back into its halves.
    /// Does not resolve an LLVM backing type — callers must look that up
    /// through a [`crate::context::Context`].
    pub fn split_qualified_name(qualified: &str) -> Option<(&str, &str)> {
        qualified.split_once(':')
    }
}

impl fmt::Debug for DataType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataType")
            .field("qualified_name", &self.qualified_name())
            .field("resolved", &self.llvm_type.is_some())
            .finish()
    }
}

impl PartialEq for DataType<'_> {
    /// Equality is by qualified name, per spec §3.
    fn eq(&self, other: &Self) -> bool {
        self.module == other.module && self.name == other.name
    }
}
impl Eq for DataType<'_> {}

/// A `(name, DataType)` pair, used for node input/output ports and struct
/// fields (spec §3 "Named data type").
#[derive(Debug, Clone, PartialEq)]
pub struct NamedDataType<'ctx> {
    pub name: String,
    pub ty: DataType<'ctx>,
}

impl<'ctx> NamedDataType<'ctx> {
    pub fn new(name: impl Into<String>, ty: DataType<'ctx>) -> Self {
        Self { name: name.into(), ty }
    }
}

/// 2D position in the visual editor. Ignored by the compiler; carried
/// purely for round-tripping through the JSON format.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn zero() -> Self {
        Self { x: 0.0, y: 0.0 }
    }
}

impl Default for Position {
    #[inline]
    fn default() -> Self {
        Self::zero()
    }
}
