use std::collections::{BTreeSet, HashMap};
use std::fmt;

use gufunc_types::Type;
use tracing::warn;

use crate::runtime::jit::LibraryId;

/// Low-level function type of a callee: return type and parameter types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub return_type: Type,
    pub params: Vec<Type>,
}

impl FunctionType {
    pub fn new(return_type: Type, params: Vec<Type>) -> Self {
        Self {
            return_type,
            params,
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self
            .params
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{} ({})", self.return_type, params)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FnAttribute {
    AlwaysInline,
    NoInline,
}

/// External function declared in a codegen module.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub fnty: FunctionType,
    pub attributes: BTreeSet<FnAttribute>,
}

impl FunctionDecl {
    pub fn has_attribute(&self, attribute: FnAttribute) -> bool {
        self.attributes.contains(&attribute)
    }
}

/// Declarations and link requirements accumulated by one lowering pass.
#[derive(Debug)]
pub struct CodegenModule {
    name: String,
    functions: HashMap<String, FunctionDecl>,
    linked: BTreeSet<LibraryId>,
}

impl CodegenModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: HashMap::new(),
            linked: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare `name` with `fnty`, or return the existing declaration.
    pub fn get_or_insert_function(&mut self, fnty: FunctionType, name: &str) -> &mut FunctionDecl {
        let decl = self
            .functions
            .entry(name.to_string())
            .or_insert_with(|| FunctionDecl {
                name: name.to_string(),
                fnty: fnty.clone(),
                attributes: BTreeSet::new(),
            });
        if decl.fnty != fnty {
            warn!(
                function = name,
                declared = %decl.fnty,
                requested = %fnty,
                "function redeclared with a different type"
            );
        }
        decl
    }

    pub fn get_function(&self, name: &str) -> Option<&FunctionDecl> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.functions.values()
    }

    pub fn add_linking_libs(&mut self, libs: impl IntoIterator<Item = LibraryId>) {
        self.linked.extend(libs);
    }

    pub fn linked_libraries(&self) -> impl Iterator<Item = &LibraryId> {
        self.linked.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gufunc_types::ScalarType;

    #[test]
    fn declarations_are_reused() {
        let mut module = CodegenModule::new("test");
        let fnty = FunctionType::new(Type::None, vec![Type::scalar(ScalarType::Float64)]);
        module
            .get_or_insert_function(fnty.clone(), "kernel")
            .attributes
            .insert(FnAttribute::AlwaysInline);
        let again = module.get_or_insert_function(fnty, "kernel");
        assert!(again.has_attribute(FnAttribute::AlwaysInline));
        assert_eq!(module.functions().count(), 1);
    }

    #[test]
    fn linked_libraries_are_deduplicated() {
        let mut module = CodegenModule::new("test");
        module.add_linking_libs([LibraryId("a".into()), LibraryId("a".into())]);
        assert_eq!(module.linked_libraries().count(), 1);
    }
}
