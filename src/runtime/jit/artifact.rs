use std::fmt;
use std::time::Duration;

use crate::runtime::jit::kernel::{NativeFn, ObjectFn};
use crate::runtime::jit::specialization::CallSignature;

/// Calling convention a compiled entry point follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallConv {
    /// Typed operands, no return value.
    Native,
    /// Every operand boxed as a host object, an object returned.
    Object,
}

/// Compiled entry point, tagged with its calling convention.
#[derive(Clone)]
pub enum EntryPoint {
    Native(NativeFn),
    Object(ObjectFn),
}

impl EntryPoint {
    pub fn convention(&self) -> CallConv {
        match self {
            EntryPoint::Native(_) => CallConv::Native,
            EntryPoint::Object(_) => CallConv::Object,
        }
    }
}

/// Identifier of the code library an artifact must be linked against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LibraryId(pub String);

/// Output of the kernel compiler for one call signature.
#[derive(Clone)]
pub struct CompiledArtifact {
    /// Symbol name of the compiled entry point.
    pub symbol: String,
    pub library: LibraryId,
    pub signature: CallSignature,
    pub entry: EntryPoint,
    pub compile_time: Duration,
}

impl CompiledArtifact {
    pub fn convention(&self) -> CallConv {
        self.entry.convention()
    }

    pub fn is_object_mode(&self) -> bool {
        self.convention() == CallConv::Object
    }
}

impl fmt::Debug for CompiledArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledArtifact")
            .field("symbol", &self.symbol)
            .field("library", &self.library)
            .field("signature", &self.signature.to_string())
            .field("convention", &self.convention())
            .finish()
    }
}
