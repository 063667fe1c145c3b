// JIT specialization runtime
pub mod artifact;
pub mod cache;
pub mod engine;
pub mod kernel;
pub mod specialization;

pub use artifact::{CallConv, CompiledArtifact, EntryPoint, LibraryId};
pub use cache::{SpecializationEntry, SpecializationRegistry};
pub use engine::{CompilationError, CompileRequest, JitEngine, KernelCompiler};
pub use kernel::{KernelBody, KernelError, KernelImpl, KernelLibrary, NativeFn, ObjectFn};
pub use specialization::{
    CallSignature, ElementwiseKey, Resolution, ResolutionKind, SpecializationResolver,
};
