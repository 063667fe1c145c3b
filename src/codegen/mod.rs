pub mod lowering;
pub mod module;
pub mod trampoline;
pub mod typing;

pub use lowering::{ArgPattern, CallShape, FuncDefn, Lowerer, LoweringPass, TargetContext};
pub use module::{CodegenModule, FnAttribute, FunctionDecl, FunctionType};
pub use trampoline::{CallingConvention, KernelTrampoline, NativeConvention, ObjectConvention};
pub use typing::{CallTemplate, FunctionKey, TypingContext};
