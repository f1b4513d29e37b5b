pub mod classifier;
pub mod emitter;
pub mod sequence;

pub use classifier::{classify, DispatchClassifier, DispatchDecision, DispatchTable};
pub use emitter::{CodeEmitter, CompiledBody, InterpretingEmitter, InvocationFrame};
pub use sequence::{DispatchSequence, EmitEnv, Expr, Instruction, ReturnCoercion};
