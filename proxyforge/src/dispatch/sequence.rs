//! Invocation descriptors handed to the code emitter.
//!
//! A [`DispatchSequence`] says what a method body must do; turning it into
//! something executable is the emitter's job.

use crate::types::{MethodSignature, TypeRef};
use serde::Serialize;

/// Name of the local a function table strategy binds its handler to.
pub const HANDLER_LOCAL: &str = "target$f";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Read a captured field of the proxy instance.
    Field(String),
    Local(String),
    /// Actual parameter at this position.
    Param(usize),
    TableGet { table: Box<Expr>, index: usize },
    /// The shared zero-length argument array.
    EmptyArgs,
    /// A fresh argument array populated positionally.
    NewArgs(Vec<Expr>),
    /// Call a function table handler with an argument array.
    Apply { function: Box<Expr>, args: Box<Expr> },
    /// Realize a lazy cell.
    Force(Box<Expr>),
    /// Call `method` on a delegate, forwarding `args` unchanged.
    InvokeTarget {
        receiver: Box<Expr>,
        method: MethodSignature,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnCoercion {
    /// Cast the result to the declared return type.
    Cast(TypeRef),
    /// Return the result as produced.
    Passthrough,
    /// Void method: drop the result.
    Discard,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Instruction {
    Bind { local: String, value: Expr },
    Return { value: Expr, coercion: ReturnCoercion },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchSequence {
    pub instructions: Vec<Instruction>,
}

impl DispatchSequence {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Positional parameter reads for every parameter of `method`.
pub fn params_of(method: &MethodSignature) -> Vec<Expr> {
    (0..method.arity()).map(Expr::Param).collect()
}

/// Per-method generation environment.
///
/// A strategy that fully owns a method body clears `may_proceed` and
/// `invoke_default` so no default handler chain runs for it.
#[derive(Debug, Clone)]
pub struct EmitEnv {
    field_prefix: String,
    spec_index: usize,
    pub may_proceed: bool,
    pub invoke_default: bool,
}

impl EmitEnv {
    pub fn new(field_prefix: impl Into<String>, spec_index: usize) -> Self {
        Self {
            field_prefix: field_prefix.into(),
            spec_index,
            may_proceed: true,
            invoke_default: true,
        }
    }

    /// Instance field name for a property of the spec at `spec_index`.
    pub fn qualify(field_prefix: &str, spec_index: usize, property: &str) -> String {
        format!("{}{}_{}", field_prefix, spec_index, property)
    }

    pub fn field(&self, property: &str) -> String {
        Self::qualify(&self.field_prefix, self.spec_index, property)
    }

    pub fn suppress_default(&mut self) {
        self.may_proceed = false;
        self.invoke_default = false;
    }

    pub fn suppresses_default(&self) -> bool {
        !self.may_proceed && !self.invoke_default
    }
}
