//! Code emission: turning dispatch sequences into executable method bodies.
//!
//! [`CodeEmitter`] is the seam to whatever backend produces dispatch code.
//! [`InterpretingEmitter`] is the built-in backend: it checks a sequence
//! once, at build time, and compiles it into a closure that walks the
//! instructions against an [`InvocationFrame`].

use crate::delegate::Delegate;
use crate::dispatch::sequence::{DispatchSequence, Expr, Instruction, ReturnCoercion};
use crate::error::{ProxyError, ProxyResult};
use crate::spec::{empty_args, Args, CapturedProperty, CapturedValue, Handler, PropertyType};
use crate::types::{MethodSignature, Value};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Instance fields and actual arguments visible to a running method body.
pub struct InvocationFrame<'a> {
    pub fields: &'a IndexMap<String, CapturedValue>,
    pub args: &'a [Value],
}

pub type CompiledBody = Arc<dyn Fn(&InvocationFrame<'_>) -> ProxyResult<Value> + Send + Sync>;

pub trait CodeEmitter: Send + Sync {
    /// Produces the body for `method`. `fields` are the instance fields the
    /// body may read, already qualified. Malformed sequences are rejected here.
    fn emit(
        &self,
        method: &MethodSignature,
        sequence: &DispatchSequence,
        fields: &[CapturedProperty],
    ) -> ProxyResult<CompiledBody>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct InterpretingEmitter;

impl InterpretingEmitter {
    pub fn new() -> Self {
        Self
    }
}

impl CodeEmitter for InterpretingEmitter {
    fn emit(
        &self,
        method: &MethodSignature,
        sequence: &DispatchSequence,
        fields: &[CapturedProperty],
    ) -> ProxyResult<CompiledBody> {
        let declared: HashMap<&str, PropertyType> =
            fields.iter().map(|p| (p.name.as_str(), p.ty)).collect();
        check_sequence(method, sequence, &declared)?;

        let method = method.clone();
        let sequence = sequence.clone();
        let body: CompiledBody =
            Arc::new(move |frame: &InvocationFrame<'_>| run(&method, &sequence, frame));
        Ok(body)
    }
}

fn invalid(method: &MethodSignature, reason: impl Into<String>) -> ProxyError {
    ProxyError::InvalidSequence {
        method: method.to_string(),
        reason: reason.into(),
    }
}

fn check_sequence(
    method: &MethodSignature,
    sequence: &DispatchSequence,
    declared: &HashMap<&str, PropertyType>,
) -> ProxyResult<()> {
    let Some((last, body)) = sequence.instructions.split_last() else {
        return Err(invalid(method, "empty sequence"));
    };
    if !matches!(last, Instruction::Return { .. }) {
        return Err(invalid(method, "sequence must end with a return"));
    }

    let mut locals = HashSet::new();
    for instruction in body {
        match instruction {
            Instruction::Bind { local, value } => {
                check_expr(method, value, declared, &locals)?;
                locals.insert(local.clone());
            }
            Instruction::Return { .. } => {
                return Err(invalid(method, "return before the end of the sequence"));
            }
        }
    }
    if let Instruction::Return { value, .. } = last {
        check_expr(method, value, declared, &locals)?;
    }
    Ok(())
}

fn check_expr(
    method: &MethodSignature,
    expr: &Expr,
    declared: &HashMap<&str, PropertyType>,
    locals: &HashSet<String>,
) -> ProxyResult<()> {
    match expr {
        Expr::Field(name) => {
            if !declared.contains_key(name.as_str()) {
                return Err(invalid(method, format!("undeclared field '{}'", name)));
            }
        }
        Expr::Local(name) => {
            if !locals.contains(name) {
                return Err(invalid(method, format!("local '{}' read before bind", name)));
            }
        }
        Expr::Param(index) => {
            if *index >= method.arity() {
                return Err(invalid(method, format!("parameter {} out of range", index)));
            }
        }
        Expr::EmptyArgs => {}
        Expr::TableGet { table, .. } => {
            if let Expr::Field(name) = table.as_ref() {
                if declared.get(name.as_str()) != Some(&PropertyType::FunctionTable) {
                    return Err(invalid(method, format!("'{}' is not a function table", name)));
                }
            }
            check_expr(method, table, declared, locals)?;
        }
        Expr::NewArgs(items) => {
            for item in items {
                check_expr(method, item, declared, locals)?;
            }
        }
        Expr::Apply { function, args } => {
            check_expr(method, function, declared, locals)?;
            check_expr(method, args, declared, locals)?;
        }
        Expr::Force(inner) => {
            if let Expr::Field(name) = inner.as_ref() {
                if declared.get(name.as_str()) != Some(&PropertyType::LazyInstance) {
                    return Err(invalid(method, format!("'{}' is not a lazy instance", name)));
                }
            }
            check_expr(method, inner, declared, locals)?;
        }
        Expr::InvokeTarget { receiver, args, .. } => {
            check_expr(method, receiver, declared, locals)?;
            for arg in args {
                check_expr(method, arg, declared, locals)?;
            }
        }
    }
    Ok(())
}

/// Intermediate results while walking a sequence.
#[derive(Clone)]
enum Operand {
    Value(Value),
    Args(Args),
    Handler(Handler),
    Captured(CapturedValue),
    Target(Arc<dyn Delegate>),
}

fn run(
    method: &MethodSignature,
    sequence: &DispatchSequence,
    frame: &InvocationFrame<'_>,
) -> ProxyResult<Value> {
    let mut locals: HashMap<&str, Operand> = HashMap::new();
    for instruction in &sequence.instructions {
        match instruction {
            Instruction::Bind { local, value } => {
                let operand = eval(method, value, frame, &locals)?;
                locals.insert(local.as_str(), operand);
            }
            Instruction::Return { value, coercion } => {
                let result = into_value(method, eval(method, value, frame, &locals)?)?;
                return match coercion {
                    ReturnCoercion::Cast(ty) => result.cast_to(ty),
                    ReturnCoercion::Passthrough => Ok(result),
                    ReturnCoercion::Discard => Ok(Value::Unit),
                };
            }
        }
    }
    Err(invalid(method, "sequence finished without a return"))
}

fn eval(
    method: &MethodSignature,
    expr: &Expr,
    frame: &InvocationFrame<'_>,
    locals: &HashMap<&str, Operand>,
) -> ProxyResult<Operand> {
    match expr {
        Expr::Field(name) => frame
            .fields
            .get(name)
            .cloned()
            .map(Operand::Captured)
            .ok_or_else(|| invalid(method, format!("missing field '{}'", name))),
        Expr::Local(name) => locals
            .get(name.as_str())
            .cloned()
            .ok_or_else(|| invalid(method, format!("unbound local '{}'", name))),
        Expr::Param(index) => frame
            .args
            .get(*index)
            .cloned()
            .map(Operand::Value)
            .ok_or_else(|| invalid(method, format!("missing parameter {}", index))),
        Expr::TableGet { table, index } => match eval(method, table, frame, locals)? {
            Operand::Captured(CapturedValue::FunctionTable(functions)) => functions
                .get(*index)
                .cloned()
                .map(Operand::Handler)
                .ok_or_else(|| invalid(method, format!("no handler at slot {}", index))),
            _ => Err(invalid(method, "table read on a non-table value")),
        },
        Expr::EmptyArgs => Ok(Operand::Args(empty_args())),
        Expr::NewArgs(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(into_value(method, eval(method, item, frame, locals)?)?);
            }
            Ok(Operand::Args(Arc::from(values)))
        }
        Expr::Apply { function, args } => {
            let handler = match eval(method, function, frame, locals)? {
                Operand::Handler(handler) => handler,
                _ => return Err(invalid(method, "apply on a non-handler value")),
            };
            let args = match eval(method, args, frame, locals)? {
                Operand::Args(args) => args,
                _ => return Err(invalid(method, "apply without an argument array")),
            };
            tracing::trace!(method = %method, argc = args.len(), "applying table handler");
            handler(args).map(Operand::Value)
        }
        Expr::Force(inner) => match eval(method, inner, frame, locals)? {
            Operand::Captured(CapturedValue::Lazy(lazy)) => lazy.force().map(Operand::Target),
            _ => Err(invalid(method, "force on a non-lazy value")),
        },
        Expr::InvokeTarget {
            receiver,
            method: target_method,
            args,
        } => {
            let target = match eval(method, receiver, frame, locals)? {
                Operand::Target(target) | Operand::Captured(CapturedValue::Instance(target)) => {
                    target
                }
                _ => return Err(invalid(method, "invocation on a non-delegate value")),
            };
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(into_value(method, eval(method, arg, frame, locals)?)?);
            }
            tracing::trace!(
                method = %method,
                target = %target.target_type().name,
                "forwarding to wrapped instance"
            );
            target.invoke(target_method, &values).map(Operand::Value)
        }
    }
}

fn into_value(method: &MethodSignature, operand: Operand) -> ProxyResult<Value> {
    match operand {
        Operand::Value(value) => Ok(value),
        _ => Err(invalid(method, "expected a plain value")),
    }
}
