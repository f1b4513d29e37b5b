//! Handler specs: the delegation strategies a proxy can route methods to.
//!
//! A [`HandlerSpec`] is immutable once built (the only exception is the
//! self-memoizing cell inside a lazy wrapped instance). Equality and hashing
//! are defined over captured state by identity, so two specs sharing the same
//! function table and resolver, or the same wrapped value and predicate, are
//! interchangeable for caching.

pub mod function_table;
pub mod lazy;
pub mod wrapped;

pub use function_table::{
    empty_args, Args, FunctionTable, FunctionTableSpec, Handler, Resolver, NO_MATCH,
};
pub use lazy::{LazyInstance, LazyState};
pub use wrapped::{DelegatePredicate, WrappedInstanceSpec, WrappedTarget};

use crate::delegate::Delegate;
use crate::dispatch::sequence::{DispatchSequence, EmitEnv};
use crate::error::{ProxyError, ProxyResult};
use crate::types::MethodSignature;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Pointer identity of a shared value, used for spec equality and hashing.
pub(crate) fn identity<T: ?Sized>(value: &Arc<T>) -> usize {
    Arc::as_ptr(value) as *const () as usize
}

/// How a spec claims a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Claim {
    /// Route to the function table entry at this slot.
    Slot(usize),
    /// Forward to the wrapped value.
    Delegate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    FunctionTable,
    Resolver,
    Instance,
    LazyInstance,
    Predicate,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyType::FunctionTable => "function-table",
            PropertyType::Resolver => "resolver",
            PropertyType::Instance => "instance",
            PropertyType::LazyInstance => "lazy-instance",
            PropertyType::Predicate => "predicate",
        };
        write!(f, "{}", name)
    }
}

/// State a generated proxy instance stores so dispatch code can read it.
#[derive(Clone)]
pub enum CapturedValue {
    FunctionTable(FunctionTable),
    Resolver(Resolver),
    Instance(Arc<dyn Delegate>),
    Lazy(Arc<LazyInstance>),
    Predicate(DelegatePredicate),
}

impl CapturedValue {
    pub fn property_type(&self) -> PropertyType {
        match self {
            CapturedValue::FunctionTable(_) => PropertyType::FunctionTable,
            CapturedValue::Resolver(_) => PropertyType::Resolver,
            CapturedValue::Instance(_) => PropertyType::Instance,
            CapturedValue::Lazy(_) => PropertyType::LazyInstance,
            CapturedValue::Predicate(_) => PropertyType::Predicate,
        }
    }
}

impl fmt::Debug for CapturedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapturedValue::FunctionTable(table) => write!(f, "FunctionTable({})", table.len()),
            CapturedValue::Resolver(_) => write!(f, "Resolver"),
            CapturedValue::Instance(d) => write!(f, "Instance({})", d.target_type().name),
            CapturedValue::Lazy(lazy) => write!(f, "{:?}", lazy),
            CapturedValue::Predicate(_) => write!(f, "Predicate"),
        }
    }
}

/// A (name, type, optional initializer) triple owned by one spec.
#[derive(Debug, Clone)]
pub struct CapturedProperty {
    pub name: String,
    pub ty: PropertyType,
    pub initial: Option<CapturedValue>,
}

impl CapturedProperty {
    pub fn new(name: impl Into<String>, ty: PropertyType) -> Self {
        Self {
            name: name.into(),
            ty,
            initial: None,
        }
    }
}

/// Closed set of delegation strategies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HandlerSpec {
    FunctionTable(FunctionTableSpec),
    WrappedInstance(WrappedInstanceSpec),
}

impl HandlerSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            HandlerSpec::FunctionTable(_) => "function-table",
            HandlerSpec::WrappedInstance(w) if w.is_lazy() => "lazy-instance",
            HandlerSpec::WrappedInstance(_) => "wrapped-instance",
        }
    }

    /// `None` is a soft decline: the next spec, or the default path, gets the method.
    pub fn resolve(&self, method: &MethodSignature) -> Option<Claim> {
        match self {
            HandlerSpec::FunctionTable(spec) => spec.resolve(method).map(Claim::Slot),
            HandlerSpec::WrappedInstance(spec) => spec.resolve(method).then_some(Claim::Delegate),
        }
    }

    /// Whether the default path should keep a cached descriptor for `method`.
    pub fn caches_spec(&self, method: &MethodSignature) -> bool {
        match self {
            HandlerSpec::FunctionTable(spec) => spec.caches_spec(method),
            HandlerSpec::WrappedInstance(spec) => spec.caches_spec(method),
        }
    }

    pub fn captured_properties(&self) -> Vec<CapturedProperty> {
        match self {
            HandlerSpec::FunctionTable(spec) => spec.captured_properties(),
            HandlerSpec::WrappedInstance(spec) => spec.captured_properties(),
        }
    }

    /// Values for the captured properties, in the same order.
    pub fn constructor_arguments(&self) -> Vec<CapturedValue> {
        match self {
            HandlerSpec::FunctionTable(spec) => spec.constructor_arguments(),
            HandlerSpec::WrappedInstance(spec) => spec.constructor_arguments(),
        }
    }

    /// Build-time check that a claimed method can actually be served.
    pub fn validate(&self, method: &MethodSignature, claim: Claim) -> ProxyResult<()> {
        match (self, claim) {
            (HandlerSpec::WrappedInstance(spec), Claim::Delegate) => spec.validate(method),
            _ => Ok(()),
        }
    }

    pub fn emit_invocation(
        &self,
        method: &MethodSignature,
        claim: Claim,
        env: &mut EmitEnv,
    ) -> ProxyResult<DispatchSequence> {
        match (self, claim) {
            (HandlerSpec::FunctionTable(spec), Claim::Slot(slot)) => {
                Ok(spec.emit_invocation(method, slot, env))
            }
            (HandlerSpec::WrappedInstance(spec), Claim::Delegate) => {
                Ok(spec.emit_invocation(method, env))
            }
            _ => Err(ProxyError::InvalidSequence {
                method: method.to_string(),
                reason: format!("{} spec cannot serve claim {:?}", self.kind(), claim),
            }),
        }
    }
}

impl From<FunctionTableSpec> for HandlerSpec {
    fn from(spec: FunctionTableSpec) -> Self {
        HandlerSpec::FunctionTable(spec)
    }
}

impl From<WrappedInstanceSpec> for HandlerSpec {
    fn from(spec: WrappedInstanceSpec) -> Self {
        HandlerSpec::WrappedInstance(spec)
    }
}
