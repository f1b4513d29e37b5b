//! Delegate-to-wrapped-value strategy.
//!
//! Methods accepted by the predicate are forwarded, arguments unchanged, to
//! the same-named method of a held value. The value is either already
//! realized or held in a [`LazyInstance`] that is forced on first use.

use crate::delegate::{Delegate, TargetType};
use crate::dispatch::sequence::{
    params_of, DispatchSequence, EmitEnv, Expr, Instruction, ReturnCoercion,
};
use crate::error::{ProxyError, ProxyResult};
use crate::spec::lazy::LazyInstance;
use crate::spec::{identity, CapturedProperty, CapturedValue, PropertyType};
use crate::types::{MethodSignature, TypeRef};
use once_cell::sync::Lazy;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub const TARGET_PROPERTY: &str = "target";
pub const PREDICATE_PROPERTY: &str = "delegate_predicate";

static ACCEPT_ALL: Lazy<DelegatePredicate> = Lazy::new(|| DelegatePredicate::new(|_| true));

/// Decides which methods are forwarded. Must be deterministic and side-effect free.
#[derive(Clone)]
pub struct DelegatePredicate(Arc<dyn Fn(&MethodSignature) -> bool + Send + Sync>);

impl DelegatePredicate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&MethodSignature) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// The shared "delegate everything" predicate.
    pub fn accept_all() -> Self {
        ACCEPT_ALL.clone()
    }

    pub fn test(&self, method: &MethodSignature) -> bool {
        (self.0)(method)
    }
}

impl PartialEq for DelegatePredicate {
    fn eq(&self, other: &Self) -> bool {
        identity(&self.0) == identity(&other.0)
    }
}

impl Eq for DelegatePredicate {}

impl Hash for DelegatePredicate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        identity(&self.0).hash(state);
    }
}

impl fmt::Debug for DelegatePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DelegatePredicate({:#x})", identity(&self.0))
    }
}

#[derive(Clone)]
pub enum WrappedTarget {
    Direct(Arc<dyn Delegate>),
    Lazy(Arc<LazyInstance>),
}

impl WrappedTarget {
    pub fn target_type(&self) -> &TargetType {
        match self {
            WrappedTarget::Direct(value) => value.target_type(),
            WrappedTarget::Lazy(lazy) => lazy.target_type(),
        }
    }

    fn identity(&self) -> usize {
        match self {
            WrappedTarget::Direct(value) => identity(value),
            WrappedTarget::Lazy(lazy) => identity(lazy),
        }
    }
}

impl PartialEq for WrappedTarget {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (WrappedTarget::Direct(_), WrappedTarget::Direct(_))
                | (WrappedTarget::Lazy(_), WrappedTarget::Lazy(_))
        ) && self.identity() == other.identity()
    }
}

impl Eq for WrappedTarget {}

impl Hash for WrappedTarget {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        self.identity().hash(state);
    }
}

impl fmt::Debug for WrappedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WrappedTarget::Direct(value) => write!(f, "Direct({})", value.target_type().name),
            WrappedTarget::Lazy(lazy) => write!(f, "{:?}", lazy),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WrappedInstanceSpec {
    target: WrappedTarget,
    predicate: DelegatePredicate,
}

impl WrappedInstanceSpec {
    /// Delegates every method to an already realized value.
    pub fn direct(value: Arc<dyn Delegate>) -> Self {
        Self::new(WrappedTarget::Direct(value), DelegatePredicate::accept_all())
    }

    /// Delegates every method to a value produced on first use.
    pub fn lazy(lazy: Arc<LazyInstance>) -> Self {
        Self::new(WrappedTarget::Lazy(lazy), DelegatePredicate::accept_all())
    }

    pub fn new(target: WrappedTarget, predicate: DelegatePredicate) -> Self {
        Self { target, predicate }
    }

    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&MethodSignature) -> bool + Send + Sync + 'static,
    {
        self.predicate = DelegatePredicate::new(predicate);
        self
    }

    pub fn target(&self) -> &WrappedTarget {
        &self.target
    }

    pub fn predicate(&self) -> &DelegatePredicate {
        &self.predicate
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self.target, WrappedTarget::Lazy(_))
    }

    pub fn resolve(&self, method: &MethodSignature) -> bool {
        self.predicate.test(method)
    }

    /// Relies on the predicate being deterministic.
    pub fn caches_spec(&self, method: &MethodSignature) -> bool {
        !self.predicate.test(method)
    }

    pub fn validate(&self, method: &MethodSignature) -> ProxyResult<()> {
        let target_type = self.target.target_type();
        match target_type.find_compatible(method) {
            Some(_) => Ok(()),
            None => Err(ProxyError::IncompatibleDelegate {
                method: method.to_string(),
                target_type: target_type.name.clone(),
            }),
        }
    }

    pub fn captured_properties(&self) -> Vec<CapturedProperty> {
        let target_ty = if self.is_lazy() {
            PropertyType::LazyInstance
        } else {
            PropertyType::Instance
        };
        vec![
            CapturedProperty::new(TARGET_PROPERTY, target_ty),
            CapturedProperty::new(PREDICATE_PROPERTY, PropertyType::Predicate),
        ]
    }

    pub fn constructor_arguments(&self) -> Vec<CapturedValue> {
        let target = match &self.target {
            WrappedTarget::Direct(value) => CapturedValue::Instance(Arc::clone(value)),
            WrappedTarget::Lazy(lazy) => CapturedValue::Lazy(Arc::clone(lazy)),
        };
        vec![target, CapturedValue::Predicate(self.predicate.clone())]
    }

    pub fn emit_invocation(&self, method: &MethodSignature, env: &mut EmitEnv) -> DispatchSequence {
        env.suppress_default();

        let field = Expr::Field(env.field(TARGET_PROPERTY));
        let receiver = if self.is_lazy() {
            Expr::Force(Box::new(field))
        } else {
            field
        };
        // Without validation an unmatched method is forwarded as declared and
        // the target reports the failure when called.
        let target_method = self
            .target
            .target_type()
            .find_compatible(method)
            .cloned()
            .unwrap_or_else(|| method.clone());
        let coercion = if method.ret == TypeRef::Void {
            ReturnCoercion::Discard
        } else {
            ReturnCoercion::Passthrough
        };

        DispatchSequence::new(vec![Instruction::Return {
            value: Expr::InvokeTarget {
                receiver: Box::new(receiver),
                method: target_method,
                args: params_of(method),
            },
            coercion,
        }])
    }
}
