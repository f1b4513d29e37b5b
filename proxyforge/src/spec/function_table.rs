//! Direct-to-function-table strategy.
//!
//! A resolver maps each method to a slot in an ordered table of handlers.
//! Each handler takes the call's arguments as one array and returns a value
//! that is cast to the method's declared return type.

use crate::dispatch::sequence::{
    params_of, DispatchSequence, EmitEnv, Expr, Instruction, ReturnCoercion, HANDLER_LOCAL,
};
use crate::error::{ProxyError, ProxyResult};
use crate::spec::{identity, CapturedProperty, CapturedValue, PropertyType};
use crate::types::{MethodSignature, Value};
use once_cell::sync::Lazy;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Resolver output meaning "not handled here".
pub const NO_MATCH: i64 = -1;

pub const FUNCTIONS_PROPERTY: &str = "functions";
pub const RESOLVER_PROPERTY: &str = "function_resolver";

/// Argument array passed to handlers.
pub type Args = Arc<[Value]>;

pub type Handler = Arc<dyn Fn(Args) -> ProxyResult<Value> + Send + Sync>;

static EMPTY_ARGS: Lazy<Args> = Lazy::new(|| Arc::from(Vec::<Value>::new()));

/// The shared argument array used for every zero-parameter call.
pub fn empty_args() -> Args {
    Arc::clone(&EMPTY_ARGS)
}

/// Ordered handlers, compared by identity.
#[derive(Clone)]
pub struct FunctionTable(Arc<Vec<Handler>>);

impl FunctionTable {
    pub fn new(handlers: Vec<Handler>) -> Self {
        Self(Arc::new(handlers))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Handler> {
        self.0.get(index)
    }
}

impl FromIterator<Handler> for FunctionTable {
    fn from_iter<I: IntoIterator<Item = Handler>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl PartialEq for FunctionTable {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for FunctionTable {}

impl Hash for FunctionTable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        identity(&self.0).hash(state);
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionTable(len={})", self.len())
    }
}

/// Maps a method to a table slot, or [`NO_MATCH`]. Compared by identity.
#[derive(Clone)]
pub struct Resolver(Arc<dyn Fn(&MethodSignature) -> i64 + Send + Sync>);

impl Resolver {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&MethodSignature) -> i64 + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn apply(&self, method: &MethodSignature) -> i64 {
        (self.0)(method)
    }
}

impl PartialEq for Resolver {
    fn eq(&self, other: &Self) -> bool {
        identity(&self.0) == identity(&other.0)
    }
}

impl Eq for Resolver {}

impl Hash for Resolver {
    fn hash<H: Hasher>(&self, state: &mut H) {
        identity(&self.0).hash(state);
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resolver({:#x})", identity(&self.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionTableSpec {
    functions: FunctionTable,
    resolver: Resolver,
}

impl FunctionTableSpec {
    pub fn new(functions: FunctionTable, resolver: Resolver) -> ProxyResult<Self> {
        if functions.is_empty() {
            return Err(ProxyError::EmptyFunctionTable);
        }
        Ok(Self {
            functions,
            resolver,
        })
    }

    /// Convenience constructor from plain closures.
    pub fn from_fns<F, R>(handlers: Vec<F>, resolver: R) -> ProxyResult<Self>
    where
        F: Fn(Args) -> ProxyResult<Value> + Send + Sync + 'static,
        R: Fn(&MethodSignature) -> i64 + Send + Sync + 'static,
    {
        let table = handlers
            .into_iter()
            .map(|f| Arc::new(f) as Handler)
            .collect();
        Self::new(table, Resolver::new(resolver))
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Slot for `method`, or `None` for any output outside `[0, len)`.
    pub fn resolve(&self, method: &MethodSignature) -> Option<usize> {
        let raw = self.resolver.apply(method);
        match usize::try_from(raw) {
            Ok(slot) if slot < self.functions.len() => Some(slot),
            Ok(slot) => {
                tracing::warn!(
                    method = %method,
                    slot,
                    len = self.functions.len(),
                    "resolver returned an out-of-range slot; method left unclaimed"
                );
                None
            }
            Err(_) => None,
        }
    }

    /// Only the sentinel counts as a static "definitely not mine".
    pub fn caches_spec(&self, method: &MethodSignature) -> bool {
        self.resolver.apply(method) == NO_MATCH
    }

    pub fn captured_properties(&self) -> Vec<CapturedProperty> {
        vec![
            CapturedProperty::new(FUNCTIONS_PROPERTY, PropertyType::FunctionTable),
            CapturedProperty::new(RESOLVER_PROPERTY, PropertyType::Resolver),
        ]
    }

    pub fn constructor_arguments(&self) -> Vec<CapturedValue> {
        vec![
            CapturedValue::FunctionTable(self.functions.clone()),
            CapturedValue::Resolver(self.resolver.clone()),
        ]
    }

    /// Loads the handler at `slot`, packs the arguments, applies the handler
    /// and casts its result to the declared return type.
    pub fn emit_invocation(
        &self,
        method: &MethodSignature,
        slot: usize,
        env: &mut EmitEnv,
    ) -> DispatchSequence {
        env.suppress_default();

        let handler = Expr::TableGet {
            table: Box::new(Expr::Field(env.field(FUNCTIONS_PROPERTY))),
            index: slot,
        };
        let args = if method.arity() == 0 {
            Expr::EmptyArgs
        } else {
            Expr::NewArgs(params_of(method))
        };

        DispatchSequence::new(vec![
            Instruction::Bind {
                local: HANDLER_LOCAL.to_string(),
                value: handler,
            },
            Instruction::Return {
                value: Expr::Apply {
                    function: Box::new(Expr::Local(HANDLER_LOCAL.to_string())),
                    args: Box::new(args),
                },
                coercion: ReturnCoercion::Cast(method.ret.clone()),
            },
        ])
    }
}
