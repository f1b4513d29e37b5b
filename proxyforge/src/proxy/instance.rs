//! Proxy instances and the default call path.

use crate::dispatch::InvocationFrame;
use crate::error::{ProxyError, ProxyResult};
use crate::proxy::class::ProxyClass;
use crate::spec::CapturedValue;
use crate::types::{MethodSignature, Value};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// A call no strategy claimed.
pub struct DefaultCall<'a> {
    pub proxy: &'a ProxyInstance,
    pub method: &'a MethodSignature,
    /// Descriptor precomputed at build time, when the decision asked for it.
    pub cached_descriptor: Option<&'a str>,
    pub args: &'a [Value],
}

/// Behavior for unclaimed methods. Results are cast to the declared return type.
pub trait DefaultHandler: Send + Sync {
    fn invoke(&self, call: &DefaultCall<'_>) -> ProxyResult<Value>;
}

impl<F> DefaultHandler for F
where
    F: Fn(&DefaultCall<'_>) -> ProxyResult<Value> + Send + Sync,
{
    fn invoke(&self, call: &DefaultCall<'_>) -> ProxyResult<Value> {
        self(call)
    }
}

pub struct ProxyInstance {
    class: Arc<ProxyClass>,
    fields: IndexMap<String, CapturedValue>,
    default_handler: Option<Arc<dyn DefaultHandler>>,
}

impl ProxyInstance {
    pub(crate) fn new(class: Arc<ProxyClass>, fields: IndexMap<String, CapturedValue>) -> Self {
        Self {
            class,
            fields,
            default_handler: None,
        }
    }

    pub fn with_default_handler<H>(mut self, handler: H) -> Self
    where
        H: DefaultHandler + 'static,
    {
        self.default_handler = Some(Arc::new(handler));
        self
    }

    pub fn class(&self) -> &Arc<ProxyClass> {
        &self.class
    }

    pub fn field(&self, name: &str) -> Option<&CapturedValue> {
        self.fields.get(name)
    }

    /// Dispatches a call through the method's precomputed route.
    pub fn invoke(&self, method: &MethodSignature, args: &[Value]) -> ProxyResult<Value> {
        let decision = self
            .class
            .decision(method)
            .ok_or_else(|| ProxyError::UnknownMethod(method.to_string()))?;
        check_arguments(method, args)?;

        if let Some(body) = self.class.body(method) {
            tracing::trace!(method = %method, ?decision, "dispatching claimed method");
            let frame = InvocationFrame {
                fields: &self.fields,
                args,
            };
            return (body.compiled)(&frame);
        }

        match &self.default_handler {
            Some(handler) => {
                tracing::trace!(method = %method, "dispatching to default handler");
                let call = DefaultCall {
                    proxy: self,
                    method,
                    cached_descriptor: self.class.cached_descriptor(method),
                    args,
                };
                handler.invoke(&call)?.cast_to(&method.ret)
            }
            None => Err(ProxyError::Unhandled(method.to_string())),
        }
    }

    /// Looks the method up by name (first declared overload) and invokes it.
    pub fn invoke_by_name(&self, name: &str, args: &[Value]) -> ProxyResult<Value> {
        let method = self
            .class
            .contract()
            .find_by_name(name)
            .cloned()
            .ok_or_else(|| ProxyError::UnknownMethod(name.to_string()))?;
        self.invoke(&method, args)
    }
}

fn check_arguments(method: &MethodSignature, args: &[Value]) -> ProxyResult<()> {
    if args.len() != method.arity() {
        return Err(ProxyError::ArityMismatch {
            method: method.to_string(),
            expected: method.arity(),
            actual: args.len(),
        });
    }
    for (index, (ty, arg)) in method.params.iter().zip(args).enumerate() {
        if !ty.accepts(arg) {
            return Err(ProxyError::ArgumentType {
                method: method.to_string(),
                index,
                expected: ty.to_string(),
                actual: arg.type_name().to_string(),
            });
        }
    }
    Ok(())
}

impl fmt::Debug for ProxyInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyInstance")
            .field("class", &self.class.name())
            .field("fields", &self.fields)
            .field("default_handler", &self.default_handler.is_some())
            .finish()
    }
}
