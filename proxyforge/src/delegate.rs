//! Wrapped values that proxies can forward calls to.

use crate::error::{ProxyError, ProxyResult};
use crate::types::{MethodSignature, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The method set a wrapped value exposes, known before the value exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetType {
    pub name: String,
    pub methods: Vec<MethodSignature>,
}

impl TargetType {
    pub fn new(name: impl Into<String>, methods: Vec<MethodSignature>) -> Self {
        Self {
            name: name.into(),
            methods,
        }
    }

    /// Finds the target method a proxied `method` can be forwarded to: same
    /// name, same parameter types, and a return type the caller can accept.
    pub fn find_compatible(&self, method: &MethodSignature) -> Option<&MethodSignature> {
        self.methods.iter().find(|candidate| {
            candidate.name == method.name
                && candidate.params == method.params
                && method.ret.is_assignable_from(&candidate.ret)
        })
    }
}

/// A value that accepts forwarded calls.
pub trait Delegate: Send + Sync {
    fn target_type(&self) -> &TargetType;

    /// Invokes `method` (one of `target_type().methods`) with the caller's arguments.
    fn invoke(&self, method: &MethodSignature, args: &[Value]) -> ProxyResult<Value>;
}

pub type MethodImpl = Arc<dyn Fn(&[Value]) -> ProxyResult<Value> + Send + Sync>;

/// A [`Delegate`] assembled from closures.
pub struct DelegateObject {
    target_type: TargetType,
    methods: HashMap<MethodSignature, MethodImpl>,
}

impl DelegateObject {
    pub fn builder(type_name: impl Into<String>) -> DelegateObjectBuilder {
        DelegateObjectBuilder {
            name: type_name.into(),
            order: Vec::new(),
            methods: HashMap::new(),
        }
    }
}

impl fmt::Debug for DelegateObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateObject")
            .field("target_type", &self.target_type.name)
            .field("methods", &self.target_type.methods.len())
            .finish()
    }
}

impl Delegate for DelegateObject {
    fn target_type(&self) -> &TargetType {
        &self.target_type
    }

    fn invoke(&self, method: &MethodSignature, args: &[Value]) -> ProxyResult<Value> {
        match self.methods.get(method) {
            Some(f) => f(args),
            None => Err(ProxyError::target(format!(
                "{} does not implement {}",
                self.target_type.name, method
            ))),
        }
    }
}

pub struct DelegateObjectBuilder {
    name: String,
    order: Vec<MethodSignature>,
    methods: HashMap<MethodSignature, MethodImpl>,
}

impl DelegateObjectBuilder {
    pub fn method<F>(mut self, signature: MethodSignature, f: F) -> Self
    where
        F: Fn(&[Value]) -> ProxyResult<Value> + Send + Sync + 'static,
    {
        if !self.methods.contains_key(&signature) {
            self.order.push(signature.clone());
        }
        self.methods.insert(signature, Arc::new(f));
        self
    }

    pub fn build(self) -> DelegateObject {
        DelegateObject {
            target_type: TargetType::new(self.name, self.order),
            methods: self.methods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeRef;

    fn size() -> MethodSignature {
        MethodSignature::new("size", vec![], TypeRef::Int)
    }

    #[test]
    fn test_find_compatible_widens_to_object() {
        let ty = TargetType::new("List", vec![size()]);
        let as_object = MethodSignature::new("size", vec![], TypeRef::Object);
        assert_eq!(ty.find_compatible(&as_object), Some(&size()));

        let wrong_params = MethodSignature::new("size", vec![TypeRef::Int], TypeRef::Int);
        assert_eq!(ty.find_compatible(&wrong_params), None);
    }

    #[test]
    fn test_delegate_object_dispatch() {
        let obj = DelegateObject::builder("List")
            .method(size(), |_| Ok(Value::Int(4)))
            .build();
        assert_eq!(obj.invoke(&size(), &[]).unwrap(), Value::Int(4));

        let missing = MethodSignature::new("clear", vec![], TypeRef::Void);
        assert!(matches!(
            obj.invoke(&missing, &[]),
            Err(ProxyError::Target(_))
        ));
        assert_eq!(obj.target_type().methods, vec![size()]);
    }
}
