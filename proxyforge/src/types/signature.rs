//! Method signatures and the proxied contract.

use crate::error::{ProxyError, ProxyResult};
use crate::types::value::Value;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Declared type of a parameter or return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRef {
    Void,
    Boolean,
    Int,
    Long,
    Double,
    String,
    Object,
    Array(Box<TypeRef>),
}

impl TypeRef {
    pub fn array_of(element: TypeRef) -> Self {
        TypeRef::Array(Box::new(element))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeRef::Boolean | TypeRef::Int | TypeRef::Long | TypeRef::Double
        )
    }

    /// Whether `value` may be passed where this type is declared.
    ///
    /// Primitives require an exact match; reference types also accept `Null`.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (TypeRef::Void, Value::Unit) => true,
            (TypeRef::Boolean, Value::Boolean(_)) => true,
            (TypeRef::Int, Value::Int(_)) => true,
            (TypeRef::Long, Value::Long(_)) => true,
            (TypeRef::Double, Value::Double(_)) => true,
            (TypeRef::String, Value::String(_)) => true,
            (TypeRef::Array(element), Value::Array(items)) => {
                items.iter().all(|item| element.accepts(item))
            }
            (TypeRef::Object, Value::Unit) => false,
            (TypeRef::Object, _) => true,
            (TypeRef::String | TypeRef::Array(_), Value::Null) => true,
            _ => false,
        }
    }

    /// Whether a value declared as `other` can be returned where `self` is expected.
    pub fn is_assignable_from(&self, other: &TypeRef) -> bool {
        match (self, other) {
            (TypeRef::Void, _) => true,
            (TypeRef::Object, TypeRef::Void) => false,
            (TypeRef::Object, _) => true,
            (TypeRef::Array(a), TypeRef::Array(b)) => a.is_assignable_from(b),
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Void => write!(f, "void"),
            TypeRef::Boolean => write!(f, "boolean"),
            TypeRef::Int => write!(f, "int"),
            TypeRef::Long => write!(f, "long"),
            TypeRef::Double => write!(f, "double"),
            TypeRef::String => write!(f, "string"),
            TypeRef::Object => write!(f, "object"),
            TypeRef::Array(element) => write!(f, "{}[]", element),
        }
    }
}

/// Identifies a method by name, ordered parameter types and return type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<TypeRef>,
    pub ret: TypeRef,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>, params: Vec<TypeRef>, ret: TypeRef) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Compact descriptor used as a lookup key, e.g. `greet(int,string)->void`.
    pub fn descriptor(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({})->{}",
            self.name,
            self.params.iter().join(","),
            self.ret
        )
    }
}

/// The method set a proxy must implement, in a stable order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contract {
    name: String,
    methods: Vec<MethodSignature>,
}

impl Contract {
    pub fn new(name: impl Into<String>, methods: Vec<MethodSignature>) -> ProxyResult<Self> {
        let name = name.into();
        let mut seen = HashSet::new();
        for method in &methods {
            if !seen.insert(method) {
                return Err(ProxyError::DuplicateMethod {
                    contract: name,
                    method: method.to_string(),
                });
            }
        }
        Ok(Self { name, methods })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[MethodSignature] {
        &self.methods
    }

    pub fn find(&self, method: &MethodSignature) -> Option<&MethodSignature> {
        self.methods.iter().find(|m| *m == method)
    }

    /// Looks a method up by name. Overloads resolve to the first declared one.
    pub fn find_by_name(&self, name: &str) -> Option<&MethodSignature> {
        self.methods.iter().find(|m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_format() {
        let sig = MethodSignature::new(
            "greet",
            vec![TypeRef::Int, TypeRef::String, TypeRef::Boolean],
            TypeRef::Void,
        );
        assert_eq!(sig.descriptor(), "greet(int,string,boolean)->void");

        let arr = MethodSignature::new("items", vec![], TypeRef::array_of(TypeRef::Long));
        assert_eq!(arr.descriptor(), "items()->long[]");
    }

    #[test]
    fn test_accepts_null_only_for_references() {
        assert!(TypeRef::String.accepts(&Value::Null));
        assert!(TypeRef::Object.accepts(&Value::Null));
        assert!(!TypeRef::Int.accepts(&Value::Null));
        assert!(!TypeRef::Object.accepts(&Value::Unit));
    }

    #[test]
    fn test_assignability() {
        assert!(TypeRef::Object.is_assignable_from(&TypeRef::String));
        assert!(TypeRef::Void.is_assignable_from(&TypeRef::Int));
        assert!(!TypeRef::Int.is_assignable_from(&TypeRef::Long));
        assert!(!TypeRef::Object.is_assignable_from(&TypeRef::Void));
    }

    #[test]
    fn test_contract_rejects_duplicates() {
        let m = MethodSignature::new("a", vec![], TypeRef::Void);
        let err = Contract::new("Dup", vec![m.clone(), m]).unwrap_err();
        assert!(matches!(err, ProxyError::DuplicateMethod { .. }));
    }
}
