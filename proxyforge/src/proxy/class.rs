//! Generated proxy classes.
//!
//! A [`ProxyClass`] is the frozen result of a build: captured property
//! layout, the memoized dispatch table and one compiled body per claimed
//! method. It is immutable and shared behind an `Arc`.

use crate::dispatch::{
    CompiledBody, DispatchClassifier, DispatchDecision, DispatchSequence, DispatchTable,
};
use crate::error::{ProxyError, ProxyResult};
use crate::proxy::instance::ProxyInstance;
use crate::spec::{CapturedProperty, CapturedValue, HandlerSpec, PropertyType};
use crate::types::{Contract, MethodSignature};
use indexmap::IndexMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Everything a claimed method needs at call time.
#[derive(Clone)]
pub(crate) struct MethodBody {
    pub sequence: DispatchSequence,
    pub compiled: CompiledBody,
    pub suppresses_default: bool,
}

pub struct ProxyClass {
    pub(crate) name: String,
    pub(crate) contract: Contract,
    pub(crate) specs: Vec<HandlerSpec>,
    pub(crate) properties: Vec<CapturedProperty>,
    pub(crate) arguments: Vec<CapturedValue>,
    pub(crate) table: DispatchTable,
    pub(crate) bodies: HashMap<MethodSignature, MethodBody>,
    pub(crate) spec_cache: IndexMap<MethodSignature, String>,
}

impl ProxyClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Specs in configuration order, after deduplication.
    pub fn specs(&self) -> &[HandlerSpec] {
        &self.specs
    }

    pub fn captured_properties(&self) -> &[CapturedProperty] {
        &self.properties
    }

    /// Values aligned with [`captured_properties`](Self::captured_properties).
    pub fn constructor_arguments(&self) -> &[CapturedValue] {
        &self.arguments
    }

    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.table
    }

    /// The memoized decision for a contract method.
    pub fn decision(&self, method: &MethodSignature) -> Option<DispatchDecision> {
        self.table.get(method)
    }

    /// Memoized decision when `method` belongs to the contract, otherwise a
    /// fresh classification against the same specs.
    pub fn classify(&self, method: &MethodSignature) -> DispatchDecision {
        self.decision(method)
            .unwrap_or_else(|| DispatchClassifier::new(&self.specs).classify(method))
    }

    /// The dispatch sequence emitted for a claimed method.
    pub fn sequence(&self, method: &MethodSignature) -> Option<&DispatchSequence> {
        self.bodies.get(method).map(|body| &body.sequence)
    }

    /// Whether the default path is switched off for `method`.
    pub fn suppresses_default(&self, method: &MethodSignature) -> bool {
        self.bodies
            .get(method)
            .map(|body| body.suppresses_default)
            .unwrap_or(false)
    }

    /// Descriptor precomputed for the default path, if the decision asked for one.
    pub fn cached_descriptor(&self, method: &MethodSignature) -> Option<&str> {
        self.spec_cache.get(method).map(String::as_str)
    }

    pub(crate) fn body(&self, method: &MethodSignature) -> Option<&MethodBody> {
        self.bodies.get(method)
    }

    /// Creates an instance holding the specs' own captured values.
    pub fn instantiate(self: &Arc<Self>) -> ProxyInstance {
        let fields = self
            .properties
            .iter()
            .zip(self.arguments.iter())
            .map(|(property, value)| (property.name.clone(), value.clone()))
            .collect();
        ProxyInstance::new(Arc::clone(self), fields)
    }

    /// Creates an instance from explicit constructor arguments, which must
    /// line up with the captured properties one to one.
    pub fn instantiate_with(
        self: &Arc<Self>,
        args: Vec<CapturedValue>,
    ) -> ProxyResult<ProxyInstance> {
        if args.len() != self.properties.len() {
            return Err(ProxyError::ConstructorArity {
                expected: self.properties.len(),
                actual: args.len(),
            });
        }
        let mut fields = IndexMap::with_capacity(args.len());
        for (property, value) in self.properties.iter().zip(args) {
            if value.property_type() != property.ty {
                return Err(ProxyError::ConstructorArgument {
                    property: property.name.clone(),
                    expected: property.ty.to_string(),
                    actual: value.property_type().to_string(),
                });
            }
            fields.insert(property.name.clone(), value);
        }
        Ok(ProxyInstance::new(Arc::clone(self), fields))
    }

    pub fn report(&self) -> DispatchReport {
        DispatchReport {
            class_name: self.name.clone(),
            contract: self.contract.name().to_string(),
            properties: self
                .properties
                .iter()
                .map(|p| PropertyReport {
                    name: p.name.clone(),
                    ty: p.ty,
                })
                .collect(),
            methods: self
                .table
                .iter()
                .map(|(method, decision)| MethodReport {
                    method: method.descriptor(),
                    decision: *decision,
                    strategy: decision.spec_index().map(|i| self.specs[i].kind().to_string()),
                    suppresses_default: self.suppresses_default(method),
                })
                .collect(),
        }
    }
}

impl fmt::Debug for ProxyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyClass")
            .field("name", &self.name)
            .field("specs", &self.specs.len())
            .field("methods", &self.table.len())
            .field("claimed", &self.table.claimed_count())
            .finish()
    }
}

/// Class name derived from the contract and a digest of its dispatch layout.
/// Specs contribute their captured-state identity, so names are unique per
/// process but not stable across runs.
pub(crate) fn class_name(
    contract: &Contract,
    specs: &[HandlerSpec],
    table: &DispatchTable,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contract.name().as_bytes());
    for spec in specs {
        hasher.update(spec.kind().as_bytes());
        let mut captured = DefaultHasher::new();
        spec.hash(&mut captured);
        hasher.update(captured.finish().to_le_bytes());
    }
    for (method, decision) in table.iter() {
        hasher.update(method.descriptor().as_bytes());
        hasher.update(format!("{:?}", decision).as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    format!("{}$Proxy${}", contract.name(), &digest[..12])
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyReport {
    pub name: String,
    pub ty: PropertyType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodReport {
    pub method: String,
    pub decision: DispatchDecision,
    pub strategy: Option<String>,
    pub suppresses_default: bool,
}

/// Serializable summary of how a class routes its methods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    pub class_name: String,
    pub contract: String,
    pub properties: Vec<PropertyReport>,
    pub methods: Vec<MethodReport>,
}

impl DispatchReport {
    pub fn to_json(&self) -> ProxyResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
