//! Proxy class construction.
//!
//! Building is single-threaded and all-or-nothing: any configuration error
//! aborts the build, so no caller ever sees a half-configured class.

use crate::config::ProxyConfig;
use crate::dispatch::{
    CodeEmitter, DispatchClassifier, DispatchDecision, EmitEnv, InterpretingEmitter,
};
use crate::error::{ProxyError, ProxyResult};
use crate::proxy::cache::ProxyClassCache;
use crate::proxy::class::{class_name, MethodBody, ProxyClass};
use crate::spec::{CapturedProperty, CapturedValue, HandlerSpec};
use crate::types::Contract;
use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

static DEFAULT_EMITTER: Lazy<Arc<dyn CodeEmitter>> =
    Lazy::new(|| Arc::new(InterpretingEmitter::new()));

pub struct ProxyBuilder {
    pub(crate) contract: Contract,
    pub(crate) specs: Vec<HandlerSpec>,
    pub(crate) config: ProxyConfig,
    pub(crate) emitter: Arc<dyn CodeEmitter>,
}

impl ProxyBuilder {
    pub fn new(contract: Contract) -> Self {
        Self {
            contract,
            specs: Vec::new(),
            config: ProxyConfig::default(),
            emitter: Arc::clone(&DEFAULT_EMITTER),
        }
    }

    pub fn with_config(mut self, config: ProxyConfig) -> Self {
        self.config = config;
        self
    }

    /// Appends a spec. Order matters: the first spec to claim a method wins.
    pub fn spec(mut self, spec: impl Into<HandlerSpec>) -> Self {
        self.specs.push(spec.into());
        self
    }

    pub fn specs<I>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = HandlerSpec>,
    {
        self.specs.extend(specs);
        self
    }

    pub fn emitter(mut self, emitter: Arc<dyn CodeEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// Builds through `cache` when class caching is enabled.
    pub fn build_cached(self, cache: &ProxyClassCache) -> ProxyResult<Arc<ProxyClass>> {
        if self.config.cache_classes {
            cache.get_or_build(self)
        } else {
            self.build()
        }
    }

    pub fn build(self) -> ProxyResult<Arc<ProxyClass>> {
        self.config.validate()?;
        let ProxyBuilder {
            contract,
            specs,
            config,
            emitter,
        } = self;

        let specs = if config.dedupe_specs {
            dedupe(specs)
        } else {
            specs
        };

        let (properties, arguments) = collect_properties(&specs, &config.field_prefix)?;

        let table = DispatchClassifier::new(&specs).classify_all(&contract);

        let mut bodies = HashMap::new();
        let mut spec_cache = IndexMap::new();
        for (method, decision) in table.iter() {
            if decision.cache_spec() {
                spec_cache.insert(method.clone(), method.descriptor());
            }
            let DispatchDecision::Claimed { spec, claim, .. } = *decision else {
                continue;
            };
            let handler_spec = &specs[spec];
            handler_spec.validate(method, claim)?;

            let mut env = EmitEnv::new(config.field_prefix.as_str(), spec);
            let sequence = handler_spec.emit_invocation(method, claim, &mut env)?;
            let compiled = emitter.emit(method, &sequence, &properties)?;
            bodies.insert(
                method.clone(),
                MethodBody {
                    sequence,
                    compiled,
                    suppresses_default: env.suppresses_default(),
                },
            );
        }

        let name = class_name(&contract, &specs, &table);
        tracing::debug!(
            class = %name,
            methods = table.len(),
            claimed = table.claimed_count(),
            cached_descriptors = spec_cache.len(),
            "built proxy class"
        );

        Ok(Arc::new(ProxyClass {
            name,
            contract,
            specs,
            properties,
            arguments,
            table,
            bodies,
            spec_cache,
        }))
    }
}

/// Keeps the first occurrence of each spec. A later equal spec can never
/// win first-match, so dropping it does not change any decision.
fn dedupe(specs: Vec<HandlerSpec>) -> Vec<HandlerSpec> {
    let before = specs.len();
    let unique: IndexSet<HandlerSpec> = specs.into_iter().collect();
    if unique.len() != before {
        tracing::debug!(dropped = before - unique.len(), "dropped duplicate handler specs");
    }
    unique.into_iter().collect()
}

fn collect_properties(
    specs: &[HandlerSpec],
    field_prefix: &str,
) -> ProxyResult<(Vec<CapturedProperty>, Vec<CapturedValue>)> {
    let mut seen = IndexSet::new();
    let mut properties = Vec::new();
    let mut arguments = Vec::new();

    for (index, spec) in specs.iter().enumerate() {
        let declared = spec.captured_properties();
        let values = spec.constructor_arguments();
        if declared.len() != values.len() {
            return Err(ProxyError::ConstructorArity {
                expected: declared.len(),
                actual: values.len(),
            });
        }
        for (property, value) in declared.into_iter().zip(values) {
            let name = EmitEnv::qualify(field_prefix, index, &property.name);
            if !seen.insert(name.clone()) {
                return Err(ProxyError::DuplicateProperty(name));
            }
            properties.push(CapturedProperty { name, ..property });
            arguments.push(value);
        }
    }
    Ok((properties, arguments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::{Delegate, DelegateObject, TargetType};
    use crate::spec::{Args, FunctionTableSpec, LazyInstance, WrappedInstanceSpec, NO_MATCH};
    use crate::types::{MethodSignature, TypeRef, Value};
    use pretty_assertions::assert_eq;

    fn ping() -> MethodSignature {
        MethodSignature::new("ping", vec![], TypeRef::String)
    }

    fn contract() -> Contract {
        Contract::new("Pinger", vec![ping()]).unwrap()
    }

    fn table() -> FunctionTableSpec {
        FunctionTableSpec::from_fns(
            vec![|_: Args| -> ProxyResult<Value> { Ok(Value::from("pong")) }],
            |m: &MethodSignature| if m.name == "ping" { 0 } else { NO_MATCH },
        )
        .unwrap()
    }

    #[test]
    fn test_property_names_are_qualified_per_spec() {
        let class = ProxyBuilder::new(contract())
            .with_config(ProxyConfig {
                dedupe_specs: false,
                ..ProxyConfig::default()
            })
            .spec(table())
            .spec(table())
            .build()
            .unwrap();
        let names: Vec<&str> = class
            .captured_properties()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "$$proxy_0_functions",
                "$$proxy_0_function_resolver",
                "$$proxy_1_functions",
                "$$proxy_1_function_resolver",
            ]
        );
        assert_eq!(class.constructor_arguments().len(), 4);
    }

    #[test]
    fn test_dedupe_drops_equal_specs() {
        let spec = table();
        let class = ProxyBuilder::new(contract())
            .spec(spec.clone())
            .spec(spec)
            .build()
            .unwrap();
        assert_eq!(class.specs().len(), 1);
    }

    #[test]
    fn test_incompatible_delegate_fails_build() {
        let lazy = Arc::new(LazyInstance::new(TargetType::new("Empty", vec![]), || {
            let target: Arc<dyn Delegate> = Arc::new(DelegateObject::builder("Empty").build());
            Ok(target)
        }));
        let err = ProxyBuilder::new(contract())
            .spec(WrappedInstanceSpec::lazy(lazy))
            .build()
            .unwrap_err();
        assert!(matches!(err, ProxyError::IncompatibleDelegate { .. }));
    }

    #[test]
    fn test_incompatible_direct_delegate_fails_build() {
        let target: Arc<dyn Delegate> = Arc::new(DelegateObject::builder("Empty").build());
        let err = ProxyBuilder::new(contract())
            .spec(WrappedInstanceSpec::direct(target))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ProxyError::IncompatibleDelegate {
                method: ping().to_string(),
                target_type: "Empty".to_string(),
            }
        );
    }

    #[test]
    fn test_unclaimed_methods_are_not_validated() {
        let target: Arc<dyn Delegate> = Arc::new(DelegateObject::builder("Empty").build());
        let class = ProxyBuilder::new(contract())
            .spec(WrappedInstanceSpec::direct(target).with_predicate(|_: &MethodSignature| false))
            .build()
            .unwrap();
        assert!(!class.dispatch_table().get(&ping()).unwrap().is_claimed());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = ProxyBuilder::new(contract())
            .with_config(ProxyConfig {
                field_prefix: String::new(),
                ..ProxyConfig::default()
            })
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
