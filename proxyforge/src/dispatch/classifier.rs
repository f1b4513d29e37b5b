//! Method classification against an ordered list of handler specs.
//!
//! Classification is first-match: the first spec whose `resolve` claims a
//! method wins, regardless of what later specs would say. Decisions are
//! computed once per method when a proxy class is built and stored in a
//! [`DispatchTable`]; calls never re-resolve.

use crate::spec::{Claim, HandlerSpec};
use crate::types::{Contract, MethodSignature};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchDecision {
    /// No spec claimed the method; the default proxy behavior applies.
    Unclaimed { cache_spec: bool },
    /// `spec` is the position of the winning spec in configuration order.
    Claimed {
        spec: usize,
        claim: Claim,
        cache_spec: bool,
    },
}

impl DispatchDecision {
    pub fn is_claimed(&self) -> bool {
        matches!(self, DispatchDecision::Claimed { .. })
    }

    /// Whether the default path should precompute this method's descriptor.
    pub fn cache_spec(&self) -> bool {
        match self {
            DispatchDecision::Unclaimed { cache_spec }
            | DispatchDecision::Claimed { cache_spec, .. } => *cache_spec,
        }
    }

    pub fn spec_index(&self) -> Option<usize> {
        match self {
            DispatchDecision::Claimed { spec, .. } => Some(*spec),
            DispatchDecision::Unclaimed { .. } => None,
        }
    }
}

pub struct DispatchClassifier<'a> {
    specs: &'a [HandlerSpec],
}

impl<'a> DispatchClassifier<'a> {
    pub fn new(specs: &'a [HandlerSpec]) -> Self {
        Self { specs }
    }

    /// Classifies one method. A pure function of the method and the spec order.
    ///
    /// An unclaimed method carries the cache flag only when every spec
    /// declined it statically.
    pub fn classify(&self, method: &MethodSignature) -> DispatchDecision {
        for (index, spec) in self.specs.iter().enumerate() {
            if let Some(claim) = spec.resolve(method) {
                return DispatchDecision::Claimed {
                    spec: index,
                    claim,
                    cache_spec: spec.caches_spec(method),
                };
            }
        }
        DispatchDecision::Unclaimed {
            cache_spec: self.specs.iter().all(|spec| spec.caches_spec(method)),
        }
    }

    pub fn classify_all(&self, contract: &Contract) -> DispatchTable {
        let decisions = contract
            .methods()
            .iter()
            .map(|method| {
                let decision = self.classify(method);
                tracing::debug!(
                    contract = contract.name(),
                    method = %method,
                    ?decision,
                    "classified method"
                );
                (method.clone(), decision)
            })
            .collect();
        DispatchTable { decisions }
    }
}

/// Shorthand for a one-off classification.
pub fn classify(method: &MethodSignature, specs: &[HandlerSpec]) -> DispatchDecision {
    DispatchClassifier::new(specs).classify(method)
}

/// Memoized decisions for every method of a contract, in contract order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchTable {
    decisions: IndexMap<MethodSignature, DispatchDecision>,
}

impl DispatchTable {
    pub fn get(&self, method: &MethodSignature) -> Option<DispatchDecision> {
        self.decisions.get(method).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MethodSignature, &DispatchDecision)> {
        self.decisions.iter()
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn claimed_count(&self) -> usize {
        self.decisions.values().filter(|d| d.is_claimed()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::DelegateObject;
    use crate::error::ProxyResult;
    use crate::spec::{Args, FunctionTableSpec, WrappedInstanceSpec, NO_MATCH};
    use crate::types::{TypeRef, Value};
    use std::sync::Arc;

    fn sig(name: &str) -> MethodSignature {
        MethodSignature::new(name, vec![], TypeRef::Object)
    }

    fn table_for(name: &'static str) -> HandlerSpec {
        FunctionTableSpec::from_fns(
            vec![|_: Args| -> ProxyResult<Value> { Ok(Value::Null) }],
            move |m: &MethodSignature| if m.name == name { 0 } else { NO_MATCH },
        )
        .unwrap()
        .into()
    }

    fn wrap_all() -> HandlerSpec {
        WrappedInstanceSpec::direct(Arc::new(DelegateObject::builder("Any").build())).into()
    }

    #[test]
    fn test_first_match_wins() {
        let specs = vec![table_for("a"), wrap_all()];
        assert_eq!(
            classify(&sig("a"), &specs),
            DispatchDecision::Claimed {
                spec: 0,
                claim: Claim::Slot(0),
                cache_spec: false
            }
        );
        assert_eq!(
            classify(&sig("b"), &specs),
            DispatchDecision::Claimed {
                spec: 1,
                claim: Claim::Delegate,
                cache_spec: false
            }
        );

        let reversed = vec![wrap_all(), table_for("a")];
        assert_eq!(classify(&sig("a"), &reversed).spec_index(), Some(0));
    }

    #[test]
    fn test_unclaimed_cache_flag() {
        let specs = vec![table_for("a"), table_for("b")];
        assert_eq!(
            classify(&sig("z"), &specs),
            DispatchDecision::Unclaimed { cache_spec: true }
        );
        assert_eq!(
            classify(&sig("z"), &[]),
            DispatchDecision::Unclaimed { cache_spec: true }
        );
    }

    #[test]
    fn test_classify_all_keeps_contract_order() {
        let contract = Contract::new("C", vec![sig("b"), sig("a")]).unwrap();
        let specs = vec![table_for("a")];
        let table = DispatchClassifier::new(&specs).classify_all(&contract);
        let order: Vec<&str> = table.iter().map(|(m, _)| m.name.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
        assert_eq!(table.claimed_count(), 1);
        assert!(!table.get(&sig("b")).unwrap().is_claimed());
    }
}
