//! Reuse of proxy classes across identical configurations.
//!
//! The key is the contract plus the ordered spec list as configured. Spec
//! equality is identity over captured state, so rebuilding from the same
//! function tables, resolvers, wrapped values and predicates hits the cache.
//!
//! Builds run with no map lock held. Resolvers, predicates and emitters may
//! call back into the same cache. Two racing builds of one key both run and
//! the first insert wins.

use crate::config::ProxyConfig;
use crate::dispatch::CodeEmitter;
use crate::error::ProxyResult;
use crate::proxy::builder::ProxyBuilder;
use crate::proxy::class::ProxyClass;
use crate::spec::{identity, HandlerSpec};
use crate::types::Contract;
use dashmap::DashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone)]
struct ClassKey {
    contract: Contract,
    specs: Vec<HandlerSpec>,
    config: ProxyConfig,
    /// Held so the address cannot be reused while the entry lives.
    emitter: Arc<dyn CodeEmitter>,
}

impl ClassKey {
    fn of(builder: &ProxyBuilder) -> Self {
        Self {
            contract: builder.contract.clone(),
            specs: builder.specs.clone(),
            config: builder.config.clone(),
            emitter: Arc::clone(&builder.emitter),
        }
    }
}

impl PartialEq for ClassKey {
    fn eq(&self, other: &Self) -> bool {
        self.contract == other.contract
            && self.specs == other.specs
            && self.config == other.config
            && Arc::ptr_eq(&self.emitter, &other.emitter)
    }
}

impl Eq for ClassKey {}

impl Hash for ClassKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.contract.hash(state);
        self.specs.hash(state);
        self.config.hash(state);
        identity(&self.emitter).hash(state);
    }
}

#[derive(Default)]
pub struct ProxyClassCache {
    classes: DashMap<ClassKey, Arc<ProxyClass>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ProxyClassCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached class for `builder`'s configuration, building it
    /// on a miss. Failed builds are not cached.
    pub fn get_or_build(&self, builder: ProxyBuilder) -> ProxyResult<Arc<ProxyClass>> {
        let key = ClassKey::of(&builder);
        if let Some(entry) = self.classes.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(class = %entry.name(), "proxy class cache hit");
            return Ok(Arc::clone(entry.value()));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let class = builder.build()?;
        let stored = Arc::clone(self.classes.entry(key).or_insert(class).value());
        Ok(stored)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.classes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::{Delegate, DelegateObject};
    use crate::dispatch::InterpretingEmitter;
    use crate::error::ProxyError;
    use crate::spec::{Args, FunctionTableSpec, WrappedInstanceSpec, NO_MATCH};
    use crate::types::{MethodSignature, TypeRef, Value};
    use std::sync::atomic::AtomicBool;
    use std::sync::Weak;

    fn size() -> MethodSignature {
        MethodSignature::new("size", vec![], TypeRef::Int)
    }

    fn contract() -> Contract {
        Contract::new("Sized", vec![size()]).unwrap()
    }

    fn target() -> Arc<dyn Delegate> {
        Arc::new(
            DelegateObject::builder("Sized")
                .method(size(), |_| Ok(Value::Int(9)))
                .build(),
        )
    }

    #[test]
    fn test_identical_configuration_hits() {
        let cache = ProxyClassCache::new();
        let spec = WrappedInstanceSpec::direct(target());

        let first = ProxyBuilder::new(contract())
            .spec(spec.clone())
            .build_cached(&cache)
            .unwrap();
        let second = ProxyBuilder::new(contract())
            .spec(spec)
            .build_cached(&cache)
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
    }

    #[test]
    fn test_different_target_misses() {
        let cache = ProxyClassCache::new();
        let a = ProxyBuilder::new(contract())
            .spec(WrappedInstanceSpec::direct(target()))
            .build_cached(&cache)
            .unwrap();
        let b = ProxyBuilder::new(contract())
            .spec(WrappedInstanceSpec::direct(target()))
            .build_cached(&cache)
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_ne!(a.name(), b.name());
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_failed_build_not_cached() {
        let cache = ProxyClassCache::new();
        let empty: Arc<dyn Delegate> = Arc::new(DelegateObject::builder("Empty").build());
        let err = ProxyBuilder::new(contract())
            .spec(WrappedInstanceSpec::direct(empty))
            .build_cached(&cache)
            .unwrap_err();
        assert!(matches!(err, ProxyError::IncompatibleDelegate { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_resolver_may_reenter_cache() {
        let cache = Arc::new(ProxyClassCache::new());
        let inner_built = Arc::new(AtomicBool::new(false));

        let resolver = {
            let cache: Weak<ProxyClassCache> = Arc::downgrade(&cache);
            let inner_built = Arc::clone(&inner_built);
            move |m: &MethodSignature| -> i64 {
                let Some(cache) = cache.upgrade() else {
                    return NO_MATCH;
                };
                let inner = Contract::new("Inner", vec![m.clone()]).unwrap();
                let built = ProxyBuilder::new(inner)
                    .spec(WrappedInstanceSpec::direct(target()))
                    .build_cached(&cache);
                inner_built.store(built.is_ok(), Ordering::SeqCst);
                0
            }
        };
        let outer = FunctionTableSpec::from_fns(
            vec![|_: Args| -> ProxyResult<Value> { Ok(Value::Int(1)) }],
            resolver,
        )
        .unwrap();

        let class = ProxyBuilder::new(contract())
            .spec(outer)
            .build_cached(&cache)
            .unwrap();
        assert!(inner_built.load(Ordering::SeqCst));
        assert_eq!(class.instantiate().invoke(&size(), &[]).unwrap(), Value::Int(1));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.misses(), 2);
    }

    #[test]
    fn test_distinct_emitters_miss() {
        let cache = ProxyClassCache::new();
        let spec = WrappedInstanceSpec::direct(target());
        let build = |emitter: Arc<dyn CodeEmitter>| {
            ProxyBuilder::new(contract())
                .spec(spec.clone())
                .emitter(emitter)
                .build_cached(&cache)
                .unwrap()
        };

        let shared: Arc<dyn CodeEmitter> = Arc::new(InterpretingEmitter::new());
        let first = build(Arc::clone(&shared));
        let again = build(Arc::clone(&shared));
        let other = build(Arc::new(InterpretingEmitter::new()));

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(cache.len(), 2);
    }
}
