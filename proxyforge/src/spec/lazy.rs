//! Memoize-once cells for lazily produced delegates.
//!
//! A cell moves `Unforced -> Forcing -> Forced` and never leaves `Forced`.
//! Concurrent first accesses block on the same initialization, so the supplier
//! runs at most once per cell. A failing supplier, or one producing a value
//! that does not provide the declared target type, drops the cell back to
//! `Unforced` and the next access tries again.

use crate::delegate::{Delegate, TargetType};
use crate::error::{ProxyError, ProxyResult};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const UNFORCED: u8 = 0;
const FORCING: u8 = 1;
const FORCED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LazyState {
    Unforced,
    Forcing,
    Forced,
}

pub type Supplier = Box<dyn Fn() -> ProxyResult<Arc<dyn Delegate>> + Send + Sync>;

pub struct LazyInstance {
    target_type: TargetType,
    state: AtomicU8,
    cell: OnceCell<Arc<dyn Delegate>>,
    supplier: Supplier,
}

impl LazyInstance {
    /// `target_type` is what proxies validate against before the value exists.
    pub fn new<F>(target_type: TargetType, supplier: F) -> Self
    where
        F: Fn() -> ProxyResult<Arc<dyn Delegate>> + Send + Sync + 'static,
    {
        Self {
            target_type,
            state: AtomicU8::new(UNFORCED),
            cell: OnceCell::new(),
            supplier: Box::new(supplier),
        }
    }

    /// A cell that is already forced.
    pub fn forced(value: Arc<dyn Delegate>) -> Self {
        let target_type = value.target_type().clone();
        let cell = OnceCell::new();
        let kept = Arc::clone(&value);
        let _ = cell.set(value);
        Self {
            target_type,
            state: AtomicU8::new(FORCED),
            cell,
            supplier: Box::new(move || Ok(Arc::clone(&kept))),
        }
    }

    pub fn target_type(&self) -> &TargetType {
        &self.target_type
    }

    pub fn state(&self) -> LazyState {
        if self.cell.get().is_some() {
            return LazyState::Forced;
        }
        match self.state.load(Ordering::Acquire) {
            FORCING => LazyState::Forcing,
            FORCED => LazyState::Forced,
            _ => LazyState::Unforced,
        }
    }

    /// Returns the realized value, producing it on first access.
    pub fn force(&self) -> ProxyResult<Arc<dyn Delegate>> {
        if let Some(value) = self.cell.get() {
            return Ok(Arc::clone(value));
        }
        let value = self.cell.get_or_try_init(|| {
            self.state.store(FORCING, Ordering::Release);
            tracing::trace!(target_type = %self.target_type.name, "forcing lazy instance");
            (self.supplier)()
                .and_then(|value| self.check_realized(value))
                .map_err(|e| {
                    self.state.store(UNFORCED, Ordering::Release);
                    e
                })
        })?;
        self.state.store(FORCED, Ordering::Release);
        Ok(Arc::clone(value))
    }

    /// The realized value must provide every method the declared type does,
    /// since build-time validation only saw the declared type.
    fn check_realized(&self, value: Arc<dyn Delegate>) -> ProxyResult<Arc<dyn Delegate>> {
        let realized = value.target_type();
        for method in &self.target_type.methods {
            if realized.find_compatible(method).is_none() {
                return Err(ProxyError::IncompatibleDelegate {
                    method: method.to_string(),
                    target_type: realized.name.clone(),
                });
            }
        }
        Ok(value)
    }
}

impl fmt::Debug for LazyInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyInstance")
            .field("target_type", &self.target_type.name)
            .field("state", &self.state())
            .finish()
    }
}
