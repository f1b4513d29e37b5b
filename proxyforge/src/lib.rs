// Proxyforge Library
// Method-to-handler resolution and invocation routing for generated proxies

pub mod config;
pub mod delegate;
pub mod dispatch;
pub mod error;
pub mod proxy;
pub mod spec;
pub mod types;

// Re-export the surface most callers need.
pub use config::ProxyConfig;
pub use delegate::{Delegate, DelegateObject, TargetType};
pub use dispatch::{classify, DispatchClassifier, DispatchDecision, DispatchTable};
pub use error::{ProxyError, ProxyResult};
pub use proxy::{
    DefaultCall, DefaultHandler, ProxyBuilder, ProxyClass, ProxyClassCache, ProxyInstance,
};
pub use spec::{
    empty_args, Args, CapturedProperty, CapturedValue, Claim, DelegatePredicate, FunctionTableSpec,
    HandlerSpec, LazyInstance, LazyState, WrappedInstanceSpec, NO_MATCH,
};
pub use types::{Contract, MethodSignature, TypeRef, Value};
