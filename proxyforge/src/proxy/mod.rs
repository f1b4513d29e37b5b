//! Proxy generation driver: builder, generated classes, instances and the
//! class cache.

pub mod builder;
pub mod cache;
pub mod class;
pub mod instance;

pub use builder::ProxyBuilder;
pub use cache::ProxyClassCache;
pub use class::{DispatchReport, MethodReport, PropertyReport, ProxyClass};
pub use instance::{DefaultCall, DefaultHandler, ProxyInstance};
