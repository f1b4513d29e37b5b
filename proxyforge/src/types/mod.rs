pub mod signature;
pub mod value;

pub use signature::{Contract, MethodSignature, TypeRef};
pub use value::Value;
