#![forbid(unsafe_code)]

mod context;
mod registry;
mod types;

pub use context::TypeContext;
pub use registry::{ClassDef, EnumDef, ProtocolDef, TypeRegistry, ValueTypeDef};
pub use types::Type;
