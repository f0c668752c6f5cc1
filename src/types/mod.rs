//! Type model: declared types, registered schemas and the registry that
//! resolves wire names back to them.

mod registry;
mod schema;
mod type_ref;

pub use registry::{
    FastMap, MemberDescriptor, TypeDescriptor, TypeRegistry, XxBuildHasher, strip_version,
};
pub use schema::{MemberKind, MemberSchema, SchemaKind, TypeSchema};
pub use type_ref::{MAX_TYPE_DEPTH, TypeCategory, TypeRef, short_name};
