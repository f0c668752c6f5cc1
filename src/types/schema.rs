//! Explicit per-type schema registration.
//!
//! A [`TypeSchema`] lists the members of a record in declaration order, split
//! into fields and properties the way they travel on the wire. Interfaces
//! declare the closed set of records that may stand in for them.
//!
//! ```rust
//! use graphwire::types::{TypeRef, TypeSchema};
//!
//! let person = TypeSchema::record("Acme.Person")
//!     .assembly("Acme", "1.0.0.0")
//!     .field("Name", TypeRef::String)
//!     .field("Id", TypeRef::Int32)
//!     .property("Friend", TypeRef::named("Acme.Person"))
//!     .read_only_property("DisplayName", TypeRef::String);
//! assert_eq!(
//!     person.qualified_name(),
//!     "Acme.Person, Acme, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null"
//! );
//! ```

use super::type_ref::TypeRef;
use std::sync::Arc;

/// Which wire section a member belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// Written in the field section.
    Field,
    /// Written in the property section.
    Property,
}

/// One named, typed slot of a record.
#[derive(Debug, Clone)]
pub struct MemberSchema {
    /// Member name as written on the wire.
    pub name: Arc<str>,
    /// Declared type.
    pub ty: TypeRef,
    /// Field or property.
    pub kind: MemberKind,
    /// Properties without a setter take no part in serialization.
    pub settable: bool,
    /// Per-member ignore marker.
    pub ignored: bool,
}

/// Record or interface.
#[derive(Debug, Clone)]
pub enum SchemaKind {
    /// Concrete type with members.
    Record,
    /// Abstract slot type; values must be one of `variants`.
    Interface {
        /// Registered record names accepted in place of the interface.
        variants: Vec<Arc<str>>,
    },
}

/// Schema of a registered type.
#[derive(Debug, Clone)]
pub struct TypeSchema {
    name: Arc<str>,
    assembly: Option<(Arc<str>, Option<Arc<str>>)>,
    kind: SchemaKind,
    members: Vec<MemberSchema>,
    constructible: bool,
}

impl TypeSchema {
    /// Starts a record schema.
    pub fn record(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            assembly: None,
            kind: SchemaKind::Record,
            members: Vec::new(),
            constructible: true,
        }
    }

    /// Starts an interface schema.
    pub fn interface(name: impl Into<Arc<str>>) -> Self {
        Self {
            kind: SchemaKind::Interface {
                variants: Vec::new(),
            },
            constructible: false,
            ..Self::record(name)
        }
    }

    /// Sets the assembly name and version that qualify the wire name.
    pub fn assembly(mut self, assembly: impl Into<Arc<str>>, version: impl Into<Arc<str>>) -> Self {
        self.assembly = Some((assembly.into(), Some(version.into())));
        self
    }

    /// Sets an assembly name without a version.
    pub fn unversioned_assembly(mut self, assembly: impl Into<Arc<str>>) -> Self {
        self.assembly = Some((assembly.into(), None));
        self
    }

    fn member(mut self, name: &str, ty: TypeRef, kind: MemberKind, settable: bool, ignored: bool) -> Self {
        self.members.push(MemberSchema {
            name: name.into(),
            ty,
            kind,
            settable,
            ignored,
        });
        self
    }

    /// Adds a public field.
    pub fn field(self, name: &str, ty: TypeRef) -> Self {
        self.member(name, ty, MemberKind::Field, true, false)
    }

    /// Adds a property with a setter.
    pub fn property(self, name: &str, ty: TypeRef) -> Self {
        self.member(name, ty, MemberKind::Property, true, false)
    }

    /// Adds a getter-only property. It is never written or read.
    pub fn read_only_property(self, name: &str, ty: TypeRef) -> Self {
        self.member(name, ty, MemberKind::Property, false, false)
    }

    /// Adds a field carrying the ignore marker.
    pub fn ignored_field(self, name: &str, ty: TypeRef) -> Self {
        self.member(name, ty, MemberKind::Field, true, true)
    }

    /// Adds a property carrying the ignore marker.
    pub fn ignored_property(self, name: &str, ty: TypeRef) -> Self {
        self.member(name, ty, MemberKind::Property, true, true)
    }

    /// Marks the record as lacking a parameterless constructor.
    pub fn without_default_constructor(mut self) -> Self {
        self.constructible = false;
        self
    }

    /// Adds an accepted variant to an interface. No effect on records.
    pub fn variant(mut self, record: impl Into<Arc<str>>) -> Self {
        if let SchemaKind::Interface { variants } = &mut self.kind {
            variants.push(record.into());
        }
        self
    }

    /// Canonical name.
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Record or interface.
    pub fn kind(&self) -> &SchemaKind {
        &self.kind
    }

    /// All declared members, including ignored and read-only ones.
    pub fn members(&self) -> &[MemberSchema] {
        &self.members
    }

    /// Whether instances can be created without arguments.
    pub fn is_constructible(&self) -> bool {
        self.constructible
    }

    /// True for interface schemas.
    pub fn is_interface(&self) -> bool {
        matches!(self.kind, SchemaKind::Interface { .. })
    }

    /// Name written after a custom type tag.
    pub fn qualified_name(&self) -> String {
        match &self.assembly {
            Some((asm, Some(version))) => format!(
                "{}, {asm}, Version={version}, Culture=neutral, PublicKeyToken=null",
                self.name
            ),
            Some((asm, None)) => format!("{}, {asm}", self.name),
            None => self.name.to_string(),
        }
    }
}
