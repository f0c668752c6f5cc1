//! Registered schemas, their cached descriptors and wire-name resolution.
//!
//! The registry is the only state shared between engine calls. Every table sits
//! behind its own `RwLock`: lookups take read locks and run concurrently,
//! registration and cache population take short write locks. The caches only
//! ever gain entries (or drop one on re-registration), so a poisoned lock still
//! holds consistent data and is recovered rather than reported.

use super::schema::{MemberKind, SchemaKind, TypeSchema};
use super::type_ref::{TypeRef, short_name};
use crate::error::{GraphwireError, Result};
use crate::graph::Object;
use crate::value::default_value;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::hash::BuildHasher;
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};
use twox_hash::XxHash64;

/// `BuildHasher` for the registry and engine lookup tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct XxBuildHasher;

impl BuildHasher for XxBuildHasher {
    type Hasher = XxHash64;

    fn build_hasher(&self) -> XxHash64 {
        XxHash64::with_seed(0)
    }
}

/// `HashMap` keyed with xxHash64.
pub type FastMap<K, V> = HashMap<K, V, XxBuildHasher>;

fn version_pattern() -> Result<&'static Regex> {
    static VERSION: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    VERSION
        .get_or_init(|| {
            Regex::new(r"\,\sVersion=\d+\.\d+\.\d+\.\d+\,\sCulture=[^\,]+\,\sPublicKeyToken=\w+")
        })
        .as_ref()
        .map_err(|e| GraphwireError::Internal(format!("version pattern: {e}")))
}

/// Removes the `Version=…, Culture=…, PublicKeyToken=…` part of a qualified name.
///
/// # Errors
/// Returns [`GraphwireError::Internal`] if the version pattern failed to compile.
pub fn strip_version(name: &str) -> Result<String> {
    Ok(version_pattern()?.replace_all(name, "").into_owned())
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|p| p.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|p| p.into_inner())
}

/// A serializable member of a record.
#[derive(Debug, Clone)]
pub struct MemberDescriptor {
    /// Wire name.
    pub name: Arc<str>,
    /// Declared type.
    pub ty: TypeRef,
}

/// Cached, serialization-ready view of a record schema.
///
/// Only settable members that are neither marked nor listed as ignored appear
/// here. Both directions use the same view.
#[derive(Debug)]
pub struct TypeDescriptor {
    name: Arc<str>,
    fields: Vec<MemberDescriptor>,
    properties: Vec<MemberDescriptor>,
    field_index: FastMap<Arc<str>, usize>,
    property_index: FastMap<Arc<str>, usize>,
    constructible: bool,
}

impl TypeDescriptor {
    fn build(schema: &TypeSchema, ignored: Option<&HashSet<String>>) -> Self {
        let mut fields = Vec::new();
        let mut properties = Vec::new();
        for member in schema.members() {
            let listed = ignored.is_some_and(|set| set.contains(member.name.as_ref()));
            if member.ignored || listed || !member.settable {
                continue;
            }
            let descriptor = MemberDescriptor {
                name: Arc::clone(&member.name),
                ty: member.ty.clone(),
            };
            match member.kind {
                MemberKind::Field => fields.push(descriptor),
                MemberKind::Property => properties.push(descriptor),
            }
        }
        let index = |members: &[MemberDescriptor]| {
            members
                .iter()
                .enumerate()
                .map(|(i, m)| (Arc::clone(&m.name), i))
                .collect::<FastMap<_, _>>()
        };
        Self {
            name: Arc::clone(schema.name()),
            field_index: index(&fields),
            property_index: index(&properties),
            fields,
            properties,
            constructible: schema.is_constructible(),
        }
    }

    /// Canonical type name.
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Serializable fields in declaration order.
    pub fn fields(&self) -> &[MemberDescriptor] {
        &self.fields
    }

    /// Serializable properties in declaration order.
    pub fn properties(&self) -> &[MemberDescriptor] {
        &self.properties
    }

    /// Field by wire name.
    pub fn field(&self, name: &str) -> Option<&MemberDescriptor> {
        self.field_index.get(name).and_then(|i| self.fields.get(*i))
    }

    /// Property by wire name.
    pub fn property(&self, name: &str) -> Option<&MemberDescriptor> {
        self.property_index.get(name).and_then(|i| self.properties.get(*i))
    }

    /// Creates an instance with every member at its default.
    pub fn new_instance(&self) -> Result<Object> {
        if !self.constructible {
            return Err(GraphwireError::Construction(format!(
                "please define a parameterless constructor for {}",
                self.name
            )));
        }
        let mut object = Object::new(Arc::clone(&self.name));
        for member in self.fields.iter().chain(&self.properties) {
            object.set_shared(&member.name, default_value(&member.ty));
        }
        Ok(object)
    }
}

/// Registered types plus the descriptor and name-resolution caches.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    schemas: RwLock<FastMap<Arc<str>, Arc<TypeSchema>>>,
    /// Canonical, qualified and version-less names, all mapped to the canonical name.
    aliases: RwLock<FastMap<String, Arc<str>>>,
    ignored: RwLock<FastMap<Arc<str>, HashSet<String>>>,
    descriptors: RwLock<FastMap<Arc<str>, Arc<TypeDescriptor>>>,
    resolved: RwLock<FastMap<String, TypeRef>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used when no other one is configured.
    pub fn global() -> Arc<TypeRegistry> {
        static GLOBAL: OnceLock<Arc<TypeRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(TypeRegistry::new())))
    }

    /// Registers (or replaces) a schema.
    pub fn register(&self, schema: TypeSchema) {
        let name = Arc::clone(schema.name());
        let qualified = schema.qualified_name();
        debug!(type_name = %name, %qualified, "registering type");
        {
            let mut aliases = write(&self.aliases);
            aliases.insert(name.to_string(), Arc::clone(&name));
            if let Ok(stripped) = strip_version(&qualified) {
                aliases.insert(stripped, Arc::clone(&name));
            }
            aliases.insert(qualified, Arc::clone(&name));
        }
        write(&self.schemas).insert(Arc::clone(&name), Arc::new(schema));
        write(&self.descriptors).remove(&name);
        write(&self.resolved).clear();
    }

    /// Excludes member `member` of `type_name` from both directions.
    pub fn ignore_member(&self, type_name: &str, member: &str) {
        write(&self.ignored)
            .entry(Arc::from(type_name))
            .or_default()
            .insert(member.to_owned());
        write(&self.descriptors).remove(type_name);
    }

    /// Looks up a schema by canonical name.
    pub fn schema(&self, name: &str) -> Option<Arc<TypeSchema>> {
        read(&self.schemas).get(name).cloned()
    }

    /// True if `ty` names a registered interface.
    pub fn is_interface(&self, ty: &TypeRef) -> bool {
        match ty {
            TypeRef::Named(name) => self.schema(name).is_some_and(|s| s.is_interface()),
            _ => false,
        }
    }

    /// True if a value of record `runtime` may fill a slot declared as `declared`.
    pub fn accepts(&self, declared: &TypeRef, runtime: &str) -> bool {
        match declared {
            TypeRef::Object => true,
            TypeRef::Named(name) if name.as_ref() == runtime => true,
            TypeRef::Named(name) => self.schema(name).is_some_and(|s| match s.kind() {
                SchemaKind::Interface { variants } => variants.iter().any(|v| v.as_ref() == runtime),
                SchemaKind::Record => false,
            }),
            _ => false,
        }
    }

    /// Cached descriptor of a registered record.
    pub fn descriptor(&self, name: &str) -> Result<Arc<TypeDescriptor>> {
        if let Some(found) = read(&self.descriptors).get(name) {
            return Ok(Arc::clone(found));
        }
        let schema = self.schema(name).ok_or_else(|| {
            GraphwireError::TypeResolution(format!("type {name} is not registered"))
        })?;
        if schema.is_interface() {
            return Err(GraphwireError::Construction(format!(
                "cannot create an instance of interface {name}"
            )));
        }
        let built = {
            let ignored = read(&self.ignored);
            Arc::new(TypeDescriptor::build(&schema, ignored.get(name)))
        };
        trace!(type_name = %name, fields = built.fields.len(), properties = built.properties.len(), "descriptor built");
        let mut cache = write(&self.descriptors);
        Ok(Arc::clone(
            cache.entry(Arc::clone(schema.name())).or_insert(built),
        ))
    }

    /// Maps a record name from the stream to a registered canonical name.
    ///
    /// Tries the exact name, then the name without version information, then
    /// any registered type with the same short name.
    pub fn resolve_name(&self, raw: &str) -> Result<Arc<str>> {
        {
            let aliases = read(&self.aliases);
            if let Some(found) = aliases.get(raw) {
                return Ok(Arc::clone(found));
            }
            if let Some(found) = aliases.get(strip_version(raw)?.as_str()) {
                return Ok(Arc::clone(found));
            }
        }
        let wanted = short_name(raw);
        let schemas = read(&self.schemas);
        let mut matches = schemas.keys().filter(|name| short_name(name) == wanted);
        match (matches.next(), matches.next()) {
            (Some(found), None) => {
                debug!(stream_name = raw, resolved = %found, "resolved type by short name");
                Ok(Arc::clone(found))
            }
            (Some(_), Some(_)) => Err(GraphwireError::TypeResolution(format!(
                "type name {raw} is ambiguous"
            ))),
            (None, _) => Err(GraphwireError::TypeResolution(format!(
                "cannot find type {raw}"
            ))),
        }
    }

    /// Parses and resolves a wire type name. Results are cached per name.
    pub fn resolve_type(&self, wire_name: &str) -> Result<TypeRef> {
        if let Some(found) = read(&self.resolved).get(wire_name) {
            return Ok(found.clone());
        }
        let ty = TypeRef::parse(wire_name)?.map_names(&mut |raw| self.resolve_name(raw))?;
        write(&self.resolved).insert(wire_name.to_owned(), ty.clone());
        Ok(ty)
    }

    /// Wire name of a type, with record names in their qualified form.
    pub fn wire_name(&self, ty: &TypeRef) -> Result<String> {
        let qualified = ty.map_names(&mut |name| {
            self.schema(name)
                .map(|s| Arc::from(s.qualified_name()))
                .ok_or_else(|| GraphwireError::Format(format!("type {name} is not registered")))
        })?;
        Ok(qualified.to_string())
    }

    /// True if a record written as `stream` may be read into `target`: the same
    /// type, or types whose short names agree.
    pub fn castable(&self, stream: &str, target: &str) -> bool {
        stream == target || short_name(stream) == short_name(target)
    }
}
