use super::id::ObjRef;
use crate::error::{GraphwireError, Result};
use crate::value::Value;
use std::sync::Arc;

/// An instance of a registered record type.
///
/// Members are kept in insertion order. A member that was never set reads as
/// absent; the serializer substitutes the declared type's default for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    type_name: Arc<str>,
    members: Vec<(Arc<str>, Value)>,
}

impl Object {
    /// Creates an empty instance of `type_name`.
    pub fn new(type_name: impl Into<Arc<str>>) -> Self {
        Self {
            type_name: type_name.into(),
            members: Vec::new(),
        }
    }

    /// Builder-style [`Object::set`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Registered type name.
    pub fn type_name(&self) -> &Arc<str> {
        &self.type_name
    }

    /// Reads a member.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.members
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, v)| v)
    }

    /// Assigns a member, replacing any previous value.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.members.iter_mut().find(|(n, _)| n.as_ref() == name) {
            Some((_, slot)) => *slot = value,
            None => self.members.push((name.into(), value)),
        }
    }

    pub(crate) fn set_shared(&mut self, name: &Arc<str>, value: Value) {
        match self.members.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.members.push((Arc::clone(name), value)),
        }
    }

    /// Members in insertion order.
    pub fn members(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.members.iter().map(|(n, v)| (n.as_ref(), v))
    }
}

/// Arena owning every record of a graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Heap {
    objects: Vec<Object>,
}

impl Heap {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves `object` into the arena and returns its handle.
    pub fn alloc(&mut self, object: Object) -> ObjRef {
        let id = ObjRef::new(u32::try_from(self.objects.len()).unwrap_or(u32::MAX));
        self.objects.push(object);
        id
    }

    /// Looks up an object.
    pub fn get(&self, id: ObjRef) -> Option<&Object> {
        self.objects.get(id.index())
    }

    /// Looks up an object for mutation.
    pub fn get_mut(&mut self, id: ObjRef) -> Option<&mut Object> {
        self.objects.get_mut(id.index())
    }

    /// Like [`Heap::get`] but reports a dangling handle as an error.
    pub fn resolve(&self, id: ObjRef) -> Result<&Object> {
        self.get(id)
            .ok_or_else(|| GraphwireError::Format(format!("dangling object reference {id}")))
    }

    pub(crate) fn resolve_mut(&mut self, id: ObjRef) -> Result<&mut Object> {
        self.get_mut(id)
            .ok_or_else(|| GraphwireError::Internal(format!("dangling object reference {id}")))
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if the arena holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// All handles in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = ObjRef> + '_ {
        (0..self.objects.len()).map(|i| ObjRef::new(u32::try_from(i).unwrap_or(u32::MAX)))
    }
}

/// A root value together with the arena its references point into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    /// Record storage.
    pub heap: Heap,
    /// Root value.
    pub root: Value,
}

impl Graph {
    /// A graph whose root is a plain value with no records.
    pub fn from_value(root: impl Into<Value>) -> Self {
        Self {
            heap: Heap::new(),
            root: root.into(),
        }
    }

    /// A graph with an existing heap.
    pub fn new(heap: Heap, root: Value) -> Self {
        Self { heap, root }
    }

    /// The root as an object handle, if it is one.
    pub fn root_object(&self) -> Option<ObjRef> {
        match self.root {
            Value::Object(id) => Some(id),
            _ => None,
        }
    }

    /// Reads member `name` of the object behind `id`.
    pub fn member(&self, id: ObjRef, name: &str) -> Option<&Value> {
        self.heap.get(id).and_then(|o| o.get(name))
    }
}
