use std::fmt;

/// Index handle of an object in a [`Heap`](super::Heap).
///
/// Two handles are the same reference exactly when their indices are equal;
/// this is the identity the known-object table works with.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(u32);

impl ObjRef {
    /// Restricted to the graph module so handles only come from an arena.
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw arena index.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjRef({})", self.0)
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}
