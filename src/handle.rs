// Resource handles and the arenas that back them
//
// Every GPU object handed out by a backend is named by a small non-zero
// integer. Zero is reserved as the "absent / failed" sentinel so callers can
// check a creation result without an Option.
//
// Handles are backend-private: the OpenGL backend hands out driver object
// names, the Vulkan backend hands out `index + 1` into a `HandleTable`.
// Passing a handle created by one backend instance to another is a caller bug
// and is not detected.

use std::fmt;

/// Opaque non-zero identifier of a backend-owned GPU resource.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Handle(u32);

impl Handle {
    /// The universal "absent / failed" sentinel.
    pub const NONE: Handle = Handle(0);

    /// Wrap a raw value. `0` produces [`Handle::NONE`].
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    pub const fn is_some(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "Handle(NONE)")
        } else {
            write!(f, "Handle({})", self.0)
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Append-only arena mapping handles to backend-native objects.
///
/// Slots are never freed or reused during a session; the whole table is
/// drained at shutdown with [`HandleTable::drain_rev`]. If mid-session
/// destruction is ever added, this needs generational indices.
pub struct HandleTable<T> {
    items: Vec<T>,
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Store an object and return its handle (`index + 1`, never zero).
    pub fn insert(&mut self, item: T) -> Handle {
        self.items.push(item);
        let raw = u32::try_from(self.items.len()).unwrap_or(u32::MAX);
        Handle(raw)
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        let index = (handle.0 as usize).checked_sub(1)?;
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (Handle(i as u32 + 1), item))
    }

    /// Remove every object, newest first. Used for bulk teardown.
    pub fn drain_rev(&mut self) -> impl Iterator<Item = T> + '_ {
        self.items.drain(..).rev()
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
