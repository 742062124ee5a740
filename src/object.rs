use tracing::{debug, trace};

use crate::{table::Table, value::Value};

/// Stable handle to an object owned by a [`Heap`].
///
/// Every object in the heap is a string, so the handle carries the string's
/// hash. Tables can then probe without reaching back into the heap. Two handles
/// are equal only when they name the same object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjRef {
    index: u32,
    hash: u32,
}

impl ObjRef {
    pub fn hash(&self) -> u32 {
        self.hash
    }

    fn index(&self) -> usize {
        self.index as usize
    }
}

#[derive(Debug)]
pub struct ObjString {
    chars: Box<str>,
    hash: u32,
}

impl ObjString {
    pub fn as_str(&self) -> &str {
        &self.chars
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }
}

#[derive(Debug)]
pub enum Object {
    String(ObjString),
}

impl Object {
    pub fn as_string(&self) -> &ObjString {
        match self {
            Object::String(string) => string,
        }
    }
}

/// 32-bit FNV-1a over the raw bytes.
pub fn hash_string(chars: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for byte in chars.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// Registry owning every object allocated during a session, plus the intern
/// table that keeps one object per distinct string.
///
/// Nothing is freed while the heap is alive; dropping it releases every object
/// at once.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<Object>,
    strings: Table,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the interned string equal to `chars`, allocating it if this is
    /// the first time it has been seen.
    pub fn intern(&mut self, chars: &str) -> ObjRef {
        let hash = hash_string(chars);
        if let Some(interned) = self.find_interned(chars, hash) {
            return interned;
        }
        self.allocate_string(chars.into(), hash)
    }

    /// Like [`Heap::intern`], but takes ownership of an already built buffer.
    /// The buffer is dropped when an equal string is already interned.
    pub fn take_string(&mut self, chars: String) -> ObjRef {
        let hash = hash_string(&chars);
        if let Some(interned) = self.find_interned(&chars, hash) {
            return interned;
        }
        self.allocate_string(chars.into_boxed_str(), hash)
    }

    /// Looks up an interned string without allocating.
    pub fn find_interned(&self, chars: &str, hash: u32) -> Option<ObjRef> {
        let objects = &self.objects;
        self.strings
            .find_interned(chars, hash, |key| objects[key.index()].as_string().as_str())
    }

    pub fn get(&self, reference: ObjRef) -> &Object {
        &self.objects[reference.index()]
    }

    pub fn as_str(&self, reference: ObjRef) -> &str {
        self.get(reference).as_string().as_str()
    }

    /// Number of objects allocated so far.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn allocate_string(&mut self, chars: Box<str>, hash: u32) -> ObjRef {
        let index = u32::try_from(self.objects.len()).expect("heap exceeded u32::MAX objects");
        let reference = ObjRef { index, hash };
        trace!(index, len = chars.len(), "interning new string");
        self.objects.push(Object::String(ObjString { chars, hash }));
        self.strings.insert(reference, Value::Nil);
        reference
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        debug!(objects = self.objects.len(), "releasing heap");
    }
}
