use crate::{object::ObjRef, value::Value};

const TABLE_MAX_LOAD: f64 = 0.75;
const MIN_CAPACITY: usize = 8;

/// A slot is empty when `key` is `None` and `value` is nil, and a tombstone
/// when `key` is `None` and `value` is `true`.
#[derive(Debug, Clone, Copy)]
struct Entry {
    key: Option<ObjRef>,
    value: Value,
}

impl Entry {
    const EMPTY: Entry = Entry {
        key: None,
        value: Value::Nil,
    };

    const TOMBSTONE: Entry = Entry {
        key: None,
        value: Value::Boolean(true),
    };

    fn is_tombstone(&self) -> bool {
        self.key.is_none() && !matches!(self.value, Value::Nil)
    }
}

/// Open addressing hash table with linear probing, keyed by interned string
/// identity.
#[derive(Debug, Default)]
pub struct Table {
    /// Occupied slots, tombstones included.
    count: usize,
    tombstones: usize,
    entries: Vec<Entry>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.count - self.tombstones
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts or overwrites `key`. Returns `true` when the key was not
    /// present before.
    pub fn insert(&mut self, key: ObjRef, value: Value) -> bool {
        if (self.count + 1) as f64 > self.capacity() as f64 * TABLE_MAX_LOAD {
            let capacity = if self.capacity() < MIN_CAPACITY {
                MIN_CAPACITY
            } else {
                self.capacity() * 2
            };
            self.adjust_capacity(capacity);
        }

        let index = find_entry(&self.entries, key);
        let entry = &mut self.entries[index];
        let is_new_key = entry.key.is_none();
        if is_new_key {
            if entry.is_tombstone() {
                self.tombstones -= 1;
            } else {
                self.count += 1;
            }
        }

        entry.key = Some(key);
        entry.value = value;
        is_new_key
    }

    pub fn get(&self, key: ObjRef) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        let entry = &self.entries[find_entry(&self.entries, key)];
        entry.key.map(|_| entry.value)
    }

    /// Removes `key`, leaving a tombstone so later probe sequences still pass
    /// over the slot. Returns `true` when the key was present.
    pub fn delete(&mut self, key: ObjRef) -> bool {
        if self.count == 0 {
            return false;
        }
        let index = find_entry(&self.entries, key);
        if self.entries[index].key.is_none() {
            return false;
        }
        self.entries[index] = Entry::TOMBSTONE;
        self.tombstones += 1;
        true
    }

    /// Copies every live entry of `other` into this table.
    pub fn extend_from(&mut self, other: &Table) {
        for (key, value) in other.iter() {
            self.insert(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, Value)> + '_ {
        self.entries
            .iter()
            .filter_map(|entry| entry.key.map(|key| (key, entry.value)))
    }

    /// Probes for a key whose string content equals `chars`.
    ///
    /// This is the only lookup that compares content instead of identity;
    /// `resolve` maps a key to its characters.
    pub fn find_interned<'h>(
        &self,
        chars: &str,
        hash: u32,
        resolve: impl Fn(ObjRef) -> &'h str,
    ) -> Option<ObjRef> {
        if self.count == 0 {
            return None;
        }

        let capacity = self.capacity();
        let mut index = hash as usize % capacity;
        loop {
            let entry = &self.entries[index];
            match entry.key {
                None if !entry.is_tombstone() => return None,
                None => {}
                Some(key) => {
                    if key.hash() == hash && resolve(key) == chars {
                        return Some(key);
                    }
                }
            }
            index = (index + 1) % capacity;
        }
    }

    fn adjust_capacity(&mut self, capacity: usize) {
        let old = std::mem::replace(&mut self.entries, vec![Entry::EMPTY; capacity]);
        self.count = 0;
        self.tombstones = 0;
        for entry in old {
            let Some(key) = entry.key else {
                continue;
            };
            let index = find_entry(&self.entries, key);
            self.entries[index] = entry;
            self.count += 1;
        }
    }
}

/// Index of the slot holding `key`, or of the slot an insert of `key` should
/// use: the first tombstone passed, else the empty slot that ended the probe.
fn find_entry(entries: &[Entry], key: ObjRef) -> usize {
    let capacity = entries.len();
    let mut index = key.hash() as usize % capacity;
    let mut tombstone = None;

    loop {
        let entry = &entries[index];
        match entry.key {
            None if entry.is_tombstone() => {
                tombstone.get_or_insert(index);
            }
            None => return tombstone.unwrap_or(index),
            Some(k) if k == key => return index,
            Some(_) => {}
        }
        index = (index + 1) % capacity;
    }
}
