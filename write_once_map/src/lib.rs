//! Maps whose entries, once written, live for the rest of the process.
//!
//! Runtime type information is populated once, shortly after the
//! describing binary is loaded, and is then only ever read.
//! [`WriteOnceMap`] is shaped for exactly that access pattern:
//! inserted values are moved to stable, leaked storage and handed out
//! as `&'static` references, so readers never observe a value that
//! moves or disappears.
//! There is deliberately no way to remove or replace an entry.

#![warn(missing_docs)]

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::sync::PoisonError;

/// Insert-once map with process-lifetime values.
///
/// The first insertion under a key wins.
/// Later insertions under the same key return the original value
/// and drop the new one.
pub struct WriteOnceMap<K, V: 'static>
{
    inner: Mutex<HashMap<K, &'static V>>,
}

impl<K, V> WriteOnceMap<K, V>
    where K: Eq + Hash, V: 'static
{
    /// Create an empty map.
    pub fn new() -> Self
    {
        Self{inner: Mutex::new(HashMap::new())}
    }

    fn lock(&self) -> std::sync::MutexGuard<HashMap<K, &'static V>>
    {
        // Entries are immutable once written,
        // so a poisoned lock cannot expose a broken invariant.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up the value stored under the given key.
    pub fn get<Q>(&self, key: &Q) -> Option<&'static V>
        where K: Borrow<Q>, Q: Eq + Hash + ?Sized
    {
        self.lock().get(key).copied()
    }

    /// Insert a value under the given key.
    ///
    /// The value is moved to leaked storage and never freed.
    /// If the key is already present, the stored value is returned
    /// unchanged and the given value is dropped.
    pub fn insert(&self, key: K, value: V) -> &'static V
    {
        self.get_or_insert_with(key, || value)
    }

    /// Insert the value produced by `init` if the key is absent.
    ///
    /// `init` runs while the map is locked;
    /// it must not touch the map it is inserting into.
    pub fn get_or_insert_with(&self, key: K, init: impl FnOnce() -> V)
        -> &'static V
    {
        let mut inner = self.lock();
        match inner.get(&key) {
            Some(existing) => existing,
            None => {
                let leaked: &'static V = Box::leak(Box::new(init()));
                inner.insert(key, leaked);
                leaked
            },
        }
    }

    /// The number of entries written so far.
    pub fn len(&self) -> usize
    {
        self.lock().len()
    }

    /// Whether no entry has been written yet.
    pub fn is_empty(&self) -> bool
    {
        self.lock().is_empty()
    }
}

impl<K, V> Default for WriteOnceMap<K, V>
    where K: Eq + Hash, V: 'static
{
    fn default() -> Self
    {
        Self::new()
    }
}
