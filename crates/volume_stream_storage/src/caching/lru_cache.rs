use crate::SmallKeyBuildHasher;

use core::hash::{BuildHasher, Hash};
use std::collections::{hash_map, HashMap};

/// A cache bounded by entry count that evicts the Least Recently Used entry when full.
///
/// Both `get` and `insert` mark the entry as most recently used. A capacity of zero means nothing is ever retained.
#[derive(Clone, Debug)]
pub struct LruCache<K, V, H> {
    store: HashMap<K, (V, usize), H>,
    order: LruList<K>,
    capacity: usize,
}

/// An `LruCache` using the aHash hashing algorithm.
pub type SmallKeyLruCache<K, V> = LruCache<K, V, SmallKeyBuildHasher>;

impl<K, V, H> LruCache<K, V, H>
where
    K: Hash + Eq,
    H: Default,
{
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, Default::default())
    }
}

impl<K, V, H> LruCache<K, V, H>
where
    K: Hash + Eq,
{
    pub fn with_capacity_and_hasher(capacity: usize, hasher_builder: H) -> Self {
        LruCache {
            store: HashMap::with_hasher(hasher_builder),
            order: LruList::new(),
            capacity,
        }
    }
}

impl<K, V, H> LruCache<K, V, H>
where
    K: Hash + Eq + Clone,
    H: BuildHasher,
{
    /// Borrow the value for `key` and mark it as most recently used.
    #[inline]
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let Self { store, order, .. } = self;
        store.get(key).map(|(val, i)| {
            order.move_to_front(*i);

            val
        })
    }

    /// Borrow the value for `key` without updating the LRU order.
    #[inline]
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.store.get(key).map(|(val, _)| val)
    }

    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.store.contains_key(key)
    }

    /// Inserts `new_val` for `key` as the most recently used entry, returning the old value if there was one and any entry
    /// evicted to make room.
    #[inline]
    pub fn insert(&mut self, key: K, new_val: V) -> (Option<V>, Option<(K, V)>) {
        if self.capacity == 0 {
            return (None, None);
        }

        let Self { store, order, .. } = self;
        match store.entry(key.clone()) {
            hash_map::Entry::Occupied(occupied) => {
                let (old_val, i) = occupied.into_mut();
                order.move_to_front(*i);

                return (Some(std::mem::replace(old_val, new_val)), None);
            }
            hash_map::Entry::Vacant(vacant) => {
                let new_i = order.push_front(key);
                vacant.insert((new_val, new_i));
            }
        }

        let evicted = if self.store.len() > self.capacity {
            self.remove_lru()
        } else {
            None
        };

        (None, evicted)
    }

    /// Removes any trace of `key`.
    #[inline]
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.store.remove(key).map(|(val, i)| {
            self.order.remove(i);

            val
        })
    }

    /// Removes the least-recently used value.
    ///
    /// Nothing happens if the cache is empty.
    #[inline]
    pub fn remove_lru(&mut self) -> Option<(K, V)> {
        let key = self.order.pop_back()?;
        let (val, _) = self.store.remove(&key)?;

        Some((key, val))
    }

    /// Shrinks or grows the bound, evicting least-recently used entries as needed.
    pub fn set_capacity(&mut self, capacity: usize) -> Vec<(K, V)> {
        self.capacity = capacity;
        let mut evicted = Vec::new();
        while self.store.len() > self.capacity {
            match self.remove_lru() {
                Some(e) => evicted.push(e),
                None => break,
            }
        }

        evicted
    }

    /// Delete all entries.
    #[inline]
    pub fn clear(&mut self) {
        self.store.clear();
        self.order.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate over the keys of all entries in arbitrary order.
    #[inline]
    pub fn keys(&self) -> hash_map::Keys<'_, K, (V, usize)> {
        self.store.keys()
    }
}

/// Doubly-linked list using Vec as storage.
#[derive(Clone, Debug)]
struct LruList<T> {
    entries: Vec<ListEntry<T>>,
}

#[derive(Clone, Debug)]
struct ListEntry<T> {
    value: Option<T>,
    next: usize,
    prev: usize,
}

/// Free and occupied cells are each linked into a cyclic list with one auxiliary cell.
/// Cell #0 is on the list of free cells, element #1 is on the list of occupied cells.
impl<T> LruList<T> {
    const FREE: usize = 0;
    const OCCUPIED: usize = 1;

    fn new() -> LruList<T> {
        let mut list = LruList {
            entries: Vec::with_capacity(2),
        };
        list.clear();

        list
    }

    fn unlink(&mut self, index: usize) {
        let prev = self.entries[index].prev;
        let next = self.entries[index].next;
        self.entries[prev].next = next;
        self.entries[next].prev = prev;
    }

    fn link_after(&mut self, index: usize, prev: usize) {
        let next = self.entries[prev].next;
        self.entries[index].prev = prev;
        self.entries[index].next = next;
        self.entries[prev].next = index;
        self.entries[next].prev = index;
    }

    fn move_to_front(&mut self, index: usize) {
        self.unlink(index);
        self.link_after(index, Self::OCCUPIED);
    }

    fn push_front(&mut self, value: T) -> usize {
        if self.entries[Self::FREE].next == Self::FREE {
            self.entries.push(ListEntry::<T> {
                value: None,
                next: Self::FREE,
                prev: Self::FREE,
            });
            self.entries[Self::FREE].next = self.entries.len() - 1;
        }
        let index = self.entries[Self::FREE].next;
        self.entries[index].value = Some(value);
        self.unlink(index);
        self.link_after(index, Self::OCCUPIED);

        index
    }

    fn remove(&mut self, index: usize) -> Option<T> {
        self.unlink(index);
        self.link_after(index, Self::FREE);

        self.entries[index].value.take()
    }

    fn pop_back(&mut self) -> Option<T> {
        let index = self.entries[Self::OCCUPIED].prev;
        if index == Self::OCCUPIED {
            return None;
        }

        self.remove(index)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.entries.push(ListEntry::<T> {
            value: None,
            next: Self::FREE,
            prev: Self::FREE,
        });
        self.entries.push(ListEntry::<T> {
            value: None,
            next: Self::OCCUPIED,
            prev: Self::OCCUPIED,
        });
    }
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝
