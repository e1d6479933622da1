//! Generational arenas backing the slot and waiter tables.
//!
//! A plain `slab` key is not safe to hold across mutations here: slots and
//! waiters are both removed promptly (to avoid growing forever), and a
//! freed key can be reused by a later, unrelated entry. Leases and
//! in-flight `Acquiring` handles hold onto ids well past the point where
//! they were minted, so every id carries a generation counter that a
//! reused key can never reproduce.

use std::marker::PhantomData;

pub(crate) struct Id<Tag> {
    key: usize,
    generation: u64,
    _tag: PhantomData<fn() -> Tag>,
}

impl<Tag> Clone for Id<Tag> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<Tag> Copy for Id<Tag> {}
impl<Tag> PartialEq for Id<Tag> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.generation == other.generation
    }
}
impl<Tag> Eq for Id<Tag> {}
impl<Tag> std::hash::Hash for Id<Tag> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.generation.hash(state);
    }
}
impl<Tag> std::fmt::Debug for Id<Tag> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Id({}#{})", self.key, self.generation)
    }
}

pub(crate) struct GenerationalArena<T, Tag> {
    items: slab::Slab<(u64, T)>,
    next_generation: u64,
    _tag: PhantomData<Tag>,
}

impl<T, Tag> Default for GenerationalArena<T, Tag> {
    fn default() -> Self {
        Self {
            items: slab::Slab::new(),
            next_generation: 0,
            _tag: PhantomData,
        }
    }
}

impl<T, Tag> GenerationalArena<T, Tag> {
    pub fn insert(&mut self, value: T) -> Id<Tag> {
        let generation = self.next_generation;
        self.next_generation += 1;
        let key = self.items.insert((generation, value));
        Id {
            key,
            generation,
            _tag: PhantomData,
        }
    }

    pub fn get(&self, id: Id<Tag>) -> Option<&T> {
        self.items
            .get(id.key)
            .filter(|(g, _)| *g == id.generation)
            .map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, id: Id<Tag>) -> Option<&mut T> {
        self.items
            .get_mut(id.key)
            .filter(|(g, _)| *g == id.generation)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, id: Id<Tag>) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&mut self, id: Id<Tag>) -> Option<T> {
        if self.contains(id) {
            Some(self.items.remove(id.key).1)
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id<Tag>, &T)> {
        self.items.iter().map(|(key, (generation, value))| {
            (
                Id {
                    key,
                    generation: *generation,
                    _tag: PhantomData,
                },
                value,
            )
        })
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}
