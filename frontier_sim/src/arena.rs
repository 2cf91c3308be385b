// Generational slot arena.
//
// Structures and agents live in `Arena<I, T>` collections that hand out
// stable, typed handles (`StructureId`, `AgentId`). Removing an entry bumps
// its slot's generation and recycles the slot, so a stale handle held by an
// agent (for example the tree it was chopping) simply fails to resolve
// instead of silently pointing at whatever reused the slot.
//
// `take`/`restore` let the tick loop check one agent out of the arena while
// it mutates the rest (fight targets, neighbours). A checked-out slot is not
// recycled and does not resolve until restored.
//
// See also: `types.rs` for the `entity_id!` handle types, `sim.rs` for the
// per-tick checkout pattern.
//
// **Critical constraint: determinism.** Iteration is in slot order, which is
// a pure function of the insert/remove history.

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// A handle that can index an `Arena`.
pub trait ArenaId: Copy + Eq {
    fn from_parts(index: u32, generation: u32) -> Self;
    fn index(self) -> u32;
    fn generation(self) -> u32;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
    #[serde(skip)]
    checked_out: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Arena<I, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    #[serde(skip)]
    _id: PhantomData<fn() -> I>,
}

impl<I, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            _id: PhantomData,
        }
    }
}

impl<I: ArenaId, T> Arena<I, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value built from its own handle.
    pub fn insert_with(&mut self, make: impl FnOnce(I) -> T) -> I {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                    checked_out: false,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        let id = I::from_parts(index, slot.generation);
        slot.value = Some(make(id));
        self.len += 1;
        id
    }

    pub fn insert(&mut self, value: T) -> I {
        self.insert_with(|_| value)
    }

    fn slot(&self, id: I) -> Option<&Slot<T>> {
        self.slots
            .get(id.index() as usize)
            .filter(|s| s.generation == id.generation())
    }

    fn slot_mut(&mut self, id: I) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|s| s.generation == id.generation())
    }

    pub fn get(&self, id: I) -> Option<&T> {
        self.slot(id).and_then(|s| s.value.as_ref())
    }

    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.slot_mut(id).and_then(|s| s.value.as_mut())
    }

    pub fn contains(&self, id: I) -> bool {
        self.get(id).is_some()
    }

    /// Remove an entry and recycle its slot. Stale handles stop resolving.
    pub fn remove(&mut self, id: I) -> Option<T> {
        let slot = self.slot_mut(id)?;
        if slot.checked_out {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        self.len -= 1;
        Some(value)
    }

    /// Check a value out of the arena without releasing its slot.
    pub fn take(&mut self, id: I) -> Option<T> {
        let slot = self.slot_mut(id)?;
        let value = slot.value.take()?;
        slot.checked_out = true;
        Some(value)
    }

    /// Return a value previously checked out with `take`. Hands the value
    /// back if `id` was not checked out.
    pub fn restore(&mut self, id: I, value: T) -> Result<(), T> {
        match self.slot_mut(id) {
            Some(slot) if slot.checked_out => {
                slot.checked_out = false;
                slot.value = Some(value);
                Ok(())
            }
            _ => Err(value),
        }
    }

    /// Number of live entries, checked-out ones included.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.value
                .as_ref()
                .map(|v| (I::from_parts(i as u32, s.generation), v))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (I, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| {
            let generation = s.generation;
            s.value
                .as_mut()
                .map(move |v| (I::from_parts(i as u32, generation), v))
        })
    }

    /// Handles of every resolvable entry, in slot order.
    pub fn ids(&self) -> Vec<I> {
        self.iter().map(|(id, _)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentId;

    #[test]
    fn insert_get_remove() {
        let mut arena: Arena<AgentId, &str> = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.remove(a), Some("a"));
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn recycled_slot_rejects_stale_handle() {
        let mut arena: Arena<AgentId, u32> = Arena::new();
        let old = arena.insert(1);
        arena.remove(old);
        let new = arena.insert(2);
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert!(arena.get(old).is_none());
        assert_eq!(arena.get(new), Some(&2));
        assert!(arena.remove(old).is_none());
    }

    #[test]
    fn checked_out_slot_is_not_recycled() {
        let mut arena: Arena<AgentId, u32> = Arena::new();
        let id = arena.insert(7);
        let value = arena.take(id).unwrap();
        assert!(arena.get(id).is_none());
        assert!(arena.remove(id).is_none());
        let other = arena.insert(8);
        assert_ne!(other.index(), id.index());
        arena.restore(id, value + 1).unwrap();
        assert_eq!(arena.get(id), Some(&8));
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.restore(id, 0), Err(0));
    }

    #[test]
    fn insert_with_sees_own_handle() {
        let mut arena: Arena<AgentId, AgentId> = Arena::new();
        let id = arena.insert_with(|id| id);
        assert_eq!(arena.get(id), Some(&id));
    }

    #[test]
    fn iteration_is_in_slot_order() {
        let mut arena: Arena<AgentId, char> = Arena::new();
        let a = arena.insert('a');
        arena.insert('b');
        arena.insert('c');
        arena.remove(a);
        arena.insert('d');
        let values: Vec<char> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec!['d', 'b', 'c']);
    }

    #[test]
    fn serde_roundtrip_preserves_generations() {
        let mut arena: Arena<AgentId, u32> = Arena::new();
        let a = arena.insert(1);
        arena.remove(a);
        let b = arena.insert(2);
        let json = serde_json::to_string(&arena).unwrap();
        let restored: Arena<AgentId, u32> = serde_json::from_str(&json).unwrap();
        assert!(restored.get(a).is_none());
        assert_eq!(restored.get(b), Some(&2));
    }
}
