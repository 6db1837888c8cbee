//! Object control block arenas with stable integer ids.
//!
//! Every kernel object class (threads, mutexes, semaphores, watchdogs) lives
//! in an [`Arena`]: a table of slots sized once at system initialization.
//! Intrusive structures (wait queues, delta chains, ready queues) link
//! entries by *slot index*; the public API hands out [`Id`]s, which add a
//! generation counter so that a stale id held across a free/realloc cycle is
//! detected instead of silently resolving to the new occupant.
use alloc::vec::Vec;
use core::{fmt, num::NonZeroU32};

/// A stable object id: slot index plus slot generation.
///
/// The all-zero bit pattern is reserved, so `Option<Id>` is pointer-sized.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(NonZeroU32);

impl Id {
    const INDEX_BITS: u32 = 16;
    const INDEX_MASK: u32 = (1 << Self::INDEX_BITS) - 1;

    #[inline]
    fn new(index: usize, generation: u16) -> Self {
        debug_assert!(index < Self::INDEX_MASK as usize);
        let raw = ((generation as u32) << Self::INDEX_BITS) | (index as u32 + 1);
        // `index + 1` is nonzero regardless of the generation
        Self(unsafe { NonZeroU32::new_unchecked(raw) })
    }

    /// The slot index this id refers to.
    #[inline]
    pub fn index(self) -> usize {
        (self.0.get() & Self::INDEX_MASK) as usize - 1
    }

    #[inline]
    fn generation(self) -> u16 {
        (self.0.get() >> Self::INDEX_BITS) as u16
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Id({}v{})", self.index(), self.generation())
    }
}

struct Slot<T> {
    generation: u16,
    payload: Option<T>,
}

/// The outcome of [`Arena::alloc`] when every slot is occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted;

/// A fixed-capacity slot table. See the module documentation.
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
}

impl<T> Arena<T> {
    /// Construct an arena with `capacity` empty slots. This is the only
    /// point at which the arena allocates.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity < Id::INDEX_MASK as usize);
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(Slot {
                generation: 0,
                payload: None,
            });
        }
        Self { slots }
    }

    /// Claim the first free slot for `payload`.
    pub fn alloc(&mut self, payload: T) -> Result<Id, Exhausted> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.payload.is_none() {
                slot.payload = Some(payload);
                return Ok(Id::new(index, slot.generation));
            }
        }
        Err(Exhausted)
    }

    /// Release the slot designated by `id`, bumping its generation so the id
    /// is invalidated. Returns the payload, or `None` for a stale id.
    pub fn free(&mut self, id: Id) -> Option<T> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        let payload = slot.payload.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        Some(payload)
    }

    pub fn get(&self, id: Id) -> Option<&T> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.payload.as_ref()
    }

    pub fn get_mut(&mut self, id: Id) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.payload.as_mut()
    }

    /// Access by raw slot index. Intrusive links use this form; the caller
    /// guarantees the slot is live (an object is never freed while linked).
    pub fn get_at(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.payload.as_ref()
    }

    pub fn get_at_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)?.payload.as_mut()
    }

    /// Reconstruct the current id of a live slot.
    pub fn id_at(&self, index: usize) -> Option<Id> {
        let slot = self.slots.get(index)?;
        slot.payload.as_ref()?;
        Some(Id::new(index, slot.generation))
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.payload.as_ref().map(|p| (i, p)))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.payload.is_some()).count()
    }
}

impl<T: fmt::Debug> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_free_reuse() {
        let mut arena = Arena::with_capacity(2);
        let a = arena.alloc("a").unwrap();
        let b = arena.alloc("b").unwrap();
        assert_eq!(arena.alloc("c"), Err(Exhausted));

        assert_eq!(arena.free(a), Some("a"));
        let c = arena.alloc("c").unwrap();
        assert_eq!(c.index(), a.index());
        assert_ne!(c, a);

        // The stale id must not resolve to the new occupant
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(c), Some(&"c"));
        assert_eq!(arena.get(b), Some(&"b"));
    }

    #[test]
    fn index_access() {
        let mut arena = Arena::with_capacity(3);
        let a = arena.alloc(10).unwrap();
        assert_eq!(arena.get_at(a.index()), Some(&10));
        assert_eq!(arena.id_at(a.index()), Some(a));
        assert_eq!(arena.get_at(2), None);
        assert_eq!(arena.len(), 1);
    }
}
