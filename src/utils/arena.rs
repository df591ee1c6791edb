/// A key into an [`Arena`].
///
/// Keys pair a slot index with the generation of the value stored there.
/// Once a value is removed its slot may be reused, but the slot's
/// generation is bumped first, so stale keys never alias the new value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub(crate) struct ArenaIndex {
    index: u32,
    generation: u32,
}

impl ArenaIndex {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub(crate) const fn index(self) -> u32 {
        self.index
    }

    pub(crate) const fn generation(self) -> u32 {
        self.generation
    }
}

enum Slot<T> {
    Occupied { value: T, generation: u32 },
    Vacant { generation: u32 },
}

/// A generational arena.
///
/// An `Arena` stores values of type `T` in a contiguous vector and hands
/// out [`ArenaIndex`] keys that stay valid until the value is removed.
///
/// Internally, it keeps track of:
/// - occupied and vacant slots,
/// - a stack of free slot indices,
/// - the generation of every slot.
///
/// The task tree uses it so that parents and children refer to each
/// other by key instead of by owning pointer.
pub(crate) struct Arena<T> {
    /// Storage for values (vacant slots remember their generation).
    slots: Vec<Slot<T>>,
    /// Stack of vacant slot indices that can be reused.
    free: Vec<u32>,
    /// Number of occupied slots.
    len: usize,
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Inserts the value built by `f` and returns its key.
    ///
    /// The closure receives the key the value will live under, so records
    /// can embed their own identity.
    ///
    /// # Panics
    ///
    /// Panics if the arena would exceed `u32::MAX` slots.
    pub(crate) fn insert_with(&mut self, f: impl FnOnce(ArenaIndex) -> T) -> ArenaIndex {
        let key = match self.free.pop() {
            Some(index) => {
                let generation = match self.slots[index as usize] {
                    Slot::Vacant { generation } => generation,
                    Slot::Occupied { .. } => unreachable!("free list pointed at an occupied slot"),
                };
                ArenaIndex::new(index, generation)
            }
            None => {
                let index = u32::try_from(self.slots.len())
                    .unwrap_or_else(|_| panic!("arena overflow"));
                self.slots.push(Slot::Vacant { generation: 0 });
                ArenaIndex::new(index, 0)
            }
        };

        self.slots[key.index as usize] = Slot::Occupied {
            value: f(key),
            generation: key.generation,
        };
        self.len += 1;

        key
    }

    /// Returns a reference to the value stored under `key`, if it is still live.
    pub(crate) fn get(&self, key: ArenaIndex) -> Option<&T> {
        match self.slots.get(key.index as usize)? {
            Slot::Occupied { value, generation } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    /// Returns a mutable reference to the value stored under `key`, if it is still live.
    pub(crate) fn get_mut(&mut self, key: ArenaIndex) -> Option<&mut T> {
        match self.slots.get_mut(key.index as usize)? {
            Slot::Occupied { value, generation } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    /// Removes and returns the value stored under `key`.
    ///
    /// The slot becomes vacant with a bumped generation and may be reused
    /// by future insertions. Returns `None` for stale keys.
    pub(crate) fn remove(&mut self, key: ArenaIndex) -> Option<T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == key.generation => {}
            _ => return None,
        }

        let next = Slot::Vacant {
            generation: key.generation.wrapping_add(1),
        };
        let Slot::Occupied { value, .. } = std::mem::replace(slot, next) else {
            return None;
        };

        self.free.push(key.index);
        self.len -= 1;

        Some(value)
    }

    /// Returns the number of live values.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Iterates over every live value.
    pub(crate) fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        })
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}
