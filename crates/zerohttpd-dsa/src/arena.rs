use alloc::vec::Vec;
use static_assertions::assert_eq_size;

/// Handle for an in-flight entry, carried through the ring as user data.
///
/// Layout: slot index + 1 (low 32) | generation (high 32).
/// A zero low half never names a slot, so `0` is never a valid token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u64);

assert_eq_size!(Token, u64);

impl Token {
    fn new(index: usize, generation: u32) -> Self {
        Token(((generation as u64) << 32) | (index as u64 + 1))
    }

    /// Rebuilds a token from the user data of a completion entry.
    pub fn from_user_data(raw: u64) -> Self {
        Token(raw)
    }

    pub fn user_data(self) -> u64 {
        self.0
    }

    fn index(self) -> Option<usize> {
        match self.0 & 0xFFFF_FFFF {
            0 => None,
            low => Some((low - 1) as usize),
        }
    }

    fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

enum Slot<T> {
    Occupied { value: T, generation: u32 },
    Vacant { generation: u32, next_free: Option<usize> },
}

/// Owner of every operation that has been handed to the kernel but not yet
/// completed.
///
/// ## Ownership Protocol
/// `insert` moves a value in at submission time and returns the token the
/// submission carries. `remove` moves it back out exactly once, when the
/// matching completion is reaped. Removing bumps the slot generation, so a
/// token that was already consumed can never resolve to a newer occupant.
pub struct InflightArena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<usize>,
    len: usize,
}

impl<T> InflightArena<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_head: None,
            len: 0,
        }
    }

    /// Moves `value` into the arena and returns its token.
    pub fn insert(&mut self, value: T) -> Token {
        self.len += 1;

        if let Some(index) = self.free_head {
            let (generation, next_free) = match &self.slots[index] {
                Slot::Vacant { generation, next_free } => (*generation, *next_free),
                Slot::Occupied { .. } => panic!("InflightArena: free list points at occupied slot {}", index),
            };
            self.free_head = next_free;
            self.slots[index] = Slot::Occupied { value, generation };
            return Token::new(index, generation);
        }

        let index = self.slots.len();
        assert!(index < u32::MAX as usize, "InflightArena: slot index space exhausted");
        self.slots.push(Slot::Occupied { value, generation: 0 });
        Token::new(index, 0)
    }

    pub fn get(&self, token: Token) -> Option<&T> {
        let index = token.index()?;
        match self.slots.get(index)? {
            Slot::Occupied { value, generation } if *generation == token.generation() => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut T> {
        let index = token.index()?;
        match self.slots.get_mut(index)? {
            Slot::Occupied { value, generation } if *generation == token.generation() => Some(value),
            _ => None,
        }
    }

    /// Moves the entry named by `token` out of the arena.
    ///
    /// Returns `None` for stale or unknown tokens.
    pub fn remove(&mut self, token: Token) -> Option<T> {
        let index = token.index()?;
        match self.slots.get(index)? {
            Slot::Occupied { generation, .. } if *generation == token.generation() => {}
            _ => return None,
        }

        let vacant = Slot::Vacant {
            generation: token.generation().wrapping_add(1),
            next_free: self.free_head,
        };
        match core::mem::replace(&mut self.slots[index], vacant) {
            Slot::Occupied { value, .. } => {
                self.free_head = Some(index);
                self.len -= 1;
                Some(value)
            }
            Slot::Vacant { .. } => None,
        }
    }

    /// Drops every occupied entry. Returns how many were released.
    ///
    /// Generations survive, so tokens issued before the clear stay stale.
    pub fn clear(&mut self) -> usize {
        let released = self.len;
        for index in 0..self.slots.len() {
            if let Slot::Occupied { generation, .. } = self.slots[index] {
                self.slots[index] = Slot::Vacant {
                    generation: generation.wrapping_add(1),
                    next_free: self.free_head,
                };
                self.free_head = Some(index);
            }
        }
        self.len = 0;
        released
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Default for InflightArena<T> {
    fn default() -> Self {
        Self::new()
    }
}
