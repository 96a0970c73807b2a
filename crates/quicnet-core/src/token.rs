//! Completion tokens
//!
//! A completion token correlates an asynchronous engine notification with the
//! operation that caused it. Tokens cross the engine boundary as a single
//! `u64` context value: the slot index in the low half and a generation in the
//! high half. A slot is only reused with a new generation, so a stale or
//! forged context never resolves someone else's operation.

use std::fmt;
use std::sync::Mutex;

use crate::sync::lock;

// ----------------------------------------------------------------------------
// Token
// ----------------------------------------------------------------------------

/// Generation-checked slot identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompletionToken {
    index: u32,
    generation: u32,
}

impl CompletionToken {
    /// Encode as the opaque context value handed to the engine
    pub fn into_context(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    /// Decode a context value; zero and other sentinel values yield `None`
    pub fn from_context(context: u64) -> Option<Self> {
        let generation = (context >> 32) as u32;
        if generation == 0 {
            return None;
        }
        Some(Self {
            index: context as u32,
            generation,
        })
    }
}

impl fmt::Display for CompletionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

// ----------------------------------------------------------------------------
// Token Table
// ----------------------------------------------------------------------------

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

struct Slots<T> {
    entries: Vec<Slot<T>>,
    free_list: Vec<u32>,
    next_generation: u32,
}

impl<T> Slots<T> {
    fn bump_generation(&mut self) -> u32 {
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1).max(1);
        generation
    }

    fn slot_mut(&mut self, token: CompletionToken) -> Option<&mut Slot<T>> {
        self.entries
            .get_mut(token.index as usize)
            .filter(|slot| slot.generation == token.generation)
    }
}

/// Slot table of outstanding operations
///
/// `create` stores a value and hands out a token; `resolve` reads the value
/// back exactly once; `release` frees the slot. A token is dead after release
/// and resolving it again yields `None`.
pub struct TokenTable<T> {
    slots: Mutex<Slots<T>>,
}

impl<T> TokenTable<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Slots {
                entries: Vec::new(),
                free_list: Vec::new(),
                next_generation: 1,
            }),
        }
    }

    pub fn create(&self, value: T) -> CompletionToken {
        let mut slots = lock(&self.slots);
        let generation = slots.bump_generation();

        let index = match slots.free_list.pop() {
            Some(index) => {
                slots.entries[index as usize] = Slot {
                    generation,
                    value: Some(value),
                };
                index
            }
            None => {
                let index = slots.entries.len() as u32;
                slots.entries.push(Slot {
                    generation,
                    value: Some(value),
                });
                index
            }
        };

        CompletionToken { index, generation }
    }

    /// Take the value stored for a live token
    pub fn resolve(&self, token: CompletionToken) -> Option<T> {
        lock(&self.slots).slot_mut(token)?.value.take()
    }

    /// Free the slot behind a token; returns whether the token was live
    pub fn release(&self, token: CompletionToken) -> bool {
        let mut slots = lock(&self.slots);
        let Some(slot) = slots.slot_mut(token) else {
            return false;
        };
        slot.value = None;
        // Retire the generation so the token can never match again
        slot.generation = 0;
        slots.free_list.push(token.index);
        true
    }

    /// Resolve and release in one step
    pub fn take(&self, token: CompletionToken) -> Option<T> {
        let mut slots = lock(&self.slots);
        let slot = slots.slot_mut(token)?;
        let value = slot.value.take();
        slot.generation = 0;
        slots.free_list.push(token.index);
        value
    }

    /// Number of tokens created and not yet released
    pub fn outstanding(&self) -> usize {
        let slots = lock(&self.slots);
        slots.entries.len() - slots.free_list.len()
    }

    /// Release every outstanding token, returning the values still held
    pub fn drain(&self) -> Vec<T> {
        let mut slots = lock(&self.slots);
        let mut drained = Vec::new();
        let mut freed = Vec::new();
        for (index, slot) in slots.entries.iter_mut().enumerate() {
            if slot.generation != 0 {
                slot.generation = 0;
                drained.extend(slot.value.take());
                freed.push(index as u32);
            }
        }
        slots.free_list.extend(freed);
        drained
    }
}

impl<T> Default for TokenTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TokenTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenTable")
            .field("outstanding", &self.outstanding())
            .finish()
    }
}
