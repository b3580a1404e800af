//! Channel pooling
//!
//! Bounded allocation of output channels shared by every backend. Each slot
//! carries backend-specific state alongside the category it was opened for.

use crate::audio::category::SoundCategory;
use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Handle to an allocated output channel
    pub struct ChannelId;
}

/// Information about an allocated channel slot
#[derive(Debug)]
struct ChannelSlot<T> {
    category: SoundCategory,
    state: T,
}

/// Fixed-capacity pool of output channels
pub struct ChannelPool<T> {
    max_channels: usize,
    slots: SlotMap<ChannelId, ChannelSlot<T>>,
}

impl<T> ChannelPool<T> {
    /// Create a new pool with the specified capacity
    pub fn with_capacity(max_channels: usize) -> Self {
        Self {
            max_channels,
            slots: SlotMap::with_capacity_and_key(max_channels),
        }
    }

    /// Allocate a channel
    ///
    /// # Returns
    /// `None` when every channel is in use. No channel is ever stolen from a
    /// playing sound.
    pub fn allocate(&mut self, category: SoundCategory, state: T) -> Option<ChannelId> {
        if !self.has_available() {
            return None;
        }
        Some(self.slots.insert(ChannelSlot { category, state }))
    }

    /// Backend state for a channel
    pub fn get(&self, id: ChannelId) -> Option<&T> {
        self.slots.get(id).map(|slot| &slot.state)
    }

    /// Mutable backend state for a channel
    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut T> {
        self.slots.get_mut(id).map(|slot| &mut slot.state)
    }

    /// Category a channel was allocated for
    pub fn category(&self, id: ChannelId) -> Option<SoundCategory> {
        self.slots.get(id).map(|slot| slot.category)
    }

    /// Remove a channel from the pool, returning its state
    pub fn remove(&mut self, id: ChannelId) -> Option<T> {
        self.slots.remove(id).map(|slot| slot.state)
    }

    /// Iterate over all allocated channels
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &T)> {
        self.slots.iter().map(|(id, slot)| (id, &slot.state))
    }

    /// Iterate mutably over all allocated channels
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ChannelId, &mut T)> {
        self.slots.iter_mut().map(|(id, slot)| (id, &mut slot.state))
    }

    /// Drop every channel
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Get the number of currently allocated channels
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no channel is allocated
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Get the maximum number of channels
    pub fn max_channels(&self) -> usize {
        self.max_channels
    }

    /// Check if channels are available
    pub fn has_available(&self) -> bool {
        self.slots.len() < self.max_channels
    }
}
