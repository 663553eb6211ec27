// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Integer handles and the fixed-capacity tables they index.

/// An index into one of the resource tables. Negative values never name a resource.
pub type Handle = i32;

/// The "no resource" handle.
pub const NO_HANDLE: Handle = -1;

/// Capacity of the texture table.
pub const MAX_TEXTURES: usize = 1024;
/// Capacity of the geometry table.
pub const MAX_GEOMETRIES: usize = 1024;
/// Capacity of the buffer-object table. Geometry streams draw from it too.
pub const MAX_BUFFER_OBJECTS: usize = 2048;
/// Capacity of the shader table.
pub const MAX_SHADERS: usize = 1024;
/// Capacity of the program table.
pub const MAX_PROGRAMS: usize = 1024;
/// Capacity of the framebuffer table.
pub const MAX_FRAME_BUFFERS: usize = 1024;
/// Capacity of the render-buffer table.
pub const MAX_RENDER_BUFFERS: usize = 1024;
/// Capacity of the uniform table.
pub const MAX_UNIFORMS: usize = 1024;
/// Capacity of the timestamp-query table.
pub const MAX_QUERIES: usize = 16;
/// Number of texture channels a pass can sample from.
pub const MAX_TEXTURE_CHANNELS: usize = 16;

/// Converts a handle into a table index, rejecting negative values.
#[inline]
pub fn handle_index(handle: Handle) -> Option<usize> {
    usize::try_from(handle).ok()
}

/// A fixed-capacity arena whose slot indices are the public handles.
///
/// Insertion scans forward for the first free slot, so a freed handle is
/// handed out again by the next insertion that reaches it.
#[derive(Debug)]
pub struct SlotTable<T> {
    slots: Vec<Option<T>>,
}

impl<T> SlotTable<T> {
    /// Creates a table with `capacity` free slots.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    /// Number of slots, free or not.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Returns `true` if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Returns the handle the next [`SlotTable::insert`] would use, or [`NO_HANDLE`].
    pub fn first_free(&self) -> Handle {
        self.slots
            .iter()
            .position(Option::is_none)
            .map_or(NO_HANDLE, |i| i as Handle)
    }

    /// Stores `value` in the first free slot.
    ///
    /// ## Returns
    ///
    /// The new handle, or [`NO_HANDLE`] when the table is full. The value is
    /// dropped in that case.
    pub fn insert(&mut self, value: T) -> Handle {
        match self.slots.iter_mut().enumerate().find(|(_, s)| s.is_none()) {
            Some((index, slot)) => {
                *slot = Some(value);
                index as Handle
            }
            None => NO_HANDLE,
        }
    }

    /// Stores `value` at a specific handle, replacing and returning any previous record.
    ///
    /// # Panics
    /// Panics if the handle is outside the table.
    pub fn insert_at(&mut self, handle: Handle, value: T) -> Option<T> {
        let index = handle_index(handle)
            .filter(|&i| i < self.slots.len())
            .unwrap_or_else(|| panic!("handle {handle} outside table"));
        self.slots[index].replace(value)
    }

    /// Returns `true` if `handle` names an occupied slot.
    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Borrows the record behind `handle`.
    pub fn get(&self, handle: Handle) -> Option<&T> {
        handle_index(handle)
            .and_then(|i| self.slots.get(i))
            .and_then(Option::as_ref)
    }

    /// Mutably borrows the record behind `handle`.
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        handle_index(handle)
            .and_then(|i| self.slots.get_mut(i))
            .and_then(Option::as_mut)
    }

    /// Mutably borrows two distinct records at once.
    ///
    /// Returns `None` when the handles are equal or either slot is free.
    pub fn get_pair_mut(&mut self, a: Handle, b: Handle) -> Option<(&mut T, &mut T)> {
        let (ia, ib) = (handle_index(a)?, handle_index(b)?);
        if ia == ib || ia >= self.slots.len() || ib >= self.slots.len() {
            return None;
        }
        let (lo, hi) = (ia.min(ib), ia.max(ib));
        let (head, tail) = self.slots.split_at_mut(hi);
        let (low, high) = (head[lo].as_mut()?, tail[0].as_mut()?);
        if ia < ib {
            Some((low, high))
        } else {
            Some((high, low))
        }
    }

    /// Frees the slot and returns its record. Free or out-of-range handles yield `None`.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        handle_index(handle)
            .and_then(|i| self.slots.get_mut(i))
            .and_then(Option::take)
    }

    /// Handles of all occupied slots, in ascending order.
    pub fn handles(&self) -> Vec<Handle> {
        self.iter().map(|(h, _)| h).collect()
    }

    /// Iterates over occupied slots.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|v| (i as Handle, v)))
    }

    /// Iterates mutably over occupied slots.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|v| (i as Handle, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_until_full_then_reuse() {
        let mut table = SlotTable::new(MAX_TEXTURES);
        for i in 0..MAX_TEXTURES {
            assert_eq!(table.insert(i), i as Handle);
        }
        assert_eq!(table.insert(9999), NO_HANDLE);
        assert_eq!(table.len(), MAX_TEXTURES);

        assert_eq!(table.remove(17), Some(17));
        assert_eq!(table.first_free(), 17);
        assert_eq!(table.insert(42), 17);
        assert_eq!(table.get(17), Some(&42));
    }

    #[test]
    fn test_invalid_handles_are_ignored() {
        let mut table: SlotTable<u8> = SlotTable::new(4);
        assert!(table.get(-1).is_none());
        assert!(table.get(4).is_none());
        assert!(table.remove(-3).is_none());
        assert!(table.remove(2).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_get_pair_mut() {
        let mut table = SlotTable::new(8);
        let a = table.insert(String::from("a"));
        let b = table.insert(String::from("b"));
        {
            let (x, y) = table.get_pair_mut(b, a).expect("both slots occupied");
            assert_eq!((x.as_str(), y.as_str()), ("b", "a"));
            x.push('!');
        }
        assert_eq!(table.get(b).map(String::as_str), Some("b!"));
        assert!(table.get_pair_mut(a, a).is_none());
        assert!(table.get_pair_mut(a, 5).is_none());
    }

    #[test]
    fn test_iteration_skips_free_slots() {
        let mut table = SlotTable::new(8);
        for v in 0..5 {
            table.insert(v);
        }
        table.remove(1);
        table.remove(3);
        assert_eq!(table.handles(), vec![0, 2, 4]);
        for (_, v) in table.iter_mut() {
            *v *= 10;
        }
        assert_eq!(table.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![0, 20, 40]);
    }
}
