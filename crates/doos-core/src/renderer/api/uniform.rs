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

//! Named uniform values.
//!
//! Uniforms live in an open-addressing table keyed by the FNV-1a hash of their
//! name, so re-declaring a name lands on the same handle. Backends that bind
//! uniforms as one block serialise them through [`UniformPacker`].

use crate::renderer::handle::{Handle, SlotTable, MAX_UNIFORMS, NO_HANDLE};
use crate::utils::hash::fnv1a;

/// The type of a uniform value. The discriminants are the public integer codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum UniformType {
    /// A texture unit index.
    Sampler = 0,
    /// Two floats.
    Vec2 = 1,
    /// Three floats.
    Vec3 = 2,
    /// Four floats.
    Vec4 = 3,
    /// Two unsigned integers.
    Uvec2 = 4,
    /// Three unsigned integers.
    Uvec3 = 5,
    /// Four unsigned integers.
    Uvec4 = 6,
    /// A 3x3 float matrix, column-major.
    Mat3 = 7,
    /// A 4x4 float matrix, column-major.
    Mat4 = 8,
    /// A signed integer.
    Integer = 9,
    /// A float.
    Real = 10,
}

impl UniformType {
    /// Maps the public integer code to a type.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::Sampler,
            1 => Self::Vec2,
            2 => Self::Vec3,
            3 => Self::Vec4,
            4 => Self::Uvec2,
            5 => Self::Uvec3,
            6 => Self::Uvec4,
            7 => Self::Mat3,
            8 => Self::Mat4,
            9 => Self::Integer,
            10 => Self::Real,
            _ => return None,
        })
    }

    /// Number of 4-byte scalars in one element.
    pub fn components(self) -> usize {
        match self {
            Self::Sampler | Self::Integer | Self::Real => 1,
            Self::Vec2 | Self::Uvec2 => 2,
            Self::Vec3 | Self::Uvec3 => 3,
            Self::Vec4 | Self::Uvec4 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
        }
    }

    /// Size in bytes of the CPU copy of one element.
    pub fn element_size(self) -> usize {
        4 * self.components()
    }

    /// `(size, alignment)` of one element inside a packed uniform block.
    pub fn packing(self) -> (usize, usize) {
        match self {
            Self::Sampler | Self::Integer | Self::Real => (4, 4),
            Self::Vec2 | Self::Uvec2 => (8, 8),
            Self::Vec3 | Self::Vec4 | Self::Uvec3 | Self::Uvec4 => (16, 16),
            Self::Mat3 => (48, 16),
            Self::Mat4 => (64, 16),
        }
    }
}

/// A uniform table entry.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformRecord {
    /// The name looked up in programs.
    pub name: String,
    /// The element type.
    pub ty: UniformType,
    /// Number of elements.
    pub num: u16,
    /// The current value, `element_size × num` bytes.
    pub raw: Vec<u8>,
}

impl UniformRecord {
    /// Size of the value in bytes.
    pub fn size(&self) -> usize {
        self.raw.len()
    }
}

/// The uniform table.
#[derive(Debug)]
pub struct UniformTable {
    slots: SlotTable<UniformRecord>,
}

impl Default for UniformTable {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformTable {
    /// An empty table with [`MAX_UNIFORMS`] slots.
    pub fn new() -> Self {
        Self {
            slots: SlotTable::new(MAX_UNIFORMS),
        }
    }

    /// Declares a uniform.
    ///
    /// Probing starts at the bucket of the name's hash. The first slot that
    /// is free or already holds `name` is (re)initialised with a zeroed value.
    ///
    /// ## Returns
    ///
    /// The handle, or [`NO_HANDLE`] when `num` is zero or the table is full.
    pub fn add(&mut self, name: &str, ty: UniformType, num: u16) -> Handle {
        if num == 0 {
            return NO_HANDLE;
        }
        let capacity = self.slots.capacity();
        let start = fnv1a(name.as_bytes()) as usize % capacity;
        for probe in 0..capacity {
            let handle = ((start + probe) % capacity) as Handle;
            let reusable = match self.slots.get(handle) {
                None => true,
                Some(existing) => existing.name == name,
            };
            if reusable {
                self.slots.insert_at(
                    handle,
                    UniformRecord {
                        name: name.to_owned(),
                        ty,
                        num,
                        raw: vec![0; ty.element_size() * num as usize],
                    },
                );
                return handle;
            }
        }
        NO_HANDLE
    }

    /// Releases a uniform. Free or out-of-range handles are ignored.
    pub fn remove(&mut self, handle: Handle) {
        self.slots.remove(handle);
    }

    /// Copies `values` into the uniform, up to its declared size.
    pub fn set(&mut self, handle: Handle, values: &[u8]) {
        if let Some(record) = self.slots.get_mut(handle) {
            let n = record.raw.len().min(values.len());
            record.raw[..n].copy_from_slice(&values[..n]);
        }
    }

    /// Borrows a uniform.
    pub fn get(&self, handle: Handle) -> Option<&UniformRecord> {
        self.slots.get(handle)
    }

    /// Handles of all declared uniforms.
    pub fn handles(&self) -> Vec<Handle> {
        self.slots.handles()
    }
}

/// Serialises bound uniforms into one block, in bind order.
///
/// Each value starts at its type's alignment and occupies `size × num` bytes,
/// the raw bytes first and zeros after.
#[derive(Debug, Default, Clone)]
pub struct UniformPacker {
    bytes: Vec<u8>,
}

impl UniformPacker {
    /// Creates an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empties the block. Called when a pass begins.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    fn pad_to(&mut self, alignment: usize) {
        let len = self.bytes.len().next_multiple_of(alignment);
        self.bytes.resize(len, 0);
    }

    /// Appends a uniform and returns the byte offset it was placed at.
    pub fn push(&mut self, uniform: &UniformRecord) -> usize {
        let (size, alignment) = uniform.ty.packing();
        self.pad_to(alignment);
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(&uniform.raw);
        let end = offset + (size * uniform.num as usize).max(uniform.raw.len());
        self.bytes.resize(end, 0);
        offset
    }

    /// Pads the block to 16 bytes and returns it. Called before each draw or dispatch.
    pub fn finish(&mut self) -> &[u8] {
        self.pad_to(16);
        &self.bytes
    }

    /// The bytes packed so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// `true` if nothing has been packed since the last [`UniformPacker::clear`].
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, ty: UniformType, num: u16, raw: &[u8]) -> UniformRecord {
        let mut table = UniformTable::new();
        let h = table.add(name, ty, num);
        table.set(h, raw);
        table.get(h).cloned().unwrap()
    }

    #[test]
    fn test_declared_sizes() {
        let mut table = UniformTable::new();
        let cases = [
            (UniformType::Sampler, 1, 4),
            (UniformType::Vec3, 2, 24),
            (UniformType::Uvec4, 1, 16),
            (UniformType::Mat3, 1, 36),
            (UniformType::Mat4, 3, 192),
            (UniformType::Real, 1, 4),
        ];
        for (i, (ty, num, size)) in cases.into_iter().enumerate() {
            let h = table.add(&format!("u{i}"), ty, num);
            assert_eq!(table.get(h).unwrap().size(), size, "{ty:?}");
        }
    }

    #[test]
    fn test_same_name_keeps_handle_and_resets_value() {
        let mut table = UniformTable::new();
        let h = table.add("ViewProject", UniformType::Mat4, 1);
        assert_eq!(h, (fnv1a(b"ViewProject") % MAX_UNIFORMS as u32) as Handle);
        table.set(h, &[1; 64]);

        let again = table.add("ViewProject", UniformType::Vec4, 2);
        assert_eq!(again, h);
        let rec = table.get(h).unwrap();
        assert_eq!(rec.ty, UniformType::Vec4);
        assert_eq!(rec.raw, vec![0; 32]);
    }

    #[test]
    fn test_zero_count_and_full_table() {
        let mut table = UniformTable::new();
        assert_eq!(table.add("x", UniformType::Real, 0), NO_HANDLE);
        for i in 0..MAX_UNIFORMS {
            assert_ne!(table.add(&format!("n{i}"), UniformType::Real, 1), NO_HANDLE);
        }
        assert_eq!(table.add("overflow", UniformType::Real, 1), NO_HANDLE);
        assert_ne!(table.add("n7", UniformType::Real, 1), NO_HANDLE);
    }

    #[test]
    fn test_set_copies_at_most_the_declared_size() {
        let mut table = UniformTable::new();
        let h = table.add("Color", UniformType::Integer, 1);
        table.set(h, &[1, 2, 3, 4, 5, 6]);
        assert_eq!(table.get(h).unwrap().raw, vec![1, 2, 3, 4]);
        table.set(h, &[9]);
        assert_eq!(table.get(h).unwrap().raw, vec![9, 2, 3, 4]);
        table.set(NO_HANDLE, &[0; 4]);
    }

    #[test]
    fn test_packer_alignment() {
        let mut packer = UniformPacker::new();
        let real = record("a", UniformType::Real, 1, &1.0f32.to_le_bytes());
        let vec3 = record("b", UniformType::Vec3, 1, &[7; 12]);
        let vec2 = record("c", UniformType::Vec2, 1, &[3; 8]);
        let mat3 = record("d", UniformType::Mat3, 1, &[5; 36]);

        assert_eq!(packer.push(&real), 0);
        assert_eq!(packer.push(&vec3), 16);
        assert_eq!(packer.as_bytes().len(), 32);
        assert_eq!(&packer.as_bytes()[28..32], &[0, 0, 0, 0]);
        assert_eq!(packer.push(&vec2), 32);
        assert_eq!(packer.push(&mat3), 48);
        assert_eq!(packer.as_bytes().len(), 96);
        assert_eq!(&packer.as_bytes()[84..96], &[0; 12]);

        let single = record("e", UniformType::Integer, 1, &[1; 4]);
        packer.push(&single);
        assert_eq!(packer.finish().len(), 112);

        packer.clear();
        assert!(packer.is_empty());
    }

    #[test]
    fn test_packer_arrays_pad_to_slot_size_times_count() {
        let mut packer = UniformPacker::new();
        let arr = record("lights", UniformType::Vec3, 2, &[1; 24]);
        packer.push(&arr);
        assert_eq!(packer.as_bytes().len(), 32);
        assert_eq!(&packer.as_bytes()[..24], &[1; 24]);
    }
}
