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

//! Buffer objects: raw GPU memory used as geometry streams or shader storage.

/// What a buffer object holds. The discriminants are the public integer codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum BufferKind {
    /// Interleaved vertices of a geometry.
    Vertex = 1,
    /// 32-bit indices of a geometry.
    Index = 2,
    /// Shader storage created through `add_buffer_object`.
    Compute = 3,
}

/// The shader stage a buffer object is bound to on backends that bind per stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BindTarget {
    /// Vertex buffers go to the vertex stage, everything else to the fragment stage.
    /// Inside a compute pass the compute stage is always used.
    #[default]
    Default,
    /// Vertex stage.
    Vertex,
    /// Fragment stage.
    Fragment,
}

/// The public view of a buffer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    /// What the buffer holds.
    pub kind: BufferKind,
    /// Size in bytes.
    pub size: usize,
}

/// A buffer table entry shared by the backends.
///
/// `N` is the backend's native buffer object. It is `None` until the backend
/// first allocates storage, which for geometry streams happens lazily.
#[derive(Debug)]
pub struct BufferRecord<N> {
    /// What the buffer holds.
    pub kind: BufferKind,
    /// Size in bytes of the native storage.
    pub size: usize,
    /// CPU copy written between `geometry_begin` and `geometry_end`.
    /// Kept as 32-bit words so it can be viewed as `f32` or `u32` without realignment.
    pub shadow: Option<Vec<u32>>,
    /// The native object.
    pub native: Option<N>,
}

impl<N> BufferRecord<N> {
    /// A record for a compute buffer, which never carries a shadow.
    pub fn compute(size: usize, native: N) -> Self {
        Self {
            kind: BufferKind::Compute,
            size,
            shadow: None,
            native: Some(native),
        }
    }

    /// The public view of this record.
    pub fn info(&self) -> BufferInfo {
        BufferInfo {
            kind: self.kind,
            size: self.size,
        }
    }

    /// The shadow as bytes, or an empty slice when there is none.
    pub fn shadow_bytes(&self) -> &[u8] {
        self.shadow
            .as_deref()
            .map(|words| &bytemuck::cast_slice(words)[..self.size])
            .unwrap_or(&[])
    }
}

/// Number of 32-bit words needed to hold `bytes`.
#[inline]
pub fn words_for(bytes: usize) -> usize {
    bytes.div_ceil(4)
}
