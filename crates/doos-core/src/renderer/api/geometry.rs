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

//! Geometry: a vertex stream and an index stream, each backed by a buffer object
//! that is reserved on first use and filled through a CPU shadow.

use super::buffer::{words_for, BufferKind, BufferRecord};
use crate::doos_bitflags;
use crate::renderer::error::{RenderError, RenderResult};
use crate::renderer::handle::{Handle, SlotTable, NO_HANDLE};

/// The scalar type of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexAttributeKind {
    /// 32-bit floats, read as floats.
    Float32,
    /// A 32-bit unsigned integer, read as an integer (not normalized).
    Uint32,
}

/// One attribute of an interleaved vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Shader input location.
    pub location: u32,
    /// Scalar type.
    pub kind: VertexAttributeKind,
    /// Number of components.
    pub components: i32,
    /// Byte offset inside the vertex.
    pub offset: i32,
}

const fn float_attr(location: u32, components: i32, offset: i32) -> VertexAttribute {
    VertexAttribute {
        location,
        kind: VertexAttributeKind::Float32,
        components,
        offset,
    }
}

const fn uint_attr(location: u32, offset: i32) -> VertexAttribute {
    VertexAttribute {
        location,
        kind: VertexAttributeKind::Uint32,
        components: 1,
        offset,
    }
}

const STANDARD_ATTRIBUTES: [VertexAttribute; 3] = [
    float_attr(0, 3, 0),
    float_attr(1, 3, 12),
    float_attr(2, 2, 24),
];
const COMPACT_ATTRIBUTES: [VertexAttribute; 2] = [float_attr(0, 3, 0), uint_attr(1, 12)];
const COLOR_ATTRIBUTES: [VertexAttribute; 3] =
    [float_attr(0, 3, 0), float_attr(1, 3, 12), uint_attr(2, 24)];

/// The interleaved vertex layouts a geometry can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum VertexLayout {
    /// Position, normal, texture coordinate. 32 bytes.
    Standard = 1,
    /// Position and a packed RGBA colour. 16 bytes.
    Compact = 2,
    /// Position, normal and a packed RGBA colour. 28 bytes.
    Color = 3,
}

impl VertexLayout {
    /// Maps the public integer code to a layout.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Standard),
            2 => Some(Self::Compact),
            3 => Some(Self::Color),
            _ => None,
        }
    }

    /// Size of one vertex in bytes.
    pub fn stride(self) -> usize {
        match self {
            Self::Standard => 32,
            Self::Compact => 16,
            Self::Color => 28,
        }
    }

    /// The attributes, in location order.
    pub fn attributes(self) -> &'static [VertexAttribute] {
        match self {
            Self::Standard => &STANDARD_ATTRIBUTES,
            Self::Compact => &COMPACT_ATTRIBUTES,
            Self::Color => &COLOR_ATTRIBUTES,
        }
    }
}

doos_bitflags! {
    /// Selects the streams of a geometry.
    pub struct GeometryStreams: i32 {
        /// The vertex stream.
        const VERTEX = 1;
        /// The index stream.
        const INDEX = 2;
    }
}

/// A geometry's reference to the buffer object that backs one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRef {
    /// The buffer handle, or [`NO_HANDLE`] before the first `geometry_begin`.
    pub buffer: Handle,
    /// Number of elements (vertices or indices).
    pub count: i32,
}

impl Default for StreamRef {
    fn default() -> Self {
        Self {
            buffer: NO_HANDLE,
            count: 0,
        }
    }
}

/// A geometry table entry.
#[derive(Debug, Clone)]
pub struct GeometryRecord {
    /// Vertex layout declared at creation.
    pub layout: VertexLayout,
    /// Streams currently open for writing.
    pub locked: GeometryStreams,
    /// The vertex stream.
    pub vertex: StreamRef,
    /// The index stream.
    pub index: StreamRef,
}

impl GeometryRecord {
    /// A fresh geometry with no stream reserved yet.
    pub fn new(layout: VertexLayout) -> Self {
        Self {
            layout,
            locked: GeometryStreams::EMPTY,
            vertex: StreamRef::default(),
            index: StreamRef::default(),
        }
    }
}

/// Writable views into the shadows of the streams opened by `geometry_begin`.
///
/// A stream that was not requested, or that was already locked, has no view.
#[derive(Debug, Default)]
pub struct GeometryLock<'a> {
    /// Interleaved vertex data, `stride / 4` floats per vertex. Integer
    /// attributes are written with `f32::from_bits`.
    pub vertices: Option<&'a mut [f32]>,
    /// Triangle indices.
    pub indices: Option<&'a mut [u32]>,
}

/// Outcome of [`reserve_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAlloc {
    /// The existing storage is large enough and of the right kind.
    Reused,
    /// The shadow was (re)created; the backend must (re)allocate native storage of the record's size.
    Reallocated,
}

/// Makes sure `stream` is backed by a buffer of `kind` holding at least `bytes`.
///
/// A buffer slot is taken on first use. The shadow is replaced when it is too
/// small or the kind differs, so its old contents are lost in that case.
///
/// ## Returns
///
/// Whether native storage must be reallocated, or [`RenderError::OutOfMemory`]
/// when the buffer table has no free slot.
pub fn reserve_stream<N>(
    buffers: &mut SlotTable<BufferRecord<N>>,
    stream: &mut StreamRef,
    kind: BufferKind,
    count: i32,
    element_size: usize,
) -> RenderResult<StreamAlloc> {
    if !buffers.contains(stream.buffer) {
        stream.buffer = buffers.insert(BufferRecord {
            kind,
            size: 0,
            shadow: None,
            native: None,
        });
        if stream.buffer == NO_HANDLE {
            return Err(RenderError::OutOfMemory {
                what: "geometry stream buffer",
            });
        }
    }
    stream.count = count;

    let bytes = count.max(0) as usize * element_size;
    let Some(record) = buffers.get_mut(stream.buffer) else {
        return Err(RenderError::OutOfMemory {
            what: "geometry stream buffer",
        });
    };
    if record.size < bytes || record.kind != kind || record.shadow.is_none() {
        record.shadow = Some(vec![0; words_for(bytes)]);
        record.size = bytes;
        record.kind = kind;
        Ok(StreamAlloc::Reallocated)
    } else {
        Ok(StreamAlloc::Reused)
    }
}

/// Borrows the shadows of the given stream buffers as typed views.
pub fn lock_views<N>(
    buffers: &mut SlotTable<BufferRecord<N>>,
    vertex: Option<Handle>,
    index: Option<Handle>,
) -> GeometryLock<'_> {
    fn floats<N>(record: &mut BufferRecord<N>) -> Option<&mut [f32]> {
        let size = record.size / 4;
        record
            .shadow
            .as_deref_mut()
            .map(|w| &mut bytemuck::cast_slice_mut(w)[..size])
    }
    fn words<N>(record: &mut BufferRecord<N>) -> Option<&mut [u32]> {
        let size = record.size / 4;
        record.shadow.as_deref_mut().map(|w| &mut w[..size])
    }

    match (vertex, index) {
        (Some(v), Some(i)) => match buffers.get_pair_mut(v, i) {
            Some((vb, ib)) => GeometryLock {
                vertices: floats(vb),
                indices: words(ib),
            },
            None => GeometryLock::default(),
        },
        (Some(v), None) => GeometryLock {
            vertices: buffers.get_mut(v).and_then(floats),
            indices: None,
        },
        (None, Some(i)) => GeometryLock {
            vertices: None,
            indices: buffers.get_mut(i).and_then(words),
        },
        (None, None) => GeometryLock::default(),
    }
}
