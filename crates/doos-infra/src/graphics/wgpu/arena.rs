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

//! Per-frame storage for the uniform blobs of draws and dispatches.

/// Offsets handed out by the arena are multiples of this, unless the device
/// asks for more.
pub const MIN_UNIFORM_ALIGNMENT: u64 = 256;

#[derive(Debug)]
struct ArenaChunk {
    buffer: wgpu::Buffer,
    capacity: u64,
    offset: u64,
}

/// A region of the arena holding one uniform blob.
#[derive(Debug, Clone)]
pub struct UniformSlice {
    /// The chunk the blob was written to.
    pub buffer: wgpu::Buffer,
    /// Byte offset of the blob, a multiple of the arena alignment.
    pub offset: u64,
    /// Size of the binding window, never above the device's binding limit.
    pub size: u64,
}

impl UniformSlice {
    /// The binding resource for this region.
    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: self.offset,
            size: wgpu::BufferSize::new(self.size),
        })
    }
}

/// A bump allocator over uniform buffers, rewound at every `frame_begin`.
///
/// Only one frame is in flight, so a rewound chunk is never still read by the
/// GPU. When the active chunk is full the next one is used, and a new chunk
/// of twice the size is created when none is left.
#[derive(Debug)]
pub struct UniformArena {
    chunks: Vec<ArenaChunk>,
    active: usize,
    alignment: u64,
    max_binding: u64,
}

/// The binding window for a blob of `size` bytes at `offset`, or `None` when
/// the blob alone exceeds `max_binding`.
fn binding_window(capacity: u64, offset: u64, size: u64, max_binding: u64) -> Option<u64> {
    (size <= max_binding).then(|| (capacity - offset).min(max_binding).max(size))
}

fn create_chunk(device: &wgpu::Device, index: usize, capacity: u64) -> ArenaChunk {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(&format!("Doos Uniform Arena [chunk {index}]")),
        size: capacity,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    ArenaChunk {
        buffer,
        capacity,
        offset: 0,
    }
}

impl UniformArena {
    /// Creates an arena whose first chunk holds `initial_bytes`.
    pub fn new(device: &wgpu::Device, initial_bytes: u64) -> Self {
        let limits = device.limits();
        let alignment =
            u64::from(limits.min_uniform_buffer_offset_alignment).max(MIN_UNIFORM_ALIGNMENT);
        let capacity = initial_bytes.next_multiple_of(alignment).max(alignment);
        Self {
            chunks: vec![create_chunk(device, 0, capacity)],
            active: 0,
            alignment,
            max_binding: u64::from(limits.max_uniform_buffer_binding_size),
        }
    }

    /// Forgets every blob pushed since the last reset.
    pub fn reset(&mut self) {
        for chunk in &mut self.chunks {
            chunk.offset = 0;
        }
        self.active = 0;
    }

    /// Copies `data` into the arena.
    ///
    /// The returned window runs past the blob, up to the binding size limit,
    /// so shaders declaring a larger uniform block still validate. A blob
    /// larger than that limit cannot be bound and is refused.
    pub fn push(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        data: &[u8],
    ) -> Option<UniformSlice> {
        let size = (data.len() as u64)
            .next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT)
            .max(16);
        if size > self.max_binding {
            log::error!(
                "WgpuRenderContext: {size} bytes of uniforms exceed the {} byte binding limit",
                self.max_binding
            );
            return None;
        }
        let aligned = size.next_multiple_of(self.alignment);

        let fits = |chunk: &ArenaChunk| chunk.offset + aligned <= chunk.capacity;
        while !fits(&self.chunks[self.active]) {
            if self.active + 1 < self.chunks.len() {
                self.active += 1;
                continue;
            }
            let capacity = (self.chunks[self.active].capacity * 2).max(aligned * 100);
            let index = self.chunks.len();
            log::debug!("WgpuRenderContext: uniform arena grows a {capacity} byte chunk");
            self.chunks.push(create_chunk(device, index, capacity));
            self.active = index;
        }

        let chunk = &mut self.chunks[self.active];
        let offset = chunk.offset;
        if data.len() as u64 == size {
            queue.write_buffer(&chunk.buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(size as usize, 0);
            queue.write_buffer(&chunk.buffer, offset, &padded);
        }
        chunk.offset += aligned;

        let size = binding_window(chunk.capacity, offset, size, self.max_binding)?;
        Some(UniformSlice {
            buffer: chunk.buffer.clone(),
            offset,
            size,
        })
    }

    /// Total bytes reserved across chunks.
    pub fn capacity(&self) -> u64 {
        self.chunks.iter().map(|c| c.capacity).sum()
    }

    /// Number of chunks created so far.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_window_stays_within_the_limit() {
        assert_eq!(binding_window(4096, 0, 64, 1024), Some(1024));
        assert_eq!(binding_window(4096, 3840, 64, 1024), Some(256));
        assert_eq!(binding_window(4096, 0, 1024, 1024), Some(1024));
        assert_eq!(binding_window(8192, 0, 2048, 1024), None);
    }
}
