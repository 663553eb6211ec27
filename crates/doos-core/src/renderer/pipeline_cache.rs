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

//! Content-keyed caches of native pipeline objects.
//!
//! Both caches are open-addressing tables of [`PIPELINE_CACHE_SLOTS`] slots.
//! A key's FNV-1a hash picks the first slot and probing walks forward until
//! it meets the key or an empty slot.

use crate::renderer::api::BlendState;
use crate::renderer::error::{RenderError, RenderResult};
use crate::renderer::handle::Handle;
use crate::utils::hash::Fnv1a;

/// Number of slots in each pipeline cache.
pub const PIPELINE_CACHE_SLOTS: usize = 1024;

/// Identifies a render pipeline: the shader pair, the attachment formats and
/// the blend state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    /// Vertex shader handle.
    pub vs: Handle,
    /// Fragment shader handle.
    pub fs: Handle,
    /// Backend code of the colour attachment format.
    pub color_format: u32,
    /// Backend code of the depth attachment format, `0` when there is none.
    pub depth_format: u32,
    /// Encoded blend state. Zero stands for the default state.
    pub blend: u32,
}

impl PipelineKey {
    /// Builds a key. The default blend state encodes as zero so that it
    /// hashes like the bare shader/format tuple.
    pub fn new(
        vs: Handle,
        fs: Handle,
        color_format: u32,
        depth_format: u32,
        blend: &BlendState,
    ) -> Self {
        let blend = if *blend == BlendState::default() {
            0
        } else {
            blend.key()
        };
        Self {
            vs,
            fs,
            color_format,
            depth_format,
            blend,
        }
    }

    /// FNV-1a over the key fields.
    pub fn hash_value(&self) -> u32 {
        let mut hasher = Fnv1a::new();
        hasher
            .write_i32(self.vs)
            .write_i32(self.fs)
            .write_u32(self.color_format)
            .write_u32(self.depth_format);
        if self.blend != 0 {
            hasher.write_u32(self.blend);
        }
        hasher.finish()
    }

    /// `true` when the key was built from `shader`.
    pub fn references(&self, shader: Handle) -> bool {
        self.vs == shader || self.fs == shader
    }
}

#[derive(Debug)]
struct ProbeTable<K, V> {
    slots: Vec<Option<(K, V)>>,
    len: usize,
}

impl<K: Copy + PartialEq, V> ProbeTable<K, V> {
    fn new() -> Self {
        Self {
            slots: std::iter::repeat_with(|| None)
                .take(PIPELINE_CACHE_SLOTS)
                .collect(),
            len: 0,
        }
    }

    /// The slot holding `key`, or the empty slot it would go to.
    fn probe(&self, key: &K, hash: u32) -> Option<usize> {
        let capacity = self.slots.len();
        let start = hash as usize % capacity;
        (0..capacity)
            .map(|i| (start + i) % capacity)
            .find(|&i| match &self.slots[i] {
                None => true,
                Some((k, _)) => k == key,
            })
    }

    fn get(&self, key: &K, hash: u32) -> Option<&V> {
        let index = self.probe(key, hash)?;
        self.slots[index].as_ref().map(|(_, v)| v)
    }

    fn get_or_insert_with(
        &mut self,
        key: K,
        hash: u32,
        build: impl FnOnce() -> RenderResult<V>,
    ) -> RenderResult<&mut V> {
        let index = self.probe(&key, hash).ok_or(RenderError::OutOfMemory {
            what: "pipeline cache",
        })?;
        if self.slots[index].is_none() {
            self.slots[index] = Some((key, build()?));
            self.len += 1;
        }
        match &mut self.slots[index] {
            Some((_, value)) => Ok(value),
            None => Err(RenderError::Backend("pipeline cache slot vanished".into())),
        }
    }

    /// Drops entries matching `evict` and reinserts the rest so that no
    /// probe chain is broken by the holes.
    fn evict(&mut self, mut evict: impl FnMut(&K) -> bool, hash: impl Fn(&K) -> u32) -> usize {
        let before = self.len;
        let kept: Vec<(K, V)> = self
            .slots
            .iter_mut()
            .filter_map(Option::take)
            .filter(|(k, _)| !evict(k))
            .collect();
        self.len = 0;
        for (key, value) in kept {
            if let Some(index) = self.probe(&key, hash(&key)) {
                self.slots[index] = Some((key, value));
                self.len += 1;
            }
        }
        before - self.len
    }

    fn drain(&mut self) -> Vec<V> {
        self.len = 0;
        self.slots
            .iter_mut()
            .filter_map(Option::take)
            .map(|(_, v)| v)
            .collect()
    }
}

/// Cache of render pipelines keyed by [`PipelineKey`].
#[derive(Debug)]
pub struct PipelineCache<P> {
    table: ProbeTable<PipelineKey, P>,
}

impl<P> Default for PipelineCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> PipelineCache<P> {
    /// An empty cache.
    pub fn new() -> Self {
        Self {
            table: ProbeTable::new(),
        }
    }

    /// Number of cached pipelines.
    pub fn len(&self) -> usize {
        self.table.len
    }

    /// `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.table.len == 0
    }

    /// Looks up a pipeline without building it.
    pub fn get(&self, key: &PipelineKey) -> Option<&P> {
        self.table.get(key, key.hash_value())
    }

    /// Returns the cached pipeline for `key`, building and storing it on a miss.
    ///
    /// ## Errors
    ///
    /// Propagates `build`'s error, or [`RenderError::OutOfMemory`] when every
    /// slot is taken by another key.
    pub fn get_or_insert_with(
        &mut self,
        key: PipelineKey,
        build: impl FnOnce() -> RenderResult<P>,
    ) -> RenderResult<&mut P> {
        self.table.get_or_insert_with(key, key.hash_value(), build)
    }

    /// Drops every pipeline built from `shader`. Returns how many were dropped.
    pub fn evict_shader(&mut self, shader: Handle) -> usize {
        self.table
            .evict(|key| key.references(shader), PipelineKey::hash_value)
    }

    /// Empties the cache, handing back the pipelines.
    pub fn drain(&mut self) -> Vec<P> {
        self.table.drain()
    }
}

/// Cache of compute pipelines keyed by the compute shader handle.
#[derive(Debug)]
pub struct ComputePipelineCache<P> {
    table: ProbeTable<Handle, P>,
}

impl<P> Default for ComputePipelineCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

fn shader_hash(shader: &Handle) -> u32 {
    Fnv1a::new().write_i32(*shader).finish()
}

impl<P> ComputePipelineCache<P> {
    /// An empty cache.
    pub fn new() -> Self {
        Self {
            table: ProbeTable::new(),
        }
    }

    /// Number of cached pipelines.
    pub fn len(&self) -> usize {
        self.table.len
    }

    /// `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.table.len == 0
    }

    /// Looks up the pipeline of a compute shader.
    pub fn get(&self, shader: Handle) -> Option<&P> {
        self.table.get(&shader, shader_hash(&shader))
    }

    /// Returns the pipeline of `shader`, building it on a miss.
    pub fn get_or_insert_with(
        &mut self,
        shader: Handle,
        build: impl FnOnce() -> RenderResult<P>,
    ) -> RenderResult<&mut P> {
        self.table
            .get_or_insert_with(shader, shader_hash(&shader), build)
    }

    /// Drops the pipeline of `shader`. Returns how many were dropped.
    pub fn evict_shader(&mut self, shader: Handle) -> usize {
        self.table.evict(|key| *key == shader, shader_hash)
    }

    /// Empties the cache, handing back the pipelines.
    pub fn drain(&mut self) -> Vec<P> {
        self.table.drain()
    }
}
