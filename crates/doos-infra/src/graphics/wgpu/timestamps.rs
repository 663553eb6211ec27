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

//! Timestamp queries sampled on the device clock.

use doos_core::renderer::handle::MAX_QUERIES;

/// What a device must support for [`GpuTimestamps`].
pub const REQUIRED_FEATURES: wgpu::Features =
    wgpu::Features::TIMESTAMP_QUERY.union(wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS);

/// Features requested from the adapter when they are available.
pub const WANTED_FEATURES: wgpu::Features =
    REQUIRED_FEATURES.union(wgpu::Features::TIMESTAMP_QUERY_INSIDE_PASSES);

/// The state of one query slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    /// Never written.
    Empty,
    /// Sampled on the CPU, in nanoseconds since the context was created.
    Cpu(u64),
    /// Written into the open frame, not submitted yet.
    Recorded,
    /// Written into submitted work.
    Submitted,
    /// Read back, in nanoseconds on the device clock.
    Resolved(u64),
}

/// One timestamp query set indexed by query handle, plus the buffers that
/// bring a single value back to the CPU.
#[derive(Debug)]
pub struct GpuTimestamps {
    query_set: wgpu::QuerySet,
    resolve_buffer: wgpu::Buffer,
    staging_buffer: wgpu::Buffer,
    period_ns: f32,
    in_passes: bool,
}

impl GpuTimestamps {
    pub fn feature_available(features: wgpu::Features) -> bool {
        features.contains(REQUIRED_FEATURES)
    }

    /// Returns `None` when the device cannot write timestamps into encoders.
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Option<Self> {
        let features = device.features();
        if !Self::feature_available(features) {
            return None;
        }
        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("Doos Timestamp QuerySet"),
            ty: wgpu::QueryType::Timestamp,
            count: MAX_QUERIES as u32,
        });
        let resolve_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Doos Timestamp Resolve Buffer"),
            size: u64::from(wgpu::QUERY_SIZE),
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Doos Timestamp Staging Buffer"),
            size: u64::from(wgpu::QUERY_SIZE),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Some(Self {
            query_set,
            resolve_buffer,
            staging_buffer,
            period_ns: queue.get_timestamp_period(),
            in_passes: features.contains(wgpu::Features::TIMESTAMP_QUERY_INSIDE_PASSES),
        })
    }

    /// Whether timestamps may be written while a pass is open.
    pub fn in_passes(&self) -> bool {
        self.in_passes
    }

    pub fn write(&self, encoder: &mut wgpu::CommandEncoder, index: u32) {
        encoder.write_timestamp(&self.query_set, index);
    }

    pub fn write_in_render_pass(&self, pass: &mut wgpu::RenderPass<'static>, index: u32) {
        pass.write_timestamp(&self.query_set, index);
    }

    pub fn write_in_compute_pass(&self, pass: &mut wgpu::ComputePass<'static>, index: u32) {
        pass.write_timestamp(&self.query_set, index);
    }

    /// Encodes the resolve of query `index` into the staging buffer.
    pub fn encode_readback(&self, encoder: &mut wgpu::CommandEncoder, index: u32) {
        encoder.resolve_query_set(&self.query_set, index..index + 1, &self.resolve_buffer, 0);
        encoder.copy_buffer_to_buffer(
            &self.resolve_buffer,
            0,
            &self.staging_buffer,
            0,
            u64::from(wgpu::QUERY_SIZE),
        );
    }

    pub fn staging(&self) -> &wgpu::Buffer {
        &self.staging_buffer
    }

    /// Converts device ticks to nanoseconds.
    pub fn to_nanos(&self, ticks: u64) -> u64 {
        ticks_to_nanos(ticks, self.period_ns)
    }
}

fn ticks_to_nanos(ticks: u64, period_ns: f32) -> u64 {
    (ticks as f64 * f64::from(period_ns)) as u64
}
