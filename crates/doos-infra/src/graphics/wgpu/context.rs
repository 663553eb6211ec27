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

//! The command-buffer render context.

use super::arena::UniformArena;
use super::conversions;
use super::layout::{
    BindingSignature, BufferSlot, LayoutCache, PipelineLayouts, TextureSlot, UNIFORM_BINDING,
    VERTEX_STREAM_BINDING,
};
use super::timestamps::{self, GpuTimestamps, Stamp};
use anyhow::{anyhow, Result};
use doos_core::renderer::api::*;
use doos_core::renderer::handle::{
    Handle, SlotTable, MAX_BUFFER_OBJECTS, MAX_FRAME_BUFFERS, MAX_GEOMETRIES, MAX_PROGRAMS,
    MAX_QUERIES, MAX_SHADERS, MAX_TEXTURES, MAX_TEXTURE_CHANNELS, NO_HANDLE,
};
use doos_core::renderer::{
    ComputePipelineCache, FrameThrottle, PipelineCache, PipelineKey, RenderConfig, RendererType,
};
use doos_core::{RenderContext, RenderError, RenderResult};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Highest storage buffer channel plus one.
const MAX_BUFFER_CHANNELS: i32 = 16;

/// How long `frame_begin` waits for the previous frame once the GPU is idle.
const THROTTLE_TIMEOUT: Duration = Duration::from_secs(2);

const STREAM_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::VERTEX)
    .union(wgpu::BufferUsages::INDEX)
    .union(wgpu::BufferUsages::COPY_SRC)
    .union(wgpu::BufferUsages::COPY_DST);

#[derive(Debug)]
struct WgpuTexture {
    info: TextureInfo,
    format: wgpu::TextureFormat,
    /// Created with `STORAGE_BINDING`, so compute passes may write it.
    storage: bool,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct Screen {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

enum ActivePass {
    Render {
        pass: wgpu::RenderPass<'static>,
        color_format: wgpu::TextureFormat,
        depth_format: Option<wgpu::TextureFormat>,
    },
    Compute {
        pass: wgpu::ComputePass<'static>,
    },
}

/// Resources bound to channels since the last `renderpass_end`.
#[derive(Debug, Default)]
struct PassBindings {
    textures: BTreeMap<u32, (Handle, SamplerFlags)>,
    buffers: BTreeMap<u32, (Handle, BindTarget)>,
}

/// Render pipelines sharing one shader pair and attachment set, one per
/// binding signature and depth-test setting.
#[derive(Debug, Default)]
struct RenderVariants {
    pipelines: HashMap<(BindingSignature, bool), wgpu::RenderPipeline>,
}

#[derive(Debug, Default)]
struct ComputeVariants {
    pipelines: HashMap<BindingSignature, wgpu::ComputePipeline>,
}

/// Small integer codes for the attachment formats in pipeline keys.
fn format_key(registry: &mut Vec<wgpu::TextureFormat>, format: wgpu::TextureFormat) -> u32 {
    let index = match registry.iter().position(|&f| f == format) {
        Some(index) => index,
        None => {
            registry.push(format);
            registry.len() - 1
        }
    };
    index as u32 + 1
}

fn write_padded(queue: &wgpu::Queue, buffer: &wgpu::Buffer, data: &[u8]) {
    if data.is_empty() {
        return;
    }
    if data.len() % wgpu::COPY_BUFFER_ALIGNMENT as usize == 0 {
        queue.write_buffer(buffer, 0, data);
    } else {
        let mut padded = data.to_vec();
        padded.resize(conversions::copy_size(data.len()) as usize, 0);
        queue.write_buffer(buffer, 0, &padded);
    }
}

/// Validates WGSL up front so that errors come back as values instead of
/// reaching the device's error handler.
fn validate_wgsl(source: &str, stage: ShaderStage, name: &str) -> RenderResult<()> {
    use wgpu::naga;

    let failure = |log: String| {
        log::error!("WgpuRenderContext: shader '{name}' failed to compile:\n{log}");
        RenderError::ShaderCompilation {
            name: name.to_owned(),
            log,
        }
    };
    let module =
        naga::front::wgsl::parse_str(source).map_err(|e| failure(e.emit_to_string(source)))?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| failure(format!("{e}")))?;

    let wanted = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
        ShaderStage::Compute => naga::ShaderStage::Compute,
    };
    // Pipelines are built without naming an entry point.
    let entry_points = module
        .entry_points
        .iter()
        .filter(|ep| ep.stage == wanted)
        .count();
    if entry_points != 1 {
        return Err(failure(format!(
            "expected one {stage:?} entry point, found {entry_points}"
        )));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_render_pipeline(
    device: &wgpu::Device,
    layouts: &PipelineLayouts,
    vs: &wgpu::ShaderModule,
    fs: &wgpu::ShaderModule,
    color_format: wgpu::TextureFormat,
    depth_format: Option<wgpu::TextureFormat>,
    depth_test: bool,
    blend: &BlendState,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Doos Render Pipeline"),
        layout: Some(&layouts.pipeline),
        vertex: wgpu::VertexState {
            module: vs,
            entry_point: None,
            compilation_options: Default::default(),
            buffers: &[],
        },
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: Some(depth_test),
            depth_compare: if depth_test {
                Some(wgpu::CompareFunction::Less)
            } else {
                Some(wgpu::CompareFunction::Always)
            },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: fs,
            entry_point: None,
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: conversions::blend_state(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview_mask: None,
        cache: None,
    })
}

fn build_compute_pipeline(
    device: &wgpu::Device,
    layouts: &PipelineLayouts,
    module: &wgpu::ShaderModule,
) -> wgpu::ComputePipeline {
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("Doos Compute Pipeline"),
        layout: Some(&layouts.pipeline),
        module,
        entry_point: None,
        compilation_options: Default::default(),
        cache: None,
    })
}

/// A [`RenderContext`] that records into `wgpu` command encoders.
///
/// A frame owns one encoder. Passes are recorded into it and the whole frame
/// is submitted at `frame_end`; the frame throttle is released once the queue
/// reports that work done. Pipelines are built on the first draw or dispatch
/// that needs them, because their layout follows what the pass has bound.
///
/// Transfers outside the frame (readbacks and buffer copies) are submitted
/// right away and see only work that was already submitted.
pub struct WgpuRenderContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: RenderConfig,
    initialized: bool,
    norm16: bool,
    textures: SlotTable<WgpuTexture>,
    geometries: SlotTable<GeometryRecord>,
    buffers: SlotTable<BufferRecord<wgpu::Buffer>>,
    shaders: SlotTable<ShaderRecord<wgpu::ShaderModule>>,
    programs: SlotTable<ProgramRecord<()>>,
    frame_buffers: SlotTable<FrameBufferInfo>,
    uniforms: UniformTable,
    packer: UniformPacker,
    arena: UniformArena,
    layouts: LayoutCache,
    render_pipelines: PipelineCache<RenderVariants>,
    compute_pipelines: ComputePipelineCache<ComputeVariants>,
    samplers: HashMap<(SamplerFlags, bool), wgpu::Sampler>,
    format_keys: Vec<wgpu::TextureFormat>,
    queries: SlotTable<Stamp>,
    timestamps: Option<GpuTimestamps>,
    /// Queries stamped inside a pass that could not take the write.
    deferred_stamps: Vec<Handle>,
    epoch: Instant,
    blend: BlendState,
    throttle: Arc<FrameThrottle>,
    encoder: Option<wgpu::CommandEncoder>,
    pass: Option<ActivePass>,
    bindings: PassBindings,
    screen: Option<Screen>,
    current_program: Handle,
}

impl fmt::Debug for WgpuRenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuRenderContext")
            .field("initialized", &self.initialized)
            .field("textures", &self.textures.len())
            .field("buffers", &self.buffers.len())
            .field("programs", &self.programs.len())
            .field("layouts", &self.layouts.len())
            .field("frame_open", &self.encoder.is_some())
            .field("pass_open", &self.pass.is_some())
            .finish_non_exhaustive()
    }
}

impl WgpuRenderContext {
    /// Creates a context over an existing device.
    ///
    /// `rgba16` textures are normalised when the device was created with
    /// `TEXTURE_FORMAT_16BIT_NORM`. Queries sample the device clock when it
    /// has `TIMESTAMP_QUERY` and `TIMESTAMP_QUERY_INSIDE_ENCODERS`, and the
    /// CPU clock otherwise.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, config: RenderConfig) -> Self {
        let norm16 = device
            .features()
            .contains(wgpu::Features::TEXTURE_FORMAT_16BIT_NORM);
        let arena = UniformArena::new(&device, config.uniform_arena_bytes);
        let timestamps = GpuTimestamps::new(&device, &queue);
        log::info!(
            "WgpuRenderContext: created (16-bit normalised textures: {norm16}, device timestamps: {}, uniform arena: {} bytes)",
            timestamps.is_some(),
            arena.capacity()
        );
        Self {
            device,
            queue,
            config,
            initialized: true,
            norm16,
            textures: SlotTable::new(MAX_TEXTURES),
            geometries: SlotTable::new(MAX_GEOMETRIES),
            buffers: SlotTable::new(MAX_BUFFER_OBJECTS),
            shaders: SlotTable::new(MAX_SHADERS),
            programs: SlotTable::new(MAX_PROGRAMS),
            frame_buffers: SlotTable::new(MAX_FRAME_BUFFERS),
            uniforms: UniformTable::new(),
            packer: UniformPacker::new(),
            arena,
            layouts: LayoutCache::new(),
            render_pipelines: PipelineCache::new(),
            compute_pipelines: ComputePipelineCache::new(),
            samplers: HashMap::new(),
            format_keys: Vec::new(),
            queries: SlotTable::new(MAX_QUERIES),
            timestamps,
            deferred_stamps: Vec::new(),
            epoch: Instant::now(),
            blend: BlendState::default(),
            throttle: Arc::new(FrameThrottle::new()),
            encoder: None,
            pass: None,
            bindings: PassBindings::default(),
            screen: None,
            current_program: NO_HANDLE,
        }
    }

    /// Creates a context on the default adapter, without a surface.
    pub fn headless(config: RenderConfig) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
                .map_err(|e| anyhow!("no suitable adapter: {e}"))?;
        let info = adapter.get_info();
        log::info!(
            "WgpuRenderContext: using adapter \"{}\" ({:?})",
            info.name,
            info.backend
        );

        let required_features = adapter.features()
            & (wgpu::Features::TEXTURE_FORMAT_16BIT_NORM | timestamps::WANTED_FEATURES);
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Doos Headless Device"),
            required_features,
            required_limits: adapter.limits(),
            ..Default::default()
        }))?;
        Ok(Self::new(device, queue, config))
    }

    /// The device every resource is created on.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// The queue frames and transfers are submitted to.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Whether queries sample the device clock rather than the CPU clock.
    pub fn has_device_timestamps(&self) -> bool {
        self.timestamps.is_some()
    }

    fn frame_open(&self) -> bool {
        self.encoder.is_some()
    }

    /// Blocks until every submitted command buffer has finished.
    fn wait_idle(&self) {
        if let Err(e) = self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        }) {
            log::error!("WgpuRenderContext: device poll failed: {e}");
        }
    }

    /// Maps `buffer` for reading and copies out its first `size` bytes.
    fn read_mapped(&self, buffer: &wgpu::Buffer, size: u64) -> Option<Vec<u8>> {
        let slice = buffer.slice(..size);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.wait_idle();
        match receiver.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::error!("WgpuRenderContext: readback map_async failed: {e}");
                return None;
            }
            Err(_) => {
                log::error!("WgpuRenderContext: readback was never mapped");
                return None;
            }
        }
        let bytes = slice.get_mapped_range().to_vec();
        buffer.unmap();
        Some(bytes)
    }

    fn create_stream_buffer(&self, label: &str, size: usize) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: conversions::copy_size(size),
            usage: STREAM_USAGE,
            mapped_at_creation: false,
        })
    }

    fn create_texture(
        &mut self,
        info: TextureInfo,
        initial: impl FnOnce(&Self, &WgpuTexture),
    ) -> RenderResult<Handle> {
        let handle = self.textures.first_free();
        if handle == NO_HANDLE {
            log::warn!("WgpuRenderContext: texture table is full");
            return Ok(NO_HANDLE);
        }
        let Some(format) = conversions::texture_format(info.format, self.norm16) else {
            log::warn!("WgpuRenderContext: textures need a format");
            return Ok(NO_HANDLE);
        };
        let max = self.device.limits().max_texture_dimension_2d;
        let fits = |d: i32| d > 0 && d as u32 <= max;
        if !fits(info.width) || !fits(info.height) {
            log::warn!(
                "WgpuRenderContext: texture size {}x{} is not supported",
                info.width,
                info.height
            );
            return Ok(NO_HANDLE);
        }

        let mut usage = if info.format.is_depth() {
            wgpu::TextureUsages::TEXTURE_BINDING
        } else {
            wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC
        };
        if info.usage.contains(TextureUsage::RENDER_TARGET) {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        let storage = info.usage.contains(TextureUsage::WRITE)
            && info.target == TextureTarget::D2
            && conversions::supports_storage(format);
        if storage {
            usage |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        let layers = match info.target {
            TextureTarget::D2 => 1,
            TextureTarget::Cube => 6,
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("Doos Texture [{handle}]")),
            size: wgpu::Extent3d {
                width: info.width as u32,
                height: info.height as u32,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Doos Texture View"),
            dimension: Some(conversions::view_dimension(info.target)),
            ..Default::default()
        });
        let record = WgpuTexture {
            info,
            format,
            storage,
            texture,
            view,
        };
        initial(&*self, &record);
        self.textures.insert_at(handle, record);
        log::debug!(
            "WgpuRenderContext: created {:?} texture {handle} ({}x{} {format:?})",
            info.target,
            info.width,
            info.height
        );
        Ok(handle)
    }

    /// Packs `data` and writes it into one layer. `false` when the data does
    /// not fit the format.
    fn upload_layer(&self, texture: &WgpuTexture, layer: u32, data: TextureData<'_>) -> bool {
        let info = &texture.info;
        let Some(bytes) = pack_texels(info.format, info.width, info.height, data) else {
            return false;
        };
        let (w, h) = (info.width as u32, info.height as u32);
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            &bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(w * info.format.storage_bytes_per_texel() as u32),
                rows_per_image: Some(h),
            },
            wgpu::Extent3d {
                width: w,
                height: h,
                depth_or_array_layers: 1,
            },
        );
        true
    }

    /// Reserves one stream of a geometry and gives it a native buffer.
    ///
    /// The lock bit is raised only after the reservation succeeds. Returns
    /// `None` when the stream is already open.
    fn open_stream(
        &mut self,
        handle: Handle,
        stream: GeometryStreams,
        count: i32,
    ) -> RenderResult<Option<Handle>> {
        let Some(record) = self.geometries.get_mut(handle) else {
            return Ok(None);
        };
        if record.locked.contains(stream) {
            return Ok(None);
        }
        let (target, kind, element_size) = if stream == GeometryStreams::VERTEX {
            (&mut record.vertex, BufferKind::Vertex, record.layout.stride())
        } else {
            (&mut record.index, BufferKind::Index, std::mem::size_of::<u32>())
        };
        let alloc = reserve_stream(&mut self.buffers, target, kind, count, element_size)?;
        let buffer = target.buffer;
        record.locked.insert(stream);
        self.allocate_stream(buffer, alloc);
        Ok(Some(buffer))
    }

    /// Creates or replaces the native buffer of a geometry stream after
    /// `reserve_stream`.
    fn allocate_stream(&mut self, buffer: Handle, alloc: StreamAlloc) {
        let Some(record) = self.buffers.get(buffer) else {
            return;
        };
        if record.native.is_some() && alloc == StreamAlloc::Reused {
            return;
        }
        let label = format!("Doos {:?} Stream [{buffer}]", record.kind);
        let native = self.create_stream_buffer(&label, record.size);
        if let Some(record) = self.buffers.get_mut(buffer) {
            record.native = Some(native);
        }
    }

    fn upload_stream(&self, buffer: Handle) {
        let Some(record) = self.buffers.get(buffer) else {
            return;
        };
        let (Some(native), Some(shadow)) = (&record.native, &record.shadow) else {
            return;
        };
        if !shadow.is_empty() {
            self.queue
                .write_buffer(native, 0, bytemuck::cast_slice(shadow));
        }
    }

    fn sampler(&mut self, flags: SamplerFlags, filterable: bool) -> wgpu::Sampler {
        let device = &self.device;
        self.samplers
            .entry((flags, filterable))
            .or_insert_with(|| {
                device.create_sampler(&conversions::sampler_descriptor(flags, filterable))
            })
            .clone()
    }

    /// The bound textures that still exist, as layout slots plus their views.
    fn bound_textures(&self, compute: bool) -> Vec<(u32, TextureSlot, Handle, SamplerFlags)> {
        self.bindings
            .textures
            .iter()
            .filter_map(|(&channel, &(handle, flags))| {
                let texture = self.textures.get(handle)?;
                let slot = if compute && texture.storage && flags.contains(SamplerFlags::WRITE) {
                    let access = image_access(texture.info.usage, flags);
                    TextureSlot::Storage {
                        format: texture.format,
                        access: conversions::storage_access(access, texture.format),
                    }
                } else {
                    TextureSlot::Sampled {
                        sample_type: conversions::sample_type(texture.format),
                        dimension: conversions::view_dimension(texture.info.target),
                    }
                };
                Some((channel, slot, handle, flags))
            })
            .collect()
    }

    /// The bound buffers that still exist, with the stages they are visible to.
    fn bound_buffers(&self, compute: bool) -> Vec<(u32, BufferSlot, wgpu::Buffer)> {
        self.bindings
            .buffers
            .iter()
            .filter_map(|(&channel, &(handle, target))| {
                let record = self.buffers.get(handle)?;
                let native = record.native.clone()?;
                let slot = if compute {
                    BufferSlot {
                        stages: wgpu::ShaderStages::COMPUTE,
                        read_only: false,
                    }
                } else {
                    let stages = match target {
                        BindTarget::Vertex => wgpu::ShaderStages::VERTEX,
                        BindTarget::Fragment => wgpu::ShaderStages::FRAGMENT,
                        BindTarget::Default if record.kind == BufferKind::Vertex => {
                            wgpu::ShaderStages::VERTEX
                        }
                        BindTarget::Default => wgpu::ShaderStages::FRAGMENT,
                    };
                    BufferSlot {
                        stages,
                        read_only: true,
                    }
                };
                Some((channel, slot, native))
            })
            .collect()
    }

    /// Builds groups 1 and 2 for the current bindings.
    fn resource_groups(
        &mut self,
        layouts: &PipelineLayouts,
        compute: bool,
        textures: &[(u32, TextureSlot, Handle, SamplerFlags)],
        buffers: &[(u32, BufferSlot, wgpu::Buffer)],
    ) -> [wgpu::BindGroup; 2] {
        let mut samplers = Vec::new();
        if !compute {
            for &(_, slot, _, flags) in textures {
                let filterable = match slot {
                    TextureSlot::Sampled { sample_type, .. } => {
                        conversions::is_filterable(sample_type)
                    }
                    TextureSlot::Storage { .. } => false,
                };
                samplers.push(self.sampler(flags, filterable));
            }
        }

        let mut texture_entries = Vec::with_capacity(textures.len() * 2);
        for (i, &(channel, _, handle, _)) in textures.iter().enumerate() {
            let Some(texture) = self.textures.get(handle) else {
                continue;
            };
            if compute {
                texture_entries.push(wgpu::BindGroupEntry {
                    binding: channel,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                });
            } else {
                texture_entries.push(wgpu::BindGroupEntry {
                    binding: channel * 2,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                });
                texture_entries.push(wgpu::BindGroupEntry {
                    binding: channel * 2 + 1,
                    resource: wgpu::BindingResource::Sampler(&samplers[i]),
                });
            }
        }
        let buffer_entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .map(|(channel, _, buffer)| wgpu::BindGroupEntry {
                binding: *channel,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        [
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Doos Texture Bind Group"),
                layout: &layouts.groups[1],
                entries: &texture_entries,
            }),
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Doos Buffer Bind Group"),
                layout: &layouts.groups[2],
                entries: &buffer_entries,
            }),
        ]
    }

    fn signature(
        compute: bool,
        textures: &[(u32, TextureSlot, Handle, SamplerFlags)],
        buffers: &[(u32, BufferSlot, wgpu::Buffer)],
    ) -> BindingSignature {
        BindingSignature {
            compute,
            textures: textures.iter().map(|&(c, slot, _, _)| (c, slot)).collect(),
            buffers: buffers.iter().map(|&(c, slot, _)| (c, slot)).collect(),
        }
    }

    /// Ends the open pass, if any.
    fn end_pass(&mut self) {
        self.close_pass();
        self.bindings = PassBindings::default();
    }

    /// Ends the open pass and writes the timestamps it had to defer.
    fn close_pass(&mut self) {
        if self.pass.take().is_some() {
            log::trace!("WgpuRenderContext: pass ended");
        }
        if let (Some(timestamps), Some(encoder)) = (&self.timestamps, self.encoder.as_mut()) {
            for handle in self.deferred_stamps.drain(..) {
                timestamps.write(encoder, handle as u32);
            }
        }
        self.deferred_stamps.clear();
    }

    /// Reads a submitted device timestamp back, in nanoseconds.
    fn resolve_timestamp(&self, handle: Handle) -> Option<u64> {
        let timestamps = self.timestamps.as_ref()?;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Doos Timestamp Readback Encoder"),
            });
        timestamps.encode_readback(&mut encoder, handle as u32);
        self.queue.submit(Some(encoder.finish()));
        let bytes = self.read_mapped(timestamps.staging(), u64::from(wgpu::QUERY_SIZE))?;
        let ticks = u64::from_le_bytes(bytes.get(..8)?.try_into().ok()?);
        Some(timestamps.to_nanos(ticks))
    }

    fn release_buffer(&mut self, handle: Handle) {
        self.bindings.buffers.retain(|_, (h, _)| *h != handle);
        self.buffers.remove(handle);
    }
}

impl RenderContext for WgpuRenderContext {
    fn backend(&self) -> RendererType {
        RendererType::Wgpu
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn config(&self) -> &RenderConfig {
        &self.config
    }

    fn frame_begin(&mut self, mut drawables: RenderDrawables) -> RenderResult<()> {
        if self.frame_open() {
            log::error!("WgpuRenderContext: frame_begin called twice without frame_end");
            return Err(RenderError::FrameInProgress);
        }
        if !self.throttle.try_acquire() {
            // The release runs from a queue callback, which only fires while polling.
            self.wait_idle();
            if !self.throttle.acquire_timeout(THROTTLE_TIMEOUT) {
                log::error!("WgpuRenderContext: previous frame never completed");
                return Err(RenderError::Backend(
                    "previous frame never completed".to_owned(),
                ));
            }
        }

        self.screen = drawables
            .take_screen::<wgpu::SurfaceTexture>()
            .map(|texture| {
                let view = texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                Screen { texture, view }
            });
        if drawables.has_screen() {
            log::warn!("WgpuRenderContext: drawable is not a wgpu::SurfaceTexture, ignored");
        }
        self.encoder = Some(
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Doos Frame Encoder"),
                }),
        );
        self.arena.reset();
        Ok(())
    }

    fn frame_end(&mut self, wait_until_completed: bool) -> RenderResult<()> {
        if !self.frame_open() {
            log::error!("WgpuRenderContext: frame_end called without an open frame");
            return Err(RenderError::NoFrameInProgress);
        }
        self.end_pass();
        let Some(encoder) = self.encoder.take() else {
            return Err(RenderError::NoFrameInProgress);
        };
        let submission = self.queue.submit(Some(encoder.finish()));
        for (_, stamp) in self.queries.iter_mut() {
            if *stamp == Stamp::Recorded {
                *stamp = Stamp::Submitted;
            }
        }
        let throttle = Arc::clone(&self.throttle);
        self.queue
            .on_submitted_work_done(move || throttle.release());

        if let Some(screen) = self.screen.take() {
            drop(screen.view);
            screen.texture.present();
        }
        if wait_until_completed {
            if let Err(e) = self.device.poll(wgpu::PollType::Wait {
                submission_index: Some(submission),
                timeout: None,
            }) {
                log::error!("WgpuRenderContext: waiting for the frame failed: {e}");
                return Err(RenderError::Backend(e.to_string()));
            }
        }
        Ok(())
    }

    fn renderpass_begin(&mut self, descriptor: &RenderPassDescriptor) -> RenderResult<()> {
        if !self.frame_open() {
            log::error!("WgpuRenderContext: renderpass_begin called without an open frame");
            return Err(RenderError::NoFrameInProgress);
        }
        self.close_pass();
        self.packer.clear();

        if descriptor.compute_shader {
            let Some(encoder) = self.encoder.as_mut() else {
                return Err(RenderError::NoFrameInProgress);
            };
            let pass = encoder
                .begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Doos Compute Pass"),
                    timestamp_writes: None,
                })
                .forget_lifetime();
            self.pass = Some(ActivePass::Compute { pass });
            return Ok(());
        }

        let (color_view, color_format, size) = if descriptor.targets_screen() {
            let Some(screen) = &self.screen else {
                log::warn!("WgpuRenderContext: render pass targets the screen but no drawable was given");
                return Ok(());
            };
            let texture = &screen.texture.texture;
            (
                screen.view.clone(),
                texture.format(),
                (texture.width() as i32, texture.height() as i32),
            )
        } else {
            let Some(fb) = self.frame_buffers.get(descriptor.frame_buffer_handle) else {
                log::warn!(
                    "WgpuRenderContext: render pass targets unknown framebuffer {}",
                    descriptor.frame_buffer_handle
                );
                return Ok(());
            };
            let Some(color) = self.textures.get(fb.texture) else {
                return Ok(());
            };
            (color.view.clone(), color.format, (fb.width, fb.height))
        };

        let depth_handle = if descriptor.targets_screen() {
            descriptor.depth_texture_handle
        } else {
            self.frame_buffers
                .get(descriptor.frame_buffer_handle)
                .map(|fb| fb.depth_texture)
                .filter(|&h| h >= 0)
                .unwrap_or(descriptor.depth_texture_handle)
        };
        let depth = self
            .textures
            .get(depth_handle)
            .filter(|t| t.info.format.is_depth())
            .map(|t| (t.view.clone(), t.format));

        let load = if descriptor.clear_flags.contains(ClearFlags::COLOR) {
            let [r, g, b, a] = descriptor.clear_rgba();
            wgpu::LoadOp::Clear(wgpu::Color {
                r: f64::from(r),
                g: f64::from(g),
                b: f64::from(b),
                a: f64::from(a),
            })
        } else {
            wgpu::LoadOp::Load
        };
        let depth_load = if descriptor.clear_flags.contains(ClearFlags::DEPTH) {
            wgpu::LoadOp::Clear(descriptor.clear_depth)
        } else {
            wgpu::LoadOp::Load
        };

        let Some(encoder) = self.encoder.as_mut() else {
            return Err(RenderError::NoFrameInProgress);
        };
        let mut pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Doos Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &color_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: depth.as_ref().map(|(view, _)| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: depth_load,
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                ..Default::default()
            })
            .forget_lifetime();

        if let Some((w, h)) = descriptor.viewport(None) {
            let (w, h) = (w.min(size.0), h.min(size.1));
            if w > 0 && h > 0 {
                pass.set_viewport(0.0, 0.0, w as f32, h as f32, 0.0, 1.0);
            }
        }
        self.pass = Some(ActivePass::Render {
            pass,
            color_format,
            depth_format: depth.map(|(_, format)| format),
        });
        Ok(())
    }

    fn renderpass_end(&mut self) -> RenderResult<()> {
        self.end_pass();
        Ok(())
    }

    fn add_texture(
        &mut self,
        w: i32,
        h: i32,
        format: TextureFormat,
        data: Option<TextureData<'_>>,
        usage: TextureUsage,
    ) -> RenderResult<Handle> {
        let info = TextureInfo {
            width: w,
            height: h,
            format,
            usage,
            target: TextureTarget::D2,
        };
        self.create_texture(info, |ctx, texture| {
            if let Some(data) = data {
                if !ctx.upload_layer(texture, 0, data) {
                    log::warn!("WgpuRenderContext: initial data does not fit a {format:?} texture");
                }
            }
        })
    }

    fn add_cubemap_texture(
        &mut self,
        w: i32,
        h: i32,
        format: TextureFormat,
        faces: Option<&CubeFaces<'_>>,
        usage: TextureUsage,
    ) -> RenderResult<Handle> {
        let info = TextureInfo {
            width: w,
            height: h,
            format,
            usage,
            target: TextureTarget::Cube,
        };
        self.create_texture(info, |ctx, texture| {
            let Some(faces) = faces else {
                return;
            };
            for (layer, face) in faces.in_layer_order().into_iter().enumerate() {
                if !ctx.upload_layer(texture, layer as u32, TextureData::Bytes(face)) {
                    log::warn!("WgpuRenderContext: cube face {layer} skipped");
                }
            }
        })
    }

    fn update_texture(&mut self, handle: Handle, data: TextureData<'_>) -> RenderResult<bool> {
        let Some(texture) = self.textures.get(handle) else {
            return Ok(false);
        };
        if texture.info.target != TextureTarget::D2 || texture.info.format.is_depth() {
            log::warn!("WgpuRenderContext: update_texture only replaces 2D colour textures");
            return Ok(false);
        }
        Ok(self.upload_layer(texture, 0, data))
    }

    fn remove_texture(&mut self, handle: Handle) {
        if self.textures.remove(handle).is_some() {
            self.bindings.textures.retain(|_, (h, _)| *h != handle);
            log::debug!("WgpuRenderContext: removed texture {handle}");
        }
    }

    fn bind_texture_to_channel(&mut self, handle: Handle, channel: i32, flags: SamplerFlags) {
        if !(0..MAX_TEXTURE_CHANNELS as i32).contains(&channel) {
            log::warn!("WgpuRenderContext: texture channel {channel} out of range");
            return;
        }
        if !self.textures.contains(handle) {
            return;
        }
        self.bindings
            .textures
            .insert(channel as u32, (handle, flags));
    }

    fn get_texture(&self, handle: Handle) -> Option<TextureInfo> {
        self.textures.get(handle).map(|t| t.info)
    }

    fn get_data_from_texture(&mut self, handle: Handle, out: &mut [u8]) {
        let Some(texture) = self.textures.get(handle) else {
            return;
        };
        let info = texture.info;
        if info.target != TextureTarget::D2 {
            log::warn!("WgpuRenderContext: cube textures cannot be read back");
            return;
        }
        let Some(bytes_per_texel) = info.format.readback_bytes_per_texel() else {
            log::warn!("WgpuRenderContext: {:?} textures cannot be read back", info.format);
            return;
        };
        let needed = info.texel_count() * bytes_per_texel;
        if out.len() < needed {
            return;
        }

        let (w, h) = (info.width as u32, info.height as u32);
        let row = w * info.format.storage_bytes_per_texel() as u32;
        let padded_row = conversions::padded_bytes_per_row(row);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Doos Texture Readback"),
            size: u64::from(padded_row) * u64::from(h),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Doos Texture Readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(h),
                },
            },
            wgpu::Extent3d {
                width: w,
                height: h,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let Some(mapped) = self.read_mapped(&staging, u64::from(padded_row) * u64::from(h)) else {
            return;
        };
        let texels: Vec<u8> = mapped
            .chunks_exact(padded_row as usize)
            .flat_map(|r| &r[..row as usize])
            .copied()
            .collect();
        if info.format == TextureFormat::Rgba32f {
            let floats: Vec<f32> = texels
                .chunks_exact(4)
                .map(bytemuck::pod_read_unaligned::<f32>)
                .collect();
            narrow_rgba32f(&floats, &mut out[..needed]);
        } else {
            out[..needed].copy_from_slice(&texels[..needed]);
        }
    }

    fn add_geometry(&mut self, layout: VertexLayout) -> Handle {
        let handle = self.geometries.insert(GeometryRecord::new(layout));
        if handle == NO_HANDLE {
            log::warn!("WgpuRenderContext: geometry table is full");
            return NO_HANDLE;
        }
        log::debug!("WgpuRenderContext: created {layout:?} geometry {handle}");
        handle
    }

    fn remove_geometry(&mut self, handle: Handle) {
        if let Some(record) = self.geometries.get(handle) {
            assert!(
                record.locked.is_empty(),
                "geometry {handle} removed while locked"
            );
        }
        let Some(record) = self.geometries.remove(handle) else {
            return;
        };
        self.release_buffer(record.vertex.buffer);
        self.release_buffer(record.index.buffer);
        log::debug!("WgpuRenderContext: removed geometry {handle}");
    }

    fn geometry_begin(
        &mut self,
        handle: Handle,
        number_of_vertices: i32,
        number_of_indices: i32,
        update: GeometryStreams,
    ) -> RenderResult<GeometryLock<'_>> {
        if !self.geometries.contains(handle) {
            return Ok(GeometryLock::default());
        }
        let vertex = if update.contains(GeometryStreams::VERTEX) {
            self.open_stream(handle, GeometryStreams::VERTEX, number_of_vertices)?
        } else {
            None
        };
        let index = if update.contains(GeometryStreams::INDEX) {
            match self.open_stream(handle, GeometryStreams::INDEX, number_of_indices) {
                Ok(index) => index,
                Err(e) => {
                    if vertex.is_some() {
                        if let Some(record) = self.geometries.get_mut(handle) {
                            record.locked.remove(GeometryStreams::VERTEX);
                        }
                    }
                    return Err(e);
                }
            }
        } else {
            None
        };
        Ok(lock_views(&mut self.buffers, vertex, index))
    }

    fn geometry_end(&mut self, handle: Handle) -> RenderResult<()> {
        let Some(record) = self.geometries.get_mut(handle) else {
            return Ok(());
        };
        let locked = std::mem::take(&mut record.locked);
        let (vertex, index) = (record.vertex.buffer, record.index.buffer);

        if locked.contains(GeometryStreams::VERTEX) {
            self.upload_stream(vertex);
        }
        if locked.contains(GeometryStreams::INDEX) {
            self.upload_stream(index);
        }
        Ok(())
    }

    fn geometry_draw_instanced(
        &mut self,
        handle: Handle,
        instances: u32,
        depth_test: bool,
    ) -> RenderResult<()> {
        let Some(record) = self.geometries.get(handle) else {
            return Ok(());
        };
        let native = |stream: &StreamRef| {
            self.buffers
                .get(stream.buffer)
                .and_then(|b| b.native.clone())
        };
        let (Some(vertex_buffer), Some(index_buffer)) =
            (native(&record.vertex), native(&record.index))
        else {
            log::trace!("WgpuRenderContext: geometry {handle} has no uploaded streams");
            return Ok(());
        };
        let count = record.index.count;
        if count <= 0 || instances == 0 {
            return Ok(());
        }
        let Some(ActivePass::Render {
            color_format,
            depth_format,
            ..
        }) = &self.pass
        else {
            log::trace!("WgpuRenderContext: geometry {handle} drawn outside a render pass");
            return Ok(());
        };
        let (color_format, depth_format) = (*color_format, *depth_format);
        let Some(program) = self
            .programs
            .get(self.current_program)
            .filter(|p| p.linked && !p.is_compute())
        else {
            log::trace!("WgpuRenderContext: geometry {handle} drawn without a render program");
            return Ok(());
        };
        let (vs, fs) = (program.vs, program.fs);
        let (Some(vs_module), Some(fs_module)) = (
            self.shaders.get(vs).map(|s| s.native.clone()),
            self.shaders.get(fs).map(|s| s.native.clone()),
        ) else {
            return Ok(());
        };

        let textures = self.bound_textures(false);
        let buffers = self.bound_buffers(false);
        let signature = Self::signature(false, &textures, &buffers);

        let key = PipelineKey::new(
            vs,
            fs,
            format_key(&mut self.format_keys, color_format),
            depth_format.map_or(0, |f| format_key(&mut self.format_keys, f)),
            &self.blend,
        );
        let layouts = self.layouts.get_or_create(&self.device, &signature).clone();
        let variants = self
            .render_pipelines
            .get_or_insert_with(key, || Ok(RenderVariants::default()))?;
        let pipeline = variants
            .pipelines
            .entry((signature.clone(), depth_test))
            .or_insert_with(|| {
                log::debug!(
                    "WgpuRenderContext: building render pipeline ({vs}, {fs}) for {color_format:?}"
                );
                build_render_pipeline(
                    &self.device,
                    &layouts,
                    &vs_module,
                    &fs_module,
                    color_format,
                    depth_format,
                    depth_test,
                    &self.blend,
                )
            })
            .clone();

        let Some(uniforms) = self
            .arena
            .push(&self.device, &self.queue, self.packer.finish())
        else {
            return Ok(());
        };
        let frame_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Doos Frame Bind Group"),
            layout: &layouts.groups[0],
            entries: &[
                wgpu::BindGroupEntry {
                    binding: VERTEX_STREAM_BINDING,
                    resource: vertex_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: UNIFORM_BINDING,
                    resource: uniforms.binding(),
                },
            ],
        });
        let [texture_group, buffer_group] =
            self.resource_groups(&layouts, false, &textures, &buffers);

        let Some(ActivePass::Render { pass, .. }) = self.pass.as_mut() else {
            return Ok(());
        };
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &frame_group, &[]);
        pass.set_bind_group(1, &texture_group, &[]);
        pass.set_bind_group(2, &buffer_group, &[]);
        pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..count as u32, 0, 0..instances);

        log::trace!("WgpuRenderContext: drew geometry {handle} ({count} indices x {instances})");
        Ok(())
    }

    fn add_buffer_object(&mut self, data: Option<&[u8]>, size: usize) -> RenderResult<Handle> {
        if size == 0 {
            return Ok(NO_HANDLE);
        }
        let handle = self.buffers.first_free();
        if handle == NO_HANDLE {
            log::warn!("WgpuRenderContext: buffer table is full");
            return Ok(NO_HANDLE);
        }
        let buffer = self.create_stream_buffer(&format!("Doos Buffer Object [{handle}]"), size);
        if let Some(data) = data {
            write_padded(&self.queue, &buffer, &data[..data.len().min(size)]);
        }
        self.buffers
            .insert_at(handle, BufferRecord::compute(size, buffer));
        log::debug!("WgpuRenderContext: created buffer object {handle} ({size} bytes)");
        Ok(handle)
    }

    fn remove_buffer_object(&mut self, handle: Handle) {
        if self.buffers.contains(handle) {
            self.release_buffer(handle);
            log::debug!("WgpuRenderContext: removed buffer object {handle}");
        }
    }

    fn update_buffer_object(&mut self, handle: Handle, data: &[u8]) -> RenderResult<()> {
        let Some(record) = self.buffers.get(handle) else {
            return Ok(());
        };
        if record.native.is_none() {
            return Ok(());
        }
        if data.len() != record.size {
            let label = format!("Doos Buffer Object [{handle}]");
            let buffer = self.create_stream_buffer(&label, data.len());
            if let Some(record) = self.buffers.get_mut(handle) {
                record.native = Some(buffer);
                record.size = data.len();
            }
        }
        let Some(record) = self.buffers.get_mut(handle) else {
            return Ok(());
        };
        if let Some(native) = &record.native {
            write_padded(&self.queue, native, data);
        }

        // Geometry streams keep their shadow in step with the GPU copy.
        if let Some(shadow) = record.shadow.as_mut() {
            let words = words_for(data.len()).max(shadow.len());
            shadow.resize(words, 0);
            bytemuck::cast_slice_mut::<u32, u8>(shadow)[..data.len()].copy_from_slice(data);
        }
        Ok(())
    }

    fn bind_buffer_object(&mut self, handle: Handle, channel: i32, target: BindTarget) {
        if !(0..MAX_BUFFER_CHANNELS).contains(&channel) {
            log::warn!("WgpuRenderContext: buffer channel {channel} out of range");
            return;
        }
        if self.buffers.get(handle).and_then(|b| b.native.as_ref()).is_none() {
            return;
        }
        self.bindings
            .buffers
            .insert(channel as u32, (handle, target));
    }

    fn get_data_from_buffer_object(&mut self, handle: Handle, out: &mut [u8]) {
        let Some(record) = self.buffers.get(handle) else {
            return;
        };
        let Some(native) = &record.native else {
            return;
        };
        let n = out.len().min(record.size);
        if n == 0 {
            return;
        }
        let size = conversions::copy_size(n);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Doos Buffer Readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Doos Buffer Readback"),
            });
        encoder.copy_buffer_to_buffer(native, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        if let Some(bytes) = self.read_mapped(&staging, size) {
            out[..n].copy_from_slice(&bytes[..n]);
        }
    }

    fn get_buffer_object(&self, handle: Handle) -> Option<BufferInfo> {
        self.buffers.get(handle).map(BufferRecord::info)
    }

    fn copy_buffer_object_data(
        &mut self,
        source: Handle,
        destination: Handle,
        read_offset: u32,
        write_offset: u32,
        size: u32,
    ) -> RenderResult<()> {
        let (Some(src), Some(dst)) = (self.buffers.get(source), self.buffers.get(destination))
        else {
            return Ok(());
        };
        let (Some(src_buffer), Some(dst_buffer)) = (&src.native, &dst.native) else {
            return Ok(());
        };
        let fits = |offset: u32, capacity: usize| offset as usize + size as usize <= capacity;
        if !fits(read_offset, src.size) || !fits(write_offset, dst.size) {
            log::warn!("WgpuRenderContext: buffer copy of {size} bytes is out of bounds");
            return Ok(());
        }
        let align = wgpu::COPY_BUFFER_ALIGNMENT as u32;
        if read_offset % align != 0 || write_offset % align != 0 || size % align != 0 {
            log::warn!("WgpuRenderContext: buffer copies must be 4-byte aligned");
            return Ok(());
        }
        if size == 0 {
            return Ok(());
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Doos Buffer Copy"),
            });
        encoder.copy_buffer_to_buffer(
            src_buffer,
            u64::from(read_offset),
            dst_buffer,
            u64::from(write_offset),
            u64::from(size),
        );
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn add_frame_buffer(
        &mut self,
        w: i32,
        h: i32,
        make_depth_texture: bool,
    ) -> RenderResult<Handle> {
        let handle = self.frame_buffers.first_free();
        if handle == NO_HANDLE {
            log::warn!("WgpuRenderContext: framebuffer table is full");
            return Ok(NO_HANDLE);
        }

        let usage = TextureUsage::RENDER_TARGET | TextureUsage::READ;
        let texture = self.add_texture(w, h, TextureFormat::Rgba8, None, usage)?;
        if texture == NO_HANDLE {
            return Ok(NO_HANDLE);
        }
        let depth_texture = if make_depth_texture {
            let depth = self.add_texture(
                w,
                h,
                TextureFormat::Depth,
                None,
                TextureUsage::RENDER_TARGET,
            )?;
            if depth == NO_HANDLE {
                self.remove_texture(texture);
                return Ok(NO_HANDLE);
            }
            depth
        } else {
            NO_HANDLE
        };

        self.frame_buffers.insert_at(
            handle,
            FrameBufferInfo {
                texture,
                depth_texture,
                render_buffer: NO_HANDLE,
                width: w,
                height: h,
            },
        );
        log::debug!("WgpuRenderContext: created framebuffer {handle} ({w}x{h})");
        Ok(handle)
    }

    fn remove_frame_buffer(&mut self, handle: Handle) {
        if let Some(info) = self.frame_buffers.remove(handle) {
            self.remove_texture(info.texture);
            self.remove_texture(info.depth_texture);
            log::debug!("WgpuRenderContext: removed framebuffer {handle}");
        }
    }

    fn get_frame_buffer(&self, handle: Handle) -> Option<FrameBufferInfo> {
        self.frame_buffers.get(handle).copied()
    }

    fn add_render_buffer(&mut self) -> RenderResult<Handle> {
        // Depth always lives in a texture here.
        Ok(NO_HANDLE)
    }

    fn remove_render_buffer(&mut self, _handle: Handle) {}

    fn add_shader(
        &mut self,
        source: &str,
        stage: ShaderStage,
        name: &str,
    ) -> RenderResult<Handle> {
        if let Some((handle, _)) = self.shaders.iter().find(|(_, s)| s.name == name) {
            return Ok(handle);
        }
        let handle = self.shaders.first_free();
        if handle == NO_HANDLE {
            log::warn!("WgpuRenderContext: shader table is full");
            return Ok(NO_HANDLE);
        }

        validate_wgsl(source, stage, name)?;
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(name),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
            });
        self.shaders.insert_at(
            handle,
            ShaderRecord {
                stage,
                name: name.to_owned(),
                compiled: true,
                native: module,
            },
        );
        log::debug!("WgpuRenderContext: compiled {stage:?} shader '{name}' as {handle}");
        Ok(handle)
    }

    fn remove_shader(&mut self, handle: Handle) {
        let Some(shader) = self.shaders.remove(handle) else {
            return;
        };
        let evicted = self.render_pipelines.evict_shader(handle)
            + self.compute_pipelines.evict_shader(handle);
        for (_, program) in self.programs.iter_mut() {
            if program.references(handle) {
                program.linked = false;
            }
        }
        log::debug!(
            "WgpuRenderContext: removed shader '{}' ({evicted} pipeline sets evicted)",
            shader.name
        );
    }

    fn add_program(&mut self, vs: Handle, fs: Handle, cs: Handle) -> RenderResult<Handle> {
        if !program_triple_is_valid(vs, fs, cs) {
            log::warn!("WgpuRenderContext: invalid program triple ({vs}, {fs}, {cs})");
            return Ok(NO_HANDLE);
        }
        let ready = |handle: Handle, stage: ShaderStage| {
            self.shaders
                .get(handle)
                .is_some_and(|s| s.compiled && s.stage == stage)
        };
        let linked = if cs >= 0 {
            ready(cs, ShaderStage::Compute)
        } else {
            ready(vs, ShaderStage::Vertex) && ready(fs, ShaderStage::Fragment)
        };

        let handle = self.programs.insert(ProgramRecord {
            vs,
            fs,
            cs,
            linked,
            native: (),
        });
        if handle == NO_HANDLE {
            log::warn!("WgpuRenderContext: program table is full");
            return Ok(NO_HANDLE);
        }
        log::debug!("WgpuRenderContext: created program {handle} (linked: {linked})");
        Ok(handle)
    }

    fn remove_program(&mut self, handle: Handle) {
        if self.programs.remove(handle).is_some() {
            if self.current_program == handle {
                self.current_program = NO_HANDLE;
            }
            log::debug!("WgpuRenderContext: removed program {handle}");
        }
    }

    fn bind_program(&mut self, handle: Handle) -> RenderResult<()> {
        if self.programs.get(handle).is_some_and(|p| p.linked) {
            self.current_program = handle;
        }
        Ok(())
    }

    fn uniforms(&self) -> &UniformTable {
        &self.uniforms
    }

    fn uniforms_mut(&mut self) -> &mut UniformTable {
        &mut self.uniforms
    }

    fn bind_uniform(&mut self, program: Handle, uniform: Handle) -> RenderResult<()> {
        if !self.programs.get(program).is_some_and(|p| p.linked) {
            return Ok(());
        }
        let Some(record) = self.uniforms.get(uniform) else {
            return Ok(());
        };
        let offset = self.packer.push(record);
        log::trace!(
            "WgpuRenderContext: uniform '{}' packed at offset {offset}",
            record.name
        );
        Ok(())
    }

    fn blend_state_mut(&mut self) -> &mut BlendState {
        &mut self.blend
    }

    fn dispatch_compute(&mut self, groups: [u32; 3], local_size: [u32; 3]) -> RenderResult<()> {
        if !matches!(self.pass, Some(ActivePass::Compute { .. })) {
            log::trace!("WgpuRenderContext: dispatch outside a compute pass ignored");
            return Ok(());
        }
        let Some(program) = self
            .programs
            .get(self.current_program)
            .filter(|p| p.linked && p.is_compute())
        else {
            log::trace!("WgpuRenderContext: dispatch without a compute program ignored");
            return Ok(());
        };
        let cs = program.cs;
        let Some(module) = self.shaders.get(cs).map(|s| s.native.clone()) else {
            return Ok(());
        };

        let textures = self.bound_textures(true);
        let buffers = self.bound_buffers(true);
        let signature = Self::signature(true, &textures, &buffers);

        let layouts = self.layouts.get_or_create(&self.device, &signature).clone();
        let variants = self
            .compute_pipelines
            .get_or_insert_with(cs, || Ok(ComputeVariants::default()))?;
        let pipeline = variants
            .pipelines
            .entry(signature.clone())
            .or_insert_with(|| {
                log::debug!("WgpuRenderContext: building compute pipeline for shader {cs}");
                build_compute_pipeline(&self.device, &layouts, &module)
            })
            .clone();

        let Some(uniforms) = self
            .arena
            .push(&self.device, &self.queue, self.packer.finish())
        else {
            return Ok(());
        };
        let frame_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Doos Frame Bind Group"),
            layout: &layouts.groups[0],
            entries: &[wgpu::BindGroupEntry {
                binding: UNIFORM_BINDING,
                resource: uniforms.binding(),
            }],
        });
        let [texture_group, buffer_group] =
            self.resource_groups(&layouts, true, &textures, &buffers);

        let Some(ActivePass::Compute { pass }) = self.pass.as_mut() else {
            return Ok(());
        };
        let [x, y, z] = groups;
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &frame_group, &[]);
        pass.set_bind_group(1, &texture_group, &[]);
        pass.set_bind_group(2, &buffer_group, &[]);
        pass.dispatch_workgroups(x, y, z);
        log::trace!(
            "WgpuRenderContext: dispatched {x}x{y}x{z} workgroups (local size {local_size:?} is declared in the shader)"
        );
        Ok(())
    }

    fn add_query(&mut self) -> Handle {
        let handle = self.queries.insert(Stamp::Empty);
        if handle == NO_HANDLE {
            log::warn!("WgpuRenderContext: query table is full");
        }
        handle
    }

    fn remove_query(&mut self, handle: Handle) {
        self.queries.remove(handle);
    }

    fn query_timestamp(&mut self, handle: Handle) {
        if !self.queries.contains(handle) {
            return;
        }
        let stamp = match &self.timestamps {
            None => Stamp::Cpu(self.epoch.elapsed().as_nanos() as u64),
            Some(timestamps) => {
                let index = handle as u32;
                match (self.pass.as_mut(), self.encoder.as_mut()) {
                    (Some(ActivePass::Render { pass, .. }), _) if timestamps.in_passes() => {
                        timestamps.write_in_render_pass(pass, index);
                    }
                    (Some(ActivePass::Compute { pass }), _) if timestamps.in_passes() => {
                        timestamps.write_in_compute_pass(pass, index);
                    }
                    // The encoder is locked by the pass; write once it ends.
                    (Some(_), _) => self.deferred_stamps.push(handle),
                    (None, Some(encoder)) => timestamps.write(encoder, index),
                    (None, None) => {
                        let mut encoder =
                            self.device
                                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                                    label: Some("Doos Timestamp Encoder"),
                                });
                        timestamps.write(&mut encoder, index);
                        self.queue.submit(Some(encoder.finish()));
                        if let Some(stamp) = self.queries.get_mut(handle) {
                            *stamp = Stamp::Submitted;
                        }
                        return;
                    }
                }
                Stamp::Recorded
            }
        };
        if let Some(slot) = self.queries.get_mut(handle) {
            *slot = stamp;
        }
    }

    fn get_query_result(&mut self, handle: Handle) -> u64 {
        let Some(&stamp) = self.queries.get(handle) else {
            return u64::MAX;
        };
        match stamp {
            Stamp::Empty => 0,
            Stamp::Cpu(nanos) | Stamp::Resolved(nanos) => nanos,
            Stamp::Recorded => {
                log::warn!("WgpuRenderContext: query {handle} belongs to a frame not submitted yet");
                0
            }
            Stamp::Submitted => {
                let Some(nanos) = self.resolve_timestamp(handle) else {
                    log::error!("WgpuRenderContext: query {handle} could not be read back");
                    return 0;
                };
                if let Some(slot) = self.queries.get_mut(handle) {
                    *slot = Stamp::Resolved(nanos);
                }
                nanos
            }
        }
    }

    fn destroy(&mut self) {
        if !self.initialized {
            return;
        }
        self.end_pass();
        let frame_was_open = self.encoder.take().is_some();
        self.screen = None;

        for handle in self.textures.handles() {
            self.remove_texture(handle);
        }
        for handle in self.geometries.handles() {
            self.geometries.remove(handle);
        }
        for handle in self.frame_buffers.handles() {
            self.frame_buffers.remove(handle);
        }
        for handle in self.programs.handles() {
            self.remove_program(handle);
        }
        for handle in self.shaders.handles() {
            self.remove_shader(handle);
        }
        for handle in self.uniforms.handles() {
            self.uniforms.remove(handle);
        }
        for handle in self.buffers.handles() {
            self.release_buffer(handle);
        }
        for handle in self.queries.handles() {
            self.remove_query(handle);
        }
        self.render_pipelines.drain();
        self.compute_pipelines.drain();
        self.layouts.clear();
        self.samplers.clear();

        if frame_was_open {
            self.throttle.release();
        }
        self.wait_idle();
        self.initialized = false;
        log::info!("WgpuRenderContext: destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = "@vertex fn main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {\n    return vec4<f32>(f32(i), 0.0, 0.0, 1.0);\n}\n";

    fn create_test_context() -> Option<WgpuRenderContext> {
        WgpuRenderContext::headless(RenderConfig::default()).ok()
    }

    #[test]
    fn test_format_keys_are_stable_and_nonzero() {
        let mut registry = Vec::new();
        let a = format_key(&mut registry, wgpu::TextureFormat::Rgba8Unorm);
        let b = format_key(&mut registry, wgpu::TextureFormat::Depth32Float);
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(format_key(&mut registry, wgpu::TextureFormat::Rgba8Unorm), a);
    }

    #[test]
    fn test_validate_wgsl_accepts_matching_stage() {
        assert!(validate_wgsl(VS, ShaderStage::Vertex, "ok.vs").is_ok());
    }

    #[test]
    fn test_validate_wgsl_rejects_wrong_stage() {
        let err = validate_wgsl(VS, ShaderStage::Fragment, "wrong.fs").unwrap_err();
        match err {
            RenderError::ShaderCompilation { name, log } => {
                assert_eq!(name, "wrong.fs");
                assert!(log.contains("entry point"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_validate_wgsl_reports_parse_errors() {
        let err = validate_wgsl("@vertex fn main( {", ShaderStage::Vertex, "broken.vs");
        assert!(matches!(err, Err(RenderError::ShaderCompilation { .. })));
    }

    #[test]
    fn test_frame_misuse_is_reported() {
        let Some(mut ctx) = create_test_context() else {
            println!("Skipping test_frame_misuse_is_reported: could not create test device.");
            return;
        };
        assert!(matches!(
            ctx.frame_end(false),
            Err(RenderError::NoFrameInProgress)
        ));
        ctx.frame_begin(RenderDrawables::none()).unwrap();
        assert!(matches!(
            ctx.frame_begin(RenderDrawables::none()),
            Err(RenderError::FrameInProgress)
        ));
        ctx.frame_end(true).unwrap();

        // The throttle is free again once the frame completed.
        ctx.frame_begin(RenderDrawables::none()).unwrap();
        ctx.frame_end(true).unwrap();
        ctx.destroy();
        assert!(!ctx.is_initialized());
    }

    #[test]
    fn test_arena_grows_past_its_first_chunk() {
        let Some(ctx) = create_test_context() else {
            println!("Skipping test_arena_grows_past_its_first_chunk: could not create test device.");
            return;
        };
        let mut arena = UniformArena::new(ctx.device(), 256);
        let first = arena.push(ctx.device(), ctx.queue(), &[1u8; 64]).unwrap();
        let second = arena.push(ctx.device(), ctx.queue(), &[2u8; 64]).unwrap();
        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, 0);
        assert_eq!(arena.chunk_count(), 2);

        arena.reset();
        let rewound = arena.push(ctx.device(), ctx.queue(), &[3u8; 16]).unwrap();
        assert_eq!(rewound.offset, 0);
        assert_eq!(arena.chunk_count(), 2);

        let limit = u64::from(ctx.device().limits().max_uniform_buffer_binding_size);
        let oversized = vec![0u8; limit as usize + 16];
        assert!(arena.push(ctx.device(), ctx.queue(), &oversized).is_none());
        assert!(rewound.size <= limit);
    }

    #[test]
    fn test_unaligned_copy_is_ignored() {
        let Some(mut ctx) = create_test_context() else {
            println!("Skipping test_unaligned_copy_is_ignored: could not create test device.");
            return;
        };
        let src = ctx.add_buffer_object(Some(&[7u8; 16]), 16).unwrap();
        let dst = ctx.add_buffer_object(Some(&[0u8; 16]), 16).unwrap();
        ctx.copy_buffer_object_data(src, dst, 1, 0, 4).unwrap();
        let mut out = [9u8; 16];
        ctx.get_data_from_buffer_object(dst, &mut out);
        assert_eq!(out, [0u8; 16]);
    }
}
