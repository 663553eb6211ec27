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

//! The binding convention of the command-buffer backend.
//!
//! Shaders see three bind groups:
//!
//! | group | render pass                                     | compute pass                          |
//! |-------|-------------------------------------------------|---------------------------------------|
//! | 0     | `0`: vertex stream (storage), `10`: uniforms    | `10`: uniforms                        |
//! | 1     | channel `c`: texture at `2c`, sampler at `2c+1` | channel `c`: texture or image at `c`  |
//! | 2     | storage buffer bound to channel `c` at `c`      | storage buffer bound to channel `c` at `c` |
//!
//! Which entries groups 1 and 2 hold depends on what the pass bound, so the
//! layouts are built per [`BindingSignature`] and cached.

use std::collections::HashMap;

/// Binding of the vertex stream in group 0.
pub const VERTEX_STREAM_BINDING: u32 = 0;
/// Binding of the uniform blob in group 0, shared by every stage.
pub const UNIFORM_BINDING: u32 = 10;
/// Number of bind groups in every pipeline layout.
pub const GROUP_COUNT: usize = 3;

/// How a texture channel is exposed to shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    /// Sampled through `textureSample` or `textureLoad`.
    Sampled {
        sample_type: wgpu::TextureSampleType,
        dimension: wgpu::TextureViewDimension,
    },
    /// A storage image, compute passes only.
    Storage {
        format: wgpu::TextureFormat,
        access: wgpu::StorageTextureAccess,
    },
}

/// How a buffer channel is exposed to shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferSlot {
    pub stages: wgpu::ShaderStages,
    pub read_only: bool,
}

/// Everything a pipeline layout depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BindingSignature {
    pub compute: bool,
    /// `(channel, slot)`, sorted by channel.
    pub textures: Vec<(u32, TextureSlot)>,
    /// `(channel, slot)`, sorted by channel.
    pub buffers: Vec<(u32, BufferSlot)>,
}

impl BindingSignature {
    fn frame_entries(&self) -> Vec<wgpu::BindGroupLayoutEntry> {
        let uniform_stages = if self.compute {
            wgpu::ShaderStages::COMPUTE
        } else {
            wgpu::ShaderStages::VERTEX_FRAGMENT
        };
        let mut entries = Vec::with_capacity(2);
        if !self.compute {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: VERTEX_STREAM_BINDING,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: UNIFORM_BINDING,
            visibility: uniform_stages,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });
        entries
    }

    fn texture_entries(&self) -> Vec<wgpu::BindGroupLayoutEntry> {
        let mut entries = Vec::with_capacity(self.textures.len() * 2);
        for &(channel, slot) in &self.textures {
            match (self.compute, slot) {
                (false, TextureSlot::Sampled { sample_type, dimension }) => {
                    let filtering = super::conversions::is_filterable(sample_type);
                    entries.push(wgpu::BindGroupLayoutEntry {
                        binding: channel * 2,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type,
                            view_dimension: dimension,
                            multisampled: false,
                        },
                        count: None,
                    });
                    entries.push(wgpu::BindGroupLayoutEntry {
                        binding: channel * 2 + 1,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Sampler(if filtering {
                            wgpu::SamplerBindingType::Filtering
                        } else {
                            wgpu::SamplerBindingType::NonFiltering
                        }),
                        count: None,
                    });
                }
                (true, TextureSlot::Sampled { sample_type, dimension }) => {
                    entries.push(wgpu::BindGroupLayoutEntry {
                        binding: channel,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Texture {
                            sample_type,
                            view_dimension: dimension,
                            multisampled: false,
                        },
                        count: None,
                    });
                }
                (_, TextureSlot::Storage { format, access }) => {
                    entries.push(wgpu::BindGroupLayoutEntry {
                        binding: channel,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::StorageTexture {
                            access,
                            format,
                            view_dimension: wgpu::TextureViewDimension::D2,
                        },
                        count: None,
                    });
                }
            }
        }
        entries
    }

    fn buffer_entries(&self) -> Vec<wgpu::BindGroupLayoutEntry> {
        self.buffers
            .iter()
            .map(|&(channel, slot)| wgpu::BindGroupLayoutEntry {
                binding: channel,
                visibility: slot.stages,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage {
                        read_only: slot.read_only,
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect()
    }
}

/// The bind group layouts and the pipeline layout of one signature.
#[derive(Debug, Clone)]
pub struct PipelineLayouts {
    pub groups: [wgpu::BindGroupLayout; GROUP_COUNT],
    pub pipeline: wgpu::PipelineLayout,
}

impl PipelineLayouts {
    fn new(device: &wgpu::Device, signature: &BindingSignature) -> Self {
        let group = |label: &'static str, entries: &[wgpu::BindGroupLayoutEntry]| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries,
            })
        };
        let groups = [
            group("Doos Frame Layout", &signature.frame_entries()),
            group("Doos Texture Layout", &signature.texture_entries()),
            group("Doos Buffer Layout", &signature.buffer_entries()),
        ];
        let pipeline = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Doos Pipeline Layout"),
            bind_group_layouts: &[Some(&groups[0]), Some(&groups[1]), Some(&groups[2])],
            immediate_size: 0,
        });
        Self { groups, pipeline }
    }
}

/// Layouts keyed by signature. They live as long as the context.
#[derive(Debug, Default)]
pub struct LayoutCache {
    layouts: HashMap<BindingSignature, PipelineLayouts>,
}

impl LayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &mut self,
        device: &wgpu::Device,
        signature: &BindingSignature,
    ) -> &PipelineLayouts {
        if !self.layouts.contains_key(signature) {
            log::debug!("WgpuRenderContext: new binding layout {signature:?}");
            self.layouts
                .insert(signature.clone(), PipelineLayouts::new(device, signature));
        }
        &self.layouts[signature]
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn clear(&mut self) {
        self.layouts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampled() -> TextureSlot {
        TextureSlot::Sampled {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            dimension: wgpu::TextureViewDimension::D2,
        }
    }

    #[test]
    fn test_render_frame_group_holds_vertex_stream_and_uniforms() {
        let entries = BindingSignature::default().frame_entries();
        let bindings: Vec<u32> = entries.iter().map(|e| e.binding).collect();
        assert_eq!(bindings, vec![VERTEX_STREAM_BINDING, UNIFORM_BINDING]);
        assert_eq!(entries[1].visibility, wgpu::ShaderStages::VERTEX_FRAGMENT);
    }

    #[test]
    fn test_compute_frame_group_holds_uniforms_only() {
        let signature = BindingSignature {
            compute: true,
            ..Default::default()
        };
        let entries = signature.frame_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].binding, UNIFORM_BINDING);
        assert_eq!(entries[0].visibility, wgpu::ShaderStages::COMPUTE);
    }

    #[test]
    fn test_render_channels_pair_texture_and_sampler() {
        let signature = BindingSignature {
            textures: vec![(0, sampled()), (3, sampled())],
            ..Default::default()
        };
        let bindings: Vec<u32> = signature.texture_entries().iter().map(|e| e.binding).collect();
        assert_eq!(bindings, vec![0, 1, 6, 7]);
    }

    #[test]
    fn test_compute_channels_map_one_to_one() {
        let signature = BindingSignature {
            compute: true,
            textures: vec![
                (1, sampled()),
                (
                    2,
                    TextureSlot::Storage {
                        format: wgpu::TextureFormat::R32Float,
                        access: wgpu::StorageTextureAccess::ReadWrite,
                    },
                ),
            ],
            buffers: vec![(
                4,
                BufferSlot {
                    stages: wgpu::ShaderStages::COMPUTE,
                    read_only: false,
                },
            )],
        };
        let textures: Vec<u32> = signature.texture_entries().iter().map(|e| e.binding).collect();
        assert_eq!(textures, vec![1, 2]);
        let buffers = signature.buffer_entries();
        assert_eq!(buffers.len(), 1);
        assert_eq!(buffers[0].binding, 4);
    }
}
