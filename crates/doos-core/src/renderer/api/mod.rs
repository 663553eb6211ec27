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

//! Backend-neutral descriptions of the resources a render context manages.

pub mod blend;
pub mod buffer;
pub mod framebuffer;
pub mod geometry;
pub mod pass;
pub mod shader;
pub mod texture;
pub mod uniform;

pub use self::blend::{BlendEquation, BlendFactor, BlendState};
pub use self::buffer::{words_for, BindTarget, BufferInfo, BufferKind, BufferRecord};
pub use self::framebuffer::FrameBufferInfo;
pub use self::geometry::{
    lock_views, reserve_stream, GeometryLock, GeometryRecord, GeometryStreams, StreamAlloc,
    StreamRef, VertexAttribute, VertexAttributeKind, VertexLayout,
};
pub use self::pass::{unpack_rgba8, ClearFlags, RenderDrawables, RenderPassDescriptor};
pub use self::shader::{program_triple_is_valid, ProgramRecord, ShaderRecord, ShaderStage};
pub use self::texture::{
    image_access, narrow_rgba32f, pack_texels, CubeFaces, ImageAccess, SamplerFlags, TextureData,
    TextureFilter, TextureFormat, TextureInfo, TextureTarget, TextureUsage,
};
pub use self::uniform::{UniformPacker, UniformRecord, UniformTable, UniformType};
