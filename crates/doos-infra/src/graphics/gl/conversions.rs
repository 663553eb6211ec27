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

//! Translations from the backend-neutral types to GL enums.

use doos_core::renderer::api::{
    BlendEquation, BlendFactor, ImageAccess, SamplerFlags, TextureFilter, TextureFormat,
};

/// The sized internal format a texture is allocated with.
pub fn internal_format(format: TextureFormat) -> u32 {
    match format {
        TextureFormat::Rgba8 | TextureFormat::Bgra8 | TextureFormat::None => glow::RGBA8,
        TextureFormat::Rgba32f => glow::RGBA32F,
        TextureFormat::Rgba8ui => glow::RGBA8UI,
        TextureFormat::R32ui => glow::R32UI,
        TextureFormat::R32i => glow::R32I,
        TextureFormat::R32f => glow::R32F,
        TextureFormat::R8ui => glow::R8UI,
        TextureFormat::R8i => glow::R8I,
        TextureFormat::Rgba16 => glow::RGBA16,
        TextureFormat::Depth => glow::DEPTH_COMPONENT24,
    }
}

/// `(format, type)` of the payload produced by `pack_texels` for an upload.
///
/// `None` for depth, which is never uploaded from the CPU.
pub fn upload_format(format: TextureFormat) -> Option<(u32, u32)> {
    Some(match format {
        TextureFormat::Rgba8 | TextureFormat::Bgra8 => (glow::RGBA, glow::UNSIGNED_BYTE),
        TextureFormat::Rgba8ui => (glow::RGBA_INTEGER, glow::UNSIGNED_BYTE),
        TextureFormat::Rgba32f => (glow::RGBA, glow::FLOAT),
        TextureFormat::Rgba16 => (glow::RGBA, glow::UNSIGNED_SHORT),
        TextureFormat::R32ui => (glow::RED_INTEGER, glow::UNSIGNED_INT),
        TextureFormat::R32i => (glow::RED_INTEGER, glow::INT),
        TextureFormat::R32f => (glow::RED, glow::FLOAT),
        TextureFormat::R8ui => (glow::RED_INTEGER, glow::UNSIGNED_BYTE),
        TextureFormat::R8i => (glow::RED_INTEGER, glow::BYTE),
        TextureFormat::Depth | TextureFormat::None => return None,
    })
}

/// `(format, type)` used to read a texture back.
///
/// `Rgba32f` is read as floats and narrowed on the CPU afterwards.
pub fn readback_format(format: TextureFormat) -> Option<(u32, u32)> {
    match format {
        TextureFormat::Rgba8ui => Some((glow::BGRA_INTEGER, glow::UNSIGNED_BYTE)),
        other => upload_format(other),
    }
}

/// `(wrap, min filter, mag filter)` for a channel binding.
pub fn sampler_parameters(flags: SamplerFlags) -> (i32, i32, i32) {
    let wrap = if flags.clamps() {
        glow::CLAMP_TO_EDGE
    } else {
        glow::REPEAT
    };
    let (min, mag) = match flags.filter() {
        TextureFilter::Nearest => (glow::NEAREST, glow::NEAREST),
        TextureFilter::LinearMipmapLinear => (glow::LINEAR_MIPMAP_LINEAR, glow::LINEAR),
        TextureFilter::Linear => (glow::LINEAR, glow::LINEAR),
    };
    (wrap as i32, min as i32, mag as i32)
}

pub fn image_access(access: ImageAccess) -> u32 {
    match access {
        ImageAccess::ReadOnly => glow::READ_ONLY,
        ImageAccess::WriteOnly => glow::WRITE_ONLY,
        ImageAccess::ReadWrite => glow::READ_WRITE,
    }
}

pub fn blend_factor(factor: BlendFactor) -> u32 {
    match factor {
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::One => glow::ONE,
        BlendFactor::SrcColor => glow::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => glow::ONE_MINUS_SRC_COLOR,
        BlendFactor::DstColor => glow::DST_COLOR,
        BlendFactor::OneMinusDstColor => glow::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => glow::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => glow::ONE_MINUS_DST_ALPHA,
    }
}

pub fn blend_equation(equation: BlendEquation) -> u32 {
    match equation {
        BlendEquation::Add => glow::FUNC_ADD,
        BlendEquation::Subtract => glow::FUNC_SUBTRACT,
        BlendEquation::ReverseSubtract => glow::FUNC_REVERSE_SUBTRACT,
        BlendEquation::Min => glow::MIN,
        BlendEquation::Max => glow::MAX,
    }
}

/// Readable name of a `glGetError` code.
pub fn error_name(code: u32) -> &'static str {
    match code {
        glow::INVALID_ENUM => "GL_INVALID_ENUM",
        glow::INVALID_VALUE => "GL_INVALID_VALUE",
        glow::INVALID_OPERATION => "GL_INVALID_OPERATION",
        glow::STACK_OVERFLOW => "GL_STACK_OVERFLOW",
        glow::STACK_UNDERFLOW => "GL_STACK_UNDERFLOW",
        glow::OUT_OF_MEMORY => "GL_OUT_OF_MEMORY",
        glow::INVALID_FRAMEBUFFER_OPERATION => "GL_INVALID_FRAMEBUFFER_OPERATION",
        _ => "unknown GL error",
    }
}
