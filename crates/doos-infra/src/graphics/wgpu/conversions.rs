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

//! Conversions from the backend-neutral resource types to `wgpu` types.

use doos_core::renderer::api::{
    BlendEquation, BlendFactor, BlendState, ImageAccess, SamplerFlags, TextureFilter,
    TextureFormat, TextureTarget,
};

/// The native format a texture is stored in.
///
/// `rgba16` needs `TEXTURE_FORMAT_16BIT_NORM`; without it the texels are kept
/// as unsigned integers with the same bit pattern.
pub fn texture_format(format: TextureFormat, norm16: bool) -> Option<wgpu::TextureFormat> {
    Some(match format {
        TextureFormat::None => return None,
        TextureFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba32f => wgpu::TextureFormat::Rgba32Float,
        TextureFormat::Bgra8 => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Rgba8ui => wgpu::TextureFormat::Rgba8Uint,
        TextureFormat::R32ui => wgpu::TextureFormat::R32Uint,
        TextureFormat::R32i => wgpu::TextureFormat::R32Sint,
        TextureFormat::R32f => wgpu::TextureFormat::R32Float,
        TextureFormat::R8ui => wgpu::TextureFormat::R8Uint,
        TextureFormat::R8i => wgpu::TextureFormat::R8Sint,
        TextureFormat::Rgba16 if norm16 => wgpu::TextureFormat::Rgba16Unorm,
        TextureFormat::Rgba16 => wgpu::TextureFormat::Rgba16Uint,
        TextureFormat::Depth => wgpu::TextureFormat::Depth32Float,
    })
}

/// How a shader samples a texture of `format`.
pub fn sample_type(format: wgpu::TextureFormat) -> wgpu::TextureSampleType {
    use wgpu::TextureFormat as F;
    match format {
        F::Rgba8Uint | F::R32Uint | F::R8Uint | F::Rgba16Uint => wgpu::TextureSampleType::Uint,
        F::R32Sint | F::R8Sint => wgpu::TextureSampleType::Sint,
        F::Depth32Float => wgpu::TextureSampleType::Depth,
        // 32-bit floats only filter behind an optional feature.
        F::Rgba32Float | F::R32Float => wgpu::TextureSampleType::Float { filterable: false },
        _ => wgpu::TextureSampleType::Float { filterable: true },
    }
}

/// `true` when textures of this sample type accept a filtering sampler.
pub fn is_filterable(sample_type: wgpu::TextureSampleType) -> bool {
    matches!(
        sample_type,
        wgpu::TextureSampleType::Float { filterable: true }
    )
}

pub fn view_dimension(target: TextureTarget) -> wgpu::TextureViewDimension {
    match target {
        TextureTarget::D2 => wgpu::TextureViewDimension::D2,
        TextureTarget::Cube => wgpu::TextureViewDimension::Cube,
    }
}

/// `true` when `format` can back a write-only storage texture without extra features.
pub fn supports_storage(format: wgpu::TextureFormat) -> bool {
    use wgpu::TextureFormat as F;
    matches!(
        format,
        F::Rgba8Unorm
            | F::Rgba8Uint
            | F::Rgba16Uint
            | F::Rgba32Float
            | F::R32Uint
            | F::R32Sint
            | F::R32Float
    )
}

/// The storage access for an image binding. Only single-channel 32-bit
/// formats can be read and written from the same binding.
pub fn storage_access(access: ImageAccess, format: wgpu::TextureFormat) -> wgpu::StorageTextureAccess {
    use wgpu::TextureFormat as F;
    match access {
        ImageAccess::ReadOnly => wgpu::StorageTextureAccess::ReadOnly,
        ImageAccess::WriteOnly => wgpu::StorageTextureAccess::WriteOnly,
        ImageAccess::ReadWrite if matches!(format, F::R32Uint | F::R32Sint | F::R32Float) => {
            wgpu::StorageTextureAccess::ReadWrite
        }
        ImageAccess::ReadWrite => wgpu::StorageTextureAccess::WriteOnly,
    }
}

/// Builds the sampler for a channel binding. Non-filterable textures always
/// sample with nearest filtering.
pub fn sampler_descriptor(flags: SamplerFlags, filterable: bool) -> wgpu::SamplerDescriptor<'static> {
    let address_mode = if flags.clamps() {
        wgpu::AddressMode::ClampToEdge
    } else {
        wgpu::AddressMode::Repeat
    };
    let (filter, mipmap_filter) = match flags.filter() {
        _ if !filterable => (wgpu::FilterMode::Nearest, wgpu::MipmapFilterMode::Nearest),
        TextureFilter::Nearest => (wgpu::FilterMode::Nearest, wgpu::MipmapFilterMode::Nearest),
        TextureFilter::Linear => (wgpu::FilterMode::Linear, wgpu::MipmapFilterMode::Nearest),
        TextureFilter::LinearMipmapLinear => {
            (wgpu::FilterMode::Linear, wgpu::MipmapFilterMode::Linear)
        }
    };
    wgpu::SamplerDescriptor {
        label: Some("Doos Channel Sampler"),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter,
        ..Default::default()
    }
}

pub fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
    }
}

pub fn blend_operation(equation: BlendEquation) -> wgpu::BlendOperation {
    match equation {
        BlendEquation::Add => wgpu::BlendOperation::Add,
        BlendEquation::Subtract => wgpu::BlendOperation::Subtract,
        BlendEquation::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
        BlendEquation::Min => wgpu::BlendOperation::Min,
        BlendEquation::Max => wgpu::BlendOperation::Max,
    }
}

/// The colour target blend state, `None` when blending is off.
///
/// The same factors and equation apply to colour and alpha. Min and max
/// ignore the factors, which `wgpu` requires to be `One`.
pub fn blend_state(state: &BlendState) -> Option<wgpu::BlendState> {
    if !state.enabled {
        return None;
    }
    let operation = blend_operation(state.equation);
    let component = match operation {
        wgpu::BlendOperation::Min | wgpu::BlendOperation::Max => wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::One,
            operation,
        },
        _ => wgpu::BlendComponent {
            src_factor: blend_factor(state.src),
            dst_factor: blend_factor(state.dst),
            operation,
        },
    };
    Some(wgpu::BlendState {
        color: component,
        alpha: component,
    })
}

/// Rounds `size` up to the 4-byte granularity of buffer copies.
pub fn copy_size(size: usize) -> u64 {
    (size as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT).max(wgpu::COPY_BUFFER_ALIGNMENT)
}

/// Bytes per row of a texture-to-buffer copy, padded to the copy alignment.
pub fn padded_bytes_per_row(unpadded: u32) -> u32 {
    unpadded.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba16_falls_back_to_uint() {
        assert_eq!(
            texture_format(TextureFormat::Rgba16, true),
            Some(wgpu::TextureFormat::Rgba16Unorm)
        );
        assert_eq!(
            texture_format(TextureFormat::Rgba16, false),
            Some(wgpu::TextureFormat::Rgba16Uint)
        );
        assert_eq!(texture_format(TextureFormat::None, true), None);
    }

    #[test]
    fn test_sample_types() {
        assert!(is_filterable(sample_type(wgpu::TextureFormat::Rgba8Unorm)));
        assert!(!is_filterable(sample_type(wgpu::TextureFormat::Rgba32Float)));
        assert_eq!(
            sample_type(wgpu::TextureFormat::Rgba8Uint),
            wgpu::TextureSampleType::Uint
        );
        assert_eq!(
            sample_type(wgpu::TextureFormat::Depth32Float),
            wgpu::TextureSampleType::Depth
        );
    }

    #[test]
    fn test_non_filterable_sampler_is_nearest() {
        let desc = sampler_descriptor(SamplerFlags::LINEAR | SamplerFlags::CLAMP, false);
        assert_eq!(desc.min_filter, wgpu::FilterMode::Nearest);
        assert_eq!(desc.address_mode_u, wgpu::AddressMode::ClampToEdge);

        let desc = sampler_descriptor(SamplerFlags::LINEAR_MIPMAP_LINEAR, true);
        assert_eq!(desc.min_filter, wgpu::FilterMode::Linear);
        assert_eq!(desc.address_mode_v, wgpu::AddressMode::Repeat);
    }

    #[test]
    fn test_blend_state() {
        assert!(blend_state(&BlendState::default()).is_none());

        let alpha = BlendState {
            enabled: true,
            src: BlendFactor::SrcAlpha,
            dst: BlendFactor::OneMinusSrcAlpha,
            equation: BlendEquation::Add,
        };
        let state = blend_state(&alpha).unwrap();
        assert_eq!(state.color, wgpu::BlendState::ALPHA_BLENDING.color);
        assert_eq!(state.alpha, state.color);

        let max = BlendState {
            enabled: true,
            src: BlendFactor::SrcAlpha,
            dst: BlendFactor::Zero,
            equation: BlendEquation::Max,
        };
        let state = blend_state(&max).unwrap();
        assert_eq!(state.color.src_factor, wgpu::BlendFactor::One);
        assert_eq!(state.color.operation, wgpu::BlendOperation::Max);
    }

    #[test]
    fn test_read_write_needs_r32() {
        assert_eq!(
            storage_access(ImageAccess::ReadWrite, wgpu::TextureFormat::R32Float),
            wgpu::StorageTextureAccess::ReadWrite
        );
        assert_eq!(
            storage_access(ImageAccess::ReadWrite, wgpu::TextureFormat::Rgba8Unorm),
            wgpu::StorageTextureAccess::WriteOnly
        );
    }

    #[test]
    fn test_copy_sizes() {
        assert_eq!(copy_size(0), 4);
        assert_eq!(copy_size(6), 8);
        assert_eq!(copy_size(16), 16);
        assert_eq!(padded_bytes_per_row(4), 256);
        assert_eq!(padded_bytes_per_row(512), 512);
    }
}
