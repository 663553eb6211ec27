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

//! Texture formats, usage and sampler flags, and the CPU-side texel conversions
//! shared by both backends.

use crate::doos_bitflags;

/// The pixel formats a texture can be created with.
///
/// The discriminants are the stable integer codes of the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TextureFormat {
    /// No format. Only meaningful as a placeholder.
    None = 0,
    /// 8-bit normalized RGBA.
    Rgba8 = 1,
    /// 32-bit float RGBA.
    Rgba32f = 2,
    /// 8-bit normalized BGRA. The usual swap-chain format.
    Bgra8 = 3,
    /// 8-bit unsigned integer RGBA.
    Rgba8ui = 4,
    /// 32-bit unsigned integer, single channel.
    R32ui = 5,
    /// 32-bit signed integer, single channel.
    R32i = 6,
    /// 32-bit float, single channel.
    R32f = 7,
    /// 8-bit unsigned integer, single channel.
    R8ui = 8,
    /// 8-bit signed integer, single channel.
    R8i = 9,
    /// 16-bit normalized RGBA.
    Rgba16 = 10,
    /// Depth attachment.
    Depth = 11,
}

impl TextureFormat {
    /// Maps an integer code back to a format.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::None,
            1 => Self::Rgba8,
            2 => Self::Rgba32f,
            3 => Self::Bgra8,
            4 => Self::Rgba8ui,
            5 => Self::R32ui,
            6 => Self::R32i,
            7 => Self::R32f,
            8 => Self::R8ui,
            9 => Self::R8i,
            10 => Self::Rgba16,
            11 => Self::Depth,
            _ => return None,
        })
    }

    /// The integer code of the format.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Bytes one texel occupies in the payload produced by [`pack_texels`].
    pub fn storage_bytes_per_texel(self) -> usize {
        match self {
            Self::Rgba8 | Self::Bgra8 | Self::Rgba8ui => 4,
            Self::Rgba32f => 16,
            Self::Rgba16 => 8,
            Self::R32ui | Self::R32i | Self::R32f | Self::Depth => 4,
            Self::R8ui | Self::R8i => 1,
            Self::None => 0,
        }
    }

    /// Bytes one texel occupies in the buffer filled by a texture readback.
    ///
    /// `Rgba32f` is narrowed to 8-bit RGBA on readback. `None` marks formats
    /// that cannot be read back.
    pub fn readback_bytes_per_texel(self) -> Option<usize> {
        match self {
            Self::Rgba8 | Self::Bgra8 | Self::Rgba8ui | Self::Rgba32f => Some(4),
            Self::Rgba16 => Some(8),
            Self::R32ui | Self::R32i | Self::R32f => Some(4),
            Self::R8ui | Self::R8i => Some(1),
            Self::Depth | Self::None => None,
        }
    }

    /// `true` for formats whose shader-visible values are integers.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Rgba8ui | Self::R32ui | Self::R32i | Self::R8ui | Self::R8i
        )
    }

    /// `true` for the depth format.
    pub fn is_depth(self) -> bool {
        self == Self::Depth
    }
}

doos_bitflags! {
    /// How a texture may be accessed.
    pub struct TextureUsage: i32 {
        /// Sampled or read from shaders.
        const READ = 1;
        /// Written from compute shaders.
        const WRITE = 2;
        /// Usable as a colour or depth attachment.
        const RENDER_TARGET = 4;
    }
}

doos_bitflags! {
    /// Wrap and filter modes applied when a texture is bound to a channel.
    pub struct SamplerFlags: i32 {
        /// Wrap coordinates by repetition.
        const REPEAT = 1;
        /// Clamp coordinates to the edge texels.
        const CLAMP = 2;
        /// Nearest-texel filtering.
        const NEAREST = 4;
        /// Bilinear filtering.
        const LINEAR = 8;
        /// Trilinear filtering across mip levels.
        const LINEAR_MIPMAP_LINEAR = 16;
        /// Image binding may be written.
        const WRITE = 32;
    }
}

impl SamplerFlags {
    /// Resolved wrap mode: clamp wins over repeat when both are raised.
    pub fn clamps(self) -> bool {
        self.contains(Self::CLAMP)
    }

    /// Resolved filter mode, nearest first, then trilinear, then bilinear.
    pub fn filter(self) -> TextureFilter {
        if self.contains(Self::NEAREST) {
            TextureFilter::Nearest
        } else if self.contains(Self::LINEAR_MIPMAP_LINEAR) {
            TextureFilter::LinearMipmapLinear
        } else {
            TextureFilter::Linear
        }
    }
}

/// The filter a sampler resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    /// Nearest texel.
    Nearest,
    /// Bilinear.
    Linear,
    /// Trilinear.
    LinearMipmapLinear,
}

/// Whether a shader may read, write or do both through an image binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageAccess {
    /// Read only.
    ReadOnly,
    /// Write only.
    WriteOnly,
    /// Read and write.
    ReadWrite,
}

/// Derives the image access of a texture bound for compute.
///
/// Bind flags without [`SamplerFlags::WRITE`] give a read-only binding.
/// Otherwise a texture lacking [`TextureUsage::READ`] is write-only.
pub fn image_access(usage: TextureUsage, flags: SamplerFlags) -> ImageAccess {
    if !flags.contains(SamplerFlags::WRITE) {
        ImageAccess::ReadOnly
    } else if !usage.contains(TextureUsage::READ) {
        ImageAccess::WriteOnly
    } else {
        ImageAccess::ReadWrite
    }
}

/// The dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    /// A single 2D image.
    D2,
    /// Six square faces.
    Cube,
}

/// The public view of a texture record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    /// Width in texels.
    pub width: i32,
    /// Height in texels.
    pub height: i32,
    /// Pixel format.
    pub format: TextureFormat,
    /// Allowed accesses.
    pub usage: TextureUsage,
    /// 2D or cube.
    pub target: TextureTarget,
}

impl TextureInfo {
    /// Number of texels in one face.
    pub fn texel_count(&self) -> usize {
        self.width.max(0) as usize * self.height.max(0) as usize
    }
}

/// Caller-supplied texel data.
///
/// Each variant is interpreted according to the destination format; see
/// [`pack_texels`] for the accepted combinations.
#[derive(Debug, Clone, Copy)]
pub enum TextureData<'a> {
    /// 8-bit channels, already in the destination layout.
    Bytes(&'a [u8]),
    /// 16-bit channels, four per texel.
    Words(&'a [u16]),
    /// 32-bit float channels.
    Floats(&'a [f32]),
    /// One 64-bit word per texel for the single-channel formats.
    Wide(&'a [u64]),
}

/// The six faces of a cube texture, each a full `w × h` 8-bit RGBA image.
#[derive(Debug, Clone, Copy)]
pub struct CubeFaces<'a> {
    /// +Z face.
    pub front: &'a [u8],
    /// -Z face.
    pub back: &'a [u8],
    /// -X face.
    pub left: &'a [u8],
    /// +X face.
    pub right: &'a [u8],
    /// +Y face.
    pub top: &'a [u8],
    /// -Y face.
    pub bottom: &'a [u8],
}

impl<'a> CubeFaces<'a> {
    /// Faces in array-layer order: right, left, top, bottom, front, back.
    pub fn in_layer_order(&self) -> [&'a [u8]; 6] {
        [
            self.right,
            self.left,
            self.top,
            self.bottom,
            self.front,
            self.back,
        ]
    }
}

/// Converts caller data into the upload payload of `format`.
///
/// ## Returns
///
/// The packed bytes, or `None` when the data kind does not apply to the
/// format or holds fewer than `w × h` texels.
pub fn pack_texels(
    format: TextureFormat,
    width: i32,
    height: i32,
    data: TextureData<'_>,
) -> Option<Vec<u8>> {
    use TextureFormat as F;
    let texels = width.max(0) as usize * height.max(0) as usize;

    match (format, data) {
        (F::Rgba8 | F::Bgra8 | F::Rgba8ui, TextureData::Bytes(src)) => {
            src.get(..texels * 4).map(<[u8]>::to_vec)
        }
        (F::R8ui | F::R8i, TextureData::Bytes(src)) => src.get(..texels).map(<[u8]>::to_vec),
        (F::Rgba8 | F::Rgba8ui, TextureData::Words(src)) => {
            let src = src.get(..texels * 4)?;
            Some(src.iter().map(|&s| ((s >> 7) & 0xff) as u8).collect())
        }
        (F::Rgba16, TextureData::Words(src)) => {
            let src = src.get(..texels * 4)?;
            Some(
                src.iter()
                    .flat_map(|&s| ((s & 0x7fff) * 2).to_le_bytes())
                    .collect(),
            )
        }
        (F::Rgba32f, TextureData::Words(src)) => {
            let src = src.get(..texels * 4)?;
            Some(
                src.iter()
                    .flat_map(|&s| (((s >> 7) & 0xff) as f32 / 255.0).to_le_bytes())
                    .collect(),
            )
        }
        (F::Rgba32f, TextureData::Floats(src)) => {
            src.get(..texels * 4).map(|s| bytemuck::cast_slice(s).to_vec())
        }
        (F::R32f, TextureData::Floats(src)) => {
            src.get(..texels).map(|s| bytemuck::cast_slice(s).to_vec())
        }
        // The low 32 bits keep their bit pattern, which is also the f32 reinterpretation.
        (F::R32ui | F::R32i | F::R32f, TextureData::Wide(src)) => {
            let src = src.get(..texels)?;
            Some(src.iter().flat_map(|&s| (s as u32).to_le_bytes()).collect())
        }
        (F::R8ui | F::R8i, TextureData::Wide(src)) => {
            let src = src.get(..texels)?;
            Some(src.iter().map(|&s| (s & 0xff) as u8).collect())
        }
        _ => None,
    }
}

/// Narrows float RGBA texels to 8-bit RGBA, clamping to `[0, 1]`.
pub fn narrow_rgba32f(src: &[f32], dst: &mut [u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d = (s.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_codes_round_trip() {
        for code in 0..=11 {
            let format = TextureFormat::from_code(code).expect("known code");
            assert_eq!(format.code(), code);
        }
        assert!(TextureFormat::from_code(12).is_none());
        assert!(TextureFormat::from_code(-1).is_none());
    }

    #[test]
    fn test_words_to_rgba8_keep_high_bits() {
        let words = [0x7fff, 0x0080, 0x0000, 0xffff];
        let packed = pack_texels(TextureFormat::Rgba8, 1, 1, TextureData::Words(&words)).unwrap();
        assert_eq!(packed, vec![0xff, 0x01, 0x00, 0xff]);
    }

    #[test]
    fn test_words_to_rgba16_double_the_low_15_bits() {
        let words = [0x0001, 0x7fff, 0x8003, 0];
        let packed = pack_texels(TextureFormat::Rgba16, 1, 1, TextureData::Words(&words)).unwrap();
        let out: Vec<u16> = packed
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(out, vec![2, 0xfffe, 6, 0]);
    }

    #[test]
    fn test_words_to_rgba32f() {
        let words = [0x7f80, 0, 0, 0];
        let packed = pack_texels(TextureFormat::Rgba32f, 1, 1, TextureData::Words(&words)).unwrap();
        let floats: &[f32] = bytemuck::cast_slice(&packed);
        approx::assert_abs_diff_eq!(floats[0], 1.0);
        assert_eq!(floats[1], 0.0);
    }

    #[test]
    fn test_wide_truncations() {
        let wide = [0x1234_5678_9abc_def0_u64, 0x3f80_0000];
        let r32 = pack_texels(TextureFormat::R32ui, 2, 1, TextureData::Wide(&wide)).unwrap();
        assert_eq!(&r32[..4], &0x9abc_def0_u32.to_le_bytes());

        let r32f = pack_texels(TextureFormat::R32f, 2, 1, TextureData::Wide(&wide)).unwrap();
        assert_eq!(f32::from_le_bytes([r32f[4], r32f[5], r32f[6], r32f[7]]), 1.0);

        let r8 = pack_texels(TextureFormat::R8i, 2, 1, TextureData::Wide(&wide)).unwrap();
        assert_eq!(r8, vec![0xf0, 0x00]);
    }

    #[test]
    fn test_incompatible_or_short_data_is_rejected() {
        assert!(pack_texels(TextureFormat::R32ui, 1, 1, TextureData::Bytes(&[1, 2, 3, 4])).is_none());
        assert!(pack_texels(TextureFormat::Rgba8, 2, 2, TextureData::Bytes(&[0; 15])).is_none());
        assert!(pack_texels(TextureFormat::Depth, 1, 1, TextureData::Floats(&[1.0])).is_none());
    }

    #[test]
    fn test_sampler_resolution() {
        assert!((SamplerFlags::REPEAT | SamplerFlags::CLAMP).clamps());
        assert_eq!(
            (SamplerFlags::NEAREST | SamplerFlags::LINEAR).filter(),
            TextureFilter::Nearest
        );
        assert_eq!(SamplerFlags::REPEAT.filter(), TextureFilter::Linear);
        assert_eq!(
            SamplerFlags::LINEAR_MIPMAP_LINEAR.filter(),
            TextureFilter::LinearMipmapLinear
        );
    }

    #[test]
    fn test_image_access() {
        let rw = TextureUsage::READ | TextureUsage::WRITE;
        assert_eq!(image_access(TextureUsage::WRITE, SamplerFlags::WRITE), ImageAccess::WriteOnly);
        assert_eq!(image_access(TextureUsage::WRITE, SamplerFlags::LINEAR), ImageAccess::ReadOnly);
        assert_eq!(image_access(rw, SamplerFlags::LINEAR), ImageAccess::ReadOnly);
        assert_eq!(image_access(rw, SamplerFlags::WRITE), ImageAccess::ReadWrite);
    }

    #[test]
    fn test_cube_layer_order() {
        let (f, b, l, r, t, d) = ([0u8], [1u8], [2u8], [3u8], [4u8], [5u8]);
        let faces = CubeFaces {
            front: &f,
            back: &b,
            left: &l,
            right: &r,
            top: &t,
            bottom: &d,
        };
        let order: Vec<u8> = faces.in_layer_order().iter().map(|s| s[0]).collect();
        assert_eq!(order, vec![3, 2, 4, 5, 0, 1]);
    }
}
