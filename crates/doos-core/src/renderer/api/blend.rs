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

//! Colour blending state applied to the colour attachment.

/// A blend factor. The same factor is used for colour and alpha.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

/// How source and destination terms combine.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendEquation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// The blending state a pipeline is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    /// Whether blending is on.
    pub enabled: bool,
    /// Source factor.
    pub src: BlendFactor,
    /// Destination factor.
    pub dst: BlendFactor,
    /// Combining equation.
    pub equation: BlendEquation,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            enabled: false,
            src: BlendFactor::One,
            dst: BlendFactor::One,
            equation: BlendEquation::Add,
        }
    }
}

impl BlendState {
    /// A stable 32-bit encoding, folded into pipeline cache keys.
    pub fn key(&self) -> u32 {
        u32::from(self.enabled)
            | (self.src as u32) << 1
            | (self.dst as u32) << 5
            | (self.equation as u32) << 9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disabled_one_one_add() {
        let state = BlendState::default();
        assert!(!state.enabled);
        assert_eq!((state.src, state.dst), (BlendFactor::One, BlendFactor::One));
        assert_eq!(state.equation, BlendEquation::Add);
    }

    #[test]
    fn test_keys_differ_per_field() {
        let base = BlendState::default();
        let alpha = BlendState {
            enabled: true,
            src: BlendFactor::SrcAlpha,
            dst: BlendFactor::OneMinusSrcAlpha,
            ..base
        };
        let max = BlendState {
            equation: BlendEquation::Max,
            ..base
        };
        assert_ne!(base.key(), alpha.key());
        assert_ne!(base.key(), max.key());
        assert_ne!(alpha.key(), max.key());
    }
}
