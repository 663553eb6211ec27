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

//! Shader and program records.

use crate::renderer::handle::{Handle, MAX_SHADERS, NO_HANDLE};

/// The stage a shader runs in. The discriminants are the public integer codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ShaderStage {
    /// Vertex stage.
    Vertex = 1,
    /// Fragment stage.
    Fragment = 2,
    /// Compute stage.
    Compute = 3,
}

impl ShaderStage {
    /// Maps the public integer code to a stage.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Vertex),
            2 => Some(Self::Fragment),
            3 => Some(Self::Compute),
            _ => None,
        }
    }
}

/// A shader table entry. `N` is the backend's compiled object.
#[derive(Debug)]
pub struct ShaderRecord<N> {
    /// The stage.
    pub stage: ShaderStage,
    /// The interning key.
    pub name: String,
    /// Whether compilation succeeded.
    pub compiled: bool,
    /// The native object.
    pub native: N,
}

/// A program table entry. `N` is the backend's linked object, if it has one.
#[derive(Debug, Clone)]
pub struct ProgramRecord<N> {
    /// Vertex shader handle, or [`NO_HANDLE`].
    pub vs: Handle,
    /// Fragment shader handle, or [`NO_HANDLE`].
    pub fs: Handle,
    /// Compute shader handle, or [`NO_HANDLE`].
    pub cs: Handle,
    /// Whether the program can be bound.
    pub linked: bool,
    /// The native object.
    pub native: N,
}

impl<N> ProgramRecord<N> {
    /// `true` for a compute program.
    pub fn is_compute(&self) -> bool {
        self.cs >= 0
    }

    /// `true` if the program references `shader` in any stage.
    pub fn references(&self, shader: Handle) -> bool {
        shader >= 0 && (self.vs == shader || self.fs == shader || self.cs == shader)
    }

    /// `true` if the program was built from exactly this shader triple.
    pub fn matches(&self, vs: Handle, fs: Handle, cs: Handle) -> bool {
        self.vs == vs && self.fs == fs && self.cs == cs
    }
}

/// Validates the shader triple passed to `add_program`.
///
/// A program needs either a vertex and a fragment shader, or a compute shader.
/// Handles outside the shader table are rejected. A missing stage is passed as
/// [`NO_HANDLE`].
pub fn program_triple_is_valid(vs: Handle, fs: Handle, cs: Handle) -> bool {
    let in_range = |h: Handle| h < MAX_SHADERS as Handle && h >= NO_HANDLE;
    if !(in_range(vs) && in_range(fs) && in_range(cs)) {
        return false;
    }
    let graphics = vs >= 0 && fs >= 0;
    let compute = cs >= 0;
    graphics || compute
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_triples() {
        assert!(program_triple_is_valid(0, 1, NO_HANDLE));
        assert!(program_triple_is_valid(NO_HANDLE, NO_HANDLE, 4));
        assert!(!program_triple_is_valid(0, NO_HANDLE, NO_HANDLE));
        assert!(!program_triple_is_valid(NO_HANDLE, NO_HANDLE, NO_HANDLE));
        assert!(!program_triple_is_valid(0, MAX_SHADERS as Handle, NO_HANDLE));
        assert!(!program_triple_is_valid(0, 1, -2));
    }

    #[test]
    fn test_references() {
        let program = ProgramRecord {
            vs: 2,
            fs: 5,
            cs: NO_HANDLE,
            linked: true,
            native: (),
        };
        assert!(program.references(5));
        assert!(!program.references(NO_HANDLE));
        assert!(!program.is_compute());
        assert!(program.matches(2, 5, NO_HANDLE));
    }

    #[test]
    fn test_stage_codes() {
        assert_eq!(ShaderStage::from_code(3), Some(ShaderStage::Compute));
        assert_eq!(ShaderStage::from_code(0), None);
    }
}
