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

//! 32-bit FNV-1a, used to place uniforms and pipelines in their open-addressing tables.

/// FNV-1a offset basis.
pub const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
/// FNV-1a prime.
pub const FNV_PRIME: u32 = 16_777_619;

/// Incremental FNV-1a hasher.
#[derive(Debug, Clone, Copy)]
pub struct Fnv1a {
    state: u32,
}

impl Default for Fnv1a {
    fn default() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }
}

impl Fnv1a {
    /// Creates a hasher at the offset basis.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes.
    pub fn write(&mut self, bytes: &[u8]) -> &mut Self {
        for &b in bytes {
            self.state ^= b as u32;
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
        self
    }

    /// Feeds an `i32` in little-endian byte order.
    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        self.write(&value.to_le_bytes())
    }

    /// Feeds a `u32` in little-endian byte order.
    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.write(&value.to_le_bytes())
    }

    /// Returns the current hash value.
    pub fn finish(&self) -> u32 {
        self.state
    }
}

/// Hashes a byte slice in one call.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    Fnv1a::new().write(bytes).finish()
}
