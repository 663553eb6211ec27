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

//! The direct-state backend.
//!
//! [`GlRenderContext`] issues its calls through the [`GlApi`] trait.
//! [`GlowApi`] forwards them to a live `glow` context. With the `testing`
//! feature, `RecordingGl` records them for headless use.

mod api;
mod context;
mod conversions;
mod glow_api;
#[cfg(any(test, feature = "testing"))]
mod recording;

pub use self::api::{GlApi, GlName};
pub use self::context::GlRenderContext;
pub use self::glow_api::GlowApi;
#[cfg(any(test, feature = "testing"))]
pub use self::recording::{GlCall, RecordingGl};
