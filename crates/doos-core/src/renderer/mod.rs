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

//! Backend-neutral renderer building blocks.
//!
//! Everything a backend needs that does not touch a GPU API lives here: the
//! slot tables behind handles, the resource descriptions, the uniform
//! serialiser, the pipeline caches and the frame throttle.

pub mod api;
pub mod config;
pub mod error;
pub mod handle;
pub mod pipeline_cache;
pub mod sync;
pub mod traits;
pub mod view;

pub use self::api::*;
pub use self::config::{RenderConfig, RendererType};
pub use self::error::{RenderError, RenderResult};
pub use self::handle::{Handle, SlotTable, NO_HANDLE};
pub use self::pipeline_cache::{ComputePipelineCache, PipelineCache, PipelineKey};
pub use self::sync::FrameThrottle;
pub use self::traits::RenderContext;
pub use self::view::ViewState;
