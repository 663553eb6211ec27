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

//! The public facade of the Doos renderer.
//!
//! [`RenderEngine`] picks a backend once, at [`RenderEngine::init`], and then
//! forwards every resource call to it through the [`RenderContext`] trait. It
//! also derives the per-frame camera and projection matrices from a
//! [`ViewState`].

use doos_core::math::Mat4;
use doos_core::math::Vec4;
use doos_core::renderer::{RenderConfig, RendererType};
use doos_core::{RenderContext, RenderError, RenderResult, ViewState};
use doos_infra::{GlRenderContext, GlowApi, WgpuRenderContext};
#[cfg(any(test, feature = "testing"))]
use doos_infra::RecordingGl;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// The types an application needs to drive a [`RenderEngine`].
pub mod prelude {
    pub use doos_core::math::{Mat4, Vec3, Vec4};
    pub use doos_core::renderer::api::*;
    pub use doos_core::renderer::{RenderConfig, RendererType, NO_HANDLE};
    pub use doos_core::{Handle, RenderContext, RenderError, RenderResult, ViewState};

    pub use crate::{RenderDevice, RenderEngine};
}

/// The native device an application hands to [`RenderEngine::init`].
pub enum RenderDevice {
    /// An OpenGL context, current on the rendering thread.
    Gl(GlowApi),
    /// A headless OpenGL stand-in that records every call.
    #[cfg(any(test, feature = "testing"))]
    RecordingGl(RecordingGl),
    /// A `wgpu` device and its queue.
    Wgpu {
        device: wgpu::Device,
        queue: wgpu::Queue,
    },
}

impl fmt::Debug for RenderDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gl(gl) => f.debug_tuple("Gl").field(gl).finish(),
            #[cfg(any(test, feature = "testing"))]
            Self::RecordingGl(_) => f.write_str("RecordingGl"),
            Self::Wgpu { .. } => f.write_str("Wgpu"),
        }
    }
}

impl RenderDevice {
    fn is_gl(&self) -> bool {
        match self {
            Self::Gl(_) => true,
            #[cfg(any(test, feature = "testing"))]
            Self::RecordingGl(_) => true,
            Self::Wgpu { .. } => false,
        }
    }
}

/// Chooses the backend for `renderer` given the supplied device.
fn create_context(
    renderer: RendererType,
    device: Option<RenderDevice>,
    config: RenderConfig,
) -> RenderResult<Box<dyn RenderContext>> {
    let renderer = match (renderer, &device) {
        (RendererType::Auto, Some(RenderDevice::Wgpu { .. })) => RendererType::Wgpu,
        (RendererType::Auto, Some(d)) if d.is_gl() => RendererType::OpenGl,
        (RendererType::Auto, _) => {
            log::error!("RenderEngine: no device supplied for automatic backend selection");
            return Err(RenderError::NoRenderContext);
        }
        (other, _) => other,
    };

    match (renderer, device) {
        (RendererType::OpenGl, Some(RenderDevice::Gl(gl))) => {
            Ok(Box::new(GlRenderContext::new(gl, config)))
        }
        #[cfg(any(test, feature = "testing"))]
        (RendererType::OpenGl, Some(RenderDevice::RecordingGl(gl))) => {
            Ok(Box::new(GlRenderContext::new(gl, config)))
        }
        (RendererType::Wgpu, Some(RenderDevice::Wgpu { device, queue })) => {
            Ok(Box::new(WgpuRenderContext::new(device, queue, config)))
        }
        (RendererType::Wgpu, None) => match WgpuRenderContext::headless(config) {
            Ok(context) => Ok(Box::new(context)),
            Err(e) => {
                log::error!("RenderEngine: wgpu is unavailable: {e:#}");
                Err(RenderError::NoRenderContext)
            }
        },
        (renderer, device) => {
            log::error!("RenderEngine: cannot create a {renderer:?} context from {device:?}");
            Err(RenderError::NoRenderContext)
        }
    }
}

/// Owns one render context and the view state of the current frame.
///
/// Resource and frame calls go straight to the context: the engine
/// dereferences to `dyn RenderContext`.
pub struct RenderEngine {
    context: Box<dyn RenderContext>,
    view: ViewState,
    projection: Mat4,
    camera: Mat4,
    view_project: Mat4,
}

impl fmt::Debug for RenderEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderEngine")
            .field("backend", &self.context.backend())
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

impl RenderEngine {
    /// Creates the context for `renderer`.
    ///
    /// `Auto` picks the command-buffer backend for a `wgpu` device and the
    /// direct-state backend for an OpenGL one. `Wgpu` without a device opens
    /// a headless device on the default adapter.
    ///
    /// ## Errors
    ///
    /// [`RenderError::NoRenderContext`] when the backend is `None`, does not
    /// match the device, or cannot be created.
    pub fn init(
        renderer: RendererType,
        device: Option<RenderDevice>,
        config: RenderConfig,
    ) -> RenderResult<Self> {
        log::info!("RenderEngine: initialising {renderer:?} backend");
        let context = create_context(renderer, device, config)?;
        log::info!("RenderEngine: using {:?}", context.backend());
        Ok(Self::with_context(context))
    }

    /// Creates the backend named by `config.renderer`.
    pub fn from_config(config: RenderConfig, device: Option<RenderDevice>) -> RenderResult<Self> {
        Self::init(config.renderer, device, config)
    }

    /// Wraps a context built by the caller.
    pub fn with_context(context: Box<dyn RenderContext>) -> Self {
        let view = ViewState::default();
        let projection = view.projection();
        Self {
            context,
            view,
            projection,
            camera: Mat4::IDENTITY,
            view_project: projection,
        }
    }

    /// The backend in use.
    pub fn renderer_type(&self) -> RendererType {
        self.context.backend()
    }

    /// The backend context, for calls that need the trait object itself.
    pub fn context(&self) -> &dyn RenderContext {
        self.context.as_ref()
    }

    /// Mutable access to the backend context.
    pub fn context_mut(&mut self) -> &mut dyn RenderContext {
        self.context.as_mut()
    }

    /// Stores the view state of the frame and derives its matrices.
    pub fn set_model_view_properties(&mut self, view: ViewState) {
        self.projection = view.projection();
        self.camera = view.camera_space.invert_orthonormal();
        self.view_project = self.projection * self.camera;
        self.view = view;
        log::trace!("RenderEngine: view state updated");
    }

    /// Projection times the inverse camera transform.
    pub fn view_project(&self) -> Mat4 {
        self.view_project
    }

    /// The projection derived from the last view state.
    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    /// The world-to-camera transform.
    pub fn camera(&self) -> Mat4 {
        self.camera
    }

    /// The camera-to-world transform, as set.
    pub fn camera_space(&self) -> Mat4 {
        self.view.camera_space
    }

    /// The light direction of the last view state.
    pub fn light_dir(&self) -> Vec4 {
        self.view.light_dir
    }

    /// The light position of the last view state.
    pub fn light_pos(&self) -> Vec4 {
        self.view.light_pos
    }

    /// The view state as last passed to [`Self::set_model_view_properties`].
    pub fn model_view_properties(&self) -> &ViewState {
        &self.view
    }
}

impl Deref for RenderEngine {
    type Target = dyn RenderContext;

    fn deref(&self) -> &Self::Target {
        self.context.as_ref()
    }
}

impl DerefMut for RenderEngine {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context.as_mut()
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        if self.context.is_initialized() {
            log::info!("RenderEngine: shutting down");
            self.context.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use doos_core::math::Vec3;

    fn gl_engine() -> RenderEngine {
        RenderEngine::init(
            RendererType::OpenGl,
            Some(RenderDevice::RecordingGl(RecordingGl::new())),
            RenderConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_none_backend_fails() {
        let err = RenderEngine::init(RendererType::None, None, RenderConfig::default());
        assert!(matches!(err, Err(RenderError::NoRenderContext)));
    }

    #[test]
    fn test_gl_needs_a_gl_device() {
        let err = RenderEngine::init(RendererType::OpenGl, None, RenderConfig::default());
        assert!(matches!(err, Err(RenderError::NoRenderContext)));
    }

    #[test]
    fn test_auto_without_device_fails() {
        let err = RenderEngine::init(RendererType::Auto, None, RenderConfig::default());
        assert!(matches!(err, Err(RenderError::NoRenderContext)));
    }

    #[test]
    fn test_auto_picks_gl_for_gl_device() {
        let engine = RenderEngine::init(
            RendererType::Auto,
            Some(RenderDevice::RecordingGl(RecordingGl::new())),
            RenderConfig::default(),
        )
        .unwrap();
        assert_eq!(engine.renderer_type(), RendererType::OpenGl);
        assert!(engine.is_initialized());
    }

    #[test]
    fn test_default_view_uses_identity_camera() {
        let engine = gl_engine();
        assert_eq!(engine.camera(), Mat4::IDENTITY);
        assert_eq!(engine.view_project(), engine.projection());
    }

    #[test]
    fn test_view_project_combines_projection_and_inverse_camera() {
        let mut engine = gl_engine();
        let view = ViewState {
            camera_space: Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)),
            light_dir: Vec4::new(0.0, -1.0, 0.0, 0.0),
            light_pos: Vec4::new(5.0, 5.0, 5.0, 1.0),
            ..ViewState::new(640, 480)
        };
        engine.set_model_view_properties(view);

        let expected =
            view.projection() * Mat4::from_translation(Vec3::new(-1.0, -2.0, -3.0));
        assert_abs_diff_eq!(engine.view_project(), expected, epsilon = 1e-5);
        assert_eq!(engine.camera_space(), view.camera_space);
        assert_eq!(engine.light_dir(), view.light_dir);
        assert_eq!(engine.light_pos(), view.light_pos);
        assert_eq!(engine.model_view_properties().viewport_width, 640);
    }

    #[test]
    fn test_frustum_row_reaches_view_project() {
        let mut engine = gl_engine();
        engine.set_model_view_properties(ViewState::new(1, 1));
        assert_abs_diff_eq!(
            engine.view_project().get_row(3),
            Vec4::new(0.0, 0.0, -1.0, 0.0),
            epsilon = 1e-6
        );
    }
}
