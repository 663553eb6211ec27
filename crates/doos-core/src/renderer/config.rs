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

//! Runtime configuration of the render contexts.

use serde::{Deserialize, Serialize};

/// Environment variable turning strict uniform resolution on.
pub const ENV_STRICT_UNIFORMS: &str = "DOOS_STRICT_UNIFORMS";
/// Environment variable turning driver error polling on.
pub const ENV_CHECK_GL_ERRORS: &str = "DOOS_CHECK_GL_ERRORS";

/// Which backend the engine should create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererType {
    /// The command-buffer backend when a device is supplied, else OpenGL.
    #[default]
    Auto,
    /// The direct-state backend.
    OpenGl,
    /// The command-buffer backend.
    Wgpu,
    /// No backend; initialisation fails.
    None,
}

/// Settings shared by both backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Binding a uniform the program does not declare is an error instead
    /// of being ignored.
    pub strict_uniforms: bool,
    /// Poll the driver's error queue after state-changing calls.
    pub check_driver_errors: bool,
    /// Initial size of the per-frame uniform arena of the command-buffer backend.
    pub uniform_arena_bytes: u64,
    /// Requested backend.
    pub renderer: RendererType,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            strict_uniforms: false,
            check_driver_errors: cfg!(debug_assertions),
            uniform_arena_bytes: 1 << 20,
            renderer: RendererType::Auto,
        }
    }
}

impl RenderConfig {
    /// Parses a JSON document. Missing fields take their default.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The defaults, overridden by `DOOS_STRICT_UNIFORMS` and `DOOS_CHECK_GL_ERRORS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`RenderConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(value) = lookup(ENV_STRICT_UNIFORMS).and_then(|v| parse_flag(&v)) {
            config.strict_uniforms = value;
        }
        if let Some(value) = lookup(ENV_CHECK_GL_ERRORS).and_then(|v| parse_flag(&v)) {
            config.check_driver_errors = value;
        }
        config
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            log::warn!("Ignoring unrecognised flag value '{}'", other);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_partial_document() {
        let config =
            RenderConfig::from_json_str(r#"{ "strict_uniforms": true, "renderer": "wgpu" }"#)
                .unwrap();
        assert!(config.strict_uniforms);
        assert_eq!(config.renderer, RendererType::Wgpu);
        assert_eq!(config.uniform_arena_bytes, 1 << 20);
    }

    #[test]
    fn test_json_round_trip() {
        let config = RenderConfig {
            renderer: RendererType::OpenGl,
            ..RenderConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"open_gl\""));
        assert_eq!(RenderConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_environment_overrides() {
        let config = RenderConfig::from_lookup(|key| match key {
            ENV_STRICT_UNIFORMS => Some("yes".into()),
            ENV_CHECK_GL_ERRORS => Some("0".into()),
            _ => None,
        });
        assert!(config.strict_uniforms);
        assert!(!config.check_driver_errors);

        let untouched = RenderConfig::from_lookup(|_| Some("maybe".into()));
        assert_eq!(untouched, RenderConfig::default());
    }
}
