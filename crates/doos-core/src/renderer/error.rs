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

//! The error type of the render contexts.
//!
//! Only failures a caller cannot recover from by retrying surface here.
//! Exhausted tables answer with `-1` and unknown handles are ignored, so
//! neither has a variant.

use crate::renderer::handle::Handle;
use std::fmt;
use std::panic::Location;

/// A fatal failure reported by a render context.
#[derive(Debug)]
pub enum RenderError {
    /// A shader failed to compile.
    ShaderCompilation {
        /// The name the shader was registered under.
        name: String,
        /// The compiler's log.
        log: String,
    },
    /// A program failed to link.
    ProgramLink {
        /// The program handle.
        program: Handle,
        /// The linker's log.
        log: String,
    },
    /// The driver reported an error after a call.
    Driver {
        /// The raw error code.
        code: u32,
        /// A readable name for the code.
        message: &'static str,
        /// Source file of the failing call.
        file: &'static str,
        /// Source line of the failing call.
        line: u32,
    },
    /// A table that has no `-1` answer ran out of slots.
    OutOfMemory {
        /// What was being allocated.
        what: &'static str,
    },
    /// A framebuffer is not complete after its attachments were set.
    IncompleteFrameBuffer {
        /// The completeness status reported by the driver.
        status: u32,
    },
    /// A uniform name does not resolve in the bound program (strict mode only).
    UnresolvedUniform {
        /// The uniform name.
        name: String,
    },
    /// `frame_begin` was called while a frame is still open.
    FrameInProgress,
    /// `frame_end` was called without an open frame.
    NoFrameInProgress,
    /// No render context could be created for the requested backend.
    NoRenderContext,
    /// Any other backend failure.
    Backend(String),
}

impl RenderError {
    /// Builds a [`RenderError::Driver`] located at the caller.
    #[track_caller]
    pub fn driver(code: u32, message: &'static str) -> Self {
        let location = Location::caller();
        RenderError::Driver {
            code,
            message,
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::ShaderCompilation { name, log } => {
                write!(f, "Shader compilation failed for '{name}': {log}")
            }
            RenderError::ProgramLink { program, log } => {
                write!(f, "Program {program} failed to link: {log}")
            }
            RenderError::Driver {
                code,
                message,
                file,
                line,
            } => write!(f, "{message} ({code:#06x}) | {file} ({line})"),
            RenderError::OutOfMemory { what } => write!(f, "Out of memory: no slot for {what}"),
            RenderError::IncompleteFrameBuffer { status } => {
                write!(f, "Framebuffer incomplete (status {status:#06x})")
            }
            RenderError::UnresolvedUniform { name } => {
                write!(f, "Uniform '{name}' is not active in the bound program")
            }
            RenderError::FrameInProgress => write!(f, "frame_begin called inside an open frame"),
            RenderError::NoFrameInProgress => write!(f, "frame_end called without an open frame"),
            RenderError::NoRenderContext => write!(f, "No render context!"),
            RenderError::Backend(msg) => write!(f, "Backend error: {msg}"),
        }
    }
}

impl std::error::Error for RenderError {}

/// Result alias used by every fallible render-context operation.
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_records_caller_location() {
        let err = RenderError::driver(0x0502, "INVALID_OPERATION");
        match &err {
            RenderError::Driver { file, line, .. } => {
                assert!(file.ends_with("error.rs"));
                assert!(*line > 0);
            }
            other => panic!("unexpected variant {other:?}"),
        }
        assert!(err.to_string().starts_with("INVALID_OPERATION (0x0502)"));
    }

    #[test]
    fn test_messages() {
        assert_eq!(RenderError::NoRenderContext.to_string(), "No render context!");
        let err = RenderError::ShaderCompilation {
            name: "blit.vs".into(),
            log: "0:1: syntax error".into(),
        };
        assert_eq!(
            err.to_string(),
            "Shader compilation failed for 'blit.vs': 0:1: syntax error"
        );
    }
}
