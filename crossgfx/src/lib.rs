/*!
# crossgfx

Backend-independent resource and command abstraction for 3D renderers.

This crate provides the platform-agnostic API using trait-based dynamic
polymorphism. A backend (Vulkan in `crossgfx_renderer_vulkan`, or the
headless [`software`] device shipped here) is chosen once at startup and
owned by an explicit [`gfx::GfxContext`].

## Architecture

- **GraphicsDevice**: factory for resources, heaps, pipelines and command lists, plus the queue
- **Resource**: one GPU allocation (buffer or texture) with views fixed at creation
- **DescriptorHeap**: immutable table of views or samplers, slot `i` = entry `i`
- **CommandList**: open / record / close / submit state machine
- **RenderTargetSet**: color targets plus optional depth, cleared and bound together
- **PipelineState**: shader bytecode plus root layout

Every operation is synchronous and reports failure through [`gfx::Result`].
*/

// Internal modules
mod error;
mod context;
pub mod log;
pub mod device;
pub mod software;

// Main gfx namespace module
pub mod gfx {
    // Error types
    pub use crate::error::{Error, Result};

    // Device context
    pub use crate::context::GfxContext;

    // Device factory trait and its configuration
    pub use crate::device::{GraphicsDevice, DeviceConfig, DebugConfig, Backend};

    // Logging sub-module (types and registry, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger, set_logger, reset_logger};
    }

    // Render sub-module with all device-level types
    pub mod render {
        pub use crate::device::*;
    }
}
