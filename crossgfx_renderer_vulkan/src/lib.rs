/*!
# crossgfx - Vulkan backend

Vulkan implementation of the crossgfx device abstraction.

This crate implements the `crossgfx` traits using the Ash library for
Vulkan bindings and gpu-allocator for memory management. Rendering uses
Vulkan 1.3 dynamic rendering, so render target sets need no render pass
or framebuffer objects.

```no_run
use crossgfx::gfx::{DeviceConfig, GfxContext};
use crossgfx_renderer_vulkan::VulkanDevice;

let config = DeviceConfig::default();
let gfx = GfxContext::new(VulkanDevice::new_headless(config)?);
let device = gfx.device()?;
# Ok::<(), crossgfx::gfx::Error>(())
```
*/

// Vulkan implementation modules
mod vulkan_context;
mod vulkan_format;
mod vulkan_usage;
mod vulkan_resource;
mod vulkan_sampler;
mod vulkan_descriptor_heap;
mod vulkan_pipeline_state;
mod vulkan_command_list;
mod vulkan_swapchain;
mod vulkan_device;
#[cfg(feature = "vulkan-validation")]
mod debug;

pub use vulkan_context::GpuContext;
pub use vulkan_device::VulkanDevice;
pub use vulkan_swapchain::VulkanSwapchain;
pub use vulkan_command_list::VulkanCommandList;
pub use vulkan_resource::{vulkan_resource, VulkanResource};
pub use vulkan_descriptor_heap::VulkanDescriptorHeap;
pub use vulkan_pipeline_state::VulkanPipelineState;

// Re-export debug utilities
#[cfg(feature = "vulkan-validation")]
pub use debug::{get_validation_stats, print_validation_stats_report};
