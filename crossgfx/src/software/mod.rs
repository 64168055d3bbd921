/// Software backend - headless CPU implementation of the device traits
///
/// Command lists record into a command vector and are executed in order when
/// submitted, so the queue is always idle once `submit` returns. Barriers are
/// applied to a per-resource usage label; clears and copies touch real
/// memory; draws are validated and counted but not rasterized.

mod software_resource;
mod software_heap;
mod software_pipeline;
mod software_command_list;
mod software_device;

pub use software_resource::{SoftwareResource, software_resource};
pub use software_heap::{SoftwareDescriptorHeap, VIEW_DESCRIPTOR_SIZE, SAMPLER_DESCRIPTOR_SIZE};
pub use software_pipeline::SoftwarePipelineState;
pub use software_command_list::{SoftwareCommandList, RecordedCommand};
pub use software_device::SoftwareDevice;
