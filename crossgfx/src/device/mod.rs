/// Device module - backend-independent types and traits of the abstraction layer

pub mod format;
pub mod usage;
pub mod resource;
pub mod descriptor_heap;
pub mod pipeline_state;
pub mod render_target_set;
pub mod vertex_buffers;
pub mod command_list;
pub mod graphics_device;

pub use format::*;
pub use usage::*;
pub use resource::*;
pub use descriptor_heap::*;
pub use pipeline_state::*;
pub use render_target_set::*;
pub use vertex_buffers::*;
pub use command_list::*;
pub use graphics_device::*;
