/// GpuContext - Shared GPU state for all Vulkan objects
///
/// Contains everything needed for GPU operations:
/// - Device for Vulkan API calls
/// - Allocator for memory management
/// - Queue for command submission
/// - Command pool for one-shot transitions and uploads
/// - Shadow usage tracker and sampler cache
///
/// Every resource, heap and pipeline holds an `Arc<GpuContext>`, so the
/// logical device outlives the last object created from it. The context
/// destroys the device and instance itself when the last reference goes.

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use crossgfx::gfx::Result;
use crossgfx::gfx::render::UsageTracker;
use crossgfx::{gfx_err, gfx_trace};

use crate::vulkan_sampler::SamplerCache;

/// Lock a mutex, turning poisoning into a backend error
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| gfx_err!("crossgfx::vulkan", BackendError, "{} lock poisoned", what))
}

/// Shared GPU context for all Vulkan objects
pub struct GpuContext {
    /// Vulkan logical device
    pub device: ash::Device,

    pub physical_device: vk::PhysicalDevice,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop so it is dropped BEFORE the device is destroyed
    pub allocator: ManuallyDrop<Mutex<Allocator>>,

    /// Graphics queue for command submission
    pub graphics_queue: vk::Queue,

    /// Graphics queue family index
    pub graphics_queue_family: u32,

    /// Reusable command pool for one-shot operations
    /// (created with TRANSIENT + RESET_COMMAND_BUFFER flags)
    pub upload_command_pool: Mutex<vk::CommandPool>,

    /// Serializes vkQueueSubmit / vkQueuePresent / vkQueueWaitIdle
    pub queue_lock: Mutex<()>,

    /// Shadow of the last usage each resource was transitioned into
    pub tracker: UsageTracker,

    /// VkSampler objects, created on first use
    pub(crate) sampler_cache: Mutex<SamplerCache>,

    pub(crate) live_resources: AtomicU64,
    pub(crate) allocated_bytes: AtomicU64,

    /// VK_KHR_swapchain was enabled on the device
    swapchain_supported: bool,

    instance: ash::Instance,

    /// Kept alive for the loader functions of the instance
    #[allow(dead_code)]
    entry: ash::Entry,

    /// Debug utils loader (for validation layers)
    debug_utils_loader: Option<ash::ext::debug_utils::Instance>,

    /// Debug messenger handle
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl GpuContext {
    /// Create a new GPU context
    ///
    /// # Arguments
    ///
    /// * `entry` - Vulkan loader entry
    /// * `instance` - Vulkan instance
    /// * `physical_device` - Selected physical device
    /// * `device` - Vulkan logical device
    /// * `allocator` - GPU memory allocator
    /// * `graphics_queue` - Graphics queue for command submission
    /// * `graphics_queue_family` - Graphics queue family index
    /// * `upload_command_pool` - Command pool for one-shot operations
    /// * `track_usage` - Enable the shadow usage tracker
    /// * `debug` - Debug utils loader and messenger (if validation enabled)
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entry: ash::Entry,
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        allocator: Allocator,
        graphics_queue: vk::Queue,
        graphics_queue_family: u32,
        upload_command_pool: vk::CommandPool,
        track_usage: bool,
        debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    ) -> Self {
        let (debug_utils_loader, debug_messenger) = match debug {
            Some((loader, messenger)) => (Some(loader), Some(messenger)),
            None => (None, None),
        };
        Self {
            device,
            physical_device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            graphics_queue_family,
            upload_command_pool: Mutex::new(upload_command_pool),
            queue_lock: Mutex::new(()),
            tracker: UsageTracker::new(track_usage),
            sampler_cache: Mutex::new(SamplerCache::new()),
            live_resources: AtomicU64::new(0),
            allocated_bytes: AtomicU64::new(0),
            swapchain_supported: false,
            instance,
            entry,
            debug_utils_loader,
            debug_messenger,
        }
    }

    pub(crate) fn with_swapchain_support(mut self, supported: bool) -> Self {
        self.swapchain_supported = supported;
        self
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Whether images may use the `PRESENT_SRC_KHR` layout
    pub fn swapchain_supported(&self) -> bool {
        self.swapchain_supported
    }

    /// Record commands into a temporary command buffer, submit and wait
    ///
    /// Used for initial layout transitions of new images. The command buffer
    /// and fence are released on every path.
    pub fn submit_one_shot<F: FnOnce(vk::CommandBuffer)>(&self, record: F) -> Result<()> {
        let pool = lock(&self.upload_command_pool, "upload command pool")?;
        unsafe {
            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(*pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffer = self
                .device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| {
                    gfx_err!("crossgfx::vulkan", BackendError, "Failed to allocate one-shot command buffer: {:?}", e)
                })?[0];

            let fence = match self.device.create_fence(&vk::FenceCreateInfo::default(), None) {
                Ok(fence) => fence,
                Err(e) => {
                    self.device.free_command_buffers(*pool, &[command_buffer]);
                    return Err(gfx_err!("crossgfx::vulkan", BackendError, "Failed to create one-shot fence: {:?}", e));
                }
            };

            let result = self.record_and_wait(command_buffer, fence, record);

            self.device.destroy_fence(fence, None);
            self.device.free_command_buffers(*pool, &[command_buffer]);
            result
        }
    }

    unsafe fn record_and_wait<F: FnOnce(vk::CommandBuffer)>(
        &self,
        command_buffer: vk::CommandBuffer,
        fence: vk::Fence,
        record: F,
    ) -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        self.device
            .begin_command_buffer(command_buffer, &begin_info)
            .map_err(|e| gfx_err!("crossgfx::vulkan", BackendError, "Failed to begin one-shot command buffer: {:?}", e))?;

        record(command_buffer);

        self.device
            .end_command_buffer(command_buffer)
            .map_err(|e| gfx_err!("crossgfx::vulkan", BackendError, "Failed to end one-shot command buffer: {:?}", e))?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        {
            let _queue = lock(&self.queue_lock, "queue")?;
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], fence)
                .map_err(|e| gfx_err!("crossgfx::vulkan", BackendError, "Failed to submit one-shot commands: {:?}", e))?;
        }

        self.device
            .wait_for_fences(&[fence], true, u64::MAX)
            .map_err(|e| gfx_err!("crossgfx::vulkan", BackendError, "Failed to wait for one-shot fence: {:?}", e))
    }

    pub(crate) fn resource_created(&self, bytes: u64) {
        self.live_resources.fetch_add(1, Ordering::Relaxed);
        self.allocated_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn resource_released(&self, bytes: u64) {
        self.live_resources.fetch_sub(1, Ordering::Relaxed);
        self.allocated_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            // Wait for device to finish
            self.device.device_wait_idle().ok();

            // 1. Destroy cached samplers while the device is alive
            if let Ok(cache) = self.sampler_cache.get_mut() {
                cache.destroy_all(&self.device);
            }

            // 2. Destroy upload command pool
            if let Ok(pool) = self.upload_command_pool.get_mut() {
                if *pool != vk::CommandPool::null() {
                    self.device.destroy_command_pool(*pool, None);
                    *pool = vk::CommandPool::null();
                }
            }

            // 3. Drop allocator: free VkDeviceMemory pages BEFORE destroying device
            ManuallyDrop::drop(&mut self.allocator);

            // 4. Cleanup debug config to prevent callbacks during destruction
            #[cfg(feature = "vulkan-validation")]
            crate::debug::cleanup_debug_config();

            // 5. Destroy debug messenger BEFORE device and instance
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils_loader, &self.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }

            // 6. Destroy device and instance
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
        gfx_trace!("crossgfx::vulkan", "GPU context destroyed");
    }
}
