/// VulkanDevice - Vulkan implementation of the GraphicsDevice trait
///
/// Owns the shared `GpuContext`, the submit fences and the backbuffers.
/// A windowed device presents through a `VulkanSwapchain`; a headless one
/// keeps plain images that stand in for swapchain images so the same frame
/// loop runs without a window.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{c_char, CString};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use winit::window::Window;
use crossgfx::gfx::{Backend, DeviceConfig, GraphicsDevice, Result};
use crossgfx::gfx::render::{
    resolve_sampler_entries, resolve_view_entries, BufferDesc, ColorFormat, CommandList,
    CommandListState, DescriptorHeap, DeviceStats, PendingUsage, PipelineState, PipelineStateDesc, Resource,
    ResourceInfo, ResourceUsage, SamplerHeapEntry, TextureDesc, UsageTracker, ViewHeapEntry,
};
use crossgfx::{gfx_bail, gfx_debug, gfx_err, gfx_info, gfx_warn};

use crate::vulkan_command_list::VulkanCommandList;
use crate::vulkan_context::{lock, GpuContext};
use crate::vulkan_descriptor_heap::VulkanDescriptorHeap;
use crate::vulkan_pipeline_state::VulkanPipelineState;
use crate::vulkan_resource::{vulkan_resource, VulkanResource};
use crate::vulkan_swapchain::VulkanSwapchain;

const SOURCE: &str = "crossgfx::vulkan";

/// Submissions that may be in flight before `submit` blocks
const MAX_SUBMITS_IN_FLIGHT: usize = 2;

type DebugMessenger = (ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT);

/// Where backbuffers come from
enum Presentation {
    Swapchain(Mutex<VulkanSwapchain>),
    Headless {
        backbuffers: Vec<Arc<dyn Resource>>,
        next_backbuffer: Mutex<u32>,
    },
}

/// Logical device objects, before they are handed to the `GpuContext`
struct OpenedDevice {
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue_family: u32,
    queue: vk::Queue,
    upload_command_pool: vk::CommandPool,
    allocator: Allocator,
    swapchain_supported: bool,
}

/// Vulkan device implementation
///
/// # Example
///
/// ```no_run
/// use crossgfx::gfx::{DeviceConfig, GraphicsDevice};
/// use crossgfx_renderer_vulkan::VulkanDevice;
///
/// let device = VulkanDevice::new_headless(DeviceConfig::default())?;
/// let list = device.create_command_list()?;
/// # Ok::<(), crossgfx::gfx::Error>(())
/// ```
/// Next submit slot, and which fences guard work still queued
///
/// A fence is waited on only while its slot is in flight, so a failed
/// `vkQueueSubmit` never leaves a fence that nothing will signal.
struct SubmitRing {
    next: usize,
    in_flight: [bool; MAX_SUBMITS_IN_FLIGHT],
}

impl SubmitRing {
    fn new() -> Self {
        Self { next: 0, in_flight: [false; MAX_SUBMITS_IN_FLIGHT] }
    }

    /// Mark the current slot in flight and move to the next one
    fn advance(&mut self) {
        self.in_flight[self.next] = true;
        self.next = (self.next + 1) % MAX_SUBMITS_IN_FLIGHT;
    }
}

pub struct VulkanDevice {
    ctx: Arc<GpuContext>,
    config: DeviceConfig,
    presentation: Presentation,

    /// Round-robin fences throttling `submit`
    submit_fences: Vec<vk::Fence>,
    submit_ring: Mutex<SubmitRing>,

    submissions: AtomicU64,
    frames_presented: AtomicU64,
}

impl VulkanDevice {
    /// Create a device presenting to `window`
    ///
    /// The swapchain takes the window's current inner size; call `resize`
    /// when the window changes.
    pub fn new(window: &Window, config: DeviceConfig) -> Result<Self> {
        let display_handle = window
            .display_handle()
            .map_err(|e| gfx_err!(SOURCE, InitializationFailed, "Failed to get display handle: {}", e))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| gfx_err!(SOURCE, InitializationFailed, "Failed to get window handle: {}", e))?;
        let size = window.inner_size();

        let entry = Self::load_entry()?;
        let surface_extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(|e| gfx_err!(SOURCE, InitializationFailed, "Failed to get required extensions: {}", e))?;

        let (instance, debug) = Self::create_instance(&entry, &config, surface_extensions)?;

        let surface = match unsafe {
            ash_window::create_surface(&entry, &instance, display_handle.as_raw(), window_handle.as_raw(), None)
        } {
            Ok(surface) => surface,
            Err(e) => {
                unsafe { Self::destroy_instance(&instance, debug, None) };
                gfx_bail!(SOURCE, InitializationFailed, "Failed to create surface: {:?}", e);
            }
        };
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        let ctx = Self::create_context(entry, instance, debug, &config, Some((&surface_loader, surface)))?;

        // The swapchain owns the surface from here on, even when it fails
        let swapchain = VulkanSwapchain::new(
            Arc::clone(&ctx),
            surface,
            surface_loader,
            &config,
            size.width,
            size.height,
        )?;

        Self::finish(ctx, config, Presentation::Swapchain(Mutex::new(swapchain)))
    }

    /// Create a device without a window
    ///
    /// Backbuffers are plain images of `config.backbuffer_extent` that rest
    /// in `Present`; presenting one only counts the frame.
    pub fn new_headless(config: DeviceConfig) -> Result<Self> {
        let entry = Self::load_entry()?;
        let (instance, debug) = Self::create_instance(&entry, &config, &[])?;
        let ctx = Self::create_context(entry, instance, debug, &config, None)?;

        let backbuffer_count = if ctx.swapchain_supported() {
            config.backbuffer_count
        } else {
            gfx_warn!(SOURCE, "VK_KHR_swapchain unavailable, headless device has no backbuffers");
            0
        };

        let (width, height) = config.backbuffer_extent;
        let backbuffers = (0..backbuffer_count)
            .map(|_| {
                let resource: Arc<dyn Resource> = VulkanResource::new_image(
                    &ctx,
                    ResourceInfo::backbuffer(config.backbuffer_format, width, height),
                )?;
                Ok(resource)
            })
            .collect::<Result<Vec<_>>>()?;

        Self::finish(
            ctx,
            config,
            Presentation::Headless {
                backbuffers,
                next_backbuffer: Mutex::new(0),
            },
        )
    }

    /// Shared GPU context (device, allocator, queue)
    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    /// Name of the GPU the device runs on
    pub fn gpu_name(&self) -> String {
        let properties = unsafe {
            self.ctx
                .instance()
                .get_physical_device_properties(self.ctx.physical_device)
        };
        properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Backbuffer size in pixels
    pub fn backbuffer_extent(&self) -> Result<(u32, u32)> {
        match &self.presentation {
            Presentation::Swapchain(swapchain) => Ok(lock(swapchain, "swapchain")?.extent()),
            Presentation::Headless { .. } => Ok(self.config.backbuffer_extent),
        }
    }

    /// Format the backbuffers were created with
    pub fn backbuffer_format(&self) -> Result<ColorFormat> {
        match &self.presentation {
            Presentation::Swapchain(swapchain) => Ok(lock(swapchain, "swapchain")?.color_format()),
            Presentation::Headless { .. } => Ok(self.config.backbuffer_format),
        }
    }

    /// Rebuild the swapchain for a new window size
    ///
    /// Previously returned backbuffer resources are replaced; fetch them
    /// again with `backbuffer()`.
    pub fn resize(&self, width: u32, height: u32) -> Result<()> {
        match &self.presentation {
            Presentation::Swapchain(swapchain) => lock(swapchain, "swapchain")?.recreate(width, height),
            Presentation::Headless { .. } => {
                gfx_bail!(SOURCE, InvalidState, "resize: headless device has no swapchain")
            }
        }
    }

    // ===== INITIALIZATION =====

    fn load_entry() -> Result<ash::Entry> {
        unsafe { ash::Entry::load() }
            .map_err(|e| gfx_err!(SOURCE, InitializationFailed, "Failed to load Vulkan library: {:?}", e))
    }

    /// Create the instance and, when validation is on, the debug messenger
    fn create_instance(
        entry: &ash::Entry,
        config: &DeviceConfig,
        required_extensions: &[*const c_char],
    ) -> Result<(ash::Instance, Option<DebugMessenger>)> {
        let app_name = CString::new(config.app_name.as_str()).map_err(|_| {
            gfx_err!(SOURCE, InitializationFailed, "application name {:?} contains a NUL byte", config.app_name)
        })?;
        let (major, minor, patch) = config.app_version;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(c"crossgfx")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let validation = Self::validation_available(entry, config);

        let mut extension_names = required_extensions.to_vec();
        if validation {
            extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
        }
        let layer_names = if validation {
            vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_names)
            .enabled_extension_names(&extension_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(|e| gfx_err!(SOURCE, InitializationFailed, "Failed to create Vulkan instance: {:?}", e))?;

        let debug = if validation {
            match Self::create_debug_messenger(entry, &instance, config) {
                Ok(debug) => debug,
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        gfx_debug!(SOURCE, "Vulkan instance created (validation: {})", validation);
        Ok((instance, debug))
    }

    #[cfg(feature = "vulkan-validation")]
    fn validation_available(entry: &ash::Entry, config: &DeviceConfig) -> bool {
        if !config.enable_validation {
            return false;
        }
        let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        let found = layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str() == Ok(c"VK_LAYER_KHRONOS_validation"));
        if !found {
            gfx_warn!(SOURCE, "VK_LAYER_KHRONOS_validation not installed, continuing without validation");
        }
        found
    }

    #[cfg(not(feature = "vulkan-validation"))]
    fn validation_available(_entry: &ash::Entry, config: &DeviceConfig) -> bool {
        if config.enable_validation {
            gfx_warn!(SOURCE, "validation requested but crossgfx_renderer_vulkan was built without 'vulkan-validation'");
        }
        false
    }

    #[cfg(feature = "vulkan-validation")]
    fn create_debug_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
        config: &DeviceConfig,
    ) -> Result<Option<DebugMessenger>> {
        use crossgfx::gfx::render::DebugSeverity;

        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);
        crate::debug::init_debug_config(config.debug.clone());

        let severity_flags = match config.debug.severity {
            DebugSeverity::ErrorsOnly => vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            DebugSeverity::ErrorsAndWarnings => {
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            }
            DebugSeverity::All => {
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            }
        };

        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(severity_flags)
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&debug_info, None) }
            .map_err(|e| gfx_err!(SOURCE, InitializationFailed, "Failed to create debug messenger: {:?}", e))?;
        Ok(Some((debug_utils, messenger)))
    }

    #[cfg(not(feature = "vulkan-validation"))]
    fn create_debug_messenger(
        _entry: &ash::Entry,
        _instance: &ash::Instance,
        _config: &DeviceConfig,
    ) -> Result<Option<DebugMessenger>> {
        Ok(None)
    }

    /// Tear down an instance whose context was never built
    unsafe fn destroy_instance(
        instance: &ash::Instance,
        debug: Option<DebugMessenger>,
        surface: Option<(&ash::khr::surface::Instance, vk::SurfaceKHR)>,
    ) {
        if let Some((loader, surface)) = surface {
            loader.destroy_surface(surface, None);
        }
        #[cfg(feature = "vulkan-validation")]
        crate::debug::cleanup_debug_config();
        if let Some((debug_utils, messenger)) = debug {
            debug_utils.destroy_debug_utils_messenger(messenger, None);
        }
        instance.destroy_instance(None);
    }

    /// Open the logical device and wrap everything in a `GpuContext`
    ///
    /// On failure the instance (and `surface`, if any) is destroyed.
    fn create_context(
        entry: ash::Entry,
        instance: ash::Instance,
        debug: Option<DebugMessenger>,
        config: &DeviceConfig,
        surface: Option<(&ash::khr::surface::Instance, vk::SurfaceKHR)>,
    ) -> Result<Arc<GpuContext>> {
        let opened = match Self::open_device(&instance, surface) {
            Ok(opened) => opened,
            Err(e) => {
                unsafe { Self::destroy_instance(&instance, debug, surface) };
                return Err(e);
            }
        };

        let ctx = GpuContext::new(
            entry,
            instance,
            opened.physical_device,
            opened.device,
            opened.allocator,
            opened.queue,
            opened.queue_family,
            opened.upload_command_pool,
            config.track_usage,
            debug,
        )
        .with_swapchain_support(opened.swapchain_supported);
        Ok(Arc::new(ctx))
    }

    /// Pick a Vulkan 1.3 GPU whose graphics queue can also present to
    /// `surface`, discrete GPUs first
    fn pick_physical_device(
        instance: &ash::Instance,
        surface: Option<(&ash::khr::surface::Instance, vk::SurfaceKHR)>,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let physical_devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(|e| gfx_err!(SOURCE, InitializationFailed, "Failed to enumerate physical devices: {:?}", e))?;

        let mut candidates = Vec::new();
        for physical_device in physical_devices {
            let properties = unsafe { instance.get_physical_device_properties(physical_device) };
            if properties.api_version < vk::API_VERSION_1_3 {
                continue;
            }

            let queue_families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
            let family = (0..queue_families.len() as u32).find(|&index| {
                let graphics = queue_families[index as usize].queue_flags.contains(vk::QueueFlags::GRAPHICS);
                let presents = match surface {
                    Some((loader, surface)) => unsafe {
                        loader
                            .get_physical_device_surface_support(physical_device, index, surface)
                            .unwrap_or(false)
                    },
                    None => true,
                };
                graphics && presents
            });

            if let Some(family) = family {
                let discrete = properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU;
                let name = properties
                    .device_name_as_c_str()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                candidates.push((discrete, physical_device, family, name));
            }
        }

        // Stable sort keeps enumeration order among equals
        candidates.sort_by_key(|(discrete, ..)| !*discrete);
        match candidates.into_iter().next() {
            Some((_, physical_device, family, name)) => {
                gfx_info!(SOURCE, "Using GPU '{}' (queue family {})", name, family);
                Ok((physical_device, family))
            }
            None => gfx_bail!(
                SOURCE,
                InitializationFailed,
                "No Vulkan 1.3 GPU with a graphics queue{} found",
                if surface.is_some() { " that can present" } else { "" }
            ),
        }
    }

    fn open_device(
        instance: &ash::Instance,
        surface: Option<(&ash::khr::surface::Instance, vk::SurfaceKHR)>,
    ) -> Result<OpenedDevice> {
        let (physical_device, queue_family) = Self::pick_physical_device(instance, surface)?;

        let available_extensions = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .map_err(|e| gfx_err!(SOURCE, InitializationFailed, "Failed to enumerate device extensions: {:?}", e))?;
        let swapchain_supported = available_extensions
            .iter()
            .any(|extension| extension.extension_name_as_c_str() == Ok(ash::khr::swapchain::NAME));
        if surface.is_some() && !swapchain_supported {
            gfx_bail!(SOURCE, InitializationFailed, "GPU does not support VK_KHR_swapchain");
        }

        let device_extension_names: Vec<*const c_char> = if swapchain_supported {
            vec![ash::khr::swapchain::NAME.as_ptr()]
        } else {
            vec![]
        };

        let queue_priorities = [1.0];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)];

        let mut vulkan13_features = vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);
        let mut features = vk::PhysicalDeviceFeatures2::default()
            .features(vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true))
            .push_next(&mut vulkan13_features);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&device_extension_names)
            .push_next(&mut features);

        let device = unsafe { instance.create_device(physical_device, &device_create_info, None) }
            .map_err(|e| gfx_err!(SOURCE, InitializationFailed, "Failed to create logical device: {:?}", e))?;

        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        // Upload command pool (TRANSIENT + RESET for reusable one-shot work)
        let upload_pool_create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let upload_command_pool = match unsafe { device.create_command_pool(&upload_pool_create_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                gfx_bail!(SOURCE, InitializationFailed, "Failed to create upload command pool: {:?}", e);
            }
        };

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe {
                    device.destroy_command_pool(upload_command_pool, None);
                    device.destroy_device(None);
                }
                gfx_bail!(SOURCE, InitializationFailed, "Failed to create GPU allocator: {:?}", e);
            }
        };

        Ok(OpenedDevice {
            physical_device,
            device,
            queue_family,
            queue,
            upload_command_pool,
            allocator,
            swapchain_supported,
        })
    }

    /// Create the submit fences and assemble the device
    fn finish(ctx: Arc<GpuContext>, config: DeviceConfig, presentation: Presentation) -> Result<Self> {
        let fence_create_info = vk::FenceCreateInfo::default();

        let mut submit_fences = Vec::with_capacity(MAX_SUBMITS_IN_FLIGHT);
        for _ in 0..MAX_SUBMITS_IN_FLIGHT {
            match unsafe { ctx.device.create_fence(&fence_create_info, None) } {
                Ok(fence) => submit_fences.push(fence),
                Err(e) => {
                    for fence in submit_fences {
                        unsafe { ctx.device.destroy_fence(fence, None) };
                    }
                    gfx_bail!(SOURCE, InitializationFailed, "Failed to create submit fence: {:?}", e);
                }
            }
        }

        let device = Self {
            ctx,
            config,
            presentation,
            submit_fences,
            submit_ring: Mutex::new(SubmitRing::new()),
            submissions: AtomicU64::new(0),
            frames_presented: AtomicU64::new(0),
        };

        gfx_info!(
            SOURCE,
            "Vulkan device created: {} backbuffer(s), usage tracking {}",
            device.backbuffer_count(),
            if device.config.track_usage { "on" } else { "off" }
        );
        Ok(device)
    }

    // ===== HELPERS =====

    fn allocate_buffer(&self, info: ResourceInfo) -> Result<Arc<dyn Resource>> {
        let resource: Arc<dyn Resource> = VulkanResource::new_buffer(&self.ctx, info)?;
        Ok(resource)
    }

    fn allocate_image(&self, info: ResourceInfo) -> Result<Arc<dyn Resource>> {
        let resource: Arc<dyn Resource> = VulkanResource::new_image(&self.ctx, info)?;
        Ok(resource)
    }

    fn vulkan_list(list: &dyn CommandList) -> Result<&VulkanCommandList> {
        list.as_any().downcast_ref::<VulkanCommandList>().ok_or_else(|| {
            gfx_err!(SOURCE, InvalidResource, "command list was not created by the Vulkan backend")
        })
    }
}

impl GraphicsDevice for VulkanDevice {
    fn backend(&self) -> Backend {
        Backend::Vulkan
    }

    fn config(&self) -> &DeviceConfig {
        &self.config
    }

    fn create_render_target(
        &self,
        format: ColorFormat,
        width: u32,
        height: u32,
        clear_color: [f32; 4],
    ) -> Result<Arc<dyn Resource>> {
        self.allocate_image(ResourceInfo::render_target(format, width, height, clear_color)?)
    }

    fn create_depth_stencil_target(&self, width: u32, height: u32) -> Result<Arc<dyn Resource>> {
        self.allocate_image(ResourceInfo::depth_stencil_target(width, height)?)
    }

    fn create_constant_buffer(&self, size: u64) -> Result<Arc<dyn Resource>> {
        let info = ResourceInfo::constant_buffer(size);
        gfx_debug!(SOURCE, "Constant buffer of {} bytes backed by {} bytes", size, info.size);
        self.allocate_buffer(info)
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn Resource>> {
        self.allocate_buffer(ResourceInfo::linear_buffer(desc)?)
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn Resource>> {
        self.allocate_image(ResourceInfo::sampled_texture(desc)?)
    }

    fn create_view_heap(&self, entries: &[ViewHeapEntry]) -> Result<Arc<dyn DescriptorHeap>> {
        for entry in entries {
            vulkan_resource(entry.resource.as_ref())?;
        }
        let slots = resolve_view_entries(entries)?;
        let resources = entries.iter().map(|entry| Arc::clone(&entry.resource)).collect();
        Ok(Arc::new(VulkanDescriptorHeap::new_view_heap(slots, resources)?))
    }

    fn create_sampler_heap(&self, entries: &[SamplerHeapEntry]) -> Result<Arc<dyn DescriptorHeap>> {
        let slots = resolve_sampler_entries(entries);
        Ok(Arc::new(VulkanDescriptorHeap::new_sampler_heap(&self.ctx, slots)?))
    }

    fn create_pipeline_state(&self, desc: &PipelineStateDesc) -> Result<Arc<dyn PipelineState>> {
        Ok(Arc::new(VulkanPipelineState::new(&self.ctx, desc)?))
    }

    fn create_command_list(&self) -> Result<Box<dyn CommandList>> {
        Ok(Box::new(VulkanCommandList::new(Arc::clone(&self.ctx))?))
    }

    fn submit(&self, command_lists: &[&dyn CommandList]) -> Result<()> {
        let lists = command_lists
            .iter()
            .map(|list| Self::vulkan_list(*list))
            .collect::<Result<Vec<_>>>()?;
        if let Some(index) = lists.iter().position(|list| list.state() != CommandListState::Closed) {
            gfx_bail!(SOURCE, InvalidState, "submit: command list {} is still open", index);
        }

        let command_buffers: Vec<vk::CommandBuffer> = lists.iter().map(|list| list.command_buffer()).collect();

        let mut ring = lock(&self.submit_ring, "submit ring")?;
        let slot = ring.next;
        let fence = self.submit_fences[slot];
        unsafe {
            // Wait for the previous submit that used this fence
            if ring.in_flight[slot] {
                self.ctx
                    .device
                    .wait_for_fences(&[fence], true, u64::MAX)
                    .map_err(|e| gfx_err!(SOURCE, BackendError, "submit: failed to wait for fence: {:?}", e))?;
                ring.in_flight[slot] = false;
            }
            self.ctx
                .device
                .reset_fences(&[fence])
                .map_err(|e| gfx_err!(SOURCE, BackendError, "submit: failed to reset fence: {:?}", e))?;
        }

        let pending: Vec<&PendingUsage> = lists.iter().map(|list| list.pending_usage()).collect();
        self.ctx.tracker.commit(&pending)?;

        unsafe {
            let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
            let _queue = lock(&self.ctx.queue_lock, "queue")?;
            self.ctx
                .device
                .queue_submit(self.ctx.graphics_queue, &[submit_info], fence)
                .map_err(|e| gfx_err!(SOURCE, BackendError, "submit: failed to submit queue: {:?}", e))?;
        }
        ring.advance();

        self.submissions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn wait_for_queue_idle(&self) -> Result<()> {
        let _queue = lock(&self.ctx.queue_lock, "queue")?;
        unsafe { self.ctx.device.queue_wait_idle(self.ctx.graphics_queue) }
            .map_err(|e| gfx_err!(SOURCE, BackendError, "Failed to wait for queue idle: {:?}", e))
    }

    fn backbuffer_count(&self) -> u32 {
        match &self.presentation {
            Presentation::Swapchain(swapchain) => swapchain.lock().map(|s| s.image_count()).unwrap_or(0),
            Presentation::Headless { backbuffers, .. } => backbuffers.len() as u32,
        }
    }

    fn acquire_next_backbuffer(&self) -> Result<u32> {
        match &self.presentation {
            Presentation::Swapchain(swapchain) => lock(swapchain, "swapchain")?.acquire(),
            Presentation::Headless { backbuffers, next_backbuffer } => {
                if backbuffers.is_empty() {
                    gfx_bail!(SOURCE, InvalidState, "device was created without backbuffers");
                }
                let mut next = lock(next_backbuffer, "backbuffer")?;
                let index = *next;
                *next = (index + 1) % backbuffers.len() as u32;
                Ok(index)
            }
        }
    }

    fn backbuffer(&self, index: u32) -> Result<Arc<dyn Resource>> {
        let found = match &self.presentation {
            Presentation::Swapchain(swapchain) => lock(swapchain, "swapchain")?.backbuffer(index).cloned(),
            Presentation::Headless { backbuffers, .. } => backbuffers.get(index as usize).cloned(),
        };
        match found {
            Some(backbuffer) => Ok(backbuffer),
            None => gfx_bail!(
                SOURCE,
                InvalidResource,
                "backbuffer {} out of range ({} backbuffers)",
                index,
                self.backbuffer_count()
            ),
        }
    }

    fn present(&self, index: u32) -> Result<()> {
        let backbuffer = self.backbuffer(index)?;
        self.ctx.tracker.expect(backbuffer.id(), ResourceUsage::Present)?;

        if let Presentation::Swapchain(swapchain) = &self.presentation {
            lock(swapchain, "swapchain")?.present(index)?;
        }
        self.frames_presented.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn usage_tracker(&self) -> &UsageTracker {
        &self.ctx.tracker
    }

    fn stats(&self) -> DeviceStats {
        DeviceStats {
            live_resources: self.ctx.live_resources.load(Ordering::Relaxed),
            allocated_bytes: self.ctx.allocated_bytes.load(Ordering::Relaxed),
            submissions: self.submissions.load(Ordering::Relaxed),
            frames_presented: self.frames_presented.load(Ordering::Relaxed),
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            // Wait for device to finish
            self.ctx.device.device_wait_idle().ok();
        }

        // Swapchain and backbuffers go before the context can
        self.presentation = Presentation::Headless {
            backbuffers: Vec::new(),
            next_backbuffer: Mutex::new(0),
        };

        unsafe {
            for &fence in &self.submit_fences {
                self.ctx.device.destroy_fence(fence, None);
            }
        }
        gfx_debug!(SOURCE, "Vulkan device destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_ring_starts_idle() {
        let ring = SubmitRing::new();
        assert_eq!(ring.next, 0);
        assert!(ring.in_flight.iter().all(|&in_flight| !in_flight));
    }

    #[test]
    fn test_submit_ring_advances_round_robin() {
        let mut ring = SubmitRing::new();
        ring.advance();
        assert_eq!(ring.next, 1);
        assert!(ring.in_flight[0]);

        ring.advance();
        assert_eq!(ring.next, 0);
        assert!(ring.in_flight.iter().all(|&in_flight| in_flight));
    }

    #[test]
    fn test_submit_ring_failed_submit_leaves_slot_idle() {
        let mut ring = SubmitRing::new();
        ring.advance();

        // Submit on slot 1 fails after its fence reset: no advance
        assert_eq!(ring.next, 1);
        assert!(!ring.in_flight[1]);

        // The retry reuses slot 1 without waiting, then moves on
        ring.advance();
        assert_eq!(ring.next, 0);
        assert!(ring.in_flight[0]);
    }
}
