/// VulkanSwapchain - window presentation for a Vulkan device
///
/// Swapchain images are exposed as backbuffer resources that rest in the
/// `Present` usage. Acquire waits on a fence, so the returned image is ready
/// for recording; the first acquire of each image also moves it out of
/// `UNDEFINED`, which is not allowed before the image is acquired. Present first submits an empty batch that signals the
/// image's semaphore: its signal is ordered after everything submitted
/// earlier on the queue.

use ash::vk;
use std::sync::Arc;
use crossgfx::gfx::{DeviceConfig, Result};
use crossgfx::gfx::render::{ColorFormat, Resource, ResourceInfo};
use crossgfx::{gfx_bail, gfx_debug, gfx_err, gfx_info, gfx_warn};

use crate::vulkan_context::{lock, GpuContext};
use crate::vulkan_format::{color_format_to_vk, vk_format_to_color_format};
use crate::vulkan_resource::{image_usage_flags, vulkan_resource, VulkanResource};

const SOURCE: &str = "crossgfx::vulkan::Swapchain";

/// Present mode for the requested vsync behavior
///
/// FIFO is the only mode every implementation supports.
pub(crate) fn choose_present_mode(vsync: bool, available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Requested image count clamped to the surface limits (max 0 = unbounded)
pub(crate) fn choose_image_count(requested: u32, min: u32, max: u32) -> u32 {
    let count = requested.max(min);
    if max > 0 {
        count.min(max)
    } else {
        count
    }
}

/// Surface extent, or the window size clamped to the limits when the
/// surface lets the swapchain decide
pub(crate) fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Surface format matching `preferred`, else the first one crossgfx can express
pub(crate) fn choose_surface_format(
    preferred: ColorFormat,
    available: &[vk::SurfaceFormatKHR],
) -> Option<(vk::SurfaceFormatKHR, ColorFormat)> {
    let wanted = color_format_to_vk(preferred);
    if let Some(format) = available.iter().find(|f| f.format == wanted) {
        return Some((*format, preferred));
    }
    available
        .iter()
        .find_map(|f| vk_format_to_color_format(f.format).map(|color| (*f, color)))
}

/// True until image `index` has been acquired once since the last rebuild
pub(crate) fn is_first_acquire(initialized: &[bool], index: u32) -> bool {
    initialized.get(index as usize).is_some_and(|done| !done)
}

/// Vulkan swapchain implementation
pub struct VulkanSwapchain {
    ctx: Arc<GpuContext>,

    /// Surface
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,

    /// Swapchain
    swapchain: vk::SwapchainKHR,
    swapchain_loader: ash::khr::swapchain::Device,
    surface_format: vk::SurfaceFormatKHR,
    color_format: ColorFormat,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    requested_image_count: u32,

    /// Swapchain images wrapped as resources
    backbuffers: Vec<Arc<dyn Resource>>,
    /// Per image: already moved into `PRESENT_SRC` by a first acquire
    initialized: Vec<bool>,

    /// Signaled by vkAcquireNextImageKHR
    acquire_fence: vk::Fence,
    /// One per swapchain image, waited on by present
    present_semaphores: Vec<vk::Semaphore>,

    /// Last acquire or present reported a stale swapchain
    out_of_date: bool,
}

impl VulkanSwapchain {
    /// Create a swapchain for `surface`
    ///
    /// # Arguments
    ///
    /// * `ctx` - Shared GPU context
    /// * `surface` - Window surface (owned by the swapchain from now on)
    /// * `surface_loader` - Surface loader
    /// * `config` - Device config (image count, format, vsync)
    /// * `width`, `height` - Window size in pixels
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        config: &DeviceConfig,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(ctx.instance(), &ctx.device);

        let (surface_formats, present_modes) = unsafe {
            let formats = surface_loader
                .get_physical_device_surface_formats(ctx.physical_device, surface)
                .map_err(|e| gfx_err!(SOURCE, InitializationFailed, "Failed to query surface formats: {:?}", e));
            let modes = surface_loader
                .get_physical_device_surface_present_modes(ctx.physical_device, surface)
                .map_err(|e| gfx_err!(SOURCE, InitializationFailed, "Failed to query present modes: {:?}", e));
            match (formats, modes) {
                (Ok(formats), Ok(modes)) => (formats, modes),
                (Err(e), _) | (_, Err(e)) => {
                    surface_loader.destroy_surface(surface, None);
                    return Err(e);
                }
            }
        };

        let (surface_format, color_format) = match choose_surface_format(config.backbuffer_format, &surface_formats) {
            Some(choice) => choice,
            None => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                gfx_bail!(SOURCE, InitializationFailed, "surface exposes no supported color format");
            }
        };
        if color_format != config.backbuffer_format {
            gfx_warn!(
                SOURCE,
                "Backbuffer format {:?} unsupported by the surface, using {:?}",
                config.backbuffer_format,
                color_format
            );
        }

        let acquire_fence = match unsafe { ctx.device.create_fence(&vk::FenceCreateInfo::default(), None) } {
            Ok(fence) => fence,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                gfx_bail!(SOURCE, InitializationFailed, "Failed to create acquire fence: {:?}", e);
            }
        };

        let mut swapchain = Self {
            ctx,
            surface,
            surface_loader,
            swapchain: vk::SwapchainKHR::null(),
            swapchain_loader,
            surface_format,
            color_format,
            extent: vk::Extent2D { width, height },
            present_mode: choose_present_mode(config.vsync, &present_modes),
            requested_image_count: config.backbuffer_count,
            backbuffers: Vec::new(),
            initialized: Vec::new(),
            acquire_fence,
            present_semaphores: Vec::new(),
            out_of_date: false,
        };

        // From here on Drop releases everything
        swapchain.build(width, height)?;
        gfx_info!(
            SOURCE,
            "Swapchain created: {} images, {}x{}, {:?}, {:?}",
            swapchain.backbuffers.len(),
            swapchain.extent.width,
            swapchain.extent.height,
            color_format,
            swapchain.present_mode
        );
        Ok(swapchain)
    }

    /// (Re)create the swapchain, its backbuffers and present semaphores
    fn build(&mut self, width: u32, height: u32) -> Result<()> {
        let device = &self.ctx.device;
        unsafe {
            let capabilities = self
                .surface_loader
                .get_physical_device_surface_capabilities(self.ctx.physical_device, self.surface)
                .map_err(|e| gfx_err!(SOURCE, InitializationFailed, "Failed to get surface capabilities: {:?}", e))?;

            let extent = choose_extent(&capabilities, width, height);
            if extent.width == 0 || extent.height == 0 {
                gfx_bail!(SOURCE, InvalidState, "surface has zero extent (window minimized?)");
            }
            let image_count = choose_image_count(
                self.requested_image_count,
                capabilities.min_image_count,
                capabilities.max_image_count,
            );

            let info = ResourceInfo::backbuffer(self.color_format, extent.width, extent.height);
            let image_usage = image_usage_flags(info.flags) & capabilities.supported_usage_flags;

            let old_swapchain = self.swapchain;
            let swapchain_create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(self.surface)
                .min_image_count(image_count)
                .image_format(self.surface_format.format)
                .image_color_space(self.surface_format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(image_usage)
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(self.present_mode)
                .clipped(true)
                .old_swapchain(old_swapchain);

            let swapchain = self
                .swapchain_loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(|e| gfx_err!(SOURCE, InitializationFailed, "Failed to create swapchain: {:?}", e))?;

            // Old images go away with the old swapchain
            self.backbuffers.clear();
            self.initialized.clear();
            for semaphore in self.present_semaphores.drain(..) {
                device.destroy_semaphore(semaphore, None);
            }
            if old_swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(old_swapchain, None);
            }
            self.swapchain = swapchain;
            self.extent = extent;

            let images = self
                .swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(|e| gfx_err!(SOURCE, InitializationFailed, "Failed to get swapchain images: {:?}", e))?;

            for image in images {
                let backbuffer = VulkanResource::from_swapchain_image(&self.ctx, image, info.clone())?;
                self.backbuffers.push(backbuffer);
                self.initialized.push(false);

                let semaphore = device
                    .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                    .map_err(|e| gfx_err!(SOURCE, InitializationFailed, "Failed to create present semaphore: {:?}", e))?;
                self.present_semaphores.push(semaphore);
            }
        }
        self.out_of_date = false;
        Ok(())
    }

    /// Rebuild for a new window size; waits for the queue first
    pub(crate) fn recreate(&mut self, width: u32, height: u32) -> Result<()> {
        unsafe {
            let _queue = lock(&self.ctx.queue_lock, "queue")?;
            self.ctx
                .device
                .queue_wait_idle(self.ctx.graphics_queue)
                .map_err(|e| gfx_err!(SOURCE, BackendError, "Failed to wait idle before swapchain recreate: {:?}", e))?;
        }
        self.build(width, height)?;
        gfx_debug!(SOURCE, "Swapchain recreated at {}x{}", self.extent.width, self.extent.height);
        Ok(())
    }

    pub(crate) fn image_count(&self) -> u32 {
        self.backbuffers.len() as u32
    }

    pub(crate) fn backbuffer(&self, index: u32) -> Option<&Arc<dyn Resource>> {
        self.backbuffers.get(index as usize)
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.extent.width, self.extent.height)
    }

    pub fn color_format(&self) -> ColorFormat {
        self.color_format
    }

    /// Acquire the next image and wait until it can be rendered to
    pub(crate) fn acquire(&mut self) -> Result<u32> {
        if self.out_of_date {
            self.recreate(self.extent.width, self.extent.height)?;
        }

        let acquired = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, u64::MAX, vk::Semaphore::null(), self.acquire_fence)
        };
        let index = match acquired {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    gfx_debug!(SOURCE, "Swapchain suboptimal, recreating after next present");
                    self.out_of_date = true;
                }
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                // The fence is not signaled on failure: rebuild and retry once
                self.recreate(self.extent.width, self.extent.height)?;
                unsafe {
                    self.swapchain_loader
                        .acquire_next_image(self.swapchain, u64::MAX, vk::Semaphore::null(), self.acquire_fence)
                        .map_err(|e| gfx_err!(SOURCE, BackendError, "Failed to acquire swapchain image: {:?}", e))?
                        .0
                }
            }
            Err(e) => gfx_bail!(SOURCE, BackendError, "Failed to acquire swapchain image: {:?}", e),
        };

        unsafe {
            self.ctx
                .device
                .wait_for_fences(&[self.acquire_fence], true, u64::MAX)
                .map_err(|e| gfx_err!(SOURCE, BackendError, "Failed to wait for acquire fence: {:?}", e))?;
            self.ctx
                .device
                .reset_fences(&[self.acquire_fence])
                .map_err(|e| gfx_err!(SOURCE, BackendError, "Failed to reset acquire fence: {:?}", e))?;
        }

        if is_first_acquire(&self.initialized, index) {
            if let Some(backbuffer) = self.backbuffers.get(index as usize) {
                vulkan_resource(backbuffer.as_ref())?.transition_from_undefined()?;
            }
            self.initialized[index as usize] = true;
        }
        Ok(index)
    }

    /// Queue image `index` for presentation after all submitted work
    pub(crate) fn present(&mut self, index: u32) -> Result<()> {
        let semaphore = match self.present_semaphores.get(index as usize) {
            Some(semaphore) => *semaphore,
            None => gfx_bail!(SOURCE, InvalidResource, "present: backbuffer {} out of range", index),
        };

        let signal_semaphores = [semaphore];
        let swapchains = [self.swapchain];
        let image_indices = [index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let presented = unsafe {
            let _queue = lock(&self.ctx.queue_lock, "queue")?;
            let submit_info = vk::SubmitInfo::default().signal_semaphores(&signal_semaphores);
            self.ctx
                .device
                .queue_submit(self.ctx.graphics_queue, &[submit_info], vk::Fence::null())
                .map_err(|e| gfx_err!(SOURCE, BackendError, "Failed to signal present semaphore: {:?}", e))?;
            self.swapchain_loader.queue_present(self.ctx.graphics_queue, &present_info)
        };

        match presented {
            Ok(false) => Ok(()),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                gfx_debug!(SOURCE, "Swapchain out of date after present, recreating on next acquire");
                self.out_of_date = true;
                Ok(())
            }
            Err(e) => gfx_bail!(SOURCE, BackendError, "Failed to present swapchain image: {:?}", e),
        }
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        unsafe {
            // Wait for device to finish
            self.ctx.device.device_wait_idle().ok();

            self.backbuffers.clear();
            for &semaphore in &self.present_semaphores {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
            self.ctx.device.destroy_fence(self.acquire_fence, None);

            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_swapchain_tests.rs"]
mod tests;
