/// VulkanResource - Vulkan implementation of the Resource trait
///
/// One `VkBuffer` or one `VkImage` plus its view, bound to a gpu-allocator
/// allocation. Images are moved from `UNDEFINED` into the layout of their
/// initial usage before the factory returns.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use crossgfx::gfx::{Error, Result};
use crossgfx::gfx::render::{
    check_mapped_range, Resource, ResourceFlags, ResourceId, ResourceInfo, ResourceKind,
};
use crossgfx::{gfx_bail, gfx_err, gfx_error, gfx_trace};

use crate::vulkan_context::{lock, GpuContext};
use crate::vulkan_format::{color_format_to_vk, depth_format_to_vk};
use crate::vulkan_usage::usage_state;

/// Native object behind a resource
pub(crate) enum NativeResource {
    Buffer(vk::Buffer),
    Image {
        image: vk::Image,
        view: vk::ImageView,
        /// False for swapchain images, which the swapchain destroys
        owns_image: bool,
    },
}

/// Vulkan resource implementation
pub struct VulkanResource {
    /// Shared GPU context (device, allocator, queue, tracker)
    ctx: Arc<GpuContext>,
    id: ResourceId,
    info: ResourceInfo,
    pub(crate) native: NativeResource,
    /// GPU memory allocation (None for swapchain images)
    allocation: Mutex<Option<Allocation>>,
    mapped: AtomicBool,
    /// Bytes reported in device stats
    accounted_bytes: u64,
}

/// Downcast a resource created by a Vulkan device
pub fn vulkan_resource(resource: &dyn Resource) -> Result<&VulkanResource> {
    resource.as_any().downcast_ref::<VulkanResource>().ok_or_else(|| {
        gfx_err!(
            "crossgfx::vulkan",
            InvalidResource,
            "resource {:?} was not created by a Vulkan device",
            resource.id()
        )
    })
}

fn buffer_usage_flags(flags: ResourceFlags) -> vk::BufferUsageFlags {
    let mut usage = vk::BufferUsageFlags::empty();
    if flags.contains(ResourceFlags::TRANSFER_SRC) {
        usage |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if flags.contains(ResourceFlags::TRANSFER_DST) {
        usage |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    if flags.contains(ResourceFlags::CONSTANT_BUFFER) {
        usage |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if flags.contains(ResourceFlags::VERTEX_BUFFER) {
        usage |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if flags.contains(ResourceFlags::INDEX_BUFFER) {
        usage |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    usage
}

pub(crate) fn image_usage_flags(flags: ResourceFlags) -> vk::ImageUsageFlags {
    let mut usage = vk::ImageUsageFlags::empty();
    if flags.contains(ResourceFlags::SAMPLED) {
        usage |= vk::ImageUsageFlags::SAMPLED;
    }
    if flags.contains(ResourceFlags::RENDER_TARGET) {
        usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }
    if flags.contains(ResourceFlags::DEPTH_STENCIL) {
        usage |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    if flags.contains(ResourceFlags::TRANSFER_SRC) {
        usage |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if flags.contains(ResourceFlags::TRANSFER_DST) {
        usage |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    usage
}

/// Upload buffers live in host-visible write-combined memory, readback
/// buffers in host-cached memory
fn memory_location(flags: ResourceFlags) -> MemoryLocation {
    if flags.contains(ResourceFlags::CPU_READ) {
        MemoryLocation::GpuToCpu
    } else if flags.contains(ResourceFlags::CPU_WRITE) {
        MemoryLocation::CpuToGpu
    } else {
        MemoryLocation::GpuOnly
    }
}

/// Vulkan format and aspect of a texture kind
pub(crate) fn image_format(kind: ResourceKind) -> (vk::Format, vk::ImageAspectFlags) {
    match kind {
        ResourceKind::Texture2D(format) => (color_format_to_vk(format), vk::ImageAspectFlags::COLOR),
        ResourceKind::DepthStencil(format) => (depth_format_to_vk(format), vk::ImageAspectFlags::DEPTH),
        ResourceKind::Buffer => (vk::Format::UNDEFINED, vk::ImageAspectFlags::empty()),
    }
}

pub(crate) fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe {
        device
            .create_image_view(&create_info, None)
            .map_err(|e| gfx_err!("crossgfx::vulkan", BackendError, "Failed to create image view: {:?}", e))
    }
}

/// Whole-image subresource range
pub(crate) fn full_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

impl VulkanResource {
    /// Create a buffer for `info`
    pub(crate) fn new_buffer(ctx: &Arc<GpuContext>, info: ResourceInfo) -> Result<Arc<Self>> {
        unsafe {
            let buffer_create_info = vk::BufferCreateInfo::default()
                .size(info.size)
                .usage(buffer_usage_flags(info.flags))
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = ctx.device.create_buffer(&buffer_create_info, None).map_err(|e| {
                gfx_err!("crossgfx::vulkan", BackendError, "Failed to create buffer of size {} bytes: {:?}", info.size, e)
            })?;

            let requirements = ctx.device.get_buffer_memory_requirements(buffer);
            let allocation = match Self::allocate(ctx, "buffer", requirements, memory_location(info.flags), true) {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };

            if let Err(e) = ctx.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                Self::free(ctx, allocation);
                ctx.device.destroy_buffer(buffer, None);
                gfx_bail!("crossgfx::vulkan", BackendError, "Failed to bind buffer memory: {:?}", e);
            }

            Ok(Self::register(ctx, info, NativeResource::Buffer(buffer), Some(allocation)))
        }
    }

    /// Create an image and view for `info`, already in its initial usage
    pub(crate) fn new_image(ctx: &Arc<GpuContext>, info: ResourceInfo) -> Result<Arc<Self>> {
        let (format, aspect_mask) = image_format(info.kind);
        unsafe {
            let image_create_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D {
                    width: info.width,
                    height: info.height,
                    depth: 1,
                })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(image_usage_flags(info.flags))
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = ctx.device.create_image(&image_create_info, None).map_err(|e| {
                gfx_err!(
                    "crossgfx::vulkan",
                    BackendError,
                    "Failed to create {}x{} image: {:?}",
                    info.width,
                    info.height,
                    e
                )
            })?;

            let requirements = ctx.device.get_image_memory_requirements(image);
            let allocation = match Self::allocate(ctx, "texture", requirements, MemoryLocation::GpuOnly, false) {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_image(image, None);
                    return Err(e);
                }
            };

            if let Err(e) = ctx.device.bind_image_memory(image, allocation.memory(), allocation.offset()) {
                Self::free(ctx, allocation);
                ctx.device.destroy_image(image, None);
                gfx_bail!("crossgfx::vulkan", BackendError, "Failed to bind image memory: {:?}", e);
            }

            let view = match create_image_view(&ctx.device, image, format, aspect_mask) {
                Ok(view) => view,
                Err(e) => {
                    Self::free(ctx, allocation);
                    ctx.device.destroy_image(image, None);
                    return Err(e);
                }
            };

            // From here on Drop releases everything
            let resource = Self::register(
                ctx,
                info,
                NativeResource::Image { image, view, owns_image: true },
                Some(allocation),
            );
            resource.transition_from_undefined()?;
            Ok(resource)
        }
    }

    /// Wrap an image owned by a swapchain
    pub(crate) fn from_swapchain_image(ctx: &Arc<GpuContext>, image: vk::Image, info: ResourceInfo) -> Result<Arc<Self>> {
        let (format, aspect_mask) = image_format(info.kind);
        let view = create_image_view(&ctx.device, image, format, aspect_mask)?;
        // Left in UNDEFINED: the image may only be used once it is acquired
        Ok(Self::register(ctx, info, NativeResource::Image { image, view, owns_image: false }, None))
    }

    fn allocate(
        ctx: &GpuContext,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        let mut allocator = lock(&*ctx.allocator, "allocator")?;
        allocator
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| {
                let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                gfx_error!(
                    "crossgfx::vulkan",
                    "Out of GPU memory for {} ({:.2} MB, {:?}): {}",
                    name,
                    size_mb,
                    location,
                    e
                );
                Error::OutOfMemory
            })
    }

    fn free(ctx: &GpuContext, allocation: Allocation) {
        // Don't panic if lock fails - the native object is destroyed anyway
        if let Ok(mut allocator) = ctx.allocator.lock() {
            allocator.free(allocation).ok();
        }
    }

    fn register(
        ctx: &Arc<GpuContext>,
        info: ResourceInfo,
        native: NativeResource,
        allocation: Option<Allocation>,
    ) -> Arc<Self> {
        let id = ResourceId::next();
        let accounted_bytes = if allocation.is_some() { info.size } else { 0 };
        ctx.resource_created(accounted_bytes);
        ctx.tracker.register(id, info.initial_usage);
        gfx_trace!("crossgfx::vulkan", "Created {:?} ({:?}, {} bytes)", id, info.kind, info.size);
        Arc::new(Self {
            ctx: Arc::clone(ctx),
            id,
            info,
            native,
            allocation: Mutex::new(allocation),
            mapped: AtomicBool::new(false),
            accounted_bytes,
        })
    }

    /// Move a fresh image into the layout of its initial usage
    pub(crate) fn transition_from_undefined(&self) -> Result<()> {
        let image = match self.native {
            NativeResource::Image { image, .. } => image,
            NativeResource::Buffer(_) => return Ok(()),
        };
        let (_, aspect_mask) = image_format(self.info.kind);
        let target = usage_state(self.info.initial_usage);
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(target.layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(full_range(aspect_mask))
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(target.access);

        self.ctx.submit_one_shot(|cb| unsafe {
            self.ctx.device.cmd_pipeline_barrier(
                cb,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                target.stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        })
    }

    pub(crate) fn buffer(&self) -> Option<vk::Buffer> {
        match self.native {
            NativeResource::Buffer(buffer) => Some(buffer),
            NativeResource::Image { .. } => None,
        }
    }

    pub(crate) fn image(&self) -> Option<vk::Image> {
        match self.native {
            NativeResource::Image { image, .. } => Some(image),
            NativeResource::Buffer(_) => None,
        }
    }

    pub(crate) fn view(&self) -> Option<vk::ImageView> {
        match self.native {
            NativeResource::Image { view, .. } => Some(view),
            NativeResource::Buffer(_) => None,
        }
    }

    /// Native buffer, or `InvalidResource` for images
    pub(crate) fn expect_buffer(&self) -> Result<vk::Buffer> {
        match self.buffer() {
            Some(buffer) => Ok(buffer),
            None => gfx_bail!("crossgfx::vulkan", InvalidResource, "{:?} is not a buffer", self.id),
        }
    }

    /// Native image, or `InvalidResource` for buffers
    pub(crate) fn expect_image(&self) -> Result<vk::Image> {
        match self.image() {
            Some(image) => Ok(image),
            None => gfx_bail!("crossgfx::vulkan", InvalidResource, "{:?} is not a texture", self.id),
        }
    }

    fn ensure_mapped(&self) -> Result<()> {
        if !self.mapped.load(Ordering::Acquire) {
            gfx_bail!("crossgfx::vulkan", InvalidState, "resource {:?} is not mapped", self.id);
        }
        Ok(())
    }
}

impl Resource for VulkanResource {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn info(&self) -> &ResourceInfo {
        &self.info
    }

    fn map_memory(&self) -> Result<()> {
        if !self.info.flags.intersects(ResourceFlags::CPU_READ | ResourceFlags::CPU_WRITE) {
            gfx_bail!("crossgfx::vulkan", InvalidResource, "resource {:?} is not CPU-accessible", self.id);
        }
        if self.mapped.swap(true, Ordering::AcqRel) {
            gfx_bail!("crossgfx::vulkan", InvalidState, "resource {:?} is already mapped", self.id);
        }
        Ok(())
    }

    fn unmap_memory(&self) {
        // gpu-allocator keeps host-visible memory persistently mapped
        self.mapped.store(false, Ordering::Release);
    }

    fn write_mapped(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.ensure_mapped()?;
        check_mapped_range(self.info.size, offset, data.len())?;
        let mut allocation = lock(&self.allocation, "allocation")?;
        let memory = allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or_else(|| gfx_err!("crossgfx::vulkan", BackendError, "Buffer {:?} has no host mapping", self.id))?;
        let start = offset as usize;
        memory[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_mapped(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        self.ensure_mapped()?;
        check_mapped_range(self.info.size, offset, out.len())?;
        let allocation = lock(&self.allocation, "allocation")?;
        let memory = allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_slice())
            .ok_or_else(|| gfx_err!("crossgfx::vulkan", BackendError, "Buffer {:?} has no host mapping", self.id))?;
        let start = offset as usize;
        out.copy_from_slice(&memory[start..start + out.len()]);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanResource {
    fn drop(&mut self) {
        unsafe {
            match self.native {
                NativeResource::Buffer(buffer) => {
                    self.ctx.device.destroy_buffer(buffer, None);
                }
                NativeResource::Image { image, view, owns_image } => {
                    self.ctx.device.destroy_image_view(view, None);
                    if owns_image {
                        self.ctx.device.destroy_image(image, None);
                    }
                }
            }
        }

        // Free GPU memory
        if let Ok(allocation) = self.allocation.get_mut() {
            if let Some(allocation) = allocation.take() {
                Self::free(&self.ctx, allocation);
            }
        }

        self.ctx.tracker.forget(self.id);
        self.ctx.resource_released(self.accounted_bytes);
        gfx_trace!("crossgfx::vulkan", "Released {:?}", self.id);
    }
}
