/// Resource trait - one native GPU allocation plus its precomputed views
///
/// Resources are created by the `GraphicsDevice` factories and handed out as
/// `Arc<dyn Resource>`. The native allocation is released when the last
/// handle is dropped.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use bitflags::bitflags;
use bytemuck::Pod;
use crate::error::{Error, Result};
use crate::device::{BufferDesc, BufferKind, ColorFormat, DepthFormat, ResourceUsage, TextureDesc};
use crate::gfx_bail;

/// Minimum size and alignment of a constant buffer, in bytes
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// Round a constant buffer size up to the next multiple of 256 (minimum 256)
pub fn align_constant_buffer_size(size: u64) -> u64 {
    if size == 0 {
        return CONSTANT_BUFFER_ALIGNMENT;
    }
    size.div_ceil(CONSTANT_BUFFER_ALIGNMENT) * CONSTANT_BUFFER_ALIGNMENT
}

/// Process-unique resource identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Allocate a fresh identifier
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// What kind of native object backs the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Linear buffer
    Buffer,
    /// 2-D color texture
    Texture2D(ColorFormat),
    /// 2-D depth texture
    DepthStencil(DepthFormat),
}

bitflags! {
    /// Ways a resource may be used, fixed at creation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceFlags: u32 {
        const TRANSFER_SRC    = 0x1;
        const TRANSFER_DST    = 0x2;
        const SAMPLED         = 0x4;
        const RENDER_TARGET   = 0x8;
        const DEPTH_STENCIL   = 0x10;
        const CONSTANT_BUFFER = 0x20;
        const VERTEX_BUFFER   = 0x40;
        const INDEX_BUFFER    = 0x80;
        /// Memory can be mapped for CPU writes
        const CPU_WRITE       = 0x100;
        /// Memory can be mapped for CPU reads
        const CPU_READ        = 0x200;
    }
}

/// Shader-resource view description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderResourceView {
    pub format: ColorFormat,
    pub mip_levels: u32,
}

/// Render-target view description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetView {
    pub format: ColorFormat,
}

/// Depth-stencil view description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilView {
    pub format: DepthFormat,
}

/// Constant-buffer view description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBufferView {
    pub offset: u64,
    /// Always a multiple of CONSTANT_BUFFER_ALIGNMENT
    pub size: u64,
}

/// Views computed when the resource was created
///
/// Never modified afterwards: a transition changes how the GPU accesses the
/// memory, not how the views interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceViews {
    pub shader_resource: Option<ShaderResourceView>,
    pub render_target: Option<RenderTargetView>,
    pub depth_stencil: Option<DepthStencilView>,
    pub constant_buffer: Option<ConstantBufferView>,
}

/// Optimized clear value baked into a target at creation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u8 },
}

/// Read-only properties of a resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInfo {
    pub kind: ResourceKind,
    /// Width in texels (byte size for buffers)
    pub width: u32,
    /// Height in texels (1 for buffers)
    pub height: u32,
    /// Size of the backing memory in bytes, tightly packed for textures
    pub size: u64,
    pub flags: ResourceFlags,
    /// Usage the resource is in right after creation
    pub initial_usage: ResourceUsage,
    pub clear_value: Option<ClearValue>,
    pub views: ResourceViews,
}

impl ResourceInfo {
    /// Describe a buffer
    pub fn buffer(size: u64, flags: ResourceFlags, initial_usage: ResourceUsage) -> Self {
        Self {
            kind: ResourceKind::Buffer,
            width: size as u32,
            height: 1,
            size,
            flags,
            initial_usage,
            clear_value: None,
            views: ResourceViews::default(),
        }
    }

    /// Describe a color texture of `width` x `height` texels
    pub fn texture(
        format: ColorFormat,
        width: u32,
        height: u32,
        flags: ResourceFlags,
        initial_usage: ResourceUsage,
    ) -> Self {
        Self {
            kind: ResourceKind::Texture2D(format),
            width,
            height,
            size: width as u64 * height as u64 * format.bytes_per_pixel() as u64,
            flags,
            initial_usage,
            clear_value: None,
            views: ResourceViews::default(),
        }
    }

    /// Describe a depth target of `width` x `height` texels
    pub fn depth(format: DepthFormat, width: u32, height: u32, flags: ResourceFlags) -> Self {
        Self {
            kind: ResourceKind::DepthStencil(format),
            width,
            height,
            size: width as u64 * height as u64 * format.bytes_per_pixel() as u64,
            flags,
            initial_usage: ResourceUsage::DepthWrite,
            clear_value: None,
            views: ResourceViews::default(),
        }
    }

    pub fn is_buffer(&self) -> bool {
        self.kind == ResourceKind::Buffer
    }

    /// Bytes per texel for textures, 1 for buffers
    pub fn texel_size(&self) -> u32 {
        match self.kind {
            ResourceKind::Buffer => 1,
            ResourceKind::Texture2D(format) => format.bytes_per_pixel(),
            ResourceKind::DepthStencil(format) => format.bytes_per_pixel(),
        }
    }
}

// ===== FACTORY DESCRIPTIONS =====
//
// Shared by every backend so that a given factory call yields the same
// ResourceInfo whatever API executes it.

impl ResourceInfo {
    /// Color target, also sampled and copyable, created in `RenderTarget`
    pub fn render_target(format: ColorFormat, width: u32, height: u32, clear_color: [f32; 4]) -> Result<Self> {
        validate_extent("render target", width, height)?;
        let mut info = Self::texture(
            format,
            width,
            height,
            ResourceFlags::RENDER_TARGET
                | ResourceFlags::SAMPLED
                | ResourceFlags::TRANSFER_SRC
                | ResourceFlags::TRANSFER_DST,
            ResourceUsage::RenderTarget,
        );
        info.clear_value = Some(ClearValue::Color(clear_color));
        info.views.render_target = Some(RenderTargetView { format });
        info.views.shader_resource = Some(ShaderResourceView { format, mip_levels: 1 });
        Ok(info)
    }

    /// 32-bit depth target with depth and single-channel shader views, created in `DepthWrite`
    pub fn depth_stencil_target(width: u32, height: u32) -> Result<Self> {
        validate_extent("depth target", width, height)?;
        let format = DepthFormat::D32_FLOAT;
        let mut info = Self::depth(
            format,
            width,
            height,
            ResourceFlags::DEPTH_STENCIL | ResourceFlags::SAMPLED | ResourceFlags::TRANSFER_SRC,
        );
        info.clear_value = Some(ClearValue::DepthStencil { depth: 1.0, stencil: 0 });
        info.views.depth_stencil = Some(DepthStencilView { format });
        info.views.shader_resource = Some(ShaderResourceView {
            format: format.shader_view_format(),
            mip_levels: 1,
        });
        Ok(info)
    }

    /// Upload-visible constant buffer, size aligned, created in `GenericRead`
    pub fn constant_buffer(requested_size: u64) -> Self {
        let size = align_constant_buffer_size(requested_size);
        let mut info = Self::buffer(
            size,
            ResourceFlags::CONSTANT_BUFFER | ResourceFlags::CPU_WRITE | ResourceFlags::TRANSFER_SRC,
            ResourceUsage::GenericRead,
        );
        info.views.constant_buffer = Some(ConstantBufferView { offset: 0, size });
        info
    }

    /// Linear upload or readback buffer
    pub fn linear_buffer(desc: &BufferDesc) -> Result<Self> {
        if desc.size == 0 {
            gfx_bail!("crossgfx::resource", InvalidResource, "buffer size must be non-zero");
        }
        Ok(match desc.kind {
            BufferKind::Upload => Self::buffer(
                desc.size,
                ResourceFlags::CPU_WRITE
                    | ResourceFlags::TRANSFER_SRC
                    | ResourceFlags::VERTEX_BUFFER
                    | ResourceFlags::INDEX_BUFFER,
                ResourceUsage::GenericRead,
            ),
            BufferKind::Readback => Self::buffer(
                desc.size,
                ResourceFlags::CPU_READ | ResourceFlags::TRANSFER_DST,
                ResourceUsage::CopyDest,
            ),
        })
    }

    /// Sampled texture filled by copies, created in `CopyDest`
    pub fn sampled_texture(desc: &TextureDesc) -> Result<Self> {
        validate_extent("texture", desc.width, desc.height)?;
        let mut info = Self::texture(
            desc.format,
            desc.width,
            desc.height,
            ResourceFlags::SAMPLED | ResourceFlags::TRANSFER_DST | ResourceFlags::TRANSFER_SRC,
            ResourceUsage::CopyDest,
        );
        info.views.shader_resource = Some(ShaderResourceView { format: desc.format, mip_levels: 1 });
        Ok(info)
    }

    /// Swapchain image, created in `Present`
    pub fn backbuffer(format: ColorFormat, width: u32, height: u32) -> Self {
        let mut info = Self::texture(
            format,
            width,
            height,
            ResourceFlags::RENDER_TARGET | ResourceFlags::TRANSFER_SRC | ResourceFlags::TRANSFER_DST,
            ResourceUsage::Present,
        );
        info.views.render_target = Some(RenderTargetView { format });
        info
    }
}

fn validate_extent(what: &str, width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        gfx_bail!("crossgfx::resource", InvalidResource, "{} has zero extent {}x{}", what, width, height);
    }
    Ok(())
}

/// GPU resource (buffer or texture)
///
/// Backends implement the raw mapping primitives; callers use the
/// `Mapping` guard returned by `<dyn Resource>::map()`.
pub trait Resource: Send + Sync + 'static {
    /// Unique identifier, stable for the lifetime of the resource
    fn id(&self) -> ResourceId;

    /// Read-only properties fixed at creation
    fn info(&self) -> &ResourceInfo;

    /// Begin CPU access to the memory
    ///
    /// Fails with `InvalidResource` for GPU-only memory and with
    /// `InvalidState` if the resource is already mapped.
    fn map_memory(&self) -> Result<()>;

    /// End CPU access. Does nothing if the resource is not mapped.
    fn unmap_memory(&self);

    /// Copy `data` into mapped memory at `offset`
    fn write_mapped(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Copy mapped memory at `offset` into `out`
    fn read_mapped(&self, offset: u64, out: &mut [u8]) -> Result<()>;

    /// Downcast support for backends
    fn as_any(&self) -> &dyn Any;
}

impl dyn Resource {
    /// Map the resource for CPU access
    ///
    /// The mapping is released when the returned guard is dropped. Callers must
    /// not write through it while GPU work reading this resource is in flight.
    pub fn map(&self) -> Result<Mapping<'_>> {
        self.map_memory()?;
        Ok(Mapping { resource: self })
    }
}

/// Scoped CPU mapping of a resource
pub struct Mapping<'a> {
    resource: &'a dyn Resource,
}

impl Mapping<'_> {
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.resource.write_mapped(offset, data)
    }

    /// Write a plain-old-data value at `offset`
    pub fn write_pod<T: Pod>(&mut self, offset: u64, value: &T) -> Result<()> {
        self.resource.write_mapped(offset, bytemuck::bytes_of(value))
    }

    /// Write a slice of plain-old-data values at `offset`
    pub fn write_slice<T: Pod>(&mut self, offset: u64, values: &[T]) -> Result<()> {
        self.resource.write_mapped(offset, bytemuck::cast_slice(values))
    }

    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; len];
        self.resource.read_mapped(offset, &mut out)?;
        Ok(out)
    }

    pub fn size(&self) -> u64 {
        self.resource.info().size
    }
}

impl Drop for Mapping<'_> {
    fn drop(&mut self) {
        self.resource.unmap_memory();
    }
}

/// Check an access of `len` bytes at `offset` against a resource of `size` bytes
pub fn check_mapped_range(size: u64, offset: u64, len: usize) -> Result<()> {
    let end = offset.checked_add(len as u64);
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::InvalidResource(format!(
            "mapped access of {} bytes at offset {} exceeds resource size {}",
            len, offset, size
        ))),
    }
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;
