/// VulkanDescriptorHeap - resolved descriptor table for the Vulkan backend
///
/// Vulkan has no shader-visible heap, so a heap keeps the native handle each
/// slot resolves to. Command lists copy a prefix of it into a descriptor set
/// when a table is bound.

use ash::vk;
use std::any::Any;
use std::sync::Arc;
use crossgfx::gfx::Result;
use crossgfx::gfx::render::{Descriptor, DescriptorHeap, HeapKind, HeapSlot, Resource};
use crossgfx::gfx_err;

use crate::vulkan_context::{lock, GpuContext};
use crate::vulkan_resource::vulkan_resource;

/// Native handle behind one heap slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NativeDescriptor {
    UniformBuffer { buffer: vk::Buffer, offset: u64, range: u64 },
    SampledImage { view: vk::ImageView },
    Sampler(vk::Sampler),
}

impl NativeDescriptor {
    pub(crate) fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            NativeDescriptor::UniformBuffer { .. } => vk::DescriptorType::UNIFORM_BUFFER,
            NativeDescriptor::SampledImage { .. } => vk::DescriptorType::SAMPLED_IMAGE,
            NativeDescriptor::Sampler(_) => vk::DescriptorType::SAMPLER,
        }
    }
}

pub struct VulkanDescriptorHeap {
    kind: HeapKind,
    slots: Vec<HeapSlot>,
    pub(crate) native: Vec<NativeDescriptor>,
    /// Resources referenced by view slots, kept alive as long as the heap
    _resources: Vec<Arc<dyn Resource>>,
}

impl VulkanDescriptorHeap {
    /// Build a view heap from resolved slots and their resources (same order)
    pub(crate) fn new_view_heap(slots: Vec<HeapSlot>, resources: Vec<Arc<dyn Resource>>) -> Result<Self> {
        let native = slots
            .iter()
            .zip(&resources)
            .map(|(slot, resource)| {
                let vk_resource = vulkan_resource(resource.as_ref())?;
                match &slot.descriptor {
                    Descriptor::ConstantBuffer { view, .. } => Ok(NativeDescriptor::UniformBuffer {
                        buffer: vk_resource.expect_buffer()?,
                        offset: view.offset,
                        range: view.size,
                    }),
                    Descriptor::ShaderResource { .. } => match vk_resource.view() {
                        Some(view) => Ok(NativeDescriptor::SampledImage { view }),
                        None => Err(gfx_err!(
                            "crossgfx::vulkan",
                            InvalidResource,
                            "{:?} has a shader-resource view but no image",
                            resource.id()
                        )),
                    },
                    Descriptor::Sampler { .. } => Err(gfx_err!(
                        "crossgfx::vulkan",
                        UnsupportedViewKind,
                        "samplers cannot be placed in a view heap"
                    )),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { kind: HeapKind::View, slots, native, _resources: resources })
    }

    /// Build a sampler heap, creating preset samplers on first use
    pub(crate) fn new_sampler_heap(ctx: &GpuContext, slots: Vec<HeapSlot>) -> Result<Self> {
        let mut cache = lock(&ctx.sampler_cache, "sampler cache")?;
        let mut native = Vec::with_capacity(slots.len());
        for slot in &slots {
            if let Descriptor::Sampler { sampler, .. } = slot.descriptor {
                native.push(NativeDescriptor::Sampler(cache.get(&ctx.device, sampler)?));
            }
        }
        Ok(Self { kind: HeapKind::Sampler, slots, native, _resources: Vec::new() })
    }
}

impl DescriptorHeap for VulkanDescriptorHeap {
    fn kind(&self) -> HeapKind {
        self.kind
    }

    fn slots(&self) -> &[HeapSlot] {
        &self.slots
    }

    /// One descriptor write record per slot
    fn increment_size(&self) -> u32 {
        match self.kind {
            HeapKind::View => std::mem::size_of::<vk::DescriptorBufferInfo>() as u32,
            HeapKind::Sampler => std::mem::size_of::<vk::DescriptorImageInfo>() as u32,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
