/// Descriptor heaps - fixed tables of views or samplers
///
/// A heap is built once from an ordered entry list: entry `i` lands in slot
/// `i`, at byte offset `i * increment_size()`. Heaps are immutable; to change
/// a binding, build a new heap.

use std::any::Any;
use std::sync::Arc;
use crate::device::{ConstantBufferView, Resource, ResourceId, ShaderResourceView};
use crate::error::Result;
use crate::gfx_err;

/// How a heap entry interprets its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    ConstantBuffer,
    ShaderResource,
    Sampler,
    UnorderedAccess,
}

/// Which descriptors a heap holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapKind {
    /// Constant-buffer and shader-resource views
    View,
    Sampler,
}

/// Fixed sampler vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerType {
    Nearest,
    Bilinear,
    Trilinear,
    Anisotropic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Point,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Wrap,
    Clamp,
}

/// Native-independent sampler description
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub mip_filter: FilterMode,
    pub anisotropic: bool,
    pub max_anisotropy: u32,
    pub address: AddressMode,
    pub min_lod: f32,
    pub max_lod: f32,
}

impl SamplerDesc {
    /// Preset for each sampler type (wrap addressing on every axis)
    pub fn preset(sampler: SamplerType) -> Self {
        let base = Self {
            min_filter: FilterMode::Point,
            mag_filter: FilterMode::Point,
            mip_filter: FilterMode::Point,
            anisotropic: false,
            max_anisotropy: 1,
            address: AddressMode::Wrap,
            min_lod: 0.0,
            max_lod: 0.0,
        };
        match sampler {
            SamplerType::Nearest => base,
            SamplerType::Bilinear => Self {
                min_filter: FilterMode::Linear,
                mag_filter: FilterMode::Linear,
                ..base
            },
            SamplerType::Trilinear => Self {
                min_filter: FilterMode::Linear,
                mag_filter: FilterMode::Linear,
                mip_filter: FilterMode::Linear,
                max_lod: 1000.0,
                ..base
            },
            SamplerType::Anisotropic => Self {
                min_filter: FilterMode::Linear,
                mag_filter: FilterMode::Linear,
                mip_filter: FilterMode::Linear,
                anisotropic: true,
                max_anisotropy: 16,
                max_lod: 1000.0,
                ..base
            },
        }
    }
}

/// Input entry of a view heap
#[derive(Clone)]
pub struct ViewHeapEntry {
    pub resource: Arc<dyn Resource>,
    pub kind: ViewKind,
    /// Shader register the entry is meant for; the slot is always the entry index
    pub slot_hint: u32,
}

impl ViewHeapEntry {
    pub fn new(resource: &Arc<dyn Resource>, kind: ViewKind, slot_hint: u32) -> Self {
        Self { resource: Arc::clone(resource), kind, slot_hint }
    }
}

/// Input entry of a sampler heap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerHeapEntry {
    pub sampler: SamplerType,
    pub slot_hint: u32,
}

impl SamplerHeapEntry {
    pub fn new(sampler: SamplerType, slot_hint: u32) -> Self {
        Self { sampler, slot_hint }
    }
}

/// What a heap slot resolves to
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    ConstantBuffer { resource: ResourceId, view: ConstantBufferView },
    ShaderResource { resource: ResourceId, view: ShaderResourceView },
    Sampler { sampler: SamplerType, desc: SamplerDesc },
}

impl Descriptor {
    pub fn resource(&self) -> Option<ResourceId> {
        match self {
            Descriptor::ConstantBuffer { resource, .. } | Descriptor::ShaderResource { resource, .. } => {
                Some(*resource)
            }
            Descriptor::Sampler { .. } => None,
        }
    }

    pub fn kind(&self) -> ViewKind {
        match self {
            Descriptor::ConstantBuffer { .. } => ViewKind::ConstantBuffer,
            Descriptor::ShaderResource { .. } => ViewKind::ShaderResource,
            Descriptor::Sampler { .. } => ViewKind::Sampler,
        }
    }
}

/// One written slot of a heap
#[derive(Debug, Clone, PartialEq)]
pub struct HeapSlot {
    pub descriptor: Descriptor,
    pub slot_hint: u32,
}

/// Shader-visible descriptor heap
pub trait DescriptorHeap: Send + Sync + 'static {
    fn kind(&self) -> HeapKind;

    /// Slots in input order
    fn slots(&self) -> &[HeapSlot];

    /// Native distance between two consecutive descriptors, in bytes
    fn increment_size(&self) -> u32;

    fn len(&self) -> usize {
        self.slots().len()
    }

    fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    fn descriptor(&self, index: usize) -> Option<&HeapSlot> {
        self.slots().get(index)
    }

    /// Byte offset of slot `index` from the heap base
    fn offset_of(&self, index: usize) -> u64 {
        index as u64 * self.increment_size() as u64
    }

    fn as_any(&self) -> &dyn Any;
}

/// Resolve view heap entries to descriptors, in input order
///
/// Only constant-buffer and shader-resource views can live in a view heap,
/// and the resource must have been created with that view.
pub fn resolve_view_entries(entries: &[ViewHeapEntry]) -> Result<Vec<HeapSlot>> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let info = entry.resource.info();
            let id = entry.resource.id();
            let descriptor = match entry.kind {
                ViewKind::ConstantBuffer => {
                    let view = info.views.constant_buffer.ok_or_else(|| {
                        gfx_err!(
                            "crossgfx::heap",
                            MissingView,
                            "entry {}: resource {:?} has no constant-buffer view",
                            index,
                            id
                        )
                    })?;
                    Descriptor::ConstantBuffer { resource: id, view }
                }
                ViewKind::ShaderResource => {
                    let view = info.views.shader_resource.ok_or_else(|| {
                        gfx_err!(
                            "crossgfx::heap",
                            MissingView,
                            "entry {}: resource {:?} has no shader-resource view",
                            index,
                            id
                        )
                    })?;
                    Descriptor::ShaderResource { resource: id, view }
                }
                ViewKind::Sampler | ViewKind::UnorderedAccess => {
                    return Err(gfx_err!(
                        "crossgfx::heap",
                        UnsupportedViewKind,
                        "entry {}: {:?} views cannot be placed in a view heap",
                        index,
                        entry.kind
                    ));
                }
            };
            Ok(HeapSlot { descriptor, slot_hint: entry.slot_hint })
        })
        .collect()
}

/// Resolve sampler heap entries to descriptors, in input order
pub fn resolve_sampler_entries(entries: &[SamplerHeapEntry]) -> Vec<HeapSlot> {
    entries
        .iter()
        .map(|entry| HeapSlot {
            descriptor: Descriptor::Sampler {
                sampler: entry.sampler,
                desc: SamplerDesc::preset(entry.sampler),
            },
            slot_hint: entry.slot_hint,
        })
        .collect()
}

#[cfg(test)]
#[path = "descriptor_heap_tests.rs"]
mod tests;
