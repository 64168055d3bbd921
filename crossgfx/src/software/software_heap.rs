/// SoftwareDescriptorHeap - descriptor table kept as resolved slots

use std::any::Any;
use std::sync::Arc;
use crate::device::{DescriptorHeap, HeapKind, HeapSlot, Resource};

/// Emulated size of a CBV/SRV descriptor
pub const VIEW_DESCRIPTOR_SIZE: u32 = 32;

/// Emulated size of a sampler descriptor
pub const SAMPLER_DESCRIPTOR_SIZE: u32 = 16;

pub struct SoftwareDescriptorHeap {
    kind: HeapKind,
    slots: Vec<HeapSlot>,
    /// Resources referenced by view slots, kept alive as long as the heap
    _resources: Vec<Arc<dyn Resource>>,
}

impl SoftwareDescriptorHeap {
    pub(crate) fn new(kind: HeapKind, slots: Vec<HeapSlot>, resources: Vec<Arc<dyn Resource>>) -> Self {
        Self { kind, slots, _resources: resources }
    }
}

impl DescriptorHeap for SoftwareDescriptorHeap {
    fn kind(&self) -> HeapKind {
        self.kind
    }

    fn slots(&self) -> &[HeapSlot] {
        &self.slots
    }

    fn increment_size(&self) -> u32 {
        match self.kind {
            HeapKind::View => VIEW_DESCRIPTOR_SIZE,
            HeapKind::Sampler => SAMPLER_DESCRIPTOR_SIZE,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
