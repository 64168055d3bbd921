/// SoftwareResource - host memory standing in for a GPU allocation

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use slotmap::{new_key_type, SlotMap};
use crate::device::{check_mapped_range, Resource, ResourceFlags, ResourceId, ResourceInfo, ResourceUsage, UsageTracker};
use crate::error::Result;
use crate::{gfx_bail, gfx_err, gfx_trace};

new_key_type! {
    /// Key of a live allocation in the device registry
    pub(crate) struct AllocationKey;
}

/// Registry entry of one live allocation
#[derive(Debug, Clone, Copy)]
pub(crate) struct AllocationRecord {
    pub id: ResourceId,
    pub bytes: u64,
}

/// State shared by the device and every object it created
pub(crate) struct SoftwareShared {
    pub allocations: Mutex<SlotMap<AllocationKey, AllocationRecord>>,
    pub tracker: UsageTracker,
}

impl SoftwareShared {
    pub fn new(track_usage: bool) -> Self {
        Self {
            allocations: Mutex::new(SlotMap::with_key()),
            tracker: UsageTracker::new(track_usage),
        }
    }
}

/// Host-memory resource
pub struct SoftwareResource {
    id: ResourceId,
    info: ResourceInfo,
    key: AllocationKey,
    memory: Mutex<Vec<u8>>,
    mapped: AtomicBool,
    /// Usage as of the last executed barrier
    usage: Mutex<ResourceUsage>,
    shared: Arc<SoftwareShared>,
}

impl SoftwareResource {
    pub(crate) fn new(shared: &Arc<SoftwareShared>, info: ResourceInfo) -> Result<Arc<Self>> {
        let id = ResourceId::next();
        let bytes = info.size;
        let key = shared
            .allocations
            .lock()
            .map_err(|_| gfx_err!("crossgfx::software", BackendError, "allocation registry lock poisoned"))?
            .insert(AllocationRecord { id, bytes });

        shared.tracker.register(id, info.initial_usage);
        gfx_trace!("crossgfx::software", "Allocated {:?} ({} bytes, {:?})", id, bytes, info.kind);

        Ok(Arc::new(Self {
            id,
            usage: Mutex::new(info.initial_usage),
            info,
            key,
            memory: Mutex::new(vec![0u8; bytes as usize]),
            mapped: AtomicBool::new(false),
            shared: Arc::clone(shared),
        }))
    }

    /// Usage as of the last executed barrier
    pub fn current_usage(&self) -> ResourceUsage {
        self.usage.lock().map(|usage| *usage).unwrap_or(ResourceUsage::Undefined)
    }

    pub(crate) fn set_usage(&self, usage: ResourceUsage) {
        if let Ok(mut current) = self.usage.lock() {
            *current = usage;
        }
    }

    pub(crate) fn memory(&self) -> Result<MutexGuard<'_, Vec<u8>>> {
        self.memory
            .lock()
            .map_err(|_| gfx_err!("crossgfx::software", BackendError, "resource memory lock poisoned"))
    }

    /// Copy of the whole backing memory, regardless of CPU visibility
    pub fn contents(&self) -> Result<Vec<u8>> {
        Ok(self.memory()?.clone())
    }

    fn cpu_visible(&self) -> bool {
        self.info.flags.intersects(ResourceFlags::CPU_WRITE | ResourceFlags::CPU_READ)
    }

    fn ensure_mapped(&self) -> Result<()> {
        if !self.mapped.load(Ordering::Acquire) {
            gfx_bail!("crossgfx::software", InvalidState, "resource {:?} is not mapped", self.id);
        }
        Ok(())
    }
}

impl Resource for SoftwareResource {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn info(&self) -> &ResourceInfo {
        &self.info
    }

    fn map_memory(&self) -> Result<()> {
        if !self.cpu_visible() {
            gfx_bail!("crossgfx::software", InvalidResource, "resource {:?} is not CPU-accessible", self.id);
        }
        if self.mapped.swap(true, Ordering::AcqRel) {
            gfx_bail!("crossgfx::software", InvalidState, "resource {:?} is already mapped", self.id);
        }
        Ok(())
    }

    fn unmap_memory(&self) {
        self.mapped.store(false, Ordering::Release);
    }

    fn write_mapped(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.ensure_mapped()?;
        if !self.info.flags.contains(ResourceFlags::CPU_WRITE) {
            gfx_bail!("crossgfx::software", InvalidResource, "resource {:?} is not CPU-writable", self.id);
        }
        check_mapped_range(self.info.size, offset, data.len())?;
        let start = offset as usize;
        self.memory()?[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_mapped(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        self.ensure_mapped()?;
        check_mapped_range(self.info.size, offset, out.len())?;
        let start = offset as usize;
        out.copy_from_slice(&self.memory()?[start..start + out.len()]);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for SoftwareResource {
    fn drop(&mut self) {
        if let Ok(mut allocations) = self.shared.allocations.lock() {
            allocations.remove(self.key);
        }
        self.shared.tracker.forget(self.id);
        gfx_trace!("crossgfx::software", "Released {:?}", self.id);
    }
}

/// Downcast a resource handed to the software backend
pub fn software_resource(resource: &dyn Resource) -> Result<&SoftwareResource> {
    resource.as_any().downcast_ref::<SoftwareResource>().ok_or_else(|| {
        gfx_err!(
            "crossgfx::software",
            InvalidResource,
            "resource {:?} was not created by the software backend",
            resource.id()
        )
    })
}
