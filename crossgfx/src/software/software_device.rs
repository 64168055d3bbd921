/// SoftwareDevice - GraphicsDevice implementation running on the CPU

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use crate::device::{
    resolve_sampler_entries, resolve_view_entries, Backend, BufferDesc, ColorFormat, CommandList,
    CommandListState, DescriptorHeap, DeviceConfig, DeviceStats, GraphicsDevice, HeapKind,
    PendingUsage, PipelineState, PipelineStateDesc, Resource, ResourceId, ResourceInfo, ResourceKind, ResourceUsage,
    SamplerHeapEntry, TextureDesc, UsageTracker, ViewHeapEntry,
};
use crate::error::Result;
use crate::software::software_command_list::{RecordedCommand, SoftwareCommandList};
use crate::software::software_heap::SoftwareDescriptorHeap;
use crate::software::software_pipeline::SoftwarePipelineState;
use crate::software::software_resource::{software_resource, SoftwareResource, SoftwareShared};
use crate::{gfx_bail, gfx_debug, gfx_err, gfx_info, gfx_warn};

const SOURCE: &str = "crossgfx::software";

/// Headless device
///
/// # Example
///
/// ```no_run
/// use crossgfx::gfx::{DeviceConfig, GraphicsDevice};
/// use crossgfx::software::SoftwareDevice;
///
/// let device = SoftwareDevice::new(DeviceConfig::default())?;
/// let target = device.create_render_target(
///     crossgfx::gfx::render::ColorFormat::R8G8B8A8_UNORM, 256, 256, [0.0, 0.0, 0.0, 1.0])?;
/// # Ok::<(), crossgfx::gfx::Error>(())
/// ```
pub struct SoftwareDevice {
    shared: Arc<SoftwareShared>,
    config: DeviceConfig,
    backbuffers: Vec<Arc<SoftwareResource>>,
    next_backbuffer: Mutex<u32>,
    /// Serializes execution, standing in for the single device queue
    queue: Mutex<()>,
    submissions: AtomicU64,
    frames_presented: AtomicU64,
    draws_executed: AtomicU64,
}

impl SoftwareDevice {
    pub fn new(config: DeviceConfig) -> Result<Self> {
        let shared = Arc::new(SoftwareShared::new(config.track_usage));
        let (width, height) = config.backbuffer_extent;

        let backbuffers = (0..config.backbuffer_count)
            .map(|_| {
                SoftwareResource::new(
                    &shared,
                    ResourceInfo::backbuffer(config.backbuffer_format, width, height),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        gfx_info!(
            SOURCE,
            "Software device created: {} backbuffer(s) {}x{} {:?}",
            backbuffers.len(),
            width,
            height,
            config.backbuffer_format
        );

        Ok(Self {
            shared,
            config,
            backbuffers,
            next_backbuffer: Mutex::new(0),
            queue: Mutex::new(()),
            submissions: AtomicU64::new(0),
            frames_presented: AtomicU64::new(0),
            draws_executed: AtomicU64::new(0),
        })
    }

    /// Ids of every allocation still alive, backbuffers included, oldest first
    pub fn live_resources(&self) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self
            .shared
            .allocations
            .lock()
            .map(|allocations| allocations.values().map(|record| record.id).collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Allocations other than the backbuffers that outlive the device
    fn outstanding_resources(&self) -> Vec<ResourceId> {
        self.live_resources()
            .into_iter()
            .filter(|id| !self.backbuffers.iter().any(|backbuffer| backbuffer.id() == *id))
            .collect()
    }

    /// Usage of a resource as of the last executed barrier
    pub fn executed_usage(&self, resource: &Arc<dyn Resource>) -> Result<ResourceUsage> {
        Ok(software_resource(resource.as_ref())?.current_usage())
    }

    /// Draw calls executed since creation
    pub fn draws_executed(&self) -> u64 {
        self.draws_executed.load(Ordering::Relaxed)
    }

    fn allocate(&self, info: ResourceInfo) -> Result<Arc<dyn Resource>> {
        let resource: Arc<dyn Resource> = SoftwareResource::new(&self.shared, info)?;
        Ok(resource)
    }

    // ===== EXECUTION =====

    fn execute(&self, list: &SoftwareCommandList) -> Result<()> {
        for command in list.commands() {
            match command {
                RecordedCommand::Barrier(batch) => {
                    for (resource, _before, after) in batch {
                        software_resource(resource.as_ref())?.set_usage(*after);
                    }
                }
                RecordedCommand::ClearColor { targets, color } => {
                    for target in targets {
                        Self::fill_color(target, *color)?;
                    }
                }
                RecordedCommand::ClearDepthStencil { target, depth, .. } => {
                    let texel = depth.to_le_bytes();
                    let mut memory = software_resource(target.as_ref())?.memory()?;
                    memory.chunks_exact_mut(texel.len()).for_each(|t| t.copy_from_slice(&texel));
                }
                RecordedCommand::Draw { .. } | RecordedCommand::DrawIndexed { .. } => {
                    self.draws_executed.fetch_add(1, Ordering::Relaxed);
                }
                RecordedCommand::CopyBuffer { src, src_offset, dst, dst_offset, size } => {
                    Self::copy_bytes(src, *src_offset, dst, *dst_offset, *size)?;
                }
                RecordedCommand::CopyBufferToTexture { src, src_offset, dst } => {
                    Self::copy_bytes(src, *src_offset, dst, 0, dst.info().size)?;
                }
                RecordedCommand::CopyTextureToBuffer { src, dst, dst_offset } => {
                    Self::copy_bytes(src, 0, dst, *dst_offset, src.info().size)?;
                }
                RecordedCommand::SetPipelineState(_)
                | RecordedCommand::SetDescriptorTable { .. }
                | RecordedCommand::SetIndexVertexBuffers(_)
                | RecordedCommand::SetViewport(_)
                | RecordedCommand::SetScissor(_)
                | RecordedCommand::BindRenderTargets(_) => {}
            }
        }
        Ok(())
    }

    fn fill_color(target: &Arc<dyn Resource>, color: [f32; 4]) -> Result<()> {
        let format = match target.info().kind {
            ResourceKind::Texture2D(format) => format,
            other => gfx_bail!(SOURCE, InvalidResource, "cannot clear {:?} as a color target", other),
        };
        let texel = format.encode_color(color);
        let mut memory = software_resource(target.as_ref())?.memory()?;
        memory.chunks_exact_mut(texel.len()).for_each(|t| t.copy_from_slice(&texel));
        Ok(())
    }

    fn copy_bytes(
        src: &Arc<dyn Resource>,
        src_offset: u64,
        dst: &Arc<dyn Resource>,
        dst_offset: u64,
        size: u64,
    ) -> Result<()> {
        let (src_start, dst_start, len) = (src_offset as usize, dst_offset as usize, size as usize);
        let src_resource = software_resource(src.as_ref())?;
        let dst_resource = software_resource(dst.as_ref())?;

        if src.id() == dst.id() {
            let mut memory = src_resource.memory()?;
            memory.copy_within(src_start..src_start + len, dst_start);
            return Ok(());
        }

        let source = src_resource.memory()?;
        let mut destination = dst_resource.memory()?;
        destination[dst_start..dst_start + len].copy_from_slice(&source[src_start..src_start + len]);
        Ok(())
    }

    fn software_list(list: &dyn CommandList) -> Result<&SoftwareCommandList> {
        list.as_any().downcast_ref::<SoftwareCommandList>().ok_or_else(|| {
            gfx_err!(SOURCE, InvalidResource, "command list was not created by the software backend")
        })
    }
}

impl GraphicsDevice for SoftwareDevice {
    fn backend(&self) -> Backend {
        Backend::Software
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
        self.allocate(ResourceInfo::render_target(format, width, height, clear_color)?)
    }

    fn create_depth_stencil_target(&self, width: u32, height: u32) -> Result<Arc<dyn Resource>> {
        self.allocate(ResourceInfo::depth_stencil_target(width, height)?)
    }

    fn create_constant_buffer(&self, size: u64) -> Result<Arc<dyn Resource>> {
        let info = ResourceInfo::constant_buffer(size);
        gfx_debug!(SOURCE, "Constant buffer of {} bytes backed by {} bytes", size, info.size);
        self.allocate(info)
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn Resource>> {
        self.allocate(ResourceInfo::linear_buffer(desc)?)
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn Resource>> {
        self.allocate(ResourceInfo::sampled_texture(desc)?)
    }

    fn create_view_heap(&self, entries: &[ViewHeapEntry]) -> Result<Arc<dyn DescriptorHeap>> {
        for entry in entries {
            software_resource(entry.resource.as_ref())?;
        }
        let slots = resolve_view_entries(entries)?;
        let resources = entries.iter().map(|entry| Arc::clone(&entry.resource)).collect();
        Ok(Arc::new(SoftwareDescriptorHeap::new(HeapKind::View, slots, resources)))
    }

    fn create_sampler_heap(&self, entries: &[SamplerHeapEntry]) -> Result<Arc<dyn DescriptorHeap>> {
        let slots = resolve_sampler_entries(entries);
        Ok(Arc::new(SoftwareDescriptorHeap::new(HeapKind::Sampler, slots, Vec::new())))
    }

    fn create_pipeline_state(&self, desc: &PipelineStateDesc) -> Result<Arc<dyn PipelineState>> {
        if desc.vertex_shader.code.is_empty() || desc.fragment_shader.code.is_empty() {
            gfx_bail!(SOURCE, InvalidResource, "pipeline state needs vertex and fragment bytecode");
        }
        Ok(Arc::new(SoftwarePipelineState::new(desc)))
    }

    fn create_command_list(&self) -> Result<Box<dyn CommandList>> {
        Ok(Box::new(SoftwareCommandList::new(Arc::clone(&self.shared))))
    }

    fn submit(&self, command_lists: &[&dyn CommandList]) -> Result<()> {
        let lists = command_lists
            .iter()
            .map(|list| Self::software_list(*list))
            .collect::<Result<Vec<_>>>()?;
        if let Some(index) = lists.iter().position(|list| list.state() != CommandListState::Closed) {
            gfx_bail!(SOURCE, InvalidState, "submit: command list {} is still open", index);
        }

        let _queue = self
            .queue
            .lock()
            .map_err(|_| gfx_err!(SOURCE, BackendError, "queue lock poisoned"))?;
        let pending: Vec<&PendingUsage> = lists.iter().map(|list| list.pending_usage()).collect();
        self.shared.tracker.commit(&pending)?;
        for list in lists {
            self.execute(list)?;
        }
        self.submissions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn wait_for_queue_idle(&self) -> Result<()> {
        // Execution happens inside submit; taking the queue lock waits for
        // any submission running on another thread.
        let _queue = self
            .queue
            .lock()
            .map_err(|_| gfx_err!(SOURCE, BackendError, "queue lock poisoned"))?;
        Ok(())
    }

    fn backbuffer_count(&self) -> u32 {
        self.backbuffers.len() as u32
    }

    fn acquire_next_backbuffer(&self) -> Result<u32> {
        if self.backbuffers.is_empty() {
            gfx_bail!(SOURCE, InvalidState, "device was created without backbuffers");
        }
        let mut next = self
            .next_backbuffer
            .lock()
            .map_err(|_| gfx_err!(SOURCE, BackendError, "backbuffer lock poisoned"))?;
        let index = *next;
        *next = (index + 1) % self.backbuffers.len() as u32;
        Ok(index)
    }

    fn backbuffer(&self, index: u32) -> Result<Arc<dyn Resource>> {
        match self.backbuffers.get(index as usize) {
            Some(backbuffer) => {
                let resource: Arc<dyn Resource> = Arc::clone(backbuffer) as Arc<dyn Resource>;
                Ok(resource)
            }
            None => gfx_bail!(
                SOURCE,
                InvalidResource,
                "backbuffer {} out of range ({} backbuffers)",
                index,
                self.backbuffers.len()
            ),
        }
    }

    fn present(&self, index: u32) -> Result<()> {
        let backbuffer = match self.backbuffers.get(index as usize) {
            Some(backbuffer) => backbuffer,
            None => gfx_bail!(SOURCE, InvalidResource, "present: backbuffer {} out of range", index),
        };
        if self.shared.tracker.is_enabled() && backbuffer.current_usage() != ResourceUsage::Present {
            gfx_bail!(
                SOURCE,
                UsageMismatch,
                "present: backbuffer {} is in {:?}, expected Present",
                index,
                backbuffer.current_usage()
            );
        }
        self.frames_presented.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn usage_tracker(&self) -> &UsageTracker {
        &self.shared.tracker
    }

    fn stats(&self) -> DeviceStats {
        let (live_resources, allocated_bytes) = self
            .shared
            .allocations
            .lock()
            .map(|allocations| {
                let bytes = allocations.values().map(|record| record.bytes).sum();
                (allocations.len() as u64, bytes)
            })
            .unwrap_or((0, 0));
        DeviceStats {
            live_resources,
            allocated_bytes,
            submissions: self.submissions.load(Ordering::Relaxed),
            frames_presented: self.frames_presented.load(Ordering::Relaxed),
        }
    }
}

impl Drop for SoftwareDevice {
    fn drop(&mut self) {
        let outstanding = self.outstanding_resources();
        if !outstanding.is_empty() {
            gfx_warn!(
                SOURCE,
                "Device dropped with {} live resource(s): {:?}",
                outstanding.len(),
                outstanding
            );
        }
    }
}

#[cfg(test)]
#[path = "software_device_tests.rs"]
mod tests;
