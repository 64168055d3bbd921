/// VulkanCommandList - Vulkan implementation of the CommandList trait
///
/// Each list owns its command pool (the "allocator" reset by `open`) and a
/// descriptor pool for the tables it binds. Rendering uses dynamic
/// rendering: binding a render target set only records the targets, and the
/// rendering scope starts at the first draw. Barriers, copies, clears and
/// `close` end it again.

use ash::vk;
use std::any::Any;
use std::sync::Arc;
use crossgfx::gfx::Result;
use crossgfx::gfx::render::{
    ensure_open, validate_buffer_copy, validate_descriptor_table, validate_indexed_draw,
    validate_texture_copy, validate_transition, CommandList, CommandListState, DescriptorHeap, DescriptorRange,
    IndexVertexBuffersSet, PendingUsage, PipelineState, Rect2D, RenderTargetSet, Resource, ResourceFlags,
    ResourceId, ResourceUsage, Transition, Viewport,
};
use crossgfx::{gfx_bail, gfx_err, gfx_trace};

use crate::vulkan_context::GpuContext;
use crate::vulkan_descriptor_heap::{NativeDescriptor, VulkanDescriptorHeap};
use crate::vulkan_format::index_type_to_vk;
use crate::vulkan_pipeline_state::{descriptor_type, VulkanPipelineState};
use crate::vulkan_resource::{full_range, image_format, vulkan_resource, NativeResource};
use crate::vulkan_usage::{barrier_groups, buffer_access, src_stage, usage_state};

const SOURCE: &str = "crossgfx::vulkan::CommandList";

/// Descriptor sets one list can bind between two `open` calls
const MAX_TABLES_PER_LIST: u32 = 256;
const MAX_DESCRIPTORS_PER_TYPE: u32 = 1024;

/// What a rendering scope does with one kind of attachment
#[derive(Clone, Copy)]
enum AttachmentLoad {
    /// Attachment left out of the scope
    Skip,
    Load,
    Clear(vk::ClearValue),
}

/// Vulkan command list
pub struct VulkanCommandList {
    ctx: Arc<GpuContext>,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    descriptor_pool: vk::DescriptorPool,
    state: CommandListState,
    pipeline: Option<Arc<dyn PipelineState>>,
    render_targets: Option<RenderTargetSet>,
    buffers: Option<IndexVertexBuffersSet>,
    /// Inside vkCmdBeginRendering / vkCmdEndRendering
    rendering: bool,
    /// Objects referenced by recorded commands, released on the next open
    retained_resources: Vec<Arc<dyn Resource>>,
    retained_heaps: Vec<Arc<dyn DescriptorHeap>>,
    retained_pipelines: Vec<Arc<dyn PipelineState>>,
    /// Barriers and usage requirements, committed to the tracker on submit
    pending_usage: PendingUsage,
}

impl VulkanCommandList {
    pub(crate) fn new(ctx: Arc<GpuContext>) -> Result<Self> {
        unsafe {
            let command_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(ctx.graphics_queue_family)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT);

            let command_pool = ctx
                .device
                .create_command_pool(&command_pool_create_info, None)
                .map_err(|e| gfx_err!(SOURCE, BackendError, "Failed to create command pool: {:?}", e))?;

            let command_buffer_allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffer = match ctx.device.allocate_command_buffers(&command_buffer_allocate_info) {
                Ok(buffers) => buffers[0],
                Err(e) => {
                    ctx.device.destroy_command_pool(command_pool, None);
                    gfx_bail!(SOURCE, BackendError, "Failed to allocate command buffer: {:?}", e);
                }
            };

            let pool_sizes = [
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: MAX_DESCRIPTORS_PER_TYPE,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::SAMPLED_IMAGE,
                    descriptor_count: MAX_DESCRIPTORS_PER_TYPE,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::SAMPLER,
                    descriptor_count: MAX_DESCRIPTORS_PER_TYPE,
                },
            ];
            let descriptor_pool_info = vk::DescriptorPoolCreateInfo::default()
                .max_sets(MAX_TABLES_PER_LIST)
                .pool_sizes(&pool_sizes);

            let descriptor_pool = match ctx.device.create_descriptor_pool(&descriptor_pool_info, None) {
                Ok(pool) => pool,
                Err(e) => {
                    ctx.device.destroy_command_pool(command_pool, None);
                    gfx_bail!(SOURCE, BackendError, "Failed to create descriptor pool: {:?}", e);
                }
            };

            Ok(Self {
                ctx,
                command_pool,
                command_buffer,
                descriptor_pool,
                state: CommandListState::Closed,
                pipeline: None,
                render_targets: None,
                buffers: None,
                rendering: false,
                retained_resources: Vec::new(),
                retained_heaps: Vec::new(),
                retained_pipelines: Vec::new(),
                pending_usage: PendingUsage::new(),
            })
        }
    }

    /// Get the underlying Vulkan command buffer
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    pub fn pending_usage(&self) -> &PendingUsage {
        &self.pending_usage
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        ensure_open(self.state, SOURCE, operation)
    }

    fn ensure_can_draw(&self, operation: &str) -> Result<()> {
        if self.pipeline.is_none() {
            gfx_bail!(SOURCE, InvalidState, "{}: no pipeline state set", operation);
        }
        if self.render_targets.is_none() {
            gfx_bail!(SOURCE, InvalidState, "{}: no render target set bound", operation);
        }
        Ok(())
    }

    fn retain(&mut self, resource: &Arc<dyn Resource>) {
        self.retained_resources.push(Arc::clone(resource));
    }

    fn vulkan_pipeline(pipeline: &Arc<dyn PipelineState>) -> Result<&VulkanPipelineState> {
        pipeline
            .as_any()
            .downcast_ref::<VulkanPipelineState>()
            .ok_or_else(|| gfx_err!(SOURCE, InvalidResource, "pipeline state was not created by a Vulkan device"))
    }

    fn end_rendering(&mut self) {
        if self.rendering {
            unsafe {
                self.ctx.device.cmd_end_rendering(self.command_buffer);
            }
            self.rendering = false;
        }
    }

    /// Open a rendering scope over `set`
    fn begin_rendering(&mut self, set: &RenderTargetSet, colors: AttachmentLoad, depth: AttachmentLoad) -> Result<()> {
        self.end_rendering();

        let mut color_attachments = Vec::new();
        if !matches!(colors, AttachmentLoad::Skip) {
            for target in set.colors() {
                let view = vulkan_resource(target.as_ref())?
                    .view()
                    .ok_or_else(|| gfx_err!(SOURCE, InvalidResource, "{:?} is not a texture", target.id()))?;
                color_attachments.push(attachment_info(view, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, colors));
            }
        }

        let depth_attachment = match (set.depth(), depth) {
            (Some(target), AttachmentLoad::Load | AttachmentLoad::Clear(_)) => {
                let view = vulkan_resource(target.as_ref())?
                    .view()
                    .ok_or_else(|| gfx_err!(SOURCE, InvalidResource, "{:?} is not a texture", target.id()))?;
                Some(attachment_info(view, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL, depth))
            }
            _ => None,
        };

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: set.width(),
                    height: set.height(),
                },
            })
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth_attachment) = depth_attachment.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth_attachment);
        }

        unsafe {
            self.ctx.device.cmd_begin_rendering(self.command_buffer, &rendering_info);
        }
        self.rendering = true;
        Ok(())
    }

    /// Start rendering into the bound targets unless already inside a scope
    fn ensure_rendering(&mut self) -> Result<()> {
        if self.rendering {
            return Ok(());
        }
        let set = match self.render_targets.clone() {
            Some(set) => set,
            None => gfx_bail!(SOURCE, InvalidState, "no render target set bound"),
        };
        self.begin_rendering(&set, AttachmentLoad::Load, AttachmentLoad::Load)
    }

    /// Build and bind one descriptor set holding the first descriptors of `heap`
    fn write_descriptor_table(
        &mut self,
        root_slot: u32,
        heap: &VulkanDescriptorHeap,
        set_layout: vk::DescriptorSetLayout,
        pipeline_layout: vk::PipelineLayout,
        ranges: &[DescriptorRange],
    ) -> Result<()> {
        // (binding, type, slot)
        let mut plan = Vec::new();
        let mut slot = 0usize;
        for range in ranges {
            let expected = descriptor_type(range.kind)?;
            for i in 0..range.count {
                let native = match heap.native.get(slot) {
                    Some(native) => *native,
                    None => gfx_bail!(
                        SOURCE,
                        InvalidResource,
                        "root slot {} needs {} descriptors, heap has {}",
                        root_slot,
                        ranges.iter().map(|r| r.count).sum::<u32>(),
                        heap.native.len()
                    ),
                };
                if native.descriptor_type() != expected {
                    gfx_bail!(
                        SOURCE,
                        InvalidResource,
                        "heap slot {} holds {:?}, root slot {} expects {:?}",
                        slot,
                        native.descriptor_type(),
                        root_slot,
                        expected
                    );
                }
                plan.push((range.base_binding + i, native));
                slot += 1;
            }
        }

        let set_layouts = [set_layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.descriptor_pool)
            .set_layouts(&set_layouts);

        unsafe {
            let descriptor_set = self
                .ctx
                .device
                .allocate_descriptor_sets(&allocate_info)
                .map_err(|e| {
                    gfx_err!(
                        SOURCE,
                        BackendError,
                        "Failed to allocate descriptor set for root slot {}: {:?}",
                        root_slot,
                        e
                    )
                })?[0];

            let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> = plan
                .iter()
                .map(|(_, native)| match native {
                    NativeDescriptor::UniformBuffer { buffer, offset, range } => [vk::DescriptorBufferInfo {
                        buffer: *buffer,
                        offset: *offset,
                        range: *range,
                    }],
                    _ => [vk::DescriptorBufferInfo::default()],
                })
                .collect();
            let image_infos: Vec<[vk::DescriptorImageInfo; 1]> = plan
                .iter()
                .map(|(_, native)| match native {
                    NativeDescriptor::SampledImage { view } => [vk::DescriptorImageInfo {
                        sampler: vk::Sampler::null(),
                        image_view: *view,
                        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    }],
                    NativeDescriptor::Sampler(sampler) => [vk::DescriptorImageInfo {
                        sampler: *sampler,
                        image_view: vk::ImageView::null(),
                        image_layout: vk::ImageLayout::UNDEFINED,
                    }],
                    NativeDescriptor::UniformBuffer { .. } => [vk::DescriptorImageInfo::default()],
                })
                .collect();

            let writes: Vec<vk::WriteDescriptorSet> = plan
                .iter()
                .enumerate()
                .map(|(index, (binding, native))| {
                    let write = vk::WriteDescriptorSet::default()
                        .dst_set(descriptor_set)
                        .dst_binding(*binding)
                        .dst_array_element(0)
                        .descriptor_type(native.descriptor_type());
                    match native {
                        NativeDescriptor::UniformBuffer { .. } => write.buffer_info(&buffer_infos[index]),
                        _ => write.image_info(&image_infos[index]),
                    }
                })
                .collect();

            self.ctx.device.update_descriptor_sets(&writes, &[]);
            self.ctx.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline_layout,
                root_slot,
                &[descriptor_set],
                &[],
            );
        }
        Ok(())
    }

    /// Region covering the whole of a single-mip texture
    fn texture_region(texture: &Arc<dyn Resource>, buffer_offset: u64) -> vk::BufferImageCopy {
        let info = texture.info();
        let (_, aspect_mask) = image_format(info.kind);
        vk::BufferImageCopy {
            buffer_offset,
            // Tightly packed rows
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width: info.width,
                height: info.height,
                depth: 1,
            },
        }
    }

    /// Make transfer writes into a CPU-readable buffer visible to mapped reads
    fn host_read_barrier(&self, dst: &Arc<dyn Resource>, buffer: vk::Buffer) {
        if !dst.info().flags.contains(ResourceFlags::CPU_READ) {
            return;
        }
        let barrier = vk::BufferMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::HOST_READ)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(buffer)
            .offset(0)
            .size(vk::WHOLE_SIZE);
        unsafe {
            self.ctx.device.cmd_pipeline_barrier(
                self.command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::HOST,
                vk::DependencyFlags::empty(),
                &[],
                &[barrier],
                &[],
            );
        }
    }

    /// Buffer offsets of texture copies must be texel aligned
    fn check_texel_alignment(texture: &Arc<dyn Resource>, buffer_offset: u64) -> Result<()> {
        let texel_size = texture.info().texel_size() as u64;
        if buffer_offset % texel_size.max(4) != 0 {
            gfx_bail!(
                SOURCE,
                InvalidResource,
                "buffer offset {} is not aligned to {} bytes for a copy with {:?}",
                buffer_offset,
                texel_size.max(4),
                texture.id()
            );
        }
        Ok(())
    }
}

fn attachment_info(view: vk::ImageView, layout: vk::ImageLayout, load: AttachmentLoad) -> vk::RenderingAttachmentInfo<'static> {
    let info = vk::RenderingAttachmentInfo::default()
        .image_view(view)
        .image_layout(layout)
        .store_op(vk::AttachmentStoreOp::STORE);
    match load {
        AttachmentLoad::Clear(value) => info.load_op(vk::AttachmentLoadOp::CLEAR).clear_value(value),
        AttachmentLoad::Load | AttachmentLoad::Skip => info.load_op(vk::AttachmentLoadOp::LOAD),
    }
}

impl CommandList for VulkanCommandList {
    fn state(&self) -> CommandListState {
        self.state
    }

    fn open(&mut self) -> Result<()> {
        if self.state == CommandListState::Open {
            gfx_bail!(SOURCE, InvalidState, "open: command list already open");
        }
        unsafe {
            self.ctx
                .device
                .reset_command_pool(self.command_pool, vk::CommandPoolResetFlags::empty())
                .map_err(|e| gfx_err!(SOURCE, BackendError, "Failed to reset command pool: {:?}", e))?;
            self.ctx
                .device
                .reset_descriptor_pool(self.descriptor_pool, vk::DescriptorPoolResetFlags::empty())
                .map_err(|e| gfx_err!(SOURCE, BackendError, "Failed to reset descriptor pool: {:?}", e))?;

            let begin_info = vk::CommandBufferBeginInfo::default();
            self.ctx
                .device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| gfx_err!(SOURCE, BackendError, "Failed to begin command buffer: {:?}", e))?;
        }

        self.retained_resources.clear();
        self.retained_heaps.clear();
        self.retained_pipelines.clear();
        self.pending_usage.clear();
        self.pipeline = None;
        self.render_targets = None;
        self.buffers = None;
        self.rendering = false;
        self.state = CommandListState::Open;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open("close")?;
        self.end_rendering();
        unsafe {
            self.ctx
                .device
                .end_command_buffer(self.command_buffer)
                .map_err(|e| gfx_err!(SOURCE, BackendError, "Failed to end command buffer: {:?}", e))?;
        }
        self.state = CommandListState::Closed;
        gfx_trace!(
            SOURCE,
            "Closed ({} resources, {} heaps retained)",
            self.retained_resources.len(),
            self.retained_heaps.len()
        );
        Ok(())
    }

    fn resource_barriers(&mut self, transitions: &[Transition<'_>]) -> Result<()> {
        self.ensure_open("resource_barriers")?;
        for transition in transitions {
            validate_transition(transition)?;
            vulkan_resource(transition.resource.as_ref())?;
        }
        self.ctx.tracker.stage(&mut self.pending_usage, transitions)?;

        // Layout transitions are not allowed inside a rendering scope
        self.end_rendering();

        let ids: Vec<ResourceId> = transitions.iter().map(|t| t.resource.id()).collect();
        for group in barrier_groups(&ids) {
            let mut image_barriers = Vec::new();
            let mut buffer_barriers = Vec::new();
            let mut src_stages = vk::PipelineStageFlags::empty();
            let mut dst_stages = vk::PipelineStageFlags::empty();

            for transition in &transitions[group] {
                let resource = vulkan_resource(transition.resource.as_ref())?;
                let before = usage_state(transition.before);
                let after = usage_state(transition.after);
                src_stages |= src_stage(transition.before);
                dst_stages |= after.stage;

                match resource.native {
                    NativeResource::Buffer(buffer) => buffer_barriers.push(
                        vk::BufferMemoryBarrier::default()
                            .src_access_mask(buffer_access(transition.before))
                            .dst_access_mask(buffer_access(transition.after))
                            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                            .buffer(buffer)
                            .offset(0)
                            .size(vk::WHOLE_SIZE),
                    ),
                    NativeResource::Image { image, .. } => {
                        let (_, aspect_mask) = image_format(resource.info().kind);
                        image_barriers.push(
                            vk::ImageMemoryBarrier::default()
                                .old_layout(before.layout)
                                .new_layout(after.layout)
                                .src_access_mask(before.access)
                                .dst_access_mask(after.access)
                                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                                .image(image)
                                .subresource_range(full_range(aspect_mask)),
                        )
                    }
                }
            }

            unsafe {
                self.ctx.device.cmd_pipeline_barrier(
                    self.command_buffer,
                    src_stages,
                    dst_stages,
                    vk::DependencyFlags::empty(),
                    &[],
                    &buffer_barriers,
                    &image_barriers,
                );
            }
        }

        for transition in transitions {
            self.retain(transition.resource);
        }
        Ok(())
    }

    fn set_pipeline_state(&mut self, pipeline: &Arc<dyn PipelineState>) -> Result<()> {
        self.ensure_open("set_pipeline_state")?;
        let native = Self::vulkan_pipeline(pipeline)?.pipeline;
        unsafe {
            self.ctx
                .device
                .cmd_bind_pipeline(self.command_buffer, vk::PipelineBindPoint::GRAPHICS, native);
        }
        self.pipeline = Some(Arc::clone(pipeline));
        self.retained_pipelines.push(Arc::clone(pipeline));
        Ok(())
    }

    fn set_descriptor_table(&mut self, root_slot: u32, heap: &Arc<dyn DescriptorHeap>) -> Result<()> {
        self.ensure_open("set_descriptor_table")?;
        let ranges = validate_descriptor_table(self.pipeline.as_ref(), root_slot, heap.as_ref())?
            .ranges
            .clone();
        let vk_heap = heap
            .as_any()
            .downcast_ref::<VulkanDescriptorHeap>()
            .ok_or_else(|| gfx_err!(SOURCE, InvalidResource, "descriptor heap was not created by a Vulkan device"))?;

        let (set_layout, pipeline_layout) = match self.pipeline.as_ref() {
            Some(pipeline) => {
                let vk_pipeline = Self::vulkan_pipeline(pipeline)?;
                match vk_pipeline.set_layouts.get(root_slot as usize) {
                    Some(set_layout) => (*set_layout, vk_pipeline.pipeline_layout),
                    None => gfx_bail!(SOURCE, InvalidResource, "root slot {} has no set layout", root_slot),
                }
            }
            None => gfx_bail!(SOURCE, InvalidState, "set_descriptor_table: no pipeline state set"),
        };

        self.write_descriptor_table(root_slot, vk_heap, set_layout, pipeline_layout, &ranges)?;
        self.retained_heaps.push(Arc::clone(heap));
        Ok(())
    }

    fn set_index_vertex_buffers_set(&mut self, set: &IndexVertexBuffersSet) -> Result<()> {
        self.ensure_open("set_index_vertex_buffers_set")?;

        let mut buffers = Vec::with_capacity(set.vertex_buffers().len());
        let mut offsets = Vec::with_capacity(set.vertex_buffers().len());
        for view in set.vertex_buffers() {
            buffers.push(vulkan_resource(view.buffer.as_ref())?.expect_buffer()?);
            offsets.push(view.offset);
        }
        let index = match set.index_buffer() {
            Some(view) => Some((
                vulkan_resource(view.buffer.as_ref())?.expect_buffer()?,
                view.offset,
                index_type_to_vk(view.index_type),
            )),
            None => None,
        };

        unsafe {
            if !buffers.is_empty() {
                self.ctx
                    .device
                    .cmd_bind_vertex_buffers(self.command_buffer, 0, &buffers, &offsets);
            }
            if let Some((buffer, offset, index_type)) = index {
                self.ctx
                    .device
                    .cmd_bind_index_buffer(self.command_buffer, buffer, offset, index_type);
            }
        }

        for view in set.vertex_buffers() {
            self.retained_resources.push(Arc::clone(&view.buffer));
        }
        if let Some(view) = set.index_buffer() {
            self.retained_resources.push(Arc::clone(&view.buffer));
        }
        self.buffers = Some(set.clone());
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.ensure_open("set_viewport")?;
        let vk_viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        unsafe {
            self.ctx.device.cmd_set_viewport(self.command_buffer, 0, &[vk_viewport]);
        }
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        self.ensure_open("set_scissor")?;
        let vk_scissor = vk::Rect2D {
            offset: vk::Offset2D { x: scissor.x, y: scissor.y },
            extent: vk::Extent2D {
                width: scissor.width,
                height: scissor.height,
            },
        };
        unsafe {
            self.ctx.device.cmd_set_scissor(self.command_buffer, 0, &[vk_scissor]);
        }
        Ok(())
    }

    fn clear_render_target_set(&mut self, set: &RenderTargetSet, color: [f32; 4]) -> Result<()> {
        self.ensure_open("clear_render_target_set")?;
        for target in set.colors() {
            vulkan_resource(target.as_ref())?;
            self.ctx.tracker.stage_expect(&mut self.pending_usage, target.id(), ResourceUsage::RenderTarget)?;
        }
        if set.colors().is_empty() {
            return Ok(());
        }

        let clear = vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        };
        self.begin_rendering(set, AttachmentLoad::Clear(clear), AttachmentLoad::Skip)?;
        self.end_rendering();

        for target in set.colors() {
            self.retain(target);
        }
        Ok(())
    }

    fn clear_depth_stencil(&mut self, set: &RenderTargetSet, depth: f32, stencil: u8) -> Result<()> {
        self.ensure_open("clear_depth_stencil")?;
        let target = match set.depth() {
            Some(target) => Arc::clone(target),
            None => return Ok(()),
        };
        vulkan_resource(target.as_ref())?;
        self.ctx.tracker.stage_expect(&mut self.pending_usage, target.id(), ResourceUsage::DepthWrite)?;

        let clear = vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth,
                stencil: stencil as u32,
            },
        };
        self.begin_rendering(set, AttachmentLoad::Skip, AttachmentLoad::Clear(clear))?;
        self.end_rendering();

        self.retain(&target);
        Ok(())
    }

    fn bind_render_target_set(&mut self, set: &RenderTargetSet) -> Result<()> {
        self.ensure_open("bind_render_target_set")?;
        for target in set.colors().iter().chain(set.depth()) {
            vulkan_resource(target.as_ref())?;
        }

        // The next draw opens a scope over the new targets
        self.end_rendering();
        for target in set.colors().iter().chain(set.depth()) {
            self.retained_resources.push(Arc::clone(target));
        }
        self.render_targets = Some(set.clone());

        self.set_viewport(Viewport::full(set.width(), set.height()))?;
        self.set_scissor(Rect2D::full(set.width(), set.height()))
    }

    fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()> {
        self.ensure_open("draw_instanced")?;
        self.ensure_can_draw("draw_instanced")?;
        self.ensure_rendering()?;
        unsafe {
            self.ctx.device.cmd_draw(
                self.command_buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
        Ok(())
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Result<()> {
        self.ensure_open("draw_indexed_instanced")?;
        self.ensure_can_draw("draw_indexed_instanced")?;
        let index_buffer = self.buffers.as_ref().and_then(|set| set.index_buffer());
        validate_indexed_draw(index_buffer, first_index, index_count)?;
        self.ensure_rendering()?;
        unsafe {
            self.ctx.device.cmd_draw_indexed(
                self.command_buffer,
                index_count,
                instance_count,
                first_index,
                base_vertex,
                first_instance,
            );
        }
        Ok(())
    }

    fn copy_buffer_to_buffer(
        &mut self,
        src: &Arc<dyn Resource>,
        src_offset: u64,
        dst: &Arc<dyn Resource>,
        dst_offset: u64,
        size: u64,
    ) -> Result<()> {
        self.ensure_open("copy_buffer_to_buffer")?;
        let src_buffer = vulkan_resource(src.as_ref())?.expect_buffer()?;
        let dst_buffer = vulkan_resource(dst.as_ref())?.expect_buffer()?;
        validate_buffer_copy(src, src_offset, dst, dst_offset, size)?;

        self.end_rendering();
        let region = vk::BufferCopy {
            src_offset,
            dst_offset,
            size,
        };
        unsafe {
            self.ctx
                .device
                .cmd_copy_buffer(self.command_buffer, src_buffer, dst_buffer, &[region]);
        }
        self.host_read_barrier(dst, dst_buffer);
        self.retain(src);
        self.retain(dst);
        Ok(())
    }

    fn copy_buffer_to_texture(
        &mut self,
        src: &Arc<dyn Resource>,
        src_offset: u64,
        dst: &Arc<dyn Resource>,
    ) -> Result<()> {
        self.ensure_open("copy_buffer_to_texture")?;
        let src_buffer = vulkan_resource(src.as_ref())?.expect_buffer()?;
        let dst_image = vulkan_resource(dst.as_ref())?.expect_image()?;
        validate_texture_copy(src, src_offset, dst)?;
        if !dst.info().flags.contains(ResourceFlags::TRANSFER_DST) {
            gfx_bail!(SOURCE, InvalidResource, "texture {:?} cannot be a copy destination", dst.id());
        }
        Self::check_texel_alignment(dst, src_offset)?;
        self.ctx.tracker.stage_expect(&mut self.pending_usage, dst.id(), ResourceUsage::CopyDest)?;

        self.end_rendering();
        let region = Self::texture_region(dst, src_offset);
        unsafe {
            self.ctx.device.cmd_copy_buffer_to_image(
                self.command_buffer,
                src_buffer,
                dst_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
        self.retain(src);
        self.retain(dst);
        Ok(())
    }

    fn copy_texture_to_buffer(
        &mut self,
        src: &Arc<dyn Resource>,
        dst: &Arc<dyn Resource>,
        dst_offset: u64,
    ) -> Result<()> {
        self.ensure_open("copy_texture_to_buffer")?;
        let src_image = vulkan_resource(src.as_ref())?.expect_image()?;
        let dst_buffer = vulkan_resource(dst.as_ref())?.expect_buffer()?;
        validate_texture_copy(dst, dst_offset, src)?;
        if !src.info().flags.contains(ResourceFlags::TRANSFER_SRC) {
            gfx_bail!(SOURCE, InvalidResource, "texture {:?} cannot be a copy source", src.id());
        }
        Self::check_texel_alignment(src, dst_offset)?;
        self.ctx.tracker.stage_expect(&mut self.pending_usage, src.id(), ResourceUsage::CopySource)?;

        self.end_rendering();
        let region = Self::texture_region(src, dst_offset);
        unsafe {
            self.ctx.device.cmd_copy_image_to_buffer(
                self.command_buffer,
                src_image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst_buffer,
                &[region],
            );
        }
        self.host_read_barrier(dst, dst_buffer);
        self.retain(src);
        self.retain(dst);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanCommandList {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_descriptor_pool(self.descriptor_pool, None);
            // Frees the command buffer too
            self.ctx.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
