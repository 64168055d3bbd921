/// SoftwareCommandList - records commands for execution at submit time

use std::any::Any;
use std::sync::Arc;
use crate::device::{
    ensure_open, validate_buffer_copy, validate_descriptor_table, validate_indexed_draw,
    validate_texture_copy, validate_transition, CommandList, CommandListState, DescriptorHeap, IndexVertexBuffersSet,
    PendingUsage, PipelineState, Rect2D, RenderTargetSet, Resource, ResourceFlags, ResourceUsage, Transition,
    Viewport,
};
use crate::error::Result;
use crate::software::software_resource::{software_resource, SoftwareShared};
use crate::{gfx_bail, gfx_trace};

const SOURCE: &str = "crossgfx::software::CommandList";

/// One recorded command
#[derive(Clone)]
pub enum RecordedCommand {
    Barrier(Vec<(Arc<dyn Resource>, ResourceUsage, ResourceUsage)>),
    SetPipelineState(Arc<dyn PipelineState>),
    SetDescriptorTable { root_slot: u32, heap: Arc<dyn DescriptorHeap> },
    SetIndexVertexBuffers(IndexVertexBuffersSet),
    SetViewport(Viewport),
    SetScissor(Rect2D),
    ClearColor { targets: Vec<Arc<dyn Resource>>, color: [f32; 4] },
    ClearDepthStencil { target: Arc<dyn Resource>, depth: f32, stencil: u8 },
    BindRenderTargets(RenderTargetSet),
    Draw { vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32 },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    },
    CopyBuffer {
        src: Arc<dyn Resource>,
        src_offset: u64,
        dst: Arc<dyn Resource>,
        dst_offset: u64,
        size: u64,
    },
    CopyBufferToTexture { src: Arc<dyn Resource>, src_offset: u64, dst: Arc<dyn Resource> },
    CopyTextureToBuffer { src: Arc<dyn Resource>, dst: Arc<dyn Resource>, dst_offset: u64 },
}

impl RecordedCommand {
    /// Short name, for logs and assertions
    pub fn name(&self) -> &'static str {
        match self {
            RecordedCommand::Barrier(_) => "Barrier",
            RecordedCommand::SetPipelineState(_) => "SetPipelineState",
            RecordedCommand::SetDescriptorTable { .. } => "SetDescriptorTable",
            RecordedCommand::SetIndexVertexBuffers(_) => "SetIndexVertexBuffers",
            RecordedCommand::SetViewport(_) => "SetViewport",
            RecordedCommand::SetScissor(_) => "SetScissor",
            RecordedCommand::ClearColor { .. } => "ClearColor",
            RecordedCommand::ClearDepthStencil { .. } => "ClearDepthStencil",
            RecordedCommand::BindRenderTargets(_) => "BindRenderTargets",
            RecordedCommand::Draw { .. } => "Draw",
            RecordedCommand::DrawIndexed { .. } => "DrawIndexed",
            RecordedCommand::CopyBuffer { .. } => "CopyBuffer",
            RecordedCommand::CopyBufferToTexture { .. } => "CopyBufferToTexture",
            RecordedCommand::CopyTextureToBuffer { .. } => "CopyTextureToBuffer",
        }
    }

    /// True for commands that write resource memory or produce draws
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            RecordedCommand::ClearColor { .. }
                | RecordedCommand::ClearDepthStencil { .. }
                | RecordedCommand::Draw { .. }
                | RecordedCommand::DrawIndexed { .. }
                | RecordedCommand::CopyBuffer { .. }
                | RecordedCommand::CopyBufferToTexture { .. }
                | RecordedCommand::CopyTextureToBuffer { .. }
        )
    }
}

/// Software command list
pub struct SoftwareCommandList {
    shared: Arc<SoftwareShared>,
    state: CommandListState,
    /// Recorded commands (the "allocator" reset on open)
    commands: Vec<RecordedCommand>,
    pipeline: Option<Arc<dyn PipelineState>>,
    render_targets: Option<RenderTargetSet>,
    buffers: Option<IndexVertexBuffersSet>,
    /// Barriers and usage requirements, committed to the tracker on submit
    pending_usage: PendingUsage,
}

impl SoftwareCommandList {
    pub(crate) fn new(shared: Arc<SoftwareShared>) -> Self {
        Self {
            shared,
            state: CommandListState::Closed,
            commands: Vec::new(),
            pipeline: None,
            render_targets: None,
            buffers: None,
            pending_usage: PendingUsage::new(),
        }
    }

    /// Commands recorded since the last open
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    pub fn pending_usage(&self) -> &PendingUsage {
        &self.pending_usage
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        ensure_open(self.state, SOURCE, operation)
    }

    fn ensure_software(resources: &[&Arc<dyn Resource>]) -> Result<()> {
        for resource in resources {
            software_resource(resource.as_ref())?;
        }
        Ok(())
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
}

impl CommandList for SoftwareCommandList {
    fn state(&self) -> CommandListState {
        self.state
    }

    fn open(&mut self) -> Result<()> {
        if self.state == CommandListState::Open {
            gfx_bail!(SOURCE, InvalidState, "open: command list already open");
        }
        self.commands.clear();
        self.pending_usage.clear();
        self.pipeline = None;
        self.render_targets = None;
        self.buffers = None;
        self.state = CommandListState::Open;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open("close")?;
        self.state = CommandListState::Closed;
        gfx_trace!(SOURCE, "Closed with {} command(s)", self.commands.len());
        Ok(())
    }

    fn resource_barriers(&mut self, transitions: &[Transition<'_>]) -> Result<()> {
        self.ensure_open("resource_barriers")?;
        for transition in transitions {
            validate_transition(transition)?;
            software_resource(transition.resource.as_ref())?;
        }
        self.shared.tracker.stage(&mut self.pending_usage, transitions)?;

        let batch = transitions
            .iter()
            .map(|t| (Arc::clone(t.resource), t.before, t.after))
            .collect();
        self.commands.push(RecordedCommand::Barrier(batch));
        Ok(())
    }

    fn set_pipeline_state(&mut self, pipeline: &Arc<dyn PipelineState>) -> Result<()> {
        self.ensure_open("set_pipeline_state")?;
        self.pipeline = Some(Arc::clone(pipeline));
        self.commands.push(RecordedCommand::SetPipelineState(Arc::clone(pipeline)));
        Ok(())
    }

    fn set_descriptor_table(&mut self, root_slot: u32, heap: &Arc<dyn DescriptorHeap>) -> Result<()> {
        self.ensure_open("set_descriptor_table")?;
        validate_descriptor_table(self.pipeline.as_ref(), root_slot, heap.as_ref())?;
        self.commands.push(RecordedCommand::SetDescriptorTable { root_slot, heap: Arc::clone(heap) });
        Ok(())
    }

    fn set_index_vertex_buffers_set(&mut self, set: &IndexVertexBuffersSet) -> Result<()> {
        self.ensure_open("set_index_vertex_buffers_set")?;
        self.buffers = Some(set.clone());
        self.commands.push(RecordedCommand::SetIndexVertexBuffers(set.clone()));
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.ensure_open("set_viewport")?;
        self.commands.push(RecordedCommand::SetViewport(viewport));
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        self.ensure_open("set_scissor")?;
        self.commands.push(RecordedCommand::SetScissor(scissor));
        Ok(())
    }

    fn clear_render_target_set(&mut self, set: &RenderTargetSet, color: [f32; 4]) -> Result<()> {
        self.ensure_open("clear_render_target_set")?;
        for target in set.colors() {
            software_resource(target.as_ref())?;
            self.shared.tracker.stage_expect(&mut self.pending_usage, target.id(), ResourceUsage::RenderTarget)?;
        }
        self.commands.push(RecordedCommand::ClearColor { targets: set.colors().to_vec(), color });
        Ok(())
    }

    fn clear_depth_stencil(&mut self, set: &RenderTargetSet, depth: f32, stencil: u8) -> Result<()> {
        self.ensure_open("clear_depth_stencil")?;
        if let Some(target) = set.depth() {
            software_resource(target.as_ref())?;
            self.shared.tracker.stage_expect(&mut self.pending_usage, target.id(), ResourceUsage::DepthWrite)?;
            self.commands.push(RecordedCommand::ClearDepthStencil {
                target: Arc::clone(target),
                depth,
                stencil,
            });
        }
        Ok(())
    }

    fn bind_render_target_set(&mut self, set: &RenderTargetSet) -> Result<()> {
        self.ensure_open("bind_render_target_set")?;
        for target in set.colors().iter().chain(set.depth()) {
            software_resource(target.as_ref())?;
        }
        self.render_targets = Some(set.clone());
        self.commands.push(RecordedCommand::BindRenderTargets(set.clone()));
        self.commands.push(RecordedCommand::SetViewport(Viewport::full(set.width(), set.height())));
        self.commands.push(RecordedCommand::SetScissor(Rect2D::full(set.width(), set.height())));
        Ok(())
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
        self.commands.push(RecordedCommand::Draw { vertex_count, instance_count, first_vertex, first_instance });
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
        self.commands.push(RecordedCommand::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        });
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
        Self::ensure_software(&[src, dst])?;
        validate_buffer_copy(src, src_offset, dst, dst_offset, size)?;
        self.commands.push(RecordedCommand::CopyBuffer {
            src: Arc::clone(src),
            src_offset,
            dst: Arc::clone(dst),
            dst_offset,
            size,
        });
        Ok(())
    }

    fn copy_buffer_to_texture(
        &mut self,
        src: &Arc<dyn Resource>,
        src_offset: u64,
        dst: &Arc<dyn Resource>,
    ) -> Result<()> {
        self.ensure_open("copy_buffer_to_texture")?;
        Self::ensure_software(&[src, dst])?;
        validate_texture_copy(src, src_offset, dst)?;
        if !dst.info().flags.contains(ResourceFlags::TRANSFER_DST) {
            gfx_bail!(SOURCE, InvalidResource, "texture {:?} cannot be a copy destination", dst.id());
        }
        self.shared.tracker.stage_expect(&mut self.pending_usage, dst.id(), ResourceUsage::CopyDest)?;
        self.commands.push(RecordedCommand::CopyBufferToTexture {
            src: Arc::clone(src),
            src_offset,
            dst: Arc::clone(dst),
        });
        Ok(())
    }

    fn copy_texture_to_buffer(
        &mut self,
        src: &Arc<dyn Resource>,
        dst: &Arc<dyn Resource>,
        dst_offset: u64,
    ) -> Result<()> {
        self.ensure_open("copy_texture_to_buffer")?;
        Self::ensure_software(&[src, dst])?;
        validate_texture_copy(dst, dst_offset, src)?;
        if !src.info().flags.contains(ResourceFlags::TRANSFER_SRC) {
            gfx_bail!(SOURCE, InvalidResource, "texture {:?} cannot be a copy source", src.id());
        }
        self.shared.tracker.stage_expect(&mut self.pending_usage, src.id(), ResourceUsage::CopySource)?;
        self.commands.push(RecordedCommand::CopyTextureToBuffer {
            src: Arc::clone(src),
            dst: Arc::clone(dst),
            dst_offset,
        });
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
