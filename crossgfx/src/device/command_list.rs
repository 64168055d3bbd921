/// CommandList trait - for recording GPU commands
///
/// State machine: created `Closed`, `open()` resets the backing allocator and
/// moves to `Open`, recording is only valid while `Open`, `close()` moves back
/// to `Closed`, and only closed lists can be submitted. Submitting does not
/// change the state. Dropping the list releases it from any state.
///
/// Reopening a list whose previous submission is still running on the GPU
/// corrupts that work; wait with `GraphicsDevice::wait_for_queue_idle` first.

use std::any::Any;
use std::sync::Arc;
use crate::device::{
    DescriptorHeap, DescriptorTableLayout, HeapKind, IndexBufferView, IndexVertexBuffersSet,
    PipelineState, RenderTargetSet, Resource, Transition,
};
use crate::error::Result;
use crate::gfx_bail;

/// Recording state of a command list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandListState {
    Closed,
    Open,
}

/// Viewport dimensions and depth range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-surface viewport with a [0, 1] depth range
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// 2D rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2D {
    pub fn full(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }
}

/// Command list for recording GPU commands
pub trait CommandList: Send + Sync + 'static {
    fn state(&self) -> CommandListState;

    /// Reset allocator and list, start recording
    fn open(&mut self) -> Result<()>;

    /// Stop recording
    fn close(&mut self) -> Result<()>;

    /// Record every transition as one batch, in input order
    ///
    /// No reordering and no deduplication: a resource listed twice gets two
    /// barriers.
    fn resource_barriers(&mut self, transitions: &[Transition<'_>]) -> Result<()>;

    /// Set pipeline, root layout and primitive topology
    fn set_pipeline_state(&mut self, pipeline: &Arc<dyn PipelineState>) -> Result<()>;

    /// Bind a heap to a root slot of the current pipeline
    fn set_descriptor_table(&mut self, root_slot: u32, heap: &Arc<dyn DescriptorHeap>) -> Result<()>;

    fn set_index_vertex_buffers_set(&mut self, set: &IndexVertexBuffersSet) -> Result<()>;

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()>;

    /// Clear every color member of the set
    fn clear_render_target_set(&mut self, set: &RenderTargetSet, color: [f32; 4]) -> Result<()>;

    /// Clear the depth member of the set. Does nothing if it has none.
    fn clear_depth_stencil(&mut self, set: &RenderTargetSet, depth: f32, stencil: u8) -> Result<()>;

    /// Make the set the render destination and cover it with viewport and scissor
    fn bind_render_target_set(&mut self, set: &RenderTargetSet) -> Result<()>;

    fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()>;

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Result<()>;

    fn copy_buffer_to_buffer(
        &mut self,
        src: &Arc<dyn Resource>,
        src_offset: u64,
        dst: &Arc<dyn Resource>,
        dst_offset: u64,
        size: u64,
    ) -> Result<()>;

    /// Copy tightly packed rows from `src` into the whole of texture `dst`
    fn copy_buffer_to_texture(
        &mut self,
        src: &Arc<dyn Resource>,
        src_offset: u64,
        dst: &Arc<dyn Resource>,
    ) -> Result<()>;

    /// Copy the whole of texture `src` into `dst` as tightly packed rows
    fn copy_texture_to_buffer(
        &mut self,
        src: &Arc<dyn Resource>,
        dst: &Arc<dyn Resource>,
        dst_offset: u64,
    ) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

/// Fail with `InvalidState` unless the list is recording
pub fn ensure_open(state: CommandListState, source: &str, operation: &str) -> Result<()> {
    if state != CommandListState::Open {
        gfx_bail!(source, InvalidState, "{}: command list is not open", operation);
    }
    Ok(())
}

/// Table layout a heap is about to be bound to
///
/// The root slot must exist in the pipeline's layout, and sampler heaps only
/// go to sampler tables.
pub fn validate_descriptor_table<'a>(
    pipeline: Option<&'a Arc<dyn PipelineState>>,
    root_slot: u32,
    heap: &dyn DescriptorHeap,
) -> Result<&'a DescriptorTableLayout> {
    let pipeline = match pipeline {
        Some(pipeline) => pipeline,
        None => gfx_bail!("crossgfx::binding", InvalidState, "set_descriptor_table: no pipeline state set"),
    };
    let table = match pipeline.root_layout().table(root_slot) {
        Some(table) => table,
        None => gfx_bail!(
            "crossgfx::binding",
            InvalidResource,
            "root slot {} is outside the pipeline layout ({} tables)",
            root_slot,
            pipeline.root_layout().tables.len()
        ),
    };
    let heap_is_sampler = heap.kind() == HeapKind::Sampler;
    if table.is_sampler_table() != heap_is_sampler {
        gfx_bail!(
            "crossgfx::binding",
            InvalidResource,
            "root slot {} expects a {} table, got a {:?} heap",
            root_slot,
            if table.is_sampler_table() { "sampler" } else { "view" },
            heap.kind()
        );
    }
    Ok(table)
}

/// Check an indexed draw against the bound index stream
pub fn validate_indexed_draw(index_buffer: Option<&IndexBufferView>, first_index: u32, index_count: u32) -> Result<()> {
    match index_buffer {
        None => gfx_bail!("crossgfx::draw", InvalidState, "draw_indexed_instanced: no index buffer bound"),
        Some(view) if first_index as u64 + index_count as u64 > view.index_count() => gfx_bail!(
            "crossgfx::draw",
            InvalidResource,
            "draw of {} indices from {} exceeds index buffer ({} indices)",
            index_count,
            first_index,
            view.index_count()
        ),
        Some(_) => Ok(()),
    }
}

/// Check a buffer-to-buffer copy range
pub fn validate_buffer_copy(
    src: &Arc<dyn Resource>,
    src_offset: u64,
    dst: &Arc<dyn Resource>,
    dst_offset: u64,
    size: u64,
) -> Result<()> {
    let (src_info, dst_info) = (src.info(), dst.info());
    if !src_info.is_buffer() || !dst_info.is_buffer() {
        gfx_bail!("crossgfx::copy", InvalidResource, "buffer copy between non-buffer resources");
    }
    if src_offset.saturating_add(size) > src_info.size || dst_offset.saturating_add(size) > dst_info.size {
        gfx_bail!(
            "crossgfx::copy",
            InvalidResource,
            "copy of {} bytes ({} -> {}) exceeds buffer bounds ({} / {})",
            size,
            src_offset,
            dst_offset,
            src_info.size,
            dst_info.size
        );
    }
    Ok(())
}

/// Check a copy between `buffer` at `buffer_offset` and the whole of `texture`
pub fn validate_texture_copy(buffer: &Arc<dyn Resource>, buffer_offset: u64, texture: &Arc<dyn Resource>) -> Result<()> {
    let (buffer_info, texture_info) = (buffer.info(), texture.info());
    if !buffer_info.is_buffer() {
        gfx_bail!("crossgfx::copy", InvalidResource, "{:?} is not a buffer", buffer.id());
    }
    if texture_info.is_buffer() {
        gfx_bail!("crossgfx::copy", InvalidResource, "{:?} is not a texture", texture.id());
    }
    if buffer_offset.saturating_add(texture_info.size) > buffer_info.size {
        gfx_bail!(
            "crossgfx::copy",
            InvalidResource,
            "texture of {} bytes does not fit in buffer of {} bytes at offset {}",
            texture_info.size,
            buffer_info.size,
            buffer_offset
        );
    }
    Ok(())
}
