/// IndexVertexBuffersSet - vertex streams plus optional index buffer, bound as one

use std::sync::Arc;
use bytemuck::{Pod, Zeroable};
use crate::device::{
    Resource, ResourceFlags, VertexAttribute, VertexBinding, VertexFormat, VertexInputRate, VertexLayout,
};
use crate::error::Result;
use crate::gfx_bail;

/// Index buffer element type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// 16-bit indices
    U16,
    /// 32-bit indices
    U32,
}

impl IndexType {
    /// Size in bytes of one index element
    pub fn size_bytes(&self) -> u32 {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

/// One vertex stream
#[derive(Clone)]
pub struct VertexBufferView {
    pub buffer: Arc<dyn Resource>,
    pub offset: u64,
    pub stride: u32,
}

impl VertexBufferView {
    pub fn new(buffer: &Arc<dyn Resource>, stride: u32) -> Self {
        Self { buffer: Arc::clone(buffer), offset: 0, stride }
    }
}

/// Index stream
#[derive(Clone)]
pub struct IndexBufferView {
    pub buffer: Arc<dyn Resource>,
    pub offset: u64,
    pub index_type: IndexType,
}

impl IndexBufferView {
    pub fn new(buffer: &Arc<dyn Resource>, index_type: IndexType) -> Self {
        Self { buffer: Arc::clone(buffer), offset: 0, index_type }
    }

    /// Number of indices that fit after `offset`
    pub fn index_count(&self) -> u64 {
        self.buffer.info().size.saturating_sub(self.offset) / self.index_type.size_bytes() as u64
    }
}

/// Vertex streams in binding order plus an optional index stream
#[derive(Clone)]
pub struct IndexVertexBuffersSet {
    vertex_buffers: Vec<VertexBufferView>,
    index_buffer: Option<IndexBufferView>,
}

impl IndexVertexBuffersSet {
    pub fn new(vertex_buffers: Vec<VertexBufferView>, index_buffer: Option<IndexBufferView>) -> Result<Self> {
        for (binding, view) in vertex_buffers.iter().enumerate() {
            if !view.buffer.info().flags.contains(ResourceFlags::VERTEX_BUFFER) {
                gfx_bail!(
                    "crossgfx::IndexVertexBuffersSet",
                    InvalidResource,
                    "buffer at binding {} cannot be used as a vertex buffer",
                    binding
                );
            }
            if view.stride == 0 {
                gfx_bail!(
                    "crossgfx::IndexVertexBuffersSet",
                    InvalidResource,
                    "vertex binding {} has a zero stride",
                    binding
                );
            }
        }
        if let Some(index) = &index_buffer {
            if !index.buffer.info().flags.contains(ResourceFlags::INDEX_BUFFER) {
                gfx_bail!(
                    "crossgfx::IndexVertexBuffersSet",
                    InvalidResource,
                    "buffer {:?} cannot be used as an index buffer",
                    index.buffer.id()
                );
            }
        }
        Ok(Self { vertex_buffers, index_buffer })
    }

    pub fn vertex_buffers(&self) -> &[VertexBufferView] {
        &self.vertex_buffers
    }

    pub fn index_buffer(&self) -> Option<&IndexBufferView> {
        self.index_buffer.as_ref()
    }
}

/// Vertex of screen-space passes: clip-space position plus texture coordinates
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ScreenVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl ScreenVertex {
    pub const STRIDE: u32 = std::mem::size_of::<ScreenVertex>() as u32;

    /// Layout matching `ScreenVertex` at binding 0: position at location 0, uv at 1
    pub fn layout() -> VertexLayout {
        VertexLayout {
            bindings: vec![VertexBinding { binding: 0, stride: Self::STRIDE, input_rate: VertexInputRate::Vertex }],
            attributes: vec![
                VertexAttribute { location: 0, binding: 0, format: VertexFormat::R32G32_SFLOAT, offset: 0 },
                VertexAttribute { location: 1, binding: 0, format: VertexFormat::R32G32_SFLOAT, offset: 8 },
            ],
        }
    }
}

/// One triangle covering the whole viewport; uv spans [0, 1] inside it
pub const FULLSCREEN_TRIANGLE: [ScreenVertex; 3] = [
    ScreenVertex { position: [-1.0, -1.0], uv: [0.0, 0.0] },
    ScreenVertex { position: [-1.0, 3.0], uv: [0.0, 2.0] },
    ScreenVertex { position: [3.0, -1.0], uv: [2.0, 0.0] },
];
