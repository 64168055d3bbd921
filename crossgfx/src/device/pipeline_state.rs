/// Pipeline state objects and their descriptors
///
/// A pipeline state pairs opaque shader bytecode with the root layout (the
/// descriptor tables it expects, in slot order) and fixed-function state.

use std::any::Any;
use std::path::Path;
use crate::device::{ColorFormat, DepthFormat, VertexFormat, ViewKind};
use crate::error::Result;
use crate::gfx_err;

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
    LineList,
    LineStrip,
    PointList,
}

/// Face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Front face winding order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

/// Depth comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    Less,
    LessOrEqual,
    Always,
}

/// Vertex input rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexInputRate {
    Vertex,
    Instance,
}

/// Vertex attribute description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Attribute location in shader
    pub location: u32,
    /// Binding index
    pub binding: u32,
    pub format: VertexFormat,
    /// Offset in bytes from the start of the vertex
    pub offset: u32,
}

/// Vertex binding description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBinding {
    pub binding: u32,
    /// Stride in bytes between consecutive elements
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

/// Vertex input layout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexLayout {
    pub bindings: Vec<VertexBinding>,
    pub attributes: Vec<VertexAttribute>,
}

/// Contiguous run of descriptors of one kind inside a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorRange {
    pub kind: ViewKind,
    /// First shader binding (register) of the range
    pub base_binding: u32,
    pub count: u32,
}

impl DescriptorRange {
    pub fn new(kind: ViewKind, base_binding: u32, count: u32) -> Self {
        Self { kind, base_binding, count }
    }
}

/// One descriptor table, bound as a whole from a heap
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorTableLayout {
    pub ranges: Vec<DescriptorRange>,
}

impl DescriptorTableLayout {
    pub fn new(ranges: Vec<DescriptorRange>) -> Self {
        Self { ranges }
    }

    /// Number of descriptors the table spans
    pub fn descriptor_count(&self) -> u32 {
        self.ranges.iter().map(|range| range.count).sum()
    }

    /// True if the table holds samplers only
    pub fn is_sampler_table(&self) -> bool {
        !self.ranges.is_empty() && self.ranges.iter().all(|range| range.kind == ViewKind::Sampler)
    }
}

/// Root/binding signature: descriptor tables indexed by root slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootLayout {
    pub tables: Vec<DescriptorTableLayout>,
}

impl RootLayout {
    pub fn new(tables: Vec<DescriptorTableLayout>) -> Self {
        Self { tables }
    }

    pub fn table(&self, root_slot: u32) -> Option<&DescriptorTableLayout> {
        self.tables.get(root_slot as usize)
    }
}

/// Precompiled shader program, passed through untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderBytecode {
    pub code: Vec<u8>,
    /// Entry point name
    pub entry_point: String,
}

impl ShaderBytecode {
    pub fn from_bytes(code: Vec<u8>) -> Self {
        Self { code, entry_point: "main".to_string() }
    }

    /// Load bytecode from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let code = std::fs::read(path).map_err(|e| {
            gfx_err!(
                "crossgfx::pipeline",
                InvalidResource,
                "cannot read shader bytecode {}: {}",
                path.display(),
                e
            )
        })?;
        Ok(Self::from_bytes(code))
    }

    pub fn with_entry_point(mut self, entry_point: &str) -> Self {
        self.entry_point = entry_point.to_string();
        self
    }
}

/// Depth test configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    pub test_enable: bool,
    pub write_enable: bool,
    pub compare_op: CompareOp,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test_enable: true,
            write_enable: true,
            compare_op: CompareOp::Less,
        }
    }
}

/// Everything needed to build a pipeline state
#[derive(Debug, Clone)]
pub struct PipelineStateDesc {
    pub vertex_shader: ShaderBytecode,
    pub fragment_shader: ShaderBytecode,
    pub root_layout: RootLayout,
    pub vertex_layout: VertexLayout,
    pub topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth: DepthState,
    pub blend_enable: bool,
    pub color_formats: Vec<ColorFormat>,
    pub depth_format: Option<DepthFormat>,
}

impl PipelineStateDesc {
    /// Triangle list, no culling, depth test and write with `Less`, no blending
    pub fn new(vertex_shader: ShaderBytecode, fragment_shader: ShaderBytecode) -> Self {
        Self {
            vertex_shader,
            fragment_shader,
            root_layout: RootLayout::default(),
            vertex_layout: VertexLayout::default(),
            topology: PrimitiveTopology::TriangleList,
            cull_mode: CullMode::None,
            front_face: FrontFace::CounterClockwise,
            depth: DepthState::default(),
            blend_enable: false,
            color_formats: vec![ColorFormat::R8G8B8A8_UNORM],
            depth_format: Some(DepthFormat::D32_FLOAT),
        }
    }
}

/// Immutable compiled pipeline
pub trait PipelineState: Send + Sync + 'static {
    fn root_layout(&self) -> &RootLayout;

    fn topology(&self) -> PrimitiveTopology;

    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
#[path = "pipeline_state_tests.rs"]
mod tests;
