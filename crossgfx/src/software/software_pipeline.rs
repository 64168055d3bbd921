/// SoftwarePipelineState - validated pipeline description

use std::any::Any;
use crate::device::{ColorFormat, DepthFormat, PipelineState, PipelineStateDesc, PrimitiveTopology, RootLayout};

pub struct SoftwarePipelineState {
    root_layout: RootLayout,
    topology: PrimitiveTopology,
    color_formats: Vec<ColorFormat>,
    depth_format: Option<DepthFormat>,
    /// Bytes of (vertex, fragment) bytecode received
    bytecode_sizes: (usize, usize),
}

impl SoftwarePipelineState {
    pub(crate) fn new(desc: &PipelineStateDesc) -> Self {
        Self {
            root_layout: desc.root_layout.clone(),
            topology: desc.topology,
            color_formats: desc.color_formats.clone(),
            depth_format: desc.depth_format,
            bytecode_sizes: (desc.vertex_shader.code.len(), desc.fragment_shader.code.len()),
        }
    }

    pub fn color_formats(&self) -> &[ColorFormat] {
        &self.color_formats
    }

    pub fn depth_format(&self) -> Option<DepthFormat> {
        self.depth_format
    }

    pub fn bytecode_sizes(&self) -> (usize, usize) {
        self.bytecode_sizes
    }
}

impl PipelineState for SoftwarePipelineState {
    fn root_layout(&self) -> &RootLayout {
        &self.root_layout
    }

    fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
