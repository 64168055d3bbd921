/// GraphicsDevice trait - factory for resources, heaps, pipelines and command lists
///
/// One implementation per backend, chosen once at startup and reached through
/// `GfxContext`. Every factory acquires its native objects on success and
/// returns an owning handle; nothing is created half-way.

use std::sync::Arc;
use crate::device::{
    ColorFormat, CommandList, DescriptorHeap, IndexBufferView, IndexVertexBuffersSet,
    PipelineState, PipelineStateDesc, RenderTargetSet, Resource, ResourceUsage,
    SamplerHeapEntry, ScreenVertex, Transition, UsageTracker, VertexBufferView, ViewHeapEntry,
    FULLSCREEN_TRIANGLE,
};
use crate::error::Result;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Which native API a device drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Vulkan,
    /// Headless CPU implementation
    Software,
}

/// Which validation messages to display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    ErrorsOnly,
    ErrorsAndWarnings,
    All,
}

/// Where validation messages go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugOutput {
    Console,
    File(String),
    Both(String),
}

/// Validation message categories to display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugMessageFilter {
    pub show_general: bool,
    pub show_validation: bool,
    pub show_performance: bool,
}

impl Default for DebugMessageFilter {
    fn default() -> Self {
        Self {
            show_general: true,
            show_validation: true,
            show_performance: false,
        }
    }
}

/// Counters of received validation messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

/// Native validation layer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugConfig {
    pub severity: DebugSeverity,
    pub output: DebugOutput,
    pub message_filter: DebugMessageFilter,
    /// Abort the process on the first validation error
    pub break_on_error: bool,
    /// Panic on the first validation error
    pub panic_on_error: bool,
    pub enable_stats: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            severity: DebugSeverity::ErrorsAndWarnings,
            output: DebugOutput::Console,
            message_filter: DebugMessageFilter::default(),
            break_on_error: false,
            panic_on_error: false,
            enable_stats: true,
        }
    }
}

/// Device creation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub app_name: String,
    pub app_version: (u32, u32, u32),
    /// Enable the native validation layer
    pub enable_validation: bool,
    /// Check every barrier's `before` against the last tracked usage
    pub track_usage: bool,
    /// Number of swapchain images requested
    pub backbuffer_count: u32,
    pub backbuffer_format: ColorFormat,
    /// Size of software backbuffers (window-backed devices use the surface size)
    pub backbuffer_extent: (u32, u32),
    pub vsync: bool,
    pub debug: DebugConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            app_name: "crossgfx application".to_string(),
            app_version: (1, 0, 0),
            enable_validation: cfg!(debug_assertions),
            track_usage: cfg!(debug_assertions),
            backbuffer_count: 2,
            backbuffer_format: ColorFormat::B8G8R8A8_UNORM,
            backbuffer_extent: (1280, 720),
            vsync: true,
            debug: DebugConfig::default(),
        }
    }
}

// ============================================================================
// RESOURCE DESCRIPTORS
// ============================================================================

/// Role of a linear buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// CPU-written, GPU-read: copy source, vertex or index data
    Upload,
    /// GPU-written, CPU-read: copy destination for readbacks
    Readback,
}

/// Linear buffer descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub size: u64,
    pub kind: BufferKind,
}

/// Sampled texture descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub format: ColorFormat,
    pub width: u32,
    pub height: u32,
}

/// Counters of live device objects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub live_resources: u64,
    pub allocated_bytes: u64,
    pub submissions: u64,
    pub frames_presented: u64,
}

// ============================================================================
// GRAPHICS DEVICE TRAIT
// ============================================================================

/// Factory and queue of one backend
pub trait GraphicsDevice: Send + Sync + 'static {
    fn backend(&self) -> Backend;

    /// Configuration the device was created with
    fn config(&self) -> &DeviceConfig;

    // ===== RESOURCE LIFECYCLE =====

    /// 2-D color target, also shader-readable, carrying `clear_color` as its
    /// optimized clear value. Starts in `RenderTarget`.
    fn create_render_target(
        &self,
        format: ColorFormat,
        width: u32,
        height: u32,
        clear_color: [f32; 4],
    ) -> Result<Arc<dyn Resource>>;

    /// 32-bit depth target with a depth view and an R32_FLOAT shader view.
    /// Starts in `DepthWrite`.
    fn create_depth_stencil_target(&self, width: u32, height: u32) -> Result<Arc<dyn Resource>>;

    /// Upload-visible buffer of `align_constant_buffer_size(size)` bytes with a
    /// constant-buffer view. Starts in `GenericRead`.
    fn create_constant_buffer(&self, size: u64) -> Result<Arc<dyn Resource>>;

    /// Linear CPU-visible buffer. Upload buffers start in `GenericRead`,
    /// readback buffers in `CopyDest`.
    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn Resource>>;

    /// Sampled texture with a shader-resource view. Starts in `CopyDest`.
    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn Resource>>;

    // ===== BINDING =====

    fn create_view_heap(&self, entries: &[ViewHeapEntry]) -> Result<Arc<dyn DescriptorHeap>>;

    fn create_sampler_heap(&self, entries: &[SamplerHeapEntry]) -> Result<Arc<dyn DescriptorHeap>>;

    fn create_pipeline_state(&self, desc: &PipelineStateDesc) -> Result<Arc<dyn PipelineState>>;

    fn create_render_target_set(
        &self,
        colors: &[Arc<dyn Resource>],
        formats: &[ColorFormat],
        width: u32,
        height: u32,
        depth: Option<&Arc<dyn Resource>>,
    ) -> Result<RenderTargetSet> {
        RenderTargetSet::new(colors, formats, width, height, depth)
    }

    fn create_index_vertex_buffers_set(
        &self,
        vertex_buffers: Vec<VertexBufferView>,
        index_buffer: Option<IndexBufferView>,
    ) -> Result<IndexVertexBuffersSet> {
        IndexVertexBuffersSet::new(vertex_buffers, index_buffer)
    }

    /// Vertex set holding `FULLSCREEN_TRIANGLE`, drawn with `draw_instanced(3, 1, 0, 0)`
    /// and a pipeline using `ScreenVertex::layout()`
    fn create_fullscreen_triangle(&self) -> Result<IndexVertexBuffersSet> {
        let size = std::mem::size_of_val(&FULLSCREEN_TRIANGLE) as u64;
        let buffer = self.create_buffer(&BufferDesc { size, kind: BufferKind::Upload })?;
        buffer.map()?.write_slice(0, &FULLSCREEN_TRIANGLE)?;
        IndexVertexBuffersSet::new(vec![VertexBufferView::new(&buffer, ScreenVertex::STRIDE)], None)
    }

    // ===== COMMANDS =====

    /// New command list in the `Closed` state
    fn create_command_list(&self) -> Result<Box<dyn CommandList>>;

    /// Submit closed lists, in slice order. Returns without waiting.
    fn submit(&self, command_lists: &[&dyn CommandList]) -> Result<()>;

    /// Block until every submitted list has finished executing
    fn wait_for_queue_idle(&self) -> Result<()>;

    // ===== BACKBUFFERS =====

    fn backbuffer_count(&self) -> u32;

    /// Index of the backbuffer to render into next
    fn acquire_next_backbuffer(&self) -> Result<u32>;

    /// Backbuffer image as a resource, in `Present` usage at rest
    fn backbuffer(&self, index: u32) -> Result<Arc<dyn Resource>>;

    /// Move the backbuffer to `RenderTarget` and bind it with a full-size
    /// viewport and scissor
    fn set_backbuffer_as_render_target(&self, command_list: &mut dyn CommandList, index: u32) -> Result<()> {
        let backbuffer = self.backbuffer(index)?;
        command_list.resource_barriers(&[Transition::new(
            &backbuffer,
            ResourceUsage::Present,
            ResourceUsage::RenderTarget,
        )])?;

        let info = backbuffer.info();
        let format = info
            .views
            .render_target
            .map(|view| view.format)
            .unwrap_or(ColorFormat::B8G8R8A8_UNORM);
        let (width, height) = (info.width, info.height);
        let set = RenderTargetSet::new(&[Arc::clone(&backbuffer)], &[format], width, height, None)?;
        command_list.bind_render_target_set(&set)
    }

    /// Move the backbuffer back to `Present`
    fn set_backbuffer_as_present(&self, command_list: &mut dyn CommandList, index: u32) -> Result<()> {
        let backbuffer = self.backbuffer(index)?;
        command_list.resource_barriers(&[Transition::new(
            &backbuffer,
            ResourceUsage::RenderTarget,
            ResourceUsage::Present,
        )])
    }

    fn present(&self, index: u32) -> Result<()>;

    // ===== INTROSPECTION =====

    /// Shadow usage tracker (inert unless `DeviceConfig::track_usage`)
    fn usage_tracker(&self) -> &UsageTracker;

    fn stats(&self) -> DeviceStats;
}
