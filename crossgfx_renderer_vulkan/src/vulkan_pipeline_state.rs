/// VulkanPipelineState - graphics pipeline built for dynamic rendering
///
/// Each descriptor table of the root layout becomes one descriptor set
/// layout, bound at set index = root slot. Ranges keep their shader
/// bindings: descriptor `i` of a range sits at `base_binding + i`.

use ash::vk;
use std::any::Any;
use std::ffi::CString;
use std::io::Cursor;
use std::sync::Arc;
use crossgfx::gfx::Result;
use crossgfx::gfx::render::{
    DescriptorTableLayout, PipelineState, PipelineStateDesc, PrimitiveTopology, RootLayout,
    ShaderBytecode, ViewKind,
};
use crossgfx::{gfx_bail, gfx_debug, gfx_err};

use crate::vulkan_format::{
    color_format_to_vk, compare_op_to_vk, cull_mode_to_vk, depth_format_to_vk, front_face_to_vk,
    input_rate_to_vk, topology_to_vk, vertex_format_to_vk,
};
use crate::vulkan_context::GpuContext;

pub struct VulkanPipelineState {
    root_layout: RootLayout,
    topology: PrimitiveTopology,
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) pipeline_layout: vk::PipelineLayout,
    /// One per root slot
    pub(crate) set_layouts: Vec<vk::DescriptorSetLayout>,
    ctx: Arc<GpuContext>,
}

pub(crate) fn descriptor_type(kind: ViewKind) -> Result<vk::DescriptorType> {
    match kind {
        ViewKind::ConstantBuffer => Ok(vk::DescriptorType::UNIFORM_BUFFER),
        ViewKind::ShaderResource => Ok(vk::DescriptorType::SAMPLED_IMAGE),
        ViewKind::Sampler => Ok(vk::DescriptorType::SAMPLER),
        ViewKind::UnorderedAccess => gfx_bail!(
            "crossgfx::vulkan",
            UnsupportedViewKind,
            "unordered-access ranges are not supported in root layouts"
        ),
    }
}

/// Set layout bindings of one table, one binding per descriptor
pub(crate) fn table_bindings(table: &DescriptorTableLayout) -> Result<Vec<vk::DescriptorSetLayoutBinding<'static>>> {
    let mut bindings = Vec::with_capacity(table.descriptor_count() as usize);
    for range in &table.ranges {
        let descriptor_type = descriptor_type(range.kind)?;
        for i in 0..range.count {
            let binding = range.base_binding + i;
            if bindings.iter().any(|b: &vk::DescriptorSetLayoutBinding| b.binding == binding) {
                gfx_bail!("crossgfx::vulkan", InvalidResource, "binding {} is declared twice in one table", binding);
            }
            bindings.push(
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(descriptor_type)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::ALL_GRAPHICS),
            );
        }
    }
    Ok(bindings)
}

fn create_shader_module(device: &ash::Device, shader: &ShaderBytecode, stage: &str) -> Result<vk::ShaderModule> {
    if shader.code.is_empty() {
        gfx_bail!("crossgfx::vulkan", InvalidResource, "{} shader bytecode is empty", stage);
    }
    let code = ash::util::read_spv(&mut Cursor::new(&shader.code))
        .map_err(|e| gfx_err!("crossgfx::vulkan", InvalidResource, "{} shader is not SPIR-V: {}", stage, e))?;

    let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
    unsafe {
        device
            .create_shader_module(&create_info, None)
            .map_err(|e| gfx_err!("crossgfx::vulkan", BackendError, "Failed to create {} shader module: {:?}", stage, e))
    }
}

fn entry_point(shader: &ShaderBytecode) -> Result<CString> {
    CString::new(shader.entry_point.as_str()).map_err(|_| {
        gfx_err!("crossgfx::vulkan", InvalidResource, "entry point {:?} contains a NUL byte", shader.entry_point)
    })
}

impl VulkanPipelineState {
    pub(crate) fn new(ctx: &Arc<GpuContext>, desc: &PipelineStateDesc) -> Result<Self> {
        let device = &ctx.device;
        let entry_point_vert = entry_point(&desc.vertex_shader)?;
        let entry_point_frag = entry_point(&desc.fragment_shader)?;

        // Build every set layout first so a bad table leaks nothing
        let table_bindings = desc
            .root_layout
            .tables
            .iter()
            .map(table_bindings)
            .collect::<Result<Vec<_>>>()?;

        let mut pipeline = Self {
            root_layout: desc.root_layout.clone(),
            topology: desc.topology,
            pipeline: vk::Pipeline::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            set_layouts: Vec::with_capacity(table_bindings.len()),
            ctx: Arc::clone(ctx),
        };

        unsafe {
            // From here on, Drop releases whatever was created
            for bindings in &table_bindings {
                let layout_create = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
                let set_layout = device
                    .create_descriptor_set_layout(&layout_create, None)
                    .map_err(|e| gfx_err!("crossgfx::vulkan", BackendError, "Failed to create descriptor set layout: {:?}", e))?;
                pipeline.set_layouts.push(set_layout);
            }

            let layout_create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&pipeline.set_layouts);
            pipeline.pipeline_layout = device
                .create_pipeline_layout(&layout_create_info, None)
                .map_err(|e| gfx_err!("crossgfx::vulkan", BackendError, "Failed to create pipeline layout: {:?}", e))?;

            let vertex_module = create_shader_module(device, &desc.vertex_shader, "vertex")?;
            let fragment_module = match create_shader_module(device, &desc.fragment_shader, "fragment") {
                Ok(module) => module,
                Err(e) => {
                    device.destroy_shader_module(vertex_module, None);
                    return Err(e);
                }
            };

            let result = pipeline.create_pipeline(desc, vertex_module, fragment_module, &entry_point_vert, &entry_point_frag);

            // Modules are only needed during pipeline creation
            device.destroy_shader_module(vertex_module, None);
            device.destroy_shader_module(fragment_module, None);

            pipeline.pipeline = result?;
        }

        gfx_debug!(
            "crossgfx::vulkan",
            "Created pipeline state ({} tables, {:?})",
            pipeline.set_layouts.len(),
            pipeline.topology
        );
        Ok(pipeline)
    }

    fn create_pipeline(
        &self,
        desc: &PipelineStateDesc,
        vertex_module: vk::ShaderModule,
        fragment_module: vk::ShaderModule,
        entry_point_vert: &CString,
        entry_point_frag: &CString,
    ) -> Result<vk::Pipeline> {
        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_module)
                .name(entry_point_vert),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_module)
                .name(entry_point_frag),
        ];

        // Vertex input state
        let vertex_bindings: Vec<vk::VertexInputBindingDescription> = desc
            .vertex_layout
            .bindings
            .iter()
            .map(|binding| vk::VertexInputBindingDescription {
                binding: binding.binding,
                stride: binding.stride,
                input_rate: input_rate_to_vk(binding.input_rate),
            })
            .collect();

        let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = desc
            .vertex_layout
            .attributes
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                location: attribute.location,
                binding: attribute.binding,
                format: vertex_format_to_vk(attribute.format),
                offset: attribute.offset,
            })
            .collect();

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(topology_to_vk(desc.topology))
            .primitive_restart_enable(false);

        // Viewport state (dynamic)
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(cull_mode_to_vk(desc.cull_mode))
            .front_face(front_face_to_vk(desc.front_face))
            .depth_bias_enable(false);

        // No depth attachment means no depth test
        let has_depth = desc.depth_format.is_some();
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(has_depth && desc.depth.test_enable)
            .depth_write_enable(has_depth && desc.depth.write_enable)
            .depth_compare_op(compare_op_to_vk(desc.depth.compare_op))
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        // Straight alpha blending when enabled
        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(desc.blend_enable)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD);
        let color_blend_attachments = vec![color_blend_attachment; desc.color_formats.len()];

        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        // Attachment formats for dynamic rendering
        let color_formats: Vec<vk::Format> = desc.color_formats.iter().map(|f| color_format_to_vk(*f)).collect();
        let depth_format = desc.depth_format.map(depth_format_to_vk).unwrap_or(vk::Format::UNDEFINED);
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(depth_format);

        let pipeline_create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .depth_stencil_state(&depth_stencil_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(self.pipeline_layout)
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            self.ctx.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_create_info], None)
                .map_err(|e| gfx_err!("crossgfx::vulkan", BackendError, "Failed to create graphics pipeline: {:?}", e.1))?
        };

        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| gfx_err!("crossgfx::vulkan", BackendError, "Driver returned no pipeline"))
    }
}

impl PipelineState for VulkanPipelineState {
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

impl Drop for VulkanPipelineState {
    fn drop(&mut self) {
        unsafe {
            if self.pipeline != vk::Pipeline::null() {
                self.ctx.device.destroy_pipeline(self.pipeline, None);
            }
            if self.pipeline_layout != vk::PipelineLayout::null() {
                self.ctx.device.destroy_pipeline_layout(self.pipeline_layout, None);
            }
            for set_layout in self.set_layouts.drain(..) {
                self.ctx.device.destroy_descriptor_set_layout(set_layout, None);
            }
        }
    }
}
