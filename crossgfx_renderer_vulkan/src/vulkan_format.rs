/// Conversions between crossgfx enumerations and their Vulkan counterparts

use ash::vk;
use crossgfx::gfx::render::{
    AddressMode, ColorFormat, CompareOp, CullMode, DepthFormat, FilterMode, FrontFace,
    IndexType, PrimitiveTopology, VertexFormat, VertexInputRate,
};

pub(crate) fn color_format_to_vk(format: ColorFormat) -> vk::Format {
    match format {
        ColorFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        ColorFormat::R8G8B8A8_SRGB => vk::Format::R8G8B8A8_SRGB,
        ColorFormat::B8G8R8A8_UNORM => vk::Format::B8G8R8A8_UNORM,
        ColorFormat::B8G8R8A8_SRGB => vk::Format::B8G8R8A8_SRGB,
        ColorFormat::R16G16B16A16_FLOAT => vk::Format::R16G16B16A16_SFLOAT,
        ColorFormat::R32G32B32A32_FLOAT => vk::Format::R32G32B32A32_SFLOAT,
        ColorFormat::R32_FLOAT => vk::Format::R32_SFLOAT,
    }
}

/// Convert a swapchain format back, `None` for formats crossgfx does not expose
pub(crate) fn vk_format_to_color_format(format: vk::Format) -> Option<ColorFormat> {
    match format {
        vk::Format::R8G8B8A8_UNORM => Some(ColorFormat::R8G8B8A8_UNORM),
        vk::Format::R8G8B8A8_SRGB => Some(ColorFormat::R8G8B8A8_SRGB),
        vk::Format::B8G8R8A8_UNORM => Some(ColorFormat::B8G8R8A8_UNORM),
        vk::Format::B8G8R8A8_SRGB => Some(ColorFormat::B8G8R8A8_SRGB),
        vk::Format::R16G16B16A16_SFLOAT => Some(ColorFormat::R16G16B16A16_FLOAT),
        vk::Format::R32G32B32A32_SFLOAT => Some(ColorFormat::R32G32B32A32_FLOAT),
        vk::Format::R32_SFLOAT => Some(ColorFormat::R32_FLOAT),
        _ => None,
    }
}

pub(crate) fn depth_format_to_vk(format: DepthFormat) -> vk::Format {
    match format {
        DepthFormat::D32_FLOAT => vk::Format::D32_SFLOAT,
    }
}

pub(crate) fn vertex_format_to_vk(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::R32_SFLOAT => vk::Format::R32_SFLOAT,
        VertexFormat::R32G32_SFLOAT => vk::Format::R32G32_SFLOAT,
        VertexFormat::R32G32B32_SFLOAT => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::R32G32B32A32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
    }
}

pub(crate) fn topology_to_vk(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
    }
}

// ===== Pipeline state conversions =====

pub(crate) fn cull_mode_to_vk(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub(crate) fn front_face_to_vk(face: FrontFace) -> vk::FrontFace {
    match face {
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
    }
}

pub(crate) fn compare_op_to_vk(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

pub(crate) fn input_rate_to_vk(rate: VertexInputRate) -> vk::VertexInputRate {
    match rate {
        VertexInputRate::Vertex => vk::VertexInputRate::VERTEX,
        VertexInputRate::Instance => vk::VertexInputRate::INSTANCE,
    }
}

pub(crate) fn index_type_to_vk(index_type: IndexType) -> vk::IndexType {
    match index_type {
        IndexType::U16 => vk::IndexType::UINT16,
        IndexType::U32 => vk::IndexType::UINT32,
    }
}

// ===== Sampler conversions =====

pub(crate) fn filter_to_vk(filter: FilterMode) -> vk::Filter {
    match filter {
        FilterMode::Point => vk::Filter::NEAREST,
        FilterMode::Linear => vk::Filter::LINEAR,
    }
}

pub(crate) fn mipmap_mode_to_vk(filter: FilterMode) -> vk::SamplerMipmapMode {
    match filter {
        FilterMode::Point => vk::SamplerMipmapMode::NEAREST,
        FilterMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub(crate) fn address_mode_to_vk(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Wrap => vk::SamplerAddressMode::REPEAT,
        AddressMode::Clamp => vk::SamplerAddressMode::CLAMP_TO_EDGE,
    }
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
