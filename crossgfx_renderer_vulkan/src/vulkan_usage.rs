/// Usage tags as Vulkan layouts, access masks and pipeline stages
///
/// A barrier batch becomes as few `vkCmdPipelineBarrier` calls as possible
/// while keeping input order: a resource that appears twice starts a new call
/// so that its second barrier is ordered after its first.

use ash::vk;
use std::ops::Range;
use crossgfx::gfx::render::{ResourceId, ResourceUsage};

/// Native state matching one usage tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UsageState {
    /// Image layout (ignored for buffers)
    pub layout: vk::ImageLayout,
    pub access: vk::AccessFlags,
    pub stage: vk::PipelineStageFlags,
}

pub(crate) fn usage_state(usage: ResourceUsage) -> UsageState {
    match usage {
        ResourceUsage::Undefined => UsageState {
            layout: vk::ImageLayout::UNDEFINED,
            access: vk::AccessFlags::empty(),
            stage: vk::PipelineStageFlags::TOP_OF_PIPE,
        },
        ResourceUsage::Present => UsageState {
            layout: vk::ImageLayout::PRESENT_SRC_KHR,
            access: vk::AccessFlags::empty(),
            stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        },
        ResourceUsage::CopyDest => UsageState {
            layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            access: vk::AccessFlags::TRANSFER_WRITE,
            stage: vk::PipelineStageFlags::TRANSFER,
        },
        ResourceUsage::CopySource => UsageState {
            layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            access: vk::AccessFlags::TRANSFER_READ,
            stage: vk::PipelineStageFlags::TRANSFER,
        },
        ResourceUsage::RenderTarget => UsageState {
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            access: vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        },
        ResourceUsage::DepthWrite => UsageState {
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        },
        ResourceUsage::GenericRead => UsageState {
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            access: vk::AccessFlags::SHADER_READ
                | vk::AccessFlags::UNIFORM_READ
                | vk::AccessFlags::VERTEX_ATTRIBUTE_READ
                | vk::AccessFlags::INDEX_READ
                | vk::AccessFlags::TRANSFER_READ,
            stage: vk::PipelineStageFlags::VERTEX_INPUT
                | vk::PipelineStageFlags::VERTEX_SHADER
                | vk::PipelineStageFlags::FRAGMENT_SHADER
                | vk::PipelineStageFlags::TRANSFER,
        },
    }
}

/// Source stage when leaving `usage`
///
/// Nothing executes against a presented or undefined image, so those wait on
/// the top of the pipe.
pub(crate) fn src_stage(usage: ResourceUsage) -> vk::PipelineStageFlags {
    match usage {
        ResourceUsage::Present | ResourceUsage::Undefined => vk::PipelineStageFlags::TOP_OF_PIPE,
        other => usage_state(other).stage,
    }
}

/// Access mask of a buffer in `usage`; attachment and present usages have none
pub(crate) fn buffer_access(usage: ResourceUsage) -> vk::AccessFlags {
    match usage {
        ResourceUsage::RenderTarget | ResourceUsage::DepthWrite | ResourceUsage::Present => {
            vk::AccessFlags::empty()
        }
        other => usage_state(other).access,
    }
}

/// Split a barrier batch into ordered groups with no repeated resource
pub(crate) fn barrier_groups(ids: &[ResourceId]) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut start = 0;
    for index in 0..ids.len() {
        if ids[start..index].contains(&ids[index]) {
            groups.push(start..index);
            start = index;
        }
    }
    if start < ids.len() {
        groups.push(start..ids.len());
    }
    groups
}

#[cfg(test)]
#[path = "vulkan_usage_tests.rs"]
mod tests;
