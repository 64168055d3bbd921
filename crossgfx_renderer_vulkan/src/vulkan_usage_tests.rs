//! Unit tests for vulkan_usage.rs

use ash::vk;
use crossgfx::gfx::render::{ResourceId, ResourceUsage};
use super::*;

#[test]
fn test_usage_layouts() {
    assert_eq!(usage_state(ResourceUsage::Undefined).layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(usage_state(ResourceUsage::Present).layout, vk::ImageLayout::PRESENT_SRC_KHR);
    assert_eq!(usage_state(ResourceUsage::CopyDest).layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(usage_state(ResourceUsage::CopySource).layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
    assert_eq!(usage_state(ResourceUsage::RenderTarget).layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert_eq!(
        usage_state(ResourceUsage::DepthWrite).layout,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    );
    assert_eq!(usage_state(ResourceUsage::GenericRead).layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
}

#[test]
fn test_render_target_access_and_stage() {
    let state = usage_state(ResourceUsage::RenderTarget);
    assert!(state.access.contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
    assert_eq!(state.stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
}

#[test]
fn test_generic_read_covers_shader_and_input_reads() {
    let state = usage_state(ResourceUsage::GenericRead);
    assert!(state.access.contains(vk::AccessFlags::SHADER_READ));
    assert!(state.access.contains(vk::AccessFlags::UNIFORM_READ));
    assert!(state.access.contains(vk::AccessFlags::VERTEX_ATTRIBUTE_READ));
    assert!(state.access.contains(vk::AccessFlags::INDEX_READ));
    assert!(state.stage.contains(vk::PipelineStageFlags::FRAGMENT_SHADER));
}

#[test]
fn test_src_stage_of_present_is_top_of_pipe() {
    assert_eq!(src_stage(ResourceUsage::Present), vk::PipelineStageFlags::TOP_OF_PIPE);
    assert_eq!(src_stage(ResourceUsage::Undefined), vk::PipelineStageFlags::TOP_OF_PIPE);
    assert_eq!(src_stage(ResourceUsage::CopyDest), vk::PipelineStageFlags::TRANSFER);
}

#[test]
fn test_buffer_access_ignores_attachment_usages() {
    assert_eq!(buffer_access(ResourceUsage::RenderTarget), vk::AccessFlags::empty());
    assert_eq!(buffer_access(ResourceUsage::Present), vk::AccessFlags::empty());
    assert_eq!(buffer_access(ResourceUsage::CopyDest), vk::AccessFlags::TRANSFER_WRITE);
}

#[test]
fn test_barrier_groups_distinct_resources_stay_together() {
    let ids = [ResourceId::next(), ResourceId::next(), ResourceId::next()];
    assert_eq!(barrier_groups(&ids), vec![0..3]);
}

#[test]
fn test_barrier_groups_split_on_repeat() {
    let a = ResourceId::next();
    let b = ResourceId::next();
    // PRESENT->RT then RT->PRESENT on the same image must stay two ordered barriers
    assert_eq!(barrier_groups(&[a, a]), vec![0..1, 1..2]);
    assert_eq!(barrier_groups(&[a, b, a, b]), vec![0..2, 2..4]);
    assert_eq!(barrier_groups(&[a, b, b]), vec![0..2, 2..3]);
}

#[test]
fn test_barrier_groups_empty() {
    assert!(barrier_groups(&[]).is_empty());
}
