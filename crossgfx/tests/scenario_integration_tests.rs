//! End-to-end scenarios on the software backend
//!
//! No GPU required.
//!
//! Run with: cargo test --test scenario_integration_tests

mod software_test_utils;

use std::sync::Arc;
use crossgfx::gfx::render::{
    ColorFormat, Descriptor, ResourceUsage, TextureDesc, Transition, ViewHeapEntry, ViewKind,
};
use software_test_utils::{create_test_context, read_all, readback_buffer, submit_and_wait};

// ============================================================================
// RENDER TARGET CLEAR
// ============================================================================

#[test]
fn test_integration_clear_render_target_and_read_back() {
    let context = create_test_context();
    let device = context.device().unwrap();

    let target = device
        .create_render_target(ColorFormat::R8G8B8A8_UNORM, 256, 256, [0.0, 0.0, 0.0, 1.0])
        .unwrap();
    let set = device
        .create_render_target_set(&[Arc::clone(&target)], &[ColorFormat::R8G8B8A8_UNORM], 256, 256, None)
        .unwrap();
    let output = readback_buffer(device.as_ref(), 256 * 256 * 4);

    let mut list = device.create_command_list().unwrap();
    list.open().unwrap();
    list.bind_render_target_set(&set).unwrap();
    list.clear_render_target_set(&set, [0.0, 0.0, 0.0, 1.0]).unwrap();
    list.resource_barriers(&[Transition::new(&target, ResourceUsage::RenderTarget, ResourceUsage::CopySource)])
        .unwrap();
    list.copy_texture_to_buffer(&target, &output, 0).unwrap();
    submit_and_wait(device.as_ref(), &mut list);

    let pixels = read_all(&output);
    assert_eq!(pixels.len(), 256 * 256 * 4);
    assert!(pixels.chunks_exact(4).all(|texel| texel == [0, 0, 0, 255]));

    context.shutdown().unwrap();
}

// ============================================================================
// CONSTANT BUFFER ALIGNMENT
// ============================================================================

#[test]
fn test_integration_constant_buffer_is_aligned() {
    let context = create_test_context();
    let device = context.device().unwrap();

    let buffer = device.create_constant_buffer(10).unwrap();
    assert_eq!(buffer.info().size, 256);
    assert_eq!(buffer.info().views.constant_buffer.unwrap().size, 256);
}

// ============================================================================
// DESCRIPTOR HEAP ORDER
// ============================================================================

#[test]
fn test_integration_view_heap_slot_resolves_to_its_entry() {
    let context = create_test_context();
    let device = context.device().unwrap();

    let buf_a = device.create_constant_buffer(64).unwrap();
    let tex_b = device
        .create_texture(&TextureDesc { format: ColorFormat::R8G8B8A8_UNORM, width: 4, height: 4 })
        .unwrap();
    let tex_c = device
        .create_texture(&TextureDesc { format: ColorFormat::R32G32B32A32_FLOAT, width: 4, height: 4 })
        .unwrap();

    let heap = device
        .create_view_heap(&[
            ViewHeapEntry::new(&buf_a, ViewKind::ConstantBuffer, 0),
            ViewHeapEntry::new(&tex_b, ViewKind::ShaderResource, 1),
            ViewHeapEntry::new(&tex_c, ViewKind::ShaderResource, 2),
        ])
        .unwrap();

    let expected = Descriptor::ShaderResource {
        resource: tex_b.id(),
        view: tex_b.info().views.shader_resource.unwrap(),
    };
    let slot = heap.descriptor(1).unwrap();
    assert_eq!(slot.descriptor, expected);
    assert_ne!(slot.descriptor.resource(), Some(buf_a.id()));
    assert_ne!(slot.descriptor.resource(), Some(tex_c.id()));
}

// ============================================================================
// BATCHED ROUND-TRIP BARRIER
// ============================================================================

#[test]
fn test_integration_batched_round_trip_leaves_backbuffer_presentable() {
    let context = create_test_context();
    let device = context.device().unwrap();

    let index = device.acquire_next_backbuffer().unwrap();
    let backbuffer = device.backbuffer(index).unwrap();

    let mut list = device.create_command_list().unwrap();
    list.open().unwrap();
    list.resource_barriers(&[
        Transition::new(&backbuffer, ResourceUsage::Present, ResourceUsage::RenderTarget),
        Transition::new(&backbuffer, ResourceUsage::RenderTarget, ResourceUsage::Present),
    ])
    .unwrap();
    submit_and_wait(device.as_ref(), &mut list);

    assert_eq!(device.usage_tracker().current(backbuffer.id()), Some(ResourceUsage::Present));
    device.present(index).unwrap();
    assert_eq!(device.stats().frames_presented, 1);
}
