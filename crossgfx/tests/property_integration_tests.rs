//! Integration tests for the invariants every backend must uphold,
//! exercised on the software backend
//!
//! No GPU required.
//!
//! Run with: cargo test --test property_integration_tests

mod software_test_utils;

use std::sync::Arc;
use crossgfx::gfx::render::{
    BufferDesc, BufferKind, ColorFormat, DescriptorRange, DescriptorTableLayout, IndexBufferView, IndexType,
    PipelineStateDesc, ResourceUsage, RootLayout, SamplerHeapEntry, SamplerType, ScreenVertex, ShaderBytecode,
    TextureDesc, Transition, VertexBufferView, ViewHeapEntry, ViewKind, FULLSCREEN_TRIANGLE,
};
use crossgfx::gfx::{DeviceConfig, Error, GraphicsDevice};
use crossgfx::software::SoftwareDevice;
use software_test_utils::{read_all, readback_buffer, submit_and_wait, test_config};

const USAGES: [ResourceUsage; 6] = [
    ResourceUsage::Present,
    ResourceUsage::CopyDest,
    ResourceUsage::CopySource,
    ResourceUsage::RenderTarget,
    ResourceUsage::DepthWrite,
    ResourceUsage::GenericRead,
];

// ============================================================================
// TRANSITIONS KEEP VIEWS
// ============================================================================

#[test]
fn test_integration_round_trip_transitions_keep_views() {
    // Arbitrary pairs, so the shadow tracker is switched off
    let device = SoftwareDevice::new(DeviceConfig { track_usage: false, ..test_config() }).unwrap();
    let target = device
        .create_render_target(ColorFormat::R16G16B16A16_FLOAT, 4, 4, [0.0; 4])
        .unwrap();
    let views_before = target.info().views;

    let mut list = device.create_command_list().unwrap();
    for a in USAGES {
        for b in USAGES.into_iter().filter(|b| *b != a) {
            list.open().unwrap();
            list.resource_barriers(&[Transition::new(&target, a, b)]).unwrap();
            list.resource_barriers(&[Transition::new(&target, b, a)]).unwrap();
            submit_and_wait(&device, &mut list);

            assert_eq!(target.info().views, views_before, "{:?} -> {:?} -> {:?}", a, b, a);
            assert_eq!(device.executed_usage(&target).unwrap(), a);
        }
    }
}

// ============================================================================
// HEAP INDEX MAPPING
// ============================================================================

#[test]
fn test_integration_view_heap_preserves_input_order() {
    let device = SoftwareDevice::new(test_config()).unwrap();
    let resources: Vec<_> = (0..8)
        .map(|i| {
            if i % 3 == 0 {
                (device.create_constant_buffer(32 * i as u64).unwrap(), ViewKind::ConstantBuffer)
            } else {
                let desc = TextureDesc { format: ColorFormat::R8G8B8A8_SRGB, width: 2 + i, height: 2 };
                (device.create_texture(&desc).unwrap(), ViewKind::ShaderResource)
            }
        })
        .collect();
    let entries: Vec<_> = resources
        .iter()
        .enumerate()
        .map(|(i, (resource, kind))| ViewHeapEntry::new(resource, *kind, i as u32))
        .collect();

    let heap = device.create_view_heap(&entries).unwrap();
    assert_eq!(heap.len(), entries.len());
    for (i, (resource, kind)) in resources.iter().enumerate() {
        let slot = heap.descriptor(i).unwrap();
        assert_eq!(slot.descriptor.resource(), Some(resource.id()));
        assert_eq!(slot.descriptor.kind(), *kind);
        assert_eq!(slot.slot_hint, i as u32);
        assert_eq!(heap.offset_of(i), i as u64 * heap.increment_size() as u64);
    }
}

#[test]
fn test_integration_view_heap_keeps_resources_alive() {
    let device = SoftwareDevice::new(test_config()).unwrap();
    let buffer = device.create_constant_buffer(16).unwrap();
    let heap = device
        .create_view_heap(&[ViewHeapEntry::new(&buffer, ViewKind::ConstantBuffer, 0)])
        .unwrap();
    let live = device.stats().live_resources;

    drop(buffer);
    assert_eq!(device.stats().live_resources, live);
    drop(heap);
    assert_eq!(device.stats().live_resources, live - 1);
}

#[test]
fn test_integration_view_heap_rejects_sampler_entries() {
    let device = SoftwareDevice::new(test_config()).unwrap();
    let texture = device
        .create_texture(&TextureDesc { format: ColorFormat::R8G8B8A8_UNORM, width: 2, height: 2 })
        .unwrap();
    let result = device.create_view_heap(&[ViewHeapEntry::new(&texture, ViewKind::Sampler, 0)]);
    assert!(matches!(result, Err(Error::UnsupportedViewKind(_))));

    let result = device.create_view_heap(&[ViewHeapEntry::new(&texture, ViewKind::ConstantBuffer, 0)]);
    assert!(matches!(result, Err(Error::MissingView(_))));
}

// ============================================================================
// COMMAND LIST STATE MACHINE
// ============================================================================

#[test]
fn test_integration_empty_list_submits_without_side_effects() {
    let device = SoftwareDevice::new(test_config()).unwrap();
    let buffer = readback_buffer(&device, 64);
    let before = read_all(&buffer);

    let mut list = device.create_command_list().unwrap();
    list.open().unwrap();
    submit_and_wait(&device, &mut list);

    assert_eq!(read_all(&buffer), before);
    assert_eq!(device.draws_executed(), 0);
    assert_eq!(device.stats().submissions, 1);
}

#[test]
fn test_integration_recording_requires_open_list() {
    let device = SoftwareDevice::new(test_config()).unwrap();
    let mut list = device.create_command_list().unwrap();

    assert!(matches!(list.close(), Err(Error::InvalidState(_))));
    assert!(matches!(list.draw_instanced(3, 1, 0, 0), Err(Error::InvalidState(_))));

    list.open().unwrap();
    assert!(matches!(list.open(), Err(Error::InvalidState(_))));
    list.close().unwrap();
    assert!(matches!(list.close(), Err(Error::InvalidState(_))));
}

#[test]
fn test_integration_draw_requires_pipeline_and_targets() {
    let device = SoftwareDevice::new(test_config()).unwrap();
    let mut list = device.create_command_list().unwrap();
    list.open().unwrap();
    assert!(matches!(list.draw_instanced(3, 1, 0, 0), Err(Error::InvalidState(_))));
}

#[test]
fn test_integration_full_draw_sequence() {
    let device = SoftwareDevice::new(test_config()).unwrap();

    let mut desc = PipelineStateDesc::new(
        ShaderBytecode::from_bytes(vec![0x03, 0x02, 0x23, 0x07]),
        ShaderBytecode::from_bytes(vec![0x03, 0x02, 0x23, 0x07]),
    );
    desc.root_layout = RootLayout::new(vec![
        DescriptorTableLayout::new(vec![
            DescriptorRange::new(ViewKind::ConstantBuffer, 0, 1),
            DescriptorRange::new(ViewKind::ShaderResource, 1, 1),
        ]),
        DescriptorTableLayout::new(vec![DescriptorRange::new(ViewKind::Sampler, 2, 1)]),
    ]);
    let pipeline = device.create_pipeline_state(&desc).unwrap();

    let constants = device.create_constant_buffer(64).unwrap();
    let texture = device
        .create_texture(&TextureDesc { format: ColorFormat::R8G8B8A8_UNORM, width: 2, height: 2 })
        .unwrap();
    let views = device
        .create_view_heap(&[
            ViewHeapEntry::new(&constants, ViewKind::ConstantBuffer, 0),
            ViewHeapEntry::new(&texture, ViewKind::ShaderResource, 1),
        ])
        .unwrap();
    let samplers = device.create_sampler_heap(&[SamplerHeapEntry::new(SamplerType::Bilinear, 2)]).unwrap();

    let vertices = device.create_buffer(&BufferDesc { size: 3 * 12, kind: BufferKind::Upload }).unwrap();
    vertices.map().unwrap().write_slice(0, &[0.0f32, 0.5, 0.0, -0.5, -0.5, 0.0, 0.5, -0.5, 0.0]).unwrap();
    let indices = device.create_buffer(&BufferDesc { size: 6, kind: BufferKind::Upload }).unwrap();
    indices.map().unwrap().write_slice(0, &[0u16, 1, 2]).unwrap();
    let buffers = device
        .create_index_vertex_buffers_set(
            vec![VertexBufferView::new(&vertices, 12)],
            Some(IndexBufferView::new(&indices, IndexType::U16)),
        )
        .unwrap();

    let target = device
        .create_render_target(ColorFormat::R8G8B8A8_UNORM, 8, 8, [0.0, 0.0, 0.0, 1.0])
        .unwrap();
    let depth = device.create_depth_stencil_target(8, 8).unwrap();
    let set = device
        .create_render_target_set(&[Arc::clone(&target)], &[ColorFormat::R8G8B8A8_UNORM], 8, 8, Some(&depth))
        .unwrap();

    let mut list = device.create_command_list().unwrap();
    list.open().unwrap();
    list.resource_barriers(&[Transition::new(&texture, ResourceUsage::CopyDest, ResourceUsage::GenericRead)])
        .unwrap();
    list.bind_render_target_set(&set).unwrap();
    list.clear_render_target_set(&set, [0.2, 0.4, 0.6, 1.0]).unwrap();
    list.clear_depth_stencil(&set, 1.0, 0).unwrap();
    list.set_pipeline_state(&pipeline).unwrap();
    list.set_descriptor_table(0, &views).unwrap();
    list.set_descriptor_table(1, &samplers).unwrap();
    assert!(matches!(list.set_descriptor_table(0, &samplers), Err(Error::InvalidResource(_))));
    assert!(matches!(list.set_descriptor_table(2, &views), Err(Error::InvalidResource(_))));
    list.set_index_vertex_buffers_set(&buffers).unwrap();
    list.draw_indexed_instanced(3, 1, 0, 0, 0).unwrap();
    assert!(matches!(list.draw_indexed_instanced(4, 1, 0, 0, 0), Err(Error::InvalidResource(_))));
    list.draw_instanced(3, 2, 0, 0).unwrap();
    submit_and_wait(&device, &mut list);

    assert_eq!(device.draws_executed(), 2);
}

#[test]
fn test_integration_fullscreen_triangle_draw() {
    let device = SoftwareDevice::new(test_config()).unwrap();

    let buffers = device.create_fullscreen_triangle().unwrap();
    assert!(buffers.index_buffer().is_none());
    assert_eq!(buffers.vertex_buffers().len(), 1);
    let view = &buffers.vertex_buffers()[0];
    assert_eq!(view.stride, ScreenVertex::STRIDE);
    assert_eq!(read_all(&view.buffer), bytemuck::cast_slice::<ScreenVertex, u8>(&FULLSCREEN_TRIANGLE));

    let mut desc = PipelineStateDesc::new(
        ShaderBytecode::from_bytes(vec![0x03, 0x02, 0x23, 0x07]),
        ShaderBytecode::from_bytes(vec![0x03, 0x02, 0x23, 0x07]),
    );
    desc.vertex_layout = ScreenVertex::layout();
    desc.depth_format = None;
    let pipeline = device.create_pipeline_state(&desc).unwrap();

    let target = device
        .create_render_target(ColorFormat::R8G8B8A8_UNORM, 8, 8, [0.0, 0.0, 0.0, 1.0])
        .unwrap();
    let set = device
        .create_render_target_set(&[Arc::clone(&target)], &[ColorFormat::R8G8B8A8_UNORM], 8, 8, None)
        .unwrap();

    let mut list = device.create_command_list().unwrap();
    list.open().unwrap();
    list.bind_render_target_set(&set).unwrap();
    list.set_pipeline_state(&pipeline).unwrap();
    list.set_index_vertex_buffers_set(&buffers).unwrap();
    list.draw_instanced(3, 1, 0, 0).unwrap();
    submit_and_wait(&device, &mut list);

    assert_eq!(device.draws_executed(), 1);
}

// ============================================================================
// RENDER TARGET SET RELEASE
// ============================================================================

#[test]
fn test_integration_dropping_set_keeps_members() {
    let device = SoftwareDevice::new(test_config()).unwrap();
    let target = device
        .create_render_target(ColorFormat::R8G8B8A8_UNORM, 4, 4, [0.0, 0.0, 0.0, 1.0])
        .unwrap();
    let set = device
        .create_render_target_set(&[Arc::clone(&target)], &[ColorFormat::R8G8B8A8_UNORM], 4, 4, None)
        .unwrap();
    let live = device.stats().live_resources;
    drop(set);
    assert_eq!(device.stats().live_resources, live);

    // The member is still a usable clear target on its own
    let again = device
        .create_render_target_set(&[Arc::clone(&target)], &[ColorFormat::R8G8B8A8_UNORM], 4, 4, None)
        .unwrap();
    let output = readback_buffer(&device, 64);
    let mut list = device.create_command_list().unwrap();
    list.open().unwrap();
    list.clear_render_target_set(&again, [1.0, 1.0, 1.0, 1.0]).unwrap();
    list.resource_barriers(&[Transition::new(&target, ResourceUsage::RenderTarget, ResourceUsage::CopySource)])
        .unwrap();
    list.copy_texture_to_buffer(&target, &output, 0).unwrap();
    submit_and_wait(&device, &mut list);

    assert!(read_all(&output).iter().all(|byte| *byte == 255));
}

#[test]
fn test_integration_resource_released_when_last_handle_drops() {
    let device = SoftwareDevice::new(test_config()).unwrap();
    let baseline = device.stats();

    let texture = device
        .create_texture(&TextureDesc { format: ColorFormat::R32_FLOAT, width: 16, height: 16 })
        .unwrap();
    let clone = Arc::clone(&texture);
    assert_eq!(device.stats().allocated_bytes, baseline.allocated_bytes + 1024);

    drop(texture);
    assert_eq!(device.stats().live_resources, baseline.live_resources + 1);
    drop(clone);
    assert_eq!(device.stats(), baseline);
}
