//! Unit tests for software_device.rs

use std::sync::Arc;
use crate::device::{
    BufferDesc, BufferKind, ColorFormat, CommandList, DeviceConfig, GraphicsDevice, PipelineStateDesc,
    Resource, ResourceUsage, ShaderBytecode, TextureDesc, Transition,
};
use crate::error::Error;
use crate::software::SoftwareDevice;

fn small_config() -> DeviceConfig {
    DeviceConfig {
        backbuffer_extent: (8, 4),
        track_usage: true,
        ..DeviceConfig::default()
    }
}

fn device() -> SoftwareDevice {
    SoftwareDevice::new(small_config()).unwrap()
}

fn readback(device: &SoftwareDevice, size: u64) -> Arc<dyn Resource> {
    device.create_buffer(&BufferDesc { size, kind: BufferKind::Readback }).unwrap()
}

fn upload(device: &SoftwareDevice, bytes: &[u8]) -> Arc<dyn Resource> {
    let buffer = device
        .create_buffer(&BufferDesc { size: bytes.len() as u64, kind: BufferKind::Upload })
        .unwrap();
    buffer.map().unwrap().write(0, bytes).unwrap();
    buffer
}

// ============================================================================
// CREATION
// ============================================================================

#[test]
fn test_new_creates_configured_backbuffers() {
    let device = device();
    assert_eq!(device.backbuffer_count(), 2);

    let backbuffer = device.backbuffer(1).unwrap();
    let info = backbuffer.info();
    assert_eq!((info.width, info.height), (8, 4));
    assert_eq!(info.initial_usage, ResourceUsage::Present);
}

#[test]
fn test_stats_count_live_resources() {
    let device = device();
    let baseline = device.stats();
    assert_eq!(baseline.live_resources, 2);

    let buffer = device.create_constant_buffer(100).unwrap();
    let stats = device.stats();
    assert_eq!(stats.live_resources, 3);
    assert_eq!(stats.allocated_bytes, baseline.allocated_bytes + 256);

    drop(buffer);
    assert_eq!(device.stats().live_resources, 2);
}

#[test]
fn test_pipeline_state_rejects_empty_bytecode() {
    let device = device();
    let desc = PipelineStateDesc::new(ShaderBytecode::from_bytes(Vec::new()), ShaderBytecode::from_bytes(vec![1]));
    assert!(matches!(device.create_pipeline_state(&desc), Err(Error::InvalidResource(_))));
}

#[test]
fn test_zero_sized_buffer_rejected() {
    let device = device();
    let result = device.create_buffer(&BufferDesc { size: 0, kind: BufferKind::Upload });
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

// ============================================================================
// SUBMISSION
// ============================================================================

#[test]
fn test_submit_rejects_open_list() {
    let device = device();
    let mut list = device.create_command_list().unwrap();
    list.open().unwrap();
    assert!(matches!(device.submit(&[list.as_ref()]), Err(Error::InvalidState(_))));
    assert_eq!(device.stats().submissions, 0);
}

#[test]
fn test_submit_executes_clear_and_readback() {
    let device = device();
    let target = device
        .create_render_target(ColorFormat::R8G8B8A8_UNORM, 2, 2, [0.0, 0.0, 0.0, 1.0])
        .unwrap();
    let set = device.create_render_target_set(&[Arc::clone(&target)], &[ColorFormat::R8G8B8A8_UNORM], 2, 2, None).unwrap();
    let output = readback(&device, 16);

    let mut list = device.create_command_list().unwrap();
    list.open().unwrap();
    list.clear_render_target_set(&set, [1.0, 0.0, 0.0, 1.0]).unwrap();
    list.resource_barriers(&[Transition::new(&target, ResourceUsage::RenderTarget, ResourceUsage::CopySource)])
        .unwrap();
    list.copy_texture_to_buffer(&target, &output, 0).unwrap();
    list.close().unwrap();
    device.submit(&[list.as_ref()]).unwrap();
    device.wait_for_queue_idle().unwrap();

    let pixels = output.map().unwrap().read(0, 16).unwrap();
    assert_eq!(pixels, [255u8, 0, 0, 255].repeat(4));
    assert_eq!(device.executed_usage(&target).unwrap(), ResourceUsage::CopySource);
    assert_eq!(device.stats().submissions, 1);
}

#[test]
fn test_overlapping_copy_within_one_buffer() {
    let device = device();
    let buffer = upload(&device, &[1, 2, 3, 4, 5, 6]);
    let output = readback(&device, 6);

    let mut list = device.create_command_list().unwrap();
    list.open().unwrap();
    list.copy_buffer_to_buffer(&buffer, 0, &buffer, 2, 4).unwrap();
    list.copy_buffer_to_buffer(&buffer, 0, &output, 0, 6).unwrap();
    list.close().unwrap();
    device.submit(&[list.as_ref()]).unwrap();

    assert_eq!(output.map().unwrap().read(0, 6).unwrap(), vec![1, 2, 1, 2, 3, 4]);
}

#[test]
fn test_lists_execute_in_submission_order() {
    let device = device();
    let first = upload(&device, &[7; 4]);
    let second = upload(&device, &[9; 4]);
    let output = readback(&device, 4);

    let mut a = device.create_command_list().unwrap();
    a.open().unwrap();
    a.copy_buffer_to_buffer(&first, 0, &output, 0, 4).unwrap();
    a.close().unwrap();

    let mut b = device.create_command_list().unwrap();
    b.open().unwrap();
    b.copy_buffer_to_buffer(&second, 0, &output, 0, 4).unwrap();
    b.close().unwrap();

    device.submit(&[a.as_ref(), b.as_ref()]).unwrap();
    assert_eq!(output.map().unwrap().read(0, 4).unwrap(), vec![9; 4]);
}

#[test]
fn test_texture_upload_round_trip() {
    let device = device();
    let texture = device
        .create_texture(&TextureDesc { format: ColorFormat::R8G8B8A8_UNORM, width: 2, height: 1 })
        .unwrap();
    let source = upload(&device, &[10, 20, 30, 40, 50, 60, 70, 80]);
    let output = readback(&device, 8);

    let mut list = device.create_command_list().unwrap();
    list.open().unwrap();
    list.copy_buffer_to_texture(&source, 0, &texture).unwrap();
    list.resource_barriers(&[Transition::new(&texture, ResourceUsage::CopyDest, ResourceUsage::CopySource)])
        .unwrap();
    list.copy_texture_to_buffer(&texture, &output, 0).unwrap();
    list.close().unwrap();
    device.submit(&[list.as_ref()]).unwrap();

    assert_eq!(output.map().unwrap().read(0, 8).unwrap(), vec![10, 20, 30, 40, 50, 60, 70, 80]);
}

// ============================================================================
// BACKBUFFERS
// ============================================================================

#[test]
fn test_acquire_cycles_backbuffers() {
    let device = device();
    let indices: Vec<u32> = (0..5).map(|_| device.acquire_next_backbuffer().unwrap()).collect();
    assert_eq!(indices, vec![0, 1, 0, 1, 0]);
}

#[test]
fn test_acquire_without_backbuffers_fails() {
    let device = SoftwareDevice::new(DeviceConfig { backbuffer_count: 0, ..small_config() }).unwrap();
    assert!(matches!(device.acquire_next_backbuffer(), Err(Error::InvalidState(_))));
}

#[test]
fn test_backbuffer_out_of_range() {
    let device = device();
    assert!(matches!(device.backbuffer(2), Err(Error::InvalidResource(_))));
    assert!(matches!(device.present(2), Err(Error::InvalidResource(_))));
}

#[test]
fn test_present_requires_present_usage() {
    let device = device();
    let index = device.acquire_next_backbuffer().unwrap();

    let mut list = device.create_command_list().unwrap();
    list.open().unwrap();
    device.set_backbuffer_as_render_target(list.as_mut(), index).unwrap();
    list.close().unwrap();
    device.submit(&[list.as_ref()]).unwrap();

    assert!(matches!(device.present(index), Err(Error::UsageMismatch(_))));

    list.open().unwrap();
    device.set_backbuffer_as_present(list.as_mut(), index).unwrap();
    list.close().unwrap();
    device.submit(&[list.as_ref()]).unwrap();

    device.present(index).unwrap();
    assert_eq!(device.stats().frames_presented, 1);
}

#[test]
fn test_backbuffer_clear_uses_bgra_layout() {
    let device = device();
    let index = device.acquire_next_backbuffer().unwrap();
    let backbuffer = device.backbuffer(index).unwrap();
    let set = device
        .create_render_target_set(&[Arc::clone(&backbuffer)], &[ColorFormat::B8G8R8A8_UNORM], 8, 4, None)
        .unwrap();

    let mut list = device.create_command_list().unwrap();
    list.open().unwrap();
    device.set_backbuffer_as_render_target(list.as_mut(), index).unwrap();
    list.clear_render_target_set(&set, [1.0, 0.0, 0.0, 1.0]).unwrap();
    device.set_backbuffer_as_present(list.as_mut(), index).unwrap();
    list.close().unwrap();
    device.submit(&[list.as_ref()]).unwrap();

    let contents = crate::software::software_resource(backbuffer.as_ref()).unwrap().contents().unwrap();
    assert_eq!(&contents[..4], &[0u8, 0, 255, 255]);
}

#[test]
fn test_reopened_list_discards_recorded_barriers() {
    let device = device();
    let target = device
        .create_render_target(ColorFormat::R8G8B8A8_UNORM, 4, 4, [0.0; 4])
        .unwrap();

    let mut list = device.create_command_list().unwrap();
    list.open().unwrap();
    list.resource_barriers(&[Transition::new(&target, ResourceUsage::RenderTarget, ResourceUsage::CopySource)])
        .unwrap();
    list.close().unwrap();
    assert_eq!(device.usage_tracker().current(target.id()), Some(ResourceUsage::RenderTarget));

    // Reopened without submitting: the first recording never happened
    list.open().unwrap();
    list.resource_barriers(&[Transition::new(&target, ResourceUsage::RenderTarget, ResourceUsage::GenericRead)])
        .unwrap();
    list.close().unwrap();
    device.submit(&[list.as_ref()]).unwrap();

    assert_eq!(device.usage_tracker().current(target.id()), Some(ResourceUsage::GenericRead));
    assert_eq!(device.executed_usage(&target).unwrap(), ResourceUsage::GenericRead);
}

#[test]
fn test_lists_recorded_out_of_order_submit_in_order() {
    let device = device();
    let target = device
        .create_render_target(ColorFormat::R8G8B8A8_UNORM, 4, 4, [0.0; 4])
        .unwrap();

    let mut back = device.create_command_list().unwrap();
    back.open().unwrap();
    back.resource_barriers(&[Transition::new(&target, ResourceUsage::CopySource, ResourceUsage::RenderTarget)])
        .unwrap();
    back.close().unwrap();

    let mut to_copy = device.create_command_list().unwrap();
    to_copy.open().unwrap();
    to_copy
        .resource_barriers(&[Transition::new(&target, ResourceUsage::RenderTarget, ResourceUsage::CopySource)])
        .unwrap();
    to_copy.close().unwrap();

    assert!(matches!(device.submit(&[back.as_ref()]), Err(Error::UsageMismatch(_))));
    assert_eq!(device.stats().submissions, 0);

    device.submit(&[to_copy.as_ref(), back.as_ref()]).unwrap();
    assert_eq!(device.usage_tracker().current(target.id()), Some(ResourceUsage::RenderTarget));
}

#[test]
fn test_live_resources_follow_allocations() {
    let device = device();
    let backbuffers = device.live_resources();
    assert_eq!(backbuffers.len(), device.config().backbuffer_count as usize);

    let buffer = readback(&device, 16);
    let live = device.live_resources();
    assert_eq!(live.len(), backbuffers.len() + 1);
    assert_eq!(live.last(), Some(&buffer.id()));

    drop(buffer);
    assert_eq!(device.live_resources(), backbuffers);
}
