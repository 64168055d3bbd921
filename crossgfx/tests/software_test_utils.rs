//! Shared helpers for integration tests running on the software backend

#![allow(dead_code)]

use std::sync::Arc;
use crossgfx::gfx::render::{BufferDesc, BufferKind, CommandList, Resource};
use crossgfx::gfx::{DeviceConfig, GfxContext, GraphicsDevice};
use crossgfx::software::SoftwareDevice;

/// Device config with small backbuffers and usage tracking forced on
pub fn test_config() -> DeviceConfig {
    DeviceConfig {
        app_name: "crossgfx integration tests".to_string(),
        backbuffer_extent: (16, 16),
        track_usage: true,
        ..DeviceConfig::default()
    }
}

pub fn create_test_context() -> Arc<GfxContext> {
    GfxContext::new(SoftwareDevice::new(test_config()).unwrap())
}

pub fn readback_buffer(device: &dyn GraphicsDevice, size: u64) -> Arc<dyn Resource> {
    device.create_buffer(&BufferDesc { size, kind: BufferKind::Readback }).unwrap()
}

/// Copy of a readback buffer's contents
pub fn read_all(buffer: &Arc<dyn Resource>) -> Vec<u8> {
    let mapping = buffer.map().unwrap();
    mapping.read(0, mapping.size() as usize).unwrap()
}

/// Close and submit a list, then wait for the queue
pub fn submit_and_wait(device: &dyn GraphicsDevice, list: &mut Box<dyn CommandList>) {
    list.close().unwrap();
    device.submit(&[&**list]).unwrap();
    device.wait_for_queue_idle().unwrap();
}
