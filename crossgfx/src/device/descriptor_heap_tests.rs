//! Unit tests for descriptor_heap.rs

use crate::device::{
    resolve_sampler_entries, resolve_view_entries, AddressMode, ColorFormat, Descriptor,
    DeviceConfig, FilterMode, GraphicsDevice, HeapKind, SamplerDesc, SamplerHeapEntry,
    SamplerType, ViewHeapEntry, ViewKind,
};
use crate::error::Error;
use crate::software::SoftwareDevice;

fn device() -> SoftwareDevice {
    SoftwareDevice::new(DeviceConfig::default()).unwrap()
}

// ============================================================================
// SAMPLER PRESETS
// ============================================================================

#[test]
fn test_nearest_preset() {
    let desc = SamplerDesc::preset(SamplerType::Nearest);
    assert_eq!(desc.min_filter, FilterMode::Point);
    assert_eq!(desc.mip_filter, FilterMode::Point);
    assert_eq!(desc.max_lod, 0.0);
    assert_eq!(desc.max_anisotropy, 1);
    assert_eq!(desc.address, AddressMode::Wrap);
}

#[test]
fn test_bilinear_preset_has_point_mips() {
    let desc = SamplerDesc::preset(SamplerType::Bilinear);
    assert_eq!(desc.mag_filter, FilterMode::Linear);
    assert_eq!(desc.mip_filter, FilterMode::Point);
    assert_eq!(desc.max_lod, 0.0);
}

#[test]
fn test_trilinear_and_anisotropic_presets() {
    let tri = SamplerDesc::preset(SamplerType::Trilinear);
    assert_eq!(tri.mip_filter, FilterMode::Linear);
    assert_eq!(tri.max_lod, 1000.0);
    assert!(!tri.anisotropic);

    let aniso = SamplerDesc::preset(SamplerType::Anisotropic);
    assert!(aniso.anisotropic);
    assert_eq!(aniso.max_anisotropy, 16);
    assert_eq!(aniso.max_lod, 1000.0);
    assert_eq!(aniso.min_lod, 0.0);
}

// ============================================================================
// VIEW ENTRY RESOLUTION
// ============================================================================

#[test]
fn test_slot_i_matches_entry_i() {
    let device = device();
    let buf_a = device.create_constant_buffer(64).unwrap();
    let tex_b = device.create_render_target(ColorFormat::R8G8B8A8_UNORM, 4, 4, [0.0; 4]).unwrap();
    let tex_c = device.create_render_target(ColorFormat::R32_FLOAT, 4, 4, [0.0; 4]).unwrap();

    let slots = resolve_view_entries(&[
        ViewHeapEntry::new(&buf_a, ViewKind::ConstantBuffer, 0),
        ViewHeapEntry::new(&tex_b, ViewKind::ShaderResource, 0),
        ViewHeapEntry::new(&tex_c, ViewKind::ShaderResource, 1),
    ])
    .unwrap();

    assert_eq!(slots.len(), 3);
    assert_eq!(slots[0].descriptor.resource(), Some(buf_a.id()));
    assert_eq!(slots[1].descriptor.resource(), Some(tex_b.id()));
    assert_eq!(slots[2].descriptor.resource(), Some(tex_c.id()));
    assert_eq!(slots[2].slot_hint, 1);
    match &slots[1].descriptor {
        Descriptor::ShaderResource { view, .. } => {
            assert_eq!(*view, tex_b.info().views.shader_resource.unwrap());
        }
        other => panic!("unexpected descriptor {:?}", other),
    }
}

#[test]
fn test_sampler_kind_in_view_heap_is_rejected() {
    let device = device();
    let buf = device.create_constant_buffer(16).unwrap();
    let result = resolve_view_entries(&[ViewHeapEntry::new(&buf, ViewKind::Sampler, 0)]);
    assert!(matches!(result, Err(Error::UnsupportedViewKind(_))));
}

#[test]
fn test_unordered_access_is_rejected() {
    let device = device();
    let buf = device.create_constant_buffer(16).unwrap();
    let result = resolve_view_entries(&[ViewHeapEntry::new(&buf, ViewKind::UnorderedAccess, 0)]);
    assert!(matches!(result, Err(Error::UnsupportedViewKind(_))));
}

#[test]
fn test_missing_view_is_rejected() {
    let device = device();
    // Constant buffers carry no shader-resource view
    let buf = device.create_constant_buffer(16).unwrap();
    let result = resolve_view_entries(&[ViewHeapEntry::new(&buf, ViewKind::ShaderResource, 0)]);
    assert!(matches!(result, Err(Error::MissingView(_))));
}

#[test]
fn test_sampler_entries_keep_order() {
    let slots = resolve_sampler_entries(&[
        SamplerHeapEntry::new(SamplerType::Anisotropic, 0),
        SamplerHeapEntry::new(SamplerType::Nearest, 1),
    ]);
    assert_eq!(slots[0].descriptor.kind(), ViewKind::Sampler);
    assert_eq!(
        slots[1].descriptor,
        Descriptor::Sampler {
            sampler: SamplerType::Nearest,
            desc: SamplerDesc::preset(SamplerType::Nearest),
        }
    );
}

// ============================================================================
// HEAP TRAIT DEFAULTS
// ============================================================================

#[test]
fn test_heap_offsets_use_increment_size() {
    let device = device();
    let heap = device
        .create_sampler_heap(&[
            SamplerHeapEntry::new(SamplerType::Bilinear, 0),
            SamplerHeapEntry::new(SamplerType::Trilinear, 1),
            SamplerHeapEntry::new(SamplerType::Nearest, 2),
        ])
        .unwrap();
    assert_eq!(heap.kind(), HeapKind::Sampler);
    assert_eq!(heap.len(), 3);
    assert!(!heap.is_empty());
    assert_eq!(heap.offset_of(0), 0);
    assert_eq!(heap.offset_of(2), 2 * heap.increment_size() as u64);
    assert!(heap.descriptor(3).is_none());
}
