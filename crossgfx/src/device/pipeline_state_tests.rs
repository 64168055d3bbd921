//! Unit tests for pipeline_state.rs

use crate::device::{
    CompareOp, CullMode, DescriptorRange, DescriptorTableLayout, PipelineStateDesc,
    PrimitiveTopology, RootLayout, ShaderBytecode, ViewKind,
};
use crate::error::Error;

#[test]
fn test_desc_defaults() {
    let desc = PipelineStateDesc::new(
        ShaderBytecode::from_bytes(vec![1, 2, 3, 4]),
        ShaderBytecode::from_bytes(vec![5, 6, 7, 8]),
    );
    assert_eq!(desc.topology, PrimitiveTopology::TriangleList);
    assert_eq!(desc.cull_mode, CullMode::None);
    assert!(desc.depth.test_enable);
    assert_eq!(desc.depth.compare_op, CompareOp::Less);
    assert!(desc.root_layout.tables.is_empty());
    assert_eq!(desc.vertex_shader.entry_point, "main");
}

#[test]
fn test_table_descriptor_count() {
    let table = DescriptorTableLayout::new(vec![
        DescriptorRange::new(ViewKind::ConstantBuffer, 0, 1),
        DescriptorRange::new(ViewKind::ShaderResource, 0, 3),
    ]);
    assert_eq!(table.descriptor_count(), 4);
    assert!(!table.is_sampler_table());
}

#[test]
fn test_sampler_table_detection() {
    let table = DescriptorTableLayout::new(vec![DescriptorRange::new(ViewKind::Sampler, 0, 2)]);
    assert!(table.is_sampler_table());
    assert!(!DescriptorTableLayout::default().is_sampler_table());
}

#[test]
fn test_root_layout_lookup() {
    let layout = RootLayout::new(vec![
        DescriptorTableLayout::new(vec![DescriptorRange::new(ViewKind::ShaderResource, 0, 1)]),
        DescriptorTableLayout::new(vec![DescriptorRange::new(ViewKind::Sampler, 0, 1)]),
    ]);
    assert!(layout.table(1).unwrap().is_sampler_table());
    assert!(layout.table(2).is_none());
}

#[test]
fn test_bytecode_from_missing_file() {
    let result = ShaderBytecode::from_file("does/not/exist.spv");
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_bytecode_from_file_is_opaque() {
    let path = std::env::temp_dir().join(format!("crossgfx_bytecode_{}.bin", std::process::id()));
    std::fs::write(&path, [0xde, 0xad, 0xbe, 0xef]).unwrap();
    let bytecode = ShaderBytecode::from_file(&path).unwrap().with_entry_point("vs_main");
    std::fs::remove_file(&path).ok();
    assert_eq!(bytecode.code, vec![0xde, 0xad, 0xbe, 0xef]);
    assert_eq!(bytecode.entry_point, "vs_main");
}
