/// RenderTargetSet - color targets plus an optional depth target, bound as one

use std::sync::Arc;
use crate::device::{ColorFormat, Resource, ResourceFlags, ResourceKind};
use crate::error::Result;
use crate::gfx_bail;

/// Framebuffer-equivalent aggregate
///
/// The set holds shared handles to its members and never releases them:
/// dropping the set leaves every member usable by anyone else holding it.
#[derive(Clone)]
pub struct RenderTargetSet {
    colors: Vec<Arc<dyn Resource>>,
    formats: Vec<ColorFormat>,
    depth: Option<Arc<dyn Resource>>,
    width: u32,
    height: u32,
}

impl RenderTargetSet {
    pub fn new(
        colors: &[Arc<dyn Resource>],
        formats: &[ColorFormat],
        width: u32,
        height: u32,
        depth: Option<&Arc<dyn Resource>>,
    ) -> Result<Self> {
        if colors.len() != formats.len() {
            gfx_bail!(
                "crossgfx::RenderTargetSet",
                InvalidResource,
                "{} color targets but {} formats",
                colors.len(),
                formats.len()
            );
        }
        if width == 0 || height == 0 {
            gfx_bail!(
                "crossgfx::RenderTargetSet",
                InvalidResource,
                "render target set has zero extent {}x{}",
                width,
                height
            );
        }

        for (index, color) in colors.iter().enumerate() {
            let info = color.info();
            if !info.flags.contains(ResourceFlags::RENDER_TARGET) {
                gfx_bail!(
                    "crossgfx::RenderTargetSet",
                    InvalidResource,
                    "color {} ({:?}) was not created as a render target",
                    index,
                    color.id()
                );
            }
            if info.width < width || info.height < height {
                gfx_bail!(
                    "crossgfx::RenderTargetSet",
                    InvalidResource,
                    "color {} is {}x{}, smaller than the set ({}x{})",
                    index,
                    info.width,
                    info.height,
                    width,
                    height
                );
            }
        }

        if let Some(depth) = depth {
            if !matches!(depth.info().kind, ResourceKind::DepthStencil(_)) {
                gfx_bail!(
                    "crossgfx::RenderTargetSet",
                    InvalidResource,
                    "depth member {:?} is not a depth-stencil target",
                    depth.id()
                );
            }
        }

        Ok(Self {
            colors: colors.to_vec(),
            formats: formats.to_vec(),
            depth: depth.cloned(),
            width,
            height,
        })
    }

    pub fn colors(&self) -> &[Arc<dyn Resource>] {
        &self.colors
    }

    pub fn formats(&self) -> &[ColorFormat] {
        &self.formats
    }

    pub fn depth(&self) -> Option<&Arc<dyn Resource>> {
        self.depth.as_ref()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl std::fmt::Debug for RenderTargetSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTargetSet")
            .field("colors", &self.colors.iter().map(|c| c.id()).collect::<Vec<_>>())
            .field("formats", &self.formats)
            .field("depth", &self.depth.as_ref().map(|d| d.id()))
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
