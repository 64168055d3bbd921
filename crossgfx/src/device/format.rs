/// Color, depth and vertex formats accepted at the API boundary

use half::f16;

/// Logical color format of a texture, render target or shader-resource view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum ColorFormat {
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R16G16B16A16_FLOAT,
    R32G32B32A32_FLOAT,
    /// Single channel float, also the shader-resource view of a depth target
    R32_FLOAT,
}

/// Depth format of a depth-stencil target
///
/// Depth targets are always allocated so that they can be read back in a
/// shader as `ColorFormat::R32_FLOAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum DepthFormat {
    D32_FLOAT,
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum VertexFormat {
    R32_SFLOAT,
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32B32A32_SFLOAT,
}

impl ColorFormat {
    /// Size of one texel in bytes
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            ColorFormat::R8G8B8A8_UNORM
            | ColorFormat::R8G8B8A8_SRGB
            | ColorFormat::B8G8R8A8_UNORM
            | ColorFormat::B8G8R8A8_SRGB
            | ColorFormat::R32_FLOAT => 4,
            ColorFormat::R16G16B16A16_FLOAT => 8,
            ColorFormat::R32G32B32A32_FLOAT => 16,
        }
    }

    pub fn is_srgb(self) -> bool {
        matches!(self, ColorFormat::R8G8B8A8_SRGB | ColorFormat::B8G8R8A8_SRGB)
    }

    /// Encode a linear RGBA color into the texel layout of this format.
    ///
    /// This is the value a clear writes into every texel.
    pub fn encode_color(self, color: [f32; 4]) -> Vec<u8> {
        let [r, g, b, a] = color;
        match self {
            ColorFormat::R8G8B8A8_UNORM => vec![unorm8(r), unorm8(g), unorm8(b), unorm8(a)],
            ColorFormat::B8G8R8A8_UNORM => vec![unorm8(b), unorm8(g), unorm8(r), unorm8(a)],
            ColorFormat::R8G8B8A8_SRGB => {
                vec![srgb8(r), srgb8(g), srgb8(b), unorm8(a)]
            }
            ColorFormat::B8G8R8A8_SRGB => {
                vec![srgb8(b), srgb8(g), srgb8(r), unorm8(a)]
            }
            ColorFormat::R16G16B16A16_FLOAT => color
                .iter()
                .flat_map(|c| f16::from_f32(*c).to_le_bytes())
                .collect(),
            ColorFormat::R32G32B32A32_FLOAT => color
                .iter()
                .flat_map(|c| c.to_le_bytes())
                .collect(),
            ColorFormat::R32_FLOAT => r.to_le_bytes().to_vec(),
        }
    }
}

impl DepthFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            DepthFormat::D32_FLOAT => 4,
        }
    }

    /// Format of the single-channel shader-resource view of a depth target
    pub fn shader_view_format(self) -> ColorFormat {
        match self {
            DepthFormat::D32_FLOAT => ColorFormat::R32_FLOAT,
        }
    }
}

impl VertexFormat {
    pub fn size(self) -> u32 {
        match self {
            VertexFormat::R32_SFLOAT => 4,
            VertexFormat::R32G32_SFLOAT => 8,
            VertexFormat::R32G32B32_SFLOAT => 12,
            VertexFormat::R32G32B32A32_SFLOAT => 16,
        }
    }
}

fn unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn srgb8(linear: f32) -> u8 {
    let linear = linear.clamp(0.0, 1.0);
    let encoded = if linear <= 0.003_130_8 {
        linear * 12.92
    } else {
        1.055 * linear.powf(1.0 / 2.4) - 0.055
    };
    unorm8(encoded)
}

#[cfg(test)]
#[path = "format_tests.rs"]
mod tests;
