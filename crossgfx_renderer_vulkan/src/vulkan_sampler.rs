/// Sampler cache - one immutable `VkSampler` per sampler preset
///
/// Sampler heaps only ever reference the four presets, so samplers are built
/// on first use and shared by every heap until the device goes away.

use ash::vk;
use rustc_hash::FxHashMap;
use crossgfx::gfx::Result;
use crossgfx::gfx::render::{SamplerDesc, SamplerType};
use crossgfx::{gfx_debug, gfx_err};

use crate::vulkan_format::{address_mode_to_vk, filter_to_vk, mipmap_mode_to_vk};

pub(crate) struct SamplerCache {
    cache: FxHashMap<SamplerType, vk::Sampler>,
}

impl SamplerCache {
    pub(crate) fn new() -> Self {
        Self { cache: FxHashMap::default() }
    }

    /// Native sampler for a preset, created on first request
    pub(crate) fn get(&mut self, device: &ash::Device, sampler: SamplerType) -> Result<vk::Sampler> {
        if let Some(&native) = self.cache.get(&sampler) {
            return Ok(native);
        }

        let desc = SamplerDesc::preset(sampler);
        let create_info = sampler_create_info(&desc);
        let native = unsafe {
            device
                .create_sampler(&create_info, None)
                .map_err(|e| gfx_err!("crossgfx::vulkan", BackendError, "Failed to create {:?} sampler: {:?}", sampler, e))?
        };

        gfx_debug!("crossgfx::vulkan", "Created {:?} sampler", sampler);
        self.cache.insert(sampler, native);
        Ok(native)
    }

    pub(crate) fn destroy_all(&mut self, device: &ash::Device) {
        for (_, native) in self.cache.drain() {
            unsafe {
                device.destroy_sampler(native, None);
            }
        }
    }
}

fn sampler_create_info(desc: &SamplerDesc) -> vk::SamplerCreateInfo<'static> {
    let address = address_mode_to_vk(desc.address);
    vk::SamplerCreateInfo::default()
        .mag_filter(filter_to_vk(desc.mag_filter))
        .min_filter(filter_to_vk(desc.min_filter))
        .mipmap_mode(mipmap_mode_to_vk(desc.mip_filter))
        .address_mode_u(address)
        .address_mode_v(address)
        .address_mode_w(address)
        .mip_lod_bias(0.0)
        .anisotropy_enable(desc.anisotropic)
        .max_anisotropy(desc.max_anisotropy as f32)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .min_lod(desc.min_lod)
        .max_lod(desc.max_lod)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anisotropic_preset_enables_anisotropy() {
        let info = sampler_create_info(&SamplerDesc::preset(SamplerType::Anisotropic));
        assert_eq!(info.anisotropy_enable, vk::TRUE);
        assert!(info.max_anisotropy > 1.0);
    }

    #[test]
    fn test_nearest_preset_uses_nearest_filters() {
        let info = sampler_create_info(&SamplerDesc::preset(SamplerType::Nearest));
        assert_eq!(info.mag_filter, vk::Filter::NEAREST);
        assert_eq!(info.min_filter, vk::Filter::NEAREST);
        assert_eq!(info.anisotropy_enable, vk::FALSE);
    }
}
