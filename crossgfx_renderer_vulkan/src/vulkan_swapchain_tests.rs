//! Unit tests for swapchain parameter selection (no surface needed)

use ash::vk;
use crossgfx::gfx::render::ColorFormat;
use super::*;

fn capabilities(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        current_extent: vk::Extent2D { width: current.0, height: current.1 },
        min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
        max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
        ..Default::default()
    }
}

fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
    vk::SurfaceFormatKHR {
        format,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    }
}

#[test]
fn test_vsync_always_uses_fifo() {
    let available = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
    assert_eq!(choose_present_mode(true, &available), vk::PresentModeKHR::FIFO);
}

#[test]
fn test_no_vsync_prefers_mailbox_then_immediate() {
    let all = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX];
    assert_eq!(choose_present_mode(false, &all), vk::PresentModeKHR::MAILBOX);

    let no_mailbox = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
    assert_eq!(choose_present_mode(false, &no_mailbox), vk::PresentModeKHR::IMMEDIATE);

    let fifo_only = [vk::PresentModeKHR::FIFO];
    assert_eq!(choose_present_mode(false, &fifo_only), vk::PresentModeKHR::FIFO);
}

#[test]
fn test_image_count_clamped_to_surface_limits() {
    assert_eq!(choose_image_count(2, 2, 8), 2);
    assert_eq!(choose_image_count(1, 2, 8), 2);
    assert_eq!(choose_image_count(16, 2, 8), 8);
    // max_image_count == 0 means no upper limit
    assert_eq!(choose_image_count(16, 2, 0), 16);
}

#[test]
fn test_extent_uses_current_extent_when_fixed() {
    let caps = capabilities((800, 600), (1, 1), (4096, 4096));
    let extent = choose_extent(&caps, 1280, 720);
    assert_eq!((extent.width, extent.height), (800, 600));
}

#[test]
fn test_extent_clamps_window_size_when_free() {
    let caps = capabilities((u32::MAX, u32::MAX), (64, 64), (1024, 1024));
    let extent = choose_extent(&caps, 1920, 32);
    assert_eq!((extent.width, extent.height), (1024, 64));
}

#[test]
fn test_surface_format_prefers_requested() {
    let available = [
        surface_format(vk::Format::B8G8R8A8_SRGB),
        surface_format(vk::Format::B8G8R8A8_UNORM),
    ];
    let (format, color) = choose_surface_format(ColorFormat::B8G8R8A8_UNORM, &available).unwrap();
    assert_eq!(format.format, vk::Format::B8G8R8A8_UNORM);
    assert_eq!(color, ColorFormat::B8G8R8A8_UNORM);
}

#[test]
fn test_surface_format_falls_back_to_first_known() {
    let available = [
        surface_format(vk::Format::A2B10G10R10_UNORM_PACK32),
        surface_format(vk::Format::R8G8B8A8_SRGB),
    ];
    let (_, color) = choose_surface_format(ColorFormat::B8G8R8A8_UNORM, &available).unwrap();
    assert_eq!(color, ColorFormat::R8G8B8A8_SRGB);
}

#[test]
fn test_surface_format_none_when_nothing_matches() {
    let available = [surface_format(vk::Format::A2B10G10R10_UNORM_PACK32)];
    assert!(choose_surface_format(ColorFormat::B8G8R8A8_UNORM, &available).is_none());
}

#[test]
fn test_first_acquire_only_for_untouched_images() {
    let mut initialized = vec![false, false, false];
    assert!(is_first_acquire(&initialized, 1));

    initialized[1] = true;
    assert!(!is_first_acquire(&initialized, 1));
    assert!(is_first_acquire(&initialized, 2));

    // Out of range indices never trigger a transition
    assert!(!is_first_acquire(&initialized, 3));
}
