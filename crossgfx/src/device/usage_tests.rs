//! Unit tests for usage.rs

use std::sync::Arc;
use crate::device::{
    validate_transition, DeviceConfig, GraphicsDevice, PendingUsage, Resource, ResourceUsage,
    Transition, UsageTracker,
};
use crate::error::Error;
use crate::software::SoftwareDevice;

fn two_buffers() -> (SoftwareDevice, Arc<dyn Resource>, Arc<dyn Resource>) {
    let device = SoftwareDevice::new(DeviceConfig::default()).unwrap();
    let a = device.create_constant_buffer(16).unwrap();
    let b = device.create_constant_buffer(16).unwrap();
    (device, a, b)
}

#[test]
fn test_validate_rejects_undefined_after() {
    let (_device, a, _) = two_buffers();
    let t = Transition::new(&a, ResourceUsage::GenericRead, ResourceUsage::Undefined);
    assert!(matches!(validate_transition(&t), Err(Error::UnsupportedUsage(_))));
}

#[test]
fn test_validate_accepts_undefined_before() {
    let (_device, a, _) = two_buffers();
    let t = Transition::new(&a, ResourceUsage::Undefined, ResourceUsage::CopyDest);
    assert!(validate_transition(&t).is_ok());
}

#[test]
fn test_disabled_tracker_accepts_anything() {
    let (_device, a, _) = two_buffers();
    let tracker = UsageTracker::new(false);
    tracker.register(a.id(), ResourceUsage::GenericRead);
    let mut pending = PendingUsage::new();
    let t = Transition::new(&a, ResourceUsage::Present, ResourceUsage::RenderTarget);
    assert!(tracker.stage(&mut pending, &[t]).is_ok());
    assert!(pending.is_empty());
    assert!(tracker.commit(&[&pending]).is_ok());
    assert_eq!(tracker.current(a.id()), None);
}

#[test]
fn test_tracker_applies_transitions_on_commit() {
    let (_device, a, _) = two_buffers();
    let tracker = UsageTracker::new(true);
    tracker.register(a.id(), ResourceUsage::GenericRead);

    let mut pending = PendingUsage::new();
    tracker
        .stage(&mut pending, &[Transition::new(&a, ResourceUsage::GenericRead, ResourceUsage::CopyDest)])
        .unwrap();
    assert_eq!(tracker.current(a.id()), Some(ResourceUsage::GenericRead));
    assert_eq!(pending.local(a.id()), Some(ResourceUsage::CopyDest));

    tracker.commit(&[&pending]).unwrap();
    assert_eq!(tracker.current(a.id()), Some(ResourceUsage::CopyDest));
}

#[test]
fn test_tracker_detects_wrong_before_on_commit() {
    let (_device, a, _) = two_buffers();
    let tracker = UsageTracker::new(true);
    tracker.register(a.id(), ResourceUsage::GenericRead);

    let mut pending = PendingUsage::new();
    tracker
        .stage(&mut pending, &[Transition::new(&a, ResourceUsage::Present, ResourceUsage::RenderTarget)])
        .unwrap();
    assert!(matches!(tracker.commit(&[&pending]), Err(Error::UsageMismatch(_))));
    assert_eq!(tracker.current(a.id()), Some(ResourceUsage::GenericRead));
}

#[test]
fn test_tracker_detects_wrong_before_within_one_list() {
    let (_device, a, _) = two_buffers();
    let tracker = UsageTracker::new(true);
    tracker.register(a.id(), ResourceUsage::GenericRead);

    let mut pending = PendingUsage::new();
    tracker
        .stage(&mut pending, &[Transition::new(&a, ResourceUsage::GenericRead, ResourceUsage::CopyDest)])
        .unwrap();
    let result = tracker.stage(&mut pending, &[Transition::new(&a, ResourceUsage::GenericRead, ResourceUsage::CopySource)]);
    assert!(matches!(result, Err(Error::UsageMismatch(_))));
    assert_eq!(pending.len(), 1);
}

#[test]
fn test_tracker_same_resource_twice_in_one_batch() {
    let (_device, a, _) = two_buffers();
    let tracker = UsageTracker::new(true);
    tracker.register(a.id(), ResourceUsage::Present);
    let mut pending = PendingUsage::new();
    tracker
        .stage(
            &mut pending,
            &[
                Transition::new(&a, ResourceUsage::Present, ResourceUsage::RenderTarget),
                Transition::new(&a, ResourceUsage::RenderTarget, ResourceUsage::Present),
            ],
        )
        .unwrap();
    tracker.commit(&[&pending]).unwrap();
    assert_eq!(tracker.current(a.id()), Some(ResourceUsage::Present));
}

#[test]
fn test_tracker_failed_commit_is_not_applied() {
    let (_device, a, b) = two_buffers();
    let tracker = UsageTracker::new(true);
    tracker.register(a.id(), ResourceUsage::GenericRead);
    tracker.register(b.id(), ResourceUsage::GenericRead);
    let mut pending = PendingUsage::new();
    tracker
        .stage(
            &mut pending,
            &[
                Transition::new(&a, ResourceUsage::GenericRead, ResourceUsage::CopyDest),
                Transition::new(&b, ResourceUsage::CopyDest, ResourceUsage::GenericRead),
            ],
        )
        .unwrap();
    assert!(tracker.commit(&[&pending]).is_err());
    assert_eq!(tracker.current(a.id()), Some(ResourceUsage::GenericRead));
}

#[test]
fn test_tracker_cleared_recording_leaves_no_state() {
    let (_device, a, _) = two_buffers();
    let tracker = UsageTracker::new(true);
    tracker.register(a.id(), ResourceUsage::RenderTarget);

    let mut pending = PendingUsage::new();
    tracker
        .stage(&mut pending, &[Transition::new(&a, ResourceUsage::RenderTarget, ResourceUsage::CopySource)])
        .unwrap();
    pending.clear();

    tracker
        .stage(&mut pending, &[Transition::new(&a, ResourceUsage::RenderTarget, ResourceUsage::GenericRead)])
        .unwrap();
    tracker.commit(&[&pending]).unwrap();
    assert_eq!(tracker.current(a.id()), Some(ResourceUsage::GenericRead));
}

#[test]
fn test_tracker_follows_submission_order_not_recording_order() {
    let (_device, a, _) = two_buffers();
    let tracker = UsageTracker::new(true);
    tracker.register(a.id(), ResourceUsage::Present);

    // Second list recorded first
    let mut second = PendingUsage::new();
    tracker
        .stage(&mut second, &[Transition::new(&a, ResourceUsage::RenderTarget, ResourceUsage::Present)])
        .unwrap();
    let mut first = PendingUsage::new();
    tracker
        .stage(&mut first, &[Transition::new(&a, ResourceUsage::Present, ResourceUsage::RenderTarget)])
        .unwrap();

    tracker.commit(&[&first, &second]).unwrap();
    assert_eq!(tracker.current(a.id()), Some(ResourceUsage::Present));
}

#[test]
fn test_tracker_staged_requirements() {
    let (_device, a, b) = two_buffers();
    let tracker = UsageTracker::new(true);
    tracker.register(a.id(), ResourceUsage::GenericRead);
    tracker.register(b.id(), ResourceUsage::GenericRead);

    let mut pending = PendingUsage::new();
    tracker
        .stage(&mut pending, &[Transition::new(&a, ResourceUsage::GenericRead, ResourceUsage::CopyDest)])
        .unwrap();
    assert!(tracker.stage_expect(&mut pending, a.id(), ResourceUsage::CopyDest).is_ok());
    assert!(matches!(
        tracker.stage_expect(&mut pending, a.id(), ResourceUsage::CopySource),
        Err(Error::UsageMismatch(_))
    ));

    // Not transitioned by this list: checked on commit
    tracker.stage_expect(&mut pending, b.id(), ResourceUsage::CopySource).unwrap();
    assert!(matches!(tracker.commit(&[&pending]), Err(Error::UsageMismatch(_))));
}

#[test]
fn test_tracker_commit_skips_released_resources() {
    let (_device, a, _) = two_buffers();
    let tracker = UsageTracker::new(true);
    tracker.register(a.id(), ResourceUsage::GenericRead);
    let mut pending = PendingUsage::new();
    tracker
        .stage(&mut pending, &[Transition::new(&a, ResourceUsage::GenericRead, ResourceUsage::CopyDest)])
        .unwrap();
    tracker.forget(a.id());
    tracker.commit(&[&pending]).unwrap();
    assert_eq!(tracker.current(a.id()), None);
}

#[test]
fn test_tracker_expect_and_forget() {
    let (_device, a, _) = two_buffers();
    let tracker = UsageTracker::new(true);
    tracker.register(a.id(), ResourceUsage::Present);
    assert!(tracker.expect(a.id(), ResourceUsage::Present).is_ok());
    assert!(tracker.expect(a.id(), ResourceUsage::RenderTarget).is_err());
    tracker.forget(a.id());
    assert_eq!(tracker.current(a.id()), None);
    assert!(tracker.expect(a.id(), ResourceUsage::RenderTarget).is_ok());
}
