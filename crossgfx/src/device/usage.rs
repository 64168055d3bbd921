/// Resource usage tags, transitions and the optional shadow usage tracker

use std::sync::{Arc, Mutex};
use rustc_hash::FxHashMap;
use crate::device::{Resource, ResourceId};
use crate::error::{Error, Result};
use crate::gfx_err;

/// State a resource is assumed to be in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceUsage {
    /// Contents unknown. Valid only as the "before" side of a transition.
    Undefined,
    /// Ready to be presented (swapchain images at rest)
    Present,
    /// Destination of a copy
    CopyDest,
    /// Source of a copy
    CopySource,
    /// Color attachment
    RenderTarget,
    /// Depth attachment with depth writes
    DepthWrite,
    /// Read by shaders (textures, constant buffers) and the input assembler
    GenericRead,
}

/// One explicit state change, `before` asserted by the caller
#[derive(Clone, Copy)]
pub struct Transition<'a> {
    pub resource: &'a Arc<dyn Resource>,
    pub before: ResourceUsage,
    pub after: ResourceUsage,
}

impl<'a> Transition<'a> {
    pub fn new(resource: &'a Arc<dyn Resource>, before: ResourceUsage, after: ResourceUsage) -> Self {
        Self { resource, before, after }
    }
}

impl std::fmt::Debug for Transition<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition")
            .field("resource", &self.resource.id())
            .field("before", &self.before)
            .field("after", &self.after)
            .finish()
    }
}

/// Reject usage pairs no backend can express
pub fn validate_transition(transition: &Transition<'_>) -> Result<()> {
    if transition.after == ResourceUsage::Undefined {
        return Err(gfx_err!(
            "crossgfx::usage",
            UnsupportedUsage,
            "resource {:?} cannot transition into Undefined",
            transition.resource.id()
        ));
    }
    Ok(())
}

/// One usage claim made while recording
#[derive(Debug, Clone, Copy)]
struct UsageClaim {
    id: ResourceId,
    /// Usage the resource must be in; `Undefined` accepts anything
    expected: ResourceUsage,
    /// New usage for barriers, `None` for plain requirements
    after: Option<ResourceUsage>,
}

/// Usage claims of one command list, not yet submitted
///
/// Filled while recording and cleared by `open`. Only claims on resources
/// the list already transitioned are checked during recording; the rest are
/// checked against the tracker when the list is submitted.
#[derive(Debug, Clone, Default)]
pub struct PendingUsage {
    claims: Vec<UsageClaim>,
}

impl PendingUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.claims.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Usage left by this list's last barrier on `id`
    pub fn local(&self, id: ResourceId) -> Option<ResourceUsage> {
        self.claims
            .iter()
            .rev()
            .find(|claim| claim.id == id && claim.after.is_some())
            .and_then(|claim| claim.after)
    }
}

fn mismatch(id: ResourceId, claimed: ResourceUsage, known: ResourceUsage) -> Error {
    gfx_err!(
        "crossgfx::usage",
        UsageMismatch,
        "resource {:?}: barrier claims {:?} but last transition left it in {:?}",
        id,
        claimed,
        known
    )
}

fn not_in_usage(id: ResourceId, current: ResourceUsage, expected: ResourceUsage) -> Error {
    gfx_err!(
        "crossgfx::usage",
        UsageMismatch,
        "resource {:?} is in {:?}, expected {:?}",
        id,
        current,
        expected
    )
}

/// Debug shadow of the last usage each resource was transitioned into
///
/// The layer itself never needs the current usage: every barrier carries its
/// own `before`. When enabled, command lists stage their barriers in a
/// [`PendingUsage`] and the device commits them on submit, so the tracker
/// follows submission order and a recording discarded by `open` leaves no
/// trace. A `before` that disagrees with the last known `after` fails with
/// `UsageMismatch`.
pub struct UsageTracker {
    enabled: bool,
    states: Mutex<FxHashMap<ResourceId, ResourceUsage>>,
}

impl UsageTracker {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            states: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Start tracking a freshly created resource
    pub fn register(&self, id: ResourceId, initial: ResourceUsage) {
        if !self.enabled {
            return;
        }
        if let Ok(mut states) = self.states.lock() {
            states.insert(id, initial);
        }
    }

    /// Stop tracking a released resource
    pub fn forget(&self, id: ResourceId) {
        if !self.enabled {
            return;
        }
        if let Ok(mut states) = self.states.lock() {
            states.remove(&id);
        }
    }

    /// Last submitted usage, `None` when disabled or unknown
    pub fn current(&self, id: ResourceId) -> Option<ResourceUsage> {
        if !self.enabled {
            return None;
        }
        self.states.lock().ok()?.get(&id).copied()
    }

    /// Stage a batch of barriers in a list's pending usage
    ///
    /// The batch is staged atomically: on mismatch nothing is added.
    pub fn stage(&self, pending: &mut PendingUsage, transitions: &[Transition<'_>]) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut batch: Vec<UsageClaim> = Vec::with_capacity(transitions.len());
        for transition in transitions {
            let id = transition.resource.id();
            let known = batch
                .iter()
                .rev()
                .find(|claim| claim.id == id)
                .and_then(|claim| claim.after)
                .or_else(|| pending.local(id));

            if let Some(known) = known {
                if transition.before != ResourceUsage::Undefined && known != transition.before {
                    return Err(mismatch(id, transition.before, known));
                }
            }
            batch.push(UsageClaim { id, expected: transition.before, after: Some(transition.after) });
        }
        pending.claims.extend(batch);
        Ok(())
    }

    /// Stage a requirement that `id` is in `expected` usage when the command runs
    pub fn stage_expect(&self, pending: &mut PendingUsage, id: ResourceId, expected: ResourceUsage) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        match pending.local(id) {
            Some(local) if local != expected => Err(not_in_usage(id, local, expected)),
            Some(_) => Ok(()),
            None => {
                pending.claims.push(UsageClaim { id, expected, after: None });
                Ok(())
            }
        }
    }

    /// Check the pending usage of submitted lists, in order, and apply it
    ///
    /// All lists are committed together: on mismatch nothing is applied.
    pub fn commit(&self, lists: &[&PendingUsage]) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut states = self.states.lock().map_err(|_| {
            gfx_err!("crossgfx::usage", BackendError, "usage tracker lock poisoned")
        })?;

        let mut overlay: FxHashMap<ResourceId, ResourceUsage> = FxHashMap::default();
        for claim in lists.iter().flat_map(|pending| pending.claims.iter()) {
            let known = overlay.get(&claim.id).or_else(|| states.get(&claim.id)).copied();
            if let Some(known) = known {
                if claim.expected != ResourceUsage::Undefined && known != claim.expected {
                    return Err(match claim.after {
                        Some(_) => mismatch(claim.id, claim.expected, known),
                        None => not_in_usage(claim.id, known, claim.expected),
                    });
                }
            }
            if let Some(after) = claim.after {
                overlay.insert(claim.id, after);
            }
        }

        for (id, usage) in overlay {
            // Resources released since recording stay forgotten
            if let Some(state) = states.get_mut(&id) {
                *state = usage;
            }
        }
        Ok(())
    }

    /// Check that a resource is in `expected` usage, if it is tracked
    pub fn expect(&self, id: ResourceId, expected: ResourceUsage) -> Result<()> {
        match self.current(id) {
            Some(current) if current != expected => Err(not_in_usage(id, current, expected)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "usage_tests.rs"]
mod tests;
