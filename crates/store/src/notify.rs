use std::collections::BTreeMap;

use crossbeam_channel::Sender;
use stationcloud_registration::RigidTransform;

/// Opaque value that changes whenever the identity of the visible buffer
/// changes. A renderer redraws from scratch when the token differs from the
/// one it last drew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SceneToken(u64);

impl SceneToken {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub(crate) fn bump(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

/// Marker change produced by a store mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerUpdate {
    /// Place markers at every recorded station transform.
    Add(BTreeMap<String, RigidTransform>),
    /// Remove all station markers.
    Remove,
}

impl MarkerUpdate {
    pub fn dispatch(&self, sink: &dyn MarkerSink) {
        match self {
            MarkerUpdate::Add(transforms) => sink.add_markers(transforms),
            MarkerUpdate::Remove => sink.remove_markers(),
        }
    }
}

/// Receiver of marker notifications, supplied by whoever composes the store.
///
/// Called on the writer thread, so implementations should return quickly and
/// must not call back into the store synchronously.
pub trait MarkerSink: Send + Sync {
    fn add_markers(&self, transforms: &BTreeMap<String, RigidTransform>);
    fn remove_markers(&self);
}

/// Ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMarkers;

impl MarkerSink for NoMarkers {
    fn add_markers(&self, _transforms: &BTreeMap<String, RigidTransform>) {}

    fn remove_markers(&self) {}
}

/// Forwards notifications to a channel, e.g. a UI thread's event queue.
impl MarkerSink for Sender<MarkerUpdate> {
    fn add_markers(&self, transforms: &BTreeMap<String, RigidTransform>) {
        let _ = self.send(MarkerUpdate::Add(transforms.clone()));
    }

    fn remove_markers(&self) {
        let _ = self.send(MarkerUpdate::Remove);
    }
}
