use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;
use uuid::Uuid;

/// Opaque identifier for one shuffle session.
///
/// Never persisted as its own entity; it only appears as a tag on the
/// results recorded while it was current.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        GroupId(id.into())
    }

    /// Generate a fresh id: a v4 UUID (122 random bits) compacted into a
    /// 22-character URL-safe token, so two rotations within a process
    /// lifetime collide only with negligible probability.
    pub fn generate() -> Self {
        GroupId(URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owns the single current group id.
///
/// `rotate` must only ever be called from the serialized frame-processing
/// path, so a result dispatched before a rotation always observes the
/// pre-rotation id regardless of how long its write takes.
#[derive(Debug)]
pub struct GroupTracker {
    current: GroupId,
}

impl GroupTracker {
    /// Start a tracker with a freshly generated group, as happens once at
    /// worker startup.
    pub fn new() -> Self {
        GroupTracker {
            current: GroupId::generate(),
        }
    }

    pub fn current(&self) -> &GroupId {
        &self.current
    }

    /// Replace the current group with a new one and return it.
    pub fn rotate(&mut self) -> &GroupId {
        self.current = GroupId::generate();
        &self.current
    }
}

impl Default for GroupTracker {
    fn default() -> Self {
        GroupTracker::new()
    }
}
