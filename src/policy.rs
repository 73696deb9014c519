use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_VIOLATIONS: u32 = 5;

/// The kinds of integrity breach the engine recognises.
///
/// All kinds weigh the same: one event, one strike.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ViolationKind {
    NoFace,
    CameraOff,
    TabSwitched,
    CopyPasteAttempt,
    ContextMenu,
    KeyboardShortcut,
}

impl ViolationKind {
    /// Short warning shown to the candidate when this kind is the latest strike.
    pub fn warning(&self) -> &'static str {
        match self {
            ViolationKind::NoFace => "No face detected. Stay in front of the camera.",
            ViolationKind::CameraOff => "Camera turned off or disconnected.",
            ViolationKind::TabSwitched => "You left the assessment window.",
            ViolationKind::CopyPasteAttempt => "Copy and paste are disabled.",
            ViolationKind::ContextMenu => "The context menu is disabled.",
            ViolationKind::KeyboardShortcut => "Keyboard shortcuts are disabled.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub kind: ViolationKind,
    pub occurred_at: DateTime<Utc>,
}

impl ViolationEvent {
    pub fn now(kind: ViolationKind) -> Self {
        Self {
            kind,
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDecision {
    pub count: u32,
    /// Set on exactly one decision per policy: the one that first reaches the limit.
    pub disqualify_now: bool,
}

/// Strike counter with a one-shot disqualification latch.
#[derive(Debug, Clone)]
pub struct ViolationPolicy {
    max_violations: u32,
    count: u32,
    latched: bool,
    last_kind: Option<ViolationKind>,
}

impl ViolationPolicy {
    pub fn new(max_violations: u32) -> Self {
        Self {
            max_violations,
            count: 0,
            latched: false,
            last_kind: None,
        }
    }

    pub fn record(&mut self, kind: ViolationKind) -> PolicyDecision {
        self.count = self.count.saturating_add(1);
        self.last_kind = Some(kind);

        let disqualify_now = !self.latched && self.count >= self.max_violations;
        if disqualify_now {
            self.latched = true;
        }

        PolicyDecision {
            count: self.count,
            disqualify_now,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max_violations(&self) -> u32 {
        self.max_violations
    }

    pub fn is_disqualified(&self) -> bool {
        self.count >= self.max_violations
    }

    pub fn last_kind(&self) -> Option<ViolationKind> {
        self.last_kind
    }

    pub fn remaining(&self) -> u32 {
        self.max_violations.saturating_sub(self.count)
    }
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_VIOLATIONS)
    }
}
