use std::fmt;
use std::str::FromStr;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::policy::ViolationKind;

/// A primary-modifier chord: ctrl on most platforms, cmd on macOS. Either is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Shortcut {
    pub key: char,
    pub shift: bool,
}

impl Shortcut {
    pub const fn primary(key: char) -> Self {
        Self { key, shift: false }
    }

    pub fn matches(&self, event: &KeyEvent) -> bool {
        let KeyCode::Char(c) = event.code else {
            return false;
        };
        let primary = event
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::SUPER | KeyModifiers::META);
        primary
            && event.modifiers.contains(KeyModifiers::SHIFT) == self.shift
            && c.eq_ignore_ascii_case(&self.key)
    }
}

impl fmt::Display for Shortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.shift {
            write!(f, "ctrl+shift+{}", self.key)
        } else {
            write!(f, "ctrl+{}", self.key)
        }
    }
}

impl FromStr for Shortcut {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut primary = false;
        let mut shift = false;
        let mut key = None;
        for part in s.split('+').map(|p| p.trim().to_ascii_lowercase()) {
            match part.as_str() {
                "ctrl" | "control" | "cmd" | "meta" | "super" | "mod" => primary = true,
                "shift" => shift = true,
                other => {
                    let mut chars = other.chars();
                    match (chars.next(), chars.next(), key) {
                        (Some(c), None, None) => key = Some(c),
                        _ => return Err(format!("unrecognised shortcut part `{other}` in `{s}`")),
                    }
                }
            }
        }
        match (primary, key) {
            (true, Some(key)) => Ok(Shortcut { key, shift }),
            (false, _) => Err(format!("shortcut `{s}` needs ctrl or cmd")),
            (_, None) => Err(format!("shortcut `{s}` has no key")),
        }
    }
}

impl TryFrom<String> for Shortcut {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Shortcut> for String {
    fn from(value: Shortcut) -> Self {
        value.to_string()
    }
}

pub fn default_blocked_shortcuts() -> Vec<Shortcut> {
    ['c', 'v', 'x', 'a', 'p']
        .into_iter()
        .map(Shortcut::primary)
        .collect()
}

/// A user interaction the guard gets to look at before it takes effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Key(KeyEvent),
    Copy,
    Paste(String),
    ContextMenu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Blocked(ViolationKind),
}

#[derive(Debug, Clone)]
pub struct AntiTamperGuard {
    blocked: Vec<Shortcut>,
    armed: bool,
}

impl AntiTamperGuard {
    pub fn new(blocked: Vec<Shortcut>) -> Self {
        Self {
            blocked,
            armed: false,
        }
    }

    pub fn arm(&mut self) {
        self.armed = true;
        debug!(shortcuts = self.blocked.len(), "anti-tamper guard armed");
    }

    pub fn disarm(&mut self) {
        if self.armed {
            debug!("anti-tamper guard disarmed");
        }
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn blocked_shortcuts(&self) -> &[Shortcut] {
        &self.blocked
    }

    /// A `Blocked` verdict means the interaction must be swallowed.
    pub fn intercept(&self, interaction: &Interaction) -> Verdict {
        if !self.armed {
            return Verdict::Allow;
        }
        match interaction {
            Interaction::Copy | Interaction::Paste(_) => {
                Verdict::Blocked(ViolationKind::CopyPasteAttempt)
            }
            Interaction::ContextMenu => Verdict::Blocked(ViolationKind::ContextMenu),
            Interaction::Key(key) if self.blocked.iter().any(|s| s.matches(key)) => {
                Verdict::Blocked(ViolationKind::KeyboardShortcut)
            }
            Interaction::Key(_) => Verdict::Allow,
        }
    }
}

impl Default for AntiTamperGuard {
    fn default() -> Self {
        Self::new(default_blocked_shortcuts())
    }
}
