//! Outgoing mode change batching.
//!
//! Changes requested for one target accumulate in a [`ModeQueue`] and are
//! serialized into a single `MODE` line once the server's `MODES` limit is
//! reached, or when the caller flushes explicitly.

use crate::casemap::CaseMapping;
use crate::error::ModeError;

use super::registry::{ModeClass, ModeKind};

/// One queued mode change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModeDelta {
    /// `true` for `+`.
    pub adding: bool,
    /// The mode letter.
    pub mode: char,
    /// Parameter, when the mode takes one in this direction.
    pub param: Option<String>,
}

impl ModeDelta {
    /// A `+mode` change.
    pub fn set(mode: char, param: Option<&str>) -> Self {
        Self {
            adding: true,
            mode,
            param: param.map(str::to_owned),
        }
    }

    /// A `-mode` change.
    pub fn unset(mode: char, param: Option<&str>) -> Self {
        Self {
            adding: false,
            mode,
            param: param.map(str::to_owned),
        }
    }
}

/// What happened to a requested change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueOutcome {
    /// Appended to the queue.
    Queued,
    /// The inverse change was queued; both are gone.
    Cancelled,
    /// The identical change was already queued.
    Duplicate,
}

/// Per-target queue of pending mode changes.
#[derive(Clone, Debug, Default)]
pub struct ModeQueue {
    target: String,
    deltas: Vec<ModeDelta>,
}

impl ModeQueue {
    /// Create an empty queue for `target` (a channel or our own nick).
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            deltas: Vec::new(),
        }
    }

    /// The target the flushed `MODE` line addresses.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Retarget the queue, e.g. after our nick changed.
    pub fn set_target(&mut self, target: impl Into<String>) {
        self.target = target.into();
    }

    /// Pending changes in request order.
    pub fn pending(&self) -> &[ModeDelta] {
        &self.deltas
    }

    /// Number of pending changes.
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Request a change.
    ///
    /// `class` is the registries' view of the letter (`None` when unknown),
    /// `current` the value a set-and-unset mode currently holds. Returns the
    /// outcome and every `MODE` line flushed along the way: setting a new
    /// key while another is set queues the unset first, and each push may
    /// reach `max_modes`.
    pub fn request_change(
        &mut self,
        mut delta: ModeDelta,
        class: Option<ModeClass>,
        current: Option<&str>,
        max_modes: usize,
        casemap: CaseMapping,
    ) -> Result<(QueueOutcome, Vec<String>), ModeError> {
        let class = class.ok_or(ModeError::UnknownMode(delta.mode))?;
        if class.takes_param(delta.adding) {
            if delta.param.as_deref().map_or(true, str::is_empty) {
                return Err(ModeError::MissingParameter(delta.mode));
            }
        } else {
            delta.param = None;
        }

        let mut lines = Vec::new();
        if delta.adding && class == ModeClass::Other(ModeKind::SetAndUnset) {
            if let Some(old) = current {
                let same = delta
                    .param
                    .as_deref()
                    .map_or(false, |new| casemap.eq_ignore_case(old, new));
                if !same {
                    let unset = ModeDelta::unset(delta.mode, Some(old));
                    self.push(unset, class, max_modes, casemap, &mut lines);
                }
            }
        }
        let outcome = self.push(delta, class, max_modes, casemap, &mut lines);
        Ok((outcome, lines))
    }

    fn push(
        &mut self,
        delta: ModeDelta,
        class: ModeClass,
        max_modes: usize,
        casemap: CaseMapping,
        lines: &mut Vec<String>,
    ) -> QueueOutcome {
        let ignore_param = matches!(
            class,
            ModeClass::Boolean(_) | ModeClass::Other(ModeKind::SetOnly)
        );
        let same_param = |queued: &ModeDelta| {
            ignore_param
                || match (&queued.param, &delta.param) {
                    (Some(a), Some(b)) => casemap.eq_ignore_case(a, b),
                    (None, None) => true,
                    _ => false,
                }
        };

        if self
            .deltas
            .iter()
            .any(|d| d.mode == delta.mode && d.adding == delta.adding && same_param(d))
        {
            return QueueOutcome::Duplicate;
        }
        if let Some(pos) = self
            .deltas
            .iter()
            .position(|d| d.mode == delta.mode && d.adding != delta.adding && same_param(d))
        {
            self.deltas.remove(pos);
            return QueueOutcome::Cancelled;
        }

        self.deltas.push(delta);
        if self.deltas.len() >= max_modes.max(1) {
            lines.extend(self.flush());
        }
        QueueOutcome::Queued
    }

    /// Serialize everything pending into one `MODE` line and clear the queue.
    ///
    /// Negative changes come first, then positive ones, followed by their
    /// parameters in the same order.
    pub fn flush(&mut self) -> Option<String> {
        if self.deltas.is_empty() {
            return None;
        }
        let deltas = std::mem::take(&mut self.deltas);
        let (neg, pos): (Vec<_>, Vec<_>) = deltas.into_iter().partition(|d| !d.adding);

        let mut line = format!("MODE {} ", self.target);
        if !neg.is_empty() {
            line.push('-');
            line.extend(neg.iter().map(|d| d.mode));
        }
        if !pos.is_empty() {
            line.push('+');
            line.extend(pos.iter().map(|d| d.mode));
        }
        for param in neg.iter().chain(pos.iter()).filter_map(|d| d.param.as_deref()) {
            line.push(' ');
            line.push_str(param);
        }
        Some(line)
    }

    /// Drop everything pending without sending.
    pub fn clear(&mut self) {
        self.deltas.clear();
    }
}
