// src/window.rs
//! Time-of-day delivery gate. Half-open [start, end); a window with
//! start > end crosses midnight and splits into [start, 24:00) ∪ [00:00, end).

use chrono::NaiveTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushWindow {
    pub enabled: bool,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Default for PushWindow {
    fn default() -> Self {
        Self {
            enabled: false,
            start: NaiveTime::MIN,
            end: NaiveTime::MIN,
        }
    }
}

impl PushWindow {
    /// Build from "HH:MM" strings as they appear in configuration.
    pub fn from_spec(enabled: bool, start: &str, end: &str) -> anyhow::Result<Self> {
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s.trim(), "%H:%M")
                .map_err(|e| anyhow::anyhow!("bad window time `{s}`: {e}"))
        };
        Ok(Self {
            enabled,
            start: parse(start)?,
            end: parse(end)?,
        })
    }

    /// Whether delivery may proceed at local time `now`. `force` is the
    /// explicit manual-trigger override and bypasses the gate entirely.
    pub fn allows(&self, now: NaiveTime, force: bool) -> bool {
        if force || !self.enabled {
            return true;
        }
        if self.start < self.end {
            self.start <= now && now < self.end
        } else if self.start > self.end {
            // crosses midnight
            now >= self.start || now < self.end
        } else {
            // zero-length window admits nothing
            false
        }
    }
}
