// src/notify/antiflutter.rs
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;

/// Per-process cooldown gate to prevent notification spam.
/// - First notice of a process always passes.
/// - Inside that process's cooldown, notices are suppressed.
/// - Other processes are gated independently.
#[derive(Debug, Clone, Default)]
pub struct AntiFlutter {
    cooldown: ChronoDuration,
    last_alert: HashMap<String, DateTime<Utc>>,
}

impl AntiFlutter {
    /// `cooldown_secs` < 0 is treated as 0 (no cooldown).
    pub fn new(cooldown_secs: i64) -> Self {
        Self {
            cooldown: ChronoDuration::seconds(cooldown_secs.max(0)),
            last_alert: HashMap::new(),
        }
    }

    /// Does NOT mutate state.
    pub fn should_alert(&self, process: &str, now: DateTime<Utc>) -> bool {
        match self.last_alert.get(process) {
            None => true,
            Some(ts) => now.signed_duration_since(*ts) >= self.cooldown,
        }
    }

    pub fn record_alert(&mut self, process: &str, now: DateTime<Utc>) {
        self.last_alert.insert(process.to_string(), now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn first_alert_passes() {
        let af = AntiFlutter::new(900);
        let now = Utc.with_ymd_and_hms(2024, 9, 6, 9, 0, 0).unwrap();
        assert!(af.should_alert("sweep", now));
    }

    #[test]
    fn inside_cooldown_blocked_after_it_passes() {
        let mut af = AntiFlutter::new(900);
        let t0 = Utc.with_ymd_and_hms(2024, 9, 6, 9, 0, 0).unwrap();
        af.record_alert("sweep", t0);
        assert!(!af.should_alert("sweep", t0 + ChronoDuration::seconds(120)));
        assert!(af.should_alert("retention", t0 + ChronoDuration::seconds(120)));
        assert!(af.should_alert("sweep", t0 + ChronoDuration::seconds(905)));
    }

    #[test]
    fn negative_cooldown_means_none() {
        let mut af = AntiFlutter::new(-5);
        let t0 = Utc.with_ymd_and_hms(2024, 9, 6, 9, 0, 0).unwrap();
        af.record_alert("sweep", t0);
        assert!(af.should_alert("sweep", t0));
    }
}
