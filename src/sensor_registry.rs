//! Sender registry and repeat suppression
//!
//! Probes repeat every telegram several times in a burst and pick a new random
//! sender id at each power cycle. A reading is passed on when it is the first
//! from a sender after the cool-down window. Unknown senders are only adopted
//! from telegrams in init state, which keeps corrupted frames (whose checksum
//! residue looks like a random id) from becoming phantom devices.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::et73x::{DeviceType, Status};

/// Default minimum gap between two accepted readings of one sender
pub const DEFAULT_COOL_DOWN: Duration = Duration::from_secs(5);

/// Registry policy
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub cool_down: Duration,
    /// Adopt unknown senders regardless of their status
    pub always_register: bool,
    /// Forget senders not accepted for this long
    pub forget_after: Option<Duration>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cool_down: DEFAULT_COOL_DOWN,
            always_register: false,
            forget_after: None,
        }
    }
}

/// Known sender
#[derive(Debug, Clone)]
pub struct SensorUnit {
    pub sender_id: u16,
    pub device_type: DeviceType,
    /// Edge-clock time of the last accepted telegram (µs)
    pub last_seen_us: i64,
    pub first_seen: DateTime<Utc>,
    /// Accepted readings
    pub readings: u64,
}

/// Registry of known senders, owned by the frame worker
pub struct SenderRegistry {
    units: HashMap<u16, SensorUnit>,
    config: RegistryConfig,
    repeats_rejected: u64,
    unregistered_rejected: u64,
}

impl SenderRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            units: HashMap::new(),
            config,
            repeats_rejected: 0,
            unregistered_rejected: 0,
        }
    }

    /// Decide whether a parsed telegram is a new reading
    pub fn accept(
        &mut self,
        sender_id: u16,
        device_type: DeviceType,
        status: Status,
        tick_us: i64,
    ) -> bool {
        let cool_down_us = duration_us(self.config.cool_down);

        if let Some(unit) = self.units.get_mut(&sender_id) {
            if unit.last_seen_us.saturating_add(cool_down_us) <= tick_us {
                unit.last_seen_us = tick_us;
                unit.readings += 1;
                return true;
            }
            self.repeats_rejected += 1;
            return false;
        }

        if status == Status::Init || self.config.always_register {
            self.units.insert(
                sender_id,
                SensorUnit {
                    sender_id,
                    device_type,
                    last_seen_us: tick_us,
                    first_seen: Utc::now(),
                    readings: 1,
                },
            );
            info!(
                "New sender registered: {} {} ({} known)",
                device_type,
                sender_id,
                self.units.len()
            );
            return true;
        }

        self.unregistered_rejected += 1;
        debug!("Ignoring unregistered sender {} in {} state", sender_id, status);
        false
    }

    pub fn get(&self, sender_id: u16) -> Option<&SensorUnit> {
        self.units.get(&sender_id)
    }

    pub fn count(&self) -> usize {
        self.units.len()
    }

    /// Remove senders silent for longer than `forget_after`
    pub fn evict_stale(&mut self, now_us: i64) {
        let Some(forget_after) = self.config.forget_after else {
            return;
        };
        let forget_after_us = duration_us(forget_after);

        let before = self.units.len();
        self.units
            .retain(|_, unit| now_us.saturating_sub(unit.last_seen_us) <= forget_after_us);
        let removed = before - self.units.len();
        if removed > 0 {
            debug!(
                "Forgot {} stale senders, {} remaining",
                removed,
                self.units.len()
            );
        }
    }

    /// Get summary statistics
    pub fn stats_summary(&self) -> RegistryStats {
        RegistryStats {
            senders: self.units.len(),
            readings: self.units.values().map(|u| u.readings).sum(),
            repeats_rejected: self.repeats_rejected,
            unregistered_rejected: self.unregistered_rejected,
        }
    }
}

/// Duration in edge-clock µs, saturating
fn duration_us(duration: Duration) -> i64 {
    i64::try_from(duration.as_micros()).unwrap_or(i64::MAX)
}

/// Registry statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub senders: usize,
    pub readings: u64,
    pub repeats_rejected: u64,
    pub unregistered_rejected: u64,
}

impl fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Senders: {}, {} readings, {} repeats, {} unregistered",
            self.senders, self.readings, self.repeats_rejected, self.unregistered_rejected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: i64 = 1_000_000;
    const T: i64 = 100 * SEC;

    fn registry(always_register: bool) -> SenderRegistry {
        SenderRegistry::new(RegistryConfig {
            always_register,
            ..RegistryConfig::default()
        })
    }

    #[test]
    fn test_repeat_within_cool_down_is_rejected() {
        let mut reg = registry(false);
        assert!(reg.accept(0x1643, DeviceType::Et732, Status::Init, T));
        assert!(!reg.accept(0x1643, DeviceType::Et732, Status::Default, T + SEC));
        assert!(reg.accept(0x1643, DeviceType::Et732, Status::Default, T + 6 * SEC));
        assert_eq!(reg.get(0x1643).unwrap().last_seen_us, T + 6 * SEC);
        assert_eq!(reg.get(0x1643).unwrap().readings, 2);
    }

    #[test]
    fn test_cool_down_is_measured_from_last_acceptance() {
        let mut reg = registry(false);
        assert!(reg.accept(7, DeviceType::Et733, Status::Init, T));
        assert!(!reg.accept(7, DeviceType::Et733, Status::Default, T + 4 * SEC));
        // rejected repeats do not move the window
        assert!(reg.accept(7, DeviceType::Et733, Status::Default, T + 5 * SEC));
    }

    #[test]
    fn test_cool_down_boundary() {
        let mut reg = registry(false);
        assert!(reg.accept(7, DeviceType::Et732, Status::Init, T));
        assert!(!reg.accept(7, DeviceType::Et732, Status::Default, T + 5 * SEC - 1));
        assert!(reg.accept(7, DeviceType::Et732, Status::Default, T + 5 * SEC));
    }

    #[test]
    fn test_unknown_sender_needs_init() {
        let mut reg = registry(false);
        assert!(!reg.accept(0xBEEF, DeviceType::Et732, Status::Default, T));
        assert!(!reg.accept(0xBEEF, DeviceType::Et732, Status::Unknown(5), T));
        assert!(reg.get(0xBEEF).is_none());

        assert!(reg.accept(0xBEEF, DeviceType::Et732, Status::Init, T));
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn test_always_register_override() {
        let mut reg = registry(true);
        assert!(reg.accept(0xBEEF, DeviceType::Et732, Status::Default, T));
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn test_stats_summary() {
        let mut reg = registry(false);
        reg.accept(1, DeviceType::Et732, Status::Init, T);
        reg.accept(1, DeviceType::Et732, Status::Default, T + SEC);
        reg.accept(2, DeviceType::Et732, Status::Default, T);

        let stats = reg.stats_summary();
        assert_eq!(
            stats,
            RegistryStats {
                senders: 1,
                readings: 1,
                repeats_rejected: 1,
                unregistered_rejected: 1,
            }
        );
        assert_eq!(
            stats.to_string(),
            "Senders: 1, 1 readings, 1 repeats, 1 unregistered"
        );
    }

    #[test]
    fn test_huge_cool_down_saturates() {
        let mut reg = SenderRegistry::new(RegistryConfig {
            cool_down: Duration::from_secs(u64::MAX),
            ..RegistryConfig::default()
        });
        assert!(reg.accept(1, DeviceType::Et732, Status::Init, T));
        assert!(!reg.accept(1, DeviceType::Et732, Status::Default, T + 3600 * SEC));
        assert!(!reg.accept(1, DeviceType::Et732, Status::Default, i64::MAX - 1));
        assert_eq!(reg.get(1).unwrap().readings, 1);

        let mut reg = SenderRegistry::new(RegistryConfig {
            forget_after: Some(Duration::from_secs(u64::MAX)),
            ..RegistryConfig::default()
        });
        reg.accept(1, DeviceType::Et732, Status::Init, i64::MIN + 1);
        reg.evict_stale(i64::MAX);
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn test_evict_stale() {
        let mut reg = SenderRegistry::new(RegistryConfig {
            forget_after: Some(Duration::from_secs(60)),
            ..RegistryConfig::default()
        });
        reg.accept(1, DeviceType::Et732, Status::Init, T);
        reg.accept(2, DeviceType::Et732, Status::Init, T + 30 * SEC);

        reg.evict_stale(T + 61 * SEC);
        assert!(reg.get(1).is_none());
        assert!(reg.get(2).is_some());
    }

    #[test]
    fn test_eviction_disabled_by_default() {
        let mut reg = registry(false);
        reg.accept(1, DeviceType::Et732, Status::Init, T);
        reg.evict_stale(T + 3600 * SEC);
        assert_eq!(reg.count(), 1);
    }
}
