//! Device capability probing.
//!
//! Derives the resource budget that gates every load decision. Memory
//! figures come from sysinfo; battery telemetry is supplied by the host
//! through [`PowerSource`] since collection is outside this engine's scope.

use crate::types::DeviceCapabilitySnapshot;
use chrono::Utc;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};
use sysinfo::System;

/// Battery reading supplied by the platform layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerStatus {
    pub battery_percent: u8,
    pub is_charging: bool,
}

/// Source of battery telemetry.
pub trait PowerSource: Send + Sync {
    fn power_status(&self) -> PowerStatus;
}

/// Default power source for hosts without battery telemetry (desktops,
/// plugged-in devices).
#[derive(Debug, Clone, Copy, Default)]
pub struct MainsPower;

impl PowerSource for MainsPower {
    fn power_status(&self) -> PowerStatus {
        PowerStatus {
            battery_percent: 100,
            is_charging: true,
        }
    }
}

/// Device class, set by the host from platform heuristics.
///
/// Low-end devices get a stricter share of available memory so a loaded
/// model never starves the rest of the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceClass {
    #[default]
    Standard,
    LowEnd,
}

impl DeviceClass {
    /// Fraction of available memory a model may occupy.
    pub fn safety_factor(&self) -> f64 {
        match self {
            DeviceClass::Standard => 0.60,
            DeviceClass::LowEnd => 0.30,
        }
    }
}

/// Source of capability snapshots. Implemented by [`SystemProbe`] in
/// production and by fixed-value probes in tests.
pub trait DeviceProbe: Send + Sync {
    /// Take a fresh snapshot of current device resources.
    fn capture(&self) -> DeviceCapabilitySnapshot;
}

/// sysinfo-backed probe.
pub struct SystemProbe {
    system: RwLock<System>,
    power: Box<dyn PowerSource>,
    device_class: DeviceClass,
    policy_ceiling_bytes: u64,
}

impl SystemProbe {
    pub fn new(
        device_class: DeviceClass,
        policy_ceiling_bytes: u64,
        power: Box<dyn PowerSource>,
    ) -> Self {
        let mut system = System::new();
        system.refresh_memory();
        Self {
            system: RwLock::new(system),
            power,
            device_class,
            policy_ceiling_bytes,
        }
    }
}

impl DeviceProbe for SystemProbe {
    fn capture(&self) -> DeviceCapabilitySnapshot {
        let (total, available) = {
            let mut system = self.system.write().unwrap();
            system.refresh_memory();
            (system.total_memory(), system.available_memory())
        };
        let power = self.power.power_status();
        let budget = derive_budget(available, self.device_class, self.policy_ceiling_bytes);

        DeviceCapabilitySnapshot {
            total_memory_bytes: total,
            available_memory_bytes: available,
            battery_percent: power.battery_percent,
            is_charging: power.is_charging,
            max_model_size_bytes: budget,
            captured_at: Utc::now(),
        }
    }
}

/// `min(available × safety factor, policy ceiling)`.
pub fn derive_budget(available_bytes: u64, class: DeviceClass, ceiling_bytes: u64) -> u64 {
    let scaled = (available_bytes as f64 * class.safety_factor()) as u64;
    scaled.min(ceiling_bytes)
}

/// TTL-cached snapshot holder in front of a [`DeviceProbe`].
///
/// `current()` serves the cached snapshot while it is within the TTL;
/// anything that gates a load calls it too — the TTL guarantees the gate
/// never sees a snapshot older than the configured bound.
pub struct SnapshotCache {
    probe: Box<dyn DeviceProbe>,
    ttl: Duration,
    cached: Mutex<Option<(Instant, DeviceCapabilitySnapshot)>>,
}

impl SnapshotCache {
    pub fn new(probe: Box<dyn DeviceProbe>, ttl: Duration) -> Self {
        Self {
            probe,
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Cached snapshot if fresh, otherwise a forced capture.
    pub fn current(&self) -> DeviceCapabilitySnapshot {
        let mut cached = self.cached.lock().unwrap();
        if let Some((taken, snapshot)) = cached.as_ref() {
            if taken.elapsed() < self.ttl {
                return snapshot.clone();
            }
        }
        let snapshot = self.probe.capture();
        *cached = Some((Instant::now(), snapshot.clone()));
        snapshot
    }

    /// Unconditionally capture a fresh snapshot and cache it.
    pub fn refresh(&self) -> DeviceCapabilitySnapshot {
        let snapshot = self.probe.capture();
        *self.cached.lock().unwrap() = Some((Instant::now(), snapshot.clone()));
        snapshot
    }
}
