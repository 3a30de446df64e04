use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{properties::RECORD_SIZE, EdrumError, Result};

/// Largest sample count that fits the 14-bit size field of a capture frame.
pub const MAX_CAPTURE_SAMPLES: u32 = 0x3fff;

/// Top-level configuration structure for the trigger core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KitConfig {
    pub version: FirmwareVersion,
    pub sampling_rate_hz: u32,
    pub pad_count: u8,
    pub sensor_count: u8,
    pub vendor_id: u8,
    /// Output channel for note events, 1-based.
    pub midi_channel: u8,
    pub max_bytes_per_record: usize,
    pub monitor_window_ms: u32,
    pub oscilloscope_window_ms: u32,
    /// Samples per capture data frame.
    pub chunk_size: usize,
    /// Rectified probe 0 level that arms the oscilloscope.
    pub oscilloscope_arm_level: i16,
    pub send_queue_capacity: usize,
    /// Inbound frames held between two ticks.
    pub inbound_queue_capacity: usize,
}

impl Default for KitConfig {
    fn default() -> Self {
        Self {
            version: FirmwareVersion::default(),
            sampling_rate_hz: 20_000,
            pad_count: 16,
            sensor_count: 32,
            vendor_id: 0x66,
            midi_channel: 10,
            max_bytes_per_record: 32,
            monitor_window_ms: 100,
            oscilloscope_window_ms: 100,
            chunk_size: 50,
            oscilloscope_arm_level: 25,
            send_queue_capacity: 256,
            inbound_queue_capacity: 64,
        }
    }
}

impl KitConfig {
    /// Parses and validates a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pad_count == 0 || self.pad_count > 0x7f {
            return Err(EdrumError::config("pad_count must be in 1..=127"));
        }
        if self.sensor_count == 0 || self.sensor_count > 0x7f {
            return Err(EdrumError::config("sensor_count must be in 1..=127"));
        }
        let version = self.version;
        if [version.major, version.minor, version.patch]
            .iter()
            .any(|part| *part > 0x7f)
        {
            return Err(EdrumError::config("version parts must be 7-bit values"));
        }
        if self.vendor_id > 0x7f {
            return Err(EdrumError::config("vendor_id must be a 7-bit value"));
        }
        if !(1..=16).contains(&self.midi_channel) {
            return Err(EdrumError::config("midi_channel must be in 1..=16"));
        }
        if self.max_bytes_per_record < RECORD_SIZE {
            return Err(EdrumError::config(format!(
                "max_bytes_per_record must be at least {RECORD_SIZE}"
            )));
        }
        if !(1..=0x7f).contains(&self.chunk_size) {
            return Err(EdrumError::config("chunk_size must be in 1..=127"));
        }
        if self.sampling_rate_hz == 0
            || self.sampling_rate_hz % 1000 != 0
            || self.sampling_rate_hz / 1000 > 0x7f
        {
            return Err(EdrumError::config(
                "sampling_rate_hz must be a whole number of kHz between 1 and 127",
            ));
        }
        for (name, capacity) in [
            ("monitor_window_ms", self.monitor_capacity()),
            ("oscilloscope_window_ms", self.oscilloscope_capacity()),
        ] {
            if capacity == 0 || capacity > MAX_CAPTURE_SAMPLES as usize {
                return Err(EdrumError::config(format!(
                    "{name} gives {capacity} samples, expected 1..={MAX_CAPTURE_SAMPLES}"
                )));
            }
        }
        if self.oscilloscope_arm_level < 0 {
            return Err(EdrumError::config("oscilloscope_arm_level must not be negative"));
        }
        if self.send_queue_capacity == 0 {
            return Err(EdrumError::config("send_queue_capacity must not be zero"));
        }
        if self.inbound_queue_capacity == 0 {
            return Err(EdrumError::config("inbound_queue_capacity must not be zero"));
        }
        Ok(())
    }

    /// Number of samples the monitor can hold for one trigger cycle.
    pub fn monitor_capacity(&self) -> usize {
        self.window_samples(self.monitor_window_ms)
    }

    /// Number of samples the oscilloscope captures once armed.
    pub fn oscilloscope_capacity(&self) -> usize {
        self.window_samples(self.oscilloscope_window_ms)
    }

    /// Saturates instead of overflowing so absurd windows fail validation.
    fn window_samples(&self, window_ms: u32) -> usize {
        let samples = u64::from(self.sampling_rate_hz / 1000) * u64::from(window_ms);
        usize::try_from(samples).unwrap_or(usize::MAX)
    }

    /// Distance between two sampling ticks in timestamp units (microseconds).
    pub fn tick_micros(&self) -> u32 {
        1_000_000 / self.sampling_rate_hz.max(1)
    }

    /// Byte offset of the persisted record for a pad slot.
    pub fn record_offset(&self, slot: usize) -> usize {
        slot * self.max_bytes_per_record
    }

    /// Storage size needed to hold every pad record.
    pub fn storage_size(&self) -> usize {
        self.record_offset(self.pad_count as usize)
    }
}

/// Version triple reported in the configuration summary frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Default for FirmwareVersion {
    fn default() -> Self {
        Self {
            major: 0,
            minor: 1,
            patch: 1,
        }
    }
}
