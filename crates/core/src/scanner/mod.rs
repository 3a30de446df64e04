//! Sensor reading capability.
//!
//! Acquisition hardware lives outside the core. The trigger logic only needs
//! the current and previous reading of each sensor, refreshed once per tick.

use serde::{Deserialize, Serialize};

/// Source of per-sensor readings. Sensors are numbered from 1; sensor 0 means
/// "unassigned" and always reads 0.
pub trait Scanner {
    /// Acquires the next set of readings.
    fn read(&mut self);

    fn value(&self, sensor: u8) -> i16;

    fn previous(&self, sensor: u8) -> i16;

    /// Determines the idle (DC) level of every sensor.
    fn calibrate(&mut self);

    fn sensor_count(&self) -> u8;
}

/// A recorded stream of readings, one vector per tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub ticks: Vec<Vec<i16>>,
}

impl Recording {
    pub fn new(ticks: Vec<Vec<i16>>) -> Self {
        Self { ticks }
    }

    /// Builds a recording where `sensor` follows `values` and every other
    /// sensor stays at zero.
    pub fn single_sensor(sensor_count: u8, sensor: u8, values: &[i16]) -> Self {
        let ticks = values
            .iter()
            .map(|value| {
                let mut tick = vec![0; sensor_count as usize];
                if let Some(slot) = (sensor as usize).checked_sub(1).and_then(|i| tick.get_mut(i)) {
                    *slot = *value;
                }
                tick
            })
            .collect();
        Self { ticks }
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

/// Scanner that replays a [`Recording`].
///
/// Once the recording is exhausted every sensor sits at its idle level.
#[derive(Debug, Clone)]
pub struct ReplayScanner {
    recording: Recording,
    position: usize,
    offsets: Vec<i16>,
    current: Vec<i16>,
    previous: Vec<i16>,
}

impl ReplayScanner {
    pub fn new(sensor_count: u8, recording: Recording) -> Self {
        let count = sensor_count as usize;
        Self {
            recording,
            position: 0,
            offsets: vec![0; count],
            current: vec![0; count],
            previous: vec![0; count],
        }
    }

    /// Whether every recorded tick has been read.
    pub fn finished(&self) -> bool {
        self.position >= self.recording.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    fn slot(sensor: u8, values: &[i16]) -> i16 {
        (sensor as usize)
            .checked_sub(1)
            .and_then(|i| values.get(i))
            .copied()
            .unwrap_or(0)
    }
}

impl Scanner for ReplayScanner {
    fn read(&mut self) {
        std::mem::swap(&mut self.previous, &mut self.current);
        let tick = self.recording.ticks.get(self.position);
        for (i, slot) in self.current.iter_mut().enumerate() {
            let raw = tick
                .and_then(|tick| tick.get(i))
                .copied()
                .unwrap_or(self.offsets[i]);
            *slot = raw.saturating_sub(self.offsets[i]);
        }
        self.position += 1;
    }

    fn value(&self, sensor: u8) -> i16 {
        Self::slot(sensor, &self.current)
    }

    fn previous(&self, sensor: u8) -> i16 {
        Self::slot(sensor, &self.previous)
    }

    /// Uses the first recorded tick as the idle level.
    fn calibrate(&mut self) {
        if let Some(first) = self.recording.ticks.first() {
            for (i, offset) in self.offsets.iter_mut().enumerate() {
                *offset = first.get(i).copied().unwrap_or(0);
            }
        }
        tracing::debug!(offsets = ?self.offsets, "calibrated sensor offsets");
    }

    fn sensor_count(&self) -> u8 {
        self.current.len() as u8
    }
}
