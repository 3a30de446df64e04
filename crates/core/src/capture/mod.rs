//! Diagnostic capture: the per-pad monitor and the free-running oscilloscope.
//!
//! Both collect raw samples into a [`CaptureBuffer`] and export every
//! channel as a start frame, chunked data frames and an end frame.

use crate::protocol::{CaptureStream, Command, Frame};
use crate::scanner::Scanner;
use crate::transport::Transport;
use crate::{EdrumError, KitConfig, ProtocolError, Result};

/// Number of probes the oscilloscope can follow.
pub const PROBE_COUNT: usize = 4;

/// Largest number of channels a monitor session records.
pub const MONITOR_CHANNELS: usize = 4;

/// Fixed-capacity sample store with one lane per channel and a shared cursor.
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    lanes: Vec<Vec<i16>>,
    capacity: usize,
    dropped: usize,
}

impl CaptureBuffer {
    pub fn new(channels: usize, capacity: usize) -> Self {
        Self {
            lanes: (0..channels).map(|_| Vec::with_capacity(capacity)).collect(),
            capacity,
            dropped: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn channels(&self) -> usize {
        self.lanes.len()
    }

    /// Samples stored per channel.
    pub fn len(&self) -> usize {
        self.lanes.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Ticks whose samples did not fit since the last reset.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Empties every lane. Allocations are kept.
    pub fn reset(&mut self) {
        for lane in &mut self.lanes {
            lane.clear();
        }
        self.dropped = 0;
    }

    /// Appends one tick worth of samples, one per channel. Missing channels
    /// record 0. Once full, further ticks are dropped silently.
    pub fn push(&mut self, samples: &[i16]) {
        if self.is_full() {
            self.dropped += 1;
            return;
        }
        for (i, lane) in self.lanes.iter_mut().enumerate() {
            lane.push(samples.get(i).copied().unwrap_or(0));
        }
    }

    pub fn channel(&self, channel: usize) -> &[i16] {
        self.lanes.get(channel).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn send_frames(transport: &mut dyn Transport, vendor: u8, frames: &[Frame]) {
    for frame in frames {
        transport.send_frame(&frame.encode(vendor));
    }
}

/// Captures one pad's trigger cycle, from the start of scanning until the pad
/// returns to idle.
#[derive(Debug, Clone)]
pub struct Monitor {
    active: bool,
    pad: u8,
    capturing: bool,
    channels: usize,
    buffer: CaptureBuffer,
    vendor: u8,
    chunk_size: usize,
}

impl Monitor {
    pub fn new(config: &KitConfig) -> Self {
        Self {
            active: false,
            pad: 0,
            capturing: false,
            channels: 0,
            buffer: CaptureBuffer::new(MONITOR_CHANNELS, config.monitor_capacity()),
            vendor: config.vendor_id,
            chunk_size: config.chunk_size,
        }
    }

    /// Applies a monitor-request frame: `active, pad`.
    pub fn handle_request(&mut self, frame: &Frame) -> std::result::Result<(), ProtocolError> {
        let mut reader = frame.reader();
        let active = reader.byte("active")? != 0;
        let pad = reader.byte("pad")?;
        self.configure(active, pad);
        Ok(())
    }

    /// Builds the host-side request selecting `pad` for monitoring.
    pub fn request(config: &KitConfig, active: bool, pad: u8) -> Result<Frame> {
        if pad >= config.pad_count {
            return Err(EdrumError::UnknownPad(pad));
        }
        let mut frame = Frame::new(Command::MonitorRequest);
        frame.push_byte(u8::from(active)).push_byte(pad);
        Ok(frame)
    }

    /// Selects the monitored pad and abandons any running session.
    pub fn configure(&mut self, active: bool, pad: u8) {
        tracing::debug!(active, pad, "monitor configured");
        self.active = active;
        self.pad = pad;
        self.capturing = false;
        self.buffer.reset();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn monitored_pad(&self) -> Option<u8> {
        self.active.then_some(self.pad)
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn buffer(&self) -> &CaptureBuffer {
        &self.buffer
    }

    /// Opens a session if `pad` is the monitored pad.
    pub fn start(&mut self, pad: u8, channels: usize) {
        if self.active && self.pad == pad {
            self.capturing = true;
            self.channels = channels.clamp(1, MONITOR_CHANNELS);
            self.buffer.reset();
        }
    }

    pub fn sample(&mut self, pad: u8, samples: &[i16]) {
        if self.capturing && self.pad == pad {
            self.buffer.push(samples);
        }
    }

    /// Closes the session and exports every populated channel.
    pub fn end(&mut self, pad: u8, transport: &mut dyn Transport) {
        if !(self.capturing && self.pad == pad) {
            return;
        }
        tracing::info!(
            pad,
            channels = self.channels,
            samples = self.buffer.len(),
            dropped = self.buffer.dropped(),
            "exporting monitor capture"
        );
        for channel in 0..self.channels {
            let address = [pad, channel as u8 + 1];
            let stream = CaptureStream {
                start: Command::MonitorStart,
                data: Command::MonitorData,
                end: Command::MonitorEnd,
                address: &address,
            };
            let frames = stream.frames(self.buffer.channel(channel), self.chunk_size);
            send_frames(transport, self.vendor, &frames);
        }
        self.capturing = false;
    }
}

/// Free-running capture of up to four probe sensors, armed by a level on
/// probe 0 and disarmed after one window.
#[derive(Debug, Clone)]
pub struct Oscilloscope {
    active: bool,
    capturing: bool,
    probes: [u8; PROBE_COUNT],
    arm_level: i16,
    default_arm_level: i16,
    buffer: CaptureBuffer,
    vendor: u8,
    chunk_size: usize,
}

impl Oscilloscope {
    pub fn new(config: &KitConfig) -> Self {
        Self {
            active: false,
            capturing: false,
            probes: [0; PROBE_COUNT],
            arm_level: config.oscilloscope_arm_level,
            default_arm_level: config.oscilloscope_arm_level,
            buffer: CaptureBuffer::new(PROBE_COUNT, config.oscilloscope_capacity()),
            vendor: config.vendor_id,
            chunk_size: config.chunk_size,
        }
    }

    /// Applies an oscilloscope-request frame: `active, probe0..probe3` and an
    /// optional arming level.
    pub fn handle_request(&mut self, frame: &Frame) -> std::result::Result<(), ProtocolError> {
        let mut reader = frame.reader();
        let active = reader.byte("active")? != 0;
        let mut probes = [0; PROBE_COUNT];
        for probe in &mut probes {
            *probe = reader.byte("probe")?;
        }
        let arm_level = reader.optional_byte().map(i16::from);
        self.configure(active, probes, arm_level);
        Ok(())
    }

    /// Builds the host-side request for up to four probe sensors. Missing
    /// probes are sent as 0.
    pub fn request(config: &KitConfig, probes: &[u8], arm_level: Option<u8>) -> Result<Frame> {
        if probes.len() > PROBE_COUNT {
            return Err(EdrumError::msg(format!(
                "at most {PROBE_COUNT} probes, got {}",
                probes.len()
            )));
        }
        if let Some(sensor) = probes.iter().find(|s| **s > config.sensor_count) {
            return Err(EdrumError::msg(format!(
                "probe sensor {sensor} exceeds sensor count {}",
                config.sensor_count
            )));
        }
        if let Some(level) = arm_level.filter(|level| *level > 0x7f) {
            return Err(EdrumError::msg(format!("arm level {level} does not fit in 7 bits")));
        }

        let mut frame = Frame::new(Command::OscilloscopeRequest);
        frame.push_byte(1);
        for index in 0..PROBE_COUNT {
            frame.push_byte(probes.get(index).copied().unwrap_or(0));
        }
        if let Some(level) = arm_level {
            frame.push_byte(level);
        }
        Ok(frame)
    }

    pub fn configure(&mut self, active: bool, probes: [u8; PROBE_COUNT], arm_level: Option<i16>) {
        self.active = active;
        self.probes = probes;
        self.arm_level = arm_level.unwrap_or(self.default_arm_level);
        self.capturing = false;
        self.buffer.reset();
        tracing::debug!(active, ?probes, arm_level = self.arm_level, "oscilloscope configured");
    }

    pub fn is_armed(&self) -> bool {
        self.active && !self.capturing
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn probes(&self) -> [u8; PROBE_COUNT] {
        self.probes
    }

    /// Runs one sampling tick.
    pub fn process(&mut self, scanner: &dyn Scanner, transport: &mut dyn Transport) {
        if !self.capturing {
            let trigger = self.probes[0];
            if !self.active || trigger == 0 {
                return;
            }
            if i32::from(scanner.value(trigger)).abs() <= i32::from(self.arm_level) {
                return;
            }
            tracing::debug!(probe = trigger, "oscilloscope triggered");
            self.capturing = true;
            self.buffer.reset();
        }

        let samples = self.probes.map(|sensor| scanner.value(sensor));
        self.buffer.push(&samples);

        if self.buffer.is_full() {
            self.export(transport);
            self.capturing = false;
            self.active = false;
        }
    }

    fn export(&self, transport: &mut dyn Transport) {
        tracing::info!(probes = ?self.probes, samples = self.buffer.len(), "exporting oscilloscope capture");
        for (index, sensor) in self.probes.iter().enumerate() {
            if *sensor == 0 {
                continue;
            }
            let address = [index as u8 + 1];
            let stream = CaptureStream {
                start: Command::OscilloscopeStart,
                data: Command::OscilloscopeData,
                end: Command::OscilloscopeEnd,
                address: &address,
            };
            let frames = stream.frames(self.buffer.channel(index), self.chunk_size);
            send_frames(transport, self.vendor, &frames);
        }
    }
}
