//! The kit: registry of pads, pad types and curves, and dispatcher for
//! inbound protocol frames.

use crate::capture::{Monitor, Oscilloscope};
use crate::curve::{Curve, CurveShape};
use crate::pad_type::{PadTemplate, PadType};
use crate::properties::Properties;
use crate::protocol::{Command, Frame};
use crate::scanner::Scanner;
use crate::storage::Storage;
use crate::transport::Transport;
use crate::trigger::{Hit, TickContext, Trigger, TriggerState};
use crate::{EdrumError, KitConfig, Result};

/// One pad slot: its configuration and its trigger state.
#[derive(Debug, Clone)]
pub struct Pad {
    slot: u8,
    properties: Properties,
    trigger: Trigger,
}

impl Pad {
    pub fn new(slot: u8, properties: Properties) -> Self {
        Self {
            slot,
            properties,
            trigger: Trigger::new(),
        }
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn state(&self) -> TriggerState {
        self.trigger.state()
    }

    pub fn to_frame(&self) -> Frame {
        self.properties.to_frame(Command::SendPad, self.slot)
    }
}

/// Hit reported by a pad during [`Kit::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadHit {
    pub pad: u8,
    pub hit: Hit,
}

/// What an inbound frame did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    ConfigurationSent,
    PadUpdated(u8),
    MonitorConfigured,
    OscilloscopeConfigured,
    Ignored,
}

/// Owns every pad, type template and curve. Membership is fixed at
/// construction; only pad properties change afterwards.
#[derive(Debug, Clone)]
pub struct Kit {
    config: KitConfig,
    pads: Vec<Pad>,
    types: Vec<PadTemplate>,
    curves: Vec<Curve>,
}

impl Kit {
    pub fn new(config: &KitConfig) -> Result<Self> {
        config.validate()?;

        let pads = (0..config.pad_count)
            .map(|slot| {
                let mut properties = Properties::default();
                if slot < config.sensor_count {
                    properties.head.sensor = slot + 1;
                }
                Pad::new(slot, properties)
            })
            .collect();
        let types = PadType::ALL.into_iter().map(PadTemplate::new).collect();
        let curves = CurveShape::ALL.into_iter().map(Curve::new).collect();

        Ok(Self {
            config: config.clone(),
            pads,
            types,
            curves,
        })
    }

    pub fn config(&self) -> &KitConfig {
        &self.config
    }

    pub fn pads(&self) -> &[Pad] {
        &self.pads
    }

    pub fn pad(&self, slot: u8) -> Option<&Pad> {
        self.pads.get(slot as usize)
    }

    pub fn types(&self) -> &[PadTemplate] {
        &self.types
    }

    pub fn curves(&self) -> &[Curve] {
        &self.curves
    }

    pub fn curve(&self, shape: CurveShape) -> &Curve {
        &self.curves[shape.id() as usize]
    }

    /// Runs every pad's state machine for one tick.
    pub fn process(
        &mut self,
        now: u32,
        scanner: &dyn Scanner,
        monitor: &mut Monitor,
        transport: &mut dyn Transport,
    ) -> Vec<PadHit> {
        let mut ctx = TickContext {
            now,
            scanner,
            monitor,
            transport,
            channel: self.config.midi_channel,
        };
        let curves = &self.curves;

        let mut hits = Vec::new();
        for pad in &mut self.pads {
            let curve = &curves[pad.properties.curve.id() as usize];
            if let Some(hit) = pad.trigger.tick(pad.slot, &pad.properties, curve, &mut ctx) {
                hits.push(PadHit {
                    pad: pad.slot,
                    hit,
                });
            }
        }
        hits
    }

    /// Routes one decoded inbound frame.
    pub fn dispatch(
        &mut self,
        frame: &Frame,
        monitor: &mut Monitor,
        oscilloscope: &mut Oscilloscope,
        transport: &mut dyn Transport,
    ) -> Result<Dispatch> {
        match frame.command {
            Command::RequestConfig => {
                self.send_configuration(transport);
                Ok(Dispatch::ConfigurationSent)
            }
            Command::UpdatePad => {
                let (slot, properties) = Properties::from_frame(frame)?;
                self.update_pad(slot, properties)?;
                Ok(Dispatch::PadUpdated(slot))
            }
            Command::MonitorRequest => {
                monitor.handle_request(frame)?;
                Ok(Dispatch::MonitorConfigured)
            }
            Command::OscilloscopeRequest => {
                oscilloscope.handle_request(frame)?;
                Ok(Dispatch::OscilloscopeConfigured)
            }
            command => {
                tracing::debug!(?command, "ignoring outbound-only command");
                Ok(Dispatch::Ignored)
            }
        }
    }

    /// Sends the full configuration dump: summary, every type, every curve,
    /// every pad, then ready.
    pub fn send_configuration(&self, transport: &mut dyn Transport) {
        tracing::info!(
            pads = self.pads.len(),
            types = self.types.len(),
            curves = self.curves.len(),
            "sending configuration"
        );

        let frames = std::iter::once(self.summary_frame())
            .chain(self.types.iter().map(PadTemplate::to_frame))
            .chain(self.curves.iter().map(Curve::to_frame))
            .chain(self.pads.iter().map(Pad::to_frame))
            .chain(std::iter::once(Frame::new(Command::SendReady)));

        for frame in frames {
            transport.send_frame(&frame.encode(self.config.vendor_id));
        }
    }

    fn summary_frame(&self) -> Frame {
        let version = self.config.version;
        let mut frame = Frame::new(Command::SendConfig);
        frame
            .push_byte(version.major)
            .push_byte(version.minor)
            .push_byte(version.patch)
            .push_byte((self.config.sampling_rate_hz / 1000) as u8)
            .push_byte(self.config.pad_count)
            .push_byte(self.config.sensor_count);
        frame
    }

    /// Replaces one pad's properties after validating them. Other pads are
    /// untouched.
    pub fn update_pad(&mut self, slot: u8, properties: Properties) -> Result<()> {
        properties.validate(self.config.sensor_count)?;
        let pad = self
            .pads
            .get_mut(slot as usize)
            .ok_or(EdrumError::UnknownPad(slot))?;
        tracing::info!(pad = slot, name = %properties.name, "pad updated");
        pad.properties = properties;
        Ok(())
    }

    pub fn save_pad<S: Storage + ?Sized>(&self, slot: u8, storage: &mut S) -> Result<()> {
        let pad = self.pad(slot).ok_or(EdrumError::UnknownPad(slot))?;
        pad.properties
            .save(storage, self.config.record_offset(slot as usize))?;
        Ok(())
    }

    /// Persists every pad at `slot * max_bytes_per_record`.
    pub fn save_settings<S: Storage + ?Sized>(&self, storage: &mut S) -> Result<()> {
        for pad in &self.pads {
            self.save_pad(pad.slot, storage)?;
        }
        Ok(())
    }

    /// Restores every pad whose record is intact. Pads with a missing or
    /// corrupt record keep their current properties. Returns how many pads
    /// were restored.
    pub fn load_settings<S: Storage + ?Sized>(&mut self, storage: &S) -> usize {
        let mut restored = 0;
        for pad in &mut self.pads {
            let offset = self.config.record_offset(pad.slot as usize);
            match Properties::load(storage, offset, self.config.sensor_count) {
                Ok((properties, _)) => {
                    pad.properties = properties;
                    restored += 1;
                }
                Err(err) => {
                    tracing::warn!(pad = pad.slot, %err, "keeping default pad settings");
                }
            }
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::ZoneLayout;
    use crate::scanner::{Recording, ReplayScanner};
    use crate::storage::MemoryStorage;
    use crate::transport::RecordingTransport;

    fn config() -> KitConfig {
        KitConfig {
            pad_count: 4,
            sensor_count: 8,
            ..KitConfig::default()
        }
    }

    fn commands(transport: &RecordingTransport) -> Vec<Command> {
        transport
            .frames()
            .map(|bytes| Frame::decode(bytes, 0x66).unwrap().command)
            .collect()
    }

    #[test]
    fn pads_get_consecutive_sensors() {
        let kit = Kit::new(&config()).unwrap();
        let sensors: Vec<u8> = kit.pads().iter().map(|p| p.properties().head.sensor).collect();
        assert_eq!(sensors, vec![1, 2, 3, 4]);

        let crowded = KitConfig {
            pad_count: 4,
            sensor_count: 2,
            ..KitConfig::default()
        };
        let kit = Kit::new(&crowded).unwrap();
        assert_eq!(kit.pad(3).unwrap().properties().head.sensor, 0);
    }

    #[test]
    fn configuration_dump_follows_the_fixed_order() {
        let kit = Kit::new(&config()).unwrap();
        let mut transport = RecordingTransport::new();
        kit.send_configuration(&mut transport);

        let mut expected = vec![Command::SendConfig];
        expected.extend([Command::SendType; PadType::COUNT]);
        expected.extend([Command::SendCurve; CurveShape::COUNT]);
        expected.extend([Command::SendPad; 4]);
        expected.push(Command::SendReady);
        assert_eq!(commands(&transport), expected);

        let summary = transport.frames().next().unwrap();
        assert_eq!(summary, &[0xf0, 0x66, 2, 0, 1, 1, 20, 4, 8, 0xf7]);
    }

    #[test]
    fn update_touches_only_the_addressed_pad() {
        let mut kit = Kit::new(&config()).unwrap();
        let before: Vec<Properties> = kit.pads().iter().map(|p| p.properties().clone()).collect();

        let mut properties = PadTemplate::new(PadType::Pd120).defaults().clone();
        properties.head.sensor = 6;
        properties.rim.sensor = 7;
        properties.name = "Snare".to_string();
        let frame = properties.to_frame(Command::UpdatePad, 2);

        let mut monitor = Monitor::new(kit.config());
        let mut scope = Oscilloscope::new(kit.config());
        let mut transport = RecordingTransport::new();
        let outcome = kit
            .dispatch(&frame, &mut monitor, &mut scope, &mut transport)
            .unwrap();

        assert_eq!(outcome, Dispatch::PadUpdated(2));
        assert_eq!(kit.pad(2).unwrap().properties(), &properties);
        assert_eq!(kit.pad(2).unwrap().properties().zones, ZoneLayout::Dual);
        for slot in [0usize, 1, 3] {
            assert_eq!(kit.pads()[slot].properties(), &before[slot]);
        }
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn invalid_updates_are_rejected() {
        let mut kit = Kit::new(&config()).unwrap();
        let mut properties = Properties::default();
        properties.head.threshold = 90;
        assert!(kit.update_pad(0, properties).is_err());

        assert!(matches!(
            kit.update_pad(9, Properties::default()),
            Err(EdrumError::UnknownPad(9))
        ));

        let mut properties = Properties::default();
        properties.head.sensor = 9;
        assert!(kit.update_pad(0, properties).is_err());
        assert_eq!(kit.pad(0).unwrap().properties().head.sensor, 1);
    }

    #[test]
    fn outbound_commands_are_ignored() {
        let mut kit = Kit::new(&config()).unwrap();
        let mut monitor = Monitor::new(kit.config());
        let mut scope = Oscilloscope::new(kit.config());
        let mut transport = RecordingTransport::new();
        let outcome = kit
            .dispatch(&Frame::new(Command::MonitorData), &mut monitor, &mut scope, &mut transport)
            .unwrap();
        assert_eq!(outcome, Dispatch::Ignored);
    }

    #[test]
    fn settings_round_trip_through_storage() {
        let config = config();
        let mut kit = Kit::new(&config).unwrap();
        let mut properties = Properties::default();
        properties.head.sensor = 5;
        properties.head.note = 36;
        kit.update_pad(1, properties.clone()).unwrap();

        let mut storage = MemoryStorage::new(config.storage_size());
        kit.save_settings(&mut storage).unwrap();

        let mut restored = Kit::new(&config).unwrap();
        assert_eq!(restored.load_settings(&storage), 4);
        assert_eq!(restored.pad(1).unwrap().properties(), &properties);
    }

    #[test]
    fn corrupt_records_keep_defaults() {
        let config = config();
        let kit = Kit::new(&config).unwrap();
        let mut storage = MemoryStorage::new(config.storage_size());
        kit.save_pad(0, &mut storage).unwrap();

        let mut restored = Kit::new(&config).unwrap();
        assert_eq!(restored.load_settings(&storage), 1);
        assert_eq!(restored.pad(3).unwrap().properties().head.sensor, 4);
    }

    #[test]
    fn process_drives_every_pad() {
        let mut kit = Kit::new(&config()).unwrap();
        let mut monitor = Monitor::new(kit.config());
        let mut transport = RecordingTransport::new();

        let ticks = (0..200)
            .map(|i| {
                let mut tick = vec![0i16; 8];
                if i < 3 {
                    tick[0] = 40;
                    tick[2] = 70;
                }
                tick
            })
            .collect();
        let mut scanner = ReplayScanner::new(8, Recording::new(ticks));

        let mut hits = Vec::new();
        for i in 0..200u32 {
            scanner.read();
            hits.extend(kit.process(i * 50, &scanner, &mut monitor, &mut transport));
        }

        let pads: Vec<u8> = hits.iter().map(|h| h.pad).collect();
        assert_eq!(pads, vec![0, 2]);
        assert_eq!(transport.notes().count(), 4);
        assert!(transport.notes().all(|n| n.channel == 10));
    }
}
