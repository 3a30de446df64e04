//! Per-pad hit detection.
//!
//! Each pad runs `Idle → Scanning → Mask → Retrigger → Idle`. A reading above
//! the head threshold opens a scan window during which the rectified peak is
//! tracked. When the window closes the peak becomes a note, after which the
//! mask and retrigger windows suppress the decaying signal. Timestamps are
//! microseconds and may wrap; every comparison uses the wrapping difference.

use crate::capture::Monitor;
use crate::curve::Curve;
use crate::properties::{Properties, Zone};
use crate::scanner::Scanner;
use crate::transport::{NoteEvent, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerState {
    #[default]
    Idle,
    Scanning,
    Mask,
    Retrigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitZone {
    Head,
    Rim,
}

/// Outcome of a completed scan window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub zone: HitZone,
    pub note: u8,
    /// Rectified raw peak before clamping.
    pub peak: i32,
    /// Velocity after the curve was applied.
    pub velocity: u8,
    pub peak_time: u32,
    pub zero_crossing_time: Option<u32>,
}

/// Collaborators a pad needs for one tick, borrowed from the driver.
pub struct TickContext<'a> {
    pub now: u32,
    pub scanner: &'a dyn Scanner,
    pub monitor: &'a mut Monitor,
    pub transport: &'a mut dyn Transport,
    /// Output channel for note events, 1-based.
    pub channel: u8,
}

/// Scratch state of one pad's state machine.
#[derive(Debug, Clone, Default)]
pub struct Trigger {
    state: TriggerState,
    head_peak: i32,
    rim_peak: i32,
    state_start: u32,
    state_duration: u32,
    last_sample: i16,
    peak_time: u32,
    zero_crossing_time: Option<u32>,
}

fn window(ms: u8) -> u32 {
    u32::from(ms) * 1000
}

fn rectify(sample: i16) -> i32 {
    i32::from(sample).abs()
}

impl Trigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    /// Runs one sampling tick for pad `pad`, returning the hit if a scan
    /// window closed on this tick.
    pub fn tick(
        &mut self,
        pad: u8,
        properties: &Properties,
        curve: &Curve,
        ctx: &mut TickContext<'_>,
    ) -> Option<Hit> {
        let head = ctx.scanner.value(properties.head.sensor);
        let rim = (properties.zones.has_rim() && properties.rim.is_assigned())
            .then(|| ctx.scanner.value(properties.rim.sensor));
        let samples = [head, rim.unwrap_or(0)];
        let channels = if rim.is_some() { 2 } else { 1 };

        match self.state {
            TriggerState::Idle => {
                if !properties.head.is_assigned() {
                    return None;
                }
                let level = rectify(head);
                if level > i32::from(properties.head.threshold) {
                    self.enter(TriggerState::Scanning, ctx.now, window(properties.scan_time));
                    self.head_peak = level;
                    self.rim_peak = rim.map(rectify).unwrap_or(0);
                    self.peak_time = ctx.now;
                    self.zero_crossing_time = None;
                    self.last_sample = head;
                    tracing::trace!(pad, level, "scan window opened");

                    ctx.monitor.start(pad, channels);
                    ctx.monitor.sample(pad, &samples[..channels]);
                }
                None
            }

            TriggerState::Scanning => {
                let level = rectify(head);
                if level > self.head_peak {
                    self.head_peak = level;
                    self.peak_time = ctx.now;
                }
                if let Some(rim) = rim {
                    self.rim_peak = self.rim_peak.max(rectify(rim));
                }
                if self.zero_crossing_time.is_none() && crosses_zero(self.last_sample, head) {
                    self.zero_crossing_time = Some(ctx.now);
                }
                self.last_sample = head;

                ctx.monitor.sample(pad, &samples[..channels]);

                if !self.expired(ctx.now) {
                    return None;
                }
                let hit = self.fire(properties, curve, ctx);
                tracing::debug!(pad, note = hit.note, velocity = hit.velocity, peak = hit.peak, "hit");
                self.enter(TriggerState::Mask, ctx.now, window(properties.mask_time));
                Some(hit)
            }

            TriggerState::Mask => {
                ctx.monitor.sample(pad, &samples[..channels]);
                if self.expired(ctx.now) {
                    self.enter(TriggerState::Retrigger, ctx.now, window(properties.retrigger_time));
                }
                None
            }

            TriggerState::Retrigger => {
                ctx.monitor.sample(pad, &samples[..channels]);
                if self.expired(ctx.now) {
                    self.state = TriggerState::Idle;
                    ctx.monitor.end(pad, ctx.transport);
                }
                None
            }
        }
    }

    fn enter(&mut self, state: TriggerState, now: u32, duration: u32) {
        self.state = state;
        self.state_start = now;
        self.state_duration = duration;
    }

    fn expired(&self, now: u32) -> bool {
        now.wrapping_sub(self.state_start) > self.state_duration
    }

    /// Picks the sounding zone, maps its peak through the curve and sends
    /// the note pair.
    fn fire(&self, properties: &Properties, curve: &Curve, ctx: &mut TickContext<'_>) -> Hit {
        let rim_wins = properties.zones.has_rim()
            && properties.rim.is_assigned()
            && self.rim_peak > i32::from(properties.rim.threshold)
            && self.rim_peak >= self.head_peak;

        let (zone, settings, peak): (HitZone, &Zone, i32) = if rim_wins {
            (HitZone::Rim, &properties.rim, self.rim_peak)
        } else {
            (HitZone::Head, &properties.head, self.head_peak)
        };

        let velocity = curve.apply(settings.velocity(peak));
        ctx.transport
            .send_note(NoteEvent::on(ctx.channel, settings.note, velocity));
        ctx.transport.send_note(NoteEvent::off(ctx.channel, settings.note));

        Hit {
            zone,
            note: settings.note,
            peak,
            velocity,
            peak_time: self.peak_time,
            zero_crossing_time: self.zero_crossing_time,
        }
    }
}

fn crosses_zero(previous: i16, current: i16) -> bool {
    (previous > 0 && current < 0) || (previous < 0 && current > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::CurveShape;
    use crate::properties::ZoneLayout;
    use crate::protocol::{CaptureAssembler, Frame};
    use crate::scanner::{Recording, ReplayScanner};
    use crate::transport::{NoteKind, RecordingTransport};
    use crate::KitConfig;

    const TICK: u32 = 1000;

    struct Rig {
        trigger: Trigger,
        properties: Properties,
        curve: Curve,
        monitor: Monitor,
        transport: RecordingTransport,
        hits: Vec<Hit>,
        states: Vec<TriggerState>,
    }

    impl Rig {
        fn new(properties: Properties) -> Self {
            let config = KitConfig {
                sampling_rate_hz: 1000,
                chunk_size: 4,
                ..KitConfig::default()
            };
            let mut monitor = Monitor::new(&config);
            monitor.configure(true, 0);
            Self {
                curve: Curve::new(properties.curve),
                trigger: Trigger::new(),
                properties,
                monitor,
                transport: RecordingTransport::new(),
                hits: Vec::new(),
                states: Vec::new(),
            }
        }

        /// Feeds one recording tick per millisecond, starting at `start`.
        fn run(&mut self, recording: Recording, start: u32) {
            let ticks = recording.len();
            let mut scanner = ReplayScanner::new(4, recording);
            for i in 0..ticks {
                scanner.read();
                let mut ctx = TickContext {
                    now: start.wrapping_add(i as u32 * TICK),
                    scanner: &scanner,
                    monitor: &mut self.monitor,
                    transport: &mut self.transport,
                    channel: 10,
                };
                if let Some(hit) = self.trigger.tick(0, &self.properties, &self.curve, &mut ctx) {
                    self.hits.push(hit);
                }
                self.states.push(self.trigger.state());
            }
        }

        fn note_ons(&self) -> Vec<&NoteEvent> {
            self.transport
                .notes()
                .filter(|n| n.kind == NoteKind::On)
                .collect()
        }
    }

    fn pad(scan: u8, mask: u8, retrigger: u8) -> Properties {
        let mut properties = Properties {
            scan_time: scan,
            mask_time: mask,
            retrigger_time: retrigger,
            curve: CurveShape::Linear,
            ..Properties::default()
        };
        properties.head.sensor = 1;
        properties.head.threshold = 5;
        properties.head.sensitivity = 80;
        properties
    }

    fn pulse(values: &[i16], idle: usize) -> Recording {
        let mut all = values.to_vec();
        all.extend(std::iter::repeat(0).take(idle));
        Recording::single_sensor(4, 1, &all)
    }

    #[test]
    fn single_pulse_produces_one_note_and_a_complete_capture() {
        let mut rig = Rig::new(pad(2, 3, 4));
        rig.run(pulse(&[0, 0, 6, 40, 55, 40, 10, 0], 20), 0);

        assert_eq!(rig.hits.len(), 1);
        let hit = rig.hits[0];
        assert_eq!(hit.zone, HitZone::Head);
        assert_eq!(hit.peak, 55);
        assert_eq!(hit.velocity, (50 * 127 / 75) as u8);
        assert_eq!(hit.peak_time, 4 * TICK);

        let notes: Vec<_> = rig.transport.notes().copied().collect();
        assert_eq!(
            notes,
            vec![NoteEvent::on(10, 48, 84), NoteEvent::off(10, 48)]
        );

        // Scan opens at tick 2 and fires on tick 5, mask runs until tick 9,
        // retrigger until tick 14.
        use TriggerState::*;
        assert_eq!(&rig.states[..2], &[Idle, Idle]);
        assert_eq!(&rig.states[2..5], &[Scanning, Scanning, Scanning]);
        assert_eq!(&rig.states[5..9], &[Mask, Mask, Mask, Mask]);
        assert_eq!(&rig.states[9..14], &[Retrigger; 5]);
        assert_eq!(rig.states[14], Idle);

        let mut assembler = CaptureAssembler::new(2);
        for bytes in rig.transport.frames() {
            assembler.accept(&Frame::decode(bytes, 0x66).unwrap()).unwrap();
        }
        let mut expected = vec![6, 40, 55, 40, 10, 0];
        expected.resize(13, 0);
        assert_eq!(assembler.finish().unwrap(), expected);
    }

    #[test]
    fn retriggering_inside_mask_or_retrigger_is_ignored() {
        let mut rig = Rig::new(pad(2, 3, 4));
        // Second excursion lands in the mask window, third in retrigger.
        rig.run(pulse(&[30, 50, 20, 0, 60, 0, 0, 0, 70, 0], 10), 0);
        assert_eq!(rig.note_ons().len(), 1);
        assert_eq!(rig.hits[0].peak, 50);
    }

    #[test]
    fn a_new_excursion_after_idle_fires_again() {
        let mut rig = Rig::new(pad(1, 1, 1));
        rig.run(pulse(&[30, 0, 0, 0, 0, 0, 0, 0, 45, 0], 8), 0);
        let velocities: Vec<u8> = rig.note_ons().iter().map(|n| n.velocity).collect();
        assert_eq!(velocities, vec![(25 * 127 / 75) as u8, (40 * 127 / 75) as u8]);
    }

    #[test]
    fn threshold_maps_to_the_curve_floor_and_sensitivity_to_its_top() {
        let mut properties = pad(1, 1, 1);
        properties.curve = CurveShape::Loud1;
        let curve = Curve::new(CurveShape::Loud1);
        assert_eq!(curve.apply(properties.head.velocity(5)), curve.apply(0));

        // A peak of threshold + 1 is the smallest that triggers.
        let mut rig = Rig::new(properties.clone());
        rig.run(pulse(&[6], 8), 0);
        assert_eq!(rig.hits[0].velocity, curve.apply(1));

        let mut rig = Rig::new(properties.clone());
        rig.run(pulse(&[80], 8), 0);
        assert_eq!(rig.hits[0].velocity, 127);

        let mut rig = Rig::new(properties);
        rig.run(pulse(&[400], 8), 0);
        assert_eq!(rig.hits[0].velocity, 127);
        assert_eq!(rig.hits[0].peak, 400);
    }

    #[test]
    fn negative_excursions_trigger_and_zero_crossing_is_latched_once() {
        let mut rig = Rig::new(pad(3, 1, 1));
        rig.run(pulse(&[-20, -60, 25, -10, 0], 8), 0);

        assert_eq!(rig.hits.len(), 1);
        assert_eq!(rig.hits[0].peak, 60);
        assert_eq!(rig.hits[0].zero_crossing_time, Some(2 * TICK));
    }

    #[test]
    fn unassigned_head_never_triggers() {
        let mut properties = pad(2, 3, 4);
        properties.head.sensor = 0;
        let mut rig = Rig::new(properties);
        rig.run(pulse(&[90, 90, 90], 4), 0);
        assert!(rig.hits.is_empty());
        assert!(rig.transport.sent().is_empty());
    }

    #[test]
    fn windows_survive_timestamp_wraparound() {
        let mut rig = Rig::new(pad(2, 3, 4));
        let start = u32::MAX - 3 * TICK;
        rig.run(pulse(&[0, 0, 6, 40, 55, 40, 10, 0], 20), start);

        assert_eq!(rig.hits.len(), 1);
        assert_eq!(rig.hits[0].peak, 55);
        assert_eq!(rig.states[14], TriggerState::Idle);
    }

    #[test]
    fn rim_wins_when_it_dominates_a_dual_zone_pad() {
        let mut properties = pad(2, 1, 1);
        properties.zones = ZoneLayout::Dual;
        properties.rim = Zone {
            sensor: 2,
            sensitivity: 100,
            threshold: 10,
            note: 40,
        };

        let mut ticks = vec![vec![10, 30, 0, 0], vec![20, 90, 0, 0], vec![5, 40, 0, 0]];
        ticks.extend(std::iter::repeat(vec![0; 4]).take(8));
        let mut rig = Rig::new(properties.clone());
        rig.run(Recording::new(ticks), 0);

        assert_eq!(rig.hits.len(), 1);
        assert_eq!(rig.hits[0].zone, HitZone::Rim);
        assert_eq!(rig.hits[0].note, 40);
        assert_eq!(rig.hits[0].velocity, (80 * 127 / 90) as u8);

        // The monitor recorded both channels.
        let channels: Vec<u8> = rig
            .transport
            .frames()
            .map(|bytes| Frame::decode(bytes, 0x66).unwrap().payload[1])
            .collect();
        assert!(channels.contains(&1) && channels.contains(&2));

        // A single-zone pad ignores the rim sensor entirely.
        properties.zones = ZoneLayout::Single;
        let mut rig = Rig::new(properties);
        rig.run(
            Recording::new(vec![vec![10, 30, 0, 0], vec![20, 90, 0, 0], vec![0; 4], vec![0; 4]]),
            0,
        );
        assert_eq!(rig.hits[0].zone, HitZone::Head);
        assert_eq!(rig.hits[0].note, 48);
    }
}
