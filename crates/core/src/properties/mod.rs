//! Configuration record for one pad or one pad-type default.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use crate::curve::CurveShape;
use crate::pad_type::PadType;
use crate::protocol::{Command, Frame, FrameReader};
use crate::storage::Storage;
use crate::{EdrumError, ProtocolError, Result};

/// Width of the name field on the wire and in storage.
pub const NAME_WIDTH: usize = 13;

/// Format version written at the start of each persisted record.
pub const RECORD_VERSION: u8 = 1;

/// Bytes shared by the wire frame and the persisted record, after the pad id.
const FIELDS_SIZE: usize = 2 + NAME_WIDTH + 4 + 2 * 4;

/// Persisted record: version byte, fields, checksum byte.
pub const RECORD_SIZE: usize = 1 + FIELDS_SIZE + 1;

/// Zone topology of a pad.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum ZoneLayout {
    Single = 1,
    Dual = 2,
    Triple = 3,
    HiHat = 4,
}

impl ZoneLayout {
    /// Whether a second sensing zone (rim) is present.
    pub fn has_rim(self) -> bool {
        self != ZoneLayout::Single
    }
}

/// Sensing parameters for one striking area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    /// 1-based sensor number, 0 when unassigned.
    pub sensor: u8,
    /// Raw level that maps to full velocity.
    pub sensitivity: u8,
    /// Raw level a hit must exceed.
    pub threshold: u8,
    pub note: u8,
}

impl Default for Zone {
    fn default() -> Self {
        Self {
            sensor: 0,
            sensitivity: 80,
            threshold: 5,
            note: 48,
        }
    }
}

impl Zone {
    pub fn is_assigned(&self) -> bool {
        self.sensor != 0
    }

    /// Maps a rectified peak onto 0..=127. Peaks above the sensitivity clamp
    /// to it; the result is clamped before any curve is applied.
    ///
    /// Relies on `threshold < sensitivity`, which validation guarantees. A
    /// degenerate zone maps everything to full velocity instead of dividing
    /// by zero.
    pub fn velocity(&self, peak: i32) -> u8 {
        let threshold = i32::from(self.threshold);
        let sensitivity = i32::from(self.sensitivity);
        let span = sensitivity - threshold;
        if span <= 0 {
            return 127;
        }
        let peak = peak.min(sensitivity);
        ((peak - threshold) * 127 / span).clamp(0, 127) as u8
    }

    fn validate(&self, label: &str, sensor_count: u8) -> Result<()> {
        if self.sensor > sensor_count {
            return Err(EdrumError::properties(format!(
                "{label} sensor {} exceeds sensor count {sensor_count}",
                self.sensor
            )));
        }
        if self.threshold >= self.sensitivity {
            return Err(EdrumError::properties(format!(
                "{label} threshold {} must be below sensitivity {}",
                self.threshold, self.sensitivity
            )));
        }
        for (field, value) in [
            ("sensitivity", self.sensitivity),
            ("threshold", self.threshold),
            ("note", self.note),
        ] {
            check_seven_bit(label, field, value)?;
        }
        Ok(())
    }

    fn push(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[self.sensor, self.sensitivity, self.threshold, self.note]);
    }

    fn read(reader: &mut FrameReader<'_>) -> std::result::Result<Self, ProtocolError> {
        Ok(Self {
            sensor: reader.byte("sensor")?,
            sensitivity: reader.byte("sensitivity")?,
            threshold: reader.byte("threshold")?,
            note: reader.byte("note")?,
        })
    }
}

/// A pad's complete configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    pub pad_type: PadType,
    pub zones: ZoneLayout,
    pub name: String,
    /// Window lengths in whole milliseconds.
    pub scan_time: u8,
    pub mask_time: u8,
    pub retrigger_time: u8,
    pub curve: CurveShape,
    pub head: Zone,
    pub rim: Zone,
}

impl Default for Properties {
    fn default() -> Self {
        Self {
            pad_type: PadType::Generic,
            zones: ZoneLayout::Single,
            name: "Generic".to_string(),
            scan_time: 2,
            mask_time: 10,
            retrigger_time: 40,
            curve: CurveShape::Loud1,
            head: Zone::default(),
            rim: Zone::default(),
        }
    }
}

impl Properties {
    /// Checks every invariant the trigger state machine and the wire format
    /// rely on.
    pub fn validate(&self, sensor_count: u8) -> Result<()> {
        if self.name.len() > NAME_WIDTH {
            return Err(EdrumError::properties(format!(
                "name `{}` is longer than {NAME_WIDTH} bytes",
                self.name
            )));
        }
        if !self.name.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
            return Err(EdrumError::properties(format!(
                "name `{}` must be printable ASCII",
                self.name.escape_debug()
            )));
        }
        if self.scan_time == 0 {
            return Err(EdrumError::properties("scan time must be at least 1 ms"));
        }
        for (field, value) in [
            ("scan time", self.scan_time),
            ("mask time", self.mask_time),
            ("retrigger time", self.retrigger_time),
        ] {
            check_seven_bit("pad", field, value)?;
        }
        self.head.validate("head", sensor_count)?;
        self.rim.validate("rim", sensor_count)
    }

    /// Writes the record at `offset` and returns the offset just past it.
    pub fn save<S: Storage + ?Sized>(&self, storage: &mut S, offset: usize) -> Result<usize> {
        let record = self.record();
        for (i, byte) in record.iter().enumerate() {
            storage.update(offset + i, *byte)?;
        }
        Ok(offset + record.len())
    }

    /// Reads the record at `offset`, returning it with the offset just past it.
    ///
    /// The record must carry the current format version, a matching checksum,
    /// and pass [`Properties::validate`].
    pub fn load<S: Storage + ?Sized>(
        storage: &S,
        offset: usize,
        sensor_count: u8,
    ) -> Result<(Self, usize)> {
        let record = (0..RECORD_SIZE)
            .map(|i| storage.read(offset + i))
            .collect::<Result<Vec<u8>>>()?;

        if record[0] != RECORD_VERSION {
            return Err(EdrumError::CorruptRecord {
                offset,
                reason: "unsupported format version",
            });
        }
        if checksum(&record[..RECORD_SIZE - 1]) != record[RECORD_SIZE - 1] {
            return Err(EdrumError::CorruptRecord {
                offset,
                reason: "checksum mismatch",
            });
        }

        let mut reader = FrameReader::new(&record[1..RECORD_SIZE - 1]);
        let properties = Self::read_fields(&mut reader)?;
        properties.validate(sensor_count)?;
        Ok((properties, offset + RECORD_SIZE))
    }

    /// Serialises the record into a configuration frame addressed to `id`.
    pub fn to_frame(&self, command: Command, id: u8) -> Frame {
        let mut frame = Frame::new(command);
        frame.push_byte(id);
        frame.payload.extend_from_slice(&self.fields());
        frame
    }

    /// Decodes a configuration frame into its target id and properties. The
    /// result is not validated.
    pub fn from_frame(frame: &Frame) -> Result<(u8, Self)> {
        let mut reader = frame.reader();
        let id = reader.byte("id")?;
        let properties = Self::read_fields(&mut reader)?;
        Ok((id, properties))
    }

    fn fields(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FIELDS_SIZE);
        out.push(self.pad_type.id());
        out.push(self.zones.into());
        let mut name = self.name.as_bytes().to_vec();
        name.resize(NAME_WIDTH, 0);
        out.extend_from_slice(&name[..NAME_WIDTH]);
        out.extend_from_slice(&[
            self.scan_time,
            self.mask_time,
            self.retrigger_time,
            self.curve.id(),
        ]);
        self.head.push(&mut out);
        self.rim.push(&mut out);
        out
    }

    fn record(&self) -> Vec<u8> {
        let mut record = Vec::with_capacity(RECORD_SIZE);
        record.push(RECORD_VERSION);
        record.extend_from_slice(&self.fields());
        record.push(checksum(&record));
        record
    }

    fn read_fields(reader: &mut FrameReader<'_>) -> Result<Self> {
        let pad_type = PadType::from_id(reader.byte("type")?)?;
        let zones = reader.byte("zones")?;
        let zones = ZoneLayout::try_from(zones)
            .map_err(|_| EdrumError::properties(format!("zone count {zones} is not 1..=4")))?;
        let name = reader.text(NAME_WIDTH, "name")?;
        let scan_time = reader.byte("scan time")?;
        let mask_time = reader.byte("mask time")?;
        let retrigger_time = reader.byte("retrigger time")?;
        let curve = CurveShape::from_id(reader.byte("curve")?)?;
        let head = Zone::read(reader)?;
        let rim = Zone::read(reader)?;

        Ok(Self {
            pad_type,
            zones,
            name,
            scan_time,
            mask_time,
            retrigger_time,
            curve,
            head,
            rim,
        })
    }
}

fn check_seven_bit(label: &str, field: &str, value: u8) -> Result<()> {
    if value > 0x7f {
        return Err(EdrumError::properties(format!(
            "{label} {field} {value} does not fit in 7 bits"
        )));
    }
    Ok(())
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}
