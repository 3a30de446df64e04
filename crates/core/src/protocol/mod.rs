//! Frame codec for the configuration and diagnostics protocol.
//!
//! Frames follow the system-exclusive convention: `0xF0`, vendor byte,
//! command byte, a 7-bit-safe payload, `0xF7`. Multi-byte quantities travel as
//! 14-bit words split MSB-first into two 7-bit bytes. Capture samples are
//! biased by [`SAMPLE_BIAS`] before splitting so negative readings survive.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::ProtocolError;

pub const FRAME_START: u8 = 0xf0;
pub const FRAME_END: u8 = 0xf7;

/// Offset added to every capture sample before it is split into 7-bit bytes.
pub const SAMPLE_BIAS: i16 = 1024;

const WORD_MAX: u16 = 0x3fff;

/// Closed set of protocol commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Command {
    RequestConfig = 1,
    SendConfig = 2,
    SendType = 3,
    SendCurve = 4,
    SendPad = 5,
    SendReady = 6,
    UpdatePad = 7,
    MonitorRequest = 8,
    MonitorStart = 9,
    MonitorData = 10,
    MonitorEnd = 11,
    OscilloscopeRequest = 12,
    OscilloscopeStart = 13,
    OscilloscopeData = 14,
    OscilloscopeEnd = 15,
}

/// A decoded frame: command plus the payload bytes between the header and the
/// end byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            payload: Vec::new(),
        }
    }

    /// Appends one payload byte. Only the low seven bits are kept.
    pub fn push_byte(&mut self, value: u8) -> &mut Self {
        debug_assert!(value < 0x80, "payload byte {value:#04x} is not 7-bit safe");
        self.payload.push(value & 0x7f);
        self
    }

    /// Appends a 14-bit word as an MSB/LSB pair.
    pub fn push_word(&mut self, value: u16) -> &mut Self {
        let value = value.min(WORD_MAX);
        self.payload.push((value >> 7) as u8);
        self.payload.push((value & 0x7f) as u8);
        self
    }

    /// Appends `text` as a fixed-width, null-padded field.
    pub fn push_text(&mut self, text: &str, width: usize) -> &mut Self {
        let mut bytes = text.bytes().take(width).map(|b| b & 0x7f).collect::<Vec<_>>();
        bytes.resize(width, 0);
        self.payload.extend_from_slice(&bytes);
        self
    }

    /// Appends signed samples, each biased and split into two bytes.
    pub fn push_samples(&mut self, samples: &[i16]) -> &mut Self {
        for sample in samples {
            self.push_word(encode_sample(*sample));
        }
        self
    }

    /// Serialises the frame including delimiters.
    pub fn encode(&self, vendor: u8) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.payload.len() + 4);
        bytes.push(FRAME_START);
        bytes.push(vendor & 0x7f);
        bytes.push(self.command.into());
        bytes.extend_from_slice(&self.payload);
        bytes.push(FRAME_END);
        bytes
    }

    /// Parses a complete frame addressed to `vendor`.
    pub fn decode(bytes: &[u8], vendor: u8) -> Result<Self, ProtocolError> {
        if bytes.len() < 4 {
            return Err(ProtocolError::TooShort);
        }
        if bytes[0] != FRAME_START {
            return Err(ProtocolError::MissingStart);
        }
        if bytes[bytes.len() - 1] != FRAME_END {
            return Err(ProtocolError::MissingEnd);
        }
        if bytes[1] != vendor {
            return Err(ProtocolError::WrongVendor(bytes[1]));
        }

        let body = &bytes[2..bytes.len() - 1];
        if let Some(index) = body.iter().position(|b| *b >= 0x80) {
            return Err(ProtocolError::NotSevenBit { index: index + 2 });
        }

        let command =
            Command::try_from(body[0]).map_err(|_| ProtocolError::UnknownCommand(body[0]))?;

        Ok(Self {
            command,
            payload: body[1..].to_vec(),
        })
    }

    pub fn reader(&self) -> FrameReader<'_> {
        FrameReader::new(&self.payload)
    }
}

/// Sequential reader over a frame payload.
#[derive(Debug)]
pub struct FrameReader<'a> {
    payload: &'a [u8],
    position: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self {
            payload,
            position: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.payload.len() - self.position
    }

    pub fn byte(&mut self, field: &'static str) -> Result<u8, ProtocolError> {
        let value = *self
            .payload
            .get(self.position)
            .ok_or(ProtocolError::Truncated { field })?;
        self.position += 1;
        Ok(value)
    }

    /// Reads a byte if one is left.
    pub fn optional_byte(&mut self) -> Option<u8> {
        let value = self.payload.get(self.position).copied()?;
        self.position += 1;
        Some(value)
    }

    pub fn word(&mut self, field: &'static str) -> Result<u16, ProtocolError> {
        let msb = self.byte(field)? as u16;
        let lsb = self.byte(field)? as u16;
        Ok((msb << 7) | lsb)
    }

    /// Reads a fixed-width text field, dropping the null padding.
    pub fn text(&mut self, width: usize, field: &'static str) -> Result<String, ProtocolError> {
        if self.remaining() < width {
            return Err(ProtocolError::Truncated { field });
        }
        let raw = &self.payload[self.position..self.position + width];
        self.position += width;
        Ok(raw
            .iter()
            .filter(|b| **b != 0)
            .map(|b| *b as char)
            .collect())
    }

    pub fn samples(&mut self, count: usize) -> Result<Vec<i16>, ProtocolError> {
        (0..count)
            .map(|_| self.word("samples").map(decode_sample))
            .collect()
    }
}

/// Biases a signed sample into the 14-bit word range.
pub fn encode_sample(sample: i16) -> u16 {
    let max = WORD_MAX as i16 - SAMPLE_BIAS;
    (sample.clamp(-SAMPLE_BIAS, max) + SAMPLE_BIAS) as u16
}

pub fn decode_sample(word: u16) -> i16 {
    (word & WORD_MAX) as i16 - SAMPLE_BIAS
}

/// Splits `len` samples into `(offset, size)` chunks of at most `chunk` samples.
pub fn chunks(len: usize, chunk: usize) -> impl Iterator<Item = (usize, usize)> {
    let chunk = chunk.max(1);
    (0..len)
        .step_by(chunk)
        .map(move |offset| (offset, chunk.min(len - offset)))
}

/// Command triple and addressing bytes for one exported capture channel.
#[derive(Debug, Clone, Copy)]
pub struct CaptureStream<'a> {
    pub start: Command,
    pub data: Command,
    pub end: Command,
    /// Bytes that follow the command in all three frame kinds (pad and
    /// channel for the monitor, probe for the oscilloscope).
    pub address: &'a [u8],
}

impl CaptureStream<'_> {
    /// Builds the start, data and end frames carrying `samples`.
    pub fn frames(&self, samples: &[i16], chunk: usize) -> Vec<Frame> {
        let mut frames = Vec::with_capacity(2 + samples.len().div_ceil(chunk.max(1)));

        let mut start = Frame::new(self.start);
        self.push_address(&mut start);
        start.push_word(samples.len() as u16);
        frames.push(start);

        for (offset, size) in chunks(samples.len(), chunk) {
            let mut data = Frame::new(self.data);
            self.push_address(&mut data);
            data.push_word(offset as u16)
                .push_word(size as u16)
                .push_samples(&samples[offset..offset + size]);
            frames.push(data);
        }

        let mut end = Frame::new(self.end);
        self.push_address(&mut end);
        frames.push(end);

        frames
    }

    fn push_address(&self, frame: &mut Frame) {
        for byte in self.address {
            frame.push_byte(*byte);
        }
    }
}

/// Receiver-side reassembly of one capture channel.
///
/// Data chunks may arrive in any order; [`CaptureAssembler::finish`] only
/// succeeds once every announced sample has been filled exactly once.
#[derive(Debug)]
pub struct CaptureAssembler {
    address_len: usize,
    samples: Vec<Option<i16>>,
    started: bool,
    ended: bool,
}

impl CaptureAssembler {
    pub fn new(address_len: usize) -> Self {
        Self {
            address_len,
            samples: Vec::new(),
            started: false,
            ended: false,
        }
    }

    pub fn accept(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        let mut reader = frame.reader();
        for _ in 0..self.address_len {
            reader.byte("address")?;
        }

        match frame.command {
            Command::MonitorStart | Command::OscilloscopeStart => {
                let size = reader.word("size")? as usize;
                self.samples = vec![None; size];
                self.started = true;
                self.ended = false;
            }
            Command::MonitorData | Command::OscilloscopeData => {
                let offset = reader.word("offset")? as usize;
                let size = reader.word("size")? as usize;
                let values = reader.samples(size)?;
                let slots = self
                    .samples
                    .get_mut(offset..offset + size)
                    .ok_or(ProtocolError::Truncated { field: "offset" })?;
                for (slot, value) in slots.iter_mut().zip(values) {
                    *slot = Some(value);
                }
            }
            Command::MonitorEnd | Command::OscilloscopeEnd => self.ended = true,
            other => return Err(ProtocolError::UnknownCommand(other.into())),
        }
        Ok(())
    }

    /// Returns the reassembled samples if the channel is complete.
    pub fn finish(&self) -> Option<Vec<i16>> {
        if !self.started || !self.ended {
            return None;
        }
        self.samples.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VENDOR: u8 = 0x66;

    #[test]
    fn encodes_delimiters_vendor_and_command() {
        let mut frame = Frame::new(Command::SendReady);
        assert_eq!(frame.encode(VENDOR), vec![0xf0, 0x66, 6, 0xf7]);

        frame.push_byte(3).push_word(300);
        assert_eq!(frame.encode(VENDOR), vec![0xf0, 0x66, 6, 3, 2, 44, 0xf7]);
    }

    #[test]
    fn decodes_a_well_formed_frame() {
        let frame = Frame::decode(&[0xf0, 0x66, 8, 1, 4, 0xf7], VENDOR).unwrap();
        assert_eq!(frame.command, Command::MonitorRequest);
        assert_eq!(frame.payload, vec![1, 4]);
    }

    #[test]
    fn rejects_malformed_frames() {
        assert_eq!(Frame::decode(&[0xf0, 0x66, 0xf7], VENDOR), Err(ProtocolError::TooShort));
        assert_eq!(
            Frame::decode(&[0x90, 0x66, 1, 0xf7], VENDOR),
            Err(ProtocolError::MissingStart)
        );
        assert_eq!(
            Frame::decode(&[0xf0, 0x66, 1, 0x00], VENDOR),
            Err(ProtocolError::MissingEnd)
        );
        assert_eq!(
            Frame::decode(&[0xf0, 0x42, 1, 0xf7], VENDOR),
            Err(ProtocolError::WrongVendor(0x42))
        );
        assert_eq!(
            Frame::decode(&[0xf0, 0x66, 99, 0xf7], VENDOR),
            Err(ProtocolError::UnknownCommand(99))
        );
        assert_eq!(
            Frame::decode(&[0xf0, 0x66, 7, 0x80, 0xf7], VENDOR),
            Err(ProtocolError::NotSevenBit { index: 3 })
        );
    }

    #[test]
    fn samples_are_biased_and_clamped() {
        assert_eq!(encode_sample(0), 1024);
        assert_eq!(encode_sample(-1024), 0);
        assert_eq!(encode_sample(-2000), 0);
        assert_eq!(encode_sample(i16::MAX), 0x3fff);
        assert_eq!(decode_sample(encode_sample(-37)), -37);
        assert_eq!(decode_sample(encode_sample(900)), 900);
    }

    #[test]
    fn text_fields_are_padded_and_trimmed() {
        let mut frame = Frame::new(Command::SendPad);
        frame.push_text("PD120", 13);
        assert_eq!(frame.payload.len(), 13);
        assert_eq!(frame.reader().text(13, "name").unwrap(), "PD120");
        assert_eq!(
            frame.reader().text(14, "name"),
            Err(ProtocolError::Truncated { field: "name" })
        );
    }

    #[test]
    fn chunking_covers_every_sample_once() {
        let ranges: Vec<_> = chunks(120, 50).collect();
        assert_eq!(ranges, vec![(0, 50), (50, 50), (100, 20)]);
        assert_eq!(chunks(0, 50).count(), 0);
    }

    #[test]
    fn capture_stream_reassembles_out_of_order() {
        let samples: Vec<i16> = (0..130).map(|i| (i * 7 - 300) as i16).collect();
        let stream = CaptureStream {
            start: Command::MonitorStart,
            data: Command::MonitorData,
            end: Command::MonitorEnd,
            address: &[2, 1],
        };
        let frames = stream.frames(&samples, 50);
        assert_eq!(frames.len(), 5);

        // Round trip through the wire encoding, delivering data chunks reversed.
        let decoded: Vec<Frame> = frames
            .iter()
            .map(|f| Frame::decode(&f.encode(VENDOR), VENDOR).unwrap())
            .collect();
        let mut assembler = CaptureAssembler::new(2);
        assembler.accept(&decoded[0]).unwrap();
        for frame in decoded[1..4].iter().rev() {
            assembler.accept(frame).unwrap();
        }
        assert_eq!(assembler.finish(), None);
        assembler.accept(&decoded[4]).unwrap();
        assert_eq!(assembler.finish(), Some(samples));
    }

    #[test]
    fn empty_capture_has_only_start_and_end() {
        let stream = CaptureStream {
            start: Command::OscilloscopeStart,
            data: Command::OscilloscopeData,
            end: Command::OscilloscopeEnd,
            address: &[1],
        };
        let frames = stream.frames(&[], 50);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload, vec![1, 0, 0]);
        assert_eq!(frames[1].payload, vec![1]);
    }
}
