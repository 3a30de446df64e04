//! Outbound byte sink for notes and protocol frames.

use std::collections::VecDeque;

use midly::{
    live::LiveEvent,
    num::{u4, u7},
    MidiMessage,
};

/// Note event emitted for a detected hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    /// Output channel, 1-based.
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
    pub kind: NoteKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    On,
    Off,
}

impl NoteEvent {
    pub fn on(channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            channel,
            note,
            velocity,
            kind: NoteKind::On,
        }
    }

    pub fn off(channel: u8, note: u8) -> Self {
        Self {
            channel,
            note,
            velocity: 0,
            kind: NoteKind::Off,
        }
    }

    pub fn to_live_event(&self) -> LiveEvent<'static> {
        let key = u7::from(self.note & 0x7f);
        let vel = u7::from(self.velocity & 0x7f);
        LiveEvent::Midi {
            channel: u4::from(self.channel.saturating_sub(1) & 0x0f),
            message: match self.kind {
                NoteKind::On => MidiMessage::NoteOn { key, vel },
                NoteKind::Off => MidiMessage::NoteOff { key, vel },
            },
        }
    }

    /// Raw MIDI bytes for this event.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(3);
        // Writing into a Vec cannot fail.
        let _ = self.to_live_event().write(&mut buf);
        buf
    }
}

/// Byte-oriented transport carrying notes and protocol frames to the host.
pub trait Transport {
    /// Sends one complete frame, delimiters included.
    fn send_frame(&mut self, frame: &[u8]);

    fn send_note(&mut self, event: NoteEvent);
}

/// Anything that went out over a transport, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Vec<u8>),
    Note(NoteEvent),
}

/// Transport that records everything it is asked to send.
#[derive(Debug, Default, Clone)]
pub struct RecordingTransport {
    sent: Vec<Outbound>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> &[Outbound] {
        &self.sent
    }

    pub fn frames(&self) -> impl Iterator<Item = &[u8]> {
        self.sent.iter().filter_map(|item| match item {
            Outbound::Frame(bytes) => Some(bytes.as_slice()),
            Outbound::Note(_) => None,
        })
    }

    pub fn notes(&self) -> impl Iterator<Item = &NoteEvent> {
        self.sent.iter().filter_map(|item| match item {
            Outbound::Note(note) => Some(note),
            Outbound::Frame(_) => None,
        })
    }

    pub fn clear(&mut self) {
        self.sent.clear();
    }

    pub fn take(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.sent)
    }
}

impl Transport for RecordingTransport {
    fn send_frame(&mut self, frame: &[u8]) {
        self.sent.push(Outbound::Frame(frame.to_vec()));
    }

    fn send_note(&mut self, event: NoteEvent) {
        self.sent.push(Outbound::Note(event));
    }
}

/// Bounded queue in front of a transport.
///
/// When full, the newest item is dropped and counted. Notes and frames share
/// one queue so their relative order survives [`SendQueue::flush`].
#[derive(Debug)]
pub struct SendQueue<T: Transport> {
    inner: T,
    queue: VecDeque<Outbound>,
    capacity: usize,
    dropped: usize,
    overflowing: bool,
}

impl<T: Transport> SendQueue<T> {
    pub fn new(inner: T, capacity: usize) -> Self {
        Self {
            inner,
            queue: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
            overflowing: false,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total number of items discarded because the queue was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Hands every queued item to the inner transport, oldest first.
    pub fn flush(&mut self) {
        while let Some(item) = self.queue.pop_front() {
            match item {
                Outbound::Frame(bytes) => self.inner.send_frame(&bytes),
                Outbound::Note(note) => self.inner.send_note(note),
            }
        }
        self.overflowing = false;
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(mut self) -> T {
        self.flush();
        self.inner
    }

    fn enqueue(&mut self, item: Outbound) {
        if self.queue.len() >= self.capacity {
            self.dropped += 1;
            if !self.overflowing {
                tracing::warn!(capacity = self.capacity, "send queue full, dropping output");
                self.overflowing = true;
            }
            return;
        }
        self.queue.push_back(item);
    }
}

impl<T: Transport> Transport for SendQueue<T> {
    fn send_frame(&mut self, frame: &[u8]) {
        self.enqueue(Outbound::Frame(frame.to_vec()));
    }

    fn send_note(&mut self, event: NoteEvent) {
        self.enqueue(Outbound::Note(event));
    }
}
