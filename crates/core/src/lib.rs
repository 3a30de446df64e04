//! Core library for the edrum trigger module.
//!
//! Turns per-tick sensor readings into note events and speaks the vendor
//! configuration protocol with a host editor. Acquisition hardware and the
//! byte transport are abstracted behind [`Scanner`] and [`Transport`], so the
//! whole pipeline can run against recorded data.

pub mod capture;
pub mod config;
pub mod curve;
pub mod engine;
pub mod error;
pub mod kit;
pub mod pad_type;
pub mod properties;
pub mod protocol;
pub mod scanner;
pub mod storage;
pub mod transport;
pub mod trigger;

pub use capture::{CaptureBuffer, Monitor, Oscilloscope};
pub use config::{FirmwareVersion, KitConfig};
pub use curve::{Curve, CurveShape};
pub use engine::Engine;
pub use error::{EdrumError, ProtocolError, Result};
pub use kit::{Dispatch, Kit, Pad, PadHit};
pub use pad_type::{PadTemplate, PadType};
pub use properties::{Properties, Zone, ZoneLayout};
pub use protocol::{Command, Frame};
pub use scanner::{Recording, ReplayScanner, Scanner};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use transport::{NoteEvent, NoteKind, Outbound, RecordingTransport, SendQueue, Transport};
pub use trigger::{Hit, HitZone, Trigger, TriggerState};
