use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use crate::curve::CurveShape;
use crate::properties::{Properties, Zone, ZoneLayout};
use crate::protocol::{Command, Frame};
use crate::{EdrumError, Result};

/// Known pad models.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum PadType {
    Generic = 0,
    Kd120 = 1,
    Pd100 = 2,
    Pd120 = 3,
    Pd125x = 4,
    Vh12 = 5,
    Cy12c = 6,
    Cy15r = 7,
}

impl PadType {
    pub const ALL: [PadType; 8] = [
        PadType::Generic,
        PadType::Kd120,
        PadType::Pd100,
        PadType::Pd120,
        PadType::Pd125x,
        PadType::Vh12,
        PadType::Cy12c,
        PadType::Cy15r,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn from_id(id: u8) -> Result<Self> {
        Self::try_from(id).map_err(|_| EdrumError::UnknownType(id))
    }

    pub fn id(self) -> u8 {
        self.into()
    }

    pub fn name(self) -> &'static str {
        match self {
            PadType::Generic => "Generic",
            PadType::Kd120 => "KD120",
            PadType::Pd100 => "PD100",
            PadType::Pd120 => "PD120",
            PadType::Pd125x => "PD125X",
            PadType::Vh12 => "VH12",
            PadType::Cy12c => "CY12C",
            PadType::Cy15r => "CY15R",
        }
    }

    pub fn layout(self) -> ZoneLayout {
        match self {
            PadType::Generic | PadType::Kd120 | PadType::Pd100 => ZoneLayout::Single,
            PadType::Pd120 | PadType::Pd125x => ZoneLayout::Dual,
            PadType::Vh12 => ZoneLayout::HiHat,
            PadType::Cy12c | PadType::Cy15r => ZoneLayout::Triple,
        }
    }
}

/// Read-only template holding the default configuration of a pad type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PadTemplate {
    kind: PadType,
    defaults: Properties,
}

impl PadTemplate {
    pub fn new(kind: PadType) -> Self {
        let defaults = Properties {
            pad_type: kind,
            zones: kind.layout(),
            name: kind.name().to_string(),
            scan_time: 2,
            mask_time: 10,
            retrigger_time: 40,
            curve: CurveShape::Linear,
            head: Zone::default(),
            rim: Zone::default(),
        };
        Self { kind, defaults }
    }

    pub fn kind(&self) -> PadType {
        self.kind
    }

    pub fn defaults(&self) -> &Properties {
        &self.defaults
    }

    pub fn to_frame(&self) -> Frame {
        self.defaults.to_frame(Command::SendType, self.kind.id())
    }
}
