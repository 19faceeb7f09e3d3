//! EM530/EM540 register map
//!
//! Each [`RegisterGroup`] is one block read plus the ordered list of fields
//! laid out inside it. The tables here are the only place that knows the
//! wire layout; decoding is generic over them.

use crate::error::Result;
use crate::payload::RegisterBlock;
use serde::Serialize;
use std::fmt;

/// Phase label attached to a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Phase {
    L1,
    L2,
    L3,
    /// System-wide aggregate
    Sys,
}

impl Phase {
    pub const fn label(self) -> &'static str {
        match self {
            Phase::L1 => "L1",
            Phase::L2 => "L2",
            Phase::L3 => "L3",
            Phase::Sys => "sys",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Published measurement kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Metric {
    VoltsLineNeutral,
    VoltsLineLine,
    Amps,
    Watts,
    VoltAmps,
    Vars,
    PowerFactor,
    WattHours,
    Frequency,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::VoltsLineNeutral,
        Metric::VoltsLineLine,
        Metric::Amps,
        Metric::Watts,
        Metric::VoltAmps,
        Metric::Vars,
        Metric::PowerFactor,
        Metric::WattHours,
        Metric::Frequency,
    ];

    /// Metric name without namespace
    pub const fn name(self) -> &'static str {
        match self {
            Metric::VoltsLineNeutral => "volts_l_n",
            Metric::VoltsLineLine => "volts_l_l",
            Metric::Amps => "amps",
            Metric::Watts => "watts",
            Metric::VoltAmps => "va",
            Metric::Vars => "var",
            Metric::PowerFactor => "pf",
            Metric::WattHours => "wh",
            Metric::Frequency => "hz",
        }
    }

    pub const fn help(self) -> &'static str {
        match self {
            Metric::VoltsLineNeutral => "Volts line to neutral",
            Metric::VoltsLineLine => "Volts line to line",
            Metric::Amps => "Amps line",
            Metric::Watts => "Watts line",
            Metric::VoltAmps => "VA line",
            Metric::Vars => "Var line",
            Metric::PowerFactor => "Power factor line",
            Metric::WattHours => "Energy (Wh)",
            Metric::Frequency => "Line frequency",
        }
    }

    /// Whether the metric carries a `phase` label
    pub const fn is_phased(self) -> bool {
        !matches!(self, Metric::Frequency)
    }
}

/// Integer width of a register field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    I16,
    I32,
    I64,
}

impl FieldWidth {
    pub const fn words(self) -> usize {
        match self {
            FieldWidth::I16 => 1,
            FieldWidth::I32 => 2,
            FieldWidth::I64 => 4,
        }
    }
}

/// One step of a group layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Field {
        width: FieldWidth,
        divisor: u32,
        metric: Metric,
        phase: Option<Phase>,
    },
    /// Reserved registers, in words
    Skip(usize),
}

impl Entry {
    pub const fn words(&self) -> usize {
        match self {
            Entry::Field { width, .. } => width.words(),
            Entry::Skip(n) => *n,
        }
    }
}

const fn field(width: FieldWidth, divisor: u32, metric: Metric, phase: Phase) -> Entry {
    Entry::Field {
        width,
        divisor,
        metric,
        phase: Some(phase),
    }
}

/// A decoded raw value and where it is published
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeasurementField {
    pub metric: Metric,
    pub phase: Option<Phase>,
    pub raw: i64,
    pub divisor: u32,
}

impl MeasurementField {
    /// Value in physical units
    pub fn value(&self) -> f64 {
        self.raw as f64 / f64::from(self.divisor)
    }
}

/// One block read and its field layout
#[derive(Debug, Clone, Copy)]
pub struct RegisterGroup {
    pub name: &'static str,
    pub start: u16,
    pub count: u16,
    pub entries: &'static [Entry],
}

impl RegisterGroup {
    /// Words consumed by the layout, which must not exceed `count`
    pub fn words_used(&self) -> usize {
        self.entries.iter().map(Entry::words).sum()
    }

    /// Decode every field of the group. Either all fields are returned or
    /// the first error is, so callers never publish half a group.
    pub fn decode(&self, block: &RegisterBlock) -> Result<Vec<MeasurementField>> {
        let mut cursor = block.cursor();
        let mut fields = Vec::with_capacity(self.entries.len());
        for entry in self.entries {
            match *entry {
                Entry::Skip(n) => cursor.skip(n)?,
                Entry::Field {
                    width,
                    divisor,
                    metric,
                    phase,
                } => {
                    let raw = match width {
                        FieldWidth::I16 => i64::from(cursor.decode_i16()?),
                        FieldWidth::I32 => i64::from(cursor.decode_i32()?),
                        FieldWidth::I64 => cursor.decode_i64()?,
                    };
                    fields.push(MeasurementField {
                        metric,
                        phase,
                        raw,
                        divisor,
                    });
                }
            }
        }
        Ok(fields)
    }
}

use FieldWidth::{I16, I32, I64};
use Metric::*;
use Phase::{L1, L2, L3, Sys};

const ELECTRICAL_ENTRIES: [Entry; 26] = [
    field(I32, 10, VoltsLineNeutral, L1),
    field(I32, 10, VoltsLineNeutral, L2),
    field(I32, 10, VoltsLineNeutral, L3),
    field(I32, 10, VoltsLineLine, L1),
    field(I32, 10, VoltsLineLine, L2),
    field(I32, 10, VoltsLineLine, L3),
    field(I32, 1000, Amps, L1),
    field(I32, 1000, Amps, L2),
    field(I32, 1000, Amps, L3),
    field(I32, 10, Watts, L1),
    field(I32, 10, Watts, L2),
    field(I32, 10, Watts, L3),
    field(I32, 10, VoltAmps, L1),
    field(I32, 10, VoltAmps, L2),
    field(I32, 10, VoltAmps, L3),
    field(I32, 10, Vars, L1),
    field(I32, 10, Vars, L2),
    field(I32, 10, Vars, L3),
    field(I32, 10, VoltsLineNeutral, Sys),
    field(I32, 10, VoltsLineLine, Sys),
    field(I32, 10, Watts, Sys),
    field(I32, 10, VoltAmps, Sys),
    field(I32, 10, Vars, Sys),
    field(I16, 1000, PowerFactor, L1),
    field(I16, 1000, PowerFactor, L2),
    field(I16, 1000, PowerFactor, L3),
];

const ENERGY_ENTRIES: [Entry; 5] = [
    field(I64, 1, WattHours, Sys),
    // kvarh and partial counters, not exported
    Entry::Skip(12),
    field(I64, 1, WattHours, L1),
    field(I64, 1, WattHours, L2),
    field(I64, 1, WattHours, L3),
];

const FREQUENCY_ENTRIES: [Entry; 1] = [Entry::Field {
    width: I32,
    divisor: 1000,
    metric: Frequency,
    phase: None,
}];

/// Instantaneous voltages, currents, powers and power factors
pub const ELECTRICAL: RegisterGroup = RegisterGroup {
    name: "electrical",
    start: 0x0000,
    count: 50,
    entries: &ELECTRICAL_ENTRIES,
};

/// Accumulated active energy counters
pub const ENERGY: RegisterGroup = RegisterGroup {
    name: "energy",
    start: 0x0500,
    count: 28,
    entries: &ENERGY_ENTRIES,
};

/// Line frequency
pub const FREQUENCY: RegisterGroup = RegisterGroup {
    name: "frequency",
    start: 0x053c,
    count: 2,
    entries: &FREQUENCY_ENTRIES,
};

/// Groups read every poll iteration, in order
pub const EM540_POLL_GROUPS: [RegisterGroup; 3] = [ELECTRICAL, ENERGY, FREQUENCY];
