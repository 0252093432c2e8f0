//! Mapping table: which destination message form each source message is
//! rewritten into, and over what output value range.
//!
//! One entry per source controller number (128) plus singleton entries for
//! the aftertouch and pitch-bend sources. The table is built once by the
//! configuration layer and is read-only while the engine runs, so no locking
//! is needed on the hot path.

use tracing::warn;

/// Number of controller numbers a MIDI channel carries.
pub const CC_COUNT: usize = 128;
/// Largest 7-bit data value.
pub const MAX_7BIT: i32 = 127;
/// Largest 14-bit value (RPN/NRPN parameters, pitch bend).
pub const MAX_14BIT: i32 = 16383;
/// Pitch-bend center. Configured signed bend units are stored offset by this.
pub const PB_OFFSET: i32 = 8192;

/// Destination message family a source value is rewritten into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// Verbatim passthrough of the source bytes; no scaling.
    #[default]
    None,
    Nrpn,
    Rpn,
    Cc,
    PitchBend,
    Aftertouch,
}

impl Destination {
    /// Legal output value domain on the wire.
    /// `None` never produces a scaled value and reports the widest domain.
    pub fn bounds(self) -> (i32, i32) {
        match self {
            Destination::Cc | Destination::Aftertouch => (0, MAX_7BIT),
            Destination::None
            | Destination::Nrpn
            | Destination::Rpn
            | Destination::PitchBend => (0, MAX_14BIT),
        }
    }

    /// Largest legal destination number (controller or parameter number).
    /// Zero where the destination has no number field.
    fn number_max(self) -> u16 {
        match self {
            Destination::Cc => 127,
            Destination::Nrpn | Destination::Rpn => 16383,
            Destination::None | Destination::PitchBend | Destination::Aftertouch => 0,
        }
    }
}

/// One remapping rule: destination kind, destination number (where the kind
/// has one) and the output range the source value is scaled over.
///
/// `range_from` may exceed `range_to` to invert direction. The range may
/// reach outside the destination's legal domain (output values are clipped,
/// not rejected), but a range entirely outside the domain on one side can
/// never produce a usable value and fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapEntry {
    pub kind: Destination,
    pub number: u16,
    pub range_from: i32,
    pub range_to: i32,
}

impl Default for MapEntry {
    fn default() -> Self {
        Self {
            kind: Destination::None,
            number: 0,
            range_from: 0,
            range_to: 0,
        }
    }
}

impl MapEntry {
    /// Build an entry. Pitch-bend ranges are given in signed bend units
    /// (-8192..=8191) and stored offset into the wire domain 0..16383.
    pub fn new(kind: Destination, number: u16, range_from: i32, range_to: i32) -> Self {
        match kind {
            Destination::PitchBend => Self {
                kind,
                number,
                range_from: range_from + PB_OFFSET,
                range_to: range_to + PB_OFFSET,
            },
            _ => Self {
                kind,
                number,
                range_from,
                range_to,
            },
        }
    }

    /// Entry covering the destination's full output scale.
    pub fn full_scale(kind: Destination, number: u16) -> Self {
        // bounds() is already in wire units; skip the signed bend offset.
        let (lo, hi) = kind.bounds();
        Self {
            kind,
            number,
            range_from: lo,
            range_to: hi,
        }
    }

    /// Linear scale-and-clip from the source domain `0..=raw_max` into this
    /// entry's range, clamped to the destination's legal domain. Integer
    /// truncating division; i64 intermediates so ranges configured far
    /// outside the legal domain cannot overflow.
    pub fn scale(&self, raw: i32, raw_max: i32) -> i32 {
        let span = self.range_to as i64 - self.range_from as i64;
        let value = self.range_from as i64 + raw as i64 * span / raw_max as i64;
        let (lo, hi) = self.kind.bounds();
        value.clamp(lo as i64, hi as i64) as i32
    }

    /// Check number and range legality for this entry's kind.
    fn validate(&self) -> anyhow::Result<()> {
        if self.kind == Destination::None {
            // Passthrough ignores number and range.
            return Ok(());
        }
        let max = self.kind.number_max();
        if self.number > max {
            return Err(anyhow::anyhow!(
                "invalid destination number {} for {:?} (max {})",
                self.number,
                self.kind,
                max
            ));
        }
        let (lo, hi) = self.kind.bounds();
        if self.range_from > hi && self.range_to > hi {
            return Err(anyhow::anyhow!(
                "output range {}..{} lies entirely above the {:?} domain {}..{}",
                self.range_from,
                self.range_to,
                self.kind,
                lo,
                hi
            ));
        }
        if self.range_from < lo && self.range_to < lo {
            return Err(anyhow::anyhow!(
                "output range {}..{} lies entirely below the {:?} domain {}..{}",
                self.range_from,
                self.range_to,
                self.kind,
                lo,
                hi
            ));
        }
        if self.range_from < lo || self.range_from > hi || self.range_to < lo || self.range_to > hi
        {
            warn!(
                kind = ?self.kind,
                from = self.range_from,
                to = self.range_to,
                "output range exceeds the legal domain; values will be clipped"
            );
        }
        Ok(())
    }
}

/// Per-source lookup table consumed read-only by the engine.
#[derive(Debug, Clone)]
pub struct MappingTable {
    cc: [MapEntry; CC_COUNT],
    at: MapEntry,
    pb: MapEntry,
}

impl Default for MappingTable {
    fn default() -> Self {
        Self {
            cc: [MapEntry::default(); CC_COUNT],
            at: MapEntry::default(),
            pb: MapEntry::default(),
        }
    }
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the rule for a source controller number.
    pub fn set_cc_map(&mut self, controller: u8, entry: MapEntry) -> anyhow::Result<()> {
        if controller as usize >= CC_COUNT {
            return Err(anyhow::anyhow!(
                "invalid source controller number {}",
                controller
            ));
        }
        entry.validate()?;
        self.cc[controller as usize] = entry;
        Ok(())
    }

    /// Install the rule for the aftertouch (channel pressure) source.
    pub fn set_at_map(&mut self, entry: MapEntry) -> anyhow::Result<()> {
        entry.validate()?;
        self.at = entry;
        Ok(())
    }

    /// Install the rule for the pitch-bend source.
    pub fn set_pb_map(&mut self, entry: MapEntry) -> anyhow::Result<()> {
        entry.validate()?;
        self.pb = entry;
        Ok(())
    }

    pub fn cc(&self, controller: u8) -> &MapEntry {
        &self.cc[(controller & 0x7F) as usize]
    }

    pub fn at(&self) -> &MapEntry {
        &self.at
    }

    pub fn pb(&self) -> &MapEntry {
        &self.pb
    }

    /// Controller rules that are actually configured (kind != None).
    pub fn configured_cc(&self) -> impl Iterator<Item = (u8, &MapEntry)> {
        self.cc
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind != Destination::None)
            .map(|(n, e)| (n as u8, e))
    }
}
