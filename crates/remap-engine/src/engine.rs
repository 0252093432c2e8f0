//! Stream decoder and remapping engine.
//!
//! Consumes the raw input byte stream (running-status compressed, delivered
//! in arbitrary chunks), reconstructs logical Control Change / channel
//! pressure / pitch-bend messages, routes them through the mapping table and
//! drives the encoder. All other traffic is forwarded verbatim.
//!
//! CC, aftertouch and pitch-bend each use running status differently: CC
//! alternates controller-number and value bytes, aftertouch repeats single
//! pressure bytes, pitch bend repeats LSB/MSB pairs. The state machine tracks
//! exactly enough to know which role the next data byte plays.

use tracing::trace;

use crate::encoder::{Encoder, MidiSink};
use crate::map::{Destination, MapEntry, MappingTable, MAX_14BIT, MAX_7BIT};

/// Role of the next data byte. A status byte re-selects the state from its
/// high nibble no matter what was in progress, so a truncated sequence is
/// abandoned rather than misparsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Forward every data byte unchanged.
    PassThrough,
    /// 0xBn seen: the next data byte is a controller number.
    CcNumber,
    /// Controller forwarded (unmapped or CC→CC): the next byte is its value.
    CcValue { controller: u8 },
    /// CC→RPN/NRPN: the next byte is the data-entry value.
    ParamValue { controller: u8 },
    /// CC→pitch-bend: the next byte is the value to scale.
    BendValue { controller: u8 },
    /// CC→aftertouch: the next byte is the value to scale.
    PressureValue { controller: u8 },
    /// 0xDn seen: every data byte is a pressure value.
    Pressure,
    /// 0xEn seen: the next data byte is the bend LSB.
    BendLsb,
    /// Bend MSB completes a 14-bit value.
    BendMsb { lsb: u8 },
}

pub struct Engine<'a> {
    table: &'a MappingTable,
    encoder: Encoder,
    state: DecodeState,
    /// Channel nibble of the current input running status.
    channel: u8,
    /// Last status byte seen on the input stream.
    running_status: u8,
}

impl<'a> Engine<'a> {
    pub fn new(table: &'a MappingTable) -> Self {
        Self {
            table,
            encoder: Encoder::new(),
            state: DecodeState::PassThrough,
            channel: 0,
            running_status: 0,
        }
    }

    /// Feed a chunk of raw input bytes, writing the translated stream to
    /// `sink`. Chunk boundaries can fall anywhere; decode state carries over
    /// to the next call.
    pub fn process<S: MidiSink>(&mut self, input: &[u8], sink: &mut S) -> anyhow::Result<()> {
        for &byte in input {
            if byte & 0x80 != 0 {
                self.on_status(byte, sink)?;
            } else {
                self.on_data(byte, sink)?;
            }
        }
        Ok(())
    }

    fn on_status<S: MidiSink>(&mut self, status: u8, sink: &mut S) -> anyhow::Result<()> {
        self.running_status = status;
        self.channel = status & 0x0F;
        self.state = match status & 0xF0 {
            0xB0 => DecodeState::CcNumber,
            0xD0 => DecodeState::Pressure,
            0xE0 => DecodeState::BendLsb,
            // Notes, program change, poly aftertouch, system: untouched.
            _ => DecodeState::PassThrough,
        };
        trace!("status {status:#04x} -> {:?}", self.state);
        if self.state == DecodeState::PassThrough {
            self.encoder.raw_status(sink, status)?;
        }
        Ok(())
    }

    fn on_data<S: MidiSink>(&mut self, byte: u8, sink: &mut S) -> anyhow::Result<()> {
        let table = self.table;
        match self.state {
            DecodeState::PassThrough => self.encoder.raw_data(sink, byte),

            DecodeState::CcNumber => self.on_cc_number(byte, sink),

            DecodeState::CcValue { controller } => {
                let entry = table.cc(controller);
                let value = match entry.kind {
                    // Unmapped controllers forward their value untouched.
                    Destination::None => byte,
                    _ => entry.scale(byte as i32, MAX_7BIT) as u8,
                };
                self.encoder.data_byte(sink, value)?;
                self.state = DecodeState::CcNumber;
                Ok(())
            }

            DecodeState::ParamValue { controller } => {
                let entry = table.cc(controller);
                let value = entry.scale(byte as i32, MAX_7BIT);
                let registered = entry.kind == Destination::Rpn;
                trace!(controller, value, registered, "cc -> parameter");
                self.encoder
                    .parameter(sink, self.channel, registered, entry.number, value)?;
                self.state = DecodeState::CcNumber;
                Ok(())
            }

            DecodeState::BendValue { controller } => {
                let entry = table.cc(controller);
                let value = entry.scale(byte as i32, MAX_7BIT);
                trace!(controller, value, "cc -> pitch bend");
                self.encoder.pitch_bend(sink, self.channel, value)?;
                self.state = DecodeState::CcNumber;
                Ok(())
            }

            DecodeState::PressureValue { controller } => {
                let entry = table.cc(controller);
                let value = entry.scale(byte as i32, MAX_7BIT);
                trace!(controller, value, "cc -> aftertouch");
                self.encoder.aftertouch(sink, self.channel, value as u8)?;
                self.state = DecodeState::CcNumber;
                Ok(())
            }

            // Aftertouch repeats two-byte messages under one running status;
            // the state does not change.
            DecodeState::Pressure => self.emit_mapped(table.at(), byte as i32, MAX_7BIT, &[byte], sink),

            DecodeState::BendLsb => {
                self.state = DecodeState::BendMsb { lsb: byte };
                Ok(())
            }

            DecodeState::BendMsb { lsb } => {
                let raw = lsb as i32 | (byte as i32) << 7;
                self.emit_mapped(table.pb(), raw, MAX_14BIT, &[lsb, byte], sink)?;
                self.state = DecodeState::BendLsb;
                Ok(())
            }
        }
    }

    /// A controller number arrived: decide the value byte's fate. Unmapped
    /// and CC→CC controllers are forwarded immediately (status and number);
    /// every other destination waits for the value before emitting anything.
    fn on_cc_number<S: MidiSink>(&mut self, controller: u8, sink: &mut S) -> anyhow::Result<()> {
        let entry = self.table.cc(controller);
        self.state = match entry.kind {
            Destination::None => {
                self.encoder.begin_cc(sink, self.channel, controller)?;
                DecodeState::CcValue { controller }
            }
            Destination::Cc => {
                self.encoder
                    .begin_cc(sink, self.channel, entry.number as u8)?;
                DecodeState::CcValue { controller }
            }
            Destination::Nrpn | Destination::Rpn => DecodeState::ParamValue { controller },
            Destination::PitchBend => DecodeState::BendValue { controller },
            Destination::Aftertouch => DecodeState::PressureValue { controller },
        };
        Ok(())
    }

    /// Route a complete aftertouch or pitch-bend source value through its
    /// mapping entry. `original` holds the source data bytes for the
    /// passthrough case.
    fn emit_mapped<S: MidiSink>(
        &mut self,
        entry: &MapEntry,
        raw: i32,
        raw_max: i32,
        original: &[u8],
        sink: &mut S,
    ) -> anyhow::Result<()> {
        match entry.kind {
            Destination::None => self.encoder.message(sink, self.running_status, original),
            Destination::Cc => {
                let value = entry.scale(raw, raw_max);
                trace!(raw, value, controller = entry.number, "source -> cc");
                self.encoder
                    .control_change(sink, self.channel, entry.number as u8, value as u8)
            }
            Destination::Nrpn | Destination::Rpn => {
                let value = entry.scale(raw, raw_max);
                let registered = entry.kind == Destination::Rpn;
                trace!(raw, value, number = entry.number, registered, "source -> parameter");
                self.encoder
                    .parameter(sink, self.channel, registered, entry.number, value)
            }
            Destination::PitchBend => {
                let value = entry.scale(raw, raw_max);
                trace!(raw, value, "source -> pitch bend");
                self.encoder.pitch_bend(sink, self.channel, value)
            }
            Destination::Aftertouch => {
                let value = entry.scale(raw, raw_max);
                trace!(raw, value, "source -> aftertouch");
                self.encoder.aftertouch(sink, self.channel, value as u8)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapEntry;

    fn run(table: &MappingTable, input: &[u8]) -> Vec<u8> {
        let mut engine = Engine::new(table);
        let mut out = Vec::new();
        engine.process(input, &mut out).unwrap();
        out
    }

    #[test]
    fn notes_pass_through_unchanged() {
        let table = MappingTable::new();
        let input = [0x90, 60, 100, 0x80, 60, 0];
        assert_eq!(run(&table, &input), input);
    }

    #[test]
    fn unmapped_cc_passes_through() {
        let table = MappingTable::new();
        let input = [0xB0, 7, 100];
        assert_eq!(run(&table, &input), input);
    }

    #[test]
    fn running_status_cc_pairs_recombine() {
        // Two CC messages under one input running status.
        let table = MappingTable::new();
        let input = [0xB0, 7, 100, 10, 64];
        assert_eq!(run(&table, &input), input);
    }

    #[test]
    fn cc_to_cc_rewrites_number() {
        let mut table = MappingTable::new();
        table
            .set_cc_map(5, MapEntry::full_scale(Destination::Cc, 6))
            .unwrap();
        assert_eq!(run(&table, &[0xB0, 5, 99]), vec![0xB0, 6, 99]);
    }

    #[test]
    fn cc_to_cc_scales_value() {
        let mut table = MappingTable::new();
        table
            .set_cc_map(5, MapEntry::new(Destination::Cc, 6, 0, 64))
            .unwrap();
        assert_eq!(run(&table, &[0xB0, 5, 127]), vec![0xB0, 6, 64]);
    }

    #[test]
    fn cc_to_pitch_bend() {
        let mut table = MappingTable::new();
        table
            .set_cc_map(1, MapEntry::new(Destination::PitchBend, 0, -8192, 8191))
            .unwrap();
        // 127 scales to the top of the range: 0 + 127*16383/127 = 16383
        assert_eq!(run(&table, &[0xB0, 1, 127]), vec![0xE0, 0x7F, 0x7F]);
    }

    #[test]
    fn cc_to_aftertouch() {
        let mut table = MappingTable::new();
        table
            .set_cc_map(1, MapEntry::full_scale(Destination::Aftertouch, 0))
            .unwrap();
        assert_eq!(run(&table, &[0xB3, 1, 90]), vec![0xD3, 90]);
    }

    #[test]
    fn aftertouch_source_repeats_without_status() {
        let mut table = MappingTable::new();
        table
            .set_at_map(MapEntry::full_scale(Destination::Cc, 11))
            .unwrap();
        // Three pressure values under one 0xD0 running status.
        let out = run(&table, &[0xD0, 10, 20, 30]);
        assert_eq!(out, vec![0xB0, 11, 10, 11, 20, 11, 30]);
    }

    #[test]
    fn pitch_bend_source_alternates_lsb_msb() {
        let mut table = MappingTable::new();
        table
            .set_pb_map(MapEntry::full_scale(Destination::Aftertouch, 0))
            .unwrap();
        // Two full bends under one 0xE0 running status.
        // 16383 -> 127, 0 -> 0.
        let out = run(&table, &[0xE0, 0x7F, 0x7F, 0x00, 0x00]);
        assert_eq!(out, vec![0xD0, 127, 0]);
    }

    #[test]
    fn unmapped_pitch_bend_passes_through() {
        let table = MappingTable::new();
        let input = [0xE5, 0x12, 0x34];
        assert_eq!(run(&table, &input), input);
    }

    #[test]
    fn unmapped_aftertouch_passes_through() {
        let table = MappingTable::new();
        let input = [0xD2, 0x55];
        assert_eq!(run(&table, &input), input);
    }

    #[test]
    fn status_interrupts_pending_sequence() {
        let mut table = MappingTable::new();
        table
            .set_cc_map(1, MapEntry::full_scale(Destination::Nrpn, 10))
            .unwrap();
        // CC 1 awaits its value, but a Note On arrives first. The parameter
        // write is abandoned; nothing of it reaches the output.
        let out = run(&table, &[0xB0, 1, 0x90, 60, 100]);
        assert_eq!(out, vec![0x90, 60, 100]);
    }

    #[test]
    fn chunk_boundaries_do_not_change_output() {
        let mut table = MappingTable::new();
        table
            .set_cc_map(1, MapEntry::full_scale(Destination::Nrpn, 262))
            .unwrap();
        let input = [0xB0u8, 1, 64, 7, 100, 0xD0, 55, 0xE0, 0, 0x40];

        let whole = run(&table, &input);

        let mut engine = Engine::new(&table);
        let mut split = Vec::new();
        for b in input {
            engine.process(&[b], &mut split).unwrap();
        }
        assert_eq!(whole, split);
    }

    #[test]
    fn system_realtime_forces_passthrough() {
        let table = MappingTable::new();
        // Clock byte mid-stream: forwarded, and the decoder drops to
        // passthrough until the next channel voice status.
        let out = run(&table, &[0xF8, 0x01, 0xB0, 7, 100]);
        assert_eq!(out, vec![0xF8, 0x01, 0xB0, 7, 100]);
    }
}
