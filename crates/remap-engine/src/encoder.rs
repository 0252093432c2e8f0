//! Output-side message encoder.
//!
//! Keeps the running status of the *output* stream, independent of the input
//! stream's. Every multi-byte emission is assembled in a temporary buffer and
//! handed to the sink as a single write, so a failed write never leaves a
//! half-emitted RPN/NRPN sequence on the wire.
//!
//! Status suppression is a bandwidth optimization for serial MIDI
//! (~31.25 kbit/s), not a correctness requirement; a receiver accepts
//! redundant status bytes.

/// Byte sink the encoder writes into. Implemented by the ALSA output port in
/// `remap-device` and by `Vec<u8>` for tests.
pub trait MidiSink {
    fn write(&mut self, data: &[u8]) -> anyhow::Result<()>;
}

impl MidiSink for Vec<u8> {
    fn write(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }
}

const STATUS_CONTROL_CHANGE: u8 = 0xB0;
const STATUS_CHANNEL_PRESSURE: u8 = 0xD0;
const STATUS_PITCH_BEND: u8 = 0xE0;

// Controller numbers of the RPN/NRPN data-entry convention.
const CC_RPN_MSB: u8 = 0x65;
const CC_RPN_LSB: u8 = 0x64;
const CC_NRPN_MSB: u8 = 0x63;
const CC_NRPN_LSB: u8 = 0x62;
const CC_DATA_ENTRY_MSB: u8 = 0x06;
const CC_DATA_ENTRY_LSB: u8 = 0x26;
/// RPN null function: parks the data-entry target after a parameter write so
/// unrelated data-entry messages cannot move the parameter.
const RPN_NULL: u8 = 0x7F;

#[derive(Debug, Default)]
pub struct Encoder {
    running_status: Option<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `status` into `msg` only when it differs from the output running
    /// status.
    fn push_status(&mut self, msg: &mut Vec<u8>, status: u8) {
        if self.running_status != Some(status) {
            msg.push(status);
            self.running_status = Some(status);
        }
    }

    /// Forward one raw status byte unchanged (passthrough traffic).
    pub fn raw_status<S: MidiSink>(&mut self, sink: &mut S, status: u8) -> anyhow::Result<()> {
        self.running_status = Some(status);
        sink.write(&[status])
    }

    /// Forward one raw data byte unchanged (passthrough traffic).
    pub fn raw_data<S: MidiSink>(&mut self, sink: &mut S, byte: u8) -> anyhow::Result<()> {
        sink.write(&[byte])
    }

    /// Status (when needed) plus verbatim data bytes as one write. Used for
    /// unmapped aftertouch and pitch-bend sources.
    pub fn message<S: MidiSink>(
        &mut self,
        sink: &mut S,
        status: u8,
        data: &[u8],
    ) -> anyhow::Result<()> {
        let mut msg = Vec::with_capacity(1 + data.len());
        self.push_status(&mut msg, status);
        msg.extend_from_slice(data);
        sink.write(&msg)
    }

    /// Open a Control Change: status (when needed) and controller number.
    /// The value byte follows via `data_byte` once the source delivers it.
    pub fn begin_cc<S: MidiSink>(
        &mut self,
        sink: &mut S,
        channel: u8,
        controller: u8,
    ) -> anyhow::Result<()> {
        let mut msg = Vec::with_capacity(2);
        self.push_status(&mut msg, STATUS_CONTROL_CHANGE | channel);
        msg.push(controller & 0x7F);
        sink.write(&msg)
    }

    /// Single data byte completing a message opened earlier.
    pub fn data_byte<S: MidiSink>(&mut self, sink: &mut S, value: u8) -> anyhow::Result<()> {
        sink.write(&[value & 0x7F])
    }

    /// Complete Control Change message.
    pub fn control_change<S: MidiSink>(
        &mut self,
        sink: &mut S,
        channel: u8,
        controller: u8,
        value: u8,
    ) -> anyhow::Result<()> {
        let mut msg = Vec::with_capacity(3);
        self.push_status(&mut msg, STATUS_CONTROL_CHANGE | channel);
        msg.push(controller & 0x7F);
        msg.push(value & 0x7F);
        sink.write(&msg)
    }

    /// RPN or NRPN parameter write: parameter select, 14-bit data entry,
    /// then the RPN null function. Always exactly 12 data bytes.
    pub fn parameter<S: MidiSink>(
        &mut self,
        sink: &mut S,
        channel: u8,
        registered: bool,
        number: u16,
        value: i32,
    ) -> anyhow::Result<()> {
        let (num_msb, num_lsb) = if registered {
            (CC_RPN_MSB, CC_RPN_LSB)
        } else {
            (CC_NRPN_MSB, CC_NRPN_LSB)
        };
        let mut msg = Vec::with_capacity(13);
        self.push_status(&mut msg, STATUS_CONTROL_CHANGE | channel);
        msg.extend_from_slice(&[num_msb, (number >> 7) as u8 & 0x7F]);
        msg.extend_from_slice(&[num_lsb, number as u8 & 0x7F]);
        msg.extend_from_slice(&[CC_DATA_ENTRY_MSB, (value >> 7) as u8 & 0x7F]);
        msg.extend_from_slice(&[CC_DATA_ENTRY_LSB, value as u8 & 0x7F]);
        msg.extend_from_slice(&[CC_RPN_MSB, RPN_NULL, CC_RPN_LSB, RPN_NULL]);
        sink.write(&msg)
    }

    /// Pitch-bend message: 14-bit value, LSB then MSB.
    pub fn pitch_bend<S: MidiSink>(
        &mut self,
        sink: &mut S,
        channel: u8,
        value: i32,
    ) -> anyhow::Result<()> {
        let mut msg = Vec::with_capacity(3);
        self.push_status(&mut msg, STATUS_PITCH_BEND | channel);
        msg.push(value as u8 & 0x7F);
        msg.push((value >> 7) as u8 & 0x7F);
        sink.write(&msg)
    }

    /// Channel pressure (aftertouch) message.
    pub fn aftertouch<S: MidiSink>(
        &mut self,
        sink: &mut S,
        channel: u8,
        value: u8,
    ) -> anyhow::Result<()> {
        let mut msg = Vec::with_capacity(2);
        self.push_status(&mut msg, STATUS_CHANNEL_PRESSURE | channel);
        msg.push(value & 0x7F);
        sink.write(&msg)
    }
}
