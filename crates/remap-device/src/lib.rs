//! ALSA rawmidi port access for the remapper.
//!
//! `MidiInput` is a nonblocking capture handle: `read` returns `Ok(None)`
//! when no bytes are waiting, so the caller controls the poll cadence.
//! `MidiOutput` is a blocking playback handle implementing the engine's
//! `MidiSink`, so the engine writes translated bytes straight to the port.
//!
//! Device names are ALSA rawmidi names (`hw:1,0,0`, `virtual`, ...).
//! On non-Linux platforms both handles are warn-and-noop stubs.

pub use platform::{MidiInput, MidiOutput};

impl remap_engine::MidiSink for MidiOutput {
    fn write(&mut self, data: &[u8]) -> anyhow::Result<()> {
        MidiOutput::write(self, data)
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use std::ffi::CString;
    use std::io::{Read, Write};

    use alsa::rawmidi::Rawmidi;
    use alsa::Direction;
    use tracing::{debug, info};

    /// Nonblocking rawmidi capture handle.
    pub struct MidiInput {
        name: String,
        rawmidi: Rawmidi,
    }

    impl MidiInput {
        pub fn open(device: &str) -> anyhow::Result<Self> {
            let cstr = CString::new(device)
                .map_err(|e| anyhow::anyhow!("invalid device name '{}': {}", device, e))?;
            let rawmidi = Rawmidi::open(&cstr, Direction::Capture, true).map_err(|e| {
                anyhow::anyhow!("failed to open MIDI input '{}': {}", device, e)
            })?;
            info!(device = %device, "MIDI input opened");
            Ok(Self {
                name: device.to_string(),
                rawmidi,
            })
        }

        /// Read whatever bytes are waiting. `Ok(None)` when the port has
        /// nothing yet; the caller decides how long to sleep before retrying.
        pub fn read(&mut self, buf: &mut [u8]) -> anyhow::Result<Option<usize>> {
            match self.rawmidi.io().read(buf) {
                Ok(0) => Ok(None),
                Ok(n) => {
                    debug!(device = %self.name, bytes = n, "read MIDI data");
                    Ok(Some(n))
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
                Err(e) => Err(anyhow::anyhow!(
                    "MIDI input read error on '{}': {}",
                    self.name,
                    e
                )),
            }
        }
    }

    /// Blocking rawmidi playback handle.
    pub struct MidiOutput {
        name: String,
        rawmidi: Rawmidi,
    }

    impl MidiOutput {
        pub fn open(device: &str) -> anyhow::Result<Self> {
            let cstr = CString::new(device)
                .map_err(|e| anyhow::anyhow!("invalid device name '{}': {}", device, e))?;
            let rawmidi = Rawmidi::open(&cstr, Direction::Playback, false).map_err(|e| {
                anyhow::anyhow!("failed to open MIDI output '{}': {}", device, e)
            })?;
            info!(device = %device, "MIDI output opened");
            Ok(Self {
                name: device.to_string(),
                rawmidi,
            })
        }

        /// Write one batch of MIDI bytes. A short or failed write is fatal to
        /// the run: a half-sent multi-byte message would desynchronize the
        /// receiver's running status.
        pub fn write(&mut self, data: &[u8]) -> anyhow::Result<()> {
            self.rawmidi.io().write_all(data).map_err(|e| {
                anyhow::anyhow!("MIDI output write error on '{}': {}", self.name, e)
            })?;
            debug!(device = %self.name, bytes = data.len(), "wrote MIDI data");
            Ok(())
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod platform {
    use tracing::warn;

    /// Stub input for non-Linux platforms. Opens successfully, never
    /// delivers data.
    pub struct MidiInput;

    impl MidiInput {
        pub fn open(device: &str) -> anyhow::Result<Self> {
            warn!(device = %device, "MIDI input not supported on this platform (Linux only)");
            Ok(Self)
        }

        pub fn read(&mut self, _buf: &mut [u8]) -> anyhow::Result<Option<usize>> {
            Ok(None)
        }
    }

    /// Stub output for non-Linux platforms. Discards everything.
    pub struct MidiOutput;

    impl MidiOutput {
        pub fn open(device: &str) -> anyhow::Result<Self> {
            warn!(device = %device, "MIDI output not supported on this platform (Linux only)");
            Ok(Self)
        }

        pub fn write(&mut self, _data: &[u8]) -> anyhow::Result<()> {
            Ok(())
        }
    }
}
