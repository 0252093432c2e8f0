//! Core real-time MIDI remapping engine.
//!
//! `map` holds the per-source mapping table and the value transform,
//! `encoder` re-compresses the outgoing stream with its own running status,
//! and `engine` is the byte-stream state machine tying them together.
//! Port I/O lives in `remap-device`; CLI and configuration parsing live in
//! `remap-cli`.

pub mod encoder;
pub mod engine;
pub mod map;

pub use encoder::{Encoder, MidiSink};
pub use engine::Engine;
pub use map::{Destination, MapEntry, MappingTable};
