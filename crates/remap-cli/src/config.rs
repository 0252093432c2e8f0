//! Mapping configuration: TOML file and inline `--map` arguments.
//!
//! File format, one `[[mapping]]` table per rule:
//!
//! ```toml
//! # Mod wheel to NRPN 262 over the full 14-bit range
//! [[mapping]]
//! source = "cc"
//! controller = 1
//! destination = "nrpn"
//! number = 262
//!
//! # Filter cutoff CC to an upward-only pitch bend
//! [[mapping]]
//! source = "cc"
//! controller = 74
//! destination = "pitch-bend"
//! range = [0, 8191]
//!
//! # Channel pressure to the expression controller
//! [[mapping]]
//! source = "aftertouch"
//! destination = "cc"
//! number = 11
//! ```
//!
//! `range` defaults to the destination's full output scale; pitch-bend
//! ranges are signed bend units (-8192..=8191). Numbers in inline mappings
//! accept decimal or `0x` hex.

use std::path::Path;

use serde::Deserialize;

use remap_engine::{Destination, MapEntry, MappingTable};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapFile {
    #[serde(default)]
    pub mapping: Vec<MappingSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingSpec {
    pub source: SourceKind,
    /// Source controller number; required for (and exclusive to) `cc`.
    pub controller: Option<u8>,
    pub destination: DestKind,
    /// Destination controller/parameter number (cc/nrpn/rpn destinations).
    #[serde(default)]
    pub number: u16,
    /// Output value range `[from, to]`; may descend to invert direction.
    pub range: Option<[i32; 2]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Cc,
    Aftertouch,
    PitchBend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DestKind {
    None,
    Cc,
    Nrpn,
    Rpn,
    PitchBend,
    Aftertouch,
}

impl DestKind {
    fn into_engine(self) -> Destination {
        match self {
            DestKind::None => Destination::None,
            DestKind::Cc => Destination::Cc,
            DestKind::Nrpn => Destination::Nrpn,
            DestKind::Rpn => Destination::Rpn,
            DestKind::PitchBend => Destination::PitchBend,
            DestKind::Aftertouch => Destination::Aftertouch,
        }
    }
}

/// Load a TOML mapping file into the table. Every rule is validated by the
/// table's setters; the first invalid rule aborts the load.
pub fn load_map_file(table: &mut MappingTable, path: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read mapping file {:?}: {}", path, e))?;
    let file: MapFile = toml::from_str(&text)
        .map_err(|e| anyhow::anyhow!("failed to parse mapping file {:?}: {}", path, e))?;
    for spec in &file.mapping {
        apply_spec(table, spec)?;
    }
    Ok(())
}

/// Install one parsed rule.
pub fn apply_spec(table: &mut MappingTable, spec: &MappingSpec) -> anyhow::Result<()> {
    let kind = spec.destination.into_engine();
    let entry = match spec.range {
        Some([from, to]) => MapEntry::new(kind, spec.number, from, to),
        None => MapEntry::full_scale(kind, spec.number),
    };
    match spec.source {
        SourceKind::Cc => {
            let controller = spec
                .controller
                .ok_or_else(|| anyhow::anyhow!("cc source requires a controller number"))?;
            table.set_cc_map(controller, entry)
        }
        SourceKind::Aftertouch => {
            if spec.controller.is_some() {
                return Err(anyhow::anyhow!(
                    "aftertouch source takes no controller number"
                ));
            }
            table.set_at_map(entry)
        }
        SourceKind::PitchBend => {
            if spec.controller.is_some() {
                return Err(anyhow::anyhow!(
                    "pitch-bend source takes no controller number"
                ));
            }
            table.set_pb_map(entry)
        }
    }
}

/// Parse an inline mapping like `cc1=nrpn262`, `at=pb` or `cc5=none`.
/// Inline mappings always use the destination's full output scale.
pub fn parse_inline_map(table: &mut MappingTable, arg: &str) -> anyhow::Result<()> {
    let (src, dest) = arg
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("invalid mapping '{}': expected SRC=DEST", arg))?;
    let (kind, number) = parse_dest(dest.trim())?;
    let entry = MapEntry::full_scale(kind, number);
    match src.trim() {
        "at" => table.set_at_map(entry),
        "pb" => table.set_pb_map(entry),
        s => {
            let controller = s
                .strip_prefix("cc")
                .ok_or_else(|| {
                    anyhow::anyhow!("invalid mapping source '{}': expected ccN, at or pb", s)
                })
                .and_then(|n| parse_number(n))?;
            if controller > 127 {
                return Err(anyhow::anyhow!(
                    "invalid source controller number {}",
                    controller
                ));
            }
            table.set_cc_map(controller as u8, entry)
        }
    }
}

fn parse_dest(s: &str) -> anyhow::Result<(Destination, u16)> {
    if s == "none" {
        return Ok((Destination::None, 0));
    }
    if s == "pb" {
        return Ok((Destination::PitchBend, 0));
    }
    if s == "at" {
        return Ok((Destination::Aftertouch, 0));
    }
    // "nrpn" before "rpn": the longer prefix wins.
    if let Some(n) = s.strip_prefix("nrpn") {
        return Ok((Destination::Nrpn, parse_number(n)?));
    }
    if let Some(n) = s.strip_prefix("rpn") {
        return Ok((Destination::Rpn, parse_number(n)?));
    }
    if let Some(n) = s.strip_prefix("cc") {
        return Ok((Destination::Cc, parse_number(n)?));
    }
    Err(anyhow::anyhow!(
        "invalid mapping destination '{}': expected ccN, nrpnN, rpnN, pb, at or none",
        s
    ))
}

/// Decimal or `0x`-prefixed hex.
fn parse_number(s: &str) -> anyhow::Result<u16> {
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| anyhow::anyhow!("invalid number '{}'", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_mapping_file_builds_table() {
        let text = r#"
            [[mapping]]
            source = "cc"
            controller = 1
            destination = "nrpn"
            number = 262

            [[mapping]]
            source = "aftertouch"
            destination = "pitch-bend"
            range = [0, 8191]

            [[mapping]]
            source = "pitch-bend"
            destination = "cc"
            number = 11
        "#;
        let file: MapFile = toml::from_str(text).unwrap();
        let mut table = MappingTable::new();
        for spec in &file.mapping {
            apply_spec(&mut table, spec).unwrap();
        }

        assert_eq!(table.cc(1).kind, Destination::Nrpn);
        assert_eq!(table.cc(1).number, 262);
        assert_eq!(table.cc(1).range_to, 16383, "nrpn defaults to full scale");

        assert_eq!(table.at().kind, Destination::PitchBend);
        assert_eq!(table.at().range_from, 8192, "signed 0 stored at center");
        assert_eq!(table.at().range_to, 16383);

        assert_eq!(table.pb().kind, Destination::Cc);
        assert_eq!(table.pb().number, 11);
    }

    #[test]
    fn cc_source_requires_controller() {
        let text = r#"
            [[mapping]]
            source = "cc"
            destination = "cc"
            number = 11
        "#;
        let file: MapFile = toml::from_str(text).unwrap();
        let mut table = MappingTable::new();
        assert!(apply_spec(&mut table, &file.mapping[0]).is_err());
    }

    #[test]
    fn unknown_fields_rejected() {
        let text = r#"
            [[mapping]]
            source = "cc"
            controller = 1
            destination = "cc"
            number = 11
            curve = "exponential"
        "#;
        assert!(toml::from_str::<MapFile>(text).is_err());
    }

    #[test]
    fn unusable_range_rejected_at_load() {
        let text = r#"
            [[mapping]]
            source = "cc"
            controller = 1
            destination = "cc"
            number = 11
            range = [200, 300]
        "#;
        let file: MapFile = toml::from_str(text).unwrap();
        let mut table = MappingTable::new();
        assert!(apply_spec(&mut table, &file.mapping[0]).is_err());
    }

    #[test]
    fn inline_maps_parse() {
        let mut table = MappingTable::new();
        parse_inline_map(&mut table, "cc1=nrpn262").unwrap();
        parse_inline_map(&mut table, "cc0x4A=pb").unwrap();
        parse_inline_map(&mut table, "at=cc11").unwrap();
        parse_inline_map(&mut table, "pb=at").unwrap();
        parse_inline_map(&mut table, "cc5=none").unwrap();

        assert_eq!(table.cc(1).kind, Destination::Nrpn);
        assert_eq!(table.cc(1).number, 262);
        assert_eq!(table.cc(74).kind, Destination::PitchBend);
        assert_eq!(table.at().kind, Destination::Cc);
        assert_eq!(table.at().number, 11);
        assert_eq!(table.pb().kind, Destination::Aftertouch);
        assert_eq!(table.cc(5).kind, Destination::None);
    }

    #[test]
    fn inline_map_errors() {
        let mut table = MappingTable::new();
        assert!(parse_inline_map(&mut table, "cc1").is_err(), "missing '='");
        assert!(parse_inline_map(&mut table, "cc1=bogus9").is_err());
        assert!(parse_inline_map(&mut table, "note60=cc1").is_err());
        assert!(parse_inline_map(&mut table, "cc128=cc1").is_err());
        assert!(parse_inline_map(&mut table, "cc1=cc128").is_err());
    }
}
