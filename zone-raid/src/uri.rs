//! Parser for the `--raids=<spec>` grammar (`spec.md` §6):
//!
//! ```text
//! spec   := mode ":" devlist
//! mode   := "raid0" | "raid1" | "raida" | "raidc" | "raid5" | "raid6" | "raid10"
//!          | "0" | "1" | "a" | "c" | "5" | "6" | "10"   (case-insensitive)
//! devlist:= devref ("," devref)*
//! devref := "dev:" <device-name>     (libzbd backend)
//!         | "zonefs:" <mount-path>   (zonefs backend)
//! ```
//!
//! This lives in the core crate (rather than the CLI, which is out of
//! scope) so the external command-line tool and any other caller share
//! one tested parsing routine instead of re-implementing the grammar.

use crate::error::RaidError;
use crate::mode::RaidMode;

/// One entry of `devlist`: which concrete backend to construct and the
/// name/path it should be opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevRef {
    Zbd(String),
    ZoneFs(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaidSpec {
    pub mode: RaidMode,
    pub devices: Vec<DevRef>,
}

fn mode_from_token(token: &str) -> Option<RaidMode> {
    match token.to_ascii_lowercase().as_str() {
        "raid0" | "0" => Some(RaidMode::Raid0),
        "raid1" | "1" => Some(RaidMode::Raid1),
        "raida" | "a" => Some(RaidMode::Auto),
        "raidc" | "c" => Some(RaidMode::Concat),
        "raid5" | "5" => Some(RaidMode::Raid5),
        "raid6" | "6" => Some(RaidMode::Raid6),
        "raid10" | "10" => Some(RaidMode::Raid10),
        _ => None,
    }
}

pub fn parse(spec: &str) -> Result<RaidSpec, RaidError> {
    let (mode_token, devlist) = spec.split_once(':').ok_or_else(|| {
        RaidError::invalid_argument(format!(
            "raid spec {spec:?} is missing a ':' separating mode from devices"
        ))
    })?;

    let mode = mode_from_token(mode_token.trim()).ok_or_else(|| {
        RaidError::invalid_argument(format!(
            "raid spec {spec:?} has unrecognized mode {mode_token:?}"
        ))
    })?;

    let mut devices = Vec::new();
    for devref in devlist.split(',') {
        let devref = devref.trim();
        if devref.is_empty() {
            return Err(RaidError::invalid_argument(format!(
                "raid spec {spec:?} has an empty device reference"
            )));
        }
        if let Some(name) = devref.strip_prefix("dev:") {
            devices.push(DevRef::Zbd(name.to_string()));
        } else if let Some(path) = devref.strip_prefix("zonefs:") {
            devices.push(DevRef::ZoneFs(path.to_string()));
        } else {
            return Err(RaidError::invalid_argument(format!(
                "raid spec {spec:?} has an unrecognized device reference {devref:?}"
            )));
        }
    }

    if devices.is_empty() {
        return Err(RaidError::invalid_argument(format!(
            "raid spec {spec:?} names no devices"
        )));
    }

    Ok(RaidSpec { mode, devices })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long_and_short_modes() {
        let a = parse("raid0:dev:/dev/nvme0n1,dev:/dev/nvme1n1").unwrap();
        assert_eq!(a.mode, RaidMode::Raid0);
        let b = parse("A:zonefs:/mnt/z0,zonefs:/mnt/z1").unwrap();
        assert_eq!(b.mode, RaidMode::Auto);
    }

    #[test]
    fn mixed_backends() {
        let spec = parse("c:dev:/dev/nvme0n1,zonefs:/mnt/z1").unwrap();
        assert_eq!(
            spec.devices,
            vec![
                DevRef::Zbd("/dev/nvme0n1".to_string()),
                DevRef::ZoneFs("/mnt/z1".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(parse("raid0").is_err());
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(parse("raid9:dev:/dev/nvme0n1").is_err());
    }

    #[test]
    fn rejects_unknown_devref() {
        assert!(parse("raid0:nfs:/mnt/x").is_err());
    }
}
