//! `RaidMode` and its two string encodings: the long form used in
//! `RaidInfoBasic` corruption messages (`spec.md` §6) and the short CLI
//! aliases accepted by `--raids=<spec>` (`spec.md` §6 grammar),
//! handled separately in [`crate::uri`].

use crate::error::RaidError;

/// Tagged RAID mode. Only `None`, `Concat`, `Raid1`, `Raid0` and `Auto`
/// are implemented; the parity modes are reserved (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RaidMode {
    None,
    Raid0,
    Raid1,
    Raid5,
    Raid6,
    Raid10,
    Concat,
    Auto,
}

impl RaidMode {
    pub fn is_implemented(&self) -> bool {
        matches!(
            self,
            RaidMode::None
                | RaidMode::Raid0
                | RaidMode::Raid1
                | RaidMode::Concat
                | RaidMode::Auto
        )
    }

    pub fn check_implemented(&self) -> Result<(), RaidError> {
        if self.is_implemented() {
            Ok(())
        } else {
            Err(RaidError::Unsupported {
                mode: self.as_str().to_string(),
            })
        }
    }

    /// Long-form encoding as used by `RaidInfoBasic` and its corruption
    /// messages, e.g. `"main_mode mismatch: superblock-raid1 !=
    /// disk-raida"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RaidMode::None => "none",
            RaidMode::Raid0 => "raid0",
            RaidMode::Raid1 => "raid1",
            RaidMode::Raid5 => "raid5",
            RaidMode::Raid6 => "raid6",
            RaidMode::Raid10 => "raid10",
            RaidMode::Concat => "raidc",
            RaidMode::Auto => "raida",
        }
    }

    pub fn from_str(s: &str) -> Option<RaidMode> {
        Some(match s {
            "none" => RaidMode::None,
            "raid0" => RaidMode::Raid0,
            "raid1" => RaidMode::Raid1,
            "raid5" => RaidMode::Raid5,
            "raid6" => RaidMode::Raid6,
            "raid10" => RaidMode::Raid10,
            "raidc" => RaidMode::Concat,
            "raida" => RaidMode::Auto,
            _ => return None,
        })
    }

    pub(crate) fn to_wire(self) -> u32 {
        match self {
            RaidMode::None => 0,
            RaidMode::Raid0 => 1,
            RaidMode::Raid1 => 2,
            RaidMode::Raid5 => 5,
            RaidMode::Raid6 => 6,
            RaidMode::Raid10 => 10,
            RaidMode::Concat => 100,
            RaidMode::Auto => 101,
        }
    }

    pub(crate) fn from_wire(v: u32) -> Option<RaidMode> {
        Some(match v {
            0 => RaidMode::None,
            1 => RaidMode::Raid0,
            2 => RaidMode::Raid1,
            5 => RaidMode::Raid5,
            6 => RaidMode::Raid6,
            10 => RaidMode::Raid10,
            100 => RaidMode::Concat,
            101 => RaidMode::Auto,
            _ => return None,
        })
    }
}

impl std::fmt::Display for RaidMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trip() {
        for mode in [
            RaidMode::None,
            RaidMode::Raid0,
            RaidMode::Raid1,
            RaidMode::Raid5,
            RaidMode::Raid6,
            RaidMode::Raid10,
            RaidMode::Concat,
            RaidMode::Auto,
        ] {
            assert_eq!(RaidMode::from_str(mode.as_str()), Some(mode));
            assert_eq!(RaidMode::from_wire(mode.to_wire()), Some(mode));
        }
    }

    #[test]
    fn only_five_modes_implemented() {
        let implemented: Vec<_> = [
            RaidMode::None,
            RaidMode::Raid0,
            RaidMode::Raid1,
            RaidMode::Raid5,
            RaidMode::Raid6,
            RaidMode::Raid10,
            RaidMode::Concat,
            RaidMode::Auto,
        ]
        .into_iter()
        .filter(|m| m.is_implemented())
        .collect();
        assert_eq!(implemented.len(), 5);
    }
}
