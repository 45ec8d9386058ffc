//! `RaidDeviceConfig`: the small, explicit configuration struct the
//! enclosing CLI/filesystem populates after parsing `--raids=<spec>`
//! (`spec.md` §6) and hands to [`crate::device::RaidDevice`]. Parsing
//! the command line itself stays an external collaborator (`spec.md`
//! §1); this crate only owns the shape of the already-parsed result.

use crate::mode::RaidMode;

/// Default meta-zone count, matching the Auto-RAID worked example of
/// `spec.md` §8 (`META_ZONES=2`). Never inferred from allocator
/// contents; always supplied explicitly at mkfs time.
pub const META_ZONES: u32 = 2;

/// Open-time parameters for a [`crate::device::RaidDevice`]. Mirrors
/// the fields `mkfs`/mount need out of a parsed `--raids=<spec>`
/// (`spec.md` §6): which mode to run, how many logical zones to
/// reserve for the enclosing filesystem's superblock, and the open
/// flags forwarded to every child backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaidDeviceConfig {
    pub main_mode: RaidMode,
    /// Only consulted for `RaidMode::Auto`; fixed modes have no meta
    /// region of their own (the enclosing filesystem's superblock
    /// lives in whichever logical zone it chooses on a fixed-mode
    /// device).
    pub meta_zones: u32,
    pub readonly: bool,
    pub exclusive: bool,
}

impl Default for RaidDeviceConfig {
    /// `Auto` mode with the default meta-zone count, opened read-write
    /// and non-exclusive — the common `mkfs` case.
    fn default() -> Self {
        Self {
            main_mode: RaidMode::Auto,
            meta_zones: META_ZONES,
            readonly: false,
            exclusive: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_auto_with_standard_meta_zone_count() {
        let cfg = RaidDeviceConfig::default();
        assert_eq!(cfg.main_mode, RaidMode::Auto);
        assert_eq!(cfg.meta_zones, META_ZONES);
        assert!(!cfg.readonly);
        assert!(!cfg.exclusive);
    }
}
