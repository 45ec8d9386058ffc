//! `RaidInfoBasic`: the fixed-size header of the persisted RAID record
//! (`spec.md` §6) — the fields every device in the set must agree on
//! bit-for-bit before its `RaidInfoAppend` tables are trusted.

use crate::error::RaidError;
use crate::mode::RaidMode;

const WIRE_LEN: usize = 4 * 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaidInfoBasic {
    pub main_mode: RaidMode,
    pub nr_devices: u32,
    pub dev_block_size: u32,
    pub dev_zone_size_in_blocks: u32,
    pub dev_nr_zones: u32,
}

impl RaidInfoBasic {
    pub fn to_bytes(&self) -> [u8; WIRE_LEN] {
        let mut out = [0u8; WIRE_LEN];
        out[0..4].copy_from_slice(&self.main_mode.to_wire().to_le_bytes());
        out[4..8].copy_from_slice(&self.nr_devices.to_le_bytes());
        out[8..12].copy_from_slice(&self.dev_block_size.to_le_bytes());
        out[12..16].copy_from_slice(&self.dev_zone_size_in_blocks.to_le_bytes());
        out[16..20].copy_from_slice(&self.dev_nr_zones.to_le_bytes());
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, RaidError> {
        if buf.len() < WIRE_LEN {
            return Err(RaidError::Corruption {
                message: format!(
                    "RaidInfoBasic truncated: need {WIRE_LEN} byte(s), have {}",
                    buf.len()
                ),
            });
        }
        let word = |range: std::ops::Range<usize>| {
            u32::from_le_bytes(buf[range].try_into().expect("range is always 4 bytes"))
        };
        let mode_word = word(0..4);
        let main_mode = RaidMode::from_wire(mode_word).ok_or_else(|| RaidError::Corruption {
            message: format!("RaidInfoBasic has unknown mode word {mode_word}"),
        })?;
        Ok(RaidInfoBasic {
            main_mode,
            nr_devices: word(4..8),
            dev_block_size: word(8..12),
            dev_zone_size_in_blocks: word(12..16),
            dev_nr_zones: word(16..20),
        })
    }

    /// Checks `self` (read from the superblock) against `disk` (read
    /// from the device actually being opened), and returns the first
    /// mismatching field as a `Corruption` error with the exact
    /// `"<field> mismatch: superblock-<a> != disk-<b>"` message shape
    /// spec.md §6 specifies.
    pub fn compatible(&self, disk: &RaidInfoBasic) -> Result<(), RaidError> {
        macro_rules! check {
            ($field:ident, $name:literal) => {
                if self.$field != disk.$field {
                    return Err(RaidError::Corruption {
                        message: format!(
                            "{} mismatch: superblock-{} != disk-{}",
                            $name, self.$field, disk.$field
                        ),
                    });
                }
            };
        }
        if self.main_mode != disk.main_mode {
            return Err(RaidError::Corruption {
                message: format!(
                    "main_mode mismatch: superblock-{} != disk-{}",
                    self.main_mode.as_str(),
                    disk.main_mode.as_str()
                ),
            });
        }
        check!(nr_devices, "nr_devices");
        check!(dev_block_size, "dev_block_size");
        check!(dev_zone_size_in_blocks, "dev_zone_size_in_blocks");
        check!(dev_nr_zones, "dev_nr_zones");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RaidInfoBasic {
        RaidInfoBasic {
            main_mode: RaidMode::Raid1,
            nr_devices: 2,
            dev_block_size: 4096,
            dev_zone_size_in_blocks: 16384,
            dev_nr_zones: 512,
        }
    }

    #[test]
    fn wire_round_trip() {
        let info = sample();
        let back = RaidInfoBasic::from_bytes(&info.to_bytes()).unwrap();
        assert_eq!(info, back);
    }

    #[test]
    fn truncated_buffer_is_corruption() {
        let err = RaidInfoBasic::from_bytes(&[0u8; 8]).unwrap_err();
        assert!(matches!(err, RaidError::Corruption { .. }));
    }

    #[test]
    fn identical_records_are_compatible() {
        sample().compatible(&sample()).unwrap();
    }

    #[test]
    fn mode_mismatch_is_reported_by_name() {
        let mut disk = sample();
        disk.main_mode = RaidMode::Auto;
        let err = sample().compatible(&disk).unwrap_err();
        match err {
            RaidError::Corruption { message } => {
                assert_eq!(message, "main_mode mismatch: superblock-raid1 != disk-raida");
            }
            _ => panic!("expected Corruption"),
        }
    }

    #[test]
    fn device_count_mismatch_is_reported_by_name() {
        let mut disk = sample();
        disk.nr_devices = 3;
        let err = sample().compatible(&disk).unwrap_err();
        match err {
            RaidError::Corruption { message } => {
                assert_eq!(message, "nr_devices mismatch: superblock-2 != disk-3");
            }
            _ => panic!("expected Corruption"),
        }
    }
}
