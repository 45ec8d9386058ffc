//! Concat mode (`spec.md` §4.3.1): logical zone `0..child.nr_zones-1`
//! lives on device 0, the next block on device 1, and so on.

use crate::backend::{Backend, IoResult, ResetResult};
use crate::error::RaidError;
use crate::zone::{Zone, ZoneList};

use super::RaidDevice;

/// Locates the device a byte position falls into, consuming
/// `d.nr_zones * d.zone_size` per device until `pos` lands inside one.
/// Returns `(device_index, pos_within_device)`.
fn locate_by_pos(devices: &[Box<dyn Backend>], pos: u64) -> Result<(usize, u64), RaidError> {
    let mut remaining = pos;
    for (i, d) in devices.iter().enumerate() {
        let g = d.geometry();
        let bytes = g.nr_zones as u64 * g.zone_size;
        if remaining < bytes {
            return Ok((i, remaining));
        }
        remaining -= bytes;
    }
    Err(RaidError::invalid_argument(format!(
        "position {pos} is beyond the concatenated device"
    )))
}

/// Locates the device a zone index falls into, consuming `d.nr_zones`
/// per device. Returns `(device_index, idx_within_device)`.
fn locate_by_idx(devices: &[Box<dyn Backend>], idx: u32) -> Result<(usize, u32), RaidError> {
    let mut remaining = idx;
    for (i, d) in devices.iter().enumerate() {
        let nr = d.geometry().nr_zones;
        if remaining < nr {
            return Ok((i, remaining));
        }
        remaining -= nr;
    }
    Err(RaidError::invalid_argument(format!(
        "zone index {idx} is beyond the concatenated device"
    )))
}

pub(super) fn list_zones(raid: &RaidDevice) -> Result<ZoneList, RaidError> {
    let mut out = Vec::new();
    let mut base = 0u64;
    for d in &raid.devices {
        for z in d.list_zones()? {
            out.push(Zone {
                start: base + z.start,
                ..z
            });
        }
        let g = d.geometry();
        base += g.nr_zones as u64 * g.zone_size;
    }
    Ok(out)
}

pub(super) fn reset(raid: &RaidDevice, start: u64) -> Result<ResetResult, RaidError> {
    let (i, pos) = locate_by_pos(&raid.devices, start)?;
    raid.devices[i].reset(pos)
}

pub(super) fn finish(raid: &RaidDevice, start: u64) -> Result<(), RaidError> {
    let (i, pos) = locate_by_pos(&raid.devices, start)?;
    raid.devices[i].finish(pos)
}

pub(super) fn close(raid: &RaidDevice, start: u64) -> Result<(), RaidError> {
    let (i, pos) = locate_by_pos(&raid.devices, start)?;
    raid.devices[i].close(pos)
}

pub(super) fn invalidate_cache(raid: &RaidDevice, pos: u64, size: u64) -> Result<(), RaidError> {
    let (i, pos) = locate_by_pos(&raid.devices, pos)?;
    raid.devices[i].invalidate_cache(pos, size)
}

pub(super) fn read(raid: &RaidDevice, buf: &mut [u8], size: usize, pos: u64, direct: bool) -> IoResult {
    let (i, dev_pos) = locate_by_pos(&raid.devices, pos)?;
    raid.devices[i].read(buf, size, dev_pos, direct)
}

pub(super) fn write(raid: &RaidDevice, data: &[u8], size: usize, pos: u64) -> IoResult {
    let (i, dev_pos) = locate_by_pos(&raid.devices, pos)?;
    raid.devices[i].write(data, size, dev_pos)
}

pub(super) fn is_swr(raid: &RaidDevice, idx: u32) -> Result<bool, RaidError> {
    let (i, idx) = locate_by_idx(&raid.devices, idx)?;
    raid.devices[i].is_swr(idx)
}

pub(super) fn is_offline(raid: &RaidDevice, idx: u32) -> Result<bool, RaidError> {
    let (i, idx) = locate_by_idx(&raid.devices, idx)?;
    raid.devices[i].is_offline(idx)
}

pub(super) fn is_writable(raid: &RaidDevice, idx: u32) -> Result<bool, RaidError> {
    let (i, idx) = locate_by_idx(&raid.devices, idx)?;
    raid.devices[i].is_writable(idx)
}

pub(super) fn is_active(raid: &RaidDevice, idx: u32) -> Result<bool, RaidError> {
    let (i, idx) = locate_by_idx(&raid.devices, idx)?;
    raid.devices[i].is_active(idx)
}

pub(super) fn is_open(raid: &RaidDevice, idx: u32) -> Result<bool, RaidError> {
    let (i, idx) = locate_by_idx(&raid.devices, idx)?;
    raid.devices[i].is_open(idx)
}

pub(super) fn zone_start(raid: &RaidDevice, idx: u32) -> Result<u64, RaidError> {
    let (i, idx) = locate_by_idx(&raid.devices, idx)?;
    let base: u64 = raid.devices[..i]
        .iter()
        .map(|d| d.geometry().nr_zones as u64 * d.geometry().zone_size)
        .sum();
    Ok(base + raid.devices[i].zone_start(idx)?)
}

pub(super) fn zone_max_capacity(raid: &RaidDevice, idx: u32) -> Result<u64, RaidError> {
    let (i, idx) = locate_by_idx(&raid.devices, idx)?;
    raid.devices[i].zone_max_capacity(idx)
}

pub(super) fn zone_wp(raid: &RaidDevice, idx: u32) -> Result<u64, RaidError> {
    let (i, idx) = locate_by_idx(&raid.devices, idx)?;
    let base: u64 = raid.devices[..i]
        .iter()
        .map(|d| d.geometry().nr_zones as u64 * d.geometry().zone_size)
        .sum();
    Ok(base + raid.devices[i].zone_wp(idx)?)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::backend::MockBackend;
    use crate::zone::Geometry;
    use crate::{Backend, RaidDevice, RaidMode};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// `spec.md` §4.3.1: a concatenated device's zone count and
        /// total byte capacity are the plain sum of its children's,
        /// whatever each child's own geometry happens to be (the one
        /// mode allowed to mix `zone_size`/`nr_zones` across children).
        #[test]
        fn concat_totalizes_children(
            block_log in 9u32..=12,
            zone_counts in prop::collection::vec(1u32..=6, 1..=5),
        ) {
            let block_size = 1u64 << block_log;
            let devices: Vec<Box<dyn Backend>> = zone_counts
                .iter()
                .enumerate()
                .map(|(i, &nr_zones)| {
                    let geom = Geometry {
                        block_size,
                        zone_size: block_size * 4,
                        nr_zones,
                    };
                    Box::new(MockBackend::new(format!("d{i}"), geom)) as Box<dyn Backend>
                })
                .collect();
            let mut dev = RaidDevice::new(RaidMode::Concat, devices).unwrap();
            dev.open(false, false).unwrap();

            let zones = dev.list_zones().unwrap();
            let expected_zones: u32 = zone_counts.iter().sum();
            let expected_capacity: u64 = zone_counts.iter().map(|&n| n as u64 * block_size * 4).sum();

            prop_assert_eq!(zones.len() as u32, expected_zones);
            let total_capacity: u64 = zones.iter().map(|z| z.capacity).sum();
            prop_assert_eq!(total_capacity, expected_capacity);
        }
    }
}
