//! Raid1 (mirror) mode (`spec.md` §4.3.2). Writes fan out identically
//! to every child; reads and state-changing ops retry across children.
//! Zone predicates and accessors are served by `devices[0]`, which is
//! correct under the geometry invariant.

use crate::backend::{Backend, IoResult, ResetResult};
use crate::error::RaidError;
use crate::zone::ZoneList;

use super::RaidDevice;

pub(super) fn list_zones(raid: &RaidDevice) -> Result<ZoneList, RaidError> {
    raid.devices[0].list_zones()
}

/// Resets every child at `start`. The reference source has an
/// inconsistent `Raid1` reset branch across its variants — some reset
/// every child, others reset only `devices[0]` twice, once more at
/// `start<<1` (a leftover from a single-device prototype). `spec.md`
/// §9 calls the latter a bug; this resets every child at `start`.
pub(super) fn reset(raid: &RaidDevice, start: u64) -> Result<ResetResult, RaidError> {
    let mut result = None;
    for d in &raid.devices {
        let r = d.reset(start)?;
        result.get_or_insert(r);
    }
    Ok(result.expect("raid1 device list is never empty"))
}

pub(super) fn finish(raid: &RaidDevice, start: u64) -> Result<(), RaidError> {
    for d in &raid.devices {
        d.finish(start)?;
    }
    Ok(())
}

pub(super) fn close(raid: &RaidDevice, start: u64) -> Result<(), RaidError> {
    for d in &raid.devices {
        d.close(start)?;
    }
    Ok(())
}

pub(super) fn invalidate_cache(raid: &RaidDevice, pos: u64, size: u64) -> Result<(), RaidError> {
    for d in &raid.devices {
        d.invalidate_cache(pos, size)?;
    }
    Ok(())
}

/// Reads from every child in order until one succeeds.
pub(super) fn read(raid: &RaidDevice, buf: &mut [u8], size: usize, pos: u64, direct: bool) -> IoResult {
    let mut last_err = None;
    for d in &raid.devices {
        match d.read(buf, size, pos, direct) {
            Ok(n) => return Ok(n),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.expect("raid1 device list is never empty"))
}

/// Fans an identical write out to every child; the first non-ok result
/// aborts and is returned (`spec.md` §4.3.2, §7 — no rollback of
/// already-successful mirrors is attempted).
pub(super) fn write(raid: &RaidDevice, data: &[u8], size: usize, pos: u64) -> IoResult {
    let mut transferred = None;
    for d in &raid.devices {
        let n = d.write(data, size, pos)?;
        transferred.get_or_insert(n);
    }
    Ok(transferred.expect("raid1 device list is never empty"))
}

pub(super) fn is_swr(raid: &RaidDevice, idx: u32) -> Result<bool, RaidError> {
    raid.devices[0].is_swr(idx)
}

pub(super) fn is_offline(raid: &RaidDevice, idx: u32) -> Result<bool, RaidError> {
    raid.devices[0].is_offline(idx)
}

pub(super) fn is_writable(raid: &RaidDevice, idx: u32) -> Result<bool, RaidError> {
    raid.devices[0].is_writable(idx)
}

pub(super) fn is_active(raid: &RaidDevice, idx: u32) -> Result<bool, RaidError> {
    raid.devices[0].is_active(idx)
}

pub(super) fn is_open(raid: &RaidDevice, idx: u32) -> Result<bool, RaidError> {
    raid.devices[0].is_open(idx)
}

pub(super) fn zone_start(raid: &RaidDevice, idx: u32) -> Result<u64, RaidError> {
    raid.devices[0].zone_start(idx)
}

pub(super) fn zone_max_capacity(raid: &RaidDevice, idx: u32) -> Result<u64, RaidError> {
    raid.devices[0].zone_max_capacity(idx)
}

pub(super) fn zone_wp(raid: &RaidDevice, idx: u32) -> Result<u64, RaidError> {
    raid.devices[0].zone_wp(idx)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use crate::backend::MockBackend;
    use crate::zone::Geometry;
    use crate::{Backend, RaidDevice, RaidMode};

    /// Builds an `n`-way mirror, returning both the assembled
    /// `RaidDevice` and a handle to each child so tests can inspect the
    /// raw bytes a child actually stored after dispatch.
    fn mirror(n: u32, geom: Geometry) -> (RaidDevice, Vec<Arc<MockBackend>>) {
        let handles: Vec<Arc<MockBackend>> = (0..n)
            .map(|i| Arc::new(MockBackend::new(format!("d{i}"), geom)))
            .collect();
        let devices: Vec<Box<dyn Backend>> = handles
            .iter()
            .cloned()
            .map(|h| Box::new(h) as Box<dyn Backend>)
            .collect();
        let mut dev = RaidDevice::new(RaidMode::Raid1, devices).unwrap();
        dev.open(false, false).unwrap();
        (dev, handles)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// `spec.md` §8 property 6: after any `Raid1` write, each child
        /// independently holds the same bytes.
        #[test]
        fn mirror_write_lands_identically_on_every_child(
            n in 1u32..=8,
            block_log in 9u32..=12,
            blocks in 1usize..=8,
        ) {
            let block_size = 1u64 << block_log;
            let geom = Geometry {
                block_size,
                zone_size: block_size * 16,
                nr_zones: 2,
            };
            let (dev, handles) = mirror(n, geom);
            let len = blocks * block_size as usize;
            let data: Vec<u8> = (0..len as u32).map(|i| (i % 211) as u8).collect();
            dev.write(&data, len, 0).unwrap();

            for h in &handles {
                prop_assert_eq!(h.raw_bytes_at(0, len), data.clone());
            }
        }
    }
}
