//! In-memory `Backend` used by every unit and integration test. Models
//! a single zoned device with `nr_zones` sequential zones of
//! `zone_size` bytes, `block_size`-aligned I/O, and a write pointer per
//! zone enforcing the ZBD invariant that writes land exactly at the
//! current write pointer.

use parking_lot::Mutex;

use crate::backend::{
    check_block_aligned, check_zone_aligned, Backend, IoResult, OpenLimits, ResetResult,
};
use crate::error::RaidError;
use crate::zone::{Geometry, Zone, ZoneCondition, ZoneList, ZoneType};

struct ZoneState {
    condition: ZoneCondition,
    wp: u64,
}

pub struct MockBackend {
    name: String,
    geometry: Geometry,
    data: Mutex<Vec<u8>>,
    zones: Mutex<Vec<ZoneState>>,
}

impl MockBackend {
    pub fn new(name: impl Into<String>, geometry: Geometry) -> Self {
        let total = geometry.zone_size * geometry.nr_zones as u64;
        let zones = (0..geometry.nr_zones)
            .map(|idx| ZoneState {
                condition: ZoneCondition::Empty,
                wp: idx as u64 * geometry.zone_size,
            })
            .collect();
        Self {
            name: name.into(),
            geometry,
            data: Mutex::new(vec![0u8; total as usize]),
            zones: Mutex::new(zones),
        }
    }

    fn zone_idx_for(&self, pos: u64) -> Result<u32, RaidError> {
        let idx = pos / self.geometry.zone_size;
        if idx >= self.geometry.nr_zones as u64 {
            return Err(RaidError::invalid_argument(format!(
                "position {pos} is beyond {} zones",
                self.geometry.nr_zones
            )));
        }
        Ok(idx as u32)
    }

    /// Directly read back the whole in-memory arena; only used by
    /// tests asserting mirror/stripe placement.
    #[cfg(test)]
    pub(crate) fn raw_bytes_at(&self, pos: u64, len: usize) -> Vec<u8> {
        let data = self.data.lock();
        data[pos as usize..pos as usize + len].to_vec()
    }

    /// `&self` counterpart of `open`, for the `Arc<MockBackend>` test
    /// wrapper below: `open` never mutates geometry or zone state, so
    /// there is nothing an exclusive borrow would protect here.
    #[cfg(test)]
    fn open_shared(&self, _readonly: bool, _exclusive: bool) -> Result<OpenLimits, RaidError> {
        Ok(OpenLimits {
            max_active_zones: self.geometry.nr_zones,
            max_open_zones: self.geometry.nr_zones,
        })
    }
}

impl Backend for MockBackend {
    fn open(&mut self, _readonly: bool, _exclusive: bool) -> Result<OpenLimits, RaidError> {
        Ok(OpenLimits {
            max_active_zones: self.geometry.nr_zones,
            max_open_zones: self.geometry.nr_zones,
        })
    }

    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn list_zones(&self) -> Result<ZoneList, RaidError> {
        let zones = self.zones.lock();
        Ok(zones
            .iter()
            .enumerate()
            .map(|(idx, z)| Zone {
                start: idx as u64 * self.geometry.zone_size,
                capacity: self.geometry.zone_size,
                length: self.geometry.zone_size,
                write_pointer: z.wp,
                zone_type: ZoneType::SequentialRequired,
                condition: z.condition,
            })
            .collect())
    }

    fn reset(&self, start: u64) -> Result<ResetResult, RaidError> {
        check_zone_aligned(start, self.geometry.zone_size)?;
        let idx = self.zone_idx_for(start)? as usize;
        let mut zones = self.zones.lock();
        zones[idx].condition = ZoneCondition::Empty;
        zones[idx].wp = start;
        Ok(ResetResult {
            offline: false,
            max_capacity: self.geometry.zone_size,
        })
    }

    fn finish(&self, start: u64) -> Result<(), RaidError> {
        check_zone_aligned(start, self.geometry.zone_size)?;
        let idx = self.zone_idx_for(start)? as usize;
        let mut zones = self.zones.lock();
        zones[idx].condition = ZoneCondition::Full;
        zones[idx].wp = start + self.geometry.zone_size;
        Ok(())
    }

    fn close(&self, start: u64) -> Result<(), RaidError> {
        check_zone_aligned(start, self.geometry.zone_size)?;
        let idx = self.zone_idx_for(start)? as usize;
        let mut zones = self.zones.lock();
        if zones[idx].condition.is_open() {
            zones[idx].condition = ZoneCondition::Closed;
        }
        Ok(())
    }

    fn read(&self, buf: &mut [u8], size: usize, pos: u64, _direct: bool) -> IoResult {
        check_block_aligned(pos, self.geometry.block_size)?;
        self.zone_idx_for(pos)?;
        let data = self.data.lock();
        let end = (pos as usize + size).min(data.len());
        let len = end.saturating_sub(pos as usize);
        buf[..len].copy_from_slice(&data[pos as usize..end]);
        Ok(len)
    }

    fn write(&self, data_in: &[u8], size: usize, pos: u64) -> IoResult {
        check_block_aligned(pos, self.geometry.block_size)?;
        let idx = self.zone_idx_for(pos)? as usize;
        let mut zones = self.zones.lock();
        if zones[idx].wp != pos {
            return Err(RaidError::invalid_argument(format!(
                "write at {pos} does not match write pointer {} of zone {idx}",
                zones[idx].wp
            )));
        }
        let mut data = self.data.lock();
        data[pos as usize..pos as usize + size].copy_from_slice(&data_in[..size]);
        zones[idx].wp += size as u64;
        zones[idx].condition = if zones[idx].wp >= (idx as u64 + 1) * self.geometry.zone_size {
            ZoneCondition::Full
        } else {
            ZoneCondition::ImplicitOpen
        };
        Ok(size)
    }

    fn invalidate_cache(&self, pos: u64, size: u64) -> Result<(), RaidError> {
        check_block_aligned(pos, self.geometry.block_size)?;
        check_block_aligned(size, self.geometry.block_size)?;
        Ok(())
    }

    fn is_swr(&self, _idx: u32) -> Result<bool, RaidError> {
        Ok(true)
    }

    fn is_offline(&self, idx: u32) -> Result<bool, RaidError> {
        Ok(self.zones.lock()[idx as usize].condition == ZoneCondition::Offline)
    }

    fn is_writable(&self, idx: u32) -> Result<bool, RaidError> {
        Ok(self.zones.lock()[idx as usize].condition.is_writable())
    }

    fn is_active(&self, idx: u32) -> Result<bool, RaidError> {
        Ok(self.zones.lock()[idx as usize].condition.is_active())
    }

    fn is_open(&self, idx: u32) -> Result<bool, RaidError> {
        Ok(self.zones.lock()[idx as usize].condition.is_open())
    }

    fn zone_start(&self, idx: u32) -> Result<u64, RaidError> {
        Ok(idx as u64 * self.geometry.zone_size)
    }

    fn zone_max_capacity(&self, _idx: u32) -> Result<u64, RaidError> {
        Ok(self.geometry.zone_size)
    }

    fn zone_wp(&self, idx: u32) -> Result<u64, RaidError> {
        Ok(self.zones.lock()[idx as usize].wp)
    }

    fn filename(&self) -> String {
        self.name.clone()
    }
}

/// Lets a test keep its own handle to a `MockBackend` after handing a
/// `Box<dyn Backend>` to a `RaidDevice`, so it can inspect the child's
/// raw bytes post-dispatch (e.g. mirror-identity checks). `open` never
/// touches `self` so the borrow is trivially satisfied through the
/// shared `Arc`.
#[cfg(test)]
impl Backend for std::sync::Arc<MockBackend> {
    fn open(&mut self, readonly: bool, exclusive: bool) -> Result<OpenLimits, RaidError> {
        (**self).open_shared(readonly, exclusive)
    }

    fn geometry(&self) -> Geometry {
        (**self).geometry()
    }

    fn list_zones(&self) -> Result<ZoneList, RaidError> {
        (**self).list_zones()
    }

    fn reset(&self, start: u64) -> Result<ResetResult, RaidError> {
        (**self).reset(start)
    }

    fn finish(&self, start: u64) -> Result<(), RaidError> {
        (**self).finish(start)
    }

    fn close(&self, start: u64) -> Result<(), RaidError> {
        (**self).close(start)
    }

    fn read(&self, buf: &mut [u8], size: usize, pos: u64, direct: bool) -> IoResult {
        (**self).read(buf, size, pos, direct)
    }

    fn write(&self, data: &[u8], size: usize, pos: u64) -> IoResult {
        (**self).write(data, size, pos)
    }

    fn invalidate_cache(&self, pos: u64, size: u64) -> Result<(), RaidError> {
        (**self).invalidate_cache(pos, size)
    }

    fn is_swr(&self, idx: u32) -> Result<bool, RaidError> {
        (**self).is_swr(idx)
    }

    fn is_offline(&self, idx: u32) -> Result<bool, RaidError> {
        (**self).is_offline(idx)
    }

    fn is_writable(&self, idx: u32) -> Result<bool, RaidError> {
        (**self).is_writable(idx)
    }

    fn is_active(&self, idx: u32) -> Result<bool, RaidError> {
        (**self).is_active(idx)
    }

    fn is_open(&self, idx: u32) -> Result<bool, RaidError> {
        (**self).is_open(idx)
    }

    fn zone_start(&self, idx: u32) -> Result<u64, RaidError> {
        (**self).zone_start(idx)
    }

    fn zone_max_capacity(&self, idx: u32) -> Result<u64, RaidError> {
        (**self).zone_max_capacity(idx)
    }

    fn zone_wp(&self, idx: u32) -> Result<u64, RaidError> {
        (**self).zone_wp(idx)
    }

    fn filename(&self) -> String {
        (**self).filename()
    }
}
