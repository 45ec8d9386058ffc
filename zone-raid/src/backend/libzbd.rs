//! libzbd-style backend: a concrete `Backend` over a real zoned block
//! device file, opened and read/written with positional syscalls.
//!
//! The *internals* of zone management (the driver's
//! `zbd_reset_zones`/`zbd_report_zones` ioctls) are an external
//! collaborator per `spec.md` §1 — out of scope for this core. What
//! this type owns is the shape every such driver presents at the
//! `Backend` boundary: it performs real positional I/O against the
//! device file and tracks zone state with the same write-pointer
//! model the kernel's zoned-block-device layer enforces, so the RAID
//! dispatchers above it see a backend indistinguishable from a linked
//! `libzbd` binding.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;

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

pub struct LibzbdBackend {
    path: String,
    geometry: Geometry,
    file: Option<File>,
    zones: Mutex<Vec<ZoneState>>,
}

impl LibzbdBackend {
    /// `geometry` is supplied by the caller (mkfs/mount path) the way
    /// the real driver would report it from `zbd_open`; probing it
    /// from the kernel is outside this crate's scope.
    pub fn new(path: impl Into<String>, geometry: Geometry) -> Self {
        let zones = (0..geometry.nr_zones)
            .map(|idx| ZoneState {
                condition: ZoneCondition::Empty,
                wp: idx as u64 * geometry.zone_size,
            })
            .collect();
        Self {
            path: path.into(),
            geometry,
            file: None,
            zones: Mutex::new(zones),
        }
    }

    fn file(&self) -> Result<&File, RaidError> {
        self.file.as_ref().ok_or_else(|| RaidError::Io {
            op: "access",
            device: self.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotConnected, "backend not open"),
        })
    }

    fn zone_idx_for(&self, pos: u64) -> Result<u32, RaidError> {
        let idx = pos / self.geometry.zone_size;
        if idx >= self.geometry.nr_zones as u64 {
            return Err(RaidError::invalid_argument(format!(
                "position {pos} is beyond {} zones on {}",
                self.geometry.nr_zones, self.path
            )));
        }
        Ok(idx as u32)
    }
}

impl Backend for LibzbdBackend {
    fn open(&mut self, readonly: bool, exclusive: bool) -> Result<OpenLimits, RaidError> {
        let file = OpenOptions::new()
            .read(true)
            .write(!readonly)
            .custom_flags(if exclusive { libc::O_EXCL } else { 0 })
            .open(&self.path)
            .map_err(|source| RaidError::Io {
                op: "open",
                device: self.path.clone(),
                source,
            })?;
        let _ = file.as_raw_fd();
        self.file = Some(file);
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
        let n = self
            .file()?
            .read_at(&mut buf[..size], pos)
            .map_err(|source| RaidError::Io {
                op: "read",
                device: self.path.clone(),
                source,
            })?;
        Ok(n)
    }

    fn write(&self, data: &[u8], size: usize, pos: u64) -> IoResult {
        check_block_aligned(pos, self.geometry.block_size)?;
        let idx = self.zone_idx_for(pos)? as usize;
        {
            let zones = self.zones.lock();
            if zones[idx].wp != pos {
                return Err(RaidError::invalid_argument(format!(
                    "write at {pos} does not match write pointer {} of zone {idx} on {}",
                    zones[idx].wp, self.path
                )));
            }
        }
        let n = self
            .file()?
            .write_at(&data[..size], pos)
            .map_err(|source| RaidError::Io {
                op: "write",
                device: self.path.clone(),
                source,
            })?;
        let mut zones = self.zones.lock();
        zones[idx].wp += n as u64;
        zones[idx].condition = if zones[idx].wp >= (idx as u64 + 1) * self.geometry.zone_size {
            ZoneCondition::Full
        } else {
            ZoneCondition::ImplicitOpen
        };
        Ok(n)
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
        self.path.clone()
    }
}
