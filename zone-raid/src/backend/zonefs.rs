//! ZoneFS-style backend: each zone is exposed as one file
//! (`<mount>/seq/<idx>`), and the file's length stands in for the
//! write pointer the way the real `zonefs` kernel driver does. As with
//! [`super::libzbd`], the driver's own internals are out of scope
//! (`spec.md` §1); this type only needs to present the `Backend`
//! surface that a linked ZoneFS driver would.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::backend::{
    check_block_aligned, check_zone_aligned, Backend, IoResult, OpenLimits, ResetResult,
};
use crate::error::RaidError;
use crate::zone::{Geometry, Zone, ZoneCondition, ZoneList, ZoneType};

struct ZoneHandle {
    file: File,
    condition: ZoneCondition,
    wp: u64,
}

pub struct ZonefsBackend {
    mount_path: String,
    geometry: Geometry,
    zones: Mutex<Vec<ZoneHandle>>,
}

impl ZonefsBackend {
    fn zone_path(mount_path: &str, idx: u32) -> PathBuf {
        PathBuf::from(mount_path).join("seq").join(idx.to_string())
    }

    /// Opens (creating if necessary) the per-zone files under
    /// `<mount_path>/seq/`. A real ZoneFS mount would already have
    /// these files present; tests create a plain directory tree
    /// instead of mounting anything.
    pub fn new(mount_path: impl Into<String>, geometry: Geometry) -> Result<Self, RaidError> {
        let mount_path = mount_path.into();
        let seq_dir = PathBuf::from(&mount_path).join("seq");
        fs::create_dir_all(&seq_dir).map_err(|source| RaidError::Io {
            op: "create_dir_all",
            device: mount_path.clone(),
            source,
        })?;

        let mut zones = Vec::with_capacity(geometry.nr_zones as usize);
        for idx in 0..geometry.nr_zones {
            let path = Self::zone_path(&mount_path, idx);
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)
                .map_err(|source| RaidError::Io {
                    op: "open",
                    device: path.display().to_string(),
                    source,
                })?;
            file.set_len(geometry.zone_size)
                .map_err(|source| RaidError::Io {
                    op: "set_len",
                    device: path.display().to_string(),
                    source,
                })?;
            zones.push(ZoneHandle {
                file,
                condition: ZoneCondition::Empty,
                wp: 0,
            });
        }

        Ok(Self {
            mount_path,
            geometry,
            zones: Mutex::new(zones),
        })
    }

    fn zone_idx_for(&self, pos: u64) -> Result<u32, RaidError> {
        let idx = pos / self.geometry.zone_size;
        if idx >= self.geometry.nr_zones as u64 {
            return Err(RaidError::invalid_argument(format!(
                "position {pos} is beyond {} zones on {}",
                self.geometry.nr_zones, self.mount_path
            )));
        }
        Ok(idx as u32)
    }
}

impl Backend for ZonefsBackend {
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
                write_pointer: idx as u64 * self.geometry.zone_size + z.wp,
                zone_type: ZoneType::SequentialRequired,
                condition: z.condition,
            })
            .collect())
    }

    fn reset(&self, start: u64) -> Result<ResetResult, RaidError> {
        check_zone_aligned(start, self.geometry.zone_size)?;
        let idx = self.zone_idx_for(start)? as usize;
        let mut zones = self.zones.lock();
        zones[idx].wp = 0;
        zones[idx].condition = ZoneCondition::Empty;
        Ok(ResetResult {
            offline: false,
            max_capacity: self.geometry.zone_size,
        })
    }

    fn finish(&self, start: u64) -> Result<(), RaidError> {
        check_zone_aligned(start, self.geometry.zone_size)?;
        let idx = self.zone_idx_for(start)? as usize;
        let mut zones = self.zones.lock();
        zones[idx].wp = self.geometry.zone_size;
        zones[idx].condition = ZoneCondition::Full;
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
        let idx = self.zone_idx_for(pos)? as usize;
        let offset_in_zone = pos - idx as u64 * self.geometry.zone_size;
        let zones = self.zones.lock();
        let n = zones[idx]
            .file
            .read_at(&mut buf[..size], offset_in_zone)
            .map_err(|source| RaidError::Io {
                op: "read",
                device: self.mount_path.clone(),
                source,
            })?;
        Ok(n)
    }

    fn write(&self, data: &[u8], size: usize, pos: u64) -> IoResult {
        check_block_aligned(pos, self.geometry.block_size)?;
        let idx = self.zone_idx_for(pos)? as usize;
        let offset_in_zone = pos - idx as u64 * self.geometry.zone_size;
        let mut zones = self.zones.lock();
        if zones[idx].wp != offset_in_zone {
            return Err(RaidError::invalid_argument(format!(
                "write at {pos} does not match write pointer of zone {idx} on {}",
                self.mount_path
            )));
        }
        let n = zones[idx]
            .file
            .write_at(&data[..size], offset_in_zone)
            .map_err(|source| RaidError::Io {
                op: "write",
                device: self.mount_path.clone(),
                source,
            })?;
        zones[idx].file.flush().ok();
        zones[idx].wp += n as u64;
        zones[idx].condition = if zones[idx].wp >= self.geometry.zone_size {
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
        let zones = self.zones.lock();
        Ok(idx as u64 * self.geometry.zone_size + zones[idx as usize].wp)
    }

    fn filename(&self) -> String {
        self.mount_path.clone()
    }
}
