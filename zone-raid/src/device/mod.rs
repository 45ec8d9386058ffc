//! The RAID Device (`spec.md` §4): a [`Backend`] composed from other
//! backends, dispatching every call to the mode-specific translation.
//!
//! `RaidDevice` itself never grows a subclass per mode (the reference
//! source's virtual-dispatch hierarchy); instead it carries a
//! [`RaidMode`] tag and matches on it, delegating to the free functions
//! in [`concat`], [`raid0`], [`raid1`] and [`auto`] (`spec.md` §9
//! Design Note).

mod auto;
mod concat;
mod raid0;
mod raid1;
pub(crate) mod split;

use log::info;

use crate::allocator::ZoneRaidAllocator;
use crate::backend::{Backend, IoResult, OpenLimits, ResetResult};
use crate::config::RaidDeviceConfig;
use crate::error::RaidError;
use crate::mode::RaidMode;
use crate::zone::{Geometry, ZoneList};

pub struct RaidDevice {
    pub(crate) devices: Vec<Box<dyn Backend>>,
    mode: RaidMode,
    meta_zones: u32,
    allocator: Option<ZoneRaidAllocator>,
}

impl RaidDevice {
    /// Builds a fixed-mode device (`None`, `Concat`, `Raid1` or
    /// `Raid0`). Use [`RaidDevice::new_auto`] for `Auto`.
    pub fn new(mode: RaidMode, devices: Vec<Box<dyn Backend>>) -> Result<Self, RaidError> {
        mode.check_implemented()?;
        if mode == RaidMode::Auto {
            return Err(RaidError::invalid_argument(
                "Auto mode requires an allocator; use RaidDevice::new_auto",
            ));
        }
        if devices.is_empty() {
            return Err(RaidError::invalid_argument("a RAID device needs at least one child"));
        }
        if mode == RaidMode::None && devices.len() != 1 {
            return Err(RaidError::invalid_argument(
                "None mode passes a single device through unmodified; got more than one child",
            ));
        }
        Ok(Self {
            devices,
            mode,
            meta_zones: 0,
            allocator: None,
        })
    }

    /// Builds an Auto-RAID device (`spec.md` §4.3.4) and installs the
    /// reserved meta region across every child.
    pub fn new_auto(devices: Vec<Box<dyn Backend>>, meta_zones: u32) -> Result<Self, RaidError> {
        if devices.is_empty() {
            return Err(RaidError::invalid_argument("a RAID device needs at least one child"));
        }
        let zone_nr = devices[0].geometry().nr_zones;
        let allocator = ZoneRaidAllocator::new(devices.len() as u32, zone_nr, meta_zones);
        allocator.install_meta_region()?;
        Ok(Self {
            devices,
            mode: RaidMode::Auto,
            meta_zones,
            allocator: Some(allocator),
        })
    }

    /// Builds a `RaidDevice` from an already-parsed [`RaidDeviceConfig`]
    /// (`spec.md` §6: the enclosing CLI populates this after parsing
    /// `--raids=<spec>`); dispatches to [`RaidDevice::new`] or
    /// [`RaidDevice::new_auto`] by `config.main_mode`. The config's
    /// `readonly`/`exclusive` flags are not applied here — they are
    /// forwarded by the caller's own `open()` call, matching every
    /// other constructor in this module, which never opens its
    /// children implicitly.
    pub fn from_config(config: RaidDeviceConfig, devices: Vec<Box<dyn Backend>>) -> Result<Self, RaidError> {
        if config.main_mode == RaidMode::Auto {
            Self::new_auto(devices, config.meta_zones)
        } else {
            Self::new(config.main_mode, devices)
        }
    }

    pub fn mode(&self) -> RaidMode {
        self.mode
    }

    pub fn meta_zones(&self) -> u32 {
        self.meta_zones
    }

    fn allocator(&self) -> &ZoneRaidAllocator {
        self.allocator
            .as_ref()
            .expect("allocator-backed dispatch is only reached in Auto mode")
    }

    /// Allocates `device_nr` physical slots for logical zone `L`
    /// (`spec.md` §4.2) and assigns it the default striped sub-mode.
    /// Auto mode only.
    pub fn allocate(&self, logical_zone: u32) -> Result<(), RaidError> {
        if self.mode != RaidMode::Auto {
            return Err(RaidError::invalid_argument(
                "allocate is only meaningful in Auto mode",
            ));
        }
        let allocator = self.allocator();
        allocator.create_mapping(logical_zone)?;
        allocator.set_mode(logical_zone, RaidMode::Raid0, 0);
        Ok(())
    }

    /// Every child must agree on block size, zone size and zone count
    /// (`spec.md` §3 invariant 1). Checked once, at open time.
    fn check_geometry_agreement(&self) -> Result<(), RaidError> {
        let first = self.devices[0].geometry();
        for d in &self.devices[1..] {
            let g = d.geometry();
            // Concat only needs a shared block size; the per-device zone
            // layout is free to differ (`spec.md` §3 invariant 1).
            let agrees = if self.mode == RaidMode::Concat {
                g.block_size == first.block_size
            } else {
                g.matches(&first)
            };
            if !agrees {
                return Err(RaidError::invalid_argument(format!(
                    "child device {} geometry does not match device 0 ({:?} != {:?})",
                    d.filename(),
                    g,
                    first
                )));
            }
        }
        Ok(())
    }
}

impl Backend for RaidDevice {
    fn open(&mut self, readonly: bool, exclusive: bool) -> Result<OpenLimits, RaidError> {
        let mut limits = None;
        for d in &mut self.devices {
            let l = d.open(readonly, exclusive)?;
            limits.get_or_insert(l);
        }
        self.check_geometry_agreement()?;
        info!(
            "opened {} mode RAID device over {} child device(s)",
            self.mode,
            self.devices.len()
        );
        Ok(limits.expect("a RAID device always has at least one child"))
    }

    fn geometry(&self) -> Geometry {
        let first = self.devices[0].geometry();
        match self.mode {
            RaidMode::Concat => Geometry {
                block_size: first.block_size,
                zone_size: first.zone_size,
                nr_zones: self.devices.iter().map(|d| d.geometry().nr_zones).sum(),
            },
            RaidMode::Raid0 | RaidMode::Auto => Geometry {
                block_size: first.block_size,
                zone_size: first.zone_size * self.devices.len() as u64,
                nr_zones: first.nr_zones,
            },
            RaidMode::Raid1 | RaidMode::None => first,
            _ => first,
        }
    }

    fn list_zones(&self) -> Result<ZoneList, RaidError> {
        match self.mode {
            RaidMode::None => self.devices[0].list_zones(),
            RaidMode::Concat => concat::list_zones(self),
            RaidMode::Raid1 => raid1::list_zones(self),
            RaidMode::Raid0 => raid0::list_zones(self),
            RaidMode::Auto => auto::list_zones(self),
            other => Err(RaidError::Unsupported { mode: other.as_str().to_string() }),
        }
    }

    fn reset(&self, start: u64) -> Result<ResetResult, RaidError> {
        match self.mode {
            RaidMode::None => self.devices[0].reset(start),
            RaidMode::Concat => concat::reset(self, start),
            RaidMode::Raid1 => raid1::reset(self, start),
            RaidMode::Raid0 => raid0::reset(self, start),
            RaidMode::Auto => auto::reset(self, start),
            other => Err(RaidError::Unsupported { mode: other.as_str().to_string() }),
        }
    }

    fn finish(&self, start: u64) -> Result<(), RaidError> {
        match self.mode {
            RaidMode::None => self.devices[0].finish(start),
            RaidMode::Concat => concat::finish(self, start),
            RaidMode::Raid1 => raid1::finish(self, start),
            RaidMode::Raid0 => raid0::finish(self, start),
            RaidMode::Auto => auto::finish(self, start),
            other => Err(RaidError::Unsupported { mode: other.as_str().to_string() }),
        }
    }

    fn close(&self, start: u64) -> Result<(), RaidError> {
        match self.mode {
            RaidMode::None => self.devices[0].close(start),
            RaidMode::Concat => concat::close(self, start),
            RaidMode::Raid1 => raid1::close(self, start),
            RaidMode::Raid0 => raid0::close(self, start),
            RaidMode::Auto => auto::close(self, start),
            other => Err(RaidError::Unsupported { mode: other.as_str().to_string() }),
        }
    }

    fn read(&self, buf: &mut [u8], size: usize, pos: u64, direct: bool) -> IoResult {
        match self.mode {
            RaidMode::None => self.devices[0].read(buf, size, pos, direct),
            RaidMode::Concat => concat::read(self, buf, size, pos, direct),
            RaidMode::Raid1 => raid1::read(self, buf, size, pos, direct),
            RaidMode::Raid0 => raid0::read(self, buf, size, pos, direct),
            RaidMode::Auto => auto::read(self, buf, size, pos, direct),
            other => Err(RaidError::Unsupported { mode: other.as_str().to_string() }),
        }
    }

    fn write(&self, data: &[u8], size: usize, pos: u64) -> IoResult {
        match self.mode {
            RaidMode::None => self.devices[0].write(data, size, pos),
            RaidMode::Concat => concat::write(self, data, size, pos),
            RaidMode::Raid1 => raid1::write(self, data, size, pos),
            RaidMode::Raid0 => raid0::write(self, data, size, pos),
            RaidMode::Auto => auto::write(self, data, size, pos),
            other => Err(RaidError::Unsupported { mode: other.as_str().to_string() }),
        }
    }

    fn invalidate_cache(&self, pos: u64, size: u64) -> Result<(), RaidError> {
        match self.mode {
            RaidMode::None => self.devices[0].invalidate_cache(pos, size),
            RaidMode::Concat => concat::invalidate_cache(self, pos, size),
            RaidMode::Raid1 => raid1::invalidate_cache(self, pos, size),
            RaidMode::Raid0 => raid0::invalidate_cache(self, pos, size),
            RaidMode::Auto => auto::invalidate_cache(self, pos, size),
            other => Err(RaidError::Unsupported { mode: other.as_str().to_string() }),
        }
    }

    fn is_swr(&self, idx: u32) -> Result<bool, RaidError> {
        match self.mode {
            RaidMode::None => self.devices[0].is_swr(idx),
            RaidMode::Concat => concat::is_swr(self, idx),
            RaidMode::Raid1 => raid1::is_swr(self, idx),
            RaidMode::Raid0 => raid0::is_swr(self, idx),
            RaidMode::Auto => auto::is_swr(self, idx),
            other => Err(RaidError::Unsupported { mode: other.as_str().to_string() }),
        }
    }

    fn is_offline(&self, idx: u32) -> Result<bool, RaidError> {
        match self.mode {
            RaidMode::None => self.devices[0].is_offline(idx),
            RaidMode::Concat => concat::is_offline(self, idx),
            RaidMode::Raid1 => raid1::is_offline(self, idx),
            RaidMode::Raid0 => raid0::is_offline(self, idx),
            RaidMode::Auto => auto::is_offline(self, idx),
            other => Err(RaidError::Unsupported { mode: other.as_str().to_string() }),
        }
    }

    fn is_writable(&self, idx: u32) -> Result<bool, RaidError> {
        match self.mode {
            RaidMode::None => self.devices[0].is_writable(idx),
            RaidMode::Concat => concat::is_writable(self, idx),
            RaidMode::Raid1 => raid1::is_writable(self, idx),
            RaidMode::Raid0 => raid0::is_writable(self, idx),
            RaidMode::Auto => auto::is_writable(self, idx),
            other => Err(RaidError::Unsupported { mode: other.as_str().to_string() }),
        }
    }

    fn is_active(&self, idx: u32) -> Result<bool, RaidError> {
        match self.mode {
            RaidMode::None => self.devices[0].is_active(idx),
            RaidMode::Concat => concat::is_active(self, idx),
            RaidMode::Raid1 => raid1::is_active(self, idx),
            RaidMode::Raid0 => raid0::is_active(self, idx),
            RaidMode::Auto => auto::is_active(self, idx),
            other => Err(RaidError::Unsupported { mode: other.as_str().to_string() }),
        }
    }

    fn is_open(&self, idx: u32) -> Result<bool, RaidError> {
        match self.mode {
            RaidMode::None => self.devices[0].is_open(idx),
            RaidMode::Concat => concat::is_open(self, idx),
            RaidMode::Raid1 => raid1::is_open(self, idx),
            RaidMode::Raid0 => raid0::is_open(self, idx),
            RaidMode::Auto => auto::is_open(self, idx),
            other => Err(RaidError::Unsupported { mode: other.as_str().to_string() }),
        }
    }

    fn zone_start(&self, idx: u32) -> Result<u64, RaidError> {
        match self.mode {
            RaidMode::None => self.devices[0].zone_start(idx),
            RaidMode::Concat => concat::zone_start(self, idx),
            RaidMode::Raid1 => raid1::zone_start(self, idx),
            RaidMode::Raid0 => raid0::zone_start(self, idx),
            RaidMode::Auto => auto::zone_start(self, idx),
            other => Err(RaidError::Unsupported { mode: other.as_str().to_string() }),
        }
    }

    fn zone_max_capacity(&self, idx: u32) -> Result<u64, RaidError> {
        match self.mode {
            RaidMode::None => self.devices[0].zone_max_capacity(idx),
            RaidMode::Concat => concat::zone_max_capacity(self, idx),
            RaidMode::Raid1 => raid1::zone_max_capacity(self, idx),
            RaidMode::Raid0 => raid0::zone_max_capacity(self, idx),
            RaidMode::Auto => auto::zone_max_capacity(self, idx),
            other => Err(RaidError::Unsupported { mode: other.as_str().to_string() }),
        }
    }

    fn zone_wp(&self, idx: u32) -> Result<u64, RaidError> {
        match self.mode {
            RaidMode::None => self.devices[0].zone_wp(idx),
            RaidMode::Concat => concat::zone_wp(self, idx),
            RaidMode::Raid1 => raid1::zone_wp(self, idx),
            RaidMode::Raid0 => raid0::zone_wp(self, idx),
            RaidMode::Auto => auto::zone_wp(self, idx),
            other => Err(RaidError::Unsupported { mode: other.as_str().to_string() }),
        }
    }

    fn filename(&self) -> String {
        let names: Vec<String> = self.devices.iter().map(|d| d.filename()).collect();
        format!("{}:{}", self.mode, names.join(","))
    }
}
