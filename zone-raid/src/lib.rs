//! RAID virtualization over zoned block devices.
//!
//! A [`device::RaidDevice`] fans a single logical zoned device out over
//! one or more physical [`backend::Backend`]s according to a
//! [`mode::RaidMode`]: device concatenation, mirroring, striping, or
//! (in `Auto` mode) a per-zone allocator-driven mix of the two. See
//! `SPEC_FULL.md` for the full module breakdown.

pub mod allocator;
pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod info;
pub mod mode;
pub mod uri;
pub mod zone;

pub use allocator::{MapEntry, ModeEntry, RaidInfoAppend, ZoneRaidAllocator};
pub use backend::{Backend, IoResult, OpenLimits, ReadFragment, ResetResult};
pub use config::{RaidDeviceConfig, META_ZONES};
pub use device::RaidDevice;
pub use error::RaidError;
pub use info::RaidInfoBasic;
pub use mode::RaidMode;
pub use uri::{parse as parse_raid_spec, DevRef, RaidSpec};
pub use zone::{Geometry, Zone, ZoneCondition, ZoneList, ZoneType};
