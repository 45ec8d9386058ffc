//! The Zone RAID Allocator (`spec.md` §4.2): owns the logical/physical
//! mapping and per-zone mode tables, and offers the allocation
//! primitives the Auto-RAID dispatcher uses.

mod persist;
mod types;

pub use persist::RaidInfoAppend;
pub use types::{MapEntry, ModeEntry};

use std::collections::HashMap;

use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::error::RaidError;
use crate::mode::RaidMode;

/// Guards `device_zone_map`, `device_zone_inv` and `mode_map`
/// (`spec.md` §5): a single coarse lock, never held across a child
/// I/O call.
struct Tables {
    /// Dense by sub-index, per the design note in `spec.md` §9
    /// preferring `Vec<Option<MapEntry>>` over a map for cache
    /// locality; grows on demand as logical zones are allocated.
    device_zone_map: Vec<Option<MapEntry>>,
    /// The reverse index is intrinsically keyed by a pair, so it stays
    /// a hash map.
    device_zone_inv: HashMap<(u32, u32), u32>,
    mode_map: HashMap<u32, ModeEntry>,
}

pub struct ZoneRaidAllocator {
    device_nr: u32,
    zone_nr: u32,
    meta_zones: u32,
    tables: Mutex<Tables>,
}

impl ZoneRaidAllocator {
    pub fn new(device_nr: u32, zone_nr: u32, meta_zones: u32) -> Self {
        Self {
            device_nr,
            zone_nr,
            meta_zones,
            tables: Mutex::new(Tables {
                device_zone_map: Vec::new(),
                device_zone_inv: HashMap::new(),
                mode_map: HashMap::new(),
            }),
        }
    }

    pub fn device_nr(&self) -> u32 {
        self.device_nr
    }

    pub fn zone_nr(&self) -> u32 {
        self.zone_nr
    }

    pub fn meta_zones(&self) -> u32 {
        self.meta_zones
    }

    /// Installs the reserved meta region (`spec.md` §3 "Reserved meta
    /// region"): logical zones `[0, meta_zones)` map 1:1 to physical
    /// zone `L` on every device, mode `None`. Called once, at mkfs
    /// time, before any other allocation.
    pub fn install_meta_region(&self) -> Result<(), RaidError> {
        for l in 0..self.meta_zones {
            for d in 0..self.device_nr {
                self.set_mapping(l * self.device_nr + d, d, l)?;
            }
            self.set_mode(l, RaidMode::None, 0);
        }
        debug!(
            "installed meta region: {} logical zone(s) across {} device(s)",
            self.meta_zones, self.device_nr
        );
        Ok(())
    }

    pub fn is_meta_zone(&self, zone_idx: u32) -> bool {
        zone_idx < self.meta_zones
    }

    /// Installs `(sub_idx) -> (dev, zone)`. Rejects a `(dev, zone)`
    /// pair that already appears as a valid entry (the spec notes the
    /// original source has no such check; this core adds it per
    /// `spec.md` §4.2).
    pub fn set_mapping(&self, sub_idx: u32, device_idx: u32, zone_idx: u32) -> Result<(), RaidError> {
        let mut tables = self.tables.lock();
        if let Some(&existing) = tables.device_zone_inv.get(&(device_idx, zone_idx)) {
            if existing != sub_idx {
                if let Some(Some(entry)) = tables.device_zone_map.get(existing as usize) {
                    if entry.is_valid() {
                        return Err(RaidError::AlreadyMapped {
                            device: device_idx,
                            existing_sub_idx: existing,
                        });
                    }
                }
            }
        }

        if tables.device_zone_map.len() <= sub_idx as usize {
            tables
                .device_zone_map
                .resize(sub_idx as usize + 1, None);
        }
        tables.device_zone_map[sub_idx as usize] = Some(MapEntry {
            device_idx,
            zone_idx,
            invalid: 0,
        });
        tables.device_zone_inv.insert((device_idx, zone_idx), sub_idx);
        trace!("set_mapping(sub_idx={sub_idx}, device={device_idx}, zone={zone_idx})");
        Ok(())
    }

    /// Marks a sub-index's mapping invalid (`invalid=1`); the slot
    /// stays in the table so it is never reused until a higher-level
    /// compaction rewrites the superblock (`spec.md` §3 Lifecycle).
    pub fn invalidate_mapping(&self, sub_idx: u32) {
        let mut tables = self.tables.lock();
        if let Some(Some(entry)) = tables.device_zone_map.get_mut(sub_idx as usize) {
            entry.invalid = 1;
            tables.device_zone_inv.remove(&(entry.device_idx, entry.zone_idx));
        }
    }

    pub fn get_mapping(&self, sub_idx: u32) -> Option<MapEntry> {
        self.tables
            .lock()
            .device_zone_map
            .get(sub_idx as usize)
            .copied()
            .flatten()
    }

    pub fn set_mode(&self, logical_zone: u32, mode: RaidMode, option: u32) {
        self.tables
            .lock()
            .mode_map
            .insert(logical_zone, ModeEntry { mode, option });
    }

    pub fn get_mode(&self, logical_zone: u32) -> Option<ModeEntry> {
        self.tables.lock().mode_map.get(&logical_zone).copied()
    }

    /// Lowest `j` in `[0, zone_nr)` such that `(device, j)` is not
    /// mapped. Meta-zone indices are never handed out to non-meta
    /// callers (`spec.md` §3 invariant 5): `skip_meta` should be `true`
    /// whenever the caller is allocating for a non-meta logical zone.
    pub fn free_zone_on_device(&self, device: u32, skip_meta: bool) -> Option<u32> {
        let tables = self.tables.lock();
        let start = if skip_meta { self.meta_zones } else { 0 };
        (start..self.zone_nr).find(|j| !tables.device_zone_inv.contains_key(&(device, *j)))
    }

    /// Lowest `i` in `[0, device_nr)` such that `(i, zone_idx)` is not
    /// mapped.
    pub fn free_device_for_zone(&self, zone_idx: u32) -> Option<u32> {
        let tables = self.tables.lock();
        (0..self.device_nr).find(|i| !tables.device_zone_inv.contains_key(&(*i, zone_idx)))
    }

    /// Allocates `device_nr` physical slots for logical zone `L`, one
    /// per device, at consecutive sub-indices `L*N..L*N+N-1`
    /// (`spec.md` §4.2). Sweeps physical zone indices in ascending
    /// order, assigning each zone index to the next unassigned device
    /// until every device is covered or the zone range is exhausted.
    /// Ties break by ascending device index, then ascending zone
    /// index, matching the reference allocator exactly.
    pub fn create_mapping(&self, logical_zone: u32) -> Result<(), RaidError> {
        let base = logical_zone * self.device_nr;
        let mut allocated = 0u32;

        loop {
            let mut made_progress = false;
            let mut zone = self.meta_zones;
            while zone < self.zone_nr && allocated < self.device_nr {
                if let Some(device) = self.free_device_for_zone(zone) {
                    self.set_mapping(base + allocated, device, zone)?;
                    allocated += 1;
                    made_progress = true;
                } else {
                    zone += 1;
                }
            }
            if !made_progress || allocated == self.device_nr {
                break;
            }
        }

        if allocated != self.device_nr {
            warn!(
                "create_mapping(L={logical_zone}): only {allocated}/{} slot(s) available",
                self.device_nr
            );
            return Err(RaidError::NoSpace {
                zone: logical_zone,
                needed: self.device_nr,
            });
        }
        Ok(())
    }

    pub fn snapshot(&self) -> RaidInfoAppend {
        persist::snapshot(self)
    }

    pub fn restore(&self, info: &RaidInfoAppend) -> Result<(), RaidError> {
        persist::restore(self, info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc(device_nr: u32, zone_nr: u32) -> ZoneRaidAllocator {
        ZoneRaidAllocator::new(device_nr, zone_nr, 0)
    }

    #[test]
    fn set_mapping_is_bijective() {
        let a = alloc(2, 4);
        a.set_mapping(0, 0, 1).unwrap();
        a.set_mapping(1, 1, 2).unwrap();
        assert_eq!(a.get_mapping(0).unwrap().zone_idx, 1);
        assert_eq!(
            a.free_zone_on_device(0, false),
            Some(0),
            "zone 0 on device 0 is still free"
        );
    }

    #[test]
    fn duplicate_physical_slot_rejected() {
        let a = alloc(2, 4);
        a.set_mapping(0, 0, 1).unwrap();
        let err = a.set_mapping(5, 0, 1).unwrap_err();
        assert!(matches!(err, RaidError::AlreadyMapped { .. }));
    }

    #[test]
    fn create_mapping_assigns_distinct_devices() {
        let a = alloc(4, 8);
        a.create_mapping(0).unwrap();
        for k in 0..4 {
            let entry = a.get_mapping(k).unwrap();
            assert_eq!(entry.device_idx, k);
            assert_eq!(entry.zone_idx, 0);
        }
        a.create_mapping(1).unwrap();
        for k in 0..4 {
            let entry = a.get_mapping(4 + k).unwrap();
            assert_eq!(entry.device_idx, k);
            assert_eq!(entry.zone_idx, 1);
        }
    }

    #[test]
    fn create_mapping_reports_no_space() {
        let a = alloc(4, 1);
        a.create_mapping(0).unwrap();
        let err = a.create_mapping(1).unwrap_err();
        assert!(matches!(err, RaidError::NoSpace { .. }));
    }

    #[test]
    fn meta_region_is_never_reassigned() {
        let a = ZoneRaidAllocator::new(3, 4, 2);
        a.install_meta_region().unwrap();
        for l in 0..2 {
            for d in 0..3 {
                let entry = a.get_mapping(l * 3 + d).unwrap();
                assert_eq!(entry.zone_idx, l);
                assert_eq!(entry.device_idx, d);
            }
            assert_eq!(a.get_mode(l).unwrap().mode, RaidMode::None);
        }
        // subsequent allocation must skip the meta zones.
        a.create_mapping(2).unwrap();
        for k in 0..3 {
            assert!(a.get_mapping(2 * 3 + k).unwrap().zone_idx >= 2);
        }
    }

    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// For any device count that fits the zone range at least once,
        /// a freshly created logical zone's `device_nr` slots land on
        /// `device_nr` distinct physical devices and never touch a meta
        /// zone (`spec.md` §3 invariants 4 and 5).
        #[test]
        fn create_mapping_always_uses_distinct_devices_outside_meta(
            device_nr in 1u32..=8,
            meta_zones in 0u32..=3,
            extra_zones in 1u32..=6,
        ) {
            let zone_nr = meta_zones + extra_zones;
            let a = ZoneRaidAllocator::new(device_nr, zone_nr, meta_zones);
            a.install_meta_region().unwrap();
            a.create_mapping(meta_zones).unwrap();

            let mut seen_devices = std::collections::HashSet::new();
            for k in 0..device_nr {
                let entry = a.get_mapping(meta_zones * device_nr + k).unwrap();
                prop_assert!(entry.zone_idx >= meta_zones, "allocation must skip the meta region");
                prop_assert!(seen_devices.insert(entry.device_idx), "device reused within one logical zone");
            }
        }
    }
}
