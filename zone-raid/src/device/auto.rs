//! Auto mode (`spec.md` §4.3.4): the device reports striped geometry
//! but resolves every access through the allocator. Each touched
//! logical zone's effective sub-mode is looked up in `mode_map`, then
//! dispatched with the Raid0/Raid1/None rules of §4.3, using the
//! physical slots recorded at `device_zone_map[L*N+k]` instead of a
//! closed-form positional translation.

use crate::allocator::MapEntry;
use crate::backend::{Backend, IoResult, ReadFragment, ResetResult};
use crate::error::RaidError;
use crate::mode::RaidMode;
use crate::zone::{Zone, ZoneCondition, ZoneList, ZoneType};

use super::RaidDevice;

fn n(raid: &RaidDevice) -> u32 {
    raid.devices.len() as u32
}

fn logical_zone_size(raid: &RaidDevice) -> u64 {
    raid.devices[0].geometry().zone_size * n(raid) as u64
}

fn zone_and_offset(raid: &RaidDevice, pos: u64) -> (u32, u64) {
    let size = logical_zone_size(raid);
    ((pos / size) as u32, pos % size)
}

/// The effective sub-mode for `L`: the default assigned by
/// [`super::RaidDevice::allocate`] is `Raid0` (striped); zones with no
/// mode entry yet (never allocated) are reported as such by the caller
/// before any positional op is attempted.
fn effective_mode(raid: &RaidDevice, l: u32) -> Result<RaidMode, RaidError> {
    raid.allocator()
        .get_mode(l)
        .map(|e| e.mode)
        .ok_or_else(|| {
            RaidError::invalid_argument(format!("logical zone {l} has not been allocated"))
        })
}

/// The `N` slot mappings for logical zone `L`, in ascending slot-index
/// (`k`) order.
fn slots(raid: &RaidDevice, l: u32) -> Result<Vec<MapEntry>, RaidError> {
    let nn = n(raid);
    (0..nn)
        .map(|k| {
            raid.allocator().get_mapping(l * nn + k).ok_or_else(|| {
                RaidError::invalid_argument(format!(
                    "logical zone {l} is missing slot {k} of {nn}"
                ))
            })
        })
        .collect()
}

/// The raw per-slot tallies behind every aggregated Auto-mode
/// predicate (`spec.md` §4.5): whether any slot is offline, whether
/// every slot is full, whether every slot is writable, and whether any
/// slot is open. `is_offline`/`is_writable` read these fields directly
/// rather than going through [`synthesize_condition`]'s single enum,
/// since a slot mix like `[Full, ImplicitOpen]` collapses to
/// `ImplicitOpen` there even though `all_writable` is false for it.
struct SlotAggregate {
    any_offline: bool,
    all_full: bool,
    all_writable: bool,
    any_open: bool,
}

fn aggregate_slots(raid: &RaidDevice, entries: &[MapEntry]) -> Result<SlotAggregate, RaidError> {
    let mut any_offline = false;
    let mut all_full = true;
    let mut all_writable = true;
    let mut any_open = false;

    for e in entries {
        let dev = &raid.devices[e.device_idx as usize];
        if dev.is_offline(e.zone_idx)? {
            any_offline = true;
        }
        if dev.is_writable(e.zone_idx)? {
            all_full = false;
        } else {
            all_writable = false;
        }
        if dev.is_open(e.zone_idx)? {
            any_open = true;
        }
    }

    Ok(SlotAggregate {
        any_offline,
        all_full,
        all_writable,
        any_open,
    })
}

/// Aggregates the live child states of logical zone `L`'s slots into a
/// single synthetic condition, per `spec.md` §4.5: Full iff every slot
/// is Full, Offline iff any slot is Offline, Empty/ImplicitOpen/Closed
/// otherwise depending on how many slots are still writable or open.
/// Used by `list_zones` for the whole-zone display condition; the
/// `is_offline`/`is_writable` predicate accessors use
/// [`aggregate_slots`] directly instead (see its doc comment).
fn synthesize_condition(raid: &RaidDevice, entries: &[MapEntry]) -> Result<ZoneCondition, RaidError> {
    let agg = aggregate_slots(raid, entries)?;
    Ok(if agg.any_offline {
        ZoneCondition::Offline
    } else if agg.all_full {
        ZoneCondition::Full
    } else if agg.any_open {
        ZoneCondition::ImplicitOpen
    } else if agg.all_writable {
        ZoneCondition::Empty
    } else {
        ZoneCondition::Closed
    })
}

pub(super) fn list_zones(raid: &RaidDevice) -> Result<ZoneList, RaidError> {
    let nr_zones = raid.devices[0].geometry().nr_zones;
    let size = logical_zone_size(raid);
    let mut out = Vec::with_capacity(nr_zones as usize);

    for l in 0..nr_zones {
        let start = l as u64 * size;
        let Some(mode_entry) = raid.allocator().get_mode(l) else {
            out.push(Zone {
                start,
                capacity: size,
                length: 0,
                write_pointer: start,
                zone_type: ZoneType::SequentialRequired,
                condition: ZoneCondition::Empty,
            });
            continue;
        };

        let entries = slots(raid, l)?;
        let condition = synthesize_condition(raid, &entries)?;

        let write_pointer = match mode_entry.mode {
            RaidMode::Raid1 | RaidMode::None => {
                let e0 = &entries[0];
                start + raid.devices[e0.device_idx as usize].zone_wp(e0.zone_idx)?
                    - raid.devices[e0.device_idx as usize].zone_start(e0.zone_idx)?
            }
            _ => entries
                .iter()
                .map(|e| raid.devices[e.device_idx as usize].zone_wp(e.zone_idx))
                .sum::<Result<u64, RaidError>>()?,
        };

        out.push(Zone {
            start,
            capacity: size,
            length: size,
            write_pointer,
            zone_type: ZoneType::SequentialRequired,
            condition,
        });
    }

    Ok(out)
}

pub(super) fn reset(raid: &RaidDevice, start: u64) -> Result<ResetResult, RaidError> {
    let (l, _) = zone_and_offset(raid, start);
    let entries = slots(raid, l)?;
    let mut result: Option<ResetResult> = None;
    for e in &entries {
        let dev = &raid.devices[e.device_idx as usize];
        let zstart = dev.zone_start(e.zone_idx)?;
        let r = dev.reset(zstart)?;
        result = Some(match result {
            None => r,
            Some(prev) => ResetResult {
                offline: prev.offline || r.offline,
                max_capacity: prev.max_capacity,
            },
        });
    }
    let mut result = result.expect("logical zone always has at least one slot");
    result.max_capacity *= entries.len() as u64;
    Ok(result)
}

pub(super) fn finish(raid: &RaidDevice, start: u64) -> Result<(), RaidError> {
    let (l, _) = zone_and_offset(raid, start);
    for e in slots(raid, l)? {
        let dev = &raid.devices[e.device_idx as usize];
        let zstart = dev.zone_start(e.zone_idx)?;
        dev.finish(zstart)?;
    }
    Ok(())
}

pub(super) fn close(raid: &RaidDevice, start: u64) -> Result<(), RaidError> {
    let (l, _) = zone_and_offset(raid, start);
    for e in slots(raid, l)? {
        let dev = &raid.devices[e.device_idx as usize];
        let zstart = dev.zone_start(e.zone_idx)?;
        dev.close(zstart)?;
    }
    Ok(())
}

pub(super) fn invalidate_cache(raid: &RaidDevice, pos: u64, size: u64) -> Result<(), RaidError> {
    let (l, offset) = zone_and_offset(raid, pos);
    for e in slots(raid, l)? {
        let dev = &raid.devices[e.device_idx as usize];
        let zstart = dev.zone_start(e.zone_idx)?;
        dev.invalidate_cache(zstart + offset, size)?;
    }
    Ok(())
}

pub(super) fn read(raid: &RaidDevice, buf: &mut [u8], size: usize, pos: u64, direct: bool) -> IoResult {
    let (l, _) = zone_and_offset(raid, pos);
    let mode = effective_mode(raid, l)?;
    let entries = slots(raid, l)?;

    match mode {
        RaidMode::Raid1 | RaidMode::None => {
            let mut last_err = None;
            let offset = zone_and_offset(raid, pos).1;
            for e in &entries {
                let dev = &raid.devices[e.device_idx as usize];
                let zstart = dev.zone_start(e.zone_idx)?;
                match dev.read(buf, size, zstart + offset, direct) {
                    Ok(n) => return Ok(n),
                    Err(err) => last_err = Some(err),
                }
            }
            Err(last_err.expect("logical zone always has at least one slot"))
        }
        _ => striped_read(raid, &entries, pos, size, buf, direct),
    }
}

pub(super) fn write(raid: &RaidDevice, data: &[u8], size: usize, pos: u64) -> IoResult {
    let (l, _) = zone_and_offset(raid, pos);
    let mode = effective_mode(raid, l)?;
    let entries = slots(raid, l)?;

    match mode {
        RaidMode::Raid1 | RaidMode::None => {
            let offset = zone_and_offset(raid, pos).1;
            let mut transferred = None;
            for e in &entries {
                let dev = &raid.devices[e.device_idx as usize];
                let zstart = dev.zone_start(e.zone_idx)?;
                let n = dev.write(data, size, zstart + offset)?;
                transferred.get_or_insert(n);
            }
            Ok(transferred.expect("logical zone always has at least one slot"))
        }
        _ => striped_write(raid, &entries, pos, size, data),
    }
}

/// Maps a block fragment's logical position to the physical slot and
/// offset that backs it, per the §4.3.3 stripe formula generalized to a
/// zone's own slot table (instead of a global positional formula).
fn fragment_target(raid: &RaidDevice, entries: &[MapEntry], zone_base: u64, frag_pos: u64) -> (MapEntry, u64) {
    let block_size = raid.devices[0].geometry().block_size;
    let offset_in_zone = frag_pos - zone_base;
    let block_index = offset_in_zone / block_size;
    let slot_k = (block_index % entries.len() as u64) as usize;
    let physical_block_index = block_index / entries.len() as u64;
    let e = entries[slot_k];
    let dev = &raid.devices[e.device_idx as usize];
    let phys_pos = e.zone_idx as u64 * dev.geometry().zone_size
        + physical_block_index * block_size
        + (offset_in_zone % block_size);
    (e, phys_pos)
}

/// Striped write path (`spec.md` §4.3.3): sequential per fragment,
/// since write-pointer ordering means a later fragment on the same
/// device must observe an earlier one's effect. Never batched, per §5.
fn striped_write(raid: &RaidDevice, entries: &[MapEntry], pos: u64, size: usize, data: &[u8]) -> IoResult {
    use super::split::split_blocks;

    let block_size = raid.devices[0].geometry().block_size;
    let (l, _) = zone_and_offset(raid, pos);
    let zone_base = l as u64 * logical_zone_size(raid);

    let fragments = split_blocks(pos, size, block_size);
    let mut transferred = 0usize;

    for frag in fragments {
        let (e, phys_pos) = fragment_target(raid, entries, zone_base, frag.pos);
        let dev = &raid.devices[e.device_idx as usize];
        let n = dev.write(&data[frag.req_offset..frag.req_offset + frag.len], frag.len, phys_pos)?;
        transferred += n;
        if n < frag.len {
            break;
        }
    }
    Ok(transferred)
}

/// Striped read path (`spec.md` §4.3.3, §5): groups fragments by device
/// and dispatches each device's share through [`Backend::read_batched`]
/// in one call, the same grouping `raid0::read` uses. Fragments come
/// back from `split_blocks` in ascending, non-overlapping `req_offset`
/// order, so peeling disjoint sub-slices off `buf` with `split_at_mut`
/// needs no unsafe code.
fn striped_read(
    raid: &RaidDevice,
    entries: &[MapEntry],
    pos: u64,
    size: usize,
    buf: &mut [u8],
    direct: bool,
) -> IoResult {
    use super::split::split_blocks;

    let block_size = raid.devices[0].geometry().block_size;
    let (l, _) = zone_and_offset(raid, pos);
    let zone_base = l as u64 * logical_zone_size(raid);
    let fragments = split_blocks(pos, size, block_size);

    let mut per_device: Vec<Vec<ReadFragment>> =
        (0..raid.devices.len()).map(|_| Vec::new()).collect();
    let mut rest = buf;
    let mut cursor = 0usize;
    for frag in &fragments {
        let (_, tail) = rest.split_at_mut(frag.req_offset - cursor);
        let (chunk, tail) = tail.split_at_mut(frag.len);
        rest = tail;
        cursor = frag.req_offset + frag.len;

        let (e, phys_pos) = fragment_target(raid, entries, zone_base, frag.pos);
        per_device[e.device_idx as usize].push(ReadFragment {
            buf: chunk,
            size: frag.len,
            pos: phys_pos,
            direct,
        });
    }

    let mut transferred = 0usize;
    for (device_idx, frags) in per_device.into_iter().enumerate() {
        if frags.is_empty() {
            continue;
        }
        transferred += raid.devices[device_idx].read_batched(frags)?;
    }
    Ok(transferred)
}

/// Zone type is a geometry property, identical across every slot under
/// the geometry invariant, so any one slot answers it.
pub(super) fn is_swr(raid: &RaidDevice, idx: u32) -> Result<bool, RaidError> {
    let e = &slots(raid, idx)?[0];
    raid.devices[e.device_idx as usize].is_swr(e.zone_idx)
}

/// Aggregated per `spec.md` §4.5: offline iff any slot is offline.
/// Reads the tally directly rather than through `synthesize_condition`
/// so a slot mix that collapses to a single enum value elsewhere (e.g.
/// `ImplicitOpen`) can't mask an offline slot.
pub(super) fn is_offline(raid: &RaidDevice, idx: u32) -> Result<bool, RaidError> {
    let entries = slots(raid, idx)?;
    Ok(aggregate_slots(raid, &entries)?.any_offline)
}

/// Aggregated per `spec.md` §4.5: writable iff every slot is writable.
/// A slot mix like `[Full, ImplicitOpen]` must answer `false` (the
/// `Full` slot isn't writable) even though `synthesize_condition` would
/// report the whole zone as `ImplicitOpen`, so this reads
/// `all_writable` directly instead of deriving it from that enum.
pub(super) fn is_writable(raid: &RaidDevice, idx: u32) -> Result<bool, RaidError> {
    let entries = slots(raid, idx)?;
    Ok(aggregate_slots(raid, &entries)?.all_writable)
}

pub(super) fn is_active(raid: &RaidDevice, idx: u32) -> Result<bool, RaidError> {
    let entries = slots(raid, idx)?;
    Ok(synthesize_condition(raid, &entries)?.is_active())
}

pub(super) fn is_open(raid: &RaidDevice, idx: u32) -> Result<bool, RaidError> {
    let entries = slots(raid, idx)?;
    Ok(synthesize_condition(raid, &entries)?.is_open())
}

pub(super) fn zone_start(raid: &RaidDevice, idx: u32) -> Result<u64, RaidError> {
    Ok(idx as u64 * logical_zone_size(raid))
}

pub(super) fn zone_max_capacity(raid: &RaidDevice, _idx: u32) -> Result<u64, RaidError> {
    Ok(logical_zone_size(raid))
}

pub(super) fn zone_wp(raid: &RaidDevice, idx: u32) -> Result<u64, RaidError> {
    Ok(list_zones(raid)?[idx as usize].write_pointer)
}

#[cfg(test)]
mod tests {
    use crate::backend::MockBackend;
    use crate::zone::Geometry;
    use crate::{Backend, RaidDevice};

    /// `spec.md` §4.5: writable iff *every* slot is writable. A striped
    /// logical zone whose slots are `[Full, ImplicitOpen]` (one child's
    /// physical zone filled by the stripe write, the other still open)
    /// must report `is_writable() == false`, not `true` — collapsing
    /// the slots to a single `ZoneCondition` first (as
    /// `synthesize_condition` does for `list_zones`) would report
    /// `ImplicitOpen` and wrongly answer `true`.
    #[test]
    fn is_writable_is_false_when_any_slot_is_full() {
        let block_size = 4096u64;
        let geom = Geometry {
            block_size,
            zone_size: block_size * 2,
            nr_zones: 4,
        };
        let devices: Vec<Box<dyn Backend>> = (0..2)
            .map(|i| Box::new(MockBackend::new(format!("d{i}"), geom)) as Box<dyn Backend>)
            .collect();
        let mut dev = RaidDevice::new_auto(devices, 0).unwrap();
        dev.open(false, false).unwrap();
        dev.allocate(0).unwrap();

        // 3 blocks, round-robin striped: device 0 gets blocks 0 and 2
        // (filling its 2-block zone), device 1 gets only block 1 (half
        // of its 2-block zone, still open).
        let data = vec![0xCDu8; block_size as usize * 3];
        dev.write(&data, data.len(), dev.zone_start(0).unwrap())
            .unwrap();

        assert!(!dev.is_writable(0).unwrap());
        assert!(!dev.is_offline(0).unwrap());
    }

    /// Same class of bug for a `[Full, Empty]` mix, which
    /// `synthesize_condition` collapses to `Closed` (also reported
    /// writable by `ZoneCondition::is_writable`).
    #[test]
    fn is_writable_is_false_when_one_slot_full_and_another_empty() {
        let block_size = 4096u64;
        let geom = Geometry {
            block_size,
            zone_size: block_size,
            nr_zones: 4,
        };
        let devices: Vec<Box<dyn Backend>> = (0..2)
            .map(|i| Box::new(MockBackend::new(format!("d{i}"), geom)) as Box<dyn Backend>)
            .collect();
        let mut dev = RaidDevice::new_auto(devices, 0).unwrap();
        dev.open(false, false).unwrap();
        dev.allocate(0).unwrap();

        // 1 block: lands entirely on device 0 (block_index 0 mod 2),
        // filling its single-block zone while device 1's slot stays Empty.
        let data = vec![0xEFu8; block_size as usize];
        dev.write(&data, data.len(), dev.zone_start(0).unwrap())
            .unwrap();

        assert!(!dev.is_writable(0).unwrap());
    }
}
