//! Concat mode end-to-end (`spec.md` §4.3.1, §8): logical zone indices
//! and byte positions are consumed device by device, in order.

use zone_raid::backend::MockBackend;
use zone_raid::zone::Geometry;
use zone_raid::{Backend, RaidDevice, RaidMode};

fn geom() -> Geometry {
    Geometry {
        block_size: 512,
        zone_size: 4096,
        nr_zones: 4,
    }
}

fn two_devices() -> RaidDevice {
    let a: Box<dyn Backend> = Box::new(MockBackend::new("a", geom()));
    let b: Box<dyn Backend> = Box::new(MockBackend::new("b", geom()));
    let mut dev = RaidDevice::new(RaidMode::Concat, vec![a, b]).unwrap();
    dev.open(false, false).unwrap();
    dev
}

#[test]
fn list_zones_spans_both_devices() {
    let dev = two_devices();
    let zones = dev.list_zones().unwrap();
    assert_eq!(zones.len(), 8);
    // device b's first zone starts where device a's total capacity ends.
    assert_eq!(zones[4].start, 4 * 4096);
}

#[test]
fn zone_index_four_lands_on_second_device() {
    let dev = two_devices();
    assert_eq!(dev.zone_start(4).unwrap(), 4 * 4096);
    assert!(!dev.is_offline(4).unwrap());
}

#[test]
fn write_then_read_round_trips_within_one_device() {
    let dev = two_devices();
    let data = vec![0xABu8; 512];
    dev.write(&data, 512, 0).unwrap();

    let mut buf = vec![0u8; 512];
    let n = dev.read(&mut buf, 512, 0, false).unwrap();
    assert_eq!(n, 512);
    assert_eq!(buf, data);
}

#[test]
fn write_crossing_into_second_device_lands_there() {
    let dev = two_devices();
    let data = vec![0x11u8; 512];
    // device a has 4 zones * 4096 bytes = 16384 bytes total.
    dev.write(&data, 512, 16384).unwrap();

    let mut buf = vec![0u8; 512];
    dev.read(&mut buf, 512, 16384, false).unwrap();
    assert_eq!(buf, data);
}

#[test]
fn position_beyond_both_devices_is_an_error() {
    let dev = two_devices();
    let mut buf = vec![0u8; 512];
    assert!(dev.read(&mut buf, 512, 2 * 16384, false).is_err());
}
