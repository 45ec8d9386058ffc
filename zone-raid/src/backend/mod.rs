//! The Backend Abstraction (`spec.md` §4.1): the capability set every
//! physical zoned device — and the `RaidDevice` itself — implements.

mod libzbd;
mod mock;
mod zonefs;

pub use libzbd::LibzbdBackend;
pub use mock::MockBackend;
pub use zonefs::ZonefsBackend;

use crate::error::RaidError;
use crate::zone::{Geometry, ZoneList};

/// Result of a positional read/write/invalidate call: either the
/// number of bytes transferred (possibly short, per `spec.md` §4.4) or
/// the first error observed.
pub type IoResult = Result<usize, RaidError>;

/// Returned by `Backend::open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenLimits {
    pub max_active_zones: u32,
    pub max_open_zones: u32,
}

/// Returned by `Backend::reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetResult {
    pub offline: bool,
    pub max_capacity: u64,
}

/// Every physical zoned device, and the `RaidDevice` composed from
/// them, implements this trait. Positional arguments are always in the
/// caller's own unit space: a child backend sees physical bytes/zone
/// indices, a `RaidDevice` sees logical ones.
pub trait Backend: Send + Sync {
    fn open(&mut self, readonly: bool, exclusive: bool) -> Result<OpenLimits, RaidError>;

    fn geometry(&self) -> Geometry;

    fn list_zones(&self) -> Result<ZoneList, RaidError>;

    /// `start` must be zone-aligned.
    fn reset(&self, start: u64) -> Result<ResetResult, RaidError>;
    /// `start` must be zone-aligned.
    fn finish(&self, start: u64) -> Result<(), RaidError>;
    /// `start` must be zone-aligned.
    fn close(&self, start: u64) -> Result<(), RaidError>;

    /// `pos` must be block-aligned.
    fn read(&self, buf: &mut [u8], size: usize, pos: u64, direct: bool) -> IoResult;
    /// `pos` must be block-aligned and equal the zone's current write
    /// pointer.
    fn write(&self, data: &[u8], size: usize, pos: u64) -> IoResult;
    /// `pos` and `size` must be block-aligned.
    fn invalidate_cache(&self, pos: u64, size: u64) -> Result<(), RaidError>;

    fn is_swr(&self, idx: u32) -> Result<bool, RaidError>;
    fn is_offline(&self, idx: u32) -> Result<bool, RaidError>;
    fn is_writable(&self, idx: u32) -> Result<bool, RaidError>;
    fn is_active(&self, idx: u32) -> Result<bool, RaidError>;
    fn is_open(&self, idx: u32) -> Result<bool, RaidError>;

    fn zone_start(&self, idx: u32) -> Result<u64, RaidError>;
    fn zone_max_capacity(&self, idx: u32) -> Result<u64, RaidError>;
    fn zone_wp(&self, idx: u32) -> Result<u64, RaidError>;

    fn filename(&self) -> String;

    /// An optional batched-read submission interface (`spec.md` §5):
    /// issue every fragment, wait for all to complete, and return the
    /// sum of bytes transferred, or the first error observed. The
    /// default implementation just calls `read` once per fragment in
    /// order; a backend with a real submission/completion queue (an
    /// io_uring binding, say) overrides this to issue them concurrently
    /// instead. Never used for writes: write-pointer ordering requires
    /// each write to observe the previous one's effect.
    fn read_batched(&self, fragments: Vec<ReadFragment<'_>>) -> IoResult {
        let mut total = 0usize;
        for frag in fragments {
            total += self.read(frag.buf, frag.size, frag.pos, frag.direct)?;
        }
        Ok(total)
    }
}

/// One fragment of a [`Backend::read_batched`] submission: `buf` is the
/// caller's own disjoint sub-slice to fill, `size` bytes starting at
/// `pos`. Fragments within one call never overlap in either `buf` or
/// `pos`, so a backend that issues them concurrently needs no locking
/// between them.
pub struct ReadFragment<'a> {
    pub buf: &'a mut [u8],
    pub size: usize,
    pub pos: u64,
    pub direct: bool,
}

fn align_check(value: u64, unit: u64, what: &str) -> Result<(), RaidError> {
    if unit != 0 && value % unit != 0 {
        return Err(RaidError::unaligned(format!(
            "{what} {value} is not a multiple of {unit}"
        )));
    }
    Ok(())
}

pub(crate) fn check_block_aligned(pos: u64, block_size: u64) -> Result<(), RaidError> {
    align_check(pos, block_size, "position")
}

pub(crate) fn check_zone_aligned(start: u64, zone_size: u64) -> Result<(), RaidError> {
    align_check(start, zone_size, "zone start")
}
