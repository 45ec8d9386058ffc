//! Zone geometry and per-zone descriptors shared by every backend and
//! by the RAID dispatchers.

/// Geometry that every child backend of a `RaidDevice` must agree on
/// bit-for-bit (`spec.md` §3 invariant 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub block_size: u64,
    pub zone_size: u64,
    pub nr_zones: u32,
}

impl Geometry {
    pub fn matches(&self, other: &Geometry) -> bool {
        self == other
    }
}

/// Zone type as reported by the backend. Only sequential-write-required
/// zones are interesting to the RAID core; conventional zones are
/// passed through unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneType {
    Conventional,
    SequentialRequired,
}

/// The SWR zone state machine (`spec.md` §4.5, GLOSSARY "Zone").
/// `ReadOnly` and `NotWp` are carried over from the driver layer
/// (`original_source`) for zones that have gone read-only or that never
/// had a write pointer to begin with; the RAID core forwards them
/// verbatim and never synthesizes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneCondition {
    Empty,
    ImplicitOpen,
    ExplicitOpen,
    Closed,
    Full,
    Offline,
    ReadOnly,
    NotWp,
}

impl ZoneCondition {
    pub fn is_writable(&self) -> bool {
        !matches!(
            self,
            ZoneCondition::Offline | ZoneCondition::ReadOnly | ZoneCondition::Full
        )
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self,
            ZoneCondition::ImplicitOpen | ZoneCondition::ExplicitOpen
        )
    }

    pub fn is_active(&self) -> bool {
        self.is_open() || matches!(self, ZoneCondition::Closed)
    }
}

/// A single zone descriptor, in whatever unit space the caller asked
/// for (physical units from a child backend, logical units when
/// synthesized by a RAID dispatcher).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zone {
    pub start: u64,
    pub capacity: u64,
    pub length: u64,
    pub write_pointer: u64,
    pub zone_type: ZoneType,
    pub condition: ZoneCondition,
}

impl Zone {
    pub fn is_swr(&self) -> bool {
        self.zone_type == ZoneType::SequentialRequired
    }

    pub fn is_offline(&self) -> bool {
        self.condition == ZoneCondition::Offline
    }

    pub fn is_writable(&self) -> bool {
        self.condition.is_writable()
    }

    pub fn is_active(&self) -> bool {
        self.condition.is_active()
    }

    pub fn is_open(&self) -> bool {
        self.condition.is_open()
    }
}

/// A listing of zones in ascending start order, as returned by
/// `Backend::list_zones`.
pub type ZoneList = Vec<Zone>;
