//! Crate-wide error taxonomy.
//!
//! Mirrors the error-category split of `spec.md` §7: `Unsupported`,
//! `Io`, `Corruption`, `NoSpace`, `InvalidArgument`. Child backend
//! failures are wrapped at the call site with `snafu::ResultExt`, never
//! swallowed or downgraded.

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), context(suffix(false)))]
pub enum RaidError {
    #[snafu(display("{mode} is not an implemented RAID mode"))]
    Unsupported { mode: String },

    #[snafu(display("{op} failed on {device}: {source}"))]
    Io {
        op: &'static str,
        device: String,
        source: std::io::Error,
    },

    #[snafu(display("{message}"))]
    Corruption { message: String },

    #[snafu(display(
        "no space: allocator could not find {needed} free zone(s) for logical zone {zone}"
    ))]
    NoSpace { zone: u32, needed: u32 },

    #[snafu(display("invalid argument: {message}"))]
    InvalidArgument { message: String },

    #[snafu(display("{device} already mapped to sub-index {existing_sub_idx}"))]
    AlreadyMapped { device: u32, existing_sub_idx: u32 },
}

pub type Result<T, E = RaidError> = std::result::Result<T, E>;

impl RaidError {
    pub(crate) fn unaligned(message: impl Into<String>) -> Self {
        RaidError::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        RaidError::InvalidArgument {
            message: message.into(),
        }
    }
}
