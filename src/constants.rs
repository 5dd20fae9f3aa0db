//! Application-wide constants

use std::time::Duration;

/// How often the broker hostname is re-resolved.
pub(crate) const FLEET_WATCH_INTERVAL: Duration = Duration::from_secs(5);

/// Minimum wait between two attempts of the same retry task.
pub(crate) const RETRY_COOL_DOWN: Duration = Duration::from_secs(60);

/// Event types that carry a status payload end with this suffix
/// (`status`, `grp_status`, `privacy_status`).
pub(crate) const STATUS_TYPE_SUFFIX: &str = "status";

/// Author level required for long-text republishing.
pub(crate) const VERIFIED_AUTHOR_LEVEL: i32 = 2;

/// Bit offset of the verification flag inside the author sign field.
pub(crate) const VERIFICATION_FLAG_SHIFT: u32 = 6;

/// Width mask of the verification flag (four bits).
pub(crate) const VERIFICATION_FLAG_MASK: u64 = (1 << 4) - 1;

/// Inclusive range of verification flag values eligible for republishing.
pub(crate) const VERIFICATION_FLAG_RANGE: std::ops::RangeInclusive<u64> = 1..=7;

/// `company` query parameter sent to the post endpoint.
pub(crate) const POST_COMPANY: &str = "weibo";

/// `action` query parameter sent to the post endpoint.
pub(crate) const POST_ACTION: &str = "write";
