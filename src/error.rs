//! # Error handling utilities.
//! Operations return the generic anyhow error type; the failures callers
//! need to tell apart are described by `NanError` and can be recovered with
//! `anyhow::Error::downcast_ref`.

use thiserror::Error;

pub type Result<T> = anyhow::Result<T>;

/// Failures of the radio transport and the protocol codec.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NanError {
    /// The kernel does not expose the nl80211 generic netlink family.
    #[error("nl80211 generic netlink family is not available")]
    FamilyUnavailable,

    #[error("unexpected nl80211 response command {got}, expected {expected}")]
    InvalidResponse { expected: u8, got: u8 },

    #[error("unexpected nl80211 family version {got}, expected {expected}")]
    InvalidFamilyVersion { expected: u8, got: u8 },

    /// Netlink error message carrying a non zero errno.
    #[error("kernel rejected {cmd}: {name} ({code})")]
    Kernel { code: i32, name: &'static str, cmd: String },

    #[error("failed to create interface {name} on phy {phy}")]
    CreateFailed { name: String, phy: u32 },

    #[error("monitor filter rejected on {ifname}: {reason}")]
    FilterRejected { ifname: String, reason: String },

    /// An information element declares more bytes than the buffer holds.
    #[error("information element {id} declares {declared} bytes, {remaining} left")]
    TruncatedIe { id: u8, declared: usize, remaining: usize },

    /// Less than a full IE header is left in the buffer.
    #[error("{remaining} trailing bytes are too short for an information element")]
    ShortIe { remaining: usize },

    #[error("no interface with index {0}")]
    UnknownInterface(u32),

    #[error("payload of {len} bytes exceeds the {max} bytes available")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("capture on {0} closed")]
    CaptureClosed(String),
}

/// Symbolic name of a (positive) errno value, for log lines.
pub fn errno_name(code: i32) -> &'static str {
    match code {
        libc::EPERM => "EPERM",
        libc::ENOENT => "ENOENT",
        libc::EINTR => "EINTR",
        libc::EIO => "EIO",
        libc::ENXIO => "ENXIO",
        libc::EAGAIN => "EAGAIN",
        libc::ENOMEM => "ENOMEM",
        libc::EACCES => "EACCES",
        libc::EBUSY => "EBUSY",
        libc::EEXIST => "EEXIST",
        libc::ENODEV => "ENODEV",
        libc::EINVAL => "EINVAL",
        libc::ENFILE => "ENFILE",
        libc::ENOSPC => "ENOSPC",
        libc::ERANGE => "ERANGE",
        libc::ENOLINK => "ENOLINK",
        libc::ENETDOWN => "ENETDOWN",
        libc::ENOBUFS => "ENOBUFS",
        libc::ENOTCONN => "ENOTCONN",
        libc::EALREADY => "EALREADY",
        libc::EINPROGRESS => "EINPROGRESS",
        libc::EOPNOTSUPP => "EOPNOTSUPP",
        libc::ETIMEDOUT => "ETIMEDOUT",
        _ => "UNKNOWN",
    }
}
