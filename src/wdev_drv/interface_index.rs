/// This module defines the `InterfaceIndex` struct and implements
/// conversions and formatting for it. The `InterfaceIndex` struct
/// is the kernel's network interface index (`NL80211_ATTR_IFINDEX`).
use std::fmt;

/// A struct representing an interface index.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Default)]
pub struct InterfaceIndex(pub u32);

impl From<InterfaceIndex> for u32 {
    /// Converts an `InterfaceIndex` into the raw `u32` carried on the wire.
    fn from(index: InterfaceIndex) -> u32 {
        index.0
    }
}

impl From<u32> for InterfaceIndex {
    fn from(index: u32) -> Self {
        InterfaceIndex(index)
    }
}

/// Implement the `fmt::Display` trait for `InterfaceIndex` to allow formatted output.
impl fmt::Display for InterfaceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
