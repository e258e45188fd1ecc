//! This module defines the `GenlTransport` trait and its associated types.
//! The `GenlTransport` trait is the seam between the NAN logic and the
//! kernel: the directory and the sessions only talk to it, which keeps them
//! testable without a radio.

mod interface_index;
mod mac_addr;
pub mod nl80211_drv;

pub use interface_index::InterfaceIndex;
pub use mac_addr::MacAddr;
pub use nl80211_drv::nl80211_const::{Nl80211Command, Nl80211Iftype};
pub use nl80211_drv::nl80211_parser::{Nl80211Attr, StaInfoAttr};
pub use nl80211_drv::{NlEvent, Nl80211Transport};

#[cfg(test)]
use mockall::automock;

use crate::error::Result;

/// Request side of the nl80211 generic netlink family.
#[cfg_attr(test, automock)]
pub trait GenlTransport: Send + Sync + 'static {
    /// Sends `cmd` and waits for the answer. Returns the attribute list of
    /// every `reply` message, all of them when `dump` is set.
    fn execute(
        &self, cmd: Nl80211Command, attrs: Vec<Nl80211Attr>, dump: bool,
        reply: Nl80211Command,
    ) -> Result<Vec<Vec<Nl80211Attr>>>;

    /// Sends `cmd` without waiting and returns its sequence number.
    fn send(&self, cmd: Nl80211Command, attrs: Vec<Nl80211Attr>) -> Result<u32>;

    /// Sends `cmd` on the event socket, so the notifications it enables are
    /// delivered there. Returns the sequence number.
    fn subscribe(
        &self, cmd: Nl80211Command, attrs: Vec<Nl80211Attr>,
    ) -> Result<u32>;

    /// Sets the administrative up flag of the interface.
    fn set_link_up(&self, ifindex: InterfaceIndex) -> Result<()>;
}
