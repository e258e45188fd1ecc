//! AF_PACKET capture socket bound to one monitor interface.

use std::ffi::CString;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use anyhow::{anyhow, Context};
use log::info;

use super::bpf::NAN_BSSID_FILTER;
use crate::error::{NanError, Result};

/// Largest capture: radiotap header plus a full 802.11 frame.
const MAX_CAPTURE: usize = 8192;

pub struct RawCapture {
    fd: OwnedFd,
    ifname: String,
}

impl RawCapture {
    /// Opens a raw socket on `ifname` and attaches the NAN BSSID filter.
    ///
    /// Fails with `NanError::FilterRejected` if the kernel refuses the
    /// filter.
    pub fn open(ifname: &str) -> Result<Self> {
        let c_name = CString::new(ifname).context("interface name contains null byte")?;
        // SAFETY: `c_name` is a valid NUL terminated string.
        let ifindex = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
        if ifindex == 0 {
            return Err(anyhow!("failed to resolve ifindex for {}", ifname));
        }

        let protocol = (libc::ETH_P_ALL as u16).to_be();
        // SAFETY: plain socket creation, the result is checked below.
        let raw = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, protocol as i32) };
        if raw < 0 {
            return Err(io::Error::last_os_error()).context("creating packet socket");
        }
        // SAFETY: `raw` is a freshly created descriptor nobody else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // Attach before bind so no unfiltered frame is queued
        let prog = libc::sock_fprog {
            len: NAN_BSSID_FILTER.len() as u16,
            filter: NAN_BSSID_FILTER.as_ptr() as *mut libc::sock_filter,
        };
        // SAFETY: `prog` points to a valid filter for the duration of the
        // call, the kernel copies it.
        let res = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_ATTACH_FILTER,
                &prog as *const libc::sock_fprog as *const libc::c_void,
                mem::size_of::<libc::sock_fprog>() as libc::socklen_t,
            )
        };
        if res != 0 {
            return Err(NanError::FilterRejected {
                ifname: ifname.to_string(),
                reason: io::Error::last_os_error().to_string(),
            }
            .into());
        }

        let sll = libc::sockaddr_ll {
            sll_family: libc::AF_PACKET as u16,
            sll_protocol: protocol,
            sll_ifindex: ifindex as i32,
            sll_hatype: 0,
            sll_pkttype: 0,
            sll_halen: 0,
            sll_addr: [0; 8],
        };
        // SAFETY: `sll` is a valid sockaddr_ll and the length matches.
        let res = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &sll as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if res != 0 {
            return Err(io::Error::last_os_error())
                .with_context(|| format!("binding packet socket to {}", ifname));
        }

        info!("Capturing NAN frames on {} ({})", ifname, ifindex);

        Ok(Self {
            fd,
            ifname: ifname.to_string(),
        })
    }

    pub fn ifname(&self) -> &str {
        &self.ifname
    }

    /// Blocks until the next frame and returns it in a fresh buffer.
    pub fn recv(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_CAPTURE];
        loop {
            // SAFETY: `buf` is valid for `buf.len()` bytes.
            let n = unsafe {
                libc::recv(
                    self.fd.as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    0,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(anyhow::Error::new(err)
                    .context(NanError::CaptureClosed(self.ifname.clone())));
            }
            buf.truncate(n as usize);
            return Ok(buf);
        }
    }
}
