//! This module contains the netlink side of the nl80211 driver.
//!
//! `Nl80211Transport` keeps two generic netlink sockets bound to the nl80211
//! family:
//!
//! - a request socket, used for request/response and dump calls,
//! - an event socket, subscribed to the nl80211 multicast groups and to the
//!   management frames registered through it.
//!
//! The family id and version are resolved once when connecting. Every reply
//! is checked against the command the caller expects and against the family
//! version, and kernel error messages are turned into `NanError::Kernel` with
//! the symbolic errno name.

pub mod nl80211_const;
pub mod nl80211_parser;

use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::anyhow;
use log::{debug, error, info, trace, warn};
use neli::{
    consts::{
        genl::{CtrlAttr, CtrlCmd},
        nl::{GenlId, NlmF, NlmFFlags},
        rtnl::{Arphrd, Iff, IffFlags, RtAddrFamily, Rtm},
        socket::NlFamily,
    },
    err::NlError,
    genl::{Genlmsghdr, Nlattr},
    nl::{NlPayload, Nlmsghdr},
    rtnl::Ifinfomsg,
    socket::NlSocketHandle,
    types::{GenlBuffer, RtBuffer},
};

use nl80211_const::{
    Nl80211Attribute, Nl80211Command, NL80211_GENL_NAME, NL80211_MCAST_GROUPS,
};
use nl80211_parser::{parse_nl80211_payload, Nl80211Attr};

use super::{GenlTransport, InterfaceIndex};
use crate::error::{errno_name, NanError, Result};

/// Version of the generic netlink controller protocol.
const CTRL_VERSION: u8 = 2;
/// Sequence number of the family lookup, sent before any other request.
const RESOLVE_SEQ: u32 = 0;
/// Bounds of the event socket poll timeout.
const MIN_EVENT_DEADLINE: Duration = Duration::from_millis(100);
const MAX_EVENT_DEADLINE: Duration = Duration::from_secs(60);

type Nl80211Payload = Genlmsghdr<Nl80211Command, Nl80211Attribute>;
type Nl80211Msg = Nlmsghdr<u16, Nl80211Payload>;

/// One read from a socket, sorted against the request it answers.
#[derive(Debug)]
enum Reply<T, P> {
    /// A message of the request.
    Message(Nlmsghdr<T, P>),
    /// Belongs to another request, a late answer to an earlier send.
    Stale,
    /// Ack, end of dump, or nothing left to read.
    Done,
}

/// Sorts the result of `NlSocketHandle::recv` for the request `seq`.
///
/// neli hands kernel error messages back as `NlError::Nlmsgerr`. One that
/// answers `seq` becomes `NanError::Kernel`; one that answers another
/// request is logged and skipped, so a rejected fire-and-forget send does not
/// fail the next request.
fn sort_reply<T, P>(
    received: std::result::Result<Option<Nlmsghdr<T, P>>, NlError<T, P>>,
    seq: u32, what: &str,
) -> Result<Reply<T, P>>
where
    T: std::fmt::Debug + Send + Sync + 'static,
    P: std::fmt::Debug + Send + Sync + 'static,
{
    let msg = match received {
        Ok(Some(msg)) => msg,
        Ok(None) => return Ok(Reply::Done),
        Err(NlError::Nlmsgerr(e)) if e.nlmsg.nl_seq != seq => {
            warn!(
                "Late netlink error for seq {}: {}",
                e.nlmsg.nl_seq,
                errno_name(-e.error)
            );
            return Ok(Reply::Stale);
        }
        Err(NlError::Nlmsgerr(e)) => return Err(kernel_error(-e.error, what)),
        Err(e) => return Err(e.into()),
    };

    if msg.nl_seq != seq {
        trace!("Skipping reply for seq {}", msg.nl_seq);
        return Ok(Reply::Stale);
    }

    match msg.nl_payload {
        NlPayload::Payload(_) => Ok(Reply::Message(msg)),
        NlPayload::Err(ref e) => Err(kernel_error(-e.error, what)),
        NlPayload::Ack(_) | NlPayload::Empty => Ok(Reply::Done),
    }
}

fn kernel_error(code: i32, what: &str) -> anyhow::Error {
    let name = errno_name(code);
    error!(
        "{} failed: {} ({})",
        what,
        name,
        std::io::Error::from_raw_os_error(code)
    );
    NanError::Kernel {
        code,
        name,
        cmd: what.to_string(),
    }
    .into()
}

/// Poll timeout for a deadline, kept within bounds so a zero deadline
/// cannot spin and a large one cannot overflow.
fn poll_timeout_ms(deadline: Duration) -> libc::c_int {
    deadline
        .clamp(MIN_EVENT_DEADLINE, MAX_EVENT_DEADLINE)
        .as_millis() as libc::c_int
}

/// An asynchronous notification read from the event socket.
#[derive(Debug, Clone, PartialEq)]
pub struct NlEvent {
    pub cmd: Nl80211Command,
    pub seq: u32,
    pub attrs: Vec<Nl80211Attr>,
}

impl NlEvent {
    /// Interface index carried by the event, if any.
    pub fn ifindex(&self) -> Option<InterfaceIndex> {
        self.attrs.iter().find_map(|attr| match attr {
            Nl80211Attr::Ifindex(idx) => Some(InterfaceIndex(*idx)),
            _ => None,
        })
    }
}

/// Struct representing the nl80211 transport.
pub struct Nl80211Transport {
    family_id: u16,
    family_version: u8,
    req_sock: Mutex<NlSocketHandle>,
    event_sock: Mutex<NlSocketHandle>,
    seq: AtomicU32,
    event_deadline: Duration,
}

impl Nl80211Transport {
    /// Opens the request and event sockets and resolves the nl80211 family.
    ///
    /// Fails with `NanError::FamilyUnavailable` when the kernel does not
    /// expose nl80211. There is no retry, the caller is expected to give up.
    pub fn connect(event_deadline: Duration) -> Result<Self> {
        let mut req_sock = NlSocketHandle::connect(
            NlFamily::Generic, /* family */
            None,              /* pid */
            &[],               /* groups */
        )?;

        let (family_id, family_version) = resolve_family(&mut req_sock)?;
        info!(
            "Resolved {} family id {} version {}",
            NL80211_GENL_NAME, family_id, family_version
        );

        let mut event_sock = NlSocketHandle::connect(
            NlFamily::Generic, /* family */
            None,              /* pid */
            &[],               /* groups */
        )?;

        let mut groups = Vec::new();
        for group in NL80211_MCAST_GROUPS {
            match event_sock.resolve_nl_mcast_group(NL80211_GENL_NAME, group) {
                Ok(id) => groups.push(id),
                Err(e) => debug!("Skipping multicast group {}: {}", group, e),
            }
        }
        event_sock.add_mcast_membership(&groups)?;
        debug!("Joined {} nl80211 multicast groups", groups.len());

        Ok(Self {
            family_id,
            family_version,
            req_sock: Mutex::new(req_sock),
            event_sock: Mutex::new(event_sock),
            seq: AtomicU32::new(1),
            event_deadline,
        })
    }

    fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn request(
        &self, cmd: Nl80211Command, attrs: &[Nl80211Attr], dump: bool,
        ack: bool, seq: u32,
    ) -> Result<Nl80211Msg> {
        let mut gen_buff = GenlBuffer::new();
        for attr in attrs {
            gen_buff.push(attr.to_nlattr()?);
        }

        // A dump ends with NLMSG_DONE, it gets no ack
        let mut flags = vec![NlmF::Request];
        if dump {
            flags.push(NlmF::Dump);
        } else if ack {
            flags.push(NlmF::Ack);
        }

        let payload = NlPayload::Payload(Genlmsghdr::<
            Nl80211Command,
            Nl80211Attribute,
        >::new(
            cmd, self.family_version, gen_buff
        ));

        Ok(Nlmsghdr::new(
            None,
            self.family_id,
            NlmFFlags::new(&flags),
            Some(seq),
            None,
            payload,
        ))
    }

    /// Reads the event socket until `running` is cleared or the socket fails.
    ///
    /// Each read waits at most the event deadline so the flag is checked
    /// regularly; an empty wait is idle time, not an error. A kernel error
    /// message is logged and the loop goes on.
    pub fn receive_events(
        &self, running: &AtomicBool, handler: &mut dyn FnMut(NlEvent),
    ) -> Result<()> {
        let fd = self
            .event_sock
            .lock()
            .map_err(|e| anyhow!("event socket lock poisoned: {}", e))?
            .as_raw_fd();
        let timeout_ms = poll_timeout_ms(self.event_deadline);

        while running.load(Ordering::Relaxed) {
            let mut pfd = libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            };

            // SAFETY: `pfd` is a valid pollfd and the count is 1.
            let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            if ready < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err.into());
            }
            if ready == 0 {
                trace!("No nl80211 event within {:?}", self.event_deadline);
                continue;
            }
            if pfd.revents & (libc::POLLERR | libc::POLLHUP) != 0 {
                return Err(anyhow!("nl80211 event socket hung up"));
            }

            let received = self
                .event_sock
                .lock()
                .map_err(|e| anyhow!("event socket lock poisoned: {}", e))?
                .recv::<u16, Nl80211Payload>();

            let msg = match received {
                Ok(Some(msg)) => msg,
                Ok(None) => continue,
                Err(NlError::Nlmsgerr(e)) => {
                    let code = -e.error;
                    error!(
                        "nl80211 error on event socket, seq {}: {} ({})",
                        e.nlmsg.nl_seq,
                        errno_name(code),
                        std::io::Error::from_raw_os_error(code)
                    );
                    continue;
                }
                Err(e) => {
                    warn!("Failed to decode nl80211 event: {}", e);
                    continue;
                }
            };

            match msg.nl_payload {
                NlPayload::Payload(ref genl) => handler(NlEvent {
                    cmd: genl.cmd,
                    seq: msg.nl_seq,
                    attrs: parse_nl80211_payload(genl),
                }),
                NlPayload::Err(ref e) => {
                    warn!("nl80211 error on event socket: {}", errno_name(-e.error))
                }
                NlPayload::Ack(_) | NlPayload::Empty => {
                    trace!("Ack on event socket, seq {}", msg.nl_seq);
                }
            }
        }

        Ok(())
    }
}

impl GenlTransport for Nl80211Transport {
    fn execute(
        &self, cmd: Nl80211Command, attrs: Vec<Nl80211Attr>, dump: bool,
        reply: Nl80211Command,
    ) -> Result<Vec<Vec<Nl80211Attr>>> {
        let seq = self.next_seq();
        let nl_req = self.request(cmd, &attrs, dump, true, seq)?;
        let what = format!("{:?}", cmd);

        let mut sock = self
            .req_sock
            .lock()
            .map_err(|e| anyhow!("request socket lock poisoned: {}", e))?;
        sock.send(nl_req)?;

        let mut replies = Vec::new();

        loop {
            let msg = match sort_reply(sock.recv::<u16, Nl80211Payload>(), seq, &what)? {
                Reply::Message(msg) => msg,
                Reply::Stale => continue,
                Reply::Done => break,
            };

            let NlPayload::Payload(genl) = msg.nl_payload else {
                continue;
            };
            if genl.cmd != reply {
                return Err(NanError::InvalidResponse {
                    expected: reply.into(),
                    got: genl.cmd.into(),
                }
                .into());
            }
            if genl.version != self.family_version {
                return Err(NanError::InvalidFamilyVersion {
                    expected: self.family_version,
                    got: genl.version,
                }
                .into());
            }
            // Non dump replies are followed by an ack
            replies.push(parse_nl80211_payload(&genl));
        }

        Ok(replies)
    }

    fn send(&self, cmd: Nl80211Command, attrs: Vec<Nl80211Attr>) -> Result<u32> {
        let seq = self.next_seq();
        let nl_req = self.request(cmd, &attrs, false, false, seq)?;

        self.req_sock
            .lock()
            .map_err(|e| anyhow!("request socket lock poisoned: {}", e))?
            .send(nl_req)?;

        Ok(seq)
    }

    /// Waits for the kernel to accept the request. Events read while waiting
    /// are dropped, so this is meant to run before `receive_events`.
    fn subscribe(
        &self, cmd: Nl80211Command, attrs: Vec<Nl80211Attr>,
    ) -> Result<u32> {
        let seq = self.next_seq();
        let nl_req = self.request(cmd, &attrs, false, true, seq)?;
        let what = format!("{:?}", cmd);

        let mut sock = self
            .event_sock
            .lock()
            .map_err(|e| anyhow!("event socket lock poisoned: {}", e))?;
        sock.send(nl_req)?;

        loop {
            match sort_reply(sock.recv::<u16, Nl80211Payload>(), seq, &what)? {
                Reply::Message(_) | Reply::Stale => continue,
                Reply::Done => break,
            }
        }

        Ok(seq)
    }

    fn set_link_up(&self, ifindex: InterfaceIndex) -> Result<()> {
        info!("Bringing interface {} up", ifindex);

        let mut sock = NlSocketHandle::connect(
            NlFamily::Route, /* family */
            None,            /* pid */
            &[],             /* groups */
        )?;

        let ifinfomsg = Ifinfomsg::new(
            RtAddrFamily::Unspecified,
            Arphrd::Ether,
            u32::from(ifindex) as libc::c_int,
            IffFlags::new(&[Iff::Up]),
            IffFlags::new(&[Iff::Up]),
            RtBuffer::new(),
        );

        let seq = self.next_seq();
        let nlmsg = Nlmsghdr::new(
            None,
            Rtm::Newlink,
            NlmFFlags::new(&[NlmF::Request, NlmF::Ack]),
            Some(seq),
            None,
            NlPayload::Payload(ifinfomsg),
        );

        sock.send(nlmsg)?;

        let what = format!("set link {} up", ifindex);
        loop {
            match sort_reply(sock.recv::<u16, Ifinfomsg>(), seq, &what)? {
                Reply::Message(_) | Reply::Stale => continue,
                Reply::Done => break,
            }
        }

        Ok(())
    }
}

/// A controller lookup rejected with ENOENT means the family is not there.
fn family_lookup_error(err: anyhow::Error) -> anyhow::Error {
    match err.downcast_ref::<NanError>() {
        Some(NanError::Kernel { code, .. }) if *code == libc::ENOENT => {
            NanError::FamilyUnavailable.into()
        }
        _ => err,
    }
}

/// Looks up the nl80211 family id and version through the generic netlink
/// controller.
fn resolve_family(sock: &mut NlSocketHandle) -> Result<(u16, u8)> {
    let mut attrs = GenlBuffer::new();
    attrs.push(Nlattr::new(
        false,
        false,
        CtrlAttr::FamilyName,
        NL80211_GENL_NAME,
    )?);

    let nl_req = Nlmsghdr::new(
        None,
        GenlId::Ctrl,
        NlmFFlags::new(&[NlmF::Request, NlmF::Ack]),
        Some(RESOLVE_SEQ),
        None,
        NlPayload::Payload(Genlmsghdr::<CtrlCmd, CtrlAttr>::new(
            CtrlCmd::Getfamily,
            CTRL_VERSION,
            attrs,
        )),
    );
    sock.send(nl_req)?;

    let mut family_id = None;
    let mut family_version = None;
    let what = format!("lookup of family {}", NL80211_GENL_NAME);

    loop {
        let received =
            sock.recv::<GenlId, Genlmsghdr<CtrlCmd, CtrlAttr>>();
        let msg = match sort_reply(received, RESOLVE_SEQ, &what)
            .map_err(family_lookup_error)?
        {
            Reply::Message(msg) => msg,
            Reply::Stale => continue,
            Reply::Done => break,
        };

        let NlPayload::Payload(genl) = msg.nl_payload else {
            continue;
        };
        for attr in genl.get_attr_handle().iter() {
            let data = attr.nla_payload.as_ref();
            match attr.nla_type.nla_type {
                CtrlAttr::FamilyId if data.len() >= 2 => {
                    family_id = Some(u16::from_ne_bytes([data[0], data[1]]));
                }
                CtrlAttr::Version if data.len() >= 4 => {
                    let version =
                        u32::from_ne_bytes([data[0], data[1], data[2], data[3]]);
                    family_version = Some(version as u8);
                }
                _ => (),
            }
        }
    }

    match (family_id, family_version) {
        (Some(id), Some(version)) => Ok((id, version)),
        _ => Err(NanError::FamilyUnavailable.into()),
    }
}

#[cfg(test)]
mod tests {
    use neli::err::{Nlmsgerr, NlmsghdrErr};

    use super::*;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn new_interface() -> Nl80211Payload {
        Genlmsghdr::new(Nl80211Command::NewInterface, 1, GenlBuffer::new())
    }

    fn header<P>(seq: u32, payload: P) -> NlmsghdrErr<u16, P> {
        NlmsghdrErr {
            nl_len: 0,
            nl_type: 30,
            nl_flags: NlmFFlags::new(&[NlmF::Request]),
            nl_seq: seq,
            nl_pid: 0,
            nl_payload: payload,
        }
    }

    /// What neli returns when the kernel answers request `seq` with `errno`.
    fn rejected(seq: u32, errno: i32) -> NlError<u16, Nl80211Payload> {
        NlError::Nlmsgerr(Nlmsgerr {
            error: -errno,
            nlmsg: header(seq, new_interface()),
        })
    }

    fn message(seq: u32, payload: NlPayload<u16, Nl80211Payload>) -> Nl80211Msg {
        Nlmsghdr::new(None, 30, NlmFFlags::new(&[]), Some(seq), None, payload)
    }

    #[test]
    fn test_late_error_does_not_fail_next_request() -> Result<()> {
        init_logger();
        // Frame send with seq 7 rejected, answer read while waiting on seq 8
        let reply = sort_reply(Err(rejected(7, libc::EBUSY)), 8, "GetInterface")?;
        assert!(matches!(reply, Reply::Stale));

        let reply = sort_reply(
            Ok(Some(message(8, NlPayload::Payload(new_interface())))),
            8,
            "GetInterface",
        )?;
        assert!(matches!(reply, Reply::Message(_)));
        Ok(())
    }

    #[test]
    fn test_error_for_request_is_kernel_error() {
        init_logger();
        let err = sort_reply(Err(rejected(8, libc::EBUSY)), 8, "Frame").unwrap_err();
        assert_eq!(
            err.downcast_ref::<NanError>(),
            Some(&NanError::Kernel {
                code: libc::EBUSY,
                name: "EBUSY",
                cmd: "Frame".to_string(),
            })
        );
    }

    #[test]
    fn test_ack_and_end_of_dump() -> Result<()> {
        let ack = NlPayload::Ack(Nlmsgerr {
            error: 0,
            nlmsg: header(8, ()),
        });
        assert!(matches!(
            sort_reply(Ok(Some(message(8, ack))), 8, "GetInterface")?,
            Reply::Done
        ));
        assert!(matches!(
            sort_reply(Ok(Some(message(8, NlPayload::Empty))), 8, "GetInterface")?,
            Reply::Done
        ));
        assert!(matches!(
            sort_reply::<u16, Nl80211Payload>(Ok(None), 8, "GetInterface")?,
            Reply::Done
        ));
        assert!(matches!(
            sort_reply(
                Ok(Some(message(3, NlPayload::Payload(new_interface())))),
                8,
                "GetInterface"
            )?,
            Reply::Stale
        ));
        Ok(())
    }

    #[test]
    fn test_missing_family() {
        init_logger();
        let err = sort_reply(Err(rejected(RESOLVE_SEQ, libc::ENOENT)), RESOLVE_SEQ, "lookup")
            .map_err(family_lookup_error)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<NanError>(),
            Some(&NanError::FamilyUnavailable)
        );

        let err = sort_reply(Err(rejected(RESOLVE_SEQ, libc::EPERM)), RESOLVE_SEQ, "lookup")
            .map_err(family_lookup_error)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NanError>(),
            Some(NanError::Kernel { code, .. }) if *code == libc::EPERM
        ));
    }

    #[test]
    fn test_poll_timeout_bounds() {
        assert_eq!(poll_timeout_ms(Duration::ZERO), 100);
        assert_eq!(poll_timeout_ms(Duration::from_secs(5)), 5000);
        assert_eq!(poll_timeout_ms(Duration::from_secs(u64::MAX)), 60_000);
    }
}
