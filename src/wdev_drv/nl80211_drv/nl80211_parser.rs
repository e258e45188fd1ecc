//! This module turns nl80211 attribute lists into typed values and back.
//!
//! Every attribute is a `{type, data}` pair. The attributes the transport
//! cares about decode into a variant of `Nl80211Attr`; anything else is kept
//! as `Nl80211Attr::Unknown` with its raw bytes so enumeration stays forward
//! compatible and the value is still available for diagnostics. Nested
//! attributes (station info, supported interface types, bands) are decoded
//! by running the same type-length-value walk over the attribute data.

use anyhow::anyhow;
use log::trace;
use neli::{
    genl::{Genlmsghdr, Nlattr},
    types::Buffer,
};

use super::nl80211_const::{
    Nl80211Attribute, Nl80211Command, Nl80211Iftype, Nl80211StaInfo,
};
use crate::error::Result;
use crate::wdev_drv::MacAddr;

/// Netlink attribute header size, also the alignment of every attribute.
const NLA_HDRLEN: usize = 4;
/// Strips the nested and network byte order flags from an attribute type.
const NLA_TYPE_MASK: u16 = 0x3FFF;

/// A decoded nl80211 attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Nl80211Attr {
    Wiphy(u32),
    WiphyName(String),
    Ifindex(u32),
    Ifname(String),
    Iftype(Nl80211Iftype),
    Mac(MacAddr),
    Wdev(u64),
    WiphyFreq(u32),
    Generation(u32),
    Frame(Vec<u8>),
    FrameType(u16),
    FrameMatch(Vec<u8>),
    Duration(u32),
    Cookie(u64),
    RxSignalDbm(i32),
    Ack,
    OffchannelTxOk,
    DontWaitForAck,
    /// Asks for the full wiphy description split over several messages.
    SplitWiphyDump,
    SupportedIftypes(Vec<Nl80211Iftype>),
    /// Number of bands advertised by the radio.
    WiphyBands(usize),
    StaInfo(Vec<StaInfoAttr>),
    /// Attribute without a typed decoder, kept verbatim.
    Unknown(u16, Vec<u8>),
}

/// A decoded `NL80211_ATTR_STA_INFO` entry.
#[derive(Debug, Clone, PartialEq)]
pub enum StaInfoAttr {
    InactiveTimeMs(u32),
    ConnectedTimeSecs(u32),
    RxBytes(u64),
    TxBytes(u64),
    RxPackets(u32),
    TxPackets(u32),
    TxRetries(u32),
    TxFailed(u32),
    BeaconLoss(u32),
    SignalDbm(i8),
    Unknown(u16, Vec<u8>),
}

impl Nl80211Attr {
    /// The nl80211 attribute type this value is carried in.
    pub fn kind(&self) -> Nl80211Attribute {
        match self {
            Nl80211Attr::Wiphy(_) => Nl80211Attribute::Wiphy,
            Nl80211Attr::WiphyName(_) => Nl80211Attribute::WiphyName,
            Nl80211Attr::Ifindex(_) => Nl80211Attribute::Ifindex,
            Nl80211Attr::Ifname(_) => Nl80211Attribute::Ifname,
            Nl80211Attr::Iftype(_) => Nl80211Attribute::Iftype,
            Nl80211Attr::Mac(_) => Nl80211Attribute::Mac,
            Nl80211Attr::Wdev(_) => Nl80211Attribute::Wdev,
            Nl80211Attr::WiphyFreq(_) => Nl80211Attribute::WiphyFreq,
            Nl80211Attr::Generation(_) => Nl80211Attribute::Generation,
            Nl80211Attr::Frame(_) => Nl80211Attribute::Frame,
            Nl80211Attr::FrameType(_) => Nl80211Attribute::FrameType,
            Nl80211Attr::FrameMatch(_) => Nl80211Attribute::FrameMatch,
            Nl80211Attr::Duration(_) => Nl80211Attribute::Duration,
            Nl80211Attr::Cookie(_) => Nl80211Attribute::Cookie,
            Nl80211Attr::RxSignalDbm(_) => Nl80211Attribute::RxSignalDbm,
            Nl80211Attr::Ack => Nl80211Attribute::Ack,
            Nl80211Attr::OffchannelTxOk => Nl80211Attribute::OffchannelTxOk,
            Nl80211Attr::DontWaitForAck => Nl80211Attribute::DontWaitForAck,
            Nl80211Attr::SplitWiphyDump => Nl80211Attribute::SplitWiphyDump,
            Nl80211Attr::SupportedIftypes(_) => {
                Nl80211Attribute::SupportedIftypes
            }
            Nl80211Attr::WiphyBands(_) => Nl80211Attribute::WiphyBands,
            Nl80211Attr::StaInfo(_) => Nl80211Attribute::StaInfo,
            Nl80211Attr::Unknown(id, _) => Nl80211Attribute::from(*id),
        }
    }

    /// Decodes the data of one attribute of type `kind`.
    ///
    /// Attribute types without a typed decoder, and typed attributes whose
    /// payload has an unexpected size, are returned as `Unknown`.
    pub fn decode(kind: Nl80211Attribute, data: &[u8]) -> Self {
        Self::decode_typed(kind, data).unwrap_or_else(|| {
            trace!("Keeping {:?} ({} bytes) undecoded", kind, data.len());
            Nl80211Attr::Unknown(u16::from(kind), data.to_vec())
        })
    }

    fn decode_typed(kind: Nl80211Attribute, data: &[u8]) -> Option<Self> {
        let attr = match kind {
            Nl80211Attribute::Wiphy => Nl80211Attr::Wiphy(read_u32(data)?),
            Nl80211Attribute::WiphyName => {
                Nl80211Attr::WiphyName(read_string(data))
            }
            Nl80211Attribute::Ifindex => Nl80211Attr::Ifindex(read_u32(data)?),
            Nl80211Attribute::Ifname => Nl80211Attr::Ifname(read_string(data)),
            Nl80211Attribute::Iftype => Nl80211Attr::Iftype(
                Nl80211Iftype::from(read_u32(data)? as u16),
            ),
            Nl80211Attribute::Mac if data.len() == 6 => {
                Nl80211Attr::Mac(MacAddr::from_slice(data)?)
            }
            Nl80211Attribute::Wdev => Nl80211Attr::Wdev(read_u64(data)?),
            Nl80211Attribute::WiphyFreq => {
                Nl80211Attr::WiphyFreq(read_u32(data)?)
            }
            Nl80211Attribute::Generation => {
                Nl80211Attr::Generation(read_u32(data)?)
            }
            Nl80211Attribute::Frame => Nl80211Attr::Frame(data.to_vec()),
            Nl80211Attribute::FrameType => {
                Nl80211Attr::FrameType(read_u16(data)?)
            }
            Nl80211Attribute::FrameMatch => {
                Nl80211Attr::FrameMatch(data.to_vec())
            }
            Nl80211Attribute::Duration => Nl80211Attr::Duration(read_u32(data)?),
            Nl80211Attribute::Cookie => Nl80211Attr::Cookie(read_u64(data)?),
            Nl80211Attribute::RxSignalDbm => {
                Nl80211Attr::RxSignalDbm(read_u32(data)? as i32)
            }
            Nl80211Attribute::Ack => Nl80211Attr::Ack,
            Nl80211Attribute::OffchannelTxOk => Nl80211Attr::OffchannelTxOk,
            Nl80211Attribute::DontWaitForAck => Nl80211Attr::DontWaitForAck,
            Nl80211Attribute::SplitWiphyDump => Nl80211Attr::SplitWiphyDump,
            Nl80211Attribute::SupportedIftypes => {
                // One flag attribute per supported type, the type is the id
                let iftypes = nested_attrs(data)
                    .ok()?
                    .into_iter()
                    .map(|(id, _)| Nl80211Iftype::from(id))
                    .collect();
                Nl80211Attr::SupportedIftypes(iftypes)
            }
            Nl80211Attribute::WiphyBands => {
                Nl80211Attr::WiphyBands(nested_attrs(data).ok()?.len())
            }
            Nl80211Attribute::StaInfo => {
                let info = nested_attrs(data)
                    .ok()?
                    .into_iter()
                    .map(|(id, value)| StaInfoAttr::decode(id, value))
                    .collect();
                Nl80211Attr::StaInfo(info)
            }
            _ => return None,
        };

        Some(attr)
    }

    /// Encodes the value as a neli attribute ready to be pushed on a
    /// `GenlBuffer`.
    pub fn to_nlattr(&self) -> Result<Nlattr<Nl80211Attribute, Buffer>> {
        let kind = self.kind();
        let attr = match self {
            Nl80211Attr::Wiphy(v)
            | Nl80211Attr::Ifindex(v)
            | Nl80211Attr::WiphyFreq(v)
            | Nl80211Attr::Generation(v)
            | Nl80211Attr::Duration(v) => Nlattr::new(false, false, kind, *v)?,
            Nl80211Attr::Iftype(t) => {
                Nlattr::new(false, false, kind, u16::from(*t) as u32)?
            }
            Nl80211Attr::RxSignalDbm(v) => {
                Nlattr::new(false, false, kind, *v as u32)?
            }
            Nl80211Attr::Wdev(v) | Nl80211Attr::Cookie(v) => {
                Nlattr::new(false, false, kind, *v)?
            }
            Nl80211Attr::FrameType(v) => Nlattr::new(false, false, kind, *v)?,
            Nl80211Attr::WiphyName(name) | Nl80211Attr::Ifname(name) => {
                Nlattr::new(false, false, kind, name.as_str())?
            }
            Nl80211Attr::Mac(mac) => {
                Nlattr::new(false, false, kind, mac.octets().to_vec())?
            }
            Nl80211Attr::Frame(bytes)
            | Nl80211Attr::FrameMatch(bytes)
            | Nl80211Attr::Unknown(_, bytes) => {
                Nlattr::new(false, false, kind, bytes.clone())?
            }
            Nl80211Attr::Ack
            | Nl80211Attr::OffchannelTxOk
            | Nl80211Attr::DontWaitForAck
            | Nl80211Attr::SplitWiphyDump => {
                Nlattr::new(false, false, kind, Vec::<u8>::new())?
            }
            Nl80211Attr::SupportedIftypes(_)
            | Nl80211Attr::WiphyBands(_)
            | Nl80211Attr::StaInfo(_) => {
                return Err(anyhow!(
                    "attribute {:?} is reply only and cannot be encoded",
                    kind
                ));
            }
        };

        Ok(attr)
    }
}

impl StaInfoAttr {
    fn decode(id: u16, data: &[u8]) -> Self {
        Self::decode_typed(id, data)
            .unwrap_or_else(|| StaInfoAttr::Unknown(id, data.to_vec()))
    }

    fn decode_typed(id: u16, data: &[u8]) -> Option<Self> {
        let attr = match Nl80211StaInfo::from(id) {
            Nl80211StaInfo::InactiveTime => {
                StaInfoAttr::InactiveTimeMs(read_u32(data)?)
            }
            Nl80211StaInfo::ConnectedTime => {
                StaInfoAttr::ConnectedTimeSecs(read_u32(data)?)
            }
            Nl80211StaInfo::RxBytes => StaInfoAttr::RxBytes(read_u32(data)? as u64),
            Nl80211StaInfo::TxBytes => StaInfoAttr::TxBytes(read_u32(data)? as u64),
            Nl80211StaInfo::RxBytes64 => StaInfoAttr::RxBytes(read_u64(data)?),
            Nl80211StaInfo::TxBytes64 => StaInfoAttr::TxBytes(read_u64(data)?),
            Nl80211StaInfo::RxPackets => StaInfoAttr::RxPackets(read_u32(data)?),
            Nl80211StaInfo::TxPackets => StaInfoAttr::TxPackets(read_u32(data)?),
            Nl80211StaInfo::TxRetries => StaInfoAttr::TxRetries(read_u32(data)?),
            Nl80211StaInfo::TxFailed => StaInfoAttr::TxFailed(read_u32(data)?),
            Nl80211StaInfo::BeaconLoss => {
                StaInfoAttr::BeaconLoss(read_u32(data)?)
            }
            Nl80211StaInfo::Signal => StaInfoAttr::SignalDbm(*data.first()? as i8),
            _ => return None,
        };

        Some(attr)
    }
}

/// Decodes all the attributes of a generic netlink nl80211 message.
/// Attributes that don't decode are kept as `Unknown`, never dropped.
pub fn parse_nl80211_payload(
    gen_msg: &Genlmsghdr<Nl80211Command, Nl80211Attribute>,
) -> Vec<Nl80211Attr> {
    trace!("Received message {:?}", gen_msg);

    let attr_handle = gen_msg.get_attr_handle();
    attr_handle
        .iter()
        .map(|attr| {
            Nl80211Attr::decode(attr.nla_type.nla_type, attr.nla_payload.as_ref())
        })
        .collect()
}

/// Splits the data of a nested attribute into its `(type, data)` pairs.
///
/// Fails when an attribute header declares more bytes than are left, so a
/// corrupted nested list never yields partial results.
pub fn nested_attrs(data: &[u8]) -> Result<Vec<(u16, &[u8])>> {
    let mut attrs = Vec::new();
    let mut rest = data;

    while rest.len() >= NLA_HDRLEN {
        let len = u16::from_ne_bytes([rest[0], rest[1]]) as usize;
        let id = u16::from_ne_bytes([rest[2], rest[3]]) & NLA_TYPE_MASK;

        if len < NLA_HDRLEN || len > rest.len() {
            return Err(anyhow!(
                "nested attribute {} declares {} bytes, {} left",
                id,
                len,
                rest.len()
            ));
        }

        attrs.push((id, &rest[NLA_HDRLEN..len]));

        let aligned = (len + NLA_HDRLEN - 1) & !(NLA_HDRLEN - 1);
        rest = &rest[aligned.min(rest.len())..];
    }

    Ok(attrs)
}

fn read_u16(data: &[u8]) -> Option<u16> {
    Some(u16::from_ne_bytes(data.try_into().ok()?))
}

fn read_u32(data: &[u8]) -> Option<u32> {
    Some(u32::from_ne_bytes(data.try_into().ok()?))
}

fn read_u64(data: &[u8]) -> Option<u64> {
    Some(u64::from_ne_bytes(data.try_into().ok()?))
}

/// Netlink strings are NUL terminated.
fn read_string(data: &[u8]) -> String {
    String::from_utf8_lossy(data).trim_end_matches('\0').to_string()
}
