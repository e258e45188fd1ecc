//! This module provides constants for interacting with the nl80211
//! subsystem in the Linux kernel. The values mirror `linux/nl80211.h`; only
//! the commands and attributes the NAN transport touches are named, anything
//! else decodes to the `UnrecognizedConst` variant neli generates.

/// The generic netlink family name for nl80211.
pub const NL80211_GENL_NAME: &str = "nl80211";

/// Multicast groups joined by the event channel.
pub const NL80211_MCAST_GROUPS: &[&str] =
    &["config", "scan", "regulatory", "mlme", "vendor", "nan"];

/// Enum representing various nl80211 commands.
#[neli::neli_enum(serialized_type = "u8")]
pub enum Nl80211Command {
    Unspecified = 0,
    /// Get wireless physical device information.
    GetWiPhy = 1,
    SetWiPhy = 2,
    /// Reply to `GetWiPhy`.
    NewWiPhy = 3,
    DelWiPhy = 4,
    GetInterface = 5,
    SetInterface = 6,
    /// Create a virtual interface, also the reply to `GetInterface`.
    NewInterface = 7,
    DelInterface = 8,
    GetStation = 17,
    SetStation = 18,
    NewStation = 19,
    DelStation = 20,
    TriggerScan = 33,
    NewScanResults = 34,
    RemainOnChannel = 55,
    CancelRemainOnChannel = 56,
    /// Ask for matching management frames to be delivered to the socket.
    RegisterFrame = 58,
    /// Transmit a management frame, or a received frame notification.
    Frame = 59,
    FrameTxStatus = 60,
    NotifyCqm = 64,
    FrameWaitCancel = 67,
}

/// Implement the `Cmd` trait for `Nl80211Command` to use it as a generic netlink command.
impl neli::consts::genl::Cmd for Nl80211Command {}

/// Enum representing the nl80211 attributes.
#[neli::neli_enum(serialized_type = "u16")]
pub enum Nl80211Attribute {
    Unspecified = 0,
    Wiphy = 1,
    WiphyName = 2,
    Ifindex = 3,
    Ifname = 4,
    Iftype = 5,
    Mac = 6,
    StaInfo = 21,
    WiphyBands = 22,
    SupportedIftypes = 32,
    WiphyFreq = 38,
    WiphyChannelType = 39,
    Generation = 46,
    Frame = 51,
    Duration = 87,
    Cookie = 88,
    FrameMatch = 91,
    Ack = 92,
    WiphyTxPowerLevel = 98,
    TxFrameTypes = 99,
    RxFrameTypes = 100,
    FrameType = 101,
    OffchannelTxOk = 108,
    InterfaceCombinations = 120,
    SoftwareIftypes = 121,
    DontWaitForAck = 142,
    SplitWiphyDump = 174,
    RxSignalDbm = 151,
    Wdev = 153,
}

/// Implement the `NlAttrType` trait for `Nl80211Attribute` to use it as a generic netlink attribute type.
impl neli::consts::genl::NlAttrType for Nl80211Attribute {}

/// Enum representing various nl80211 interface types.
#[neli::neli_enum(serialized_type = "u16")]
pub enum Nl80211Iftype {
    IftypeUnspecified = 0,
    IftypeAdhoc = 1,
    IftypeStation = 2,
    IftypeAp = 3,
    IftypeApVlan = 4,
    IftypeWds = 5,
    IftypeMonitor = 6,
    IftypeMeshPoint = 7,
    IftypeP2pClient = 8,
    IftypeP2pGo = 9,
    IftypeP2pDevice = 10,
    IftypeOcb = 11,
    IftypeNan = 12,
}

/// Nested attributes of `NL80211_ATTR_STA_INFO`.
#[neli::neli_enum(serialized_type = "u16")]
pub enum Nl80211StaInfo {
    Invalid = 0,
    InactiveTime = 1,
    RxBytes = 2,
    TxBytes = 3,
    Signal = 7,
    RxPackets = 9,
    TxPackets = 10,
    TxRetries = 11,
    TxFailed = 12,
    ConnectedTime = 16,
    BeaconLoss = 18,
    RxBytes64 = 23,
    TxBytes64 = 24,
}

/// Frame control value for management/action frames, used when
/// registering for frame notifications.
pub const FRAME_TYPE_ACTION: u16 = 0x00D0;
