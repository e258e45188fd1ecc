//! Service discovery frame (publish or subscribe).

use super::{check_payload, FrameBuf, NAN_GROUP_ADDR};
use crate::error::Result;
use crate::wdev_drv::MacAddr;

/// Device capability attribute, 2.4 GHz only.
const DEVICE_CAPABILITY: [u8; 12] = [
    0x0F, 0x09, 0x00, 0x00, 0x01, 0x00, 0x04, 0x01, 0x00, 0x00, 0x14, 0x00,
];

/// Availability attribute.
const AVAILABILITY: [u8; 30] = [
    0x12, 0x1B, 0x00, 0x0B, 0x01, 0x00, 0x16, 0x00, 0x1A, 0x10, 0x18, 0x00,
    0x04, 0xFE, 0xFF, 0xFF, 0x3F, 0x31, 0x51, 0xFF, 0x07, 0x00, 0x80, 0x20,
    0x00, 0x0F, 0x80, 0x01, 0x00, 0x0F,
];

/// Instance id of the local service.
pub const LOCAL_INSTANCE_ID: u8 = 1;

/// Service descriptor extension attribute.
const SERVICE_EXTENSION: [u8; 7] = [0x0E, 0x04, 0x00, LOCAL_INSTANCE_ID, 0x00, 0x02, 0x02];

/// Fixed part of the service descriptor attribute, up to the payload length.
const SERVICE_DESCRIPTOR: [u8; 13] = [
    0x03, // attribute id
    0x00, 0x00, // attribute length, computed
    0x75, 0x94, 0x31, 0x93, 0xEA, 0xC9, // service id
    LOCAL_INSTANCE_ID, // instance id
    0x00, // requestor instance id
    0x10, // service control
    0x00, // service info length, computed
];

pub const CONTROL_PUBLISH: u8 = 0x10;
pub const CONTROL_SUBSCRIBE: u8 = 0x11;

/// Offset of the service descriptor attribute in the frame.
pub const DESCRIPTOR_OFFSET: usize =
    30 + DEVICE_CAPABILITY.len() + AVAILABILITY.len() + SERVICE_EXTENSION.len();

const DESCRIPTOR_CONTROL: usize = 11;
const DESCRIPTOR_INFO_LEN: usize = 12;

/// Frame length without the payload.
pub const DISCOVERY_FIXED_LEN: usize = DESCRIPTOR_OFFSET + SERVICE_DESCRIPTOR.len();

/// Attribute length field for a payload of `payload_len` bytes: the fixed
/// descriptor minus its id and length header, plus the payload.
pub fn descriptor_len(payload_len: usize) -> u16 {
    (SERVICE_DESCRIPTOR.len() - 3 + payload_len) as u16
}

impl FrameBuf {
    /// Writes a discovery frame sent by `src` carrying `payload` as service
    /// info. Returns the frame length.
    pub fn build_discovery(
        &mut self, src: MacAddr, payload: &[u8], publish: bool,
    ) -> Result<usize> {
        check_payload(payload.len(), DISCOVERY_FIXED_LEN)?;

        let mut off = self.put_action_head(src.octets(), &NAN_GROUP_ADDR);
        off = self.put(off, &DEVICE_CAPABILITY);
        off = self.put(off, &AVAILABILITY);
        off = self.put(off, &SERVICE_EXTENSION);

        let desc = off;
        off = self.put(off, &SERVICE_DESCRIPTOR);
        self.put(desc + 1, &descriptor_len(payload.len()).to_le_bytes());
        self.bytes[desc + DESCRIPTOR_CONTROL] = if publish {
            CONTROL_PUBLISH
        } else {
            CONTROL_SUBSCRIBE
        };
        self.bytes[desc + DESCRIPTOR_INFO_LEN] = payload.len() as u8;

        Ok(self.put(off, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NanError;
    use crate::nan_frame::ie::IeList;
    use crate::nan_frame::{is_nan_action, MGMT_HEADER_LEN, NAN_BSSID};

    const MAC: MacAddr = MacAddr([0x38, 0xBA, 0xF8, 0x49, 0xD3, 0xBF]);

    #[test]
    fn test_length_field_single_byte_payload() -> Result<()> {
        let mut buf = FrameBuf::new();
        let len = buf.build_discovery(MAC, &[0x01], true)?;
        let frame = buf.frame(len);

        assert_eq!(DESCRIPTOR_OFFSET, 79);
        assert_eq!(len, 93);
        assert_eq!(frame[DESCRIPTOR_OFFSET], 0x03);
        assert_eq!(&frame[80..82], &[0x0B, 0x00]);
        assert_eq!(frame[90], CONTROL_PUBLISH);
        assert_eq!(frame[91], 1);
        assert_eq!(frame[92], 0x01);
        Ok(())
    }

    #[test]
    fn test_header() -> Result<()> {
        let mut buf = FrameBuf::new();
        let len = buf.build_discovery(MAC, b"hello", false)?;
        let frame = buf.frame(len);

        assert_eq!(&frame[0..2], &[0xD0, 0x00]);
        assert_eq!(&frame[4..10], &NAN_GROUP_ADDR);
        assert_eq!(&frame[10..16], MAC.octets());
        assert_eq!(&frame[16..22], &NAN_BSSID);
        assert!(is_nan_action(&frame[MGMT_HEADER_LEN..]));
        assert_eq!(frame[90], CONTROL_SUBSCRIBE);
        Ok(())
    }

    #[test]
    fn test_attributes_parse() -> Result<()> {
        let mut buf = FrameBuf::new();
        let len = buf.build_discovery(MAC, b"hello", true)?;
        let attrs = IeList::parse(&buf.frame(len)[30..])?;

        let ids: Vec<u8> = attrs.iter().map(|ie| ie.id).collect();
        assert_eq!(ids, vec![0x0F, 0x12, 0x0E, 0x03]);
        let descriptor = attrs.iter().last().unwrap();
        assert_eq!(descriptor.data.len(), 5 + 10);
        assert_eq!(&descriptor.data[10..], b"hello");
        Ok(())
    }

    #[test]
    fn test_payload_too_large() {
        let mut buf = FrameBuf::new();
        let err = buf.build_discovery(MAC, &[0u8; 256], true).unwrap_err();
        assert_eq!(
            err.downcast_ref::<NanError>(),
            Some(&NanError::PayloadTooLarge { len: 256, max: 255 })
        );
    }
}
