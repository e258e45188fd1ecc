//! Follow-up frame: a service descriptor addressed to one peer, used to
//! deliver a small payload.

use super::{check_payload, FrameBuf, SERVICE_ID};
use crate::error::Result;
use crate::wdev_drv::MacAddr;

const ATTR_OFFSET: usize = 30;
/// Instance id of the sending service.
const FOLLOWUP_INSTANCE_ID: u8 = 0x80;
const CONTROL_FOLLOWUP: u8 = 0x12;

/// Frame length without the payload.
pub const FOLLOWUP_FIXED_LEN: usize = 43;

impl FrameBuf {
    /// Writes a follow-up frame from `src` to `dst`; `port` is the requestor
    /// instance id the peer listens on. Returns the frame length.
    pub fn build_followup(
        &mut self, src: MacAddr, dst: MacAddr, port: u8, payload: &[u8],
    ) -> Result<usize> {
        check_payload(payload.len(), FOLLOWUP_FIXED_LEN)?;

        let mut off = self.put_action_head(src.octets(), dst.octets());
        debug_assert_eq!(off, ATTR_OFFSET);

        // Service id, two instance ids, control and length follow the header
        let attr_len = (payload.len() + 10) as u16;
        off = self.put(off, &[0x03]);
        off = self.put(off, &attr_len.to_le_bytes());
        off = self.put(off, &SERVICE_ID);
        off = self.put(
            off,
            &[FOLLOWUP_INSTANCE_ID, port, CONTROL_FOLLOWUP, payload.len() as u8],
        );

        Ok(self.put(off, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nan_frame::ie::IeList;
    use crate::nan_frame::NAN_BSSID;

    const SRC: MacAddr = MacAddr([0x38, 0xBA, 0xF8, 0x49, 0xD3, 0xBF]);

    #[test]
    fn test_layout() -> Result<()> {
        let mut buf = FrameBuf::new();
        let len = buf.build_followup(SRC, MacAddr::BROADCAST, 7, b"ping")?;
        let frame = buf.frame(len);

        assert_eq!(len, 47);
        assert_eq!(&frame[4..10], &[0xFF; 6]);
        assert_eq!(&frame[10..16], SRC.octets());
        assert_eq!(&frame[16..22], &NAN_BSSID);
        assert_eq!(&frame[24..30], &[0x04, 0x09, 0x50, 0x6F, 0x9A, 0x13]);
        assert_eq!(&frame[30..33], &[0x03, 14, 0]);
        assert_eq!(&frame[33..39], &SERVICE_ID);
        assert_eq!(&frame[39..43], &[0x80, 7, 0x12, 4]);
        assert_eq!(&frame[43..], b"ping");
        Ok(())
    }

    #[test]
    fn test_unicast_destination() -> Result<()> {
        let dst = MacAddr([2, 0, 0, 0, 0, 9]);
        let mut buf = FrameBuf::new();
        let len = buf.build_followup(SRC, dst, 1, &[])?;
        let frame = buf.frame(len);

        assert_eq!(&frame[4..10], dst.octets());
        let attrs = IeList::parse(&frame[30..])?;
        assert_eq!(attrs.len(), 1);
        Ok(())
    }

    #[test]
    fn test_payload_limit() {
        let mut buf = FrameBuf::new();
        assert!(buf.build_followup(SRC, MacAddr::BROADCAST, 1, &[0; 255]).is_ok());
        assert!(buf.build_followup(SRC, MacAddr::BROADCAST, 1, &[0; 256]).is_err());
    }
}
