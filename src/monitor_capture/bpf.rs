//! Classic BPF program attached to the monitor socket.
//!
//! Accepts the frames whose BSSID starts with `50:6F:9A:01`, the NAN cluster
//! prefix. Equivalent filter expression, on a radiotap capture:
//!
//! ```text
//! wlan[16:4] = 0x506f9a01
//! ```
//!
//! The radiotap header has a variable length, read from its bytes 2 and 3
//! (little endian) into the index register.

use libc::sock_filter;

const BPF_LDB_ABS: u16 = 0x30;
const BPF_LSH_K: u16 = 0x64;
const BPF_TAX: u16 = 0x07;
const BPF_OR_X: u16 = 0x4C;
const BPF_LDW_IND: u16 = 0x40;
const BPF_JEQ_K: u16 = 0x15;
const BPF_RET_K: u16 = 0x06;

/// First four BSSID bytes of NAN frames.
const NAN_BSSID_WORD: u32 = 0x506F_9A01;
/// Snap length of accepted frames.
const ACCEPT_LEN: u32 = 0x0004_0000;

const fn insn(code: u16, jt: u8, jf: u8, k: u32) -> sock_filter {
    sock_filter { code, jt, jf, k }
}

pub const NAN_BSSID_FILTER: [sock_filter; 10] = [
    insn(BPF_LDB_ABS, 0, 0, 3), // A = radiotap length high byte
    insn(BPF_LSH_K, 0, 0, 8),
    insn(BPF_TAX, 0, 0, 0),
    insn(BPF_LDB_ABS, 0, 0, 2), // A = low byte
    insn(BPF_OR_X, 0, 0, 0),
    insn(BPF_TAX, 0, 0, 0), // X = radiotap length
    insn(BPF_LDW_IND, 0, 0, 16), // A = BSSID[0..4]
    insn(BPF_JEQ_K, 0, 1, NAN_BSSID_WORD),
    insn(BPF_RET_K, 0, 0, ACCEPT_LEN),
    insn(BPF_RET_K, 0, 0, 0),
];
