//! Information element lists: `{id: u8, length: u16 LE, data}` runs.
//!
//! `IeList::parse` validates the whole buffer up front, so a malformed list
//! fails as a unit and never yields a partial result. Iterating a validated
//! list is lazy and can be restarted at will.

use crate::error::{NanError, Result};

/// Size of the `{id, length}` header.
pub const IE_HEADER_LEN: usize = 3;

/// One element, borrowing its data from the parsed buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ie<'a> {
    pub id: u8,
    pub data: &'a [u8],
}

/// A validated list of elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IeList<'a> {
    buf: &'a [u8],
}

impl<'a> IeList<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self> {
        let mut rest = buf;
        while !rest.is_empty() {
            let (_, tail) = split_ie(rest)?;
            rest = tail;
        }
        Ok(Self { buf })
    }

    pub fn iter(&self) -> IeIter<'a> {
        IeIter { rest: self.buf }
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The raw bytes the list was parsed from.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.buf
    }
}

impl<'a> IntoIterator for &IeList<'a> {
    type Item = Ie<'a>;
    type IntoIter = IeIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct IeIter<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for IeIter<'a> {
    type Item = Ie<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        // The list was validated by `IeList::parse`
        let (ie, tail) = split_ie(self.rest).ok()?;
        self.rest = tail;
        Some(ie)
    }
}

fn split_ie(buf: &[u8]) -> Result<(Ie<'_>, &[u8])> {
    if buf.len() < IE_HEADER_LEN {
        return Err(NanError::ShortIe {
            remaining: buf.len(),
        }
        .into());
    }

    let id = buf[0];
    let len = u16::from_le_bytes([buf[1], buf[2]]) as usize;
    let body = &buf[IE_HEADER_LEN..];
    if len > body.len() {
        return Err(NanError::TruncatedIe {
            id,
            declared: len,
            remaining: body.len(),
        }
        .into());
    }

    Ok((
        Ie {
            id,
            data: &body[..len],
        },
        &body[len..],
    ))
}

/// Appends one element to `out`.
pub fn encode_ie(id: u8, data: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let len = u16::try_from(data.len()).map_err(|_| NanError::PayloadTooLarge {
        len: data.len(),
        max: u16::MAX as usize,
    })?;
    out.push(id);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(data);
    Ok(())
}

/// Encodes a whole list.
pub fn encode_ies<'a, I>(ies: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = Ie<'a>>,
{
    let mut out = Vec::new();
    for ie in ies {
        encode_ie(ie.id, ie.data, &mut out)?;
    }
    Ok(out)
}
