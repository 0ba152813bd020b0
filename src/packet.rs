//! Wire-format definitions for SR-ARQ packets.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header fields, flags, payload).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Parsing a raw byte slice back into a borrowed [`Packet`], returning an
//!   error for truncated input.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! Every header field is a single byte, so byte order never comes into play.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Ack Num    |    Seq Num    |     Flags     |  Window Size  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload ...                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Flags use the low three bits: `FIN = 0x01`, `DATA = 0x02`, `ACK = 0x04`.
//! Total header size: [`HEADER_LEN`] = 4 bytes.

use thiserror::Error;

use crate::seq::Seq;

/// Bit-flag constants for the `flags` header field.
pub mod flags {
    /// End of stream.
    pub const FIN: u8 = 0b0000_0001;
    /// The packet carries payload tagged with `seq`.
    pub const DATA: u8 = 0b0000_0010;
    /// The `ack` field is valid.
    pub const ACK: u8 = 0b0000_0100;
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 4;

const OFF_ACK: usize = 0;
const OFF_SEQ: usize = 1;
const OFF_FLAGS: usize = 2;
const OFF_WINDOW: usize = 3;

/// Fixed-size protocol header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// Sequence number being acknowledged (valid with [`flags::ACK`]).
    pub ack: Seq,
    /// Sequence number of the payload (valid with [`flags::DATA`]).
    pub seq: Seq,
    /// Bitmask of [`flags`] constants.
    pub flags: u8,
    /// Window width advertised by the sender of this packet.
    pub window: u8,
}

impl Header {
    pub fn is_fin(&self) -> bool {
        self.flags & flags::FIN != 0
    }

    pub fn is_data(&self) -> bool {
        self.flags & flags::DATA != 0
    }

    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }
}

/// A complete protocol datagram: header + borrowed payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    pub header: Header,
    pub payload: &'a [u8],
}

impl<'a> Packet<'a> {
    /// A data packet carrying `payload` under sequence number `seq`.
    pub fn data(seq: Seq, window: u8, payload: &'a [u8]) -> Self {
        Packet {
            header: Header {
                ack: 0,
                seq,
                flags: flags::DATA,
                window,
            },
            payload,
        }
    }

    /// A pure acknowledgement of `ack`.
    pub fn ack(ack: Seq, window: u8) -> Self {
        Packet {
            header: Header {
                ack,
                seq: 0,
                flags: flags::ACK,
                window,
            },
            payload: &[],
        }
    }

    /// End-of-stream marker sent after the last data packet.
    pub fn fin(seq: Seq, window: u8) -> Self {
        Packet {
            header: Header {
                ack: 0,
                seq,
                flags: flags::FIN,
                window,
            },
            payload: &[],
        }
    }

    /// Serialise this packet into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.push(self.header.ack);
        buf.push(self.header.seq);
        buf.push(self.header.flags);
        buf.push(self.header.window);
        buf.extend_from_slice(self.payload);
        buf
    }

    /// Parse a [`Packet`] from a raw byte slice without copying the payload.
    ///
    /// Everything after the header is payload; an exactly header-sized buffer
    /// yields an empty payload.
    pub fn decode(buf: &'a [u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::PacketTooShort { len: buf.len() });
        }
        Ok(Packet {
            header: Header {
                ack: buf[OFF_ACK],
                seq: buf[OFF_SEQ],
                flags: buf[OFF_FLAGS],
                window: buf[OFF_WINDOW],
            },
            payload: &buf[HEADER_LEN..],
        })
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// Buffer shorter than the fixed header size.
    #[error("datagram of {len} byte(s) is shorter than the 4-byte header")]
    PacketTooShort { len: usize },
}
