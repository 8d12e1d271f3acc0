//! DNS Header Classifier
//!
//! Only the fixed 12-byte header prefix is inspected:
//!
//! ```text
//!  0  1  2  3  4  5  6  7  8  9  a  b  c  d  e  f
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                        ID                     |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |QR|   Opcode  |AA|TC|RD|RA|    Z   |   RCODE   |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |            QDCOUNT / ANCOUNT / ...            |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! ```

/// Size of the fixed DNS header
pub const DNS_HEADER_SIZE: usize = 12;

/// Byte offset of the first flags byte (QR, Opcode, AA, TC, RD)
pub const FLAGS_OFFSET: usize = 2;

/// QR bit within the first flags byte
pub const QR_BIT: u8 = 0x80;

/// TC bit within the first flags byte
pub const TC_BIT: u8 = 0x02;

/// Classification of a UDP payload on the DNS port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DnsHeaderKind {
    /// QR clear
    Query,
    /// QR set
    Response,
    /// Shorter than a DNS header
    Invalid,
}

/// Classify a UDP payload by its DNS header.
///
/// Never reads past `payload.len()`.
#[inline]
pub fn classify(payload: &[u8]) -> DnsHeaderKind {
    if payload.len() < DNS_HEADER_SIZE {
        return DnsHeaderKind::Invalid;
    }

    if payload[FLAGS_OFFSET] & QR_BIT != 0 {
        DnsHeaderKind::Response
    } else {
        DnsHeaderKind::Query
    }
}

/// Copy out the fixed header of a payload already classified as a query.
pub fn header_prefix(payload: &[u8]) -> Option<[u8; DNS_HEADER_SIZE]> {
    payload.get(..DNS_HEADER_SIZE)?.try_into().ok()
}
