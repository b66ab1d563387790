//! NMEA 0183 sentence checks.
//!
//! Only the checksum is inspected; field parsing is left to whoever
//! consumes the forwarded stream.

/// Result of checking a sentence's `*hh` trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checksum {
    /// Trailer present and matches.
    Valid,
    /// Trailer present and does not match.
    Mismatch { expected: u8, computed: u8 },
    /// No `*hh` trailer (some receivers omit it on proprietary sentences).
    Absent,
    /// Not a `$` sentence or the trailer is not two hex digits.
    Malformed,
}

impl Checksum {
    /// Sentences without a trailer are let through.
    pub fn is_acceptable(self) -> bool {
        matches!(self, Self::Valid | Self::Absent)
    }
}

/// XOR of every byte between `$` and `*`.
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0, |acc, b| acc ^ b)
}

/// Check a complete sentence, terminator already stripped.
pub fn verify_checksum(sentence: &[u8]) -> Checksum {
    let Some(rest) = sentence.strip_prefix(b"$") else {
        return Checksum::Malformed;
    };
    let Some(star) = rest.iter().rposition(|&b| b == b'*') else {
        return Checksum::Absent;
    };
    let (body, trailer) = (&rest[..star], &rest[star + 1..]);
    let expected = match trailer {
        [hi, lo] => match (hex_nibble(*hi), hex_nibble(*lo)) {
            (Some(hi), Some(lo)) => (hi << 4) | lo,
            _ => return Checksum::Malformed,
        },
        _ => return Checksum::Malformed,
    };
    let computed = checksum(body);
    if computed == expected {
        Checksum::Valid
    } else {
        Checksum::Mismatch { expected, computed }
    }
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}
