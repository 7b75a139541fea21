//! MAC address canonicalization.
//!
//! Devices report their MAC in whatever shape their firmware produces:
//! dashes, dots, lower-case, no separators. Uniqueness on Device.mac
//! only holds if every shape collapses to one canonical form before any
//! lookup, so canonicalization runs first and rejects anything that does
//! not contain exactly 12 hex digits.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid MAC format, expected AA:BB:CC:DD:EE:FF")]
pub struct InvalidMac;

/// Normalize to upper-case colon-separated sextets: `AA:BB:CC:DD:EE:FF`.
pub fn canonical_mac(raw: &str) -> Result<String, InvalidMac> {
    let hex: Vec<u8> = raw
        .bytes()
        .filter(|b| b.is_ascii_hexdigit())
        .map(|b| b.to_ascii_uppercase())
        .collect();

    if hex.len() != 12 {
        return Err(InvalidMac);
    }

    let mut out = String::with_capacity(17);
    for (i, pair) in hex.chunks(2).enumerate() {
        if i > 0 {
            out.push(':');
        }
        out.push(pair[0] as char);
        out.push(pair[1] as char);
    }
    Ok(out)
}
