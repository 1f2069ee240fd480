// vpt-core/src/core/hashing.rs
// ============================================================================
// Module: Core Hashing
// Description: Content hashing used to fingerprint AI plan cache entries.
// Purpose: Provide a single, deterministic hex digest function shared by
//          every caller that needs a fingerprint instead of reaching for
//          the md5 crate directly.
// Dependencies: md-5
// ============================================================================

//! ## Overview
//! The AI plan cache keys entries by `md5(normalized_prompt ∥ device_model ∥
//! ui_name ∥ sorted(available_nodes))`. This module owns the digest and hex
//! encoding so the fingerprint formula lives in exactly one place
//! ([`crate::ai_cache::fingerprint`]).

use md5::Digest;
use md5::Md5;

/// Returns the lowercase hex MD5 digest of the given bytes.
#[must_use]
pub fn md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_hex_is_deterministic() {
        let a = md5_hex(b"go to live tv\x1fandroid_mobile\x1fhorizon_android_mobile\x1fhome,live");
        let b = md5_hex(b"go to live tv\x1fandroid_mobile\x1fhorizon_android_mobile\x1fhome,live");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn md5_hex_changes_with_input() {
        let a = md5_hex(b"home");
        let b = md5_hex(b"live");
        assert_ne!(a, b);
    }
}
