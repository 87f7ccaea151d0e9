// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The integer hash used for commitments and Fiat-Shamir challenges.
//!
//! `sha512_256i` hashes a sequence of non-negative integers with SHA-512/256.
//! Each integer contributes its minimal big-endian encoding preceded by the
//! encoding's byte length as a fixed-width prefix, so `(1, 23)` and `(12, 3)`
//! hash differently. Every challenge and commitment in the protocol is
//! defined over this exact construction; it is not interchangeable with
//! another hash.

use libpaillier::unknown_order::BigNumber;
use sha2::{Digest, Sha512_256};

/// Hash a sequence of integers into a non-negative integer of at most 256
/// bits.
pub(crate) fn sha512_256i(inputs: &[&BigNumber]) -> BigNumber {
    let mut hasher = Sha512_256::new();
    for input in inputs {
        let bytes = input.to_bytes();
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(&bytes);
    }
    BigNumber::from_slice(hasher.finalize())
}

/// Convenience variant of [`sha512_256i`] over a single integer.
pub(crate) fn sha512_256i_one(input: &BigNumber) -> BigNumber {
    sha512_256i(&[input])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = BigNumber::from(42);
        let b = BigNumber::from(1_000_003);
        assert_eq!(sha512_256i(&[&a, &b]), sha512_256i(&[&a, &b]));
        assert_ne!(sha512_256i(&[&a, &b]), sha512_256i(&[&b, &a]));
        assert_eq!(sha512_256i_one(&a), sha512_256i(&[&a]));
    }

    #[test]
    fn length_prefix_disambiguates_concatenation() {
        // (0x01, 0x0203) and (0x0102, 0x03) concatenate to the same byte
        // string; the length prefixes must keep them apart.
        let left = sha512_256i(&[&BigNumber::from(0x01), &BigNumber::from(0x0203)]);
        let right = sha512_256i(&[&BigNumber::from(0x0102), &BigNumber::from(0x03)]);
        assert_ne!(left, right);
    }

    #[test]
    fn output_fits_in_challenge_width() {
        let c = sha512_256i_one(&BigNumber::from(100));
        assert!(c.bit_length() <= 256);
        assert!(c >= BigNumber::zero());
    }
}
