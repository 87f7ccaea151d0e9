// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Hash commitments with randomness.
//!
//! A commitment to a sequence of integers is `C = H(r, secrets...)` for a
//! fresh 256-bit `r`; the decommitment `D = (r, secrets...)` opens it. The
//! randomness always precedes the payload in `D`.
//!
//! The module also provides the length-prefixed container used to flatten
//! several integer sequences into one (the discrete log proof serializes its
//! two arrays through it).

use crate::{
    errors::{CallerError, Result},
    hashing::sha512_256i,
    utils::random_bn_by_bitlen,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Bit length of the commitment randomness `r`.
const COMMITMENT_RANDOMNESS_BITS: usize = 256;

/// A hiding, binding commitment to a sequence of integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct HashCommitment {
    commitment: BigNumber,
}

/// The opening of a [`HashCommitment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct HashDecommitment {
    /// The randomness followed by the committed secrets.
    parts: Vec<BigNumber>,
}

/// Commit to `secrets` with fresh randomness.
pub(crate) fn commit<R: RngCore + CryptoRng>(
    rng: &mut R,
    secrets: &[BigNumber],
) -> Result<(HashCommitment, HashDecommitment)> {
    let r = random_bn_by_bitlen(rng, COMMITMENT_RANDOMNESS_BITS)?;
    Ok(commit_with_randomness(r, secrets))
}

/// Commit to `secrets` with the given randomness.
pub(crate) fn commit_with_randomness(
    r: BigNumber,
    secrets: &[BigNumber],
) -> (HashCommitment, HashDecommitment) {
    let mut parts = Vec::with_capacity(secrets.len() + 1);
    parts.push(r);
    parts.extend_from_slice(secrets);
    let commitment = sha512_256i(&parts.iter().collect::<Vec<_>>());
    (HashCommitment { commitment }, HashDecommitment { parts })
}

impl HashCommitment {
    /// Whether `decommitment` opens this commitment.
    pub(crate) fn verify(&self, decommitment: &HashDecommitment) -> bool {
        let recomputed = sha512_256i(&decommitment.parts.iter().collect::<Vec<_>>());
        recomputed == self.commitment
    }
}

impl HashDecommitment {
    /// Open `commitment`, returning the committed secrets without the
    /// randomness.
    pub(crate) fn decommit(&self, commitment: &HashCommitment) -> Result<&[BigNumber]> {
        if !commitment.verify(self) {
            error!("Decommitment does not match the commitment it claims to open");
            Err(CallerError::BadInput)?;
        }
        Ok(&self.parts[1..])
    }
}

/// Concatenate several integer sequences into one, prefixing each sequence
/// with its length.
pub(crate) fn build_parts(parts: &[&[BigNumber]]) -> Vec<BigNumber> {
    let mut flat = Vec::with_capacity(parts.iter().map(|p| p.len() + 1).sum());
    for part in parts {
        flat.push(BigNumber::from(part.len()));
        flat.extend_from_slice(part);
    }
    flat
}

/// Split a container built by [`build_parts`] back into its sequences.
pub(crate) fn parse_parts(flat: &[BigNumber]) -> Result<Vec<Vec<BigNumber>>> {
    let mut parts = Vec::new();
    let mut index = 0;
    while index < flat.len() {
        let length = &flat[index];
        // Lengths beyond the container size are malformed; this also caps
        // the usize conversion.
        if length < &BigNumber::zero() || length > &BigNumber::from(flat.len()) {
            error!("Malformed part length in integer container");
            Err(CallerError::DeserializationFailed)?;
        }
        let length_bytes = length.to_bytes();
        let mut length_usize = 0usize;
        for byte in length_bytes {
            length_usize = (length_usize << 8) | byte as usize;
        }
        index += 1;
        if index + length_usize > flat.len() {
            error!("Integer container part runs past the end of the input");
            Err(CallerError::DeserializationFailed)?;
        }
        parts.push(flat[index..index + length_usize].to_vec());
        index += length_usize;
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn commit_and_decommit_round_trip() {
        let mut rng = init_testing();
        let secrets = vec![BigNumber::from(42), BigNumber::from(1_000_003)];
        let (commitment, decommitment) = commit(&mut rng, &secrets).unwrap();
        assert!(commitment.verify(&decommitment));
        assert_eq!(decommitment.decommit(&commitment).unwrap(), &secrets[..]);
    }

    #[test]
    fn mutated_decommitment_fails() {
        let mut rng = init_testing();
        let secrets = vec![BigNumber::from(42), BigNumber::from(1_000_003)];
        let (commitment, decommitment) = commit(&mut rng, &secrets).unwrap();

        // Mutate the first committed secret from 42 to 43.
        let mut mutated = decommitment.clone();
        mutated.parts[1] = BigNumber::from(43);
        assert!(!commitment.verify(&mutated));
        assert!(mutated.decommit(&commitment).is_err());

        // Mutating the randomness also breaks the opening.
        let mut mutated = decommitment;
        mutated.parts[0] = &mutated.parts[0] + BigNumber::one();
        assert!(!commitment.verify(&mutated));
    }

    #[test]
    fn randomness_precedes_payload() {
        let secrets = vec![BigNumber::from(7)];
        let (commitment, decommitment) =
            commit_with_randomness(BigNumber::from(99), &secrets);
        assert_eq!(decommitment.parts[0], BigNumber::from(99));
        assert_eq!(decommitment.decommit(&commitment).unwrap(), &secrets[..]);
    }

    #[test]
    fn part_container_round_trip() {
        let first: Vec<_> = (0..5).map(BigNumber::from).collect();
        let second: Vec<_> = (10..12).map(BigNumber::from).collect();
        let flat = build_parts(&[&first, &second]);
        assert_eq!(flat.len(), first.len() + second.len() + 2);
        let parts = parse_parts(&flat).unwrap();
        assert_eq!(parts, vec![first, second]);
    }

    #[test]
    fn part_container_rejects_truncation() {
        let first: Vec<_> = (0..5).map(BigNumber::from).collect();
        let flat = build_parts(&[&first]);
        assert!(parse_parts(&flat[..flat.len() - 1]).is_err());
    }
}
