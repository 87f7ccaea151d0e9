// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Zero-knowledge proof of knowledge of a discrete logarithm over a
//! safe-prime product.
//!
//! The prover knows `x` with `h2 = h1^x mod N~`, where `N~` is the product
//! of two safe primes and the exponent lives modulo `p * q`, the order of
//! the quadratic residue group. Each party runs two of these in parallel
//! (for `x = alpha` and `x = alpha^-1`) to establish that `h1` and `h2`
//! generate the same subgroup.
//!
//! The proof is a Fiat-Shamir transform of 128 parallel repetitions of the
//! classic sigma protocol; bit `i` of the joint challenge selects which of
//! the two equations repetition `i` must satisfy.

use crate::{
    commitments::{build_parts, parse_parts},
    errors::{CallerError, Result},
    hashing::sha512_256i,
    utils::random_positive_bn,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::error;

/// Number of parallel repetitions, for 128-bit soundness.
pub(crate) const ITERATIONS: usize = 128;

/// A non-interactive proof of knowledge of `x` such that
/// `h2 = h1^x mod n_tilde`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DlnProof {
    /// Per-repetition commitments `alpha_i = h1^{a_i} mod n_tilde`.
    alpha: Vec<BigNumber>,
    /// Per-repetition responses `t_i = a_i + c_i * x mod (p * q)`.
    t: Vec<BigNumber>,
}

impl DlnProof {
    /// Prove knowledge of `x` with `h2 = h1^x mod n_tilde`, where `p` and
    /// `q` are the Sophie Germain halves of `n_tilde`'s factors.
    pub(crate) fn prove<R: RngCore + CryptoRng>(
        rng: &mut R,
        h1: &BigNumber,
        h2: &BigNumber,
        x: &BigNumber,
        p: &BigNumber,
        q: &BigNumber,
        n_tilde: &BigNumber,
    ) -> Self {
        let pq = p * q;
        let mut a = Vec::with_capacity(ITERATIONS);
        let mut alpha = Vec::with_capacity(ITERATIONS);
        for _ in 0..ITERATIONS {
            let a_i = random_positive_bn(rng, &pq);
            alpha.push(h1.modpow(&a_i, n_tilde));
            a.push(a_i);
        }

        let challenge = challenge(h1, h2, n_tilde, &alpha);
        let challenge_bytes = challenge.to_bytes();
        let t = a
            .iter()
            .enumerate()
            .map(|(i, a_i)| {
                if challenge_bit(&challenge_bytes, i) {
                    (a_i + x).nmod(&pq)
                } else {
                    a_i.nmod(&pq)
                }
            })
            .collect();

        Self { alpha, t }
    }

    /// Verify this proof.
    ///
    /// Every transmitted group element is reduced modulo `n_tilde` first and
    /// the reduced value must lie strictly between 1 and `n_tilde`.
    pub(crate) fn verify(&self, h1: &BigNumber, h2: &BigNumber, n_tilde: &BigNumber) -> bool {
        if n_tilde <= &BigNumber::zero() {
            return false;
        }
        if self.alpha.len() != ITERATIONS || self.t.len() != ITERATIONS {
            return false;
        }
        let h1_reduced = h1.nmod(n_tilde);
        let h2_reduced = h2.nmod(n_tilde);
        if !in_open_range(&h1_reduced, n_tilde) || !in_open_range(&h2_reduced, n_tilde) {
            return false;
        }
        if h1_reduced == h2_reduced {
            return false;
        }
        for value in self.t.iter().chain(self.alpha.iter()) {
            if !in_open_range(&value.nmod(n_tilde), n_tilde) {
                return false;
            }
        }

        let challenge = challenge(h1, h2, n_tilde, &self.alpha);
        let challenge_bytes = challenge.to_bytes();
        for i in 0..ITERATIONS {
            // h1^{t_i} = alpha_i * h2^{c_i} mod n_tilde
            let lhs = h1.modpow(&self.t[i], n_tilde);
            let rhs = if challenge_bit(&challenge_bytes, i) {
                self.alpha[i].modmul(h2, n_tilde)
            } else {
                self.alpha[i].nmod(n_tilde)
            };
            if lhs != rhs {
                return false;
            }
        }
        true
    }

    /// Flatten the proof into the length-prefixed integer container used on
    /// the wire.
    pub(crate) fn into_parts(self) -> Vec<BigNumber> {
        build_parts(&[&self.alpha, &self.t])
    }

    /// Rebuild a proof from its wire container, requiring exactly
    /// [`ITERATIONS`] entries per array.
    pub(crate) fn from_parts(flat: &[BigNumber]) -> Result<Self> {
        let parts = parse_parts(flat)?;
        if parts.len() != 2 {
            error!("Expected 2 proof arrays, got {}", parts.len());
            Err(CallerError::DeserializationFailed)?;
        }
        let mut parts = parts.into_iter();
        let alpha = parts.next().expect("length checked above");
        let t = parts.next().expect("length checked above");
        if alpha.len() != ITERATIONS || t.len() != ITERATIONS {
            error!(
                "Expected {} proof entries per array, got {} and {}",
                ITERATIONS,
                alpha.len(),
                t.len()
            );
            Err(CallerError::DeserializationFailed)?;
        }
        Ok(Self { alpha, t })
    }
}

impl Serialize for DlnProof {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.clone().into_parts().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DlnProof {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let flat = Vec::<BigNumber>::deserialize(deserializer)?;
        Self::from_parts(&flat).map_err(serde::de::Error::custom)
    }
}

/// The joint Fiat-Shamir challenge over the proof transcript.
fn challenge(
    h1: &BigNumber,
    h2: &BigNumber,
    n_tilde: &BigNumber,
    alpha: &[BigNumber],
) -> BigNumber {
    let mut inputs = Vec::with_capacity(alpha.len() + 3);
    inputs.push(h1);
    inputs.push(h2);
    inputs.push(n_tilde);
    inputs.extend(alpha.iter());
    sha512_256i(&inputs)
}

/// Bit `i` (counting from the least significant) of a big-endian byte
/// string.
fn challenge_bit(bytes: &[u8], i: usize) -> bool {
    match bytes.len().checked_sub(1 + i / 8) {
        Some(index) => (bytes[index] >> (i % 8)) & 1 == 1,
        None => false,
    }
}

/// Whether `v` lies strictly between 1 and `n`.
fn in_open_range(v: &BigNumber, n: &BigNumber) -> bool {
    v > &BigNumber::one() && v < n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        paillier::prime_gen,
        utils::{random_bn_in_z_star, testing::init_testing},
    };
    use rand::{rngs::StdRng, CryptoRng, RngCore};

    struct DlnSetup {
        h1: BigNumber,
        h2: BigNumber,
        x: BigNumber,
        p: BigNumber,
        q: BigNumber,
        n_tilde: BigNumber,
    }

    /// Build honest auxiliary parameters from the safe prime pool.
    fn dln_setup<R: RngCore + CryptoRng>(rng: &mut R) -> DlnSetup {
        let (sp1, sp2) = prime_gen::get_safe_prime_pair_from_pool_insecure(rng);
        let n_tilde = sp1.safe_prime() * sp2.safe_prime();
        let f1 = random_bn_in_z_star(rng, &n_tilde).unwrap();
        let x = random_bn_in_z_star(rng, &n_tilde).unwrap();
        let h1 = f1.modmul(&f1, &n_tilde);
        let h2 = h1.modpow(&x, &n_tilde);
        DlnSetup {
            h1,
            h2,
            x,
            p: sp1.prime().clone(),
            q: sp2.prime().clone(),
            n_tilde,
        }
    }

    impl DlnSetup {
        fn prove(&self, rng: &mut StdRng) -> DlnProof {
            DlnProof::prove(
                rng,
                &self.h1,
                &self.h2,
                &self.x,
                &self.p,
                &self.q,
                &self.n_tilde,
            )
        }
    }

    #[test]
    fn honest_proofs_verify() {
        let mut rng = init_testing();
        let setup = dln_setup(&mut rng);
        let proof = setup.prove(&mut rng);
        assert!(proof.verify(&setup.h1, &setup.h2, &setup.n_tilde));

        // The inverse direction proves the generators span the same group.
        let pq = &setup.p * &setup.q;
        let beta = setup.x.invert(&pq).unwrap();
        let reverse = DlnProof::prove(
            &mut rng,
            &setup.h2,
            &setup.h1,
            &beta,
            &setup.p,
            &setup.q,
            &setup.n_tilde,
        );
        assert!(reverse.verify(&setup.h2, &setup.h1, &setup.n_tilde));
    }

    #[test]
    fn proofs_fail_against_mismatched_statements() {
        let mut rng = init_testing();
        let setup = dln_setup(&mut rng);
        let proof = setup.prove(&mut rng);

        // h2' with an unknown exponent.
        let wrong_h2 = setup.h1.modpow(&(&setup.x + 1), &setup.n_tilde);
        assert!(!proof.verify(&setup.h1, &wrong_h2, &setup.n_tilde));
        // Swapped generators.
        assert!(!proof.verify(&setup.h2, &setup.h1, &setup.n_tilde));
        // A different modulus.
        let other = dln_setup(&mut rng);
        assert!(!proof.verify(&setup.h1, &setup.h2, &other.n_tilde));
    }

    #[test]
    fn tampered_proofs_fail() {
        let mut rng = init_testing();
        let setup = dln_setup(&mut rng);

        let mut proof = setup.prove(&mut rng);
        proof.t[17] = (&proof.t[17] + 1).nmod(&setup.n_tilde);
        assert!(!proof.verify(&setup.h1, &setup.h2, &setup.n_tilde));

        let mut proof = setup.prove(&mut rng);
        proof.alpha[63] = (&proof.alpha[63] + 1).nmod(&setup.n_tilde);
        assert!(!proof.verify(&setup.h1, &setup.h2, &setup.n_tilde));
    }

    #[test]
    fn verification_rejects_out_of_range_elements() {
        let mut rng = init_testing();
        let setup = dln_setup(&mut rng);

        // An element equal to 1 after reduction is degenerate.
        let mut proof = setup.prove(&mut rng);
        proof.alpha[0] = BigNumber::one();
        assert!(!proof.verify(&setup.h1, &setup.h2, &setup.n_tilde));

        // Equal generators are degenerate.
        let proof = setup.prove(&mut rng);
        assert!(!proof.verify(&setup.h1, &setup.h1, &setup.n_tilde));
        // A non-positive modulus is degenerate.
        assert!(!proof.verify(&setup.h1, &setup.h2, &BigNumber::zero()));
    }

    #[test]
    fn challenge_matches_fiat_shamir_recomputation() {
        let mut rng = init_testing();
        let setup = dln_setup(&mut rng);
        let proof = setup.prove(&mut rng);

        // Check the verification equation bit by bit against a fresh
        // challenge recomputation.
        let c = challenge(&setup.h1, &setup.h2, &setup.n_tilde, &proof.alpha);
        let c_bytes = c.to_bytes();
        for i in 0..ITERATIONS {
            let lhs = setup.h1.modpow(&proof.t[i], &setup.n_tilde);
            let rhs = if challenge_bit(&c_bytes, i) {
                proof.alpha[i].modmul(&setup.h2, &setup.n_tilde)
            } else {
                proof.alpha[i].nmod(&setup.n_tilde)
            };
            assert_eq!(lhs, rhs, "repetition {i} disagrees with the challenge");
        }
    }

    #[test]
    fn wire_container_round_trip() {
        let mut rng = init_testing();
        let setup = dln_setup(&mut rng);
        let proof = setup.prove(&mut rng);

        let flat = proof.clone().into_parts();
        assert_eq!(flat.len(), 2 * ITERATIONS + 2);
        let rebuilt = DlnProof::from_parts(&flat).unwrap();
        assert_eq!(proof, rebuilt);

        // Truncated containers and containers with the wrong repetition
        // count are rejected.
        assert!(DlnProof::from_parts(&flat[..flat.len() - 1]).is_err());
        let short = build_parts(&[&proof.alpha[..ITERATIONS - 1], &proof.t]);
        assert!(DlnProof::from_parts(&short).is_err());
    }
}
