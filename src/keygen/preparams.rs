// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Pre-parameters: the expensive, reusable half of a participant's setup.
//!
//! Generating a Paillier key pair and the auxiliary modulus takes four safe
//! primes and can run for minutes, so hosts are encouraged to produce
//! [`PreParams`] out-of-band and hand them to
//! [`Input`](crate::keygen::Input); otherwise the first round generates them
//! in place, within the configured deadline.

use crate::{
    errors::{InternalError, Result},
    paillier::{prime_gen, DecryptionKey, PAILLIER_MODULUS_BITS},
    utils::{random_bn_in_z_star, CancellationToken},
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use std::time::Duration;
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Bit length of each safe prime factor of the auxiliary modulus `N~`.
pub(crate) const SAFE_PRIME_BITS: usize = 1024;

/// The default worker count for prime sieving: a third of the cores, the
/// rest staying available for the host.
pub fn default_concurrency() -> usize {
    std::cmp::max(1, num_cpus::get() / 3)
}

/// A participant's pre-computed key material: its Paillier secret key and
/// the auxiliary modulus setup used by range proofs in later protocol
/// phases.
///
/// The fields `alpha`, `beta`, `p`, and `q` are secret; the whole struct
/// zeroizes on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PreParams {
    pub(crate) paillier_sk: DecryptionKey,
    /// The auxiliary modulus, a product of two safe primes.
    pub(crate) n_tilde: BigNumber,
    /// A random quadratic residue modulo `n_tilde`.
    pub(crate) h1: BigNumber,
    /// `h1^alpha mod n_tilde`.
    pub(crate) h2: BigNumber,
    /// The discrete log of `h2` with respect to `h1`.
    pub(crate) alpha: BigNumber,
    /// `alpha^-1 mod (p * q)`; `p * q` is the order of the quadratic
    /// residue group modulo `n_tilde`.
    pub(crate) beta: BigNumber,
    /// Sophie Germain half of the first factor of `n_tilde`.
    pub(crate) p: BigNumber,
    /// Sophie Germain half of the second factor of `n_tilde`.
    pub(crate) q: BigNumber,
}

impl PreParams {
    /// Generate fresh pre-parameters within `timeout`, using the default
    /// worker count.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R, timeout: Duration) -> Result<Self> {
        let token = CancellationToken::with_timeout(timeout);
        Self::generate_with_token(rng, &token, default_concurrency())
    }

    /// Generate fresh pre-parameters, polling `token` for cancellation and
    /// deadline expiry.
    ///
    /// The Paillier key and the auxiliary safe primes are produced on two
    /// parallel tasks. The Paillier side gets twice the workers: its prime
    /// pairs are additionally subject to a minimum distance and some get
    /// discarded.
    pub fn generate_with_token<R: RngCore + CryptoRng>(
        rng: &mut R,
        token: &CancellationToken,
        concurrency: usize,
    ) -> Result<Self> {
        info!("Generating pre-parameters. This can take some time.");
        let (paillier_result, aux_result) = std::thread::scope(|scope| {
            let paillier = scope.spawn(|| DecryptionKey::generate(token, concurrency * 2));
            let aux = scope
                .spawn(|| prime_gen::safe_primes_concurrent(token, SAFE_PRIME_BITS, 2, concurrency));
            (paillier.join(), aux.join())
        });
        let paillier_sk = paillier_result.map_err(|_| InternalError::InternalInvariantFailed)??;
        let aux_primes = aux_result.map_err(|_| InternalError::InternalInvariantFailed)??;
        info!("Pre-parameter prime generation finished.");
        Self::from_generated_parts(rng, paillier_sk, &aux_primes[0], &aux_primes[1])
    }

    fn from_generated_parts<R: RngCore + CryptoRng>(
        rng: &mut R,
        paillier_sk: DecryptionKey,
        sp1: &prime_gen::SafePrime,
        sp2: &prime_gen::SafePrime,
    ) -> Result<Self> {
        let p = sp1.prime().clone();
        let q = sp2.prime().clone();
        let n_tilde = sp1.safe_prime() * sp2.safe_prime();
        let pq = &p * &q;

        let f1 = random_bn_in_z_star(rng, &n_tilde)?;
        // alpha must be invertible modulo the group order as well; a sample
        // that is not would expose a factor, so it is discarded.
        let (alpha, beta) = loop {
            let alpha = random_bn_in_z_star(rng, &n_tilde)?;
            if let Some(beta) = alpha.invert(&pq) {
                break (alpha, beta);
            }
        };
        let h1 = f1.modmul(&f1, &n_tilde);
        let h2 = h1.modpow(&alpha, &n_tilde);

        Ok(Self {
            paillier_sk,
            n_tilde,
            h1,
            h2,
            alpha,
            beta,
            p,
            q,
        })
    }

    /// The public half of the Paillier key pair.
    pub fn encryption_key(&self) -> &crate::paillier::EncryptionKey {
        self.paillier_sk.encryption_key()
    }

    /// Re-check the structural invariants of this set of pre-parameters.
    ///
    /// Hosts reusing cached pre-parameters get them re-validated before the
    /// first round runs; a cached set that fails validation is rejected
    /// rather than silently regenerated.
    pub fn validate(&self) -> bool {
        let one = BigNumber::one();
        let p_safe = (self.p.clone() << 1u32) + one.clone();
        let q_safe = (self.q.clone() << 1u32) + one.clone();
        let pq = &self.p * &self.q;

        self.paillier_sk.encryption_key().modulus().bit_length() == PAILLIER_MODULUS_BITS
            && self.n_tilde.bit_length() == PAILLIER_MODULUS_BITS
            && self.n_tilde == &p_safe * &q_safe
            && self.h1 > one
            && self.h1 < self.n_tilde
            && self.h2 > one
            && self.h2 < self.n_tilde
            && self.h1 != self.h2
            && self.h1.modpow(&self.alpha, &self.n_tilde) == self.h2
            && self.alpha.modmul(&self.beta, &pq) == one
            && self.p.is_prime()
            && self.q.is_prime()
            && p_safe.is_prime()
            && q_safe.is_prime()
    }

    /// Build pre-parameters from the precomputed safe prime pool.
    ///
    /// This skips all prime generation and must never be used outside
    /// tests.
    #[cfg(test)]
    pub(crate) fn simulate_from_pool<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let (paillier_p, paillier_q) = prime_gen::get_paillier_prime_pair_from_pool_insecure(rng);
        let paillier_sk =
            DecryptionKey::from_primes(paillier_p.safe_prime(), paillier_q.safe_prime())
                .expect("pool primes form a valid Paillier key");
        let (sp1, sp2) = prime_gen::get_safe_prime_pair_from_pool_insecure(rng);
        Self::from_generated_parts(rng, paillier_sk, &sp1, &sp2)
            .expect("pool primes form valid pre-parameters")
    }
}

// A `Debug` dump of pre-parameters must not leak the secret exponents or
// primes.
impl std::fmt::Debug for PreParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreParams")
            .field("paillier_pk", self.paillier_sk.encryption_key())
            .field("n_tilde", &self.n_tilde)
            .field("h1", &self.h1)
            .field("h2", &self.h2)
            .field("...", &"[redacted]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn simulated_pre_params_validate() {
        let mut rng = init_testing();
        let pre_params = PreParams::simulate_from_pool(&mut rng);
        assert!(pre_params.validate());

        // The auxiliary generators satisfy the advertised relations in both
        // directions.
        assert_eq!(
            pre_params.h1.modpow(&pre_params.alpha, &pre_params.n_tilde),
            pre_params.h2
        );
        assert_eq!(
            pre_params.h2.modpow(&pre_params.beta, &pre_params.n_tilde),
            pre_params.h1
        );
    }

    #[test]
    fn validation_catches_tampering() {
        let mut rng = init_testing();
        let mut pre_params = PreParams::simulate_from_pool(&mut rng);
        pre_params.h2 = (&pre_params.h2 + 1).nmod(&pre_params.n_tilde);
        assert!(!pre_params.validate());
    }

    #[test]
    fn dead_tokens_abort_generation() {
        let mut rng = init_testing();

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let result = PreParams::generate_with_token(&mut rng, &cancelled, 1);
        let kind = result.unwrap_err().protocol_error().unwrap().kind();
        assert_eq!(kind, crate::errors::ErrorKind::Cancelled);

        let expired = CancellationToken::with_timeout(Duration::from_secs(0));
        let result = PreParams::generate_with_token(&mut rng, &expired, 1);
        let kind = result.unwrap_err().protocol_error().unwrap().kind();
        assert_eq!(kind, crate::errors::ErrorKind::Timeout);
    }
}
