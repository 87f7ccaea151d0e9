// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Feldman verifiable secret sharing over the secp256k1 scalar field.
//!
//! A dealer splits a secret `a0` into `n` shares by evaluating a random
//! degree-`t` polynomial `f(x) = a0 + a1 x + ... + at x^t` at each
//! participant's abscissa, and publishes the commitments `Vs[c] = ac * G`.
//! Any share holder can check its share against `Vs` without interaction,
//! and any `t + 1` shares reconstruct `a0` by Lagrange interpolation.

use crate::{
    curve::{k256_order, CurvePoint},
    errors::{CallerError, Result},
    utils::random_positive_bn,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::error;
use zeroize::ZeroizeOnDrop;

/// One participant's share of a secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct Share {
    threshold: usize,
    id: BigNumber,
    share: BigNumber,
}

impl Share {
    /// Assemble a share from its parts. `id` is the abscissa the dealer's
    /// polynomial was evaluated at; `share` is the evaluation.
    pub fn new(threshold: usize, id: BigNumber, share: BigNumber) -> Self {
        Self {
            threshold,
            id,
            share,
        }
    }

    /// The threshold of the sharing this share belongs to.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// The abscissa of this share.
    pub fn id(&self) -> &BigNumber {
        &self.id
    }

    /// The secret evaluation of this share.
    pub fn share(&self) -> &BigNumber {
        &self.share
    }

    /// Check this share against the dealer's polynomial commitments.
    ///
    /// Accepts iff the share belongs to a sharing with the expected
    /// threshold and `share * G` equals the commitment polynomial evaluated
    /// in the exponent at the share's abscissa.
    pub fn verify(&self, threshold: usize, commitments: &[CurvePoint]) -> bool {
        if self.threshold != threshold || commitments.len() != threshold + 1 {
            return false;
        }
        let q = k256_order();
        // v = Vs[0] + Vs[1] * k + Vs[2] * k^2 + ...
        let mut v = commitments[0];
        let mut exponent = BigNumber::one();
        for commitment in commitments.iter().skip(1) {
            exponent = exponent.modmul(&self.id, &q);
            let term = match commitment.multiply_by_bignum(&exponent) {
                Ok(term) => term,
                Err(_) => return false,
            };
            v = v + term;
        }
        match CurvePoint::GENERATOR.multiply_by_bignum(&self.share) {
            Ok(expected) => expected == v,
            Err(_) => false,
        }
    }
}

// The share value must not leak through logs.
impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Share")
            .field("threshold", &self.threshold)
            .field("id", &self.id)
            .field("share", &"[redacted]")
            .finish()
    }
}

/// Check a set of sharing abscissae for hygiene.
///
/// Indexes must be non-zero and pairwise distinct after reduction modulo the
/// curve order: a zero abscissa hands out the secret itself, and colliding
/// abscissae silently shrink the effective quorum.
pub fn check_indexes(indexes: &[BigNumber]) -> Result<Vec<BigNumber>> {
    let q = k256_order();
    let mut visited = HashSet::new();
    for index in indexes {
        let reduced = index.nmod(&q);
        if reduced == BigNumber::zero() {
            error!("A sharing index reduced to zero");
            Err(CallerError::BadInput)?;
        }
        if !visited.insert(reduced.to_bytes()) {
            error!("Found a duplicate sharing index");
            Err(CallerError::BadInput)?;
        }
    }
    Ok(indexes.to_vec())
}

/// Share `secret` among the holders of `indexes` with threshold `threshold`.
///
/// Returns the per-coefficient commitments `Vs` and one [`Share`] per index,
/// in index order.
pub fn create<R: RngCore + CryptoRng>(
    threshold: usize,
    secret: &BigNumber,
    indexes: &[BigNumber],
    rng: &mut R,
) -> Result<(Vec<CurvePoint>, Vec<Share>)> {
    if threshold < 1 {
        error!("Sharing threshold must be at least 1");
        Err(CallerError::BadInput)?;
    }
    if indexes.len() < threshold + 1 {
        error!(
            "Cannot share with threshold {} among only {} holders",
            threshold,
            indexes.len()
        );
        Err(CallerError::BadInput)?;
    }
    let ids = check_indexes(indexes)?;

    let q = k256_order();
    let mut coefficients = Vec::with_capacity(threshold + 1);
    coefficients.push(secret.nmod(&q));
    for _ in 0..threshold {
        coefficients.push(random_positive_bn(rng, &q));
    }

    let commitments = coefficients
        .iter()
        .map(|coefficient| CurvePoint::GENERATOR.multiply_by_bignum(coefficient))
        .collect::<Result<Vec<_>>>()?;

    let shares = ids
        .iter()
        .map(|id| {
            let share = evaluate_polynomial(&coefficients, id, &q);
            Share::new(threshold, id.clone(), share)
        })
        .collect();

    Ok((commitments, shares))
}

/// Reconstruct the shared secret from `shares` by Lagrange interpolation at
/// zero.
///
/// Requires at least `threshold + 1` shares with pairwise distinct
/// abscissae.
pub fn reconstruct(shares: &[Share]) -> Result<BigNumber> {
    let threshold = match shares.first() {
        Some(share) => share.threshold,
        None => {
            error!("Cannot reconstruct from an empty share set");
            Err(CallerError::BadInput)?
        }
    };
    if shares.len() < threshold + 1 {
        error!(
            "Cannot reconstruct a threshold-{} secret from {} shares",
            threshold,
            shares.len()
        );
        Err(CallerError::BadInput)?;
    }

    let q = k256_order();
    let mut secret = BigNumber::zero();
    for (i, share) in shares.iter().enumerate() {
        let mut coefficient = BigNumber::one();
        for (j, other) in shares.iter().enumerate() {
            if i == j {
                continue;
            }
            // (0 - kj) / (ki - kj) = kj / (kj - ki)
            let difference = (&other.id - &share.id).nmod(&q);
            let inverse = difference.invert(&q).ok_or_else(|| {
                error!("Two shares have the same abscissa");
                CallerError::BadInput
            })?;
            coefficient = coefficient.modmul(&other.id.modmul(&inverse, &q), &q);
        }
        secret = (&secret + &share.share.modmul(&coefficient, &q)).nmod(&q);
    }
    Ok(secret)
}

/// Evaluate a polynomial given by `coefficients` (constant term first) at
/// `x`, modulo `q`.
fn evaluate_polynomial(coefficients: &[BigNumber], x: &BigNumber, q: &BigNumber) -> BigNumber {
    let mut result = BigNumber::zero();
    for coefficient in coefficients.iter().rev() {
        result = (&result.modmul(x, q) + coefficient).nmod(q);
    }
    result
}
