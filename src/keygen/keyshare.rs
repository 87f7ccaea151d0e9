// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    curve::{k256_order, CurvePoint},
    errors::Result,
    paillier::EncryptionKey,
    protocol::ParticipantIdentifier,
};
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

/// A participant's private share of the jointly generated secret key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct KeySharePrivate {
    x: BigNumber,
}

impl KeySharePrivate {
    /// Wrap a secret value as a key share, reduced into the curve's scalar
    /// field.
    pub fn from_bigint(x: &BigNumber) -> Self {
        Self {
            x: x.nmod(&k256_order()),
        }
    }

    /// The curve point corresponding to this private share.
    pub fn public_point(&self) -> Result<CurvePoint> {
        CurvePoint::GENERATOR.multiply_by_bignum(&self.x)
    }
}

impl AsRef<BigNumber> for KeySharePrivate {
    fn as_ref(&self) -> &BigNumber {
        &self.x
    }
}

// The share must not leak through logs.
impl std::fmt::Debug for KeySharePrivate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeySharePrivate([redacted])")
    }
}

/// The public counterpart of a participant's private key share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySharePublic {
    participant: ParticipantIdentifier,
    x: CurvePoint,
}

impl KeySharePublic {
    /// Wrap a curve point as a participant's public key share.
    pub fn new(participant: ParticipantIdentifier, x: CurvePoint) -> Self {
        Self { participant, x }
    }

    /// The participant this share belongs to.
    pub fn participant(&self) -> ParticipantIdentifier {
        self.participant
    }
}

impl AsRef<CurvePoint> for KeySharePublic {
    fn as_ref(&self) -> &CurvePoint {
        &self.x
    }
}

/// One participant's public auxiliary material: its Paillier public key and
/// the auxiliary modulus setup later protocol phases build range proofs
/// over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxInfoPublic {
    participant: ParticipantIdentifier,
    paillier_pk: EncryptionKey,
    n_tilde: BigNumber,
    h1: BigNumber,
    h2: BigNumber,
}

impl AuxInfoPublic {
    pub(crate) fn new(
        participant: ParticipantIdentifier,
        paillier_pk: EncryptionKey,
        n_tilde: BigNumber,
        h1: BigNumber,
        h2: BigNumber,
    ) -> Self {
        Self {
            participant,
            paillier_pk,
            n_tilde,
            h1,
            h2,
        }
    }

    /// The participant this material belongs to.
    pub fn participant(&self) -> ParticipantIdentifier {
        self.participant
    }

    /// The participant's Paillier public key.
    pub fn paillier_pk(&self) -> &EncryptionKey {
        &self.paillier_pk
    }

    /// The participant's auxiliary modulus.
    pub fn n_tilde(&self) -> &BigNumber {
        &self.n_tilde
    }

    /// The first auxiliary generator.
    pub fn h1(&self) -> &BigNumber {
        &self.h1
    }

    /// The second auxiliary generator.
    pub fn h2(&self) -> &BigNumber {
        &self.h2
    }
}
