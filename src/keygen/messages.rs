// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Typed payloads of the key generation rounds.
//!
//! Each payload type re-checks the message's round tag and broadcast
//! polarity before deserializing; share messages are the only
//! point-to-point round.

use crate::{
    commitments::{HashCommitment, HashDecommitment},
    errors::Result,
    messages::{KeygenMessageType, Message, MessageType},
    paillier::{EncryptionKey, KeyProof},
    vss,
    zkp::dln::DlnProof,
};
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};

/// The round 1 broadcast: a commitment to the sender's polynomial
/// commitments, plus all of its public auxiliary material and the discrete
/// log proofs backing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct KeygenRound1 {
    pub(crate) commitment: HashCommitment,
    pub(crate) paillier_pk: EncryptionKey,
    pub(crate) n_tilde: BigNumber,
    pub(crate) h1: BigNumber,
    pub(crate) h2: BigNumber,
    /// Proof of knowledge of `alpha` with `h2 = h1^alpha`.
    pub(crate) dln_proof_1: DlnProof,
    /// Proof of knowledge of `beta` with `h1 = h2^beta`.
    pub(crate) dln_proof_2: DlnProof,
}

impl KeygenRound1 {
    pub(crate) fn from_message(message: &Message) -> Result<Self> {
        message.check_type(MessageType::Keygen(KeygenMessageType::R1Commit))?;
        message.check_broadcast_polarity(true)?;
        let round1: Self = deserialize!(&message.unverified_bytes)?;
        Ok(round1)
    }
}

/// A round 2 point-to-point message carrying the secret share the sender's
/// polynomial assigns to the recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct KeygenRound2Share {
    pub(crate) share: vss::Share,
}

impl KeygenRound2Share {
    pub(crate) fn from_message(message: &Message) -> Result<Self> {
        message.check_type(MessageType::Keygen(KeygenMessageType::R2Share))?;
        message.check_broadcast_polarity(false)?;
        let round2: Self = deserialize!(&message.unverified_bytes)?;
        Ok(round2)
    }
}

/// The round 2 broadcast opening the sender's round 1 commitment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct KeygenRound2Decommit {
    pub(crate) decommitment: HashDecommitment,
}

impl KeygenRound2Decommit {
    pub(crate) fn from_message(message: &Message) -> Result<Self> {
        message.check_type(MessageType::Keygen(KeygenMessageType::R2Decommit))?;
        message.check_broadcast_polarity(true)?;
        let round2: Self = deserialize!(&message.unverified_bytes)?;
        Ok(round2)
    }
}

/// The round 3 broadcast carrying the sender's Paillier key-correctness
/// proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct KeygenRound3 {
    pub(crate) proof: KeyProof,
}

impl KeygenRound3 {
    pub(crate) fn from_message(message: &Message) -> Result<Self> {
        message.check_type(MessageType::Keygen(KeygenMessageType::R3Proof))?;
        message.check_broadcast_polarity(true)?;
        let round3: Self = deserialize!(&message.unverified_bytes)?;
        Ok(round3)
    }
}
