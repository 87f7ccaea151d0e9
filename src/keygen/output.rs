// Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    curve::CurvePoint,
    errors::{CallerError, InternalError, Result},
    keygen::keyshare::{AuxInfoPublic, KeySharePrivate, KeySharePublic},
    protocol::ParticipantIdentifier,
};
use k256::ecdsa::VerifyingKey;
use libpaillier::unknown_order::BigNumber;
use std::collections::HashSet;
use tracing::error;

/// Output type from key generation: the save data a participant persists
/// when the protocol completes.
///
/// All per-participant vectors are in the session's canonical participant
/// order, the same on every honest participant.
#[derive(Debug, Clone)]
pub struct Output {
    /// The joint ECDSA public key `Y`.
    public_key: CurvePoint,
    /// Every participant's public key share `BigX_j = X_j * G`.
    public_key_shares: Vec<KeySharePublic>,
    /// Every participant's public auxiliary material.
    public_aux: Vec<AuxInfoPublic>,
    /// This participant's private share `X_i` of the joint secret key.
    private_key_share: KeySharePrivate,
    /// This participant's sharing abscissa.
    share_id: BigNumber,
    /// Every participant's sharing abscissa.
    all_share_ids: Vec<BigNumber>,
}

impl Output {
    /// Construct the generated public key.
    pub fn public_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_encoded_point(&self.public_key.into()).map_err(|_| {
            error!("Keygen output does not contain a valid public key");
            InternalError::InternalInvariantFailed
        })
    }

    /// The joint public key as a curve point.
    pub fn public_key_point(&self) -> &CurvePoint {
        &self.public_key
    }

    /// Every participant's public key share.
    pub fn public_key_shares(&self) -> &[KeySharePublic] {
        &self.public_key_shares
    }

    /// Every participant's public auxiliary material.
    pub fn public_aux(&self) -> &[AuxInfoPublic] {
        &self.public_aux
    }

    /// This participant's private key share.
    pub fn private_key_share(&self) -> &KeySharePrivate {
        &self.private_key_share
    }

    /// This participant's sharing abscissa.
    pub fn share_id(&self) -> &BigNumber {
        &self.share_id
    }

    /// Every participant's sharing abscissa, in canonical participant
    /// order.
    pub fn all_share_ids(&self) -> &[BigNumber] {
        &self.all_share_ids
    }

    /// The public key share of the given participant.
    pub fn find_public_key_share(
        &self,
        participant: ParticipantIdentifier,
    ) -> Option<&KeySharePublic> {
        self.public_key_shares
            .iter()
            .find(|share| share.participant() == participant)
    }

    /// The public auxiliary material of the given participant.
    pub fn find_public_aux(&self, participant: ParticipantIdentifier) -> Option<&AuxInfoPublic> {
        self.public_aux
            .iter()
            .find(|aux| aux.participant() == participant)
    }

    /// Create a new `Output` from its constituent parts.
    ///
    /// This method should only be used with components produced by a run of
    /// the protocol (or a subset of one, see [`Output::subset`]); the
    /// calling application should not assemble save data by hand.
    pub fn from_parts(
        public_key: CurvePoint,
        public_key_shares: Vec<KeySharePublic>,
        public_aux: Vec<AuxInfoPublic>,
        private_key_share: KeySharePrivate,
        share_id: BigNumber,
        all_share_ids: Vec<BigNumber>,
    ) -> Result<Self> {
        let pids = public_key_shares
            .iter()
            .map(KeySharePublic::participant)
            .collect::<HashSet<_>>();
        if pids.len() != public_key_shares.len() {
            error!("Public key shares contain duplicate participants");
            Err(CallerError::BadInput)?;
        }
        if public_aux.len() != public_key_shares.len()
            || all_share_ids.len() != public_key_shares.len()
        {
            error!("Save data vectors disagree about the participant count");
            Err(CallerError::BadInput)?;
        }
        for (aux, share) in public_aux.iter().zip(public_key_shares.iter()) {
            if aux.participant() != share.participant() {
                error!("Save data vectors disagree about participant order");
                Err(CallerError::BadInput)?;
            }
        }
        if !all_share_ids.contains(&share_id) {
            error!("This participant's share id is not among the session's share ids");
            Err(CallerError::BadInput)?;
        }
        if public_key.is_identity() {
            error!("The joint public key is the identity point");
            Err(CallerError::BadInput)?;
        }
        Ok(Self {
            public_key,
            public_key_shares,
            public_aux,
            private_key_share,
            share_id,
            all_share_ids,
        })
    }

    /// Decompose the `Output` into its constituent parts.
    ///
    /// # 🔒 Storage requirements
    /// The private key share must be stored securely by the calling
    /// application, and a best effort should be made to drop it from memory
    /// after it's securely stored. Everything else can be stored in the
    /// clear.
    pub fn into_parts(
        self,
    ) -> (
        CurvePoint,
        Vec<KeySharePublic>,
        Vec<AuxInfoPublic>,
        KeySharePrivate,
        BigNumber,
        Vec<BigNumber>,
    ) {
        (
            self.public_key,
            self.public_key_shares,
            self.public_aux,
            self.private_key_share,
            self.share_id,
            self.all_share_ids,
        )
    }

    /// Restrict this save data to a subset of the original participants,
    /// e.g. a signing committee.
    ///
    /// The subset must contain this participant. Vectors keep the canonical
    /// (ascending) participant order.
    pub fn subset(&self, participants: &[ParticipantIdentifier]) -> Result<Self> {
        let mut selected = participants.to_vec();
        selected.sort();
        selected.dedup();
        if selected.len() != participants.len() {
            error!("Subset request contains duplicate participants");
            Err(CallerError::BadInput)?;
        }

        let mut public_key_shares = Vec::with_capacity(selected.len());
        let mut public_aux = Vec::with_capacity(selected.len());
        let mut all_share_ids = Vec::with_capacity(selected.len());
        for pid in &selected {
            let index = self
                .public_key_shares
                .iter()
                .position(|share| share.participant() == *pid)
                .ok_or_else(|| {
                    error!("Subset request names a participant missing from the save data");
                    CallerError::BadInput
                })?;
            public_key_shares.push(self.public_key_shares[index].clone());
            public_aux.push(self.public_aux[index].clone());
            all_share_ids.push(self.all_share_ids[index].clone());
        }
        if !all_share_ids.contains(&self.share_id) {
            error!("Subset request does not include this participant");
            Err(CallerError::BadInput)?;
        }

        Ok(Self {
            public_key: self.public_key,
            public_key_shares,
            public_aux,
            private_key_share: self.private_key_share.clone(),
            share_id: self.share_id.clone(),
            all_share_ids,
        })
    }
}
