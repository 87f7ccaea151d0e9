// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Session and participant identities.

use crate::errors::{CallerError, ErrorKind, ProtocolError, Result};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt};
use tracing::error;

/// A unique identifier for a single run of a protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier(u128);

impl Identifier {
    /// Produce a random [`Identifier`].
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        // The chance of sampling zero is negligible but the all-zero session
        // id is reserved as "unset".
        loop {
            let id: u128 = rng.gen();
            if id != 0 {
                break Self(id);
            }
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({:08x}..)", self.0 >> 96)
    }
}

/// The identity of a protocol participant.
///
/// Identifiers address participants on the wire and in culprit lists; the
/// secret-sharing abscissa of a participant is derived from its identifier
/// via [`ParticipantIdentifier::share_key`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ParticipantIdentifier(u128);

impl ParticipantIdentifier {
    /// Produce a random [`ParticipantIdentifier`].
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(rng.gen())
    }

    /// Construct a [`ParticipantIdentifier`] from a `u128`.
    pub fn from_u128(id: u128) -> Self {
        Self(id)
    }

    /// The raw value of this identifier.
    pub fn as_u128(&self) -> u128 {
        self.0
    }

    /// The abscissa at which this participant's secret share is evaluated.
    ///
    /// The offset by one keeps the abscissa non-zero; an abscissa of zero
    /// would make the share equal the shared secret itself. Identifiers fit
    /// in a `u128`, so distinct identifiers always reduce to distinct,
    /// non-zero elements of the curve's scalar field.
    pub fn share_key(&self) -> BigNumber {
        BigNumber::from_slice(self.0.to_be_bytes()) + 1
    }
}

impl fmt::Display for ParticipantIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P({:08x}..)", self.0 >> 96)
    }
}

/// The set of participants executing a protocol run, from the point of view
/// of one of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantConfig {
    id: ParticipantIdentifier,
    other_ids: Vec<ParticipantIdentifier>,
}

impl ParticipantConfig {
    /// Create a config for the participant `id`, running alongside
    /// `other_ids`.
    ///
    /// Participant identifiers must be distinct; a duplicate identifier
    /// would collapse two secret-sharing abscissae into one.
    pub fn new(id: ParticipantIdentifier, other_ids: &[ParticipantIdentifier]) -> Result<Self> {
        let mut all = other_ids.to_vec();
        all.push(id);
        let distinct: HashSet<_> = all.iter().collect();
        if distinct.len() != all.len() {
            error!("Duplicate participant identifiers in config");
            Err(ProtocolError::new(ErrorKind::FatalInvariant))?;
        }
        Ok(Self {
            id,
            other_ids: other_ids.to_vec(),
        })
    }

    /// This participant's identifier.
    pub fn id(&self) -> ParticipantIdentifier {
        self.id
    }

    /// The identifiers of the other participants.
    pub fn other_ids(&self) -> &[ParticipantIdentifier] {
        &self.other_ids
    }

    /// All participants of this session, in the canonical (ascending)
    /// order every honest participant derives.
    pub fn all_participants(&self) -> Vec<ParticipantIdentifier> {
        let mut all = self.other_ids.clone();
        all.push(self.id);
        all.sort();
        all
    }

    /// The number of participants in this session.
    pub fn count(&self) -> usize {
        self.other_ids.len() + 1
    }

    /// Generate a random config for a set of `size` participants.
    pub fn random<R: RngCore + CryptoRng>(size: usize, rng: &mut R) -> Self {
        let ids = Self::random_ids(size, rng);
        Self {
            id: ids[0],
            other_ids: ids[1..].to_vec(),
        }
    }

    /// Generate a consistent set of configs, one per participant of a random
    /// quorum of `quorum_size` participants.
    pub fn random_quorum<R: RngCore + CryptoRng>(
        quorum_size: usize,
        rng: &mut R,
    ) -> Result<Vec<Self>> {
        if quorum_size < 2 {
            error!("Quorums must have at least two participants");
            Err(CallerError::BadInput)?;
        }
        let ids = Self::random_ids(quorum_size, rng);
        Ok(ids
            .iter()
            .map(|&id| Self {
                id,
                other_ids: ids.iter().copied().filter(|&other| other != id).collect(),
            })
            .collect())
    }

    fn random_ids<R: RngCore + CryptoRng>(
        size: usize,
        rng: &mut R,
    ) -> Vec<ParticipantIdentifier> {
        let mut ids = HashSet::new();
        while ids.len() < size {
            let _ = ids.insert(ParticipantIdentifier::random(rng));
        }
        ids.into_iter().collect()
    }
}

/// The protocols a [`Message`](crate::messages::Message) can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolType {
    /// Distributed key generation.
    Keygen,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn duplicate_participants_are_rejected() {
        let mut rng = init_testing();
        let id = ParticipantIdentifier::random(&mut rng);
        let other = ParticipantIdentifier::random(&mut rng);
        assert!(ParticipantConfig::new(id, &[other, id]).is_err());
        assert!(ParticipantConfig::new(id, &[other, other]).is_err());
        assert!(ParticipantConfig::new(id, &[other]).is_ok());
    }

    #[test]
    fn canonical_order_is_shared_across_configs() {
        let mut rng = init_testing();
        let configs = ParticipantConfig::random_quorum(5, &mut rng).unwrap();
        let expected = configs[0].all_participants();
        for config in &configs {
            assert_eq!(config.all_participants(), expected);
        }
    }

    #[test]
    fn share_keys_are_nonzero_and_distinct() {
        let mut rng = init_testing();
        let configs = ParticipantConfig::random_quorum(8, &mut rng).unwrap();
        let keys: Vec<_> = configs[0]
            .all_participants()
            .iter()
            .map(ParticipantIdentifier::share_key)
            .collect();
        for (i, key) in keys.iter().enumerate() {
            assert_ne!(key, &libpaillier::unknown_order::BigNumber::zero());
            for other in keys.iter().skip(i + 1) {
                assert_ne!(key, other);
            }
        }
    }
}
