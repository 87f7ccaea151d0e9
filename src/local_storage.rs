// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Typed, per-participant storage for protocol state.
//!
//! Each participant accumulates material keyed by `(what it is, who it came
//! from)`. The "what it is" part is a [`TypeTag`], a zero-sized marker type
//! that pins the stored value's type, so retrieval is statically typed and
//! two kinds of material can never alias.

use crate::{
    errors::{InternalError, Result},
    protocol::ParticipantIdentifier,
};
use std::{
    any::{Any, TypeId},
    collections::HashMap,
};
use tracing::error;

/// A marker type naming one kind of stored protocol material.
pub(crate) trait TypeTag: 'static {
    type Value: Send + Sync;
}

/// In-memory storage for a participant's intermediate protocol state.
#[derive(Default)]
pub(crate) struct LocalStorage {
    storage: HashMap<(TypeId, ParticipantIdentifier), Box<dyn Any + Send + Sync>>,
}

// Stored values are type-erased (and may be secret), so only the entry
// count is printable.
impl std::fmt::Debug for LocalStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStorage")
            .field("entries", &self.storage.len())
            .finish()
    }
}

impl LocalStorage {
    /// Store a value of the type pinned by `T`, associated with
    /// `participant_id`, overwriting any previous value.
    pub(crate) fn store<T: TypeTag>(
        &mut self,
        participant_id: ParticipantIdentifier,
        value: T::Value,
    ) {
        let _ = self
            .storage
            .insert((TypeId::of::<T>(), participant_id), Box::new(value));
    }

    /// Store a value, failing if a value is already present for this tag and
    /// participant.
    pub(crate) fn store_once<T: TypeTag>(
        &mut self,
        participant_id: ParticipantIdentifier,
        value: T::Value,
    ) -> Result<()> {
        if self.contains::<T>(participant_id) {
            error!(
                "Tried to overwrite existing entry for participant {}",
                participant_id
            );
            return Err(InternalError::InternalInvariantFailed);
        }
        self.store::<T>(participant_id, value);
        Ok(())
    }

    /// Retrieve a reference to a stored value, failing if absent.
    pub(crate) fn retrieve<T: TypeTag>(
        &self,
        participant_id: ParticipantIdentifier,
    ) -> Result<&T::Value> {
        self.storage
            .get(&(TypeId::of::<T>(), participant_id))
            .and_then(|any| any.downcast_ref::<T::Value>())
            .ok_or_else(|| {
                error!(
                    "No storage entry of the requested type for participant {}",
                    participant_id
                );
                InternalError::InternalInvariantFailed
            })
    }

    /// Remove and return a stored value, failing if absent.
    pub(crate) fn remove<T: TypeTag>(
        &mut self,
        participant_id: ParticipantIdentifier,
    ) -> Result<T::Value> {
        self.storage
            .remove(&(TypeId::of::<T>(), participant_id))
            .and_then(|any| any.downcast::<T::Value>().ok())
            .map(|boxed| *boxed)
            .ok_or_else(|| {
                error!(
                    "No storage entry of the requested type for participant {}",
                    participant_id
                );
                InternalError::InternalInvariantFailed
            })
    }

    /// Check whether a value is stored for the given tag and participant.
    pub(crate) fn contains<T: TypeTag>(&self, participant_id: ParticipantIdentifier) -> bool {
        self.storage
            .contains_key(&(TypeId::of::<T>(), participant_id))
    }

    /// Check whether values are stored for the given tag for _all_ of the
    /// given participants.
    pub(crate) fn contains_for_all_ids<T: TypeTag>(
        &self,
        participant_ids: &[ParticipantIdentifier],
    ) -> bool {
        participant_ids.iter().all(|&id| self.contains::<T>(id))
    }
}
