// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Error types for the key generation protocol.
//!
//! There are two levels of errors. [`CallerError`]s describe mistakes made by
//! the calling application, like passing malformed input or driving a
//! participant after it terminated. [`InternalError`]s describe everything
//! the protocol itself can report, including [`ProtocolError`]s that carry a
//! failure kind and the set of culprit participants responsible for it.

use crate::protocol::ParticipantIdentifier;
use std::fmt;
use thiserror::Error;

/// The default result type of the crate.
pub type Result<T> = std::result::Result<T, InternalError>;

/// Errors that arise from improper use of this library by the calling
/// application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CallerError {
    /// The caller passed input that failed validation.
    #[error("caller provided invalid input")]
    BadInput,
    /// A value could not be serialized for the wire.
    #[error("failed to serialize value")]
    SerializationFailed,
    /// Bytes received from the wire could not be parsed.
    #[error("failed to deserialize value")]
    DeserializationFailed,
    /// A message was delivered to the wrong participant.
    #[error("message was not addressed to this participant")]
    WrongMessageRecipient,
    /// A sampling loop exhausted its retry limit.
    #[error("cryptographic sampling exceeded the retry maximum")]
    RetryFailed,
    /// The participant already produced its output.
    #[error("the protocol instance already terminated")]
    ProtocolAlreadyTerminated,
}

/// Classification of a protocol failure, mirroring what the host can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A message had the wrong type, polarity, or sender.
    InvalidMessage,
    /// A big number fell outside its required range or bit length.
    OutOfRangeValue,
    /// A zero-knowledge proof (discrete log or Paillier) failed to verify.
    ProofFailure,
    /// A secret share did not satisfy its polynomial commitment.
    VssFailure,
    /// A decommitment did not match the commitment it claims to open.
    CommitmentFailure,
    /// Two participants announced the same auxiliary generators.
    DuplicateAuxiliaries,
    /// Pre-parameter generation ran past its deadline.
    Timeout,
    /// The host cancelled pre-parameter generation.
    Cancelled,
    /// A protocol invariant no honest execution can violate was violated.
    FatalInvariant,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ErrorKind::InvalidMessage => "invalid message",
            ErrorKind::OutOfRangeValue => "value out of range",
            ErrorKind::ProofFailure => "proof verification failed",
            ErrorKind::VssFailure => "verifiable secret sharing check failed",
            ErrorKind::CommitmentFailure => "commitment verification failed",
            ErrorKind::DuplicateAuxiliaries => "duplicate auxiliary parameters",
            ErrorKind::Timeout => "timed out",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::FatalInvariant => "fatal invariant violated",
        };
        write!(f, "{msg}")
    }
}

/// A protocol failure, together with the peers responsible for it.
///
/// Culprits are identified by [`ParticipantIdentifier`] value, never by
/// index, so the host can exclude them from a retry committee. Failures that
/// are not attributable to a peer (timeouts, cancellation, local invariant
/// violations) carry an empty culprit list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    kind: ErrorKind,
    culprits: Vec<ParticipantIdentifier>,
}

impl ProtocolError {
    /// A failure with no attributable culprit.
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            culprits: Vec::new(),
        }
    }

    /// A failure attributed to the given peers.
    pub(crate) fn blaming(
        kind: ErrorKind,
        culprits: impl IntoIterator<Item = ParticipantIdentifier>,
    ) -> Self {
        Self {
            kind,
            culprits: culprits.into_iter().collect(),
        }
    }

    /// The kind of failure.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The peers this failure is attributed to. Empty when the failure is
    /// local or infrastructural.
    pub fn culprits(&self) -> &[ParticipantIdentifier] {
        &self.culprits
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.culprits.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} (culprits:", self.kind)?;
            for culprit in &self.culprits {
                write!(f, " {culprit}")?;
            }
            write!(f, ")")
        }
    }
}

/// Errors that can be produced while running the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalError {
    /// The calling application made a mistake.
    #[error("the calling application made a mistake: {0}")]
    CallingApplicationMistake(#[from] CallerError),
    /// The protocol failed; possibly with attributable culprits.
    #[error("protocol failure: {0}")]
    ProtocolError(ProtocolError),
    /// Something went wrong that no external party should have been able to
    /// cause.
    #[error("an internal invariant was violated")]
    InternalInvariantFailed,
}

impl From<ProtocolError> for InternalError {
    fn from(error: ProtocolError) -> Self {
        InternalError::ProtocolError(error)
    }
}

impl InternalError {
    /// The protocol failure carried by this error, if any.
    pub fn protocol_error(&self) -> Option<&ProtocolError> {
        match self {
            InternalError::ProtocolError(error) => Some(error),
            _ => None,
        }
    }
}
