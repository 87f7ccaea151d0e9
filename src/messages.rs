// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Message envelopes exchanged between participants.
//!
//! The crate does not talk to the network itself; the host moves [`Message`]s
//! between participants. A message carries its round tag ([`MessageType`]),
//! the session identifier, sender and recipient, a broadcast/unicast
//! polarity flag, and an opaque serialized payload that is only parsed (and
//! then verified) by the participant that consumes it.

use crate::{
    errors::{CallerError, ErrorKind, ProtocolError, Result},
    protocol::{Identifier, ParticipantIdentifier},
};
use serde::{Deserialize, Serialize};
use tracing::error;

/// The type of a protocol message, identifying the protocol and round it
/// belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Key generation messages.
    Keygen(KeygenMessageType),
}

/// The rounds of the key generation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeygenMessageType {
    /// Signal that a participant is ready to start.
    Ready,
    /// Round 1: commitment to the polynomial commitments, Paillier public
    /// key, auxiliary modulus and generators, and discrete log proofs.
    R1Commit,
    /// Round 2: a secret share, sent point-to-point.
    R2Share,
    /// Round 2: the decommitment of the round 1 commitment.
    R2Decommit,
    /// Round 3: the Paillier key-correctness proof.
    R3Proof,
}

/// A message to be delivered to another participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    message_type: MessageType,
    identifier: Identifier,
    from: ParticipantIdentifier,
    to: ParticipantIdentifier,
    is_broadcast: bool,
    /// The serialized payload. Not yet verified; payload types re-check the
    /// message type before deserializing.
    pub(crate) unverified_bytes: Vec<u8>,
}

impl Message {
    /// Create a new message belonging to a broadcast round.
    ///
    /// The host is expected to deliver one copy per recipient; the flag only
    /// records which polarity the round requires.
    pub(crate) fn broadcast<T: Serialize>(
        message_type: MessageType,
        identifier: Identifier,
        from: ParticipantIdentifier,
        to: ParticipantIdentifier,
        payload: &T,
    ) -> Result<Self> {
        Self::new(message_type, identifier, from, to, true, payload)
    }

    /// Create a new point-to-point message.
    pub(crate) fn p2p<T: Serialize>(
        message_type: MessageType,
        identifier: Identifier,
        from: ParticipantIdentifier,
        to: ParticipantIdentifier,
        payload: &T,
    ) -> Result<Self> {
        Self::new(message_type, identifier, from, to, false, payload)
    }

    fn new<T: Serialize>(
        message_type: MessageType,
        identifier: Identifier,
        from: ParticipantIdentifier,
        to: ParticipantIdentifier,
        is_broadcast: bool,
        payload: &T,
    ) -> Result<Self> {
        Ok(Self {
            message_type,
            identifier,
            from,
            to,
            is_broadcast,
            unverified_bytes: serialize!(payload)?,
        })
    }

    /// The type of this message.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// The session this message belongs to.
    pub fn id(&self) -> Identifier {
        self.identifier
    }

    /// The sender of this message.
    pub fn from(&self) -> ParticipantIdentifier {
        self.from
    }

    /// The intended recipient of this message.
    pub fn to(&self) -> ParticipantIdentifier {
        self.to
    }

    /// Whether this message belongs to a broadcast round.
    pub fn is_broadcast(&self) -> bool {
        self.is_broadcast
    }

    /// Check that the message has the expected type.
    pub(crate) fn check_type(&self, expected: MessageType) -> Result<()> {
        if self.message_type() != expected {
            error!(
                "A message was misrouted. Expected {:?}, got {:?}",
                expected,
                self.message_type()
            );
            Err(CallerError::BadInput)?;
        }
        Ok(())
    }

    /// Check that the message has the broadcast polarity its round requires,
    /// attributing a violation to the sender.
    pub(crate) fn check_broadcast_polarity(&self, expected_broadcast: bool) -> Result<()> {
        if self.is_broadcast != expected_broadcast {
            error!(
                "Message {:?} from {} has the wrong polarity (broadcast = {})",
                self.message_type, self.from, self.is_broadcast
            );
            Err(ProtocolError::blaming(
                ErrorKind::InvalidMessage,
                [self.from],
            ))?;
        }
        Ok(())
    }

    /// Swap the polarity flag. Used by tests to forge misrouted messages.
    #[cfg(test)]
    pub(crate) fn with_flipped_polarity(mut self) -> Self {
        self.is_broadcast = !self.is_broadcast;
        self
    }

    /// Replace the payload bytes. Used by tests to simulate a corrupted or
    /// adversarial sender.
    #[cfg(test)]
    pub(crate) fn with_payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.unverified_bytes = serialize!(payload)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    fn test_message(is_broadcast: bool) -> Message {
        let mut rng = init_testing();
        let sid = Identifier::random(&mut rng);
        let from = ParticipantIdentifier::random(&mut rng);
        let to = ParticipantIdentifier::random(&mut rng);
        let ty = MessageType::Keygen(KeygenMessageType::R2Share);
        let payload = vec![1u8, 2, 3];
        if is_broadcast {
            Message::broadcast(ty, sid, from, to, &payload).unwrap()
        } else {
            Message::p2p(ty, sid, from, to, &payload).unwrap()
        }
    }

    #[test]
    fn polarity_violations_attribute_the_sender() {
        let message = test_message(true);
        assert!(message.check_broadcast_polarity(true).is_ok());
        let err = message.check_broadcast_polarity(false).unwrap_err();
        let protocol_error = err.protocol_error().unwrap();
        assert_eq!(protocol_error.kind(), ErrorKind::InvalidMessage);
        assert_eq!(protocol_error.culprits(), &[message.from()]);
    }

    #[test]
    fn type_checks_catch_misrouting() {
        let message = test_message(false);
        assert!(message
            .check_type(MessageType::Keygen(KeygenMessageType::R2Share))
            .is_ok());
        assert!(message
            .check_type(MessageType::Keygen(KeygenMessageType::R1Commit))
            .is_err());
    }
}
