// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Distributed key generation for threshold ECDSA, after Gennaro and
//! Goldfeder (2018).
//!
//! A set of `n` parties jointly generates an ECDSA key pair such that the
//! private key is never materialized on any machine: each party ends up with
//! a Shamir share of it, and any `threshold + 1` parties can later cooperate
//! to use the key while `threshold` or fewer learn nothing. Alongside the
//! key shares, every party produces the auxiliary material later protocol
//! phases rely on: a Paillier key pair proven correct, and an auxiliary
//! safe-prime modulus with two generators proven to span the same subgroup.
//!
//! The crate deliberately stops at the protocol core. Networking, wire
//! framing, retries, peer discovery, and persistent storage belong to the
//! host: the host moves [`Message`]s between [`KeygenParticipant`]s, and
//! each participant reports outgoing messages and its final
//! [`Output`](keygen::Output) through [`ProcessOutcome`]s.
//!
//! ```no_run
//! use gg18_keygen::{
//!     keygen::{Input, KeygenParticipant},
//!     Identifier, ParticipantConfig, ProcessOutcome, ProtocolParticipant,
//! };
//! use rand::rngs::OsRng;
//!
//! # fn main() -> gg18_keygen::errors::Result<()> {
//! gg18_keygen::enable_zeroize();
//! let mut rng = OsRng;
//!
//! let configs = ParticipantConfig::random_quorum(3, &mut rng)?;
//! let sid = Identifier::random(&mut rng);
//! let mut participant = KeygenParticipant::new(
//!     sid,
//!     configs[0].id(),
//!     configs[0].other_ids().to_vec(),
//!     Input::new(1)?,
//! )?;
//!
//! // Start the participant, then feed it every message addressed to it.
//! let ready = participant.initialize_message()?;
//! match participant.process_message(&mut rng, &ready)? {
//!     ProcessOutcome::Processed(_messages) => { /* hand messages to the transport */ }
//!     _ => unreachable!("keygen cannot finish on the ready signal"),
//! }
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]

/// Serialize a value for the wire.
#[macro_export]
macro_rules! serialize {
    ($x:expr) => {{
        ::bincode::serialize($x).map_err(|_| {
            $crate::errors::InternalError::from($crate::errors::CallerError::SerializationFailed)
        })
    }};
}

/// Deserialize untrusted bytes from the wire.
#[macro_export]
macro_rules! deserialize {
    ($x:expr) => {{
        ::bincode::deserialize($x).map_err(|_| {
            $crate::errors::InternalError::from($crate::errors::CallerError::DeserializationFailed)
        })
    }};
}

mod commitments;
mod curve;
pub mod errors;
mod gmp_zeroize;
mod hashing;
pub mod keygen;
mod local_storage;
mod message_queue;
mod messages;
pub mod paillier;
mod participant;
mod protocol;
mod utils;
pub mod vss;
mod zkp;

pub use curve::CurvePoint;
pub use gmp_zeroize::enable_zeroize;
pub use messages::{KeygenMessageType, Message, MessageType};
pub use participant::{ProcessOutcome, ProtocolParticipant, Status};
pub use protocol::{Identifier, ParticipantConfig, ParticipantIdentifier, ProtocolType};
pub use utils::CancellationToken;

pub use keygen::KeygenParticipant;
