//! Types and functions related to distributed key generation.
//!
//! Produces an ECDSA public key whose private key is Shamir-shared among `n`
//! parties; no party, and no coalition of `threshold` or fewer parties, ever
//! learns the private key.
//!
//! # High-level protocol description
//! The key generation protocol runs in four rounds:
//! - In the first round, each participant samples a secret scalar and a
//!   random polynomial hiding it, commits to the polynomial's per-coefficient
//!   curve commitments, and broadcasts that commitment together with its
//!   Paillier public key, auxiliary modulus `N~` with generators `h1, h2`,
//!   and two discrete log proofs establishing that `h1` and `h2` generate
//!   the same subgroup.
//! - Once all first-round broadcasts have been received, each participant
//!   checks every peer's auxiliary material and discrete log proofs, then
//!   sends each peer its secret share point-to-point and broadcasts the
//!   opening of its commitment.
//! - In the third round, each participant opens and checks all peers'
//!   commitments, verifies every received share against the revealed
//!   polynomial commitments, sums the shares into its private key share,
//!   derives the joint public key, and broadcasts a proof that its Paillier
//!   key was generated honestly, bound to its share key and the joint
//!   public key.
//! - Finally, each participant checks all Paillier key proofs. If that
//!   succeeds it outputs the joint public key, every participant's public
//!   key share and auxiliary material, and its own private key share.
//!
//! Any verification failure aborts the protocol with the set of culprit
//! participants attached, so the caller can exclude them and retry.
// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

mod input;
mod keyshare;
mod messages;
mod output;
mod participant;
mod preparams;

pub use input::Input;
pub use keyshare::{AuxInfoPublic, KeySharePrivate, KeySharePublic};
pub use output::Output;
pub use participant::KeygenParticipant;
pub use preparams::{default_concurrency, PreParams};
