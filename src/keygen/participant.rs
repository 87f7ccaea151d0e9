//! The distributed key generation participant.

// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use std::collections::HashMap;

use super::{
    input::Input,
    keyshare::{AuxInfoPublic, KeySharePrivate, KeySharePublic},
    messages::{KeygenRound1, KeygenRound2Decommit, KeygenRound2Share, KeygenRound3},
    output::Output,
    preparams::PreParams,
};
use crate::{
    commitments,
    curve::{flatten_points, k256_order, unflatten_points, CurvePoint},
    errors::{CallerError, ErrorKind, InternalError, ProtocolError, Result},
    local_storage::{LocalStorage, TypeTag},
    messages::{KeygenMessageType, Message, MessageType},
    participant::{InnerProtocolParticipant, ProcessOutcome, ProtocolParticipant, Status},
    paillier::PAILLIER_MODULUS_BITS,
    protocol::{Identifier, ParticipantConfig, ParticipantIdentifier, ProtocolType},
    run_only_once,
    utils::{random_positive_bn, run_parallel, CancellationToken},
    vss,
    zkp::dln::DlnProof,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use tracing::{error, info, instrument, warn};
use zeroize::Zeroizing;

mod storage {
    use super::*;

    pub(super) struct Round1;
    impl TypeTag for Round1 {
        type Value = KeygenRound1;
    }
    pub(super) struct Decommit;
    impl TypeTag for Decommit {
        type Value = crate::commitments::HashDecommitment;
    }
    pub(super) struct VssShare;
    impl TypeTag for VssShare {
        type Value = vss::Share;
    }
    pub(super) struct VssCommitments;
    impl TypeTag for VssCommitments {
        type Value = Vec<CurvePoint>;
    }
    pub(super) struct OutboundShares;
    impl TypeTag for OutboundShares {
        type Value = Vec<vss::Share>;
    }
    pub(super) struct PreParamsStore;
    impl TypeTag for PreParamsStore {
        type Value = PreParams;
    }
    pub(super) struct Auxiliaries;
    impl TypeTag for Auxiliaries {
        type Value = AuxInfoPublic;
    }
    pub(super) struct PublicKey;
    impl TypeTag for PublicKey {
        type Value = CurvePoint;
    }
    pub(super) struct KeyShares;
    impl TypeTag for KeyShares {
        type Value = Vec<KeySharePublic>;
    }
    pub(super) struct PrivateShare;
    impl TypeTag for PrivateShare {
        type Value = KeySharePrivate;
    }
    pub(super) struct ProofVerified;
    impl TypeTag for ProofVerified {
        type Value = ();
    }
}

/**
A [`ProtocolParticipant`] that runs the distributed key generation protocol.

# Protocol input
- The reconstruction threshold `t`; any `t + 1` participants can later
  cooperate to use the key, while `t` or fewer learn nothing about it.
- Optionally, pre-computed [`PreParams`].

# Protocol output
- The joint ECDSA public key.
- Every participant's public key share and public auxiliary material
  (Paillier public key, auxiliary modulus, generators).
- This participant's private share of the joint secret key.

# 🔒 Storage requirements
The private key share in the output must be stored securely by the calling
application, and a best effort should be made to drop it from memory after
it's securely stored. The public components can be stored in the clear.
**/
#[derive(Debug)]
pub struct KeygenParticipant {
    /// The current session identifier.
    sid: Identifier,
    /// The current protocol input.
    input: Input,
    /// A unique identifier for this participant.
    id: ParticipantIdentifier,
    /// A list of all other participant identifiers participating in the
    /// protocol.
    other_participant_ids: Vec<ParticipantIdentifier>,
    /// Local storage for this participant to store protocol material.
    local_storage: LocalStorage,
    /// Status of the protocol execution.
    status: Status,
}

impl ProtocolParticipant for KeygenParticipant {
    type Input = Input;
    type Output = Output;

    fn new(
        sid: Identifier,
        id: ParticipantIdentifier,
        other_participant_ids: Vec<ParticipantIdentifier>,
        input: Self::Input,
    ) -> Result<Self> {
        let config = ParticipantConfig::new(id, &other_participant_ids)?;
        if input.threshold() >= config.count() {
            error!(
                "Cannot run a threshold-{} keygen with only {} participants",
                input.threshold(),
                config.count()
            );
            Err(CallerError::BadInput)?;
        }
        Ok(Self {
            sid,
            input,
            id,
            other_participant_ids,
            local_storage: Default::default(),
            status: Status::NotReady,
        })
    }

    fn ready_type() -> MessageType {
        MessageType::Keygen(KeygenMessageType::Ready)
    }

    fn protocol_type() -> ProtocolType {
        ProtocolType::Keygen
    }

    fn id(&self) -> ParticipantIdentifier {
        self.id
    }

    fn other_ids(&self) -> &[ParticipantIdentifier] {
        &self.other_participant_ids
    }

    fn sid(&self) -> Identifier {
        self.sid
    }

    #[instrument(skip_all)]
    fn process_message<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<Self::Output>> {
        info!(
            "KEYGEN: Player {}: received {:?} from {}",
            self.id(),
            message.message_type(),
            message.from()
        );

        if *self.status() == Status::TerminatedSuccessfully {
            Err(CallerError::ProtocolAlreadyTerminated)?;
        }
        if message.id() != self.sid() {
            warn!("Ignoring a message from a different session");
            return Ok(ProcessOutcome::Incomplete);
        }
        if message.to() != self.id() {
            error!("A message addressed to {} reached {}", message.to(), self.id());
            Err(CallerError::WrongMessageRecipient)?;
        }
        if message.from() != self.id() && !self.other_participant_ids.contains(&message.from()) {
            error!("Received a message from an unknown sender");
            Err(ProtocolError::new(ErrorKind::InvalidMessage))?;
        }

        if !self.status().is_ready() && message.message_type() != Self::ready_type() {
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }

        match message.message_type() {
            MessageType::Keygen(KeygenMessageType::Ready) => self.handle_ready_msg(rng, message),
            MessageType::Keygen(KeygenMessageType::R1Commit) => self.handle_round_one_msg(message),
            MessageType::Keygen(KeygenMessageType::R2Share) => {
                self.handle_round_two_share_msg(message)
            }
            MessageType::Keygen(KeygenMessageType::R2Decommit) => {
                self.handle_round_two_decommit_msg(message)
            }
            MessageType::Keygen(KeygenMessageType::R3Proof) => self.handle_round_three_msg(message),
        }
    }

    fn status(&self) -> &Status {
        &self.status
    }
}

impl InnerProtocolParticipant for KeygenParticipant {
    fn local_storage(&self) -> &LocalStorage {
        &self.local_storage
    }

    fn local_storage_mut(&mut self) -> &mut LocalStorage {
        &mut self.local_storage
    }

    fn status_mut(&mut self) -> &mut Status {
        &mut self.status
    }
}

impl KeygenParticipant {
    /// Handle the "Ready" message that starts this participant.
    ///
    /// Triggers generation of this participant's round one message, and
    /// replays any round one messages that arrived early.
    #[instrument(skip_all, err(Debug))]
    fn handle_ready_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        info!("Handling ready keygen message.");

        self.process_ready_message(message)?;
        if !self.status().is_ready() {
            return Ok(ProcessOutcome::Incomplete);
        }
        let round_one_messages = run_only_once!(self.gen_round_one_msgs(rng))?;

        let stashed = self.fetch_messages(MessageType::Keygen(KeygenMessageType::R1Commit))?;
        let outcomes = stashed
            .iter()
            .map(|stashed_message| self.handle_round_one_msg(stashed_message))
            .collect::<Result<Vec<_>>>()?;
        ProcessOutcome::collect_with_messages(outcomes, round_one_messages)
    }

    /// Generate the protocol's round one message.
    ///
    /// This samples the secret scalar, shares it, commits to the sharing's
    /// polynomial commitments, acquires pre-parameters, and broadcasts the
    /// commitment alongside all public auxiliary material and its discrete
    /// log proofs. The secret scalar is erased before the round completes;
    /// from here on it exists only through its shares.
    #[instrument(skip_all, err(Debug))]
    fn gen_round_one_msgs<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        info!("Generating round one keygen messages.");

        let q = k256_order();
        let ui = Zeroizing::new(random_positive_bn(rng, &q));

        let participants = self.all_participants();
        let share_keys = participants
            .iter()
            .map(ParticipantIdentifier::share_key)
            .collect::<Vec<_>>();
        let (vss_commitments, shares) =
            vss::create(self.input.threshold(), &ui, &share_keys, rng)?;
        drop(ui);

        let flattened = flatten_points(&vss_commitments)?;
        let (commitment, decommitment) = commitments::commit(rng, &flattened)?;

        let pre_params = match self.input.take_pre_params() {
            Some(pre_params) => pre_params,
            None => {
                let token = CancellationToken::with_timeout(self.input.pre_param_timeout());
                PreParams::generate_with_token(rng, &token, self.input.concurrency())?
            }
        };

        let dln_proof_1 = DlnProof::prove(
            rng,
            &pre_params.h1,
            &pre_params.h2,
            &pre_params.alpha,
            &pre_params.p,
            &pre_params.q,
            &pre_params.n_tilde,
        );
        let dln_proof_2 = DlnProof::prove(
            rng,
            &pre_params.h2,
            &pre_params.h1,
            &pre_params.beta,
            &pre_params.p,
            &pre_params.q,
            &pre_params.n_tilde,
        );

        let round1 = KeygenRound1 {
            commitment,
            paillier_pk: pre_params.encryption_key().clone(),
            n_tilde: pre_params.n_tilde.clone(),
            h1: pre_params.h1.clone(),
            h2: pre_params.h2.clone(),
            dln_proof_1,
            dln_proof_2,
        };

        let my_index = participants
            .iter()
            .position(|&pid| pid == self.id())
            .ok_or(InternalError::InternalInvariantFailed)?;
        let my_share = shares
            .get(my_index)
            .cloned()
            .ok_or(InternalError::InternalInvariantFailed)?;

        let aux = AuxInfoPublic::new(
            self.id(),
            pre_params.encryption_key().clone(),
            pre_params.n_tilde.clone(),
            pre_params.h1.clone(),
            pre_params.h2.clone(),
        );

        let id = self.id();
        self.local_storage
            .store::<storage::PreParamsStore>(id, pre_params);
        self.local_storage.store::<storage::Auxiliaries>(id, aux);
        self.local_storage
            .store::<storage::VssCommitments>(id, vss_commitments);
        self.local_storage
            .store::<storage::OutboundShares>(id, shares);
        self.local_storage.store::<storage::VssShare>(id, my_share);
        self.local_storage
            .store::<storage::Decommit>(id, decommitment);
        self.local_storage
            .store::<storage::Round1>(id, round1.clone());

        self.message_for_other_participants(
            MessageType::Keygen(KeygenMessageType::R1Commit),
            &round1,
        )
    }

    /// Handle a round one message from a peer.
    ///
    /// Once every participant's round one broadcast is recorded, the
    /// auxiliary material of all peers is verified and this participant
    /// emits its round two messages.
    #[instrument(skip_all, err(Debug))]
    fn handle_round_one_msg(
        &mut self,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        if self.check_for_duplicate_msg::<storage::Round1>(message.from()) {
            warn!("Dropping a duplicate round one message from {}", message.from());
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling round one keygen message.");

        let round1 = KeygenRound1::from_message(message)?;
        self.local_storage
            .store_once::<storage::Round1>(message.from(), round1)?;

        let r1_done = self
            .local_storage
            .contains_for_all_ids::<storage::Round1>(&self.all_participants());
        if !r1_done {
            return Ok(ProcessOutcome::Incomplete);
        }

        let round_two_messages = run_only_once!(self.gen_round_two_msgs())?;

        let mut outcomes = self
            .fetch_messages(MessageType::Keygen(KeygenMessageType::R2Share))?
            .iter()
            .map(|stashed| self.handle_round_two_share_msg(stashed))
            .collect::<Result<Vec<_>>>()?;
        let decommit_outcomes = self
            .fetch_messages(MessageType::Keygen(KeygenMessageType::R2Decommit))?
            .iter()
            .map(|stashed| self.handle_round_two_decommit_msg(stashed))
            .collect::<Result<Vec<_>>>()?;
        outcomes.extend(decommit_outcomes);

        ProcessOutcome::collect_with_messages(outcomes, round_two_messages)
    }

    /// Generate the protocol's round two messages.
    ///
    /// Before anything is sent, every peer's auxiliary material and both of
    /// its discrete log proofs are verified; a failure aborts the protocol
    /// and attributes the culprits. The outcome is one point-to-point share
    /// per peer, in ascending peer order, followed by the broadcast opening
    /// of the round one commitment.
    #[instrument(skip_all, err(Debug))]
    fn gen_round_two_msgs(&mut self) -> Result<Vec<Message>> {
        info!("Generating round two keygen messages.");

        self.verify_auxiliary_material()?;

        let participants = self.all_participants();
        let shares = self
            .local_storage
            .retrieve::<storage::OutboundShares>(self.id())?
            .clone();

        let mut messages = Vec::new();
        for (pid, share) in participants.iter().zip(shares.into_iter()) {
            if *pid == self.id() {
                continue;
            }
            messages.push(Message::p2p(
                MessageType::Keygen(KeygenMessageType::R2Share),
                self.sid(),
                self.id(),
                *pid,
                &KeygenRound2Share { share },
            )?);
        }

        let decommitment = self
            .local_storage
            .retrieve::<storage::Decommit>(self.id())?
            .clone();
        messages.extend(self.message_for_other_participants(
            MessageType::Keygen(KeygenMessageType::R2Decommit),
            &KeygenRound2Decommit { decommitment },
        )?);

        Ok(messages)
    }

    /// Verify the round one auxiliary material of every participant.
    ///
    /// Checks modulus widths, generator distinctness, cross-participant
    /// generator collisions, and both discrete log proofs per peer. Proof
    /// verification fans out over the configured worker pool; all verdicts
    /// are collected before the culprit set is reported.
    #[instrument(skip_all, err(Debug))]
    fn verify_auxiliary_material(&mut self) -> Result<()> {
        info!("Verifying the auxiliary material of all participants.");

        let participants = self.all_participants();
        let mut seen_generators: HashMap<Vec<u8>, ParticipantIdentifier> = HashMap::new();
        let mut round1s = Vec::with_capacity(participants.len());

        for &pid in &participants {
            let round1 = self.local_storage.retrieve::<storage::Round1>(pid)?;
            if round1.paillier_pk.modulus().bit_length() != PAILLIER_MODULUS_BITS {
                error!("Paillier modulus of {} has the wrong bit length", pid);
                Err(ProtocolError::blaming(ErrorKind::OutOfRangeValue, [pid]))?;
            }
            if round1.n_tilde.bit_length() != PAILLIER_MODULUS_BITS {
                error!("Auxiliary modulus of {} has the wrong bit length", pid);
                Err(ProtocolError::blaming(ErrorKind::OutOfRangeValue, [pid]))?;
            }
            if round1.h1 == round1.h2 {
                error!("Auxiliary generators of {} are equal", pid);
                Err(ProtocolError::blaming(ErrorKind::OutOfRangeValue, [pid]))?;
            }
            for generator in [&round1.h1, &round1.h2] {
                if seen_generators.insert(generator.to_bytes(), pid).is_some() {
                    error!("An auxiliary generator of {} was already announced", pid);
                    Err(ProtocolError::blaming(
                        ErrorKind::DuplicateAuxiliaries,
                        [pid],
                    ))?;
                }
            }
            round1s.push((pid, round1.clone()));
        }

        let mut proof_statements = Vec::with_capacity(2 * (participants.len() - 1));
        for (pid, round1) in &round1s {
            if *pid == self.id() {
                continue;
            }
            proof_statements.push((*pid, round1, true));
            proof_statements.push((*pid, round1, false));
        }
        let tasks: Vec<_> = proof_statements
            .into_iter()
            .map(|(pid, round1, forward)| {
                move || {
                    let valid = if forward {
                        round1
                            .dln_proof_1
                            .verify(&round1.h1, &round1.h2, &round1.n_tilde)
                    } else {
                        round1
                            .dln_proof_2
                            .verify(&round1.h2, &round1.h1, &round1.n_tilde)
                    };
                    (pid, valid)
                }
            })
            .collect();
        let verdicts = run_parallel(self.input.concurrency(), tasks);

        let mut culprits = Vec::new();
        for (pid, valid) in verdicts {
            if !valid && !culprits.contains(&pid) {
                error!("A discrete log proof of {} failed to verify", pid);
                culprits.push(pid);
            }
        }
        if !culprits.is_empty() {
            Err(ProtocolError::blaming(ErrorKind::ProofFailure, culprits))?;
        }

        for (pid, round1) in round1s {
            if pid == self.id() {
                continue;
            }
            self.local_storage.store::<storage::Auxiliaries>(
                pid,
                AuxInfoPublic::new(pid, round1.paillier_pk, round1.n_tilde, round1.h1, round1.h2),
            );
        }
        Ok(())
    }

    /// Handle a round two point-to-point message carrying a peer's share
    /// for us.
    #[instrument(skip_all, err(Debug))]
    fn handle_round_two_share_msg(
        &mut self,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        if !self.round_one_complete() {
            info!("Not yet ready to handle a round two keygen message; stashing.");
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        if self.check_for_duplicate_msg::<storage::VssShare>(message.from()) {
            warn!("Dropping a duplicate share message from {}", message.from());
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling round two keygen share message.");

        let round2 = KeygenRound2Share::from_message(message)?;
        if round2.share.id() != &self.id().share_key()
            || round2.share.threshold() != self.input.threshold()
        {
            error!("Received a share that was not addressed to this participant");
            Err(ProtocolError::blaming(
                ErrorKind::InvalidMessage,
                [message.from()],
            ))?;
        }
        self.local_storage
            .store_once::<storage::VssShare>(message.from(), round2.share)?;

        self.maybe_finish_round_two()
    }

    /// Handle a round two broadcast opening a peer's round one commitment.
    #[instrument(skip_all, err(Debug))]
    fn handle_round_two_decommit_msg(
        &mut self,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        if !self.round_one_complete() {
            info!("Not yet ready to handle a round two keygen message; stashing.");
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        if self.check_for_duplicate_msg::<storage::Decommit>(message.from()) {
            warn!(
                "Dropping a duplicate decommitment message from {}",
                message.from()
            );
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling round two keygen decommitment message.");

        let round2 = KeygenRound2Decommit::from_message(message)?;
        self.local_storage
            .store_once::<storage::Decommit>(message.from(), round2.decommitment)?;

        self.maybe_finish_round_two()
    }

    /// Whether every participant's round one broadcast has been recorded.
    fn round_one_complete(&self) -> bool {
        self.local_storage
            .contains_for_all_ids::<storage::Round1>(&self.all_participants())
    }

    fn maybe_finish_round_two(
        &mut self,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let participants = self.all_participants();
        let r2_done = self
            .local_storage
            .contains_for_all_ids::<storage::Decommit>(&participants)
            && self
                .local_storage
                .contains_for_all_ids::<storage::VssShare>(&participants);
        if !r2_done {
            return Ok(ProcessOutcome::Incomplete);
        }

        let round_three_messages = run_only_once!(self.gen_round_three_msgs())?;

        let outcomes = self
            .fetch_messages(MessageType::Keygen(KeygenMessageType::R3Proof))?
            .iter()
            .map(|stashed| self.handle_round_three_msg(stashed))
            .collect::<Result<Vec<_>>>()?;
        ProcessOutcome::collect_with_messages(outcomes, round_three_messages)
    }

    /// Generate the protocol's round three message.
    ///
    /// Opens every peer's commitment, verifies every received share against
    /// the revealed polynomial commitments, sums the shares into this
    /// participant's private key share, derives the joint public key and
    /// every participant's public key share, and broadcasts the Paillier
    /// key-correctness proof bound to this participant's share key and the
    /// joint public key.
    #[instrument(skip_all, err(Debug))]
    fn gen_round_three_msgs(&mut self) -> Result<Vec<Message>> {
        info!("Generating round three keygen messages.");

        let participants = self.all_participants();
        let threshold = self.input.threshold();
        let q = k256_order();

        // Open and check peer sharings on the worker pool, collecting every
        // verdict before attributing failures.
        let peer_checks: Vec<_> = participants
            .iter()
            .filter(|&&pid| pid != self.id())
            .map(|&pid| {
                let round1 = self.local_storage.retrieve::<storage::Round1>(pid)?;
                let decommitment = self.local_storage.retrieve::<storage::Decommit>(pid)?;
                let share = self.local_storage.retrieve::<storage::VssShare>(pid)?;
                Ok((pid, round1.commitment.clone(), decommitment.clone(), share.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let tasks: Vec<_> = peer_checks
            .into_iter()
            .map(|(pid, commitment, decommitment, share)| {
                move || {
                    let flattened = match decommitment.decommit(&commitment) {
                        Ok(flattened) => flattened,
                        Err(_) => return (pid, Err(ErrorKind::CommitmentFailure)),
                    };
                    let vss_commitments = match unflatten_points(flattened) {
                        Ok(commitments) => commitments,
                        Err(_) => return (pid, Err(ErrorKind::CommitmentFailure)),
                    };
                    if vss_commitments.len() != threshold + 1 {
                        return (pid, Err(ErrorKind::CommitmentFailure));
                    }
                    if !share.verify(threshold, &vss_commitments) {
                        return (pid, Err(ErrorKind::VssFailure));
                    }
                    (pid, Ok(vss_commitments))
                }
            })
            .collect();
        let verdicts = run_parallel(self.input.concurrency(), tasks);

        let mut culprits = Vec::new();
        let mut failure_kind = None;
        let mut peer_commitments = Vec::with_capacity(verdicts.len());
        for (pid, verdict) in verdicts {
            match verdict {
                Ok(vss_commitments) => peer_commitments.push(vss_commitments),
                Err(kind) => {
                    error!("The sharing of {} failed verification: {}", pid, kind);
                    let _ = failure_kind.get_or_insert(kind);
                    culprits.push(pid);
                }
            }
        }
        if let Some(kind) = failure_kind {
            Err(ProtocolError::blaming(kind, culprits))?;
        }

        // X_i = sum of every participant's share for us.
        let mut xi = BigNumber::zero();
        for &pid in &participants {
            let share = self.local_storage.retrieve::<storage::VssShare>(pid)?;
            xi = (&xi + share.share()).nmod(&q);
        }
        let private_share = KeySharePrivate::from_bigint(&xi);

        // The aggregate polynomial commitment: coefficient-wise sum over
        // all participants' commitments.
        let mut aggregated = self
            .local_storage
            .retrieve::<storage::VssCommitments>(self.id())?
            .clone();
        for vss_commitments in &peer_commitments {
            for (sum, term) in aggregated.iter_mut().zip(vss_commitments.iter()) {
                *sum = *sum + *term;
            }
        }

        // Every participant's public key share is the aggregate polynomial
        // evaluated in the exponent at that participant's share key.
        let mut public_key_shares = Vec::with_capacity(participants.len());
        for &pid in &participants {
            let share_key = pid.share_key();
            let mut big_x = aggregated[0];
            let mut exponent = BigNumber::one();
            for coefficient in aggregated.iter().skip(1) {
                exponent = exponent.modmul(&share_key, &q);
                big_x = big_x + coefficient.multiply_by_bignum(&exponent)?;
            }
            public_key_shares.push(KeySharePublic::new(pid, big_x));
        }

        let public_key = aggregated[0];
        let my_public_share = self
            .find_key_share(&public_key_shares, self.id())?
            .as_ref()
            .to_owned();
        if private_share.public_point()? != my_public_share {
            error!("This participant's aggregated share disagrees with the public polynomial");
            return Err(InternalError::InternalInvariantFailed);
        }
        info!("KEYGEN: Player {}: computed the joint public key", self.id());

        let id = self.id();
        self.local_storage
            .store::<storage::PrivateShare>(id, private_share);
        self.local_storage
            .store::<storage::KeyShares>(id, public_key_shares);
        self.local_storage
            .store::<storage::PublicKey>(id, public_key);

        let pre_params = self
            .local_storage
            .retrieve::<storage::PreParamsStore>(id)?;
        let proof = pre_params
            .paillier_sk
            .prove(&id.share_key(), &public_key)?;
        self.local_storage.store::<storage::ProofVerified>(id, ());

        self.message_for_other_participants(
            MessageType::Keygen(KeygenMessageType::R3Proof),
            &KeygenRound3 { proof },
        )
    }

    /// Handle a round three broadcast carrying a peer's Paillier
    /// key-correctness proof.
    #[instrument(skip_all, err(Debug))]
    fn handle_round_three_msg(
        &mut self,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        if !self.local_storage.contains::<storage::PublicKey>(self.id()) {
            info!("Not yet ready to handle a round three keygen message; stashing.");
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        if self.check_for_duplicate_msg::<storage::ProofVerified>(message.from()) {
            warn!("Dropping a duplicate proof message from {}", message.from());
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling round three keygen message.");

        let round3 = KeygenRound3::from_message(message)?;
        let aux = self
            .local_storage
            .retrieve::<storage::Auxiliaries>(message.from())?;
        let public_key = self
            .local_storage
            .retrieve::<storage::PublicKey>(self.id())?;
        let share_key = message.from().share_key();
        if !round3
            .proof
            .verify(aux.paillier_pk(), &share_key, public_key)
        {
            error!("The Paillier key proof of {} failed to verify", message.from());
            Err(ProtocolError::blaming(
                ErrorKind::ProofFailure,
                [message.from()],
            ))?;
        }
        self.local_storage
            .store_once::<storage::ProofVerified>(message.from(), ())?;

        self.maybe_finish_protocol()
    }

    fn maybe_finish_protocol(
        &mut self,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let participants = self.all_participants();
        let all_proofs_verified = self
            .local_storage
            .contains_for_all_ids::<storage::ProofVerified>(&participants);
        if !all_proofs_verified {
            return Ok(ProcessOutcome::Incomplete);
        }

        let id = self.id();
        let public_key = self.local_storage.remove::<storage::PublicKey>(id)?;
        let public_key_shares = self.local_storage.remove::<storage::KeyShares>(id)?;
        let private_share = self.local_storage.remove::<storage::PrivateShare>(id)?;
        let public_aux = participants
            .iter()
            .map(|&pid| {
                self.local_storage
                    .retrieve::<storage::Auxiliaries>(pid)
                    .map(|aux| aux.clone())
            })
            .collect::<Result<Vec<_>>>()?;
        let all_share_ids = participants
            .iter()
            .map(ParticipantIdentifier::share_key)
            .collect();

        let output = Output::from_parts(
            public_key,
            public_key_shares,
            public_aux,
            private_share,
            id.share_key(),
            all_share_ids,
        )?;

        self.status = Status::TerminatedSuccessfully;
        Ok(ProcessOutcome::Terminated(output))
    }

    fn find_key_share<'a>(
        &self,
        shares: &'a [KeySharePublic],
        pid: ParticipantIdentifier,
    ) -> Result<&'a KeySharePublic> {
        shares
            .iter()
            .find(|share| share.participant() == pid)
            .ok_or(InternalError::InternalInvariantFailed)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{errors::ErrorKind, utils::testing::init_testing, vss};
    use rand::{rngs::StdRng, CryptoRng, Rng, RngCore, SeedableRng};
    use tracing::debug;

    impl KeygenParticipant {
        pub(crate) fn new_quorum<R: RngCore + CryptoRng>(
            sid: Identifier,
            quorum_size: usize,
            threshold: usize,
            rng: &mut R,
        ) -> Result<Vec<Self>> {
            let configs = ParticipantConfig::random_quorum(quorum_size, rng)?;
            configs
                .into_iter()
                .map(|config| {
                    let input = Input::new(threshold)?
                        .with_pre_params(PreParams::simulate_from_pool(rng))?;
                    Self::new(sid, config.id(), config.other_ids().to_vec(), input)
                })
                .collect()
        }
    }

    /// Deliver all messages into their respective participant's inboxes.
    fn deliver_all(
        messages: &[Message],
        inboxes: &mut HashMap<ParticipantIdentifier, Vec<Message>>,
    ) {
        for message in messages {
            inboxes
                .get_mut(&message.to())
                .unwrap()
                .push(message.clone());
        }
    }

    fn is_keygen_done(quorum: &[KeygenParticipant]) -> bool {
        quorum
            .iter()
            .all(|participant| *participant.status() == Status::TerminatedSuccessfully)
    }

    /// Pick a random participant with a non-empty inbox and have it process
    /// a random message.
    fn process_messages<R: RngCore + CryptoRng>(
        quorum: &mut [KeygenParticipant],
        inboxes: &mut HashMap<ParticipantIdentifier, Vec<Message>>,
        rng: &mut R,
    ) -> Option<(usize, ProcessOutcome<Output>)> {
        let index = rng.gen_range(0..quorum.len());
        let participant = quorum.get_mut(index).unwrap();
        let inbox = inboxes.get_mut(&participant.id()).unwrap();
        if inbox.is_empty() {
            return None;
        }
        let message = inbox.remove(rng.gen_range(0..inbox.len()));
        debug!(
            "processing participant: {}, with message type: {:?} from {}",
            &participant.id(),
            &message.message_type(),
            &message.from(),
        );
        Some((index, participant.process_message(rng, &message).unwrap()))
    }

    /// Run a full keygen over in-memory inboxes with a randomized schedule;
    /// returns each participant's identifier and output.
    fn run_keygen<R: RngCore + CryptoRng>(
        quorum_size: usize,
        threshold: usize,
        rng: &mut R,
    ) -> Result<Vec<(ParticipantIdentifier, Output)>> {
        let sid = Identifier::random(rng);
        let mut quorum = KeygenParticipant::new_quorum(sid, quorum_size, threshold, rng)?;
        let mut inboxes = HashMap::new();
        for participant in &quorum {
            let _ = inboxes.insert(participant.id(), vec![participant.initialize_message()?]);
        }

        let mut outputs = std::iter::repeat_with(|| None)
            .take(quorum_size)
            .collect::<Vec<_>>();
        while !is_keygen_done(&quorum) {
            let (index, outcome) = match process_messages(&mut quorum, &mut inboxes, rng) {
                None => continue,
                Some(x) => x,
            };
            match outcome {
                ProcessOutcome::Incomplete => {}
                ProcessOutcome::Processed(messages) => deliver_all(&messages, &mut inboxes),
                ProcessOutcome::Terminated(output) => outputs[index] = Some(output),
                ProcessOutcome::TerminatedForThisParticipant(output, messages) => {
                    deliver_all(&messages, &mut inboxes);
                    outputs[index] = Some(output);
                }
            }
        }

        Ok(quorum
            .iter()
            .map(ProtocolParticipant::id)
            .zip(outputs.into_iter().flatten())
            .collect())
    }

    /// Start every participant and collect the resulting round one
    /// messages.
    fn start_all<R: RngCore + CryptoRng>(
        quorum: &mut [KeygenParticipant],
        rng: &mut R,
    ) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        for participant in quorum.iter_mut() {
            let ready = participant.initialize_message()?;
            let (output, new_messages) = participant.process_message(rng, &ready)?.into_parts();
            assert!(output.is_none());
            messages.extend(new_messages);
        }
        Ok(messages)
    }

    /// Deliver each message to its recipient and collect everything the
    /// recipients emit in response.
    fn deliver_each<R: RngCore + CryptoRng>(
        quorum: &mut [KeygenParticipant],
        messages: &[Message],
        rng: &mut R,
    ) -> Result<Vec<Message>> {
        let mut emitted = Vec::new();
        for message in messages {
            let recipient = quorum
                .iter_mut()
                .find(|participant| participant.id() == message.to())
                .unwrap();
            let (output, new_messages) = recipient.process_message(rng, message)?.into_parts();
            assert!(output.is_none());
            emitted.extend(new_messages);
        }
        Ok(emitted)
    }

    #[test]
    fn keygen_always_produces_valid_outputs() -> Result<()> {
        let mut rng = init_testing();
        for (quorum_size, threshold) in [(3, 1), (4, 2), (5, 3), (7, 5)] {
            keygen_produces_valid_outputs(quorum_size, threshold, &mut rng)?;
        }
        Ok(())
    }

    fn keygen_produces_valid_outputs<R: RngCore + CryptoRng>(
        quorum_size: usize,
        threshold: usize,
        rng: &mut R,
    ) -> Result<()> {
        let outputs = run_keygen(quorum_size, threshold, rng)?;
        assert_eq!(outputs.len(), quorum_size);

        // Everybody agrees on the public material.
        let (_, first) = &outputs[0];
        for (_, output) in &outputs {
            assert_eq!(output.public_key_point(), first.public_key_point());
            assert_eq!(output.public_key_shares(), first.public_key_shares());
            assert_eq!(output.public_aux(), first.public_aux());
            assert_eq!(output.all_share_ids(), first.all_share_ids());
            assert!(output.public_key().is_ok());
        }

        // Every participant's private share matches the public key share
        // everyone else computed for it.
        for (pid, output) in &outputs {
            assert_eq!(output.share_id(), &pid.share_key());
            let expected = output.private_key_share().public_point()?;
            let advertised = first.find_public_key_share(*pid).unwrap();
            assert_eq!(advertised.as_ref(), &expected);
        }

        // Any threshold + 1 private shares interpolate to the secret key
        // behind the joint public key; threshold shares do not suffice.
        let shares: Vec<_> = outputs
            .iter()
            .map(|(_, output)| {
                vss::Share::new(
                    threshold,
                    output.share_id().clone(),
                    output.private_key_share().as_ref().clone(),
                )
            })
            .collect();
        let secret = vss::reconstruct(&shares[..threshold + 1])?;
        assert_eq!(vss::reconstruct(&shares)?, secret);
        assert!(vss::reconstruct(&shares[..threshold]).is_err());
        assert_eq!(
            &CurvePoint::GENERATOR.multiply_by_bignum(&secret)?,
            first.public_key_point()
        );

        // Save data can be restricted to a signing committee.
        let me = outputs[0].0;
        let mut committee = vec![me];
        committee.extend(
            first
                .public_key_shares()
                .iter()
                .map(KeySharePublic::participant)
                .filter(|pid| *pid != me)
                .take(threshold),
        );
        let subset = outputs[0].1.subset(&committee)?;
        assert_eq!(subset.public_key_shares().len(), threshold + 1);
        assert_eq!(subset.public_key_point(), first.public_key_point());

        Ok(())
    }

    #[test]
    fn round_one_messages_are_deterministic() -> Result<()> {
        let mut rng = init_testing();
        let quorum_size = 3;
        let configs = ParticipantConfig::random_quorum(quorum_size, &mut rng)?;
        let pre_params: Vec<_> = (0..quorum_size)
            .map(|_| PreParams::simulate_from_pool(&mut rng))
            .collect();
        let sid = Identifier::random(&mut rng);
        let seed: [u8; 32] = rng.gen();

        let run = |seed: [u8; 32]| -> Result<Vec<Vec<u8>>> {
            let mut rng = StdRng::from_seed(seed);
            let mut quorum = configs
                .iter()
                .zip(pre_params.iter())
                .map(|(config, pre_params)| {
                    let input = Input::new(1)?.with_pre_params(pre_params.clone())?;
                    KeygenParticipant::new(
                        sid,
                        config.id(),
                        config.other_ids().to_vec(),
                        input,
                    )
                })
                .collect::<Result<Vec<_>>>()?;
            let messages = start_all(&mut quorum, &mut rng)?;
            messages.iter().map(|message| serialize!(message)).collect()
        };

        assert_eq!(run(seed)?, run(seed)?);
        Ok(())
    }

    #[test]
    fn corrupted_dln_proof_attributes_the_culprit() -> Result<()> {
        let mut rng = init_testing();
        let sid = Identifier::random(&mut rng);
        let mut quorum = KeygenParticipant::new_quorum(sid, 3, 1, &mut rng)?;
        let round_one = start_all(&mut quorum, &mut rng)?;

        let target = quorum[0].id();
        let culprit = quorum[1].id();
        let mut to_target: Vec<_> = round_one
            .iter()
            .filter(|message| message.to() == target)
            .cloned()
            .collect();
        for message in to_target.iter_mut() {
            if message.from() == culprit {
                let mut payload = KeygenRound1::from_message(message)?;
                // A proof for the swapped statement cannot verify.
                std::mem::swap(&mut payload.dln_proof_1, &mut payload.dln_proof_2);
                *message = message.clone().with_payload(&payload)?;
            }
        }

        let mut failure = None;
        for message in &to_target {
            if let Err(error) = quorum[0].process_message(&mut rng, message) {
                failure = Some(error);
            }
        }
        let protocol_error = failure.unwrap();
        let protocol_error = protocol_error.protocol_error().unwrap();
        assert_eq!(protocol_error.kind(), ErrorKind::ProofFailure);
        assert_eq!(protocol_error.culprits(), &[culprit]);
        Ok(())
    }

    #[test]
    fn duplicate_auxiliary_generators_attribute_the_later_announcer() -> Result<()> {
        let mut rng = init_testing();
        let sid = Identifier::random(&mut rng);
        let mut quorum = KeygenParticipant::new_quorum(sid, 3, 1, &mut rng)?;
        let round_one = start_all(&mut quorum, &mut rng)?;

        let target = quorum[0].id();
        let reused = quorum[1].id();
        let forger = quorum[2].id();
        let reused_payload = round_one
            .iter()
            .find(|message| message.from() == reused && message.to() == target)
            .map(KeygenRound1::from_message)
            .unwrap()?;

        let mut to_target: Vec<_> = round_one
            .iter()
            .filter(|message| message.to() == target)
            .cloned()
            .collect();
        for message in to_target.iter_mut() {
            if message.from() == forger {
                let mut payload = KeygenRound1::from_message(message)?;
                payload.n_tilde = reused_payload.n_tilde.clone();
                payload.h1 = reused_payload.h1.clone();
                payload.h2 = reused_payload.h2.clone();
                payload.dln_proof_1 = reused_payload.dln_proof_1.clone();
                payload.dln_proof_2 = reused_payload.dln_proof_2.clone();
                *message = message.clone().with_payload(&payload)?;
            }
        }

        let mut failure = None;
        for message in &to_target {
            if let Err(error) = quorum[0].process_message(&mut rng, message) {
                failure = Some(error);
            }
        }
        let failure = failure.unwrap();
        let protocol_error = failure.protocol_error().unwrap();
        assert_eq!(protocol_error.kind(), ErrorKind::DuplicateAuxiliaries);
        // The collision is attributed to whichever of the two announced the
        // pair later in canonical participant order.
        let expected_culprit = std::cmp::max(reused, forger);
        assert_eq!(protocol_error.culprits(), &[expected_culprit]);
        Ok(())
    }

    #[test]
    fn corrupted_share_attributes_the_culprit() -> Result<()> {
        let mut rng = init_testing();
        let sid = Identifier::random(&mut rng);
        let mut quorum = KeygenParticipant::new_quorum(sid, 3, 1, &mut rng)?;
        let round_one = start_all(&mut quorum, &mut rng)?;
        let round_two = deliver_each(&mut quorum, &round_one, &mut rng)?;

        let target = quorum[0].id();
        let culprit = quorum[1].id();
        let mut to_target: Vec<_> = round_two
            .iter()
            .filter(|message| message.to() == target)
            .cloned()
            .collect();
        // Deliver the corrupted share last so the round completes on it.
        to_target.sort_by_key(|message| {
            message.message_type() == MessageType::Keygen(KeygenMessageType::R2Share)
                && message.from() == culprit
        });
        for message in to_target.iter_mut() {
            if message.from() == culprit
                && message.message_type() == MessageType::Keygen(KeygenMessageType::R2Share)
            {
                let payload = KeygenRound2Share::from_message(message)?;
                let bad_share = vss::Share::new(
                    payload.share.threshold(),
                    payload.share.id().clone(),
                    (payload.share.share() + BigNumber::one()).nmod(&k256_order()),
                );
                *message = message
                    .clone()
                    .with_payload(&KeygenRound2Share { share: bad_share })?;
            }
        }

        let mut failure = None;
        for message in &to_target {
            if let Err(error) = quorum[0].process_message(&mut rng, message) {
                failure = Some(error);
            }
        }
        let failure = failure.unwrap();
        let protocol_error = failure.protocol_error().unwrap();
        assert_eq!(protocol_error.kind(), ErrorKind::VssFailure);
        assert_eq!(protocol_error.culprits(), &[culprit]);
        Ok(())
    }

    #[test]
    fn share_messages_must_be_unicast() -> Result<()> {
        let mut rng = init_testing();
        let sid = Identifier::random(&mut rng);
        let mut quorum = KeygenParticipant::new_quorum(sid, 3, 1, &mut rng)?;
        let round_one = start_all(&mut quorum, &mut rng)?;
        let round_two = deliver_each(&mut quorum, &round_one, &mut rng)?;

        let target = quorum[0].id();
        let share_message = round_two
            .iter()
            .find(|message| {
                message.to() == target
                    && message.message_type() == MessageType::Keygen(KeygenMessageType::R2Share)
            })
            .cloned()
            .unwrap();
        let sender = share_message.from();
        let flipped = share_message.with_flipped_polarity();

        let failure = quorum[0].process_message(&mut rng, &flipped).unwrap_err();
        let protocol_error = failure.protocol_error().unwrap();
        assert_eq!(protocol_error.kind(), ErrorKind::InvalidMessage);
        assert_eq!(protocol_error.culprits(), &[sender]);
        Ok(())
    }

    #[test]
    fn duplicate_messages_are_idempotent() -> Result<()> {
        let mut rng = init_testing();
        let sid = Identifier::random(&mut rng);
        let mut quorum = KeygenParticipant::new_quorum(sid, 3, 1, &mut rng)?;
        let round_one = start_all(&mut quorum, &mut rng)?;

        let target = quorum[0].id();
        let message = round_one
            .iter()
            .find(|message| message.to() == target)
            .cloned()
            .unwrap();

        let first = quorum[0].process_message(&mut rng, &message)?;
        assert!(matches!(first, ProcessOutcome::Incomplete));
        // A replay of the same message is dropped without an error.
        let second = quorum[0].process_message(&mut rng, &message)?;
        assert!(matches!(second, ProcessOutcome::Incomplete));
        Ok(())
    }

    #[test]
    fn keygen_rejects_thresholds_at_or_above_quorum_size() -> Result<()> {
        let mut rng = init_testing();
        let sid = Identifier::random(&mut rng);
        let configs = ParticipantConfig::random_quorum(3, &mut rng)?;
        let input = Input::new(3)?;
        let result = KeygenParticipant::new(
            sid,
            configs[0].id(),
            configs[0].other_ids().to_vec(),
            input,
        );
        assert!(result.is_err());
        Ok(())
    }
}
