// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Traits shared by protocol participants, and the outcome type returned by
//! message processing.

use crate::{
    errors::Result,
    local_storage::{LocalStorage, TypeTag},
    message_queue::MessageQueue,
    messages::{Message, MessageType},
    protocol::{Identifier, ParticipantIdentifier, ProtocolType},
};
use rand::{CryptoRng, RngCore};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{error, warn};

mod storage {
    use super::*;

    pub(super) struct Stash;
    impl TypeTag for Stash {
        type Value = MessageQueue;
    }
    pub(super) struct Progress;
    impl TypeTag for Progress {
        type Value = HashSet<&'static str>;
    }
}

/// The status of a participant's protocol execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// The participant has not yet received its ready signal.
    NotReady,
    /// The participant is running the protocol.
    Initialized,
    /// The participant terminated and produced its output.
    TerminatedSuccessfully,
}

impl Status {
    /// Whether the participant is processing protocol messages.
    pub fn is_ready(&self) -> bool {
        matches!(self, Status::Initialized | Status::TerminatedSuccessfully)
    }
}

/// The outcome of processing a single message.
#[derive(Debug)]
pub enum ProcessOutcome<O> {
    /// The protocol is not yet complete and there is nothing to send.
    Incomplete,
    /// The protocol is not yet complete; the given messages must be
    /// delivered to their recipients.
    Processed(Vec<Message>),
    /// The protocol is complete for this participant and produced an output.
    Terminated(O),
    /// The protocol is complete for this participant, but the given messages
    /// must still be delivered for other participants to complete.
    TerminatedForThisParticipant(O, Vec<Message>),
}

impl<O> ProcessOutcome<O> {
    /// Build an outcome from an optional output and a set of outgoing
    /// messages.
    pub(crate) fn from(output: Option<O>, messages: Vec<Message>) -> Self {
        match (output, messages.is_empty()) {
            (Some(o), true) => Self::Terminated(o),
            (Some(o), false) => Self::TerminatedForThisParticipant(o, messages),
            (None, true) => Self::Incomplete,
            (None, false) => Self::Processed(messages),
        }
    }

    /// Split this outcome into its output and messages.
    pub(crate) fn into_parts(self) -> (Option<O>, Vec<Message>) {
        match self {
            Self::Incomplete => (None, Vec::new()),
            Self::Processed(messages) => (None, messages),
            Self::Terminated(output) => (Some(output), Vec::new()),
            Self::TerminatedForThisParticipant(output, messages) => (Some(output), messages),
        }
    }

    /// Add additional outgoing messages to this outcome.
    pub(crate) fn with_messages(self, messages: Vec<Message>) -> Self {
        let (output, mut all) = self.into_parts();
        all.extend(messages);
        Self::from(output, all)
    }

    /// Merge a set of outcomes into one, prepending the given messages.
    ///
    /// At most one of the outcomes may carry an output; a second output
    /// indicates an internal bookkeeping bug.
    pub(crate) fn collect_with_messages(
        outcomes: Vec<Self>,
        messages: Vec<Message>,
    ) -> Result<Self> {
        let mut output = None;
        let mut all_messages = messages;
        for outcome in outcomes {
            let (o, ms) = outcome.into_parts();
            if o.is_some() {
                if output.is_some() {
                    error!("Got two terminal outcomes while merging outcomes");
                    return Err(crate::errors::InternalError::InternalInvariantFailed);
                }
                output = o;
            }
            all_messages.extend(ms);
        }
        Ok(Self::from(output, all_messages))
    }
}

/// A participant of a multi-round protocol.
///
/// The caller drives the protocol by delivering every [`Message`] addressed
/// to this participant through [`process_message`](Self::process_message),
/// starting with the message returned by
/// [`initialize_message`](Self::initialize_message). Calls must be
/// serialized; the participant itself is single-threaded. Outgoing messages
/// surface through the returned [`ProcessOutcome`]s, and the protocol output
/// surfaces in the terminal outcome.
pub trait ProtocolParticipant {
    /// Input the participant is constructed with.
    type Input;
    /// Output produced when the protocol completes.
    type Output;

    /// Construct a new participant for the session `sid`.
    fn new(
        sid: Identifier,
        id: ParticipantIdentifier,
        other_participant_ids: Vec<ParticipantIdentifier>,
        input: Self::Input,
    ) -> Result<Self>
    where
        Self: Sized;

    /// The message type that signals this participant to start.
    fn ready_type() -> MessageType;

    /// The protocol this participant runs.
    fn protocol_type() -> ProtocolType;

    /// This participant's identifier.
    fn id(&self) -> ParticipantIdentifier;

    /// The other participants of this session.
    fn other_ids(&self) -> &[ParticipantIdentifier];

    /// The session identifier.
    fn sid(&self) -> Identifier;

    /// All participants of this session in canonical (ascending) order.
    fn all_participants(&self) -> Vec<ParticipantIdentifier> {
        let mut all = self.other_ids().to_vec();
        all.push(self.id());
        all.sort();
        all
    }

    /// Process a single message addressed to this participant.
    fn process_message<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<Self::Output>>;

    /// The status of this participant's protocol execution.
    fn status(&self) -> &Status;

    /// The self-addressed message that starts this participant.
    fn initialize_message(&self) -> Result<Message> {
        let empty: [u8; 0] = [];
        Message::p2p(Self::ready_type(), self.sid(), self.id(), self.id(), &empty)
    }
}

/// Internal functionality shared by participant implementations.
pub(crate) trait InnerProtocolParticipant: ProtocolParticipant {
    /// Immutable access to this participant's storage.
    fn local_storage(&self) -> &LocalStorage;

    /// Mutable access to this participant's storage.
    fn local_storage_mut(&mut self) -> &mut LocalStorage;

    /// Mutable access to this participant's status.
    fn status_mut(&mut self) -> &mut Status;

    /// Handle this participant's ready signal.
    ///
    /// Only the self-addressed ready message flips the status; ready
    /// messages from peers are ignored.
    fn process_ready_message(&mut self, message: &Message) -> Result<()> {
        message.check_type(Self::ready_type())?;
        if message.from() != self.id() {
            warn!("Ignoring ready signal from another participant");
            return Ok(());
        }
        *self.status_mut() = Status::Initialized;
        Ok(())
    }

    /// Stash a message that arrived before its round.
    fn stash_message(&mut self, message: &Message) -> Result<()> {
        let id = self.id();
        let mut queue = if self.local_storage().contains::<storage::Stash>(id) {
            self.local_storage_mut().remove::<storage::Stash>(id)?
        } else {
            MessageQueue::default()
        };
        queue.store(message.clone());
        self.local_storage_mut().store::<storage::Stash>(id, queue);
        Ok(())
    }

    /// Retrieve all stashed messages of the given type.
    fn fetch_messages(&mut self, message_type: MessageType) -> Result<Vec<Message>> {
        let id = self.id();
        if !self.local_storage().contains::<storage::Stash>(id) {
            return Ok(Vec::new());
        }
        let mut queue = self.local_storage_mut().remove::<storage::Stash>(id)?;
        let messages = queue.retrieve_all(message_type);
        self.local_storage_mut().store::<storage::Stash>(id, queue);
        Ok(messages)
    }

    /// Produce one copy of a broadcast-round message per other participant,
    /// in ascending recipient order.
    fn message_for_other_participants<T: Serialize>(
        &self,
        message_type: MessageType,
        payload: &T,
    ) -> Result<Vec<Message>> {
        let mut recipients = self.other_ids().to_vec();
        recipients.sort();
        recipients
            .into_iter()
            .map(|other| {
                Message::broadcast(message_type, self.sid(), self.id(), other, payload)
            })
            .collect()
    }

    /// Whether material of type `T` from `sender` is already recorded.
    ///
    /// Duplicate messages are idempotent: the caller logs and drops the
    /// duplicate rather than failing.
    fn check_for_duplicate_msg<T: TypeTag>(&self, sender: ParticipantIdentifier) -> bool {
        self.local_storage().contains::<T>(sender)
    }

    /// Whether the function identified by `func_name` already ran.
    fn read_progress(&self, func_name: &'static str) -> Result<bool> {
        let id = self.id();
        if !self.local_storage().contains::<storage::Progress>(id) {
            return Ok(false);
        }
        Ok(self
            .local_storage()
            .retrieve::<storage::Progress>(id)?
            .contains(func_name))
    }

    /// Record that the function identified by `func_name` ran.
    fn write_progress(&mut self, func_name: &'static str) -> Result<()> {
        let id = self.id();
        if !self.local_storage().contains::<storage::Progress>(id) {
            self.local_storage_mut()
                .store::<storage::Progress>(id, HashSet::new());
        }
        let mut progress = self.local_storage_mut().remove::<storage::Progress>(id)?;
        let _ = progress.insert(func_name);
        self.local_storage_mut()
            .store::<storage::Progress>(id, progress);
        Ok(())
    }
}

/// Run a message-generating method at most once for the lifetime of a
/// participant; subsequent invocations return no messages.
#[macro_export]
macro_rules! run_only_once {
    ($self:ident . $func:ident ( $($arg:expr),* $(,)? )) => {{
        if $self.read_progress(stringify!($func))? {
            Ok(Vec::new())
        } else {
            $self.write_progress(stringify!($func))?;
            $self.$func($($arg),*)
        }
    }};
}
