// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! A holding pen for messages that arrived before their round.

use crate::messages::{Message, MessageType};
use std::collections::HashMap;

/// Messages stashed for later processing, grouped by type.
///
/// Inbound messages may arrive in any order; a message for a future round is
/// parked here and replayed once the participant reaches that round.
#[derive(Debug, Default)]
pub(crate) struct MessageQueue {
    queue: HashMap<MessageType, Vec<Message>>,
}

impl MessageQueue {
    /// Stash a message.
    pub(crate) fn store(&mut self, message: Message) {
        self.queue
            .entry(message.message_type())
            .or_default()
            .push(message);
    }

    /// Remove and return all stashed messages of the given type, in arrival
    /// order.
    pub(crate) fn retrieve_all(&mut self, message_type: MessageType) -> Vec<Message> {
        self.queue.remove(&message_type).unwrap_or_default()
    }
}
