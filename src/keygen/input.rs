// Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

use crate::{
    errors::{CallerError, Result},
    keygen::preparams::{default_concurrency, PreParams},
};
use std::time::Duration;
use tracing::error;

/// Default deadline for in-round pre-parameter generation.
const DEFAULT_PRE_PARAM_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Input needed for a [`KeygenParticipant`](crate::keygen::KeygenParticipant)
/// to run.
#[derive(Debug, Clone)]
pub struct Input {
    /// How many parties the resulting sharing can tolerate losing; any
    /// `threshold + 1` parties can later reconstruct.
    threshold: usize,
    /// Cached pre-parameters, if the host generated them out-of-band.
    pre_params: Option<PreParams>,
    /// Deadline for in-round pre-parameter generation.
    pre_param_timeout: Duration,
    /// Worker count for prime sieving.
    concurrency: usize,
}

impl Input {
    /// Create an input with the given reconstruction threshold.
    ///
    /// The threshold must be at least 1 and smaller than the number of
    /// participants; the latter is checked at participant construction,
    /// when the participant set is known.
    pub fn new(threshold: usize) -> Result<Self> {
        if threshold < 1 {
            error!("Keygen threshold must be at least 1");
            Err(CallerError::BadInput)?;
        }
        Ok(Self {
            threshold,
            pre_params: None,
            pre_param_timeout: DEFAULT_PRE_PARAM_TIMEOUT,
            concurrency: default_concurrency(),
        })
    }

    /// Supply cached pre-parameters instead of generating them in round
    /// one. The cached set is re-validated; a set that fails validation is
    /// rejected.
    pub fn with_pre_params(mut self, pre_params: PreParams) -> Result<Self> {
        if !pre_params.validate() {
            error!("Supplied pre-parameters failed validation");
            Err(CallerError::BadInput)?;
        }
        self.pre_params = Some(pre_params);
        Ok(self)
    }

    /// Override the deadline for in-round pre-parameter generation.
    pub fn with_pre_param_timeout(mut self, timeout: Duration) -> Self {
        self.pre_param_timeout = timeout;
        self
    }

    /// Override the worker count for prime sieving.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The reconstruction threshold.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub(crate) fn take_pre_params(&mut self) -> Option<PreParams> {
        self.pre_params.take()
    }

    pub(crate) fn pre_param_timeout(&self) -> Duration {
        self.pre_param_timeout
    }

    pub(crate) fn concurrency(&self) -> usize {
        self.concurrency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_thresholds_are_rejected() {
        assert!(Input::new(0).is_err());
        assert!(Input::new(1).is_ok());
    }
}
