// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Sampling, arithmetic, and scheduling helpers shared across the crate.

use crate::errors::{CallerError, ErrorKind, InternalError, ProtocolError, Result};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};
use tracing::error;

/// Maximum number of attempts in rejection-sampling loops.
pub(crate) const CRYPTOGRAPHIC_RETRY_MAX: usize = 500usize;

/// Maximum bit length accepted by [`random_bn_by_bitlen`].
pub(crate) const RANDOM_SAMPLING_MAX_BITS: usize = 5000;

/// Sample a number uniformly at random from the range `[0, n)`.
pub(crate) fn random_positive_bn<R: RngCore + CryptoRng>(rng: &mut R, n: &BigNumber) -> BigNumber {
    BigNumber::from_rng(n, rng)
}

/// Sample a number uniformly at random from the range `[0, 2^bits)`.
///
/// `bits` outside `(0, 5000]` is a caller error.
pub(crate) fn random_bn_by_bitlen<R: RngCore + CryptoRng>(
    rng: &mut R,
    bits: usize,
) -> Result<BigNumber> {
    if bits == 0 || bits > RANDOM_SAMPLING_MAX_BITS {
        error!("Requested a random number of {} bits", bits);
        Err(CallerError::BadInput)?;
    }
    let bound = BigNumber::one() << bits;
    Ok(BigNumber::from_rng(&bound, rng))
}

/// Return true iff `v` is an element of the multiplicative group of integers
/// modulo `n`, that is, `1 <= v < n` and `gcd(v, n) = 1`.
pub(crate) fn is_number_in_multiplicative_group(n: &BigNumber, v: &BigNumber) -> bool {
    n > &BigNumber::zero() && v >= &BigNumber::one() && v < n && v.gcd(n) == BigNumber::one()
}

/// Generate a random `BigNumber` that is in the multiplicative group of
/// integers modulo `n`.
///
/// Note: In this application, `n` is typically the product of two primes. If
/// the drawn element is not coprime with `n` and is not `0 mod n`, then the
/// caller has accidentally stumbled upon the factorization of `n`!
/// This is a security issue when `n` is someone else's modulus, but the
/// chance of this happening is basically 0 and we drop the element anyway.
pub(crate) fn random_bn_in_z_star<R: RngCore + CryptoRng>(
    rng: &mut R,
    n: &BigNumber,
) -> Result<BigNumber> {
    std::iter::repeat_with(|| BigNumber::from_rng(n, rng))
        .take(CRYPTOGRAPHIC_RETRY_MAX)
        .find(|candidate| is_number_in_multiplicative_group(n, candidate))
        .ok_or(InternalError::CallingApplicationMistake(
            CallerError::RetryFailed,
        ))
}

/// Encode `x` as exactly `len` big-endian bytes, left-padded with zeros.
///
/// Fails if `x` is negative or does not fit in `len` bytes.
pub(crate) fn fixed_be_bytes(x: &BigNumber, len: usize) -> Result<Vec<u8>> {
    if x < &BigNumber::zero() {
        error!("Tried to encode a negative number as unsigned bytes");
        return Err(InternalError::InternalInvariantFailed);
    }
    let bytes = x.to_bytes();
    if bytes.len() > len {
        error!(
            "Value of {} bytes does not fit into {} bytes",
            bytes.len(),
            len
        );
        return Err(InternalError::InternalInvariantFailed);
    }
    let mut padded = vec![0u8; len - bytes.len()];
    padded.extend_from_slice(&bytes);
    Ok(padded)
}

/// A cooperative cancellation signal with an optional deadline.
///
/// Long-running generation tasks poll the token between attempts and unwind
/// when it goes dead. The token distinguishes an explicit [`cancel`]
/// (surfaced as [`ErrorKind::Cancelled`]) from deadline expiry (surfaced as
/// [`ErrorKind::Timeout`]).
///
/// [`cancel`]: CancellationToken::cancel
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// A token that only dies by explicit cancellation.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// A token that additionally dies once `timeout` elapses.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Signal every task polling this token to unwind.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether the token was explicitly cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Whether tasks polling this token should keep running.
    pub(crate) fn is_live(&self) -> bool {
        if self.is_cancelled() {
            return false;
        }
        match self.deadline {
            Some(deadline) => Instant::now() < deadline,
            None => true,
        }
    }

    /// The protocol failure corresponding to this token going dead.
    pub(crate) fn death_error(&self) -> InternalError {
        let kind = if self.is_cancelled() {
            ErrorKind::Cancelled
        } else {
            ErrorKind::Timeout
        };
        ProtocolError::new(kind).into()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Run every task on a bounded pool of `concurrency` worker threads and
/// return the results in task order.
///
/// The per-peer verification fan-outs use this; each task returns its own
/// verdict so the caller can attribute failures to specific peers.
pub(crate) fn run_parallel<T, F>(concurrency: usize, tasks: Vec<F>) -> Vec<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    let task_count = tasks.len();
    if task_count == 0 {
        return Vec::new();
    }
    let workers = concurrency.clamp(1, task_count);
    // Reversed so that workers pop tasks in submission order.
    let queue: Mutex<Vec<(usize, F)>> = Mutex::new(tasks.into_iter().enumerate().rev().collect());
    let results: Vec<Mutex<Option<T>>> = (0..task_count).map(|_| Mutex::new(None)).collect();

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let _handle = scope.spawn(|| loop {
                let next = queue.lock().expect("task queue poisoned").pop();
                match next {
                    Some((index, task)) => {
                        *results[index].lock().expect("result slot poisoned") = Some(task());
                    }
                    None => break,
                }
            });
        }
    });

    results
        .into_iter()
        .map(|slot| {
            slot.into_inner()
                .expect("result slot poisoned")
                .expect("every task ran to completion")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn inverse_table_mod_fifteen() {
        let n = BigNumber::from(15);
        let table = [(2, 8), (4, 4), (7, 13), (8, 2), (11, 11), (13, 7), (14, 14)];
        for (v, inverse) in table {
            let v = BigNumber::from(v);
            assert_eq!(v.invert(&n).unwrap(), BigNumber::from(inverse));
        }
        // 3, 5, 6 share a factor with 15 and have no inverse.
        for v in [3, 5, 6] {
            assert!(BigNumber::from(v).invert(&n).is_none());
        }
    }

    #[test]
    fn multiplicative_group_mod_fifteen() {
        let n = BigNumber::from(15);
        let members = [1usize, 2, 4, 7, 8, 11, 13, 14];
        for v in 0usize..15 {
            assert_eq!(
                is_number_in_multiplicative_group(&n, &BigNumber::from(v)),
                members.contains(&v)
            );
        }
        assert!(!is_number_in_multiplicative_group(&n, &BigNumber::from(15)));
    }

    #[test]
    fn bitlen_sampler_rejects_out_of_range_requests() {
        let mut rng = init_testing();
        assert!(random_bn_by_bitlen(&mut rng, 0).is_err());
        assert!(random_bn_by_bitlen(&mut rng, RANDOM_SAMPLING_MAX_BITS + 1).is_err());
        let sampled = random_bn_by_bitlen(&mut rng, 256).unwrap();
        assert!(sampled.bit_length() <= 256);
    }

    #[test]
    fn sampled_values_are_long_enough() {
        let mut rng = init_testing();
        // Statistical test: sampling many 800-bit values should produce at
        // least one close to the full width.
        let mut max_len = 0;
        for _ in 0..100 {
            let bn = random_bn_by_bitlen(&mut rng, 800).unwrap();
            max_len = max_len.max(bn.to_bytes().len());
        }
        assert!(max_len > 98);
    }

    #[test]
    fn z_star_samples_are_coprime() {
        let mut rng = init_testing();
        let n = BigNumber::from(3u64 * 5 * 7);
        for _ in 0..50 {
            let v = random_bn_in_z_star(&mut rng, &n).unwrap();
            assert!(is_number_in_multiplicative_group(&n, &v));
        }
    }

    #[test]
    fn fixed_be_bytes_pads_on_the_left() {
        let x = BigNumber::from(0x0102);
        let bytes = fixed_be_bytes(&x, 4).unwrap();
        assert_eq!(bytes, vec![0, 0, 1, 2]);
        assert!(fixed_be_bytes(&x, 1).is_err());
        assert!(fixed_be_bytes(&(-BigNumber::one()), 4).is_err());
    }

    #[test]
    fn parallel_runner_preserves_task_order() {
        let tasks: Vec<_> = (0..37usize).map(|i| move || i * i).collect();
        let results = run_parallel(4, tasks);
        assert_eq!(results, (0..37usize).map(|i| i * i).collect::<Vec<_>>());
    }

    #[test]
    fn cancellation_token_reports_its_death() {
        let token = CancellationToken::with_timeout(Duration::from_secs(3600));
        assert!(token.is_live());
        token.cancel();
        assert!(!token.is_live());
        assert_eq!(
            token.death_error().protocol_error().unwrap().kind(),
            ErrorKind::Cancelled
        );

        let expired = CancellationToken::with_timeout(Duration::from_secs(0));
        assert!(!expired.is_live());
        assert_eq!(
            expired.death_error().protocol_error().unwrap().kind(),
            ErrorKind::Timeout
        );
    }
}

////////////////////////////
// Test Utility Functions //
////////////////////////////

#[cfg(test)]
pub(crate) mod testing {
    use crate::enable_zeroize;
    use rand::{
        rngs::{OsRng, StdRng},
        Rng, SeedableRng,
    };
    use tracing_subscriber::{
        filter::Targets, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    };

    /// Initialize any fields necessary for our tests. This should be called at
    /// the top of all our tests. This function is idempotent.
    ///
    /// This will print the rng seed to stderr so that if a test fails, the
    /// failing seed can be recovered and used for debugging.
    pub(crate) fn init_testing() -> StdRng {
        enable_zeroize();
        let mut seeder = OsRng;
        let seed = seeder.gen();
        eprintln!(
            "To re-run test with the same randomness, use init_testing_with_seed() with the following seed:"
        );
        eprintln!("\t{seed:?}");
        StdRng::from_seed(seed)
    }

    /// A seeded version of [`init_testing`]. This function can be used when a
    /// test fails unexpectedly, and you want to reproduce the run using a
    /// specific RNG seed.
    ///
    /// **Additionally, turns on logging by default.**
    ///
    /// This function should only be called when debugging; leaving it in a
    /// checked-in test turns logging on for every test in the binary.
    #[allow(unused)]
    pub(crate) fn init_testing_with_seed(seed: [u8; 32]) -> StdRng {
        let logging_level = EnvFilter::from_default_env()
            .max_level_hint()
            .unwrap()
            .into_level()
            .unwrap();

        // Only capture logging events from this crate.
        let targets = Targets::new().with_target("gg18_keygen", logging_level);
        let stdout_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_filter(targets);

        // It's okay if this fails. It just means logging has already been set
        // up for this thread.
        let _ = tracing_subscriber::registry().with(stdout_layer).try_init();

        enable_zeroize();
        StdRng::from_seed(seed)
    }
}
