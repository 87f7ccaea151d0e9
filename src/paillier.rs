// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! The Paillier cryptosystem and the key-correctness proof.
//!
//! Key generation draws two 1024-bit safe primes whose difference is large
//! enough that searching for close prime factors is infeasible. The
//! key-correctness proof convinces a verifier that the prover knows the
//! totient of its modulus (and therefore the factorization), bound to the
//! prover's sharing abscissa and the freshly computed public key so the
//! proof cannot be replayed across protocol runs.

use crate::{
    curve::CurvePoint,
    errors::{CallerError, InternalError, Result},
    hashing::sha512_256i,
    utils::{
        fixed_be_bytes, is_number_in_multiplicative_group, random_bn_in_z_star,
        CancellationToken,
    },
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Bit length of each prime factor of a Paillier modulus.
pub(crate) const PRIME_BITS: usize = 1024;

/// Bit length of a Paillier modulus.
pub(crate) const PAILLIER_MODULUS_BITS: usize = 2 * PRIME_BITS;

/// The two primes must differ in at least one of their top
/// `PRIME_DISTANCE_SLACK_BITS` bits, so `|p - q|` stays close to the width
/// of the primes themselves.
const PRIME_DISTANCE_SLACK_BITS: usize = 3;

/// Number of challenges in the key-correctness proof.
const PROOF_ITERATIONS: usize = 13;

/// Bytes produced by one hash invocation when expanding challenges.
const CHALLENGE_BLOCK_BYTES: usize = 32;

/// A Paillier public (encryption) key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct EncryptionKey {
    n: BigNumber,
}

/// A Paillier ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext(BigNumber);

impl EncryptionKey {
    /// The public modulus `N`.
    pub fn modulus(&self) -> &BigNumber {
        &self.n
    }

    /// Encrypt `plaintext` under this key.
    ///
    /// Returns the ciphertext and the encryption nonce. Plaintexts must lie
    /// in `[0, N)`.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        plaintext: &BigNumber,
    ) -> Result<(Ciphertext, BigNumber)> {
        if plaintext < &BigNumber::zero() || plaintext >= &self.n {
            error!("Paillier plaintext is out of range");
            Err(CallerError::BadInput)?;
        }
        let nn = &self.n * &self.n;
        let nonce = random_bn_in_z_star(rng, &self.n)?;
        // With g = N + 1, g^m = 1 + m*N (mod N^2).
        let g_to_m = (&(plaintext * &self.n) + &BigNumber::one()).nmod(&nn);
        let ciphertext = g_to_m.modmul(&nonce.modpow(&self.n, &nn), &nn);
        Ok((Ciphertext(ciphertext), nonce))
    }
}

/// A Paillier secret (decryption) key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DecryptionKey {
    pk: EncryptionKey,
    /// Carmichael function of the modulus, `lcm(p - 1, q - 1)`.
    lambda: BigNumber,
    /// Precomputed `(L(g^lambda mod N^2))^-1 mod N`.
    mu: BigNumber,
    /// Euler totient of the modulus, `(p - 1)(q - 1)`.
    totient: BigNumber,
}

impl DecryptionKey {
    /// Generate a fresh key pair.
    ///
    /// Prime sieving fans out over `concurrency` worker threads and polls
    /// `token` between candidates. Prime pairs too close together are
    /// discarded and re-sampled.
    pub fn generate(token: &CancellationToken, concurrency: usize) -> Result<Self> {
        loop {
            let safe_primes =
                prime_gen::safe_primes_concurrent(token, PRIME_BITS, 2, concurrency)?;
            let p = safe_primes[0].safe_prime();
            let q = safe_primes[1].safe_prime();
            if !primes_far_enough_apart(p, q) {
                info!("Discarding a Paillier prime pair that is too close together");
                continue;
            }
            return Self::from_primes(p, q);
        }
    }

    /// Assemble a key from two primes.
    ///
    /// The primes are trusted to be prime; this checks the structural
    /// invariants of the resulting key (modulus width and invertibility of
    /// the modulus modulo its own totient).
    pub(crate) fn from_primes(p: &BigNumber, q: &BigNumber) -> Result<Self> {
        let n = p * q;
        if n.bit_length() != PAILLIER_MODULUS_BITS {
            error!(
                "Paillier modulus has {} bits, expected {}",
                n.bit_length(),
                PAILLIER_MODULUS_BITS
            );
            return Err(InternalError::InternalInvariantFailed);
        }
        let p_minus_one = p - 1u32;
        let q_minus_one = q - 1u32;
        let totient = &p_minus_one * &q_minus_one;
        let lambda = &totient / &p_minus_one.gcd(&q_minus_one);

        let nn = &n * &n;
        let g_lambda = (&n + 1).modpow(&lambda, &nn);
        let mu = ell(&g_lambda, &n)
            .and_then(|l| l.invert(&n))
            .ok_or_else(|| {
                error!("Paillier primes produced a degenerate key");
                InternalError::InternalInvariantFailed
            })?;
        // gcd(N, phi(N)) = 1 must hold for the key-correctness proof.
        if n.invert(&totient).is_none() {
            error!("Paillier modulus shares a factor with its totient");
            return Err(InternalError::InternalInvariantFailed);
        }

        Ok(Self {
            pk: EncryptionKey { n },
            lambda,
            mu,
            totient,
        })
    }

    /// The public half of this key.
    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.pk
    }

    /// Decrypt `ciphertext`.
    pub fn decrypt(&self, ciphertext: &Ciphertext) -> Result<BigNumber> {
        let n = &self.pk.n;
        let nn = n * n;
        if ciphertext.0 < BigNumber::one() || ciphertext.0 >= nn {
            error!("Paillier ciphertext is out of range");
            Err(CallerError::BadInput)?;
        }
        let c_lambda = ciphertext.0.modpow(&self.lambda, &nn);
        let plaintext = ell(&c_lambda, n)
            .map(|l| l.modmul(&self.mu, n))
            .ok_or_else(|| {
                error!("Paillier decryption failed");
                InternalError::from(CallerError::BadInput)
            })?;
        Ok(plaintext)
    }

    /// Prove that this key was generated honestly, bound to the prover's
    /// sharing abscissa `share_key` and the public key `public_point`.
    pub(crate) fn prove(
        &self,
        share_key: &BigNumber,
        public_point: &CurvePoint,
    ) -> Result<KeyProof> {
        let n = &self.pk.n;
        // N is invertible mod phi(N); checked at construction.
        let exponent = n.invert(&self.totient).ok_or_else(|| {
            error!("Paillier modulus shares a factor with its totient");
            InternalError::InternalInvariantFailed
        })?;
        let challenges = generate_challenges(n, share_key, public_point)?;
        let responses = challenges
            .iter()
            .map(|challenge| challenge.modpow(&exponent, n))
            .collect();
        Ok(KeyProof { responses })
    }
}

// Neither lambda nor the totient may leak through logs.
impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("pk", &self.pk)
            .field("lambda", &"[redacted]")
            .field("mu", &"[redacted]")
            .field("totient", &"[redacted]")
            .finish()
    }
}

/// The function `L(u) = (u - 1) / N`, defined on `u = 1 (mod N)`.
fn ell(u: &BigNumber, n: &BigNumber) -> Option<BigNumber> {
    let u_minus_one = u - 1;
    if &u_minus_one % n != BigNumber::zero() {
        return None;
    }
    Some(&u_minus_one / n)
}

/// Whether `|p - q|` is wide enough to defeat close-prime factoring.
fn primes_far_enough_apart(p: &BigNumber, q: &BigNumber) -> bool {
    let distance = if p > q { p - q } else { q - p };
    distance.bit_length() >= PRIME_BITS - PRIME_DISTANCE_SLACK_BITS
}

/// A proof of knowledge of a Paillier modulus' factorization, bound to a
/// `(share key, public key)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct KeyProof {
    responses: Vec<BigNumber>,
}

impl KeyProof {
    /// Verify this proof against the prover's modulus and the same binding
    /// it was produced with.
    pub(crate) fn verify(
        &self,
        encryption_key: &EncryptionKey,
        share_key: &BigNumber,
        public_point: &CurvePoint,
    ) -> bool {
        if self.responses.len() != PROOF_ITERATIONS {
            return false;
        }
        let n = &encryption_key.n;
        let challenges = match generate_challenges(n, share_key, public_point) {
            Ok(challenges) => challenges,
            Err(_) => return false,
        };
        challenges
            .iter()
            .zip(&self.responses)
            .all(|(challenge, response)| &response.modpow(n, n) == challenge)
    }
}

/// Derive the proof challenges `x_1, ..., x_13` from the binding context.
///
/// Each candidate is expanded from hash blocks to the width of `N`,
/// truncated to exactly `N`'s bit length, and kept only if it lands in
/// `Z*_N`, so both sides derive the same sequence.
fn generate_challenges(
    n: &BigNumber,
    share_key: &BigNumber,
    public_point: &CurvePoint,
) -> Result<Vec<BigNumber>> {
    let (x, y) = public_point.to_affine_coordinates()?;
    let bits = n.bit_length();
    let blocks = bits.div_ceil(CHALLENGE_BLOCK_BYTES * 8);

    let mut challenges = Vec::with_capacity(PROOF_ITERATIONS);
    let mut candidate_index: usize = 0;
    while challenges.len() < PROOF_ITERATIONS {
        let mut bytes = Vec::with_capacity(blocks * CHALLENGE_BLOCK_BYTES);
        for block in 0..blocks {
            let digest = sha512_256i(&[
                &BigNumber::from(candidate_index),
                &BigNumber::from(block),
                share_key,
                n,
                &x,
                &y,
            ]);
            bytes.extend(fixed_be_bytes(&digest, CHALLENGE_BLOCK_BYTES)?);
        }
        let mut candidate = BigNumber::from_slice(&bytes);
        // Truncate the expansion to exactly the modulus width.
        candidate = candidate / (BigNumber::one() << (blocks * CHALLENGE_BLOCK_BYTES * 8 - bits));
        if is_number_in_multiplicative_group(n, &candidate) {
            challenges.push(candidate);
        }
        candidate_index += 1;
    }
    Ok(challenges)
}

pub(crate) mod prime_gen {
    //! Concurrent sampling of safe primes.

    use super::*;
    use std::sync::Mutex;

    /// A Sophie Germain prime together with its safe prime `2p + 1`.
    #[derive(Debug, Clone)]
    pub(crate) struct SafePrime {
        prime: BigNumber,
        safe_prime: BigNumber,
    }

    impl SafePrime {
        /// The Sophie Germain prime `p`.
        pub(crate) fn prime(&self) -> &BigNumber {
            &self.prime
        }

        /// The safe prime `2p + 1`.
        pub(crate) fn safe_prime(&self) -> &BigNumber {
            &self.safe_prime
        }
    }

    /// Sample `count` safe primes of `bit_len` bits each, sieving on
    /// `concurrency` worker threads.
    ///
    /// Workers poll `token` between candidates; a dead token unwinds the
    /// pool and surfaces as a timeout or cancellation error. Results are
    /// re-checked with probabilistic primality tests before they are
    /// returned.
    pub(crate) fn safe_primes_concurrent(
        token: &CancellationToken,
        bit_len: usize,
        count: usize,
        concurrency: usize,
    ) -> Result<Vec<SafePrime>> {
        let found: Mutex<Vec<SafePrime>> = Mutex::new(Vec::with_capacity(count));
        let workers = concurrency.max(1);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let _handle = scope.spawn(|| loop {
                    if !token.is_live() {
                        break;
                    }
                    {
                        let found = found.lock().expect("prime sink poisoned");
                        if found.len() >= count {
                            break;
                        }
                    }
                    // A Sophie Germain candidate one bit short of the target
                    // makes the safe prime land exactly on `bit_len` bits.
                    let prime = BigNumber::prime(bit_len - 1);
                    let safe_prime = (prime.clone() << 1u32) + BigNumber::one();
                    if safe_prime.is_prime() {
                        let mut found = found.lock().expect("prime sink poisoned");
                        if found.len() < count {
                            found.push(SafePrime { prime, safe_prime });
                        }
                    }
                });
            }
        });

        let found = found.into_inner().expect("prime sink poisoned");
        if found.len() < count {
            error!("Safe prime generation died before finding enough primes");
            return Err(token.death_error());
        }
        // Paranoid re-check of both halves before anything is derived from
        // them.
        for safe_prime in &found {
            if !safe_prime.prime.is_prime() || !safe_prime.safe_prime.is_prime() {
                error!("A generated safe prime failed its primality re-check");
                return Err(InternalError::InternalInvariantFailed);
            }
        }
        Ok(found)
    }

    /// A pool of precomputed 1024-bit safe primes for tests.
    ///
    /// Generating safe primes takes tens of seconds; tests draw from this
    /// pool instead. The corresponding factorizations are public, so these
    /// primes must never leave test code.
    #[cfg(test)]
    pub(crate) const POOL_OF_SAFE_PRIMES: &[&str] = &[
        "c0024ce1b10199e9d59e098b431cc5d78df0426f9570e14ec5f5487f14431d8edc53649e675b292555f489fba35c576991438f6d2b80aabdbec1bba86784cb30c33de8fc92641ff8c271a2ba9753ede9911f8dff4cf63d118747cb81c33cba48b57d3aa2cad2f01c60f3bb1d58f7dc768f4a24f74deec42bd2241dc91323ed9b",
        "fb9fa8102e9f834f632b522fdf808d81bdc882f5b21baafa2599579d0d33e5fb52ae30882b6b679d23b7e125c185c0b632a4735298cccf67f234eb1b0d41928d1b2b5a19da5a18086d27dc477c24eab59084b0035cc0ef590b9c9e934d4913590495723ab3bfa0f221f34c06e01b286d66679779247c32f42cd32e6ace3141bb",
        "ca469601facf3d21651e9ea067601660e9c2dd4527dfb45fd967d01d148e407db0334cd88dbd057e8487a02e97d70b49b4fbb3f9de6f7f451dd17eea3c4dea98f855027a7f63b327d7cad27c1fe3c9f9b6dbd71a3963a6fceb3f16cb278889fffef6eef82591c6bb5463985e2222b79710a5ea1074f382643e008273dc3ac403",
        "defc5e36a50a5297f3ecefb7536a2608f1b4443e3c4b680f9bde83f982c53bdded533b61ac262e92d3926b4a4faee7663f23d9cdedaf2681d77be3cf1a4bff562d5fe4d43b4e96c1abaf441e10c9bc959cb505b76984307943f6a51689eb7fc3e6f7a4cb0049fff2d4b08cf44408b194e2cf09eea33026edbe0801a84f428c0b",
        "de5687c363e4eb65668535691b93fc5c7ae1fe2a6086bd81d8eb5e78464af16ac1bfff319933a401157ad76c4179a15968343bce5d75bdd8841e408447f1c37c1f5e53e4161722eeb94ec64b2097ba04fb12ee053c9d8d13a46428ef727aaa877bdfbc75776b787abb14edb8feb1376eeb883eaff1f790148c9cf2762665278b",
        "eea14ae4bafe9071325aca7499f22494c0d473467b68a98e684d6a92515acdf78876c7d355ceaa5095572f719eff5aa57c59ee4a9f48d0b8c506b38c5e8772f8363ec90dcc10705139c36312a2119138cd92d72f17ebd089a7dfd9b5b0485748e4b2e8ece730e6090a80f840b62e946609b079d07a4c347cfba05d7e6dae8207",
        "e44aba6688a49af68fc6aeb9842908226018e7292f68b70724d75c15718f61c59d67ffdbd9de417ecf37ad345f02a3f8d7c0d1e85fb8064888a18b1fea97341764358f585020c9c6baa3f4aae6d9358bfa0c6bbc3ae01180a14c1089595a004b4c5e2df79c0ef335d77c4cab9fed0656c73c5d059a63fc3a1ae0cbe407438f9f",
        "e9be39cfb42139971fc0ddc548ea1dfd89e3d1953fc96e5796e87f4f99bf3c0701148fc7ee3400a232d76af2f84f85d3cf00abfae331b8d2f479a9b56aae4381a5b35f7d2a504512f96cc3eca8d06a42995052ba41b498b5053cee0f9aa2e9dfa21ecfe24ea48895d3613456d2742b1f90f9db5ac9dbe161c82c8e92b10ac177",
        "e2bcaf2ca54fef6a380a8b04c93198addd4542494c4adee4d6f49bbc77ba5b9f859c1c1766e9ae8690c0ff39fea636ee102402b7dc5d22728ddaa15469cd94792d77ae531122ba6a94ec87e99b58f67099db6444360acfe49a4fa883298758501fb272b90fc71cdc4645029bac4e4c14cb93a64bc846051040c708a2170c2d77",
        "f1e8f169289a4401f368747e9ceb1dcc3f66c7b380493be0824c8a3222f5784647bcd59679ec03c5fdacbd1e6d5c29afb4091f30dc20527d54808888c231c6bd2f85e2e56006460555da467e0a96e1af8d82f33cd420d33236390dffef2a15bcd619facb3ee5d6afd76079a0654ca50dc8095219c0f44293a640d4ed959755c3",
        "f2e16049618321ebd6cca8050c73123494ef2e492ddc42395bcb8f18851cb399d70c480020de417e79d03ce371d6dead8670983fff8a7132e1c8079fb9641db89c02b6c412b66566a5372d4c70268b67ed0a60dfee07b5bdbcf0f559f84bf9e21d506f865e23229fea17352c82911d0927432463b053480125b16615429cbccf",
        "f7d5fff597e1cb879aa55890989dbb2690ee4be7d3a14d439bd6dad80bb2319243866ac70300fcaf7b3b812b7ba1f179a9e9185d3e48358af4ea05693c2e9dec1ff8516462e0583644645bf5995ea3616e87b8b5941cb3e174da2b6983af1b1cbe772f61c478f12cfd326cf7244bd0dc26628d3eb5adc009240373b225b5f6a7",
        "dec721fff254a62de7aa0a84463d7cbe0ff738712f70888fbec3e0bc9a68ae0d80b2be53cd70aa46310856a469bd3bad89f7e543b6d5a178bff10883ae7e02f3de6ee69805182faa647e48222a913d3c84ad3f1e5838eb4aeb42fca25857bc5cc4468803a1bf784c1b5e8064a1d1e4f8de1b8a9edbd1205e642fdba89c2eb1eb",
        "e75a1426257b338bb789acdff07e17e5b2c022a9ec774780ffcdcabf187a88a2636c2dd228d716eb69e96fa84b29941fa3abe74902f6102f59b9af53500eab208849e5a2217adc7b00cf6ccf415b99e4b9e9d30386a6b88182cd67cf1e4d9b302c29d79c0aa014b9d0b0a1767954171001b79ccba5bcdb2afcb2d0204190393b",
        "c9f1689b45b162f38b575b2c25fcb467363847f724f1710359c5d0a79db774b69aac923dd93e0eb10d7ecc86053d8b95964ed3fa6392ccfaaa3e20e340c4fe9679374629c4e878e0d719b49b40be11bfc34c2b4bc7eac25c4819e99f61fc58081e8ea1b3edd454b9671b40babce0465a93901ee1bacab6f2a8a67202cea9d25b",
        "ddaa8f1ae495cbbf47a0a9a5e5a3085851d385e490d5931cc8fb22f1aabaa0d44b6e80963620cc87042cc629aa40b59ecc5dee8d08652a1be43204711c0e6aea1a31ee2c8ac0792f0656210c31fddc1afcbfbdc5bc5606a3fc0d9f725940452316e9f590e600987f485a8d74ef5348487adc2f62aa6b90c4fc48df7c5f54fce7",
        "ffe416191a1b2bbd3b75c7183395e6dbdb2513ca6e7ad430173e33e2d795b424d5a767dae2b897613af06a3131ea8d84b7308fd5cb3cdbefd9dbd3eaa39c6807bb2d6a22aee59ac943e79d3bb37a4871a62b7e36ef9e0b5eb6711e5f6887f4673af354647a81a742f9280880619c8ae40d496fbca59137063acbb7a65bbff1df",
        "d9401c03bf2ce2956386d114873948dfb3374dd1c3139175588e26e113b2a615a82606b9641d3e302e70dc824a1f2d5757d6dd505f0f1356b15d69a55b1bae462af1f5c1c60eec75f634d001cd28ff9602cbffc6c352593d9b086ee500440d2ee96dea3b36209a87bb9302421885d3c5cdc9a4bdd5567fb97101241750d37d0b",
        "f138b305683f76dff8ec44b946c335976b28f59d3e311ceee446e88a95c150be4593ac92fecdbf68d9f32f45d8ca5b8715d2c8a7b6df6c82f7ad53b47d865a6da0a71370b726c5348832ae2a5559ff930a0ca464e1bf2a056b1d7e215c08e7261b187f40b28eca81a94a7f67d97026a16b16d408aa75c8b865863e74c751069f",
        "db4cba5a6887351e133ecd5e91181e80d9ca11a55733ae37d746c9d358e9ed3d70aa2639591cf9dd1682c288cca894329ab3133139b61f859daab03ee3092646144326ed8b4d0af38349952c9ae61465f062c8fbc487a5281f2c9fb1d97198fb439d5d2d1c540f6a9c2e276ccb92ec8a1a5498dcaef5b6a7bf823c99d7c9b173",
        "d4e8bbeb4cf8476efc9c4a7c84bc993fd5087ee319d53e8cb11cd8af47046d08ba414a0f2a6745191564cef4b1ab250f766ef1b6258cb7b7e49047c87676184a92cb2f653d0f6cc078f980667cb3986022cf811490789aeccb2ed5ed611373e0768ad2f409d43c92e9eb36189e8b3b23e2e4d0a2eac766ddb9626782ee4b3fbf",
        "e25ff3e7fddc0b85984e842efdf785e3f98a70f232fde6726a33f82d262d06b80fdbab3560b401d08092aa0c78f405f18cda587bbc87ff14f68c331e3cb24898be1881b329ad5e5083b24cddfc570ad419bdf25a07371c70909476909d92c22c0850b71738dd68570da59746e7772fc5c31998c6800cc02dd9a70533527c965f",
        "d786387639d389f26cab4861765afd37d115500652b8ce7d518659592e66178ed4d03fab48fc8ccb28420bd44cee8fbaf4f0aa9e2b00dea5d0ccbe2511155ce17b83fd999268c5a56f9717de4e0de7c41366396f8fe445e54d84ac78d14621b3b135a40652a4ff2891b236729c921ae980f06fea485c647d767e5c1829110bef",
        "e788ddfe0f0cd42c4d9e96fcb3c5407b352f9c61aa8d200701e650a4d5cab446d67d91a33c238f0d3487903034aed4cbda4270d2eae9f3ab81e79f69dcb198281329e2ab3bfbc5e8d3d1afa0f9d05ecd59c135fa0c9318ca54c0615137044256e023910c4989c5701ef3d30ec34612425567ffb6b3745e95d5492765869ba943",
        "f5cb019e20843f931b0b38b31ef0b1c0721a7c79e740fb2a262a8670c02a41b688a5e7057355a2ae05bca0b885b2e12b72b9304686c4faf8724eb0b73f69a15eb0b71237ceb0938ce20fa754a7092f48271d4f8cff873a5cce69f5b7df0178bd05cb8b925f9c00f6b6a563527f77c8eb4d2e1e1256ff115e484b875b6be13583",
        "e20f38c14312c245bce9c83aa8b81055b9c6cc1626b10a0f6a6d4f13dc94dbbc4b6fe5842cdac9188598ddac5d46a15287eaa53afccc7e423ec86923e2397e1e7b0feb5da5c02561bcd964479772ca7a37b84f5baf7f5b9ec86d859f4a794f33fce7faed3bc6e87f72d8e8dd9be9a1b3d35e0f1853f204d96b119d3bfc61f9ff",
        "eb4535a96a041fe3004114537348db3e0e7c43623732aea8d4266f828d8efdf88d6356800b55d851b859cc68da15197bf447a55ba4f30d52afec81b808dfa1e57c764f60f702a976d0c8cc80972900d07d09f4e4478e6b3089bef57d5eaaec9635e66ae9b67c25b37f25c298855918e5e13e951de8f47aef226c660cb9dd9d9b",
        "e9d4233e2e4f96c4d5a17b3444b23a13f0a4a78525689cb912736ef908b1d78ef9ffc38e84ff356f853b2ad41d7c6a6c912b283d6458eada98de8238a0e4c9ee7cfc1303206ed6761bfdf92e20cee6ab81b0e73ad29bada60f65c72a79e12bb6724de4d489762524a533ad5d42ac6fe05ed491320c78527fe892f8dc7cfe0753",
        "e629cb280cf5291d9b2fa22b60ba049407a4d74eda5f2acfe8464a6664c97585b3f01ebe3cea6ea174fe055960fb274f4afce066e76d5fa57fcde1016852f560a9ff25b4e29a380b50d2576ac96edf0a19dbcf6c348585bbde54232e76970c86bf4f29f52708ce3f75d3c9efeb62eb112fb45afa654991c1076b1816f266ba5f",
        "ed750287f21eaa86a604ed476d2c1c52b1c4e4b0e8d44e8173da5d5d64301e8784c614dc357b2ec64a84bf99374b12f50b0e73907a71d993393f72c486c98af916798c77f59da7f40616eb9e257fd7582df27cdbaab0740569b8dcd76592107477b7401b380dedb1b8d6165e09376a607c83ce7078f7c419ab54dfac0bf42e83",
        "c808eec2553e847088d51e8fb7be7b25b6101589de56025f79349b96b482d3d5b4ee91c8b99a0f391143529d3d726b3ad8a809750f1e55965c00d203555ff8aab3c0f851037531b3bb50d26d65d374a47fff3ec39af4b1318827df59381a79a19d75db30f5d5d6d11863565f797894cedd0011422c4a3719cd73396a1d32096f",
        "ea64be17075c720711a2e365d66d0b3a2b014ca4e51ae34bdaf66ff34e6d2cb84d5cfa161da6d7da1bf6a2e1c46e67be47026182368833e81b60bda78f7222c496c96516df3b5e1a948948f06ef2a3615305484af07ece67c371eeca69537b0aad2bca65249b7515c1780f21baa045e247ebd6587c07f2d68a45575f3b7b9ef3",
        "ffbaed5f3bd142ac042f3f57aaa8a3f9c7b2c22ef9b8262d10a18e617cca99ce9a51823e93b6c1c4daddac9bf70d9e0805858b82fec96f7a1e54c33ea8ef25bb90a74752732c5ddeb5ed6eb8fd9296dad902b9fbabe71ac4ae597a6983ec1d37c41f25bab200ef43a764177dce6bbab3b53544c4e8f9f8d47297a6b4387df6d7",
        "fd771f0cbd5452b6aa305f786b8ff303bb70e68db53a12e6e2955052b47f4c469636eaab95e9d375d45336b1b42643fe2ac0fea2ca2f2f4386861b451635aee39339a881acf06f5178fa15629f9a863a5704f917a53a41ac7eb74c70116b7f5d8adc660eca103d8b7667b9bcc000a8d70f776211430e811b5f99042b35a5c313",
    ];

    /// Draw a pair of distinct safe primes from the test pool.
    #[cfg(test)]
    pub(crate) fn get_safe_prime_pair_from_pool_insecure<R: RngCore + CryptoRng>(
        rng: &mut R,
    ) -> (SafePrime, SafePrime) {
        use rand::Rng;
        let first = rng.gen_range(0..POOL_OF_SAFE_PRIMES.len());
        let second = loop {
            let candidate = rng.gen_range(0..POOL_OF_SAFE_PRIMES.len());
            if candidate != first {
                break candidate;
            }
        };
        (pool_prime(first), pool_prime(second))
    }

    /// Draw a pool pair suitable for a Paillier modulus; re-draws pairs that
    /// fail the prime distance floor.
    #[cfg(test)]
    pub(crate) fn get_paillier_prime_pair_from_pool_insecure<R: RngCore + CryptoRng>(
        rng: &mut R,
    ) -> (SafePrime, SafePrime) {
        loop {
            let (p, q) = get_safe_prime_pair_from_pool_insecure(rng);
            if primes_far_enough_apart(p.safe_prime(), q.safe_prime()) {
                return (p, q);
            }
        }
    }

    #[cfg(test)]
    fn pool_prime(index: usize) -> SafePrime {
        let bytes = hex::decode(POOL_OF_SAFE_PRIMES[index]).expect("pool entries are valid hex");
        let safe_prime = BigNumber::from_slice(bytes);
        let prime = (safe_prime.clone() - BigNumber::one()) / 2;
        SafePrime { prime, safe_prime }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;
    use k256::elliptic_curve::Field;

    pub(crate) fn test_decryption_key<R: RngCore + CryptoRng>(rng: &mut R) -> DecryptionKey {
        let (p, q) = prime_gen::get_paillier_prime_pair_from_pool_insecure(rng);
        DecryptionKey::from_primes(p.safe_prime(), q.safe_prime()).unwrap()
    }

    #[test]
    fn encryption_round_trip() {
        let mut rng = init_testing();
        let dk = test_decryption_key(&mut rng);
        let pk = dk.encryption_key();
        assert_eq!(pk.modulus().bit_length(), PAILLIER_MODULUS_BITS);

        for _ in 0..5 {
            let plaintext = crate::utils::random_positive_bn(&mut rng, pk.modulus());
            let (ciphertext, _nonce) = pk.encrypt(&mut rng, &plaintext).unwrap();
            assert_eq!(dk.decrypt(&ciphertext).unwrap(), plaintext);
        }
    }

    #[test]
    fn encryption_rejects_out_of_range_plaintexts() {
        let mut rng = init_testing();
        let dk = test_decryption_key(&mut rng);
        let pk = dk.encryption_key();
        assert!(pk.encrypt(&mut rng, &(-BigNumber::one())).is_err());
        assert!(pk.encrypt(&mut rng, pk.modulus()).is_err());
    }

    #[test]
    fn key_proof_verifies_with_the_right_binding() {
        let mut rng = init_testing();
        let dk = test_decryption_key(&mut rng);
        let share_key = BigNumber::from(7);
        let public_point =
            CurvePoint::GENERATOR.multiply_by_scalar(&k256::Scalar::random(&mut rng));

        let proof = dk.prove(&share_key, &public_point).unwrap();
        assert!(proof.verify(dk.encryption_key(), &share_key, &public_point));
    }

    #[test]
    fn key_proof_fails_against_a_different_binding() {
        let mut rng = init_testing();
        let dk = test_decryption_key(&mut rng);
        let share_key = BigNumber::from(7);
        let public_point =
            CurvePoint::GENERATOR.multiply_by_scalar(&k256::Scalar::random(&mut rng));
        let proof = dk.prove(&share_key, &public_point).unwrap();

        // Wrong share key.
        assert!(!proof.verify(dk.encryption_key(), &BigNumber::from(8), &public_point));
        // Wrong public key.
        let other_point =
            CurvePoint::GENERATOR.multiply_by_scalar(&k256::Scalar::random(&mut rng));
        assert!(!proof.verify(dk.encryption_key(), &share_key, &other_point));
        // Wrong modulus.
        let other_dk = test_decryption_key(&mut rng);
        assert!(!proof.verify(other_dk.encryption_key(), &share_key, &public_point));
    }

    #[test]
    fn key_proof_fails_for_a_foreign_modulus() {
        let mut rng = init_testing();
        let dk = test_decryption_key(&mut rng);
        let other_dk = test_decryption_key(&mut rng);
        let share_key = BigNumber::from(7);
        let public_point =
            CurvePoint::GENERATOR.multiply_by_scalar(&k256::Scalar::random(&mut rng));

        // A proof produced with the wrong secret key does not verify against
        // the modulus it claims to speak for.
        let forged = other_dk.prove(&share_key, &public_point).unwrap();
        assert!(!forged.verify(dk.encryption_key(), &share_key, &public_point));
    }

    #[test]
    fn pool_pairs_respect_the_distance_floor() {
        let mut rng = init_testing();
        for _ in 0..10 {
            let (p, q) = prime_gen::get_paillier_prime_pair_from_pool_insecure(&mut rng);
            assert_ne!(p.safe_prime(), q.safe_prime());
            assert!(primes_far_enough_apart(p.safe_prime(), q.safe_prime()));
            // The pool halves really are Sophie Germain pairs.
            assert_eq!(
                (p.prime().clone() << 1) + BigNumber::one(),
                p.safe_prime().clone()
            );
        }
    }
}
