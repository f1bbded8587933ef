//! Cryptographic primitives.
//!
//! BLS12-381 signatures with hash-to-scalar message mapping:
//! signatures live in G1 (48 bytes compressed), public keys in G2
//! (96 bytes compressed). Same-message signatures aggregate by point
//! addition, and an aggregate verifies against the sum of the signer
//! public keys with a single pairing check.
//!
//! Ed25519 is used for the message envelope that binds a sender to a
//! gossiped consensus payload. Ristretto scalars encode blind-bid X values.

use bls12_381::{pairing, G1Affine, G1Projective, G2Affine, G2Projective, Scalar};
use curve25519_dalek::scalar::Scalar as RistrettoScalar;
use ed25519_dalek::{Signer, Verifier};
use thiserror::Error;

/// Compressed G2 public key size.
pub const BLS_PUBLIC_KEY_SIZE: usize = 96;
/// Compressed G1 signature size.
pub const BLS_SIGNATURE_SIZE: usize = 48;
/// Ed25519 public key size.
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;
/// Ed25519 signature size.
pub const ED25519_SIGNATURE_SIZE: usize = 64;
/// Block seed size (a BLS signature over the previous seed).
pub const SEED_SIZE: usize = 48;

const BLS_SIGN_DST: &[u8] = b"sba-bls12381g1-blake3-sign";
const BLS_KEYGEN_DST: &[u8] = b"sba-bls12381-keygen";
const BID_X_DST: &[u8] = b"sba-ristretto-bid-x";

/// Errors from key parsing and signature verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("Invalid curve point encoding")]
    InvalidPoint,
    #[error("Signature verification failed")]
    VerificationFailed,
}

/// Map a message to a BLS scalar via a 64-byte blake3 XOF read and wide
/// reduction. Domain-separated by `dst`.
pub fn hash_to_scalar(msg: &[u8], dst: &[u8]) -> Scalar {
    let mut hasher = blake3::Hasher::new();
    hasher.update(dst);
    hasher.update(msg);
    let mut wide = [0u8; 64];
    hasher.finalize_xof().fill(&mut wide);
    Scalar::from_bytes_wide(&wide)
}

fn message_point(msg: &[u8]) -> G1Projective {
    G1Projective::generator() * hash_to_scalar(msg, BLS_SIGN_DST)
}

// ═══════════════════════════════════════════════════════════════════════════
// BLS
// ═══════════════════════════════════════════════════════════════════════════

/// A BLS public key in G2, ordered and hashed by its compressed encoding so
/// that every node derives identical provisioner and committee orderings.
#[derive(Clone, Copy)]
pub struct BlsPublicKey {
    point: G2Affine,
    bytes: [u8; BLS_PUBLIC_KEY_SIZE],
}

impl BlsPublicKey {
    pub fn to_bytes(&self) -> [u8; BLS_PUBLIC_KEY_SIZE] {
        self.bytes
    }

    pub fn as_bytes(&self) -> &[u8; BLS_PUBLIC_KEY_SIZE] {
        &self.bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; BLS_PUBLIC_KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: BLS_PUBLIC_KEY_SIZE,
                got: bytes.len(),
            })?;
        let point = Option::<G2Affine>::from(G2Affine::from_compressed(&arr))
            .ok_or(CryptoError::InvalidPoint)?;
        Ok(Self { point, bytes: arr })
    }

    /// Verify a single signature over `msg`.
    pub fn verify(&self, msg: &[u8], sig: &BlsSignature) -> Result<(), CryptoError> {
        let lhs = pairing(&sig.0, &G2Affine::generator());
        let rhs = pairing(&G1Affine::from(message_point(msg)), &self.point);
        if lhs == rhs {
            Ok(())
        } else {
            Err(CryptoError::VerificationFailed)
        }
    }
}

impl PartialEq for BlsPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for BlsPublicKey {}

impl PartialOrd for BlsPublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BlsPublicKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.bytes.cmp(&other.bytes)
    }
}

impl std::hash::Hash for BlsPublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl std::fmt::Debug for BlsPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bls:{}", &hex::encode(&self.bytes[..8]))
    }
}

/// A BLS signature in G1. The identity point encodes the empty aggregate.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BlsSignature(G1Affine);

impl BlsSignature {
    /// The empty aggregate (the G1 identity).
    pub fn identity() -> Self {
        Self(G1Affine::identity())
    }

    pub fn is_identity(&self) -> bool {
        bool::from(self.0.is_identity())
    }

    pub fn to_bytes(&self) -> [u8; BLS_SIGNATURE_SIZE] {
        self.0.to_compressed()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; BLS_SIGNATURE_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: BLS_SIGNATURE_SIZE,
                got: bytes.len(),
            })?;
        let point = Option::<G1Affine>::from(G1Affine::from_compressed(&arr))
            .ok_or(CryptoError::InvalidPoint)?;
        Ok(Self(point))
    }

    /// Combine with another signature over the same message.
    pub fn combine(&self, other: &BlsSignature) -> BlsSignature {
        BlsSignature(G1Affine::from(G1Projective::from(self.0) + other.0))
    }
}

impl std::fmt::Debug for BlsSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sig:{}", &hex::encode(&self.to_bytes()[..8]))
    }
}

/// A BLS keypair.
#[derive(Clone)]
pub struct BlsKeyPair {
    secret: Scalar,
    public: BlsPublicKey,
}

impl BlsKeyPair {
    /// Derive a keypair deterministically from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let secret = hash_to_scalar(seed, BLS_KEYGEN_DST);
        let point = G2Affine::from(G2Projective::generator() * secret);
        Self {
            secret,
            public: BlsPublicKey {
                point,
                bytes: point.to_compressed(),
            },
        }
    }

    /// Generate a keypair from an RNG.
    pub fn generate<R: rand::RngCore>(rng: &mut R) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    pub fn public_key(&self) -> BlsPublicKey {
        self.public
    }

    pub fn sign(&self, msg: &[u8]) -> BlsSignature {
        BlsSignature(G1Affine::from(message_point(msg) * self.secret))
    }
}

impl std::fmt::Debug for BlsKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlsKeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Verify an aggregate signature over a single message against the set of
/// signer public keys: `e(agg, g2) == e(H(m), sum(pks))`.
pub fn aggregate_verify(
    keys: &[BlsPublicKey],
    msg: &[u8],
    sig: &BlsSignature,
) -> Result<(), CryptoError> {
    if keys.is_empty() {
        return Err(CryptoError::VerificationFailed);
    }
    let sum = keys
        .iter()
        .fold(G2Projective::identity(), |acc, pk| acc + pk.point);
    let lhs = pairing(&sig.0, &G2Affine::generator());
    let rhs = pairing(&G1Affine::from(message_point(msg)), &G2Affine::from(sum));
    if lhs == rhs {
        Ok(())
    } else {
        Err(CryptoError::VerificationFailed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Seed
// ═══════════════════════════════════════════════════════════════════════════

/// A block seed: the generator's BLS signature over the previous block's
/// seed, stored as raw bytes so genesis and recovery blocks can carry an
/// all-zero seed that is not a valid curve point.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Seed([u8; SEED_SIZE]);

impl Seed {
    pub const fn zero() -> Self {
        Self([0u8; SEED_SIZE])
    }

    pub const fn from_bytes(bytes: [u8; SEED_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_signature(sig: &BlsSignature) -> Self {
        Self(sig.to_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; SEED_SIZE] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; SEED_SIZE]
    }

    /// Reinterpret as a BLS signature for verification.
    pub fn as_signature(&self) -> Result<BlsSignature, CryptoError> {
        BlsSignature::from_bytes(&self.0)
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "seed:{}", &hex::encode(&self.0[..8]))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Ed25519 envelope keys
// ═══════════════════════════════════════════════════════════════════════════

/// Ed25519 public key used for message envelopes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdPublicKey([u8; ED25519_PUBLIC_KEY_SIZE]);

impl EdPublicKey {
    pub fn to_bytes(&self) -> [u8; ED25519_PUBLIC_KEY_SIZE] {
        self.0
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; ED25519_PUBLIC_KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: ED25519_PUBLIC_KEY_SIZE,
                got: bytes.len(),
            })?;
        // Reject encodings that do not decompress to a valid point.
        ed25519_dalek::VerifyingKey::from_bytes(&arr).map_err(|_| CryptoError::InvalidPoint)?;
        Ok(Self(arr))
    }

    pub fn verify(&self, msg: &[u8], sig: &EdSignature) -> Result<(), CryptoError> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|_| CryptoError::InvalidPoint)?;
        let signature = ed25519_dalek::Signature::from_bytes(&sig.0);
        key.verify(msg, &signature)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl std::fmt::Debug for EdPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ed:{}", &hex::encode(&self.0[..8]))
    }
}

/// Ed25519 signature bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EdSignature([u8; ED25519_SIGNATURE_SIZE]);

impl EdSignature {
    pub fn to_bytes(&self) -> [u8; ED25519_SIGNATURE_SIZE] {
        self.0
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; ED25519_SIGNATURE_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: ED25519_SIGNATURE_SIZE,
                got: bytes.len(),
            })?;
        Ok(Self(arr))
    }
}

impl std::fmt::Debug for EdSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "edsig:{}", &hex::encode(&self.0[..8]))
    }
}

/// Ed25519 keypair for envelope signing.
#[derive(Clone)]
pub struct EdKeyPair {
    signing: ed25519_dalek::SigningKey,
}

impl EdKeyPair {
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    pub fn generate<R: rand::RngCore>(rng: &mut R) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    pub fn public_key(&self) -> EdPublicKey {
        EdPublicKey(self.signing.verifying_key().to_bytes())
    }

    pub fn sign(&self, msg: &[u8]) -> EdSignature {
        EdSignature(self.signing.sign(msg).to_bytes())
    }
}

impl std::fmt::Debug for EdKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdKeyPair")
            .field("public", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// The full signing identity of a node: a BLS consensus key and an Ed25519
/// envelope key derived from the same seed.
#[derive(Clone, Debug)]
pub struct NodeKeys {
    pub bls: BlsKeyPair,
    pub ed: EdKeyPair,
}

impl NodeKeys {
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let mut ed_seed = *blake3::hash(seed).as_bytes();
        ed_seed[0] ^= 0x5a;
        Self {
            bls: BlsKeyPair::from_seed(seed),
            ed: EdKeyPair::from_seed(&ed_seed),
        }
    }

    pub fn generate<R: rand::RngCore>(rng: &mut R) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Blind-bid X values
// ═══════════════════════════════════════════════════════════════════════════

/// Derive the bid X value from the bid amount scalar `d` and the commitment
/// `M`: a wide reduction of a domain-separated blake3 XOF read into a
/// ristretto scalar, returned in its canonical 32-byte encoding.
pub fn calculate_x(d: &[u8; 32], m: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(BID_X_DST);
    hasher.update(d);
    hasher.update(m);
    let mut wide = [0u8; 64];
    hasher.finalize_xof().fill(&mut wide);
    RistrettoScalar::from_bytes_mod_order_wide(&wide).to_bytes()
}
