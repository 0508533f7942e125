//! Key selection over OpenPGP key material.
//!
//! Key material (armored or binary, possibly holding several transferable
//! keys) is scanned sequentially; a [`KeyFilter`] decides which key to take.
//! Scanning is first-match-wins, and for secret keys the passphrase is
//! checked only against the matched key, so keys the filter rejects are never
//! unlocked.

use std::io::Cursor;
use std::io::Read;

use pgp::composed::Deserializable;
use pgp::composed::SignedPublicKey;
use pgp::composed::SignedSecretKey;
use pgp::crypto::hash::HashAlgorithm;
use pgp::crypto::public_key::PublicKeyAlgorithm;
use pgp::packet::PublicKey;
use pgp::packet::PublicSubkey;
use pgp::packet::SecretKey;
use pgp::packet::SecretSubkey;
use pgp::types::Fingerprint;
use pgp::types::KeyDetails as _;
use pgp::types::KeyId;
use pgp::types::Password;
use pgp::types::PublicKeyTrait as _;
use pgp::types::SecretKeyTrait as _;
use pgp::types::SignatureBytes;
use sha2::Digest;
use sha2::Sha256;

use crate::error::SigningError;

/// Fixed input for the one-shot unlock probe on a matched secret key.
const UNLOCK_PROBE: &[u8] = b"pgp-signing unlock probe";

/// One candidate key seen while scanning a key-material stream.
///
/// Each transferable key contributes its primary key and each subkey as
/// separate candidates; subkeys inherit the certificate's user IDs.
#[derive(Debug, Clone)]
pub struct KeyRecord {
    /// 64-bit OpenPGP key ID.
    pub key_id: KeyId,
    /// User-ID strings carried by the certificate.
    pub user_ids: Vec<String>,
    /// Whether the key's algorithm can produce signatures.
    pub signing_capable: bool,
    /// Public-key algorithm of this candidate.
    pub algorithm: PublicKeyAlgorithm,
}

impl KeyRecord {
    fn new(key_id: KeyId, user_ids: Vec<String>, algorithm: PublicKeyAlgorithm) -> Self {
        KeyRecord {
            key_id,
            user_ids,
            signing_capable: algorithm_can_sign(algorithm),
            algorithm,
        }
    }

    /// Key ID as lowercase hex, the form used in logs and reports.
    pub fn key_id_hex(&self) -> String {
        hex::encode(&self.key_id)
    }
}

/// Predicate selecting one key from a key-material stream.
#[derive(Debug, Clone)]
pub enum KeyFilter {
    /// Match the exact 64-bit key ID.
    ByKeyId(KeyId),
    /// Match a signing-capable key whose certificate carries this user ID.
    ByUserId(String),
}

impl KeyFilter {
    /// Pure accept test, invoked once per candidate while scanning.
    pub fn accept(&self, record: &KeyRecord) -> bool {
        match self {
            KeyFilter::ByKeyId(key_id) => record.key_id == *key_id,
            KeyFilter::ByUserId(user_id) => {
                record.signing_capable && record.user_ids.iter().any(|id| id == user_id)
            }
        }
    }
}

/// Secret key packet behind a candidate; primary keys and subkeys are
/// distinct packet types with the same signing trait.
#[derive(Debug)]
pub(crate) enum SecretKeyMaterial {
    Primary(SecretKey),
    Subkey(SecretSubkey),
}

impl SecretKeyMaterial {
    pub(crate) fn create_signature(
        &self,
        password: &Password,
        hash: HashAlgorithm,
        data: &[u8],
    ) -> pgp::errors::Result<SignatureBytes> {
        match self {
            SecretKeyMaterial::Primary(key) => key.create_signature(password, hash, data),
            SecretKeyMaterial::Subkey(key) => key.create_signature(password, hash, data),
        }
    }

    pub(crate) fn key_id(&self) -> KeyId {
        match self {
            SecretKeyMaterial::Primary(key) => key.key_id(),
            SecretKeyMaterial::Subkey(key) => key.key_id(),
        }
    }

    pub(crate) fn fingerprint(&self) -> Fingerprint {
        match self {
            SecretKeyMaterial::Primary(key) => key.fingerprint(),
            SecretKeyMaterial::Subkey(key) => key.fingerprint(),
        }
    }

    pub(crate) fn algorithm(&self) -> PublicKeyAlgorithm {
        match self {
            SecretKeyMaterial::Primary(key) => key.algorithm(),
            SecretKeyMaterial::Subkey(key) => key.algorithm(),
        }
    }
}

/// Public key packet behind a candidate, primary or subkey.
#[derive(Clone)]
pub(crate) enum PublicKeyMaterial {
    Primary(PublicKey),
    Subkey(PublicSubkey),
}

impl PublicKeyMaterial {
    pub(crate) fn verify_signature(
        &self,
        hash: HashAlgorithm,
        data: &[u8],
        signature: &SignatureBytes,
    ) -> pgp::errors::Result<()> {
        match self {
            PublicKeyMaterial::Primary(key) => key.verify_signature(hash, data, signature),
            PublicKeyMaterial::Subkey(key) => key.verify_signature(hash, data, signature),
        }
    }
}

/// A secret key selected by [`resolve_secret_key`], with its passphrase
/// already validated.
#[derive(Debug)]
pub struct ResolvedSecretKey {
    /// Record of the matched candidate.
    pub record: KeyRecord,
    pub(crate) key: SecretKeyMaterial,
    pub(crate) password: Password,
}

/// A public key selected by [`resolve_public_key`].
pub struct ResolvedPublicKey {
    /// Record of the matched candidate.
    pub record: KeyRecord,
    pub(crate) key: PublicKeyMaterial,
}

/// Scan secret-key material and return the first key accepted by `filter`.
///
/// The passphrase is validated only for the matched key, by asking it to sign
/// a fixed probe once. A wrong passphrase is [`SigningError::DecryptionFailed`];
/// candidates that are not signing-capable skip the probe so the capability
/// failure surfaces at bind time instead.
pub fn resolve_secret_key<R: Read>(
    mut source: R,
    passphrase: &str,
    filter: &KeyFilter,
) -> Result<ResolvedSecretKey, SigningError> {
    let mut data = Vec::new();
    source.read_to_end(&mut data)?;

    let mut scanned = 0usize;
    for parsed in composed_keys::<SignedSecretKey>(&data)? {
        let key = parsed.map_err(SigningError::MalformedKeyMaterial)?;
        for (record, secret) in secret_candidates(&key) {
            scanned += 1;
            if !filter.accept(&record) {
                continue;
            }
            log::debug!(
                "secret key {} matched after {} candidate(s)",
                record.key_id_hex(),
                scanned
            );
            let password = Password::from(passphrase.to_string());
            if record.signing_capable {
                let probe = Sha256::digest(UNLOCK_PROBE);
                secret
                    .create_signature(&password, HashAlgorithm::Sha256, probe.as_slice())
                    .map_err(|source| SigningError::DecryptionFailed {
                        key_id: record.key_id_hex(),
                        source,
                    })?;
            }
            return Ok(ResolvedSecretKey {
                record,
                key: secret,
                password,
            });
        }
    }
    Err(SigningError::KeyNotFound)
}

/// Scan public-key material and return the first key accepted by `filter`.
pub fn resolve_public_key<R: Read>(
    mut source: R,
    filter: &KeyFilter,
) -> Result<ResolvedPublicKey, SigningError> {
    let mut data = Vec::new();
    source.read_to_end(&mut data)?;

    for parsed in composed_keys::<SignedPublicKey>(&data)? {
        let key = parsed.map_err(SigningError::MalformedKeyMaterial)?;
        for (record, public) in public_candidates(&key) {
            if filter.accept(&record) {
                log::debug!("public key {} matched", record.key_id_hex());
                return Ok(ResolvedPublicKey {
                    record,
                    key: public,
                });
            }
        }
    }
    Err(SigningError::KeyNotFound)
}

/// Decode a key-material buffer as a sequence of composed keys.
///
/// Armored input may carry any number of keys; binary input is taken as a
/// single transferable key.
fn composed_keys<'a, T>(
    data: &'a [u8],
) -> Result<Box<dyn Iterator<Item = pgp::errors::Result<T>> + 'a>, SigningError>
where
    T: Deserializable + 'a,
{
    if is_armored(data) {
        let (keys, _headers) =
            T::from_armor_many(Cursor::new(data)).map_err(SigningError::MalformedKeyMaterial)?;
        Ok(keys)
    } else {
        let key = T::from_bytes(Cursor::new(data)).map_err(SigningError::MalformedKeyMaterial)?;
        Ok(Box::new(std::iter::once(Ok(key))))
    }
}

pub(crate) fn is_armored(data: &[u8]) -> bool {
    data.iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|start| data[start..].starts_with(b"-----BEGIN PGP"))
        .unwrap_or(false)
}

fn secret_candidates(key: &SignedSecretKey) -> Vec<(KeyRecord, SecretKeyMaterial)> {
    let user_ids: Vec<String> = key
        .details
        .users
        .iter()
        .map(|user| String::from_utf8_lossy(user.id.id()).into_owned())
        .collect();
    let primary = &key.primary_key;
    let mut candidates = Vec::with_capacity(1 + key.secret_subkeys.len());
    candidates.push((
        KeyRecord::new(primary.key_id(), user_ids.clone(), primary.algorithm()),
        SecretKeyMaterial::Primary(primary.clone()),
    ));
    for subkey in &key.secret_subkeys {
        candidates.push((
            KeyRecord::new(subkey.key.key_id(), user_ids.clone(), subkey.key.algorithm()),
            SecretKeyMaterial::Subkey(subkey.key.clone()),
        ));
    }
    candidates
}

fn public_candidates(key: &SignedPublicKey) -> Vec<(KeyRecord, PublicKeyMaterial)> {
    let user_ids: Vec<String> = key
        .details
        .users
        .iter()
        .map(|user| String::from_utf8_lossy(user.id.id()).into_owned())
        .collect();
    let primary = &key.primary_key;
    let mut candidates = Vec::with_capacity(1 + key.public_subkeys.len());
    candidates.push((
        KeyRecord::new(primary.key_id(), user_ids.clone(), primary.algorithm()),
        PublicKeyMaterial::Primary(primary.clone()),
    ));
    for subkey in &key.public_subkeys {
        candidates.push((
            KeyRecord::new(subkey.key.key_id(), user_ids.clone(), subkey.key.algorithm()),
            PublicKeyMaterial::Subkey(subkey.key.clone()),
        ));
    }
    candidates
}

/// Whether an algorithm can produce signatures at all. Encryption-only
/// algorithms never pass, whatever the key flags claim.
fn algorithm_can_sign(algorithm: PublicKeyAlgorithm) -> bool {
    matches!(
        algorithm,
        PublicKeyAlgorithm::RSA
            | PublicKeyAlgorithm::RSASign
            | PublicKeyAlgorithm::DSA
            | PublicKeyAlgorithm::ECDSA
            | PublicKeyAlgorithm::EdDSALegacy
            | PublicKeyAlgorithm::Ed25519
    )
}
