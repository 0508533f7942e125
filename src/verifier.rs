//! Signature verification with one outcome per signer.
//!
//! The signature stream may carry several signature packets (multi-signer
//! documents). Every packet gets its own [`SignatureVerifier`] session bound
//! to the public key matching its issuer; all sessions then accumulate the
//! same single pass over the message stream, and the result is a
//! [`VerificationReport`] listing each signer's outcome rather than one
//! blended boolean.

use std::io::Cursor;
use std::io::Read;

use digest::DynDigest;
use flate2::read::DeflateDecoder;
use flate2::read::ZlibDecoder;
use pgp::composed::Deserializable;
use pgp::composed::StandaloneSignature;
use pgp::crypto::hash::HashAlgorithm;
use pgp::packet::Packet;
use pgp::packet::PacketParser;
use pgp::packet::Signature;
use serde::Deserialize;
use serde::Serialize;

use crate::error::SigningError;
use crate::hash;
use crate::keys;
use crate::keys::KeyFilter;
use crate::keys::ResolvedPublicKey;
use crate::stream;

/// Outcome for one signature in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignerStatus {
    /// The signature cryptographically validates against the message.
    Valid,
    /// The signer's key was found but the signature does not validate.
    Invalid,
    /// No public key in the supplied material matches the signature's issuer.
    UnknownSigner,
}

/// One signer's verification outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerVerification {
    /// Issuer key ID as lowercase hex; `None` when the signature carries no
    /// issuer subpacket.
    pub key_id: Option<String>,
    /// Verification outcome for this signature.
    pub status: SignerStatus,
}

/// Per-signer outcomes for one verify operation, in signature-stream order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// One entry per signature packet found.
    pub signers: Vec<SignerVerification>,
}

impl VerificationReport {
    /// Convenience projection: at least one signer, and every signer valid.
    pub fn all_valid(&self) -> bool {
        !self.signers.is_empty()
            && self.signers.iter().all(|signer| signer.status == SignerStatus::Valid)
    }

    /// Number of signers that verified.
    pub fn valid_count(&self) -> usize {
        self.signers.iter().filter(|signer| signer.status == SignerStatus::Valid).count()
    }
}

/// Knobs for a verify operation.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Abort with [`SigningError::UnknownSigner`] instead of recording an
    /// unknown signer in the report.
    pub reject_unknown_signers: bool,
}

/// One verification session: a signature packet bound to its public key.
///
/// The hash algorithm is taken from the signature packet itself; it is never
/// negotiated out of band.
pub struct SignatureVerifier {
    signature: Signature,
    key: keys::PublicKeyMaterial,
    hash_algorithm: HashAlgorithm,
    hasher: Box<dyn DynDigest>,
}

impl SignatureVerifier {
    /// Bind a signature packet to the resolved public key of its issuer.
    pub fn bind(signature: Signature, key: &ResolvedPublicKey) -> Result<Self, SigningError> {
        let hash_algorithm = signature.hash_alg().ok_or_else(|| {
            SigningError::MalformedSignature(pgp::errors::Error::from(
                "signature packet carries no hash algorithm".to_string(),
            ))
        })?;
        let hasher = hash::new_hasher(hash_algorithm)?;
        Ok(SignatureVerifier {
            signature,
            key: key.key.clone(),
            hash_algorithm,
            hasher,
        })
    }

    /// Feed the next chunk of the original message, in message order.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Finalize the session: true iff the signature validates against the
    /// accumulated digest and the bound key.
    pub fn verify(self) -> Result<bool, SigningError> {
        let digest = self.hasher.finalize();
        let raw = self.signature.signature().ok_or_else(|| {
            SigningError::MalformedSignature(pgp::errors::Error::from(
                "signature packet carries no signature data".to_string(),
            ))
        })?;
        Ok(self
            .key
            .verify_signature(self.hash_algorithm, &digest, raw)
            .is_ok())
    }
}

/// Verify `signatures` over `message` against `public_keys`, reporting an
/// outcome per signer. See [`verify_message_with`] for strictness options.
pub fn verify_message<P, M, S>(
    public_keys: P,
    message: M,
    signatures: S,
) -> Result<VerificationReport, SigningError>
where
    P: Read,
    M: Read,
    S: Read,
{
    verify_message_with(VerifyOptions::default(), public_keys, message, signatures)
}

/// [`verify_message`] with explicit [`VerifyOptions`].
pub fn verify_message_with<P, M, S>(
    options: VerifyOptions,
    mut public_keys: P,
    message: M,
    mut signatures: S,
) -> Result<VerificationReport, SigningError>
where
    P: Read,
    M: Read,
    S: Read,
{
    let mut signature_data = Vec::new();
    signatures.read_to_end(&mut signature_data)?;
    let packets = decode_signatures(&signature_data)?;
    if packets.is_empty() {
        return Err(SigningError::NoSignaturesFound);
    }

    let mut key_data = Vec::new();
    public_keys.read_to_end(&mut key_data)?;

    // Sessions and unknown-signer placeholders, in signature-stream order.
    let mut pending = Vec::with_capacity(packets.len());
    for packet in packets {
        let issuer = packet.issuer().first().map(|key_id| (*key_id).clone());
        let Some(key_id) = issuer else {
            if options.reject_unknown_signers {
                return Err(SigningError::UnknownSigner {
                    key_id: "(no issuer subpacket)".to_string(),
                });
            }
            log::warn!("signature carries no issuer key ID, reporting unknown signer");
            pending.push(Pending::Unknown(None));
            continue;
        };
        let key_id_hex = hex::encode(&key_id);
        let filter = KeyFilter::ByKeyId(key_id);
        match keys::resolve_public_key(Cursor::new(&key_data), &filter) {
            Ok(resolved) => {
                let verifier = SignatureVerifier::bind(packet, &resolved)?;
                pending.push(Pending::Bound(Box::new(verifier), Some(key_id_hex)));
            }
            Err(SigningError::KeyNotFound) => {
                if options.reject_unknown_signers {
                    return Err(SigningError::UnknownSigner { key_id: key_id_hex });
                }
                log::warn!("no public key for signer {key_id_hex}");
                pending.push(Pending::Unknown(Some(key_id_hex)));
            }
            Err(other) => return Err(other),
        }
    }

    // One pass over the message feeds every bound session.
    stream::process(message, |chunk| {
        for entry in pending.iter_mut() {
            if let Pending::Bound(verifier, _) = entry {
                verifier.update(chunk);
            }
        }
        Ok(())
    })?;

    let mut signers = Vec::with_capacity(pending.len());
    for entry in pending {
        let verification = match entry {
            Pending::Bound(verifier, key_id) => {
                let valid = verifier.verify()?;
                log::debug!(
                    "signer {}: {}",
                    key_id.as_deref().unwrap_or("(unknown)"),
                    if valid { "valid" } else { "invalid" }
                );
                SignerVerification {
                    key_id,
                    status: if valid { SignerStatus::Valid } else { SignerStatus::Invalid },
                }
            }
            Pending::Unknown(key_id) => SignerVerification {
                key_id,
                status: SignerStatus::UnknownSigner,
            },
        };
        signers.push(verification);
    }
    Ok(VerificationReport { signers })
}

enum Pending {
    Bound(Box<SignatureVerifier>, Option<String>),
    Unknown(Option<String>),
}

/// Decode a signature stream into its signature packets.
///
/// Accepts armored signature blocks, bare binary packets, and the ZLIB/ZIP
/// compressed container emitted by the signer.
fn decode_signatures(data: &[u8]) -> Result<Vec<Signature>, SigningError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if keys::is_armored(data) {
        let (parsed, _headers) = StandaloneSignature::from_armor_many(Cursor::new(data))
            .map_err(SigningError::MalformedSignature)?;
        let mut signatures = Vec::new();
        for standalone in parsed {
            signatures.push(standalone.map_err(SigningError::MalformedSignature)?.signature);
        }
        return Ok(signatures);
    }
    if data[0] == 0x78 {
        // zlib container from the signer
        let mut raw = Vec::new();
        ZlibDecoder::new(data).read_to_end(&mut raw)?;
        return signature_packets(&raw);
    }
    if data[0] & 0x80 != 0 {
        // bare OpenPGP packets
        return signature_packets(data);
    }
    // last resort: a raw-deflate (ZIP algorithm) container
    let mut raw = Vec::new();
    DeflateDecoder::new(data).read_to_end(&mut raw)?;
    signature_packets(&raw)
}

fn signature_packets(data: &[u8]) -> Result<Vec<Signature>, SigningError> {
    let mut signatures = Vec::new();
    for packet in PacketParser::new(Cursor::new(data)) {
        match packet.map_err(SigningError::MalformedSignature)? {
            Packet::Signature(signature) => signatures.push(signature),
            _ => {} // other packet types are not ours to judge
        }
    }
    Ok(signatures)
}
