//! Error types for signing and verification operations.

use pgp::crypto::hash::HashAlgorithm;
use pgp::types::CompressionAlgorithm;

/// Errors from message signing and signature verification.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// The key-material stream was exhausted without any key matching the filter.
    #[error("no key in the key material matched the requested criteria")]
    KeyNotFound,

    /// The passphrase did not unlock the matched secret key.
    #[error("wrong passphrase for secret key {key_id}")]
    DecryptionFailed {
        key_id: String,
        #[source]
        source: pgp::errors::Error,
    },

    /// The key-material stream could not be decoded as OpenPGP key packets.
    #[error("malformed key material: {0}")]
    MalformedKeyMaterial(#[source] pgp::errors::Error),

    /// The signature stream could not be decoded as OpenPGP signature packets.
    #[error("malformed signature stream: {0}")]
    MalformedSignature(#[source] pgp::errors::Error),

    /// The signature stream decoded cleanly but carried no signature packets.
    #[error("signature stream contained no signature packets")]
    NoSignaturesFound,

    /// No public key in the key material matches the signature's issuer.
    #[error("no public key found for signer {key_id}")]
    UnknownSigner { key_id: String },

    /// A signing session was bound to a key that cannot produce signatures.
    #[error("key {key_id} is not signing-capable")]
    NotSigningCapable { key_id: String },

    /// The signature declares a hash algorithm this crate cannot accumulate.
    #[error("unsupported hash algorithm {0:?}")]
    UnsupportedHash(HashAlgorithm),

    /// The requested compression algorithm has no encoder here.
    #[error("unsupported compression algorithm {0:?}")]
    UnsupportedCompression(CompressionAlgorithm),

    /// The underlying codec failed to produce or encode the signature.
    #[error("signing failed: {0}")]
    SigningFailed(#[source] pgp::errors::Error),

    /// Source or sink I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
