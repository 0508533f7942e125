//! Streaming OpenPGP message signing and per-signer verification.
//!
//! A message is signed by selecting a secret key from a key source with a
//! [`keys::KeyFilter`], hashing the message in chunks, and emitting a
//! detached signature packet, by default inside a zlib-compressed
//! container. Verification decodes the signature stream, resolves each
//! signer against a public key source by issuer key ID, feeds the message
//! through every resolved session in a single pass, and reports a
//! per-signer verdict in a [`verifier::VerificationReport`].
//!
//! # Signing and verifying
//!
//! ```
//! use std::io::Cursor;
//!
//! use pgp::composed::KeyType;
//! use pgp::composed::SecretKeyParamsBuilder;
//! use pgp::types::Password;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // A signing-capable key pair, normally loaded from key files.
//! let mut rng = rand::thread_rng();
//! let mut params = SecretKeyParamsBuilder::default();
//! params
//!     .key_type(KeyType::Rsa(2048))
//!     .can_sign(true)
//!     .primary_user_id("Alice <alice@example.com>".into());
//! let secret = params.build()?.generate(&mut rng)?.sign(&mut rng, &Password::empty())?;
//! let public = secret
//!     .public_key()
//!     .sign(&mut rng, &*secret, &*secret.public_key(), &Password::empty())?;
//! let secret_armored = secret.to_armored_string(Default::default())?;
//! let public_armored = public.to_armored_string(Default::default())?;
//!
//! let message = b"hello world";
//! let mut signature = Vec::new();
//! pgp_signing::sign_message(
//!     Cursor::new(secret_armored.as_bytes()),
//!     "Alice <alice@example.com>",
//!     "",
//!     Cursor::new(&message[..]),
//!     &mut signature,
//! )?;
//!
//! let report = pgp_signing::verify_message(
//!     Cursor::new(public_armored.as_bytes()),
//!     Cursor::new(&message[..]),
//!     Cursor::new(&signature[..]),
//! )?;
//! assert!(report.all_valid());
//! # Ok(())
//! # }
//! ```
//!
//! The session types [`signer::SignatureGenerator`] and
//! [`verifier::SignatureVerifier`] are available directly when the caller
//! wants to drive the message stream itself.

pub mod error;
mod hash;
pub mod keys;
pub mod signer;
pub mod stream;
pub mod verifier;

pub use error::SigningError;
pub use keys::KeyFilter;
pub use keys::KeyRecord;
pub use signer::sign_message;
pub use signer::sign_message_with;
pub use signer::SignOptions;
pub use signer::SignatureGenerator;
pub use verifier::verify_message;
pub use verifier::verify_message_with;
pub use verifier::SignatureVerifier;
pub use verifier::SignerStatus;
pub use verifier::VerificationReport;
pub use verifier::VerifyOptions;

#[cfg(test)]
pub(crate) mod testutil;
