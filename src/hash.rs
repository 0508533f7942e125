//! Hash contexts for incremental signature accumulation.

use digest::DynDigest;
use pgp::crypto::hash::HashAlgorithm;
use sha2::Sha256;
use sha2::Sha384;
use sha2::Sha512;

use crate::error::SigningError;

/// Build an incremental hash context for the given algorithm.
///
/// Only the SHA-2 family is supported; anything else a signature declares is
/// rejected up front rather than mis-hashed.
pub(crate) fn new_hasher(algorithm: HashAlgorithm) -> Result<Box<dyn DynDigest>, SigningError> {
    match algorithm {
        HashAlgorithm::Sha256 => Ok(Box::new(Sha256::default())),
        HashAlgorithm::Sha384 => Ok(Box::new(Sha384::default())),
        HashAlgorithm::Sha512 => Ok(Box::new(Sha512::default())),
        other => Err(SigningError::UnsupportedHash(other)),
    }
}
