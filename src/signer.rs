//! Signature generation over a streamed message.
//!
//! A [`SignatureGenerator`] session is bound to one resolved secret key and
//! one hash algorithm, accumulates message bytes chunk by chunk, and is then
//! consumed by a single `generate` call. The produced binary-document
//! signature packet is written through a compression container that is
//! finalized on every exit path.

use std::io::Read;
use std::io::Write;

use chrono::Utc;
use digest::DynDigest;
use flate2::write::DeflateEncoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use pgp::composed::StandaloneSignature;
use pgp::crypto::hash::HashAlgorithm;
use pgp::packet::PacketTrait as _;
use pgp::packet::Signature;
use pgp::packet::SignatureConfig;
use pgp::packet::SignatureType;
use pgp::packet::Subpacket;
use pgp::packet::SubpacketData;
use pgp::types::CompressionAlgorithm;

use crate::error::SigningError;
use crate::hash;
use crate::keys;
use crate::keys::KeyFilter;
use crate::keys::ResolvedSecretKey;
use crate::stream;

/// Knobs for a sign operation.
///
/// The defaults (SHA-256, ZLIB container) match what this crate's verifier
/// and common OpenPGP tooling expect.
#[derive(Debug, Clone)]
pub struct SignOptions {
    /// Hash algorithm bound into the signature.
    pub hash: HashAlgorithm,
    /// Compression wrapping the emitted signature packet.
    pub compression: CompressionAlgorithm,
}

impl Default for SignOptions {
    fn default() -> Self {
        SignOptions {
            hash: HashAlgorithm::Sha256,
            compression: CompressionAlgorithm::ZLIB,
        }
    }
}

/// One signing session: bind, accumulate, generate once.
///
/// `generate`/`finish_armored` take the session by value, so a second
/// generate or an update after finalization does not typecheck.
pub struct SignatureGenerator {
    key: ResolvedSecretKey,
    hash_algorithm: HashAlgorithm,
    compression: CompressionAlgorithm,
    hasher: Box<dyn DynDigest>,
    accumulated: u64,
}

impl std::fmt::Debug for SignatureGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureGenerator")
            .field("key", &self.key)
            .field("hash_algorithm", &self.hash_algorithm)
            .field("compression", &self.compression)
            .field("accumulated", &self.accumulated)
            .finish_non_exhaustive()
    }
}

impl SignatureGenerator {
    /// Bind a session to a resolved secret key with default options.
    pub fn bind(key: ResolvedSecretKey) -> Result<Self, SigningError> {
        Self::bind_with(key, SignOptions::default())
    }

    /// Bind a session with explicit options.
    ///
    /// Fails with [`SigningError::NotSigningCapable`] if the key cannot sign.
    pub fn bind_with(key: ResolvedSecretKey, options: SignOptions) -> Result<Self, SigningError> {
        if !key.record.signing_capable {
            return Err(SigningError::NotSigningCapable {
                key_id: key.record.key_id_hex(),
            });
        }
        let hasher = hash::new_hasher(options.hash)?;
        Ok(SignatureGenerator {
            key,
            hash_algorithm: options.hash,
            compression: options.compression,
            hasher,
            accumulated: 0,
        })
    }

    /// Feed the next chunk of message bytes, in original message order.
    ///
    /// Chunk boundaries are irrelevant; only the concatenated byte sequence
    /// matters.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.accumulated += chunk.len() as u64;
    }

    /// Finalize the session and write the signature packet into `sink`,
    /// wrapped in the configured compression container.
    ///
    /// Generating before any `update` call signs the empty message. The
    /// container is finalized even when a sink write fails, so a failed
    /// operation never leaves it open.
    pub fn generate<W: Write>(self, sink: W) -> Result<(), SigningError> {
        let compression = self.compression.clone();
        let accumulated = self.accumulated;
        let key_id = self.key.record.key_id_hex();

        let packet = self.into_signature_packet()?;
        let mut encoded = Vec::new();
        packet
            .to_writer_with_header(&mut encoded)
            .map_err(SigningError::SigningFailed)?;

        let mut container = CompressedSink::new(compression, sink)?;
        let write_result = container.write_all(&encoded).map_err(SigningError::Io);
        let close_result = container.finish().map_err(SigningError::Io);
        write_result?;
        close_result?;

        log::debug!(
            "signed {} message byte(s) with key {}, {} byte signature packet",
            accumulated,
            key_id,
            encoded.len()
        );
        Ok(())
    }

    /// Finalize the session into an armored detached signature instead of
    /// the compressed container.
    pub fn finish_armored(self) -> Result<String, SigningError> {
        let packet = self.into_signature_packet()?;
        StandaloneSignature::new(packet)
            .to_armored_string(Default::default())
            .map_err(SigningError::SigningFailed)
    }

    fn into_signature_packet(self) -> Result<Signature, SigningError> {
        let digest = self.hasher.finalize();
        log::trace!("message digest {}", hex::encode(&digest));

        let raw = self
            .key
            .key
            .create_signature(&self.key.password, self.hash_algorithm, &digest)
            .map_err(SigningError::SigningFailed)?;

        let mut config = SignatureConfig::v4(
            SignatureType::Binary,
            self.key.key.algorithm(),
            self.hash_algorithm,
        );
        config.hashed_subpackets = vec![
            subpacket(SubpacketData::SignatureCreationTime(Utc::now()))?,
            subpacket(SubpacketData::Issuer(self.key.key.key_id()))?,
            subpacket(SubpacketData::IssuerFingerprint(self.key.key.fingerprint()))?,
        ];

        Signature::from_config(config, [digest[0], digest[1]], raw)
            .map_err(SigningError::SigningFailed)
    }
}

fn subpacket(data: SubpacketData) -> Result<Subpacket, SigningError> {
    Subpacket::regular(data).map_err(SigningError::SigningFailed)
}

/// Sign `message` with the signing-capable secret key carrying `user_id`.
///
/// The compressed signature container is written to `sink`. See
/// [`sign_message_with`] for hash and compression selection.
pub fn sign_message<K, M, W>(
    secret_keys: K,
    user_id: &str,
    passphrase: &str,
    message: M,
    sink: W,
) -> Result<(), SigningError>
where
    K: Read,
    M: Read,
    W: Write,
{
    sign_message_with(SignOptions::default(), secret_keys, user_id, passphrase, message, sink)
}

/// [`sign_message`] with explicit [`SignOptions`].
pub fn sign_message_with<K, M, W>(
    options: SignOptions,
    secret_keys: K,
    user_id: &str,
    passphrase: &str,
    message: M,
    sink: W,
) -> Result<(), SigningError>
where
    K: Read,
    M: Read,
    W: Write,
{
    let filter = KeyFilter::ByUserId(user_id.to_string());
    let key = keys::resolve_secret_key(secret_keys, passphrase, &filter)?;
    let mut generator = SignatureGenerator::bind_with(key, options)?;
    stream::process(message, |chunk| {
        generator.update(chunk);
        Ok(())
    })?;
    generator.generate(sink)
}

/// Compression container around the signature sink.
///
/// `finish` flushes and terminates the underlying encoder; it must run on
/// every exit path of `generate`.
enum CompressedSink<W: Write> {
    Zlib(ZlibEncoder<W>),
    Zip(DeflateEncoder<W>),
    Plain(W),
}

impl<W: Write> CompressedSink<W> {
    fn new(algorithm: CompressionAlgorithm, sink: W) -> Result<Self, SigningError> {
        match algorithm {
            CompressionAlgorithm::ZLIB => {
                Ok(CompressedSink::Zlib(ZlibEncoder::new(sink, Compression::default())))
            }
            CompressionAlgorithm::ZIP => {
                Ok(CompressedSink::Zip(DeflateEncoder::new(sink, Compression::default())))
            }
            CompressionAlgorithm::Uncompressed => Ok(CompressedSink::Plain(sink)),
            other => Err(SigningError::UnsupportedCompression(other)),
        }
    }

    fn finish(self) -> std::io::Result<()> {
        match self {
            CompressedSink::Zlib(encoder) => encoder.finish().map(drop),
            CompressedSink::Zip(encoder) => encoder.finish().map(drop),
            CompressedSink::Plain(mut sink) => sink.flush(),
        }
    }
}

impl<W: Write> Write for CompressedSink<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            CompressedSink::Zlib(encoder) => encoder.write(buf),
            CompressedSink::Zip(encoder) => encoder.write(buf),
            CompressedSink::Plain(sink) => sink.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            CompressedSink::Zlib(encoder) => encoder.flush(),
            CompressedSink::Zip(encoder) => encoder.flush(),
            CompressedSink::Plain(sink) => sink.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::testutil;

    const ALICE: &str = "Alice <alice@example.com>";

    fn resolved(secret_armored: &str) -> ResolvedSecretKey {
        keys::resolve_secret_key(
            Cursor::new(secret_armored.as_bytes()),
            "",
            &KeyFilter::ByUserId(ALICE.to_string()),
        )
        .unwrap()
    }

    #[test]
    fn sign_message_emits_zlib_container() {
        let (secret, _) = testutil::rsa_signing_key(ALICE, None);
        let armored = testutil::armored_secret(&secret);

        let mut out = Vec::new();
        sign_message(
            Cursor::new(armored.as_bytes()),
            ALICE,
            "",
            Cursor::new(&b"the quick brown fox"[..]),
            &mut out,
        )
        .unwrap();

        assert!(!out.is_empty());
        assert_eq!(out[0], 0x78, "zlib stream header");
    }

    #[test]
    fn uncompressed_container_emits_bare_packet() {
        let (secret, _) = testutil::rsa_signing_key(ALICE, None);
        let armored = testutil::armored_secret(&secret);

        let options = SignOptions {
            compression: CompressionAlgorithm::Uncompressed,
            ..SignOptions::default()
        };
        let mut out = Vec::new();
        sign_message_with(
            options,
            Cursor::new(armored.as_bytes()),
            ALICE,
            "",
            Cursor::new(&b"payload"[..]),
            &mut out,
        )
        .unwrap();

        assert!(!out.is_empty());
        assert_ne!(out[0] & 0x80, 0, "OpenPGP packet header");
    }

    #[test]
    fn generate_without_updates_signs_empty_message() {
        let (secret, _) = testutil::rsa_signing_key(ALICE, None);
        let armored = testutil::armored_secret(&secret);

        let generator = SignatureGenerator::bind(resolved(&armored)).unwrap();
        let mut out = Vec::new();
        generator.generate(&mut out).unwrap();
        assert!(!out.is_empty());
    }

    #[test]
    fn unknown_user_id_is_key_not_found() {
        let (secret, _) = testutil::rsa_signing_key(ALICE, None);
        let armored = testutil::armored_secret(&secret);

        let err = sign_message(
            Cursor::new(armored.as_bytes()),
            "Mallory <mallory@example.com>",
            "",
            Cursor::new(&b"msg"[..]),
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SigningError::KeyNotFound));
    }

    #[test]
    fn binding_a_non_signing_key_fails() {
        let (secret, _) = testutil::rsa_signing_key(ALICE, None);
        let armored = testutil::armored_secret(&secret);

        let mut key = resolved(&armored);
        key.record.signing_capable = false;
        let err = SignatureGenerator::bind(key).unwrap_err();
        assert!(matches!(err, SigningError::NotSigningCapable { .. }));
    }

    #[test]
    fn armored_output_is_a_signature_block() {
        let (secret, _) = testutil::rsa_signing_key(ALICE, None);
        let armored = testutil::armored_secret(&secret);

        let mut generator = SignatureGenerator::bind(resolved(&armored)).unwrap();
        generator.update(b"hello");
        let sig = generator.finish_armored().unwrap();
        assert!(sig.starts_with("-----BEGIN PGP SIGNATURE-----"));
    }

    /// Sink that rejects every write, standing in for a broken target.
    struct FailingSink {
        writes_seen: usize,
    }

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            self.writes_seen += 1;
            Err(std::io::Error::other("sink is broken"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_failure_surfaces_and_container_is_closed() {
        let (secret, _) = testutil::rsa_signing_key(ALICE, None);
        let armored = testutil::armored_secret(&secret);

        let mut generator = SignatureGenerator::bind(resolved(&armored)).unwrap();
        generator.update(b"doomed");

        let mut sink = FailingSink { writes_seen: 0 };
        let err = generator.generate(&mut sink).unwrap_err();
        assert!(matches!(err, SigningError::Io(_)), "failure propagates, not swallowed");
        assert!(sink.writes_seen >= 1, "container finalization reached the sink");
    }
}
