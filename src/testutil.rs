//! Key-generation helpers shared by the unit tests.

use pgp::composed::KeyType;
use pgp::composed::SecretKeyParamsBuilder;
use pgp::composed::SignedPublicKey;
use pgp::composed::SignedSecretKey;
use pgp::types::Password;

/// Generate a signing-capable RSA key pair, optionally passphrase-locked.
pub(crate) fn rsa_signing_key(
    user_id: &str,
    passphrase: Option<&str>,
) -> (SignedSecretKey, SignedPublicKey) {
    let mut rng = rand::thread_rng();
    let mut params = SecretKeyParamsBuilder::default();
    params
        .key_type(KeyType::Rsa(2048))
        .can_certify(true)
        .can_sign(true)
        .primary_user_id(user_id.into());
    if let Some(passphrase) = passphrase {
        params.passphrase(Some(passphrase.to_string()));
    }

    let password = match passphrase {
        Some(passphrase) => Password::from(passphrase.to_string()),
        None => Password::empty(),
    };
    let secret = params
        .build()
        .expect("key params")
        .generate(&mut rng)
        .expect("generate test key");
    let signed = secret.sign(&mut rng, &password).expect("self-sign test key");
    let public = signed
        .public_key()
        .sign(&mut rng, &*signed, &*signed.public_key(), &password)
        .expect("sign public test key");
    (signed, public)
}

pub(crate) fn armored_secret(key: &SignedSecretKey) -> String {
    key.to_armored_string(Default::default()).expect("armor secret key")
}

pub(crate) fn armored_public(key: &SignedPublicKey) -> String {
    key.to_armored_string(Default::default()).expect("armor public key")
}
