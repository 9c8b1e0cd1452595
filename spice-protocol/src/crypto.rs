//! Password encryption for the link auth step. The RSA primitive itself is the `rsa` crate's
//! job; this module only wires it up the way the link reply's key material requires.

use crate::error::{ErrorType, NetworkError, NetworkResult};
use rand::rngs::OsRng;
use rsa::{Oaep, RsaPublicKey};
use sha1::Sha1;
use zeroize::Zeroizing;

/// A password staged for RSA encryption. Its backing buffer is wiped on drop so a cleartext
/// copy doesn't linger in memory after the handshake completes.
pub struct Password(Zeroizing<Vec<u8>>);

impl Password {
    pub fn new(password: &str) -> Password {
        Password(Zeroizing::new(password.as_bytes().to_vec()))
    }
}

/// Parses the BER/DER-ish RSA public key blob from the link reply (modulus + exponent, 162
/// bytes as emitted by every spice-server build in practice) and OAEP-SHA1 encrypts the
/// password against it, producing the ciphertext sent back as the auth payload.
pub fn encrypt_password(password: &Password, pub_key_der: &[u8]) -> NetworkResult<Vec<u8>> {
    let public_key = RsaPublicKey::from_pkcs1_der(pub_key_der)
        .or_else(|_| rsa_from_raw_modulus_exponent(pub_key_der))
        .map_err(|_| NetworkError::Fatal(ErrorType::Crypto))?;

    let padding = Oaep::new::<Sha1>();
    public_key
        .encrypt(&mut OsRng, padding, &password.0[..])
        .map_err(|_| NetworkError::Fatal(ErrorType::Crypto))
}

/// Fallback parse for servers that hand over a raw `modulus || exponent` blob rather than a
/// PKCS#1 DER structure. SPICE's own key material is not itself ASN.1 in some server builds.
fn rsa_from_raw_modulus_exponent(blob: &[u8]) -> Result<RsaPublicKey, rsa::errors::Error> {
    use rsa::BigUint;

    if blob.len() < 4 {
        return Err(rsa::errors::Error::InvalidModulus);
    }

    // Last 4 bytes are the exponent in practice (commonly 0x010001), preceded by the modulus.
    let split = blob.len() - 4;
    let modulus = BigUint::from_bytes_be(&blob[..split]);
    let exponent = BigUint::from_bytes_be(&blob[split..]);

    RsaPublicKey::new(modulus, exponent)
}

use rsa::pkcs1::DecodeRsaPublicKey;

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::EncodeRsaPublicKey;
    use rsa::RsaPrivateKey;

    #[test]
    fn encrypts_against_a_pkcs1_der_key() {
        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let der = public_key.to_pkcs1_der().unwrap();

        let password = Password::new("hunter2");
        let ciphertext = encrypt_password(&password, der.as_bytes()).unwrap();

        assert_ne!(ciphertext, b"hunter2");
        assert!(!ciphertext.is_empty());
    }
}
