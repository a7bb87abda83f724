use std::path::Path;

use der::Decode;
use import_pipeline::RecipientIdentity;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use x509_cert::Certificate;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse recipient certificate: {0}")]
    Certificate(der::Error),
    #[error("failed to parse recipient private key: {0}")]
    PrivateKey(rsa::pkcs8::Error),
}

/// Loads the decryption identity `--identity-cert`/`--identity-key` name:
/// a DER-encoded X.509 certificate and its matching PKCS#8 DER private
/// key. Without both, every `Envelopped` item fails at dispatch rather
/// than the CLI refusing to start — decrypting CMS envelopes is one
/// capability among several this pipeline offers, not a precondition for
/// the rest of it.
pub fn load(cert_path: &Path, key_path: &Path) -> Result<RecipientIdentity, IdentityError> {
    let cert_bytes = std::fs::read(cert_path).map_err(|source| IdentityError::Read {
        path: cert_path.to_path_buf(),
        source,
    })?;
    let key_bytes = std::fs::read(key_path).map_err(|source| IdentityError::Read {
        path: key_path.to_path_buf(),
        source,
    })?;

    let certificate = Certificate::from_der(&cert_bytes).map_err(IdentityError::Certificate)?;
    let private_key =
        RsaPrivateKey::from_pkcs8_der(&key_bytes).map_err(IdentityError::PrivateKey)?;

    Ok(RecipientIdentity {
        certificate,
        private_key: std::sync::Arc::new(private_key),
    })
}
