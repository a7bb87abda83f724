use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, KeyIvInit};
use aes::{Aes128, Aes256};
use cms::content_info::ContentInfo;
use cms::enveloped_data::{EnvelopedData, RecipientIdentifier, RecipientInfo};
use der::asn1::ObjectIdentifier;
use der::Decode;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use x509_cert::Certificate;
use zeroize::Zeroizing;

const OID_ENVELOPED_DATA: &str = "1.2.840.113549.1.7.3";
const OID_AES128_CBC: &str = "2.16.840.1.101.3.4.1.2";
const OID_AES256_CBC: &str = "2.16.840.1.101.3.4.1.42";

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("failed to parse CMS structure: {0}")]
    Der(#[from] der::Error),
    #[error("content type is not id-envelopedData")]
    NotEnvelopedData,
    #[error("no recipient info matched the configured decryption certificate")]
    NoMatchingRecipient,
    #[error("content-encryption algorithm {0} is not supported")]
    UnsupportedAlgorithm(String),
    #[error("failed to unwrap the content-encryption key: {0}")]
    KeyUnwrap(rsa::Error),
    #[error("enveloped data carries no encrypted content")]
    MissingContent,
    #[error("content decryption failed; key or padding is invalid")]
    Decrypt,
}

/// The result of successfully opening a CMS envelope (C4): the decrypted
/// content, plus the subject of whichever recipient certificate unwrapped
/// it, carried forward into the success notification for auditability.
pub struct DecodedEnvelope {
    pub plaintext: Vec<u8>,
    pub recipient_subject: String,
}

/// Decodes a CMS `EnvelopedData` structure addressed to `recipient_cert`,
/// using `private_key` to unwrap the per-message content-encryption key.
/// Only key-transport (`Ktri`) recipients matching `recipient_cert`'s
/// issuer/serial are considered; key-agreement and password recipients
/// are out of scope (SPEC_FULL.md §4.4 names CMS `EnvelopedData`
/// specifically, and this pipeline's one configured identity is always a
/// certificate/key pair, never a shared password).
pub fn decode_enveloped_data(
    der_bytes: &[u8],
    recipient_cert: &Certificate,
    private_key: &RsaPrivateKey,
) -> Result<DecodedEnvelope, EnvelopeError> {
    let content_info = ContentInfo::from_der(der_bytes)?;

    let enveloped_oid = OID_ENVELOPED_DATA
        .parse::<ObjectIdentifier>()
        .expect("static OID is valid");
    if content_info.content_type != enveloped_oid {
        return Err(EnvelopeError::NotEnvelopedData);
    }

    let enveloped: EnvelopedData = content_info.content.decode_as()?;

    let cert_serial = &recipient_cert.tbs_certificate.serial_number;
    let cert_issuer = &recipient_cert.tbs_certificate.issuer;

    let mut content_encryption_key: Option<Zeroizing<Vec<u8>>> = None;
    for recipient in enveloped.recip_infos.0.iter() {
        let RecipientInfo::Ktri(ktri) = recipient else {
            continue;
        };
        let RecipientIdentifier::IssuerAndSerialNumber(ias) = &ktri.rid else {
            continue;
        };
        if &ias.serial_number != cert_serial || &ias.issuer != cert_issuer {
            continue;
        }

        let wrapped_key = ktri.enc_key.as_bytes();
        let unwrapped = private_key
            .decrypt(Pkcs1v15Encrypt, wrapped_key)
            .map_err(EnvelopeError::KeyUnwrap)?;
        content_encryption_key = Some(Zeroizing::new(unwrapped));
        break;
    }

    let cek = content_encryption_key.ok_or(EnvelopeError::NoMatchingRecipient)?;

    let encrypted_content_info = &enveloped.encrypted_content_info;
    let ciphertext = encrypted_content_info
        .encrypted_content
        .as_ref()
        .map(|content| content.as_bytes().to_vec())
        .ok_or(EnvelopeError::MissingContent)?;

    let plaintext = decrypt_content(
        &encrypted_content_info.content_enc_alg.oid,
        encrypted_content_info
            .content_enc_alg
            .parameters
            .as_ref()
            .map(|any| any.value()),
        &cek,
        &ciphertext,
    )?;

    Ok(DecodedEnvelope {
        plaintext,
        recipient_subject: recipient_cert.tbs_certificate.subject.to_string(),
    })
}

fn decrypt_content(
    oid: &ObjectIdentifier,
    parameters: Option<&[u8]>,
    key: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, EnvelopeError> {
    let oid_str = oid.to_string();
    let iv = parameters
        .filter(|p| p.len() >= 16)
        .map(|p| &p[..16])
        .ok_or_else(|| EnvelopeError::UnsupportedAlgorithm(oid_str.clone()))?;

    match oid_str.as_str() {
        OID_AES128_CBC => {
            let decryptor = cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(|_| EnvelopeError::Decrypt)?;
            decryptor
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(|_| EnvelopeError::Decrypt)
        }
        OID_AES256_CBC => {
            let decryptor = cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(|_| EnvelopeError::Decrypt)?;
            decryptor
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(|_| EnvelopeError::Decrypt)
        }
        other => Err(EnvelopeError::UnsupportedAlgorithm(other.to_string())),
    }
}
