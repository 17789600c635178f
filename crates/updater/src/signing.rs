//! Ed25519 signatures over release descriptors and SHA-256 artefact checksums.
//!
//! Releases are signed over the short message `version + "+" + checksum`
//! rather than over the artefact or the metadata document, which binds the
//! version string and the content digest together. Keys travel as PKCS#8 /
//! SPKI PEM on the publishing side; a binary that updates itself only embeds
//! the raw 32-byte public key and verifies with [`verify_raw`].

use crate::error::{Result, UpdaterError};
use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey, PUBLIC_KEY_LENGTH};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

/// Build the canonical message covered by a release signature.
pub fn signed_message(version: &str, checksum: &str) -> String {
    format!("{version}+{checksum}")
}

/// Sign `message` with a PEM-encoded PKCS#8 Ed25519 private key.
///
/// Returns the base64 (standard alphabet) encoding of the 64-byte signature.
pub fn sign(private_key_pem: &str, message: &str) -> Result<String> {
    if message.is_empty() {
        return Err(UpdaterError::EmptyInput);
    }
    let key = parse_private_key(private_key_pem)?;
    Ok(encode_signature(&key, message))
}

/// Verify a base64 signature with a PEM-encoded SPKI Ed25519 public key.
///
/// A signature that decodes but does not match yields `Ok(false)`.
pub fn verify(public_key_pem: &str, message: &str, signature: &str) -> Result<bool> {
    let key = parse_public_key(public_key_pem)?;
    verify_with_key(&key, message, signature)
}

/// Verify a base64 signature with a raw 32-byte Ed25519 public key.
pub fn verify_raw(public_key: &[u8], message: &str, signature: &str) -> Result<bool> {
    if public_key.is_empty() {
        return Err(UpdaterError::InvalidKey("public key is empty".into()));
    }
    let bytes: [u8; PUBLIC_KEY_LENGTH] = public_key.try_into().map_err(|_| {
        UpdaterError::InvalidKey(format!(
            "raw public key must be {PUBLIC_KEY_LENGTH} bytes, got {}",
            public_key.len()
        ))
    })?;
    let key = VerifyingKey::from_bytes(&bytes)
        .map_err(|err| UpdaterError::InvalidKey(err.to_string()))?;
    verify_with_key(&key, message, signature)
}

fn verify_with_key(key: &VerifyingKey, message: &str, signature: &str) -> Result<bool> {
    let raw = general_purpose::STANDARD.decode(signature.trim())?;
    let Ok(bytes) = <[u8; 64]>::try_from(raw.as_slice()) else {
        return Ok(false);
    };
    let signature = Signature::from_bytes(&bytes);
    Ok(key.verify_strict(message.as_bytes(), &signature).is_ok())
}

fn encode_signature(key: &SigningKey, message: &str) -> String {
    general_purpose::STANDARD.encode(key.sign(message.as_bytes()).to_bytes())
}

/// Streaming SHA-256 over `reader`, returned as lowercase hex.
///
/// The reader is consumed to EOF before the digest is produced.
pub fn checksum<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of the file at `path`.
pub fn checksum_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|err| UpdaterError::fs("open", path, err))?;
    checksum(io::BufReader::new(file)).map_err(|err| UpdaterError::fs("read", path, err))
}

/// Freshly generated Ed25519 key pair.
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Generate a new key pair from the operating system RNG.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// PKCS#8 `PRIVATE KEY` PEM encoding.
    pub fn private_key_pem(&self) -> Result<String> {
        let pem = self
            .signing
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|err| UpdaterError::InvalidKey(format!("pem encode failed: {err}")))?;
        Ok(String::from(pem.as_str()))
    }

    /// SPKI `PUBLIC KEY` PEM encoding.
    pub fn public_key_pem(&self) -> Result<String> {
        self.signing
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|err| UpdaterError::InvalidKey(format!("pem encode failed: {err}")))
    }

    /// Raw public key bytes, the form embedded into updating binaries.
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.signing.verifying_key().to_bytes()
    }

    /// Sign `message` with this key pair.
    pub fn sign(&self, message: &str) -> Result<String> {
        if message.is_empty() {
            return Err(UpdaterError::EmptyInput);
        }
        Ok(encode_signature(&self.signing, message))
    }
}

/// Generate a key pair and write it as PEM files.
///
/// The private key is written owner-readable only. Existing files are never
/// overwritten.
pub fn generate_keys(private_key_path: &Path, public_key_path: &Path) -> Result<()> {
    for path in [private_key_path, public_key_path] {
        if path.exists() {
            return Err(UpdaterError::KeysAlreadyExist(path.to_path_buf()));
        }
    }

    let pair = KeyPair::generate();
    write_key_file(private_key_path, &pair.private_key_pem()?, 0o600)?;
    write_key_file(public_key_path, &pair.public_key_pem()?, 0o644)?;
    tracing::debug!(
        private = %private_key_path.display(),
        public = %public_key_path.display(),
        "generated ed25519 key pair"
    );
    Ok(())
}

/// Sign `message` with the private key stored at `private_key_path`.
pub fn sign_file(private_key_path: &Path, message: &str) -> Result<String> {
    sign(&read_key_file(private_key_path)?, message)
}

/// Verify `signature` over `message` with the public key stored at `public_key_path`.
pub fn verify_file(public_key_path: &Path, message: &str, signature: &str) -> Result<bool> {
    verify(&read_key_file(public_key_path)?, message, signature)
}

/// Load the raw 32-byte public key from a PEM file.
pub fn public_key_from_file(path: &Path) -> Result<[u8; PUBLIC_KEY_LENGTH]> {
    Ok(parse_public_key(&read_key_file(path)?)?.to_bytes())
}

/// Load a signing key from a PEM file.
pub fn private_key_from_file(path: &Path) -> Result<SigningKey> {
    parse_private_key(&read_key_file(path)?)
}

fn read_key_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|err| UpdaterError::fs("read", path, err))
}

fn write_key_file(path: &Path, contents: &str, mode: u32) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options
        .open(path)
        .map_err(|err| UpdaterError::fs("create", path, err))?;
    file.write_all(contents.as_bytes())
        .map_err(|err| UpdaterError::fs("write", path, err))
}

/// Keys handed over via environment variables or shell arguments often carry
/// literal `\r\n` escapes instead of line breaks.
fn normalize_pem(text: &str) -> String {
    text.replace("\\r\\n", "\r\n").replace("\\n", "\n").trim().to_string()
}

fn parse_private_key(pem: &str) -> Result<SigningKey> {
    if pem.trim().is_empty() {
        return Err(UpdaterError::InvalidKey("private key is empty".into()));
    }
    SigningKey::from_pkcs8_pem(&normalize_pem(pem))
        .map_err(|err| UpdaterError::InvalidKey(format!("invalid private key PEM: {err}")))
}

fn parse_public_key(pem: &str) -> Result<VerifyingKey> {
    if pem.trim().is_empty() {
        return Err(UpdaterError::InvalidKey("public key is empty".into()));
    }
    VerifyingKey::from_public_key_pem(&normalize_pem(pem))
        .map_err(|err| UpdaterError::InvalidKey(format!("invalid public key PEM: {err}")))
}
