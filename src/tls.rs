//! TLS material shared by the round server and the registration client.
//!
//! Both sides live in the same trust domain: the certificates found in `<prefix>.crt` are the
//! agent's own chain *and* the roots used to authenticate the playing field.
//!
//! The PEM files are parsed and checked with rustls up front, so a bad certificate or a key
//! that does not match it is reported before any socket is bound. tonic receives the same
//! bytes afterwards.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{RootCertStore, ServerConfig};
use thiserror::Error;
use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};
use tracing::{debug, instrument};

/// Certificate material could not be loaded or used.
#[derive(Error, Debug)]
pub enum TlsError {
    /// A file could not be opened or read.
    #[error("could not read {}", .path.display())]
    Read {
        /// Offending file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The certificate file holds no certificate.
    #[error("no certificate found in {}", .0.display())]
    NoCertificate(PathBuf),
    /// The key file holds no private key.
    #[error("no private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),
    /// rustls refused the material.
    #[error("invalid certificate or key")]
    Rustls(#[from] rustls::Error),
}

/// A certificate chain and its private key, as found on disk.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    certificate_pem: Vec<u8>,
    key_pem: Vec<u8>,
}

impl TlsMaterial {
    /// Load and check `<prefix>.crt` and `<prefix>.key`.
    #[instrument]
    pub fn load(prefix: &Path) -> Result<Self, TlsError> {
        install_crypto_provider();

        let cert_path = with_suffix(prefix, "crt");
        let key_path = with_suffix(prefix, "key");

        let certificate_pem = read(&cert_path)?;
        let certs = parse_certificates(&cert_path, &certificate_pem)?;

        let key_pem = read(&key_path)?;
        let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
            .map_err(|source| TlsError::Read {
                path: key_path.clone(),
                source,
            })?
            .ok_or_else(|| TlsError::NoPrivateKey(key_path.clone()))?;

        check_identity(&certs, key)?;
        check_roots(&certs)?;

        debug!(certificates = certs.len(), "loaded tls material");
        Ok(TlsMaterial {
            certificate_pem,
            key_pem,
        })
    }

    /// Server side: present the chain, no client authentication.
    pub fn server_tls(&self) -> ServerTlsConfig {
        ServerTlsConfig::new().identity(Identity::from_pem(&self.certificate_pem, &self.key_pem))
    }

    /// Client side: trust every certificate of the chain, expect `domain` as server name.
    pub fn client_tls(&self, domain: &str) -> ClientTlsConfig {
        client_tls(&self.certificate_pem, domain)
    }
}

/// Client configuration trusting only the certificates found in `path` (PEM).
///
/// Used by parties that hold the trust root but not the private key.
pub fn client_tls_from_file(path: &Path, domain: &str) -> Result<ClientTlsConfig, TlsError> {
    install_crypto_provider();

    let pem = read(path)?;
    let certs = parse_certificates(path, &pem)?;
    check_roots(&certs)?;
    Ok(client_tls(&pem, domain))
}

fn client_tls(pem: &[u8], domain: &str) -> ClientTlsConfig {
    ClientTlsConfig::new()
        .ca_certificate(Certificate::from_pem(pem))
        .domain_name(domain)
}

/// Make ring the process-wide rustls provider unless one is already installed.
fn install_crypto_provider() {
    let _ = ring::default_provider().install_default();
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(ring::default_provider())
}

fn parse_certificates(path: &Path, pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificate(path.to_path_buf()));
    }
    Ok(certs)
}

/// The key must match the leaf certificate.
fn check_identity(
    certs: &[CertificateDer<'static>],
    key: PrivateKeyDer<'static>,
) -> Result<(), TlsError> {
    ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs.to_vec(), key)?;
    Ok(())
}

/// Every certificate must be usable as a trust anchor.
fn check_roots(certs: &[CertificateDer<'static>]) -> Result<(), TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in certs {
        roots.add(cert.clone())?;
    }
    Ok(())
}

fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// `certs/friedman` -> `certs/friedman.crt`. Dots already in the prefix are kept.
fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut path = prefix.as_os_str().to_owned();
    path.push(".");
    path.push(suffix);
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_is_appended() {
        assert_eq!(
            with_suffix(Path::new("/etc/certs/friedman"), "crt"),
            PathBuf::from("/etc/certs/friedman.crt")
        );
        assert_eq!(
            with_suffix(Path::new("certs/localhost.v2"), "key"),
            PathBuf::from("certs/localhost.v2.key")
        );
    }

    #[test]
    fn missing_files_are_named() {
        let err = TlsMaterial::load(Path::new("/nonexistent/friedman")).unwrap_err();
        match &err {
            TlsError::Read { path, .. } => {
                assert_eq!(path, Path::new("/nonexistent/friedman.crt"))
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("/nonexistent/friedman.crt"));
    }

    #[test]
    fn empty_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("empty");
        std::fs::write(dir.path().join("empty.crt"), "").unwrap();
        std::fs::write(dir.path().join("empty.key"), "").unwrap();

        assert!(matches!(
            TlsMaterial::load(&prefix),
            Err(TlsError::NoCertificate(_))
        ));
        assert!(matches!(
            client_tls_from_file(&dir.path().join("empty.crt"), "localhost"),
            Err(TlsError::NoCertificate(_))
        ));
    }

    #[test]
    fn key_must_match_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("mixed");

        let key = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec!["localhost".to_owned()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        let other_key = rcgen::KeyPair::generate().unwrap();
        std::fs::write(dir.path().join("mixed.crt"), cert.pem()).unwrap();
        std::fs::write(dir.path().join("mixed.key"), other_key.serialize_pem()).unwrap();

        assert!(matches!(
            TlsMaterial::load(&prefix),
            Err(TlsError::Rustls(_))
        ));

        std::fs::write(dir.path().join("mixed.key"), key.serialize_pem()).unwrap();
        TlsMaterial::load(&prefix).unwrap();
    }
}
