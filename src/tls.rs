//! TLS configuration for both ends.
//!
//! Capsules usually run on self-signed certificates, so the client does not
//! validate chains against a CA store. It only checks that the presented
//! certificates are valid for the requested domain, through a pluggable
//! [`PeerVerifier`]. The server asks for, but never requires, a client
//! certificate and accepts whatever is presented so the chain can reach the
//! handler as the peer identity.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tokio_rustls::rustls::server::ParsedCertificate;
use tokio_rustls::rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use tokio_rustls::rustls::{
    self, CertificateError, ClientConfig, DigitallySignedStruct, DistinguishedName, ServerConfig,
    SignatureScheme,
};

use crate::error::{Error, Result};

/// Decides whether a server's certificate chain proves the expected domain.
pub trait PeerVerifier: fmt::Debug + Send + Sync {
    fn verify(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        domain: &str,
    ) -> Result<()>;
}

/// Accepts the chain when any of its certificates is valid for the domain.
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainVerifier;

impl PeerVerifier for DomainVerifier {
    fn verify(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        domain: &str,
    ) -> Result<()> {
        let mismatch = || Error::InvalidServerName {
            domain: domain.to_string(),
        };
        let name = ServerName::try_from(domain.to_string()).map_err(|_| mismatch())?;

        let valid = std::iter::once(end_entity)
            .chain(intermediates)
            .filter_map(|cert| ParsedCertificate::try_from(cert).ok())
            .any(|cert| rustls::client::verify_server_name(&cert, &name).is_ok());

        if valid { Ok(()) } else { Err(mismatch()) }
    }
}

/// Certificate chain and key a client presents to certificate-gated
/// resources.
#[derive(Debug)]
pub struct ClientIdentity {
    pub certs: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

impl ClientIdentity {
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self> {
        Ok(Self {
            certs: load_certs(cert_path)?,
            key: load_private_key(key_path)?,
        })
    }
}

pub fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Server configuration with optional client certificates.
pub fn server_config(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<Arc<ServerConfig>> {
    let provider = provider();
    let client_verifier = Arc::new(AnyClientCert {
        provider: provider.clone(),
    });

    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(certs, key)?;

    Ok(Arc::new(config))
}

pub fn server_config_from_pem(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>> {
    if !cert_path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Certificate file not found: {:?}", cert_path),
        )
        .into());
    }
    if !key_path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Private key file not found: {:?}", key_path),
        )
        .into());
    }

    server_config(load_certs(cert_path)?, load_private_key(key_path)?)
}

/// Client configuration that verifies peers with `verifier` only.
pub fn client_config(
    verifier: Arc<dyn PeerVerifier>,
    identity: Option<ClientIdentity>,
) -> Result<Arc<ClientConfig>> {
    let provider = provider();
    let server_verifier = Arc::new(PeerCertVerifier {
        verifier,
        provider: provider.clone(),
    });

    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(server_verifier);

    let config = match identity {
        Some(identity) => builder.with_client_auth_cert(identity.certs, identity.key)?,
        None => builder.with_no_client_auth(),
    };

    Ok(Arc::new(config))
}

pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    certs_from_reader(&mut BufReader::new(File::open(path)?))
}

pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    private_key_from_reader(&mut BufReader::new(File::open(path)?))
}

pub fn certs_from_pem(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    certs_from_reader(&mut io::Cursor::new(pem))
}

pub fn private_key_from_pem(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    private_key_from_reader(&mut io::Cursor::new(pem))
}

fn certs_from_reader(reader: &mut dyn BufRead) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(reader).collect::<io::Result<Vec<_>>>()?;
    if certs.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "no certificates found").into());
    }
    Ok(certs)
}

fn private_key_from_reader(reader: &mut dyn BufRead) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(reader)?
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no private key found").into())
}

#[derive(Debug)]
struct PeerCertVerifier {
    verifier: Arc<dyn PeerVerifier>,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for PeerCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let domain = match server_name {
            ServerName::DnsName(name) => name.as_ref().to_string(),
            ServerName::IpAddress(ip) => IpAddr::from(ip.clone()).to_string(),
            _ => return Err(rustls::Error::InvalidCertificate(CertificateError::NotValidForName)),
        };

        self.verifier
            .verify(end_entity, intermediates, &domain)
            .map_err(|e| {
                tracing::debug!(domain = %domain, error = %e, "peer verification failed");
                rustls::Error::InvalidCertificate(CertificateError::NotValidForName)
            })?;

        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

#[derive(Debug)]
struct AnyClientCert {
    provider: Arc<CryptoProvider>,
}

impl ClientCertVerifier for AnyClientCert {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        false
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CERT: &[u8] = include_bytes!("../tests/fixtures/cert.pem");
    const KEY: &[u8] = include_bytes!("../tests/fixtures/key.pem");

    #[test]
    fn domain_verifier_checks_names() {
        let certs = certs_from_pem(CERT).unwrap();

        assert!(DomainVerifier.verify(&certs[0], &[], "localhost").is_ok());
        assert!(DomainVerifier.verify(&certs[0], &[], "127.0.0.1").is_ok());
        assert!(matches!(
            DomainVerifier.verify(&certs[0], &[], "example.com"),
            Err(Error::InvalidServerName { .. })
        ));
    }

    #[test]
    fn builds_both_configs() {
        let certs = certs_from_pem(CERT).unwrap();
        let key = private_key_from_pem(KEY).unwrap();

        assert!(server_config(certs, key).is_ok());
        assert!(client_config(Arc::new(DomainVerifier), None).is_ok());
    }

    #[test]
    fn missing_pem_content_is_an_error() {
        assert!(certs_from_pem(b"").is_err());
        assert!(private_key_from_pem(b"").is_err());
    }
}
