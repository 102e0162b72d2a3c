//! rustls client configuration from [`SslOptions`].

use std::fs;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;

use crate::config::SslOptions;
use crate::error::{MariaError, MariaResult};

pub fn connector(ssl: &SslOptions) -> MariaResult<TlsConnector> {
    Ok(TlsConnector::from(Arc::new(client_config(ssl)?)))
}

pub fn server_name(host: &str) -> MariaResult<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|_| MariaError::Config(format!("invalid TLS server name '{}'", host)))
}

pub fn client_config(ssl: &SslOptions) -> MariaResult<ClientConfig> {
    ssl.validate()?;
    if let Some(cipher) = &ssl.cipher {
        tracing::warn!(cipher = %cipher, "ssl cipher list ignored, rustls picks cipher suites");
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?;

    let builder = if ssl.verifies() {
        builder.with_root_certificates(root_store(ssl)?)
    } else {
        // MariaDB clients do not verify the server by default.
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertVerifier::new(&provider)))
    };

    let config = match (&ssl.certificate, &ssl.key) {
        (Some(cert), Some(key)) => builder.with_client_auth_cert(load_certs(cert)?, load_key(key)?)?,
        _ => builder.with_no_client_auth(),
    };
    Ok(config)
}

fn root_store(ssl: &SslOptions) -> MariaResult<RootCertStore> {
    let mut roots = RootCertStore::empty();

    if let Some(ca) = &ssl.ca {
        for cert in load_certs(ca)? {
            roots.add(cert)?;
        }
    }

    if let Some(dir) = &ssl.ca_path {
        let entries = fs::read_dir(dir)
            .map_err(|e| MariaError::Config(format!("cannot read {}: {}", dir.display(), e)))?;
        for entry in entries {
            let path = entry?.path();
            let is_pem = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("pem") | Some("crt")
            );
            if is_pem {
                let (added, ignored) = roots.add_parsable_certificates(load_certs(&path)?);
                tracing::debug!(path = %path.display(), added, ignored, "loaded CA certificates");
            }
        }
    }

    if roots.is_empty() {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    Ok(roots)
}

fn load_certs(path: &Path) -> MariaResult<Vec<CertificateDer<'static>>> {
    let pem = fs::read(path)
        .map_err(|e| MariaError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(pem.as_slice()))
        .filter_map(|c| c.ok())
        .collect();
    if certs.is_empty() {
        return Err(MariaError::Config(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> MariaResult<PrivateKeyDer<'static>> {
    let pem = fs::read(path)
        .map_err(|e| MariaError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    rustls_pemfile::private_key(&mut BufReader::new(pem.as_slice()))?
        .ok_or_else(|| MariaError::Config(format!("no private key found in {}", path.display())))
}

/// Accepts any server certificate but still checks handshake signatures.
#[derive(Debug)]
struct NoCertVerifier {
    algorithms: WebPkiSupportedAlgorithms,
}

impl NoCertVerifier {
    fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for NoCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
