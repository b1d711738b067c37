//! TLS helpers for Explicit and Implicit FTPS (RFC 4217).
//!
//! - Builds a [`tokio_rustls::TlsConnector`] from the platform's native
//!   trust store, optionally disabling certificate/hostname verification
//!   for self-signed servers.
//! - Provides `upgrade_to_tls` for wrapping an existing plain codec after
//!   a successful `AUTH TLS`.
//! - Classifies handshake/IO failures into `can-retry` / `do-not-retry` /
//!   `unverified-cert`, per §4.2, so the worker can decide whether to
//!   retry.

use crate::ftp::error::{FtpError, FtpErrorKind, FtpResult};
use crate::ftp::protocol::{FtpCodec, ReadHalf, WriteHalf};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::{client::TlsStream, TlsConnector};

/// A verifier that accepts any certificate chain. Used only when the
/// caller explicitly opts into `accept_invalid_certs` for a self-signed
/// or otherwise untrusted server.
#[derive(Debug)]
struct NoVerify;

impl ServerCertVerifier for NoVerify {
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
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        // Accept whatever the server offers; we never check signatures.
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

/// Build a `TlsConnector` according to our configuration.
pub fn build_tls_connector(accept_invalid_certs: bool) -> FtpResult<TlsConnector> {
    let config = if accept_invalid_certs {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerify))
            .with_no_client_auth()
    } else {
        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for cert in native.certs {
            let _ = roots.add(cert);
        }
        if roots.is_empty() {
            return Err(FtpError::tls_failed("No trusted root certificates found"));
        }
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    };
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Upgrade an existing **plain** control connection to TLS.
///
/// Called after successful `AUTH TLS` + 234 reply.
/// Consumes the plain codec, performs the TLS handshake, returns a new codec.
pub async fn upgrade_to_tls(
    codec: FtpCodec,
    host: &str,
    accept_invalid_certs: bool,
) -> FtpResult<FtpCodec> {
    // Re-assemble the owned TcpStream from the split halves.
    let tcp = reunite_plain(codec)?;

    let connector = build_tls_connector(accept_invalid_certs)?;
    let server_name = server_name(host)?;
    let tls = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| classify_tls_error("Explicit TLS handshake", e))?;

    Ok(FtpCodec::from_tls(tls))
}

/// Reunite the read + write halves back into a `TcpStream`.
/// Only works when both halves are `Plain`.
fn reunite_plain(codec: FtpCodec) -> FtpResult<TcpStream> {
    let rd = match codec.reader {
        ReadHalf::Plain(br) => br.into_inner(),
        ReadHalf::Tls(_) => {
            return Err(FtpError::protocol_error(
                "Cannot upgrade: connection is already TLS",
            ))
        }
    };
    let wr = match codec.writer {
        WriteHalf::Plain(w) => w,
        WriteHalf::Tls(_) => {
            return Err(FtpError::protocol_error(
                "Cannot upgrade: connection is already TLS",
            ))
        }
    };
    rd.reunite(wr)
        .map_err(|e| FtpError::protocol_error(format!("Reunite failed: {}", e)))
}

/// Create a TLS-wrapped data channel for FTPS (PROT P).
pub async fn wrap_data_stream(
    tcp: TcpStream,
    host: &str,
    accept_invalid_certs: bool,
) -> FtpResult<TlsStream<TcpStream>> {
    let connector = build_tls_connector(accept_invalid_certs)?;
    let server_name = server_name(host)?;
    connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| classify_tls_error("Data channel TLS", e))
}

fn server_name(host: &str) -> FtpResult<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|_| FtpError::tls_failed(format!("Invalid server name: {}", host)))
}

/// Classify a TLS/IO failure per §4.2: `can-retry`, `do-not-retry`, or
/// `unverified-cert`. Transient I/O failures during the handshake
/// (connection reset, broken pipe) are retryable; a rejected certificate
/// is not, unless the caller is willing to override it.
fn classify_tls_error(context: &str, e: std::io::Error) -> FtpError {
    let msg = format!("{}: {}", context, e);
    let kind = match e.kind() {
        std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::TimedOut => {
            FtpErrorKind::TlsCanRetry
        }
        std::io::ErrorKind::InvalidData => {
            if msg.to_lowercase().contains("certificate") {
                FtpErrorKind::UnverifiedCert
            } else {
                FtpErrorKind::TlsDoNotRetry
            }
        }
        _ => FtpErrorKind::TlsDoNotRetry,
    };
    FtpError::new(kind, msg)
}
