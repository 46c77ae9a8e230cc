//! TLS trust-policy resolution.
//!
//! A session configures exactly one of three trust mechanisms: an allowlist
//! of certificate fingerprints, a PEM trust store, or explicit insecure
//! mode. The resolved policy is a plain `rustls::ClientConfig` handed to the
//! transport at session creation; no global state is involved.

use crate::config::TlsOptions;
use crate::error::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::verify_server_name;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::ParsedCertificate;
use rustls::{CertificateError, RootCertStore};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::sync::Arc;
use tracing::debug;

/// Build the client TLS configuration for the session.
///
/// At least one trust mechanism is mandatory; resolution order is
/// fingerprints, then trust store, then insecure mode.
pub(crate) fn build_client_config(opts: &TlsOptions) -> Result<rustls::ClientConfig> {
    let builder = rustls::ClientConfig::builder();

    if let Some(fingerprints) = &opts.accepted_certificate_fingerprints {
        let accepted = parse_fingerprint_list(fingerprints)?;
        debug!(count = accepted.len(), "using certificate fingerprint trust");
        let verifier = FingerprintVerifier {
            accepted,
            verify_hostname: opts.verify_hostname(),
        };
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth());
    }

    if let Some(path) = &opts.trust_store_path {
        if opts.trust_store_password.is_none() {
            return Err(Error::Config(
                "trust store password is required with a trust store path".into(),
            ));
        }
        let roots = load_trust_store(path)?;
        debug!(%path, roots = roots.len(), "using trust-store chain validation");
        let verifier = rustls::client::WebPkiServerVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| Error::Tls(format!("cannot build trust-store verifier: {e}")))?;
        if opts.verify_hostname() {
            return Ok(builder
                .dangerous()
                .with_custom_certificate_verifier(verifier)
                .with_no_client_auth());
        }
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoHostnameVerification { inner: verifier }))
            .with_no_client_auth());
    }

    if opts.insecure_mode {
        debug!("insecure mode: accepting every certificate");
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
            .with_no_client_auth());
    }

    Err(Error::Config(
        "cannot find TLS trust material, use a trust store, certificate fingerprints, \
         or set insecure mode"
            .into(),
    ))
}

/// Load a PEM bundle of CA certificates into a root store.
fn load_trust_store(path: &str) -> Result<RootCertStore> {
    let pem = std::fs::read(path)
        .map_err(|e| Error::Tls(format!("failed to read trust store {path}: {e}")))?;
    let mut reader = std::io::BufReader::new(pem.as_slice());
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("failed to parse trust store {path}: {e}")))?;

    let mut roots = RootCertStore::empty();
    for cert in certs {
        roots
            .add(cert)
            .map_err(|e| Error::Tls(format!("rejected trust-store certificate: {e}")))?;
    }
    if roots.is_empty() {
        return Err(Error::Tls(format!("no CA certificates found in {path}")));
    }
    Ok(roots)
}

/// Digest algorithms accepted in fingerprint specifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FingerprintAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl FingerprintAlgorithm {
    fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().replace('-', "").as_str() {
            "SHA1" => Ok(Self::Sha1),
            "SHA256" => Ok(Self::Sha256),
            "SHA384" => Ok(Self::Sha384),
            "SHA512" => Ok(Self::Sha512),
            _ => Err(Error::Config(format!(
                "unknown fingerprint algorithm: {name}"
            ))),
        }
    }

    fn digest(&self, der: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(der).to_vec(),
            Self::Sha256 => Sha256::digest(der).to_vec(),
            Self::Sha384 => Sha384::digest(der).to_vec(),
            Self::Sha512 => Sha512::digest(der).to_vec(),
        }
    }
}

/// One accepted certificate fingerprint: `algorithm:hex-bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Fingerprint {
    algorithm: FingerprintAlgorithm,
    bytes: Vec<u8>,
}

impl Fingerprint {
    fn parse(text: &str) -> Result<Self> {
        let mut parts = text.trim().split(':');
        let name = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::Config(format!("malformed fingerprint: {text}")))?;
        let algorithm = FingerprintAlgorithm::parse(name)?;
        let bytes = parts
            .map(|p| u8::from_str_radix(p, 16))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::Config(format!("malformed fingerprint: {text}")))?;
        if bytes.is_empty() {
            return Err(Error::Config(format!("malformed fingerprint: {text}")));
        }
        Ok(Self { algorithm, bytes })
    }

    fn matches(&self, der: &[u8]) -> bool {
        self.algorithm.digest(der) == self.bytes
    }
}

pub(crate) fn parse_fingerprint_list(list: &str) -> Result<Vec<Fingerprint>> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(Fingerprint::parse)
        .collect()
}

/// Accepts a presented chain only if the leaf certificate is currently valid
/// and its digest matches one of the configured fingerprints.
#[derive(Debug)]
struct FingerprintVerifier {
    accepted: Vec<Fingerprint>,
    verify_hostname: bool,
}

impl FingerprintVerifier {
    fn check_validity(der: &[u8], now: UnixTime) -> std::result::Result<(), rustls::Error> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|_| rustls::Error::InvalidCertificate(CertificateError::BadEncoding))?;
        let at = x509_parser::time::ASN1Time::from_timestamp(now.as_secs() as i64)
            .map_err(|_| rustls::Error::InvalidCertificate(CertificateError::BadEncoding))?;
        let validity = cert.validity();
        if at < validity.not_before {
            return Err(rustls::Error::InvalidCertificate(
                CertificateError::NotValidYet,
            ));
        }
        if at > validity.not_after {
            return Err(rustls::Error::InvalidCertificate(CertificateError::Expired));
        }
        Ok(())
    }
}

impl ServerCertVerifier for FingerprintVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        // An expired certificate is rejected even when its digest matches.
        Self::check_validity(end_entity.as_ref(), now)?;

        if !self.accepted.iter().any(|f| f.matches(end_entity.as_ref())) {
            return Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ));
        }

        if self.verify_hostname {
            let parsed = ParsedCertificate::try_from(end_entity)?;
            verify_server_name(&parsed, server_name)?;
        }

        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        supported_schemes()
    }
}

/// Delegates chain validation to the webpki verifier but tolerates a
/// hostname mismatch.
#[derive(Debug)]
struct NoHostnameVerification {
    inner: Arc<rustls::client::WebPkiServerVerifier>,
}

impl ServerCertVerifier for NoHostnameVerification {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Ok(verified) => Ok(verified),
            Err(rustls::Error::InvalidCertificate(CertificateError::NotValidForName)) => {
                Ok(ServerCertVerified::assertion())
            }
            Err(rustls::Error::InvalidCertificate(
                CertificateError::NotValidForNameContext { .. },
            )) => Ok(ServerCertVerified::assertion()),
            Err(e) => Err(e),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Certificate verifier that accepts any certificate (insecure mode).
#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        supported_schemes()
    }
}

fn supported_schemes() -> Vec<rustls::SignatureScheme> {
    vec![
        rustls::SignatureScheme::RSA_PKCS1_SHA256,
        rustls::SignatureScheme::RSA_PKCS1_SHA384,
        rustls::SignatureScheme::RSA_PKCS1_SHA512,
        rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
        rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
        rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
        rustls::SignatureScheme::RSA_PSS_SHA256,
        rustls::SignatureScheme::RSA_PSS_SHA384,
        rustls::SignatureScheme::RSA_PSS_SHA512,
        rustls::SignatureScheme::ED25519,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, KeyPair};

    fn self_signed(expiry_year: i32) -> CertificateDer<'static> {
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        params.not_before = rcgen::date_time_ymd(2020, 1, 1);
        params.not_after = rcgen::date_time_ymd(expiry_year, 1, 1);
        let key_pair = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key_pair).unwrap();
        cert.der().clone()
    }

    fn hex_fingerprint(der: &[u8]) -> String {
        let digest = Sha256::digest(der);
        let hex: Vec<String> = digest.iter().map(|b| format!("{b:02X}")).collect();
        format!("SHA-256:{}", hex.join(":"))
    }

    fn verify(
        verifier: &FingerprintVerifier,
        cert: &CertificateDer<'static>,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let name = ServerName::try_from("localhost").unwrap();
        verifier.verify_server_cert(cert, &[], &name, &[], UnixTime::now())
    }

    #[test]
    fn parses_fingerprint_list() {
        let list = parse_fingerprint_list("SHA-256:AB:0f:11,sha1:01:02").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].bytes, vec![0xAB, 0x0F, 0x11]);
        assert_eq!(list[0].algorithm, FingerprintAlgorithm::Sha256);
        assert_eq!(list[1].algorithm, FingerprintAlgorithm::Sha1);
    }

    #[test]
    fn unknown_algorithm_is_config_error() {
        let err = parse_fingerprint_list("MD42:AB:CD").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn matching_fingerprint_is_accepted() {
        let cert = self_signed(2099);
        let verifier = FingerprintVerifier {
            accepted: parse_fingerprint_list(&hex_fingerprint(cert.as_ref())).unwrap(),
            verify_hostname: false,
        };
        assert!(verify(&verifier, &cert).is_ok());
    }

    #[test]
    fn non_matching_certificate_is_rejected() {
        let pinned = self_signed(2099);
        let other = self_signed(2099);
        let verifier = FingerprintVerifier {
            accepted: parse_fingerprint_list(&hex_fingerprint(pinned.as_ref())).unwrap(),
            verify_hostname: false,
        };
        let err = verify(&verifier, &other).unwrap_err();
        assert_eq!(
            err,
            rustls::Error::InvalidCertificate(CertificateError::ApplicationVerificationFailure)
        );
    }

    #[test]
    fn expired_certificate_is_rejected_despite_matching_fingerprint() {
        let cert = self_signed(2021);
        let verifier = FingerprintVerifier {
            accepted: parse_fingerprint_list(&hex_fingerprint(cert.as_ref())).unwrap(),
            verify_hostname: false,
        };
        let err = verify(&verifier, &cert).unwrap_err();
        assert_eq!(
            err,
            rustls::Error::InvalidCertificate(CertificateError::Expired)
        );
    }

    #[test]
    fn missing_trust_material_fails_resolution() {
        let err = build_client_config(&TlsOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn trust_store_path_requires_password() {
        let opts = TlsOptions {
            trust_store_path: Some("/nonexistent/ca.pem".into()),
            ..Default::default()
        };
        let err = build_client_config(&opts).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn insecure_mode_accepts_any_certificate() {
        let cert = self_signed(2099);
        let name = ServerName::try_from("not-the-real-host").unwrap();
        let result =
            AcceptAnyCertificate.verify_server_cert(&cert, &[], &name, &[], UnixTime::now());
        assert!(result.is_ok());
    }
}
