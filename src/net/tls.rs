//! TLS policy and certificate loading.
//!
//! # Responsibilities
//! - Decide whether TLS is enabled for a start request
//! - Decide whether clients must present a certificate
//! - Turn key store / trust store files into a rustls `ServerConfig`
//!
//! # Design Decisions
//! - Key store = PEM bundle with certificate chain and private key
//! - Trust store = PEM file with the CA certificates clients must chain to
//! - Files are only read when the engine starts; there is no pre-validation

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use serde::Serialize;
use thiserror::Error;

/// Error type for TLS material loading.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificate found in key store {0}")]
    NoCertificate(String),

    #[error("no private key found in key store {0}")]
    NoPrivateKey(String),

    #[error("no CA certificate found in trust store {0}")]
    EmptyTrustStore(String),

    #[error("client certificate verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),

    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

/// Key material supplied by the caller of a start.
///
/// Empty strings mean "not supplied".
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TlsMaterial {
    pub key_store_path: String,
    pub key_store_password: String,
    pub trust_store_path: String,
    pub trust_store_password: String,
}

impl TlsMaterial {
    pub fn new(key_store_path: impl Into<String>, key_store_password: impl Into<String>) -> Self {
        Self {
            key_store_path: key_store_path.into(),
            key_store_password: key_store_password.into(),
            ..Self::default()
        }
    }

    pub fn with_trust_store(
        mut self,
        trust_store_path: impl Into<String>,
        trust_store_password: impl Into<String>,
    ) -> Self {
        self.trust_store_path = trust_store_path.into();
        self.trust_store_password = trust_store_password.into();
        self
    }
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("key_store_path", &self.key_store_path)
            .field("key_store_password", &"<redacted>")
            .field("trust_store_path", &self.trust_store_path)
            .field("trust_store_password", &"<redacted>")
            .finish()
    }
}

/// Client certificate requirement on the TLS connector.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ClientAuth {
    None,
    Required {
        trust_store_path: String,
        #[serde(skip)]
        trust_store_password: String,
    },
}

impl fmt::Debug for ClientAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientAuth::None => f.write_str("None"),
            ClientAuth::Required { trust_store_path, .. } => f
                .debug_struct("Required")
                .field("trust_store_path", trust_store_path)
                .finish_non_exhaustive(),
        }
    }
}

/// TLS parameters attached to an HTTPS connector.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct TlsSettings {
    pub key_store_path: String,
    #[serde(skip)]
    pub key_store_password: String,
    pub client_auth: ClientAuth,
}

impl TlsSettings {
    pub fn requires_client_auth(&self) -> bool {
        matches!(self.client_auth, ClientAuth::Required { .. })
    }
}

impl fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSettings")
            .field("key_store_path", &self.key_store_path)
            .field("client_auth", &self.client_auth)
            .finish_non_exhaustive()
    }
}

/// Outcome of the TLS policy for one start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsPolicy {
    /// Plaintext only.
    Disabled,
    /// A TLS connector is built with these settings.
    Enabled(TlsSettings),
}

impl TlsPolicy {
    /// TLS is enabled iff key store path and password are both non-blank.
    /// Client certificates are required iff the trust store path and password
    /// are both non-empty as well.
    pub fn evaluate(material: &TlsMaterial) -> Self {
        if is_blank(&material.key_store_path) || is_blank(&material.key_store_password) {
            return TlsPolicy::Disabled;
        }

        let client_auth =
            if material.trust_store_path.is_empty() || material.trust_store_password.is_empty() {
                ClientAuth::None
            } else {
                ClientAuth::Required {
                    trust_store_path: material.trust_store_path.clone(),
                    trust_store_password: material.trust_store_password.clone(),
                }
            };

        TlsPolicy::Enabled(TlsSettings {
            key_store_path: material.key_store_path.clone(),
            key_store_password: material.key_store_password.clone(),
            client_auth,
        })
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, TlsPolicy::Enabled(_))
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Build the rustls server configuration for a TLS connector.
pub fn load_server_config(settings: &TlsSettings) -> Result<ServerConfig, TlsError> {
    let (certs, key) = read_key_store(Path::new(&settings.key_store_path))?;

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let builder = ServerConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?;

    let builder = match &settings.client_auth {
        ClientAuth::None => builder.with_no_client_auth(),
        ClientAuth::Required { trust_store_path, .. } => {
            let roots = read_trust_store(Path::new(trust_store_path))?;
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()?;
            builder.with_client_cert_verifier(verifier)
        }
    };

    let mut config = builder.with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    tracing::debug!(
        key_store = %settings.key_store_path,
        client_auth = settings.requires_client_auth(),
        "TLS configuration loaded"
    );
    Ok(config)
}

fn read_pem(path: &Path) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|source| TlsError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn read_key_store(
    path: &Path,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), TlsError> {
    let pem = read_pem(path)?;
    let io_err = |source| TlsError::Io {
        path: path.display().to_string(),
        source,
    };

    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificate(path.display().to_string()));
    }

    let key = rustls_pemfile::private_key(&mut pem.as_slice())
        .map_err(io_err)?
        .ok_or_else(|| TlsError::NoPrivateKey(path.display().to_string()))?;

    Ok((certs, key))
}

fn read_trust_store(path: &Path) -> Result<RootCertStore, TlsError> {
    let pem = read_pem(path)?;
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
        let cert = cert.map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        roots.add(cert)?;
    }

    if roots.is_empty() {
        return Err(TlsError::EmptyTrustStore(path.display().to_string()));
    }
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_key_store() -> (tempfile::NamedTempFile, tempfile::NamedTempFile) {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();

        let mut key_store = tempfile::NamedTempFile::new().unwrap();
        write!(
            key_store,
            "{}{}",
            certified.cert.pem(),
            certified.key_pair.serialize_pem()
        )
        .unwrap();

        let mut trust_store = tempfile::NamedTempFile::new().unwrap();
        write!(trust_store, "{}", certified.cert.pem()).unwrap();

        (key_store, trust_store)
    }

    #[test]
    fn test_blank_material_disables_tls() {
        assert_eq!(TlsPolicy::evaluate(&TlsMaterial::default()), TlsPolicy::Disabled);
        assert_eq!(TlsPolicy::evaluate(&TlsMaterial::new("ks.pem", "   ")), TlsPolicy::Disabled);
        assert_eq!(TlsPolicy::evaluate(&TlsMaterial::new(" ", "secret")), TlsPolicy::Disabled);
    }

    #[test]
    fn test_trust_store_requires_client_auth() {
        let material = TlsMaterial::new("ks.pem", "secret").with_trust_store("ts.pem", "changeit");
        match TlsPolicy::evaluate(&material) {
            TlsPolicy::Enabled(settings) => assert!(settings.requires_client_auth()),
            TlsPolicy::Disabled => panic!("TLS should be enabled"),
        }
    }

    #[test]
    fn test_partial_trust_store_is_ignored() {
        let material = TlsMaterial::new("ks.pem", "secret").with_trust_store("ts.pem", "");
        match TlsPolicy::evaluate(&material) {
            TlsPolicy::Enabled(settings) => assert!(!settings.requires_client_auth()),
            TlsPolicy::Disabled => panic!("TLS should be enabled"),
        }
    }

    #[test]
    fn test_whitespace_trust_store_counts_as_present() {
        // Trust store fields use an emptiness check, not a blank check.
        let material = TlsMaterial::new("ks.pem", "secret").with_trust_store(" ", " ");
        match TlsPolicy::evaluate(&material) {
            TlsPolicy::Enabled(settings) => assert!(settings.requires_client_auth()),
            TlsPolicy::Disabled => panic!("TLS should be enabled"),
        }
    }

    #[test]
    fn test_debug_redacts_passwords() {
        let material = TlsMaterial::new("ks.pem", "hunter2").with_trust_store("ts.pem", "hunter3");
        let printed = format!("{material:?}");
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("hunter3"));
    }

    #[test]
    fn test_load_server_config() {
        let (key_store, trust_store) = write_key_store();
        let material = TlsMaterial::new(key_store.path().to_str().unwrap(), "secret")
            .with_trust_store(trust_store.path().to_str().unwrap(), "secret");

        let TlsPolicy::Enabled(settings) = TlsPolicy::evaluate(&material) else {
            panic!("TLS should be enabled");
        };
        let config = load_server_config(&settings).unwrap();
        assert_eq!(config.alpn_protocols.len(), 2);
    }

    #[test]
    fn test_missing_key_store() {
        let TlsPolicy::Enabled(settings) =
            TlsPolicy::evaluate(&TlsMaterial::new("/no/such/keystore.pem", "secret"))
        else {
            panic!("TLS should be enabled");
        };
        assert!(matches!(load_server_config(&settings), Err(TlsError::Io { .. })));
    }

    #[test]
    fn test_key_store_without_key() {
        let (_, trust_store) = write_key_store();
        let TlsPolicy::Enabled(settings) =
            TlsPolicy::evaluate(&TlsMaterial::new(trust_store.path().to_str().unwrap(), "secret"))
        else {
            panic!("TLS should be enabled");
        };
        assert!(matches!(load_server_config(&settings), Err(TlsError::NoPrivateKey(_))));
    }
}
