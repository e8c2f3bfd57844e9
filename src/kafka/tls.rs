//! Mutual TLS for broker connections.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};
use rustls_pemfile::{certs, private_key};

use crate::error::Error;

/// Paths of the PEM files making up a client identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsFiles {
    pub ca: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

impl TlsFiles {
    /// `Ok(false)` when TLS is off, an argument error when only some files
    /// are given.
    pub fn is_enabled(&self) -> Result<bool, Error> {
        match (&self.ca, &self.cert, &self.key) {
            (None, None, None) => Ok(false),
            (Some(_), Some(_), Some(_)) => Ok(true),
            _ => Err(Error::Argument(
                "all of tlsca, tlscert and tlscertkey are required to enable TLS".to_string(),
            )),
        }
    }
}

/// Builds the rustls client configuration, `None` when TLS is off.
pub fn client_config(files: &TlsFiles) -> Result<Option<Arc<ClientConfig>>, Error> {
    let (ca, cert, key) = match (&files.ca, &files.cert, &files.key) {
        (Some(ca), Some(cert), Some(key)) => (ca, cert, key),
        _ => {
            files.is_enabled()?;
            return Ok(None);
        }
    };

    let mut roots = RootCertStore::empty();
    for ca_cert in load_certs(ca)? {
        roots
            .add(ca_cert)
            .map_err(|e| Error::Tls(format!("invalid CA certificate in {:?}: {}", ca, e)))?;
    }

    let chain = load_certs(cert)?;
    let key = load_private_key(key)?;
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(chain, key)
        .map_err(|e| Error::Tls(e.to_string()))?;

    info!("TLS enabled with ca={:?} cert={:?}", ca, cert);
    Ok(Some(Arc::new(config)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, Error> {
    let file = File::open(path).map_err(|e| Error::Tls(format!("failed to read {:?}: {}", path, e)))?;
    let mut reader = BufReader::new(file);

    let certs = certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("failed to parse certificates in {:?}: {}", path, e)))?;
    if certs.is_empty() {
        return Err(Error::Tls(format!("no certificates found in {:?}", path)));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, Error> {
    let file = File::open(path).map_err(|e| Error::Tls(format!("failed to read {:?}: {}", path, e)))?;
    let mut reader = BufReader::new(file);

    private_key(&mut reader)
        .map_err(|e| Error::Tls(format!("failed to parse private key in {:?}: {}", path, e)))?
        .ok_or_else(|| Error::Tls(format!("no private key found in {:?}", path)))
}
