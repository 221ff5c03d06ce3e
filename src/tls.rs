use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pgwire::tokio::tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use pgwire::tokio::tokio_rustls::rustls::ServerConfig;
use pgwire::tokio::TlsAcceptor;
use tracing::info;

/// PEM certificate chain and private key for the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl TlsFiles {
    /// TLS is on only when both paths are configured. One without the other
    /// is a startup error.
    pub fn from_pair(cert: Option<&str>, key: Option<&str>) -> io::Result<Option<Self>> {
        match (cert, key) {
            (None, None) => Ok(None),
            (Some(cert), Some(key)) => Ok(Some(Self {
                cert: PathBuf::from(cert),
                key: PathBuf::from(key),
            })),
            _ => Err(io::Error::new(
                ErrorKind::InvalidInput,
                "both CAFEBOOK_TLS_CERT and CAFEBOOK_TLS_KEY must be set, or neither",
            )),
        }
    }

    pub fn acceptor(&self) -> io::Result<TlsAcceptor> {
        let certs = read_cert_chain(&self.cert)?;
        let key = read_private_key(&self.key)?;

        let mut config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
        config.alpn_protocols = vec![b"postgresql".to_vec()];

        info!("tls certificate loaded from {}", self.cert.display());
        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

fn open_pem(path: &Path) -> io::Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| io::Error::new(e.kind(), format!("{}: {e}", path.display())))
}

fn read_cert_chain(path: &Path) -> io::Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut open_pem(path)?).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("no certificates found in {}", path.display()),
        ));
    }
    Ok(certs)
}

fn read_private_key(path: &Path) -> io::Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut open_pem(path)?)?.ok_or_else(|| {
        io::Error::new(
            ErrorKind::InvalidInput,
            format!("no private key found in {}", path.display()),
        )
    })
}
