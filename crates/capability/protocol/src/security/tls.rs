//! 服务端 TLS
//!
//! 启动时从 PEM 文件加载证书链与私钥；未配置私钥路径时从证书文件中读取私钥。

use crate::error::ProtocolError;
use crate::settings::TlsSettings;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::{
    self,
    pki_types::{CertificateDer, PrivateKeyDer},
};

/// 按配置构造 TLS 接受器。
pub fn load_acceptor(settings: &TlsSettings) -> Result<TlsAcceptor, ProtocolError> {
    let cert_path = settings
        .certificate_path
        .as_deref()
        .ok_or_else(|| ProtocolError::Tls("certificate path not configured".to_string()))?;
    let key_path = settings.private_key_path.as_deref().unwrap_or(cert_path);

    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ProtocolError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ProtocolError::Tls(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn open(path: &Path) -> Result<BufReader<File>, ProtocolError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| ProtocolError::Tls(format!("open {}: {e}", path.display())))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ProtocolError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ProtocolError::Tls(format!("read certificates {}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(ProtocolError::Tls(format!(
            "no certificate found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ProtocolError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ProtocolError::Tls(format!("read private key {}: {e}", path.display())))?
        .ok_or_else(|| ProtocolError::Tls(format!("no private key found in {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_certificate_path() {
        let settings = TlsSettings {
            enabled: true,
            ..TlsSettings::default()
        };
        assert!(matches!(
            load_acceptor(&settings),
            Err(ProtocolError::Tls(msg)) if msg.contains("not configured")
        ));
    }

    #[test]
    fn test_unreadable_certificate_file() {
        let settings = TlsSettings {
            enabled: true,
            certificate_path: Some(PathBuf::from("/nonexistent/udo/server.pem")),
            ..TlsSettings::default()
        };
        assert!(matches!(
            load_acceptor(&settings),
            Err(ProtocolError::Tls(msg)) if msg.starts_with("open")
        ));
    }

    #[test]
    fn test_file_without_pem_blocks() {
        let path = std::env::temp_dir().join(format!("udo-empty-{}.pem", std::process::id()));
        std::fs::write(&path, "not a certificate\n").unwrap();
        let settings = TlsSettings {
            enabled: true,
            certificate_path: Some(path.clone()),
            ..TlsSettings::default()
        };
        let result = load_acceptor(&settings);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(
            result,
            Err(ProtocolError::Tls(msg)) if msg.contains("no certificate")
        ));
    }
}
