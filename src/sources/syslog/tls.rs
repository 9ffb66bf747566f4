//! TLS acceptor built from PEM files (server cert/key, optional client CAs).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow, ensure};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{RootCertStore, ServerConfig, crypto};

use super::config::TlsConf;
use crate::types::AnyResult;

pub fn build_acceptor(conf: &TlsConf) -> AnyResult<TlsAcceptor> {
    let certs = load_certs(&conf.cert)?;
    let key = load_key(&conf.key)?;
    let provider = Arc::new(crypto::ring::default_provider());
    let builder = ServerConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .context("tls protocol setup failed")?;

    let builder = if conf.allowed_cacerts.is_empty() {
        builder.with_no_client_auth()
    } else {
        let mut roots = RootCertStore::empty();
        for path in &conf.allowed_cacerts {
            for cert in load_certs(path)? {
                roots
                    .add(cert)
                    .with_context(|| format!("invalid CA certificate in {}", path.display()))?;
            }
        }
        let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .context("client certificate verifier setup failed")?;
        builder.with_client_cert_verifier(verifier)
    };

    let config = builder
        .with_single_cert(certs, key)
        .context("tls certificate and key do not match")?;
    info_ctrl!(
        "syslog tls enabled cert={} mtls={}",
        conf.cert.display(),
        !conf.allowed_cacerts.is_empty()
    );
    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &Path) -> AnyResult<Vec<CertificateDer<'static>>> {
    let file =
        File::open(path).with_context(|| format!("open certificate {}", path.display()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("read certificate {}", path.display()))?;
    ensure!(!certs.is_empty(), "no certificate found in {}", path.display());
    Ok(certs)
}

fn load_key(path: &Path) -> AnyResult<PrivateKeyDer<'static>> {
    let file = File::open(path).with_context(|| format!("open private key {}", path.display()))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .with_context(|| format!("read private key {}", path.display()))?
        .ok_or_else(|| anyhow!("no private key found in {}", path.display()))
}

#[cfg(test)]
pub(crate) mod test_pki {
    //! Throwaway CA, server and client certificates written as PEM files.

    use std::path::PathBuf;

    use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair};
    use tempfile::TempDir;

    pub struct TestPki {
        pub dir: TempDir,
        pub ca_pem: String,
        pub ca_path: PathBuf,
        pub server_cert: PathBuf,
        pub server_key: PathBuf,
        pub client_cert_pem: String,
        pub client_key_pem: String,
    }

    fn leaf(name: &str, ca: &Certificate, ca_key: &KeyPair) -> (String, String) {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, name);
        let cert = params.signed_by(&key, ca, ca_key).unwrap();
        (cert.pem(), key.serialize_pem())
    }

    pub fn generate() -> TestPki {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "wp syslog test ca");
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let (server_pem, server_key_pem) = leaf("localhost", &ca, &ca_key);
        let (client_cert_pem, client_key_pem) = leaf("client.localhost", &ca, &ca_key);

        let dir = tempfile::tempdir().unwrap();
        let ca_path = dir.path().join("ca.pem");
        let server_cert = dir.path().join("server.pem");
        let server_key = dir.path().join("server.key");
        std::fs::write(&ca_path, ca.pem()).unwrap();
        std::fs::write(&server_cert, server_pem).unwrap();
        std::fs::write(&server_key, server_key_pem).unwrap();

        TestPki {
            dir,
            ca_pem: ca.pem(),
            ca_path,
            server_cert,
            server_key,
            client_cert_pem,
            client_key_pem,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_acceptor_from_pem_files() {
        let pki = test_pki::generate();
        let conf = TlsConf {
            cert: pki.server_cert.clone(),
            key: pki.server_key.clone(),
            allowed_cacerts: vec![],
        };
        assert!(build_acceptor(&conf).is_ok());

        let mtls = TlsConf {
            allowed_cacerts: vec![pki.ca_path.clone()],
            ..conf
        };
        assert!(build_acceptor(&mtls).is_ok());
    }

    #[test]
    fn missing_or_swapped_files_fail() {
        let pki = test_pki::generate();
        let missing = TlsConf {
            cert: pki.dir.path().join("nope.pem"),
            key: pki.server_key.clone(),
            allowed_cacerts: vec![],
        };
        assert!(build_acceptor(&missing).is_err());

        // 证书文件里没有私钥
        let swapped = TlsConf {
            cert: pki.server_cert.clone(),
            key: pki.server_cert.clone(),
            allowed_cacerts: vec![],
        };
        let Err(err) = build_acceptor(&swapped) else {
            panic!("a certificate file is not a private key");
        };
        assert!(err.to_string().contains("no private key"));
    }
}
