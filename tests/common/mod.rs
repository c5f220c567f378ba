#![allow(dead_code)]

use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use friedman_agent::rpc::{self, PlayingFieldServer};
use friedman_agent::tls::{self, TlsMaterial};
use friedman_agent::wire::{StrategyInfo, SubscribeResponse};
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose,
};
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::ClientTlsConfig;
use tonic::{Code, Status};
use tracing::Level;
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, Layer, Registry};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_debug_logger() {
    let format = fmt::format()
        .without_time()
        .with_ansi(true)
        .with_level(true)
        .with_thread_names(true)
        .with_target(false);

    let reg = Registry::default().with(
        fmt::layer()
            .event_format(format)
            .with_test_writer()
            .with_filter(LevelFilter::from_level(Level::DEBUG)),
    );

    let _ = tracing::subscriber::set_global_default(reg);
}

/// A CA and a `localhost` leaf signed by it, written as `<prefix>.crt` (leaf then CA) and
/// `<prefix>.key`.
pub struct Certificates {
    _dir: TempDir,
    prefix: PathBuf,
}

impl Certificates {
    pub fn generate() -> Self {
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "Playing Field Test CA");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::CrlSign,
        ];
        let ca_key = KeyPair::generate().unwrap();
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let mut params =
            CertificateParams::new(vec!["localhost".to_owned(), "127.0.0.1".to_owned()]).unwrap();
        params
            .distinguished_name
            .push(DnType::CommonName, "localhost");
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &ca, &ca_key).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("service");
        fs::write(
            prefix.with_extension("crt"),
            format!("{}{}", cert.pem(), ca.pem()),
        )
        .unwrap();
        fs::write(prefix.with_extension("key"), key.serialize_pem()).unwrap();

        Certificates { _dir: dir, prefix }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn certificate_file(&self) -> PathBuf {
        self.prefix.with_extension("crt")
    }

    pub fn key_file(&self) -> PathBuf {
        self.prefix.with_extension("key")
    }

    /// The `CERTIFICATE_SETTINGS` value pointing at these files.
    pub fn settings(&self) -> String {
        serde_json::json!({ "path": self.prefix }).to_string()
    }

    /// Client settings for dialing `localhost` with these certificates as roots.
    pub fn client_tls(&self) -> ClientTlsConfig {
        tls::client_tls_from_file(&self.certificate_file(), "localhost").unwrap()
    }
}

struct Recorder {
    reply: Result<SubscribeResponse, Status>,
    subscribed: Sender<StrategyInfo>,
}

impl rpc::PlayingField for Recorder {
    fn subscribe(&self, info: StrategyInfo) -> Result<SubscribeResponse, Status> {
        let _ = self.subscribed.send(info);
        self.reply.clone()
    }
}

/// A playing field answering every `Subscribe` with a canned reply, served on its own
/// thread until dropped.
pub struct PlayingField {
    port: u16,
    subscribed: Receiver<StrategyInfo>,
    stop: Option<oneshot::Sender<()>>,
}

impl PlayingField {
    pub fn accepting(certificates: &Certificates) -> Self {
        Self::start(certificates, Ok(SubscribeResponse::accepted()))
    }

    pub fn rejecting(certificates: &Certificates, code: Code, details: &str) -> Self {
        Self::start(certificates, Ok(SubscribeResponse::rejected(code, details)))
    }

    pub fn failing(certificates: &Certificates, status: Status) -> Self {
        Self::start(certificates, Err(status))
    }

    pub fn start(certificates: &Certificates, reply: Result<SubscribeResponse, Status>) -> Self {
        let tls = TlsMaterial::load(certificates.prefix())
            .unwrap()
            .server_tls();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                let recorder = Recorder {
                    reply,
                    subscribed: tx,
                };
                tonic::transport::Server::builder()
                    .tls_config(tls)
                    .unwrap()
                    .add_service(PlayingFieldServer::new(recorder))
                    .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                        let _ = stop_rx.await;
                    })
                    .await
                    .unwrap();
            });
        });

        PlayingField {
            port,
            subscribed: rx,
            stop: Some(stop_tx),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The next registration record received, if any arrives in time.
    pub fn subscribed(&self) -> Option<StrategyInfo> {
        self.subscribed.recv_timeout(TIMEOUT).ok()
    }
}

impl Drop for PlayingField {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

/// A local port nothing listens on.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
