//! eSCL serving glue: TCP listener, auto-TLS split, rustls acceptor.

use std::future::IntoFuture;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use scanbridge_core::config::EsclConfig;
use scanbridge_escl::{EsclServer, EsclServerOptions};
use scanbridge_scanner::TestScanner;
use scanbridge_transport::{AutoTlsChild, AutoTlsListener};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls::ServerConfig as TlsServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

/// Serves the virtual scanner until interrupted.
///
/// With a configured certificate, plaintext and TLS clients share one
/// port: the auto-TLS listener peeks at the first byte of each
/// connection and steers it to the matching stack.
pub async fn serve_escl(config: &EsclConfig) -> Result<()> {
    let scanner = TestScanner::new();
    let server = EsclServer::new(
        scanner,
        EsclServerOptions {
            base_path: config.base_path.clone(),
            ..EsclServerOptions::default()
        },
    );

    let bind_addr: SocketAddr = config
        .bind_addr
        .parse()
        .context("invalid eSCL bind address")?;
    let listener = TcpListener::bind(bind_addr).await?;

    info!(addr = %bind_addr, base_path = %server.base_path(), "eSCL server listening");
    println!(
        "serving eSCL on http://{}{} (ctrl-c to stop)",
        bind_addr,
        server.base_path()
    );

    match (&config.tls_cert, &config.tls_key) {
        (Some(cert), Some(key)) => {
            let acceptor = build_tls_acceptor(cert, key)?;
            let (plain, tls) = AutoTlsListener::split(listener);

            let plain_task = tokio::spawn(axum::serve(
                PlainListener(plain),
                server.router(),
            ).into_future());
            let tls_task = tokio::spawn(axum::serve(
                TlsChildListener { child: tls, acceptor },
                server.router_with_scheme(true),
            ).into_future());

            tokio::signal::ctrl_c().await?;
            plain_task.abort();
            tls_task.abort();
        }
        _ => {
            let serve = axum::serve(listener, server.router());
            tokio::select! {
                result = serve.into_future() => result?,
                _ = tokio::signal::ctrl_c() => {}
            }
        }
    }

    println!();
    Ok(())
}

/// Builds a TLS acceptor from PEM certificate and key files.
fn build_tls_acceptor(cert_path: &str, key_path: &str) -> Result<TlsAcceptor> {
    let cert_file =
        std::fs::File::open(cert_path).context("Failed to open server certificate")?;
    let mut cert_reader = std::io::BufReader::new(cert_file);

    let key_file = std::fs::File::open(key_path).context("Failed to open server private key")?;
    let mut key_reader = std::io::BufReader::new(key_file);

    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to parse server certificate")?;

    let key = rustls_pemfile::private_key(&mut key_reader)
        .context("Failed to read private key")?
        .ok_or_else(|| anyhow!("No private key found in key file"))?;

    let server_config = TlsServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("Invalid certificate or key")?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

// axum Listener over the plaintext child of the auto-TLS split.
struct PlainListener(AutoTlsChild);

impl axum::serve::Listener for PlainListener {
    type Io = TcpStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.0.accept().await {
                Ok(conn) => {
                    let addr = conn
                        .peer_addr()
                        .unwrap_or_else(|_| ([0, 0, 0, 0], 0).into());
                    return (conn, addr);
                }
                // Closed listener: park until the serve task is
                // aborted.
                Err(_) => std::future::pending::<()>().await,
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.0
            .local_addr()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "listener closed"))
    }
}

// axum Listener completing the TLS handshake on the encrypted child.
struct TlsChildListener {
    child: AutoTlsChild,
    acceptor: TlsAcceptor,
}

impl axum::serve::Listener for TlsChildListener {
    type Io = tokio_rustls::server::TlsStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            let conn = match self.child.accept().await {
                Ok(conn) => conn,
                Err(_) => std::future::pending().await,
            };

            let addr = conn
                .peer_addr()
                .unwrap_or_else(|_| ([0, 0, 0, 0], 0).into());

            match self.acceptor.accept(conn).await {
                Ok(stream) => return (stream, addr),
                Err(err) => {
                    warn!(peer = %addr, error = %err, "TLS handshake failed");
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.child
            .local_addr()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "listener closed"))
    }
}
