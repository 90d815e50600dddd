//! Auto-TLS listener: plaintext/TLS demultiplexing of a TCP listener.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// TLS handshake record ContentType. A client that speaks TLS sends it
/// as the very first byte of the connection.
const TLS_HANDSHAKE_BYTE: u8 = 0x16;

/// Wraps a [`TcpListener`] and produces two child listeners: one
/// receives plaintext connections, the other TLS connections.
///
/// A single accept task owns `accept()` on the parent. Every accepted
/// connection is classified by peeking at its first byte without
/// consuming it: `0x16` (the TLS handshake ContentType) steers the
/// connection to the encrypted child, anything else to the plain one.
///
/// Closing either child closes the parent listener, aborts the
/// in-flight classification and drains both queues. A connection that
/// disconnects before sending its first byte is dropped without
/// affecting the listener.
pub struct AutoTlsListener;

impl AutoTlsListener {
    /// Splits the parent listener into `(plain, encrypted)` children.
    pub fn split(parent: TcpListener) -> (AutoTlsChild, AutoTlsChild) {
        let local_addr = parent.local_addr().ok();

        let (plain_tx, plain_rx) = async_channel::unbounded::<TcpStream>();
        let (tls_tx, tls_rx) = async_channel::unbounded::<TcpStream>();

        let closed = Arc::new(AtomicBool::new(false));
        let cancel = Arc::new(Notify::new());

        let task = tokio::spawn(accept_loop(
            parent,
            plain_tx,
            tls_tx,
            Arc::clone(&closed),
            Arc::clone(&cancel),
        ));

        let inner = Arc::new(Inner {
            local_addr,
            plain_rx,
            tls_rx,
            closed,
            cancel,
            task: std::sync::Mutex::new(Some(task)),
        });

        (
            AutoTlsChild {
                inner: Arc::clone(&inner),
                encrypted: false,
            },
            AutoTlsChild {
                inner,
                encrypted: true,
            },
        )
    }
}

struct Inner {
    local_addr: Option<SocketAddr>,
    plain_rx: async_channel::Receiver<TcpStream>,
    tls_rx: async_channel::Receiver<TcpStream>,
    closed: Arc<AtomicBool>,
    cancel: Arc<Notify>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // Unblock the accept task; it drops the parent listener and
        // the queue senders on the way out.
        self.cancel.notify_waiters();

        // Drain queued connections. Dropping a TcpStream closes it.
        self.plain_rx.close();
        self.tls_rx.close();
        while self.plain_rx.try_recv().is_ok() {}
        while self.tls_rx.try_recv().is_ok() {}
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.close();
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
    }
}

/// One side of an [`AutoTlsListener`]: a listener-like handle that
/// yields only plaintext or only TLS connections.
pub struct AutoTlsChild {
    inner: Arc<Inner>,
    encrypted: bool,
}

impl AutoTlsChild {
    /// Waits for the next connection of this child's kind.
    ///
    /// Returns an error after the listener has been closed.
    pub async fn accept(&self) -> io::Result<TcpStream> {
        let rx = if self.encrypted {
            &self.inner.tls_rx
        } else {
            &self.inner.plain_rx
        };

        rx.recv()
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "listener closed"))
    }

    /// Closes the parent listener and both children.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Returns the local address of the parent listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr
    }

    /// Returns true if this child receives TLS connections.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }
}

async fn accept_loop(
    parent: TcpListener,
    plain_tx: async_channel::Sender<TcpStream>,
    tls_tx: async_channel::Sender<TcpStream>,
    closed: Arc<AtomicBool>,
    cancel: Arc<Notify>,
) {
    loop {
        if closed.load(Ordering::SeqCst) {
            break;
        }

        let conn = tokio::select! {
            _ = cancel.notified() => break,
            res = parent.accept() => match res {
                Ok((conn, peer)) => {
                    debug!(peer = %peer, "accepted connection");
                    conn
                }
                Err(err) => {
                    warn!(error = %err, "accept error");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    continue;
                }
            },
        };

        // Classify. The connection counts as pending here: closing the
        // listener cancels the peek and drops it.
        let mut first = [0u8; 1];
        let classified = tokio::select! {
            _ = cancel.notified() => None,
            res = conn.peek(&mut first) => match res {
                // Disconnected before the first byte: drop this
                // connection only, the listener stays healthy.
                Ok(0) => None,
                Ok(_) => Some(first[0] == TLS_HANDSHAKE_BYTE),
                Err(err) => {
                    debug!(error = %err, "peek failed, dropping connection");
                    None
                }
            },
        };

        match classified {
            Some(true) => {
                let _ = tls_tx.send(conn).await;
            }
            Some(false) => {
                let _ = plain_tx.send(conn).await;
            }
            None => drop(conn),
        }
    }
}
