use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, oneshot};
use tracing::{error, info};

use crate::exceptions::{NetworkError, Result};

/// A received datagram, not yet decoded.
#[derive(Debug, Clone)]
pub struct Message {
    pub data: Vec<u8>,
    pub address: SocketAddr,
}

/// UDP transport: binds a socket, runs a receive loop, and hands every
/// datagram to the protocol layer.
pub struct UdpTransport {
    pub host: String,
    pub port: u16,
    /// Bound socket; None until `bind` succeeds.
    socket: Mutex<Option<Arc<UdpSocket>>>,
    /// Channel for signalling the receive loop to stop.
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    is_running: AtomicBool,
}

impl UdpTransport {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            socket: Mutex::new(None),
            stop_tx: Mutex::new(None),
            is_running: AtomicBool::new(false),
        }
    }

    /// Bind the socket and report the actual local address, which
    /// differs from the configured one when port 0 was requested.
    pub async fn bind(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        let socket = UdpSocket::bind(&addr).await.map_err(|e| {
            error!(address = %addr, error = %e, "Failed to bind socket");
            NetworkError::Bind
        })?;
        let local = socket.local_addr().map_err(|_| NetworkError::Bind)?;

        let mut socket_lock = self.socket.lock().await;
        *socket_lock = Some(Arc::new(socket));
        Ok(local)
    }

    /// Start the receive loop. Each datagram is handled in its own task.
    pub async fn start<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(Message) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static,
    {
        if self.is_running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let socket = {
            let socket_lock = self.socket.lock().await;
            socket_lock
                .as_ref()
                .cloned()
                .ok_or(NetworkError::General)?
        };

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        {
            let mut stop_tx_lock = self.stop_tx.lock().await;
            *stop_tx_lock = Some(stop_tx);
        }

        let handler = Arc::new(handler);

        tokio::spawn(async move {
            let mut buf = vec![0u8; 65535];

            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        break;
                    }
                    result = socket.recv_from(&mut buf) => {
                        match result {
                            Ok((size, addr)) => {
                                let msg = Message { data: buf[..size].to_vec(), address: addr };
                                let h = handler.clone();
                                tokio::spawn(async move {
                                    h(msg).await;
                                });
                            }
                            Err(e) => {
                                error!(error = %e, "UDP receive error");
                            }
                        }
                    }
                }
            }
        });

        self.is_running.store(true, Ordering::SeqCst);
        info!(host = %self.host, port = self.port, "UDP transport started");
        Ok(())
    }

    /// Stop the receive loop and drop the socket.
    pub async fn stop(&self) {
        if !self.is_running.load(Ordering::SeqCst) {
            return;
        }

        {
            let mut stop_tx_lock = self.stop_tx.lock().await;
            if let Some(tx) = stop_tx_lock.take() {
                let _ = tx.send(());
            }
        }

        {
            let mut socket_lock = self.socket.lock().await;
            *socket_lock = None;
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("UDP transport stopped");
    }

    /// Send one datagram. A send failure is reported, never fatal.
    pub async fn send(&self, data: &[u8], address: SocketAddr) -> Result<()> {
        let socket = {
            let socket_lock = self.socket.lock().await;
            socket_lock
                .as_ref()
                .cloned()
                .ok_or(NetworkError::General)?
        };

        socket.send_to(data, address).await.map_err(|e| {
            error!(error = %e, address = %address, "Error sending message");
            NetworkError::Unreachable
        })?;
        Ok(())
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let socket_lock = self.socket.lock().await;
        socket_lock.as_ref().and_then(|s| s.local_addr().ok())
    }
}
