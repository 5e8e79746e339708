//! Userspace UDP relay adapter: one client-facing socket distributes
//! datagrams through per-client upstream sockets, so replies from the real
//! server can be matched back to the client that sent the request.
//!
//! Unlike the cooperative single-reactor-thread model the rest of this
//! adapter contract assumes, a real proxy must read from the client-facing
//! socket and every per-client upstream socket concurrently — each gets its
//! own blocking reader thread. `Pipe::attempt` tolerates this fine (its
//! state is mutex-protected); only the idealized single-thread admission
//! ordering is relaxed here, not correctness.

use netimpair_core::adapter::PacketSource;
use netimpair_core::error::Error;
use netimpair_core::pipe_pair::PipePair;
use netimpair_core::scheduler::Scheduler;
use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};

/// Header bytes charged to every UDP packet for bandwidth accounting.
pub const OVERHEAD: u64 = 28;

/// Relays UDP datagrams between clients on `proxy_port` and a single
/// upstream server on `server_port`, impairing both directions through a
/// [`PipePair`]: client→server traffic is offered to `pipes.up()`,
/// server→client replies to `pipes.down()`.
pub struct UdpProxyAdapter {
    server_addr: SocketAddr,
    proxy_port: u16,
}

impl UdpProxyAdapter {
    pub fn new(server_port: u16, proxy_port: u16) -> Self {
        Self { server_addr: SocketAddr::from(([127, 0, 0, 1], server_port)), proxy_port }
    }

    /// Get or create the upstream socket used to relay on behalf of `address`,
    /// spawning its server→client reader thread the first time one is needed.
    fn proxy_client(
        &self,
        clients: &Mutex<HashMap<SocketAddr, Arc<UdpSocket>>>,
        address: SocketAddr,
        listen_socket: Arc<UdpSocket>,
        pipes: Arc<PipePair>,
    ) -> Result<Arc<UdpSocket>, Error> {
        let mut map = clients.lock().unwrap();
        if let Some(existing) = map.get(&address) {
            return Ok(Arc::clone(existing));
        }

        let client_socket = UdpSocket::bind(("0.0.0.0", 0))
            .map_err(|e| Error::AdapterFailure(format!("failed to open proxy client socket: {e}")))?;
        client_socket
            .connect(self.server_addr)
            .map_err(|e| Error::AdapterFailure(format!("failed to connect proxy client socket: {e}")))?;
        let client_socket = Arc::new(client_socket);
        map.insert(address, Arc::clone(&client_socket));
        drop(map);

        let reader_socket = Arc::clone(&client_socket);
        std::thread::spawn(move || {
            let mut buf = [0u8; 65536];
            loop {
                match reader_socket.recv(&mut buf) {
                    Ok(n) => {
                        let data = buf[..n].to_vec();
                        let size = n as u64 + OVERHEAD;
                        let reply_socket = Arc::clone(&listen_socket);
                        pipes.down().attempt(
                            Box::new(move || {
                                if let Err(e) = reply_socket.send_to(&data, address) {
                                    log::warn!("udp-proxy: failed relaying to client {address}: {e}");
                                }
                            }),
                            Box::new(|| {}),
                            size,
                        );
                    }
                    Err(e) => {
                        log::warn!("udp-proxy: server-side reader for {address} stopped: {e}");
                        return;
                    }
                }
            }
        });

        Ok(client_socket)
    }
}

impl PacketSource for UdpProxyAdapter {
    fn name(&self) -> &'static str {
        "udp-proxy"
    }

    fn run(self: Box<Self>, pipes: Arc<PipePair>, _scheduler: Arc<dyn Scheduler>) -> Result<(), Error> {
        let listen_socket = UdpSocket::bind(("0.0.0.0", self.proxy_port))
            .map_err(|e| Error::FatalEnvironment(format!("failed to bind proxy port {}: {e}", self.proxy_port)))?;
        let listen_socket = Arc::new(listen_socket);
        let server_addr = self.server_addr;
        let clients: Mutex<HashMap<SocketAddr, Arc<UdpSocket>>> = Mutex::new(HashMap::new());

        let mut buf = [0u8; 65536];
        loop {
            let (n, from) = listen_socket
                .recv_from(&mut buf)
                .map_err(|e| Error::AdapterFailure(format!("proxy recv failed: {e}")))?;
            let data = buf[..n].to_vec();

            let client_socket =
                self.proxy_client(&clients, from, Arc::clone(&listen_socket), Arc::clone(&pipes))?;

            let deliver_socket = Arc::clone(&client_socket);
            let size = n as u64 + OVERHEAD;
            pipes.up().attempt(
                Box::new(move || {
                    if let Err(e) = deliver_socket.send_to(&data, server_addr) {
                        log::warn!("udp-proxy: failed relaying to server: {e}");
                    }
                }),
                Box::new(|| {}),
                size,
            );
        }
    }
}
