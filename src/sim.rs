//! Fault-injecting UDP proxy for deterministic testing.
//!
//! Real networks drop datagrams; the retry loop exists for exactly that.
//! To exercise it without depending on actual network conditions, a
//! [`Proxy`] sits between client and server and relays datagrams both
//! ways, applying a configurable fault model:
//!
//! | Fault           | Description                                        |
//! |-----------------|----------------------------------------------------|
//! | Scripted drop   | Drop the Nth observed datagram in a direction.     |
//! | Random loss     | Drop with probability `inbound_loss`/`outbound_loss`. |
//!
//! Random loss uses a seeded RNG so a failing test reproduces.  The proxy
//! learns the client address from the first datagram it relays; it is
//! built for one client at a time, which is all the tests need.

use std::collections::HashSet;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;

use crate::socket::Socket;

/// Configuration for the fault model.
///
/// The default is a transparent pass-through.
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// Probability that a client→server datagram is silently dropped.
    pub inbound_loss: f64,
    /// Probability that a server→client datagram (an ACK) is dropped.
    pub outbound_loss: f64,
    /// Zero-based indices of client→server datagrams to drop, counted in
    /// arrival order (retransmissions count as new datagrams).
    pub drop_inbound: Vec<usize>,
    /// Zero-based indices of server→client datagrams to drop.
    pub drop_outbound: Vec<usize>,
    /// RNG seed for the probabilistic faults.
    pub seed: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            inbound_loss: 0.0,
            outbound_loss: 0.0,
            drop_inbound: Vec::new(),
            drop_outbound: Vec::new(),
            seed: 0,
        }
    }
}

/// A running relay between one client and the server.
pub struct Proxy {
    /// Address the client should treat as the server.
    pub addr: SocketAddr,
    relay: JoinHandle<()>,
}

impl Proxy {
    /// Bind a loopback relay in front of `server` with the given faults.
    pub async fn spawn(server: SocketAddr, config: FaultConfig) -> io::Result<Self> {
        let socket = Socket::bind((Ipv4Addr::LOCALHOST, 0).into()).await?;
        let addr = socket.local_addr;
        let relay = tokio::spawn(relay(socket, server, config));
        Ok(Self { addr, relay })
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        self.relay.abort();
    }
}

async fn relay(socket: Socket, server: SocketAddr, config: FaultConfig) {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let drop_inbound: HashSet<usize> = config.drop_inbound.into_iter().collect();
    let drop_outbound: HashSet<usize> = config.drop_outbound.into_iter().collect();

    let mut client: Option<SocketAddr> = None;
    let mut seen_inbound = 0usize;
    let mut seen_outbound = 0usize;

    loop {
        let (buf, from) = match socket.recv_from().await {
            Ok(v) => v,
            Err(_) => return,
        };

        if from == server {
            let idx = seen_outbound;
            seen_outbound += 1;
            if drop_outbound.contains(&idx) || rng.gen_bool(config.outbound_loss) {
                log::debug!("[sim] dropping outbound datagram #{idx}");
                continue;
            }
            if let Some(client) = client {
                let _ = socket.send_to(&buf, client).await;
            }
        } else {
            client = Some(from);
            let idx = seen_inbound;
            seen_inbound += 1;
            if drop_inbound.contains(&idx) || rng.gen_bool(config.inbound_loss) {
                log::debug!("[sim] dropping inbound datagram #{idx}");
                continue;
            }
            let _ = socket.send_to(&buf, server).await;
        }
    }
}
