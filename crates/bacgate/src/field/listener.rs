//! Blocking BACnet/IP listener thread
//!
//! The UDP socket is served from a dedicated OS thread. Each receive waits
//! at most `receive_timeout`, after which the shutdown flag is checked and
//! pending COV notifications go out.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use super::codec;
use super::service::{Destination, FieldService, Outcome};
use crate::device::DeviceAddress;
use crate::port::Notifier;
use crate::protocol::Notification;

/// Largest datagram the listener reads
const MAX_DATAGRAM: usize = 1500;

/// Where and how the listener binds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSettings {
    pub interface: IpAddr,
    pub port: u16,
    /// Target of broadcast responses; the limited broadcast address when unset
    pub broadcast: Option<SocketAddr>,
    pub receive_timeout: Duration,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 47808,
            broadcast: None,
            receive_timeout: Duration::from_millis(3000),
        }
    }
}

/// The bound field socket, before its thread is started
#[derive(Debug)]
pub struct FieldSocket {
    socket: UdpSocket,
    broadcast: SocketAddr,
}

impl FieldSocket {
    pub fn bind(settings: &ListenerSettings) -> io::Result<Self> {
        let socket = UdpSocket::bind((settings.interface, settings.port))?;
        socket.set_broadcast(true)?;
        socket.set_read_timeout(Some(settings.receive_timeout))?;

        let broadcast = settings
            .broadcast
            .unwrap_or(SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), settings.port));
        Ok(Self { socket, broadcast })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Physical address the gateway device answers on
    pub fn link_address(&self) -> io::Result<DeviceAddress> {
        let local = self.socket.local_addr()?;
        if local.ip().is_unspecified() {
            tracing::warn!(
                "Field socket bound to {}; the gateway will advertise an unspecified address",
                local
            );
        }
        Ok(DeviceAddress {
            net: 0,
            mac: codec::socket_mac(local),
        })
    }
}

/// Running listener; dropping it leaves the thread running until the flag is set
#[derive(Debug)]
pub struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    thread: thread::JoinHandle<()>,
}

impl ListenerHandle {
    /// Set the flag and wait for the thread; returns within one receive timeout
    pub fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if self.thread.join().is_err() {
            tracing::error!("Field listener thread panicked");
        }
    }
}

pub fn spawn_listener(socket: FieldSocket, service: FieldService, notifier: Notifier) -> io::Result<ListenerHandle> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let listener = Listener {
        socket,
        service,
        notifier,
        shutdown: shutdown.clone(),
    };
    let thread = thread::Builder::new()
        .name("bacnet-listener".to_string())
        .spawn(move || listener.run())?;
    Ok(ListenerHandle { shutdown, thread })
}

struct Listener {
    socket: FieldSocket,
    service: FieldService,
    notifier: Notifier,
    shutdown: Arc<AtomicBool>,
}

impl Listener {
    fn run(mut self) {
        match self.socket.local_addr() {
            Ok(addr) => tracing::info!("Field listener started on {}", addr),
            Err(_) => tracing::info!("Field listener started"),
        }

        let mut buf = [0u8; MAX_DATAGRAM];
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.socket.socket.recv_from(&mut buf) {
                Ok((len, peer)) => self.process(&buf[..len], peer),
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
                Err(e) => tracing::warn!("Field receive failed: {}", e),
            }
            let changes = self.service.poll_cov(Instant::now());
            self.deliver(changes);
        }

        tracing::info!("Field listener stopped");
    }

    fn process(&mut self, data: &[u8], peer: SocketAddr) {
        match self.service.handle(data, peer) {
            Ok(outcome) => self.deliver(outcome),
            Err(e) => tracing::debug!("Dropping datagram from {}: {}", peer, e),
        }
    }

    fn deliver(&self, outcome: Outcome) {
        for packet in outcome.packets {
            let target = match packet.destination {
                Destination::Unicast(addr) => addr,
                Destination::Broadcast => self.socket.broadcast,
            };
            if let Err(e) = self.socket.socket.send_to(&packet.bytes, target) {
                tracing::warn!("Field send to {} failed: {}", target, e);
            }
        }

        for effect in outcome.effects {
            tracing::info!(
                "Command {} on device {} started with value {}",
                effect.object_id,
                effect.device_id,
                effect.value
            );
            if !self.notifier.notify(Notification::Command(effect)) {
                tracing::warn!("Command effect dropped, outbound channel closed");
            }
        }
    }
}
