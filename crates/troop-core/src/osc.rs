//! OSC (Open Sound Control) client for the network backend.
//!
//! SuperCollider's language process (sclang) listens for OSC on UDP. The
//! client binds an ephemeral local port once and sends fire-and-forget
//! messages to a fixed target address.

use crate::error::{Error, Result};
use rosc::{encoder, OscMessage, OscPacket, OscType};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

/// UDP-based OSC client.
pub struct OscClient {
    /// The underlying UDP socket (None once closed).
    sock: Option<UdpSocket>,
    /// Resolved target address.
    target: SocketAddr,
}

impl OscClient {
    /// Create a new OSC client targeting `host:port`.
    ///
    /// The host is resolved once here; an unresolvable host is a
    /// configuration error.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let target = (host, port)
            .to_socket_addrs()
            .map_err(|e| Error::Config(format!("Cannot resolve {}:{}: {}", host, port, e)))?
            .next()
            .ok_or_else(|| Error::Config(format!("No address found for {}:{}", host, port)))?;

        let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let sock = UdpSocket::bind(bind_addr)?;
        log::debug!("OSC client bound to {} targeting {}", sock.local_addr()?, target);

        Ok(Self {
            sock: Some(sock),
            target,
        })
    }

    /// The address messages are sent to.
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Whether the socket has been released.
    pub fn is_closed(&self) -> bool {
        self.sock.is_none()
    }

    /// Send an OSC message with the given path and arguments.
    pub fn send_msg(&self, path: &str, args: Vec<OscType>) -> Result<()> {
        let sock = self.sock.as_ref().ok_or(Error::Terminated)?;
        let buf = encoder::encode(&Self::msg(path, args))?;
        sock.send_to(&buf, self.target)
            .map_err(|e| Error::Transport(format!("OSC send to {} failed: {}", self.target, e)))?;
        Ok(())
    }

    /// Create an OSC message packet.
    pub fn msg(path: &str, args: Vec<OscType>) -> OscPacket {
        OscPacket::Message(OscMessage {
            addr: path.into(),
            args,
        })
    }

    /// Release the socket. Safe to call more than once.
    pub fn close(&mut self) {
        if self.sock.take().is_some() {
            log::debug!("OSC client for {} closed", self.target);
        }
    }
}

impl std::fmt::Debug for OscClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OscClient")
            .field("target", &self.target)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_osc_client_creation() {
        // Just test that we can create a client (won't actually connect)
        let client = OscClient::connect("127.0.0.1", 57120).unwrap();
        assert_eq!(client.target().port(), 57120);
        assert!(!client.is_closed());
    }

    #[test]
    fn test_msg_helper() {
        let packet = OscClient::msg("/test", vec![OscType::Int(42), OscType::Float(0.5)]);
        if let OscPacket::Message(msg) = packet {
            assert_eq!(msg.addr, "/test");
            assert_eq!(msg.args.len(), 2);
        } else {
            panic!("Expected message packet");
        }
    }

    #[test]
    fn test_send_reaches_listener() {
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        listener.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let port = listener.local_addr().unwrap().port();

        let client = OscClient::connect("127.0.0.1", port).unwrap();
        client
            .send_msg("/ping", vec![OscType::String("hi".into())])
            .unwrap();

        let mut buf = [0u8; 1024];
        let (size, _) = listener.recv_from(&mut buf).unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&buf[..size]).unwrap();
        match packet {
            OscPacket::Message(msg) => {
                assert_eq!(msg.addr, "/ping");
                assert_eq!(msg.args, vec![OscType::String("hi".into())]);
            }
            other => panic!("Expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_send_after_close_fails_cleanly() {
        let mut client = OscClient::connect("127.0.0.1", 57120).unwrap();
        client.close();
        client.close();
        assert!(matches!(
            client.send_msg("/x", vec![]),
            Err(Error::Terminated)
        ));
    }
}
