//! Backend that forwards code to SuperCollider over OSC.
//!
//! The Troop quark running in sclang listens on a fixed OSC address and
//! interprets the second argument of each message as code, provided the
//! first argument matches its password. Nothing is read back.

use super::echo_block;
use crate::clock::{InertClock, SharedClock};
use crate::config::NetworkSettings;
use crate::console::Console;
use crate::echo::CodeBlock;
use crate::error::{Error, Result};
use crate::osc::OscClient;
use crate::pattern::KeywordMatcher;
use rosc::OscType;

/// OSC address the Troop quark listens on.
pub const TROOP_ADDRESS: &str = "/troop";

/// Code that frees every node on the server.
pub const STOP_SOUND: &str = "s.freeAll";

/// SuperCollider tokens highlighted when echoing.
pub const SC_KEYWORDS: &[&str] = &[
    "SynthDef", "Synth", "Pbind", "Pdef", "Ndef", "Routine", "TempoClock", "play", "free", "s",
];

/// Sends each block as an OSC message `[credential, code]`.
pub struct NetworkBackend {
    client: OscClient,
    address: String,
    credential: String,
    matcher: KeywordMatcher,
    clock: SharedClock,
}

impl NetworkBackend {
    /// Bind the client to the configured host and port.
    ///
    /// `credential` is the quark's password. It must be supplied up front;
    /// a missing or empty credential is a configuration error.
    pub fn connect(settings: &NetworkSettings, credential: Option<&str>) -> Result<Self> {
        let credential = match credential {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => return Err(Error::MissingCredential),
        };
        if !settings.address.starts_with('/') {
            return Err(Error::Config(format!(
                "OSC address must start with '/': {}",
                settings.address
            )));
        }

        let client = OscClient::connect(&settings.host, settings.port)?;
        log::info!("Sending code to {}{}", client.target(), settings.address);

        Ok(Self {
            client,
            address: settings.address.clone(),
            credential,
            matcher: KeywordMatcher::compile(SC_KEYWORDS.iter().copied())?,
            clock: SharedClock::new(InertClock::new()),
        })
    }

    pub fn evaluate(&mut self, block: &CodeBlock, console: &Console) -> Result<()> {
        if !echo_block(block, &self.matcher, console) {
            return Ok(());
        }
        if self.client.is_closed() {
            return Err(Error::Terminated);
        }

        self.client.send_msg(
            &self.address,
            vec![
                OscType::String(self.credential.clone()),
                OscType::String(block.text.clone()),
            ],
        )
    }

    pub fn stop_sound(&self) -> &str {
        STOP_SOUND
    }

    pub fn terminate(&mut self) {
        self.client.close();
    }

    pub fn is_terminated(&self) -> bool {
        self.client.is_closed()
    }

    pub fn matcher(&self) -> &KeywordMatcher {
        &self.matcher
    }

    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }
}

impl std::fmt::Debug for NetworkBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The credential is deliberately left out
        f.debug_struct("NetworkBackend")
            .field("client", &self.client)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::OscPacket;
    use std::net::UdpSocket;
    use std::time::Duration;

    fn listener() -> (UdpSocket, NetworkSettings) {
        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        sock.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
        let settings = NetworkSettings {
            port: sock.local_addr().unwrap().port(),
            ..NetworkSettings::default()
        };
        (sock, settings)
    }

    #[test]
    fn test_missing_credential() {
        let settings = NetworkSettings::default();
        assert!(matches!(
            NetworkBackend::connect(&settings, None),
            Err(Error::MissingCredential)
        ));
        assert!(matches!(
            NetworkBackend::connect(&settings, Some("")),
            Err(Error::MissingCredential)
        ));
    }

    #[test]
    fn test_bad_address_is_config_error() {
        let settings = NetworkSettings {
            address: "troop".into(),
            ..NetworkSettings::default()
        };
        let err = NetworkBackend::connect(&settings, Some("pw")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_sends_credential_and_full_text() {
        let (sock, settings) = listener();
        let mut backend = NetworkBackend::connect(&settings, Some("secret")).unwrap();
        let (console, rx) = Console::channel();

        let text = "  Pbind(\\degree, 1).play;\n\n";
        backend
            .evaluate(&CodeBlock::new(text, "Ann", "White"), &console)
            .unwrap();

        let mut buf = [0u8; 2048];
        let (size, _) = sock.recv_from(&mut buf).unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&buf[..size]).unwrap();
        let OscPacket::Message(msg) = packet else {
            panic!("Expected message packet");
        };
        assert_eq!(msg.addr, "/troop");
        assert_eq!(
            msg.args,
            vec![OscType::String("secret".into()), OscType::String(text.into())]
        );
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_blank_block_sends_nothing() {
        let (sock, settings) = listener();
        let mut backend = NetworkBackend::connect(&settings, Some("secret")).unwrap();
        let (console, rx) = Console::channel();

        backend
            .evaluate(&CodeBlock::new("\n\n", "Ann", "White"), &console)
            .unwrap();

        let mut buf = [0u8; 256];
        assert!(sock.recv_from(&mut buf).is_err());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_inert_clock_and_stop_token() {
        let (_sock, settings) = listener();
        let backend = NetworkBackend::connect(&settings, Some("secret")).unwrap();
        backend.clock().set_time(12.0, std::time::Instant::now());
        assert_eq!(backend.clock().time(), 0.0);
        assert_eq!(backend.clock().tempo(), 60.0);
        assert_eq!(backend.stop_sound(), "s.freeAll");
    }

    #[test]
    fn test_terminate_twice() {
        let (_sock, settings) = listener();
        let mut backend = NetworkBackend::connect(&settings, Some("secret")).unwrap();
        backend.terminate();
        backend.terminate();
        let (console, rx) = Console::channel();
        assert!(matches!(
            backend.evaluate(&CodeBlock::new("1", "Ann", "White"), &console),
            Err(Error::Terminated)
        ));
        assert_eq!(rx.try_iter().count(), 1);
    }
}
