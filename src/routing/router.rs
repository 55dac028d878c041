//! Broadcast and unicast delivery over the registry

use crate::error::{ProtocolError, RoutingError};
use crate::network::Connection;
use crate::protocol::{param, Frame};
use crate::routing::ConnectionRegistry;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of a broadcast
#[derive(Debug, Default)]
pub struct DeliveryReport {
    /// Users the frame was queued for
    pub delivered: Vec<String>,
    /// Users whose connection refused the frame; they should be evicted
    pub failed: Vec<(String, Arc<Connection>)>,
}

impl DeliveryReport {
    /// Whether every targeted user accepted the frame
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Routes frames to registered users
#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<ConnectionRegistry>,
}

impl Router {
    /// Create a router over `registry`
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Registry this router delivers through
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Deliver `template` to every registered user except `sender` and
    /// anyone in `exclude`
    ///
    /// The `sender` param is stamped with `sender`, or removed when the frame
    /// comes from the server itself. The frame is encoded once and shared.
    /// A failed send never stops delivery to the remaining users; failures
    /// are collected in the report instead.
    ///
    /// # Errors
    ///
    /// Only encoding errors, which happen before anything is sent.
    pub fn broadcast(
        &self,
        template: &Frame,
        sender: Option<&str>,
        exclude: &[&str],
    ) -> Result<DeliveryReport, ProtocolError> {
        let encoded = stamp(template, sender).encode()?;
        let mut report = DeliveryReport::default();

        for (username, conn) in self.registry.all() {
            if sender == Some(username.as_str()) || exclude.contains(&username.as_str()) {
                continue;
            }

            match conn.send_encoded(encoded.clone()) {
                Ok(()) => report.delivered.push(username),
                Err(e) => {
                    warn!(recipient = %username, error = %e, "Broadcast delivery failed");
                    report.failed.push((username, conn));
                },
            }
        }

        debug!(
            frame_type = %template.frame_type,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Broadcast complete"
        );

        Ok(report)
    }

    /// Deliver `template` to exactly one registered user
    ///
    /// # Errors
    ///
    /// - `RecipientNotFound` if `recipient` is not registered; nothing is sent
    /// - `DeliveryFailed` if the recipient's connection refused the frame
    pub fn unicast(&self, template: &Frame, recipient: &str, sender: Option<&str>) -> crate::Result<()> {
        let conn = self
            .registry
            .lookup(recipient)
            .ok_or_else(|| RoutingError::RecipientNotFound {
                username: recipient.to_string(),
            })?;

        let encoded = stamp(template, sender).encode()?;
        conn.send_encoded(encoded).map_err(|e| RoutingError::DeliveryFailed {
            username: recipient.to_string(),
            connection: conn.id(),
            reason: e.to_string(),
        })?;

        debug!(frame_type = %template.frame_type, recipient, "Unicast delivered");
        Ok(())
    }
}

fn stamp(template: &Frame, sender: Option<&str>) -> Frame {
    let mut frame = template.clone();
    match sender {
        Some(sender) => {
            frame.params.insert(param::SENDER.to_string(), sender.to_string());
        },
        None => {
            frame.params.remove(param::SENDER);
        },
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use crate::network::{ConnectionOptions, FrameReader};
    use crate::protocol::{FrameType, Message};
    use std::time::Duration;
    use tokio::io::DuplexStream;

    struct Member {
        conn: Arc<Connection>,
        reader: FrameReader<DuplexStream>,
    }

    impl Member {
        fn join(registry: &ConnectionRegistry, name: &str) -> Self {
            let (client, server) = tokio::io::duplex(64 * 1024);
            let conn = Connection::new(
                server,
                "127.0.0.1:6000".parse().unwrap(),
                ConnectionOptions::default(),
            );
            registry.register(name, conn.clone()).unwrap();
            Self {
                conn,
                reader: FrameReader::new(client),
            }
        }

        async fn recv(&mut self) -> Option<Frame> {
            tokio::time::timeout(Duration::from_millis(200), self.reader.read_frame())
                .await
                .ok()
                .and_then(|frame| frame.unwrap())
        }
    }

    fn chat(content: &str) -> Frame {
        Message::InMessage {
            content: content.to_string(),
            sender: None,
        }
        .into_frame()
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut alice = Member::join(&registry, "alice");
        let mut bob = Member::join(&registry, "bob");
        let mut carol = Member::join(&registry, "carol");
        let router = Router::new(registry);

        let report = router.broadcast(&chat("hi"), Some("alice"), &[]).unwrap();
        assert_eq!(report.delivered, vec!["bob", "carol"]);
        assert!(report.is_complete());

        for member in [&mut bob, &mut carol] {
            let frame = member.recv().await.unwrap();
            assert_eq!(frame.frame_type, FrameType::InMessage);
            assert_eq!(frame.param(param::SENDER), Some("alice"));
            assert_eq!(frame.text().unwrap(), "hi");
        }
        assert!(alice.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_server_broadcast_has_no_sender() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut alice = Member::join(&registry, "alice");
        let _bob = Member::join(&registry, "bob");
        let router = Router::new(registry);

        let template = chat("notice").with_param(param::SENDER, "spoofed");
        let report = router.broadcast(&template, None, &["bob"]).unwrap();
        assert_eq!(report.delivered, vec!["alice"]);

        let frame = alice.recv().await.unwrap();
        assert_eq!(frame.param(param::SENDER), None);
    }

    #[tokio::test]
    async fn test_broadcast_continues_past_failures() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dead = Member::join(&registry, "alice");
        let mut bob = Member::join(&registry, "bob");
        let router = Router::new(registry);

        dead.conn.close();
        dead.conn.closed().await;

        let report = router.broadcast(&chat("still here"), None, &[]).unwrap();
        assert_eq!(report.delivered, vec!["bob"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "alice");
        assert!(bob.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_unicast_reaches_only_recipient() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut alice = Member::join(&registry, "alice");
        let mut bob = Member::join(&registry, "bob");
        let mut carol = Member::join(&registry, "carol");
        let router = Router::new(registry);

        router.unicast(&chat("hello"), "bob", Some("alice")).unwrap();

        let frame = bob.recv().await.unwrap();
        assert_eq!(frame.param(param::SENDER), Some("alice"));
        assert_eq!(frame.text().unwrap(), "hello");
        assert!(alice.recv().await.is_none());
        assert!(carol.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unicast_to_missing_user() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut alice = Member::join(&registry, "alice");
        let router = Router::new(registry);

        let result = router.unicast(&chat("hello"), "dave", Some("alice"));
        assert!(matches!(
            result,
            Err(RelayError::Routing(RoutingError::RecipientNotFound { ref username })) if username == "dave"
        ));
        assert!(alice.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unicast_to_closed_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let bob = Member::join(&registry, "bob");
        let router = Router::new(registry);

        bob.conn.close();
        bob.conn.closed().await;

        let result = router.unicast(&chat("hello"), "bob", None);
        assert!(matches!(
            result,
            Err(RelayError::Routing(RoutingError::DeliveryFailed { connection, .. })) if connection == bob.conn.id()
        ));
    }
}
