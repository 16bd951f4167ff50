use crate::domain::IngestionService;
use crate::ttn::{parse_topic, uplink_subscription, TtnUplink};
use anyhow::{anyhow, Context};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument, Span};

const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct TtnSubscriberConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub app_id: String,
    /// Passed through to the broker as-is when set.
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    /// Upper bound on uplinks being ingested at the same time.
    pub max_in_flight_uplinks: usize,
}

impl Default for TtnSubscriberConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "redenv-collector".to_string(),
            app_id: "redenv".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 30,
            max_in_flight_uplinks: 10,
        }
    }
}

/// Subscribes to every device uplink of one TTN application and feeds each
/// message to the ingestion service in its own task.
pub struct TtnSubscriber {
    config: TtnSubscriberConfig,
    service: Arc<IngestionService>,
}

impl TtnSubscriber {
    pub fn new(config: TtnSubscriberConfig, service: Arc<IngestionService>) -> Self {
        Self { config, service }
    }

    fn mqtt_options(&self) -> MqttOptions {
        let mut options =
            MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs));
        options.set_clean_session(true);
        if let Some(username) = &self.config.username {
            options.set_credentials(
                username.clone(),
                self.config.password.clone().unwrap_or_default(),
            );
        }
        options
    }

    /// Runs one MQTT session until cancelled or the connection fails.
    ///
    /// Reconnecting is left to whoever restarts the service. On the way out
    /// the subscriber stops reading and waits for in-flight uplinks.
    #[instrument(
        name = "ttn_subscriber",
        skip_all,
        fields(app_id = %self.config.app_id, broker = %format!("{}:{}", self.config.host, self.config.port))
    )]
    pub async fn run(self, ctx: CancellationToken) -> anyhow::Result<()> {
        let (client, mut eventloop) = AsyncClient::new(self.mqtt_options(), 100);

        let topic = uplink_subscription(&self.config.app_id);
        client
            .subscribe(&topic, QoS::AtLeastOnce)
            .await
            .with_context(|| format!("failed to subscribe to {}", topic))?;

        let app_id: Arc<str> = Arc::from(self.config.app_id.as_str());
        let limiter = Arc::new(Semaphore::new(self.config.max_in_flight_uplinks.max(1)));
        let mut in_flight = JoinSet::new();

        let outcome = loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    debug!("shutdown signal received");
                    break Ok(());
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "uplink task panicked");
                    }
                }
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        // waits here when the limit is reached, pausing reads from the broker
                        let permit = match acquire_or_cancel(&limiter, &ctx).await {
                            Ok(Some(permit)) => permit,
                            Ok(None) => {
                                debug!("shutdown signal received while at the in-flight limit");
                                break Ok(());
                            }
                            Err(e) => break Err(e),
                        };
                        let service = Arc::clone(&self.service);
                        let app_id = Arc::clone(&app_id);
                        in_flight.spawn(async move {
                            handle_uplink_message(&service, &app_id, &publish.topic, &publish.payload).await;
                            drop(permit);
                        });
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to MQTT broker");
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        info!(topic = %topic, "subscribed to uplinks");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        break Err(anyhow!("MQTT event loop error: {}", e));
                    }
                }
            }
        };

        if outcome.is_ok() {
            disconnect(&client, &mut eventloop).await;
        }

        let pending = in_flight.len();
        if pending > 0 {
            info!(pending, "waiting for in-flight uplinks");
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "uplink task panicked");
            }
        }

        info!("TTN subscriber stopped");
        outcome
    }
}

/// Waits for an in-flight slot. `None` means shutdown started first.
pub(crate) async fn acquire_or_cancel(
    limiter: &Arc<Semaphore>,
    ctx: &CancellationToken,
) -> anyhow::Result<Option<OwnedSemaphorePermit>> {
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Ok(None),
        permit = Arc::clone(limiter).acquire_owned() => permit
            .map(Some)
            .map_err(|e| anyhow!("uplink limiter closed: {}", e)),
    }
}

/// Queues DISCONNECT and drives the event loop until it is written out.
async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if let Err(e) = client.try_disconnect() {
        debug!(error = %e, "disconnect failed");
        return;
    }

    let flushed = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "connection closed before disconnect was sent");
                    break;
                }
            }
        }
    })
    .await;

    if flushed.is_err() {
        debug!("timed out sending disconnect");
    }
}

/// Handles one publish. Never fails: every problem is logged and the
/// message dropped.
///
/// Each uplink gets its own root span rather than nesting under the
/// long-lived subscriber span.
pub(crate) async fn handle_uplink_message(
    service: &IngestionService,
    app_id: &str,
    topic: &str,
    body: &[u8],
) {
    let span = info_span!(
        parent: Span::none(),
        "ttn_uplink",
        topic = %topic,
        body_size = body.len(),
        device_id = tracing::field::Empty,
        counter = tracing::field::Empty,
    );

    async {
        let parsed = match parse_topic(topic) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "unexpected topic, skipping message");
                return;
            }
        };

        Span::current().record("device_id", parsed.dev_id.as_str());

        if parsed.app_id != app_id {
            warn!(
                topic_app = %parsed.app_id,
                expected_app = %app_id,
                "application mismatch, skipping message"
            );
            return;
        }

        let uplink = match TtnUplink::from_slice(body) {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "unparseable uplink body, skipping message");
                return;
            }
        };

        Span::current().record("counter", uplink.counter);

        if uplink.dev_id != parsed.dev_id {
            warn!(
                body_device = %uplink.dev_id,
                "device in body does not match topic, skipping message"
            );
            return;
        }

        if uplink.is_retry {
            debug!("uplink is a network retry");
        }

        if let Err(e) = service.on_uplink(uplink.into_raw_uplink()).await {
            error!(error = %e, kind = e.kind(), "failed to ingest uplink");
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{MockReadingRepository, Reading};
    use redenv_payload::TimestampReconciler;

    fn body(dev_id: &str, payload_raw: &str) -> Vec<u8> {
        format!(
            r#"{{"app_id":"redenv","dev_id":"{}","port":1,"counter":7,"payload_raw":"{}","metadata":{{"time":"2019-10-30T02:10:27.094175318Z"}}}}"#,
            dev_id, payload_raw
        )
        .into_bytes()
    }

    fn service(repository: MockReadingRepository) -> IngestionService {
        IngestionService::new(Arc::new(repository), TimestampReconciler::default())
    }

    const BACKYARD_BASE64: &str = "4wcKHRAPFw0AAAAAexTSQQAAAAAA2JhBB/fFR///////////zP8A";

    #[tokio::test]
    async fn test_handle_uplink_message_success() {
        let mut mock_repo = MockReadingRepository::new();
        mock_repo
            .expect_insert()
            .withf(|reading: &Reading| reading.device_id == "backyard")
            .times(1)
            .returning(|_| Ok(()));

        handle_uplink_message(
            &service(mock_repo),
            "redenv",
            "redenv/devices/backyard/up",
            &body("backyard", BACKYARD_BASE64),
        )
        .await;
    }

    #[tokio::test]
    async fn test_handle_uplink_message_app_mismatch() {
        let mut mock_repo = MockReadingRepository::new();
        mock_repo.expect_insert().times(0);

        handle_uplink_message(
            &service(mock_repo),
            "redenv",
            "other-app/devices/backyard/up",
            &body("backyard", BACKYARD_BASE64),
        )
        .await;
    }

    #[tokio::test]
    async fn test_handle_uplink_message_invalid_topic() {
        let mut mock_repo = MockReadingRepository::new();
        mock_repo.expect_insert().times(0);

        handle_uplink_message(
            &service(mock_repo),
            "redenv",
            "redenv/devices/backyard/events/activations",
            &body("backyard", BACKYARD_BASE64),
        )
        .await;
    }

    #[tokio::test]
    async fn test_handle_uplink_message_bad_json() {
        let mut mock_repo = MockReadingRepository::new();
        mock_repo.expect_insert().times(0);

        handle_uplink_message(
            &service(mock_repo),
            "redenv",
            "redenv/devices/backyard/up",
            b"{not json",
        )
        .await;
    }

    #[tokio::test]
    async fn test_handle_uplink_message_device_mismatch() {
        let mut mock_repo = MockReadingRepository::new();
        mock_repo.expect_insert().times(0);

        handle_uplink_message(
            &service(mock_repo),
            "redenv",
            "redenv/devices/backyard/up",
            &body("frontyard", BACKYARD_BASE64),
        )
        .await;
    }

    #[tokio::test]
    async fn test_handle_uplink_message_decode_failure_is_swallowed() {
        let mut mock_repo = MockReadingRepository::new();
        mock_repo.expect_insert().times(0);

        // 36 bytes: no layout matches
        handle_uplink_message(
            &service(mock_repo),
            "redenv",
            "redenv/devices/backyard/up",
            &body("backyard", "4wcKHRAPFw0AAAAAexTSQQAAAADYmEEH98VH////////zP8A"),
        )
        .await;
    }

    #[tokio::test]
    async fn test_acquire_or_cancel_returns_a_free_permit() {
        let limiter = Arc::new(Semaphore::new(1));
        let ctx = CancellationToken::new();

        let permit = acquire_or_cancel(&limiter, &ctx).await.unwrap();

        assert!(permit.is_some());
        assert_eq!(limiter.available_permits(), 0);
    }

    #[tokio::test]
    async fn test_acquire_or_cancel_gives_up_on_shutdown_at_the_limit() {
        let limiter = Arc::new(Semaphore::new(1));
        let _held = Arc::clone(&limiter).acquire_owned().await.unwrap();
        let ctx = CancellationToken::new();

        let waiter = tokio::spawn({
            let limiter = Arc::clone(&limiter);
            let ctx = ctx.clone();
            async move { acquire_or_cancel(&limiter, &ctx).await }
        });
        tokio::task::yield_now().await;
        ctx.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("acquire did not observe cancellation")
            .unwrap();
        assert!(result.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_acquire_or_cancel_reports_a_closed_limiter() {
        let limiter = Arc::new(Semaphore::new(0));
        limiter.close();

        assert!(acquire_or_cancel(&limiter, &CancellationToken::new())
            .await
            .is_err());
    }

    #[test]
    fn test_default_config() {
        let config = TtnSubscriberConfig::default();
        assert_eq!(config.port, 1883);
        assert_eq!(config.max_in_flight_uplinks, 10);
        assert!(config.username.is_none());
    }
}
