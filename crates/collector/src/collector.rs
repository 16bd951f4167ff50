use crate::domain::IngestionService;
use crate::ttn::{TtnSubscriber, TtnSubscriberConfig};
use chrono_tz::Tz;
use common::domain::ReadingRepository;
use redenv_payload::TimestampReconciler;
use redenv_runner::{AppProcess, ProcessFuture};
use std::sync::Arc;
use tracing::info;

pub struct CollectorConfig {
    pub subscriber: TtnSubscriberConfig,
    /// Zone the node clocks are set in.
    pub reference_zone: Tz,
}

/// The ingestion pipeline wired to its transport, ready to hand to the runner.
pub struct Collector {
    subscriber: TtnSubscriber,
}

impl Collector {
    pub fn new(repository: Arc<dyn ReadingRepository>, config: CollectorConfig) -> Self {
        info!(
            app_id = %config.subscriber.app_id,
            reference_zone = %config.reference_zone,
            max_in_flight_uplinks = config.subscriber.max_in_flight_uplinks,
            "initializing collector"
        );

        let service = Arc::new(IngestionService::new(
            repository,
            TimestampReconciler::new(config.reference_zone),
        ));
        let subscriber = TtnSubscriber::new(config.subscriber, service);

        Self { subscriber }
    }

    pub fn into_runner_processes(self) -> Vec<(&'static str, AppProcess)> {
        let subscriber = self.subscriber;
        let process: AppProcess =
            Box::new(move |ctx| -> ProcessFuture { Box::pin(subscriber.run(ctx)) });
        vec![("ttn-subscriber", process)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::MockReadingRepository;

    #[test]
    fn test_collector_exposes_one_process() {
        let collector = Collector::new(
            Arc::new(MockReadingRepository::new()),
            CollectorConfig {
                subscriber: TtnSubscriberConfig::default(),
                reference_zone: chrono_tz::America::Los_Angeles,
            },
        );

        let processes = collector.into_runner_processes();
        assert_eq!(processes.len(), 1);
        assert_eq!(processes[0].0, "ttn-subscriber");
    }
}
