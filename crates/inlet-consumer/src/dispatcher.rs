//! Dispatcher - routes inbound deliveries to topic-dedicated pools
//!
//! One pool per configured topic, looked up in constant time. Pools never
//! share capacity, so a saturated or slow topic cannot starve another.
//! Delivery is synchronous from the caller's perspective: `deliver` only
//! returns once the handler and decision engine have produced an outcome.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{error, info, warn};

use inlet_common::{
    ConsumerConfig, Disposition, MessageEnvelope, SubscriptionMetadata, SubscriptionSpec,
    TopicConfig, TopicPoolStats, WarningCategory, WarningSeverity,
};

use crate::deadletter::{DeadLetterHandler, DeadLetterSink};
use crate::error::ConsumerError;
use crate::handler::{SimulatedHandler, TopicHandler};
use crate::idempotency::IdempotencyTracker;
use crate::pool::TopicPool;
use crate::stats::StatsAggregator;
use crate::warning::WarningService;
use crate::Result;

/// Central delivery router over per-topic pools.
pub struct Dispatcher {
    /// Topic pools by topic name
    pools: DashMap<String, Arc<TopicPool>>,

    /// Static topic configurations, in declaration order
    topic_configs: Vec<TopicConfig>,

    dead_letter_route: String,
    dead_letter: DeadLetterHandler,

    stats: Arc<StatsAggregator>,
    idempotency: Arc<IdempotencyTracker>,
    warning_service: Arc<WarningService>,
}

impl Dispatcher {
    /// Build a dispatcher with the default simulated handlers per topic.
    pub fn new(
        config: ConsumerConfig,
        stats: Arc<StatsAggregator>,
        idempotency: Arc<IdempotencyTracker>,
        warning_service: Arc<WarningService>,
        dead_letter_sink: Arc<dyn DeadLetterSink>,
    ) -> Result<Self> {
        let handlers = config
            .topics
            .iter()
            .map(|tc| {
                let handler: Arc<dyn TopicHandler> = Arc::new(SimulatedHandler::from_config(tc));
                (tc.topic.clone(), handler)
            })
            .collect();
        Self::with_handlers(
            config,
            handlers,
            stats,
            idempotency,
            warning_service,
            dead_letter_sink,
        )
    }

    /// Build a dispatcher with explicit handlers per topic.
    pub fn with_handlers(
        config: ConsumerConfig,
        handlers: HashMap<String, Arc<dyn TopicHandler>>,
        stats: Arc<StatsAggregator>,
        idempotency: Arc<IdempotencyTracker>,
        warning_service: Arc<WarningService>,
        dead_letter_sink: Arc<dyn DeadLetterSink>,
    ) -> Result<Self> {
        validate_config(&config)?;

        let pools = DashMap::new();
        for topic_config in &config.topics {
            let handler = handlers
                .get(&topic_config.topic)
                .cloned()
                .ok_or_else(|| ConsumerError::HandlerMissing(topic_config.topic.clone()))?;

            stats.register_topic(&topic_config.topic);
            let pool = TopicPool::new(
                topic_config.clone(),
                handler,
                stats.clone(),
                idempotency.clone(),
            )
            .with_warning_service(warning_service.clone());

            info!(
                topic = %topic_config.topic,
                route = %topic_config.route,
                concurrency = topic_config.concurrency_limit,
                "Created topic pool"
            );
            pools.insert(topic_config.topic.clone(), Arc::new(pool));
        }

        let dead_letter = DeadLetterHandler::new(dead_letter_sink, stats.clone())
            .with_warning_service(warning_service.clone());

        Ok(Self {
            pools,
            topic_configs: config.topics,
            dead_letter_route: config.dead_letter_route,
            dead_letter,
            stats,
            idempotency,
            warning_service,
        })
    }

    /// Route one delivery and await its terminal disposition.
    pub async fn deliver(&self, topic: &str, envelope: MessageEnvelope) -> Disposition {
        if envelope.topic != topic {
            warn!(
                message_id = %envelope.id,
                route_topic = %topic,
                envelope_topic = %envelope.topic,
                "Envelope topic differs from route topic, routing by route"
            );
        }

        let pool = match self.pools.get(topic) {
            Some(pool) => pool.clone(),
            None => {
                // An unroutable message would retry forever; ack it and
                // alert the operator instead
                warn!(
                    message_id = %envelope.id,
                    topic = %topic,
                    "No pool for topic, acknowledging unroutable message"
                );
                self.warning_service.add_warning(
                    WarningCategory::Routing,
                    WarningSeverity::Warn,
                    format!(
                        "No handler for topic [{}], message [{}] acknowledged unprocessed",
                        topic, envelope.id
                    ),
                    "Dispatcher".to_string(),
                );
                return Disposition::Ack;
            }
        };

        match pool.submit(envelope).await {
            Ok(disposition) => disposition,
            Err(_) => {
                error!(topic = %topic, "Delivery worker dropped before reporting an outcome");
                Disposition::Retry
            }
        }
    }

    /// Handle a dead-lettered envelope. Always acks.
    pub async fn dead_letter(&self, envelope: &MessageEnvelope) -> Disposition {
        self.dead_letter.handle(envelope).await
    }

    /// Subscription table advertised to the middleware.
    pub fn subscriptions(&self) -> Vec<SubscriptionSpec> {
        self.topic_configs
            .iter()
            .map(|tc| SubscriptionSpec {
                topic: tc.topic.clone(),
                route: tc.route.clone(),
                metadata: SubscriptionMetadata {
                    consumer_group: tc.consumer_group(),
                    max_concurrency: tc.concurrency_limit,
                },
            })
            .collect()
    }

    /// (route, topic) pairs for HTTP route registration.
    pub fn routes(&self) -> Vec<(String, String)> {
        self.topic_configs
            .iter()
            .map(|tc| (tc.route.clone(), tc.topic.clone()))
            .collect()
    }

    pub fn dead_letter_route(&self) -> &str {
        &self.dead_letter_route
    }

    pub fn pool_stats(&self) -> Vec<TopicPoolStats> {
        self.topic_configs
            .iter()
            .filter_map(|tc| self.pools.get(&tc.topic).map(|p| p.get_stats()))
            .collect()
    }

    pub fn stats(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    pub fn idempotency(&self) -> &Arc<IdempotencyTracker> {
        &self.idempotency
    }

    /// Stop accepting new deliveries on every pool.
    pub fn shutdown(&self) {
        info!("Shutting down dispatcher");
        for entry in self.pools.iter() {
            entry.value().shutdown();
        }
    }
}

fn validate_config(config: &ConsumerConfig) -> Result<()> {
    if config.topics.is_empty() {
        return Err(ConsumerError::Config("no topics configured".to_string()));
    }

    let mut topics = std::collections::HashSet::new();
    let mut routes = std::collections::HashSet::new();
    for tc in &config.topics {
        if tc.concurrency_limit == 0 {
            return Err(ConsumerError::Config(format!(
                "topic [{}] has zero concurrency",
                tc.topic
            )));
        }
        if !tc.route.starts_with('/') {
            return Err(ConsumerError::Config(format!(
                "route [{}] for topic [{}] must start with '/'",
                tc.route, tc.topic
            )));
        }
        if !topics.insert(tc.topic.as_str()) {
            return Err(ConsumerError::Config(format!(
                "duplicate topic [{}]",
                tc.topic
            )));
        }
        if !routes.insert(tc.route.as_str()) {
            return Err(ConsumerError::Config(format!(
                "duplicate route [{}]",
                tc.route
            )));
        }
    }

    if !config.dead_letter_route.starts_with('/') {
        return Err(ConsumerError::Config(format!(
            "dead-letter route [{}] must start with '/'",
            config.dead_letter_route
        )));
    }
    if routes.contains(config.dead_letter_route.as_str()) {
        return Err(ConsumerError::Config(format!(
            "dead-letter route [{}] collides with a topic route",
            config.dead_letter_route
        )));
    }

    Ok(())
}
