use std::collections::BTreeSet;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use tracing::info;

use tradeflow_core::{Aggregate, AggregateId, DomainError, TenantId};
use tradeflow_events::{Event, EventEnvelope, InMemoryEventBus};
use tradeflow_infra::event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use tradeflow_infra::flows;
use tradeflow_infra::projections::{Mirrored, ProjectionError};
use tradeflow_infra::workers::{ProjectionWorker, WorkerHandle};
use tradeflow_infra::{AppConfig, CommandDispatcher, DispatchError, DocumentNumbering, ReadModels};
use tradeflow_workflow::DocumentKind;

pub type EventBusHandle = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Dispatcher = CommandDispatcher<Arc<dyn EventStore>, EventBusHandle>;

/// Topic pushed for every new workflow notification.
pub const NOTIFICATION_TOPIC: &str = "notification.created";

/// Realtime message broadcasted via SSE.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub tenant_id: TenantId,
    pub topic: String,
    pub payload: JsonValue,
}

/// Everything a handler needs: the command side, the read side and the
/// realtime channel.
pub struct AppServices {
    dispatcher: Dispatcher,
    read_models: Arc<ReadModels>,
    numbering: DocumentNumbering,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
    default_tax_bps: u32,
    _worker: WorkerHandle,
}

impl AppServices {
    /// Wire services from configuration: Postgres when `DATABASE_URL` is set,
    /// the in-memory store otherwise.
    pub async fn build(config: &AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn EventStore> = match &config.database_url {
            Some(url) => {
                let store = PostgresEventStore::connect(url).await?;
                store.ensure_schema().await?;
                info!("using postgres event store");
                Arc::new(store)
            }
            None => {
                info!("using in-memory event store");
                Arc::new(InMemoryEventStore::new())
            }
        };
        Self::with_store(store, config)
    }

    /// Rebuild the read models from the log, then follow the bus.
    pub fn with_store(store: Arc<dyn EventStore>, config: &AppConfig) -> anyhow::Result<Self> {
        let bus: EventBusHandle = Arc::new(InMemoryEventBus::new());
        let read_models = Arc::new(ReadModels::in_memory());
        let numbering = DocumentNumbering::new();

        let history = store.load_all()?;
        read_models.rebuild(&history)?;
        let tenants: BTreeSet<_> = history.iter().map(|e| *e.tenant_id.as_uuid()).collect();
        numbering.seed(&read_models, tenants.into_iter().map(TenantId::from_uuid));
        info!(events = history.len(), "read models rebuilt from the event log");

        let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(config.realtime_buffer.max(1));

        let worker = {
            let read_models = read_models.clone();
            let realtime_tx = realtime_tx.clone();
            ProjectionWorker::spawn("read-models", &*bus, None, move |envelope: EventEnvelope<JsonValue>| {
                project(&read_models, &realtime_tx, &envelope)
            })?
        };

        Ok(Self {
            dispatcher: CommandDispatcher::new(store, bus),
            read_models,
            numbering,
            realtime_tx,
            default_tax_bps: config.default_tax_bps,
            _worker: worker,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn read_models(&self) -> &ReadModels {
        &self.read_models
    }

    pub fn next_number(&self, tenant_id: TenantId, kind: DocumentKind) -> String {
        self.numbering.next(tenant_id, kind)
    }

    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }

    pub fn default_tax_bps(&self) -> u32 {
        self.default_tax_bps
    }

    /// Load a master record straight from its stream.
    pub fn record<A: Mirrored>(&self, tenant_id: TenantId, id: AggregateId) -> Result<A, DispatchError> {
        flows::load_record(&self.dispatcher, tenant_id, id)
    }

    /// Dispatch a command to a master record and return its fresh state.
    pub fn dispatch_record<A>(&self, tenant_id: TenantId, id: AggregateId, command: A::Command) -> Result<A, DispatchError>
    where
        A: Mirrored + Aggregate<Error = DomainError>,
        A::Event: Event + Serialize,
    {
        self.dispatcher
            .dispatch(tenant_id, id, A::aggregate_type(), command, |_, id| A::unborn(id))?;
        self.record(tenant_id, id)
    }
}

/// Apply one committed envelope and fan the results out on the realtime channel.
fn project(
    read_models: &ReadModels,
    realtime_tx: &broadcast::Sender<RealtimeMessage>,
    envelope: &EventEnvelope<JsonValue>,
) -> Result<(), ProjectionError> {
    let created = read_models.apply(envelope)?;

    // Lossy: nobody listening is fine.
    let _ = realtime_tx.send(RealtimeMessage {
        tenant_id: envelope.tenant_id(),
        topic: format!("{}.updated", envelope.aggregate_type()),
        payload: json!({
            "aggregate_type": envelope.aggregate_type(),
            "aggregate_id": envelope.aggregate_id().to_string(),
            "sequence_number": envelope.sequence_number(),
        }),
    });

    for notification in created {
        let payload = serde_json::to_value(&notification).unwrap_or(JsonValue::Null);
        let _ = realtime_tx.send(RealtimeMessage {
            tenant_id: notification.tenant_id,
            topic: NOTIFICATION_TOPIC.to_string(),
            payload,
        });
    }
    Ok(())
}

pub fn tenant_sse_stream(
    services: Arc<AppServices>,
    tenant_id: TenantId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if m.tenant_id == tenant_id => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
