use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use tradeflow_core::TenantId;
use tradeflow_events::{EventBus, Subscription, TenantScoped};

/// Handle to stop and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            if j.join().is_err() {
                warn!(worker = self.name, "projection worker panicked");
            }
        }
    }
}

/// Drains a bus subscription on a dedicated thread.
///
/// The handler must be idempotent (delivery is at-least-once). Handler errors
/// are logged and the loop keeps going; one bad event must not stall the
/// read models of every tenant.
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// `tenant_id`: when set, messages of other tenants are skipped.
    pub fn spawn<M, B, H, E>(
        name: &'static str,
        bus: &B,
        tenant_id: Option<TenantId>,
        mut handler: H,
    ) -> io::Result<WorkerHandle>
    where
        M: TenantScoped + Send + 'static,
        B: EventBus<M> + ?Sized,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, tenant_id, &mut handler))?;

        info!(worker = name, "projection worker started");
        Ok(WorkerHandle {
            name,
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, H, E>(
    name: &'static str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    tenant_id: Option<TenantId>,
    handler: &mut H,
) where
    M: TenantScoped,
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Display,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if tenant_id.is_some_and(|t| msg.tenant_id() != t) {
                    continue;
                }
                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = %err, "projection worker handler failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    info!(worker = name, "projection worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    use serde_json::{Value as JsonValue, json};
    use uuid::Uuid;

    use tradeflow_core::AggregateId;
    use tradeflow_events::{EventEnvelope, InMemoryEventBus};

    fn wait_for(seen: &Arc<Mutex<Vec<u64>>>, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while seen.lock().unwrap().len() < n && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn worker_only_handles_its_tenant_and_stops_on_shutdown() {
        let bus: InMemoryEventBus<EventEnvelope<JsonValue>> = InMemoryEventBus::new();
        let (mine, other) = (TenantId::new(), TenantId::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let handle = ProjectionWorker::spawn("test-worker", &bus, Some(mine), move |env: EventEnvelope<JsonValue>| {
            sink.lock().unwrap().push(env.sequence_number());
            Ok::<_, String>(())
        })
        .unwrap();

        let stream = AggregateId::new();
        for (tenant, seq) in [(other, 1), (mine, 1), (mine, 2)] {
            bus.publish(EventEnvelope::new(Uuid::now_v7(), tenant, stream, "x", seq, json!({})))
                .unwrap();
        }

        wait_for(&seen, 2);
        handle.shutdown();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }
}
