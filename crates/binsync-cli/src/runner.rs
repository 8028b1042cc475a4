use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info};

use binsync_config::SourceConfig;
use binsync_core::{
    DialectConverter, EventSource, EventTransformer, FilterPolicy, PassthroughConverter, Position,
    RawEvent, SourcedEvent,
};
use binsync_mysql::{BinlogSource, BinlogSourceConfig, SchemaIntrospector};
use binsync_queue::{Broker, RedisBroker};
use binsync_state::{PositionStore, SqlitePositionStore};

/// Run the dispatch loop for one source until the stream ends or a
/// termination signal arrives.
///
/// Start resolution, policy resolution, and streaming happen in order; a
/// failure in the first two phases aborts before any event is read.
pub async fn run_dispatch_loop(
    config: &SourceConfig,
    password: Option<String>,
    store: &SqlitePositionStore,
    broker: &RedisBroker,
) -> Result<()> {
    let opts = mysql_async::OptsBuilder::default()
        .ip_or_hostname(config.host.clone())
        .tcp_port(config.port)
        .user(Some(config.user.clone()))
        .pass(password);

    let introspector = SchemaIntrospector::from_opts(opts.clone().into());
    let server_id = config.server_id;

    // Resume priority: persisted checkpoint, operator-configured position,
    // live head. Whichever wins is persisted before streaming begins.
    let resume = match store
        .get_position(server_id)
        .context("failed to read persisted position")?
    {
        Some(position) => {
            info!(source = %config.name, position = %position, "resuming from persisted checkpoint");
            position
        }
        None => match config.initial_position() {
            Some(position) => {
                info!(source = %config.name, position = %position, "starting from configured position");
                position
            }
            None => {
                let position = introspector
                    .head_position()
                    .await
                    .context("failed to resolve source head position")?;
                info!(source = %config.name, position = %position, "starting from source head");
                position
            }
        },
    };
    store
        .set_position(server_id, &resume)
        .context("failed to persist start position")?;

    // Key shapes and column names are resolved once here; a schema
    // migration mid-run is only picked up after restart.
    let mut shapes = Vec::new();
    let mut columns = HashMap::new();
    for table in config.table_ids() {
        let key = introspector
            .primary_key(&table)
            .await
            .with_context(|| format!("failed to resolve primary key shape for {}", table))?;
        let names = introspector
            .column_names(&table)
            .await
            .with_context(|| format!("failed to resolve columns for {}", table))?;
        columns.insert(table.clone(), names);
        shapes.push((table, key));
    }

    let policy = FilterPolicy::new(
        config.skip_op_kinds().context("invalid skip_ops")?,
        config.skip_delete_tables.iter().cloned(),
        config.skip_update_tables.iter().cloned(),
    )
    .with_auto_skips(shapes);
    let transformer = EventTransformer::new(policy, PassthroughConverter);
    let watched = config.watched_tables();

    let mut source = BinlogSource::connect(
        BinlogSourceConfig {
            opts: opts.into(),
            server_id,
            resume: resume.clone(),
        },
        watched.clone(),
        columns,
    )
    .await
    .context("failed to open binlog stream")?;

    introspector.disconnect().await.ok();

    let last = stream_events(
        &mut source,
        &transformer,
        broker,
        store,
        server_id,
        &watched,
        Duration::from_secs(config.report_interval_secs),
        shutdown_signal(),
    )
    .await?;

    match last {
        Some(position) => {
            info!(source = %config.name, position = %position, "shutdown complete, last committed checkpoint")
        }
        None => {
            info!(source = %config.name, position = %resume, "shutdown complete, no events checkpointed this run")
        }
    }
    Ok(())
}

/// The streaming phase: one raw event at a time, send every derived change
/// to the broker, then advance the checkpoint to the position the decoder
/// reported for that raw event, never before the sends succeeded.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn stream_events<S, C, B, P>(
    source: &mut S,
    transformer: &EventTransformer<C>,
    broker: &B,
    store: &P,
    server_id: u32,
    watched: &HashMap<String, HashSet<String>>,
    report_interval: Duration,
    shutdown: impl Future<Output = ()>,
) -> Result<Option<Position>>
where
    S: EventSource,
    C: DialectConverter,
    B: Broker,
    P: PositionStore,
{
    let mut last_checkpoint = None;
    let mut dispatched: u64 = 0;
    let mut last_report = Instant::now();
    tokio::pin!(shutdown);

    loop {
        // The termination signal is honored only between raw events, so a
        // raw event's derived changes are either fully sent and
        // checkpointed or re-read after restart.
        let next = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("termination signal received");
                break;
            }
            next = source.next_event() => next.context("replication stream failed")?,
        };
        let Some(SourcedEvent { event, position }) = next else {
            info!("replication stream ended");
            break;
        };

        if !is_watched(&event, watched) {
            debug!(
                schema = event.schema(),
                table = ?event.table_name(),
                "event outside configured set, discarding"
            );
            continue;
        }

        let changes = transformer.transform(&event);
        for change in &changes {
            broker
                .send(change, &change.schema)
                .await
                .context("failed to hand event to queue")?;
        }
        store
            .set_position(server_id, &position)
            .context("failed to persist checkpoint")?;
        dispatched += changes.len() as u64;
        last_checkpoint = Some(position);

        if last_report.elapsed() >= report_interval {
            info!(
                count = dispatched,
                interval_secs = report_interval.as_secs(),
                "events dispatched since last report"
            );
            dispatched = 0;
            last_report = Instant::now();
        }
    }

    Ok(last_checkpoint)
}

fn is_watched(event: &RawEvent, watched: &HashMap<String, HashSet<String>>) -> bool {
    match watched.get(event.schema()) {
        Some(tables) => event.table_name().map_or(true, |t| tables.contains(t)),
        None => false,
    }
}

/// Resolves when the process receives SIGINT or SIGTERM.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
