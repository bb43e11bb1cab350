use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};

use tally_sources::SourceKind;
use tally_sync::{SyncNamespaceResult, Trigger};

use crate::error::{io_err, DaemonError};
use crate::paths::{namespaces_root, socket_path};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Per-namespace last-successful-cycle timestamps (Unix seconds).
pub type CycleTimestamps = BTreeMap<String, u64>;

/// Where the daemon keeps namespaces and listens, and which source answers
/// snapshot triggers.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub root: PathBuf,
    pub socket: PathBuf,
    pub source: SourceKind,
}

impl DaemonConfig {
    /// `<home>/.tally/namespaces` and `<home>/.tally/tally.sock`.
    pub fn for_home(home: &Path, source: SourceKind) -> Self {
        Self {
            root: namespaces_root(home),
            socket: socket_path(home),
            source,
        }
    }
}

struct CycleJob {
    trigger: Trigger,
    origin: &'static str,
    respond_to: oneshot::Sender<Result<CycleSummary, String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub namespace: String,
    pub variant: String,
    pub source: String,
    pub origin: String,
    pub written: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub delete_failures: usize,
    pub index_len: usize,
    pub duration_ms: u64,
}

#[derive(Clone)]
struct DaemonState {
    config: Arc<DaemonConfig>,
    timestamps: Arc<RwLock<CycleTimestamps>>,
    jobs: mpsc::Sender<CycleJob>,
    shutdown: broadcast::Sender<()>,
    started_at_unix: u64,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: DaemonConfig) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the daemon runtime.
pub async fn run(config: DaemonConfig) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&config)?;

    let config = Arc::new(config);
    let timestamps: Arc<RwLock<CycleTimestamps>> = Arc::new(RwLock::new(BTreeMap::new()));
    let (jobs_tx, jobs_rx) = mpsc::channel::<CycleJob>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let state = DaemonState {
        config: config.clone(),
        timestamps: timestamps.clone(),
        jobs: jobs_tx,
        shutdown: shutdown_tx.clone(),
        started_at_unix: unix_seconds_now(),
    };

    tracing::info!(
        root = %config.root.display(),
        socket = %config.socket.display(),
        source = %config.source,
        "daemon starting",
    );

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let result =
                cycle_processor_task(config, timestamps, jobs_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = socket_server_task(state, rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (processor_result, socket_result, signal_result) =
        tokio::join!(processor_handle, socket_handle, signal_handle);

    handle_join("cycle_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn cycle_processor_task(
    config: Arc<DaemonConfig>,
    timestamps: Arc<RwLock<CycleTimestamps>>,
    mut jobs_rx: mpsc::Receiver<CycleJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = jobs_rx.recv() => {
                let Some(job) = maybe_job else { break };

                let trigger = job.trigger.clone();
                let root = config.root.clone();
                let kind = config.source;
                let cycle_result = tokio::task::spawn_blocking(move || {
                    let source = kind.build();
                    tally_sync::run(&root, &trigger, source.as_ref(), false)
                })
                .await
                .map_err(|err| DaemonError::Protocol(format!("cycle task join error: {err}")))?;

                let outcome = match cycle_result {
                    Ok(result) => {
                        timestamps
                            .write()
                            .await
                            .insert(result.namespace.to_string(), unix_seconds_now());
                        let summary = build_cycle_summary(&result, job.origin);
                        tracing::info!(
                            namespace = %summary.namespace,
                            variant = %summary.variant,
                            written = summary.written,
                            unchanged = summary.unchanged,
                            deleted = summary.deleted,
                            duration_ms = summary.duration_ms,
                            "cycle completed",
                        );
                        Ok(summary)
                    }
                    Err(err) => {
                        tracing::error!(
                            namespace = %job.trigger.namespace(),
                            phase = %err.phase(),
                            error = %err,
                            "cycle failed",
                        );
                        Err(format!("cycle failed during {}: {err}", err.phase()))
                    }
                };

                let _ = job.respond_to.send(outcome);
            }
        }
    }

    Ok(())
}

async fn socket_server_task(
    state: DaemonState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = state.config.socket.clone();
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, state).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(stream: UnixStream, state: DaemonState) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let stop = request.cmd == "stop";
        let response = handle_request(&state, request).await;
        write_response(&mut writer, &response).await?;
        if stop {
            break;
        }
    }

    Ok(())
}

async fn handle_request(state: &DaemonState, request: DaemonRequest) -> DaemonResponse {
    match request.cmd.as_str() {
        "status" => DaemonResponse::ok(build_status_payload(state).await),
        "trigger" => {
            let Some(message) = request.message else {
                return DaemonResponse::error("trigger requires a 'message'");
            };
            let trigger = match Trigger::parse(&message) {
                Ok(trigger) => trigger,
                Err(err) => return DaemonResponse::error(DaemonError::from(err).to_string()),
            };
            match enqueue_cycle(&state.jobs, trigger, "socket").await {
                Ok(summary) => DaemonResponse::ok(json!(summary)),
                Err(err) => DaemonResponse::error(err.to_string()),
            }
        }
        "stop" => {
            let _ = state.shutdown.send(());
            DaemonResponse::ok(json!({ "stopping": true }))
        }
        other => DaemonResponse::error(format!("unknown command '{other}'")),
    }
}

async fn build_status_payload(state: &DaemonState) -> Value {
    // Snapshot timestamps (read lock, dropped before JSON assembly).
    let ts_snapshot: CycleTimestamps = state.timestamps.read().await.clone();

    let namespaces: Vec<Value> = ts_snapshot
        .iter()
        .map(|(name, last_cycle)| {
            json!({
                "name": name,
                "last_cycle_at_unix": last_cycle,
            })
        })
        .collect();

    // Daemon-wide last cycle = max of per-namespace timestamps (0 if none yet).
    let last_cycle_at_unix = ts_snapshot.values().copied().max().unwrap_or(0);

    json!({
        "running": true,
        "started_at_unix": state.started_at_unix,
        "last_cycle_at_unix": last_cycle_at_unix,
        "namespaces": namespaces,
        "source": state.config.source.to_string(),
        "socket": state.config.socket.display().to_string(),
        "root": state.config.root.display().to_string(),
    })
}

async fn enqueue_cycle(
    jobs: &mpsc::Sender<CycleJob>,
    trigger: Trigger,
    origin: &'static str,
) -> Result<CycleSummary, DaemonError> {
    let (tx, rx) = oneshot::channel();
    jobs.send(CycleJob {
        trigger,
        origin,
        respond_to: tx,
    })
    .await
    .map_err(|_| DaemonError::ChannelClosed("cycle queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("cycle response"))?;
    outcome.map_err(DaemonError::Protocol)
}

fn build_cycle_summary(result: &SyncNamespaceResult, origin: &'static str) -> CycleSummary {
    let report = &result.report;
    CycleSummary {
        namespace: result.namespace.to_string(),
        variant: result.variant.to_string(),
        source: result.source.clone(),
        origin: origin.to_string(),
        written: report.written(),
        unchanged: report.unchanged(),
        skipped: report.skipped(),
        deleted: report.deleted(),
        delete_failures: report.delete_failures(),
        index_len: report.index_len,
        duration_ms: report.duration_ms,
    }
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(config: &DaemonConfig) -> Result<(), DaemonError> {
    if !config.root.exists() {
        fs::create_dir_all(&config.root).map_err(|e| io_err(&config.root, e))?;
    }
    if let Some(parent) = config.socket.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Install the `RUST_LOG`-driven subscriber (default `info`). Library crates
/// log through `log`; the subscriber picks those records up as well.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_sync::TriggerMessage;
    use tempfile::TempDir;

    fn test_state(home: &Path) -> (DaemonState, mpsc::Receiver<CycleJob>, broadcast::Receiver<()>) {
        let (jobs, jobs_rx) = mpsc::channel(8);
        let (shutdown, shutdown_rx) = broadcast::channel(4);
        let state = DaemonState {
            config: Arc::new(DaemonConfig::for_home(home, SourceKind::JsonFile)),
            timestamps: Arc::new(RwLock::new(CycleTimestamps::new())),
            jobs,
            shutdown,
            started_at_unix: 1_000_000,
        };
        (state, jobs_rx, shutdown_rx)
    }

    fn summary_for(trigger: &Trigger) -> CycleSummary {
        CycleSummary {
            namespace: trigger.namespace().to_string(),
            variant: trigger.variant().to_string(),
            source: "json-file".to_string(),
            origin: "socket".to_string(),
            written: 2,
            unchanged: 0,
            skipped: 0,
            deleted: 0,
            delete_failures: 0,
            index_len: 2,
            duration_ms: 1,
        }
    }

    #[tokio::test]
    async fn status_payload_before_any_cycle() {
        let home = TempDir::new().expect("home");
        let (state, _jobs, _shutdown) = test_state(home.path());

        let payload = build_status_payload(&state).await;

        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["started_at_unix"], json!(1_000_000u64));
        assert_eq!(payload["last_cycle_at_unix"], json!(0u64));
        assert_eq!(payload["source"], json!("json-file"));
        assert!(payload["namespaces"].as_array().expect("array").is_empty());
        assert!(payload["root"]
            .as_str()
            .expect("root")
            .ends_with("namespaces"));
    }

    #[tokio::test]
    async fn status_payload_includes_per_namespace_timestamps() {
        let home = TempDir::new().expect("home");
        let (state, _jobs, _shutdown) = test_state(home.path());
        {
            let mut ts = state.timestamps.write().await;
            ts.insert("source-a".to_string(), 1_000_100);
            ts.insert("source-b".to_string(), 1_000_200);
        }

        let payload = build_status_payload(&state).await;
        assert_eq!(payload["last_cycle_at_unix"], json!(1_000_200u64));
        let namespaces = payload["namespaces"].as_array().expect("array");
        assert_eq!(namespaces.len(), 2);
        assert_eq!(namespaces[0]["name"], json!("source-a"));
        assert_eq!(namespaces[0]["last_cycle_at_unix"], json!(1_000_100u64));
    }

    #[tokio::test]
    async fn trigger_request_is_queued_and_answered() {
        let home = TempDir::new().expect("home");
        let (state, mut jobs_rx, _shutdown) = test_state(home.path());

        tokio::spawn(async move {
            while let Some(job) = jobs_rx.recv().await {
                let summary = summary_for(&job.trigger);
                let _ = job.respond_to.send(Ok(summary));
            }
        });

        let response = handle_request(
            &state,
            DaemonRequest::trigger(TriggerMessage::snapshot("source-lab")),
        )
        .await;
        assert!(response.ok, "got: {response:?}");
        let data = response.data.expect("data");
        assert_eq!(data["namespace"], json!("source-lab"));
        assert_eq!(data["variant"], json!("snapshot"));
        assert_eq!(data["written"], json!(2));
    }

    #[tokio::test]
    async fn invalid_namespace_is_rejected_without_queueing() {
        let home = TempDir::new().expect("home");
        let (state, mut jobs_rx, _shutdown) = test_state(home.path());

        let response = handle_request(
            &state,
            DaemonRequest::trigger(TriggerMessage::snapshot("not-a-source")),
        )
        .await;
        assert!(!response.ok);
        assert!(response
            .error
            .as_deref()
            .expect("error")
            .contains("must start with 'source-'"));
        assert!(jobs_rx.try_recv().is_err(), "nothing should be queued");
    }

    #[tokio::test]
    async fn failed_cycle_is_reported_as_error_response() {
        let home = TempDir::new().expect("home");
        let (state, mut jobs_rx, _shutdown) = test_state(home.path());
        tokio::spawn(async move {
            if let Some(job) = jobs_rx.recv().await {
                let _ = job
                    .respond_to
                    .send(Err("cycle failed during loading-index: boom".to_string()));
            }
        });

        let response = handle_request(
            &state,
            DaemonRequest::trigger(TriggerMessage::snapshot("source-lab")),
        )
        .await;
        assert!(!response.ok);
        assert!(response.error.expect("error").contains("loading-index"));
    }

    #[tokio::test]
    async fn stop_and_unknown_commands() {
        let home = TempDir::new().expect("home");
        let (state, _jobs, mut shutdown_rx) = test_state(home.path());

        let unknown = handle_request(&state, DaemonRequest::command("sync")).await;
        assert!(!unknown.ok);
        assert_eq!(unknown.error.as_deref(), Some("unknown command 'sync'"));

        let missing = handle_request(&state, DaemonRequest::command("trigger")).await;
        assert!(!missing.ok);

        let stop = handle_request(&state, DaemonRequest::command("stop")).await;
        assert!(stop.ok);
        shutdown_rx.recv().await.expect("shutdown signal");
    }

    #[tokio::test]
    async fn processor_runs_cycles_and_records_timestamps() {
        let home = TempDir::new().expect("home");
        let config = Arc::new(DaemonConfig::for_home(home.path(), SourceKind::JsonFile));
        let inventory = home.path().join("inventory.json");
        fs::write(&inventory, r#"{"vm-1":{"zone":"a"}}"#).expect("inventory");
        let ns_dir = config.root.join("source-lab");
        fs::create_dir_all(&ns_dir).expect("ns dir");
        fs::write(
            ns_dir.join("config.json"),
            serde_json::to_vec(&json!({ "path": inventory.display().to_string() })).unwrap(),
        )
        .expect("config");

        let timestamps = Arc::new(RwLock::new(CycleTimestamps::new()));
        let (jobs_tx, jobs_rx) = mpsc::channel(4);
        let (shutdown_tx, _) = broadcast::channel(4);
        let processor = tokio::spawn(cycle_processor_task(
            config.clone(),
            timestamps.clone(),
            jobs_rx,
            shutdown_tx.subscribe(),
        ));

        let trigger = Trigger::parse(&TriggerMessage::snapshot("source-lab")).expect("trigger");
        let summary = enqueue_cycle(&jobs_tx, trigger, "test").await.expect("cycle");
        assert_eq!(summary.written, 1);
        assert_eq!(summary.origin, "test");
        assert!(timestamps.read().await.contains_key("source-lab"));

        let missing = Trigger::parse(&TriggerMessage::snapshot("source-missing")).expect("trigger");
        let err = enqueue_cycle(&jobs_tx, missing, "test").await.unwrap_err();
        assert!(err.to_string().contains("configuration"), "got: {err}");

        let _ = shutdown_tx.send(());
        handle_join("cycle_processor", processor.await).expect("processor exits cleanly");
    }

    #[test]
    fn stale_socket_file_is_removed_before_bind() {
        let home = TempDir::new().expect("home");
        let socket = home.path().join("tally.sock");
        fs::write(&socket, b"").expect("stale file");
        prepare_socket_for_bind(&socket).expect("prepare");
        assert!(!socket.exists());
    }
}
