use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rumqttc::{AsyncClient, Event, Incoming, LastWill, MqttOptions, QoS};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    sync::{mpsc, Mutex},
};
use tracing::{debug, info, warn};

use climate_common::{
    extract_reading, BootstrapConfig, ClimateAction, ClimateOrchestrator, ClimateTopics,
    CommandFrame, CommandKind, DeviceConfig, Diagnostics, NetworkConfig, PowerTrackerConfig,
    RuntimeConfig, SensorTopicConfig, StatePayload, PAYLOAD_OFFLINE, PAYLOAD_ONLINE,
};

use crate::ir::{HostTransceiver, IrDiagnostics};

type Orchestrator = ClimateOrchestrator<HostTransceiver>;

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Mutex<Orchestrator>>,
    topics: Arc<ClimateTopics>,
    runtime: Arc<RuntimeConfig>,
    ir_inbox: mpsc::Sender<CommandFrame>,
    mqtt: AsyncClient,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct StatusView {
    state: StatePayload,
    diagnostics: Diagnostics,
    #[serde(rename = "nowEpoch")]
    now_epoch: i64,
}

#[derive(Debug, Serialize)]
struct DiagnosticsView {
    #[serde(flatten)]
    climate: Diagnostics,
    ir: IrDiagnostics,
}

#[derive(Debug, Serialize)]
struct NetworkConfigView {
    #[serde(rename = "mqttHost")]
    mqtt_host: String,
    #[serde(rename = "mqttPort")]
    mqtt_port: u16,
    #[serde(rename = "mqttUser")]
    mqtt_user: String,
    #[serde(rename = "mqttPassSet")]
    mqtt_pass_set: bool,
}

#[derive(Debug, Serialize)]
struct ConfigView {
    device: DeviceConfig,
    tracker: PowerTrackerConfig,
    bootstrap: BootstrapConfig,
    #[serde(rename = "powerSensor")]
    power_sensor: Option<SensorTopicConfig>,
    network: NetworkConfigView,
    topics: ClimateTopics,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const IR_INBOX_CAPACITY: usize = 16;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();
    apply_env_overrides(&mut runtime.network);

    if let Err(err) = store.ensure_runtime_config(&runtime).await {
        warn!("failed to write default runtime config: {err:#}");
    }

    let topics = ClimateTopics::for_device(&runtime.device.name);

    let mut mqtt_options = MqttOptions::new(
        format!("climate-controller-{}", topics.object_id),
        runtime.network.mqtt_host.clone(),
        runtime.network.mqtt_port,
    );
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_last_will(LastWill::new(
        topics.availability.clone(),
        PAYLOAD_OFFLINE,
        QoS::AtLeastOnce,
        true,
    ));
    if !runtime.network.mqtt_user.is_empty() {
        mqtt_options.set_credentials(
            runtime.network.mqtt_user.clone(),
            runtime.network.mqtt_pass.clone(),
        );
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);
    let shutdown_client = mqtt.clone();
    let availability_topic = topics.availability.clone();

    let (ir_inbox, ir_frames) = mpsc::channel(IR_INBOX_CAPACITY);
    let transceiver = HostTransceiver::new(ir_frames, Some((mqtt.clone(), topics.ir_send.clone())));
    let orchestrator = ClimateOrchestrator::new(&runtime, transceiver);

    info!(
        "climate device '{}' ({}) on topics {}/#",
        runtime.device.name, runtime.device.protocol, topics.object_id
    );

    let app_state = AppState {
        orchestrator: Arc::new(Mutex::new(orchestrator)),
        topics: Arc::new(topics),
        runtime: Arc::new(runtime),
        ir_inbox,
        mqtt,
    };

    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_control_loop(app_state.clone());

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/diagnostics", get(handle_get_diagnostics))
        .route("/api/command/{kind}", post(handle_post_command))
        .route("/api/config", get(handle_get_config))
        .with_state(app_state);

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_client
        .publish(availability_topic, QoS::AtLeastOnce, true, PAYLOAD_OFFLINE)
        .await
        .context("failed to publish offline availability")?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

fn apply_env_overrides(network: &mut NetworkConfig) {
    if let Ok(host) = std::env::var("MQTT_HOST") {
        network.mqtt_host = host;
    }
    if let Some(port) = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        network.mqtt_port = port;
    }
    if let Ok(user) = std::env::var("MQTT_USER") {
        network.mqtt_user = user;
    }
    if let Ok(pass) = std::env::var("MQTT_PASS") {
        network.mqtt_pass = pass;
    }
}

fn subscriptions(state: &AppState) -> Vec<String> {
    let topics = &state.topics;
    let mut list = vec![topics.state.clone(), topics.ir_received.clone()];
    list.extend(topics.commands().map(|(_, topic)| topic.to_string()));
    if let Some(sensor) = &state.runtime.power_sensor {
        list.push(sensor.topic.clone());
    }
    list
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    on_connected(&app_state).await;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

// Requests are queued without awaiting: the event loop serving them is the
// task running this.
async fn on_connected(app_state: &AppState) {
    for topic in subscriptions(app_state) {
        if let Err(err) = app_state.mqtt.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
            warn!("subscribe to {topic} failed: {err}");
        }
    }
    if let Err(err) = app_state.mqtt.try_publish(
        app_state.topics.availability.as_str(),
        QoS::AtLeastOnce,
        true,
        PAYLOAD_ONLINE,
    ) {
        warn!("availability publish failed: {err}");
    }

    app_state
        .orchestrator
        .lock()
        .await
        .begin_bootstrap(monotonic_ms());
}

fn spawn_control_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(
            app_state.runtime.bootstrap.tick_interval_ms,
        ));

        loop {
            interval.tick().await;
            let now_ms = monotonic_ms();

            let actions = {
                let mut orchestrator = app_state.orchestrator.lock().await;
                orchestrator.tick(now_ms)
            };

            if !actions.is_empty() {
                execute_actions(&app_state, actions).await;
            }
        }
    });
}

async fn execute_actions(app_state: &AppState, actions: Vec<ClimateAction>) {
    let mut failed = false;

    for action in actions {
        let (topic, body) = match &action {
            ClimateAction::PublishState(state) => {
                (app_state.topics.state.clone(), serde_json::to_vec(state))
            }
            ClimateAction::PublishDiscovery { topic, payload } => {
                (topic.clone(), serde_json::to_vec(payload))
            }
        };

        let body = match body {
            Ok(body) => body,
            Err(err) => {
                warn!("serialization for {topic} failed: {err}");
                failed = true;
                continue;
            }
        };

        debug!("publishing {} bytes to {topic}", body.len());
        if let Err(err) = app_state
            .mqtt
            .try_publish(topic.as_str(), QoS::AtLeastOnce, true, body)
        {
            warn!("publish to {topic} failed: {err}");
            failed = true;
        }
    }

    if failed {
        app_state
            .orchestrator
            .lock()
            .await
            .publish_failed(monotonic_ms());
    }
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let now_ms = monotonic_ms();
    let topics = &app_state.topics;

    if topic == topics.state {
        let mut orchestrator = app_state.orchestrator.lock().await;
        orchestrator.on_retained_state(&payload, now_ms);
        return Ok(());
    }

    if topic == topics.ir_received {
        let frame: CommandFrame =
            serde_json::from_slice(&payload).context("malformed ir frame payload")?;
        if let Err(err) = app_state.ir_inbox.try_send(frame) {
            warn!("dropping received ir frame: {err}");
        }
        return Ok(());
    }

    if let Some(kind) = topics.command_for_topic(&topic) {
        let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;
        let actions = {
            let mut orchestrator = app_state.orchestrator.lock().await;
            orchestrator.handle_command(kind, &message, now_ms)
        };
        if !actions.is_empty() {
            execute_actions(app_state, actions).await;
        }
        return Ok(());
    }

    if let Some(sensor) = &app_state.runtime.power_sensor {
        if topic == sensor.topic {
            match extract_reading(&payload, &sensor.field) {
                Some(watts) => app_state.orchestrator.lock().await.update_power(watts),
                None => debug!("no '{}' reading in power payload", sensor.field),
            }
        }
    }

    Ok(())
}

async fn build_status(state: &AppState) -> StatusView {
    let orchestrator = state.orchestrator.lock().await;
    StatusView {
        state: orchestrator.state_payload(),
        diagnostics: orchestrator.diagnostics(),
        now_epoch: Utc::now().timestamp(),
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(build_status(&state).await)
}

async fn handle_get_diagnostics(State(state): State<AppState>) -> impl IntoResponse {
    let orchestrator = state.orchestrator.lock().await;
    Json(DiagnosticsView {
        climate: orchestrator.diagnostics(),
        ir: orchestrator.transceiver().diagnostics(),
    })
}

async fn handle_post_command(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let kind = match kind.parse::<CommandKind>() {
        Ok(kind) => kind,
        Err(err) => return error_response(StatusCode::NOT_FOUND, &err.to_string()),
    };
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };

    let actions = {
        let mut orchestrator = state.orchestrator.lock().await;
        orchestrator.handle_command(kind, value, monotonic_ms())
    };
    if actions.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &format!("Unrecognized {kind} value '{value}'"),
        );
    }
    execute_actions(&state, actions).await;

    Json(build_status(&state).await).into_response()
}

async fn handle_get_config(State(state): State<AppState>) -> impl IntoResponse {
    let runtime = state.runtime.as_ref();
    Json(ConfigView {
        device: runtime.device.clone(),
        tracker: runtime.tracker.clone(),
        bootstrap: runtime.bootstrap.clone(),
        power_sensor: runtime.power_sensor.clone(),
        network: build_network_config_view(&runtime.network),
        topics: state.topics.as_ref().clone(),
    })
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("CLIMATE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.climate"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes `runtime` only when no config file exists yet, leaving a
    /// template to edit. Credentials from the environment are not written.
    async fn ensure_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.runtime_path.as_ref().clone();
        if tokio::fs::try_exists(&path).await? {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut template = runtime.clone();
        template.network.mqtt_pass = String::new();
        let payload = serde_json::to_vec_pretty(&template)?;
        tokio::fs::write(&path, payload)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("wrote default runtime config to {}", path.display());
        Ok(())
    }
}

fn build_network_config_view(network: &NetworkConfig) -> NetworkConfigView {
    NetworkConfigView {
        mqtt_host: network.mqtt_host.clone(),
        mqtt_port: network.mqtt_port,
        mqtt_user: network.mqtt_user.clone(),
        mqtt_pass_set: !network.mqtt_pass.is_empty(),
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
