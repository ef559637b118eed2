use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use lirc_thermostat_common::{
    AccessoryConfig, DisplayUnits, HeatingCoolingMode, TOPIC_CMD_STATE, TOPIC_CMD_TARGET,
    TOPIC_CMD_UNITS, TOPIC_STATE,
};

use crate::{
    accessory::ThermostatAccessory,
    lirc::{LircBackend, LircTransport},
};

type Accessory = ThermostatAccessory<LircBackend>;

#[derive(Clone)]
struct AppState {
    accessory: Accessory,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct ValueBody<T> {
    value: T,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const STATE_PUBLISH_INTERVAL: Duration = Duration::from_secs(10);

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var("THERMOSTAT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.thermostat/accessory.json"));
    let config = load_accessory_config(&config_path)
        .await
        .unwrap_or_else(|err| {
            warn!(
                "failed to load accessory config from {}: {err:#}",
                config_path.display()
            );
            AccessoryConfig::default()
        });

    let backend = match config.lirc.clone() {
        Some(lirc) => LircBackend::Daemon(LircTransport::start(lirc).await?),
        None => {
            warn!("lirc config not found, commands will be dropped");
            LircBackend::disabled()
        }
    };

    let accessory = ThermostatAccessory::new(&config, Arc::new(backend));
    accessory.spawn_dispatcher();
    info!(
        "{} ready, debounce {} ms",
        accessory.information().name,
        config.debounce_ms()
    );

    if let Some(mqtt_options) = mqtt_options_from_env() {
        let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);
        subscribe_topics(&mqtt).await?;
        spawn_mqtt_loop(accessory.clone(), eventloop);
        spawn_state_publish_loop(accessory.clone(), mqtt);
    }

    let app = router(AppState { accessory });

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
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/accessory", get(handle_get_accessory))
        .route("/api/state/current", get(handle_get_current_state))
        .route(
            "/api/state/target",
            get(handle_get_target_state).post(handle_set_target_state),
        )
        .route(
            "/api/temperature/current",
            get(handle_get_current_temperature),
        )
        .route(
            "/api/temperature/target",
            get(handle_get_target_temperature).post(handle_set_target_temperature),
        )
        .route(
            "/api/units",
            get(handle_get_units).post(handle_set_units),
        )
        .route(
            "/api/transport/diagnostics",
            get(handle_get_transport_diagnostics),
        )
        .with_state(app_state)
}

async fn load_accessory_config(path: &Path) -> anyhow::Result<AccessoryConfig> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(serde_json::from_slice::<AccessoryConfig>(&raw)?),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!("no accessory config at {}, using defaults", path.display());
            Ok(AccessoryConfig::default())
        }
        Err(err) => Err(err.into()),
    }
}

fn mqtt_options_from_env() -> Option<MqttOptions> {
    let mqtt_host = std::env::var("MQTT_HOST").ok()?;
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);

    let mut mqtt_options = MqttOptions::new("lirc-thermostat-controller", mqtt_host, mqtt_port);
    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }
    Some(mqtt_options)
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    for topic in [TOPIC_CMD_STATE, TOPIC_CMD_TARGET, TOPIC_CMD_UNITS] {
        mqtt.subscribe(topic, QoS::AtMostOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(accessory: Accessory, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&accessory, &message.topic, &message.payload).await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
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

fn spawn_state_publish_loop(accessory: Accessory, mqtt: AsyncClient) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATE_PUBLISH_INTERVAL);
        loop {
            interval.tick().await;

            match serde_json::to_vec(&accessory.snapshot().await) {
                Ok(body) => {
                    if let Err(err) = mqtt.publish(TOPIC_STATE, QoS::AtLeastOnce, true, body).await
                    {
                        warn!("thermostat state publish failed: {err}");
                    }
                }
                Err(err) => warn!("thermostat state serialization failed: {err}"),
            }
        }
    });
}

async fn handle_mqtt_message(
    accessory: &Accessory,
    topic: &str,
    payload: &[u8],
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = std::str::from_utf8(payload).context("non utf8 mqtt payload")?;
    let message = message.trim();

    match topic {
        TOPIC_CMD_STATE => match parse_mode(message) {
            Some(index) => {
                let _ = accessory.set_target_heating_cooling_state(index).await;
            }
            None => debug!("ignoring invalid state payload {message:?}"),
        },
        TOPIC_CMD_TARGET => match message.parse::<f64>() {
            Ok(value) if value.is_finite() => {
                let _ = accessory.set_target_temperature(value).await;
            }
            _ => debug!("ignoring invalid target payload {message:?}"),
        },
        TOPIC_CMD_UNITS => match parse_units(message) {
            Some(units) => accessory.set_temperature_display_units(units).await,
            None => debug!("ignoring invalid units payload {message:?}"),
        },
        _ => {}
    }

    Ok(())
}

/// Accepts either the characteristic value or the mode name. Unknown
/// numeric values pass through so the model can reject them.
fn parse_mode(message: &str) -> Option<u8> {
    if let Ok(index) = message.parse::<u8>() {
        return Some(index);
    }
    let upper = message.to_ascii_uppercase();
    [
        HeatingCoolingMode::Off,
        HeatingCoolingMode::Heat,
        HeatingCoolingMode::Cool,
        HeatingCoolingMode::Auto,
    ]
    .into_iter()
    .find(|mode| mode.as_str() == upper)
    .map(HeatingCoolingMode::index)
}

fn parse_units(message: &str) -> Option<DisplayUnits> {
    match message.to_ascii_uppercase().as_str() {
        "C" | "CELSIUS" => Some(DisplayUnits::Celsius),
        "F" | "FAHRENHEIT" => Some(DisplayUnits::Fahrenheit),
        other => other.parse::<u8>().ok().and_then(DisplayUnits::from_index),
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.accessory.snapshot().await)
}

async fn handle_get_accessory(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.accessory.information().clone())
}

async fn handle_get_current_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(ValueBody {
        value: state.accessory.current_heating_cooling_state().await,
    })
}

async fn handle_get_target_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(ValueBody {
        value: state.accessory.target_heating_cooling_state().await,
    })
}

async fn handle_set_target_state(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(index) = parse_mode(value) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid heating cooling state");
    };

    let _ = state.accessory.set_target_heating_cooling_state(index).await;
    StatusCode::NO_CONTENT.into_response()
}

async fn handle_get_current_temperature(State(state): State<AppState>) -> impl IntoResponse {
    Json(ValueBody {
        value: state.accessory.current_temperature().await,
    })
}

async fn handle_get_target_temperature(State(state): State<AppState>) -> impl IntoResponse {
    Json(ValueBody {
        value: state.accessory.target_temperature().await,
    })
}

async fn handle_set_target_temperature(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(target) = value.parse::<f64>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid temperature value");
    };
    if !target.is_finite() {
        return error_response(StatusCode::BAD_REQUEST, "Invalid temperature value");
    }

    let _ = state.accessory.set_target_temperature(target).await;
    StatusCode::NO_CONTENT.into_response()
}

async fn handle_get_units(State(state): State<AppState>) -> impl IntoResponse {
    Json(ValueBody {
        value: state.accessory.temperature_display_units().await,
    })
}

async fn handle_set_units(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };

    match parse_units(value) {
        Some(units) => state.accessory.set_temperature_display_units(units).await,
        None => debug!("ignoring invalid display units {value:?}"),
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn handle_get_transport_diagnostics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.accessory.transport().diagnostics().await)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mode_accepts_names_and_values() {
        assert_eq!(parse_mode("1"), Some(1));
        assert_eq!(parse_mode("cool"), Some(2));
        assert_eq!(parse_mode("AUTO"), Some(3));
        assert_eq!(parse_mode("7"), Some(7));
        assert_eq!(parse_mode("warm"), None);
    }

    #[test]
    fn parse_units_accepts_letters_and_values() {
        assert_eq!(parse_units("c"), Some(DisplayUnits::Celsius));
        assert_eq!(parse_units("1"), Some(DisplayUnits::Fahrenheit));
        assert_eq!(parse_units("2"), None);
    }

    #[tokio::test]
    async fn missing_config_file_yields_defaults() {
        let path = std::env::temp_dir().join("lirc-thermostat-missing/accessory.json");
        let config = load_accessory_config(&path).await.unwrap();
        assert_eq!(config, AccessoryConfig::default());
    }

    #[tokio::test(start_paused = true)]
    async fn mqtt_commands_reach_accessory() {
        let config: AccessoryConfig = serde_json::from_str(
            r#"{ "debounceTime": 50, "stateCommands": { "HEAT": "CMD_HEAT" } }"#,
        )
        .unwrap();
        let accessory = ThermostatAccessory::new(&config, Arc::new(LircBackend::disabled()));
        accessory.spawn_dispatcher();

        handle_mqtt_message(&accessory, TOPIC_CMD_STATE, b"heat")
            .await
            .unwrap();
        handle_mqtt_message(&accessory, TOPIC_CMD_UNITS, b"C")
            .await
            .unwrap();
        assert_eq!(
            accessory.temperature_display_units().await,
            DisplayUnits::Celsius
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(
            accessory.current_heating_cooling_state().await,
            HeatingCoolingMode::Heat
        );
        let diagnostics = accessory.transport().diagnostics().await;
        assert_eq!(diagnostics.last_command.as_deref(), Some("CMD_HEAT"));
    }
}
