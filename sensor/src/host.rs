use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde_json::{Map, Value};
use tracing::{info, warn};

use climate_common::{RuntimeConfig, SensorTopicConfig};

const PUBLISH_INTERVAL: Duration = Duration::from_secs(2);
/// Ticks per compressor cycle: idle, start-up ramp, steady run, wind-down.
const CYCLE_TICKS: u64 = 60;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let sensor = power_sensor_config().await;

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);

    let mut mqtt_options = MqttOptions::new("climate-power-sensor", mqtt_host, mqtt_port);
    mqtt_options.set_keep_alive(Duration::from_secs(15));

    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);

    tokio::spawn(async move {
        loop {
            if let Err(err) = eventloop.poll().await {
                warn!("sensor mqtt poll error: {err}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    });

    info!(
        "power simulator publishing to {} (field {})",
        sensor.topic, sensor.field
    );

    let mut tick: u64 = 0;
    let mut interval = tokio::time::interval(PUBLISH_INTERVAL);

    loop {
        interval.tick().await;

        let watts = simulated_power(tick);
        let payload = serde_json::to_vec(&reading_payload(&sensor.field, watts))
            .context("failed to encode power reading")?;

        mqtt.publish(sensor.topic.as_str(), QoS::AtMostOnce, false, payload)
            .await
            .context("failed to publish power reading")?;

        tick = tick.wrapping_add(1);
    }
}

async fn power_sensor_config() -> SensorTopicConfig {
    let fallback = RuntimeConfig::default().power_sensor;
    let data_dir = std::env::var("CLIMATE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.climate"));
    let path = data_dir.join("runtime.json");

    let configured = match tokio::fs::read(&path).await {
        Ok(bytes) => match serde_json::from_slice::<RuntimeConfig>(&bytes) {
            Ok(mut runtime) => {
                runtime.sanitize();
                runtime.power_sensor
            }
            Err(err) => {
                warn!("ignoring unreadable {}: {err}", path.display());
                None
            }
        },
        Err(_) => None,
    };

    configured
        .or(fallback)
        .unwrap_or_else(|| SensorTopicConfig {
            topic: "climate/power".to_string(),
            field: "power".to_string(),
        })
}

/// Deterministic compressor cycle with a small jitter, in watts.
pub fn simulated_power(tick: u64) -> f32 {
    let phase = tick % CYCLE_TICKS;
    let jitter = ((tick.wrapping_mul(7919) % 11) as f32) - 5.0;

    match phase {
        0..=9 => 4.0 + jitter.abs() * 0.4,
        10..=15 => 150.0 + (phase - 10) as f32 * 140.0 + jitter,
        16..=49 => 980.0 + jitter * 3.0,
        _ => (980.0 - (phase - 49) as f32 * 95.0).max(4.0) + jitter.abs(),
    }
}

/// Builds `{"a": {"b": W}}` for a dotted field `a.b`.
fn reading_payload(field: &str, watts: f32) -> Value {
    let rounded = (f64::from(watts) * 10.0).round() / 10.0;
    field
        .rsplit('.')
        .fold(Value::from(rounded), |inner, segment| {
            let mut object = Map::new();
            object.insert(segment.to_string(), inner);
            Value::Object(object)
        })
}

#[cfg(test)]
mod tests {
    use climate_common::extract_reading;

    use super::*;

    #[test]
    fn idle_phase_stays_below_off_threshold() {
        for tick in 0..10 {
            assert!(simulated_power(tick) < 20.0, "tick {tick}");
        }
    }

    #[test]
    fn running_phase_holds_near_steady_draw() {
        for tick in 16..50 {
            let watts = simulated_power(tick);
            assert!((960.0..=1000.0).contains(&watts), "tick {tick}: {watts}");
        }
    }

    #[test]
    fn cycle_repeats() {
        assert_eq!(simulated_power(3), simulated_power(3 + CYCLE_TICKS * 11));
    }

    #[test]
    fn payload_nests_dotted_fields() {
        let payload = serde_json::to_vec(&reading_payload("ENERGY.Power", 512.34)).unwrap();
        assert_eq!(extract_reading(&payload, "ENERGY.Power"), Some(512.3));

        let flat = serde_json::to_vec(&reading_payload("power", 4.0)).unwrap();
        assert_eq!(flat, br#"{"power":4.0}"#);
    }
}
