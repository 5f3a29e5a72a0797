use std::time::Duration;

use anyhow::Context;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tracing::{info, warn};

use hvac_common::SensorPayload;

/// Stand-in ambient sensor: publishes the JSON payload schema the controller
/// consumes. Useful for bench runs against a real broker when no hardware
/// sensor is wired up yet.
pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);
    let topic = std::env::var("SENSOR_TOPIC")
        .unwrap_or_else(|_| "sensors/room/temperature".to_string());
    let interval_secs = std::env::var("SENSOR_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(30);

    let mut mqtt_options = MqttOptions::new("hvac-sensor", mqtt_host, mqtt_port);
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

    info!(topic = %topic, "sensor publisher started");

    let mut tick: u64 = 0;
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;
        tick = tick.saturating_add(1);

        // Hardware integration point: replace the simulated reading with a
        // real probe.
        let temperature = 21.0 + ((tick % 8) as f64 * 0.1);
        let payload = serde_json::to_vec(&SensorPayload { temperature })
            .context("failed to serialize sensor payload")?;

        mqtt.publish(topic.as_str(), QoS::AtLeastOnce, false, payload)
            .await
            .context("failed to publish sensor reading")?;
    }
}
