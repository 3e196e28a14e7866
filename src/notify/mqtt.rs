use crate::common::config::MqttConfig;
use crate::common::{DoorError, Result};
use crate::core::access::{DoorCommand, NotificationSink};
use crate::core::poller::{join_with_timeout, CancellationToken};
use chrono::Local;
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};
use serde_json::json;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_QUEUE_CAP: usize = 10;

pub fn door_state_payload(door_name: &str, state: DoorCommand) -> Vec<u8> {
    json!({ "name": door_name, "state": state.as_str() }).to_string().into_bytes()
}

pub fn unauthorized_payload(identity: &str) -> Vec<u8> {
    json!({ "name": identity, "timestamp": Local::now().to_rfc3339() }).to_string().into_bytes()
}

/// Publishes door state and intruder alerts to an MQTT broker.
///
/// The connection is driven on its own thread and reconnects on error.
/// Publishing never blocks: if the request queue is full the message is
/// dropped and reported as an error.
pub struct MqttNotifier {
    client: Client,
    door_name: String,
    control_topic: String,
    alert_topic: String,
    token: CancellationToken,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl MqttNotifier {
    pub fn connect(config: &MqttConfig) -> Result<Self> {
        let mut options = MqttOptions::new(
            config.client_id.clone(),
            config.broker_host.clone(),
            config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

        let (client, connection) = Client::new(options, REQUEST_QUEUE_CAP);
        let token = CancellationToken::new();
        let loop_token = token.clone();
        let event_loop = thread::Builder::new()
            .name("mqtt-event-loop".into())
            .spawn(move || drive_connection(connection, loop_token))?;

        info!("[MQTT] Connecting to {}:{}", config.broker_host, config.broker_port);
        Ok(Self {
            client,
            door_name: config.door_name.clone(),
            control_topic: config.control_topic.clone(),
            alert_topic: config.alert_topic.clone(),
            token,
            event_loop: Mutex::new(Some(event_loop)),
        })
    }

    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| DoorError::Notify(format!("Failed to publish to {}: {}", topic, e)))
    }

    pub fn shutdown(&self, timeout: Duration) {
        self.token.cancel();
        if let Err(e) = self.client.try_disconnect() {
            debug!("[MQTT] Disconnect request failed: {}", e);
        }
        let handle = self.event_loop.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            join_with_timeout(handle, timeout, "MQTT event loop");
        }
    }
}

fn drive_connection(mut connection: Connection, token: CancellationToken) {
    for notification in connection.iter() {
        if token.is_cancelled() {
            break;
        }
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(_))) => info!("[MQTT] Connected to broker"),
            Ok(Event::Incoming(Packet::Disconnect)) => warn!("[MQTT] Broker closed the connection"),
            Ok(_) => {}
            Err(e) => {
                warn!("[MQTT] Connection error: {}. Reconnecting in {:?}", e, RECONNECT_DELAY);
                thread::sleep(RECONNECT_DELAY);
                if token.is_cancelled() {
                    break;
                }
            }
        }
    }
    debug!("[MQTT] Event loop exited");
}

impl NotificationSink for MqttNotifier {
    fn publish_door_state(&self, state: DoorCommand) -> Result<()> {
        self.publish(&self.control_topic, door_state_payload(&self.door_name, state))?;
        info!("[MQTT] Door command '{}' sent", state);
        Ok(())
    }

    fn publish_unauthorized_alert(&self, identity: &str) -> Result<()> {
        self.publish(&self.alert_topic, unauthorized_payload(identity))?;
        info!("[MQTT] Unauthorized access alert sent for: {}", identity);
        Ok(())
    }
}
