pub mod log;
pub mod mqtt;

pub use self::log::LogNotifier;
pub use self::mqtt::MqttNotifier;
