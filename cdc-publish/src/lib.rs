mod kafka_publisher;
mod publisher;

pub use kafka_publisher::KafkaPublisher;
pub use publisher::Publisher;
