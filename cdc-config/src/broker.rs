use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityProtocol {
    #[serde(rename = "SSL")]
    Ssl,
    #[serde(rename = "SASL_SSL")]
    SaslSsl,
    #[serde(rename = "SASL_PLAINTEXT")]
    SaslPlaintext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaslMechanism {
    #[serde(rename = "PLAIN")]
    Plain,
    #[serde(rename = "SCRAM_SHA_256")]
    ScramSha256,
    #[serde(rename = "SCRAM_SHA_512")]
    ScramSha512,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Truststore {
    pub path: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerSecurity {
    pub protocol: SecurityProtocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<SaslMechanism>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truststore: Option<Truststore>,
}

/// The `kafka:` block of the YAML document (spec §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerSpec {
    pub brokers: Vec<String>,
    #[serde(rename = "topicPattern")]
    pub topic_pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<BrokerSecurity>,
    #[serde(default, rename = "producerProperties", skip_serializing_if = "HashMap::is_empty")]
    pub producer_properties: HashMap<String, String>,
}

impl BrokerSpec {
    /// Substitutes `{database}`/`{table}` into `topic_pattern`, then replaces
    /// any character invalid for a broker topic name with `_` (spec §4.5).
    pub fn resolve_topic(&self, database: &str, table: &str) -> String {
        let substituted = self.topic_pattern.replace("{database}", database).replace("{table}", table);
        substituted
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn spec(pattern: &str) -> BrokerSpec {
        BrokerSpec {
            brokers: vec!["localhost:9092".to_string()],
            topic_pattern: pattern.to_string(),
            security: None,
            producer_properties: HashMap::new(),
        }
    }

    #[test]
    fn resolve_topic_substitutes_placeholders() {
        let spec = spec("cdc.{database}.{table}");
        assert_eq!(spec.resolve_topic("cdcdb", "orders"), "cdc.cdcdb.orders");
    }

    #[test]
    fn resolve_topic_replaces_invalid_characters() {
        let spec = spec("cdc.{database}.{table}");
        assert_eq!(spec.resolve_topic("cdc db", "ord/ers"), "cdc.cdc_db.ord_ers");
    }
}
