use serde::Deserialize;

/// App-level MQ configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    /// Redis connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_mq_url")]
    pub url: String,
    /// Connection pool size. Default: 5.
    #[serde(default = "default_mq_pool_size")]
    pub pool_size: u8,
    /// Queue carrying report jobs (producer publishes, worker consumes). Default: "report_jobs".
    #[serde(default = "default_mq_queue_name")]
    pub queue_name: String,
    /// How long a single receive call waits for messages. Default: 1000.
    #[serde(default = "default_mq_receive_wait_ms")]
    pub receive_wait_ms: u64,
}

fn default_mq_url() -> String {
    "redis://localhost:6379".into()
}
fn default_mq_pool_size() -> u8 {
    5
}
fn default_mq_queue_name() -> String {
    "report_jobs".into()
}
fn default_mq_receive_wait_ms() -> u64 {
    1000
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            url: default_mq_url(),
            pool_size: default_mq_pool_size(),
            queue_name: default_mq_queue_name(),
            receive_wait_ms: default_mq_receive_wait_ms(),
        }
    }
}
