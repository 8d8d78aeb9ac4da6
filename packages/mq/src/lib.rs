pub mod error;
pub mod memory;
pub mod models;
pub mod queue;

pub use error::MqError;
pub use memory::MemoryQueue;
pub use models::{BroccoliJobQueue, MqConfig, init_mq};
pub use queue::{JobQueue, ReceivedMessage};
