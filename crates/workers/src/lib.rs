pub mod local;
pub mod manager;
pub mod nats;
pub mod worker;

pub use local::LocalJobQueue;
pub use manager::WorkerManager;
pub use nats::NatsJobQueue;
pub use worker::SendWorker;
