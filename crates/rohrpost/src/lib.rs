pub mod bridge;
pub mod catalog;
pub mod consume;
pub mod envelope;
pub mod error;
pub mod messages;
pub mod queue;
pub mod traits;
pub mod transport;
pub mod worker;

pub use bridge::{BridgeClient, BridgeServer, ReplyToken};
pub use catalog::{stream_for_subject, streams, Retention, StreamSpec};
pub use consume::run_consume_loop;
pub use envelope::Envelope;
pub use error::RohrpostError;
pub use messages::events;
pub use messages::subjects;
pub use queue::{run_purge_loop, Delivery, DurableQueue};
pub use traits::{QueuePublisher, RequestHandler, RequestSender};
pub use transport::Transport;
pub use worker::{Worker, WorkerBuilder, WorkerRunner, WorkerRunnerConfig};
