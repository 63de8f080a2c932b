pub mod broker;
pub mod job;

pub use broker::{JobReceiver, JobSender, QueueError, channel};
pub use job::{ConversionJob, JobEnvelope};
