pub mod api;
pub mod config;
pub mod results;
pub mod task;

pub use api::{
    ApiEnvelope, ApiReply, CancelRequest, CreateTaskData, CreateTaskRequest, ResultData,
    SlotValue, StatusData, UploadData,
};
pub use config::{ClientConfig, ConfigError, ConfigOverrides, PollPolicy, RetryPolicy};
pub use results::{OutputMetadata, OutputRecord, OutputState, ResultDescriptor};
pub use task::{RequestStage, Task, TaskError, TaskId, TaskStatus};
