pub mod client;
pub mod compress;
pub mod error;
pub mod imaging;
pub mod info;
pub mod outputs;
pub mod pipeline;
pub mod retry;
pub mod staging;
pub mod validate;

pub use client::{RemoteTaskClient, WaitOutcome, WaitReport};
pub use error::ProcessError;
pub use imaging::{default_codec, CodecError, ImageCodec};
pub use info::{describe_image, format_file_size, ImageInfo};
pub use outputs::{SaveReport, SaveStatus};
pub use pipeline::{ProcessReport, ProcessStatus};
