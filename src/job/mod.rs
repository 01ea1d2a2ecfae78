mod model;
mod result;
mod status;

pub use model::{
    EndpointProgress, EndpointState, GenerationParams, ImageFormat, Job, JobId, PromptOrigin,
    ReferenceImage, Submission, MAX_REFERENCE_IMAGE_BYTES,
};
pub use result::{EndpointOutcome, EndpointResult, GeneratedImage, JobResult, Timings};
pub use status::{InvalidTransition, JobStatus};
