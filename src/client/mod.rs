pub mod error;
pub mod http;
pub mod types;

use std::future::Future;

pub use error::EndpointError;
pub use http::{EndpointHealth, HttpEndpointClient};

use crate::config::EndpointConfig;
use crate::job::{EndpointResult, GenerationParams};

/// One image-generation call against one endpoint.
///
/// Implementations never fail past this boundary: every problem ends up
/// in the returned [`EndpointResult`].
pub trait ImageGenerator: Send + Sync + 'static {
    fn generate(
        &self,
        endpoint: &EndpointConfig,
        prompt: &str,
        params: &GenerationParams,
    ) -> impl Future<Output = EndpointResult> + Send;
}
