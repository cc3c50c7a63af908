use async_trait::async_trait;

use super::resolver::ResourceHandle;
use super::StatusCallback;
use crate::credentials::Credentials;
use crate::pipeline::error::StageError;

/// Extracts text (a transcript) from a resolved input.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(
        &self,
        input: &ResourceHandle,
        credentials: &Credentials,
        on_status: StatusCallback<'_>,
    ) -> Result<String, StageError>;
}

/// Produces the final artifact from text and returns its URL.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        credentials: &Credentials,
        on_status: StatusCallback<'_>,
    ) -> Result<String, StageError>;
}
