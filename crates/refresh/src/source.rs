use async_trait::async_trait;
use common::Error;
use openaq_client::OpenAqClient;
use serde_json::Value;

/// Capability the pipeline fetches raw location records through.
#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn fetch_locations(&self, limit: usize) -> Result<Vec<Value>, Error>;
}

/// Records come back with latest sensor values already merged in, so the
/// cached location set carries everything the normalizer needs.
#[async_trait]
impl LocationSource for OpenAqClient {
    async fn fetch_locations(&self, limit: usize) -> Result<Vec<Value>, Error> {
        self.fetch_locations_with_latest(limit).await
    }
}
