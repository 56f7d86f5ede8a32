use crate::core::error::PromptgenError;
use crate::providers::ProviderHttpSpec;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;

pub type ByteStream = BoxStream<'static, Result<Vec<u8>, PromptgenError>>;

#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub struct HttpStreamReply {
    pub status: u16,
    pub body: ByteStream,
}

impl HttpStreamReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drains the body, used to read error payloads of rejected streams.
    pub async fn into_text(self) -> Result<String, PromptgenError> {
        let mut bytes = Vec::new();
        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// One POST per call, no retries. Status codes are returned, not raised,
/// so callers can turn them into provider errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, spec: &ProviderHttpSpec) -> Result<HttpReply, PromptgenError>;

    async fn post_stream(&self, spec: &ProviderHttpSpec)
    -> Result<HttpStreamReply, PromptgenError>;
}

#[derive(Clone, Default)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> Result<Self, PromptgenError> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }

    fn request(&self, spec: &ProviderHttpSpec) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(&spec.url)
            .header("Content-Type", "application/json");

        for (key, value) in &spec.headers {
            request = request.header(key, value);
        }

        request.json(&spec.body)
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn post_json(&self, spec: &ProviderHttpSpec) -> Result<HttpReply, PromptgenError> {
        let response = self.request(spec).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpReply { status, body })
    }

    async fn post_stream(
        &self,
        spec: &ProviderHttpSpec,
    ) -> Result<HttpStreamReply, PromptgenError> {
        let response = self.request(spec).send().await?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|item| item.map(|chunk| chunk.to_vec()).map_err(PromptgenError::from))
            .boxed();
        Ok(HttpStreamReply { status, body })
    }
}
