//! Delivery of response envelopes.
use std::future::Future;

use snafu::prelude::*;

use crate::{
    Config, HttpClientSnafu, RespondSnafu, RespondStatusSnafu, ResponseEnvelope, Result,
};

/// Delivers an envelope to the party waiting on it.
pub trait ResponseSink {
    fn send(
        &self,
        response_url: &str,
        envelope: &ResponseEnvelope,
    ) -> impl Future<Output = Result<()>>;
}

/// Sends envelopes to the pre-signed S3 URL CloudFormation puts in each
/// request.
pub struct HttpSink {
    client: reqwest::Client,
}

impl HttpSink {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.response_timeout_secs))
            .build()
            .context(HttpClientSnafu)?;
        Ok(Self { client })
    }
}

impl ResponseSink for HttpSink {
    async fn send(&self, response_url: &str, envelope: &ResponseEnvelope) -> Result<()> {
        let body = envelope.to_body()?;
        log::info!(
            "sending {} for '{}'",
            envelope.status,
            envelope.logical_resource_id
        );
        log::trace!("  {body}");
        let response = self
            .client
            .put(response_url)
            // the URL is signed without a content type
            .header(reqwest::header::CONTENT_TYPE, "")
            .body(body)
            .send()
            .await
            .context(RespondSnafu {
                logical_resource_id: envelope.logical_resource_id.clone(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return RespondStatusSnafu {
                logical_resource_id: envelope.logical_resource_id.clone(),
                status: status.as_u16(),
                body,
            }
            .fail();
        }
        log::debug!("  delivered with {status}");
        Ok(())
    }
}
