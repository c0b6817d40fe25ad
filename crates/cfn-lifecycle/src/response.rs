//! The response envelope returned to CloudFormation.
use snafu::prelude::*;

use crate::{Request, Result, SerializeResponseSnafu};

/// CloudFormation rejects response bodies larger than this.
pub const MAX_RESPONSE_BYTES: usize = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Failed,
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Status::Success => "SUCCESS",
            Status::Failed => "FAILED",
        })
    }
}

/// Values returned to dependents of the custom resource, readable in a
/// template with `Fn::GetAtt`.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ResponseData(serde_json::Map<String, serde_json::Value>);

impl ResponseData {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// The single answer to a lifecycle request.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseEnvelope {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default)]
    pub no_echo: bool,
    #[serde(default)]
    pub data: ResponseData,
}

impl ResponseEnvelope {
    fn for_request(request: &Request, status: Status, physical_resource_id: String) -> Self {
        Self {
            status,
            reason: None,
            physical_resource_id,
            stack_id: request.stack_id.clone(),
            request_id: request.request_id.clone(),
            logical_resource_id: request.logical_resource_id.clone(),
            no_echo: false,
            data: ResponseData::default(),
        }
    }

    pub fn success(request: &Request, physical_resource_id: String, data: ResponseData) -> Self {
        Self {
            data,
            ..Self::for_request(request, Status::Success, physical_resource_id)
        }
    }

    pub fn failed(
        request: &Request,
        physical_resource_id: String,
        reason: String,
        data: ResponseData,
    ) -> Self {
        Self {
            reason: Some(reason),
            data,
            ..Self::for_request(request, Status::Failed, physical_resource_id)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Serializes the envelope into the JSON body that is sent to
    /// CloudFormation.
    ///
    /// If the body would exceed [`MAX_RESPONSE_BYTES`] the data is dropped and
    /// the reason says so. A reason that is still too long is cut short.
    pub fn to_body(&self) -> Result<String> {
        let body = serde_json::to_string(self).context(SerializeResponseSnafu)?;
        if body.len() <= MAX_RESPONSE_BYTES {
            return Ok(body);
        }

        log::warn!(
            "response for '{}' is {} bytes, dropping its data",
            self.logical_resource_id,
            body.len()
        );
        let note = format!(
            "response of {} bytes exceeded {MAX_RESPONSE_BYTES} bytes, data dropped",
            body.len()
        );
        let mut reason = match self.reason.as_deref() {
            Some(reason) if !reason.is_empty() => format!("{reason} ({note})"),
            _ => note,
        };
        loop {
            let truncated = Self {
                reason: Some(reason.clone()),
                data: ResponseData::default(),
                ..self.clone()
            };
            let body = serde_json::to_string(&truncated).context(SerializeResponseSnafu)?;
            if body.len() <= MAX_RESPONSE_BYTES || reason.is_empty() {
                return Ok(body);
            }
            let overflow = body.len() - MAX_RESPONSE_BYTES;
            let mut keep = reason.len().saturating_sub(overflow + 3);
            while !reason.is_char_boundary(keep) {
                keep -= 1;
            }
            reason.truncate(keep);
            if keep > 0 {
                reason.push_str("...");
            }
        }
    }
}
