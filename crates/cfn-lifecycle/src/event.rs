//! Lifecycle events, raw and typed.
use snafu::prelude::*;

use crate::{
    DecodeRequestSnafu, Error, InvalidPropertiesSnafu, MissingFieldSnafu, Result,
    UnknownRequestTypeSnafu,
};

/// The kind of lifecycle event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl core::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RequestType::Create => "Create",
            RequestType::Update => "Update",
            RequestType::Delete => "Delete",
        })
    }
}

impl core::str::FromStr for RequestType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Create" => Ok(RequestType::Create),
            "Update" => Ok(RequestType::Update),
            "Delete" => Ok(RequestType::Delete),
            other => UnknownRequestTypeSnafu {
                request_type: other.to_owned(),
            }
            .fail(),
        }
    }
}

/// A lifecycle request exactly as CloudFormation sends it.
///
/// Only `ResponseURL` is required here. Without it there is nobody to answer,
/// every other field is checked later so that problems with it can still be
/// reported back as a `FAILED` response.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Request {
    #[serde(default)]
    pub request_type: String,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    #[serde(default)]
    pub stack_id: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    #[serde(default)]
    pub resource_properties: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_resource_properties: Option<serde_json::Value>,
}

impl Request {
    /// Decodes a request from the invocation payload.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).context(DecodeRequestSnafu)
    }

    pub fn request_type(&self) -> Result<RequestType> {
        self.request_type.parse()
    }
}

/// A validated lifecycle event carrying typed properties.
///
/// Each variant holds only the fields that are valid for it.
#[derive(Clone, Debug, PartialEq)]
pub enum LifecycleEvent<P> {
    Create {
        properties: P,
    },
    Update {
        physical_resource_id: String,
        properties: P,
        old_properties: P,
    },
    Delete {
        physical_resource_id: String,
        properties: P,
    },
}

fn decode_properties<P: serde::de::DeserializeOwned>(
    field: &'static str,
    value: &serde_json::Value,
) -> Result<P> {
    P::deserialize(value).context(InvalidPropertiesSnafu { field })
}

impl<P: serde::de::DeserializeOwned> LifecycleEvent<P> {
    /// Decodes and validates a raw [`Request`].
    pub fn decode(request: &Request) -> Result<Self> {
        let request_type = request.request_type()?;
        let physical_resource_id = || {
            request
                .physical_resource_id
                .clone()
                .filter(|id| !id.is_empty())
                .context(MissingFieldSnafu {
                    request_type,
                    field: "PhysicalResourceId",
                })
        };
        let properties =
            decode_properties::<P>("ResourceProperties", &request.resource_properties)?;

        Ok(match request_type {
            RequestType::Create => LifecycleEvent::Create { properties },
            RequestType::Update => {
                let physical_resource_id = physical_resource_id()?;
                let old = request
                    .old_resource_properties
                    .as_ref()
                    .context(MissingFieldSnafu {
                        request_type,
                        field: "OldResourceProperties",
                    })?;
                let old_properties = decode_properties::<P>("OldResourceProperties", old)?;
                LifecycleEvent::Update {
                    physical_resource_id,
                    properties,
                    old_properties,
                }
            }
            RequestType::Delete => LifecycleEvent::Delete {
                physical_resource_id: physical_resource_id()?,
                properties,
            },
        })
    }
}

impl<P> LifecycleEvent<P> {
    pub fn request_type(&self) -> RequestType {
        match self {
            LifecycleEvent::Create { .. } => RequestType::Create,
            LifecycleEvent::Update { .. } => RequestType::Update,
            LifecycleEvent::Delete { .. } => RequestType::Delete,
        }
    }

    /// The id of the previously created object, if there is one.
    pub fn physical_resource_id(&self) -> Option<&str> {
        match self {
            LifecycleEvent::Create { .. } => None,
            LifecycleEvent::Update {
                physical_resource_id,
                ..
            }
            | LifecycleEvent::Delete {
                physical_resource_id,
                ..
            } => Some(physical_resource_id),
        }
    }

    pub fn properties(&self) -> &P {
        match self {
            LifecycleEvent::Create { properties }
            | LifecycleEvent::Update { properties, .. }
            | LifecycleEvent::Delete { properties, .. } => properties,
        }
    }
}
