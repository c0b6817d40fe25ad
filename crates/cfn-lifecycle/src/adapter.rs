//! Dispatch of lifecycle requests to a [`CustomResource`].
use crate::{
    Config, CustomResource, LifecycleEvent, Request, RequestType, ResponseData, ResponseEnvelope,
    ResponseSink, Result,
};

/// Progress of a single invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Received,
    Dispatched,
    Succeeded,
    Failed,
    Responded,
}

impl core::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Phase::Received => "received",
            Phase::Dispatched => "dispatched",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
            Phase::Responded => "responded",
        })
    }
}

/// Turns lifecycle requests into exactly one [`ResponseEnvelope`] each.
///
/// The adapter keeps no state between invocations and never retries. If
/// CloudFormation wants another attempt it sends the whole request again.
pub struct Adapter<R> {
    resource: R,
    config: Config,
}

impl<R: CustomResource> Adapter<R> {
    pub fn new(resource: R, config: Config) -> Self {
        Self { resource, config }
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handles one request.
    ///
    /// This never fails: every error becomes a `FAILED` envelope. When no
    /// physical resource id has been established yet the `correlation_id`
    /// (the invocation's log stream) stands in for it.
    pub async fn handle(&self, request: &Request, correlation_id: &str) -> ResponseEnvelope {
        log::info!(
            "{} {} request for '{}' ({})",
            Phase::Received,
            request.request_type,
            request.logical_resource_id,
            request.resource_type,
        );
        if self.config.log_events {
            if let Ok(pretty) = serde_json::to_string_pretty(request) {
                log::info!("request:\n{pretty}");
            }
        }

        let mut data = ResponseData::default();
        let envelope = match self.dispatch(request, &mut data).await {
            Ok(physical_resource_id) => {
                log::info!("  {} as '{physical_resource_id}'", Phase::Succeeded);
                ResponseEnvelope::success(request, physical_resource_id, data)
            }
            Err(reason) => {
                log::error!(
                    "  {} handling '{}': {reason}",
                    Phase::Failed,
                    request.logical_resource_id
                );
                let physical_resource_id = request
                    .physical_resource_id
                    .clone()
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| correlation_id.to_owned());
                data.insert("Error", reason.clone());
                ResponseEnvelope::failed(request, physical_resource_id, reason, data)
            }
        };

        if self.config.log_events {
            if let Ok(pretty) = serde_json::to_string_pretty(&envelope) {
                log::info!("response:\n{pretty}");
            }
        }
        envelope
    }

    /// Decodes the invocation payload, handles it and hands the envelope to
    /// `sink`.
    ///
    /// Errors are only returned when there is nobody to answer (the payload
    /// has no `ResponseURL`) or the answer could not be delivered. In both
    /// cases no further envelope is sent.
    pub async fn respond<S: ResponseSink>(
        &self,
        sink: &S,
        payload: serde_json::Value,
        correlation_id: &str,
    ) -> Result<ResponseEnvelope> {
        let request = Request::from_value(payload)?;
        let envelope = self.handle(&request, correlation_id).await;
        sink.send(&request.response_url, &envelope).await?;
        log::debug!("  {}", Phase::Responded);
        Ok(envelope)
    }

    async fn dispatch(
        &self,
        request: &Request,
        data: &mut ResponseData,
    ) -> Result<String, String> {
        let decoded = LifecycleEvent::<R::Properties>::decode(request).and_then(|event| {
            self.resource.validate(event.properties())?;
            Ok(event)
        });
        let event = match decoded {
            Ok(event) => event,
            Err(error) => {
                // A create that failed validation never made anything, and
                // CloudFormation will send a delete for it during rollback.
                // Failing that delete as well would wedge the stack.
                let id = request
                    .physical_resource_id
                    .as_ref()
                    .filter(|id| !id.is_empty());
                if let (Ok(RequestType::Delete), Some(id)) = (request.request_type(), id) {
                    log::warn!("  nothing to delete for '{id}', its properties are invalid: {error}");
                    return Ok(id.clone());
                }
                return Err(error.to_string());
            }
        };
        log::debug!("  {:#?}", event.properties());
        log::debug!("  {} {}", Phase::Dispatched, event.request_type());
        match event {
            LifecycleEvent::Create { properties } => {
                self.resource
                    .create(&properties, data)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(self.resource.physical_resource_id(&properties))
            }
            LifecycleEvent::Update {
                physical_resource_id,
                properties,
                old_properties,
            } => {
                let id = self.resource.physical_resource_id(&properties);
                if id != physical_resource_id {
                    log::info!("  '{physical_resource_id}' is replaced by '{id}'");
                }
                self.resource
                    .update(&properties, &old_properties, data)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(id)
            }
            LifecycleEvent::Delete {
                physical_resource_id,
                properties,
            } => {
                // Only a successful create or update hands out the derived id,
                // anything else is the placeholder of a create that failed.
                let id = self.resource.physical_resource_id(&properties);
                if id != physical_resource_id {
                    log::warn!(
                        "  nothing to delete for '{physical_resource_id}', it was never created as '{id}'"
                    );
                    return Ok(physical_resource_id);
                }
                self.resource
                    .delete(&properties, data)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(physical_resource_id)
            }
        }
    }
}
