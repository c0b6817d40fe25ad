//! # cfn-lifecycle
//!
//! Lifecycle adapters for CloudFormation custom resources.
//!
//! CloudFormation knows nothing about some of the things we want our stacks
//! to own, for example the association between a CodeCommit approval rule
//! template and a set of repositories, or an ECS task definition rendered from
//! a template. A custom resource lets a stack declare such a thing anyway:
//! CloudFormation invokes a Lambda function with a lifecycle event and waits
//! for that function to answer with a response envelope.
//!
//! This library provides the pieces of such a function:
//!
//! - [`Request`] and [`LifecycleEvent`], the raw and the typed form of the
//!   lifecycle event.
//! - [`CustomResource`], the trait an adapter implements to create, update
//!   and delete its external object.
//! - [`Adapter`], which dispatches an event to a [`CustomResource`] and always
//!   produces exactly one [`ResponseEnvelope`].
//! - [`ResponseSink`] and [`HttpSink`], which deliver the envelope back to
//!   CloudFormation.
//! - [`aws`], the concrete adapters backed by the AWS SDK.
//!
//! ## Error Handling
//!
//! Failures inside a lifecycle handler never escape the [`Adapter`]; they
//! become a `FAILED` envelope. The [`Error`] enum covers everything else:
//! undecodable requests, invalid properties and delivery of the envelope.
use std::future::Future;

pub mod adapter;
pub mod aws;
pub mod config;
pub mod diff;
pub mod event;
pub mod response;
pub mod sink;
pub mod template;

pub use adapter::{Adapter, Phase};
pub use config::Config;
pub use diff::Diff;
pub use event::{LifecycleEvent, Request, RequestType};
pub use response::{ResponseData, ResponseEnvelope, Status};
pub use sink::{HttpSink, ResponseSink};

/// Marker trait for userland errors.
pub trait UserError: core::fmt::Display + core::fmt::Debug + 'static {}
impl<T: core::fmt::Display + core::fmt::Debug + 'static> UserError for T {}

/// Top-level error enum that encompasses all errors.
#[derive(snafu::Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{source}:\n{}",
                source.chain()
                    .map(|e| format!("{e}"))
                    .collect::<Vec<_>>()
                    .join("\n -> ")))]
    Other { source: anyhow::Error },

    #[snafu(display("Could not decode lifecycle request: {source}"))]
    DecodeRequest { source: serde_json::Error },

    #[snafu(display("Unknown request type '{request_type}'"))]
    UnknownRequestType { request_type: String },

    #[snafu(display("A {request_type} request is missing '{field}'"))]
    MissingField {
        request_type: RequestType,
        field: &'static str,
    },

    #[snafu(display("Invalid {field}: {source}"))]
    InvalidProperties {
        field: &'static str,
        source: serde_json::Error,
    },

    #[snafu(display("Missing resource property '{name}'"))]
    MissingProperty { name: &'static str },

    #[snafu(display("Invalid resource property '{name}': {reason}"))]
    InvalidProperty { name: &'static str, reason: String },

    #[snafu(display("Could not decode template: {source}"))]
    TemplateDecode { source: data_encoding::DecodeError },

    #[snafu(display("Template is not valid UTF-8: {source}"))]
    TemplateUtf8 { source: std::string::FromUtf8Error },

    #[snafu(display("Could not render template: {reason}"))]
    TemplateRender { reason: String },

    #[snafu(display("Rendered task definition is invalid: {source}"))]
    TaskDefinition { source: serde_json::Error },

    #[snafu(display("Could not serialize response: {source}"))]
    SerializeResponse { source: serde_json::Error },

    #[snafu(display("Could not build HTTP client: {source}"))]
    HttpClient { source: reqwest::Error },

    #[snafu(display("Could not deliver response to '{logical_resource_id}': {source}"))]
    Respond {
        logical_resource_id: String,
        source: reqwest::Error,
    },

    #[snafu(display("Response to '{logical_resource_id}' was rejected with {status}: {body}"))]
    RespondStatus {
        logical_resource_id: String,
        status: u16,
        body: String,
    },

    #[snafu(display("Could not read configuration: {source}"))]
    Config { source: clap::Error },
}

impl From<anyhow::Error> for Error {
    fn from(source: anyhow::Error) -> Self {
        Error::Other { source }
    }
}

type Result<T, E = Error> = core::result::Result<T, E>;

/// A custom resource's lifecycle.
///
/// Implementors own a client of some platform API (ie the AWS SDK) and know
/// how to create, update and delete one kind of external object on it.
///
/// Each method receives the `data` that will be returned to CloudFormation.
/// Entries inserted before an error are kept in the `FAILED` response, which
/// lets operators reconcile a partially applied change by hand.
pub trait CustomResource {
    /// The desired state, decoded from `ResourceProperties`.
    ///
    /// Decoding is the first line of validation, so properties that are
    /// missing or ill-typed never reach the platform.
    type Properties: serde::de::DeserializeOwned + core::fmt::Debug;

    /// Errors that may occur interacting with the platform.
    type Error: UserError;

    /// Validation beyond what decoding already guarantees.
    fn validate(&self, _properties: &Self::Properties) -> Result<()> {
        Ok(())
    }

    /// Derives the physical resource id from the properties.
    ///
    /// This must be deterministic so that a retried create is recognizable
    /// as the same object.
    fn physical_resource_id(&self, properties: &Self::Properties) -> String;

    /// Creates the external object.
    fn create(
        &self,
        properties: &Self::Properties,
        data: &mut ResponseData,
    ) -> impl Future<Output = Result<(), Self::Error>>;

    /// Moves the external object from `previous` to `properties`.
    fn update(
        &self,
        properties: &Self::Properties,
        previous: &Self::Properties,
        data: &mut ResponseData,
    ) -> impl Future<Output = Result<(), Self::Error>>;

    /// Removes the external object described by `properties`.
    ///
    /// An object that is already gone is not an error.
    fn delete(
        &self,
        properties: &Self::Properties,
        data: &mut ResponseData,
    ) -> impl Future<Output = Result<(), Self::Error>>;
}
