//! Custom resources backed by AWS.
use aws_sdk_codecommit::error::{DisplayErrorContext, ProvideErrorMetadata};

pub mod codecommit;
pub mod ecs;

/// The raw message of an SDK error, ie `ThrottlingException: Rate exceeded`.
///
/// `SdkError`'s own `Display` only says "service error", which is useless as
/// the reason of a failed response.
pub(crate) fn error_message<E>(error: &E) -> String
where
    E: ProvideErrorMetadata + std::error::Error,
{
    match (error.code(), error.message()) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (Some(code), None) => code.to_owned(),
        (None, Some(message)) => message.to_owned(),
        (None, None) => DisplayErrorContext(error).to_string(),
    }
}
