//! Rendering of base64 encoded `{{placeholder}}` templates.
use snafu::prelude::*;

use crate::{Result, TemplateDecodeSnafu, TemplateRenderSnafu, TemplateUtf8Snafu};

/// Decodes a base64 template.
pub fn decode(encoded: &str) -> Result<String> {
    let bytes = data_encoding::BASE64
        .decode(encoded.trim().as_bytes())
        .context(TemplateDecodeSnafu)?;
    String::from_utf8(bytes).context(TemplateUtf8Snafu)
}

/// Renders `template` with `variables`.
///
/// Values are substituted verbatim. The output is usually JSON, so HTML
/// escaping would corrupt it. Placeholders without a value render empty.
pub fn render(template: &str, variables: &serde_json::Value) -> Result<String> {
    let mut registry = handlebars::Handlebars::new();
    registry.register_escape_fn(handlebars::no_escape);
    registry
        .render_template(template, variables)
        .map_err(|e| {
            TemplateRenderSnafu {
                reason: e.to_string(),
            }
            .build()
        })
}
