//! Association of CodeCommit approval rule templates with repositories.
//!
//! CloudFormation can declare an approval rule template, but not which
//! repositories it applies to. [`ApprovalRuleAssociation`] fills that gap as
//! a `Custom::ApprovalRuleRepoAssociation` resource:
//!
//! ```yaml
//! Association:
//!   Type: Custom::ApprovalRuleRepoAssociation
//!   Properties:
//!     ServiceToken: !GetAtt AssociationHandler.Arn
//!     ApprovalRuleTemplateName: two-approvers
//!     RepositoryNames: [repo-a, repo-b]
//! ```
use std::future::Future;

use aws_sdk_codecommit::error::ProvideErrorMetadata;

use crate::{aws::error_message, CustomResource, Diff, InvalidPropertySnafu, ResponseData};

/// Data key listing the repositories a call associated.
pub const ASSOCIATED_REPO_NAMES: &str = "AssociatedRepoNames";
/// Data key listing the repositories a call disassociated.
pub const DISASSOCIATED_REPO_NAMES: &str = "DisAssociatedRepoNames";

const TEMPLATE_DOES_NOT_EXIST: &str = "ApprovalRuleTemplateDoesNotExistException";

/// A repository a batch call could not act on.
#[derive(Clone, Debug, PartialEq)]
pub struct RepositoryError {
    pub repository_name: String,
    pub code: String,
    pub message: String,
}

/// Result of a batch (dis)association.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchOutcome {
    pub repository_names: Vec<String>,
    pub errors: Vec<RepositoryError>,
}

impl BatchOutcome {
    fn warn_errors(&self, action: &str, template: &str) {
        for error in self.errors.iter() {
            log::warn!(
                "  could not {action} '{}' with '{template}': {} {}",
                error.repository_name,
                error.code,
                error.message
            );
        }
    }
}

/// The part of the CodeCommit API this resource needs.
pub trait ApprovalRuleTemplates {
    fn associate(
        &self,
        template: &str,
        repository_names: Vec<String>,
    ) -> impl Future<Output = anyhow::Result<BatchOutcome>>;

    /// Disassociates `repository_names` from `template`.
    ///
    /// A template that no longer exists has no associations left, so this
    /// resolves to an empty outcome rather than an error.
    fn disassociate(
        &self,
        template: &str,
        repository_names: Vec<String>,
    ) -> impl Future<Output = anyhow::Result<BatchOutcome>>;
}

impl ApprovalRuleTemplates for aws_sdk_codecommit::Client {
    async fn associate(
        &self,
        template: &str,
        repository_names: Vec<String>,
    ) -> anyhow::Result<BatchOutcome> {
        let out = self
            .batch_associate_approval_rule_template_with_repositories()
            .approval_rule_template_name(template)
            .set_repository_names(Some(repository_names))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!(error_message(&e)))?;
        Ok(BatchOutcome {
            repository_names: out.associated_repository_names().to_vec(),
            errors: out
                .errors()
                .iter()
                .map(|e| RepositoryError {
                    repository_name: e.repository_name().unwrap_or_default().to_owned(),
                    code: e.error_code().unwrap_or_default().to_owned(),
                    message: e.error_message().unwrap_or_default().to_owned(),
                })
                .collect(),
        })
    }

    async fn disassociate(
        &self,
        template: &str,
        repository_names: Vec<String>,
    ) -> anyhow::Result<BatchOutcome> {
        let result = self
            .batch_disassociate_approval_rule_template_from_repositories()
            .approval_rule_template_name(template)
            .set_repository_names(Some(repository_names))
            .send()
            .await;
        let out = match result {
            Ok(out) => out,
            Err(e) if e.code() == Some(TEMPLATE_DOES_NOT_EXIST) => {
                log::warn!("  approval rule template '{template}' is already gone");
                return Ok(BatchOutcome::default());
            }
            Err(e) => anyhow::bail!(error_message(&e)),
        };
        Ok(BatchOutcome {
            repository_names: out.disassociated_repository_names().to_vec(),
            errors: out
                .errors()
                .iter()
                .map(|e| RepositoryError {
                    repository_name: e.repository_name().unwrap_or_default().to_owned(),
                    code: e.error_code().unwrap_or_default().to_owned(),
                    message: e.error_message().unwrap_or_default().to_owned(),
                })
                .collect(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApprovalRuleAssociationProperties {
    pub approval_rule_template_name: String,
    pub repository_names: Vec<String>,
}

impl ApprovalRuleAssociationProperties {
    /// Repository names in declaration order, without duplicates.
    fn unique_repository_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(self.repository_names.len());
        for name in self.repository_names.iter() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

/// Associates an approval rule template with a set of repositories.
///
/// The physical resource id is `<template>-repos`.
pub struct ApprovalRuleAssociation<C> {
    client: C,
}

impl<C> ApprovalRuleAssociation<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C: ApprovalRuleTemplates> ApprovalRuleAssociation<C> {
    async fn associate(
        &self,
        template: &str,
        repository_names: Vec<String>,
        data: &mut ResponseData,
    ) -> anyhow::Result<()> {
        if repository_names.is_empty() {
            log::info!("  no repositories to associate with '{template}'");
            return Ok(());
        }
        let out = self.client.associate(template, repository_names).await?;
        log::info!(
            "  associated {:?} with '{template}'",
            out.repository_names
        );
        out.warn_errors("associate", template);
        data.insert(ASSOCIATED_REPO_NAMES, out.repository_names);
        Ok(())
    }

    async fn disassociate(
        &self,
        template: &str,
        repository_names: Vec<String>,
        data: &mut ResponseData,
    ) -> anyhow::Result<()> {
        if repository_names.is_empty() {
            log::info!("  no repositories to disassociate from '{template}'");
            return Ok(());
        }
        let out = self.client.disassociate(template, repository_names).await?;
        log::info!(
            "  disassociated {:?} from '{template}'",
            out.repository_names
        );
        out.warn_errors("disassociate", template);
        data.insert(DISASSOCIATED_REPO_NAMES, out.repository_names);
        Ok(())
    }
}

impl<C: ApprovalRuleTemplates> CustomResource for ApprovalRuleAssociation<C> {
    type Properties = ApprovalRuleAssociationProperties;
    type Error = anyhow::Error;

    fn validate(&self, properties: &Self::Properties) -> crate::Result<()> {
        snafu::ensure!(
            !properties.approval_rule_template_name.trim().is_empty(),
            InvalidPropertySnafu {
                name: "ApprovalRuleTemplateName",
                reason: "must not be empty",
            }
        );
        snafu::ensure!(
            properties.repository_names.iter().all(|name| !name.trim().is_empty()),
            InvalidPropertySnafu {
                name: "RepositoryNames",
                reason: "must not contain empty names",
            }
        );
        Ok(())
    }

    fn physical_resource_id(&self, properties: &Self::Properties) -> String {
        format!("{}-repos", properties.approval_rule_template_name)
    }

    async fn create(
        &self,
        properties: &Self::Properties,
        data: &mut ResponseData,
    ) -> anyhow::Result<()> {
        self.associate(
            &properties.approval_rule_template_name,
            properties.unique_repository_names(),
            data,
        )
        .await
    }

    async fn update(
        &self,
        properties: &Self::Properties,
        previous: &Self::Properties,
        data: &mut ResponseData,
    ) -> anyhow::Result<()> {
        let template = &properties.approval_rule_template_name;
        let previous_template = &previous.approval_rule_template_name;
        let diff = if template == previous_template {
            Diff::new(&properties.repository_names, &previous.repository_names)
        } else {
            log::info!("  template changed from '{previous_template}' to '{template}'");
            Diff::replace(&properties.repository_names, &previous.repository_names)
        };
        if diff.is_empty() {
            log::info!("  associations of '{template}' are unchanged");
        }

        // added before removed, the two may name the same repositories
        self.associate(template, diff.added.into_iter().collect(), data)
            .await?;
        self.disassociate(previous_template, diff.removed.into_iter().collect(), data)
            .await?;
        Ok(())
    }

    async fn delete(
        &self,
        properties: &Self::Properties,
        data: &mut ResponseData,
    ) -> anyhow::Result<()> {
        self.disassociate(
            &properties.approval_rule_template_name,
            properties.unique_repository_names(),
            data,
        )
        .await
    }
}
