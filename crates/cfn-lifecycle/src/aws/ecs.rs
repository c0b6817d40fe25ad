//! ECS task definitions rendered from a template.
//!
//! The template is a task definition in the JSON shape of the ECS
//! `RegisterTaskDefinition` API, base64 encoded into the `Template`
//! property. Every resource property is available to it as a `{{Name}}`
//! placeholder, which lets a stack inject role ARNs, file system ids and
//! the like:
//!
//! ```yaml
//! TaskDefinition:
//!   Type: Custom::ECS-TaskDefinition
//!   Properties:
//!     ServiceToken: !GetAtt TaskDefinitionHandler.Arn
//!     Family: nexus3
//!     TaskRoleARN: !GetAtt TaskRole.Arn
//!     FileSystemId: !Ref FileSystem
//!     Template: eyJmYW1pbHkiOiAie3tGYW1pbHl9fSIsIC4uLn0=
//! ```
use std::{collections::HashMap, future::Future};

use anyhow::Context;
use aws_sdk_ecs::types::{
    ApplicationProtocol, Compatibility, ContainerCondition, ContainerDefinition,
    ContainerDependency, CpuArchitecture, EfsAuthorizationConfig, EfsAuthorizationConfigIam,
    EfsTransitEncryption, EfsVolumeConfiguration, EphemeralStorage, HealthCheck,
    HostVolumeProperties, KernelCapabilities, KeyValuePair, LinuxParameters, LogConfiguration,
    LogDriver, MountPoint, NetworkMode, OsFamily, PidMode, PortMapping, RuntimePlatform, Secret,
    Tag, TransportProtocol, Ulimit, UlimitName, Volume,
};
use snafu::IntoError;

use crate::{
    aws::error_message, template, CustomResource, Error, InvalidPropertySnafu,
    MissingPropertySnafu, ResponseData, TaskDefinitionSnafu,
};

pub const TASK_DEFINITION_ARN: &str = "taskDefinitionArn";
pub const FAMILY: &str = "family";
pub const REVISION: &str = "revision";

/// Accepts `"1024"` as well as `1024`, task definitions use both.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum Value {
        String(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Value>::deserialize(deserializer)?.map(|value| match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
    }))
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PortMappingSpec {
    pub container_port: i32,
    #[serde(default)]
    pub host_port: Option<i32>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub app_protocol: Option<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyValueSpec {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MountPointSpec {
    pub source_volume: String,
    pub container_path: String,
    #[serde(default)]
    pub read_only: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LogConfigurationSpec {
    pub log_driver: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UlimitSpec {
    pub name: String,
    pub soft_limit: i32,
    pub hard_limit: i32,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HealthCheckSpec {
    pub command: Vec<String>,
    #[serde(default)]
    pub interval: Option<i32>,
    #[serde(default)]
    pub timeout: Option<i32>,
    #[serde(default)]
    pub retries: Option<i32>,
    #[serde(default)]
    pub start_period: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecretSpec {
    pub name: String,
    pub value_from: String,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContainerDependencySpec {
    pub container_name: String,
    pub condition: String,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KernelCapabilitiesSpec {
    #[serde(default)]
    pub add: Vec<String>,
    #[serde(default)]
    pub drop: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LinuxParametersSpec {
    #[serde(default)]
    pub capabilities: Option<KernelCapabilitiesSpec>,
    #[serde(default)]
    pub init_process_enabled: Option<bool>,
    #[serde(default)]
    pub shared_memory_size: Option<i32>,
    #[serde(default)]
    pub max_swap: Option<i32>,
    #[serde(default)]
    pub swappiness: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContainerDefinitionSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub essential: Option<bool>,
    #[serde(default)]
    pub cpu: Option<i32>,
    #[serde(default)]
    pub memory: Option<i32>,
    #[serde(default)]
    pub memory_reservation: Option<i32>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub entry_point: Vec<String>,
    #[serde(default)]
    pub port_mappings: Vec<PortMappingSpec>,
    #[serde(default)]
    pub environment: Vec<KeyValueSpec>,
    #[serde(default)]
    pub mount_points: Vec<MountPointSpec>,
    #[serde(default)]
    pub log_configuration: Option<LogConfigurationSpec>,
    #[serde(default)]
    pub ulimits: Vec<UlimitSpec>,
    #[serde(default)]
    pub health_check: Option<HealthCheckSpec>,
    #[serde(default)]
    pub secrets: Vec<SecretSpec>,
    #[serde(default)]
    pub depends_on: Vec<ContainerDependencySpec>,
    #[serde(default)]
    pub linux_parameters: Option<LinuxParametersSpec>,
    #[serde(default)]
    pub docker_labels: HashMap<String, String>,
    #[serde(default)]
    pub readonly_root_filesystem: Option<bool>,
    #[serde(default)]
    pub start_timeout: Option<i32>,
    #[serde(default)]
    pub stop_timeout: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EfsAuthorizationSpec {
    #[serde(default)]
    pub access_point_id: Option<String>,
    #[serde(default)]
    pub iam: Option<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EfsVolumeSpec {
    pub file_system_id: String,
    #[serde(default)]
    pub root_directory: Option<String>,
    #[serde(default)]
    pub transit_encryption: Option<String>,
    #[serde(default)]
    pub transit_encryption_port: Option<i32>,
    #[serde(default)]
    pub authorization_config: Option<EfsAuthorizationSpec>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HostVolumeSpec {
    #[serde(default)]
    pub source_path: Option<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VolumeSpec {
    pub name: String,
    #[serde(default)]
    pub host: Option<HostVolumeSpec>,
    #[serde(default)]
    pub efs_volume_configuration: Option<EfsVolumeSpec>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuntimePlatformSpec {
    #[serde(default)]
    pub cpu_architecture: Option<String>,
    #[serde(default)]
    pub operating_system_family: Option<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EphemeralStorageSpec {
    #[serde(rename = "sizeInGiB")]
    pub size_in_gib: i32,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagSpec {
    pub key: String,
    pub value: String,
}

/// A rendered task definition.
///
/// Fields this type doesn't know are rejected rather than silently dropped,
/// so a template never registers something other than what it says.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskDefinitionSpec {
    pub family: String,
    #[serde(default)]
    pub task_role_arn: Option<String>,
    #[serde(default)]
    pub execution_role_arn: Option<String>,
    #[serde(default)]
    pub network_mode: Option<String>,
    #[serde(default)]
    pub requires_compatibilities: Vec<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub cpu: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub memory: Option<String>,
    pub container_definitions: Vec<ContainerDefinitionSpec>,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    #[serde(default)]
    pub runtime_platform: Option<RuntimePlatformSpec>,
    #[serde(default)]
    pub ephemeral_storage: Option<EphemeralStorageSpec>,
    #[serde(default)]
    pub pid_mode: Option<String>,
    #[serde(default)]
    pub tags: Vec<TagSpec>,
}

/// Properties of a `Custom::ECS-TaskDefinition`.
///
/// Decoding renders the template, so a template that doesn't decode, render
/// or parse fails before anything is registered.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(try_from = "serde_json::Map<String, serde_json::Value>")]
pub struct TaskDefinitionProperties {
    /// The `Family` property.
    pub family: String,
    pub definition: TaskDefinitionSpec,
}

fn string_property<'a>(
    properties: &'a serde_json::Map<String, serde_json::Value>,
    name: &'static str,
) -> Result<&'a str, Error> {
    let value = properties
        .get(name)
        .ok_or_else(|| MissingPropertySnafu { name }.build())?;
    value.as_str().ok_or_else(|| {
        InvalidPropertySnafu {
            name,
            reason: format!("expected a string, found {value}"),
        }
        .build()
    })
}

impl TryFrom<serde_json::Map<String, serde_json::Value>> for TaskDefinitionProperties {
    type Error = Error;

    fn try_from(
        properties: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, Self::Error> {
        let family = string_property(&properties, "Family")?.to_owned();
        let source = template::decode(string_property(&properties, "Template")?)?;
        let rendered = template::render(&source, &serde_json::Value::Object(properties))?;
        log::trace!("rendered task definition:\n{rendered}");
        let definition: TaskDefinitionSpec = serde_json::from_str(&rendered)
            .map_err(|source| TaskDefinitionSnafu.into_error(source))?;
        Ok(Self { family, definition })
    }
}

/// A registered task definition revision.
#[derive(Clone, Debug, PartialEq)]
pub struct RegisteredTaskDefinition {
    pub arn: String,
    pub family: String,
    pub revision: i32,
}

/// The part of the ECS API this resource needs.
pub trait TaskDefinitions {
    fn register(
        &self,
        definition: &TaskDefinitionSpec,
    ) -> impl Future<Output = anyhow::Result<RegisteredTaskDefinition>>;
}

fn non_empty<T: Clone>(items: &[T]) -> Option<Vec<T>> {
    (!items.is_empty()).then(|| items.to_vec())
}

impl ContainerDefinitionSpec {
    fn to_sdk(&self) -> anyhow::Result<ContainerDefinition> {
        let log_configuration = match self.log_configuration.as_ref() {
            Some(log) => Some(
                LogConfiguration::builder()
                    .log_driver(LogDriver::from(log.log_driver.as_str()))
                    .set_options(Some(log.options.clone()))
                    .build()
                    .with_context(|| format!("invalid log configuration of '{}'", self.name))?,
            ),
            None => None,
        };
        let ulimits = self
            .ulimits
            .iter()
            .map(|ulimit| {
                Ulimit::builder()
                    .name(UlimitName::from(ulimit.name.as_str()))
                    .soft_limit(ulimit.soft_limit)
                    .hard_limit(ulimit.hard_limit)
                    .build()
                    .with_context(|| format!("invalid ulimit '{}' of '{}'", ulimit.name, self.name))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let health_check = match self.health_check.as_ref() {
            Some(check) => Some(
                HealthCheck::builder()
                    .set_command(Some(check.command.clone()))
                    .set_interval(check.interval)
                    .set_timeout(check.timeout)
                    .set_retries(check.retries)
                    .set_start_period(check.start_period)
                    .build()
                    .with_context(|| format!("invalid health check of '{}'", self.name))?,
            ),
            None => None,
        };
        let secrets = self
            .secrets
            .iter()
            .map(|secret| {
                Secret::builder()
                    .name(&secret.name)
                    .value_from(&secret.value_from)
                    .build()
                    .with_context(|| format!("invalid secret '{}' of '{}'", secret.name, self.name))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let depends_on = self
            .depends_on
            .iter()
            .map(|dependency| {
                ContainerDependency::builder()
                    .container_name(&dependency.container_name)
                    .condition(ContainerCondition::from(dependency.condition.as_str()))
                    .build()
                    .with_context(|| {
                        format!(
                            "invalid dependency of '{}' on '{}'",
                            self.name, dependency.container_name
                        )
                    })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let linux_parameters = self.linux_parameters.as_ref().map(|linux| {
            LinuxParameters::builder()
                .set_capabilities(linux.capabilities.as_ref().map(|caps| {
                    KernelCapabilities::builder()
                        .set_add(non_empty(&caps.add))
                        .set_drop(non_empty(&caps.drop))
                        .build()
                }))
                .set_init_process_enabled(linux.init_process_enabled)
                .set_shared_memory_size(linux.shared_memory_size)
                .set_max_swap(linux.max_swap)
                .set_swappiness(linux.swappiness)
                .build()
        });

        Ok(ContainerDefinition::builder()
            .name(&self.name)
            .image(&self.image)
            .set_essential(self.essential)
            .set_cpu(self.cpu)
            .set_memory(self.memory)
            .set_memory_reservation(self.memory_reservation)
            .set_user(self.user.clone())
            .set_working_directory(self.working_directory.clone())
            .set_command(non_empty(&self.command))
            .set_entry_point(non_empty(&self.entry_point))
            .set_port_mappings(Some(
                self.port_mappings
                    .iter()
                    .map(|port| {
                        PortMapping::builder()
                            .container_port(port.container_port)
                            .set_host_port(port.host_port)
                            .set_protocol(port.protocol.as_deref().map(TransportProtocol::from))
                            .set_name(port.name.clone())
                            .set_app_protocol(
                                port.app_protocol.as_deref().map(ApplicationProtocol::from),
                            )
                            .build()
                    })
                    .collect(),
            ))
            .set_environment(Some(
                self.environment
                    .iter()
                    .map(|kv| KeyValuePair::builder().name(&kv.name).value(&kv.value).build())
                    .collect(),
            ))
            .set_mount_points(Some(
                self.mount_points
                    .iter()
                    .map(|mount| {
                        MountPoint::builder()
                            .source_volume(&mount.source_volume)
                            .container_path(&mount.container_path)
                            .set_read_only(mount.read_only)
                            .build()
                    })
                    .collect(),
            ))
            .set_log_configuration(log_configuration)
            .set_ulimits(non_empty(&ulimits))
            .set_health_check(health_check)
            .set_secrets(non_empty(&secrets))
            .set_depends_on(non_empty(&depends_on))
            .set_linux_parameters(linux_parameters)
            .set_docker_labels((!self.docker_labels.is_empty()).then(|| self.docker_labels.clone()))
            .set_readonly_root_filesystem(self.readonly_root_filesystem)
            .set_start_timeout(self.start_timeout)
            .set_stop_timeout(self.stop_timeout)
            .build())
    }
}

impl VolumeSpec {
    fn to_sdk(&self) -> anyhow::Result<Volume> {
        let efs = match self.efs_volume_configuration.as_ref() {
            Some(efs) => Some(
                EfsVolumeConfiguration::builder()
                    .file_system_id(&efs.file_system_id)
                    .set_root_directory(efs.root_directory.clone())
                    .set_transit_encryption(
                        efs.transit_encryption
                            .as_deref()
                            .map(EfsTransitEncryption::from),
                    )
                    .set_transit_encryption_port(efs.transit_encryption_port)
                    .set_authorization_config(efs.authorization_config.as_ref().map(|auth| {
                        EfsAuthorizationConfig::builder()
                            .set_access_point_id(auth.access_point_id.clone())
                            .set_iam(auth.iam.as_deref().map(EfsAuthorizationConfigIam::from))
                            .build()
                    }))
                    .build()
                    .with_context(|| format!("invalid EFS configuration of '{}'", self.name))?,
            ),
            None => None,
        };
        Ok(Volume::builder()
            .name(&self.name)
            .set_host(self.host.as_ref().map(|host| {
                HostVolumeProperties::builder()
                    .set_source_path(host.source_path.clone())
                    .build()
            }))
            .set_efs_volume_configuration(efs)
            .build())
    }
}

impl TaskDefinitions for aws_sdk_ecs::Client {
    async fn register(
        &self,
        definition: &TaskDefinitionSpec,
    ) -> anyhow::Result<RegisteredTaskDefinition> {
        let containers = definition
            .container_definitions
            .iter()
            .map(ContainerDefinitionSpec::to_sdk)
            .collect::<anyhow::Result<Vec<_>>>()?;
        let volumes = definition
            .volumes
            .iter()
            .map(VolumeSpec::to_sdk)
            .collect::<anyhow::Result<Vec<_>>>()?;
        let out = self
            .register_task_definition()
            .family(&definition.family)
            .set_task_role_arn(definition.task_role_arn.clone())
            .set_execution_role_arn(definition.execution_role_arn.clone())
            .set_network_mode(definition.network_mode.as_deref().map(NetworkMode::from))
            .set_requires_compatibilities(Some(
                definition
                    .requires_compatibilities
                    .iter()
                    .map(|c| Compatibility::from(c.as_str()))
                    .collect(),
            ))
            .set_cpu(definition.cpu.clone())
            .set_memory(definition.memory.clone())
            .set_container_definitions(Some(containers))
            .set_volumes(Some(volumes))
            .set_runtime_platform(definition.runtime_platform.as_ref().map(|platform| {
                RuntimePlatform::builder()
                    .set_cpu_architecture(
                        platform
                            .cpu_architecture
                            .as_deref()
                            .map(CpuArchitecture::from),
                    )
                    .set_operating_system_family(
                        platform
                            .operating_system_family
                            .as_deref()
                            .map(OsFamily::from),
                    )
                    .build()
            }))
            .set_ephemeral_storage(definition.ephemeral_storage.as_ref().map(|storage| {
                EphemeralStorage::builder()
                    .size_in_gib(storage.size_in_gib)
                    .build()
            }))
            .set_pid_mode(definition.pid_mode.as_deref().map(PidMode::from))
            .set_tags(non_empty(
                &definition
                    .tags
                    .iter()
                    .map(|tag| Tag::builder().key(&tag.key).value(&tag.value).build())
                    .collect::<Vec<_>>(),
            ))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!(error_message(&e)))?;
        let registered = out
            .task_definition()
            .context("missing task definition in response")?;
        Ok(RegisteredTaskDefinition {
            arn: registered
                .task_definition_arn()
                .context("missing task definition arn")?
                .to_owned(),
            family: registered
                .family()
                .unwrap_or(definition.family.as_str())
                .to_owned(),
            revision: registered.revision(),
        })
    }
}

/// Registers a task definition revision per create or update.
///
/// The physical resource id is `ecs-task-definition-<family>`, so it only
/// changes with the family. Deleting retains the registered revisions, a
/// service rolling back may still need them.
pub struct TaskDefinitionRegistration<C> {
    client: C,
}

impl<C> TaskDefinitionRegistration<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C: TaskDefinitions> TaskDefinitionRegistration<C> {
    async fn register(
        &self,
        properties: &TaskDefinitionProperties,
        data: &mut ResponseData,
    ) -> anyhow::Result<()> {
        let registered = self.client.register(&properties.definition).await?;
        log::info!(
            "  registered '{}' revision {}",
            registered.family,
            registered.revision
        );
        data.insert(TASK_DEFINITION_ARN, registered.arn);
        data.insert(FAMILY, registered.family);
        data.insert(REVISION, registered.revision);
        Ok(())
    }
}

impl<C: TaskDefinitions> CustomResource for TaskDefinitionRegistration<C> {
    type Properties = TaskDefinitionProperties;
    type Error = anyhow::Error;

    fn validate(&self, properties: &Self::Properties) -> crate::Result<()> {
        snafu::ensure!(
            !properties.definition.container_definitions.is_empty(),
            InvalidPropertySnafu {
                name: "Template",
                reason: "the task definition has no container definitions",
            }
        );
        if properties.family != properties.definition.family {
            log::warn!(
                "  Family is '{}' but the template registers '{}'",
                properties.family,
                properties.definition.family
            );
        }
        Ok(())
    }

    fn physical_resource_id(&self, properties: &Self::Properties) -> String {
        format!("ecs-task-definition-{}", properties.definition.family)
    }

    async fn create(
        &self,
        properties: &Self::Properties,
        data: &mut ResponseData,
    ) -> anyhow::Result<()> {
        self.register(properties, data).await
    }

    async fn update(
        &self,
        properties: &Self::Properties,
        _previous: &Self::Properties,
        data: &mut ResponseData,
    ) -> anyhow::Result<()> {
        self.register(properties, data).await
    }

    async fn delete(
        &self,
        properties: &Self::Properties,
        _data: &mut ResponseData,
    ) -> anyhow::Result<()> {
        log::info!(
            "  retaining the revisions of '{}'",
            properties.definition.family
        );
        Ok(())
    }
}
