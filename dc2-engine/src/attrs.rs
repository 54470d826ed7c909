//! Typed, per-resource-kind views over the schema-less resource store
//! (`SPEC_FULL.md` §3): a small set of well-typed fields for the hot-path
//! attributes (state, times, IPs) plus a tag overflow map. The store itself
//! stays a flat string bag; nothing outside this module parses attribute
//! strings directly.

use std::collections::BTreeMap;

use dc2_store::{ResourceKind, ResourceStore, keys};

use crate::error::{EngineError, EngineResult};

const TAG_PREFIX: &str = "tag:";

pub fn read_tags(store: &ResourceStore, id: &str) -> EngineResult<BTreeMap<String, String>> {
    let attrs = store.resource_attributes(id).map_err(|_| EngineError::not_found("Resource", id))?;
    Ok(attrs
        .into_iter()
        .filter_map(|(k, v)| k.strip_prefix(TAG_PREFIX).map(|k| (k.to_string(), v)))
        .collect())
}

pub fn write_tags(store: &ResourceStore, id: &str, tags: &[(String, String)]) -> EngineResult<()> {
    let attrs: Vec<(String, String)> =
        tags.iter().map(|(k, v)| (format!("{TAG_PREFIX}{k}"), v.clone())).collect();
    store.set_resource_attributes(id, &attrs).map_err(EngineError::from)
}

pub fn remove_tags(store: &ResourceStore, id: &str, keys: &[String]) -> EngineResult<()> {
    let attrs: Vec<(String, String)> = keys.iter().map(|k| (format!("{TAG_PREFIX}{k}"), String::new())).collect();
    store.remove_resource_attributes(id, &attrs).map_err(EngineError::from)
}

pub fn remove_tag_values(store: &ResourceStore, id: &str, tags: &[(String, String)]) -> EngineResult<()> {
    let attrs: Vec<(String, String)> =
        tags.iter().map(|(k, v)| (format!("{TAG_PREFIX}{k}"), v.clone())).collect();
    store.remove_resource_attributes(id, &attrs).map_err(EngineError::from)
}

fn get(store: &ResourceStore, id: &str, key: &str) -> EngineResult<Option<String>> {
    store.resource_attribute(id, key).map_err(EngineError::from)
}

fn get_or_empty(store: &ResourceStore, id: &str, key: &str) -> EngineResult<String> {
    Ok(get(store, id, key)?.unwrap_or_default())
}

/// Local attribute key names beyond the handful the store crate exports
/// (the store has no schema of its own, so every lifecycle module that
/// introduces a new attribute documents it as a constant here).
pub mod instance_keys {
    pub const IMAGE_ID: &str = "ImageId";
    pub const INSTANCE_TYPE: &str = "InstanceType";
    pub const KEY_NAME: &str = "KeyName";
    pub const ARCHITECTURE: &str = "Architecture";
    pub const AVAILABILITY_ZONE: &str = "AvailabilityZone";
    pub const TENANCY: &str = "Tenancy";
    pub const MONITORING_STATE: &str = "MonitoringState";
    pub const PRIVATE_IP: &str = "PrivateIpAddress";
    pub const PUBLIC_IP: &str = "PublicIpAddress";
    pub const MAC_ADDRESS: &str = "MacAddress";
    pub const NETWORK_INTERFACE_ID: &str = "NetworkInterfaceId";
    pub const PRIVATE_DNS: &str = "PrivateDnsName";
    pub const PUBLIC_DNS: &str = "PublicDnsName";
    pub const USER_DATA: &str = "UserData";
    pub const INSTANCE_LIFECYCLE: &str = "InstanceLifecycle";
    pub const MARKET_TYPE: &str = "InstanceMarketType";
    pub const SPOT_REQUEST_ID: &str = "SpotInstanceRequestID";
    pub const DISABLE_API_TERMINATION: &str = "DisableApiTermination";
    pub const HTTP_ENDPOINT_ENABLED: &str = "HttpEndpointEnabled";
    pub const ASG_NAME: &str = "AutoScalingGroupName";
    pub const ASG_LIFECYCLE_STATE: &str = "AsgLifecycleState";
    pub const PROTECTED_FROM_SCALE_IN: &str = "ProtectedFromScaleIn";
    pub const LAUNCH_TEMPLATE_ID: &str = "LaunchTemplateId";
    pub const LAUNCH_TEMPLATE_VERSION: &str = "LaunchTemplateVersion";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
}

impl InstanceState {
    pub fn code(&self) -> u32 {
        match self {
            InstanceState::Pending => 0,
            InstanceState::Running => 16,
            InstanceState::ShuttingDown => 32,
            InstanceState::Terminated => 48,
            InstanceState::Stopping => 64,
            InstanceState::Stopped => 80,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => InstanceState::Running,
            "shutting-down" => InstanceState::ShuttingDown,
            "terminated" => InstanceState::Terminated,
            "stopping" => InstanceState::Stopping,
            "stopped" => InstanceState::Stopped,
            _ => InstanceState::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstanceAttrs {
    pub image_id: String,
    pub instance_type: String,
    pub key_name: Option<String>,
    pub launch_time: String,
    pub state: InstanceState,
    pub architecture: String,
    pub availability_zone: String,
    pub tenancy: String,
    pub monitoring_state: String,
    pub private_ip_address: String,
    pub public_ip_address: Option<String>,
    pub mac_address: String,
    pub network_interface_id: String,
    pub private_dns_name: String,
    pub public_dns_name: Option<String>,
    pub user_data: Option<String>,
    pub instance_lifecycle: Option<String>,
    pub market_type: String,
    pub spot_instance_request_id: Option<String>,
    pub state_transition_reason: String,
    pub state_reason_code: Option<String>,
    pub state_reason_message: Option<String>,
    pub disable_api_termination: bool,
    pub http_endpoint_enabled: bool,
    pub asg_name: Option<String>,
    pub asg_lifecycle_state: Option<String>,
    pub warm_pool_lifecycle_state: Option<String>,
    pub protected_from_scale_in: bool,
    pub launch_template_id: Option<String>,
    pub launch_template_version: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl InstanceAttrs {
    pub fn load(store: &ResourceStore, id: &str) -> EngineResult<Self> {
        use instance_keys::*;
        if store.resource_kind(id).map_err(|_| EngineError::not_found("Instance", id))? != ResourceKind::Instance {
            return Err(EngineError::not_found("Instance", id));
        }
        Ok(InstanceAttrs {
            image_id: get_or_empty(store, id, IMAGE_ID)?,
            instance_type: get_or_empty(store, id, INSTANCE_TYPE)?,
            key_name: get(store, id, KEY_NAME)?,
            launch_time: get_or_empty(store, id, keys::INSTANCE_LAUNCH_TIME)?,
            state: InstanceState::parse(&get_or_empty(store, id, keys::INSTANCE_STATE)?),
            architecture: get_or_empty(store, id, ARCHITECTURE)?,
            availability_zone: get_or_empty(store, id, AVAILABILITY_ZONE)?,
            tenancy: get_or_empty(store, id, TENANCY)?,
            monitoring_state: get_or_empty(store, id, MONITORING_STATE)?,
            private_ip_address: get_or_empty(store, id, PRIVATE_IP)?,
            public_ip_address: get(store, id, PUBLIC_IP)?,
            mac_address: get_or_empty(store, id, MAC_ADDRESS)?,
            network_interface_id: get_or_empty(store, id, NETWORK_INTERFACE_ID)?,
            private_dns_name: get_or_empty(store, id, PRIVATE_DNS)?,
            public_dns_name: get(store, id, PUBLIC_DNS)?,
            user_data: get(store, id, USER_DATA)?,
            instance_lifecycle: get(store, id, INSTANCE_LIFECYCLE)?,
            market_type: get_or_empty(store, id, MARKET_TYPE)?,
            spot_instance_request_id: get(store, id, SPOT_REQUEST_ID)?,
            state_transition_reason: get_or_empty(store, id, keys::STATE_TRANSITION_REASON)?,
            state_reason_code: get(store, id, keys::STATE_REASON_CODE)?,
            state_reason_message: get(store, id, "StateReasonMessage")?,
            disable_api_termination: get_or_empty(store, id, DISABLE_API_TERMINATION)? == "true",
            http_endpoint_enabled: get(store, id, HTTP_ENDPOINT_ENABLED)?.map(|v| v == "true").unwrap_or(true),
            asg_name: get(store, id, ASG_NAME)?,
            asg_lifecycle_state: get(store, id, ASG_LIFECYCLE_STATE)?,
            warm_pool_lifecycle_state: get(store, id, keys::WARM_POOL_LIFECYCLE_STATE)?,
            protected_from_scale_in: get_or_empty(store, id, PROTECTED_FROM_SCALE_IN)? == "true",
            launch_template_id: get(store, id, LAUNCH_TEMPLATE_ID)?,
            launch_template_version: get(store, id, LAUNCH_TEMPLATE_VERSION)?,
            tags: read_tags(store, id)?,
        })
    }

    pub fn save(&self, store: &ResourceStore, id: &str) -> EngineResult<()> {
        use instance_keys::*;
        let mut attrs = vec![
            (IMAGE_ID.to_string(), self.image_id.clone()),
            (INSTANCE_TYPE.to_string(), self.instance_type.clone()),
            (keys::INSTANCE_LAUNCH_TIME.to_string(), self.launch_time.clone()),
            (keys::INSTANCE_STATE.to_string(), self.state.name().to_string()),
            (ARCHITECTURE.to_string(), self.architecture.clone()),
            (AVAILABILITY_ZONE.to_string(), self.availability_zone.clone()),
            (TENANCY.to_string(), self.tenancy.clone()),
            (MONITORING_STATE.to_string(), self.monitoring_state.clone()),
            (PRIVATE_IP.to_string(), self.private_ip_address.clone()),
            (MAC_ADDRESS.to_string(), self.mac_address.clone()),
            (NETWORK_INTERFACE_ID.to_string(), self.network_interface_id.clone()),
            (PRIVATE_DNS.to_string(), self.private_dns_name.clone()),
            (MARKET_TYPE.to_string(), self.market_type.clone()),
            (keys::STATE_TRANSITION_REASON.to_string(), self.state_transition_reason.clone()),
            (DISABLE_API_TERMINATION.to_string(), self.disable_api_termination.to_string()),
            (HTTP_ENDPOINT_ENABLED.to_string(), self.http_endpoint_enabled.to_string()),
            (PROTECTED_FROM_SCALE_IN.to_string(), self.protected_from_scale_in.to_string()),
        ];
        if let Some(v) = &self.key_name {
            attrs.push((KEY_NAME.to_string(), v.clone()));
        }
        if let Some(v) = &self.public_ip_address {
            attrs.push((PUBLIC_IP.to_string(), v.clone()));
        }
        if let Some(v) = &self.public_dns_name {
            attrs.push((PUBLIC_DNS.to_string(), v.clone()));
        }
        if let Some(v) = &self.user_data {
            attrs.push((USER_DATA.to_string(), v.clone()));
        }
        if let Some(v) = &self.instance_lifecycle {
            attrs.push((INSTANCE_LIFECYCLE.to_string(), v.clone()));
        }
        if let Some(v) = &self.spot_instance_request_id {
            attrs.push((SPOT_REQUEST_ID.to_string(), v.clone()));
        }
        if let Some(v) = &self.state_reason_code {
            attrs.push((keys::STATE_REASON_CODE.to_string(), v.clone()));
        }
        if let Some(v) = &self.state_reason_message {
            attrs.push(("StateReasonMessage".to_string(), v.clone()));
        }
        if let Some(v) = &self.asg_name {
            attrs.push((ASG_NAME.to_string(), v.clone()));
        }
        if let Some(v) = &self.asg_lifecycle_state {
            attrs.push((ASG_LIFECYCLE_STATE.to_string(), v.clone()));
        }
        if let Some(v) = &self.warm_pool_lifecycle_state {
            attrs.push((keys::WARM_POOL_LIFECYCLE_STATE.to_string(), v.clone()));
        }
        if let Some(v) = &self.launch_template_id {
            attrs.push((LAUNCH_TEMPLATE_ID.to_string(), v.clone()));
        }
        if let Some(v) = &self.launch_template_version {
            attrs.push((LAUNCH_TEMPLATE_VERSION.to_string(), v.clone()));
        }
        store.set_resource_attributes(id, &attrs)?;
        let tag_pairs: Vec<(String, String)> = self.tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        write_tags(store, id, &tag_pairs)
    }
}

pub mod volume_keys {
    pub const SIZE: &str = "Size";
    pub const IOPS: &str = "Iops";
    pub const THROUGHPUT: &str = "Throughput";
    pub const VOLUME_TYPE: &str = "VolumeType";
    pub const KMS_KEY_ID: &str = "KmsKeyId";
    pub const AVAILABILITY_ZONE: &str = "AvailabilityZone";
    pub const ENCRYPTED: &str = "Encrypted";
    pub const CREATE_TIME: &str = "CreateTime";
    pub const VOLUME_STATE: &str = "VolumeState";
    pub const ATTACH_INSTANCE_ID: &str = "AttachmentInstanceId";
    pub const ATTACH_DEVICE: &str = "AttachmentDevice";
    pub const ATTACH_TIME: &str = "AttachmentTime";
    pub const ATTACH_DELETE_ON_TERMINATION: &str = "AttachmentDeleteOnTermination";
}

#[derive(Debug, Clone, Default)]
pub struct Attachment {
    pub instance_id: String,
    pub device: String,
    pub attach_time: String,
    pub delete_on_termination: bool,
}

#[derive(Debug, Clone)]
pub struct VolumeAttrs {
    pub size_gib: u64,
    pub iops: Option<u32>,
    pub throughput: Option<u32>,
    pub volume_type: String,
    pub kms_key_id: Option<String>,
    pub availability_zone: String,
    pub encrypted: bool,
    pub create_time: String,
    pub state: String,
    pub attachment: Option<Attachment>,
    pub tags: BTreeMap<String, String>,
}

impl VolumeAttrs {
    pub fn load(store: &ResourceStore, id: &str) -> EngineResult<Self> {
        use volume_keys::*;
        if store.resource_kind(id).map_err(|_| EngineError::not_found("Volume", id))? != ResourceKind::Volume {
            return Err(EngineError::not_found("Volume", id));
        }
        let instance_id = get(store, id, ATTACH_INSTANCE_ID)?;
        let attachment = instance_id.map(|instance_id| Attachment {
            instance_id,
            device: get_or_empty(store, id, ATTACH_DEVICE).unwrap_or_default(),
            attach_time: get_or_empty(store, id, ATTACH_TIME).unwrap_or_default(),
            delete_on_termination: get(store, id, ATTACH_DELETE_ON_TERMINATION)
                .ok()
                .flatten()
                .map(|v| v == "true")
                .unwrap_or(false),
        });
        Ok(VolumeAttrs {
            size_gib: get_or_empty(store, id, SIZE)?.parse().unwrap_or(0),
            iops: get(store, id, IOPS)?.and_then(|v| v.parse().ok()),
            throughput: get(store, id, THROUGHPUT)?.and_then(|v| v.parse().ok()),
            volume_type: get_or_empty(store, id, VOLUME_TYPE)?,
            kms_key_id: get(store, id, KMS_KEY_ID)?,
            availability_zone: get_or_empty(store, id, AVAILABILITY_ZONE)?,
            encrypted: get_or_empty(store, id, ENCRYPTED)? == "true",
            create_time: get_or_empty(store, id, CREATE_TIME)?,
            state: get_or_empty(store, id, VOLUME_STATE)?,
            attachment,
            tags: read_tags(store, id)?,
        })
    }

    pub fn save(&self, store: &ResourceStore, id: &str) -> EngineResult<()> {
        use volume_keys::*;
        let mut attrs = vec![
            (SIZE.to_string(), self.size_gib.to_string()),
            (VOLUME_TYPE.to_string(), self.volume_type.clone()),
            (AVAILABILITY_ZONE.to_string(), self.availability_zone.clone()),
            (ENCRYPTED.to_string(), self.encrypted.to_string()),
            (CREATE_TIME.to_string(), self.create_time.clone()),
            (VOLUME_STATE.to_string(), self.state.clone()),
        ];
        if let Some(v) = self.iops {
            attrs.push((IOPS.to_string(), v.to_string()));
        }
        if let Some(v) = self.throughput {
            attrs.push((THROUGHPUT.to_string(), v.to_string()));
        }
        if let Some(v) = &self.kms_key_id {
            attrs.push((KMS_KEY_ID.to_string(), v.clone()));
        }
        store.set_resource_attributes(id, &attrs)?;
        if let Some(a) = &self.attachment {
            store.set_resource_attributes(
                id,
                &[
                    (ATTACH_INSTANCE_ID.to_string(), a.instance_id.clone()),
                    (ATTACH_DEVICE.to_string(), a.device.clone()),
                    (ATTACH_TIME.to_string(), a.attach_time.clone()),
                    (ATTACH_DELETE_ON_TERMINATION.to_string(), a.delete_on_termination.to_string()),
                ],
            )?;
        } else {
            store.remove_resource_attributes(
                id,
                &[
                    (ATTACH_INSTANCE_ID.to_string(), String::new()),
                    (ATTACH_DEVICE.to_string(), String::new()),
                    (ATTACH_TIME.to_string(), String::new()),
                    (ATTACH_DELETE_ON_TERMINATION.to_string(), String::new()),
                ],
            )?;
        }
        let tag_pairs: Vec<(String, String)> = self.tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        write_tags(store, id, &tag_pairs)
    }
}

pub mod lt_keys {
    pub const NAME: &str = "LaunchTemplateName";
    pub const DEFAULT_VERSION: &str = "DefaultVersion";
    pub const LATEST_VERSION: &str = "LatestVersion";
    pub const CREATE_TIME: &str = "CreateTime";
}

#[derive(Debug, Clone)]
pub struct LaunchTemplateAttrs {
    pub name: String,
    pub default_version: i64,
    pub latest_version: i64,
    pub create_time: String,
}

impl LaunchTemplateAttrs {
    pub fn load(store: &ResourceStore, id: &str) -> EngineResult<Self> {
        use lt_keys::*;
        if store.resource_kind(id).map_err(|_| EngineError::not_found("LaunchTemplate", id))?
            != ResourceKind::LaunchTemplate
        {
            return Err(EngineError::not_found("LaunchTemplate", id));
        }
        Ok(LaunchTemplateAttrs {
            name: get_or_empty(store, id, NAME)?,
            default_version: get_or_empty(store, id, DEFAULT_VERSION)?.parse().unwrap_or(1),
            latest_version: get_or_empty(store, id, LATEST_VERSION)?.parse().unwrap_or(1),
            create_time: get_or_empty(store, id, CREATE_TIME)?,
        })
    }

    pub fn save(&self, store: &ResourceStore, id: &str) -> EngineResult<()> {
        use lt_keys::*;
        store.set_resource_attributes(
            id,
            &[
                (NAME.to_string(), self.name.clone()),
                (DEFAULT_VERSION.to_string(), self.default_version.to_string()),
                (LATEST_VERSION.to_string(), self.latest_version.to_string()),
                (CREATE_TIME.to_string(), self.create_time.clone()),
            ],
        )?;
        Ok(())
    }
}

pub mod lt_version_keys {
    pub const IMAGE_ID: &str = "ImageId";
    pub const INSTANCE_TYPE: &str = "InstanceType";
    pub const KEY_NAME: &str = "KeyName";
    pub const USER_DATA: &str = "UserData";
    pub const CREATE_TIME: &str = "CreateTime";
}

#[derive(Debug, Clone, Default)]
pub struct LaunchTemplateVersionAttrs {
    pub image_id: Option<String>,
    pub instance_type: Option<String>,
    pub key_name: Option<String>,
    pub user_data: Option<String>,
    pub create_time: String,
}

/// Version resources are keyed `<template-id>#<version>` and never exposed
/// on the wire as resource IDs (`spec.md` §4.5).
pub fn lt_version_resource_id(template_id: &str, version: i64) -> String {
    format!("{template_id}#{version}")
}

impl LaunchTemplateVersionAttrs {
    pub fn load(store: &ResourceStore, resource_id: &str) -> EngineResult<Self> {
        use lt_version_keys::*;
        Ok(LaunchTemplateVersionAttrs {
            image_id: get(store, resource_id, IMAGE_ID)?,
            instance_type: get(store, resource_id, INSTANCE_TYPE)?,
            key_name: get(store, resource_id, KEY_NAME)?,
            user_data: get(store, resource_id, USER_DATA)?,
            create_time: get_or_empty(store, resource_id, CREATE_TIME)?,
        })
    }

    pub fn save(&self, store: &ResourceStore, resource_id: &str) -> EngineResult<()> {
        use lt_version_keys::*;
        let mut attrs = vec![(CREATE_TIME.to_string(), self.create_time.clone())];
        if let Some(v) = &self.image_id {
            attrs.push((IMAGE_ID.to_string(), v.clone()));
        }
        if let Some(v) = &self.instance_type {
            attrs.push((INSTANCE_TYPE.to_string(), v.clone()));
        }
        if let Some(v) = &self.key_name {
            attrs.push((KEY_NAME.to_string(), v.clone()));
        }
        if let Some(v) = &self.user_data {
            attrs.push((USER_DATA.to_string(), v.clone()));
        }
        store.set_resource_attributes(resource_id, &attrs)?;
        Ok(())
    }
}

pub mod asg_keys {
    pub const MIN_SIZE: &str = "MinSize";
    pub const MAX_SIZE: &str = "MaxSize";
    pub const DESIRED_CAPACITY: &str = "DesiredCapacity";
    pub const LAUNCH_TEMPLATE_ID: &str = "LaunchTemplateId";
    pub const LAUNCH_TEMPLATE_VERSION: &str = "LaunchTemplateVersionSpec";
    pub const VPC_ZONE_IDENTIFIER: &str = "VPCZoneIdentifier";
    pub const STATUS: &str = "Status";
    pub const WARM_POOL_MIN_SIZE: &str = "WarmPoolMinSize";
    pub const WARM_POOL_MAX_PREPARED: &str = "WarmPoolMaxGroupPreparedCapacity";
    pub const WARM_POOL_STATE: &str = "WarmPoolState";
    pub const WARM_POOL_REUSE: &str = "WarmPoolReuseOnScaleIn";
    pub const WARM_POOL_STATUS: &str = "WarmPoolStatus";
    pub const WARM_POOL_CONFIGURED: &str = "WarmPoolConfigured";
}

#[derive(Debug, Clone)]
pub struct AsgAttrs {
    pub min_size: u32,
    pub max_size: u32,
    pub desired_capacity: u32,
    pub launch_template_id: String,
    pub launch_template_version: String,
    pub vpc_zone_identifier: Option<String>,
    pub status: Option<String>,
    pub tags: Vec<(String, String, bool)>,
}

impl AsgAttrs {
    pub fn load(store: &ResourceStore, name: &str) -> EngineResult<Self> {
        use asg_keys::*;
        if store.resource_kind(name).map_err(|_| EngineError::not_found("AutoScalingGroup", name))?
            != ResourceKind::AutoScalingGroup
        {
            return Err(EngineError::not_found("AutoScalingGroup", name));
        }
        let tags = read_asg_tags(store, name)?;
        Ok(AsgAttrs {
            min_size: get_or_empty(store, name, MIN_SIZE)?.parse().unwrap_or(0),
            max_size: get_or_empty(store, name, MAX_SIZE)?.parse().unwrap_or(0),
            desired_capacity: get_or_empty(store, name, DESIRED_CAPACITY)?.parse().unwrap_or(0),
            launch_template_id: get_or_empty(store, name, LAUNCH_TEMPLATE_ID)?,
            launch_template_version: get_or_empty(store, name, LAUNCH_TEMPLATE_VERSION)?,
            vpc_zone_identifier: get(store, name, VPC_ZONE_IDENTIFIER)?,
            status: get(store, name, STATUS)?,
            tags,
        })
    }

    pub fn save(&self, store: &ResourceStore, name: &str) -> EngineResult<()> {
        use asg_keys::*;
        let mut attrs = vec![
            (MIN_SIZE.to_string(), self.min_size.to_string()),
            (MAX_SIZE.to_string(), self.max_size.to_string()),
            (DESIRED_CAPACITY.to_string(), self.desired_capacity.to_string()),
            (LAUNCH_TEMPLATE_ID.to_string(), self.launch_template_id.clone()),
            (LAUNCH_TEMPLATE_VERSION.to_string(), self.launch_template_version.clone()),
        ];
        if let Some(v) = &self.vpc_zone_identifier {
            attrs.push((VPC_ZONE_IDENTIFIER.to_string(), v.clone()));
        }
        if let Some(v) = &self.status {
            attrs.push((STATUS.to_string(), v.clone()));
        }
        store.set_resource_attributes(name, &attrs)?;
        write_asg_tags(store, name, &self.tags)
    }
}

fn read_asg_tags(store: &ResourceStore, name: &str) -> EngineResult<Vec<(String, String, bool)>> {
    let tags = read_tags(store, name)?;
    tags.into_iter()
        .map(|(k, v)| {
            let propagate = get(store, name, &format!("TagPropagate:{k}"))?.map(|v| v == "true").unwrap_or(false);
            Ok((k, v, propagate))
        })
        .collect()
}

fn write_asg_tags(store: &ResourceStore, name: &str, tags: &[(String, String, bool)]) -> EngineResult<()> {
    let tag_pairs: Vec<(String, String)> = tags.iter().map(|(k, v, _)| (k.clone(), v.clone())).collect();
    write_tags(store, name, &tag_pairs)?;
    let propagate_pairs: Vec<(String, String)> =
        tags.iter().map(|(k, _, p)| (format!("TagPropagate:{k}"), p.to_string())).collect();
    store.set_resource_attributes(name, &propagate_pairs)?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct WarmPoolAttrs {
    pub min_size: u32,
    pub max_group_prepared_capacity: Option<i64>,
    pub pool_state: String,
    pub reuse_on_scale_in: bool,
    pub status: Option<String>,
    pub configured: bool,
}

impl WarmPoolAttrs {
    pub fn load(store: &ResourceStore, asg_name: &str) -> EngineResult<Self> {
        use asg_keys::*;
        Ok(WarmPoolAttrs {
            min_size: get_or_empty(store, asg_name, WARM_POOL_MIN_SIZE)?.parse().unwrap_or(0),
            max_group_prepared_capacity: get(store, asg_name, WARM_POOL_MAX_PREPARED)?
                .and_then(|v| v.parse().ok()),
            pool_state: get_or_empty(store, asg_name, WARM_POOL_STATE)?,
            reuse_on_scale_in: get_or_empty(store, asg_name, WARM_POOL_REUSE)? == "true",
            status: get(store, asg_name, WARM_POOL_STATUS)?,
            configured: get_or_empty(store, asg_name, WARM_POOL_CONFIGURED)? == "true",
        })
    }

    pub fn save(&self, store: &ResourceStore, asg_name: &str) -> EngineResult<()> {
        use asg_keys::*;
        let mut attrs = vec![
            (WARM_POOL_MIN_SIZE.to_string(), self.min_size.to_string()),
            (WARM_POOL_STATE.to_string(), self.pool_state.clone()),
            (WARM_POOL_REUSE.to_string(), self.reuse_on_scale_in.to_string()),
            (WARM_POOL_CONFIGURED.to_string(), self.configured.to_string()),
        ];
        if let Some(c) = self.max_group_prepared_capacity {
            attrs.push((WARM_POOL_MAX_PREPARED.to_string(), c.to_string()));
        }
        if let Some(s) = &self.status {
            attrs.push((WARM_POOL_STATUS.to_string(), s.clone()));
        }
        store.set_resource_attributes(asg_name, &attrs)?;
        Ok(())
    }

    pub fn clear(&mut self, store: &ResourceStore, asg_name: &str) -> EngineResult<()> {
        *self = WarmPoolAttrs::default();
        store.remove_resource_attributes(
            asg_name,
            &[
                (asg_keys::WARM_POOL_MIN_SIZE.to_string(), String::new()),
                (asg_keys::WARM_POOL_MAX_PREPARED.to_string(), String::new()),
                (asg_keys::WARM_POOL_STATE.to_string(), String::new()),
                (asg_keys::WARM_POOL_REUSE.to_string(), String::new()),
                (asg_keys::WARM_POOL_STATUS.to_string(), String::new()),
                (asg_keys::WARM_POOL_CONFIGURED.to_string(), String::new()),
            ],
        )?;
        Ok(())
    }
}

pub mod spot_keys {
    pub const STATUS_CODE: &str = "SpotRequestStatusCode";
    pub const STATUS_MESSAGE: &str = "SpotRequestStatusMessage";
    pub const STATUS_UPDATED_AT: &str = "SpotRequestStatusUpdatedAt";
    pub const CREATE_TIME: &str = "SpotRequestCreateTime";
    pub const INSTANCE_ID: &str = "SpotRequestInstanceID";
    pub const INSTANCE_TYPE: &str = "SpotRequestInstanceType";
    pub const REQUEST_TYPE: &str = "SpotRequestType";
    pub const INTERRUPTION_BEHAVIOR: &str = "SpotRequestInterruptionBehavior";
    pub const MAX_PRICE: &str = "SpotRequestMaxPrice";
}

#[derive(Debug, Clone)]
pub struct SpotRequestAttrs {
    pub state: String,
    pub status_code: String,
    pub status_message: String,
    pub status_updated_at: String,
    pub create_time: String,
    pub instance_id: String,
    pub instance_type: String,
    pub request_type: String,
    pub interruption_behavior: String,
    pub max_price: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl SpotRequestAttrs {
    pub fn load(store: &ResourceStore, id: &str) -> EngineResult<Self> {
        use spot_keys::*;
        if store.resource_kind(id).map_err(|_| EngineError::not_found("SpotInstanceRequest", id))?
            != ResourceKind::SpotInstancesRequest
        {
            return Err(EngineError::not_found("SpotInstanceRequest", id));
        }
        Ok(SpotRequestAttrs {
            state: get_or_empty(store, id, keys::SPOT_REQUEST_STATE)?,
            status_code: get_or_empty(store, id, STATUS_CODE)?,
            status_message: get_or_empty(store, id, STATUS_MESSAGE)?,
            status_updated_at: get_or_empty(store, id, STATUS_UPDATED_AT)?,
            create_time: get_or_empty(store, id, CREATE_TIME)?,
            instance_id: get_or_empty(store, id, INSTANCE_ID)?,
            instance_type: get_or_empty(store, id, INSTANCE_TYPE)?,
            request_type: get_or_empty(store, id, REQUEST_TYPE)?,
            interruption_behavior: get_or_empty(store, id, INTERRUPTION_BEHAVIOR)?,
            max_price: get(store, id, MAX_PRICE)?,
            tags: read_tags(store, id)?,
        })
    }

    pub fn save(&self, store: &ResourceStore, id: &str) -> EngineResult<()> {
        use spot_keys::*;
        let mut attrs = vec![
            (keys::SPOT_REQUEST_STATE.to_string(), self.state.clone()),
            (STATUS_CODE.to_string(), self.status_code.clone()),
            (STATUS_MESSAGE.to_string(), self.status_message.clone()),
            (STATUS_UPDATED_AT.to_string(), self.status_updated_at.clone()),
            (CREATE_TIME.to_string(), self.create_time.clone()),
            (INSTANCE_ID.to_string(), self.instance_id.clone()),
            (INSTANCE_TYPE.to_string(), self.instance_type.clone()),
            (REQUEST_TYPE.to_string(), self.request_type.clone()),
            (INTERRUPTION_BEHAVIOR.to_string(), self.interruption_behavior.clone()),
        ];
        if let Some(v) = &self.max_price {
            attrs.push((MAX_PRICE.to_string(), v.clone()));
        }
        store.set_resource_attributes(id, &attrs)?;
        let tag_pairs: Vec<(String, String)> = self.tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        write_tags(store, id, &tag_pairs)
    }
}
