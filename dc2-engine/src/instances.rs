//! Instance lifecycle: `RunInstances` through `TerminateInstances`, plus
//! attribute/status/metadata-option operations (`spec.md` §4.3). This is
//! the largest single module; the dispatcher owns locking, test-profile
//! delay application around these calls, and the reclaim/reap timer maps,
//! so every function here is a plain (async, where it touches the
//! executor) state transition.

use dc2_executor::{ContainerExecutor, ContainerSpec};
use dc2_filter::{all_filters_match, paginate, Filter, Page};
use dc2_ids::{runtime_id, IdAllocator, RngSource};
use dc2_imds::{ImdsProxy, InstanceIdentity, SpotAction};
use dc2_store::{ResourceKind, ResourceStore};
use dc2_wire::requests::{
    DescribeInstanceAttributeRequest, DescribeInstanceStatusRequest, DescribeInstancesRequest,
    ModifyInstanceAttributeRequest, ModifyInstanceMetadataOptionsRequest, RunInstancesRequest,
};
use dc2_wire::responses::{InstanceStatusView, InstanceView, ReservationView, Tag};

use crate::attrs::{InstanceAttrs, InstanceState};
use crate::error::{EngineError, EngineResult};
use crate::filters::instance_attribute_lookup;
use crate::launch_templates::resolve_launch_template;
use crate::spot::{self, SpotOptions};
use crate::time::{now_gmt_display, now_rfc3339};
use crate::volumes;

const DEFAULT_IMAGE_ID: &str = "ami-00000000000000000";
const DEFAULT_INSTANCE_TYPE: &str = "t3.micro";

/// Everything `run_instances` needs besides the request itself.
pub struct RunInstancesCtx<'a, R: RngSource> {
    pub store: &'a ResourceStore,
    pub ids: &'a IdAllocator<R>,
    pub executor: &'a dyn ContainerExecutor,
    pub imds: &'a dyn ImdsProxy,
    pub region: &'a str,
    pub owner_id: &'a str,
}

/// Outcome of a successful `RunInstances` call plus the facts the
/// dispatcher needs to arm spot reclaim timers afterward (one per spot
/// instance created).
pub struct RunInstancesOutcome {
    pub reservation: ReservationView,
    pub spot_instances: Vec<(String, String)>,
}

fn derive_octets(seed: &str, salt: u8) -> [u8; 4] {
    let hash = seed.bytes().fold(2166136261u32 ^ (salt as u32), |h, b| (h ^ b as u32).wrapping_mul(16777619));
    let bytes = hash.to_be_bytes();
    [bytes[0], bytes[1], bytes[2], bytes[3].max(1)]
}

fn private_ip(instance_id: &str) -> [u8; 4] {
    let o = derive_octets(instance_id, 1);
    [10, o[1], o[2], o[3]]
}

fn public_ip(instance_id: &str) -> [u8; 4] {
    let o = derive_octets(instance_id, 2);
    [203, 0, 113, o[3] % 254 + 1]
}

fn mac_address(instance_id: &str) -> String {
    let o = derive_octets(instance_id, 3);
    format!("02:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", o[0], o[1], o[2], o[3])
}

fn private_dns(octets: [u8; 4], region: &str) -> String {
    format!("ip-{}-{}-{}-{}.{region}.compute.internal", octets[0], octets[1], octets[2], octets[3])
}

fn public_dns(octets: [u8; 4], region: &str) -> String {
    format!("ec2-{}-{}-{}-{}.{region}.compute.internal", octets[0], octets[1], octets[2], octets[3])
}

fn to_view(attrs: &InstanceAttrs, instance_id: &str) -> InstanceView {
    InstanceView {
        instance_id: instance_id.to_string(),
        image_id: attrs.image_id.clone(),
        instance_type: attrs.instance_type.clone(),
        key_name: attrs.key_name.clone(),
        launch_time: attrs.launch_time.clone(),
        state_code: attrs.state.code(),
        state_name: attrs.state.name().to_string(),
        architecture: attrs.architecture.clone(),
        availability_zone: attrs.availability_zone.clone(),
        tenancy: attrs.tenancy.clone(),
        monitoring_state: attrs.monitoring_state.clone(),
        private_ip_address: attrs.private_ip_address.clone(),
        public_ip_address: attrs.public_ip_address.clone(),
        mac_address: attrs.mac_address.clone(),
        network_interface_id: attrs.network_interface_id.clone(),
        private_dns_name: attrs.private_dns_name.clone(),
        public_dns_name: attrs.public_dns_name.clone(),
        instance_lifecycle: attrs.instance_lifecycle.clone(),
        spot_instance_request_id: attrs.spot_instance_request_id.clone(),
        state_transition_reason: attrs.state_transition_reason.clone(),
        state_reason_code: attrs.state_reason_code.clone(),
        state_reason_message: attrs.state_reason_message.clone(),
        tags: attrs.tags.iter().map(|(k, v)| Tag { key: k.clone(), value: v.clone() }).collect(),
    }
}

fn validate_tag_specifications(req: &RunInstancesRequest) -> EngineResult<()> {
    for ts in &req.tag_specifications {
        if ts.resource_type != "instance" && ts.resource_type != "volume" {
            return Err(EngineError::InvalidParameterValue(format!(
                "unsupported TagSpecification.ResourceType '{}'",
                ts.resource_type
            )));
        }
    }
    Ok(())
}

/// Implements the full `RunInstances` algorithm (`spec.md` §4.3): resolve
/// launch template and spot options, always launch `MaxCount` instances
/// (simulated capacity is never exhausted), allocate attributes, volumes,
/// containers, and IMDS registration, rolling everything back on the first
/// failure.
pub async fn run_instances<R: RngSource>(
    ctx: &RunInstancesCtx<'_, R>,
    req: &RunInstancesRequest,
) -> EngineResult<RunInstancesOutcome> {
    validate_tag_specifications(req)?;
    let spot_opts = spot::resolve_market_options(req)?;

    let lt_resolved = match &req.launch_template {
        Some(spec) => Some(resolve_launch_template(ctx.store, spec)?),
        None => None,
    };

    let image_id = req
        .image_id
        .clone()
        .or_else(|| lt_resolved.as_ref().and_then(|(_, _, r)| r.image_id.clone()))
        .unwrap_or_else(|| DEFAULT_IMAGE_ID.to_string());
    let instance_type = req
        .instance_type
        .clone()
        .or_else(|| lt_resolved.as_ref().and_then(|(_, _, r)| r.instance_type.clone()))
        .unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.to_string());
    let key_name =
        req.key_name.clone().or_else(|| lt_resolved.as_ref().and_then(|(_, _, r)| r.key_name.clone()));
    let user_data =
        req.user_data.clone().or_else(|| lt_resolved.as_ref().and_then(|(_, _, r)| r.user_data.clone()));

    if req.dry_run {
        return Err(EngineError::DryRun);
    }

    let count = req.max_count.max(req.min_count).max(1);
    let availability_zone = req.availability_zone.clone().unwrap_or_else(|| format!("{}a", ctx.region));

    let instance_tags: Vec<(String, String)> =
        req.tag_specifications.iter().filter(|ts| ts.resource_type == "instance").flat_map(|ts| ts.tags.clone()).collect();
    let volume_tags: Vec<(String, String)> =
        req.tag_specifications.iter().filter(|ts| ts.resource_type == "volume").flat_map(|ts| ts.tags.clone()).collect();

    let mut created_instances: Vec<String> = Vec::new();
    let mut created_volumes: Vec<String> = Vec::new();
    let mut spot_instances: Vec<(String, String)> = Vec::new();

    let result = (|| async {
        let mut views = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let instance_id = ctx.ids.allocate_instance();
            ctx.store.register_resource(ResourceKind::Instance, &instance_id)?;
            created_instances.push(instance_id.clone());

            let priv_octets = private_ip(&instance_id);
            let pub_octets = public_ip(&instance_id);

            let mut attrs = InstanceAttrs {
                image_id: image_id.clone(),
                instance_type: instance_type.clone(),
                key_name: key_name.clone(),
                launch_time: now_rfc3339(),
                state: InstanceState::Pending,
                architecture: "x86_64".to_string(),
                availability_zone: availability_zone.clone(),
                tenancy: "default".to_string(),
                monitoring_state: "disabled".to_string(),
                private_ip_address: format!(
                    "{}.{}.{}.{}",
                    priv_octets[0], priv_octets[1], priv_octets[2], priv_octets[3]
                ),
                public_ip_address: Some(format!(
                    "{}.{}.{}.{}",
                    pub_octets[0], pub_octets[1], pub_octets[2], pub_octets[3]
                )),
                mac_address: mac_address(&instance_id),
                network_interface_id: ctx.ids.allocate_network_interface(),
                private_dns_name: private_dns(priv_octets, ctx.region),
                public_dns_name: Some(public_dns(pub_octets, ctx.region)),
                user_data: user_data.clone(),
                instance_lifecycle: spot_opts.as_ref().map(|_| "spot".to_string()),
                market_type: if spot_opts.is_some() { "spot".to_string() } else { "on-demand".to_string() },
                spot_instance_request_id: None,
                state_transition_reason: String::new(),
                state_reason_code: None,
                state_reason_message: None,
                disable_api_termination: false,
                http_endpoint_enabled: true,
                asg_name: None,
                asg_lifecycle_state: None,
                warm_pool_lifecycle_state: None,
                protected_from_scale_in: false,
                launch_template_id: lt_resolved.as_ref().map(|(id, _, _)| id.clone()),
                launch_template_version: lt_resolved.as_ref().map(|(_, v, _)| v.to_string()),
                tags: instance_tags.iter().cloned().collect(),
            };

            if let Some(opts) = &spot_opts {
                let sir_id = spot::create_spot_request(
                    ctx.store,
                    ctx.ids,
                    &instance_id,
                    &instance_type,
                    opts,
                    instance_tags.clone(),
                )?;
                attrs.spot_instance_request_id = Some(sir_id.clone());
                spot_instances.push((instance_id.clone(), sir_id));
            }
            attrs.save(ctx.store, &instance_id)?;

            for bdm in &req.block_device_mappings {
                let size_gib = bdm.volume_size_gib.unwrap_or(8);
                let create_req = dc2_wire::requests::CreateVolumeRequest {
                    size_gib: Some(size_gib),
                    volume_type: bdm.volume_type.clone(),
                    availability_zone: availability_zone.clone(),
                    tag_specifications: if volume_tags.is_empty() {
                        vec![]
                    } else {
                        vec![dc2_wire::requests::TagSpecification {
                            resource_type: "volume".to_string(),
                            tags: volume_tags.clone(),
                        }]
                    },
                    ..Default::default()
                };
                let volume = volumes::create_volume(ctx.store, ctx.ids, &create_req)?;
                created_volumes.push(volume.volume_id.clone());
                volumes::attach_volume(
                    ctx.store,
                    &volume.volume_id,
                    &instance_id,
                    &bdm.device_name,
                    bdm.delete_on_termination,
                )?;
            }

            let rt_id = runtime_id(&instance_id).to_string();
            let spec = ContainerSpec {
                runtime_id: rt_id.clone(),
                image: image_id.clone(),
                labels: vec![
                    ("dc2:enabled".to_string(), "true".to_string()),
                    ("dc2:instance-id".to_string(), rt_id.clone()),
                    ("dc2:user-data".to_string(), user_data.clone().unwrap_or_default()),
                ],
                user_data: user_data.clone(),
            };
            ctx.executor.create_and_start(spec).await?;

            ctx.imds
                .register_instance(InstanceIdentity {
                    instance_id: instance_id.clone(),
                    instance_type: instance_type.clone(),
                    availability_zone: availability_zone.clone(),
                    ami_id: image_id.clone(),
                    local_ipv4: attrs.private_ip_address.clone(),
                    public_ipv4: attrs.public_ip_address.clone(),
                    mac: attrs.mac_address.clone(),
                    hostname: attrs.private_dns_name.clone(),
                    user_data: user_data.clone(),
                    tags: attrs.tags.clone(),
                })
                .await;

            attrs.state = InstanceState::Running;
            attrs.save(ctx.store, &instance_id)?;
            views.push(to_view(&attrs, &instance_id));
        }
        Ok(views)
    })()
    .await;

    match result {
        Ok(instances) => Ok(RunInstancesOutcome {
            reservation: ReservationView {
                reservation_id: ctx.ids.allocate("r"),
                owner_id: ctx.owner_id.to_string(),
                instances,
            },
            spot_instances,
        }),
        Err(e) => {
            for volume_id in &created_volumes {
                let _ = volumes::detach_volume(ctx.store, volume_id);
                let _ = ctx.store.remove_resource(volume_id);
            }
            for instance_id in &created_instances {
                let rt_id = runtime_id(instance_id).to_string();
                let _ = ctx.executor.remove(&rt_id).await;
                ctx.imds.deregister_instance(instance_id).await;
                let _ = ctx.store.remove_resource(instance_id);
            }
            Err(e)
        }
    }
}

pub fn describe_instances(
    store: &ResourceStore,
    req: &DescribeInstancesRequest,
) -> EngineResult<Page<InstanceView>> {
    let filters: Vec<Filter> =
        req.filters.iter().map(|f| Filter { name: f.name.clone(), values: f.values.clone() }).collect();
    let mut ids = store.registered_resources(ResourceKind::Instance);
    ids.sort();
    let mut matched = Vec::new();
    for id in ids {
        if !req.instance_ids.is_empty() && !req.instance_ids.contains(&id) {
            continue;
        }
        let attrs = InstanceAttrs::load(store, &id)?;
        if attrs.state == InstanceState::Terminated {
            continue;
        }
        if !all_filters_match(&filters, &attrs.tags, instance_attribute_lookup(&attrs))? {
            continue;
        }
        matched.push(to_view(&attrs, &id));
    }
    let max_results = req.max_results.unwrap_or(1000) as usize;
    paginate(&matched, max_results, req.next_token.as_deref()).map_err(EngineError::from)
}

pub fn describe_instance_status(
    store: &ResourceStore,
    req: &DescribeInstanceStatusRequest,
) -> EngineResult<Page<InstanceStatusView>> {
    let mut ids = store.registered_resources(ResourceKind::Instance);
    ids.sort();
    let mut matched = Vec::new();
    for id in ids {
        if !req.instance_ids.is_empty() && !req.instance_ids.contains(&id) {
            continue;
        }
        let attrs = InstanceAttrs::load(store, &id)?;
        if attrs.state == InstanceState::Terminated {
            continue;
        }
        let included = attrs.state == InstanceState::Running || req.include_all_instances;
        if !included {
            continue;
        }
        let (instance_status, system_status) = if attrs.state == InstanceState::Running {
            ("ok", "ok")
        } else {
            ("not-applicable", "not-applicable")
        };
        matched.push(InstanceStatusView {
            instance_id: id,
            availability_zone: attrs.availability_zone,
            state_code: attrs.state.code(),
            state_name: attrs.state.name().to_string(),
            instance_status,
            system_status,
        });
    }
    let max_results = req.max_results.unwrap_or(1000) as usize;
    paginate(&matched, max_results, req.next_token.as_deref()).map_err(EngineError::from)
}

fn load_running_or_stopped(store: &ResourceStore, id: &str) -> EngineResult<InstanceAttrs> {
    let attrs = InstanceAttrs::load(store, id)?;
    if attrs.state == InstanceState::Terminated {
        return Err(EngineError::not_found("Instance", id));
    }
    Ok(attrs)
}

/// `StartInstances`. Re-registers IMDS identity (the proxy drops state on
/// stop in some impls) and returns the instance id if it's a spot instance
/// whose reclaim timer the dispatcher should re-arm.
pub async fn start_instances(
    store: &ResourceStore,
    executor: &dyn ContainerExecutor,
    imds: &dyn ImdsProxy,
    instance_ids: &[String],
) -> EngineResult<Vec<String>> {
    let mut spot_restarted = Vec::new();
    for id in instance_ids {
        let mut attrs = load_running_or_stopped(store, id)?;
        if attrs.state == InstanceState::Running {
            continue;
        }
        let rt_id = runtime_id(id).to_string();
        executor.start(&rt_id).await?;
        attrs.state = InstanceState::Running;
        attrs.state_transition_reason = String::new();
        attrs.save(store, id)?;
        imds.set_metadata_enabled(id, attrs.http_endpoint_enabled).await;
        imds.clear_spot_action(id).await;
        if attrs.instance_lifecycle.is_some() {
            spot_restarted.push(id.clone());
        }
    }
    Ok(spot_restarted)
}

/// `StopInstances`. Returns the ids that were spot instances so the
/// dispatcher can cancel their reclaim timers.
pub async fn stop_instances(
    store: &ResourceStore,
    executor: &dyn ContainerExecutor,
    imds: &dyn ImdsProxy,
    instance_ids: &[String],
) -> EngineResult<Vec<String>> {
    let mut spot_stopped = Vec::new();
    for id in instance_ids {
        let mut attrs = load_running_or_stopped(store, id)?;
        if attrs.state == InstanceState::Stopped {
            continue;
        }
        let rt_id = runtime_id(id).to_string();
        executor.stop(&rt_id).await?;
        attrs.state = InstanceState::Stopped;
        attrs.state_transition_reason = format!("User initiated ({})", now_gmt_display());
        attrs.save(store, id)?;
        imds.clear_spot_action(id).await;
        if attrs.instance_lifecycle.is_some() {
            spot_stopped.push(id.clone());
        }
    }
    Ok(spot_stopped)
}

pub async fn reboot_instances(
    store: &ResourceStore,
    executor: &dyn ContainerExecutor,
    instance_ids: &[String],
) -> EngineResult<()> {
    for id in instance_ids {
        let attrs = load_running_or_stopped(store, id)?;
        if attrs.state != InstanceState::Running {
            continue;
        }
        let rt_id = runtime_id(id).to_string();
        executor.stop(&rt_id).await?;
        executor.start(&rt_id).await?;
    }
    Ok(())
}

/// `TerminateInstances`. Closes any open spot request, cleans up
/// delete-on-termination volumes, removes the container, and schedules
/// nothing itself — the dispatcher arms the reap timer and cancels any
/// outstanding reclaim timer.
pub async fn terminate_instances(
    store: &ResourceStore,
    executor: &dyn ContainerExecutor,
    imds: &dyn ImdsProxy,
    instance_ids: &[String],
) -> EngineResult<Vec<String>> {
    let mut terminated = Vec::new();
    for id in instance_ids {
        let mut attrs = match InstanceAttrs::load(store, id) {
            Ok(a) => a,
            Err(_) => continue,
        };
        if attrs.state == InstanceState::Terminated {
            continue;
        }
        attrs.state = InstanceState::ShuttingDown;
        attrs.save(store, id)?;

        let rt_id = runtime_id(id).to_string();
        let _ = executor.stop(&rt_id).await;

        let _ = volumes::cleanup_on_termination(store, id);

        if let Some(sir_id) = &attrs.spot_instance_request_id {
            let _ = spot::close_spot_request(store, sir_id, "instance-terminated-by-user");
        }

        attrs.state_reason_code = Some("Client.UserInitiatedShutdown".to_string());
        attrs.state_reason_message = Some("Client.UserInitiatedShutdown: User initiated shutdown".to_string());
        attrs.state_transition_reason = format!("User initiated ({})", now_gmt_display());
        attrs.state = InstanceState::Terminated;
        attrs.save(store, id)?;

        imds.clear_spot_action(id).await;
        imds.deregister_instance(id).await;
        let _ = executor.remove(&rt_id).await;

        terminated.push(id.clone());
    }
    Ok(terminated)
}

/// Removes a terminated instance's resource record once its reap timer
/// fires (`spec.md` §9: terminated instances are dropped from the store
/// after a delay rather than kept forever).
pub fn reap_instance(store: &ResourceStore, instance_id: &str) {
    let _ = store.remove_resource(instance_id);
}

pub async fn modify_instance_metadata_options(
    store: &ResourceStore,
    imds: &dyn ImdsProxy,
    req: &ModifyInstanceMetadataOptionsRequest,
) -> EngineResult<InstanceAttrs> {
    let mut attrs = InstanceAttrs::load(store, &req.instance_id)?;
    if let Some(state) = &req.http_endpoint {
        attrs.http_endpoint_enabled = state == "enabled";
    }
    attrs.save(store, &req.instance_id)?;
    imds.set_metadata_enabled(&req.instance_id, attrs.http_endpoint_enabled).await;
    Ok(attrs)
}

pub fn describe_instance_attribute(
    store: &ResourceStore,
    req: &DescribeInstanceAttributeRequest,
) -> EngineResult<String> {
    let attrs = InstanceAttrs::load(store, &req.instance_id)?;
    match req.attribute.as_str() {
        "instanceType" => Ok(attrs.instance_type),
        "userData" => Ok(attrs.user_data.unwrap_or_default()),
        "disableApiTermination" => Ok(attrs.disable_api_termination.to_string()),
        other => Err(EngineError::InvalidParameterValue(format!("unsupported attribute '{other}'"))),
    }
}

pub fn modify_instance_attribute(store: &ResourceStore, req: &ModifyInstanceAttributeRequest) -> EngineResult<()> {
    let mut attrs = InstanceAttrs::load(store, &req.instance_id)?;
    if let Some(v) = &req.instance_type {
        attrs.instance_type = v.clone();
    }
    if let Some(v) = &req.user_data {
        attrs.user_data = Some(v.clone());
    }
    if let Some(v) = req.disable_api_termination {
        attrs.disable_api_termination = v;
    }
    attrs.save(store, &req.instance_id)
}

pub fn spot_action_for(behavior: &str, reclaim_at: &str) -> SpotAction {
    match behavior {
        "stop" => SpotAction { action: "stop", time: reclaim_at.to_string() },
        "hibernate" => SpotAction { action: "hibernate", time: reclaim_at.to_string() },
        _ => SpotAction { action: "terminate", time: reclaim_at.to_string() },
    }
}
