//! Launch template-backed Auto Scaling Groups and warm pools (`spec.md`
//! §4.5). CRUD operations here only ever touch the resource store; actual
//! instance launches/terminations/stops are driven by [`reconcile`], which
//! the dispatcher runs as a per-group controller tick and again after every
//! mutating request for that group. On error, `reconcile` propagates an
//! `EngineError`; callers driving periodic ticks should log and continue
//! rather than treat it as fatal (`spec.md` §7).

use std::collections::BTreeMap;

use dc2_executor::{ContainerExecutor, ContainerStatus};
use dc2_filter::{all_filters_match, paginate, Filter, Page};
use dc2_ids::{runtime_id, IdAllocator, RngSource};
use dc2_imds::ImdsProxy;
use dc2_store::{ResourceKind, ResourceStore};
use dc2_wire::requests::{
    CreateAutoScalingGroupRequest, DeleteAutoScalingGroupRequest, DeleteWarmPoolRequest, DescribeAutoScalingGroupsRequest,
    DescribeWarmPoolRequest, DetachInstancesRequest, LaunchTemplateSpec, PutWarmPoolRequest, RunInstancesRequest,
    SetDesiredCapacityRequest, TagSpecification, UpdateAutoScalingGroupRequest,
};
use dc2_wire::responses::{AsgInstanceView, AutoScalingGroupView, WarmPoolView};

use crate::attrs::{AsgAttrs, InstanceAttrs, InstanceState, WarmPoolAttrs};
use crate::error::{EngineError, EngineResult};
use crate::filters::asg_attribute_lookup;
use crate::instances::{self, RunInstancesCtx};
use crate::launch_templates::resolve_launch_template;

/// Everything [`reconcile`] needs besides the group's own name, mirroring
/// `instances::RunInstancesCtx` since reconciliation is mostly a sequence of
/// `RunInstances`/`StartInstances`/`StopInstances`/`TerminateInstances` calls.
pub struct AsgEngineCtx<'a, R: RngSource> {
    pub store: &'a ResourceStore,
    pub ids: &'a IdAllocator<R>,
    pub executor: &'a dyn ContainerExecutor,
    pub imds: &'a dyn ImdsProxy,
    pub region: &'a str,
    pub owner_id: &'a str,
}

fn to_view(name: &str, attrs: &AsgAttrs, instances: Vec<AsgInstanceView>) -> AutoScalingGroupView {
    AutoScalingGroupView {
        auto_scaling_group_name: name.to_string(),
        min_size: attrs.min_size,
        max_size: attrs.max_size,
        desired_capacity: attrs.desired_capacity,
        launch_template_id: attrs.launch_template_id.clone(),
        launch_template_version: attrs.launch_template_version.clone(),
        status: attrs.status.clone(),
        instances,
        tags: attrs.tags.clone(),
    }
}

fn to_asg_instance_view(id: &str, attrs: &InstanceAttrs) -> AsgInstanceView {
    AsgInstanceView {
        instance_id: id.to_string(),
        lifecycle_state: attrs
            .asg_lifecycle_state
            .clone()
            .or_else(|| attrs.warm_pool_lifecycle_state.clone())
            .unwrap_or_else(|| "Pending".to_string()),
        health_status: if attrs.state == InstanceState::Running { "Healthy" } else { "Unhealthy" }.to_string(),
        launch_template_id: attrs.launch_template_id.clone().unwrap_or_default(),
        launch_template_version: attrs.launch_template_version.clone().unwrap_or_default(),
        protected_from_scale_in: attrs.protected_from_scale_in,
    }
}

/// Every non-terminated instance belonging to `asg_name` (warm or
/// in-service), oldest-launched first, id as a tiebreaker.
fn group_instances(store: &ResourceStore, asg_name: &str) -> EngineResult<Vec<(String, InstanceAttrs)>> {
    let mut out = Vec::new();
    for id in store.registered_resources(ResourceKind::Instance) {
        let attrs = InstanceAttrs::load(store, &id)?;
        if attrs.asg_name.as_deref() != Some(asg_name) || attrs.state == InstanceState::Terminated {
            continue;
        }
        out.push((id, attrs));
    }
    out.sort_by(|a, b| (a.1.launch_time.as_str(), a.0.as_str()).cmp(&(b.1.launch_time.as_str(), b.0.as_str())));
    Ok(out)
}

fn group_instance_views(store: &ResourceStore, asg_name: &str) -> EngineResult<Vec<AsgInstanceView>> {
    Ok(group_instances(store, asg_name)?
        .into_iter()
        .filter(|(_, a)| a.warm_pool_lifecycle_state.is_none())
        .map(|(id, a)| to_asg_instance_view(&id, &a))
        .collect())
}

fn is_in_service(attrs: &InstanceAttrs) -> bool {
    attrs.asg_lifecycle_state.as_deref() == Some("InService")
}

fn is_warm(attrs: &InstanceAttrs) -> bool {
    attrs.warm_pool_lifecycle_state.is_some()
}

fn warm_state_for_pool(pool_state: &str) -> &'static str {
    match pool_state {
        "running" => "Warmed:Running",
        "hibernated" => "Warmed:Hibernated",
        _ => "Warmed:Stopped",
    }
}

pub fn create_auto_scaling_group(
    store: &ResourceStore,
    req: &CreateAutoScalingGroupRequest,
) -> EngineResult<AutoScalingGroupView> {
    if store.contains(&req.auto_scaling_group_name) {
        return Err(EngineError::InvalidParameterValue(format!(
            "Auto Scaling group '{}' already exists",
            req.auto_scaling_group_name
        )));
    }
    if req.min_size > req.max_size {
        return Err(EngineError::ValidationError("MinSize must be <= MaxSize".to_string()));
    }
    let desired_capacity = req.desired_capacity.unwrap_or(req.min_size);
    if desired_capacity < req.min_size || desired_capacity > req.max_size {
        return Err(EngineError::ValidationError(
            "DesiredCapacity must be between MinSize and MaxSize".to_string(),
        ));
    }
    let (template_id, _, _) = resolve_launch_template(store, &req.launch_template)?;

    store.register_resource(ResourceKind::AutoScalingGroup, &req.auto_scaling_group_name)?;
    let attrs = AsgAttrs {
        min_size: req.min_size,
        max_size: req.max_size,
        desired_capacity,
        launch_template_id: template_id,
        launch_template_version: req.launch_template.version.clone().unwrap_or_else(|| "$Default".to_string()),
        vpc_zone_identifier: req.vpc_zone_identifier.clone(),
        status: None,
        tags: req.tags.clone(),
    };
    attrs.save(store, &req.auto_scaling_group_name)?;
    WarmPoolAttrs::default().save(store, &req.auto_scaling_group_name)?;

    Ok(to_view(&req.auto_scaling_group_name, &attrs, Vec::new()))
}

pub fn update_auto_scaling_group(store: &ResourceStore, req: &UpdateAutoScalingGroupRequest) -> EngineResult<()> {
    let mut attrs = AsgAttrs::load(store, &req.auto_scaling_group_name)?;
    if let Some(v) = req.min_size {
        attrs.min_size = v;
    }
    if let Some(v) = req.max_size {
        attrs.max_size = v;
    }
    if attrs.min_size > attrs.max_size {
        return Err(EngineError::ValidationError("MinSize must be <= MaxSize".to_string()));
    }
    if let Some(v) = req.desired_capacity {
        attrs.desired_capacity = v;
    }
    attrs.desired_capacity = attrs.desired_capacity.clamp(attrs.min_size, attrs.max_size);
    if let Some(spec) = &req.launch_template {
        let (template_id, _, _) = resolve_launch_template(store, spec)?;
        attrs.launch_template_id = template_id;
        attrs.launch_template_version = spec.version.clone().unwrap_or_else(|| "$Default".to_string());
    }
    attrs.save(store, &req.auto_scaling_group_name)
}

/// Marks the group for deletion; `reconcile` drains its instances and warm
/// pool and removes the resource once both are empty (`spec.md` §4.5).
pub fn delete_auto_scaling_group(store: &ResourceStore, req: &DeleteAutoScalingGroupRequest) -> EngineResult<()> {
    let mut attrs = AsgAttrs::load(store, &req.auto_scaling_group_name)?;
    attrs.min_size = 0;
    attrs.desired_capacity = 0;
    attrs.status = Some("Deleting".to_string());
    attrs.save(store, &req.auto_scaling_group_name)
}

pub fn describe_auto_scaling_groups(
    store: &ResourceStore,
    req: &DescribeAutoScalingGroupsRequest,
) -> EngineResult<Page<AutoScalingGroupView>> {
    let filters: Vec<Filter> = req.filters.iter().map(|f| Filter { name: f.name.clone(), values: f.values.clone() }).collect();
    let mut names = store.registered_resources(ResourceKind::AutoScalingGroup);
    names.sort();
    let mut matched = Vec::new();
    for name in names {
        if !req.auto_scaling_group_names.is_empty() && !req.auto_scaling_group_names.contains(&name) {
            continue;
        }
        let attrs = AsgAttrs::load(store, &name)?;
        let tag_map: BTreeMap<String, String> = attrs.tags.iter().map(|(k, v, _)| (k.clone(), v.clone())).collect();
        if !all_filters_match(&filters, &tag_map, asg_attribute_lookup(&attrs))? {
            continue;
        }
        let instances = group_instance_views(store, &name)?;
        matched.push(to_view(&name, &attrs, instances));
    }
    let max_results = req.max_records.unwrap_or(1000) as usize;
    paginate(&matched, max_results, req.next_token.as_deref()).map_err(EngineError::from)
}

pub fn set_desired_capacity(store: &ResourceStore, req: &SetDesiredCapacityRequest) -> EngineResult<()> {
    let mut attrs = AsgAttrs::load(store, &req.auto_scaling_group_name)?;
    if req.desired_capacity < attrs.min_size || req.desired_capacity > attrs.max_size {
        return Err(EngineError::ValidationError(
            "DesiredCapacity must be between MinSize and MaxSize".to_string(),
        ));
    }
    attrs.desired_capacity = req.desired_capacity;
    attrs.save(store, &req.auto_scaling_group_name)
}

/// Removes the named instances from the group; if the request doesn't ask
/// to decrement desired capacity, the next reconcile pass launches
/// replacements (`spec.md` §4.5).
pub fn detach_instances(store: &ResourceStore, req: &DetachInstancesRequest) -> EngineResult<()> {
    let mut attrs = AsgAttrs::load(store, &req.auto_scaling_group_name)?;
    let mut detached = 0u32;
    for id in &req.instance_ids {
        let mut inst = InstanceAttrs::load(store, id)?;
        if inst.asg_name.as_deref() != Some(req.auto_scaling_group_name.as_str()) {
            continue;
        }
        inst.asg_name = None;
        inst.asg_lifecycle_state = None;
        inst.protected_from_scale_in = false;
        inst.save(store, id)?;
        detached += 1;
    }
    if req.should_decrement_desired_capacity && detached > 0 {
        attrs.desired_capacity = attrs.desired_capacity.saturating_sub(detached).max(attrs.min_size);
        attrs.save(store, &req.auto_scaling_group_name)?;
    }
    Ok(())
}

pub fn put_warm_pool(store: &ResourceStore, req: &PutWarmPoolRequest) -> EngineResult<()> {
    if !store.contains(&req.auto_scaling_group_name) {
        return Err(EngineError::not_found("AutoScalingGroup", &req.auto_scaling_group_name));
    }
    let mut pool = WarmPoolAttrs::load(store, &req.auto_scaling_group_name)?;
    if let Some(v) = req.min_size {
        pool.min_size = v;
    }
    if let Some(v) = req.max_group_prepared_capacity {
        pool.max_group_prepared_capacity = if v < 0 { None } else { Some(v) };
    }
    if let Some(s) = &req.pool_state {
        let normalized = s.to_ascii_lowercase();
        if !["stopped", "running", "hibernated"].contains(&normalized.as_str()) {
            return Err(EngineError::InvalidParameterValue(format!("unsupported PoolState '{s}'")));
        }
        pool.pool_state = normalized;
    } else if pool.pool_state.is_empty() {
        pool.pool_state = "stopped".to_string();
    }
    pool.reuse_on_scale_in = req.reuse_on_scale_in;
    pool.configured = true;
    pool.status = None;
    pool.save(store, &req.auto_scaling_group_name)
}

/// Marks the pool `PendingDelete`; `reconcile` terminates its warm
/// instances and clears the configuration once none remain (`spec.md` §4.5).
pub fn delete_warm_pool(store: &ResourceStore, req: &DeleteWarmPoolRequest) -> EngineResult<()> {
    let mut pool = WarmPoolAttrs::load(store, &req.auto_scaling_group_name)?;
    if !pool.configured {
        return Err(EngineError::InvalidParameterValue("no warm pool is configured for this group".to_string()));
    }
    pool.status = Some("PendingDelete".to_string());
    pool.save(store, &req.auto_scaling_group_name)
}

pub fn describe_warm_pool(store: &ResourceStore, req: &DescribeWarmPoolRequest) -> EngineResult<WarmPoolView> {
    let pool = WarmPoolAttrs::load(store, &req.auto_scaling_group_name)?;
    let instances = group_instances(store, &req.auto_scaling_group_name)?
        .into_iter()
        .filter(|(_, a)| is_warm(a))
        .map(|(id, a)| to_asg_instance_view(&id, &a))
        .collect();
    Ok(WarmPoolView {
        min_size: pool.min_size,
        max_group_prepared_capacity: pool.max_group_prepared_capacity,
        pool_state: if pool.pool_state.is_empty() { "stopped".to_string() } else { pool.pool_state },
        status: pool.status,
        instances,
    })
}

enum Placement {
    InService,
    Warm(String),
}

#[allow(clippy::too_many_arguments)]
async fn launch_asg_instances<R: RngSource>(
    ctx: &AsgEngineCtx<'_, R>,
    asg_name: &str,
    asg: &AsgAttrs,
    template_id: &str,
    version_n: i64,
    count: u32,
    placement: Placement,
) -> EngineResult<()> {
    if count == 0 {
        return Ok(());
    }
    let propagate_tags: Vec<(String, String)> =
        asg.tags.iter().filter(|(_, _, propagate)| *propagate).map(|(k, v, _)| (k.clone(), v.clone())).collect();
    let req = RunInstancesRequest {
        image_id: None,
        instance_type: None,
        min_count: count,
        max_count: count,
        key_name: None,
        user_data: None,
        availability_zone: None,
        tag_specifications: if propagate_tags.is_empty() {
            vec![]
        } else {
            vec![TagSpecification { resource_type: "instance".to_string(), tags: propagate_tags }]
        },
        market_type: None,
        spot_max_price: None,
        spot_interruption_behavior: None,
        launch_template: Some(LaunchTemplateSpec {
            id: Some(template_id.to_string()),
            name: None,
            version: Some(version_n.to_string()),
        }),
        block_device_mappings: vec![],
        dry_run: false,
    };
    let run_ctx = RunInstancesCtx {
        store: ctx.store,
        ids: ctx.ids,
        executor: ctx.executor,
        imds: ctx.imds,
        region: ctx.region,
        owner_id: ctx.owner_id,
    };
    let outcome = instances::run_instances(&run_ctx, &req).await?;
    for inst in &outcome.reservation.instances {
        let mut attrs = InstanceAttrs::load(ctx.store, &inst.instance_id)?;
        attrs.asg_name = Some(asg_name.to_string());
        match &placement {
            Placement::InService => {
                attrs.asg_lifecycle_state = Some("InService".to_string());
                attrs.warm_pool_lifecycle_state = None;
            }
            Placement::Warm(state) => {
                attrs.asg_lifecycle_state = None;
                attrs.warm_pool_lifecycle_state = Some(state.clone());
            }
        }
        attrs.save(ctx.store, &inst.instance_id)?;
    }
    Ok(())
}

/// Runs one pass of the reconciliation loop for a single group (`spec.md`
/// §4.5): replaces dead/unhealthy members, scales to `DesiredCapacity`
/// (pulling from the warm pool before launching fresh instances, evicting
/// oldest-first on scale-in), then brings the warm pool itself to its
/// target size and pool state. A no-op, not an error, if the group was
/// already fully deleted by an earlier pass.
pub async fn reconcile<R: RngSource>(ctx: &AsgEngineCtx<'_, R>, asg_name: &str) -> EngineResult<()> {
    let asg = match AsgAttrs::load(ctx.store, asg_name) {
        Ok(a) => a,
        Err(_) => return Ok(()),
    };
    let warm_pool = WarmPoolAttrs::load(ctx.store, asg_name)?;
    let (template_id, version_n, _) = resolve_launch_template(
        ctx.store,
        &LaunchTemplateSpec {
            id: Some(asg.launch_template_id.clone()),
            name: None,
            version: Some(asg.launch_template_version.clone()),
        },
    )?;
    let current_version = version_n.to_string();

    // 1. probe group-owned instances; replace anything whose container is
    // exited, removed, or unhealthy.
    for (id, attrs) in group_instances(ctx.store, asg_name)? {
        let rt_id = runtime_id(&id);
        let status = ctx.executor.status(rt_id).await.unwrap_or(ContainerStatus::Removed);
        let dead = matches!(status, ContainerStatus::Exited | ContainerStatus::Removed | ContainerStatus::Unhealthy);
        if dead && attrs.state != InstanceState::Terminated {
            let _ = instances::terminate_instances(ctx.store, ctx.executor, ctx.imds, std::slice::from_ref(&id)).await;
        }
    }

    // 2/3. scale in-service membership to DesiredCapacity.
    let members = group_instances(ctx.store, asg_name)?;
    let mut in_service: Vec<(String, InstanceAttrs)> = members.iter().filter(|(_, a)| is_in_service(a)).cloned().collect();
    let active = in_service.len() as u32;

    if active < asg.desired_capacity {
        let mut need = asg.desired_capacity - active;
        let mut warm: Vec<(String, InstanceAttrs)> = members.iter().filter(|(_, a)| is_warm(a)).cloned().collect();
        warm.sort_by(|a, b| a.1.launch_time.cmp(&b.1.launch_time));
        for (id, _attrs) in warm {
            if need == 0 {
                break;
            }
            let current = InstanceAttrs::load(ctx.store, &id)?;
            if current.launch_template_version.as_deref() != Some(current_version.as_str()) {
                continue;
            }
            instances::start_instances(ctx.store, ctx.executor, ctx.imds, std::slice::from_ref(&id)).await?;
            let mut promoted = InstanceAttrs::load(ctx.store, &id)?;
            promoted.asg_lifecycle_state = Some("InService".to_string());
            promoted.warm_pool_lifecycle_state = None;
            promoted.save(ctx.store, &id)?;
            need -= 1;
        }
        if need > 0 {
            launch_asg_instances(ctx, asg_name, &asg, &template_id, version_n, need, Placement::InService).await?;
        }
    } else if active > asg.desired_capacity {
        let excess = active - asg.desired_capacity;
        in_service.sort_by(|a, b| a.1.launch_time.cmp(&b.1.launch_time));
        let victims: Vec<String> = in_service
            .iter()
            .filter(|(_, a)| !a.protected_from_scale_in)
            .take(excess as usize)
            .map(|(id, _)| id.clone())
            .collect();
        if warm_pool.configured && warm_pool.reuse_on_scale_in {
            let target_state = warm_state_for_pool(&warm_pool.pool_state);
            for id in &victims {
                instances::stop_instances(ctx.store, ctx.executor, ctx.imds, std::slice::from_ref(id)).await?;
                let mut attrs = InstanceAttrs::load(ctx.store, id)?;
                attrs.asg_lifecycle_state = None;
                attrs.warm_pool_lifecycle_state = Some(target_state.to_string());
                attrs.launch_template_id = Some(template_id.clone());
                attrs.launch_template_version = Some(current_version.clone());
                attrs.save(ctx.store, id)?;
            }
        } else {
            let _ = instances::terminate_instances(ctx.store, ctx.executor, ctx.imds, &victims).await;
        }
    }

    // warm pool upkeep.
    if warm_pool.status.as_deref() == Some("PendingDelete") {
        let warm: Vec<String> =
            group_instances(ctx.store, asg_name)?.into_iter().filter(|(_, a)| is_warm(a)).map(|(id, _)| id).collect();
        if !warm.is_empty() {
            let _ = instances::terminate_instances(ctx.store, ctx.executor, ctx.imds, &warm).await;
        }
        let remaining = group_instances(ctx.store, asg_name)?.into_iter().filter(|(_, a)| is_warm(a)).count();
        if remaining == 0 {
            let mut pool = WarmPoolAttrs::load(ctx.store, asg_name)?;
            pool.clear(ctx.store, asg_name)?;
        }
    } else if warm_pool.configured {
        let desired_state = warm_state_for_pool(&warm_pool.pool_state);
        let mut warm: Vec<(String, InstanceAttrs)> =
            group_instances(ctx.store, asg_name)?.into_iter().filter(|(_, a)| is_warm(a)).collect();

        for (id, attrs) in &warm {
            if attrs.launch_template_version.as_deref() != Some(current_version.as_str()) {
                let _ = instances::terminate_instances(ctx.store, ctx.executor, ctx.imds, std::slice::from_ref(id)).await;
                continue;
            }
            if attrs.warm_pool_lifecycle_state.as_deref() != Some(desired_state) {
                if desired_state == "Warmed:Running" {
                    instances::start_instances(ctx.store, ctx.executor, ctx.imds, std::slice::from_ref(id)).await?;
                } else {
                    instances::stop_instances(ctx.store, ctx.executor, ctx.imds, std::slice::from_ref(id)).await?;
                }
                let mut updated = InstanceAttrs::load(ctx.store, id)?;
                updated.warm_pool_lifecycle_state = Some(desired_state.to_string());
                updated.save(ctx.store, id)?;
            }
        }

        warm = group_instances(ctx.store, asg_name)?.into_iter().filter(|(_, a)| is_warm(a)).collect();
        let active_now = group_instances(ctx.store, asg_name)?.into_iter().filter(|(_, a)| is_in_service(&a)).count() as i64;
        let target = match warm_pool.max_group_prepared_capacity {
            Some(cap) => warm_pool.min_size.min((cap - active_now).max(0) as u32),
            None => warm_pool.min_size,
        };
        let current_warm = warm.len() as u32;
        if current_warm < target {
            launch_asg_instances(
                ctx,
                asg_name,
                &asg,
                &template_id,
                version_n,
                target - current_warm,
                Placement::Warm(desired_state.to_string()),
            )
            .await?;
        } else if current_warm > target {
            warm.sort_by(|a, b| a.1.launch_time.cmp(&b.1.launch_time));
            let excess: Vec<String> = warm.into_iter().take((current_warm - target) as usize).map(|(id, _)| id).collect();
            let _ = instances::terminate_instances(ctx.store, ctx.executor, ctx.imds, &excess).await;
        }
    }

    if asg.status.as_deref() == Some("Deleting") {
        let remaining = group_instances(ctx.store, asg_name)?.len();
        if remaining == 0 {
            ctx.store.remove_resource(asg_name)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dc2_ids::SequentialRng;
    use dc2_imds::InMemoryImdsProxy;
    use dc2_wire::requests::CreateLaunchTemplateRequest;

    struct Fixture {
        store: ResourceStore,
        ids: IdAllocator<SequentialRng>,
        executor: dc2_executor::InMemoryExecutor,
        imds: InMemoryImdsProxy,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: ResourceStore::new(),
                ids: IdAllocator::new(SequentialRng::new(1)),
                executor: dc2_executor::InMemoryExecutor::new(),
                imds: InMemoryImdsProxy::new(),
            }
        }

        fn ctx(&self) -> AsgEngineCtx<'_, SequentialRng> {
            AsgEngineCtx {
                store: &self.store,
                ids: &self.ids,
                executor: &self.executor,
                imds: &self.imds,
                region: "us-east-1",
                owner_id: "000000000000",
            }
        }
    }

    fn make_template(store: &ResourceStore, ids: &IdAllocator<SequentialRng>) -> String {
        let req = CreateLaunchTemplateRequest {
            launch_template_name: "web".to_string(),
            image_id: Some("ami-1".to_string()),
            instance_type: Some("t3.micro".to_string()),
            key_name: None,
            user_data: None,
        };
        crate::launch_templates::create_launch_template(store, ids, &req).unwrap().launch_template_id
    }

    #[tokio::test]
    async fn reconcile_scales_out_to_desired_capacity() {
        let fx = Fixture::new();
        let lt_id = make_template(&fx.store, &fx.ids);
        let create = CreateAutoScalingGroupRequest {
            auto_scaling_group_name: "web-asg".to_string(),
            min_size: 1,
            max_size: 5,
            desired_capacity: Some(3),
            launch_template: LaunchTemplateSpec { id: Some(lt_id), name: None, version: Some("$Latest".to_string()) },
            vpc_zone_identifier: None,
            tags: vec![("team".to_string(), "web".to_string(), true)],
        };
        create_auto_scaling_group(&fx.store, &create).unwrap();

        reconcile(&fx.ctx(), "web-asg").await.unwrap();

        let members = group_instances(&fx.store, "web-asg").unwrap();
        assert_eq!(members.len(), 3);
        assert!(members.iter().all(|(_, a)| is_in_service(a)));
        assert!(members.iter().all(|(_, a)| a.tags.get("team").map(String::as_str) == Some("web")));
    }

    #[tokio::test]
    async fn reconcile_scales_in_oldest_first() {
        let fx = Fixture::new();
        let lt_id = make_template(&fx.store, &fx.ids);
        let create = CreateAutoScalingGroupRequest {
            auto_scaling_group_name: "web-asg".to_string(),
            min_size: 0,
            max_size: 5,
            desired_capacity: Some(3),
            launch_template: LaunchTemplateSpec { id: Some(lt_id), name: None, version: Some("$Latest".to_string()) },
            vpc_zone_identifier: None,
            tags: vec![],
        };
        create_auto_scaling_group(&fx.store, &create).unwrap();
        reconcile(&fx.ctx(), "web-asg").await.unwrap();
        let before = group_instances(&fx.store, "web-asg").unwrap();
        assert_eq!(before.len(), 3);
        let oldest_id = before[0].0.clone();

        set_desired_capacity(&fx.store, &SetDesiredCapacityRequest { auto_scaling_group_name: "web-asg".to_string(), desired_capacity: 1 })
            .unwrap();
        reconcile(&fx.ctx(), "web-asg").await.unwrap();

        let after = group_instances(&fx.store, "web-asg").unwrap();
        assert_eq!(after.len(), 1);
        assert!(!after.iter().any(|(id, _)| *id == oldest_id));
    }

    #[tokio::test]
    async fn reconcile_replaces_unhealthy_member() {
        let fx = Fixture::new();
        let lt_id = make_template(&fx.store, &fx.ids);
        let create = CreateAutoScalingGroupRequest {
            auto_scaling_group_name: "web-asg".to_string(),
            min_size: 1,
            max_size: 1,
            desired_capacity: Some(1),
            launch_template: LaunchTemplateSpec { id: Some(lt_id), name: None, version: Some("$Latest".to_string()) },
            vpc_zone_identifier: None,
            tags: vec![],
        };
        create_auto_scaling_group(&fx.store, &create).unwrap();
        reconcile(&fx.ctx(), "web-asg").await.unwrap();
        let before = group_instances(&fx.store, "web-asg").unwrap();
        assert_eq!(before.len(), 1);
        let dead_id = before[0].0.clone();
        fx.executor.simulate_unhealthy(runtime_id(&dead_id));

        reconcile(&fx.ctx(), "web-asg").await.unwrap();

        let after = group_instances(&fx.store, "web-asg").unwrap();
        assert_eq!(after.len(), 1);
        assert!(!after.iter().any(|(id, _)| *id == dead_id));
    }

    #[tokio::test]
    async fn warm_pool_instance_is_promoted_on_scale_out() {
        let fx = Fixture::new();
        let lt_id = make_template(&fx.store, &fx.ids);
        let create = CreateAutoScalingGroupRequest {
            auto_scaling_group_name: "web-asg".to_string(),
            min_size: 0,
            max_size: 5,
            desired_capacity: Some(1),
            launch_template: LaunchTemplateSpec { id: Some(lt_id), name: None, version: Some("$Latest".to_string()) },
            vpc_zone_identifier: None,
            tags: vec![],
        };
        create_auto_scaling_group(&fx.store, &create).unwrap();
        put_warm_pool(
            &fx.store,
            &PutWarmPoolRequest {
                auto_scaling_group_name: "web-asg".to_string(),
                min_size: Some(1),
                max_group_prepared_capacity: None,
                pool_state: Some("stopped".to_string()),
                reuse_on_scale_in: true,
            },
        )
        .unwrap();
        reconcile(&fx.ctx(), "web-asg").await.unwrap();

        let after_first = group_instances(&fx.store, "web-asg").unwrap();
        assert_eq!(after_first.iter().filter(|(_, a)| is_in_service(a)).count(), 1);
        assert_eq!(after_first.iter().filter(|(_, a)| is_warm(a)).count(), 1);

        set_desired_capacity(&fx.store, &SetDesiredCapacityRequest { auto_scaling_group_name: "web-asg".to_string(), desired_capacity: 2 })
            .unwrap();
        reconcile(&fx.ctx(), "web-asg").await.unwrap();

        let after_second = group_instances(&fx.store, "web-asg").unwrap();
        assert_eq!(after_second.iter().filter(|(_, a)| is_in_service(a)).count(), 2);
    }

    #[tokio::test]
    async fn describe_auto_scaling_groups_filters_by_tag() {
        let fx = Fixture::new();
        let lt_id = make_template(&fx.store, &fx.ids);
        create_auto_scaling_group(
            &fx.store,
            &CreateAutoScalingGroupRequest {
                auto_scaling_group_name: "web-asg".to_string(),
                min_size: 0,
                max_size: 1,
                desired_capacity: Some(0),
                launch_template: LaunchTemplateSpec { id: Some(lt_id.clone()), name: None, version: None },
                vpc_zone_identifier: None,
                tags: vec![("env".to_string(), "prod".to_string(), false)],
            },
        )
        .unwrap();
        create_auto_scaling_group(
            &fx.store,
            &CreateAutoScalingGroupRequest {
                auto_scaling_group_name: "batch-asg".to_string(),
                min_size: 0,
                max_size: 1,
                desired_capacity: Some(0),
                launch_template: LaunchTemplateSpec { id: Some(lt_id), name: None, version: None },
                vpc_zone_identifier: None,
                tags: vec![("env".to_string(), "dev".to_string(), false)],
            },
        )
        .unwrap();

        let page = describe_auto_scaling_groups(
            &fx.store,
            &DescribeAutoScalingGroupsRequest {
                auto_scaling_group_names: vec![],
                filters: vec![dc2_wire::WireFilter { name: "tag:env".to_string(), values: vec!["prod".to_string()] }],
                max_records: None,
                next_token: None,
            },
        )
        .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].auto_scaling_group_name, "web-asg");
    }
}
