//! The single fan-in of mutations (`spec.md` §4.8, SPEC_FULL.md §4.8). One
//! process-wide `tokio::sync::Mutex` serializes everything the lifecycle
//! modules do to the store, the executor, and the IMDS proxy; the
//! dispatcher itself owns the three maps that outlive any one request —
//! spot reclaim cancellation handles, ASG controller tasks, and instance
//! reap timers — plus the shared timer wheels that drive reclaim and reap.
//!
//! Test-profile delays are read inside the lock (the profile engine itself
//! is cheap and lock-free) but *slept* outside it, so one slow request
//! doesn't head-of-line block every other handler (`spec.md` §4.8).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dc2_executor::ContainerExecutor;
use dc2_filter::Page;
use dc2_ids::{runtime_id, IdAllocator, RngSource};
use dc2_imds::ImdsProxy;
use dc2_profile::{Hook, ProfileEngine, RequestFacts, When};
use dc2_store::ResourceStore;
use dc2_wire::requests::*;
use dc2_wire::responses::{
    AutoScalingGroupView, InstanceStatusView, InstanceView, LaunchTemplateVersionView, LaunchTemplateView,
    ReservationView, SpotInstanceRequestView, SpotPriceView, VolumeView, WarmPoolView,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::autoscaling::{self, AsgEngineCtx};
use crate::error::{EngineError, EngineResult};
use crate::instances::{self, RunInstancesCtx};
use crate::launch_templates;
use crate::spot;
use crate::tags;
use crate::timers::{TimerId, TimerWheel};
use crate::volumes;

/// Timing knobs the dispatcher applies to every spot instance unless a
/// test-profile rule overrides them for the matching request shape.
#[derive(Debug, Clone, Copy)]
pub struct SpotTiming {
    pub reclaim_after: Duration,
    pub reclaim_notice: Duration,
}

/// How long a terminated instance's resource record survives before
/// `reap_instance` drops it (`spec.md` §9).
const REAP_DELAY: Duration = Duration::from_secs(30);

/// How often a running ASG's controller re-reconciles even without a
/// triggering request (warm pool convergence, dead-container detection).
const ASG_TICK_INTERVAL: Duration = Duration::from_secs(5);

struct ControllerHandle {
    task: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

type ReclaimWheel = TimerWheel<Box<dyn Fn(TimerId) + Send + Sync>>;
type ReapWheel = TimerWheel<Box<dyn Fn(TimerId) + Send + Sync>>;
type WarnWheel = TimerWheel<Box<dyn Fn(TimerId) + Send + Sync>>;

/// State guarded by the single dispatcher mutex, plus the handles that are
/// themselves safe to touch without it (the wheels arm/cancel under their
/// own internal locking; only the maps need the dispatcher's mutex).
struct Inner {
    spot_reclaim_cancels: HashMap<String, TimerId>,
    spot_warn_cancels: HashMap<String, TimerId>,
    asg_controllers: HashMap<String, ControllerHandle>,
    reap_timers: HashMap<String, TimerId>,
}

/// The literal Rust type implementing `spec.md` §4.8: one process-wide
/// mutex around every mutation, fanning requests out to the lifecycle
/// modules in `dc2-engine` and owning the long-lived controller/timer
/// bookkeeping a plain request/response cycle can't.
///
/// `Clone` is implemented by hand rather than derived: `#[derive(Clone)]`
/// would add a spurious `R: Clone` bound even though `R` only ever appears
/// behind an `Arc`, which would rule out non-`Clone` randomness sources
/// like [`dc2_ids::SequentialRng`].
pub struct Dispatcher<R: RngSource + 'static> {
    store: ResourceStore,
    ids: Arc<IdAllocator<R>>,
    executor: Arc<dyn ContainerExecutor>,
    imds: Arc<dyn ImdsProxy>,
    profile: Arc<ProfileEngine>,
    region: String,
    owner_id: String,
    spot_timing: SpotTiming,
    inner: Arc<Mutex<Inner>>,
    reclaim_wheel: ReclaimWheel,
    reap_wheel: ReapWheel,
    warn_wheel: WarnWheel,
    shutdown: CancellationToken,
}

impl<R: RngSource + 'static> Clone for Dispatcher<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ids: self.ids.clone(),
            executor: self.executor.clone(),
            imds: self.imds.clone(),
            profile: self.profile.clone(),
            region: self.region.clone(),
            owner_id: self.owner_id.clone(),
            spot_timing: self.spot_timing,
            inner: self.inner.clone(),
            reclaim_wheel: self.reclaim_wheel.clone(),
            reap_wheel: self.reap_wheel.clone(),
            warn_wheel: self.warn_wheel.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<R: RngSource + 'static> Dispatcher<R> {
    pub fn new(
        store: ResourceStore,
        ids: IdAllocator<R>,
        executor: Arc<dyn ContainerExecutor>,
        imds: Arc<dyn ImdsProxy>,
        profile: Arc<ProfileEngine>,
        region: String,
        owner_id: String,
        spot_timing: SpotTiming,
    ) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            spot_reclaim_cancels: HashMap::new(),
            spot_warn_cancels: HashMap::new(),
            asg_controllers: HashMap::new(),
            reap_timers: HashMap::new(),
        }));

        let reclaim_store = store.clone();
        let reclaim_executor = executor.clone();
        let reclaim_imds = imds.clone();
        let reclaim_on_fire: Box<dyn Fn(TimerId) + Send + Sync> = Box::new(move |id: TimerId| {
            let store = reclaim_store.clone();
            let executor = reclaim_executor.clone();
            let imds = reclaim_imds.clone();
            tokio::spawn(async move {
                fire_spot_reclaim(store, executor, imds, id).await;
            });
        });
        let reclaim_wheel: ReclaimWheel = TimerWheel::spawn(reclaim_on_fire);

        let reap_store = store.clone();
        let reap_on_fire: Box<dyn Fn(TimerId) + Send + Sync> = Box::new(move |id: TimerId| {
            let store = reap_store.clone();
            tokio::spawn(async move {
                fire_reap(store, id).await;
            });
        });
        let reap_wheel: ReapWheel = TimerWheel::spawn(reap_on_fire);

        let warn_imds = imds.clone();
        let warn_on_fire: Box<dyn Fn(TimerId) + Send + Sync> = Box::new(move |id: TimerId| {
            let imds = warn_imds.clone();
            tokio::spawn(async move {
                fire_spot_warn(imds, id).await;
            });
        });
        let warn_wheel: WarnWheel = TimerWheel::spawn(warn_on_fire);

        Self {
            store,
            ids: Arc::new(ids),
            executor,
            imds,
            profile,
            region,
            owner_id,
            spot_timing,
            inner,
            reclaim_wheel,
            reap_wheel,
            warn_wheel,
            shutdown: CancellationToken::new(),
        }
    }

    fn run_ctx(&self) -> RunInstancesCtx<'_, R> {
        RunInstancesCtx {
            store: &self.store,
            ids: self.ids.as_ref(),
            executor: self.executor.as_ref(),
            imds: self.imds.as_ref(),
            region: &self.region,
            owner_id: &self.owner_id,
        }
    }

    fn asg_ctx(&self) -> AsgEngineCtx<'_, R> {
        AsgEngineCtx {
            store: &self.store,
            ids: self.ids.as_ref(),
            executor: self.executor.as_ref(),
            imds: self.imds.as_ref(),
            region: &self.region,
            owner_id: &self.owner_id,
        }
    }

    /// Sleeps for the sum of matching test-profile delays at `hook`/`when`,
    /// outside the dispatcher lock. Called both before a lock is taken (the
    /// "before" hooks) and after it's released (the "after" hooks).
    async fn apply_delay(&self, facts: &RequestFacts, hook: Hook, when: When) {
        let delay = self.profile.delay(facts, hook, when);
        if delay > Duration::ZERO {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.cancelled() => {}
            }
        }
    }

    fn reclaim_timing(&self, facts: &RequestFacts) -> SpotTiming {
        let overrides = self.profile.reclaim_overrides(facts);
        SpotTiming {
            reclaim_after: overrides.after.unwrap_or(self.spot_timing.reclaim_after),
            reclaim_notice: overrides.notice.unwrap_or(self.spot_timing.reclaim_notice),
        }
    }

    fn request_facts(action: &str, req: &RunInstancesRequest) -> RequestFacts {
        RequestFacts {
            action: action.to_string(),
            market_type: req.market_type.clone(),
            instance_type: req.instance_type.clone().unwrap_or_default(),
            // No instance-type catalog is modeled (`spec.md` §1 excludes real
            // sizing/billing), so vcpu/memory-keyed profile rules are parsed
            // but never match; only type/glob and market rules apply.
            vcpu: None,
            memory_mib: None,
        }
    }

    /// Arms (or re-arms) the reclaim timer for a spot instance, recording
    /// the cancellation handle under `spot_reclaim_cancels`, and arms the
    /// IMDS warning timer under `spot_warn_cancels` the same way so that
    /// cancelling the reclaim also cancels the warning rather than leaving
    /// it to fire later against whatever state the instance is in by then.
    /// Must be called with `inner` already locked.
    async fn arm_reclaim_locked(&self, inner: &mut Inner, instance_id: &str, timing: SpotTiming) {
        let id = match inner.spot_reclaim_cancels.get(instance_id) {
            Some(existing) => *existing,
            None => TimerId(0),
        };
        let timer_id = if id.0 == 0 {
            self.reclaim_wheel.schedule(timing.reclaim_after).await
        } else {
            self.reclaim_wheel.arm(id, timing.reclaim_after).await;
            id
        };
        inner.spot_reclaim_cancels.insert(instance_id.to_string(), timer_id);
        RECLAIM_REGISTRY.register(timer_id, instance_id.to_string());

        let warn_delay = spot::warn_delay(timing.reclaim_after, timing.reclaim_notice);
        let reclaim_at =
            (chrono::Utc::now() + chrono::Duration::from_std(timing.reclaim_after).unwrap_or_default())
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

        let warn_id = match inner.spot_warn_cancels.get(instance_id) {
            Some(existing) => *existing,
            None => TimerId(0),
        };
        let warn_timer_id = if warn_id.0 == 0 {
            self.warn_wheel.schedule(warn_delay).await
        } else {
            self.warn_wheel.arm(warn_id, warn_delay).await;
            warn_id
        };
        inner.spot_warn_cancels.insert(instance_id.to_string(), warn_timer_id);
        WARN_REGISTRY.register(warn_timer_id, (instance_id.to_string(), reclaim_at));
    }

    /// Cancels a spot instance's reclaim timer and its paired IMDS warning
    /// timer, if any (called on stop or user termination so a later
    /// simulated reclaim, or a stale warning, never races a state the user
    /// already changed).
    async fn cancel_reclaim_locked(&self, inner: &mut Inner, instance_id: &str) {
        if let Some(id) = inner.spot_reclaim_cancels.remove(instance_id) {
            self.reclaim_wheel.cancel(id).await;
        }
        if let Some(id) = inner.spot_warn_cancels.remove(instance_id) {
            self.warn_wheel.cancel(id).await;
        }
    }

    async fn arm_reap_locked(&self, inner: &mut Inner, instance_id: &str) {
        let timer_id = self.reap_wheel.schedule(REAP_DELAY).await;
        inner.reap_timers.insert(instance_id.to_string(), timer_id);
        REAP_REGISTRY.register(timer_id, instance_id.to_string());
    }

    // ---- EC2: instances -------------------------------------------------

    pub async fn run_instances(&self, req: &RunInstancesRequest) -> EngineResult<ReservationView> {
        let facts = Self::request_facts("RunInstances", req);
        self.apply_delay(&facts, Hook::Allocate, When::Before).await;
        let timing = self.reclaim_timing(&facts);

        let outcome = {
            let _inner = self.inner.lock().await;
            instances::run_instances(&self.run_ctx(), req).await?
        };

        self.apply_delay(&facts, Hook::Allocate, When::After).await;
        self.apply_delay(&facts, Hook::Start, When::Before).await;

        if !outcome.spot_instances.is_empty() {
            let mut inner = self.inner.lock().await;
            for (instance_id, _spot_request_id) in &outcome.spot_instances {
                self.arm_reclaim_locked(&mut inner, instance_id, timing).await;
            }
        }

        self.apply_delay(&facts, Hook::Start, When::After).await;

        Ok(outcome.reservation)
    }

    pub async fn describe_instances(&self, req: &DescribeInstancesRequest) -> EngineResult<Page<InstanceView>> {
        self.reconcile_dead_asg_members().await;
        let _inner = self.inner.lock().await;
        instances::describe_instances(&self.store, req)
    }

    /// `spec.md` §4.3: `DescribeInstances` reconciles any ASG whose
    /// container went missing out-of-band before answering, rather than
    /// waiting for that group's next periodic controller tick.
    async fn reconcile_dead_asg_members(&self) {
        use crate::attrs::{InstanceAttrs, InstanceState};
        use dc2_executor::ContainerStatus;
        use dc2_store::ResourceKind;
        use std::collections::BTreeSet;

        let dead_groups: BTreeSet<String> = {
            let _inner = self.inner.lock().await;
            let mut groups = BTreeSet::new();
            for id in self.store.registered_resources(ResourceKind::Instance) {
                let Ok(attrs) = InstanceAttrs::load(&self.store, &id) else { continue };
                let Some(asg_name) = &attrs.asg_name else { continue };
                if attrs.state == InstanceState::Terminated {
                    continue;
                }
                let rt_id = runtime_id(&id);
                let status = self.executor.status(rt_id).await.unwrap_or(ContainerStatus::Removed);
                if matches!(status, ContainerStatus::Exited | ContainerStatus::Removed | ContainerStatus::Unhealthy) {
                    groups.insert(asg_name.clone());
                }
            }
            groups
        };
        for asg_name in dead_groups {
            self.reconcile_now(&asg_name).await;
        }
    }

    pub async fn describe_instance_status(
        &self,
        req: &DescribeInstanceStatusRequest,
    ) -> EngineResult<Page<InstanceStatusView>> {
        let _inner = self.inner.lock().await;
        instances::describe_instance_status(&self.store, req)
    }

    pub async fn start_instances(&self, req: &InstanceIdsRequest) -> EngineResult<()> {
        if req.dry_run {
            return Err(EngineError::DryRun);
        }
        let mut inner = self.inner.lock().await;
        let restarted =
            instances::start_instances(&self.store, self.executor.as_ref(), self.imds.as_ref(), &req.instance_ids)
                .await?;
        for id in restarted {
            let facts = RequestFacts { action: "StartInstances".to_string(), ..Default::default() };
            let timing = self.reclaim_timing(&facts);
            self.arm_reclaim_locked(&mut inner, &id, timing).await;
        }
        Ok(())
    }

    pub async fn stop_instances(&self, req: &InstanceIdsRequest) -> EngineResult<()> {
        if req.dry_run {
            return Err(EngineError::DryRun);
        }
        let mut inner = self.inner.lock().await;
        let stopped =
            instances::stop_instances(&self.store, self.executor.as_ref(), self.imds.as_ref(), &req.instance_ids)
                .await?;
        for id in stopped {
            self.cancel_reclaim_locked(&mut inner, &id).await;
        }
        Ok(())
    }

    pub async fn reboot_instances(&self, req: &InstanceIdsRequest) -> EngineResult<()> {
        if req.dry_run {
            return Err(EngineError::DryRun);
        }
        let _inner = self.inner.lock().await;
        instances::reboot_instances(&self.store, self.executor.as_ref(), &req.instance_ids).await
    }

    pub async fn terminate_instances(&self, req: &InstanceIdsRequest) -> EngineResult<()> {
        if req.dry_run {
            return Err(EngineError::DryRun);
        }
        let mut inner = self.inner.lock().await;
        let terminated =
            instances::terminate_instances(&self.store, self.executor.as_ref(), self.imds.as_ref(), &req.instance_ids)
                .await?;
        for id in &terminated {
            self.cancel_reclaim_locked(&mut inner, id).await;
            self.arm_reap_locked(&mut inner, id).await;
        }
        Ok(())
    }

    pub async fn modify_instance_metadata_options(
        &self,
        req: &ModifyInstanceMetadataOptionsRequest,
    ) -> EngineResult<()> {
        let _inner = self.inner.lock().await;
        instances::modify_instance_metadata_options(&self.store, self.imds.as_ref(), req).await?;
        Ok(())
    }

    pub async fn describe_instance_attribute(&self, req: &DescribeInstanceAttributeRequest) -> EngineResult<String> {
        let _inner = self.inner.lock().await;
        instances::describe_instance_attribute(&self.store, req)
    }

    pub async fn modify_instance_attribute(&self, req: &ModifyInstanceAttributeRequest) -> EngineResult<()> {
        let _inner = self.inner.lock().await;
        instances::modify_instance_attribute(&self.store, req)
    }

    // ---- EC2: tags --------------------------------------------------------

    pub async fn create_tags(&self, req: &CreateTagsRequest) -> EngineResult<()> {
        let _inner = self.inner.lock().await;
        tags::create_tags(&self.store, req)
    }

    pub async fn delete_tags(&self, req: &CreateTagsRequest) -> EngineResult<()> {
        let _inner = self.inner.lock().await;
        tags::delete_tags(&self.store, req)
    }

    // ---- EC2: volumes -------------------------------------------------

    pub async fn create_volume(&self, req: &CreateVolumeRequest) -> EngineResult<VolumeView> {
        let _inner = self.inner.lock().await;
        volumes::create_volume(&self.store, self.ids.as_ref(), req)
    }

    pub async fn attach_volume(&self, req: &AttachVolumeRequest) -> EngineResult<dc2_wire::responses::AttachmentView> {
        let _inner = self.inner.lock().await;
        volumes::do_attach_volume(&self.store, req)
    }

    pub async fn detach_volume(&self, req: &DetachVolumeRequest) -> EngineResult<dc2_wire::responses::AttachmentView> {
        let _inner = self.inner.lock().await;
        volumes::do_detach_volume(&self.store, req)
    }

    pub async fn delete_volume(&self, req: &DeleteVolumeRequest) -> EngineResult<()> {
        let _inner = self.inner.lock().await;
        volumes::delete_volume(&self.store, req)
    }

    pub async fn modify_volume_attribute(&self, req: &ModifyVolumeAttributeRequest) -> EngineResult<()> {
        let _inner = self.inner.lock().await;
        volumes::modify_volume_attribute(&self.store, req)
    }

    pub async fn describe_volumes(&self, req: &DescribeVolumesRequest) -> EngineResult<Page<VolumeView>> {
        let _inner = self.inner.lock().await;
        volumes::describe_volumes(&self.store, req)
    }

    // ---- EC2: launch templates -----------------------------------------

    pub async fn create_launch_template(&self, req: &CreateLaunchTemplateRequest) -> EngineResult<LaunchTemplateView> {
        let _inner = self.inner.lock().await;
        launch_templates::create_launch_template(&self.store, self.ids.as_ref(), req)
    }

    pub async fn create_launch_template_version(
        &self,
        req: &CreateLaunchTemplateVersionRequest,
    ) -> EngineResult<LaunchTemplateVersionView> {
        let _inner = self.inner.lock().await;
        launch_templates::create_launch_template_version(&self.store, req)
    }

    pub async fn describe_launch_templates(
        &self,
        req: &DescribeLaunchTemplatesRequest,
    ) -> EngineResult<Vec<LaunchTemplateView>> {
        let _inner = self.inner.lock().await;
        launch_templates::describe_launch_templates(&self.store, req)
    }

    pub async fn describe_launch_template_versions(
        &self,
        req: &DescribeLaunchTemplateVersionsRequest,
    ) -> EngineResult<Vec<LaunchTemplateVersionView>> {
        let _inner = self.inner.lock().await;
        launch_templates::describe_launch_template_versions(&self.store, req)
    }

    pub async fn delete_launch_template(&self, req: &DeleteLaunchTemplateRequest) -> EngineResult<LaunchTemplateView> {
        let _inner = self.inner.lock().await;
        launch_templates::delete_launch_template(&self.store, req)
    }

    pub async fn delete_launch_template_versions(
        &self,
        req: &DeleteLaunchTemplateVersionsRequest,
    ) -> EngineResult<Vec<i64>> {
        let _inner = self.inner.lock().await;
        launch_templates::delete_launch_template_versions(&self.store, req)
    }

    // ---- EC2: spot ------------------------------------------------------

    pub async fn describe_spot_instance_requests(
        &self,
        req: &DescribeSpotInstanceRequestsRequest,
    ) -> EngineResult<Page<SpotInstanceRequestView>> {
        let _inner = self.inner.lock().await;
        spot::describe_spot_instance_requests(&self.store, req)
    }

    pub async fn cancel_spot_instance_requests(
        &self,
        req: &CancelSpotInstanceRequestsRequest,
    ) -> EngineResult<Vec<(String, String)>> {
        let _inner = self.inner.lock().await;
        spot::cancel_spot_instance_requests(&self.store, req)
    }

    pub async fn describe_spot_price_history(&self, req: &DescribeSpotPriceHistoryRequest) -> Vec<SpotPriceView> {
        let _inner = self.inner.lock().await;
        spot::describe_spot_price_history(req)
    }

    // ---- AutoScaling ----------------------------------------------------

    pub async fn create_auto_scaling_group(
        &self,
        req: &CreateAutoScalingGroupRequest,
    ) -> EngineResult<AutoScalingGroupView> {
        let view = {
            let _inner = self.inner.lock().await;
            autoscaling::create_auto_scaling_group(&self.store, req)?
        };
        self.ensure_controller(req.auto_scaling_group_name.clone()).await;
        self.reconcile_now(&req.auto_scaling_group_name).await;
        Ok(view)
    }

    pub async fn update_auto_scaling_group(&self, req: &UpdateAutoScalingGroupRequest) -> EngineResult<()> {
        {
            let _inner = self.inner.lock().await;
            autoscaling::update_auto_scaling_group(&self.store, req)?;
        }
        self.reconcile_now(&req.auto_scaling_group_name).await;
        Ok(())
    }

    pub async fn delete_auto_scaling_group(&self, req: &DeleteAutoScalingGroupRequest) -> EngineResult<()> {
        {
            let _inner = self.inner.lock().await;
            autoscaling::delete_auto_scaling_group(&self.store, req)?;
        }
        self.reconcile_now(&req.auto_scaling_group_name).await;
        self.stop_controller(&req.auto_scaling_group_name).await;
        Ok(())
    }

    pub async fn describe_auto_scaling_groups(
        &self,
        req: &DescribeAutoScalingGroupsRequest,
    ) -> EngineResult<Page<AutoScalingGroupView>> {
        let _inner = self.inner.lock().await;
        autoscaling::describe_auto_scaling_groups(&self.store, req)
    }

    pub async fn set_desired_capacity(&self, req: &SetDesiredCapacityRequest) -> EngineResult<()> {
        {
            let _inner = self.inner.lock().await;
            autoscaling::set_desired_capacity(&self.store, req)?;
        }
        self.reconcile_now(&req.auto_scaling_group_name).await;
        Ok(())
    }

    pub async fn detach_instances(&self, req: &DetachInstancesRequest) -> EngineResult<()> {
        {
            let _inner = self.inner.lock().await;
            autoscaling::detach_instances(&self.store, req)?;
        }
        self.reconcile_now(&req.auto_scaling_group_name).await;
        Ok(())
    }

    pub async fn put_warm_pool(&self, req: &PutWarmPoolRequest) -> EngineResult<()> {
        {
            let _inner = self.inner.lock().await;
            autoscaling::put_warm_pool(&self.store, req)?;
        }
        self.reconcile_now(&req.auto_scaling_group_name).await;
        Ok(())
    }

    pub async fn delete_warm_pool(&self, req: &DeleteWarmPoolRequest) -> EngineResult<()> {
        {
            let _inner = self.inner.lock().await;
            autoscaling::delete_warm_pool(&self.store, req)?;
        }
        self.reconcile_now(&req.auto_scaling_group_name).await;
        Ok(())
    }

    pub async fn describe_warm_pool(&self, req: &DescribeWarmPoolRequest) -> EngineResult<WarmPoolView> {
        let _inner = self.inner.lock().await;
        autoscaling::describe_warm_pool(&self.store, req)
    }

    /// Runs one reconciliation pass for `asg_name` under the dispatcher
    /// lock. Errors are logged and swallowed (`spec.md` §7: controllers log
    /// and skip on error, they never crash the process).
    async fn reconcile_now(&self, asg_name: &str) {
        let _inner = self.inner.lock().await;
        if let Err(err) = autoscaling::reconcile(&self.asg_ctx(), asg_name).await {
            warn!(asg_name, error = %err, "auto scaling group reconciliation failed");
        }
    }

    /// Starts the per-group controller task if one isn't already running,
    /// ticking `reconcile` every `ASG_TICK_INTERVAL` until cancelled.
    async fn ensure_controller(&self, asg_name: String) {
        let mut inner = self.inner.lock().await;
        if inner.asg_controllers.contains_key(&asg_name) {
            return;
        }
        let cancel = CancellationToken::new();
        let dispatcher = self.clone();
        let task_cancel = cancel.clone();
        let task_name = asg_name.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(ASG_TICK_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => return,
                    _ = interval.tick() => {
                        metrics::counter!("dc2_controller_ticks_total", "group" => task_name.clone()).increment(1);
                        dispatcher.reconcile_now(&task_name).await;
                    }
                }
            }
        });
        inner.asg_controllers.insert(asg_name, ControllerHandle { task, cancel });
    }

    async fn stop_controller(&self, asg_name: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(handle) = inner.asg_controllers.remove(asg_name) {
            handle.cancel.cancel();
            handle.task.abort();
        }
    }

    /// Cancels every controller and reclaim/reap timer and waits up to
    /// `grace` for the cancellation to settle (`spec.md` §5: server
    /// shutdown cancels controllers and reclaim timers; outstanding reap
    /// timers are discarded).
    pub async fn shutdown(&self, grace: Duration) {
        self.shutdown.cancel();
        let mut inner = self.inner.lock().await;
        for (_, handle) in inner.asg_controllers.drain() {
            handle.cancel.cancel();
            handle.task.abort();
        }
        let pending: Vec<_> = inner.spot_reclaim_cancels.drain().collect();
        let warn_pending: Vec<_> = inner.spot_warn_cancels.drain().collect();
        let reap_pending: Vec<_> = inner.reap_timers.drain().collect();
        drop(inner);
        for (_, id) in pending {
            self.reclaim_wheel.cancel(id).await;
        }
        for (_, id) in warn_pending {
            self.warn_wheel.cancel(id).await;
        }
        for (_, id) in reap_pending {
            self.reap_wheel.cancel(id).await;
        }
        tokio::time::sleep(grace).await;
        info!("dispatcher shutdown complete");
    }

    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

/// Maps a reap `TimerId` back to the instance id it was armed for. The
/// timer wheel only ever hands its callback a bare id, so the dispatcher
/// keeps this side table to resolve it; entries are removed as soon as
/// they fire (or when the instance is reaped some other way).
struct ReapRegistry {
    ids: std::sync::RwLock<HashMap<u64, String>>,
}

impl ReapRegistry {
    fn register(&self, id: TimerId, instance_id: String) {
        self.ids.write().unwrap().insert(id.0, instance_id);
    }

    fn take(&self, id: TimerId) -> Option<String> {
        self.ids.write().unwrap().remove(&id.0)
    }
}

static REAP_REGISTRY: std::sync::LazyLock<ReapRegistry> =
    std::sync::LazyLock::new(|| ReapRegistry { ids: std::sync::RwLock::new(HashMap::new()) });

/// Maps a spot reclaim `TimerId` back to its instance id, mirroring
/// `ReapRegistry`. Kept separate so the two timer wheels (reclaim vs reap)
/// never collide on id namespace even though each starts counting at 1.
struct ReclaimRegistry {
    ids: std::sync::RwLock<HashMap<u64, String>>,
}

impl ReclaimRegistry {
    fn register(&self, id: TimerId, instance_id: String) {
        self.ids.write().unwrap().insert(id.0, instance_id);
    }

    fn take(&self, id: TimerId) -> Option<String> {
        self.ids.write().unwrap().remove(&id.0)
    }
}

static RECLAIM_REGISTRY: std::sync::LazyLock<ReclaimRegistry> =
    std::sync::LazyLock::new(|| ReclaimRegistry { ids: std::sync::RwLock::new(HashMap::new()) });

/// Maps an IMDS-warning `TimerId` back to the instance id and the reclaim
/// timestamp it should report, mirroring `ReclaimRegistry`. A separate
/// wheel/registry pair from the reclaim timer so cancelling one cancels
/// the other explicitly rather than relying on them sharing a deadline.
struct WarnRegistry {
    entries: std::sync::RwLock<HashMap<u64, (String, String)>>,
}

impl WarnRegistry {
    fn register(&self, id: TimerId, entry: (String, String)) {
        self.entries.write().unwrap().insert(id.0, entry);
    }

    fn take(&self, id: TimerId) -> Option<(String, String)> {
        self.entries.write().unwrap().remove(&id.0)
    }
}

static WARN_REGISTRY: std::sync::LazyLock<WarnRegistry> =
    std::sync::LazyLock::new(|| WarnRegistry { entries: std::sync::RwLock::new(HashMap::new()) });

async fn fire_spot_reclaim(
    store: ResourceStore,
    executor: Arc<dyn ContainerExecutor>,
    imds: Arc<dyn ImdsProxy>,
    id: TimerId,
) {
    let Some(instance_id) = RECLAIM_REGISTRY.take(id) else { return };
    if let Err(err) = apply_spot_reclaim(&store, executor.as_ref(), imds.as_ref(), &instance_id).await {
        warn!(instance_id, error = %err, "spot reclaim failed");
    }
}

/// Transitions a spot instance into its reclaimed state: terminates it if
/// its spot request's `InterruptionBehavior` is `terminate` (the default),
/// or merely stops the container otherwise, closes the spot request as
/// `instance-terminated-no-capacity` either way, and clears the IMDS
/// interruption notice (`spec.md` §4.6/§8 scenario 3).
async fn apply_spot_reclaim(
    store: &ResourceStore,
    executor: &dyn ContainerExecutor,
    imds: &dyn ImdsProxy,
    instance_id: &str,
) -> EngineResult<()> {
    use crate::attrs::{InstanceAttrs, InstanceState, SpotRequestAttrs};
    use crate::time::now_gmt_display;

    let mut attrs = InstanceAttrs::load(store, instance_id)?;
    if attrs.state == InstanceState::Terminated {
        return Ok(());
    }
    let behavior = match &attrs.spot_instance_request_id {
        Some(sir_id) => SpotRequestAttrs::load(store, sir_id)
            .map(|sr| sr.interruption_behavior)
            .unwrap_or_else(|_| spot::DEFAULT_INTERRUPTION_BEHAVIOR.to_string()),
        None => spot::DEFAULT_INTERRUPTION_BEHAVIOR.to_string(),
    };

    let rt_id = runtime_id(instance_id).to_string();
    let _ = executor.stop(&rt_id).await;

    if behavior == "stop" || behavior == "hibernate" {
        attrs.state = InstanceState::Stopped;
        attrs.state_transition_reason = format!("Server.SpotInstanceInterruption:{behavior} ({})", now_gmt_display());
        attrs.save(store, instance_id)?;
    } else {
        attrs.state = InstanceState::Terminated;
        attrs.state_reason_code = Some("Server.SpotInstanceTermination".to_string());
        attrs.state_reason_message =
            Some("Server.SpotInstanceTermination: instance reclaimed by the spot market".to_string());
        attrs.state_transition_reason = format!("Server.SpotInstanceTermination ({})", now_gmt_display());
        attrs.save(store, instance_id)?;
        let _ = executor.remove(&rt_id).await;
    }

    if let Some(sir_id) = &attrs.spot_instance_request_id {
        let _ = spot::close_spot_request(store, sir_id, "instance-terminated-no-capacity");
    }
    imds.clear_spot_action(instance_id).await;
    Ok(())
}

async fn fire_reap(store: ResourceStore, id: TimerId) {
    let Some(instance_id) = REAP_REGISTRY.take(id) else { return };
    instances::reap_instance(&store, &instance_id);
}

/// Tells the IMDS proxy a spot instance's reclaim is imminent (`spec.md`
/// §4.6 step 3). Runs on its own wheel so `cancel_reclaim_locked` can cancel
/// it precisely instead of leaving an orphaned `tokio::spawn` sleep that
/// would re-set the IMDS spot action after the instance was already
/// stopped/terminated and its action cleared.
async fn fire_spot_warn(imds: Arc<dyn ImdsProxy>, id: TimerId) {
    let Some((instance_id, reclaim_at)) = WARN_REGISTRY.take(id) else { return };
    imds.set_spot_action(&instance_id, instances::spot_action_for("terminate", &reclaim_at)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::{InstanceAttrs, InstanceState};
    use dc2_executor::InMemoryExecutor;
    use dc2_ids::{runtime_id, IdAllocator, SequentialRng};
    use dc2_imds::InMemoryImdsProxy;
    use dc2_wire::requests::RunInstancesRequest;

    async fn spot_instance(store: &ResourceStore, interruption_behavior: Option<&str>) -> (String, InMemoryExecutor, InMemoryImdsProxy) {
        let ids = IdAllocator::new(SequentialRng::new(1));
        let executor = InMemoryExecutor::new();
        let imds = InMemoryImdsProxy::new();
        let ctx = RunInstancesCtx {
            store,
            ids: &ids,
            executor: &executor,
            imds: &imds,
            region: "us-east-1",
            owner_id: "000000000000",
        };
        let req = RunInstancesRequest {
            image_id: Some("ami-1".to_string()),
            instance_type: Some("t3.micro".to_string()),
            min_count: 1,
            max_count: 1,
            key_name: None,
            user_data: None,
            availability_zone: None,
            tag_specifications: vec![],
            market_type: Some("spot".to_string()),
            spot_max_price: None,
            spot_interruption_behavior: interruption_behavior.map(str::to_string),
            launch_template: None,
            block_device_mappings: vec![],
            dry_run: false,
        };
        let outcome = instances::run_instances(&ctx, &req).await.unwrap();
        let instance_id = outcome.reservation.instances[0].instance_id.clone();
        (instance_id, executor, imds)
    }

    #[tokio::test]
    async fn reclaim_terminates_instance_by_default() {
        let store = ResourceStore::new();
        let (instance_id, executor, imds) = spot_instance(&store, None).await;

        apply_spot_reclaim(&store, &executor, &imds, &instance_id).await.unwrap();

        let attrs = InstanceAttrs::load(&store, &instance_id).unwrap();
        assert_eq!(attrs.state, InstanceState::Terminated);
        assert_eq!(attrs.state_reason_code.as_deref(), Some("Server.SpotInstanceTermination"));
        let rt_id = runtime_id(&instance_id);
        assert_eq!(executor.status(rt_id).await.unwrap(), dc2_executor::ContainerStatus::Removed);

        let sir_id = attrs.spot_instance_request_id.unwrap();
        let sir = crate::attrs::SpotRequestAttrs::load(&store, &sir_id).unwrap();
        assert_eq!(sir.state, "closed");
        assert_eq!(sir.status_code, "instance-terminated-no-capacity");
    }

    #[tokio::test]
    async fn reclaim_stops_instead_of_terminating_when_behavior_is_stop() {
        let store = ResourceStore::new();
        let (instance_id, executor, imds) = spot_instance(&store, Some("stop")).await;

        apply_spot_reclaim(&store, &executor, &imds, &instance_id).await.unwrap();

        let attrs = InstanceAttrs::load(&store, &instance_id).unwrap();
        assert_eq!(attrs.state, InstanceState::Stopped);
        assert!(attrs.state_transition_reason.starts_with("Server.SpotInstanceInterruption:stop"));
        let rt_id = runtime_id(&instance_id);
        assert_eq!(executor.status(rt_id).await.unwrap(), dc2_executor::ContainerStatus::Exited);

        let sir_id = attrs.spot_instance_request_id.unwrap();
        let sir = crate::attrs::SpotRequestAttrs::load(&store, &sir_id).unwrap();
        assert_eq!(sir.state, "closed");
        assert_eq!(sir.status_code, "instance-terminated-no-capacity");
    }

    #[tokio::test]
    async fn describe_instances_reconciles_asg_member_removed_out_of_band() {
        use dc2_profile::ProfileEngine;
        use dc2_wire::requests::{
            CreateAutoScalingGroupRequest, CreateLaunchTemplateRequest, DescribeInstancesRequest, LaunchTemplateSpec,
        };
        use std::sync::Arc;

        let store = ResourceStore::new();
        let ids = IdAllocator::new(SequentialRng::new(1));
        let lt = crate::launch_templates::create_launch_template(
            &store,
            &ids,
            &CreateLaunchTemplateRequest {
                launch_template_name: "web".to_string(),
                image_id: Some("ami-1".to_string()),
                instance_type: Some("t3.micro".to_string()),
                key_name: None,
                user_data: None,
            },
        )
        .unwrap();

        let executor = Arc::new(InMemoryExecutor::new());
        let imds: Arc<dyn dc2_imds::ImdsProxy> = Arc::new(InMemoryImdsProxy::new());
        let dispatcher = Dispatcher::new(
            store,
            ids,
            executor.clone() as Arc<dyn ContainerExecutor>,
            imds,
            Arc::new(ProfileEngine::empty()),
            "us-east-1".to_string(),
            "000000000000".to_string(),
            SpotTiming { reclaim_after: Duration::from_secs(120), reclaim_notice: Duration::from_secs(120) },
        );

        dispatcher
            .create_auto_scaling_group(&CreateAutoScalingGroupRequest {
                auto_scaling_group_name: "web-asg".to_string(),
                min_size: 1,
                max_size: 1,
                desired_capacity: Some(1),
                launch_template: LaunchTemplateSpec { id: Some(lt.launch_template_id), name: None, version: None },
                vpc_zone_identifier: None,
                tags: vec![],
            })
            .await
            .unwrap();

        let before = dispatcher
            .describe_instances(&DescribeInstancesRequest::default())
            .await
            .unwrap();
        assert_eq!(before.items.len(), 1);
        let dead_id = before.items[0].instance_id.clone();
        executor.simulate_removed(runtime_id(&dead_id));

        let after = dispatcher
            .describe_instances(&DescribeInstancesRequest::default())
            .await
            .unwrap();
        assert_eq!(after.items.len(), 1);
        assert_ne!(after.items[0].instance_id, dead_id);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_spot_instance_cancels_pending_imds_warning() {
        use async_trait::async_trait;
        use dc2_imds::{InstanceIdentity, SpotAction};
        use dc2_profile::ProfileEngine;
        use dc2_wire::requests::RunInstancesRequest;
        use std::sync::Mutex as StdMutex;

        #[derive(Default)]
        struct RecordingImdsProxy {
            warnings: StdMutex<Vec<String>>,
        }

        #[async_trait]
        impl ImdsProxy for RecordingImdsProxy {
            async fn register_instance(&self, _identity: InstanceIdentity) {}
            async fn deregister_instance(&self, _instance_id: &str) {}
            async fn set_metadata_enabled(&self, _instance_id: &str, _enabled: bool) {}
            async fn set_spot_action(&self, instance_id: &str, _action: SpotAction) {
                self.warnings.lock().unwrap().push(instance_id.to_string());
            }
            async fn clear_spot_action(&self, _instance_id: &str) {}
        }

        let store = ResourceStore::new();
        let ids = IdAllocator::new(SequentialRng::new(1));
        let executor = Arc::new(InMemoryExecutor::new());
        let imds = Arc::new(RecordingImdsProxy::default());
        let dispatcher = Dispatcher::new(
            store,
            ids,
            executor as Arc<dyn ContainerExecutor>,
            imds.clone() as Arc<dyn dc2_imds::ImdsProxy>,
            Arc::new(ProfileEngine::empty()),
            "us-east-1".to_string(),
            "000000000000".to_string(),
            SpotTiming { reclaim_after: Duration::from_secs(60), reclaim_notice: Duration::from_secs(10) },
        );

        let reservation = dispatcher
            .run_instances(&RunInstancesRequest {
                image_id: Some("ami-1".to_string()),
                instance_type: Some("t3.micro".to_string()),
                min_count: 1,
                max_count: 1,
                key_name: None,
                user_data: None,
                availability_zone: None,
                tag_specifications: vec![],
                market_type: Some("spot".to_string()),
                spot_max_price: None,
                spot_interruption_behavior: None,
                launch_template: None,
                block_device_mappings: vec![],
                dry_run: false,
            })
            .await
            .unwrap();
        let instance_id = reservation.instances[0].instance_id.clone();

        dispatcher
            .stop_instances(&dc2_wire::requests::InstanceIdsRequest { instance_ids: vec![instance_id], dry_run: false })
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;

        assert!(imds.warnings.lock().unwrap().is_empty(), "stop must cancel the pending IMDS warning timer");
    }
}
