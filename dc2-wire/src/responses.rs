//! Typed response value structs and their XML encoders (`spec.md` §6).
//! `dc2-engine` builds these from its own domain state; `dc2-server` wraps
//! the encoded body in `xml::render_response`/`render_error`.

use crate::xml::XmlBuilder;

#[derive(Debug, Clone, Default)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

fn encode_tag_set(b: &mut XmlBuilder, tags: &[Tag]) {
    b.open("tagSet");
    for tag in tags {
        b.open("item");
        b.text_elem("key", &tag.key);
        b.text_elem("value", &tag.value);
        b.close("item");
    }
    b.close("tagSet");
}

#[derive(Debug, Clone, Default)]
pub struct InstanceView {
    pub instance_id: String,
    pub image_id: String,
    pub instance_type: String,
    pub key_name: Option<String>,
    pub launch_time: String,
    pub state_code: u32,
    pub state_name: String,
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
    pub instance_lifecycle: Option<String>,
    pub spot_instance_request_id: Option<String>,
    pub state_transition_reason: String,
    pub state_reason_code: Option<String>,
    pub state_reason_message: Option<String>,
    pub tags: Vec<Tag>,
}

pub fn encode_instance(b: &mut XmlBuilder, i: &InstanceView) {
    b.open("item");
    b.text_elem("instanceId", &i.instance_id);
    b.text_elem("imageId", &i.image_id);
    b.open("instanceState");
    b.text_elem("code", i.state_code);
    b.text_elem("name", &i.state_name);
    b.close("instanceState");
    b.text_elem("privateDnsName", &i.private_dns_name);
    b.text_elem_opt("dnsName", i.public_dns_name.as_deref());
    b.text_elem("reason", &i.state_transition_reason);
    b.text_elem_opt("keyName", i.key_name.as_deref());
    b.text_elem("instanceType", &i.instance_type);
    b.text_elem("launchTime", &i.launch_time);
    b.open("placement");
    b.text_elem("availabilityZone", &i.availability_zone);
    b.text_elem("tenancy", &i.tenancy);
    b.close("placement");
    b.text_elem("architecture", &i.architecture);
    b.text_elem("privateIpAddress", &i.private_ip_address);
    b.text_elem_opt("ipAddress", i.public_ip_address.as_deref());
    b.open("monitoring");
    b.text_elem("state", &i.monitoring_state);
    b.close("monitoring");
    b.text_elem("networkInterfaceId", &i.network_interface_id);
    b.text_elem("macAddress", &i.mac_address);
    b.text_elem_opt("instanceLifecycle", i.instance_lifecycle.as_deref());
    b.text_elem_opt("spotInstanceRequestId", i.spot_instance_request_id.as_deref());
    if i.state_reason_code.is_some() {
        b.open("stateReason");
        b.text_elem_opt("code", i.state_reason_code.as_deref());
        b.text_elem_opt("message", i.state_reason_message.as_deref());
        b.close("stateReason");
    }
    encode_tag_set(b, &i.tags);
    b.close("item");
}

#[derive(Debug, Clone, Default)]
pub struct ReservationView {
    pub reservation_id: String,
    pub owner_id: String,
    pub instances: Vec<InstanceView>,
}

pub fn encode_run_instances(r: &ReservationView) -> String {
    let mut b = XmlBuilder::new();
    b.text_elem("reservationId", &r.reservation_id);
    b.text_elem("ownerId", &r.owner_id);
    b.open("instancesSet");
    for i in &r.instances {
        encode_instance(&mut b, i);
    }
    b.close("instancesSet");
    b.finish()
}

pub fn encode_describe_instances(reservations: &[ReservationView]) -> String {
    let mut b = XmlBuilder::new();
    b.open("reservationSet");
    for r in reservations {
        b.open("item");
        b.text_elem("reservationId", &r.reservation_id);
        b.text_elem("ownerId", &r.owner_id);
        b.open("instancesSet");
        for i in &r.instances {
            encode_instance(&mut b, i);
        }
        b.close("instancesSet");
        b.close("item");
    }
    b.close("reservationSet");
    b.finish()
}

#[derive(Debug, Clone, Default)]
pub struct InstanceStatusView {
    pub instance_id: String,
    pub availability_zone: String,
    pub state_code: u32,
    pub state_name: String,
    pub instance_status: &'static str,
    pub system_status: &'static str,
}

pub fn encode_describe_instance_status(statuses: &[InstanceStatusView], next_token: Option<&str>) -> String {
    let mut b = XmlBuilder::new();
    b.open("instanceStatusSet");
    for s in statuses {
        b.open("item");
        b.text_elem("instanceId", &s.instance_id);
        b.text_elem("availabilityZone", &s.availability_zone);
        b.open("instanceState");
        b.text_elem("code", s.state_code);
        b.text_elem("name", &s.state_name);
        b.close("instanceState");
        b.open("instanceStatus");
        b.text_elem("status", s.instance_status);
        b.close("instanceStatus");
        b.open("systemStatus");
        b.text_elem("status", s.system_status);
        b.close("systemStatus");
        b.close("item");
    }
    b.close("instanceStatusSet");
    b.text_elem_opt("nextToken", next_token);
    b.finish()
}

#[derive(Debug, Clone, Default)]
pub struct AttachmentView {
    pub volume_id: String,
    pub instance_id: String,
    pub device: String,
    pub state: String,
    pub attach_time: String,
    pub delete_on_termination: bool,
}

fn encode_attachment(b: &mut XmlBuilder, a: &AttachmentView) {
    b.open("item");
    b.text_elem("volumeId", &a.volume_id);
    b.text_elem("instanceId", &a.instance_id);
    b.text_elem("device", &a.device);
    b.text_elem("status", &a.state);
    b.text_elem("attachTime", &a.attach_time);
    b.text_elem("deleteOnTermination", a.delete_on_termination);
    b.close("item");
}

#[derive(Debug, Clone, Default)]
pub struct VolumeView {
    pub volume_id: String,
    pub size_gib: u64,
    pub volume_type: String,
    pub iops: Option<u32>,
    pub throughput: Option<u32>,
    pub availability_zone: String,
    pub state: String,
    pub create_time: String,
    pub encrypted: bool,
    pub kms_key_id: Option<String>,
    pub attachments: Vec<AttachmentView>,
    pub tags: Vec<Tag>,
}

fn encode_volume(b: &mut XmlBuilder, v: &VolumeView) {
    b.open("item");
    b.text_elem("volumeId", &v.volume_id);
    b.text_elem("size", v.size_gib);
    b.text_elem("volumeType", &v.volume_type);
    b.text_elem_opt("iops", v.iops);
    b.text_elem_opt("throughput", v.throughput);
    b.text_elem("availabilityZone", &v.availability_zone);
    b.text_elem("status", &v.state);
    b.text_elem("createTime", &v.create_time);
    b.text_elem("encrypted", v.encrypted);
    b.text_elem_opt("kmsKeyId", v.kms_key_id.as_deref());
    b.open("attachmentSet");
    for a in &v.attachments {
        encode_attachment(b, a);
    }
    b.close("attachmentSet");
    encode_tag_set(b, &v.tags);
    b.close("item");
}

pub fn encode_create_volume(v: &VolumeView) -> String {
    let mut b = XmlBuilder::new();
    encode_volume_fields(&mut b, v);
    b.finish()
}

fn encode_volume_fields(b: &mut XmlBuilder, v: &VolumeView) {
    b.text_elem("volumeId", &v.volume_id);
    b.text_elem("size", v.size_gib);
    b.text_elem("volumeType", &v.volume_type);
    b.text_elem_opt("iops", v.iops);
    b.text_elem_opt("throughput", v.throughput);
    b.text_elem("availabilityZone", &v.availability_zone);
    b.text_elem("status", &v.state);
    b.text_elem("createTime", &v.create_time);
    b.text_elem("encrypted", v.encrypted);
    b.open("attachmentSet");
    for a in &v.attachments {
        encode_attachment(b, a);
    }
    b.close("attachmentSet");
    encode_tag_set(b, &v.tags);
}

pub fn encode_describe_volumes(volumes: &[VolumeView], next_token: Option<&str>) -> String {
    let mut b = XmlBuilder::new();
    b.open("volumeSet");
    for v in volumes {
        encode_volume(&mut b, v);
    }
    b.close("volumeSet");
    b.text_elem_opt("nextToken", next_token);
    b.finish()
}

pub fn encode_attach_volume(a: &AttachmentView) -> String {
    let mut b = XmlBuilder::new();
    b.text_elem("volumeId", &a.volume_id);
    b.text_elem("instanceId", &a.instance_id);
    b.text_elem("device", &a.device);
    b.text_elem("status", &a.state);
    b.text_elem("attachTime", &a.attach_time);
    b.finish()
}

#[derive(Debug, Clone, Default)]
pub struct LaunchTemplateView {
    pub launch_template_id: String,
    pub launch_template_name: String,
    pub create_time: String,
    pub default_version_number: i64,
    pub latest_version_number: i64,
}

pub fn encode_launch_template(lt: &LaunchTemplateView) -> String {
    let mut b = XmlBuilder::new();
    encode_launch_template_fields(&mut b, lt);
    b.finish()
}

fn encode_launch_template_fields(b: &mut XmlBuilder, lt: &LaunchTemplateView) {
    b.text_elem("launchTemplateId", &lt.launch_template_id);
    b.text_elem("launchTemplateName", &lt.launch_template_name);
    b.text_elem("createTime", &lt.create_time);
    b.text_elem("defaultVersionNumber", lt.default_version_number);
    b.text_elem("latestVersionNumber", lt.latest_version_number);
}

pub fn encode_describe_launch_templates(templates: &[LaunchTemplateView], next_token: Option<&str>) -> String {
    let mut b = XmlBuilder::new();
    b.open("launchTemplates");
    for lt in templates {
        b.open("item");
        encode_launch_template_fields(&mut b, lt);
        b.close("item");
    }
    b.close("launchTemplates");
    b.text_elem_opt("nextToken", next_token);
    b.finish()
}

#[derive(Debug, Clone, Default)]
pub struct LaunchTemplateVersionView {
    pub launch_template_id: String,
    pub launch_template_name: String,
    pub version_number: i64,
    pub is_default_version: bool,
    pub create_time: String,
    pub image_id: Option<String>,
    pub instance_type: Option<String>,
    pub key_name: Option<String>,
}

pub fn encode_launch_template_version(v: &LaunchTemplateVersionView) -> String {
    let mut b = XmlBuilder::new();
    encode_launch_template_version_fields(&mut b, v);
    b.finish()
}

fn encode_launch_template_version_fields(b: &mut XmlBuilder, v: &LaunchTemplateVersionView) {
    b.text_elem("launchTemplateId", &v.launch_template_id);
    b.text_elem("launchTemplateName", &v.launch_template_name);
    b.text_elem("versionNumber", v.version_number);
    b.text_elem("defaultVersion", v.is_default_version);
    b.text_elem("createTime", &v.create_time);
    b.open("launchTemplateData");
    b.text_elem_opt("imageId", v.image_id.as_deref());
    b.text_elem_opt("instanceType", v.instance_type.as_deref());
    b.text_elem_opt("keyName", v.key_name.as_deref());
    b.close("launchTemplateData");
}

pub fn encode_describe_launch_template_versions(
    versions: &[LaunchTemplateVersionView],
    next_token: Option<&str>,
) -> String {
    let mut b = XmlBuilder::new();
    b.open("launchTemplateVersionSet");
    for v in versions {
        b.open("item");
        encode_launch_template_version_fields(&mut b, v);
        b.close("item");
    }
    b.close("launchTemplateVersionSet");
    b.text_elem_opt("nextToken", next_token);
    b.finish()
}

#[derive(Debug, Clone, Default)]
pub struct AsgInstanceView {
    pub instance_id: String,
    pub lifecycle_state: String,
    pub health_status: String,
    pub launch_template_id: String,
    pub launch_template_version: String,
    pub protected_from_scale_in: bool,
}

fn encode_asg_instance(b: &mut XmlBuilder, i: &AsgInstanceView) {
    b.open("member");
    b.text_elem("InstanceId", &i.instance_id);
    b.text_elem("LifecycleState", &i.lifecycle_state);
    b.text_elem("HealthStatus", &i.health_status);
    b.open("LaunchTemplate");
    b.text_elem("LaunchTemplateId", &i.launch_template_id);
    b.text_elem("Version", &i.launch_template_version);
    b.close("LaunchTemplate");
    b.text_elem("ProtectedFromScaleIn", i.protected_from_scale_in);
    b.close("member");
}

#[derive(Debug, Clone, Default)]
pub struct AutoScalingGroupView {
    pub auto_scaling_group_name: String,
    pub min_size: u32,
    pub max_size: u32,
    pub desired_capacity: u32,
    pub launch_template_id: String,
    pub launch_template_version: String,
    pub status: Option<String>,
    pub instances: Vec<AsgInstanceView>,
    pub tags: Vec<(String, String, bool)>,
}

fn encode_asg(b: &mut XmlBuilder, g: &AutoScalingGroupView) {
    b.open("member");
    b.text_elem("AutoScalingGroupName", &g.auto_scaling_group_name);
    b.text_elem("MinSize", g.min_size);
    b.text_elem("MaxSize", g.max_size);
    b.text_elem("DesiredCapacity", g.desired_capacity);
    b.open("LaunchTemplate");
    b.text_elem("LaunchTemplateId", &g.launch_template_id);
    b.text_elem("Version", &g.launch_template_version);
    b.close("LaunchTemplate");
    b.text_elem_opt("Status", g.status.as_deref());
    b.open("Instances");
    for i in &g.instances {
        encode_asg_instance(b, i);
    }
    b.close("Instances");
    b.open("Tags");
    for (key, value, propagate) in &g.tags {
        b.open("member");
        b.text_elem("Key", key);
        b.text_elem("Value", value);
        b.text_elem("PropagateAtLaunch", *propagate);
        b.close("member");
    }
    b.close("Tags");
    b.close("member");
}

pub fn encode_describe_auto_scaling_groups(groups: &[AutoScalingGroupView], next_token: Option<&str>) -> String {
    let mut b = XmlBuilder::new();
    b.open("AutoScalingGroups");
    for g in groups {
        encode_asg(&mut b, g);
    }
    b.close("AutoScalingGroups");
    b.text_elem_opt("NextToken", next_token);
    b.finish()
}

pub fn encode_set_desired_capacity() -> String {
    String::new()
}

#[derive(Debug, Clone, Default)]
pub struct WarmPoolView {
    pub min_size: u32,
    pub max_group_prepared_capacity: Option<i64>,
    pub pool_state: String,
    pub status: Option<String>,
    pub instances: Vec<AsgInstanceView>,
}

pub fn encode_describe_warm_pool(w: &WarmPoolView) -> String {
    let mut b = XmlBuilder::new();
    b.open("WarmPoolConfiguration");
    b.text_elem("MinSize", w.min_size);
    b.text_elem_opt("MaxGroupPreparedCapacity", w.max_group_prepared_capacity);
    b.text_elem("PoolState", &w.pool_state);
    b.text_elem_opt("Status", w.status.as_deref());
    b.close("WarmPoolConfiguration");
    b.open("Instances");
    for i in &w.instances {
        encode_asg_instance(&mut b, i);
    }
    b.close("Instances");
    b.finish()
}

#[derive(Debug, Clone, Default)]
pub struct SpotInstanceRequestView {
    pub spot_instance_request_id: String,
    pub spot_instance_type: String,
    pub state: String,
    pub status_code: String,
    pub status_message: String,
    pub create_time: String,
    pub instance_id: Option<String>,
    pub instance_type: String,
    pub max_price: Option<String>,
    pub interruption_behavior: String,
    pub tags: Vec<Tag>,
}

fn encode_spot_request(b: &mut XmlBuilder, r: &SpotInstanceRequestView) {
    b.open("item");
    b.text_elem("spotInstanceRequestId", &r.spot_instance_request_id);
    b.text_elem("type", &r.spot_instance_type);
    b.text_elem("state", &r.state);
    b.open("status");
    b.text_elem("code", &r.status_code);
    b.text_elem("message", &r.status_message);
    b.close("status");
    b.text_elem("createTime", &r.create_time);
    b.text_elem_opt("instanceId", r.instance_id.as_deref());
    b.text_elem("launchedAvailabilityZone", "");
    b.text_elem_opt("spotPrice", r.max_price.as_deref());
    b.text_elem("instanceInterruptionBehavior", &r.interruption_behavior);
    encode_tag_set(b, &r.tags);
    b.close("item");
}

pub fn encode_describe_spot_instance_requests(
    requests: &[SpotInstanceRequestView],
    next_token: Option<&str>,
) -> String {
    let mut b = XmlBuilder::new();
    b.open("spotInstanceRequestSet");
    for r in requests {
        encode_spot_request(&mut b, r);
    }
    b.close("spotInstanceRequestSet");
    b.text_elem_opt("nextToken", next_token);
    b.finish()
}

pub fn encode_cancel_spot_instance_requests(canceled: &[(String, String)]) -> String {
    let mut b = XmlBuilder::new();
    b.open("spotInstanceRequestSet");
    for (id, state) in canceled {
        b.open("item");
        b.text_elem("spotInstanceRequestId", id);
        b.text_elem("state", state);
        b.close("item");
    }
    b.close("spotInstanceRequestSet");
    b.finish()
}

#[derive(Debug, Clone, Default)]
pub struct SpotPriceView {
    pub instance_type: String,
    pub spot_price: String,
    pub timestamp: String,
}

pub fn encode_describe_spot_price_history(prices: &[SpotPriceView]) -> String {
    let mut b = XmlBuilder::new();
    b.open("spotPriceHistorySet");
    for p in prices {
        b.open("item");
        b.text_elem("instanceType", &p.instance_type);
        b.text_elem("spotPrice", &p.spot_price);
        b.text_elem("timestamp", &p.timestamp);
        b.close("item");
    }
    b.close("spotPriceHistorySet");
    b.finish()
}

pub fn encode_empty() -> String {
    String::new()
}
