//! Volume lifecycle: create/attach/detach/delete, attribute modification,
//! describe with filter+pagination, and delete-on-termination cleanup
//! (`spec.md` §4.4).

use dc2_filter::{all_filters_match, paginate, Filter, Page};
use dc2_ids::{IdAllocator, RngSource};
use dc2_store::{ResourceKind, ResourceStore};
use dc2_wire::requests::{
    AttachVolumeRequest, CreateVolumeRequest, DeleteVolumeRequest, DescribeVolumesRequest, DetachVolumeRequest,
    ModifyVolumeAttributeRequest,
};
use dc2_wire::responses::{AttachmentView, VolumeView};

use crate::attrs::{Attachment, InstanceAttrs, InstanceState, VolumeAttrs};
use crate::error::{EngineError, EngineResult};
use crate::filters::volume_attribute_lookup;
use crate::time::now_rfc3339;

const DEFAULT_VOLUME_TYPE: &str = "gp3";

fn to_view(id: &str, attrs: &VolumeAttrs) -> VolumeView {
    VolumeView {
        volume_id: id.to_string(),
        size_gib: attrs.size_gib,
        volume_type: attrs.volume_type.clone(),
        iops: attrs.iops,
        throughput: attrs.throughput,
        availability_zone: attrs.availability_zone.clone(),
        state: attrs.state.clone(),
        create_time: attrs.create_time.clone(),
        encrypted: attrs.encrypted,
        kms_key_id: attrs.kms_key_id.clone(),
        attachments: attrs
            .attachment
            .iter()
            .map(|a| AttachmentView {
                volume_id: id.to_string(),
                instance_id: a.instance_id.clone(),
                device: a.device.clone(),
                state: "attached".to_string(),
                attach_time: a.attach_time.clone(),
                delete_on_termination: a.delete_on_termination,
            })
            .collect(),
        tags: attrs.tags.iter().map(|(k, v)| dc2_wire::responses::Tag { key: k.clone(), value: v.clone() }).collect(),
    }
}

pub fn create_volume<R: RngSource>(
    store: &ResourceStore,
    ids: &IdAllocator<R>,
    req: &CreateVolumeRequest,
) -> EngineResult<VolumeView> {
    if req.dry_run {
        return Err(EngineError::DryRun);
    }
    let id = ids.allocate_volume();
    store.register_resource(ResourceKind::Volume, &id)?;
    let attrs = VolumeAttrs {
        size_gib: req.size_gib.unwrap_or(8),
        iops: req.iops,
        throughput: req.throughput,
        volume_type: req.volume_type.clone().unwrap_or_else(|| DEFAULT_VOLUME_TYPE.to_string()),
        kms_key_id: req.kms_key_id.clone(),
        availability_zone: req.availability_zone.clone(),
        encrypted: req.encrypted,
        create_time: now_rfc3339(),
        state: "available".to_string(),
        attachment: None,
        tags: req
            .tag_specifications
            .iter()
            .filter(|ts| ts.resource_type == "volume")
            .flat_map(|ts| ts.tags.clone())
            .collect(),
    };
    attrs.save(store, &id)?;
    Ok(to_view(&id, &attrs))
}

/// Attaches a volume that is not already attached to a running/stopped
/// instance. Used both by `AttachVolume` and by `RunInstances` block device
/// mapping processing, which additionally marks the attachment
/// `DeleteOnTermination=true`.
pub fn attach_volume(
    store: &ResourceStore,
    volume_id: &str,
    instance_id: &str,
    device: &str,
    delete_on_termination: bool,
) -> EngineResult<AttachmentView> {
    let mut attrs = VolumeAttrs::load(store, volume_id)?;
    if attrs.attachment.is_some() || attrs.state != "available" {
        return Err(EngineError::InvalidParameterValue(format!(
            "{volume_id} is already attached or not available"
        )));
    }
    let instance = InstanceAttrs::load(store, instance_id)?;
    if instance.state == InstanceState::Terminated {
        return Err(EngineError::not_found("Instance", instance_id));
    }
    let attach_time = now_rfc3339();
    attrs.attachment = Some(Attachment {
        instance_id: instance_id.to_string(),
        device: device.to_string(),
        attach_time: attach_time.clone(),
        delete_on_termination,
    });
    attrs.state = "in-use".to_string();
    attrs.save(store, volume_id)?;
    Ok(AttachmentView {
        volume_id: volume_id.to_string(),
        instance_id: instance_id.to_string(),
        device: device.to_string(),
        state: "attached".to_string(),
        attach_time,
        delete_on_termination,
    })
}

pub fn do_attach_volume(store: &ResourceStore, req: &AttachVolumeRequest) -> EngineResult<AttachmentView> {
    if req.dry_run {
        return Err(EngineError::DryRun);
    }
    attach_volume(store, &req.volume_id, &req.instance_id, &req.device, false)
}

pub fn detach_volume(store: &ResourceStore, volume_id: &str) -> EngineResult<AttachmentView> {
    let mut attrs = VolumeAttrs::load(store, volume_id)?;
    let attachment = attrs
        .attachment
        .take()
        .ok_or_else(|| EngineError::InvalidParameterValue(format!("{volume_id} is not attached")))?;
    attrs.state = "available".to_string();
    attrs.save(store, volume_id)?;
    Ok(AttachmentView {
        volume_id: volume_id.to_string(),
        instance_id: attachment.instance_id,
        device: attachment.device,
        state: "detached".to_string(),
        attach_time: attachment.attach_time,
        delete_on_termination: attachment.delete_on_termination,
    })
}

pub fn do_detach_volume(store: &ResourceStore, req: &DetachVolumeRequest) -> EngineResult<AttachmentView> {
    if req.dry_run {
        return Err(EngineError::DryRun);
    }
    detach_volume(store, &req.volume_id)
}

pub fn delete_volume(store: &ResourceStore, req: &DeleteVolumeRequest) -> EngineResult<()> {
    if req.dry_run {
        return Err(EngineError::DryRun);
    }
    let attrs = VolumeAttrs::load(store, &req.volume_id)?;
    if attrs.attachment.is_some() {
        return Err(EngineError::InvalidParameterValue(format!("{} is still attached", req.volume_id)));
    }
    store.remove_resource(&req.volume_id)?;
    Ok(())
}

pub fn modify_volume_attribute(store: &ResourceStore, req: &ModifyVolumeAttributeRequest) -> EngineResult<()> {
    let mut attrs = VolumeAttrs::load(store, &req.volume_id)?;
    if let Some(dot) = req.delete_on_termination {
        if let Some(a) = attrs.attachment.as_mut() {
            a.delete_on_termination = dot;
        }
    }
    attrs.save(store, &req.volume_id)
}

pub fn describe_volumes(store: &ResourceStore, req: &DescribeVolumesRequest) -> EngineResult<Page<VolumeView>> {
    let filters: Vec<Filter> = req.filters.iter().map(|f| Filter { name: f.name.clone(), values: f.values.clone() }).collect();
    let mut ids = store.registered_resources(ResourceKind::Volume);
    ids.sort();
    let mut matched = Vec::new();
    for id in ids {
        if !req.volume_ids.is_empty() && !req.volume_ids.contains(&id) {
            continue;
        }
        let attrs = VolumeAttrs::load(store, &id)?;
        if !all_filters_match(&filters, &attrs.tags, volume_attribute_lookup(&attrs))? {
            continue;
        }
        matched.push(to_view(&id, &attrs));
    }
    let max_results = req.max_results.unwrap_or(1000) as usize;
    paginate(&matched, max_results, req.next_token.as_deref()).map_err(EngineError::from)
}

/// Detaches and deletes every volume attached to `instance_id` with
/// `DeleteOnTermination=true`, joining errors rather than aborting
/// (`spec.md` §4.3, §4.4).
pub fn cleanup_on_termination(store: &ResourceStore, instance_id: &str) -> Vec<EngineError> {
    let mut errors = Vec::new();
    for id in store.registered_resources(ResourceKind::Volume) {
        let Ok(attrs) = VolumeAttrs::load(store, &id) else { continue };
        let Some(attachment) = &attrs.attachment else { continue };
        if attachment.instance_id != instance_id || !attachment.delete_on_termination {
            continue;
        }
        if let Err(e) = detach_volume(store, &id) {
            errors.push(e);
            continue;
        }
        if let Err(e) = store.remove_resource(&id) {
            errors.push(EngineError::from(e));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use dc2_ids::SequentialRng;

    fn new_store() -> (ResourceStore, IdAllocator<SequentialRng>) {
        (ResourceStore::new(), IdAllocator::new(SequentialRng::new(1)))
    }

    fn register_instance(store: &ResourceStore, id: &str, state: InstanceState) {
        store.register_resource(ResourceKind::Instance, id).unwrap();
        let attrs = InstanceAttrs {
            image_id: "ami-1".into(),
            instance_type: "t3.micro".into(),
            key_name: None,
            launch_time: now_rfc3339(),
            state,
            architecture: "x86_64".into(),
            availability_zone: "us-east-1a".into(),
            tenancy: "default".into(),
            monitoring_state: "disabled".into(),
            private_ip_address: "10.0.0.1".into(),
            public_ip_address: None,
            mac_address: "02:00:00:00:00:01".into(),
            network_interface_id: "eni-1".into(),
            private_dns_name: "ip-10-0-0-1.ec2.internal".into(),
            public_dns_name: None,
            user_data: None,
            instance_lifecycle: None,
            market_type: "on-demand".into(),
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
            launch_template_id: None,
            launch_template_version: None,
            tags: Default::default(),
        };
        attrs.save(store, id).unwrap();
    }

    #[test]
    fn create_attach_detach_round_trip() {
        let (store, ids) = new_store();
        register_instance(&store, "i-1", InstanceState::Running);
        let req = CreateVolumeRequest {
            size_gib: Some(20),
            availability_zone: "us-east-1a".into(),
            ..Default::default()
        };
        let vol = create_volume(&store, &ids, &req).unwrap();
        assert_eq!(vol.size_gib, 20);
        assert_eq!(vol.volume_type, "gp3");

        let attachment = attach_volume(&store, &vol.volume_id, "i-1", "/dev/sdf", false).unwrap();
        assert_eq!(attachment.state, "attached");
        assert!(attach_volume(&store, &vol.volume_id, "i-1", "/dev/sdg", false).is_err());

        let detach = detach_volume(&store, &vol.volume_id).unwrap();
        assert_eq!(detach.state, "detached");
        assert_eq!(detach.attach_time, attachment.attach_time);
    }

    #[test]
    fn cleanup_removes_only_delete_on_termination_attachments() {
        let (store, ids) = new_store();
        register_instance(&store, "i-1", InstanceState::ShuttingDown);
        let req = CreateVolumeRequest { size_gib: Some(8), availability_zone: "us-east-1a".into(), ..Default::default() };
        let keep = create_volume(&store, &ids, &req).unwrap();
        let drop = create_volume(&store, &ids, &req).unwrap();
        attach_volume(&store, &keep.volume_id, "i-1", "/dev/sdf", false).unwrap();
        attach_volume(&store, &drop.volume_id, "i-1", "/dev/sdg", true).unwrap();

        let errors = cleanup_on_termination(&store, "i-1");
        assert!(errors.is_empty());
        assert!(store.contains(&keep.volume_id));
        assert!(!store.contains(&drop.volume_id));
    }
}
