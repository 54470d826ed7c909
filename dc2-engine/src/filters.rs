//! Attribute-name lookup tables feeding `dc2_filter::all_filters_match` for
//! each resource kind (`spec.md` §4.2, §4.3, §4.5, §4.6). The filter engine
//! itself is resource-agnostic; this module is where "what does `state`
//! filter against for an instance" lives.

use crate::attrs::{AsgAttrs, InstanceAttrs, SpotRequestAttrs, VolumeAttrs};

pub fn instance_attribute_lookup(attrs: &InstanceAttrs) -> impl Fn(&str) -> Option<Vec<String>> + '_ {
    move |name: &str| match name {
        "instance-id" => None,
        "instance-state-name" => Some(vec![attrs.state.name().to_string()]),
        "instance-state-code" => Some(vec![attrs.state.code().to_string()]),
        "instance-type" => Some(vec![attrs.instance_type.clone()]),
        "image-id" => Some(vec![attrs.image_id.clone()]),
        "key-name" => Some(attrs.key_name.clone().into_iter().collect()),
        "availability-zone" => Some(vec![attrs.availability_zone.clone()]),
        "private-ip-address" => Some(vec![attrs.private_ip_address.clone()]),
        "ip-address" => Some(attrs.public_ip_address.clone().into_iter().collect()),
        "instance-lifecycle" => Some(attrs.instance_lifecycle.clone().into_iter().collect()),
        _ => None,
    }
}

pub fn volume_attribute_lookup(attrs: &VolumeAttrs) -> impl Fn(&str) -> Option<Vec<String>> + '_ {
    move |name: &str| match name {
        "volume-id" => None,
        "status" => Some(vec![attrs.state.clone()]),
        "size" => Some(vec![attrs.size_gib.to_string()]),
        "volume-type" => Some(vec![attrs.volume_type.clone()]),
        "availability-zone" => Some(vec![attrs.availability_zone.clone()]),
        "encrypted" => Some(vec![attrs.encrypted.to_string()]),
        "attachment.instance-id" => {
            Some(attrs.attachment.as_ref().map(|a| a.instance_id.clone()).into_iter().collect())
        }
        "attachment.status" => Some(attrs.attachment.as_ref().map(|_| "attached".to_string()).into_iter().collect()),
        "attachment.delete-on-termination" => {
            Some(attrs.attachment.as_ref().map(|a| a.delete_on_termination.to_string()).into_iter().collect())
        }
        _ => None,
    }
}

pub fn asg_attribute_lookup(_attrs: &AsgAttrs) -> impl Fn(&str) -> Option<Vec<String>> {
    move |_name: &str| None
}

pub fn spot_request_attribute_lookup(attrs: &SpotRequestAttrs) -> impl Fn(&str) -> Option<Vec<String>> + '_ {
    move |name: &str| match name {
        "spot-instance-request-id" => None,
        "state" => Some(vec![attrs.state.clone()]),
        "status-code" => Some(vec![attrs.status_code.clone()]),
        "status-message" => Some(vec![attrs.status_message.clone()]),
        "instance-id" => Some(vec![attrs.instance_id.clone()]),
        "instance-type" => Some(vec![attrs.instance_type.clone()]),
        "spot-price" => Some(attrs.max_price.clone().into_iter().collect()),
        "type" => Some(vec![attrs.request_type.clone()]),
        _ => None,
    }
}
