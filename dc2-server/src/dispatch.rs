//! Decode → route → encode for every action in `dc2_wire::actions::Action`.
//! One match arm per action: decode the form body with the action's
//! `decode_*` function, call the matching `Dispatcher` method, and hand the
//! typed result to the matching `encode_*` function. No business logic
//! lives here — a handler that needs more than "decode, call, encode" is a
//! sign the logic belongs in `dc2-engine` instead.

use dc2_wire::actions::Action;
use dc2_wire::form::FormParams;
use dc2_wire::requests::*;
use dc2_wire::responses::*;
use dc2_wire::xml::{render_response, XmlBuilder};
use dc2_wire::{Dialect, WireError};

use crate::AppState;

/// Best-effort dialect guess for errors raised before (or without ever)
/// resolving a valid `Action` — e.g. a body that fails to decode at all.
/// Falls back to the EC2 dialect, matching the more common caller.
pub fn dialect_hint(body: &str) -> Dialect {
    let action_name = body
        .split('&')
        .find_map(|pair| pair.strip_prefix("Action="))
        .unwrap_or("");
    Action::from_name(action_name).map(|a| a.dialect()).unwrap_or(Dialect::Ec2)
}

pub async fn handle(state: &AppState, body: &str, request_id: &str) -> Result<String, WireError> {
    let form = FormParams::decode(body)?;
    let action_name = form.get_required("Action")?;
    let action = Action::from_name(action_name).ok_or_else(|| WireError::invalid_action(action_name))?;
    let dialect = action.dialect();
    let inner = route(state, action, &form).await?;
    Ok(render_response(dialect, action.name(), request_id, &inner))
}

async fn route(state: &AppState, action: Action, form: &FormParams) -> Result<String, WireError> {
    let d = &state.dispatcher;
    Ok(match action {
        Action::RunInstances => {
            let req = decode_run_instances(form)?;
            encode_run_instances(&d.run_instances(&req).await?)
        }
        Action::DescribeInstances => {
            let req = decode_describe_instances(form)?;
            let page = d.describe_instances(&req).await?;
            let reservations: Vec<ReservationView> = page
                .items
                .into_iter()
                .map(|i| ReservationView {
                    reservation_id: format!("r-{}", dc2_ids::runtime_id(&i.instance_id)),
                    owner_id: d.owner_id().to_string(),
                    instances: vec![i],
                })
                .collect();
            let mut body = encode_describe_instances(&reservations);
            append_next_token(&mut body, page.next_token.as_deref());
            body
        }
        Action::DescribeInstanceStatus => {
            let req = decode_describe_instance_status(form)?;
            let page = d.describe_instance_status(&req).await?;
            encode_describe_instance_status(&page.items, page.next_token.as_deref())
        }
        Action::StartInstances => {
            let req = decode_instance_ids(form)?;
            d.start_instances(&req).await?;
            encode_empty()
        }
        Action::StopInstances => {
            let req = decode_instance_ids(form)?;
            d.stop_instances(&req).await?;
            encode_empty()
        }
        Action::RebootInstances => {
            let req = decode_instance_ids(form)?;
            d.reboot_instances(&req).await?;
            encode_empty()
        }
        Action::TerminateInstances => {
            let req = decode_instance_ids(form)?;
            d.terminate_instances(&req).await?;
            encode_empty()
        }
        Action::ModifyInstanceMetadataOptions => {
            let req = decode_modify_instance_metadata_options(form)?;
            let instance_id = req.instance_id.clone();
            let http_endpoint = req.http_endpoint.clone();
            d.modify_instance_metadata_options(&req).await?;
            encode_modify_instance_metadata_options(&instance_id, http_endpoint.as_deref())
        }
        Action::DescribeInstanceAttribute => {
            let req = decode_describe_instance_attribute(form)?;
            let instance_id = req.instance_id.clone();
            let attribute = req.attribute.clone();
            let value = d.describe_instance_attribute(&req).await?;
            encode_instance_attribute(&instance_id, &attribute, &value)
        }
        Action::ModifyInstanceAttribute => {
            let req = decode_modify_instance_attribute(form)?;
            d.modify_instance_attribute(&req).await?;
            encode_empty()
        }
        Action::CreateTags => {
            let req = decode_create_tags(form)?;
            d.create_tags(&req).await?;
            encode_empty()
        }
        Action::DeleteTags => {
            let req = decode_create_tags(form)?;
            d.delete_tags(&req).await?;
            encode_empty()
        }
        Action::CreateVolume => {
            let req = decode_create_volume(form)?;
            encode_create_volume(&d.create_volume(&req).await?)
        }
        Action::DeleteVolume => {
            let req = decode_delete_volume(form)?;
            d.delete_volume(&req).await?;
            encode_empty()
        }
        Action::AttachVolume => {
            let req = decode_attach_volume(form)?;
            encode_attach_volume(&d.attach_volume(&req).await?)
        }
        Action::DetachVolume => {
            let req = decode_detach_volume(form)?;
            encode_attach_volume(&d.detach_volume(&req).await?)
        }
        Action::DescribeVolumes => {
            let req = decode_describe_volumes(form)?;
            let page = d.describe_volumes(&req).await?;
            encode_describe_volumes(&page.items, page.next_token.as_deref())
        }
        Action::ModifyVolumeAttribute => {
            let req = decode_modify_volume_attribute(form)?;
            d.modify_volume_attribute(&req).await?;
            encode_empty()
        }
        Action::CreateLaunchTemplate => {
            let req = decode_create_launch_template(form)?;
            encode_launch_template(&d.create_launch_template(&req).await?)
        }
        Action::CreateLaunchTemplateVersion => {
            let req = decode_create_launch_template_version(form)?;
            encode_launch_template_version(&d.create_launch_template_version(&req).await?)
        }
        Action::DescribeLaunchTemplates => {
            let req = decode_describe_launch_templates(form)?;
            encode_describe_launch_templates(&d.describe_launch_templates(&req).await?, None)
        }
        Action::DescribeLaunchTemplateVersions => {
            let req = decode_describe_launch_template_versions(form)?;
            encode_describe_launch_template_versions(&d.describe_launch_template_versions(&req).await?, None)
        }
        Action::DeleteLaunchTemplate => {
            let req = decode_delete_launch_template(form)?;
            encode_launch_template(&d.delete_launch_template(&req).await?)
        }
        Action::DeleteLaunchTemplateVersions => {
            let req = decode_delete_launch_template_versions(form)?;
            encode_delete_launch_template_versions(&d.delete_launch_template_versions(&req).await?)
        }
        Action::DescribeSpotInstanceRequests => {
            let req = decode_describe_spot_instance_requests(form)?;
            let page = d.describe_spot_instance_requests(&req).await?;
            encode_describe_spot_instance_requests(&page.items, page.next_token.as_deref())
        }
        Action::CancelSpotInstanceRequests => {
            let req = decode_cancel_spot_instance_requests(form)?;
            encode_cancel_spot_instance_requests(&d.cancel_spot_instance_requests(&req).await?)
        }
        Action::DescribeSpotPriceHistory => {
            let req = decode_describe_spot_price_history(form)?;
            encode_describe_spot_price_history(&d.describe_spot_price_history(&req).await)
        }
        Action::CreateAutoScalingGroup => {
            let req = decode_create_auto_scaling_group(form)?;
            d.create_auto_scaling_group(&req).await?;
            encode_empty()
        }
        Action::UpdateAutoScalingGroup => {
            let req = decode_update_auto_scaling_group(form)?;
            d.update_auto_scaling_group(&req).await?;
            encode_empty()
        }
        Action::DeleteAutoScalingGroup => {
            let req = decode_delete_auto_scaling_group(form)?;
            d.delete_auto_scaling_group(&req).await?;
            encode_empty()
        }
        Action::DescribeAutoScalingGroups => {
            let req = decode_describe_auto_scaling_groups(form)?;
            let page = d.describe_auto_scaling_groups(&req).await?;
            encode_describe_auto_scaling_groups(&page.items, page.next_token.as_deref())
        }
        Action::SetDesiredCapacity => {
            let req = decode_set_desired_capacity(form)?;
            d.set_desired_capacity(&req).await?;
            encode_set_desired_capacity()
        }
        Action::DetachInstances => {
            let req = decode_detach_instances(form)?;
            d.detach_instances(&req).await?;
            encode_empty()
        }
        Action::PutWarmPool => {
            let req = decode_put_warm_pool(form)?;
            d.put_warm_pool(&req).await?;
            encode_empty()
        }
        Action::DeleteWarmPool => {
            let req = decode_delete_warm_pool(form)?;
            d.delete_warm_pool(&req).await?;
            encode_empty()
        }
        Action::DescribeWarmPool => {
            let req = decode_describe_warm_pool(form)?;
            encode_describe_warm_pool(&d.describe_warm_pool(&req).await?)
        }
    })
}

/// `DescribeLaunchTemplateVersions`/`DescribeLaunchTemplates` in this
/// emulator never paginate past a single page's worth (`dc2-engine`
/// returns a plain `Vec`, not a `Page`), so `NextToken` is always absent;
/// kept as a parameter on the encoders anyway to match the wire shape other
/// list responses share.
fn append_next_token(body: &mut String, next_token: Option<&str>) {
    if let Some(token) = next_token {
        let mut b = XmlBuilder::new();
        b.text_elem("nextToken", token);
        body.push_str(&b.finish());
    }
}

fn encode_instance_attribute(instance_id: &str, attribute: &str, value: &str) -> String {
    let mut b = XmlBuilder::new();
    b.text_elem("instanceId", instance_id);
    b.open(attribute);
    b.text_elem("value", value);
    b.close(attribute);
    b.finish()
}

fn encode_modify_instance_metadata_options(instance_id: &str, http_endpoint: Option<&str>) -> String {
    let mut b = XmlBuilder::new();
    b.text_elem("instanceId", instance_id);
    b.text_elem_opt("httpEndpoint", http_endpoint);
    b.text_elem("state", "applied");
    b.finish()
}

fn encode_delete_launch_template_versions(versions: &[i64]) -> String {
    let mut b = XmlBuilder::new();
    b.open("successfullyDeletedLaunchTemplateVersionSet");
    for v in versions {
        b.open("item");
        b.text_elem("versionNumber", *v);
        b.close("item");
    }
    b.close("successfullyDeletedLaunchTemplateVersionSet");
    b.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::BuildInfo;
    use dc2_engine::dispatcher::{Dispatcher, SpotTiming};
    use dc2_executor::InMemoryExecutor;
    use dc2_ids::{IdAllocator, OsRng};
    use dc2_imds::InMemoryImdsProxy;
    use dc2_profile::ProfileEngine;
    use dc2_store::ResourceStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_state() -> AppState {
        let dispatcher = Dispatcher::new(
            ResourceStore::new(),
            IdAllocator::new(OsRng),
            Arc::new(InMemoryExecutor::new()),
            Arc::new(InMemoryImdsProxy::new()),
            Arc::new(ProfileEngine::empty()),
            "us-east-1".to_string(),
            "123456789012".to_string(),
            SpotTiming { reclaim_after: Duration::from_secs(120), reclaim_notice: Duration::from_secs(120) },
        );
        AppState { dispatcher, region: "us-east-1".to_string(), build_info: Arc::new(BuildInfo::default()) }
    }

    #[tokio::test]
    async fn run_then_describe_round_trips_through_xml() {
        let state = test_state();
        let run_xml = handle(&state, "Action=RunInstances&ImageId=ami-1&InstanceType=t3.micro&MinCount=1&MaxCount=1", "req-1")
            .await
            .unwrap();
        assert!(run_xml.contains("<RunInstancesResponse"));
        assert!(run_xml.contains("<instanceId>i-"));

        let id_start = run_xml.find("<instanceId>").unwrap() + "<instanceId>".len();
        let id_end = run_xml[id_start..].find("</instanceId>").unwrap() + id_start;
        let instance_id = &run_xml[id_start..id_end];

        let describe_xml = handle(
            &state,
            &format!("Action=DescribeInstances&InstanceId.1={instance_id}"),
            "req-2",
        )
        .await
        .unwrap();
        assert!(describe_xml.contains(instance_id));
        assert!(describe_xml.contains("<reservationSet>"));
    }

    #[tokio::test]
    async fn unknown_action_is_invalid_action_error() {
        let state = test_state();
        let err = handle(&state, "Action=NotARealAction", "req-3").await.unwrap_err();
        assert_eq!(err.code, "InvalidAction");
    }

    #[tokio::test]
    async fn missing_action_param_is_wire_error() {
        let state = test_state();
        let err = handle(&state, "ImageId=ami-1", "req-4").await.unwrap_err();
        assert_eq!(err.code, "MissingParameter");
    }

    #[test]
    fn dialect_hint_reads_autoscaling_actions() {
        assert_eq!(dialect_hint("Action=CreateAutoScalingGroup&AutoScalingGroupName=a"), Dialect::AutoScaling);
        assert_eq!(dialect_hint("Action=RunInstances"), Dialect::Ec2);
        assert_eq!(dialect_hint("garbage"), Dialect::Ec2);
    }
}
