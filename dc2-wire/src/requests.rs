//! Typed request structs decoded from `FormParams`, shared between the
//! wire layer and `dc2-engine` (`spec.md` §6, SPEC_FULL.md §2). Each
//! `decode_*` function is the dotted-path decoder for one action; there is
//! deliberately no generic reflection-driven decoder (`spec.md` §9).

use crate::errors::WireError;
use crate::form::{FormParams, WireFilter};

fn base64_decode_user_data(encoded: &str) -> Result<String, WireError> {
    use base64::Engine as _;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| WireError::invalid_parameter_value("UserData is not valid base64"))?;
    String::from_utf8(bytes).map_err(|_| WireError::invalid_parameter_value("UserData is not valid UTF-8"))
}

#[derive(Debug, Clone)]
pub struct TagSpecification {
    pub resource_type: String,
    pub tags: Vec<(String, String)>,
}

fn decode_tag_specifications(form: &FormParams, prefix: &str) -> Result<Vec<TagSpecification>, WireError> {
    form.list_indices(prefix)?
        .into_iter()
        .map(|n| {
            let resource_type = form
                .nested(prefix, n, "ResourceType")
                .ok_or_else(|| WireError::missing_parameter(&format!("{prefix}.{n}.ResourceType")))?
                .to_string();
            let tag_prefix = format!("{prefix}.{n}.Tag");
            let tags = form
                .list_indices(&tag_prefix)?
                .into_iter()
                .map(|m| {
                    let key = form
                        .nested(&tag_prefix, m, "Key")
                        .ok_or_else(|| WireError::missing_parameter(&format!("{tag_prefix}.{m}.Key")))?
                        .to_string();
                    let value = form.nested(&tag_prefix, m, "Value").unwrap_or("").to_string();
                    Ok((key, value))
                })
                .collect::<Result<Vec<_>, WireError>>()?;
            Ok(TagSpecification { resource_type, tags })
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct BlockDeviceMapping {
    pub device_name: String,
    pub volume_size_gib: Option<u64>,
    pub volume_type: Option<String>,
    pub delete_on_termination: bool,
}

fn decode_block_device_mappings(form: &FormParams, prefix: &str) -> Result<Vec<BlockDeviceMapping>, WireError> {
    form.list_indices(prefix)?
        .into_iter()
        .map(|n| {
            let device_name = form
                .nested(prefix, n, "DeviceName")
                .ok_or_else(|| WireError::missing_parameter(&format!("{prefix}.{n}.DeviceName")))?
                .to_string();
            let volume_size_gib = form
                .get(&format!("{prefix}.{n}.Ebs.VolumeSize"))
                .map(|v| v.parse().map_err(|_| WireError::invalid_parameter_value("VolumeSize")))
                .transpose()?;
            let volume_type = form.get(&format!("{prefix}.{n}.Ebs.VolumeType")).map(str::to_string);
            let delete_on_termination = form
                .get(&format!("{prefix}.{n}.Ebs.DeleteOnTermination"))
                .map(|v| v == "true")
                .unwrap_or(true);
            Ok(BlockDeviceMapping { device_name, volume_size_gib, volume_type, delete_on_termination })
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct LaunchTemplateSpec {
    pub id: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunInstancesRequest {
    pub image_id: Option<String>,
    pub instance_type: Option<String>,
    pub min_count: u32,
    pub max_count: u32,
    pub key_name: Option<String>,
    pub user_data: Option<String>,
    pub availability_zone: Option<String>,
    pub tag_specifications: Vec<TagSpecification>,
    pub market_type: Option<String>,
    pub spot_max_price: Option<String>,
    pub spot_interruption_behavior: Option<String>,
    pub launch_template: Option<LaunchTemplateSpec>,
    pub block_device_mappings: Vec<BlockDeviceMapping>,
    pub dry_run: bool,
}

pub fn decode_run_instances(form: &FormParams) -> Result<RunInstancesRequest, WireError> {
    let user_data = form.get("UserData").map(base64_decode_user_data).transpose()?;
    let launch_template = if form.get("LaunchTemplate.LaunchTemplateId").is_some()
        || form.get("LaunchTemplate.LaunchTemplateName").is_some()
    {
        Some(LaunchTemplateSpec {
            id: form.get("LaunchTemplate.LaunchTemplateId").map(str::to_string),
            name: form.get("LaunchTemplate.LaunchTemplateName").map(str::to_string),
            version: form.get("LaunchTemplate.Version").map(str::to_string),
        })
    } else {
        None
    };
    Ok(RunInstancesRequest {
        image_id: form.get("ImageId").map(str::to_string),
        instance_type: form.get("InstanceType").map(str::to_string),
        min_count: form.parse_opt("MinCount")?.unwrap_or(1),
        max_count: form.parse_opt("MaxCount")?.unwrap_or(1),
        key_name: form.get("KeyName").map(str::to_string),
        user_data,
        availability_zone: form.get("Placement.AvailabilityZone").map(str::to_string),
        tag_specifications: decode_tag_specifications(form, "TagSpecification")?,
        market_type: form.get("InstanceMarketOptions.MarketType").map(str::to_string),
        spot_max_price: form.get("InstanceMarketOptions.SpotOptions.MaxPrice").map(str::to_string),
        spot_interruption_behavior: form
            .get("InstanceMarketOptions.SpotOptions.InstanceInterruptionBehavior")
            .map(str::to_string),
        launch_template,
        block_device_mappings: decode_block_device_mappings(form, "BlockDeviceMapping")?,
        dry_run: form.bool_or("DryRun", false)?,
    })
}

#[derive(Debug, Clone, Default)]
pub struct DescribeInstancesRequest {
    pub instance_ids: Vec<String>,
    pub filters: Vec<WireFilter>,
    pub max_results: Option<u32>,
    pub next_token: Option<String>,
}

pub fn decode_describe_instances(form: &FormParams) -> Result<DescribeInstancesRequest, WireError> {
    Ok(DescribeInstancesRequest {
        instance_ids: form.scalar_list("InstanceId")?,
        filters: form.filters("Filter")?,
        max_results: form.parse_opt("MaxResults")?,
        next_token: form.get("NextToken").map(str::to_string),
    })
}

#[derive(Debug, Clone, Default)]
pub struct DescribeInstanceStatusRequest {
    pub instance_ids: Vec<String>,
    pub include_all_instances: bool,
    pub max_results: Option<u32>,
    pub next_token: Option<String>,
}

pub fn decode_describe_instance_status(form: &FormParams) -> Result<DescribeInstanceStatusRequest, WireError> {
    Ok(DescribeInstanceStatusRequest {
        instance_ids: form.scalar_list("InstanceId")?,
        include_all_instances: form.bool_or("IncludeAllInstances", false)?,
        max_results: form.parse_opt("MaxResults")?,
        next_token: form.get("NextToken").map(str::to_string),
    })
}

#[derive(Debug, Clone, Default)]
pub struct InstanceIdsRequest {
    pub instance_ids: Vec<String>,
    pub dry_run: bool,
}

pub fn decode_instance_ids(form: &FormParams) -> Result<InstanceIdsRequest, WireError> {
    Ok(InstanceIdsRequest {
        instance_ids: form.scalar_list("InstanceId")?,
        dry_run: form.bool_or("DryRun", false)?,
    })
}

#[derive(Debug, Clone)]
pub struct ModifyInstanceMetadataOptionsRequest {
    pub instance_id: String,
    pub http_endpoint: Option<String>,
}

pub fn decode_modify_instance_metadata_options(
    form: &FormParams,
) -> Result<ModifyInstanceMetadataOptionsRequest, WireError> {
    Ok(ModifyInstanceMetadataOptionsRequest {
        instance_id: form.get_required("InstanceId")?.to_string(),
        http_endpoint: form.get("HttpEndpoint").map(str::to_string),
    })
}

#[derive(Debug, Clone)]
pub struct DescribeInstanceAttributeRequest {
    pub instance_id: String,
    pub attribute: String,
}

pub fn decode_describe_instance_attribute(form: &FormParams) -> Result<DescribeInstanceAttributeRequest, WireError> {
    Ok(DescribeInstanceAttributeRequest {
        instance_id: form.get_required("InstanceId")?.to_string(),
        attribute: form.get_required("Attribute")?.to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct ModifyInstanceAttributeRequest {
    pub instance_id: String,
    pub instance_type: Option<String>,
    pub user_data: Option<String>,
    pub disable_api_termination: Option<bool>,
}

pub fn decode_modify_instance_attribute(form: &FormParams) -> Result<ModifyInstanceAttributeRequest, WireError> {
    Ok(ModifyInstanceAttributeRequest {
        instance_id: form.get_required("InstanceId")?.to_string(),
        instance_type: form.get("InstanceType.Value").map(str::to_string),
        user_data: form.get("UserData.Value").map(base64_decode_user_data).transpose()?,
        disable_api_termination: form.parse_opt("DisableApiTermination.Value")?,
    })
}

#[derive(Debug, Clone, Default)]
pub struct CreateTagsRequest {
    pub resource_ids: Vec<String>,
    pub tags: Vec<(String, String)>,
}

pub fn decode_create_tags(form: &FormParams) -> Result<CreateTagsRequest, WireError> {
    let tags = form
        .list_indices("Tag")?
        .into_iter()
        .map(|n| {
            let key = form
                .nested("Tag", n, "Key")
                .ok_or_else(|| WireError::missing_parameter(&format!("Tag.{n}.Key")))?
                .to_string();
            let value = form.nested("Tag", n, "Value").unwrap_or("").to_string();
            Ok((key, value))
        })
        .collect::<Result<Vec<_>, WireError>>()?;
    Ok(CreateTagsRequest { resource_ids: form.scalar_list("ResourceId")?, tags })
}

#[derive(Debug, Clone, Default)]
pub struct CreateVolumeRequest {
    pub size_gib: Option<u64>,
    pub iops: Option<u32>,
    pub throughput: Option<u32>,
    pub volume_type: Option<String>,
    pub kms_key_id: Option<String>,
    pub availability_zone: String,
    pub encrypted: bool,
    pub multi_attach_enabled: bool,
    pub tag_specifications: Vec<TagSpecification>,
    pub dry_run: bool,
}

pub fn decode_create_volume(form: &FormParams) -> Result<CreateVolumeRequest, WireError> {
    Ok(CreateVolumeRequest {
        size_gib: form.parse_opt("Size")?,
        iops: form.parse_opt("Iops")?,
        throughput: form.parse_opt("Throughput")?,
        volume_type: form.get("VolumeType").map(str::to_string),
        kms_key_id: form.get("KmsKeyId").map(str::to_string),
        availability_zone: form.get_required("AvailabilityZone")?.to_string(),
        encrypted: form.bool_or("Encrypted", false)?,
        multi_attach_enabled: form.bool_or("MultiAttachEnabled", false)?,
        tag_specifications: decode_tag_specifications(form, "TagSpecification")?,
        dry_run: form.bool_or("DryRun", false)?,
    })
}

#[derive(Debug, Clone)]
pub struct AttachVolumeRequest {
    pub volume_id: String,
    pub instance_id: String,
    pub device: String,
    pub dry_run: bool,
}

pub fn decode_attach_volume(form: &FormParams) -> Result<AttachVolumeRequest, WireError> {
    Ok(AttachVolumeRequest {
        volume_id: form.get_required("VolumeId")?.to_string(),
        instance_id: form.get_required("InstanceId")?.to_string(),
        device: form.get_required("Device")?.to_string(),
        dry_run: form.bool_or("DryRun", false)?,
    })
}

#[derive(Debug, Clone)]
pub struct DetachVolumeRequest {
    pub volume_id: String,
    pub dry_run: bool,
}

pub fn decode_detach_volume(form: &FormParams) -> Result<DetachVolumeRequest, WireError> {
    Ok(DetachVolumeRequest {
        volume_id: form.get_required("VolumeId")?.to_string(),
        dry_run: form.bool_or("DryRun", false)?,
    })
}

#[derive(Debug, Clone)]
pub struct DeleteVolumeRequest {
    pub volume_id: String,
    pub dry_run: bool,
}

pub fn decode_delete_volume(form: &FormParams) -> Result<DeleteVolumeRequest, WireError> {
    Ok(DeleteVolumeRequest {
        volume_id: form.get_required("VolumeId")?.to_string(),
        dry_run: form.bool_or("DryRun", false)?,
    })
}

#[derive(Debug, Clone)]
pub struct ModifyVolumeAttributeRequest {
    pub volume_id: String,
    pub delete_on_termination: Option<bool>,
}

pub fn decode_modify_volume_attribute(form: &FormParams) -> Result<ModifyVolumeAttributeRequest, WireError> {
    Ok(ModifyVolumeAttributeRequest {
        volume_id: form.get_required("VolumeId")?.to_string(),
        delete_on_termination: form.parse_opt("AutoEnableIO.Value")?,
    })
}

#[derive(Debug, Clone, Default)]
pub struct DescribeVolumesRequest {
    pub volume_ids: Vec<String>,
    pub filters: Vec<WireFilter>,
    pub max_results: Option<u32>,
    pub next_token: Option<String>,
}

pub fn decode_describe_volumes(form: &FormParams) -> Result<DescribeVolumesRequest, WireError> {
    Ok(DescribeVolumesRequest {
        volume_ids: form.scalar_list("VolumeId")?,
        filters: form.filters("Filter")?,
        max_results: form.parse_opt("MaxResults")?,
        next_token: form.get("NextToken").map(str::to_string),
    })
}

#[derive(Debug, Clone)]
pub struct CreateLaunchTemplateRequest {
    pub launch_template_name: String,
    pub image_id: Option<String>,
    pub instance_type: Option<String>,
    pub key_name: Option<String>,
    pub user_data: Option<String>,
}

pub fn decode_create_launch_template(form: &FormParams) -> Result<CreateLaunchTemplateRequest, WireError> {
    Ok(CreateLaunchTemplateRequest {
        launch_template_name: form.get_required("LaunchTemplateName")?.to_string(),
        image_id: form.get("LaunchTemplateData.ImageId").map(str::to_string),
        instance_type: form.get("LaunchTemplateData.InstanceType").map(str::to_string),
        key_name: form.get("LaunchTemplateData.KeyName").map(str::to_string),
        user_data: form.get("LaunchTemplateData.UserData").map(str::to_string),
    })
}

#[derive(Debug, Clone)]
pub struct CreateLaunchTemplateVersionRequest {
    pub launch_template_id: Option<String>,
    pub launch_template_name: Option<String>,
    pub source_version: Option<String>,
    pub image_id: Option<String>,
    pub instance_type: Option<String>,
    pub key_name: Option<String>,
    pub user_data: Option<String>,
}

pub fn decode_create_launch_template_version(
    form: &FormParams,
) -> Result<CreateLaunchTemplateVersionRequest, WireError> {
    Ok(CreateLaunchTemplateVersionRequest {
        launch_template_id: form.get("LaunchTemplateId").map(str::to_string),
        launch_template_name: form.get("LaunchTemplateName").map(str::to_string),
        source_version: form.get("SourceVersion").map(str::to_string),
        image_id: form.get("LaunchTemplateData.ImageId").map(str::to_string),
        instance_type: form.get("LaunchTemplateData.InstanceType").map(str::to_string),
        key_name: form.get("LaunchTemplateData.KeyName").map(str::to_string),
        user_data: form.get("LaunchTemplateData.UserData").map(str::to_string),
    })
}

#[derive(Debug, Clone, Default)]
pub struct DescribeLaunchTemplatesRequest {
    pub launch_template_ids: Vec<String>,
    pub launch_template_names: Vec<String>,
    pub max_results: Option<u32>,
    pub next_token: Option<String>,
}

pub fn decode_describe_launch_templates(form: &FormParams) -> Result<DescribeLaunchTemplatesRequest, WireError> {
    Ok(DescribeLaunchTemplatesRequest {
        launch_template_ids: form.scalar_list("LaunchTemplateId")?,
        launch_template_names: form.scalar_list("LaunchTemplateName")?,
        max_results: form.parse_opt("MaxResults")?,
        next_token: form.get("NextToken").map(str::to_string),
    })
}

#[derive(Debug, Clone)]
pub struct DescribeLaunchTemplateVersionsRequest {
    pub launch_template_id: Option<String>,
    pub launch_template_name: Option<String>,
    pub versions: Vec<String>,
    pub max_results: Option<u32>,
    pub next_token: Option<String>,
}

pub fn decode_describe_launch_template_versions(
    form: &FormParams,
) -> Result<DescribeLaunchTemplateVersionsRequest, WireError> {
    Ok(DescribeLaunchTemplateVersionsRequest {
        launch_template_id: form.get("LaunchTemplateId").map(str::to_string),
        launch_template_name: form.get("LaunchTemplateName").map(str::to_string),
        versions: form.scalar_list("LaunchTemplateVersion")?,
        max_results: form.parse_opt("MaxResults")?,
        next_token: form.get("NextToken").map(str::to_string),
    })
}

#[derive(Debug, Clone)]
pub struct DeleteLaunchTemplateRequest {
    pub launch_template_id: Option<String>,
    pub launch_template_name: Option<String>,
}

pub fn decode_delete_launch_template(form: &FormParams) -> Result<DeleteLaunchTemplateRequest, WireError> {
    Ok(DeleteLaunchTemplateRequest {
        launch_template_id: form.get("LaunchTemplateId").map(str::to_string),
        launch_template_name: form.get("LaunchTemplateName").map(str::to_string),
    })
}

#[derive(Debug, Clone)]
pub struct DeleteLaunchTemplateVersionsRequest {
    pub launch_template_id: Option<String>,
    pub launch_template_name: Option<String>,
    pub versions: Vec<String>,
}

pub fn decode_delete_launch_template_versions(
    form: &FormParams,
) -> Result<DeleteLaunchTemplateVersionsRequest, WireError> {
    Ok(DeleteLaunchTemplateVersionsRequest {
        launch_template_id: form.get("LaunchTemplateId").map(str::to_string),
        launch_template_name: form.get("LaunchTemplateName").map(str::to_string),
        versions: form.scalar_list("LaunchTemplateVersion")?,
    })
}

#[derive(Debug, Clone, Default)]
pub struct CreateAutoScalingGroupRequest {
    pub auto_scaling_group_name: String,
    pub min_size: u32,
    pub max_size: u32,
    pub desired_capacity: Option<u32>,
    pub launch_template: LaunchTemplateSpec,
    pub vpc_zone_identifier: Option<String>,
    pub tags: Vec<(String, String, bool)>,
}

pub fn decode_create_auto_scaling_group(form: &FormParams) -> Result<CreateAutoScalingGroupRequest, WireError> {
    Ok(CreateAutoScalingGroupRequest {
        auto_scaling_group_name: form.get_required("AutoScalingGroupName")?.to_string(),
        min_size: form.parse_required("MinSize")?,
        max_size: form.parse_required("MaxSize")?,
        desired_capacity: form.parse_opt("DesiredCapacity")?,
        launch_template: LaunchTemplateSpec {
            id: form.get("LaunchTemplate.LaunchTemplateId").map(str::to_string),
            name: form.get("LaunchTemplate.LaunchTemplateName").map(str::to_string),
            version: form.get("LaunchTemplate.Version").map(str::to_string),
        },
        vpc_zone_identifier: form.get("VPCZoneIdentifier").map(str::to_string),
        tags: decode_asg_tags(form)?,
    })
}

fn decode_asg_tags(form: &FormParams) -> Result<Vec<(String, String, bool)>, WireError> {
    form.list_indices("Tags")?
        .into_iter()
        .map(|n| {
            let key = form
                .nested("Tags", n, "Key")
                .ok_or_else(|| WireError::missing_parameter(&format!("Tags.{n}.Key")))?
                .to_string();
            let value = form.nested("Tags", n, "Value").unwrap_or("").to_string();
            let propagate = form.get(&format!("Tags.{n}.PropagateAtLaunch")).map(|v| v == "true").unwrap_or(false);
            Ok((key, value, propagate))
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct UpdateAutoScalingGroupRequest {
    pub auto_scaling_group_name: String,
    pub min_size: Option<u32>,
    pub max_size: Option<u32>,
    pub desired_capacity: Option<u32>,
    pub launch_template: Option<LaunchTemplateSpec>,
}

pub fn decode_update_auto_scaling_group(form: &FormParams) -> Result<UpdateAutoScalingGroupRequest, WireError> {
    let launch_template = if form.get("LaunchTemplate.LaunchTemplateId").is_some()
        || form.get("LaunchTemplate.LaunchTemplateName").is_some()
    {
        Some(LaunchTemplateSpec {
            id: form.get("LaunchTemplate.LaunchTemplateId").map(str::to_string),
            name: form.get("LaunchTemplate.LaunchTemplateName").map(str::to_string),
            version: form.get("LaunchTemplate.Version").map(str::to_string),
        })
    } else {
        None
    };
    Ok(UpdateAutoScalingGroupRequest {
        auto_scaling_group_name: form.get_required("AutoScalingGroupName")?.to_string(),
        min_size: form.parse_opt("MinSize")?,
        max_size: form.parse_opt("MaxSize")?,
        desired_capacity: form.parse_opt("DesiredCapacity")?,
        launch_template,
    })
}

#[derive(Debug, Clone)]
pub struct DeleteAutoScalingGroupRequest {
    pub auto_scaling_group_name: String,
}

pub fn decode_delete_auto_scaling_group(form: &FormParams) -> Result<DeleteAutoScalingGroupRequest, WireError> {
    Ok(DeleteAutoScalingGroupRequest {
        auto_scaling_group_name: form.get_required("AutoScalingGroupName")?.to_string(),
    })
}

#[derive(Debug, Clone, Default)]
pub struct DescribeAutoScalingGroupsRequest {
    pub auto_scaling_group_names: Vec<String>,
    pub filters: Vec<WireFilter>,
    pub max_records: Option<u32>,
    pub next_token: Option<String>,
}

pub fn decode_describe_auto_scaling_groups(
    form: &FormParams,
) -> Result<DescribeAutoScalingGroupsRequest, WireError> {
    Ok(DescribeAutoScalingGroupsRequest {
        auto_scaling_group_names: form.scalar_list("AutoScalingGroupNames.member")?,
        filters: form.filters("Filters.member")?,
        max_records: form.parse_opt("MaxRecords")?,
        next_token: form.get("NextToken").map(str::to_string),
    })
}

#[derive(Debug, Clone)]
pub struct SetDesiredCapacityRequest {
    pub auto_scaling_group_name: String,
    pub desired_capacity: u32,
}

pub fn decode_set_desired_capacity(form: &FormParams) -> Result<SetDesiredCapacityRequest, WireError> {
    Ok(SetDesiredCapacityRequest {
        auto_scaling_group_name: form.get_required("AutoScalingGroupName")?.to_string(),
        desired_capacity: form.parse_required("DesiredCapacity")?,
    })
}

#[derive(Debug, Clone, Default)]
pub struct DetachInstancesRequest {
    pub auto_scaling_group_name: String,
    pub instance_ids: Vec<String>,
    pub should_decrement_desired_capacity: bool,
}

pub fn decode_detach_instances(form: &FormParams) -> Result<DetachInstancesRequest, WireError> {
    Ok(DetachInstancesRequest {
        auto_scaling_group_name: form.get_required("AutoScalingGroupName")?.to_string(),
        instance_ids: form.scalar_list("InstanceIds.member")?,
        should_decrement_desired_capacity: form.bool_or("ShouldDecrementDesiredCapacity", false)?,
    })
}

#[derive(Debug, Clone)]
pub struct PutWarmPoolRequest {
    pub auto_scaling_group_name: String,
    pub min_size: Option<u32>,
    pub max_group_prepared_capacity: Option<i64>,
    pub pool_state: Option<String>,
    pub reuse_on_scale_in: bool,
}

pub fn decode_put_warm_pool(form: &FormParams) -> Result<PutWarmPoolRequest, WireError> {
    Ok(PutWarmPoolRequest {
        auto_scaling_group_name: form.get_required("AutoScalingGroupName")?.to_string(),
        min_size: form.parse_opt("MinSize")?,
        max_group_prepared_capacity: form.parse_opt("MaxGroupPreparedCapacity")?,
        pool_state: form.get("PoolState").map(str::to_string),
        reuse_on_scale_in: form
            .get("InstanceReusePolicy.ReuseOnScaleIn")
            .map(|v| v == "true")
            .unwrap_or(false),
    })
}

#[derive(Debug, Clone)]
pub struct DeleteWarmPoolRequest {
    pub auto_scaling_group_name: String,
}

pub fn decode_delete_warm_pool(form: &FormParams) -> Result<DeleteWarmPoolRequest, WireError> {
    Ok(DeleteWarmPoolRequest { auto_scaling_group_name: form.get_required("AutoScalingGroupName")?.to_string() })
}

#[derive(Debug, Clone)]
pub struct DescribeWarmPoolRequest {
    pub auto_scaling_group_name: String,
}

pub fn decode_describe_warm_pool(form: &FormParams) -> Result<DescribeWarmPoolRequest, WireError> {
    Ok(DescribeWarmPoolRequest { auto_scaling_group_name: form.get_required("AutoScalingGroupName")?.to_string() })
}

#[derive(Debug, Clone, Default)]
pub struct DescribeSpotInstanceRequestsRequest {
    pub spot_instance_request_ids: Vec<String>,
    pub filters: Vec<WireFilter>,
    pub max_results: Option<u32>,
    pub next_token: Option<String>,
}

pub fn decode_describe_spot_instance_requests(
    form: &FormParams,
) -> Result<DescribeSpotInstanceRequestsRequest, WireError> {
    Ok(DescribeSpotInstanceRequestsRequest {
        spot_instance_request_ids: form.scalar_list("SpotInstanceRequestId")?,
        filters: form.filters("Filter")?,
        max_results: form.parse_opt("MaxResults")?,
        next_token: form.get("NextToken").map(str::to_string),
    })
}

#[derive(Debug, Clone, Default)]
pub struct CancelSpotInstanceRequestsRequest {
    pub spot_instance_request_ids: Vec<String>,
}

pub fn decode_cancel_spot_instance_requests(
    form: &FormParams,
) -> Result<CancelSpotInstanceRequestsRequest, WireError> {
    Ok(CancelSpotInstanceRequestsRequest {
        spot_instance_request_ids: form.scalar_list("SpotInstanceRequestId")?,
    })
}

#[derive(Debug, Clone, Default)]
pub struct DescribeSpotPriceHistoryRequest {
    pub instance_types: Vec<String>,
}

pub fn decode_describe_spot_price_history(form: &FormParams) -> Result<DescribeSpotPriceHistoryRequest, WireError> {
    Ok(DescribeSpotPriceHistoryRequest { instance_types: form.scalar_list("InstanceType")? })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_run_instances_with_tags_and_spot_options() {
        let form = FormParams::decode(
            "ImageId=ami-1&InstanceType=t3.micro&MinCount=1&MaxCount=2\
             &InstanceMarketOptions.MarketType=spot\
             &InstanceMarketOptions.SpotOptions.MaxPrice=0.05\
             &TagSpecification.1.ResourceType=instance\
             &TagSpecification.1.Tag.1.Key=foo&TagSpecification.1.Tag.1.Value=bar",
        )
        .unwrap();
        let req = decode_run_instances(&form).unwrap();
        assert_eq!(req.image_id.as_deref(), Some("ami-1"));
        assert_eq!(req.max_count, 2);
        assert_eq!(req.market_type.as_deref(), Some("spot"));
        assert_eq!(req.tag_specifications[0].tags[0], ("foo".to_string(), "bar".to_string()));
    }

    #[test]
    fn decodes_base64_user_data() {
        let form = FormParams::decode("ImageId=ami-1&UserData=aGVsbG8%3D").unwrap();
        let req = decode_run_instances(&form).unwrap();
        assert_eq!(req.user_data.as_deref(), Some("hello"));
    }
}
