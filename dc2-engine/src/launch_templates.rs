//! Launch template CRUD and version resolution (`spec.md` §4.5). Versions
//! are stored as their own resource, keyed `<template-id>#<version>`; that
//! key never appears on the wire, only the plain integer version number
//! does.

use dc2_ids::{IdAllocator, RngSource};
use dc2_store::{ResourceKind, ResourceStore};
use dc2_wire::requests::{
    CreateLaunchTemplateRequest, CreateLaunchTemplateVersionRequest, DeleteLaunchTemplateRequest,
    DeleteLaunchTemplateVersionsRequest, DescribeLaunchTemplateVersionsRequest, DescribeLaunchTemplatesRequest,
    LaunchTemplateSpec,
};
use dc2_wire::responses::{LaunchTemplateVersionView, LaunchTemplateView};

use crate::attrs::{lt_version_resource_id, LaunchTemplateAttrs, LaunchTemplateVersionAttrs};
use crate::error::{EngineError, EngineResult};
use crate::time::now_rfc3339;

/// The launch template data resolved for use by `RunInstances` /
/// `CreateAutoScalingGroup`: request-level fields always win over
/// whatever a referenced template version supplies.
#[derive(Debug, Clone, Default)]
pub struct ResolvedLaunchTemplate {
    pub image_id: Option<String>,
    pub instance_type: Option<String>,
    pub key_name: Option<String>,
    pub user_data: Option<String>,
}

fn find_by_name(store: &ResourceStore, name: &str) -> EngineResult<Option<String>> {
    for id in store.registered_resources(ResourceKind::LaunchTemplate) {
        if LaunchTemplateAttrs::load(store, &id)?.name == name {
            return Ok(Some(id));
        }
    }
    Ok(None)
}

fn resolve_template_id(store: &ResourceStore, id: &Option<String>, name: &Option<String>) -> EngineResult<String> {
    if let Some(id) = id {
        if !store.contains(id) {
            return Err(EngineError::not_found("LaunchTemplate", id));
        }
        return Ok(id.clone());
    }
    if let Some(name) = name {
        return find_by_name(store, name)?.ok_or_else(|| EngineError::not_found("LaunchTemplate", name));
    }
    Err(EngineError::MissingParameter("LaunchTemplateId or LaunchTemplateName".to_string()))
}

pub fn create_launch_template<R: RngSource>(
    store: &ResourceStore,
    ids: &IdAllocator<R>,
    req: &CreateLaunchTemplateRequest,
) -> EngineResult<LaunchTemplateView> {
    if find_by_name(store, &req.launch_template_name)?.is_some() {
        return Err(EngineError::InvalidParameterValue(format!(
            "launch template '{}' already exists",
            req.launch_template_name
        )));
    }
    let id = ids.allocate_launch_template();
    store.register_resource(ResourceKind::LaunchTemplate, &id)?;
    let create_time = now_rfc3339();
    let meta = LaunchTemplateAttrs {
        name: req.launch_template_name.clone(),
        default_version: 1,
        latest_version: 1,
        create_time: create_time.clone(),
    };
    meta.save(store, &id)?;

    let version_id = lt_version_resource_id(&id, 1);
    store.register_resource(ResourceKind::LaunchTemplateVersion, &version_id)?;
    let version = LaunchTemplateVersionAttrs {
        image_id: req.image_id.clone(),
        instance_type: req.instance_type.clone(),
        key_name: req.key_name.clone(),
        user_data: req.user_data.clone(),
        create_time,
    };
    version.save(store, &version_id)?;

    Ok(LaunchTemplateView {
        launch_template_id: id,
        launch_template_name: meta.name,
        create_time: meta.create_time,
        default_version_number: 1,
        latest_version_number: 1,
    })
}

fn resolve_source_version(meta: &LaunchTemplateAttrs, source_version: &Option<String>) -> i64 {
    match source_version.as_deref() {
        Some("$Latest") | None => meta.latest_version,
        Some("$Default") => meta.default_version,
        Some(n) => n.parse().unwrap_or(meta.latest_version),
    }
}

pub fn create_launch_template_version(
    store: &ResourceStore,
    req: &CreateLaunchTemplateVersionRequest,
) -> EngineResult<LaunchTemplateVersionView> {
    let template_id = resolve_template_id(store, &req.launch_template_id, &req.launch_template_name)?;
    let mut meta = LaunchTemplateAttrs::load(store, &template_id)?;

    let source_version_n = resolve_source_version(&meta, &req.source_version);
    let source = LaunchTemplateVersionAttrs::load(store, &lt_version_resource_id(&template_id, source_version_n))?;

    let next_version = meta.latest_version + 1;
    let version_id = lt_version_resource_id(&template_id, next_version);
    let create_time = now_rfc3339();
    store.register_resource(ResourceKind::LaunchTemplateVersion, &version_id)?;
    let version = LaunchTemplateVersionAttrs {
        image_id: req.image_id.clone().or(source.image_id),
        instance_type: req.instance_type.clone().or(source.instance_type),
        key_name: req.key_name.clone().or(source.key_name),
        user_data: req.user_data.clone().or(source.user_data),
        create_time,
    };
    version.save(store, &version_id)?;

    meta.latest_version = next_version;
    meta.save(store, &template_id)?;

    Ok(LaunchTemplateVersionView {
        launch_template_id: template_id.clone(),
        launch_template_name: meta.name,
        version_number: next_version,
        is_default_version: next_version == meta.default_version,
        create_time: version.create_time,
        image_id: version.image_id,
        instance_type: version.instance_type,
        key_name: version.key_name,
    })
}

/// Resolves `$Default` / `$Latest` / an explicit version number against a
/// template, returning the data to apply plus the concrete version number
/// actually used.
pub fn resolve_launch_template(
    store: &ResourceStore,
    spec: &LaunchTemplateSpec,
) -> EngineResult<(String, i64, ResolvedLaunchTemplate)> {
    let template_id = resolve_template_id(store, &spec.id, &spec.name)?;
    let meta = LaunchTemplateAttrs::load(store, &template_id)?;
    let version_n = match spec.version.as_deref() {
        Some("$Latest") | None => meta.latest_version,
        Some("$Default") => meta.default_version,
        Some(n) => n
            .parse()
            .map_err(|_| EngineError::InvalidParameterValue(format!("invalid launch template version '{n}'")))?,
    };
    let resource_id = lt_version_resource_id(&template_id, version_n);
    if !store.contains(&resource_id) {
        return Err(EngineError::InvalidParameterValue(format!(
            "launch template version {version_n} does not exist for {template_id}"
        )));
    }
    let version = LaunchTemplateVersionAttrs::load(store, &resource_id)?;
    Ok((
        template_id,
        version_n,
        ResolvedLaunchTemplate {
            image_id: version.image_id,
            instance_type: version.instance_type,
            key_name: version.key_name,
            user_data: version.user_data,
        },
    ))
}

pub fn describe_launch_templates(
    store: &ResourceStore,
    req: &DescribeLaunchTemplatesRequest,
) -> EngineResult<Vec<LaunchTemplateView>> {
    let mut out = Vec::new();
    for id in store.registered_resources(ResourceKind::LaunchTemplate) {
        let meta = LaunchTemplateAttrs::load(store, &id)?;
        if !req.launch_template_ids.is_empty() && !req.launch_template_ids.contains(&id) {
            continue;
        }
        if !req.launch_template_names.is_empty() && !req.launch_template_names.contains(&meta.name) {
            continue;
        }
        out.push(LaunchTemplateView {
            launch_template_id: id,
            launch_template_name: meta.name,
            create_time: meta.create_time,
            default_version_number: meta.default_version,
            latest_version_number: meta.latest_version,
        });
    }
    out.sort_by(|a, b| a.launch_template_id.cmp(&b.launch_template_id));
    Ok(out)
}

pub fn describe_launch_template_versions(
    store: &ResourceStore,
    req: &DescribeLaunchTemplateVersionsRequest,
) -> EngineResult<Vec<LaunchTemplateVersionView>> {
    let template_id = resolve_template_id(store, &req.launch_template_id, &req.launch_template_name)?;
    let meta = LaunchTemplateAttrs::load(store, &template_id)?;
    let wanted: Vec<i64> = if req.versions.is_empty() {
        (1..=meta.latest_version).collect()
    } else {
        req.versions.iter().filter_map(|v| v.parse().ok()).collect()
    };
    let mut out = Vec::new();
    for n in wanted {
        let resource_id = lt_version_resource_id(&template_id, n);
        if !store.contains(&resource_id) {
            continue;
        }
        let version = LaunchTemplateVersionAttrs::load(store, &resource_id)?;
        out.push(LaunchTemplateVersionView {
            launch_template_id: template_id.clone(),
            launch_template_name: meta.name.clone(),
            version_number: n,
            is_default_version: n == meta.default_version,
            create_time: version.create_time,
            image_id: version.image_id,
            instance_type: version.instance_type,
            key_name: version.key_name,
        });
    }
    Ok(out)
}

pub fn delete_launch_template(
    store: &ResourceStore,
    req: &DeleteLaunchTemplateRequest,
) -> EngineResult<LaunchTemplateView> {
    let template_id = resolve_template_id(store, &req.launch_template_id, &req.launch_template_name)?;
    let meta = LaunchTemplateAttrs::load(store, &template_id)?;
    for n in 1..=meta.latest_version {
        let resource_id = lt_version_resource_id(&template_id, n);
        if store.contains(&resource_id) {
            store.remove_resource(&resource_id)?;
        }
    }
    store.remove_resource(&template_id)?;
    Ok(LaunchTemplateView {
        launch_template_id: template_id,
        launch_template_name: meta.name,
        create_time: meta.create_time,
        default_version_number: meta.default_version,
        latest_version_number: meta.latest_version,
    })
}

pub fn delete_launch_template_versions(
    store: &ResourceStore,
    req: &DeleteLaunchTemplateVersionsRequest,
) -> EngineResult<Vec<i64>> {
    let template_id = resolve_template_id(store, &req.launch_template_id, &req.launch_template_name)?;
    let meta = LaunchTemplateAttrs::load(store, &template_id)?;
    let mut deleted = Vec::new();
    for v in &req.versions {
        let Ok(n) = v.parse::<i64>() else { continue };
        if n == meta.default_version {
            continue;
        }
        let resource_id = lt_version_resource_id(&template_id, n);
        if store.contains(&resource_id) {
            store.remove_resource(&resource_id)?;
            deleted.push(n);
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dc2_ids::SequentialRng;

    fn new_store() -> (ResourceStore, IdAllocator<SequentialRng>) {
        (ResourceStore::new(), IdAllocator::new(SequentialRng::new(1)))
    }

    #[test]
    fn create_then_version_then_resolve_default() {
        let (store, ids) = new_store();
        let req = CreateLaunchTemplateRequest {
            launch_template_name: "web".to_string(),
            image_id: Some("ami-1".to_string()),
            instance_type: Some("t3.micro".to_string()),
            key_name: None,
            user_data: None,
        };
        let lt = create_launch_template(&store, &ids, &req).unwrap();
        assert_eq!(lt.default_version_number, 1);

        let v2_req = CreateLaunchTemplateVersionRequest {
            launch_template_id: Some(lt.launch_template_id.clone()),
            launch_template_name: None,
            source_version: Some("$Latest".to_string()),
            image_id: Some("ami-2".to_string()),
            instance_type: None,
            key_name: None,
            user_data: None,
        };
        let v2 = create_launch_template_version(&store, &v2_req).unwrap();
        assert_eq!(v2.version_number, 2);
        assert_eq!(v2.instance_type.as_deref(), Some("t3.micro"));

        let spec = LaunchTemplateSpec {
            id: Some(lt.launch_template_id.clone()),
            name: None,
            version: Some("$Default".to_string()),
        };
        let (_, n, resolved) = resolve_launch_template(&store, &spec).unwrap();
        assert_eq!(n, 1);
        assert_eq!(resolved.image_id.as_deref(), Some("ami-1"));
    }

    #[test]
    fn explicit_bad_version_is_invalid_parameter() {
        let (store, ids) = new_store();
        let req = CreateLaunchTemplateRequest {
            launch_template_name: "web".to_string(),
            image_id: Some("ami-1".to_string()),
            instance_type: None,
            key_name: None,
            user_data: None,
        };
        let lt = create_launch_template(&store, &ids, &req).unwrap();
        let spec = LaunchTemplateSpec { id: Some(lt.launch_template_id), name: None, version: Some("7".to_string()) };
        assert!(resolve_launch_template(&store, &spec).is_err());
    }
}
