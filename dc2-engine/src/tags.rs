//! `CreateTags`/`DeleteTags`: the only two actions that act on an arbitrary
//! resource id rather than one resource kind (`spec.md` §6). Both ride on
//! the generic `tag:`-prefixed attribute convention in [`crate::attrs`], so
//! there is nothing resource-kind-specific here.

use dc2_store::ResourceStore;
use dc2_wire::requests::CreateTagsRequest;

use crate::attrs::{remove_tag_values, write_tags};
use crate::error::{EngineError, EngineResult};

pub fn create_tags(store: &ResourceStore, req: &CreateTagsRequest) -> EngineResult<()> {
    for id in &req.resource_ids {
        if !store.contains(id) {
            return Err(EngineError::not_found("Resource", id));
        }
        write_tags(store, id, &req.tags)?;
    }
    Ok(())
}

/// Per `spec.md` §6: a tag with an empty value matches (and removes) the
/// key regardless of its current value; a non-empty value only removes an
/// exact key+value match. The store's `remove_resource_attributes` already
/// implements that distinction.
pub fn delete_tags(store: &ResourceStore, req: &CreateTagsRequest) -> EngineResult<()> {
    for id in &req.resource_ids {
        if !store.contains(id) {
            continue;
        }
        remove_tag_values(store, id, &req.tags)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dc2_store::ResourceKind;

    #[test]
    fn create_then_delete_tag_round_trip() {
        let store = ResourceStore::new();
        store.register_resource(ResourceKind::Instance, "i-1").unwrap();
        create_tags(
            &store,
            &CreateTagsRequest { resource_ids: vec!["i-1".to_string()], tags: vec![("env".to_string(), "prod".to_string())] },
        )
        .unwrap();
        assert_eq!(crate::attrs::read_tags(&store, "i-1").unwrap().get("env").map(String::as_str), Some("prod"));

        delete_tags(
            &store,
            &CreateTagsRequest { resource_ids: vec!["i-1".to_string()], tags: vec![("env".to_string(), String::new())] },
        )
        .unwrap();
        assert!(crate::attrs::read_tags(&store, "i-1").unwrap().get("env").is_none());
    }

    #[test]
    fn create_tags_on_unknown_resource_errors() {
        let store = ResourceStore::new();
        let err = create_tags(
            &store,
            &CreateTagsRequest { resource_ids: vec!["i-missing".to_string()], tags: vec![("k".to_string(), "v".to_string())] },
        );
        assert!(err.is_err());
    }
}
