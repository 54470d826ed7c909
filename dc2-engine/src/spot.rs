//! Spot market resolution, spot request lifecycle, and price history
//! (`spec.md` §4.6). Reclaim timer scheduling itself lives in
//! `dispatcher.rs`, which owns the shared `TimerWheel` and the lock needed
//! to apply a reclaim's instance-state transition; this module only
//! computes the warn/reclaim offsets and manages spot request records.

use std::time::Duration;

use dc2_filter::{all_filters_match, paginate, Filter, Page};
use dc2_ids::{IdAllocator, RngSource};
use dc2_store::{ResourceKind, ResourceStore};
use dc2_wire::requests::{
    CancelSpotInstanceRequestsRequest, DescribeSpotInstanceRequestsRequest, DescribeSpotPriceHistoryRequest,
    RunInstancesRequest,
};
use dc2_wire::responses::{SpotInstanceRequestView, SpotPriceView, Tag};

use crate::attrs::SpotRequestAttrs;
use crate::error::{EngineError, EngineResult};
use crate::filters::spot_request_attribute_lookup;
use crate::time::now_rfc3339;

pub const DEFAULT_INTERRUPTION_BEHAVIOR: &str = "terminate";

#[derive(Debug, Clone)]
pub struct SpotOptions {
    pub max_price: Option<String>,
    pub interruption_behavior: String,
}

/// Normalizes `InstanceMarketOptions` for `RunInstances`: market type
/// comparison is case-insensitive, anything other than on-demand/spot (or
/// spot-only fields set without `MarketType=spot`) is rejected outright.
pub fn resolve_market_options(req: &RunInstancesRequest) -> EngineResult<Option<SpotOptions>> {
    let is_spot = req.market_type.as_deref().is_some_and(|m| m.eq_ignore_ascii_case("spot"));
    let has_spot_fields = req.spot_max_price.is_some() || req.spot_interruption_behavior.is_some();
    match req.market_type.as_deref() {
        Some(m) if !m.eq_ignore_ascii_case("spot") && !m.eq_ignore_ascii_case("on-demand") => {
            Err(EngineError::InvalidParameterValue(format!("unsupported MarketType '{m}'")))
        }
        None if has_spot_fields => {
            Err(EngineError::InvalidParameterValue("SpotOptions require MarketType=spot".to_string()))
        }
        _ if !is_spot => Ok(None),
        _ => {
            if let Some(price) = &req.spot_max_price {
                let parsed: f64 = price
                    .parse()
                    .map_err(|_| EngineError::InvalidParameterValue("MaxPrice is not a number".to_string()))?;
                if parsed <= 0.0 {
                    return Err(EngineError::InvalidParameterValue("MaxPrice must be positive".to_string()));
                }
            }
            Ok(Some(SpotOptions {
                max_price: req.spot_max_price.clone(),
                interruption_behavior: req
                    .spot_interruption_behavior
                    .clone()
                    .unwrap_or_else(|| DEFAULT_INTERRUPTION_BEHAVIOR.to_string()),
            }))
        }
    }
}

pub fn create_spot_request<R: RngSource>(
    store: &ResourceStore,
    ids: &IdAllocator<R>,
    instance_id: &str,
    instance_type: &str,
    opts: &SpotOptions,
    tags: Vec<(String, String)>,
) -> EngineResult<String> {
    let id = ids.allocate_spot_request();
    store.register_resource(ResourceKind::SpotInstancesRequest, &id)?;
    let now = now_rfc3339();
    let attrs = SpotRequestAttrs {
        state: "active".to_string(),
        status_code: "fulfilled".to_string(),
        status_message: "Your Spot request is fulfilled.".to_string(),
        status_updated_at: now.clone(),
        create_time: now,
        instance_id: instance_id.to_string(),
        instance_type: instance_type.to_string(),
        request_type: "one-time".to_string(),
        interruption_behavior: opts.interruption_behavior.clone(),
        max_price: opts.max_price.clone(),
        tags: tags.into_iter().collect(),
    };
    attrs.save(store, &id)?;
    Ok(id)
}

/// Transitions a still-active spot request to `closed` with the given
/// status code, used when its instance is terminated (whether by the user
/// or by a reclaim).
pub fn close_spot_request(store: &ResourceStore, spot_request_id: &str, status_code: &str) -> EngineResult<()> {
    let mut attrs = SpotRequestAttrs::load(store, spot_request_id)?;
    attrs.state = "closed".to_string();
    attrs.status_code = status_code.to_string();
    attrs.status_updated_at = now_rfc3339();
    attrs.save(store, spot_request_id)
}

pub fn cancel_spot_instance_requests(
    store: &ResourceStore,
    req: &CancelSpotInstanceRequestsRequest,
) -> EngineResult<Vec<(String, String)>> {
    let mut out = Vec::new();
    for id in &req.spot_instance_request_ids {
        let mut attrs = SpotRequestAttrs::load(store, id)?;
        if attrs.state == "active" {
            attrs.state = "cancelled".to_string();
            attrs.status_code = if attrs.instance_id.is_empty() {
                "canceled-before-fulfillment".to_string()
            } else {
                "request-canceled-and-instance-running".to_string()
            };
            attrs.status_updated_at = now_rfc3339();
            attrs.save(store, id)?;
        }
        out.push((id.clone(), attrs.state));
    }
    Ok(out)
}

fn to_view(id: &str, attrs: &SpotRequestAttrs) -> SpotInstanceRequestView {
    SpotInstanceRequestView {
        spot_instance_request_id: id.to_string(),
        spot_instance_type: attrs.request_type.clone(),
        state: attrs.state.clone(),
        status_code: attrs.status_code.clone(),
        status_message: attrs.status_message.clone(),
        create_time: attrs.create_time.clone(),
        instance_id: Some(attrs.instance_id.clone()).filter(|s| !s.is_empty()),
        instance_type: attrs.instance_type.clone(),
        max_price: attrs.max_price.clone(),
        interruption_behavior: attrs.interruption_behavior.clone(),
        tags: attrs.tags.iter().map(|(k, v)| Tag { key: k.clone(), value: v.clone() }).collect(),
    }
}

pub fn describe_spot_instance_requests(
    store: &ResourceStore,
    req: &DescribeSpotInstanceRequestsRequest,
) -> EngineResult<Page<SpotInstanceRequestView>> {
    let filters: Vec<Filter> =
        req.filters.iter().map(|f| Filter { name: f.name.clone(), values: f.values.clone() }).collect();
    let mut ids = store.registered_resources(ResourceKind::SpotInstancesRequest);
    ids.sort();
    let mut matched = Vec::new();
    for id in ids {
        if !req.spot_instance_request_ids.is_empty() && !req.spot_instance_request_ids.contains(&id) {
            continue;
        }
        let attrs = SpotRequestAttrs::load(store, &id)?;
        if !all_filters_match(&filters, &attrs.tags, spot_request_attribute_lookup(&attrs))? {
            continue;
        }
        matched.push(to_view(&id, &attrs));
    }
    let max_results = req.max_results.unwrap_or(1000) as usize;
    paginate(&matched, max_results, req.next_token.as_deref()).map_err(EngineError::from)
}

/// Synthetic, deterministic spot price derived from the instance type
/// string: there is no real market to observe, but callers (and the
/// end-to-end scenario tests) need a stable, plausible-looking number.
fn synthetic_price(instance_type: &str) -> String {
    let hash: u32 = instance_type.bytes().fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
    let cents = 1 + (hash % 4000);
    format!("0.{cents:04}")
}

pub fn describe_spot_price_history(req: &DescribeSpotPriceHistoryRequest) -> Vec<SpotPriceView> {
    let now = now_rfc3339();
    req.instance_types
        .iter()
        .map(|t| SpotPriceView { instance_type: t.clone(), spot_price: synthetic_price(t), timestamp: now.clone() })
        .collect()
}

/// `warnAt = reclaimAt - notice`, clamped to `[0, after]` (`spec.md` §4.6):
/// a notice longer than the reclaim delay itself still warns immediately
/// rather than before the request was even created.
pub fn warn_delay(after: Duration, notice: Duration) -> Duration {
    after.saturating_sub(notice.min(after))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warn_delay_clamps_to_after() {
        assert_eq!(warn_delay(Duration::from_secs(10), Duration::from_secs(3)), Duration::from_secs(7));
        assert_eq!(warn_delay(Duration::from_secs(2), Duration::from_secs(5)), Duration::from_secs(0));
    }

    #[test]
    fn market_resolution_rejects_non_positive_price() {
        let req = RunInstancesRequest {
            image_id: None,
            instance_type: None,
            min_count: 1,
            max_count: 1,
            key_name: None,
            user_data: None,
            availability_zone: None,
            tag_specifications: vec![],
            market_type: Some("spot".to_string()),
            spot_max_price: Some("0".to_string()),
            spot_interruption_behavior: None,
            launch_template: None,
            block_device_mappings: vec![],
            dry_run: false,
        };
        assert!(resolve_market_options(&req).is_err());
    }

    #[test]
    fn market_resolution_defaults_interruption_behavior_to_terminate() {
        let req = RunInstancesRequest {
            image_id: None,
            instance_type: None,
            min_count: 1,
            max_count: 1,
            key_name: None,
            user_data: None,
            availability_zone: None,
            tag_specifications: vec![],
            market_type: Some("Spot".to_string()),
            spot_max_price: None,
            spot_interruption_behavior: None,
            launch_template: None,
            block_device_mappings: vec![],
            dry_run: false,
        };
        let opts = resolve_market_options(&req).unwrap().unwrap();
        assert_eq!(opts.interruption_behavior, "terminate");
    }

    #[test]
    fn cancel_reports_instance_running_when_linked() {
        let store = ResourceStore::new();
        let id = create_spot_request(
            &store,
            &IdAllocator::new(dc2_ids::SequentialRng::new(1)),
            "i-0123456789abcdef0",
            "t3.micro",
            &SpotOptions { max_price: None, interruption_behavior: "terminate".to_string() },
            vec![],
        )
        .unwrap();

        let req = CancelSpotInstanceRequestsRequest { spot_instance_request_ids: vec![id.clone()] };
        let out = cancel_spot_instance_requests(&store, &req).unwrap();

        assert_eq!(out, vec![(id.clone(), "cancelled".to_string())]);
        let attrs = SpotRequestAttrs::load(&store, &id).unwrap();
        assert_eq!(attrs.status_code, "request-canceled-and-instance-running");
    }

    #[test]
    fn cancel_reports_before_fulfillment_when_no_instance_linked() {
        let store = ResourceStore::new();
        let id = create_spot_request(
            &store,
            &IdAllocator::new(dc2_ids::SequentialRng::new(1)),
            "",
            "t3.micro",
            &SpotOptions { max_price: None, interruption_behavior: "terminate".to_string() },
            vec![],
        )
        .unwrap();

        let req = CancelSpotInstanceRequestsRequest { spot_instance_request_ids: vec![id.clone()] };
        cancel_spot_instance_requests(&store, &req).unwrap();

        let attrs = SpotRequestAttrs::load(&store, &id).unwrap();
        assert_eq!(attrs.status_code, "canceled-before-fulfillment");
    }
}
