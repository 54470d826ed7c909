//! axum router serving the EC2-compatible metadata paths over the
//! link-local endpoint. Which instance is asking is, in the real system,
//! implicit in which container's network namespace the request arrived
//! from; since that per-container network plumbing is out of scope here
//! (`spec.md` §1), the router resolves the asking instance from an
//! `X-Dc2-Instance-Id` header, which the container executor is responsible
//! for arranging to be present (e.g. injected by the real per-container
//! proxy sidecar).

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::Router;

use crate::InMemoryImdsProxy;

const INSTANCE_HEADER: &str = "x-dc2-instance-id";
const TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";
const TOKEN_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";

#[derive(Clone)]
pub struct ImdsRouterState {
    pub proxy: InMemoryImdsProxy,
}

pub fn imds_router(state: ImdsRouterState) -> Router {
    Router::new()
        .route("/latest/api/token", put(put_token))
        .route("/latest/meta-data/instance-id", get(meta_instance_id))
        .route("/latest/meta-data/hostname", get(meta_hostname))
        .route("/latest/meta-data/local-ipv4", get(meta_local_ipv4))
        .route("/latest/meta-data/public-ipv4", get(meta_public_ipv4))
        .route("/latest/meta-data/mac", get(meta_mac))
        .route("/latest/meta-data/ami-id", get(meta_ami_id))
        .route("/latest/meta-data/instance-type", get(meta_instance_type))
        .route("/latest/meta-data/placement/availability-zone", get(meta_az))
        .route("/latest/meta-data/tags/instance", get(meta_tag_keys))
        .route("/latest/meta-data/tags/instance/{key}", get(meta_tag_value))
        .route("/latest/meta-data/spot/instance-action", get(meta_spot_action))
        .route("/latest/meta-data/spot/termination-time", get(meta_spot_termination_time))
        .route("/latest/user-data", get(user_data))
        .with_state(state)
}

fn requesting_instance(headers: &HeaderMap) -> Option<String> {
    headers.get(INSTANCE_HEADER)?.to_str().ok().map(str::to_string)
}

async fn put_token(State(state): State<ImdsRouterState>, headers: HeaderMap) -> Response {
    let Some(instance_id) = requesting_instance(&headers) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(ttl) = headers
        .get(TOKEN_TTL_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    else {
        return (StatusCode::BAD_REQUEST, "missing token TTL header").into_response();
    };
    match state.proxy.issue_token(&instance_id, ttl) {
        Some(token) => token.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Every read path funnels through this: resolves the instance, checks the
/// token, checks metadata is enabled, and hands the caller the identity.
fn authorize(
    state: &ImdsRouterState,
    headers: &HeaderMap,
) -> Result<crate::InstanceIdentity, StatusCode> {
    let instance_id = requesting_instance(headers).ok_or(StatusCode::NOT_FOUND)?;
    let token = headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let token_instance = state.proxy.validate_token(token).ok_or(StatusCode::UNAUTHORIZED)?;
    if token_instance != instance_id {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let (identity, enabled, _, _) = state
        .proxy
        .snapshot(&instance_id)
        .ok_or(StatusCode::NOT_FOUND)?;
    if !enabled {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(identity)
}

async fn meta_instance_id(State(state): State<ImdsRouterState>, headers: HeaderMap) -> Response {
    match authorize(&state, &headers) {
        Ok(identity) => identity.instance_id.into_response(),
        Err(code) => code.into_response(),
    }
}

async fn meta_hostname(State(state): State<ImdsRouterState>, headers: HeaderMap) -> Response {
    match authorize(&state, &headers) {
        Ok(identity) => identity.hostname.into_response(),
        Err(code) => code.into_response(),
    }
}

async fn meta_local_ipv4(State(state): State<ImdsRouterState>, headers: HeaderMap) -> Response {
    match authorize(&state, &headers) {
        Ok(identity) => identity.local_ipv4.into_response(),
        Err(code) => code.into_response(),
    }
}

async fn meta_public_ipv4(State(state): State<ImdsRouterState>, headers: HeaderMap) -> Response {
    match authorize(&state, &headers) {
        Ok(identity) => match identity.public_ipv4 {
            Some(ip) => ip.into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        },
        Err(code) => code.into_response(),
    }
}

async fn meta_mac(State(state): State<ImdsRouterState>, headers: HeaderMap) -> Response {
    match authorize(&state, &headers) {
        Ok(identity) => identity.mac.into_response(),
        Err(code) => code.into_response(),
    }
}

async fn meta_ami_id(State(state): State<ImdsRouterState>, headers: HeaderMap) -> Response {
    match authorize(&state, &headers) {
        Ok(identity) => identity.ami_id.into_response(),
        Err(code) => code.into_response(),
    }
}

async fn meta_instance_type(State(state): State<ImdsRouterState>, headers: HeaderMap) -> Response {
    match authorize(&state, &headers) {
        Ok(identity) => identity.instance_type.into_response(),
        Err(code) => code.into_response(),
    }
}

async fn meta_az(State(state): State<ImdsRouterState>, headers: HeaderMap) -> Response {
    match authorize(&state, &headers) {
        Ok(identity) => identity.availability_zone.into_response(),
        Err(code) => code.into_response(),
    }
}

async fn meta_tag_keys(State(state): State<ImdsRouterState>, headers: HeaderMap) -> Response {
    match authorize(&state, &headers) {
        Ok(identity) => identity.tags.keys().cloned().collect::<Vec<_>>().join("\n").into_response(),
        Err(code) => code.into_response(),
    }
}

async fn meta_tag_value(
    State(state): State<ImdsRouterState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Response {
    match authorize(&state, &headers) {
        Ok(identity) => match identity.tags.get(&key) {
            Some(value) => value.clone().into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        },
        Err(code) => code.into_response(),
    }
}

async fn user_data(State(state): State<ImdsRouterState>, headers: HeaderMap) -> Response {
    match authorize(&state, &headers) {
        Ok(identity) => match identity.user_data {
            Some(data) => data.into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        },
        Err(code) => code.into_response(),
    }
}

async fn meta_spot_action(State(state): State<ImdsRouterState>, headers: HeaderMap) -> Response {
    let identity = match authorize(&state, &headers) {
        Ok(identity) => identity,
        Err(code) => return code.into_response(),
    };
    let Some((_, _, _, spot_action)) = state.proxy.snapshot(&identity.instance_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match spot_action {
        Some(action) => serde_json::json!({"action": action.action, "time": action.time}).to_string().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn meta_spot_termination_time(State(state): State<ImdsRouterState>, headers: HeaderMap) -> Response {
    let identity = match authorize(&state, &headers) {
        Ok(identity) => identity,
        Err(code) => return code.into_response(),
    };
    let Some((_, _, _, spot_action)) = state.proxy.snapshot(&identity.instance_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match spot_action {
        Some(action) => action.time.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ImdsProxy, InstanceIdentity};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn token_for(router: &Router, instance_id: &str) -> String {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/latest/api/token")
                    .header(INSTANCE_HEADER, instance_id)
                    .header(TOKEN_TTL_HEADER, "21600")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let proxy = InMemoryImdsProxy::new();
        proxy
            .register_instance(InstanceIdentity { instance_id: "i-1".into(), ..Default::default() })
            .await;
        let router = imds_router(ImdsRouterState { proxy });
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/latest/meta-data/instance-id")
                    .header(INSTANCE_HEADER, "i-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_token_reads_identity() {
        let proxy = InMemoryImdsProxy::new();
        proxy
            .register_instance(InstanceIdentity {
                instance_id: "i-1".into(),
                hostname: "ip-10-0-0-1.ec2.internal".into(),
                ..Default::default()
            })
            .await;
        let router = imds_router(ImdsRouterState { proxy });
        let token = token_for(&router, "i-1").await;
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/latest/meta-data/hostname")
                    .header(INSTANCE_HEADER, "i-1")
                    .header(TOKEN_HEADER, token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ip-10-0-0-1.ec2.internal");
    }

    #[tokio::test]
    async fn disabling_metadata_returns_not_found() {
        let proxy = InMemoryImdsProxy::new();
        proxy
            .register_instance(InstanceIdentity { instance_id: "i-1".into(), ..Default::default() })
            .await;
        let router = imds_router(ImdsRouterState { proxy: proxy.clone() });
        let token = token_for(&router, "i-1").await;
        proxy.set_metadata_enabled("i-1", false).await;
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/latest/meta-data/instance-id")
                    .header(INSTANCE_HEADER, "i-1")
                    .header(TOKEN_HEADER, token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
