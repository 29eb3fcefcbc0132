use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use agristock_core::TenantId;

use crate::app::errors::json_error;
use crate::context::TenantContext;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// Resolve `X-Tenant-Id` into a [`TenantContext`] request extension.
pub async fn tenant_middleware(mut req: Request<Body>, next: Next) -> Result<Response, Response> {
    let tenant_id = extract_tenant(req.headers())?;
    req.extensions_mut().insert(TenantContext::new(tenant_id));
    Ok(next.run(req).await)
}

fn extract_tenant(headers: &HeaderMap) -> Result<TenantId, Response> {
    let header = headers.get(TENANT_HEADER).ok_or_else(|| {
        json_error(
            StatusCode::BAD_REQUEST,
            "missing_tenant",
            "X-Tenant-Id header is required",
        )
    })?;

    header
        .to_str()
        .ok()
        .map(str::trim)
        .and_then(|raw| raw.parse::<TenantId>().ok())
        .ok_or_else(|| {
            json_error(
                StatusCode::BAD_REQUEST,
                "invalid_tenant",
                "X-Tenant-Id must be a UUID",
            )
        })
}
