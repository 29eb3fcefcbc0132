use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};

use agristock_core::BatchId;
use agristock_stock::{QualityGrade, StockKey, VegType};

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/add-stocks", post(add_stock))
        .route("/all-stocks", get(all_stocks))
        .route("/update/:stockId", put(update_stock))
        .route("/delete/:stockId", delete(delete_stock))
        .route("/remove-stock", put(remove_stock))
        .route("/get/:stockId", get(get_stock))
        .route("/totals/:vegType/:grade", get(pair_total))
        .route("/movements", get(movements))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.body_text()))
}

fn stock_id(raw: &str) -> Result<BatchId, Response> {
    raw.parse().map_err(errors::domain_error_to_response)
}

pub async fn add_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    payload: Result<Json<dto::AddStockRequest>, JsonRejection>,
) -> Response {
    let new = match body(payload).and_then(|req| req.into_new_batch().map_err(errors::domain_error_to_response)) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.add_batch(tenant.tenant_id(), new).await {
        Ok(stock) => (
            StatusCode::CREATED,
            Json(dto::StockAddedResponse {
                status: "Stock Added",
                stock,
            }),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn all_stocks(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> Response {
    match services.ledger.list_all(tenant.tenant_id()).await {
        Ok(snapshot) => Json(dto::AllStocksResponse {
            stocks: snapshot.batches,
            total_quantities: snapshot.totals,
        })
        .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let batch_id = match stock_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.get_batch(tenant.tenant_id(), batch_id).await {
        Ok(stock) => Json(stock).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn update_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    payload: Result<Json<dto::UpdateStockRequest>, JsonRejection>,
) -> Response {
    let batch_id = match stock_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let patch = match body(payload).and_then(|req| req.into_patch().map_err(errors::domain_error_to_response)) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.update_batch(tenant.tenant_id(), batch_id, patch).await {
        Ok(stock) => Json(stock).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn delete_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let batch_id = match stock_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.delete_batch(tenant.tenant_id(), batch_id).await {
        Ok(()) => Json(dto::StatusResponse {
            status: "Stock Removed",
        })
        .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn remove_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    payload: Result<Json<dto::RemoveStockRequest>, JsonRejection>,
) -> Response {
    let (key, amount) = match body(payload).and_then(|req| req.into_parts().map_err(errors::domain_error_to_response)) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.remove_quantity(tenant.tenant_id(), key, amount).await {
        Ok(depletion) => Json(dto::StockRemovedResponse {
            status: "Stock removed successfully",
            draws: depletion.draws,
        })
        .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn pair_total(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path((veg_type, grade)): Path<(String, String)>,
) -> Response {
    let key = match veg_type
        .parse::<VegType>()
        .and_then(|v| Ok(StockKey::new(v, grade.parse::<QualityGrade>()?)))
    {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.ledger.total_for(tenant.tenant_id(), key).await {
        Ok(total_quantity) => Json(dto::PairTotalResponse {
            veg_type: key.veg_type,
            quality_grade: key.quality_grade,
            total_quantity,
        })
        .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> Response {
    match services.ledger.movements(tenant.tenant_id()).await {
        Ok(movements) => Json(dto::MovementsResponse { movements }).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
