/// Tracked product endpoints
///
/// Every query is scoped to the authenticated user, so another user's product
/// is indistinguishable from a missing one (404).
///
/// # Endpoints
///
/// - `GET /api/products` - List products with history and stats
/// - `POST /api/products` - Start tracking a URL
/// - `GET /api/products/:id` - One product with history, stats and analytics
/// - `PATCH /api/products/:id` - Change target price and/or title
/// - `DELETE /api/products/:id` - Stop tracking
/// - `POST /api/products/:id/refresh` - Scrape the price now
/// - `GET /api/products/:id/history?days=30` - Recent price history

use crate::{
    app::AppState,
    error::{ApiError, ApiResult, AppJson, AppQuery},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use pricewatch_shared::{
    auth::middleware::AuthContext,
    models::{
        price_history::{PriceHistory, PricePoint},
        product::{CreateProduct, Product, UpdateProduct},
    },
    stats::{self, ProductAnalytics, ProductStats},
    tracking,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Title used when none is given and none could be scraped
const DEFAULT_TITLE: &str = "Product";

/// Default window for the history endpoint
const DEFAULT_HISTORY_DAYS: i64 = 30;

/// Create product request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(url(message = "Please provide a valid URL"))]
    pub url: String,

    #[validate(range(min = 0.0, message = "Target price must be a positive number"))]
    pub target_price: f64,

    #[validate(length(max = 500, message = "Title must be at most 500 characters"))]
    pub title: Option<String>,

    #[validate(url(message = "Image URL must be a valid URL"))]
    pub image_url: Option<String>,

    /// Skips the initial scrape when present
    #[validate(range(min = 0.0, message = "Current price must be a positive number"))]
    pub current_price: Option<f64>,
}

/// Update product request; other fields are ignored
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(range(min = 0.0, message = "Target price must be a positive number"))]
    pub target_price: Option<f64>,

    #[validate(length(min = 1, max = 500, message = "Title must be between 1 and 500 characters"))]
    pub title: Option<String>,
}

impl UpdateProductRequest {
    /// Trims the title so whitespace-only titles fail validation
    fn trimmed(self) -> Self {
        Self {
            title: self.title.map(|t| t.trim().to_string()),
            ..self
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct HistoryQuery {
    #[validate(range(min = 1, max = 3650, message = "Days must be between 1 and 3650"))]
    pub days: Option<i64>,
}

/// Product with its history and derived figures
#[derive(Debug, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,

    pub price_history: Vec<PricePoint>,

    pub stats: ProductStats,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics: Option<ProductAnalytics>,
}

impl ProductView {
    fn new(product: Product, price_history: Vec<PricePoint>) -> Self {
        let stats = stats::product_stats(
            product.current_price,
            product.target_price,
            &price_history,
            product.created_at,
            Utc::now(),
        );

        Self {
            product,
            price_history,
            stats,
            analytics: None,
        }
    }

    fn with_analytics(mut self) -> Self {
        self.analytics = Some(stats::product_analytics(
            self.product.current_price,
            self.product.target_price,
            &self.price_history,
        ));
        self
    }
}

/// `{status: "success", data}` envelope
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub status: &'static str,
    pub data: T,
}

impl<T> DataResponse<T> {
    fn success(data: T) -> Json<Self> {
        Json(Self {
            status: "success",
            data,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub status: &'static str,
    pub results: usize,
    pub data: Vec<ProductView>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub product: ProductView,
    pub message: String,
    /// None when the page could not be scraped
    pub new_price: Option<f64>,
    pub price_changed: bool,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub product_id: Uuid,
    pub title: String,
    pub current_price: f64,
    pub target_price: f64,
    pub price_history: Vec<PricePoint>,
    pub period: String,
}

fn not_found() -> ApiError {
    ApiError::NotFound("Product not found".to_string())
}

/// Malformed IDs are reported like unknown ones
fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| not_found())
}

async fn load_owned(state: &AppState, auth: &AuthContext, raw_id: &str) -> ApiResult<Product> {
    let id = parse_id(raw_id)?;
    Product::find_for_user(&state.db, id, auth.user_id)
        .await?
        .ok_or_else(not_found)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Lists the user's products, newest first
pub async fn list_products(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ListResponse>> {
    let products = Product::list_for_user(&state.db, auth.user_id).await?;
    let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
    let mut histories = PriceHistory::list_for_products(&state.db, &ids).await?;

    let data: Vec<ProductView> = products
        .into_iter()
        .map(|product| {
            let history = histories.remove(&product.id).unwrap_or_default();
            ProductView::new(product, history)
        })
        .collect();

    Ok(Json(ListResponse {
        status: "success",
        results: data.len(),
        data,
    }))
}

/// Starts tracking a product
///
/// When `current_price` is omitted the page is scraped first. A failed
/// scrape is not an error: the product is stored with price 0 and picked up
/// by the next worker run.
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed, or the URL is already tracked
pub async fn create_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppJson(req): AppJson<CreateProductRequest>,
) -> ApiResult<(StatusCode, Json<DataResponse<ProductView>>)> {
    req.validate()?;

    let url = req.url.trim().to_string();

    if Product::exists_for_user(&state.db, auth.user_id, &url).await? {
        return Err(ApiError::BadRequest("Product already being tracked".to_string()));
    }

    let mut title = non_empty(req.title);
    let mut image_url = non_empty(req.image_url);

    let current_price = match req.current_price {
        Some(price) => price,
        None => match state.scraper.scrape(&url).await {
            Some(scraped) => {
                title = title.or_else(|| non_empty(scraped.title));
                image_url = image_url.or_else(|| non_empty(scraped.image_url));
                scraped.price
            }
            None => 0.0,
        },
    };

    let product = Product::create(
        &state.db,
        CreateProduct {
            user_id: auth.user_id,
            url,
            title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            image_url,
            current_price,
            target_price: req.target_price,
        },
    )
    .await?;

    tracing::info!(
        product_id = %product.id,
        user_id = %auth.user_id,
        current_price = product.current_price,
        "Product tracked"
    );

    let history = PriceHistory::list_for_product(&state.db, product.id).await?;

    Ok((
        StatusCode::CREATED,
        DataResponse::success(ProductView::new(product, history)),
    ))
}

/// One product with analytics
///
/// # Errors
///
/// - `404 Not Found`: Unknown product or owned by someone else
pub async fn get_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<DataResponse<ProductView>>> {
    let product = load_owned(&state, &auth, &id).await?;
    let history = PriceHistory::list_for_product(&state.db, product.id).await?;

    Ok(DataResponse::success(
        ProductView::new(product, history).with_analytics(),
    ))
}

/// Changes target price and/or title
pub async fn update_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateProductRequest>,
) -> ApiResult<Json<DataResponse<ProductView>>> {
    let req = req.trimmed();
    req.validate()?;
    let id = parse_id(&id)?;

    let changes = UpdateProduct {
        target_price: req.target_price,
        title: req.title,
    };

    let product = Product::update(&state.db, id, auth.user_id, changes)
        .await?
        .ok_or_else(not_found)?;
    let history = PriceHistory::list_for_product(&state.db, product.id).await?;

    Ok(DataResponse::success(ProductView::new(product, history)))
}

/// Stops tracking a product (history is deleted with it)
pub async fn delete_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;

    if !Product::delete_for_user(&state.db, id, auth.user_id).await? {
        return Err(not_found());
    }

    tracing::info!(product_id = %id, user_id = %auth.user_id, "Product deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Scrapes a product now
///
/// A page that cannot be scraped leaves the product unchanged and answers
/// 200 with `new_price: null`.
pub async fn refresh_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<RefreshResponse>> {
    let product = load_owned(&state, &auth, &id).await?;

    let Some(scraped) = state.scraper.scrape(&product.url).await else {
        let history = PriceHistory::list_for_product(&state.db, product.id).await?;
        return Ok(Json(RefreshResponse {
            product: ProductView::new(product, history),
            message: "Could not fetch the current price".to_string(),
            new_price: None,
            price_changed: false,
        }));
    };

    let (updated, plan) = tracking::apply_scrape(&state.db, &product, &scraped)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => not_found(),
            other => other.into(),
        })?;

    tracking::alert_if_due(&state.db, state.notifier.as_ref(), &updated, &plan).await?;

    let message = if plan.price_changed {
        "Price updated"
    } else {
        "Price unchanged"
    };

    let history = PriceHistory::list_for_product(&state.db, updated.id).await?;

    Ok(Json(RefreshResponse {
        product: ProductView::new(updated, history),
        message: message.to_string(),
        new_price: Some(plan.new_price),
        price_changed: plan.price_changed,
    }))
}

/// Price history of the last `days` days (default 30)
pub async fn price_history(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    AppQuery(query): AppQuery<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    query.validate()?;
    let days = query.days.unwrap_or(DEFAULT_HISTORY_DAYS);

    let product = load_owned(&state, &auth, &id).await?;
    let history = PriceHistory::list_for_product(&state.db, product.id).await?;

    Ok(Json(HistoryResponse {
        product_id: product.id,
        title: product.title,
        current_price: product.current_price,
        target_price: product.target_price,
        price_history: stats::filter_since(&history, days, Utc::now()),
        period: format!("{} days", days),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn product() -> Product {
        let created = Utc::now() - Duration::days(3);
        Product {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            url: "https://www.amazon.com/dp/B000".to_string(),
            title: "Kettle".to_string(),
            image_url: None,
            current_price: 80.0,
            target_price: 75.0,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_parse_id_maps_garbage_to_not_found() {
        assert!(matches!(parse_id("not-a-uuid"), Err(ApiError::NotFound(_))));
        assert!(parse_id(&Uuid::new_v4().to_string()).is_ok());
    }

    #[test]
    fn test_product_view_serializes_flat() {
        let now = Utc::now();
        let history = vec![
            PricePoint { price: 100.0, date: now - Duration::days(2) },
            PricePoint { price: 80.0, date: now },
        ];

        let view = ProductView::new(product(), history);
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["title"], "Kettle");
        assert_eq!(json["price_history"].as_array().unwrap().len(), 2);
        assert_eq!(json["stats"]["highest_price"], 100.0);
        assert_eq!(json["stats"]["price_change"], -20.0);
        assert_eq!(json["stats"]["days_tracked"], 3);
        assert!(json.get("analytics").is_none());

        let detailed = serde_json::to_value(view.with_analytics()).unwrap();
        assert_eq!(detailed["analytics"]["total_data_points"], 2);
        assert_eq!(detailed["analytics"]["average_price"], 90.0);
    }

    #[test]
    fn test_update_request_rejects_blank_title() {
        let blank = UpdateProductRequest {
            target_price: None,
            title: Some("   ".to_string()),
        }
        .trimmed();
        let errors = blank.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("title"));

        let padded = UpdateProductRequest {
            target_price: None,
            title: Some("  Kettle ".to_string()),
        }
        .trimmed();
        assert!(padded.validate().is_ok());
        assert_eq!(padded.title.as_deref(), Some("Kettle"));
    }

    #[test]
    fn test_create_request_validation() {
        let valid = CreateProductRequest {
            url: "https://www.walmart.com/ip/123".to_string(),
            target_price: 10.0,
            title: None,
            image_url: None,
            current_price: None,
        };
        assert!(valid.validate().is_ok());

        let bad = CreateProductRequest {
            url: "not a url".to_string(),
            target_price: -1.0,
            ..valid
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("url"));
        assert!(fields.contains_key("target_price"));
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("  ".to_string())), None);
        assert_eq!(non_empty(Some(" Kettle ".to_string())), Some("Kettle".to_string()));
        assert_eq!(non_empty(None), None);
    }
}
