//! Frostline Commerce - storefront service for HVAC and climate equipment.

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use validator::Validate;

use frostline_commerce::domain::aggregates::{
    Address, Cart, Category, CategoryTree, LineItem, Order, OrderParts, OrderStatus, Product,
    ProductParts, ProductStatus, Review, Variant,
};
use frostline_commerce::domain::events::{DomainEvent, OrderEvent};
use frostline_commerce::domain::value_objects::{Money, Quantity, Sku};

const DEFAULT_CURRENCY: &str = "USD";

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub nats: Option<async_nats::Client>,
}

type ApiError = (StatusCode, String);

fn internal(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn bad_request(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::BAD_REQUEST, e.to_string())
}

fn not_found(what: &str) -> ApiError {
    (StatusCode::NOT_FOUND, format!("{what} not found"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&std::env::var("DATABASE_URL")?)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match std::env::var("NATS_URL") {
        Ok(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!("NATS unavailable, events disabled: {e}");
                None
            }
        },
        Err(_) => None,
    };
    let state = AppState { db, nats };

    let app = Router::new()
        .route("/health", get(|| async {
            Json(serde_json::json!({"status": "healthy", "service": "frostline-commerce"}))
        }))
        .route("/api/v1/products", get(list_products).post(create_product))
        .route("/api/v1/products/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/api/v1/products/:id/stock", post(adjust_stock))
        .route("/api/v1/products/:id/reviews", get(list_reviews).post(create_review))
        .route("/api/v1/categories", get(list_categories).post(create_category))
        .route("/api/v1/categories/:id", get(get_category).put(set_category_parent))
        .route("/api/v1/cart/:session", get(get_cart).delete(clear_cart))
        .route("/api/v1/cart/:session/items", post(add_cart_item))
        .route("/api/v1/cart/:session/items/:variant_id", put(update_cart_item).delete(remove_cart_item))
        .route("/api/v1/cart/:session/claim", post(claim_cart))
        .route("/api/v1/carts/expired", delete(purge_expired_carts))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/orders", get(list_orders).post(create_order))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/status", put(update_order_status))
        .route("/api/v1/orders/:id/payment", post(record_payment))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8083".to_string());
    tracing::info!("frostline-commerce listening on 0.0.0.0:{port}");
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?, app).await?;
    Ok(())
}

async fn publish_events(state: &AppState, events: Vec<DomainEvent>) {
    let Some(nats) = &state.nats else { return };
    for event in events {
        match serde_json::to_vec(&event) {
            Ok(payload) => {
                if let Err(e) = nats.publish("frostline.commerce.events", payload.into()).await {
                    tracing::warn!("event publish failed: {e}");
                }
            }
            Err(e) => tracing::warn!("event serialization failed: {e}"),
        }
    }
}

fn order_number() -> String {
    format!("ORD-{}-{:06}", Utc::now().format("%Y"), rand::random::<u32>() % 1_000_000)
}

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, Serialize, sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    sku: String,
    name: String,
    description: String,
    price: Decimal,
    compare_at_price: Option<Decimal>,
    currency: String,
    stock: i32,
    status: String,
    category_id: Option<Uuid>,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    id: Uuid,
    sku: String,
    name: String,
    price: Decimal,
    stock: i32,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct CategoryRow {
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    parent_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            parent_id: row.parent_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    user_id: Option<Uuid>,
    session_id: Option<String>,
    currency: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct CartItemRow {
    product_id: Uuid,
    variant_id: Uuid,
    product_name: String,
    variant_name: String,
    sku: String,
    quantity: i32,
    unit_price: Decimal,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Option<Uuid>,
    customer_email: String,
    customer_phone: Option<String>,
    status: String,
    currency: String,
    subtotal: Decimal,
    shipping_cost: Decimal,
    tax_amount: Decimal,
    discount_amount: Decimal,
    total: Decimal,
    shipping_address: Option<serde_json::Value>,
    billing_address: Option<serde_json::Value>,
    shipping_method: Option<String>,
    tracking_number: Option<String>,
    payment_intent_id: Option<String>,
    payment_method: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    product_id: Uuid,
    variant_id: Uuid,
    product_name: String,
    variant_name: String,
    sku: String,
    quantity: i32,
    unit_price: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderEventRow {
    status: String,
    description: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct ReviewRow {
    id: Uuid,
    product_id: Uuid,
    user_id: Option<Uuid>,
    author_name: String,
    rating: i16,
    title: Option<String>,
    body: String,
    verified_purchase: bool,
    created_at: DateTime<Utc>,
}

fn line_item_from_row(
    product_id: Uuid,
    variant_id: Uuid,
    product_name: String,
    variant_name: String,
    sku: String,
    quantity: i32,
    unit_price: Decimal,
    currency: &str,
) -> Result<LineItem, ApiError> {
    let quantity = u32::try_from(quantity).map_err(internal)?;
    LineItem::new(
        product_id,
        variant_id,
        product_name,
        variant_name,
        sku,
        quantity,
        Money::new(unit_price, currency),
    )
    .map_err(internal)
}

// =============================================================================
// Products
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
}

async fn list_products(
    State(s): State<AppState>,
    Query(p): Query<ListParams>,
) -> Result<Json<PaginatedResponse<ProductRow>>, ApiError> {
    let page = p.page.unwrap_or(1).max(1);
    let per_page = p.per_page.unwrap_or(20).min(100);
    let status = p.status.unwrap_or_else(|| "active".to_string());
    let products = sqlx::query_as::<_, ProductRow>(
        "SELECT * FROM products WHERE status = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(&status)
    .bind(per_page as i64)
    .bind(((page - 1) * per_page) as i64)
    .fetch_all(&s.db)
    .await
    .map_err(internal)?;
    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products WHERE status = $1")
        .bind(&status)
        .fetch_one(&s.db)
        .await
        .map_err(internal)?;
    Ok(Json(PaginatedResponse { data: products, total: total.0, page }))
}

async fn load_product(db: &PgPool, id: Uuid) -> Result<Product, ApiError> {
    let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("product"))?;
    let variant_rows =
        sqlx::query_as::<_, VariantRow>("SELECT * FROM product_variants WHERE product_id = $1")
            .bind(id)
            .fetch_all(db)
            .await
            .map_err(internal)?;

    let status = ProductStatus::parse(&row.status)
        .ok_or_else(|| internal(format!("unknown product status {}", row.status)))?;
    let mut variants = Vec::with_capacity(variant_rows.len());
    for v in variant_rows {
        variants.push(Variant {
            id: v.id,
            sku: Sku::new(v.sku).map_err(internal)?,
            name: v.name,
            price: Money::new(v.price, &row.currency),
            stock: Quantity::new(u32::try_from(v.stock).map_err(internal)?),
        });
    }
    Ok(Product::from_parts(
        ProductParts {
            id: row.id,
            sku: Sku::new(row.sku).map_err(internal)?,
            name: row.name,
            description: row.description,
            price: Money::new(row.price, &row.currency),
            compare_at_price: row.compare_at_price.map(|p| Money::new(p, &row.currency)),
            stock: u32::try_from(row.stock).map_err(internal)?,
            status,
            category_id: row.category_id,
            tags: row.tags,
            created_at: row.created_at,
            updated_at: row.updated_at,
        },
        variants,
    ))
}

async fn save_product(db: &PgPool, product: &Product) -> Result<(), ApiError> {
    sqlx::query(
        "UPDATE products SET name = $2, description = $3, price = $4, compare_at_price = $5, \
         stock = $6, status = $7, category_id = $8, tags = $9, updated_at = $10 WHERE id = $1",
    )
    .bind(product.id())
    .bind(product.name())
    .bind(product.description())
    .bind(product.price().amount())
    .bind(product.compare_at_price().map(Money::amount))
    .bind(product.stock().value() as i32)
    .bind(product.status().as_str())
    .bind(product.category_id())
    .bind(product.tags().to_vec())
    .bind(product.updated_at())
    .execute(db)
    .await
    .map_err(internal)?;
    Ok(())
}

async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Product>, ApiError> {
    Ok(Json(load_product(&s.db, id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVariantRequest {
    #[validate(length(min = 1))]
    pub sku: String,
    #[validate(length(min = 1))]
    pub name: String,
    pub price: Decimal,
    pub stock: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1))]
    pub sku: String,
    #[validate(length(min = 1))]
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub category_id: Option<Uuid>,
    pub stock: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    #[validate]
    pub variants: Vec<CreateVariantRequest>,
}

async fn create_product(
    State(s): State<AppState>,
    Json(r): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    r.validate().map_err(bad_request)?;
    let sku = Sku::new(&r.sku).map_err(bad_request)?;
    let mut product =
        Product::new(sku, &r.name, Money::new(r.price, DEFAULT_CURRENCY)).map_err(bad_request)?;
    if let Some(description) = &r.description {
        product.set_description(description);
    }
    product
        .set_compare_at_price(r.compare_at_price.map(|p| Money::new(p, DEFAULT_CURRENCY)))
        .map_err(bad_request)?;
    product.set_category(r.category_id);
    for tag in &r.tags {
        product.add_tag(tag.as_str());
    }
    if let Some(stock) = r.stock {
        product.add_stock(u32::try_from(stock).map_err(bad_request)?);
    }
    for v in &r.variants {
        let sku = Sku::new(&v.sku).map_err(bad_request)?;
        let stock = u32::try_from(v.stock.unwrap_or(0)).map_err(bad_request)?;
        product
            .add_variant(sku, &v.name, Money::new(v.price, DEFAULT_CURRENCY), stock)
            .map_err(bad_request)?;
    }
    product.publish().map_err(bad_request)?;

    let mut tx = s.db.begin().await.map_err(internal)?;
    sqlx::query(
        "INSERT INTO products (id, sku, name, description, price, compare_at_price, currency, \
         stock, status, category_id, tags, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(product.id())
    .bind(product.sku().as_str())
    .bind(product.name())
    .bind(product.description())
    .bind(product.price().amount())
    .bind(product.compare_at_price().map(Money::amount))
    .bind(product.price().currency())
    .bind(product.stock().value() as i32)
    .bind(product.status().as_str())
    .bind(product.category_id())
    .bind(product.tags().to_vec())
    .bind(product.created_at())
    .bind(product.updated_at())
    .execute(&mut *tx)
    .await
    .map_err(internal)?;
    for v in product.variants() {
        sqlx::query(
            "INSERT INTO product_variants (id, product_id, sku, name, price, stock) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(v.id)
        .bind(product.id())
        .bind(v.sku.as_str())
        .bind(&v.name)
        .bind(v.price.amount())
        .bind(v.stock.value() as i32)
        .execute(&mut *tx)
        .await
        .map_err(internal)?;
    }
    tx.commit().await.map_err(internal)?;

    let events = product.take_events();
    publish_events(&s, events).await;
    Ok((StatusCode::CREATED, Json(product)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub category_id: Option<Uuid>,
}

async fn update_product(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<UpdateProductRequest>,
) -> Result<Json<Product>, ApiError> {
    r.validate().map_err(bad_request)?;
    let mut product = load_product(&s.db, id).await?;
    if let Some(price) = r.price {
        product.set_price(Money::new(price, DEFAULT_CURRENCY)).map_err(bad_request)?;
    }
    if let Some(description) = &r.description {
        product.set_description(description);
    }
    if r.category_id.is_some() {
        product.set_category(r.category_id);
    }
    if let Some(name) = &r.name {
        product.set_name(name.as_str()).map_err(bad_request)?;
    }
    save_product(&s.db, &product).await?;
    Ok(Json(product))
}

async fn delete_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    let mut product = load_product(&s.db, id).await?;
    product.archive();
    save_product(&s.db, &product).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub adjustment: i64,
}

async fn adjust_stock(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<AdjustStockRequest>,
) -> Result<Json<Product>, ApiError> {
    let mut product = load_product(&s.db, id).await?;
    if r.adjustment >= 0 {
        product.add_stock(u32::try_from(r.adjustment).map_err(bad_request)?);
    } else {
        let qty = u32::try_from(-r.adjustment).map_err(bad_request)?;
        product.remove_stock(qty).map_err(bad_request)?;
    }
    save_product(&s.db, &product).await?;
    let events = product.take_events();
    publish_events(&s, events).await;
    Ok(Json(product))
}

// =============================================================================
// Reviews
// =============================================================================

async fn list_reviews(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ReviewRow>>, ApiError> {
    let reviews = sqlx::query_as::<_, ReviewRow>(
        "SELECT * FROM reviews WHERE product_id = $1 ORDER BY created_at DESC",
    )
    .bind(id)
    .fetch_all(&s.db)
    .await
    .map_err(internal)?;
    Ok(Json(reviews))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[validate(length(min = 1))]
    pub author_name: String,
    #[validate(range(min = 1, max = 5))]
    pub rating: u8,
    pub title: Option<String>,
    #[validate(length(min = 1))]
    pub body: String,
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub verified_purchase: bool,
}

async fn create_review(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    r.validate().map_err(bad_request)?;
    // 404 before 400: the product must exist at all
    load_product(&s.db, id).await?;
    let review = Review::new(
        id,
        r.user_id,
        &r.author_name,
        r.rating,
        r.title.clone(),
        &r.body,
        r.verified_purchase,
    )
    .map_err(bad_request)?;
    sqlx::query(
        "INSERT INTO reviews (id, product_id, user_id, author_name, rating, title, body, \
         verified_purchase, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(review.id())
    .bind(review.product_id())
    .bind(review.user_id())
    .bind(review.author_name())
    .bind(review.rating() as i16)
    .bind(review.title())
    .bind(review.body())
    .bind(review.verified_purchase())
    .bind(review.created_at())
    .execute(&s.db)
    .await
    .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(review)))
}

// =============================================================================
// Categories
// =============================================================================

async fn load_category_tree(db: &PgPool) -> Result<CategoryTree, ApiError> {
    let rows = sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories")
        .fetch_all(db)
        .await
        .map_err(internal)?;
    Ok(CategoryTree::from_nodes(rows.into_iter().map(Category::from)))
}

async fn list_categories(State(s): State<AppState>) -> Result<Json<Vec<CategoryRow>>, ApiError> {
    let cats = sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories ORDER BY name")
        .fetch_all(&s.db)
        .await
        .map_err(internal)?;
    Ok(Json(cats))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1))]
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
}

async fn create_category(
    State(s): State<AppState>,
    Json(r): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    r.validate().map_err(bad_request)?;
    let mut tree = load_category_tree(&s.db).await?;
    let category =
        Category::new(&r.name, r.description.clone(), r.parent_id).map_err(bad_request)?;
    let id = tree.insert(category).map_err(bad_request)?;
    let category = tree.get(id).ok_or_else(|| internal("category vanished"))?.clone();
    sqlx::query(
        "INSERT INTO categories (id, name, slug, description, parent_id, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(category.id)
    .bind(&category.name)
    .bind(&category.slug)
    .bind(&category.description)
    .bind(category.parent_id)
    .bind(category.created_at)
    .execute(&s.db)
    .await
    .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(category)))
}

#[derive(Debug, Serialize)]
pub struct CategoryDetail {
    pub category: Category,
    pub ancestors: Vec<Category>,
    pub descendants: Vec<Category>,
}

async fn get_category(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CategoryDetail>, ApiError> {
    let tree = load_category_tree(&s.db).await?;
    let category = tree.get(id).ok_or_else(|| not_found("category"))?.clone();
    let ancestors = tree.ancestors(id).into_iter().cloned().collect();
    let descendants = tree.descendants(id).into_iter().cloned().collect();
    Ok(Json(CategoryDetail { category, ancestors, descendants }))
}

#[derive(Debug, Deserialize)]
pub struct SetCategoryParentRequest {
    pub parent_id: Option<Uuid>,
}

async fn set_category_parent(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<SetCategoryParentRequest>,
) -> Result<Json<Category>, ApiError> {
    let mut tree = load_category_tree(&s.db).await?;
    if tree.get(id).is_none() {
        return Err(not_found("category"));
    }
    tree.set_parent(id, r.parent_id).map_err(bad_request)?;
    sqlx::query("UPDATE categories SET parent_id = $2 WHERE id = $1")
        .bind(id)
        .bind(r.parent_id)
        .execute(&s.db)
        .await
        .map_err(internal)?;
    let category = tree.get(id).ok_or_else(|| internal("category vanished"))?.clone();
    Ok(Json(category))
}

// =============================================================================
// Cart
// =============================================================================

async fn load_cart(db: &PgPool, session: &str) -> Result<Option<Cart>, ApiError> {
    let Some(row) = sqlx::query_as::<_, CartRow>("SELECT * FROM carts WHERE session_id = $1")
        .bind(session)
        .fetch_optional(db)
        .await
        .map_err(internal)?
    else {
        return Ok(None);
    };
    let item_rows = sqlx::query_as::<_, CartItemRow>("SELECT * FROM cart_items WHERE cart_id = $1")
        .bind(row.id)
        .fetch_all(db)
        .await
        .map_err(internal)?;
    let mut items = Vec::with_capacity(item_rows.len());
    for i in item_rows {
        items.push(line_item_from_row(
            i.product_id,
            i.variant_id,
            i.product_name,
            i.variant_name,
            i.sku,
            i.quantity,
            i.unit_price,
            &row.currency,
        )?);
    }
    Ok(Some(Cart::from_parts(
        row.id,
        row.user_id,
        row.session_id,
        &row.currency,
        items,
        row.expires_at,
        row.created_at,
        row.updated_at,
    )))
}

async fn save_cart(db: &PgPool, cart: &Cart) -> Result<(), ApiError> {
    let mut tx = db.begin().await.map_err(internal)?;
    sqlx::query(
        "INSERT INTO carts (id, user_id, session_id, currency, expires_at, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (id) DO UPDATE SET user_id = $2, session_id = $3, expires_at = $5, updated_at = $7",
    )
    .bind(cart.id())
    .bind(cart.user_id())
    .bind(cart.session_id())
    .bind(cart.currency())
    .bind(cart.expires_at())
    .bind(cart.created_at())
    .bind(cart.updated_at())
    .execute(&mut *tx)
    .await
    .map_err(internal)?;
    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart.id())
        .execute(&mut *tx)
        .await
        .map_err(internal)?;
    for item in cart.items() {
        sqlx::query(
            "INSERT INTO cart_items (cart_id, product_id, variant_id, product_name, variant_name, \
             sku, quantity, unit_price) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(cart.id())
        .bind(item.product_id())
        .bind(item.variant_id())
        .bind(item.product_name())
        .bind(item.variant_name())
        .bind(item.sku())
        .bind(item.quantity() as i32)
        .bind(item.unit_price().amount())
        .execute(&mut *tx)
        .await
        .map_err(internal)?;
    }
    tx.commit().await.map_err(internal)?;
    Ok(())
}

async fn load_or_create_cart(db: &PgPool, session: &str) -> Result<Cart, ApiError> {
    if let Some(cart) = load_cart(db, session).await? {
        return Ok(cart);
    }
    let cart = Cart::for_session(session, DEFAULT_CURRENCY);
    save_cart(db, &cart).await?;
    Ok(cart)
}

async fn get_cart(State(s): State<AppState>, Path(session): Path<String>) -> Result<Json<Cart>, ApiError> {
    Ok(Json(load_or_create_cart(&s.db, &session).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: u32,
}

async fn add_cart_item(
    State(s): State<AppState>,
    Path(session): Path<String>,
    Json(r): Json<AddCartItemRequest>,
) -> Result<(StatusCode, Json<Cart>), ApiError> {
    r.validate().map_err(bad_request)?;
    let product = load_product(&s.db, r.product_id).await?;
    let variant = product.variant(r.variant_id).ok_or_else(|| not_found("variant"))?;

    let mut cart = load_or_create_cart(&s.db, &session).await?;
    let item = LineItem::new(
        product.id(),
        variant.id,
        product.name(),
        &variant.name,
        variant.sku.as_str(),
        r.quantity,
        variant.price.clone(),
    )
    .map_err(bad_request)?;
    cart.add_item(item).map_err(bad_request)?;
    save_cart(&s.db, &cart).await?;
    Ok((StatusCode::CREATED, Json(cart)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartItemRequest {
    pub quantity: i64,
}

async fn update_cart_item(
    State(s): State<AppState>,
    Path((session, variant_id)): Path<(String, Uuid)>,
    Json(r): Json<UpdateCartItemRequest>,
) -> Result<Json<Cart>, ApiError> {
    let mut cart = load_cart(&s.db, &session).await?.ok_or_else(|| not_found("cart"))?;
    cart.update_item_quantity(variant_id, r.quantity).map_err(bad_request)?;
    save_cart(&s.db, &cart).await?;
    Ok(Json(cart))
}

async fn remove_cart_item(
    State(s): State<AppState>,
    Path((session, variant_id)): Path<(String, Uuid)>,
) -> Result<Json<Cart>, ApiError> {
    let mut cart = load_cart(&s.db, &session).await?.ok_or_else(|| not_found("cart"))?;
    cart.remove_item(variant_id);
    save_cart(&s.db, &cart).await?;
    Ok(Json(cart))
}

async fn clear_cart(State(s): State<AppState>, Path(session): Path<String>) -> Result<StatusCode, ApiError> {
    let Some(mut cart) = load_cart(&s.db, &session).await? else {
        return Ok(StatusCode::NO_CONTENT);
    };
    cart.clear();
    save_cart(&s.db, &cart).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ClaimCartRequest {
    pub user_id: Uuid,
}

async fn claim_cart(
    State(s): State<AppState>,
    Path(session): Path<String>,
    Json(r): Json<ClaimCartRequest>,
) -> Result<Json<Cart>, ApiError> {
    let mut cart = load_cart(&s.db, &session).await?.ok_or_else(|| not_found("cart"))?;
    // fold into the user's existing cart when one is already open
    let existing = sqlx::query_as::<_, CartRow>("SELECT * FROM carts WHERE user_id = $1")
        .bind(r.user_id)
        .fetch_optional(&s.db)
        .await
        .map_err(internal)?;
    if let Some(row) = existing {
        let item_rows =
            sqlx::query_as::<_, CartItemRow>("SELECT * FROM cart_items WHERE cart_id = $1")
                .bind(row.id)
                .fetch_all(&s.db)
                .await
                .map_err(internal)?;
        let mut items = Vec::with_capacity(item_rows.len());
        for i in item_rows {
            items.push(line_item_from_row(
                i.product_id,
                i.variant_id,
                i.product_name,
                i.variant_name,
                i.sku,
                i.quantity,
                i.unit_price,
                &row.currency,
            )?);
        }
        let mut user_cart = Cart::from_parts(
            row.id,
            row.user_id,
            row.session_id,
            &row.currency,
            items,
            row.expires_at,
            row.created_at,
            row.updated_at,
        );
        let guest_id = cart.id();
        user_cart.merge(cart).map_err(bad_request)?;
        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(guest_id)
            .execute(&s.db)
            .await
            .map_err(internal)?;
        save_cart(&s.db, &user_cart).await?;
        return Ok(Json(user_cart));
    }
    cart.set_user(r.user_id);
    save_cart(&s.db, &cart).await?;
    Ok(Json(cart))
}

async fn purge_expired_carts(State(s): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let result = sqlx::query("DELETE FROM carts WHERE expires_at < NOW()")
        .execute(&s.db)
        .await
        .map_err(internal)?;
    Ok(Json(serde_json::json!({"purged": result.rows_affected()})))
}

// =============================================================================
// Orders
// =============================================================================

async fn load_order(db: &PgPool, id: Uuid) -> Result<Order, ApiError> {
    let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("order"))?;
    let item_rows = sqlx::query_as::<_, OrderItemRow>("SELECT * FROM order_items WHERE order_id = $1")
        .bind(id)
        .fetch_all(db)
        .await
        .map_err(internal)?;
    let event_rows = sqlx::query_as::<_, OrderEventRow>(
        "SELECT * FROM order_events WHERE order_id = $1 ORDER BY created_at, id",
    )
    .bind(id)
    .fetch_all(db)
    .await
    .map_err(internal)?;

    let status = OrderStatus::parse(&row.status)
        .ok_or_else(|| internal(format!("unknown order status {}", row.status)))?;
    let shipping_address = row
        .shipping_address
        .map(serde_json::from_value::<Address>)
        .transpose()
        .map_err(internal)?;
    let billing_address = row
        .billing_address
        .map(serde_json::from_value::<Address>)
        .transpose()
        .map_err(internal)?;

    let mut items = Vec::with_capacity(item_rows.len());
    for i in item_rows {
        items.push(line_item_from_row(
            i.product_id,
            i.variant_id,
            i.product_name,
            i.variant_name,
            i.sku,
            i.quantity,
            i.unit_price,
            &row.currency,
        )?);
    }
    let mut events = Vec::with_capacity(event_rows.len());
    for e in event_rows {
        let status = OrderStatus::parse(&e.status)
            .ok_or_else(|| internal(format!("unknown order status {}", e.status)))?;
        events.push(OrderEvent::from_parts(status, e.description, e.notes, e.created_at));
    }

    Ok(Order::from_parts(
        OrderParts {
            id: row.id,
            order_number: row.order_number,
            user_id: row.user_id,
            customer_email: row.customer_email,
            customer_phone: row.customer_phone,
            status,
            currency: row.currency,
            subtotal: row.subtotal,
            shipping_cost: row.shipping_cost,
            tax_amount: row.tax_amount,
            discount_amount: row.discount_amount,
            total: row.total,
            shipping_address,
            billing_address,
            shipping_method: row.shipping_method,
            tracking_number: row.tracking_number,
            payment_intent_id: row.payment_intent_id,
            payment_method: row.payment_method,
            paid_at: row.paid_at,
            shipped_at: row.shipped_at,
            delivered_at: row.delivered_at,
            cancelled_at: row.cancelled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        },
        items,
        events,
    ))
}

async fn insert_order(db: &PgPool, order: &Order) -> Result<(), ApiError> {
    let shipping_address = order
        .shipping_address()
        .map(serde_json::to_value)
        .transpose()
        .map_err(internal)?;
    let billing_address = order
        .billing_address()
        .map(serde_json::to_value)
        .transpose()
        .map_err(internal)?;
    let mut tx = db.begin().await.map_err(internal)?;
    sqlx::query(
        "INSERT INTO orders (id, order_number, user_id, customer_email, customer_phone, status, \
         currency, subtotal, shipping_cost, tax_amount, discount_amount, total, shipping_address, \
         billing_address, shipping_method, tracking_number, payment_intent_id, payment_method, \
         paid_at, shipped_at, delivered_at, cancelled_at, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
         $18, $19, $20, $21, $22, $23, $24)",
    )
    .bind(order.id())
    .bind(order.order_number())
    .bind(order.user_id())
    .bind(order.customer_email())
    .bind(order.customer_phone())
    .bind(order.status().as_str())
    .bind(order.currency())
    .bind(order.subtotal().amount())
    .bind(order.shipping_cost().amount())
    .bind(order.tax_amount().amount())
    .bind(order.discount_amount().amount())
    .bind(order.total().amount())
    .bind(shipping_address)
    .bind(billing_address)
    .bind(order.shipping_method())
    .bind(order.tracking_number())
    .bind(order.payment_intent_id())
    .bind(order.payment_method())
    .bind(order.paid_at())
    .bind(order.shipped_at())
    .bind(order.delivered_at())
    .bind(order.cancelled_at())
    .bind(order.created_at())
    .bind(order.updated_at())
    .execute(&mut *tx)
    .await
    .map_err(internal)?;
    for item in order.items() {
        sqlx::query(
            "INSERT INTO order_items (id, order_id, product_id, variant_id, product_name, \
             variant_name, sku, quantity, unit_price) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(Uuid::now_v7())
        .bind(order.id())
        .bind(item.product_id())
        .bind(item.variant_id())
        .bind(item.product_name())
        .bind(item.variant_name())
        .bind(item.sku())
        .bind(item.quantity() as i32)
        .bind(item.unit_price().amount())
        .execute(&mut *tx)
        .await
        .map_err(internal)?;
    }
    for event in order.events() {
        sqlx::query(
            "INSERT INTO order_events (id, order_id, status, description, notes, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::now_v7())
        .bind(order.id())
        .bind(event.status().as_str())
        .bind(event.description())
        .bind(event.notes())
        .bind(event.created_at())
        .execute(&mut *tx)
        .await
        .map_err(internal)?;
    }
    tx.commit().await.map_err(internal)?;
    Ok(())
}

/// Persists a status change: header columns plus the newly appended audit
/// event, atomically.
async fn save_order_status(db: &PgPool, order: &Order) -> Result<(), ApiError> {
    let mut tx = db.begin().await.map_err(internal)?;
    sqlx::query(
        "UPDATE orders SET status = $2, payment_intent_id = $3, payment_method = $4, \
         tracking_number = $5, paid_at = $6, shipped_at = $7, delivered_at = $8, \
         cancelled_at = $9, updated_at = $10 WHERE id = $1",
    )
    .bind(order.id())
    .bind(order.status().as_str())
    .bind(order.payment_intent_id())
    .bind(order.payment_method())
    .bind(order.tracking_number())
    .bind(order.paid_at())
    .bind(order.shipped_at())
    .bind(order.delivered_at())
    .bind(order.cancelled_at())
    .bind(order.updated_at())
    .execute(&mut *tx)
    .await
    .map_err(internal)?;
    if let Some(event) = order.events().last() {
        sqlx::query(
            "INSERT INTO order_events (id, order_id, status, description, notes, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::now_v7())
        .bind(order.id())
        .bind(event.status().as_str())
        .bind(event.description())
        .bind(event.notes())
        .bind(event.created_at())
        .execute(&mut *tx)
        .await
        .map_err(internal)?;
    }
    tx.commit().await.map_err(internal)?;
    Ok(())
}

fn placed_event(order: &Order) -> DomainEvent {
    DomainEvent::OrderPlaced {
        order_id: order.id(),
        order_number: order.order_number().to_string(),
        customer_email: order.customer_email().to_string(),
        total: order.total().amount(),
        currency: order.currency().to_string(),
    }
}

async fn list_orders(
    State(s): State<AppState>,
    Query(p): Query<ListParams>,
) -> Result<Json<PaginatedResponse<OrderRow>>, ApiError> {
    let page = p.page.unwrap_or(1).max(1);
    let per_page = p.per_page.unwrap_or(20).min(100);
    let orders = sqlx::query_as::<_, OrderRow>(
        "SELECT * FROM orders ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(per_page as i64)
    .bind(((page - 1) * per_page) as i64)
    .fetch_all(&s.db)
    .await
    .map_err(internal)?;
    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
        .fetch_one(&s.db)
        .await
        .map_err(internal)?;
    Ok(Json(PaginatedResponse { data: orders, total: total.0, page }))
}

async fn get_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>, ApiError> {
    Ok(Json(load_order(&s.db, id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    #[validate(length(min = 1))]
    pub product_name: String,
    #[validate(length(min = 1))]
    pub variant_name: String,
    #[validate(length(min = 1))]
    pub sku: String,
    #[validate(range(min = 1))]
    pub quantity: u32,
    pub unit_price: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(email)]
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub user_id: Option<Uuid>,
    #[validate]
    pub items: Vec<OrderItemRequest>,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub shipping_method: Option<String>,
    pub shipping_cost: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
}

fn build_order(r: &CreateOrderRequest) -> Result<Order, ApiError> {
    let mut order =
        Order::new(order_number(), &r.customer_email, DEFAULT_CURRENCY).map_err(bad_request)?;
    if let Some(user_id) = r.user_id {
        order.set_user(user_id);
    }
    if let Some(phone) = &r.customer_phone {
        order.set_customer_phone(phone);
    }
    for i in &r.items {
        let item = LineItem::new(
            i.product_id,
            i.variant_id,
            &i.product_name,
            &i.variant_name,
            &i.sku,
            i.quantity,
            Money::new(i.unit_price, DEFAULT_CURRENCY),
        )
        .map_err(bad_request)?;
        order.add_item(item).map_err(bad_request)?;
    }
    if let Some(address) = r.shipping_address.clone() {
        order.set_shipping_address(address);
    }
    if let Some(address) = r.billing_address.clone() {
        order.set_billing_address(address);
    }
    if let Some(method) = &r.shipping_method {
        order.set_shipping_method(method);
    }
    if let Some(amount) = r.shipping_cost {
        order.set_shipping_cost(amount).map_err(bad_request)?;
    }
    if let Some(amount) = r.tax_amount {
        order.set_tax_amount(amount).map_err(bad_request)?;
    }
    if let Some(amount) = r.discount_amount {
        order.set_discount_amount(amount).map_err(bad_request)?;
    }
    Ok(order)
}

async fn create_order(
    State(s): State<AppState>,
    Json(r): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    r.validate().map_err(bad_request)?;
    if r.items.is_empty() {
        return Err(bad_request("items: must not be empty"));
    }
    let mut order = build_order(&r)?;
    insert_order(&s.db, &order).await?;
    let mut events = vec![placed_event(&order)];
    events.extend(order.take_events());
    publish_events(&s, events).await;
    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1))]
    pub session_id: String,
    #[validate(email)]
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub user_id: Option<Uuid>,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub shipping_method: Option<String>,
    pub shipping_cost: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
}

async fn checkout(
    State(s): State<AppState>,
    Json(r): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    r.validate().map_err(bad_request)?;
    let mut cart =
        load_cart(&s.db, &r.session_id).await?.ok_or_else(|| not_found("cart"))?;
    if cart.is_empty() {
        return Err(bad_request("cart is empty"));
    }

    let mut order =
        Order::new(order_number(), &r.customer_email, cart.currency()).map_err(bad_request)?;
    if let Some(user_id) = r.user_id.or(cart.user_id()) {
        order.set_user(user_id);
    }
    if let Some(phone) = &r.customer_phone {
        order.set_customer_phone(phone);
    }
    for item in cart.items() {
        order.add_item(item.clone()).map_err(bad_request)?;
    }
    order.set_shipping_address(r.shipping_address.clone());
    if let Some(address) = r.billing_address.clone() {
        order.set_billing_address(address);
    }
    if let Some(method) = &r.shipping_method {
        order.set_shipping_method(method);
    }
    if let Some(amount) = r.shipping_cost {
        order.set_shipping_cost(amount).map_err(bad_request)?;
    }
    if let Some(amount) = r.tax_amount {
        order.set_tax_amount(amount).map_err(bad_request)?;
    }
    if let Some(amount) = r.discount_amount {
        order.set_discount_amount(amount).map_err(bad_request)?;
    }

    insert_order(&s.db, &order).await?;
    cart.clear();
    save_cart(&s.db, &cart).await?;

    let mut events = vec![placed_event(&order)];
    events.extend(order.take_events());
    publish_events(&s, events).await;
    tracing::info!(order_number = order.order_number(), "checkout completed");
    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub tracking_number: Option<String>,
}

async fn update_order_status(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let mut order = load_order(&s.db, id).await?;
    if let Some(tracking) = &r.tracking_number {
        order.set_tracking_number(tracking);
    }
    order
        .set_status(r.status, r.description.clone(), r.notes.clone())
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    save_order_status(&s.db, &order).await?;
    let events = order.take_events();
    publish_events(&s, events).await;
    Ok(Json(order))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    #[validate(length(min = 1))]
    pub payment_intent_id: String,
    #[validate(length(min = 1))]
    pub payment_method: String,
}

async fn record_payment(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<RecordPaymentRequest>,
) -> Result<Json<Order>, ApiError> {
    r.validate().map_err(bad_request)?;
    let mut order = load_order(&s.db, id).await?;
    order
        .set_payment_info(&r.payment_intent_id, &r.payment_method)
        .map_err(bad_request)?;
    order
        .set_status(OrderStatus::Paid, Some("Payment captured".to_string()), None)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    save_order_status(&s.db, &order).await?;
    let events = order.take_events();
    publish_events(&s, events).await;
    Ok(Json(order))
}
