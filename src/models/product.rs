use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::{categories, product_images, products};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    pub fn for_stock(stock: i32, threshold: i32) -> Self {
        if stock <= 0 {
            StockStatus::OutOfStock
        } else if stock <= threshold {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub featured: Option<bool>,
    pub sort_by: Option<SortBy>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// Admin-only escape hatch to see drafts
    pub include_inactive: Option<bool>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    PriceAsc,
    PriceDesc,
    Newest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compare_at_price: Option<Decimal>,
    pub sku: String,
    pub stock_status: StockStatus,
    pub is_featured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListResponse {
    pub products: Vec<ProductSummary>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductImageResponse {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetailResponse {
    pub id: i32,
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub sku: String,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compare_at_price: Option<Decimal>,
    pub stock: i32,
    pub stock_status: StockStatus,
    pub is_active: bool,
    pub is_featured: bool,
    pub tags: serde_json::Value,
    pub category: Option<CategoryRef>,
    pub images: Vec<ProductImageResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRef {
    pub id: i32,
    pub name: String,
    pub slug: String,
}

impl ProductDetailResponse {
    pub fn from_parts(
        product: products::Model,
        category: Option<categories::Model>,
        images: Vec<product_images::Model>,
    ) -> Self {
        Self {
            id: product.id,
            name: product.name,
            slug: product.slug,
            description: product.description,
            sku: product.sku,
            price: product.price,
            compare_at_price: product.compare_at_price,
            stock: product.stock,
            stock_status: StockStatus::for_stock(product.stock, product.low_stock_threshold),
            is_active: product.is_active,
            is_featured: product.is_featured,
            tags: product.tags,
            category: category.map(|c| CategoryRef {
                id: c.id,
                name: c.name,
                slug: c.slug,
            }),
            images: images
                .into_iter()
                .map(|i| ProductImageResponse {
                    url: i.url,
                    alt: i.alt,
                    is_primary: i.is_primary,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInput {
    pub url: String,
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub sku: Option<String>,
    pub stock: Option<i32>,
    pub low_stock_threshold: Option<i32>,
    pub category_id: i32,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub images: Vec<ImageInput>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub compare_at_price: Option<Decimal>,
    pub stock: Option<i32>,
    pub low_stock_threshold: Option<i32>,
    pub category_id: Option<i32>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
    pub tags: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_status_boundaries() {
        assert_eq!(StockStatus::for_stock(0, 5), StockStatus::OutOfStock);
        assert_eq!(StockStatus::for_stock(-2, 5), StockStatus::OutOfStock);
        assert_eq!(StockStatus::for_stock(5, 5), StockStatus::LowStock);
        assert_eq!(StockStatus::for_stock(6, 5), StockStatus::InStock);
    }
}
