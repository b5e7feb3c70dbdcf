//! Category and brand services

use serde::Deserialize;
use shared::{Brand, Category, PaginatedResponse, Pagination};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::search_pattern;
use crate::error::{AppError, AppResult};

/// Search filters shared by the catalog lists
#[derive(Debug, Default, Deserialize)]
pub struct CatalogFilter {
    pub search: Option<String>,
    pub is_active: Option<bool>,
}

// ============================================================================
// Categories
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryInput {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCategoryInput {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Clone)]
pub struct CategoryService {
    db: PgPool,
}

impl CategoryService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_categories(
        &self,
        filter: &CatalogFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<Category>> {
        let pattern = search_pattern(filter.search.as_deref());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM categories
            WHERE ($1::text IS NULL OR name ILIKE $1 OR description ILIKE $1)
              AND ($2::boolean IS NULL OR is_active = $2)
            "#,
        )
        .bind(&pattern)
        .bind(filter.is_active)
        .fetch_one(&self.db)
        .await?;

        let categories = sqlx::query_as::<_, Category>(
            r#"
            SELECT * FROM categories
            WHERE ($1::text IS NULL OR name ILIKE $1 OR description ILIKE $1)
              AND ($2::boolean IS NULL OR is_active = $2)
            ORDER BY name
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(&pattern)
        .bind(filter.is_active)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(categories, pagination, total as u64))
    }

    pub async fn get_category(&self, category_id: Uuid) -> AppResult<Category> {
        sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
            .bind(category_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Category".to_string()))
    }

    pub async fn create_category(&self, input: CreateCategoryInput) -> AppResult<Category> {
        input.validate()?;

        let category = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (name, description, is_active)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(input.is_active.unwrap_or(true))
        .fetch_one(&self.db)
        .await?;

        tracing::info!(category_id = %category.id, "category created");
        Ok(category)
    }

    pub async fn update_category(
        &self,
        category_id: Uuid,
        input: UpdateCategoryInput,
    ) -> AppResult<Category> {
        input.validate()?;

        sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories
            SET name = COALESCE($1, name),
                description = COALESCE($2, description),
                is_active = COALESCE($3, is_active),
                updated_at = NOW()
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(input.name.as_deref().map(str::trim))
        .bind(&input.description)
        .bind(input.is_active)
        .bind(category_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Category".to_string()))
    }

    /// Delete a category no product references
    pub async fn delete_category(&self, category_id: Uuid) -> AppResult<()> {
        let products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE category_id = $1")
            .bind(category_id)
            .fetch_one(&self.db)
            .await?;
        if products > 0 {
            return Err(AppError::conflict(
                "category",
                format!("Category is used by {} product(s)", products),
            ));
        }

        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(category_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Category".to_string()));
        }

        tracing::info!(category_id = %category_id, "category deleted");
        Ok(())
    }
}

// ============================================================================
// Brands
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBrandInput {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(url(message = "Website must be a valid URL"))]
    pub website: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBrandInput {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(url(message = "Website must be a valid URL"))]
    pub website: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Clone)]
pub struct BrandService {
    db: PgPool,
}

impl BrandService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_brands(
        &self,
        filter: &CatalogFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<Brand>> {
        let pattern = search_pattern(filter.search.as_deref());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM brands
            WHERE ($1::text IS NULL OR name ILIKE $1 OR description ILIKE $1)
              AND ($2::boolean IS NULL OR is_active = $2)
            "#,
        )
        .bind(&pattern)
        .bind(filter.is_active)
        .fetch_one(&self.db)
        .await?;

        let brands = sqlx::query_as::<_, Brand>(
            r#"
            SELECT * FROM brands
            WHERE ($1::text IS NULL OR name ILIKE $1 OR description ILIKE $1)
              AND ($2::boolean IS NULL OR is_active = $2)
            ORDER BY name
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(&pattern)
        .bind(filter.is_active)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(brands, pagination, total as u64))
    }

    pub async fn get_brand(&self, brand_id: Uuid) -> AppResult<Brand> {
        sqlx::query_as::<_, Brand>("SELECT * FROM brands WHERE id = $1")
            .bind(brand_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Brand".to_string()))
    }

    pub async fn create_brand(&self, input: CreateBrandInput) -> AppResult<Brand> {
        input.validate()?;

        let brand = sqlx::query_as::<_, Brand>(
            r#"
            INSERT INTO brands (name, description, website, is_active)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(&input.website)
        .bind(input.is_active.unwrap_or(true))
        .fetch_one(&self.db)
        .await?;

        tracing::info!(brand_id = %brand.id, "brand created");
        Ok(brand)
    }

    pub async fn update_brand(&self, brand_id: Uuid, input: UpdateBrandInput) -> AppResult<Brand> {
        input.validate()?;

        sqlx::query_as::<_, Brand>(
            r#"
            UPDATE brands
            SET name = COALESCE($1, name),
                description = COALESCE($2, description),
                website = COALESCE($3, website),
                is_active = COALESCE($4, is_active),
                updated_at = NOW()
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(input.name.as_deref().map(str::trim))
        .bind(&input.description)
        .bind(&input.website)
        .bind(input.is_active)
        .bind(brand_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Brand".to_string()))
    }

    pub async fn delete_brand(&self, brand_id: Uuid) -> AppResult<()> {
        let products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE brand_id = $1")
            .bind(brand_id)
            .fetch_one(&self.db)
            .await?;
        if products > 0 {
            return Err(AppError::conflict(
                "brand",
                format!("Brand is used by {} product(s)", products),
            ));
        }

        let result = sqlx::query("DELETE FROM brands WHERE id = $1")
            .bind(brand_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Brand".to_string()));
        }

        tracing::info!(brand_id = %brand_id, "brand deleted");
        Ok(())
    }
}
