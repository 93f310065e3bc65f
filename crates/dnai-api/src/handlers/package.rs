//! Package handlers

use crate::dto::{ApiResponse, PackageResponse};
use actix_web::{web, HttpResponse};
use dnai_auth::AuthenticatedUser;
use dnai_core::AppError;
use dnai_db::PgPackageRepository;
use dnai_services::PackageCatalog;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

fn catalog(pool: &PgPool) -> PackageCatalog<PgPackageRepository> {
    PackageCatalog::new(Arc::new(PgPackageRepository::new(pool.clone())))
}

/// GET /api/v1/packages
#[instrument(skip(pool, _user))]
pub async fn list_packages(
    pool: web::Data<PgPool>,
    _user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let packages: Vec<PackageResponse> = catalog(pool.get_ref())
        .list()
        .await?
        .into_iter()
        .map(PackageResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(packages)))
}

/// GET /api/v1/packages/{id}
#[instrument(skip(pool, _user))]
pub async fn get_package(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    _user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let package = catalog(pool.get_ref()).get(path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(PackageResponse::from(package))))
}

/// Configure package routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/packages")
            .route("", web::get().to(list_packages))
            .route("/{id}", web::get().to(get_package)),
    );
}
