use std::sync::Arc;

use crate::{
    catalog::CatalogService,
    config::{Environment, GalleryConfig},
    middleware::rate_limit::IpRateLimiter,
};

const API_RATE_LIMIT_MESSAGE: &str = "Too many requests from this IP, please try again later.";
const UPLOAD_RATE_LIMIT_MESSAGE: &str = "Too many uploads from this IP, please try again later.";

#[derive(Clone)]
pub struct AppState {
    config: Arc<GalleryConfig>,
    catalog: Arc<CatalogService>,
    api_limiter: IpRateLimiter,
    upload_limiter: IpRateLimiter,
}

impl AppState {
    pub fn new(config: GalleryConfig) -> Self {
        let catalog = CatalogService::from_config(&config);
        let limits = &config.rate_limit;
        let api_limiter =
            IpRateLimiter::new(limits.max_requests, limits.window, API_RATE_LIMIT_MESSAGE)
                .trusting_proxy(limits.trust_proxy);
        let upload_limiter =
            IpRateLimiter::new(limits.max_uploads, limits.window, UPLOAD_RATE_LIMIT_MESSAGE)
                .trusting_proxy(limits.trust_proxy);

        Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            api_limiter,
            upload_limiter,
        }
    }

    pub fn config(&self) -> &GalleryConfig {
        &self.config
    }

    pub fn environment(&self) -> Environment {
        self.config.environment
    }

    pub fn catalog(&self) -> &CatalogService {
        &self.catalog
    }

    pub fn api_limiter(&self) -> &IpRateLimiter {
        &self.api_limiter
    }

    pub fn upload_limiter(&self) -> &IpRateLimiter {
        &self.upload_limiter
    }
}
