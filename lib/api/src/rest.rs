use crate::resolver::{MatchResolver, Resolution};
use actix_cors::Cors;
use actix_web::error::InternalError;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer, Result as ActixResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FingerprintResponse {
    is_new_visitor: bool,
    visit_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_visit: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    similarity: Option<f64>,
}

impl From<&Resolution> for FingerprintResponse {
    fn from(res: &Resolution) -> Self {
        Self {
            is_new_visitor: res.is_new_visitor(),
            visit_count: res.visit_count,
            last_visit: res.last_visit,
            similarity: res.similarity,
        }
    }
}

pub struct RestApi;

impl RestApi {
    pub async fn start(
        resolver: Arc<MatchResolver>,
        bind: String,
        port: u16,
    ) -> std::io::Result<()> {
        info!("Listening on {}:{}", bind, port);
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(cors)
                .configure(RestApi::configure(resolver.clone()))
        })
        .bind((bind.as_str(), port))?
        .run()
        .await
    }

    /// Register the fingerprint endpoint and its state on an app
    pub fn configure(resolver: Arc<MatchResolver>) -> impl FnOnce(&mut web::ServiceConfig) {
        move |cfg| {
            cfg.app_data(web::Data::new(resolver))
                .app_data(json_config())
                .route("/api/fingerprint", web::post().to(submit_fingerprint));
        }
    }
}

/// Malformed or oversized bodies get a 400 with the parser's message
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(MAX_BODY_BYTES)
        .error_handler(|err, _req: &HttpRequest| {
            let response = HttpResponse::BadRequest().json(serde_json::json!({
                "error": err.to_string()
            }));
            InternalError::from_response(err, response).into()
        })
}

fn internal_error() -> HttpResponse {
    HttpResponse::InternalServerError().json(serde_json::json!({
        "error": "Internal server error"
    }))
}

async fn submit_fingerprint(
    resolver: web::Data<Arc<MatchResolver>>,
    body: web::Json<serde_json::Value>,
) -> ActixResult<HttpResponse> {
    let raw = body.into_inner();
    let resolver = resolver.get_ref().clone();

    match web::block(move || resolver.resolve(&raw)).await {
        Ok(Ok(resolution)) => Ok(HttpResponse::Ok().json(FingerprintResponse::from(&resolution))),
        Ok(Err(e)) if e.is_client_error() => Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "error": e.to_string()
        }))),
        Ok(Err(e)) => {
            error!("Error processing fingerprint: {}", e);
            Ok(internal_error())
        }
        Err(e) => {
            error!("Fingerprint worker failed: {}", e);
            Ok(internal_error())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolverConfig;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use revisit_core::{
        ContentHash, Error, FeatureVector, RecordId, Result, VisitLedger, VisitorRecord,
    };
    use revisit_similarity::Scorer;
    use revisit_storage::{MemoryCache, MemoryLedger, StorageManager};
    use serde_json::{json, Value};
    use std::ops::ControlFlow;

    /// Ledger whose connection is always down
    struct UnavailableLedger;

    impl VisitLedger for UnavailableLedger {
        fn get(&self, _id: RecordId) -> Result<Option<VisitorRecord>> {
            Err(Error::Storage("connection refused".to_string()))
        }

        fn scan(&self, _visit: &mut dyn FnMut(&VisitorRecord) -> ControlFlow<()>) -> Result<()> {
            Err(Error::Storage("connection refused".to_string()))
        }

        fn insert(
            &self,
            _hash: &ContentHash,
            _features: &FeatureVector,
            _now: DateTime<Utc>,
        ) -> Result<VisitorRecord> {
            Err(Error::Storage("connection refused".to_string()))
        }

        fn record_visit(&self, _id: RecordId, _now: DateTime<Utc>) -> Result<Option<VisitorRecord>> {
            Err(Error::Storage("connection refused".to_string()))
        }

        fn count(&self) -> Result<usize> {
            Err(Error::Storage("connection refused".to_string()))
        }
    }

    fn memory_resolver() -> Arc<MatchResolver> {
        let storage = StorageManager::in_memory();
        Arc::new(MatchResolver::from_storage(
            &storage,
            Scorer::default(),
            ResolverConfig::default(),
        ))
    }

    fn fingerprint() -> Value {
        json!({
            "userAgent": "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
            "platform": "Linux x86_64",
            "canvas": "7d1e02aa",
            "webgl": "33be9f10",
            "color_depth": 24,
            "screen_resolution": "2560x1440",
            "timezone": "Europe/Madrid",
            "language": "es-ES",
            "fonts": ["DejaVu Sans", "Liberation Serif", "Noto Color Emoji"],
            "local_storage": true,
            "indexed_db": true
        })
    }

    #[actix_web::test]
    async fn test_new_then_returning_visitor() {
        let app = test::init_service(App::new().configure(RestApi::configure(memory_resolver()))).await;

        let req = test::TestRequest::post()
            .uri("/api/fingerprint")
            .set_json(fingerprint())
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({"isNewVisitor": true, "visitCount": 1}));

        let req = test::TestRequest::post()
            .uri("/api/fingerprint")
            .set_json(fingerprint())
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["isNewVisitor"], false);
        assert_eq!(body["visitCount"], 2);
        assert_eq!(body["similarity"], 1.0);
        assert!(body["lastVisit"].is_string());
    }

    #[actix_web::test]
    async fn test_malformed_body_is_bad_request() {
        let app = test::init_service(App::new().configure(RestApi::configure(memory_resolver()))).await;

        let req = test::TestRequest::post()
            .uri("/api/fingerprint")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].is_string());
    }

    #[actix_web::test]
    async fn test_empty_bag_is_bad_request() {
        let app = test::init_service(App::new().configure(RestApi::configure(memory_resolver()))).await;

        let req = test::TestRequest::post()
            .uri("/api/fingerprint")
            .set_json(json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_store_failure_is_generic_500() {
        let storage = StorageManager::from_parts(Arc::new(UnavailableLedger), Arc::new(MemoryCache::new()));
        let resolver = Arc::new(MatchResolver::from_storage(
            &storage,
            Scorer::default(),
            ResolverConfig::default(),
        ));
        let app = test::init_service(App::new().configure(RestApi::configure(resolver))).await;

        let req = test::TestRequest::post()
            .uri("/api/fingerprint")
            .set_json(fingerprint())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"error": "Internal server error"}));
    }

    #[actix_web::test]
    async fn test_fuzzy_match_reports_score() {
        let ledger = Arc::new(MemoryLedger::new());
        let resolver = Arc::new(MatchResolver::new(
            ledger.clone(),
            Arc::new(MemoryCache::new()),
            Scorer::default(),
            ResolverConfig::default(),
        ));
        let app = test::init_service(App::new().configure(RestApi::configure(resolver))).await;

        let req = test::TestRequest::post()
            .uri("/api/fingerprint")
            .set_json(fingerprint())
            .to_request();
        test::call_service(&app, req).await;

        let mut moved = fingerprint();
        moved["timezone"] = json!("Atlantic/Canary");
        let req = test::TestRequest::post()
            .uri("/api/fingerprint")
            .set_json(moved)
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["isNewVisitor"], false);
        assert_eq!(body["visitCount"], 2);
        let similarity = body["similarity"].as_f64().unwrap();
        assert!(similarity >= 0.75 && similarity < 1.0);
        assert_eq!(ledger.count().unwrap(), 1);
    }
}
