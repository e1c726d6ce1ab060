//! OpenAPI documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::OpenApi;

use crate::gateway::handlers::HealthResponse;
use crate::gateway::types::{
    AccessData, ErrorData, PurchaseRequest, PurchaseView, SettlementData,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Codemart Settlement API",
        version = "1.0.0",
        description = "Purchase settlement for the code marketplace: quote, transfer and confirm payouts to listing sellers.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::create_purchase,
        crate::gateway::handlers::recheck_purchase,
        crate::gateway::handlers::get_purchase,
        crate::gateway::handlers::check_access,
    ),
    components(
        schemas(
            HealthResponse,
            PurchaseRequest,
            SettlementData,
            PurchaseView,
            AccessData,
            ErrorData,
        )
    ),
    tags(
        (name = "Purchase", description = "Settlement and access checks"),
        (name = "System", description = "Health checks and system info")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generates() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Codemart Settlement API");
        assert_eq!(spec.info.version, "1.0.0");
    }

    #[test]
    fn test_endpoints_registered() {
        let spec = ApiDoc::openapi();
        let paths = spec.paths;
        assert!(paths.paths.contains_key("/api/v1/health"));
        assert!(paths.paths.contains_key("/api/v1/purchases"));
        assert!(paths.paths.contains_key("/api/v1/purchases/{purchase_id}"));
        assert!(
            paths
                .paths
                .contains_key("/api/v1/purchases/{purchase_id}/recheck")
        );
        assert!(paths.paths.contains_key("/api/v1/access"));
    }

    #[test]
    fn test_openapi_json_serializable() {
        let json = ApiDoc::openapi().to_json().unwrap();
        assert!(json.contains("SettlementData"));
    }
}
