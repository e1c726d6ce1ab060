pub mod health;
pub mod purchase;

pub use health::{HealthResponse, health_check};
pub use purchase::{check_access, create_purchase, get_purchase, recheck_purchase};

// utoipa path structs, referenced by the OpenAPI document
pub use health::__path_health_check;
pub use purchase::{
    __path_check_access, __path_create_purchase, __path_get_purchase, __path_recheck_purchase,
};
