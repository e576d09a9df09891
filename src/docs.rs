use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::payments::initiate_payment,
        crate::api::handlers::upload,
        crate::api::handlers::list_files,
        crate::api::handlers::download_file,
        crate::api::handlers::delete_file,
        crate::api::handlers::reprocess_file,
        crate::api::handlers::list_transactions,
        crate::api::handlers::list_activity,
        crate::api::handlers::dashboard,
        crate::api::webhooks::payment_success,
        crate::api::webhooks::payment_fail,
        crate::api::webhooks::payment_cancel
    ),
    components(
        schemas(
            crate::api::payments::InitiatePaymentRequest,
            crate::api::payments::InitiatePaymentResponse,
            crate::api::handlers::UploadResponse,
            crate::api::handlers::DashboardResponse,
            crate::models::Transaction,
            crate::models::TransactionStatus,
            crate::models::CallbackOutcome,
            crate::models::FileRecord,
            crate::models::FileStatus,
            crate::models::LedgerEntry,
            crate::models::LedgerAction
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "payments", description = "Payment initiation and history"),
        (name = "files", description = "Uploads and word counts"),
        (name = "activity", description = "Activity ledger"),
        (name = "webhooks", description = "Callbacks from the payment gateway")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
