pub mod auth;
pub mod handlers;
pub mod payments;
pub mod webhooks;

use actix_web::web;

/// Registers the authenticated `/api` scope and the public gateway callbacks.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .wrap(auth::JwtMiddleware)
            .service(payments::initiate_payment)
            .service(handlers::upload)
            .service(handlers::list_files)
            .service(handlers::download_file)
            .service(handlers::delete_file)
            .service(handlers::reprocess_file)
            .service(handlers::list_transactions)
            .service(handlers::list_activity)
            .service(handlers::dashboard),
    )
    // Gateway callbacks (public)
    .service(webhooks::payment_success)
    .service(webhooks::payment_fail)
    .service(webhooks::payment_cancel);
}
