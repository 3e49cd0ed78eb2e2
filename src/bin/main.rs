#[cfg(not(target_arch = "wasm32"))]
mod native {
    extern crate gram;

    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use gram::core::db::{seed_demo, Db};
    use tracing::{info, warn};
    use tracing_subscriber::EnvFilter;

    mod adapter {
        use actix_web::HttpRequest;
        use spin_sdk::http::{Method, Request};

        pub fn actix_to_spin_request(req: &HttpRequest, body: actix_web::web::Bytes) -> Request {
            let method = match req.method().as_str() {
                "GET" => Method::Get,
                "POST" => Method::Post,
                "PUT" => Method::Put,
                "DELETE" => Method::Delete,
                "HEAD" => Method::Head,
                "OPTIONS" => Method::Options,
                "PATCH" => Method::Patch,
                other => Method::Other(other.to_string()),
            };

            let uri = req.uri().to_string();
            let mut builder = Request::builder();
            builder.method(method).uri(uri);
            for (name, value) in req.headers() {
                if let Ok(val_str) = value.to_str() {
                    builder.header(name.as_str(), val_str);
                }
            }
            builder.body(body.to_vec()).build()
        }

        pub fn spin_to_actix_response(spin_resp: spin_sdk::http::Response) -> actix_web::HttpResponse {
            let status = *spin_resp.status();
            let content_type = spin_resp
                .header("content-type")
                .and_then(|v| v.as_str())
                .unwrap_or("application/json")
                .to_string();

            actix_web::HttpResponse::build(
                actix_web::http::StatusCode::from_u16(status)
                    .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
            )
            .content_type(content_type)
            .body(spin_resp.body().to_vec())
        }
    }

    pub async fn run() -> std::io::Result<()> {
        dotenvy::dotenv().ok();
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();

        // Native builds have no Spin host; state lives in process memory.
        let db = Db::in_memory();
        if gram::config::seed_demo_data() {
            if let Err(err) = seed_demo(&db) {
                warn!(error = %err, "demo seed failed");
            }
        }

        let addr = gram::config::bind_address();
        info!(%addr, "server listening");

        let data = web::Data::new(db);
        HttpServer::new(move || App::new().app_data(data.clone()).configure(configure))
        .bind(addr)?
        .run()
        .await
    }

    /// Everything goes through `gram::route`. Bodies may be as large as the
    /// biggest accepted image; actix would otherwise stop at 256 KiB.
    pub fn configure(cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::PayloadConfig::new(gram::config::MAX_IMAGE_BYTES))
            .default_service(web::route().to(handle_all));
    }

    async fn handle_all(req: HttpRequest, body: web::Bytes, db: web::Data<Db>) -> HttpResponse {
        let spin_req = adapter::actix_to_spin_request(&req, body);
        adapter::spin_to_actix_response(gram::route(&db, spin_req))
    }

}

#[cfg(not(target_arch = "wasm32"))]
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    native::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
