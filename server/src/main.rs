use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use clap::Parser;

use classroom_server::app::AppContext;
use classroom_server::config::ServerConfig;
use classroom_server::handlers::root;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();
    let app = web::Data::new(AppContext::start(&config));

    log::info!("Server is running on {}", config.bind);
    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .app_data(app.clone())
            .configure(root)
    })
    .bind(config.bind)?
    .run()
    .await
}
