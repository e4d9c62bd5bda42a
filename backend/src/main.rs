use actix_web::{web, App, HttpServer};
use env_logger::Env;
use geoportal_backend::config::AppConfig;
use geoportal_backend::configure_app;
use geoportal_backend::state::AppState;
use log::info;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = AppConfig::load()?;
    let state = web::Data::new(AppState::from_config(&config)?);
    let max_upload = config.upload.max_upload_bytes();
    let (host, port) = (config.server.host.clone(), config.server.port);

    info!(
        "Map server {} (workspace '{}', store '{}'), database {}:{}/{}",
        config.geoserver.base_url(),
        config.geoserver.workspace,
        config.geoserver.datastore,
        config.database.host,
        config.database.port,
        config.database.dbname
    );
    info!("Server running at http://{}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(max_upload))
            .configure(configure_app)
    })
    .bind((host, port))?
    .run()
    .await?;

    Ok(())
}
