use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use sqlx::PgPool;
use std::net::TcpListener;

use crate::auth::AuthService;
use crate::configuration::Settings;
use crate::email_client::{EmailClient, SenderEmail};
use crate::routes::{health_check, refresh, register};
use crate::storage::PgUserStore;

pub fn run(
    listener: TcpListener,
    connection: PgPool,
    settings: Settings,
) -> Result<Server, std::io::Error> {
    let sender = SenderEmail::parse(settings.email.sender.clone())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let email_client = EmailClient::new(
        settings.email.base_url.clone(),
        sender,
        reqwest::Client::new(),
    );

    let service = web::Data::new(AuthService::new(
        PgUserStore::new(connection),
        email_client,
        settings.tokens.secret_length,
        settings.tokens.refresh_token_length,
    ));

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(service.clone())
            .route("/health_check", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/refresh", web::post().to(refresh))
    })
    .listen(listener)?
    .run();

    Ok(server)
}
