mod config;
mod db;
mod error;
mod fx;
mod grpc;
mod models;
mod pricing;
mod provider;
mod redis;
mod resolver;
mod store;
mod valuation;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::fx::{CbrSource, FxProvider, FxRegistry, FxSource, KztSource, Schedule, UsdIdentitySource};
use crate::grpc::pb::price_server::PriceServer;
use crate::grpc::{pb, PriceService};
use crate::models::CoinDictionary;
use crate::pricing::HistoricalPriceUseCase;
use crate::provider::CoinGeckoClient;
use crate::resolver::CoinIdResolver;
use crate::store::{CachedHistoricalPriceStore, HistoricalPriceStore, PgHistoricalPriceStore, PgTenantSymbolStore};
use crate::valuation::ValuationFacade;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    let config = Config::load().expect("failed to load configuration");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("price_svc={},tower_http=info", config.log.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(addr = %config.grpc.addr, "starting price service");

    let db_pool = db::connect(&config).await;
    tracing::info!("connected to postgres");

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run database migrations");
    tracing::info!("database migrations complete");

    let redis_pool = redis::connect(&config).await;
    if redis_pool.is_some() {
        tracing::info!("connected to redis");
    } else {
        tracing::info!("running without redis cache");
    }

    let dictionary =
        Arc::new(CoinDictionary::load(&config.resolver.path).expect("failed to load coin-id dictionary"));
    tracing::info!(entries = dictionary.len(), "loaded coin-id dictionary");

    let tenant_symbol_store = Arc::new(PgTenantSymbolStore::new(db_pool.clone()));

    let pg_historical_price_store: Arc<dyn HistoricalPriceStore> =
        Arc::new(PgHistoricalPriceStore::new(db_pool.clone()));
    let historical_price_store: Arc<dyn HistoricalPriceStore> = match redis_pool {
        Some(redis) => Arc::new(CachedHistoricalPriceStore::new(pg_historical_price_store, redis)),
        None => pg_historical_price_store,
    };

    let resolver = Arc::new(CoinIdResolver::new(dictionary, tenant_symbol_store.clone()));

    let coingecko = Arc::new(CoinGeckoClient::new(&config.coingecko).expect("failed to build coingecko client"));

    let mut registry = FxRegistry::new();
    registry.register(Arc::new(UsdIdentitySource));
    registry.register(Arc::new(
        CbrSource::new(
            config.fx.http_timeout(),
            schedule_for(&config.fx, "RUB", chrono_tz::Europe::Moscow),
        )
        .expect("failed to build cbr fx source"),
    ));
    registry.register(Arc::new(
        KztSource::new(
            config.fx.http_timeout(),
            schedule_for(&config.fx, "KZT", chrono_tz::Asia::Almaty),
        )
        .expect("failed to build kzt fx source"),
    ));
    let fx_provider = Arc::new(FxProvider::new(registry));

    let shutdown = CancellationToken::new();
    fx_provider.start(shutdown.clone());
    tracing::info!("fx update loops started");

    let pricing_use_case = Arc::new(HistoricalPriceUseCase::new(
        historical_price_store,
        fx_provider,
        coingecko,
        Some(REQUEST_TIMEOUT),
        config.coingecko.strict_point_count,
    ));

    let facade = Arc::new(ValuationFacade::new(resolver, pricing_use_case));
    let price_service = PriceService::new(facade, tenant_symbol_store);

    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<PriceServer<PriceService>>()
        .await;

    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(pb::FILE_DESCRIPTOR_SET)
        .build_v1()
        .expect("failed to build reflection service");

    let addr = config.grpc.socket_addr();
    tracing::info!(%addr, "grpc server listening");

    Server::builder()
        .layer(tower_http::trace::TraceLayer::new_for_grpc())
        .add_service(health_service)
        .add_service(reflection_service)
        .add_service(PriceServer::new(price_service))
        .serve_with_shutdown(addr, shutdown_signal(shutdown))
        .await
        .expect("grpc server error");

    tracing::info!("shutdown complete");
}

/// Builds an FX source's `Schedule` from `fx.sources.<currency>` (defaults
/// to 20:00 local when the currency has no config entry), per
/// `config.yaml`'s "fx" section.
fn schedule_for(fx: &config::Fx, currency: &str, tz: chrono_tz::Tz) -> Schedule {
    match fx.sources.get(currency) {
        Some(s) => Schedule {
            tz,
            hour: s.hour,
            minute: s.minute,
        },
        None => Schedule { tz, hour: 20, minute: 0 },
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("ctrl+c received, shutting down"),
        _ = terminate => tracing::info!("sigterm received, shutting down"),
    }

    cancel.cancel();
}
