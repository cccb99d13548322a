use library_loans::{
    adapters::{
        http::{HttpCatalogClient, HttpMemberDirectory},
        local::LocalCatalogClient,
        memory::{InMemoryBroker, InMemoryInventoryRepository, InMemoryLoanRepository},
        mock::MemberDirectory as MockMemberDirectory,
        postgres::{PostgresInventoryRepository, PostgresLoanRepository},
    },
    api::{create_router, handlers::AppState, inventory_handlers::InventoryState},
    application::{
        copy::{InventoryDependencies, SubscriberDependencies, spawn_consumers},
        loan::{OutboxRelay, ServiceDependencies},
    },
    config::{Config, PropagationMode},
    ports::{CatalogClient, InventoryRepository, LoanOutbox, LoanRepository, MemberDirectory},
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "library_loans=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "Invalid configuration");
            std::process::exit(1);
        }
    };

    // Stores: PostgreSQL when DATABASE_URL is set, in-memory otherwise
    let (loan_repository, loan_outbox, inventory_repository): (
        Arc<dyn LoanRepository>,
        Arc<dyn LoanOutbox>,
        Arc<dyn InventoryRepository>,
    ) = match &config.database_url {
        Some(database_url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await
                .expect("Failed to connect to database");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("Failed to run migrations");

            let loans = Arc::new(PostgresLoanRepository::new(pool.clone()));
            let repository: Arc<dyn LoanRepository> = loans.clone();
            let outbox: Arc<dyn LoanOutbox> = loans;
            let inventory: Arc<dyn InventoryRepository> =
                Arc::new(PostgresInventoryRepository::new(pool));
            (repository, outbox, inventory)
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, using in-memory stores");
            let loans = Arc::new(InMemoryLoanRepository::new());
            let repository: Arc<dyn LoanRepository> = loans.clone();
            let outbox: Arc<dyn LoanOutbox> = loans;
            let inventory: Arc<dyn InventoryRepository> =
                Arc::new(InMemoryInventoryRepository::new());
            (repository, outbox, inventory)
        }
    };

    let inventory = InventoryDependencies {
        repository: inventory_repository,
    };

    // Remote collaborators
    let timeout = config.loan_policy.remote_call_timeout;
    let catalog: Arc<dyn CatalogClient> = match &config.book_service_url {
        Some(url) => Arc::new(
            HttpCatalogClient::new(url.as_str(), timeout).expect("Failed to build inventory client"),
        ),
        None => Arc::new(LocalCatalogClient::new(inventory.clone())),
    };
    let member_directory: Arc<dyn MemberDirectory> = match &config.member_service_url {
        Some(url) => Arc::new(
            HttpMemberDirectory::new(url.as_str(), timeout).expect("Failed to build member client"),
        ),
        None => {
            tracing::warn!("MEMBER_SERVICE_URL is not set, every member id will be accepted");
            Arc::new(MockMemberDirectory::accepting_all())
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Copy status propagation: the outbox relay either publishes loan events
    // or calls the inventory commands directly
    let outbox_relay = match config.propagation {
        PropagationMode::Direct => Arc::new(OutboxRelay::commands(
            loan_outbox,
            catalog.clone(),
            config.loan_policy.remote_call_timeout,
        )),
        PropagationMode::Events => {
            let broker = Arc::new(InMemoryBroker::with_retention(
                config.event_partitions,
                config.event_log_retention,
            ));
            let relay = Arc::new(OutboxRelay::new(
                loan_outbox,
                broker.clone(),
                config.topic_routing.clone(),
            ));

            let subscriber_deps = SubscriberDependencies {
                inventory: inventory.clone(),
                dead_letters: broker.clone(),
                retry: config.consumer_retry.clone(),
            };
            spawn_consumers(
                subscriber_deps,
                broker.as_ref(),
                &config.topic_routing.topics(),
                shutdown_rx.clone(),
            )
            .await
            .expect("Failed to subscribe to loan events");

            relay
        }
    };

    tokio::spawn(
        outbox_relay
            .clone()
            .run(config.outbox_poll_interval, shutdown_rx.clone()),
    );

    let service_deps = ServiceDependencies {
        loan_repository,
        catalog,
        member_directory,
        outbox_relay,
        policy: config.loan_policy.clone(),
    };

    let app = create_router(
        Arc::new(AppState { service_deps }),
        Arc::new(InventoryState { inventory }),
    );

    // Server configuration
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", addr);

    // Start server
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .expect("Failed to start server");

    let _ = shutdown_tx.send(true);
}
