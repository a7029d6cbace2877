//! Service wiring: everything handlers need, built once from [`AppConfig`].

use std::sync::Arc;

use thiserror::Error;

use jobboard_infra::notify::{
    HttpRealtimeRelay, LogMailer, Mailer, NoopRelay, Notifier, NotifyError, RealtimeRelay, SmtpMailer,
};
use jobboard_infra::providers::{GatewayError, Gateways};
use jobboard_infra::store::{InMemoryJobBoardStore, PostgresJobBoardStore};
use jobboard_infra::{AppConfig, JobBoardStore, Reconciler, StoreError, SubmissionService};
use jobboard_payments::{SslcommerzSignatureVerifier, StripeSignatureVerifier};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("payment gateway: {0}")]
    Gateway(#[from] GatewayError),

    #[error("notifications: {0}")]
    Notify(#[from] NotifyError),
}

pub struct AppServices {
    pub config: AppConfig,
    pub store: Arc<dyn JobBoardStore>,
    pub reconciler: Reconciler,
    pub submissions: SubmissionService,
    pub stripe_signatures: StripeSignatureVerifier,
    pub sslcommerz_signatures: SslcommerzSignatureVerifier,
}

impl AppServices {
    /// Assemble services from already-built parts.
    pub fn from_parts(
        config: AppConfig,
        store: Arc<dyn JobBoardStore>,
        gateways: Gateways,
        mailer: Arc<dyn Mailer>,
        relay: Arc<dyn RealtimeRelay>,
    ) -> Self {
        let notifier = Notifier::new(store.clone(), mailer, relay);
        let reconciler = Reconciler::new(
            store.clone(),
            notifier,
            gateways.clone(),
            config.pending_payment_ttl(),
        );
        let submissions = SubmissionService::new(store.clone(), gateways);
        let stripe_signatures =
            StripeSignatureVerifier::new(config.stripe.webhook_secret.clone(), config.webhook_tolerance_secs);
        let sslcommerz_signatures = SslcommerzSignatureVerifier::new(config.sslcommerz.store_password.clone());

        Self {
            config,
            store,
            reconciler,
            submissions,
            stripe_signatures,
            sslcommerz_signatures,
        }
    }
}

/// Build services from config: Postgres or in-memory store, real or sandbox
/// gateways, SMTP or log mailer, HTTP or no-op relay.
pub async fn build_services(config: AppConfig) -> Result<AppServices, BootstrapError> {
    let store: Arc<dyn JobBoardStore> = match &config.database_url {
        Some(url) => {
            tracing::info!("using postgres store");
            Arc::new(PostgresJobBoardStore::connect(url, config.database_max_connections).await?)
        }
        None => {
            tracing::info!("using in-memory store");
            Arc::new(InMemoryJobBoardStore::new())
        }
    };

    let gateways = Gateways::from_config(&config)?;

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
        None => {
            tracing::warn!("SMTP_HOST not set; emails are logged instead of sent");
            Arc::new(LogMailer)
        }
    };

    let relay: Arc<dyn RealtimeRelay> = match &config.relay {
        Some(relay) => Arc::new(HttpRealtimeRelay::new(relay)?),
        None => Arc::new(NoopRelay),
    };

    Ok(AppServices::from_parts(config, store, gateways, mailer, relay))
}
