// [apps/gateway/src/kernel.rs]
/*!
 * =================================================================
 * APARATO: GATEWAY SOVEREIGN KERNEL (V1.0)
 * CLASIFICACIÓN: COMPOSITION ROOT (ESTRATO L1-APP)
 * RESPONSABILIDAD: BOOTSTRAP DE INFRAESTRUCTURA E IGNICIÓN SEGURA
 * =================================================================
 */

use crate::routes::build_router;
use crate::services::registry_sweep::spawn_registry_sweep;
use crate::state::AppState;
use std::net::{IpAddr, SocketAddr};
use tracing::{error, info, instrument};

pub struct GatewayKernel {
    pub server_network_port: u16,
    pub application_state: AppState,
}

impl GatewayKernel {
    /// Connects the tactical database link and builds the shared neural
    /// state before any service is spawned.
    #[instrument(skip(database_access_token))]
    pub async fn ignite(database_connection_url: &str, database_access_token: Option<String>, listening_port: u16) -> Self {
        let database_client = relay_store::StoreClient::connect(database_connection_url, database_access_token)
            .await
            .expect("FATAL: Database link collapse. Ignition aborted.");

        let application_state = AppState::new(database_client).expect("FATAL: Application state construction failed.");

        Self { server_network_port: listening_port, application_state }
    }

    /// Spawns the background hygiene daemon and binds the HTTP transport.
    pub async fn launch_sovereign_operations(self) {
        spawn_registry_sweep(self.application_state.clone());

        let router = build_router(self.application_state);

        let bind_address = SocketAddr::new("0.0.0.0".parse::<IpAddr>().unwrap(), self.server_network_port);
        info!("🚀 [KERNEL_ONLINE]: Gateway control plane listening at {}", bind_address);

        let tcp_listener = tokio::net::TcpListener::bind(bind_address).await.expect("CRITICAL_FAULT: Failed to bind network port.");

        if let Err(server_error) = axum::serve(tcp_listener, router).await {
            error!("💀 [KERNEL_COLLAPSE]: Runtime failure: {}", server_error);
            std::process::exit(1);
        }
    }
}
