// [apps/gateway/src/main.rs]
/*!
 * =================================================================
 * APARATO: GATEWAY MAIN ENTRY POINT (V1.0)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L3)
 * RESPONSABILIDAD: BOOTSTRAP DE INFRAESTRUCTURA E IGNICIÓN SEGURA
 * =================================================================
 */

use relay_gateway::prelude::*;

use dotenvy::dotenv;
use relay_telemetry::init_tracing;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_tracing("gateway");

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().thread_stack_size(4 * 1024 * 1024).build()?;

    runtime.block_on(async {
        info!("🛰️  [COMMAND_CENTER]: Global ignition sequence starting...");

        let database_connection_url = std::env::var("DATABASE_URL").expect("CRITICAL_FAULT: DATABASE_URL not defined in runtime environment.");
        let database_access_token = std::env::var("DATABASE_AUTH_TOKEN").ok();
        let listening_network_port: u16 = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse().unwrap_or(3000);

        let kernel = GatewayKernel::ignite(&database_connection_url, database_access_token, listening_network_port).await;

        info!("🚀 [GATEWAY_ONLINE]: System fully operational on port {}.", listening_network_port);
        kernel.launch_sovereign_operations().await;
    });

    Ok(())
}
