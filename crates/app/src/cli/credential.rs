use std::sync::Arc;

use clap::{Args, Subcommand};
use waybill_app::domain::{
    credentials::{
        CredentialResolver, PgCredentialsRepository,
        records::{CourierApiKey, CredentialKey, NewCredential},
    },
    tenants::records::TenantUuid,
};

use crate::cli::args::DatabaseArgs;

#[derive(Debug, Args)]
pub(crate) struct CredentialCommand {
    #[command(subcommand)]
    command: CredentialSubcommand,
}

#[derive(Debug, Subcommand)]
enum CredentialSubcommand {
    /// Register or replace the courier key for a pickup location
    Set(SetCredentialArgs),
}

#[derive(Debug, Args)]
pub(crate) struct SetCredentialArgs {
    #[command(flatten)]
    database: DatabaseArgs,

    #[arg(long)]
    tenant_uuid: TenantUuid,

    /// Pickup location name as registered with the courier
    #[arg(long)]
    pickup_location: String,

    /// Courier API key
    #[arg(long, env = "COURIER_API_KEY", hide_env_values = true)]
    api_key: String,
}

pub(crate) async fn run(command: CredentialCommand) -> Result<(), String> {
    match command.command {
        CredentialSubcommand::Set(args) => set(args).await,
    }
}

async fn set(args: SetCredentialArgs) -> Result<(), String> {
    let pool = args.database.connect().await?;
    let resolver = CredentialResolver::new(Arc::new(PgCredentialsRepository::new(pool)));

    let credential = resolver
        .register(NewCredential {
            key: CredentialKey::new(args.tenant_uuid, &args.pickup_location),
            api_key: CourierApiKey::new(args.api_key),
        })
        .await
        .map_err(|error| format!("failed to register credential: {error}"))?;

    println!("credential_uuid: {}", credential.uuid);
    println!("tenant_uuid: {}", credential.key.tenant());
    println!("pickup_location: {}", credential.key.pickup_location());
    println!("updated_at: {}", credential.updated_at);

    Ok(())
}
