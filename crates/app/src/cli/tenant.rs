use clap::{Args, Subcommand};
use waybill_app::domain::tenants::{
    PgTenantsRepository, TenantsRepository,
    records::{NewTenant, TenantUuid},
};

use crate::cli::args::DatabaseArgs;

#[derive(Debug, Args)]
pub(crate) struct TenantCommand {
    #[command(subcommand)]
    command: TenantSubcommand,
}

#[derive(Debug, Subcommand)]
enum TenantSubcommand {
    Create(CreateTenantArgs),
}

#[derive(Debug, Args)]
pub(crate) struct CreateTenantArgs {
    #[command(flatten)]
    database: DatabaseArgs,

    /// Tenant display name
    #[arg(long)]
    name: String,

    /// Optional tenant UUID; generated when omitted
    #[arg(long)]
    tenant_uuid: Option<TenantUuid>,
}

pub(crate) async fn run(command: TenantCommand) -> Result<(), String> {
    match command.command {
        TenantSubcommand::Create(args) => create(args).await,
    }
}

async fn create(args: CreateTenantArgs) -> Result<(), String> {
    let pool = args.database.connect().await?;

    let tenant = PgTenantsRepository::new(pool)
        .create_tenant(NewTenant {
            uuid: args.tenant_uuid.unwrap_or_default(),
            name: args.name,
        })
        .await
        .map_err(|error| format!("failed to create tenant: {error}"))?;

    println!("tenant_uuid: {}", tenant.uuid);
    println!("tenant_name: {}", tenant.name);

    Ok(())
}
