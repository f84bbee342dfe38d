use clap::{Parser, Subcommand};

mod args;
mod credential;
mod db;
mod order;
mod tenant;
mod webhook;

#[derive(Debug, Parser)]
#[command(name = "waybill", about = "Waybill operator CLI", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Make one dispatch attempt for an order
    Dispatch(order::DispatchArgs),
    /// Push an order's current shipment details to the carrier
    Amend(order::AmendArgs),
    /// Return a permanently failed order to pending
    Requeue(order::RequeueArgs),
    /// Refresh carrier status for orders now
    Refresh(order::RefreshArgs),
    Credential(credential::CredentialCommand),
    Webhook(webhook::WebhookCommand),
    Tenant(tenant::TenantCommand),
    Db(db::DbCommand),
}

impl Cli {
    pub(crate) async fn run(self) -> Result<(), String> {
        match self.command {
            Commands::Dispatch(args) => order::dispatch(args).await,
            Commands::Amend(args) => order::amend(args).await,
            Commands::Requeue(args) => order::requeue(args).await,
            Commands::Refresh(args) => order::refresh(args).await,
            Commands::Credential(command) => credential::run(command).await,
            Commands::Webhook(command) => webhook::run(command).await,
            Commands::Tenant(command) => tenant::run(command).await,
            Commands::Db(command) => db::run(command).await,
        }
    }
}
