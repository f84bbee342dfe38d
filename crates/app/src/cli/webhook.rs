use std::{collections::BTreeMap, time::Duration};

use clap::{Args, Subcommand};
use waybill_app::domain::{
    notifications::records::{
        DeliveryLog, DeliveryLogUuid, NewSubscription, SigningSecret, SubscriptionUuid,
        WebhookSubscription,
    },
    tenants::records::TenantUuid,
};

use crate::cli::args::ServiceArgs;

#[derive(Debug, Args)]
pub(crate) struct WebhookCommand {
    #[command(subcommand)]
    command: WebhookSubcommand,
}

#[derive(Debug, Subcommand)]
enum WebhookSubcommand {
    /// Register a webhook endpoint for order events
    Subscribe(SubscribeArgs),
    /// List the tenant's active subscriptions
    List(TenantArgs),
    /// Stop delivering to a subscription without deleting it
    Deactivate(SubscriptionArgs),
    Delete(SubscriptionArgs),
    /// Re-send a failed delivery as a new attempt
    Retry(RetryArgs),
    /// Show the tenant's most recent failed deliveries
    ListFailed(ListFailedArgs),
}

#[derive(Debug, Args)]
pub(crate) struct TenantArgs {
    #[command(flatten)]
    service: ServiceArgs,

    #[arg(long)]
    tenant_uuid: TenantUuid,
}

#[derive(Debug, Args)]
pub(crate) struct SubscribeArgs {
    #[command(flatten)]
    tenant: TenantArgs,

    /// Endpoint receiving POSTed events
    #[arg(long)]
    url: String,

    /// Event name to deliver, or `*` for every event
    #[arg(long = "event", required = true)]
    events: Vec<String>,

    /// Key used to sign request bodies
    #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Manual retries allowed after the first attempt
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    #[arg(long)]
    timeout_seconds: Option<u64>,

    /// Extra request header as `name=value`
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,
}

#[derive(Debug, Args)]
pub(crate) struct SubscriptionArgs {
    #[command(flatten)]
    tenant: TenantArgs,

    #[arg(long)]
    subscription_uuid: SubscriptionUuid,
}

#[derive(Debug, Args)]
pub(crate) struct RetryArgs {
    #[command(flatten)]
    tenant: TenantArgs,

    /// Delivery log to retry
    #[arg(long)]
    delivery_uuid: DeliveryLogUuid,
}

#[derive(Debug, Args)]
pub(crate) struct ListFailedArgs {
    #[command(flatten)]
    tenant: TenantArgs,

    #[arg(long, default_value_t = 20)]
    limit: u32,
}

pub(crate) async fn run(command: WebhookCommand) -> Result<(), String> {
    match command.command {
        WebhookSubcommand::Subscribe(args) => subscribe(args).await,
        WebhookSubcommand::List(args) => list(args).await,
        WebhookSubcommand::Deactivate(args) => deactivate(args).await,
        WebhookSubcommand::Delete(args) => delete(args).await,
        WebhookSubcommand::Retry(args) => retry(args).await,
        WebhookSubcommand::ListFailed(args) => list_failed(args).await,
    }
}

async fn subscribe(args: SubscribeArgs) -> Result<(), String> {
    let context = args.tenant.service.context().await?;

    let subscription = context
        .subscriptions
        .create(NewSubscription {
            uuid: SubscriptionUuid::new(),
            tenant: args.tenant.tenant_uuid,
            url: args.url,
            events: args.events,
            secret: args.secret.map(SigningSecret::new),
            max_retries: args.max_retries,
            timeout: args.timeout_seconds.map(Duration::from_secs),
            headers: args.headers.into_iter().collect::<BTreeMap<_, _>>(),
        })
        .await
        .map_err(|error| format!("failed to create subscription: {error}"))?;

    print_subscription(&subscription);

    Ok(())
}

async fn list(args: TenantArgs) -> Result<(), String> {
    let context = args.service.context().await?;

    let subscriptions = context
        .subscriptions
        .list_active(args.tenant_uuid)
        .await
        .map_err(|error| format!("failed to list subscriptions: {error}"))?;

    for subscription in subscriptions.iter() {
        print_subscription(subscription);
        println!();
    }

    Ok(())
}

async fn deactivate(args: SubscriptionArgs) -> Result<(), String> {
    let context = args.tenant.service.context().await?;

    let subscription = context
        .subscriptions
        .deactivate(args.tenant.tenant_uuid, args.subscription_uuid)
        .await
        .map_err(|error| format!("failed to deactivate subscription: {error}"))?;

    print_subscription(&subscription);

    Ok(())
}

async fn delete(args: SubscriptionArgs) -> Result<(), String> {
    let context = args.tenant.service.context().await?;

    context
        .subscriptions
        .delete(args.tenant.tenant_uuid, args.subscription_uuid)
        .await
        .map_err(|error| format!("failed to delete subscription: {error}"))?;

    println!("deleted: {}", args.subscription_uuid);

    Ok(())
}

async fn retry(args: RetryArgs) -> Result<(), String> {
    let context = args.tenant.service.context().await?;

    let log = context
        .notifications
        .retry(args.tenant.tenant_uuid, args.delivery_uuid)
        .await
        .map_err(|error| format!("retry failed: {error}"))?;

    print_delivery(&log);

    Ok(())
}

async fn list_failed(args: ListFailedArgs) -> Result<(), String> {
    let context = args.tenant.service.context().await?;

    let logs = context
        .notifications
        .list_failed(args.tenant.tenant_uuid, args.limit)
        .await
        .map_err(|error| format!("failed to list deliveries: {error}"))?;

    for log in &logs {
        print_delivery(log);
        println!();
    }

    Ok(())
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected name=value, got {raw:?}"))
}

fn print_subscription(subscription: &WebhookSubscription) {
    println!("subscription_uuid: {}", subscription.uuid);
    println!("url: {}", subscription.url);
    println!("events: {}", subscription.events.join(","));
    println!("signed: {}", subscription.secret.is_some());
    println!("max_retries: {}", subscription.max_retries);
    println!("timeout_seconds: {}", subscription.timeout.as_secs());
    println!("active: {}", subscription.active);
}

fn print_delivery(log: &DeliveryLog) {
    println!("delivery_uuid: {}", log.uuid);
    println!("subscription_uuid: {}", log.subscription);
    println!("event: {}", log.event);
    println!("attempt: {}", log.attempt);
    println!("outcome: {}", log.outcome);
    if let Some(code) = log.response_code {
        println!("response_code: {code}");
    }
    if let Some(error) = &log.error_message {
        println!("error: {error}");
    }
    println!("created_at: {}", log.created_at);
}
