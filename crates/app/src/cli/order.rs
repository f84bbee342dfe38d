use clap::Args;
use waybill_app::domain::{
    orders::records::{Order, OrderUuid},
    tenants::records::TenantUuid,
};

use crate::cli::args::ServiceArgs;

#[derive(Debug, Args)]
pub(crate) struct OrderArgs {
    #[command(flatten)]
    service: ServiceArgs,

    /// Tenant that owns the order
    #[arg(long)]
    tenant_uuid: TenantUuid,

    #[arg(long)]
    order_uuid: OrderUuid,
}

pub(crate) type DispatchArgs = OrderArgs;
pub(crate) type AmendArgs = OrderArgs;
pub(crate) type RequeueArgs = OrderArgs;

#[derive(Debug, Args)]
pub(crate) struct RefreshArgs {
    #[command(flatten)]
    service: ServiceArgs,

    /// Tenant that owns the orders
    #[arg(long)]
    tenant_uuid: TenantUuid,

    /// Orders to refresh
    #[arg(long = "order-uuid", required = true, num_args = 1..)]
    order_uuids: Vec<OrderUuid>,
}

pub(crate) async fn dispatch(args: DispatchArgs) -> Result<(), String> {
    let context = args.service.context().await?;

    let result = context
        .fulfillment
        .dispatch(args.tenant_uuid, args.order_uuid)
        .await;

    context.notifications.drain().await;

    let order = result.map_err(|error| format!("dispatch failed: {error}"))?;

    print_order(&order);

    Ok(())
}

pub(crate) async fn amend(args: AmendArgs) -> Result<(), String> {
    let context = args.service.context().await?;

    let order = context
        .fulfillment
        .amend(args.tenant_uuid, args.order_uuid)
        .await
        .map_err(|error| format!("amend failed: {error}"))?;

    print_order(&order);

    Ok(())
}

pub(crate) async fn requeue(args: RequeueArgs) -> Result<(), String> {
    let context = args.service.context().await?;

    let order = context
        .fulfillment
        .requeue(args.tenant_uuid, args.order_uuid)
        .await
        .map_err(|error| format!("requeue failed: {error}"))?;

    print_order(&order);

    Ok(())
}

pub(crate) async fn refresh(args: RefreshArgs) -> Result<(), String> {
    let context = args.service.context().await?;

    let result = context
        .tracking
        .refresh_tenant_statuses(args.tenant_uuid, &args.order_uuids)
        .await;

    context.notifications.drain().await;

    let report = result.map_err(|error| format!("refresh failed: {error}"))?;

    let rendered = serde_json::to_string_pretty(&report)
        .map_err(|error| format!("failed to render report: {error}"))?;

    println!("{rendered}");

    Ok(())
}

fn print_order(order: &Order) {
    println!("order_uuid: {}", order.uuid);
    println!("reference: {}", order.reference);
    println!("status: {}", order.status);
    println!("retry_count: {}", order.retry_count);
    if let Some(tracking_id) = &order.tracking_id {
        println!("tracking_id: {tracking_id}");
    }
    if let Some(last_error) = &order.last_error {
        println!("last_error: {last_error}");
    }
}
