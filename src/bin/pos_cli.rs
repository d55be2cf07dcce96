use std::{fs, path::PathBuf, str::FromStr};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate, Utc};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use pos_core::{
    config::{self, AppConfig},
    db,
    entities::order::{OrderStatus, OrderType},
    money::format_currency,
    providers::{InMemoryCatalog, SettingsProvider},
    services::{
        cart::Cart,
        kitchen::{KitchenBoard, KitchenFilter},
        orders::{OrderDetails, OrderFilter, OrderResponse, SortDirection},
        order_number::local_day_bounds,
        reports::{DateRange, ReportPeriod, SalesReport},
    },
    AppState,
};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config().context("failed to load application config")?;
    config::init_tracing(&cfg.log_level, cfg.log_json);

    match cli.command {
        Commands::Migrate => migrate(&cfg).await,
        Commands::Order(command) => {
            handle_order_command(&connect(cfg).await?, command, cli.json).await
        }
        Commands::Kitchen(command) => {
            handle_kitchen_command(&connect(cfg).await?, command, cli.json).await
        }
        Commands::Report(command) => {
            handle_report_command(&connect(cfg).await?, command, cli.json).await
        }
    }
}

async fn migrate(cfg: &AppConfig) -> Result<()> {
    let pool = db::establish_connection_from_app_config(cfg)
        .await
        .context("failed to connect to database")?;
    db::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;
    println!("Migrations applied");
    Ok(())
}

async fn connect(cfg: AppConfig) -> Result<AppState> {
    AppState::init(cfg)
        .await
        .context("failed to initialise order core")
}

#[derive(Parser)]
#[command(name = "pos-cli", about = "Point-of-sale order core: orders, kitchen board and sales reports", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    #[command(subcommand)]
    Order(OrderCommands),
    #[command(subcommand)]
    Kitchen(KitchenCommands),
    #[command(subcommand)]
    Report(ReportCommands),
}

#[derive(Subcommand)]
enum OrderCommands {
    Create(CreateOrderArgs),
    Show(ShowOrderArgs),
    List(ListOrdersArgs),
    Advance(AdvanceOrderArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum OrderTypeArg {
    DineIn,
    Takeout,
}

impl From<OrderTypeArg> for OrderType {
    fn from(value: OrderTypeArg) -> Self {
        match value {
            OrderTypeArg::DineIn => OrderType::DineIn,
            OrderTypeArg::Takeout => OrderType::Takeout,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Pending,
    Preparing,
    Ready,
    Completed,
}

impl From<StatusArg> for OrderStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Pending => OrderStatus::Pending,
            StatusArg::Preparing => OrderStatus::Preparing,
            StatusArg::Ready => OrderStatus::Ready,
            StatusArg::Completed => OrderStatus::Completed,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PeriodArg {
    Daily,
    Weekly,
    Monthly,
}

impl From<PeriodArg> for ReportPeriod {
    fn from(value: PeriodArg) -> Self {
        match value {
            PeriodArg::Daily => ReportPeriod::Daily,
            PeriodArg::Weekly => ReportPeriod::Weekly,
            PeriodArg::Monthly => ReportPeriod::Monthly,
        }
    }
}

#[derive(Args)]
struct CreateOrderArgs {
    #[arg(long, help = "Menu catalog JSON file")]
    catalog: PathBuf,
    #[arg(long = "type", value_enum, default_value = "dine-in")]
    order_type: OrderTypeArg,
    #[arg(
        long = "item",
        required = true,
        help = "Cart line as MENU_ITEM_ID:QUANTITY[:NOTES]; repeatable"
    )]
    items: Vec<String>,
    #[arg(long)]
    customer: Option<String>,
    #[arg(long, help = "Payment label (cash, card, digital)")]
    payment: Option<String>,
    #[arg(long, help = "Actor id recorded on the order")]
    actor: Option<String>,
}

#[derive(Args)]
struct ShowOrderArgs {
    #[arg(help = "Order id or order number")]
    order: String,
}

#[derive(Args)]
struct ListOrdersArgs {
    #[arg(long = "status", value_enum)]
    statuses: Vec<StatusArg>,
    #[arg(long, help = "First local date (YYYY-MM-DD), inclusive")]
    from: Option<NaiveDate>,
    #[arg(long, help = "Last local date (YYYY-MM-DD), inclusive")]
    to: Option<NaiveDate>,
    #[arg(long, action = ArgAction::SetTrue, help = "Newest first")]
    desc: bool,
    #[arg(long)]
    limit: Option<u64>,
}

#[derive(Args)]
struct AdvanceOrderArgs {
    id: Uuid,
    #[arg(long, value_enum)]
    to: StatusArg,
}

#[derive(Subcommand)]
enum KitchenCommands {
    Board(KitchenBoardArgs),
    Bump(KitchenBumpArgs),
}

#[derive(Args)]
struct KitchenBoardArgs {
    #[arg(long, default_value = "all", help = "all, pending, preparing or ready")]
    filter: String,
    #[arg(long, action = ArgAction::SetTrue, help = "Redraw on the configured refresh interval")]
    watch: bool,
}

#[derive(Args)]
struct KitchenBumpArgs {
    id: Uuid,
}

#[derive(Subcommand)]
enum ReportCommands {
    Sales(SalesReportArgs),
}

#[derive(Args)]
struct SalesReportArgs {
    #[arg(long, requires = "to", conflicts_with = "period")]
    from: Option<NaiveDate>,
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,
    #[arg(long, value_enum)]
    period: Option<PeriodArg>,
    #[arg(long, help = "Reference date for --period (defaults to today)")]
    date: Option<NaiveDate>,
    #[arg(long, help = "Write the item breakdown as CSV to this file")]
    csv: Option<PathBuf>,
    #[arg(long, help = "Write the per-day breakdown as CSV to this file")]
    daily_csv: Option<PathBuf>,
}

async fn handle_order_command(state: &AppState, command: OrderCommands, json: bool) -> Result<()> {
    let symbol = state.settings.currency_symbol().to_string();
    match command {
        OrderCommands::Create(args) => {
            let catalog = InMemoryCatalog::from_path(&args.catalog)?;
            let mut cart = Cart::new(args.order_type.into());
            cart.customer_name = args.customer;
            cart.payment_method = args.payment;
            cart.created_by = args.actor;

            for spec in &args.items {
                let (id, quantity, notes) = parse_item_spec(spec)?;
                cart.add_from_catalog(&catalog, id, quantity, notes)
                    .await
                    .with_context(|| format!("cannot add item '{}'", spec))?;
            }

            let request = cart.checkout(state.settings.effective_tax_rate())?;
            let created = state
                .orders
                .create_order(request)
                .await
                .context("failed to create order")?;
            let details = state.orders.get_order(created.order_id).await?;

            if json {
                print_json(&details)?;
            } else {
                println!("Created order {} ({})", created.order_number, created.order_id);
                render_details(&details, &symbol);
            }
            Ok(())
        }
        OrderCommands::Show(args) => {
            let details = match Uuid::from_str(&args.order) {
                Ok(id) => state.orders.get_order(id).await,
                Err(_) => state.orders.get_order_by_number(&args.order).await,
            }
            .with_context(|| format!("failed to fetch order {}", args.order))?;

            if json {
                print_json(&details)?;
            } else {
                render_details(&details, &symbol);
            }
            Ok(())
        }
        OrderCommands::List(args) => {
            let mut filter = OrderFilter::default()
                .with_statuses(args.statuses.into_iter().map(OrderStatus::from))
                .sorted(if args.desc {
                    SortDirection::Descending
                } else {
                    SortDirection::Ascending
                });
            if let Some(from) = args.from {
                filter.created_from = Some(local_day_bounds(from).0);
            }
            if let Some(to) = args.to {
                filter.created_to =
                    Some(local_day_bounds(to).1 - chrono::Duration::microseconds(1));
            }
            if let Some(limit) = args.limit {
                filter = filter.limit(limit);
            }

            let orders = state
                .orders
                .list_orders(&filter)
                .await
                .context("failed to list orders")?;
            if json {
                print_json(&orders)?;
            } else if orders.is_empty() {
                println!("No orders matched the provided filters.");
            } else {
                println!("Orders ({} total):", orders.len());
                for order in &orders {
                    render_order(order, &symbol);
                }
            }
            Ok(())
        }
        OrderCommands::Advance(args) => {
            let order = state
                .orders
                .transition_status(args.id, args.to.into())
                .await
                .with_context(|| format!("failed to update order {}", args.id))?;
            if json {
                print_json(&order)?;
            } else {
                println!("Order {} is now {}", order.order_number, order.status);
            }
            Ok(())
        }
    }
}

async fn handle_kitchen_command(
    state: &AppState,
    command: KitchenCommands,
    json: bool,
) -> Result<()> {
    match command {
        KitchenCommands::Board(args) => {
            let filter = KitchenFilter::from_str(&args.filter)?;
            if !args.watch {
                let board = state.kitchen.reload(Utc::now()).await?;
                return render_board(&board, filter, json);
            }

            let mut ticker = tokio::time::interval(state.config.kitchen_refresh_interval());
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match state.kitchen.reload(Utc::now()).await {
                            Ok(board) => {
                                if !json {
                                    // clear screen and home the cursor
                                    print!("\x1B[2J\x1B[H");
                                }
                                render_board(&board, filter, json)?;
                            }
                            Err(e) => warn!(error = %e, "Kitchen refresh failed"),
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        debug!("Stopping kitchen board");
                        return Ok(());
                    }
                }
            }
        }
        KitchenCommands::Bump(args) => {
            let order = state
                .kitchen
                .bump(args.id, Utc::now())
                .await
                .with_context(|| format!("failed to bump order {}", args.id))?;
            if json {
                print_json(&order)?;
            } else {
                println!("Order {} moved to {}", order.order_number, order.status);
            }
            Ok(())
        }
    }
}

async fn handle_report_command(
    state: &AppState,
    command: ReportCommands,
    json: bool,
) -> Result<()> {
    match command {
        ReportCommands::Sales(args) => {
            let range = match (args.from, args.to) {
                (Some(from), Some(to)) => DateRange::new(from, to)?,
                _ => {
                    let period = args
                        .period
                        .map(ReportPeriod::from)
                        .unwrap_or(state.settings.report_defaults().period);
                    let reference = args.date.unwrap_or_else(|| Local::now().date_naive());
                    period.range_for(reference)
                }
            };

            let report = state
                .reports
                .sales_report_for(range)
                .await
                .context("failed to build sales report")?;

            if let Some(path) = &args.csv {
                fs::write(path, report.to_csv())
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
            if let Some(path) = &args.daily_csv {
                fs::write(path, report.daily_csv())
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }

            if json {
                print_json(&report)?;
            } else {
                render_report(
                    &report,
                    range,
                    state.settings.currency_symbol(),
                    state.settings.report_defaults().top_items,
                );
                if let Some(path) = &args.csv {
                    println!("Item breakdown written to {}", path.display());
                }
                if let Some(path) = &args.daily_csv {
                    println!("Daily breakdown written to {}", path.display());
                }
            }
            Ok(())
        }
    }
}

fn parse_item_spec(spec: &str) -> Result<(i64, i32, Option<String>)> {
    let mut parts = spec.splitn(3, ':');
    let id = parts
        .next()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| anyhow!("item '{}' is missing a menu item id", spec))?
        .parse::<i64>()
        .with_context(|| format!("invalid menu item id in '{}'", spec))?;
    let quantity = match parts.next() {
        Some(q) => q
            .parse::<i32>()
            .with_context(|| format!("invalid quantity in '{}'", spec))?,
        None => 1,
    };
    let notes = parts.next().map(str::to_string).filter(|n| !n.is_empty());
    if quantity <= 0 {
        bail!("quantity must be positive in '{}'", spec);
    }
    Ok((id, quantity, notes))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_order(order: &OrderResponse, symbol: &str) {
    println!(
        "- {} • {} • {} • {} • {} • {}",
        order.order_number,
        order.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        order.customer_name,
        order.order_type,
        order.status,
        format_currency(order.total_amount, symbol)
    );
}

fn render_details(details: &OrderDetails, symbol: &str) {
    let order = &details.order;
    render_order(order, symbol);
    for item in &details.items {
        match &item.notes {
            Some(notes) => println!(
                "    {} x {} @ {} = {} ({})",
                item.quantity,
                item.name,
                format_currency(item.unit_price, symbol),
                format_currency(item.total_price, symbol),
                notes
            ),
            None => println!(
                "    {} x {} @ {} = {}",
                item.quantity,
                item.name,
                format_currency(item.unit_price, symbol),
                format_currency(item.total_price, symbol)
            ),
        }
    }
    println!(
        "  subtotal {} • tax {} • total {} • paid by {}",
        format_currency(order.subtotal, symbol),
        format_currency(order.tax_amount, symbol),
        format_currency(order.total_amount, symbol),
        order.payment_method
    );
}

fn render_board(board: &KitchenBoard, filter: KitchenFilter, json: bool) -> Result<()> {
    let tickets = board.filter(filter);
    if json {
        return print_json(&tickets);
    }

    let counts = board.counts();
    println!(
        "Kitchen • pending {} • preparing {} • ready {} • urgent {}",
        counts.get(&OrderStatus::Pending).copied().unwrap_or(0),
        counts.get(&OrderStatus::Preparing).copied().unwrap_or(0),
        counts.get(&OrderStatus::Ready).copied().unwrap_or(0),
        board.urgent_count()
    );
    if tickets.is_empty() {
        println!("No orders in queue.");
    }
    for ticket in tickets {
        println!(
            "{} {} [{}] {} min{}",
            if ticket.urgent { "!" } else { "-" },
            ticket.order.order_number,
            ticket.order.status,
            ticket.wait_minutes,
            match ticket.order.status.next() {
                Some(next) => format!(" → {}", next),
                None => String::new(),
            }
        );
        for item in &ticket.items {
            match &item.notes {
                Some(notes) => println!("    {} x {} ({})", item.quantity, item.name, notes),
                None => println!("    {} x {}", item.quantity, item.name),
            }
        }
    }
    Ok(())
}

fn render_report(report: &SalesReport, range: DateRange, symbol: &str, top: usize) {
    println!("Sales {} to {}", range.start, range.end);
    println!(
        "  orders {} • sales {} • tax {} • average {}",
        report.total_orders,
        format_currency(report.total_sales, symbol),
        format_currency(report.total_tax, symbol),
        format_currency(report.average_order_value, symbol)
    );
    if !report.payment_methods.is_empty() {
        println!("  By payment method:");
        for (method, sales) in &report.payment_methods {
            println!(
                "    {}: {} orders, {}",
                method,
                sales.orders,
                format_currency(sales.total, symbol)
            );
        }
    }
    if range.start != range.end && !report.daily.is_empty() {
        println!("  By day:");
        for (date, sales) in &report.daily {
            println!(
                "    {}: {} orders, {}",
                date,
                sales.orders,
                format_currency(sales.total, symbol)
            );
        }
    }
    let rows = report.top_items(top);
    if !rows.is_empty() {
        println!("  Top items:");
        for row in rows {
            println!(
                "    {} x {} = {}",
                row.quantity,
                row.name,
                format_currency(row.revenue, symbol)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_parses_without_a_connection_target() {
        let cli = Cli::try_parse_from(["pos-cli", "migrate"]).unwrap();
        assert!(matches!(cli.command, Commands::Migrate));
        assert!(!cli.json);
    }

    #[test]
    fn sales_report_accepts_both_csv_outputs() {
        let cli = Cli::try_parse_from([
            "pos-cli",
            "--json",
            "report",
            "sales",
            "--period",
            "weekly",
            "--csv",
            "items.csv",
            "--daily-csv",
            "days.csv",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Report(ReportCommands::Sales(args)) => {
                assert!(matches!(args.period, Some(PeriodArg::Weekly)));
                assert_eq!(args.daily_csv, Some(PathBuf::from("days.csv")));
            }
            _ => panic!("expected report sales"),
        }
    }

    #[test]
    fn item_specs() {
        assert_eq!(parse_item_spec("3:2").unwrap(), (3, 2, None));
        assert_eq!(parse_item_spec("3").unwrap(), (3, 1, None));
        assert_eq!(
            parse_item_spec("7:1:no ice: extra lemon").unwrap(),
            (7, 1, Some("no ice: extra lemon".to_string()))
        );
        assert!(parse_item_spec("x:1").is_err());
        assert!(parse_item_spec("3:0").is_err());
        assert!(parse_item_spec(":2").is_err());
    }
}
