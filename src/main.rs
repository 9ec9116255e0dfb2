use anyhow::Result;
use clap::{Parser, Subcommand};

use std::path::Path;

use mkm::{
    delay::DelayPolicy,
    display,
    error::Error,
    query::{self, Column, Filter, Query},
    reports::{Reports, Selection},
    session::{Session, SessionConfig, SessionManager},
};

/// Directory downloaded reports land in.
const REPORT_DIR: &str = "csv_files";

const DEFAULT_COLUMNS: &str = "Set Name,Product Name,Qty,Sum,Price,Purchased";

#[derive(Parser)]
#[command(
    name = "mkm",
    version,
    about = "Download and search Cardmarket purchase-history reports"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download generated reports, skipping files already present; give a
    /// year and month to re-download one report.
    Download {
        /// The year of the report to download.
        #[arg(short, long)]
        year: Option<i32>,
        /// The month of the report to download.
        #[arg(short, long)]
        month: Option<u32>,
    },
    /// Search the downloaded order details, with filtering and sorting.
    Search {
        /// The name of the product to search for.
        #[arg(short = 'p', long)]
        product_name: Option<String>,
        /// The name of the set to filter for.
        #[arg(short = 's', long)]
        set_name: Option<String>,
        /// The user name of the seller.
        #[arg(short = 'u', long)]
        user_name: Option<String>,
        /// The date of purchase as "YYYY-MM-DD"; prefix with ">" or "<",
        /// or give "YYYY-MM-DD to YYYY-MM-DD".
        #[arg(short = 'd', long)]
        date_of_purchase: Option<String>,
        /// Show only foils.
        #[arg(short = 'f', long)]
        foil: bool,
        /// Column name to sort by (e.g. "Product Name", "Price").
        #[arg(long, visible_alias = "sb", default_value = "Product Name")]
        sort_by: String,
        /// Sort in ascending order.
        #[arg(long, visible_alias = "asc")]
        ascending: bool,
        /// A preset (Limited, Standard, Extended, Modern or Legacy) or a
        /// comma-separated list of column names.
        #[arg(long, visible_alias = "dc", default_value = DEFAULT_COLUMNS)]
        display_columns: String,
        /// Limit the number of rows displayed in the results.
        #[arg(short = 'l', long, default_value_t = 100)]
        limit: usize,
    },
    /// Ask the site to generate monthly purchase reports.
    GenerateReports {
        /// Generate every available report.
        #[arg(short = 'a', long)]
        all: bool,
        /// Generate reports for this year.
        #[arg(short = 'y', long)]
        year: Option<i32>,
        /// In combination with --year, limit generation to this month.
        #[arg(short = 'm', long)]
        month: Option<u32>,
        /// Generate the report for the current month.
        #[arg(short = 'c', long)]
        current_month: bool,
        /// Generate the report for the previous month.
        #[arg(short = 'p', long)]
        previous_month: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    match Cli::parse().command {
        Command::Download { year, month } => download(year, month),
        Command::Search {
            product_name,
            set_name,
            user_name,
            date_of_purchase,
            foil,
            sort_by,
            ascending,
            display_columns,
            limit,
        } => search(SearchArgs {
            product_name,
            set_name,
            user_name,
            date_of_purchase,
            foil,
            sort_by,
            ascending,
            display_columns,
            limit,
        }),
        Command::GenerateReports {
            all,
            year,
            month,
            current_month,
            previous_month,
        } => generate(all, year, month, current_month, previous_month),
    }
}

fn login() -> Result<Session> {
    let manager = SessionManager::new(SessionConfig::default())?;
    Ok(manager.login()?)
}

fn check_month(month: u32) -> Result<()> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        Err(Error::Input(format!("{month} is not a month (1-12)")).into())
    }
}

fn download(year: Option<i32>, month: Option<u32>) -> Result<()> {
    let period = match (year, month) {
        (Some(year), Some(month)) => {
            check_month(month)?;
            Some((year, month))
        }
        (None, None) => None,
        _ => {
            return Err(Error::Input(
                "year and month must be given together, or both left out".into(),
            )
            .into())
        }
    };
    let reports = Reports::new(login()?, REPORT_DIR, DelayPolicy::default());
    reports.download(period)?;
    Ok(())
}

fn generate(
    all: bool,
    year: Option<i32>,
    month: Option<u32>,
    current_month: bool,
    previous_month: bool,
) -> Result<()> {
    if let Some(month) = month {
        check_month(month)?;
    }
    let selection = if all {
        Selection::All
    } else if current_month {
        Selection::CurrentMonth
    } else if previous_month {
        Selection::PreviousMonth
    } else if let Some(year) = year {
        match month {
            Some(month) => Selection::Month { year, month },
            None => Selection::Year(year),
        }
    } else if month.is_some() {
        return Err(Error::Input(
            "--month needs --year; use --current-month for this month".into(),
        )
        .into());
    } else {
        return Err(Error::Input(
            "nothing selected; pass --all, --year, --current-month or --previous-month".into(),
        )
        .into());
    };
    let reports = Reports::new(login()?, REPORT_DIR, DelayPolicy::default());
    reports.generate(&selection)?;
    Ok(())
}

struct SearchArgs {
    product_name: Option<String>,
    set_name: Option<String>,
    user_name: Option<String>,
    date_of_purchase: Option<String>,
    foil: bool,
    sort_by: String,
    ascending: bool,
    display_columns: String,
    limit: usize,
}

fn search(args: SearchArgs) -> Result<()> {
    let mut columns = display_columns(&args.display_columns)?;
    let mut filters = Vec::new();
    // Each active filter's column is pulled to the front of the display
    // list when not already shown, most specific filter first.
    let wanted = [
        (Column::Purchased, args.date_of_purchase),
        (Column::Foil, args.foil.then(|| "true".to_string())),
        (Column::Username, args.user_name),
        (Column::SetName, args.set_name),
        (Column::ProductName, args.product_name),
    ];
    for (column, pattern) in wanted {
        let Some(pattern) = pattern else { continue };
        filters.push(Filter { column, pattern });
        if !columns.contains(&column) {
            columns.insert(0, column);
        }
    }
    let query = Query {
        filters,
        sort_by: Column::parse(&args.sort_by)?,
        ascending: args.ascending,
        columns,
        limit: args.limit,
    };
    let rows = query::load_rows(Path::new(REPORT_DIR))?;
    println!("{}", display::render(&query.run(rows)?));
    Ok(())
}

/// Expands a display-column preset, or parses a comma-separated list of
/// column names.
fn display_columns(spec: &str) -> Result<Vec<Column>> {
    let preset = match spec.trim().to_ascii_lowercase().as_str() {
        "limited" | "1" => Some("Product Name,Qty,Quality,Foil"),
        "standard" | "2" => Some("Product Name,Set Name,Qty,Quality,Lang,Foil,Price,Purchased"),
        "extended" | "3" => Some("Product Name,Set Name,Qty,Sum,Price,Purchased,Username,OrderID"),
        "modern" | "4" => Some("Set Name,Product Name,Username,OrderID,Qty,Sum,Price,Purchased"),
        "legacy" | "5" => Some("Username,OrderID,Shipment Costs,Sum,Price,Purchased"),
        _ => None,
    };
    preset
        .unwrap_or(spec)
        .split(',')
        .map(|name| Ok(Column::parse(name)?))
        .collect()
}
