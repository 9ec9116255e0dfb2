//! Loading downloaded reports and querying the parsed line items.
//!
//! Every query starts from scratch: all report files in the local directory
//! are merged, each order's description field is expanded into product line
//! items, and the resulting rows are filtered, sorted and projected for
//! display. Nothing is cached between runs.

use chrono::{NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use serde::Deserialize;
use serde_with::DeserializeFromStr;

use std::{
    cmp::Ordering,
    collections::HashMap,
    fmt::{self, Display},
    fs,
    path::Path,
    str::FromStr,
};

use crate::{
    error::{Error, Result},
    parse::{DescriptionParser, LineItem},
    price::Price,
};

/// Purchase date column; the site writes either a bare date or a
/// timestamp, and only the date part matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, DeserializeFromStr)]
pub struct PurchaseDate(pub NaiveDate);

impl FromStr for PurchaseDate {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        match NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            Ok(timestamp) => Ok(Self(timestamp.date())),
            Err(_) => NaiveDate::parse_from_str(s, "%Y-%m-%d").map(Self),
        }
    }
}

impl Display for PurchaseDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// One row of a purchase report, in the column order the site exports.
///
/// The export's header line is not worth trusting (it changes spelling with
/// the account language), so rows deserialize by position.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub username: String,
    pub name: String,
    pub street: String,
    pub city: String,
    pub country: String,
    pub is_professional: String,
    pub vat_number: String,
    pub purchased: PurchaseDate,
    pub article_count: i64,
    pub merchandise_value: Option<Price>,
    pub shipment_costs: Option<Price>,
    pub trustee_fee: Option<Price>,
    pub total_value: Option<Price>,
    pub currency: String,
    pub description: String,
    pub product_id: String,
    pub localized_product_name: String,
}

/// One product line item joined back to its order's fields.
#[derive(Debug, Clone)]
pub struct Row {
    pub order: OrderRecord,
    pub item: LineItem,
}

/// Loads every `*.csv` report in `dir` and expands each order into one row
/// per parsed product line item.
///
/// Files are merged as-is: overlapping periods downloaded twice will
/// surface duplicate line items, exactly as the reports on disk say.
/// A missing directory simply yields no rows.
///
/// # Errors
///
/// Returns errors when a report file cannot be opened or a row does not
/// fit the export schema.
pub fn load_rows(dir: &Path) -> Result<Vec<Row>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    paths.sort();

    let mut parsers: HashMap<String, DescriptionParser> = HashMap::new();
    let mut rows = Vec::new();
    for path in paths {
        let mut reader = ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .from_path(&path)?;
        for record in reader.records() {
            let record = record?;
            let order: OrderRecord = record.deserialize(None)?;
            let parser = parsers
                .entry(order.currency.clone())
                .or_insert_with(|| DescriptionParser::new(&order.currency));
            for item in parser.parse(&order.description) {
                rows.push(Row {
                    order: order.clone(),
                    item,
                });
            }
        }
    }
    Ok(rows)
}

/// Queryable columns of the joined order/line-item table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    OrderId,
    Username,
    Purchased,
    ArticleCount,
    MerchandiseValue,
    ShipmentCosts,
    TotalValue,
    Currency,
    Qty,
    ProductName,
    SetName,
    Price,
    Sum,
    Quality,
    Lang,
    Foil,
}

impl Column {
    pub const ALL: [Self; 16] = [
        Self::OrderId,
        Self::Username,
        Self::Purchased,
        Self::ArticleCount,
        Self::MerchandiseValue,
        Self::ShipmentCosts,
        Self::TotalValue,
        Self::Currency,
        Self::Qty,
        Self::ProductName,
        Self::SetName,
        Self::Price,
        Self::Sum,
        Self::Quality,
        Self::Lang,
        Self::Foil,
    ];

    /// Header name, spelled the way the site's exports spell it.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::OrderId => "OrderID",
            Self::Username => "Username",
            Self::Purchased => "Purchased",
            Self::ArticleCount => "Article Count",
            Self::MerchandiseValue => "Merchandise Value",
            Self::ShipmentCosts => "Shipment Costs",
            Self::TotalValue => "Total Value",
            Self::Currency => "Currency",
            Self::Qty => "Qty",
            Self::ProductName => "Product Name",
            Self::SetName => "Set Name",
            Self::Price => "Price",
            Self::Sum => "Sum",
            Self::Quality => "Quality",
            Self::Lang => "Lang",
            Self::Foil => "Foil",
        }
    }

    /// Case-insensitive lookup by header name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownColumn`] for names outside the schema.
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|column| column.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))
    }
}

/// A single cell, shaped for comparing and printing. Absent values render
/// as empty cells and sort before present ones.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(Option<String>),
    Count(Option<i64>),
    Money(Option<Price>),
    Date(NaiveDate),
    Flag(bool),
}

impl Value {
    /// Cell text for display.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Text(Some(text)) => text.clone(),
            Self::Count(Some(count)) => count.to_string(),
            Self::Money(Some(price)) => price.to_string(),
            Self::Date(date) => date.to_string(),
            Self::Flag(true) => "\u{2605}".into(),
            Self::Text(None) | Self::Count(None) | Self::Money(None) | Self::Flag(false) => {
                String::new()
            }
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Count(a), Self::Count(b)) => a.cmp(b),
            (Self::Money(a), Self::Money(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Flag(a), Self::Flag(b)) => a.cmp(b),
            // Mixed shapes never come from the same column.
            _ => Ordering::Equal,
        }
    }
}

impl Row {
    /// The cell for `column`.
    #[must_use]
    pub fn value(&self, column: Column) -> Value {
        match column {
            Column::OrderId => Value::Text(Some(self.order.order_id.clone())),
            Column::Username => Value::Text(Some(self.order.username.clone())),
            Column::Purchased => Value::Date(self.order.purchased.0),
            Column::ArticleCount => Value::Count(Some(self.order.article_count)),
            Column::MerchandiseValue => Value::Money(self.order.merchandise_value),
            Column::ShipmentCosts => Value::Money(self.order.shipment_costs),
            Column::TotalValue => Value::Money(self.order.total_value),
            Column::Currency => Value::Text(Some(self.order.currency.clone())),
            Column::Qty => Value::Count(self.item.quantity.map(i64::from)),
            Column::ProductName => Value::Text(self.item.product_name.clone()),
            Column::SetName => Value::Text(self.item.set_name.clone()),
            Column::Price => Value::Money(self.item.unit_price),
            Column::Sum => Value::Money(self.item.total_price),
            Column::Quality => Value::Text(Some(self.item.quality.to_string())),
            Column::Lang => Value::Text(self.item.language.map(|l| l.to_string())),
            Column::Foil => Value::Flag(self.item.foil),
        }
    }
}

/// One filter; the engine picks the comparison from the column's shape.
#[derive(Debug, Clone)]
pub struct Filter {
    pub column: Column,
    pub pattern: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateExpr {
    After(NaiveDate),
    Before(NaiveDate),
    Between(NaiveDate, NaiveDate),
    On(NaiveDate),
}

fn parse_date_expr(expr: &str) -> Result<DateExpr> {
    let parse = |s: &str| {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|_| Error::Input(format!("invalid date {:?}, expected YYYY-MM-DD", s.trim())))
    };
    let expr = expr.trim();
    if let Some(rest) = expr.strip_prefix('>') {
        Ok(DateExpr::After(parse(rest)?))
    } else if let Some(rest) = expr.strip_prefix('<') {
        Ok(DateExpr::Before(parse(rest)?))
    } else if let Some((start, end)) = expr.split_once(" to ") {
        Ok(DateExpr::Between(parse(start)?, parse(end)?))
    } else {
        Ok(DateExpr::On(parse(expr)?))
    }
}

enum Kind {
    Text,
    Count,
    Money,
    Date,
    Flag,
}

const fn kind_of(column: Column) -> Kind {
    match column {
        Column::Purchased => Kind::Date,
        Column::Foil => Kind::Flag,
        Column::ArticleCount | Column::Qty => Kind::Count,
        Column::MerchandiseValue
        | Column::ShipmentCosts
        | Column::TotalValue
        | Column::Price
        | Column::Sum => Kind::Money,
        _ => Kind::Text,
    }
}

fn apply_filter(rows: &mut Vec<Row>, filter: &Filter) -> Result<()> {
    match kind_of(filter.column) {
        Kind::Date => {
            let expr = parse_date_expr(&filter.pattern)?;
            rows.retain(|row| {
                let Value::Date(date) = row.value(filter.column) else {
                    return false;
                };
                match expr {
                    DateExpr::After(d) => date > d,
                    DateExpr::Before(d) => date < d,
                    DateExpr::Between(start, end) => date >= start && date <= end,
                    DateExpr::On(d) => date == d,
                }
            });
        }
        Kind::Text => {
            let needle = filter.pattern.to_lowercase();
            rows.retain(|row| match row.value(filter.column) {
                Value::Text(Some(text)) => text.to_lowercase().contains(&needle),
                _ => false,
            });
        }
        Kind::Flag => {
            let wanted = matches!(
                filter.pattern.trim().to_ascii_lowercase().as_str(),
                "true" | "yes" | "1"
            );
            rows.retain(|row| row.value(filter.column) == Value::Flag(wanted));
        }
        // A filter value that does not parse matches nothing: empty
        // result, not an error.
        Kind::Count => {
            let target = filter.pattern.trim().parse::<i64>().ok();
            rows.retain(|row| {
                target.is_some() && row.value(filter.column) == Value::Count(target)
            });
        }
        Kind::Money => {
            let target = filter.pattern.parse::<Price>().ok();
            rows.retain(|row| {
                target.is_some() && row.value(filter.column) == Value::Money(target)
            });
        }
    }
    Ok(())
}

/// Widths the long text columns are clipped to for display.
const TRUNCATE_WIDTH: usize = 35;

/// A query over the loaded rows; see [`Query::run`].
#[derive(Debug, Clone)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub sort_by: Column,
    pub ascending: bool,
    pub columns: Vec<Column>,
    pub limit: usize,
}

/// A display-ready result table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultTable {
    pub header: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
    /// True when the row limit cut the result short.
    pub truncated: bool,
    pub limit: usize,
}

impl Query {
    /// Filters, sorts, projects and truncates `rows` into a printable
    /// table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Input`] for a malformed date expression.
    pub fn run(&self, mut rows: Vec<Row>) -> Result<ResultTable> {
        for filter in &self.filters {
            apply_filter(&mut rows, filter)?;
        }
        rows.sort_by(|a, b| {
            let ordering = a.value(self.sort_by).compare(&b.value(self.sort_by));
            if self.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
        let truncated = rows.len() > self.limit;
        rows.truncate(self.limit);
        let table_rows = rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(|&column| {
                        let cell = row.value(column).render();
                        match column {
                            Column::ProductName | Column::SetName => clip(&cell, TRUNCATE_WIDTH),
                            _ => cell,
                        }
                    })
                    .collect()
            })
            .collect();
        Ok(ResultTable {
            header: self.columns.iter().map(|column| column.name()).collect(),
            rows: table_rows,
            truncated,
            limit: self.limit,
        })
    }
}

/// Clips to `width` display characters, marking the cut with a trailing
/// `-`.
fn clip(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut clipped: String = s.chars().take(width - 1).collect();
    clipped.push('-');
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn testdata_rows() -> Vec<Row> {
        load_rows(Path::new("testdata/reports")).unwrap()
    }

    fn base_query() -> Query {
        Query {
            filters: Vec::new(),
            sort_by: Column::ProductName,
            ascending: true,
            columns: vec![Column::ProductName, Column::Price],
            limit: 100,
        }
    }

    #[test]
    fn load_rows_fn_expands_orders_into_line_items() {
        // Two files: one with a two-product order plus a sleeves order,
        // one with a single-card order.
        let rows = testdata_rows();
        assert_eq!(rows.len(), 4, "{rows:#?}");
    }

    #[test]
    fn load_rows_fn_returns_nothing_for_a_missing_directory() {
        assert!(load_rows(Path::new("testdata/no-such-dir")).unwrap().is_empty());
    }

    #[test]
    fn run_fn_matches_substrings_case_insensitively() {
        let mut query = base_query();
        query.filters.push(Filter {
            column: Column::ProductName,
            pattern: "BEAST".into(),
        });
        let result = query.run(testdata_rows()).unwrap();
        assert_eq!(result.rows.len(), 1);
        assert!(result.rows[0][0].contains("Beast Token"));
    }

    #[test]
    fn run_fn_filters_by_username_across_files() {
        let mut query = base_query();
        query.filters.push(Filter {
            column: Column::Username,
            pattern: "wizard".into(),
        });
        let result = query.run(testdata_rows()).unwrap();
        assert_eq!(result.rows.len(), 3);
    }

    #[test]
    fn run_fn_keeps_only_foils_when_asked() {
        let mut query = base_query();
        query.filters.push(Filter {
            column: Column::Foil,
            pattern: "true".into(),
        });
        let result = query.run(testdata_rows()).unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0][0], "Myth Realized");
    }

    #[test]
    fn run_fn_excludes_the_boundary_on_either_side_of_a_date() {
        let mut query = base_query();
        query.filters.push(Filter {
            column: Column::Purchased,
            pattern: "> 2024-03-05".into(),
        });
        assert_eq!(query.run(testdata_rows()).unwrap().rows.len(), 2);

        query.filters[0].pattern = "< 2024-03-05".into();
        assert_eq!(query.run(testdata_rows()).unwrap().rows.len(), 0);
    }

    #[test]
    fn run_fn_includes_both_boundaries_of_a_date_range() {
        let mut query = base_query();
        query.filters.push(Filter {
            column: Column::Purchased,
            pattern: "2024-03-05 to 2024-03-12".into(),
        });
        assert_eq!(query.run(testdata_rows()).unwrap().rows.len(), 3);
    }

    #[test]
    fn run_fn_rejects_a_malformed_date_expression() {
        let mut query = base_query();
        query.filters.push(Filter {
            column: Column::Purchased,
            pattern: "> soon".into(),
        });
        assert!(matches!(query.run(testdata_rows()), Err(Error::Input(_))));
    }

    #[test]
    fn run_fn_sorts_by_the_requested_column() {
        let mut query = base_query();
        query.sort_by = Column::Price;
        let result = query.run(testdata_rows()).unwrap();
        let prices: Vec<&str> = result.rows.iter().map(|r| r[1].as_str()).collect();
        assert_eq!(prices, vec!["0.10", "3.50", "4.99", "5.99"]);
    }

    #[test]
    fn run_fn_reports_truncation_by_limit() {
        let mut query = base_query();
        query.limit = 2;
        let result = query.run(testdata_rows()).unwrap();
        assert_eq!(result.rows.len(), 2);
        assert!(result.truncated);

        query.limit = 100;
        assert!(!query.run(testdata_rows()).unwrap().truncated);
    }

    #[test]
    fn run_fn_clips_long_product_names_for_display() {
        let mut query = base_query();
        query.filters.push(Filter {
            column: Column::ProductName,
            pattern: "beast".into(),
        });
        let result = query.run(testdata_rows()).unwrap();
        let cell = &result.rows[0][0];
        assert_eq!(cell.chars().count(), TRUNCATE_WIDTH);
        assert!(cell.ends_with('-'), "clip marker missing: {cell}");
    }

    #[test]
    fn column_parse_fn_is_case_insensitive() {
        assert_eq!(Column::parse("product name").unwrap(), Column::ProductName);
        assert_eq!(Column::parse("OrderID").unwrap(), Column::OrderId);
    }

    #[test]
    fn column_parse_fn_rejects_unknown_names() {
        assert!(matches!(
            Column::parse("Bogus"),
            Err(Error::UnknownColumn(_))
        ));
    }

    #[test]
    fn an_unparsable_equality_filter_yields_an_empty_result() {
        let mut query = base_query();
        query.filters.push(Filter {
            column: Column::Qty,
            pattern: "lots".into(),
        });
        let result = query.run(testdata_rows()).unwrap();
        assert!(result.rows.is_empty());
    }
}
