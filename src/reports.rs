//! Report generation and download against the marketplace account pages.
//!
//! Reports are produced asynchronously on the site: a generation request
//! queues one month's purchase summary, and the downloads page later lists
//! the finished files. Both operations treat per-item failures as warnings
//! and keep going; only a page that cannot be loaded at all stops a run.

use chrono::{Datelike, Local, NaiveDate};
use log::{error, warn};

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    delay::DelayPolicy,
    error::{Error, Result},
    html,
    session::Session,
};

const STATISTICS_PATH: &str = "/Account/Statistics";
const DOWNLOADS_PATH: &str = "/Account/Downloads";
const GENERATE_PATH: &str = "/PostGetAction/Reports_Asynchronous_GetMonthlyPurchaseSummary";
const DOWNLOAD_PATH: &str = "/PostGetAction/User_Reporting_DownloadReportFileFromAws";
/// Report filenames encode their period after this marker, e.g.
/// `Purchases-somebody-byPurchaseDate-2024-03-01-2024-03-31.csv`.
const PERIOD_MARKER: &str = "-byPurchaseDate-";

/// Which report periods to generate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every year and month the statistics page offers.
    All,
    /// Every month of one year.
    Year(i32),
    /// A single month.
    Month { year: i32, month: u32 },
    CurrentMonth,
    PreviousMonth,
}

impl Selection {
    /// Resolves the selection to concrete (year, month) pairs, silently
    /// dropping any pair after `today`'s month.
    ///
    /// `available` is the year/month universe scraped from the statistics
    /// page; only [`Selection::All`] consults it.
    #[must_use]
    pub fn resolve(&self, today: NaiveDate, available: &Available) -> Vec<(i32, u32)> {
        let pairs: Vec<(i32, u32)> = match self {
            Self::All => available
                .years
                .iter()
                .flat_map(|&year| available.months.iter().map(move |&month| (year, month)))
                .collect(),
            Self::Year(year) => (1..=12).map(|month| (*year, month)).collect(),
            Self::Month { year, month } => vec![(*year, *month)],
            Self::CurrentMonth => vec![(today.year(), today.month())],
            Self::PreviousMonth => {
                let last_month = previous_month(today);
                vec![(last_month.year(), last_month.month())]
            }
        };
        pairs
            .into_iter()
            .filter(|&(year, month)| !is_future(year, month, today))
            .collect()
    }
}

/// Year and month option values scraped from the statistics page.
#[derive(Debug, Clone, Default)]
pub struct Available {
    pub years: Vec<i32>,
    pub months: Vec<u32>,
}

/// First day of the month before `today`'s.
fn previous_month(today: NaiveDate) -> NaiveDate {
    let first = today.with_day(1).expect("day 1 is always valid");
    first.pred_opt().expect("no month precedes the minimum date")
}

/// Whether (year, month) lies strictly after `today`'s month.
#[must_use]
pub fn is_future(year: i32, month: u32, today: NaiveDate) -> bool {
    year > today.year() || (year == today.year() && month > today.month())
}

/// Derives (year, month) from a report filename.
///
/// # Errors
///
/// Returns [`Error::UnparsableFilename`] when the filename does not carry
/// the period marker followed by a year and month.
pub fn period_from_filename(filename: &str) -> Result<(i32, u32)> {
    let parsed = || -> Option<(i32, u32)> {
        let (_, tail) = filename.split_once(PERIOD_MARKER)?;
        let mut parts = tail.split('-');
        let year = parts.next()?.parse().ok()?;
        let month = parts
            .next()?
            .trim_end_matches(|c: char| !c.is_ascii_digit())
            .parse()
            .ok()?;
        (1..=12).contains(&month).then_some((year, month))
    };
    parsed().ok_or_else(|| Error::UnparsableFilename(filename.to_string()))
}

/// Drives report generation and download over an authenticated session.
pub struct Reports {
    session: Session,
    dir: PathBuf,
    delay: DelayPolicy,
}

impl Reports {
    #[must_use]
    pub fn new(session: Session, dir: impl Into<PathBuf>, delay: DelayPolicy) -> Self {
        Self {
            session,
            dir: dir.into(),
            delay,
        }
    }

    /// Submits one report-generation request per selected period.
    ///
    /// Individual request failures are logged and the remaining periods
    /// still run; nothing is retried.
    ///
    /// # Errors
    ///
    /// Returns errors when the statistics page cannot be loaded or is
    /// missing its hidden identifier fields.
    pub fn generate(&self, selection: &Selection) -> Result<()> {
        let page = self.session.get(STATISTICS_PATH)?;
        let token = statistics_field(&page, html::TOKEN_FIELD)?;
        let id_user = statistics_field(&page, "idUser")?;
        let price_for_buyer = statistics_field(&page, "priceForBuyer")?;
        let available = Available {
            years: parsed_options(&page, "year"),
            months: parsed_options(&page, "month"),
        };
        let today = Local::now().date_naive();
        for (year, month) in selection.resolve(today, &available) {
            let year = year.to_string();
            let month = month.to_string();
            let form = [
                (html::TOKEN_FIELD, token.as_str()),
                ("idUser", id_user.as_str()),
                ("priceForBuyer", price_for_buyer.as_str()),
                ("month", month.as_str()),
                ("year", year.as_str()),
                ("dateUsed", "datePurchased"),
                ("format", "csv"),
            ];
            match self.session.post_form(GENERATE_PATH, &form) {
                Ok(_) => println!("Report generation initiated for {year}-{month}"),
                Err(err) => error!("failed to initiate report for {year}-{month}: {err}"),
            }
            self.delay.pause();
        }
        Ok(())
    }

    /// Downloads generated report files into the report directory.
    ///
    /// With an explicit period only the matching file is fetched, replacing
    /// any local copy; without one, every listed file not yet present is
    /// fetched. Rows whose filename does not parse, and individual download
    /// failures, are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Input`] for a period in the future, and errors when
    /// the downloads page cannot be loaded.
    pub fn download(&self, period: Option<(i32, u32)>) -> Result<()> {
        if let Some((year, month)) = period {
            if is_future(year, month, Local::now().date_naive()) {
                return Err(Error::Input(format!(
                    "cannot download a report for the future period {year}-{month:02}"
                )));
            }
        }
        fs::create_dir_all(&self.dir)?;
        let page = self.session.get(DOWNLOADS_PATH)?;
        for form in dedup(html::download_forms(&page, DOWNLOAD_PATH)) {
            let file_period = match period_from_filename(&form.filename) {
                Ok(file_period) => file_period,
                Err(err) => {
                    warn!("{err}");
                    continue;
                }
            };
            let path = self.dir.join(&form.filename);
            match period {
                Some(period) => {
                    if file_period != period {
                        continue;
                    }
                    println!("Forcing download for {}...", form.filename);
                }
                None if path.exists() => {
                    println!("{} already downloaded.", form.filename);
                    continue;
                }
                None => {}
            }
            match self.fetch_file(&form, &path) {
                Ok(()) => println!("Downloaded {}", form.filename),
                Err(err) => error!("failed to download {}: {err}", form.filename),
            }
            self.delay.pause();
        }
        Ok(())
    }

    /// Fetches one file, written atomically so an interrupted run never
    /// leaves a half-report behind for the presence check to trust.
    fn fetch_file(&self, form: &html::DownloadForm, path: &Path) -> Result<()> {
        let response = self.session.post_form(
            DOWNLOAD_PATH,
            &[
                (html::TOKEN_FIELD, form.token.as_str()),
                ("idRequest", form.request_id.as_str()),
            ],
        )?;
        let body = response.bytes()?;
        let staged = path.with_extension("part");
        fs::write(&staged, &body)?;
        fs::rename(&staged, path)?;
        Ok(())
    }
}

fn statistics_field(page: &str, field: &'static str) -> Result<String> {
    html::hidden_input(page, field).ok_or_else(|| Error::TokenNotFound {
        field,
        page: "statistics page".to_string(),
    })
}

fn parsed_options<T: std::str::FromStr>(page: &str, name: &str) -> Vec<T> {
    html::select_options(page, name)
        .iter()
        .filter_map(|value| value.parse().ok())
        .collect()
}

/// The downloads page repeats rows; keep the first of each identity.
fn dedup(forms: Vec<html::DownloadForm>) -> Vec<html::DownloadForm> {
    let mut seen = HashSet::new();
    forms
        .into_iter()
        .filter(|form| seen.insert((form.filename.clone(), form.request_id.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn period_from_filename_fn_reads_year_and_month() {
        assert_eq!(
            period_from_filename("Purchases-somebody-byPurchaseDate-2024-03-01-2024-03-31.csv")
                .unwrap(),
            (2024, 3)
        );
        // A short form with the extension right after the month.
        assert_eq!(
            period_from_filename("Purchases-byPurchaseDate-2023-12.csv").unwrap(),
            (2023, 12)
        );
    }

    #[test]
    fn period_from_filename_fn_rejects_unmarked_names() {
        assert!(matches!(
            period_from_filename("Purchases-somebody-2024-03.csv"),
            Err(Error::UnparsableFilename(_))
        ));
        assert!(period_from_filename("byPurchaseDate").is_err());
        assert!(period_from_filename("x-byPurchaseDate-2024-13.csv").is_err());
    }

    #[test]
    fn resolve_fn_skips_future_months_for_an_explicit_year() {
        let selection = Selection::Year(2024);
        let pairs = selection.resolve(date(2024, 3, 15), &Available::default());
        assert_eq!(pairs, vec![(2024, 1), (2024, 2), (2024, 3)]);
    }

    #[test]
    fn resolve_fn_drops_an_entirely_future_selection() {
        let selection = Selection::Month {
            year: 2025,
            month: 1,
        };
        assert!(selection
            .resolve(date(2024, 3, 15), &Available::default())
            .is_empty());
    }

    #[test]
    fn resolve_fn_expands_all_from_the_scraped_universe() {
        let available = Available {
            years: vec![2023, 2024],
            months: (1..=12).collect(),
        };
        let pairs = Selection::All.resolve(date(2024, 2, 1), &available);
        assert_eq!(pairs.len(), 14, "12 past months of 2023 plus Jan-Feb 2024");
        assert!(!pairs.contains(&(2024, 3)));
    }

    #[test]
    fn resolve_fn_wraps_the_previous_month_over_new_year() {
        let pairs = Selection::PreviousMonth.resolve(date(2024, 1, 10), &Available::default());
        assert_eq!(pairs, vec![(2023, 12)]);
    }

    #[test]
    fn resolve_fn_picks_the_current_month() {
        let pairs = Selection::CurrentMonth.resolve(date(2024, 6, 1), &Available::default());
        assert_eq!(pairs, vec![(2024, 6)]);
    }

    #[test]
    fn is_future_fn_is_strict() {
        let today = date(2024, 3, 15);
        assert!(!is_future(2024, 3, today));
        assert!(is_future(2024, 4, today));
        assert!(is_future(2025, 1, today));
        assert!(!is_future(2023, 12, today));
    }

    #[test]
    fn dedup_fn_drops_repeated_listing_rows() {
        let html = std::fs::read_to_string("testdata/downloads.html").unwrap();
        let forms = dedup(html::download_forms(&html, DOWNLOAD_PATH));
        assert_eq!(forms.len(), 2, "duplicate March row collapsed: {forms:?}");
    }
}
