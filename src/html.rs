//! Scraping helpers for the handful of marketplace pages the tool reads.
//!
//! Deliberately small and tailored to one site: each function answers a
//! single question about a page, so the session and report code stay free of
//! selector plumbing.

use log::warn;
use scraper::{ElementRef, Html, Selector};

/// Name of the rotating anti-forgery field present on every form page.
pub const TOKEN_FIELD: &str = "__cmtkn";

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// The value of the hidden `<input>` with the given name, if the page has
/// one.
#[must_use]
pub fn hidden_input(html: &str, name: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let input = selector(&format!(r#"input[name="{name}"]"#));
    document
        .select(&input)
        .next()?
        .value()
        .attr("value")
        .map(str::to_string)
}

/// All option values of the named `<select>` element, in document order.
#[must_use]
pub fn select_options(html: &str, name: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let options = selector(&format!(r#"select[name="{name}"] option"#));
    document
        .select(&options)
        .filter_map(|option| option.value().attr("value"))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether the page was served to a logged-in account. The site only
/// renders the logout control for authenticated sessions.
#[must_use]
pub fn is_logged_in(html: &str) -> bool {
    html.contains("Logout")
}

/// One report row scraped from the downloads page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadForm {
    /// Report filename, taken from the submit button's label.
    pub filename: String,
    /// Anti-forgery token for this row's download form.
    pub token: String,
    /// Per-row request id identifying the generated file.
    pub request_id: String,
}

/// Extracts every report-download form whose action ends in `action` (the
/// page spells actions with the site/language prefix).
///
/// Forms missing any of the expected fields are skipped with a warning
/// rather than failing the whole listing.
#[must_use]
pub fn download_forms(html: &str, action: &str) -> Vec<DownloadForm> {
    let document = Html::parse_document(html);
    let form = selector(&format!(r#"form[action$="{action}"]"#));
    let button = selector("button");
    let mut forms = Vec::new();
    for element in document.select(&form) {
        let token = input_value(element, TOKEN_FIELD);
        let request_id = input_value(element, "idRequest");
        let filename = element
            .select(&button)
            .next()
            .map(|b| b.text().collect::<String>().trim().to_string());
        match (token, request_id, filename) {
            (Some(token), Some(request_id), Some(filename)) if !filename.is_empty() => {
                forms.push(DownloadForm {
                    filename,
                    token,
                    request_id,
                });
            }
            _ => warn!("skipping a download form with missing fields"),
        }
    }
    forms
}

fn input_value(form: ElementRef, name: &str) -> Option<String> {
    form.select(&selector(&format!(r#"input[name="{name}"]"#)))
        .next()?
        .value()
        .attr("value")
        .map(str::to_string)
}
