//! Authenticated access to the marketplace.
//!
//! Logging in means surviving three different flows: a trusted-device
//! cookie that skips the form entirely, a plain username/password submit,
//! and a two-factor challenge. [`SessionManager::login`] drives them as an
//! explicit state machine so every transition and its failure mode stays
//! visible on its own.

use cookie_store::CookieStore;
use log::{info, warn};
use reqwest::blocking::{Client, Response};
use reqwest_cookie_store::CookieStoreMutex;

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

use crate::{
    credentials,
    delay::DelayPolicy,
    error::{Error, Result},
    html,
};

/// Browser profile presented to the site; the anti-bot layer rejects the
/// default library user agent outright.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

const LOGIN_PATH: &str = "/PostGetAction/User_Login";
const TFA_PATH: &str = "/PostGetAction/User_TwoFactorAuthentication";
/// Substring of the landing URL that marks the two-factor challenge page.
const TFA_URL_MARKER: &str = "TwoFactorAuthentication";

/// Where the session manager finds its inputs and leaves its state.
///
/// Paths are explicit so tests and alternate setups can redirect them; the
/// [`Default`] implementation gives the production values.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Site root, e.g. `https://www.cardmarket.com/en/Magic`.
    pub base_url: String,
    pub credentials_path: PathBuf,
    pub cookie_path: PathBuf,
    /// One-off pause before the first request, for the anti-bot heuristics.
    pub startup_delay: Duration,
    pub delay: DelayPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.cardmarket.com/en/Magic".into(),
            credentials_path: "config.yaml".into(),
            cookie_path: "cookies.json".into(),
            startup_delay: Duration::from_secs(2),
            delay: DelayPolicy::default(),
        }
    }
}

/// Progress of a login attempt.
///
/// Failure is not a state of its own: a transition that cannot proceed
/// returns the matching [`Error`] and the machine stops there.
#[derive(Debug)]
enum LoginState {
    Unauthenticated,
    TokenFetched { token: String },
    Submitted { landed_on: String, page: String },
    AwaitingTfa { token: String },
    Authenticated,
}

/// Owns the HTTP client and cookie jar, and knows how to turn credentials
/// into an authenticated [`Session`].
pub struct SessionManager {
    config: SessionConfig,
    http: Client,
    jar: Arc<CookieStoreMutex>,
}

impl SessionManager {
    /// Builds the HTTP client and loads any cookies persisted by an
    /// earlier run.
    ///
    /// # Errors
    ///
    /// Returns errors if the client cannot be constructed.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let jar = Arc::new(CookieStoreMutex::new(load_cookies(&config.cookie_path)));
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_provider(Arc::clone(&jar))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { config, http, jar })
    }

    /// Logs in and returns the authenticated session.
    ///
    /// Trusted-device cookies are tried first; otherwise the login form is
    /// submitted and, when the site demands it, the two-factor challenge is
    /// answered with the device marked as trusted. On success the cookie
    /// jar (and first-run credentials) are persisted so the next run can
    /// skip all of this.
    ///
    /// # Errors
    ///
    /// * [`Error::TokenNotFound`] when a page is missing its anti-forgery
    ///   field,
    /// * [`Error::TwoFactor`] when the verification code is rejected,
    /// * [`Error::Authentication`] when the credentials are.
    pub fn login(self) -> Result<Session> {
        let (credentials, needs_saving) =
            credentials::load_or_prompt(&self.config.credentials_path)?;
        thread::sleep(self.config.startup_delay);

        let mut state = LoginState::Unauthenticated;
        loop {
            state = match state {
                LoginState::Unauthenticated => {
                    let page = self.fetch_home()?;
                    if html::is_logged_in(&page) {
                        info!("resuming session from trusted-device cookies");
                        // The trusted path validated nothing, so it writes
                        // nothing back either.
                        return Ok(self.into_session());
                    }
                    let token = require_token(&page, "home page")?;
                    LoginState::TokenFetched { token }
                }
                LoginState::TokenFetched { token } => {
                    self.config.delay.pause();
                    let response = self
                        .http
                        .post(format!("{}{}", self.config.base_url, LOGIN_PATH))
                        .form(&[
                            ("username", credentials.username.as_str()),
                            ("userPassword", credentials.password.as_str()),
                            (html::TOKEN_FIELD, token.as_str()),
                            ("referalPage", "/en/Magic"),
                        ])
                        .send()?
                        .error_for_status()?;
                    let landed_on = response.url().to_string();
                    let page = response.text()?;
                    LoginState::Submitted { landed_on, page }
                }
                LoginState::Submitted { landed_on, page } => {
                    if landed_on.contains(TFA_URL_MARKER) {
                        let token = require_token(&page, "two-factor page")?;
                        LoginState::AwaitingTfa { token }
                    } else if html::is_logged_in(&self.fetch_home()?) {
                        LoginState::Authenticated
                    } else {
                        return Err(Error::Authentication(
                            "login rejected; check your credentials".into(),
                        ));
                    }
                }
                LoginState::AwaitingTfa { token } => {
                    let code = prompt_tfa_code()?;
                    self.config.delay.pause();
                    self.http
                        .post(format!("{}{}", self.config.base_url, TFA_PATH))
                        .form(&[
                            ("totpCode", code.as_str()),
                            ("trustedDevice", "on"),
                            (html::TOKEN_FIELD, token.as_str()),
                        ])
                        .send()?
                        .error_for_status()?;
                    if html::is_logged_in(&self.fetch_home()?) {
                        LoginState::Authenticated
                    } else {
                        return Err(Error::TwoFactor("verification code rejected".into()));
                    }
                }
                LoginState::Authenticated => {
                    if needs_saving {
                        credentials.save(&self.config.credentials_path)?;
                    }
                    self.save_cookies()?;
                    info!("login successful");
                    return Ok(self.into_session());
                }
            };
        }
    }

    fn fetch_home(&self) -> Result<String> {
        let response = self
            .http
            .get(&self.config.base_url)
            .send()?
            .error_for_status()?;
        Ok(response.text()?)
    }

    fn save_cookies(&self) -> Result<()> {
        let store = self.jar.lock().expect("cookie store mutex");
        let mut writer = BufWriter::new(File::create(&self.config.cookie_path)?);
        cookie_store::serde::json::save(&store, &mut writer)
            .map_err(|e| Error::CookieStore(e.to_string()))
    }

    fn into_session(self) -> Session {
        Session {
            http: self.http,
            base_url: self.config.base_url,
        }
    }
}

fn require_token(page: &str, page_name: &str) -> Result<String> {
    html::hidden_input(page, html::TOKEN_FIELD).ok_or_else(|| Error::TokenNotFound {
        field: html::TOKEN_FIELD,
        page: page_name.to_string(),
    })
}

/// Reads the persisted cookie jar. A missing or unreadable file simply
/// means starting unauthenticated.
fn load_cookies(path: &Path) -> CookieStore {
    if !path.exists() {
        return CookieStore::default();
    }
    let result = File::open(path)
        .map_err(|e| e.to_string())
        .and_then(|file| {
            cookie_store::serde::json::load(BufReader::new(file)).map_err(|e| e.to_string())
        });
    match result {
        Ok(store) => store,
        Err(err) => {
            warn!("ignoring unreadable cookie file {}: {err}", path.display());
            CookieStore::default()
        }
    }
}

fn prompt_tfa_code() -> Result<String> {
    print!("Enter the 6-digit verification code: ");
    io::stdout().flush()?;
    let mut code = String::new();
    io::stdin().read_line(&mut code)?;
    validate_tfa_code(code.trim()).map(str::to_string)
}

fn validate_tfa_code(code: &str) -> Result<&str> {
    if code.len() == 6 && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(code)
    } else {
        Err(Error::TwoFactor(format!(
            "expected a 6-digit code, got {code:?}"
        )))
    }
}

/// An authenticated HTTP session.
///
/// Thin wrapper over the underlying client: the report orchestrator only
/// ever GETs account pages and POSTs url-encoded forms.
pub struct Session {
    http: Client,
    base_url: String,
}

impl Session {
    /// GETs `path` relative to the site root and returns the body.
    ///
    /// # Errors
    ///
    /// Returns errors for transport failures and non-success statuses.
    pub fn get(&self, path: &str) -> Result<String> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .send()?
            .error_for_status()?;
        Ok(response.text()?)
    }

    /// POSTs a url-encoded form to `path` relative to the site root.
    ///
    /// # Errors
    ///
    /// Returns errors for transport failures and non-success statuses.
    pub fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Response> {
        Ok(self
            .http
            .post(format!("{}{path}", self.base_url))
            .form(form)
            .send()?
            .error_for_status()?)
    }
}
