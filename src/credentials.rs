use serde::{Deserialize, Serialize};

use std::{
    fmt::{self, Debug},
    fs::File,
    io::{self, Write},
    path::Path,
};

use crate::error::Result;

/// A marketplace username and password.
///
/// Loaded from the credential file, or prompted for interactively on first
/// run. The [`Debug`] implementation redacts the password so it cannot leak
/// through logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Reads credentials from the YAML file at `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist or does not contain
    /// both fields, so the caller can fall back to prompting.
    ///
    /// # Errors
    ///
    /// Returns errors if the file exists but cannot be opened or parsed.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        #[derive(Deserialize, Default)]
        struct Partial {
            username: Option<String>,
            password: Option<String>,
        }
        // An empty file deserializes as null rather than an empty mapping.
        let partial: Partial =
            serde_yaml::from_reader::<_, Option<Partial>>(File::open(path)?)?.unwrap_or_default();
        Ok(match (partial.username, partial.password) {
            (Some(username), Some(password)) => Some(Self { username, password }),
            _ => None,
        })
    }

    /// Prompts for credentials on the terminal. The password prompt does
    /// not echo.
    ///
    /// # Errors
    ///
    /// Returns errors if stdin or stdout is unavailable.
    pub fn prompt() -> Result<Self> {
        print!("Enter username: ");
        io::stdout().flush()?;
        let mut username = String::new();
        io::stdin().read_line(&mut username)?;
        let password = rpassword::prompt_password("Enter password: ")?;
        Ok(Self {
            username: username.trim().to_string(),
            password,
        })
    }

    /// Writes the credentials to the YAML file at `path`, replacing any
    /// previous content.
    ///
    /// # Errors
    ///
    /// Returns errors if the file cannot be created or written.
    pub fn save(&self, path: &Path) -> Result<()> {
        serde_yaml::to_writer(File::create(path)?, self)?;
        Ok(())
    }
}

/// Loads credentials from `path`, prompting when the file is missing or
/// incomplete.
///
/// The second value is true when the credentials came from the prompt and
/// still need saving; the session manager writes them back only once the
/// site has accepted them.
///
/// # Errors
///
/// Propagates [`Credentials::load`] and [`Credentials::prompt`] errors.
pub fn load_or_prompt(path: &Path) -> Result<(Credentials, bool)> {
    match Credentials::load(path)? {
        Some(credentials) => Ok((credentials, false)),
        None => Ok((Credentials::prompt()?, true)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("mkm-credentials-{name}-{}", std::process::id()));
        path
    }

    #[test]
    fn load_fn_returns_none_for_missing_file() {
        assert!(Credentials::load(Path::new("testdata/no-such-config.yaml"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn load_fn_returns_none_for_an_empty_file() {
        let path = temp_path("empty");
        std::fs::write(&path, "").unwrap();
        assert!(Credentials::load(&path).unwrap().is_none());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn load_fn_returns_none_for_incomplete_file() {
        let path = temp_path("incomplete");
        std::fs::write(&path, "username: somebody\n").unwrap();
        assert!(Credentials::load(&path).unwrap().is_none());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn save_fn_round_trips_through_load() {
        let path = temp_path("roundtrip");
        let credentials = Credentials {
            username: "somebody".into(),
            password: "hunter2".into(),
        };
        credentials.save(&path).unwrap();
        let loaded = Credentials::load(&path).unwrap().unwrap();
        assert_eq!(loaded.username, "somebody");
        assert_eq!(loaded.password, "hunter2");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn debug_impl_redacts_the_password() {
        let credentials = Credentials {
            username: "somebody".into(),
            password: "hunter2".into(),
        };
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("hunter2"), "password leaked: {debug}");
    }
}
