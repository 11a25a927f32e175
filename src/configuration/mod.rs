use std::{
    collections::HashMap,
    ffi::OsString,
    fs::File,
    io::{self, BufRead, BufReader, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod credential;
pub mod database;

pub use credential::Credential;
pub use database::Database;

use crate::helper::expand_date_placeholders;
use crate::runner::Invocation;

pub const DB_USERNAME: &str = "DB_USERNAME";
pub const DB_PASSWORD: &str = "DB_PASSWORD";
pub const DB_NAME: &str = "DB_NAME";
pub const LOCAL_USERNAME: &str = "LOCAL_USERNAME";
pub const LOCAL_DBNAME: &str = "LOCAL_DBNAME";
pub const REMOTE_HOST: &str = "REMOTE_HOST";
pub const REMOTE_BACKUP_PATH: &str = "REMOTE_BACKUP_PATH";
pub const LOCAL_RESTORE_PATH: &str = "LOCAL_RESTORE_PATH";
pub const STEP_TIMEOUT: &str = "STEP_TIMEOUT";
pub const ABORT_ON_FAILURE: &str = "ABORT_ON_FAILURE";

const KNOWN_KEYS: [&str; 10] = [
    DB_USERNAME,
    DB_PASSWORD,
    DB_NAME,
    LOCAL_USERNAME,
    LOCAL_DBNAME,
    REMOTE_HOST,
    REMOTE_BACKUP_PATH,
    LOCAL_RESTORE_PATH,
    STEP_TIMEOUT,
    ABORT_ON_FAILURE,
];

pub const DEFAULT_REMOTE_BACKUP_PATH: &str = "/path/to/dump/file.sql";
pub const DEFAULT_LOCAL_RESTORE_PATH: &str = "/path/to/local/directory/file.sql";

const SETTINGS_FILE_NAME: &str = "rusty-pgsync.conf";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing configuration key: {0}")]
    MissingKey(&'static str),
    #[error("invalid value '{value}' for configuration key {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("settings file '{filename}': {reason}")]
    SettingsFile { filename: String, reason: String },
}

/// What to do with the remaining steps once one of them failed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FailurePolicy {
    Continue,
    Abort,
}

/// Raw `KEY=VALUE` settings gathered from a file, the environment and the command line.
#[derive(Clone, Debug, Default)]
pub struct Settings {
    values: HashMap<String, String>,
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            values: HashMap::new(),
        }
    }

    pub fn parse<R: BufRead>(reader: R) -> io::Result<Settings> {
        let mut settings = Settings::new();

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let position_of_equal_sign = match line.find('=') {
                Some(position) => position,
                None => continue,
            };
            let key = line[..position_of_equal_sign].trim();
            let value = unquote(line[(position_of_equal_sign + 1)..].trim());
            if key.is_empty() {
                continue;
            }

            settings.set(key, value);
        }

        Ok(settings)
    }

    pub fn load(filename: &Path) -> Result<Settings, ConfigError> {
        let settings_file_error = |reason: String| ConfigError::SettingsFile {
            filename: filename.display().to_string(),
            reason,
        };

        if filename.is_dir() {
            return Err(settings_file_error(String::from("is a directory")));
        }
        let file = File::open(filename).map_err(|why| {
            settings_file_error(match why.kind() {
                ErrorKind::NotFound => String::from("file does not exist"),
                _ => format!("unable to open: {}", why),
            })
        })?;

        Settings::parse(BufReader::new(file))
            .map_err(|why| settings_file_error(format!("unable to read: {}", why)))
    }

    /// Layers the settings file, the environment and the command line, each
    /// one overriding the keys set by the ones before it.
    pub fn gather<I: IntoIterator<Item = (OsString, OsString)>>(
        file: Option<Settings>,
        environment: I,
        overrides: &Overrides,
    ) -> Result<Settings, ConfigError> {
        let mut settings = file.unwrap_or_default();
        settings.merge_environment(environment)?;
        overrides.apply(&mut settings);
        Ok(settings)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(String::from(key), String::from(value));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|value| value.as_str())
    }

    /// Overrides known keys with the given environment variables. Unrelated
    /// variables are ignored whatever their encoding.
    pub fn merge_environment<I: IntoIterator<Item = (OsString, OsString)>>(
        &mut self,
        vars: I,
    ) -> Result<(), ConfigError> {
        for (key, value) in vars {
            let known_key = match KNOWN_KEYS.iter().find(|known| key.to_str() == Some(**known)) {
                Some(known_key) => *known_key,
                None => continue,
            };
            let value = value.into_string().map_err(|value| ConfigError::InvalidValue {
                key: known_key,
                value: value.to_string_lossy().into_owned(),
            })?;
            self.set(known_key, &value);
        }

        Ok(())
    }
}

/// Values given on the command line; they win over file and environment.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub remote_path: Option<String>,
    pub local_path: Option<String>,
    pub step_timeout: Option<String>,
    pub abort_on_failure: bool,
}

impl Overrides {
    fn apply(&self, settings: &mut Settings) {
        if let Some(path) = &self.remote_path {
            settings.set(REMOTE_BACKUP_PATH, path);
        }
        if let Some(path) = &self.local_path {
            settings.set(LOCAL_RESTORE_PATH, path);
        }
        if let Some(timeout) = &self.step_timeout {
            settings.set(STEP_TIMEOUT, timeout);
        }
        if self.abort_on_failure {
            settings.set(ABORT_ON_FAILURE, "true");
        }
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Expands a leading `~` or `~/` to the home directory.
fn expand_home(file: &str, home_directory: Option<&Path>) -> PathBuf {
    match (file.strip_prefix('~'), home_directory) {
        (Some(""), Some(home)) => home.to_path_buf(),
        (Some(rest), Some(home)) if rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(file),
    }
}

/// Finds the settings file to read. An explicitly given file must exist; otherwise
/// `.env` and `rusty-pgsync.conf` in `working_directory`, then `~/rusty-pgsync.conf`,
/// then `/etc/rusty-pgsync.conf` are tried in that order.
pub fn locate_settings_file(
    explicit: Option<&str>,
    working_directory: &Path,
    home_directory: Option<&Path>,
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(file) = explicit {
        let normalized = expand_home(file, home_directory);
        if !normalized.is_file() {
            return Err(ConfigError::SettingsFile {
                filename: String::from(file),
                reason: if normalized.exists() {
                    String::from("not a regular file")
                } else {
                    String::from("file does not exist")
                },
            });
        }
        return Ok(Some(normalized));
    }

    let mut candidates = vec![
        working_directory.join(".env"),
        working_directory.join(SETTINGS_FILE_NAME),
    ];
    if let Some(home) = home_directory {
        candidates.push(home.join(SETTINGS_FILE_NAME));
    }
    candidates.push(Path::new("/etc").join(SETTINGS_FILE_NAME));

    Ok(candidates.into_iter().find(|candidate| candidate.is_file()))
}

/// Everything the pipeline needs, validated once at startup and read-only afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Configuration {
    pub remote_backup_path: String,
    pub local_restore_path: String,
    pub remote_database: Database,
    pub local_database: Database,
    pub remote_host: String,
    pub failure_policy: FailurePolicy,
    pub step_timeout: Option<Duration>,
}

impl Configuration {
    pub fn from_settings(
        settings: &Settings,
        now: DateTime<Utc>,
    ) -> Result<Configuration, ConfigError> {
        let remote_credential = Credential::new(
            required(settings, DB_USERNAME)?,
            settings.get(DB_PASSWORD).ok_or(ConfigError::MissingKey(DB_PASSWORD))?,
        );
        let remote_database = Database::new(remote_credential, required(settings, DB_NAME)?);
        let local_database = Database::new(
            Credential::new(required(settings, LOCAL_USERNAME)?, ""),
            required(settings, LOCAL_DBNAME)?,
        );
        let remote_host = String::from(required(settings, REMOTE_HOST)?);

        let remote_backup_path = expand_date_placeholders(
            optional(settings, REMOTE_BACKUP_PATH).unwrap_or(DEFAULT_REMOTE_BACKUP_PATH),
            now,
        );
        let local_restore_path = expand_date_placeholders(
            optional(settings, LOCAL_RESTORE_PATH).unwrap_or(DEFAULT_LOCAL_RESTORE_PATH),
            now,
        );

        let step_timeout = match optional(settings, STEP_TIMEOUT) {
            Some(value) => match parse_duration0::parse(value) {
                Ok(duration) if !duration.is_zero() => Some(duration),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: STEP_TIMEOUT,
                        value: String::from(value),
                    })
                }
            },
            None => None,
        };

        let failure_policy = match optional(settings, ABORT_ON_FAILURE) {
            Some(value) => match value.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" | "enabled" => FailurePolicy::Abort,
                "0" | "false" | "no" | "off" | "disabled" => FailurePolicy::Continue,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: ABORT_ON_FAILURE,
                        value: String::from(value),
                    })
                }
            },
            None => FailurePolicy::Continue,
        };

        Ok(Configuration {
            remote_backup_path,
            local_restore_path,
            remote_database,
            local_database,
            remote_host,
            failure_policy,
            step_timeout,
        })
    }

    /// `remote_host:remote_backup_path`, the scp source of the dump.
    pub fn remote_dump_location(&self) -> String {
        format!("{}:{}", self.remote_host, self.remote_backup_path)
    }

    pub fn build_dump_command(&self) -> Invocation {
        self.remote_database
            .build_dump_command(&self.remote_backup_path)
            .over_ssh(&self.remote_host)
    }

    pub fn build_transfer_command(&self) -> Invocation {
        Invocation::new("scp")
            .arg(self.remote_dump_location())
            .arg(self.local_restore_path.as_str())
    }

    pub fn build_restore_command(&self) -> Invocation {
        self.local_database
            .build_restore_command(&self.local_restore_path)
    }
}

fn required<'a>(settings: &'a Settings, key: &'static str) -> Result<&'a str, ConfigError> {
    optional(settings, key).ok_or(ConfigError::MissingKey(key))
}

fn optional<'a>(settings: &'a Settings, key: &str) -> Option<&'a str> {
    settings.get(key).filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
pub mod testing {
    use super::*;

    pub fn settings() -> Settings {
        let mut settings = Settings::new();
        settings.set(DB_USERNAME, "app");
        settings.set(DB_PASSWORD, "secret");
        settings.set(DB_NAME, "prod");
        settings.set(LOCAL_USERNAME, "me");
        settings.set(LOCAL_DBNAME, "prod_mirror");
        settings.set(REMOTE_HOST, "db.internal");
        settings.set(REMOTE_BACKUP_PATH, "/tmp/d.dump");
        settings.set(LOCAL_RESTORE_PATH, "/tmp/d.dump");
        settings
    }

    pub fn configuration() -> Configuration {
        Configuration::from_settings(&settings(), Utc::now()).unwrap()
    }
}
