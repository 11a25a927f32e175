use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

/// A single external program call: program, arguments and extra environment.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    masked_args: Vec<(usize, String)>,
}

impl Invocation {
    pub fn new(program: &str) -> Invocation {
        Invocation {
            program: String::from(program),
            args: Vec::new(),
            envs: Vec::new(),
            masked_args: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Invocation {
        self.args.push(arg.into());
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Invocation {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Renders the invocation as one line for a POSIX shell, environment
    /// assignments first. Used to hand a command to a remote shell.
    pub fn to_shell_line(&self) -> String {
        self.render_shell_line(false)
    }

    fn render_shell_line(&self, mask_environment: bool) -> String {
        let mut parts = Vec::new();
        for (key, value) in &self.envs {
            if mask_environment {
                parts.push(format!("{}=****", key));
            } else {
                parts.push(format!("{}={}", key, shell_quote(value)));
            }
        }
        parts.push(shell_quote(&self.program));
        for arg in &self.args {
            parts.push(shell_quote(arg));
        }
        parts.join(" ")
    }

    /// Wraps this invocation into an ssh call executing it on `host`.
    /// Environment values stay hidden when the wrapper is displayed.
    pub fn over_ssh(&self, host: &str) -> Invocation {
        let mut remote = Invocation::new("ssh").arg(host).arg(self.to_shell_line());
        if !self.envs.is_empty() {
            remote.masked_args.push((1, self.render_shell_line(true)));
        }
        remote
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for (index, arg) in self.args.iter().enumerate() {
            let shown = self
                .masked_args
                .iter()
                .find(|(masked, _)| *masked == index)
                .map(|(_, replacement)| replacement.as_str())
                .unwrap_or(arg.as_str());
            write!(f, " {}", shown)?;
        }
        Ok(())
    }
}

pub fn shell_quote(value: &str) -> String {
    let is_plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
    if is_plain {
        String::from(value)
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}

/// Exit status of a finished invocation. `code` is `None` when the process
/// was terminated by a signal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Outcome {
    pub code: Option<i32>,
}

impl Outcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("{0}")]
    Launch(#[source] io::Error),
    #[error("{0}")]
    Wait(#[source] io::Error),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    async fn run(&self, invocation: &Invocation) -> Result<Outcome, RunError>;
}

/// Spawns real child processes with inherited stdio and waits for them.
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    pub fn new(timeout: Option<Duration>) -> SystemRunner {
        SystemRunner { timeout }
    }
}

impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> Result<Outcome, RunError> {
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args).kill_on_drop(true);
        for (key, value) in &invocation.envs {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(RunError::Launch)?;
        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status.map_err(RunError::Wait)?,
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(RunError::TimedOut(limit));
                }
            },
            None => child.wait().await.map_err(RunError::Wait)?,
        };

        Ok(Outcome {
            code: status.code(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_only_when_needed() {
        assert_eq!(shell_quote("/tmp/d.dump"), "/tmp/d.dump");
        assert_eq!(shell_quote("--username=bob"), "--username=bob");
        assert_eq!(shell_quote("my db"), "'my db'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn shell_line_puts_environment_first() {
        let invocation = Invocation::new("pg_dump")
            .env("PGPASSWORD", "s3cr et")
            .arg("-f")
            .arg("/tmp/d.dump");
        assert_eq!(
            invocation.to_shell_line(),
            "PGPASSWORD='s3cr et' pg_dump -f /tmp/d.dump"
        );
    }

    #[test]
    fn display_masks_environment_of_remote_command() {
        let invocation = Invocation::new("pg_dump")
            .env("PGPASSWORD", "hunter2")
            .arg("prod");
        let remote = invocation.over_ssh("db.internal");

        assert_eq!(remote.program, "ssh");
        assert_eq!(remote.args[0], "db.internal");
        assert!(remote.args[1].contains("hunter2"));
        assert_eq!(
            remote.to_string(),
            "ssh db.internal PGPASSWORD=**** pg_dump prod"
        );
    }

    #[test]
    fn short_password_leaves_the_rest_of_the_line_intact() {
        let invocation = Invocation::new("pg_dump")
            .env("PGPASSWORD", "prod")
            .arg("-f")
            .arg("/srv/prod.dump")
            .arg("prod");
        let remote = invocation.over_ssh("prod.internal");

        assert_eq!(
            remote.to_string(),
            "ssh prod.internal PGPASSWORD=**** pg_dump -f /srv/prod.dump prod"
        );
    }

    #[test]
    fn plain_invocation_displays_program_and_arguments() {
        let invocation = Invocation::new("scp").arg("a:/x").arg("/y");
        assert_eq!(invocation.to_string(), "scp a:/x /y");
    }

    #[tokio::test]
    async fn system_runner_reports_exit_codes() {
        let runner = SystemRunner::new(None);
        let ok = runner.run(&Invocation::new("true")).await.unwrap();
        let failed = runner.run(&Invocation::new("false")).await.unwrap();

        assert!(ok.success());
        assert_eq!(failed.code, Some(1));
        assert!(!failed.success());
    }

    #[tokio::test]
    async fn system_runner_reports_launch_failures() {
        let runner = SystemRunner::new(None);
        let result = runner
            .run(&Invocation::new("rusty-pgsync-no-such-program"))
            .await;

        assert!(matches!(result, Err(RunError::Launch(_))));
    }

    #[tokio::test]
    async fn system_runner_enforces_timeout() {
        let runner = SystemRunner::new(Some(Duration::from_millis(100)));
        let result = runner.run(&Invocation::new("sleep").arg("5")).await;

        assert!(matches!(result, Err(RunError::TimedOut(_))));
    }
}
