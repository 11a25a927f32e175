use crate::configuration::Credential;
use crate::runner::Invocation;

/// A PostgreSQL database reachable with the given credential.
#[derive(Clone, Debug, PartialEq)]
pub struct Database {
    pub credential: Credential,
    pub name: String,
}

impl Database {
    pub fn new(credential: Credential, name: &str) -> Database {
        Database {
            credential,
            name: String::from(name),
        }
    }

    /// `pg_dump` writing a compressed custom-format archive, blobs included, to `output_file`.
    pub fn build_dump_command(&self, output_file: &str) -> Invocation {
        let mut cmd = Invocation::new("pg_dump");
        if self.credential.has_password() {
            cmd = cmd.env("PGPASSWORD", self.credential.password.as_str());
        }

        cmd.arg(format!("--username={}", self.credential.username))
            .arg("-F")
            .arg("c")
            .arg("-b")
            .arg("-v")
            .arg("-f")
            .arg(output_file)
            .arg(self.name.as_str())
    }

    /// `pg_restore` applying `input_file` inside a single transaction.
    pub fn build_restore_command(&self, input_file: &str) -> Invocation {
        let mut cmd = Invocation::new("pg_restore");
        if self.credential.has_password() {
            cmd = cmd.env("PGPASSWORD", self.credential.password.as_str());
        }

        cmd.arg("-U")
            .arg(self.credential.username.as_str())
            .arg("-d")
            .arg(self.name.as_str())
            .arg("-1")
            .arg(input_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_command_targets_output_file_and_database() {
        let database = Database::new(Credential::new("app", "pw"), "prod");
        let cmd = database.build_dump_command("/tmp/d.dump");

        assert_eq!(cmd.program, "pg_dump");
        assert_eq!(
            cmd.args,
            vec!["--username=app", "-F", "c", "-b", "-v", "-f", "/tmp/d.dump", "prod"]
        );
        assert_eq!(
            cmd.envs,
            vec![(String::from("PGPASSWORD"), String::from("pw"))]
        );
    }

    #[test]
    fn dump_command_without_password_sets_no_environment() {
        let database = Database::new(Credential::new("app", ""), "prod");
        assert!(database.build_dump_command("/tmp/d.dump").envs.is_empty());
    }

    #[test]
    fn restore_command_is_single_transaction() {
        let database = Database::new(Credential::new("me", ""), "mirror");
        let cmd = database.build_restore_command("/tmp/d.dump");

        assert_eq!(cmd.program, "pg_restore");
        assert_eq!(cmd.args, vec!["-U", "me", "-d", "mirror", "-1", "/tmp/d.dump"]);
    }
}
