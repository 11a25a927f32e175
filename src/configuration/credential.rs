#[derive(Clone, Debug, PartialEq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: &str, password: &str) -> Credential {
        Credential {
            username: String::from(username),
            password: String::from(password),
        }
    }

    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }
}
