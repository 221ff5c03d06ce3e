use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;

use crate::model::Access;

/// Login passwords. The admin user gets the staff password; every other
/// user name is a guest and shares the public password.
#[derive(Debug, Clone)]
pub struct Credentials {
    public_password: String,
    admin_user: String,
    admin_password: String,
}

impl Credentials {
    pub fn new(public_password: String, admin_user: String, admin_password: String) -> Self {
        Self {
            public_password,
            admin_user,
            admin_password,
        }
    }

    fn password_for(&self, user: Option<&str>) -> &str {
        match user {
            Some(u) if u == self.admin_user => &self.admin_password,
            _ => &self.public_password,
        }
    }

    /// Session access for an authenticated user name.
    pub fn access_for(&self, user: Option<&str>) -> Access {
        match user {
            Some(u) if u == self.admin_user => Access::Admin,
            _ => Access::Public,
        }
    }
}

#[derive(Debug)]
pub struct CafeAuthSource {
    credentials: Credentials,
}

impl CafeAuthSource {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl AuthSource for CafeAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        let password = self.credentials.password_for(login.user());
        Ok(Password::new(None, password.as_bytes().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("guest-pw".into(), "admin".into(), "staff-pw".into())
    }

    #[test]
    fn admin_user_gets_admin_password_and_access() {
        let c = creds();
        assert_eq!(c.password_for(Some("admin")), "staff-pw");
        assert_eq!(c.access_for(Some("admin")), Access::Admin);
    }

    #[test]
    fn everyone_else_is_public() {
        let c = creds();
        for user in [Some("guest"), Some("Admin"), None] {
            assert_eq!(c.password_for(user), "guest-pw");
            assert_eq!(c.access_for(user), Access::Public);
        }
    }
}
