//! Accounts file: login verification, self-registration and admin user
//! management. Validation failures are returned as typed errors whose
//! `Display` text is meant for the user.

use std::{
    collections::BTreeMap,
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use anyhow::{Context, Result};
use log::{error, info, warn};
use serde_json::Value;

use crate::models::{Role, UserAccount};

pub const DEFAULT_ADMIN: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "admin123";
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UserError {
    #[error("Todos los campos son obligatorios")]
    MissingFields,
    #[error("Usuario o contraseña incorrectos")]
    InvalidCredentials,
    #[error("Las contraseñas no coinciden")]
    PasswordMismatch,
    #[error("La contraseña debe tener al menos {} caracteres", MIN_PASSWORD_LEN)]
    PasswordTooShort,
    #[error("El usuario ya existe")]
    UserExists,
    #[error("El usuario no existe")]
    UnknownUser,
    #[error("Debe existir al menos un administrador")]
    LastAdmin,
    #[error("Solo un administrador puede gestionar usuarios")]
    NotAdmin,
}

type Accounts = BTreeMap<String, UserAccount>;

pub struct UserStore {
    path: PathBuf,
    accounts: RwLock<Accounts>,
}

impl UserStore {
    /// Load the accounts file. A missing file is seeded with the default
    /// admin; an unreadable one leaves the store empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let store = Self {
            path,
            accounts: RwLock::new(Accounts::new()),
        };

        if store.path.exists() {
            match read_accounts(&store.path) {
                Ok(accounts) => *store.write() = accounts,
                Err(err) => error!("Error loading users: {err:#}"),
            }
        } else {
            let mut accounts = store.write();
            accounts.insert(
                DEFAULT_ADMIN.to_string(),
                UserAccount {
                    password: DEFAULT_ADMIN_PASSWORD.to_string(),
                    role: Role::Admin,
                },
            );
            info!("Users file missing, seeding default admin");
            store.persist(&accounts);
        }

        store
    }

    pub fn verify_login(&self, username: &str, password: &str) -> Result<Role, UserError> {
        let (username, password) = (username.trim(), password.trim());
        if username.is_empty() || password.is_empty() {
            return Err(UserError::MissingFields);
        }

        match self.read().get(username) {
            Some(account) if account.password == password => {
                info!("User {username} logged in");
                Ok(account.role)
            }
            _ => Err(UserError::InvalidCredentials),
        }
    }

    /// Self-registration always creates a regular user.
    pub fn register(&self, username: &str, password: &str, confirm: &str) -> Result<(), UserError> {
        let (username, password, confirm) = (username.trim(), password.trim(), confirm.trim());
        if username.is_empty() || password.is_empty() || confirm.is_empty() {
            return Err(UserError::MissingFields);
        }
        if password != confirm {
            return Err(UserError::PasswordMismatch);
        }
        self.insert(username, password, Role::User)
    }

    pub fn create_user(&self, username: &str, password: &str, role: Role) -> Result<(), UserError> {
        let (username, password) = (username.trim(), password.trim());
        if username.is_empty() || password.is_empty() {
            return Err(UserError::MissingFields);
        }
        self.insert(username, password, role)
    }

    pub fn update_user(
        &self,
        username: &str,
        new_password: Option<&str>,
        new_role: Option<Role>,
    ) -> Result<(), UserError> {
        let mut accounts = self.write();
        let admins = admin_count(&accounts);
        let account = accounts.get_mut(username).ok_or(UserError::UnknownUser)?;

        if let Some(password) = new_password.map(str::trim).filter(|p| !p.is_empty()) {
            if password.chars().count() < MIN_PASSWORD_LEN {
                return Err(UserError::PasswordTooShort);
            }
            account.password = password.to_string();
        }
        if let Some(role) = new_role {
            if account.role == Role::Admin && role != Role::Admin && admins <= 1 {
                return Err(UserError::LastAdmin);
            }
            account.role = role;
        }

        self.persist(&accounts);
        info!("User {username} updated");
        Ok(())
    }

    pub fn delete_user(&self, username: &str) -> Result<(), UserError> {
        let mut accounts = self.write();
        let account = accounts.get(username).ok_or(UserError::UnknownUser)?;
        if account.role == Role::Admin && admin_count(&accounts) <= 1 {
            return Err(UserError::LastAdmin);
        }
        accounts.remove(username);
        self.persist(&accounts);
        info!("User {username} deleted");
        Ok(())
    }

    pub fn role_of(&self, username: &str) -> Option<Role> {
        self.read().get(username).map(|account| account.role)
    }

    pub fn require_admin(&self, actor: &str) -> Result<(), UserError> {
        match self.role_of(actor) {
            Some(Role::Admin) => Ok(()),
            _ => Err(UserError::NotAdmin),
        }
    }

    /// Usernames with their roles, sorted by name.
    pub fn list(&self) -> Vec<(String, Role)> {
        self.read()
            .iter()
            .map(|(name, account)| (name.clone(), account.role))
            .collect()
    }

    fn insert(&self, username: &str, password: &str, role: Role) -> Result<(), UserError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(UserError::PasswordTooShort);
        }

        let mut accounts = self.write();
        if accounts.contains_key(username) {
            return Err(UserError::UserExists);
        }
        accounts.insert(
            username.to_string(),
            UserAccount {
                password: password.to_string(),
                role,
            },
        );
        self.persist(&accounts);
        info!("User {username} created as {}", role.as_str());
        Ok(())
    }

    fn persist(&self, accounts: &Accounts) {
        let result = serde_json::to_string_pretty(accounts)
            .context("failed to serialize users")
            .and_then(|serialized| {
                fs::write(&self.path, serialized)
                    .with_context(|| format!("failed to write {}", self.path.display()))
            });
        if let Err(err) = result {
            error!("Error saving users: {err:#}");
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Accounts> {
        match self.accounts.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Accounts> {
        match self.accounts.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn admin_count(accounts: &Accounts) -> usize {
    accounts
        .values()
        .filter(|account| account.role == Role::Admin)
        .count()
}

/// Reads both the current layout and the legacy `{user: password}` one.
fn read_accounts(path: &std::path::Path) -> Result<Accounts> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let raw: BTreeMap<String, Value> = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a users object", path.display()))?;

    let mut accounts = Accounts::new();
    for (username, value) in raw {
        let account = match value {
            Value::String(password) => UserAccount {
                role: if username == DEFAULT_ADMIN {
                    Role::Admin
                } else {
                    Role::User
                },
                password,
            },
            other => match serde_json::from_value::<UserAccount>(other) {
                Ok(account) => account,
                Err(err) => {
                    warn!("skipping user {username}: {err}");
                    continue;
                }
            },
        };
        accounts.insert(username, account);
    }
    Ok(accounts)
}
