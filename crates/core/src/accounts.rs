//! Staff accounts.
//!
//! Each account is one YAML file in a sharded directory under `accounts/`. Usernames and
//! (case-folded) emails are claimed in exclusive-create indexes before anything is written, so a
//! duplicate registration leaves the store untouched.

use crate::access::{Actor, Operation, RequestContext, Role};
use crate::audit::{AuditAction, AuditResource, AuditService};
use crate::config::{CoreConfig, IndexKind};
use crate::constants::ACCOUNT_FILENAME;
use crate::store::{list_sharded, read_yaml_opt, write_yaml, UniqueIndex};
use crate::validation::{validate_username, FieldErrors};
use crate::{RecordError, RecordResult};
use api_shared::{AccountRes, RegisterReq};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use chs_uuid::ShardableUuid;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

const MIN_PASSWORD_LEN: usize = 6;

/// Persisted account record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: ShardableUuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    pub subcounty: Option<String>,
    #[serde(default)]
    pub ward: Option<String>,
    #[serde(default)]
    pub facility_name: Option<String>,
    #[serde(default)]
    pub license_number: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}

impl Account {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn to_actor(&self) -> Actor {
        Actor {
            id: self.id.clone(),
            username: self.username.clone(),
            full_name: self.full_name(),
            email: self.email.clone(),
            role: self.role,
            facility_name: self.facility_name.clone(),
            license_number: self.license_number.clone(),
        }
    }

    fn password_matches(&self, password: &str) -> bool {
        match PasswordHash::new(&self.password_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!("stored password hash for {} is unreadable: {}", self.id, e);
                false
            }
        }
    }
}

impl From<&Account> for AccountRes {
    fn from(account: &Account) -> Self {
        AccountRes {
            id: account.id.to_string(),
            username: account.username.clone(),
            email: account.email.clone(),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            full_name: account.full_name(),
            role: account.role.as_str().to_string(),
            phone: account.phone.clone(),
            county: account.county.clone(),
            subcounty: account.subcounty.clone(),
            ward: account.ward.clone(),
            facility_name: account.facility_name.clone(),
            license_number: account.license_number.clone(),
            is_active: account.is_active,
            created_at: account.created_at.to_rfc3339(),
            last_login: account.last_login.map(|t| t.to_rfc3339()),
        }
    }
}

fn hash_password(password: &str) -> RecordResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| RecordError::PasswordHash(e.to_string()))
}

/// Service for account registration, login and administration.
#[derive(Clone, Debug)]
pub struct AccountService {
    cfg: Arc<CoreConfig>,
}

impl AccountService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self { cfg }
    }

    fn audit(&self) -> AuditService {
        AuditService::new(self.cfg.clone())
    }

    fn account_path(&self, id: &ShardableUuid) -> PathBuf {
        id.sharded_dir(&self.cfg.accounts_dir()).join(ACCOUNT_FILENAME)
    }

    /// Validates and stores a new account.
    ///
    /// # Errors
    ///
    /// - [`RecordError::Validation`] listing every invalid field.
    /// - [`RecordError::Duplicate`] if the username or email is taken.
    pub fn register(&self, ctx: &RequestContext, req: &RegisterReq) -> RecordResult<Account> {
        let mut errors = FieldErrors::default();

        let username = req.username.trim();
        if let Err(msg) = validate_username(username) {
            errors.add("username", msg);
        }
        let email = errors.email("email", &req.email);
        let first_name = errors.required("first_name", &req.first_name, 100);
        let last_name = errors.required("last_name", &req.last_name, 100);
        let role = errors.choice("role", &req.role, Role::from_wire);
        let phone = errors.optional("phone", req.phone.as_deref(), 20);
        let county = errors.optional("county", req.county.as_deref(), 100);
        let subcounty = errors.optional("subcounty", req.subcounty.as_deref(), 100);
        let ward = errors.optional("ward", req.ward.as_deref(), 100);
        let facility_name = errors.optional("facility_name", req.facility_name.as_deref(), 200);
        let license_number = errors.optional("license_number", req.license_number.as_deref(), 50);

        if req.password.chars().count() < MIN_PASSWORD_LEN {
            errors.add("password", "Password must be at least 6 characters long");
        }
        if req.password != req.confirm_password {
            errors.add("confirm_password", "Passwords must match");
        }

        let (Some(email), Some(first_name), Some(last_name), Some(role)) =
            (email, first_name, last_name, role)
        else {
            return Err(errors.into());
        };
        errors.finish()?;

        let id = ShardableUuid::new();
        let owner = id.to_string();
        let email_key = email.normalised();

        let usernames = UniqueIndex::new(&self.cfg, IndexKind::Username);
        let emails = UniqueIndex::new(&self.cfg, IndexKind::Email);
        if !usernames.claim(username, &owner)? {
            return Err(RecordError::Duplicate(
                "Username or email already exists.".into(),
            ));
        }
        match emails.claim(&email_key, &owner) {
            Ok(true) => {}
            Ok(false) => {
                usernames.release_quietly(username);
                return Err(RecordError::Duplicate(
                    "Username or email already exists.".into(),
                ));
            }
            Err(e) => {
                usernames.release_quietly(username);
                return Err(e);
            }
        }

        let stored: RecordResult<Account> = (|| {
            let account = Account {
                id: id.clone(),
                username: username.to_string(),
                email: email.as_str().to_string(),
                password_hash: hash_password(&req.password)?,
                first_name: first_name.into_inner(),
                last_name: last_name.into_inner(),
                phone,
                role,
                county,
                subcounty,
                ward,
                facility_name,
                license_number,
                is_active: true,
                created_at: Utc::now(),
                last_login: None,
            };
            let dir = id.sharded_dir(&self.cfg.accounts_dir());
            fs::create_dir_all(&dir).map_err(RecordError::StorageDirCreation)?;
            write_yaml(&dir.join(ACCOUNT_FILENAME), &account)?;
            Ok(account)
        })();

        let account = match stored {
            Ok(account) => account,
            Err(e) => {
                usernames.release_quietly(username);
                emails.release_quietly(&email_key);
                let _ = fs::remove_dir_all(id.sharded_dir(&self.cfg.accounts_dir()));
                return Err(e);
            }
        };

        tracing::info!("registered {} account {}", account.role, account.username);
        self.audit().record(
            ctx,
            AuditAction::UserRegistration,
            Some(AuditResource::new("user", &account.id)),
            format!("New user registered: {}", account.username),
        );
        Ok(account)
    }

    /// Checks credentials and stamps `last_login`.
    ///
    /// Every failure is reported as [`RecordError::InvalidCredentials`] and audited without an
    /// actor.
    pub fn login(
        &self,
        ctx: &RequestContext,
        username: &str,
        password: &str,
    ) -> RecordResult<Account> {
        let username = username.trim();
        let found = self.find_by_username(username)?;

        let mut account = match found {
            Some(account) if account.is_active && account.password_matches(password) => account,
            _ => {
                self.audit().record(
                    &RequestContext::anonymous(ctx.origin.clone()),
                    AuditAction::FailedLogin,
                    None,
                    format!("Failed login attempt for username: {username}"),
                );
                return Err(RecordError::InvalidCredentials);
            }
        };

        account.last_login = Some(Utc::now());
        write_yaml(&self.account_path(&account.id), &account)?;

        let actor_ctx = RequestContext::for_actor(account.to_actor(), ctx.origin.clone());
        self.audit().record(
            &actor_ctx,
            AuditAction::UserLogin,
            Some(AuditResource::new("user", &account.id)),
            format!("User {} logged in", account.username),
        );
        Ok(account)
    }

    pub fn logout(&self, ctx: &RequestContext) -> RecordResult<()> {
        let actor = ctx.actor()?;
        self.audit().record(
            ctx,
            AuditAction::UserLogout,
            Some(AuditResource::new("user", &actor.id)),
            format!("User {} logged out", actor.username),
        );
        Ok(())
    }

    fn find_by_username(&self, username: &str) -> RecordResult<Option<Account>> {
        let index = UniqueIndex::new(&self.cfg, IndexKind::Username);
        let Some(owner) = index.lookup(username)? else {
            return Ok(None);
        };
        let id = ShardableUuid::parse(&owner)?;
        read_yaml_opt(&self.account_path(&id))
    }

    pub fn get_by_username(&self, username: &str) -> RecordResult<Account> {
        self.find_by_username(username.trim())?
            .ok_or(RecordError::NotFound("account"))
    }

    pub fn get(&self, id: &ShardableUuid) -> RecordResult<Account> {
        read_yaml_opt(&self.account_path(id))?.ok_or(RecordError::NotFound("account"))
    }

    /// Actor for a signed session subject.
    ///
    /// A session whose account is gone, deactivated or unparsable no longer authenticates.
    pub fn resolve_session(&self, subject: &str) -> RecordResult<Actor> {
        let Ok(id) = ShardableUuid::parse(subject) else {
            return Err(RecordError::Unauthenticated);
        };
        match read_yaml_opt::<Account>(&self.account_path(&id))? {
            Some(account) if account.is_active => Ok(account.to_actor()),
            _ => Err(RecordError::Unauthenticated),
        }
    }

    /// Every stored account, unfiltered. Used by the dashboard counters.
    pub(crate) fn all(&self) -> Vec<Account> {
        list_sharded(&self.cfg.accounts_dir(), ACCOUNT_FILENAME, |s| {
            serde_yaml::from_str::<Account>(s).map_err(RecordError::YamlDeserialization)
        })
    }

    /// Admin listing, newest first.
    pub fn list(
        &self,
        ctx: &RequestContext,
        role: Option<Role>,
        include_inactive: bool,
    ) -> RecordResult<Vec<Account>> {
        ctx.actor()?.authorize(Operation::ManageAccounts)?;

        let mut accounts: Vec<Account> = self
            .all()
            .into_iter()
            .filter(|a| include_inactive || a.is_active)
            .filter(|a| role.map_or(true, |r| a.role == r))
            .collect();
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(accounts)
    }

    /// Flips `is_active` on an account.
    pub fn toggle_active(&self, ctx: &RequestContext, id: &ShardableUuid) -> RecordResult<Account> {
        ctx.actor()?.authorize(Operation::ManageAccounts)?;

        let mut account = self.get(id)?;
        account.is_active = !account.is_active;
        write_yaml(&self.account_path(id), &account)?;

        let status = if account.is_active {
            "activated"
        } else {
            "deactivated"
        };
        tracing::info!("account {} {}", account.username, status);
        self.audit().record(
            ctx,
            AuditAction::UserStatusChanged,
            Some(AuditResource::new("user", &account.id)),
            format!("User {} {}", account.username, status),
        );
        Ok(account)
    }
}
