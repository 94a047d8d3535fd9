//! Field checks for the auth request bodies. Runs before any usecase call.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{AppError, ValidationErrors};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email regex is valid")
});

pub const NAME_MAX_CHARS: usize = 20;
pub const PASSWORD_MIN_CHARS: usize = 8;

/// Collects failures per field, using the `Field '<name>' failed on '<rule>'` wording.
#[derive(Debug, Default)]
pub struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&mut self, field: &str, rule: &str) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| format!("Field '{}' failed on '{}'", field, rule));
    }

    pub fn required(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.fail(field, "required");
        }
        self
    }

    pub fn max_chars(&mut self, field: &str, value: &str, max: usize) -> &mut Self {
        if value.chars().count() > max {
            self.fail(field, "max");
        }
        self
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        if !value.is_empty() && !EMAIL_RE.is_match(value) {
            self.fail(field, "email");
        }
        self
    }

    pub fn password(&mut self, field: &str, value: &str) -> &mut Self {
        if value.is_empty() {
            return self;
        }
        if value.chars().count() < PASSWORD_MIN_CHARS {
            self.fail(field, "min");
        } else if !is_strong_password(value) {
            self.fail(field, "password");
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::ValidationError(std::mem::take(&mut self.errors)))
        }
    }
}

/// Upper, lower, digit and a non-alphanumeric character.
pub fn is_strong_password(password: &str) -> bool {
    password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_ascii_alphanumeric())
}

pub fn validate_registration(name: &str, email: &str, password: &str) -> Result<(), AppError> {
    Validator::new()
        .required("name", name)
        .max_chars("name", name, NAME_MAX_CHARS)
        .required("email", email)
        .email("email", email)
        .required("password", password)
        .password("password", password)
        .finish()
}

pub fn validate_login(email: &str, password: &str) -> Result<(), AppError> {
    Validator::new()
        .required("email", email)
        .email("email", email)
        .required("password", password)
        .password("password", password)
        .finish()
}
