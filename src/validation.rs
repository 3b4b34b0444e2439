//! Client-side form rules. Each rule yields the first failing message for
//! its field; forms collect them in field order.

use crate::model::BloodGroup;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}$")
        .unwrap_or_else(|e| panic!("invalid email pattern: {}", e))
});

static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+]?[(]?[0-9]{3}[)]?[-\s.]?[0-9]{3}[-\s.]?[0-9]{4,6}$")
        .unwrap_or_else(|e| panic!("invalid phone pattern: {}", e))
});

pub const PASSWORD_MIN_LEN: usize = 8;
pub const NAME_MIN_LEN: usize = 2;

pub type Rule = Result<(), String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

/// Field errors for one form, in the order the fields were checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
    errors: Vec<FieldError>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, field: &'static str, rule: Rule) {
        if let Err(message) = rule {
            self.errors.push(FieldError { field, message });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }

    pub fn into_result(self) -> Result<(), FormErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for FormErrors {}

fn required(value: &str, message: &str) -> Rule {
    if value.trim().is_empty() {
        Err(message.to_string())
    } else {
        Ok(())
    }
}

pub fn email(value: &str) -> Rule {
    required(value, "Email is required")?;
    if EMAIL_RE.is_match(value.trim()) {
        Ok(())
    } else {
        Err("Invalid email address".to_string())
    }
}

/// `enforce_length` is off for login, where any stored password is accepted.
pub fn password(value: &str, enforce_length: bool) -> Rule {
    if value.is_empty() {
        return Err("Password is required".to_string());
    }
    if enforce_length && value.chars().count() < PASSWORD_MIN_LEN {
        return Err(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN_LEN
        ));
    }
    Ok(())
}

pub fn confirm_password(password: &str, confirm: &str) -> Rule {
    if confirm.is_empty() {
        return Err("Please confirm your password".to_string());
    }
    if confirm != password {
        return Err("Passwords do not match".to_string());
    }
    Ok(())
}

fn name(label: &str, value: &str) -> Rule {
    required(value, &format!("{} is required", label))?;
    if value.trim().chars().count() < NAME_MIN_LEN {
        return Err(format!(
            "{} must be at least {} characters",
            label, NAME_MIN_LEN
        ));
    }
    Ok(())
}

pub fn first_name(value: &str) -> Rule {
    name("First name", value)
}

pub fn last_name(value: &str) -> Rule {
    name("Last name", value)
}

pub fn phone_number(value: &str) -> Rule {
    required(value, "Phone number is required")?;
    if PHONE_RE.is_match(value.trim()) {
        Ok(())
    } else {
        Err("Invalid phone number format".to_string())
    }
}

pub fn city(value: &str) -> Rule {
    required(value, "City is required")
}

pub fn blood_group(value: &str) -> Result<BloodGroup, String> {
    value
        .parse::<BloodGroup>()
        .map_err(|_| "Blood group is required".to_string())
}

/// Optional date; blank means "not given".
pub fn last_donation_date(value: &str) -> Result<Option<NaiveDate>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| "Invalid date, expected YYYY-MM-DD".to_string())
}

pub fn validate_login(email_value: &str, password_value: &str) -> Result<(), FormErrors> {
    let mut errors = FormErrors::new();
    errors.check("email", email(email_value));
    errors.check("password", password(password_value, false));
    errors.into_result()
}
