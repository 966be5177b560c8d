use lazy_static::lazy_static;
use regex::Regex;

use crate::auth::dto::{LoginRequest, SignupRequest};
use crate::users::dto::UpdateUserRequest;

/// A single field-level validation failure.
#[derive(Debug, PartialEq, Eq)]
pub struct Issue {
    pub path: &'static str,
    pub message: &'static str,
}

/// Renders issues as "field: message, field: message" in reported order.
pub fn format_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(|i| format!("{}: {}", i.path, i.message))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn check_name(name: &str, issues: &mut Vec<Issue>) {
    if name.is_empty() {
        issues.push(Issue {
            path: "name",
            message: "Name is required",
        });
    }
}

fn check_email(email: &str, issues: &mut Vec<Issue>) {
    if !is_valid_email(email) {
        issues.push(Issue {
            path: "email",
            message: "Invalid email address",
        });
    }
}

fn check_password(password: &str, issues: &mut Vec<Issue>) {
    let len = password.chars().count();
    if len < 6 {
        issues.push(Issue {
            path: "password",
            message: "Password must be at least 6 characters long",
        });
    } else if len > 100 {
        issues.push(Issue {
            path: "password",
            message: "Password must be less than 100 characters long",
        });
    }
}

pub fn validate_signup(req: &SignupRequest) -> Result<(), Vec<Issue>> {
    let mut issues = Vec::new();
    check_name(&req.name, &mut issues);
    check_email(&req.email, &mut issues);
    check_password(&req.password, &mut issues);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

pub fn validate_login(req: &LoginRequest) -> Result<(), Vec<Issue>> {
    let mut issues = Vec::new();
    check_email(&req.email, &mut issues);
    check_password(&req.password, &mut issues);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

pub fn validate_user_update(req: &UpdateUserRequest) -> Result<(), Vec<Issue>> {
    let mut issues = Vec::new();
    if let Some(name) = &req.name {
        check_name(name, &mut issues);
    }
    if let Some(email) = &req.email {
        check_email(email, &mut issues);
    }
    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}
