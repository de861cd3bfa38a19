//! Field validation for bill payloads
//!
//! Every check runs before anything is written. Violations are collected per
//! field so a client can fix its whole submission in one round trip.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Bill, BillInput, BillPatch, BillStatus, Category, ListParams, UserId};

pub const TITLE_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MAX_CHARS: usize = 500;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Largest amount a `NUMERIC(12, 2)` column holds
fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999, 2)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldViolation>);

impl ValidationErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldViolation {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.0
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|v| v.field == field)
    }

    fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, Self> {
        if self.is_empty() { Ok(value()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Validated, normalized fields of a bill that does not exist yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBill {
    pub title: String,
    pub amount: Decimal,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: BillStatus,
    pub category: Category,
    pub users: Vec<UserId>,
}

/// Resolved listing options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillFilter {
    pub page: u32,
    pub limit: u32,
    pub status: Option<BillStatus>,
    pub category: Option<Category>,
    pub search: Option<String>,
}

impl Default for BillFilter {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            status: None,
            category: None,
            search: None,
        }
    }
}

/// Validate a creation payload. `today` fills in a missing bill date.
pub fn validate_for_create(input: &BillInput, today: NaiveDate) -> Result<NewBill, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let title = match input.title.as_deref() {
        Some(raw) => title(raw, &mut errors),
        None => {
            errors.add("title", "Title is required");
            None
        }
    };
    let amount = match &input.amount {
        Some(raw) => amount(raw, &mut errors),
        None => {
            errors.add("amount", "Amount is required");
            None
        }
    };
    let description = input
        .description
        .as_deref()
        .and_then(|raw| description(raw, &mut errors));
    let date = match input.date.as_deref() {
        Some(raw) => parse_date("date", "Date must be a valid date", raw, &mut errors),
        None => Some(today),
    };
    let due_date = match input.due_date.as_deref() {
        Some(raw) => parse_date("dueDate", "Due date must be a valid date", raw, &mut errors),
        None => {
            errors.add("dueDate", "Due date is required");
            None
        }
    };
    let status = match input.status.as_deref() {
        Some(raw) => status(raw, &mut errors),
        None => Some(BillStatus::default()),
    };
    let category = match input.category.as_deref() {
        Some(raw) => category(raw, &mut errors),
        None => Some(Category::default()),
    };
    let users = users(input.users.as_deref(), &mut errors);

    match (title, amount, date, due_date, status, category, users) {
        (Some(title), Some(amount), Some(date), Some(due_date), Some(status), Some(category), Some(users))
            if errors.is_empty() =>
        {
            Ok(NewBill {
                title,
                amount,
                description,
                date,
                due_date,
                status,
                category,
                users,
            })
        }
        _ => Err(errors),
    }
}

/// Apply a patch onto an existing bill. Absent fields keep their value.
///
/// The returned bill still carries the existing revision and timestamps; the
/// repository stamps `updated_at` and the store bumps the revision.
pub fn validate_for_update(existing: &Bill, patch: &BillPatch) -> Result<Bill, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let mut bill = existing.clone();

    if let Some(raw) = patch.title.as_deref() {
        if let Some(title) = title(raw, &mut errors) {
            bill.title = title;
        }
    }
    if let Some(raw) = &patch.amount {
        if let Some(amount) = amount(raw, &mut errors) {
            bill.amount = amount;
        }
    }
    match &patch.description {
        Some(Some(raw)) => bill.description = description(raw, &mut errors),
        Some(None) => bill.description = None,
        None => {}
    }
    if let Some(raw) = patch.date.as_deref() {
        if let Some(date) = parse_date("date", "Date must be a valid date", raw, &mut errors) {
            bill.date = date;
        }
    }
    if let Some(raw) = patch.due_date.as_deref() {
        if let Some(due_date) = parse_date("dueDate", "Due date must be a valid date", raw, &mut errors) {
            bill.due_date = due_date;
        }
    }
    if let Some(raw) = patch.status.as_deref() {
        if let Some(status) = status(raw, &mut errors) {
            bill.status = status;
        }
    }
    if let Some(raw) = patch.category.as_deref() {
        if let Some(category) = category(raw, &mut errors) {
            bill.category = category;
        }
    }
    if patch.users.is_some() {
        if let Some(users) = users(patch.users.as_deref(), &mut errors) {
            bill.users = users;
        }
    }

    errors.into_result(|| bill)
}

/// Resolve query-string listing parameters
pub fn validate_list_params(params: &ListParams) -> Result<BillFilter, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let mut filter = BillFilter::default();

    if let Some(raw) = non_blank(params.page.as_deref()) {
        match raw.parse::<u32>() {
            Ok(page) if page >= 1 => filter.page = page,
            _ => errors.add("page", "Page must be a positive integer"),
        }
    }
    if let Some(raw) = non_blank(params.limit.as_deref()) {
        match raw.parse::<u32>() {
            Ok(limit) if (1..=MAX_PAGE_SIZE).contains(&limit) => filter.limit = limit,
            _ => errors.add("limit", "Limit must be between 1 and 100"),
        }
    }
    if let Some(raw) = non_blank(params.status.as_deref()) {
        filter.status = status(raw, &mut errors);
    }
    if let Some(raw) = non_blank(params.category.as_deref()) {
        filter.category = category(raw, &mut errors);
    }
    filter.search = non_blank(params.search.as_deref()).map(str::to_string);

    errors.into_result(|| filter)
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

fn title(raw: &str, errors: &mut ValidationErrors) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        errors.add("title", "Title is required");
        return None;
    }
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        errors.add("title", "Title cannot exceed 100 characters");
        return None;
    }
    Some(trimmed.to_string())
}

fn description(raw: &str, errors: &mut ValidationErrors) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.chars().count() > DESCRIPTION_MAX_CHARS {
        errors.add("description", "Description cannot exceed 500 characters");
        return None;
    }
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn amount(raw: &serde_json::Value, errors: &mut ValidationErrors) -> Option<Decimal> {
    let parsed = match raw {
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    };

    let Some(amount) = parsed else {
        errors.add("amount", "Amount must be a number");
        return None;
    };
    if amount <= Decimal::ZERO {
        errors.add("amount", "Amount must be greater than 0");
        return None;
    }
    if amount.normalize().scale() > 2 {
        errors.add("amount", "Amount cannot have more than 2 decimal places");
        return None;
    }
    if amount > max_amount() {
        errors.add("amount", "Amount is too large");
        return None;
    }
    Some(amount)
}

/// Accepts a plain calendar date or an RFC 3339 timestamp
fn parse_date(field: &str, message: &str, raw: &str, errors: &mut ValidationErrors) -> Option<NaiveDate> {
    let raw = raw.trim();
    let parsed = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()));

    if parsed.is_none() {
        errors.add(field, message);
    }
    parsed
}

fn status(raw: &str, errors: &mut ValidationErrors) -> Option<BillStatus> {
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        errors.add("status", "Status must be pending or paid");
    }
    parsed
}

fn category(raw: &str, errors: &mut ValidationErrors) -> Option<Category> {
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        errors.add("category", "Category must be one of gas, electricity, water, internet, other");
    }
    parsed
}

/// Parses participant ids, dropping repeats while keeping first-seen order
fn users(raw: Option<&[String]>, errors: &mut ValidationErrors) -> Option<Vec<UserId>> {
    let raw = match raw {
        Some(raw) if !raw.is_empty() => raw,
        _ => {
            errors.add("users", "At least one user must be selected");
            return None;
        }
    };

    let mut ids = Vec::with_capacity(raw.len());
    let mut valid = true;
    for (index, value) in raw.iter().enumerate() {
        match Uuid::parse_str(value.trim()) {
            Ok(id) if !ids.contains(&id) => ids.push(id),
            Ok(_) => {}
            Err(_) => {
                errors.add(format!("users[{index}]"), "Invalid user ID");
                valid = false;
            }
        }
    }

    valid.then_some(ids)
}
