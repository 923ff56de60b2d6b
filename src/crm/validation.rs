//! Client field validation and Costa Rican formatting rules

use crate::store::models::{Client, IdType};
use chrono::{Months, NaiveDate};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\+506\s?)?[2-8]\d{3}[-\s]?\d{4}$").expect("valid phone regex")
});

static PHONE_CLEAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\+506)?[2-8]\d{7}$").expect("valid phone regex"));

static CEDULA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9]-?\d{4}-?\d{4}$").expect("valid cedula regex"));

static CEDULA_CLEAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9]\d{8}$").expect("valid cedula regex"));

pub const NAME_MIN: usize = 2;
pub const NAME_MAX: usize = 100;
pub const SHORT_TEXT_MAX: usize = 100;
pub const ADDRESS_MAX: usize = 200;
pub const NOTES_MAX: usize = 500;
pub const MAX_TAGS: usize = 10;
pub const STAGE_NAME_MAX: usize = 50;
pub const MIN_AGE: u32 = 18;
pub const MAX_AGE: u32 = 120;

/// A single rejected field
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Trim a string and map blank to `None`
pub fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Costa Rican phone: 8 digits starting 2-8, optional +506 prefix,
/// optional dash or space after the fourth digit
pub fn is_valid_cr_phone(phone: &str) -> bool {
    let cleaned: String = phone.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
    PHONE_RE.is_match(phone) || PHONE_CLEAN_RE.is_match(&cleaned)
}

/// Costa Rican cédula: 9 digits, first 1-9, optionally dashed `X-XXXX-XXXX`
pub fn is_valid_cedula(cedula: &str) -> bool {
    let cleaned: String = cedula.chars().filter(|c| *c != '-').collect();
    CEDULA_RE.is_match(cedula) || CEDULA_CLEAN_RE.is_match(&cleaned)
}

pub fn is_valid_passport(passport: &str) -> bool {
    (5..=20).contains(&passport.chars().count())
}

/// DIMEX: 11 or 12 digits
pub fn is_valid_dimex(dimex: &str) -> bool {
    let cleaned: String = dimex.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
    (11..=12).contains(&cleaned.len()) && cleaned.chars().all(|c| c.is_ascii_digit())
}

pub fn is_valid_id_number(id_type: IdType, number: &str) -> bool {
    match id_type {
        IdType::Cedula => is_valid_cedula(number),
        IdType::Pasaporte => is_valid_passport(number),
        IdType::Dimex => is_valid_dimex(number),
    }
}

/// `today` moved back `years` years; Feb 29 lands on Feb 28
pub fn years_before(today: NaiveDate, years: u32) -> Option<NaiveDate> {
    today.checked_sub_months(Months::new(years * 12))
}

/// `123456789` → `1-2345-6789`; anything else is returned unchanged
pub fn format_cedula(cedula: &str) -> String {
    let digits: String = cedula.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 9 {
        format!("{}-{}-{}", &digits[..1], &digits[1..5], &digits[5..])
    } else {
        cedula.to_string()
    }
}

/// `88888888` → `8888-8888`, `50688888888` → `+506 8888-8888`;
/// anything else is returned unchanged
pub fn format_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        8 => format!("{}-{}", &digits[..4], &digits[4..]),
        11 if digits.starts_with("506") => format!("+506 {}-{}", &digits[3..7], &digits[7..]),
        _ => phone.to_string(),
    }
}

fn check_max(errors: &mut Vec<FieldError>, field: &str, value: Option<&str>, max: usize) {
    if value.is_some_and(|v| v.chars().count() > max) {
        errors.push(FieldError::new(
            field,
            format!("{} cannot exceed {} characters", field, max),
        ));
    }
}

/// Validate every user-editable field of a client. Strings are expected to
/// be trimmed already (see [`clean`]).
pub fn validate_client(client: &Client, today: NaiveDate) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    let name_len = client.name.chars().count();
    if name_len < NAME_MIN {
        errors.push(FieldError::new(
            "name",
            format!("name must be at least {} characters", NAME_MIN),
        ));
    } else if name_len > NAME_MAX {
        errors.push(FieldError::new(
            "name",
            format!("name cannot exceed {} characters", NAME_MAX),
        ));
    }

    if let Some(email) = client.email.as_deref() {
        if !is_valid_email(email) {
            errors.push(FieldError::new("email", "Invalid email address"));
        }
    }

    if let Some(phone) = client.phone.as_deref() {
        if !is_valid_cr_phone(phone) {
            errors.push(FieldError::new(
                "phone",
                "Invalid phone number (expected 8888-8888 or +506 8888-8888)",
            ));
        }
    }

    match (client.id_type, client.id_number.as_deref()) {
        (Some(id_type), Some(number)) => {
            if !is_valid_id_number(id_type, number) {
                let message = match id_type {
                    IdType::Cedula => "Invalid cédula (expected X-XXXX-XXXX)",
                    IdType::Pasaporte => "Passport number must be 5 to 20 characters",
                    IdType::Dimex => "DIMEX must be 11 or 12 digits",
                };
                errors.push(FieldError::new("id_number", message));
            }
        }
        (None, Some(_)) => errors.push(FieldError::new(
            "id_type",
            "id_type is required when id_number is provided",
        )),
        (Some(_), None) => errors.push(FieldError::new(
            "id_number",
            "id_number is required when id_type is provided",
        )),
        (None, None) => {}
    }

    if let Some(birthday) = client.birthday {
        if years_before(today, MIN_AGE).is_some_and(|latest| birthday > latest) {
            errors.push(FieldError::new(
                "birthday",
                format!("Client must be at least {} years old", MIN_AGE),
            ));
        } else if years_before(today, MAX_AGE).is_some_and(|earliest| birthday < earliest) {
            errors.push(FieldError::new("birthday", "Invalid birth date"));
        }
    }

    check_max(&mut errors, "company", client.company.as_deref(), SHORT_TEXT_MAX);
    check_max(
        &mut errors,
        "occupation",
        client.occupation.as_deref(),
        SHORT_TEXT_MAX,
    );
    check_max(&mut errors, "address", client.address.as_deref(), ADDRESS_MAX);
    check_max(&mut errors, "notes", client.notes.as_deref(), NOTES_MAX);

    if client.tags.len() > MAX_TAGS {
        errors.push(FieldError::new(
            "tags",
            format!("A client cannot have more than {} tags", MAX_TAGS),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    #[test]
    fn test_phone_formats() {
        assert!(is_valid_cr_phone("8888-8888"));
        assert!(is_valid_cr_phone("2222 3333"));
        assert!(is_valid_cr_phone("+506 8888-8888"));
        assert!(is_valid_cr_phone("+50688888888"));
        assert!(is_valid_cr_phone("88888888"));
        // Must start with 2-8
        assert!(!is_valid_cr_phone("9888-8888"));
        assert!(!is_valid_cr_phone("1888-8888"));
        assert!(!is_valid_cr_phone("888-8888"));
        assert!(!is_valid_cr_phone("+1 8888-8888"));
    }

    #[test]
    fn test_cedula_formats() {
        assert!(is_valid_cedula("1-2345-6789"));
        assert!(is_valid_cedula("123456789"));
        assert!(is_valid_cedula("1-23456789"));
        assert!(!is_valid_cedula("0-2345-6789"));
        assert!(!is_valid_cedula("1-234-6789"));
        assert!(!is_valid_cedula("12345678"));
        assert!(!is_valid_cedula("1 2345 6789"));
        assert!(!is_valid_cedula("1-2345 6789"));
    }

    #[test]
    fn test_passport_and_dimex() {
        assert!(is_valid_passport("A1234"));
        assert!(!is_valid_passport("A123"));
        assert!(!is_valid_passport(&"X".repeat(21)));
        assert!(is_valid_dimex("12345678901"));
        assert!(is_valid_dimex("123456789012"));
        assert!(!is_valid_dimex("1234567890"));
        assert!(!is_valid_dimex("1234567890AB"));
    }

    #[test]
    fn test_email() {
        assert!(is_valid_email("ana@correo.cr"));
        assert!(!is_valid_email("ana@correo"));
        assert!(!is_valid_email("ana correo@x.cr"));
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_cedula("123456789"), "1-2345-6789");
        assert_eq!(format_cedula("1-2345-6789"), "1-2345-6789");
        assert_eq!(format_cedula("12345"), "12345");
        assert_eq!(format_phone("88888888"), "8888-8888");
        assert_eq!(format_phone("+506 88888888"), "+506 8888-8888");
        assert_eq!(format_phone("555"), "555");
    }

    #[test]
    fn test_years_before() {
        let t = today();
        assert_eq!(years_before(t, 18), NaiveDate::from_ymd_opt(2007, 6, 15));
        let leap_day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(years_before(leap_day, 18), NaiveDate::from_ymd_opt(2006, 2, 28));
    }

    fn birthday_errors(birthday: NaiveDate, today: NaiveDate) -> Vec<FieldError> {
        let mut client = Client::new("Ana Solís".into());
        client.birthday = Some(birthday);
        validate_client(&client, today).err().unwrap_or_default()
    }

    #[test]
    fn test_birthday_minimum_age() {
        let t = today();
        assert!(birthday_errors(NaiveDate::from_ymd_opt(2007, 6, 15).unwrap(), t).is_empty());
        let errors = birthday_errors(NaiveDate::from_ymd_opt(2007, 6, 16).unwrap(), t);
        assert_eq!(errors[0].field, "birthday");
    }

    #[test]
    fn test_birthday_older_than_120_years_rejected() {
        let t = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        // Whole-year age is still 120, but the date is past the limit
        let errors = birthday_errors(NaiveDate::from_ymd_opt(1906, 4, 1).unwrap(), t);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Invalid birth date");
        assert_eq!(birthday_errors(NaiveDate::from_ymd_opt(1906, 10, 17).unwrap(), t).len(), 1);

        // Exactly 120 years ago is still accepted
        assert!(birthday_errors(NaiveDate::from_ymd_opt(1906, 10, 18).unwrap(), t).is_empty());
    }

    #[test]
    fn test_validate_client_collects_all_errors() {
        let mut client = Client::new("A".into());
        client.email = Some("bad".into());
        client.phone = Some("123".into());
        client.id_number = Some("1-2345-6789".into());
        client.birthday = NaiveDate::from_ymd_opt(2015, 1, 1);
        client.tags = (0..11).map(|i| format!("t{}", i)).collect();
        client.notes = Some("x".repeat(501));

        let errors = validate_client(&client, today()).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["name", "email", "phone", "id_type", "birthday", "notes", "tags"]
        );
    }

    #[test]
    fn test_validate_client_accepts_complete_record() {
        let mut client = Client::new("Ana Solís".into());
        client.email = Some("ana@correo.cr".into());
        client.phone = Some("+506 8888-8888".into());
        client.id_type = Some(IdType::Cedula);
        client.id_number = Some("1-2345-6789".into());
        client.birthday = NaiveDate::from_ymd_opt(1985, 3, 2);
        client.tags = vec!["vip".into()];
        assert!(validate_client(&client, today()).is_ok());
    }

    #[test]
    fn test_id_type_without_number() {
        let mut client = Client::new("Ana Solís".into());
        client.id_type = Some(IdType::Dimex);
        let errors = validate_client(&client, today()).unwrap_err();
        assert_eq!(errors, vec![FieldError::new("id_number", "id_number is required when id_type is provided")]);
    }

    #[test]
    fn test_clean_blank_strings() {
        assert_eq!(clean(Some("  hola ".into())), Some("hola".into()));
        assert_eq!(clean(Some("   ".into())), None);
        assert_eq!(clean(None), None);
    }
}
