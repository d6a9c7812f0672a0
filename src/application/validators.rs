//! Field validation for registration and profile forms.
//!
//! Error messages are user-facing and in Russian, matching the rest of the
//! service surface.

use chrono::{Datelike, NaiveDate, Utc};
use serde::Deserialize;
use validator::ValidateEmail;

use crate::app_error::FieldError;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationForm {
    pub email: String,
    pub phone: String,
    pub password: String,
    pub confirm_password: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub birthday: String,
    #[serde(default)]
    pub agree_terms: bool,
    /// Honeypot field. Real clients leave it empty.
    #[serde(default)]
    pub website: String,
}

pub fn is_valid_email(email: &str) -> bool {
    email.validate_email()
}

/// Kazakhstan mobile format only: `+7` followed by exactly ten digits.
pub fn is_valid_phone(phone: &str) -> bool {
    let Some(rest) = phone.strip_prefix("+7") else {
        return false;
    };
    rest.len() == 10 && rest.bytes().all(|b| b.is_ascii_digit())
}

/// Letters, digits and at least one symbol.
pub fn is_password_complex(password: &str) -> bool {
    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| !c.is_alphanumeric());
    has_letter && has_digit && has_symbol
}

/// Birthday is stored as `YYYY-MM-DD`. Unparseable input fails the check.
pub fn is_adult(birthday: &str) -> bool {
    let Ok(date) = NaiveDate::parse_from_str(birthday, "%Y-%m-%d") else {
        return false;
    };
    let today = Utc::now().date_naive();
    let mut age = today.year() - date.year();
    if (today.month(), today.day()) < (date.month(), date.day()) {
        age -= 1;
    }
    age >= 18
}

fn is_alpha_space(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_alphabetic() || c == ' ' || c == '-')
}

/// Strips everything except letters, spaces and dashes, then capitalizes
/// the first letter.
pub fn sanitize_name(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_alphabetic() || *c == ' ' || *c == '-')
        .collect();
    let mut chars = cleaned.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => cleaned,
    }
}

pub fn validate_registration(form: &RegistrationForm) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if form.email.trim().is_empty() {
        errors.push(FieldError::new("email", "Это поле обязательно для заполнения."));
    } else if !is_valid_email(form.email.trim()) {
        errors.push(FieldError::new(
            "email",
            "Введите корректный адрес электронной почты.",
        ));
    }

    if !is_valid_phone(form.phone.trim()) {
        errors.push(FieldError::new(
            "phone",
            "Введите корректный номер телефона (например, +7XXXXXXXXXX).",
        ));
    }

    if form.password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new(
            "password",
            format!("Минимальная длина этого поля: {MIN_PASSWORD_LEN} символов."),
        ));
    } else if !is_password_complex(&form.password) {
        errors.push(FieldError::new(
            "password",
            "Пароль должен содержать буквы, цифры и символы.",
        ));
    }

    if form.confirm_password != form.password {
        errors.push(FieldError::new(
            "confirm_password",
            "Значение должно совпадать с полем password.",
        ));
    }

    if !is_alpha_space(form.first_name.trim()) {
        errors.push(FieldError::new(
            "first_name",
            "Поле может содержать только буквы, пробелы и дефисы.",
        ));
    }
    if !is_alpha_space(form.last_name.trim()) {
        errors.push(FieldError::new(
            "last_name",
            "Поле может содержать только буквы, пробелы и дефисы.",
        ));
    }

    if form.gender != "male" && form.gender != "female" {
        errors.push(FieldError::new(
            "gender",
            "Выберите одно из допустимых значений: male female.",
        ));
    }

    if form.birthday.trim().is_empty() {
        errors.push(FieldError::new("birthday", "Это поле обязательно для заполнения."));
    } else if !is_adult(form.birthday.trim()) {
        errors.push(FieldError::new(
            "birthday",
            "Пользователь должен быть старше 18 лет.",
        ));
    }

    if !form.agree_terms {
        errors.push(FieldError::new(
            "agree_terms",
            "Это поле обязательно для заполнения.",
        ));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_form() -> RegistrationForm {
        RegistrationForm {
            email: "ayan@example.kz".into(),
            phone: "+77011234567".into(),
            password: "p4ssword!".into(),
            confirm_password: "p4ssword!".into(),
            first_name: "Аян".into(),
            last_name: "Серикулы".into(),
            gender: "male".into(),
            birthday: "1990-05-20".into(),
            agree_terms: true,
            website: String::new(),
        }
    }

    #[test]
    fn accepts_valid_form() {
        assert!(validate_registration(&valid_form()).is_empty());
    }

    #[test]
    fn phone_must_be_kazakh_mobile_format() {
        assert!(is_valid_phone("+77011234567"));
        assert!(!is_valid_phone("+7701123456")); // one digit short
        assert!(!is_valid_phone("+870112345678"));
        assert!(!is_valid_phone("87011234567"));
        assert!(!is_valid_phone("+7701123456a"));
    }

    #[test]
    fn password_needs_letter_digit_and_symbol() {
        assert!(is_password_complex("abc123!#"));
        assert!(!is_password_complex("abcdefgh"));
        assert!(!is_password_complex("abcd1234"));
        assert!(!is_password_complex("1234!@#$"));
    }

    #[test]
    fn short_password_rejected_before_complexity() {
        let mut form = valid_form();
        form.password = "a1!".into();
        form.confirm_password = "a1!".into();
        let errors = validate_registration(&form);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "password");
        assert!(errors[0].message.contains("8"));
    }

    #[test]
    fn mismatched_confirmation_flagged() {
        let mut form = valid_form();
        form.confirm_password = "different1!".into();
        let errors = validate_registration(&form);
        assert!(errors.iter().any(|e| e.field == "confirm_password"));
    }

    #[test]
    fn minors_are_rejected() {
        let today = Utc::now().date_naive();
        let seventeen = today
            .with_year(today.year() - 17)
            .unwrap()
            .format("%Y-%m-%d")
            .to_string();
        assert!(!is_adult(&seventeen));
        assert!(is_adult("1980-01-01"));
        assert!(!is_adult("not-a-date"));
    }

    #[test]
    fn name_sanitizing_strips_and_capitalizes() {
        assert_eq!(sanitize_name("  аян123  "), "Аян");
        assert_eq!(sanitize_name("anna-maria"), "Anna-maria");
        assert_eq!(sanitize_name("<script>"), "Script");
        assert_eq!(sanitize_name("42"), "");
    }

    #[test]
    fn cyrillic_names_pass_alpha_space_rule() {
        let mut form = valid_form();
        form.first_name = "Жан-Поль".into();
        assert!(validate_registration(&form).is_empty());
    }
}
