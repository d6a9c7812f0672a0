use chrono::Utc;
use uuid::Uuid;

use crate::application::validators::RegistrationForm;
use crate::domain::entities::role::RoleName;
use crate::domain::entities::subscription::SubscriptionStatus;
use crate::domain::entities::user::UserProfile;

/// A registration form that passes every validator.
pub fn registration_form() -> RegistrationForm {
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

/// A verified user without a subscription. Emails are unique per call so
/// several can be inserted into one repo.
pub fn test_user() -> UserProfile {
    let id = Uuid::new_v4();
    let now = Utc::now().naive_utc();
    UserProfile {
        id,
        email: format!("user-{id}@example.kz"),
        phone: Some("+77011234567".into()),
        first_name: "Аян".into(),
        last_name: "Серикулы".into(),
        gender: "male".into(),
        birthday: "1990-05-20".into(),
        role_name: Some(RoleName::User),
        tts_enabled_default: None,
        is_email_verified: true,
        is_phone_verified: false,
        subscription_id: None,
        customer_id: None,
        subscription_status: SubscriptionStatus::Inactive,
        subscription_end_date: None,
        current_period_end: None,
        tokens_used_input_this_period: 0,
        tokens_used_output_this_period: 0,
        billing_cycle_anchor: None,
        created_at: now,
        updated_at: now,
    }
}
