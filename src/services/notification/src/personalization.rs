//! Placeholder substitution for message templates
//!
//! Supported placeholders, written `{{key}}` with optional inner whitespace:
//! `name`, `first_name`, `email`, `phone`, `date`, `time`, `datetime`,
//! `user_id`. Anything else is left exactly as written.

use chrono::{DateTime, Utc};
use notify_shared::Recipient;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

pub const DEFAULT_NAME: &str = "Valued Customer";

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder regex"));

/// Render `template` for one recipient at `now`.
pub fn render(template: &str, recipient: &Recipient, now: DateTime<Utc>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            resolve(key, recipient, now).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn resolve(key: &str, recipient: &Recipient, now: DateTime<Utc>) -> Option<String> {
    let value = match key {
        "name" => display_name(recipient).to_string(),
        "first_name" => first_name(recipient),
        "email" => recipient.email.clone().unwrap_or_default(),
        "phone" => recipient.phone.clone().unwrap_or_default(),
        "user_id" => recipient.user_id.clone(),
        "date" => now.format("%Y-%m-%d").to_string(),
        "time" => now.format("%H:%M").to_string(),
        "datetime" => now.format("%Y-%m-%d %H:%M").to_string(),
        _ => return None,
    };
    Some(value)
}

fn display_name(recipient: &Recipient) -> &str {
    recipient
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_NAME)
}

fn first_name(recipient: &Recipient) -> String {
    recipient
        .name
        .as_deref()
        .and_then(|n| n.split_whitespace().next())
        .unwrap_or(DEFAULT_NAME)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use notify_shared::NotificationPreferences;

    fn recipient(name: Option<&str>) -> Recipient {
        Recipient {
            user_id: "u-42".to_string(),
            name: name.map(str::to_string),
            email: Some("asha@example.com".to_string()),
            phone: None,
            push_token: None,
            preferences: NotificationPreferences::default(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 1, 9, 5, 0).unwrap()
    }

    #[test]
    fn test_known_placeholders() {
        let out = render(
            "Hi {{first_name}} ({{ name }}), mail {{email}}, phone '{{phone}}', id {{user_id}}",
            &recipient(Some("Asha Rao")),
            now(),
        );
        assert_eq!(
            out,
            "Hi Asha (Asha Rao), mail asha@example.com, phone '', id u-42"
        );
    }

    #[test]
    fn test_date_placeholders() {
        let out = render("{{date}} {{time}} | {{datetime}}", &recipient(None), now());
        assert_eq!(out, "2024-11-01 09:05 | 2024-11-01 09:05");
    }

    #[test]
    fn test_missing_name_defaults() {
        let out = render("Dear {{name}} / {{first_name}}", &recipient(None), now());
        assert_eq!(out, "Dear Valued Customer / Valued Customer");

        let out = render("Dear {{name}}", &recipient(Some("   ")), now());
        assert_eq!(out, "Dear Valued Customer");
    }

    #[test]
    fn test_unknown_placeholders_left_verbatim() {
        let template = "Use code {{ coupon_code }} or {{unknown}} before {{date}}";
        let out = render(template, &recipient(Some("Asha")), now());
        assert_eq!(
            out,
            "Use code {{ coupon_code }} or {{unknown}} before 2024-11-01"
        );
    }

    #[test]
    fn test_template_without_placeholders_is_unchanged() {
        let template = "Flat 20% off, no braces { here }";
        assert_eq!(render(template, &recipient(None), now()), template);
    }
}
