/// Email templates
///
/// All user-supplied values are HTML-escaped before interpolation.

use super::PriceAlert;

pub const BRAND: &str = "Price Tracker";

const BUTTON_STYLE: &str =
    "background-color: #4CAF50; color: white; padding: 12px 24px; text-decoration: none; border-radius: 4px;";

/// Rendered subject and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub subject: String,
    pub html: String,
}

/// Escapes text for inclusion in HTML content or attribute values
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn layout(
    heading: &str,
    greeting_name: &str,
    paragraphs: &[String],
    button: Option<(&str, &str)>,
    footer: &[&str],
) -> String {
    let mut html = String::new();
    html.push_str(r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">"#);
    html.push_str(&format!(r#"<h2 style="color: #333;">{heading}</h2>"#));
    html.push_str(&format!("<p>Hi {},</p>", escape_html(greeting_name)));

    for paragraph in paragraphs {
        html.push_str(&format!("<p>{paragraph}</p>"));
    }

    if let Some((href, label)) = button {
        html.push_str(&format!(
            r#"<div style="text-align: center; margin: 30px 0;"><a href="{}" style="{BUTTON_STYLE}">{label}</a></div>"#,
            escape_html(href)
        ));
    }

    for line in footer {
        html.push_str(&format!("<p>{line}</p>"));
    }

    html.push_str(&format!("<p>Best regards,<br>The {BRAND} Team</p></div>"));
    html
}

/// Email asking a new user to confirm their address
pub fn verification_email(name: &str, verification_link: &str) -> EmailContent {
    EmailContent {
        subject: "Verify Your Email Address".to_string(),
        html: layout(
            &format!("Welcome to {BRAND}!"),
            name,
            &[format!(
                "Thank you for registering with {BRAND}. Please verify your email address by clicking the button below:"
            )],
            Some((verification_link, "Verify Email Address")),
            &["If you didn't create an account with Price Tracker, you can safely ignore this email."],
        ),
    }
}

/// Password reset link; the link expires after one hour
pub fn password_reset_email(name: &str, reset_link: &str) -> EmailContent {
    EmailContent {
        subject: "Reset Your Password".to_string(),
        html: layout(
            "Password Reset Request",
            name,
            &["We received a request to reset your password. Click the button below to create a new password:"
                .to_string()],
            Some((reset_link, "Reset Password")),
            &[
                "This link will expire in 1 hour for security reasons.",
                "If you didn't request a password reset, you can safely ignore this email.",
            ],
        ),
    }
}

/// Target price reached
pub fn price_alert_email(alert: &PriceAlert) -> EmailContent {
    let title = if alert.title.trim().is_empty() {
        "A product you track"
    } else {
        alert.title.as_str()
    };

    EmailContent {
        subject: format!("Price alert: {title}"),
        html: layout(
            "Your target price was reached",
            &alert.user_name,
            &[format!(
                "<strong>{}</strong> is now <strong>${:.2}</strong>, at or below your target of ${:.2}.",
                escape_html(title),
                alert.price,
                alert.target_price
            )],
            Some((&alert.url, "View Product")),
            &[],
        ),
    }
}
