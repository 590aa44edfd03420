//! Email templates, compiled into the binary.

use anyhow::{Context, Result};
use tera::Tera;

use super::clients::Message;

pub const RESET_PASSWORD: &str = "emails/reset_password.txt";

/// Load every email template.
pub fn load() -> Result<Tera> {
    let mut tera = Tera::default();

    tera.add_raw_template(
        RESET_PASSWORD,
        include_str!("../../templates/emails/reset_password.txt"),
    )
    .context("Failed to parse the reset password template.")?;

    Ok(tera)
}

/// Build the link a user follows to complete a reset.
///
/// The token is URL-safe base64, so it can be appended without escaping.
pub fn reset_link(reset_url: &str, token: &str) -> String {
    let separator = if reset_url.contains('?') { '&' } else { '?' };

    format!("{}{}token={}", reset_url, separator, token)
}

/// Render the email carrying a reset link.
///
/// # Arguments
///
/// * `templates` - Templates from [`load`].
/// * `to` - The recipient's address.
/// * `username` - The directory username being reset.
/// * `reset_link` - The link from [`reset_link`].
/// * `ttl_minutes` - How long the link stays valid.
pub fn render_reset(
    templates: &Tera,
    to: &str,
    username: &str,
    reset_link: &str,
    ttl_minutes: i64,
) -> Result<Message> {
    let mut context = tera::Context::new();
    context.insert("username", username);
    context.insert("reset_link", reset_link);
    context.insert("ttl_minutes", &ttl_minutes);

    let text = templates
        .render(RESET_PASSWORD, &context)
        .context("Failed to render the reset password template.")?;

    Ok(Message {
        to: to.to_owned(),
        subject: "Reset Your Password".to_owned(),
        text,
    })
}
