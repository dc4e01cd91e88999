use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::{MailError, OutgoingEmail};

const LINE_WIDTH: usize = 76;

/// Renders an RFC 5322 message: a single HTML part, or `multipart/mixed` with
/// the HTML part followed by the attachment. Bodies are base64 encoded.
pub fn build_message(email: &OutgoingEmail, boundary: &str) -> Result<String, MailError> {
    let to = header_value("To", &email.to)?;
    let subject = encode_word(header_value("Subject", &email.subject)?);
    let from_name = header_value("From", &email.sender.name)?;
    let from_email = header_value("From", &email.sender.email)?;
    let from = if from_name.is_empty() {
        from_email.to_string()
    } else {
        format!("{} <{}>", encode_word(from_name), from_email)
    };

    let mut out = String::new();
    push_line(&mut out, &format!("From: {from}"));
    push_line(&mut out, &format!("To: {to}"));
    push_line(&mut out, &format!("Subject: {subject}"));
    push_line(&mut out, "MIME-Version: 1.0");

    match &email.attachment {
        None => {
            push_html_part(&mut out, &email.html_body);
        }
        Some(attachment) => {
            let filename = header_value("attachment filename", &attachment.filename)?;
            push_line(
                &mut out,
                &format!("Content-Type: multipart/mixed; boundary=\"{boundary}\""),
            );
            push_line(&mut out, "");
            push_line(&mut out, &format!("--{boundary}"));
            push_html_part(&mut out, &email.html_body);
            push_line(&mut out, &format!("--{boundary}"));
            push_line(
                &mut out,
                &format!(
                    "Content-Type: {}; name=\"{filename}\"",
                    attachment.content_type
                ),
            );
            push_line(
                &mut out,
                &format!("Content-Disposition: attachment; filename=\"{filename}\""),
            );
            push_line(&mut out, "Content-Transfer-Encoding: base64");
            push_line(&mut out, "");
            push_base64(&mut out, &attachment.data);
            push_line(&mut out, &format!("--{boundary}--"));
        }
    }
    Ok(out)
}

fn push_html_part(out: &mut String, html: &str) {
    push_line(out, "Content-Type: text/html; charset=\"UTF-8\"");
    push_line(out, "Content-Transfer-Encoding: base64");
    push_line(out, "");
    push_base64(out, html.as_bytes());
}

fn push_base64(out: &mut String, data: &[u8]) {
    let encoded = STANDARD.encode(data);
    for chunk in encoded.as_bytes().chunks(LINE_WIDTH) {
        // base64 output is ASCII, so every chunk is valid UTF-8.
        push_line(out, std::str::from_utf8(chunk).unwrap_or_default());
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push_str("\r\n");
}

/// Rejects values that would let a caller inject extra headers.
fn header_value<'a>(name: &'static str, value: &'a str) -> Result<&'a str, MailError> {
    if value.contains(['\r', '\n']) {
        Err(MailError::InvalidHeader(name))
    } else {
        Ok(value.trim())
    }
}

/// RFC 2047 encoded-word for non-ASCII header text.
fn encode_word(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(value.as_bytes()))
    }
}
