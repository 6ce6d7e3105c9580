//! TwiML replies for the messaging webhook

/// Escape text for an XML element body
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// A `<Response>` carrying one outbound message
pub fn message(text: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
        escape(text)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("Tom & Jerry <3"), "Tom &amp; Jerry &lt;3");
        assert_eq!(escape("Added 'buy milk'"), "Added &apos;buy milk&apos;");
    }

    #[test]
    fn test_message() {
        assert_eq!(
            message("hi"),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>hi</Message></Response>"
        );
    }
}
