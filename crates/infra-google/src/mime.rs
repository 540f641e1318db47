use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use charset::Charset;
use mailparse::body::Body;
use mailparse::{MailHeaderMap, ParsedMail};
use penny_error::AgentError;

const HTML_WIDTH: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub from: String,
    pub to: Option<String>,
    pub subject: String,
    pub content: String,
}

pub fn decode_gmail_raw(raw: &str) -> Result<DecodedMessage, AgentError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(raw.trim().trim_end_matches('='))
        .map_err(|e| AgentError::decode(format!("raw message is not base64url: {e}")))?;
    decode_message(&bytes)
}

pub fn decode_message(raw: &[u8]) -> Result<DecodedMessage, AgentError> {
    let parsed =
        mailparse::parse_mail(raw).map_err(|e| AgentError::decode(format!("mailparse: {e}")))?;

    Ok(DecodedMessage {
        from: header(&parsed, "From")?.unwrap_or_default(),
        to: header(&parsed, "To")?,
        subject: header(&parsed, "Subject")?.unwrap_or_default(),
        content: extract_body(&parsed)?,
    })
}

fn header(parsed: &ParsedMail<'_>, name: &str) -> Result<Option<String>, AgentError> {
    match parsed.get_headers().get_first_header(name) {
        Some(h) => decode_header_value(h.get_value_raw()).map(Some),
        None => Ok(None),
    }
}

/// Decodes every encoded-word in a raw header value with its own charset.
/// Whitespace separating two adjacent encoded-words is dropped.
pub fn decode_header_value(raw: &[u8]) -> Result<String, AgentError> {
    let unfolded: String = String::from_utf8_lossy(raw)
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect();

    let mut out = String::with_capacity(unfolded.len());
    let mut rest = unfolded.as_str();
    let mut after_word = false;

    while let Some((start, end, word)) = find_encoded_word(rest) {
        let between = &rest[..start];
        if !(after_word && between.chars().all(char::is_whitespace)) {
            out.push_str(between);
        }
        out.push_str(&word.decode()?);
        rest = &rest[end..];
        after_word = true;
    }
    out.push_str(rest);

    Ok(out.trim().to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WordEncoding {
    B,
    Q,
}

#[derive(Debug)]
struct EncodedWord<'a> {
    charset: &'a str,
    encoding: WordEncoding,
    text: &'a str,
}

impl EncodedWord<'_> {
    fn decode(&self) -> Result<String, AgentError> {
        let bytes = match self.encoding {
            WordEncoding::B => STANDARD_NO_PAD
                .decode(self.text.trim_end_matches('='))
                .map_err(|e| AgentError::decode(format!("encoded-word base64: {e}")))?,
            WordEncoding::Q => {
                let qp = self.text.replace('_', "=20");
                quoted_printable::decode(qp.as_bytes(), quoted_printable::ParseMode::Robust)
                    .map_err(|e| AgentError::decode(format!("encoded-word Q: {e}")))?
            }
        };
        decode_charset(self.charset, &bytes)
    }
}

fn find_encoded_word(s: &str) -> Option<(usize, usize, EncodedWord<'_>)> {
    let mut from = 0;
    while let Some(pos) = s[from..].find("=?") {
        let start = from + pos;
        if let Some((len, word)) = parse_encoded_word(&s[start..]) {
            return Some((start, start + len, word));
        }
        from = start + 2;
    }
    None
}

fn parse_encoded_word(s: &str) -> Option<(usize, EncodedWord<'_>)> {
    let body = s.strip_prefix("=?")?;
    let (charset, rest) = body.split_once('?')?;
    let (encoding, rest) = rest.split_once('?')?;
    let end = rest.find("?=")?;
    let text = &rest[..end];

    if charset.contains(char::is_whitespace) || text.contains(char::is_whitespace) {
        return None;
    }
    let encoding = match encoding {
        "B" | "b" => WordEncoding::B,
        "Q" | "q" => WordEncoding::Q,
        _ => return None,
    };

    let len = s.len() - rest.len() + end + 2;
    Some((
        len,
        EncodedWord {
            charset,
            encoding,
            text,
        },
    ))
}

/// Decodes `bytes` with the charset named by `label`; an empty label means
/// UTF-8 and an RFC 2231 language suffix (`utf-8*en`) is ignored.
pub fn decode_charset(label: &str, bytes: &[u8]) -> Result<String, AgentError> {
    let label = label.split('*').next().unwrap_or_default().trim();
    let label = if label.is_empty() { "utf-8" } else { label };
    let charset = Charset::for_label_no_replacement(label.as_bytes())
        .ok_or_else(|| AgentError::decode(format!("unsupported charset '{label}'")))?;
    let (text, _malformed) = charset.decode_without_bom_handling(bytes);
    Ok(text.into_owned())
}

fn walk<'a, 'm>(part: &'a ParsedMail<'m>, out: &mut Vec<&'a ParsedMail<'m>>) {
    out.push(part);
    for sub in &part.subparts {
        walk(sub, out);
    }
}

fn is_type(part: &ParsedMail<'_>, mimetype: &str) -> bool {
    part.ctype.mimetype.eq_ignore_ascii_case(mimetype)
}

/// Picks the body: first text/plain part, else first text/html part rendered
/// as text, else an error naming every content type seen.
fn extract_body(parsed: &ParsedMail<'_>) -> Result<String, AgentError> {
    let mut parts = Vec::new();
    walk(parsed, &mut parts);

    if let Some(part) = parts.iter().find(|p| is_type(p, "text/plain")) {
        return part_text(part);
    }

    if let Some(part) = parts.iter().find(|p| is_type(p, "text/html")) {
        let html = part_text(part)?;
        return html_to_text(&html);
    }

    let types: Vec<&str> = parts.iter().map(|p| p.ctype.mimetype.as_str()).collect();
    Err(AgentError::unsupported_content(types.join(", ")))
}

/// Undoes base64/quoted-printable transfer encoding, then applies the part's
/// declared charset. Undeclared text is read as UTF-8, not mailparse's
/// `us-ascii` default.
fn part_text(part: &ParsedMail<'_>) -> Result<String, AgentError> {
    let bytes = match part.get_body_encoded() {
        Body::Base64(body) | Body::QuotedPrintable(body) => body
            .get_decoded()
            .map_err(|e| AgentError::decode(format!("transfer encoding: {e}")))?,
        Body::SevenBit(body) | Body::EightBit(body) => body.get_raw().to_vec(),
        Body::Binary(body) => body.get_raw().to_vec(),
    };
    match part.ctype.params.get("charset") {
        Some(label) => decode_charset(label, &bytes),
        None => Ok(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

pub fn html_to_text(html: &str) -> Result<String, AgentError> {
    let text = html2text::from_read(html.as_bytes(), HTML_WIDTH)
        .map_err(|e| AgentError::decode(format!("html rendering: {e}")))?;
    Ok(text.trim().to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn crlf(s: &str) -> Vec<u8> {
        s.replace('\n', "\r\n").into_bytes()
    }

    #[test]
    fn decodes_plain_message_headers() {
        let raw = crlf(
            "From: =?UTF-8?B?SsO8cmdlbg==?= <j@example.com>\n\
             To: me@example.com\n\
             Subject: =?ISO-8859-1?Q?Caf=E9?= =?UTF-8?Q?_na=C3=AFve?=\n\
             Content-Type: text/plain; charset=utf-8\n\
             \n\
             See you there.\n",
        );
        let msg = decode_message(&raw).unwrap();
        assert_eq!(msg.from, "Jürgen <j@example.com>");
        assert_eq!(msg.to.as_deref(), Some("me@example.com"));
        assert_eq!(msg.subject, "Café naïve");
        assert_eq!(msg.content.trim(), "See you there.");
    }

    #[test]
    fn missing_to_is_none() {
        let raw = crlf("From: a@example.com\nSubject: hi\n\nbody\n");
        let msg = decode_message(&raw).unwrap();
        assert_eq!(msg.to, None);
        assert_eq!(msg.subject, "hi");
    }

    #[test]
    fn plain_words_around_encoded_words_are_kept() {
        let value = decode_header_value(b"Re: =?utf-8?q?caf=C3=A9?= tomorrow").unwrap();
        assert_eq!(value, "Re: café tomorrow");
    }

    #[test]
    fn unknown_header_charset_fails() {
        let err = decode_header_value(b"=?x-klingon?Q?abc?=").unwrap_err();
        assert!(matches!(err, AgentError::Decode(_)));
    }

    #[test]
    fn quoted_printable_body() {
        let raw = crlf(
            "From: a@example.com\n\
             Subject: qp\n\
             Content-Type: text/plain; charset=utf-8\n\
             Content-Transfer-Encoding: quoted-printable\n\
             \n\
             Caf=C3=A9 au=\n\
             =20lait\n",
        );
        let msg = decode_message(&raw).unwrap();
        assert_eq!(msg.content.trim(), "Café au lait");
    }

    #[test]
    fn base64_body_in_latin1() {
        // "Grüße" in ISO-8859-1
        let raw = crlf(
            "From: a@example.com\n\
             Subject: b64\n\
             Content-Type: text/plain; charset=iso-8859-1\n\
             Content-Transfer-Encoding: base64\n\
             \n\
             R3L832U=\n",
        );
        let msg = decode_message(&raw).unwrap();
        assert_eq!(msg.content, "Grüße");
    }

    #[test]
    fn eight_bit_body_without_charset_is_utf8() {
        let mut raw = crlf(
            "From: a@example.com\n\
             Subject: 8bit\n\
             Content-Type: text/plain\n\
             Content-Transfer-Encoding: 8bit\n\
             \n",
        );
        raw.extend_from_slice("Grüße aus Köln\r\n".as_bytes());
        let msg = decode_message(&raw).unwrap();
        assert_eq!(msg.content.trim(), "Grüße aus Köln");
    }

    #[test]
    fn base64_body_without_charset_is_utf8() {
        let raw = crlf(
            "From: a@example.com\n\
             Subject: b64\n\
             Content-Type: text/plain\n\
             Content-Transfer-Encoding: base64\n\
             \n\
             R3LDvMOfZQ==\n",
        );
        let msg = decode_message(&raw).unwrap();
        assert_eq!(msg.content, "Grüße");
    }

    #[test]
    fn prefers_plain_over_html() {
        let raw = crlf(
            "From: a@example.com\n\
             Subject: alt\n\
             MIME-Version: 1.0\n\
             Content-Type: multipart/alternative; boundary=\"xx\"\n\
             \n\
             --xx\n\
             Content-Type: text/html; charset=utf-8\n\
             \n\
             <p>html version</p>\n\
             --xx\n\
             Content-Type: text/plain; charset=utf-8\n\
             \n\
             plain version\n\
             --xx--\n",
        );
        let msg = decode_message(&raw).unwrap();
        assert_eq!(msg.content.trim(), "plain version");
    }

    #[test]
    fn html_only_body_becomes_text() {
        let raw = crlf(
            "From: a@example.com\n\
             Subject: html\n\
             Content-Type: text/html; charset=utf-8\n\
             \n\
             <html><body><h1>Agenda</h1><p>Meet at <b>noon</b>.</p><ul><li>coffee</li></ul></body></html>\n",
        );
        let msg = decode_message(&raw).unwrap();
        assert!(!msg.content.is_empty());
        assert!(msg.content.contains("Agenda"));
        assert!(msg.content.contains("noon"));
        assert!(msg.content.contains("coffee"));
        assert!(!msg.content.contains("<p>"));
        assert!(!msg.content.contains("</"));
    }

    #[test]
    fn no_text_part_names_content_types() {
        let raw = crlf(
            "From: a@example.com\n\
             Subject: pic\n\
             MIME-Version: 1.0\n\
             Content-Type: multipart/mixed; boundary=\"b1\"\n\
             \n\
             --b1\n\
             Content-Type: image/png\n\
             Content-Transfer-Encoding: base64\n\
             \n\
             iVBORw0KGgo=\n\
             --b1--\n",
        );
        let err = decode_message(&raw).unwrap_err();
        match err {
            AgentError::UnsupportedContent(types) => {
                assert_eq!(types, "multipart/mixed, image/png");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn gmail_raw_is_base64url() {
        let raw = "From: a@example.com\r\nSubject: ok\r\n\r\nhello\r\n";
        let encoded = URL_SAFE_NO_PAD.encode(raw);
        let msg = decode_gmail_raw(&encoded).unwrap();
        assert_eq!(msg.subject, "ok");
        assert_eq!(msg.content.trim(), "hello");

        assert!(matches!(
            decode_gmail_raw("not base64!").unwrap_err(),
            AgentError::Decode(_)
        ));
    }
}
