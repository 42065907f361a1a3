//! Extraction of contest data from forum pages, the contests feed and the anti-bot script

use crate::error::{ContestError, Result};
use crate::site::{CaptchaChallenge, SubmitOutcome};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ContestError::ParseError(format!("bad selector {}: {}", css, e)))
}

fn regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| ContestError::ParseError(e.to_string()))
}

fn input_value(document: &Html, name: &str) -> Result<Option<String>> {
    let selector = selector(&format!("input[name='{}']", name))?;
    Ok(document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("value"))
        .map(|v| v.to_string()))
}

/// Extract the click captcha and form tokens from a contest thread page
pub fn extract_challenge(html: &str) -> Result<CaptchaChallenge> {
    let document = Html::parse_document(html);

    let csrf_token = input_value(&document, "_xfToken")?
        .ok_or_else(|| ContestError::CaptchaNotFound("csrf token not found".to_string()))?;

    let captcha_hash = input_value(&document, "captcha_hash")?
        .ok_or_else(|| ContestError::CaptchaNotFound("captcha hash not found".to_string()))?;

    let script_selector = selector("div.captchaBlock script")?;
    let click_captcha = regex(r#"(?s)dotSize\s*=\s*(\d+);.*?imgData\s*=\s*"(.+?)";"#)?;

    for script in document.select(&script_selector) {
        let text: String = script.text().collect();
        if let Some(caps) = click_captcha.captures(&text) {
            let grid_size = caps[1]
                .parse::<u32>()
                .map_err(|e| ContestError::ParseError(format!("bad dotSize: {}", e)))?;
            return Ok(CaptchaChallenge {
                csrf_token,
                captcha_hash,
                image: caps[2].to_string(),
                grid_size,
            });
        }
    }

    Err(ContestError::CaptchaNotFound(
        "captcha image not found".to_string(),
    ))
}

/// Links of every `<item>` in an RSS channel
pub fn extract_feed_links(xml: &str) -> Result<Vec<String>> {
    if !xml.contains("<channel") {
        return Err(ContestError::ParseError(
            "contests feed has no channel".to_string(),
        ));
    }

    let item = regex(r"(?s)<item\b[^>]*>(.*?)</item>")?;
    let link = regex(r"(?s)<link>\s*(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?\s*</link>")?;

    let links: Vec<String> = item
        .captures_iter(xml)
        .filter_map(|item| link.captures(&item[1]).map(|caps| caps[1].trim().to_string()))
        .filter(|href| !href.is_empty())
        .map(|href| href.replace("&amp;", "&"))
        .collect();

    debug!("Extracted {} links from contests feed", links.len());
    Ok(links)
}

/// Source of the first external script on the anti-bot challenge page
pub fn extract_script_src(html: &str) -> Result<Option<String>> {
    let document = Html::parse_document(html);
    let selector = selector("script[src]")?;
    Ok(document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("src"))
        .map(|s| s.to_string()))
}

/// Decode the identity cookie value hidden in the obfuscated challenge script.
///
/// The script holds a `_0x....=['...','...'];` array of base64 strings, some
/// split with `'+'`; the last entry decoding to an md5 hex digest wins.
pub fn extract_identity_value(script: &str) -> Result<String> {
    let array = regex(r" _0x\w+=\['(.+?)'\];")?;
    let caps = array.captures(script).ok_or_else(|| {
        ContestError::IdentityRenewal("array with identity value not found".to_string())
    })?;

    let joined = caps[1].replace("'+'", "");
    let value = joined
        .split("','")
        .filter_map(|encoded| STANDARD.decode(encoded).ok())
        .filter_map(|bytes| String::from_utf8(bytes).ok())
        .filter(|decoded| is_md5(decoded))
        .last();

    value.ok_or_else(|| ContestError::IdentityRenewal("identity value not found".to_string()))
}

/// Interpret the JSON answer of the participate endpoint.
///
/// Any present, non-null `error` is a rejection; only an error-free body
/// counts as joined.
pub fn parse_submit_response(body: &Value) -> SubmitOutcome {
    match body.get("error") {
        None | Some(Value::Null) => SubmitOutcome::Joined,
        Some(error) => SubmitOutcome::Rejected {
            message: error_message(error)
                .unwrap_or_else(|| "participation rejected without a message".to_string()),
        },
    }
}

/// First human readable message in a string, array or object error
fn error_message(error: &Value) -> Option<String> {
    match error {
        Value::String(message) => Some(message.clone()),
        Value::Array(items) => items.iter().find_map(error_message),
        Value::Object(fields) => fields.values().find_map(error_message),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

pub fn is_md5(value: &str) -> bool {
    value.len() == 32 && value.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::site::CAPTCHA_FAILED_MESSAGE;

    const THREAD_PAGE: &str = r#"
        <html><body>
          <form action="threads/4242/participate" method="post">
            <input type="hidden" name="_xfToken" value="1700000000,abcdef0123" />
            <input type="hidden" name="captcha_hash" value="c0ffee" />
            <div class="captchaBlock">
              <div class="ClickCaptcha"></div>
              <script type="text/javascript">
                var dotSize = 20;
                var someOther = 1;
                var imgData = "iVBORw0KGgoAAAANSUhEUg==";
              </script>
            </div>
          </form>
        </body></html>
    "#;

    #[test]
    fn extracts_challenge() {
        let challenge = extract_challenge(THREAD_PAGE).unwrap();
        assert_eq!(challenge.csrf_token, "1700000000,abcdef0123");
        assert_eq!(challenge.captcha_hash, "c0ffee");
        assert_eq!(challenge.image, "iVBORw0KGgoAAAANSUhEUg==");
        assert_eq!(challenge.grid_size, 20);
    }

    #[test]
    fn missing_captcha_hash_is_not_found() {
        let page = THREAD_PAGE.replace("captcha_hash", "something_else");
        assert!(matches!(
            extract_challenge(&page),
            Err(ContestError::CaptchaNotFound(_))
        ));
    }

    #[test]
    fn missing_token_is_not_found() {
        let page = "<html><body><p>Contest finished</p></body></html>";
        assert!(matches!(
            extract_challenge(page),
            Err(ContestError::CaptchaNotFound(_))
        ));
    }

    #[test]
    fn missing_image_is_not_found() {
        let page = THREAD_PAGE.replace("imgData", "sliderData");
        assert!(matches!(
            extract_challenge(&page),
            Err(ContestError::CaptchaNotFound(_))
        ));
    }

    #[test]
    fn extracts_feed_links() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
            <rss version="2.0">
              <channel>
                <title>Contests</title>
                <link>https://lolz.guru/forums/contests/</link>
                <item>
                  <title>Giveaway 1</title>
                  <link>https://lolz.guru/threads/1001/</link>
                </item>
                <item>
                  <title>Giveaway 2</title>
                  <link><![CDATA[https://lolz.guru/threads/1002/?a=1&amp;b=2]]></link>
                </item>
              </channel>
            </rss>"#;

        let links = extract_feed_links(xml).unwrap();
        assert_eq!(
            links,
            vec![
                "https://lolz.guru/threads/1001/".to_string(),
                "https://lolz.guru/threads/1002/?a=1&b=2".to_string(),
            ]
        );
    }

    #[test]
    fn empty_channel_has_no_links() {
        let xml = "<rss><channel><title>Contests</title></channel></rss>";
        assert!(extract_feed_links(xml).unwrap().is_empty());
    }

    #[test]
    fn non_feed_is_parse_error() {
        assert!(matches!(
            extract_feed_links("<html>maintenance</html>"),
            Err(ContestError::ParseError(_))
        ));
    }

    #[test]
    fn finds_script_src() {
        let html = r#"<html><head><script src="/process-qv9ypsgmv9.js"></script></head></html>"#;
        assert_eq!(
            extract_script_src(html).unwrap().as_deref(),
            Some("/process-qv9ypsgmv9.js")
        );
        assert_eq!(extract_script_src("<html></html>").unwrap(), None);
    }

    #[test]
    fn decodes_identity_value() {
        let md5 = "0123456789abcdef0123456789abcdef";
        let encoded = STANDARD.encode(md5);
        let (head, tail) = encoded.split_at(10);
        let script = format!(
            "var _0x1a2b=['{}','{}'+'{}','{}'];function f(){{}}",
            STANDARD.encode("cookie"),
            head,
            tail,
            STANDARD.encode("path=/")
        );
        assert_eq!(extract_identity_value(&script).unwrap(), md5);
    }

    #[test]
    fn identity_without_md5_fails() {
        let script = format!(" _0xdead=['{}'];", STANDARD.encode("nothing here"));
        assert!(matches!(
            extract_identity_value(&script),
            Err(ContestError::IdentityRenewal(_))
        ));
        assert!(matches!(
            extract_identity_value("console.log(1)"),
            Err(ContestError::IdentityRenewal(_))
        ));
    }

    #[test]
    fn submit_response_outcomes() {
        assert_eq!(
            parse_submit_response(&json!({"_redirectStatus": "ok", "message": "Done"})),
            SubmitOutcome::Joined
        );
        assert_eq!(
            parse_submit_response(&json!({"error": ["Closed"]})),
            SubmitOutcome::Rejected {
                message: "Closed".to_string()
            }
        );
        assert_eq!(
            parse_submit_response(&json!({"error": null, "message": "Done"})),
            SubmitOutcome::Joined
        );
    }

    #[test]
    fn any_error_field_is_a_rejection() {
        assert_eq!(
            parse_submit_response(&json!({"error": []})),
            SubmitOutcome::Rejected {
                message: "participation rejected without a message".to_string()
            }
        );

        let wrong_captcha = parse_submit_response(&json!({
            "error": {"captcha": CAPTCHA_FAILED_MESSAGE}
        }));
        assert!(wrong_captcha.is_captcha_failure());

        assert_eq!(
            parse_submit_response(&json!({"error": [{"message": "closed"}]})),
            SubmitOutcome::Rejected {
                message: "closed".to_string()
            }
        );
        assert_eq!(
            parse_submit_response(&json!({"error": 403})),
            SubmitOutcome::Rejected {
                message: "403".to_string()
            }
        );
    }

    #[test]
    fn md5_detection() {
        assert!(is_md5("d41d8cd98f00b204e9800998ecf8427e"));
        assert!(!is_md5("d41d8cd98f00b204e9800998ecf8427"));
        assert!(!is_md5("z41d8cd98f00b204e9800998ecf8427e"));
    }
}
