//! Page scraping used by the HTTP gateway.
//!
//! Kept behind a trait so a game version with different markup only needs a
//! new extractor.

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

pub trait PageExtractor: Send + Sync {
    /// Named `<input>` fields of the form with `form_id`, in page order.
    /// Submit buttons are left out.
    fn form_inputs(&self, html: &str, form_id: &str) -> Vec<(String, String)>;

    /// Travel time quoted on an order confirmation page.
    fn duration(&self, html: &str) -> Option<Duration>;

    /// Text of an error box, if the page shows one.
    fn error_box(&self, html: &str) -> Option<String>;

    fn csrf_token(&self, html: &str) -> Option<String>;

    /// The `h` token carried in links and scripts.
    fn freshness_token(&self, text: &str) -> Option<String>;
}

static FORM_RE: OnceLock<Regex> = OnceLock::new();
static INPUT_RE: OnceLock<Regex> = OnceLock::new();
static ATTR_RE: OnceLock<Regex> = OnceLock::new();
static DURATION_RE: OnceLock<Regex> = OnceLock::new();
static ERROR_BOX_RE: OnceLock<Regex> = OnceLock::new();
static TAG_RE: OnceLock<Regex> = OnceLock::new();
static CSRF_RE: OnceLock<Regex> = OnceLock::new();
static H_RE: OnceLock<Regex> = OnceLock::new();

fn form_re() -> &'static Regex {
    FORM_RE.get_or_init(|| Regex::new(r#"(?is)<form\b([^>]*)>(.*?)</form>"#).unwrap())
}

fn input_re() -> &'static Regex {
    INPUT_RE.get_or_init(|| Regex::new(r#"(?is)<input\b([^>]*)>"#).unwrap())
}

fn attr_re() -> &'static Regex {
    ATTR_RE.get_or_init(|| Regex::new(r#"([\w-]+)\s*=\s*"([^"]*)""#).unwrap())
}

fn duration_re() -> &'static Regex {
    DURATION_RE.get_or_init(|| Regex::new(r#"data-duration="(\d+)""#).unwrap())
}

fn error_box_re() -> &'static Regex {
    ERROR_BOX_RE.get_or_init(|| Regex::new(r#"(?is)<div class="error_box"[^>]*>(.*?)</div>"#).unwrap())
}

fn tag_re() -> &'static Regex {
    TAG_RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

fn csrf_re() -> &'static Regex {
    CSRF_RE.get_or_init(|| Regex::new(r#"<meta content="(.+?)" name="csrf-token""#).unwrap())
}

fn h_re() -> &'static Regex {
    H_RE.get_or_init(|| Regex::new(r"&h=(\w+)").unwrap())
}

fn attrs(tag: &str) -> Vec<(String, String)> {
    attr_re()
        .captures_iter(tag)
        .map(|c| (c[1].to_ascii_lowercase(), c[2].to_string()))
        .collect()
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Regex-based scraping of the stock game markup.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexExtractor;

impl PageExtractor for RegexExtractor {
    fn form_inputs(&self, html: &str, form_id: &str) -> Vec<(String, String)> {
        let Some(body) = form_re().captures_iter(html).find_map(|c| {
            let form_attrs = attrs(&c[1]);
            (attr(&form_attrs, "id") == Some(form_id)).then(|| c[2].to_string())
        }) else {
            return Vec::new();
        };

        input_re()
            .captures_iter(&body)
            .filter_map(|c| {
                let a = attrs(&c[1]);
                if attr(&a, "type").is_some_and(|t| t.eq_ignore_ascii_case("submit")) {
                    return None;
                }
                let name = attr(&a, "name")?.to_string();
                let value = attr(&a, "value").unwrap_or_default().to_string();
                Some((name, value))
            })
            .collect()
    }

    fn duration(&self, html: &str) -> Option<Duration> {
        duration_re()
            .captures(html)
            .and_then(|c| c[1].parse().ok())
            .map(Duration::from_secs)
    }

    fn error_box(&self, html: &str) -> Option<String> {
        error_box_re().captures(html).map(|c| {
            let text = tag_re().replace_all(&c[1], " ");
            text.split_whitespace().collect::<Vec<_>>().join(" ")
        })
    }

    fn csrf_token(&self, html: &str) -> Option<String> {
        csrf_re().captures(html).map(|c| c[1].to_string())
    }

    fn freshness_token(&self, text: &str) -> Option<String> {
        h_re().captures(text).map(|c| c[1].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLACE: &str = r#"
        <form id="quickbar"><input name="nope" value="x"></form>
        <form id="command-data-form" action="/game.php?village=101&amp;screen=place&amp;try=confirm" method="post">
          <input type="hidden" name="a1b2c3" value="d4e5f6" />
          <input id="unit_input_axe" name="axe" type="text" value="" />
          <input name="x" value="" />
          <input type="submit" name="attack" value="Attack" />
        </form>"#;

    #[test]
    fn reads_inputs_of_the_named_form_only() {
        let fields = RegexExtractor.form_inputs(PLACE, "command-data-form");
        assert_eq!(
            fields,
            vec![
                ("a1b2c3".to_string(), "d4e5f6".to_string()),
                ("axe".to_string(), String::new()),
                ("x".to_string(), String::new()),
            ]
        );
        assert!(RegexExtractor.form_inputs(PLACE, "missing").is_empty());
    }

    #[test]
    fn reads_duration_and_tokens() {
        let html = r#"<meta content="tok123" name="csrf-token" />
            <span class="relative_time" data-duration="4215">1:10:15</span>
            <a href="/game.php?village=1&screen=main&h=9fa3c1">x</a>"#;
        assert_eq!(RegexExtractor.duration(html), Some(Duration::from_secs(4215)));
        assert_eq!(RegexExtractor.csrf_token(html).as_deref(), Some("tok123"));
        assert_eq!(RegexExtractor.freshness_token(html).as_deref(), Some("9fa3c1"));
        assert_eq!(RegexExtractor.duration("<p>no</p>"), None);
    }

    #[test]
    fn error_box_text_is_flattened() {
        let html = r#"<div class="error_box">
            <div class="content"><b>Not enough</b> units</div></div>"#;
        assert_eq!(
            RegexExtractor.error_box(html).as_deref(),
            Some("Not enough units")
        );
        assert_eq!(RegexExtractor.error_box("<div>ok</div>"), None);
    }
}
