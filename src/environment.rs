//! Rendering Environment
//!
//! Flat mapping of named values consumed by filename templates, and the expansion step
//! that derives naming fields (hostname, base, name, ext) from an image URL.

use crate::error::ApiError;
use chrono::{DateTime, Local, TimeZone};
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

pub const KEY_URL: &str = "url";
pub const KEY_HOSTNAME: &str = "hostname";
pub const KEY_PAGE_URL: &str = "pageUrl";
pub const KEY_PAGE_TITLE: &str = "pageTitle";
pub const KEY_PAGE_HOSTNAME: &str = "pageHostname";
pub const KEY_PAGE_CONTENT_TYPE: &str = "pageContentType";
pub const KEY_DATE: &str = "date";
pub const KEY_DATE_STRING: &str = "dateString";
pub const KEY_INDEX: &str = "index";
pub const KEY_BASE: &str = "base";
pub const KEY_NAME: &str = "name";
pub const KEY_EXT: &str = "ext";

/// Named values available to template rendering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment {
    values: BTreeMap<String, Value>,
}

/// Fallbacks used when an image URL does not carry a usable filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingDefaults {
    pub default_name: String,
    pub default_ext: String,
}

impl Default for NamingDefaults {
    fn default() -> Self {
        Self {
            default_name: "unnamed".to_string(),
            default_ext: ".jpg".to_string(),
        }
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String value of `key`, `None` when absent or not a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Copy every value of `other` over this environment
    pub fn overlay(&mut self, other: &Environment) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Clone with `other` laid over the copy
    pub fn overlaid(&self, other: Option<&Environment>) -> Environment {
        let mut env = self.clone();
        if let Some(other) = other {
            env.overlay(other);
        }
        env
    }

    /// Record the moment a download was requested
    pub fn stamp_date<Tz: TimeZone>(&mut self, now: &DateTime<Tz>)
    where
        Tz::Offset: std::fmt::Display,
    {
        self.set(KEY_DATE, now.to_rfc3339());
        self.set(KEY_DATE_STRING, date_string(now));
    }

    pub fn stamp_now(&mut self) {
        self.stamp_date(&Local::now());
    }

    /// Derive naming fields from `url`, `base` and `pageUrl`.
    ///
    /// Fills `hostname`, `base`, `name`, `ext` and `pageHostname`. The image URL must
    /// parse; a missing or malformed page URL leaves `pageHostname` empty.
    pub fn expand(&mut self, defaults: &NamingDefaults) -> Result<(), ApiError> {
        let raw_url = self.get_str(KEY_URL).unwrap_or_default().to_string();
        let url = Url::parse(&raw_url).map_err(|e| ApiError::InvalidUrl {
            url: raw_url.clone(),
            message: e.to_string(),
        })?;
        self.set(KEY_HOSTNAME, url.host_str().unwrap_or_default());

        let base = match self.get_str(KEY_BASE) {
            Some(base) if !base.is_empty() => base.to_string(),
            _ => last_segment(url.as_str()).unwrap_or_else(|| defaults.default_name.clone()),
        };
        let (name, ext) = split_extension(&base)
            .unwrap_or_else(|| (base.clone(), defaults.default_ext.clone()));

        self.set(KEY_BASE, nested_decode(&base));
        self.set(KEY_NAME, nested_decode(&name));
        self.set(KEY_EXT, nested_decode(&ext));

        let page_hostname = self
            .get_str(KEY_PAGE_URL)
            .and_then(|page| Url::parse(page).ok())
            .and_then(|page| page.host_str().map(str::to_string));
        if page_hostname.is_none() {
            debug!(url = %raw_url, "Environment has no usable page URL");
        }
        self.set(KEY_PAGE_HOSTNAME, page_hostname.unwrap_or_default());
        Ok(())
    }
}

impl FromIterator<(String, Value)> for Environment {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// `YYYY-MM-DD HH MM SS`, safe for use in a filename
pub fn date_string<Tz: TimeZone>(date: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    date.format("%Y-%m-%d %H %M %S").to_string()
}

/// Text form of an environment value as inserted into a filename
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) => number_to_text(f),
            None => n.to_string(),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numbers print without a trailing `.0` when integral
pub fn number_to_text(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

/// Percent-decode repeatedly until no escape sequence remains or decoding fails
pub fn nested_decode(input: &str) -> String {
    let mut current = input.to_string();
    while escape_pattern().is_match(&current) {
        match percent_decode_str(&current).decode_utf8() {
            Ok(decoded) if decoded != current => current = decoded.into_owned(),
            _ => break,
        }
    }
    current
}

fn last_segment(href: &str) -> Option<String> {
    static SEGMENT: OnceLock<Regex> = OnceLock::new();
    let re = SEGMENT.get_or_init(|| Regex::new(r"([^/]+)/?$").expect("valid segment regex"));
    re.captures(href).map(|c| c[1].to_string())
}

fn split_extension(base: &str) -> Option<(String, String)> {
    static EXTENSION: OnceLock<Regex> = OnceLock::new();
    let re = EXTENSION.get_or_init(|| {
        Regex::new(r"(?i)^(.+)(\.(?:jpg|png|gif|jpeg|svg))\b").expect("valid extension regex")
    });
    re.captures(base)
        .map(|c| (c[1].to_string(), c[2].to_string()))
}

fn escape_pattern() -> &'static Regex {
    static ESCAPE: OnceLock<Regex> = OnceLock::new();
    ESCAPE.get_or_init(|| Regex::new(r"(?i)%[0-9a-f]{2}").expect("valid escape regex"))
}
