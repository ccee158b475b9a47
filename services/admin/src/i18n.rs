//! Language negotiation and the message table

use std::collections::HashMap;

use axum::{
    extract::Query,
    http::{HeaderMap, Uri, header::ACCEPT_LANGUAGE},
};

/// Percent-decoded value of one query parameter
pub fn query_param(uri: &Uri, key: &str) -> Option<String> {
    let Query(mut params) = Query::<HashMap<String, String>>::try_from_uri(uri).ok()?;
    params.remove(key)
}

/// Negotiated response language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    #[default]
    Zh,
    En,
}

impl Lang {
    /// Match a language tag by its primary subtag
    pub fn parse(tag: &str) -> Option<Lang> {
        let primary = tag.trim().split(['-', '_']).next()?.to_ascii_lowercase();
        match primary.as_str() {
            "zh" => Some(Lang::Zh),
            "en" => Some(Lang::En),
            _ => None,
        }
    }

    /// `?lang=` wins over `Accept-Language`; anything unrecognized falls
    /// back to the default
    pub fn negotiate(uri: &Uri, headers: &HeaderMap) -> Lang {
        let from_query = query_param(uri, "lang").and_then(|value| Lang::parse(&value));

        from_query
            .or_else(|| {
                headers
                    .get(ACCEPT_LANGUAGE)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| {
                        value
                            .split(',')
                            .filter_map(|entry| entry.split(';').next())
                            .find_map(Lang::parse)
                    })
            })
            .unwrap_or_default()
    }

    /// Sentinel username for audit rows of anonymous requests
    pub fn not_logged_in(self) -> &'static str {
        self.pick("未登录", "not logged in")
    }

    pub(crate) fn pick(self, zh: &'static str, en: &'static str) -> &'static str {
        match self {
            Lang::Zh => zh,
            Lang::En => en,
        }
    }
}

/// Translate a validation rule key
pub fn rule_text(rule: &str, lang: Lang) -> String {
    let text = match rule {
        "required" => lang.pick("不能为空", "is required"),
        "length" => lang.pick("长度不合法", "has an invalid length"),
        "alphanumeric" => lang.pick("只能包含字母和数字", "must contain only letters and digits"),
        "keyword" => lang.pick(
            "只能包含字母、数字和下划线",
            "must contain only letters, digits and underscores",
        ),
        "min_length" => lang.pick("长度不足", "is too short"),
        "range" => lang.pick("超出允许范围", "is out of range"),
        "one_of" => lang.pick("取值不合法", "is not an allowed value"),
        "path" => lang.pick("必须以 / 开头", "must start with /"),
        "mismatch" => lang.pick("不正确", "is incorrect"),
        "format" => lang.pick("格式不正确", "is malformed"),
        "content_type" => lang.pick("必须是 JSON", "must be JSON"),
        other => return other.to_string(),
    };
    text.to_string()
}
