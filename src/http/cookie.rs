//! `Cookie` request parsing and `Set-Cookie` response building.

use std::fmt;

use super::Headers;

/// Returns the value of cookie `name` from every `Cookie` header in `headers`.
pub fn find<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .get_all("cookie")
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"'))
}

/// A `Set-Cookie` header value.
///
/// # Examples
///
/// ```
/// use wellbeing_chat::http::SetCookie;
///
/// let cookie = SetCookie::new("chat_session", "abc").http_only().same_site_lax();
/// assert_eq!(cookie.to_string(), "chat_session=abc; Path=/; HttpOnly; SameSite=Lax");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    name: String,
    value: String,
    path: String,
    http_only: bool,
    same_site_lax: bool,
}

impl SetCookie {
    /// Creates a cookie scoped to `Path=/`.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: "/".to_owned(),
            http_only: false,
            same_site_lax: false,
        }
    }

    #[must_use]
    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    #[must_use]
    pub fn same_site_lax(mut self) -> Self {
        self.same_site_lax = true;
        self
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}; Path={}", self.name, self.value, self.path)?;
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.same_site_lax {
            f.write_str("; SameSite=Lax")?;
        }
        Ok(())
    }
}
