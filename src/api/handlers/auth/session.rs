//! Cookie transport contract for the session token pair.
//!
//! Both cookies are HttpOnly with `Max-Age` equal to the token TTL. When
//! the frontend origin is https the pair is sent cross-site
//! (`SameSite=None; Secure`), otherwise `SameSite=Lax` for local setups.
//! Refresh tokens are only ever read from the refresh cookie; access
//! tokens may also arrive as a bearer header for API callers.

use super::tokens::{TokenKeys, TokenPair};
use axum::http::{
    header::{AUTHORIZATION, COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use tracing::error;

pub const ACCESS_COOKIE_NAME: &str = "access_token";
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

fn build_cookie(name: &str, value: &str, max_age_seconds: i64, secure: bool) -> String {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; Max-Age={max_age_seconds}");
    if secure {
        cookie.push_str("; SameSite=None; Secure");
    } else {
        cookie.push_str("; SameSite=Lax");
    }
    cookie
}

#[must_use]
pub fn access_cookie(token: &str, max_age_seconds: i64, secure: bool) -> String {
    build_cookie(ACCESS_COOKIE_NAME, token, max_age_seconds, secure)
}

#[must_use]
pub fn refresh_cookie(token: &str, max_age_seconds: i64, secure: bool) -> String {
    build_cookie(REFRESH_COOKIE_NAME, token, max_age_seconds, secure)
}

#[must_use]
pub fn clear_cookie(name: &str, secure: bool) -> String {
    build_cookie(name, "", 0, secure)
}

/// Append `Set-Cookie` headers delivering a freshly minted pair.
pub fn apply_session_cookies(
    headers: &mut HeaderMap,
    pair: &TokenPair,
    keys: &TokenKeys,
    secure: bool,
) {
    append_cookie(
        headers,
        access_cookie(&pair.access, keys.access_ttl_seconds(), secure),
    );
    append_cookie(
        headers,
        refresh_cookie(&pair.refresh, keys.refresh_ttl_seconds(), secure),
    );
}

/// Append `Set-Cookie` headers expiring both session cookies.
pub fn apply_clear_cookies(headers: &mut HeaderMap, secure: bool) {
    append_cookie(headers, clear_cookie(ACCESS_COOKIE_NAME, secure));
    append_cookie(headers, clear_cookie(REFRESH_COOKIE_NAME, secure));
}

fn append_cookie(headers: &mut HeaderMap, cookie: String) {
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            headers.append(SET_COOKIE, value);
        }
        Err(err) => error!("Failed to encode session cookie: {err}"),
    }
}

/// Access tokens: bearer header first, then the access cookie.
#[must_use]
pub fn access_token_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }
    cookie_value(headers, ACCESS_COOKIE_NAME)
}

/// Refresh tokens: the refresh cookie is the only accepted channel.
#[must_use]
pub fn refresh_token_from_headers(headers: &HeaderMap) -> Option<String> {
    cookie_value(headers, REFRESH_COOKIE_NAME)
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let mut parts = pair.trim().splitn(2, '=');
        let key = parts.next()?;
        let value = parts.next()?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_pair_is_cross_site() {
        let cookie = access_cookie("tok", 900, true);
        assert_eq!(
            cookie,
            "access_token=tok; Path=/; HttpOnly; Max-Age=900; SameSite=None; Secure"
        );
    }

    #[test]
    fn insecure_pair_stays_lax() {
        let cookie = refresh_cookie("tok", 604_800, false);
        assert_eq!(
            cookie,
            "refresh_token=tok; Path=/; HttpOnly; Max-Age=604800; SameSite=Lax"
        );
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_cookie(ACCESS_COOKIE_NAME, false);
        assert!(cookie.starts_with("access_token=; "));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        headers.insert(
            COOKIE,
            HeaderValue::from_static("access_token=from-cookie; refresh_token=r1"),
        );
        assert_eq!(
            access_token_from_headers(&headers),
            Some("from-header".to_string())
        );
    }

    #[test]
    fn access_falls_back_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; access_token=abc; refresh_token=def"),
        );
        assert_eq!(access_token_from_headers(&headers), Some("abc".to_string()));
    }

    #[test]
    fn refresh_ignores_the_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
        assert_eq!(refresh_token_from_headers(&headers), None);

        headers.insert(COOKIE, HeaderValue::from_static("refresh_token=yes"));
        assert_eq!(refresh_token_from_headers(&headers), Some("yes".to_string()));
    }

    #[test]
    fn empty_cookie_values_read_as_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("access_token="));
        assert_eq!(access_token_from_headers(&headers), None);
    }

    #[test]
    fn session_cookies_append_both_headers() {
        let keys = TokenKeys::new(
            secrecy::SecretString::from("a"),
            secrecy::SecretString::from("r"),
        );
        let pair = TokenPair {
            access: "acc".to_string(),
            refresh: "ref".to_string(),
        };
        let mut headers = HeaderMap::new();
        apply_session_cookies(&mut headers, &pair, &keys, false);
        let cookies: Vec<_> = headers.get_all(SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].to_str().unwrap().starts_with("access_token=acc"));
        assert!(cookies[1].to_str().unwrap().starts_with("refresh_token=ref"));
    }
}
