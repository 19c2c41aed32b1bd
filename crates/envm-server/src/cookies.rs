//! Session cookies.
//!
//! Login and refresh set two HttpOnly cookies: `auth_token` carries the
//! access token and `refresh_token` the opaque refresh token. Logout
//! removes both.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Duration;

pub const ACCESS_COOKIE: &str = "auth_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

fn session_cookie(name: &'static str, value: String, ttl: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::seconds(ttl.num_seconds()))
        .build()
}

/// Add both session cookies to `jar`.
#[must_use]
pub fn with_session(
    jar: CookieJar,
    access_token: &str,
    access_ttl: Duration,
    refresh_token: &str,
    refresh_ttl: Duration,
    secure: bool,
) -> CookieJar {
    jar.add(session_cookie(ACCESS_COOKIE, access_token.to_owned(), access_ttl, secure))
        .add(session_cookie(REFRESH_COOKIE, refresh_token.to_owned(), refresh_ttl, secure))
}

fn expired(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, "")).path("/").http_only(true).build();
    cookie.make_removal();
    cookie
}

/// Expire both session cookies, whether or not the request carried them.
#[must_use]
pub fn without_session(jar: CookieJar) -> CookieJar {
    jar.add(expired(ACCESS_COOKIE)).add(expired(REFRESH_COOKIE))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn session_cookies_are_http_only_and_lax() {
        let jar = with_session(
            CookieJar::new(),
            "access",
            Duration::minutes(15),
            "refresh",
            Duration::days(7),
            false,
        );

        let access = jar.get(ACCESS_COOKIE).unwrap();
        assert_eq!(access.value(), "access");
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.same_site(), Some(SameSite::Lax));
        assert_eq!(access.max_age(), Some(time::Duration::minutes(15)));
        assert_ne!(access.secure(), Some(true));

        assert!(jar.get(REFRESH_COOKIE).is_some_and(|c| c.max_age() == Some(time::Duration::days(7))));
    }

    #[test]
    fn production_cookies_are_secure() {
        let jar = with_session(
            CookieJar::new(),
            "a",
            Duration::minutes(15),
            "r",
            Duration::days(7),
            true,
        );
        assert!(jar.iter().all(|c| c.secure() == Some(true)));
    }

    #[test]
    fn logout_expires_both_cookies() {
        let jar = without_session(CookieJar::new());
        for name in [ACCESS_COOKIE, REFRESH_COOKIE] {
            let cookie = jar.get(name).unwrap();
            assert_eq!(cookie.value(), "");
            assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
        }
    }
}
