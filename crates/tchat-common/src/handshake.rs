//! Connection request parameters.
//!
//! A client presents its token either as `Authorization: Bearer <token>` on
//! the upgrade request or as a `token` query parameter (browsers cannot set
//! headers on WebSocket upgrades). The target room is the `room` query
//! parameter. Empty values are treated as absent.

use url::Url;

/// Query parameter carrying the requested room.
pub const ROOM_PARAM: &str = "room";
/// Query parameter carrying the token when no header is sent.
pub const TOKEN_PARAM: &str = "token";

/// What a connecting client presented.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    /// Presented session token, if any.
    pub token: Option<String>,
    /// Requested room id, if any.
    pub room: Option<String>,
}

impl Handshake {
    /// Build a handshake from literal parts.
    #[must_use]
    pub fn new(token: Option<&str>, room: Option<&str>) -> Self {
        Self {
            token: non_empty(token),
            room: non_empty(room),
        }
    }

    /// Extract the handshake from an upgrade request's query string and
    /// `Authorization` header value. The header wins over the query token.
    #[must_use]
    pub fn from_request_parts(query: Option<&str>, authorization: Option<&str>) -> Self {
        let mut query_token = None;
        let mut room = None;

        if let Some(query) = query {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                match key.as_ref() {
                    TOKEN_PARAM if query_token.is_none() => query_token = Some(value.into_owned()),
                    ROOM_PARAM if room.is_none() => room = Some(value.into_owned()),
                    _ => {}
                }
            }
        }

        let token = authorization
            .and_then(extract_bearer_token)
            .map(str::to_string)
            .or(query_token);

        Self::new(token.as_deref(), room.as_deref())
    }
}

/// Extract a bearer token from an `Authorization` header value.
///
/// Expects format: `Bearer <token>`
#[must_use]
pub fn extract_bearer_token(header_value: &str) -> Option<&str> {
    let token = header_value.trim().strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Build a client connection URL carrying `token` and `room` as query
/// parameters.
///
/// # Errors
///
/// Returns an error if `base` is not a valid URL.
pub fn client_url(
    base: &str,
    token: Option<&str>,
    room: Option<&str>,
) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base)?;
    if token.is_some() || room.is_some() {
        let mut pairs = url.query_pairs_mut();
        if let Some(token) = token {
            pairs.append_pair(TOKEN_PARAM, token);
        }
        if let Some(room) = room {
            pairs.append_pair(ROOM_PARAM, room);
        }
    }
    Ok(url.into())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_only() {
        let hs = Handshake::from_request_parts(Some("token=abc&room=R1"), None);
        assert_eq!(hs, Handshake::new(Some("abc"), Some("R1")));
    }

    #[test]
    fn header_wins_over_query_token() {
        let hs = Handshake::from_request_parts(Some("token=query&room=R1"), Some("Bearer header"));
        assert_eq!(hs.token.as_deref(), Some("header"));
        assert_eq!(hs.room.as_deref(), Some("R1"));
    }

    #[test]
    fn malformed_header_falls_back_to_query() {
        let hs = Handshake::from_request_parts(Some("token=query"), Some("Basic xyz"));
        assert_eq!(hs.token.as_deref(), Some("query"));
    }

    #[test]
    fn empty_values_are_absent() {
        let hs = Handshake::from_request_parts(Some("token=&room="), None);
        assert_eq!(hs, Handshake::default());
    }

    #[test]
    fn missing_query_is_empty_handshake() {
        assert_eq!(Handshake::from_request_parts(None, None), Handshake::default());
    }

    #[test]
    fn values_are_percent_decoded() {
        let hs = Handshake::from_request_parts(Some("room=team%20chat"), None);
        assert_eq!(hs.room.as_deref(), Some("team chat"));
    }

    #[test]
    fn first_occurrence_wins() {
        let hs = Handshake::from_request_parts(Some("room=a&room=b"), None);
        assert_eq!(hs.room.as_deref(), Some("a"));
    }

    #[test]
    fn extract_bearer() {
        assert_eq!(extract_bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer_token("Bearer  spaced "), Some("spaced"));
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token("Basic abc123"), None);
        assert_eq!(extract_bearer_token(""), None);
    }

    #[test]
    fn client_url_round_trips_through_parser() {
        let url = client_url("ws://127.0.0.1:3000/", Some("t k"), Some("R1")).unwrap();
        let query = url.split_once('?').map(|(_, q)| q);
        let hs = Handshake::from_request_parts(query, None);
        assert_eq!(hs, Handshake::new(Some("t k"), Some("R1")));
    }

    #[test]
    fn client_url_without_params_has_no_query() {
        let url = client_url("ws://127.0.0.1:3000/", None, None).unwrap();
        assert_eq!(url, "ws://127.0.0.1:3000/");
    }

    #[test]
    fn client_url_rejects_garbage() {
        assert!(client_url("not a url", None, None).is_err());
    }
}
