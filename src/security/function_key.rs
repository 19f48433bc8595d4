use axum::extract::Query;
use axum::http::{HeaderMap, Uri};
use serde::Deserialize;
use subtle::ConstantTimeEq;

pub const FUNCTION_KEY_HEADER: &str = "x-functions-key";

#[derive(Debug, Deserialize)]
struct KeyQuery {
    code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum KeyRejection {
    #[error("missing function key")]
    Missing,
    #[error("invalid function key")]
    Invalid,
}

/// Key presented by the caller: the `x-functions-key` header, else the `code` query parameter.
pub fn presented_key(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    if let Some(value) = headers.get(FUNCTION_KEY_HEADER) {
        if let Ok(s) = value.to_str() {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    Query::<KeyQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(q)| q.code)
        .filter(|c| !c.is_empty())
}

pub fn verify(expected: &str, presented: Option<&str>) -> Result<(), KeyRejection> {
    let presented = presented.ok_or(KeyRejection::Missing)?;
    if presented.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() == 1 {
        Ok(())
    } else {
        Err(KeyRejection::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(FUNCTION_KEY_HEADER, HeaderValue::from_static("from-header"));
        let uri: Uri = "/api/fa_adtest_frontend_trigger?code=from-query".parse().unwrap();
        assert_eq!(presented_key(&headers, &uri).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_code_query_parameter() {
        let uri: Uri = "/api/fa_adtest_frontend_trigger?name=x&code=abc%3D%3D".parse().unwrap();
        assert_eq!(presented_key(&HeaderMap::new(), &uri).as_deref(), Some("abc=="));

        let bare: Uri = "/api/fa_adtest_frontend_trigger".parse().unwrap();
        assert_eq!(presented_key(&HeaderMap::new(), &bare), None);
    }

    #[test]
    fn test_verify() {
        assert_eq!(verify("k1", Some("k1")), Ok(()));
        assert_eq!(verify("k1", Some("k2")), Err(KeyRejection::Invalid));
        assert_eq!(verify("k1", Some("k1-longer")), Err(KeyRejection::Invalid));
        assert_eq!(verify("k1", None), Err(KeyRejection::Missing));
    }
}
