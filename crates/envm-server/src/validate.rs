//! JSON body extractor that runs `validator` rules before the handler.

use axum::Json;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

use crate::error::AppError;

/// Like [`Json`], but rejects bodies that fail [`Validate::validate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        value
            .validate()
            .map_err(|e| AppError::BadRequest(describe(&e)))?;

        Ok(Self(value))
    }
}

/// Flatten field errors into `field: message` pairs, sorted by field.
fn describe(errors: &ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let detail = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map_or_else(|| e.code.to_string(), ToString::to_string)
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("{field}: {detail}")
        })
        .collect();
    parts.sort();
    parts.join("; ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;
    use axum::http::header::CONTENT_TYPE;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, Validate)]
    struct Signup {
        #[validate(email(message = "must be a valid email"))]
        email: String,
        #[validate(length(min = 8, message = "must be at least 8 characters"))]
        password: String,
    }

    fn request(body: &str) -> Request {
        Request::builder()
            .method("POST")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn valid_body_passes() {
        let ValidatedJson(signup) = ValidatedJson::<Signup>::from_request(
            request(r#"{"email":"a@example.com","password":"long enough"}"#),
            &(),
        )
        .await
        .unwrap();
        assert_eq!(signup.email, "a@example.com");
    }

    #[tokio::test]
    async fn rule_violations_are_listed() {
        let err = ValidatedJson::<Signup>::from_request(
            request(r#"{"email":"nope","password":"short"}"#),
            &(),
        )
        .await
        .unwrap_err();
        let AppError::BadRequest(message) = err else {
            unreachable!("expected a bad request");
        };
        assert_eq!(
            message,
            "email: must be a valid email; password: must be at least 8 characters"
        );
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let err = ValidatedJson::<Signup>::from_request(request("{"), &())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
