//! `user:create`: validates and returns a new user record.
//!
//! Nothing is persisted.

use async_trait::async_trait;
use gate_core::{Action, ActionHandler, Connection, GateError, HttpMethod, InputField, Params};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

/// Fields accepted by `user:create`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    /// Display name.
    pub name: String,
    /// Contact address.
    pub email: String,
    /// Age in years.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
}

/// Creates a user.
pub struct CreateUserAction;

#[async_trait]
impl ActionHandler for CreateUserAction {
    async fn run(&self, _conn: &Connection, params: Params) -> Result<Value, GateError> {
        let user: NewUser = serde_json::from_value(Value::Object(params)).map_err(|e| GateError::ParamInvalid {
            key: "user".into(),
            message: e.to_string(),
        })?;
        if !user.email.contains('@') {
            return Err(GateError::ParamInvalid {
                key: "email".into(),
                message: "must be an email address".into(),
            });
        }
        if user.age.is_some_and(|age| age < 0) {
            return Err(GateError::ParamInvalid {
                key: "age".into(),
                message: "must not be negative".into(),
            });
        }
        debug!(name = %user.name, "user created");
        Ok(json!({ "created": true, "user": user }))
    }
}

/// The `user:create` action, `POST /users`.
pub fn action() -> Action {
    Action::new("user:create", CreateUserAction)
        .describe("Creates a new user")
        .input(InputField::string("name").required().describe("Display name"))
        .input(InputField::string("email").required().describe("Contact address"))
        .input(InputField::integer("age").describe("Age in years"))
        .web(HttpMethod::Post, "/users")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use gate_core::TransportKind;

    fn params(v: Value) -> Params {
        serde_json::from_value(v).unwrap()
    }

    async fn run(v: Value) -> Result<Value, GateError> {
        let conn = Connection::new(TransportKind::Http, "127.0.0.1:1");
        let action = action();
        let validated = action.inputs().validate(params(v))?;
        action.run(&conn, validated).await
    }

    #[tokio::test]
    async fn creates_user() {
        let v = run(json!({"name": "Ann", "email": "ann@example.com", "age": "41"})).await.unwrap();
        assert_eq!(
            v,
            json!({"created": true, "user": {"name": "Ann", "email": "ann@example.com", "age": 41}})
        );
    }

    #[tokio::test]
    async fn age_is_optional() {
        let v = run(json!({"name": "Ann", "email": "ann@example.com"})).await.unwrap();
        assert!(v["user"].get("age").is_none());
    }

    #[tokio::test]
    async fn email_is_required() {
        let err = run(json!({"name": "Ann"})).await.unwrap_err();
        assert_matches!(err, GateError::ParamRequired { key } if key == "email");
    }

    #[tokio::test]
    async fn email_must_look_like_one() {
        let err = run(json!({"name": "Ann", "email": "nope"})).await.unwrap_err();
        assert_matches!(err, GateError::ParamInvalid { key, .. } if key == "email");
    }

    #[tokio::test]
    async fn bad_age_is_rejected() {
        let err = run(json!({"name": "Ann", "email": "a@b", "age": "old"})).await.unwrap_err();
        assert_eq!(err.code(), "PARAM_VALIDATION");
    }
}
