//! Response objects as they are serialized onto the wire.

use protocol::STATUS_SUCCESS;
use serde_json::{Map, Value};

use crate::error::Error;

/// One response: a status, an optional message and any number of payload
/// fields. Serializes to `{"status": ..., "message"?: ..., ...payload}`.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub message: Option<String>,
    payload: Map<String, Value>,
}

impl Response {
    pub fn ok() -> Response {
        Response {
            status: STATUS_SUCCESS,
            message: None,
            payload: Map::new(),
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Response {
        Response {
            status,
            message: Some(message.into()),
            payload: Map::new(),
        }
    }

    /// Adds one payload field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Response {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert("status".to_string(), Value::from(self.status));
        if let Some(message) = &self.message {
            object.insert("message".to_string(), Value::from(message.clone()));
        }
        for (key, value) in &self.payload {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
}

impl From<Error> for Response {
    fn from(error: Error) -> Response {
        Response::error(error.status(), error.to_string())
    }
}

impl<E: Into<Error>> From<std::result::Result<Response, E>> for Response {
    fn from(result: std::result::Result<Response, E>) -> Response {
        match result {
            Ok(response) => response,
            Err(error) => error.into().into(),
        }
    }
}
