//! Broker response bodies.
//!
//! Every broker body is wrapped as `{"status": ..., "data": ...}`. Parsing
//! here is lenient: missing fields default, malformed entries are skipped.

use serde::Deserialize;
use serde_json::Value;

/// Default message when the broker body has none.
pub const DEFAULT_FAILURE_MESSAGE: &str = "API call failed";

/// The `data` object of a broker body, if present.
pub fn data(body: &Value) -> Option<&Value> {
    body.get("data").filter(|d| !d.is_null())
}

/// The broker-supplied `message`, if any.
pub fn message(body: &Value) -> Option<&str> {
    body.get("message").and_then(Value::as_str)
}

/// `data.order_id` as a string. Numeric ids are stringified.
pub fn order_id(body: &Value) -> Option<String> {
    match data(body)?.get("order_id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `data.access_token` from a token exchange.
pub fn access_token(body: &Value) -> Option<String> {
    data(body)?
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Account identity from `/user/profile`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub email: Option<String>,
}

impl Profile {
    /// Parse the profile, `None` unless at least one identity field is set.
    pub fn from_body(body: &Value) -> Option<Self> {
        let profile: Profile = serde_json::from_value(data(body)?.clone()).ok()?;
        let has_identity = [&profile.user_id, &profile.user_name, &profile.email]
            .iter()
            .any(|f| f.as_deref().is_some_and(|s| !s.is_empty()));
        has_identity.then_some(profile)
    }

    /// Name shown to the user: user name, then email, then user id.
    pub fn display_name(&self) -> String {
        [&self.user_name, &self.email, &self.user_id]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .cloned()
            .unwrap_or_default()
    }
}

/// One entry of `data.net` from `/portfolio/positions`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NetPosition {
    pub tradingsymbol: String,
    pub exchange: String,
    pub quantity: i64,
    pub average_price: f64,
    pub last_price: f64,
    pub pnl: f64,
}

/// Parse `data.net`. Missing list yields an empty vec.
pub fn net_positions(body: &Value) -> Vec<NetPosition> {
    data(body)
        .and_then(|d| d.get("net"))
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_order_id() {
        assert_eq!(
            order_id(&json!({"data": {"order_id": "X"}})).as_deref(),
            Some("X")
        );
        assert_eq!(
            order_id(&json!({"data": {"order_id": 151220000000000u64}})).as_deref(),
            Some("151220000000000")
        );
        assert_eq!(order_id(&json!({"data": {}})), None);
        assert_eq!(order_id(&json!({"data": {"order_id": ""}})), None);
        assert_eq!(order_id(&json!({"status": "success"})), None);
    }

    #[test]
    fn test_profile_identity() {
        let profile = Profile::from_body(&json!({
            "status": "success",
            "data": {"user_id": "AB1234", "email": "a@b.c", "broker": "ZERODHA"}
        }))
        .unwrap();
        assert_eq!(profile.display_name(), "a@b.c");

        assert!(Profile::from_body(&json!({"data": {"broker": "ZERODHA"}})).is_none());
        assert!(Profile::from_body(&json!({"data": null})).is_none());
        assert!(Profile::from_body(&json!({"data": {"user_name": ""}})).is_none());
    }

    #[test]
    fn test_net_positions_lenient() {
        let body = json!({
            "status": "success",
            "data": {
                "net": [
                    {"tradingsymbol": "NIFTY26FEBFUT", "quantity": 50, "average_price": 100.0, "last_price": 101.5, "pnl": 75.0},
                    {"tradingsymbol": "TCS", "quantity": 0, "pnl": 10.0},
                    "garbage"
                ],
                "day": []
            }
        });
        let positions = net_positions(&body);
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].quantity, 50);
        assert_eq!(positions[1].average_price, 0.0);

        assert!(net_positions(&json!({"data": {}})).is_empty());
    }

    #[test]
    fn test_access_token() {
        assert_eq!(
            access_token(&json!({"data": {"access_token": "abc"}})).as_deref(),
            Some("abc")
        );
        assert_eq!(access_token(&json!({"data": {"user_id": "x"}})), None);
    }
}
