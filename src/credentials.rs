//! Registration result returned by the push transport.
//!
//! Stored verbatim under the `credentials` key and replaced wholesale on
//! re-registration. Field names follow the camelCase layout the relay and
//! existing stores use; unknown fields are carried through untouched.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Web push key material generated at registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMaterial {
    /// ECDH private key (base64url).
    pub private_key: String,
    /// ECDH public key (base64url).
    pub public_key: String,
    /// Shared auth secret (base64url).
    pub auth_secret: String,
}

/// Device check-in identity used by the listen connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcmCredentials {
    /// Device id assigned at check-in.
    pub android_id: String,
    /// Device secret assigned at check-in.
    pub security_token: String,
    /// Application id the device registered as.
    #[serde(default)]
    pub app_id: String,
    /// Legacy GCM registration token.
    #[serde(default)]
    pub token: String,
    /// Fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Messaging token the application hands to its backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FcmCredentials {
    /// Messaging token.
    pub token: String,
    /// Push set identifier, when the backend provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_set: Option<String>,
    /// Fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Full registration bundle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// Web push key material.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<KeyMaterial>,
    /// Device identity.
    pub gcm: GcmCredentials,
    /// Messaging token.
    pub fcm: FcmCredentials,
    /// Fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Credentials {
    /// The messaging token.
    pub fn token(&self) -> &str {
        &self.fcm.token
    }

    /// Check the fields the session relies on are present.
    pub fn validate(&self) -> Result<()> {
        if self.fcm.token.is_empty() {
            anyhow::bail!("Registration returned an empty messaging token");
        }
        if self.gcm.android_id.is_empty() || self.gcm.security_token.is_empty() {
            anyhow::bail!("Registration returned incomplete device credentials");
        }
        Ok(())
    }

    /// Parse a stored or received JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        let credentials: Self = serde_json::from_value(value)?;
        Ok(credentials)
    }

    /// Serialize for storage.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Shorten a token for log output.
pub fn redact(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map_or(token.len(), |(idx, _)| idx);
    &token[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "keys": {
                "privateKey": "priv",
                "publicKey": "pub",
                "authSecret": "auth"
            },
            "gcm": {
                "androidId": "5001",
                "securityToken": "7002",
                "appId": "wp:receiver.push.com#1",
                "token": "gcm-token"
            },
            "fcm": {
                "token": "fcm-token-abcdef",
                "pushSet": "set-1"
            }
        })
    }

    #[test]
    fn test_parse_registration_bundle() {
        let creds = Credentials::from_value(sample()).unwrap();
        assert_eq!(creds.token(), "fcm-token-abcdef");
        assert_eq!(creds.gcm.android_id, "5001");
        assert_eq!(creds.fcm.push_set.as_deref(), Some("set-1"));
        creds.validate().unwrap();
    }

    #[test]
    fn test_unknown_fields_survive_storage() {
        let mut value = sample();
        value["fcm"]["extraFlag"] = json!(true);
        value["relayRegion"] = json!("eu");

        let creds = Credentials::from_value(value).unwrap();
        let stored = creds.to_value().unwrap();
        assert_eq!(stored["fcm"]["extraFlag"], json!(true));
        assert_eq!(stored["relayRegion"], json!("eu"));
    }

    #[test]
    fn test_empty_token_rejected() {
        let mut value = sample();
        value["fcm"]["token"] = json!("");
        let creds = Credentials::from_value(value).unwrap();
        assert!(creds.validate().is_err());
    }

    #[test]
    fn test_missing_fcm_section_rejected() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("fcm");
        assert!(Credentials::from_value(value).is_err());
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("fcm-token-abcdef"), "fcm-toke");
        assert_eq!(redact("short"), "short");
    }
}
