//! IPC protocol types and validation for pawlink-daemon.
//!
//! This crate is shared by the daemon and its clients to prevent schema
//! drift. The daemon remains the authority on validation, but clients
//! can reuse the same types to construct valid requests.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use pawlink_core::{DeviceMeta, GeoPoint, OwnerProfile, OwnerSession, PetRecord};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1MB

/// Largest scan-feed page a client may request.
pub const MAX_RECENT_SCANS: usize = 100;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    EntryDecision,
    ClaimOrAuthenticate,
    CompleteClaim,
    UpdateOwner,
    SavePet,
    ActivateLost,
    DeactivateLost,
    RecordScan,
    RecentScans,
    ResumeSession,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Per-method parameter payloads
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryParams {
    /// Either the bare tag code or a full `/pet/<code>` path.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

impl EntryParams {
    /// Resolves to the tag code, whichever field carried it.
    pub fn resolve_code(&self) -> Result<String, ErrorInfo> {
        if let Some(code) = self.code.as_deref() {
            validate_code(code)?;
            return Ok(code.to_string());
        }
        if let Some(path) = self.path.as_deref() {
            return match pawlink_core::parse_pet_path(path) {
                Some(code) => Ok(code.to_string()),
                None => Err(ErrorInfo::new(
                    "invalid_params",
                    "path is not a /pet/<code> entry path",
                )),
            };
        }
        Err(ErrorInfo::new("invalid_params", "code or path is required"))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimParams {
    pub code: String,
    pub pin: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompleteClaimParams {
    pub owner: OwnerProfile,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateOwnerParams {
    pub session: OwnerSession,
    pub owner: OwnerProfile,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SavePetParams {
    pub session: OwnerSession,
    pub pet: PetRecord,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateLostParams {
    pub session: OwnerSession,
    pub consent: bool,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeactivateLostParams {
    pub session: OwnerSession,
    pub pin: String,
}

/// A device fix forwarded by the scanning client, present when the
/// finder granted the geolocation prompt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientFix {
    pub lat: f64,
    pub lng: f64,
    pub accuracy_m: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordScanParams {
    pub code: String,
    #[serde(default)]
    pub device: DeviceMeta,
    #[serde(default)]
    pub fix: Option<ClientFix>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecentScansParams {
    pub session: OwnerSession,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResumeSessionParams {
    pub session: OwnerSession,
}

// ─────────────────────────────────────────────────────────────────────
// Parsing and validation
// ─────────────────────────────────────────────────────────────────────

fn validate_code(code: &str) -> Result<(), ErrorInfo> {
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ErrorInfo::new(
            "invalid_params",
            "code must be non-empty and alphanumeric",
        ));
    }
    Ok(())
}

fn validate_pin(pin: &str) -> Result<(), ErrorInfo> {
    if pin.trim().is_empty() {
        return Err(ErrorInfo::new("invalid_params", "pin must not be empty"));
    }
    Ok(())
}

/// Deserializes method params with unknown-field rejection.
pub fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, ErrorInfo> {
    let params = params.ok_or_else(|| ErrorInfo::new("invalid_params", "params are required"))?;
    serde_json::from_value(params)
        .map_err(|err| ErrorInfo::new("invalid_params", format!("malformed params: {}", err)))
}

pub fn parse_claim(params: Option<Value>) -> Result<ClaimParams, ErrorInfo> {
    let parsed: ClaimParams = parse_params(params)?;
    validate_code(&parsed.code)?;
    validate_pin(&parsed.pin)?;
    Ok(parsed)
}

pub fn parse_record_scan(params: Option<Value>) -> Result<RecordScanParams, ErrorInfo> {
    let parsed: RecordScanParams = parse_params(params)?;
    validate_code(&parsed.code)?;
    if let Some(fix) = &parsed.fix {
        let in_range = fix.lat.abs() <= 90.0 && fix.lng.abs() <= 180.0 && fix.accuracy_m >= 0.0;
        if !in_range {
            return Err(ErrorInfo::new(
                "invalid_params",
                "fix coordinates out of range",
            ));
        }
    }
    Ok(parsed)
}

pub fn parse_recent_scans(params: Option<Value>) -> Result<RecentScansParams, ErrorInfo> {
    let mut parsed: RecentScansParams = parse_params(params)?;
    parsed.limit = parsed.limit.map(|l| l.min(MAX_RECENT_SCANS));
    Ok(parsed)
}

pub fn parse_deactivate(params: Option<Value>) -> Result<DeactivateLostParams, ErrorInfo> {
    let parsed: DeactivateLostParams = parse_params(params)?;
    validate_pin(&parsed.pin)?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_round_trip() {
        let raw = json!({
            "protocol_version": 1,
            "method": "claim_or_authenticate",
            "id": "req-1",
            "params": {"code": "S1A2B3", "pin": "482913"}
        });
        let request: Request = serde_json::from_value(raw).unwrap();
        assert_eq!(request.method, Method::ClaimOrAuthenticate);

        let parsed = parse_claim(request.params).unwrap();
        assert_eq!(parsed.code, "S1A2B3");
        assert_eq!(parsed.pin, "482913");
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let raw = json!({
            "protocol_version": 1,
            "method": "drop_all_tables"
        });
        assert!(serde_json::from_value::<Request>(raw).is_err());
    }

    #[test]
    fn test_unknown_param_fields_are_rejected() {
        let params = json!({"code": "S1A2B3", "pin": "482913", "admin": true});
        assert!(parse_claim(Some(params)).is_err());
    }

    #[test]
    fn test_claim_requires_alphanumeric_code() {
        let params = json!({"code": "../etc", "pin": "482913"});
        let err = parse_claim(Some(params)).unwrap_err();
        assert_eq!(err.code, "invalid_params");
    }

    #[test]
    fn test_claim_requires_non_empty_pin() {
        let params = json!({"code": "S1A2B3", "pin": "   "});
        assert!(parse_claim(Some(params)).is_err());
    }

    #[test]
    fn test_entry_params_accept_path_or_code() {
        let from_path = EntryParams {
            code: None,
            path: Some("/pet/S1A2B3".to_string()),
        };
        assert_eq!(from_path.resolve_code().unwrap(), "S1A2B3");

        let from_code = EntryParams {
            code: Some("S1A2B3".to_string()),
            path: None,
        };
        assert_eq!(from_code.resolve_code().unwrap(), "S1A2B3");

        let neither = EntryParams {
            code: None,
            path: None,
        };
        assert!(neither.resolve_code().is_err());
    }

    #[test]
    fn test_record_scan_rejects_out_of_range_fix() {
        let params = json!({
            "code": "S1A2B3",
            "fix": {"lat": 123.0, "lng": 29.0, "accuracy_m": 10.0}
        });
        assert!(parse_record_scan(Some(params)).is_err());

        let params = json!({
            "code": "S1A2B3",
            "fix": {"lat": 41.0, "lng": 29.0, "accuracy_m": 10.0}
        });
        assert!(parse_record_scan(Some(params)).is_ok());
    }

    #[test]
    fn test_recent_scans_limit_is_capped() {
        let params = json!({
            "session": {"owner": {"username": "S1A2B3", "secret": "482913"}},
            "limit": 100000
        });
        let parsed = parse_recent_scans(Some(params)).unwrap();
        assert_eq!(parsed.limit, Some(MAX_RECENT_SCANS));
    }

    #[test]
    fn test_missing_params_are_an_error() {
        assert!(parse_claim(None).is_err());
        assert!(parse_params::<ResumeSessionParams>(None).is_err());
    }

    #[test]
    fn test_response_error_shape() {
        let response = Response::error(Some("req-9".into()), "invalid_pin", "wrong PIN");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["ok"], json!(false));
        assert_eq!(json["error"]["code"], json!("invalid_pin"));
        assert!(json.get("data").is_none());
    }
}
