//! JSON envelope for `--format json`
//!
//! ```json
//! { "data": ..., "meta": { "generatedAt": "...", "version": "0.3.0", "proxy": "http://..." } }
//! ```

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T> {
    pub data: T,
    pub meta: Metadata,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// RFC 3339, second precision
    pub generated_at: String,
    pub version: String,
    /// Proxy that produced the data; absent for local commands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl<T> JsonOutput<T> {
    pub fn new(data: T, proxy: Option<&str>) -> Self {
        Self {
            data,
            meta: Metadata {
                generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                version: env!("CARGO_PKG_VERSION").to_string(),
                proxy: proxy.map(str::to_string),
            },
        }
    }
}

/// Pretty-printed envelope without a proxy origin
pub fn format_json<T: Serialize + ?Sized>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&JsonOutput::new(data, None))
}

/// Pretty-printed envelope recording which proxy answered
pub fn format_json_from<T: Serialize + ?Sized>(
    data: &T,
    proxy: &str,
) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&JsonOutput::new(data, Some(proxy)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ClearResponse, HintResponse};

    #[test]
    fn test_envelope_carries_version_and_time() {
        let output = JsonOutput::new(HintResponse { radius: 1500 }, None);

        assert_eq!(output.data.radius, 1500);
        assert_eq!(output.meta.version, env!("CARGO_PKG_VERSION"));
        assert!(output.meta.generated_at.ends_with('Z'));
        assert!(output.meta.proxy.is_none());
    }

    #[test]
    fn test_local_output_omits_proxy() {
        let result = format_json(&HintResponse { radius: 3000 }).unwrap();

        assert!(result.contains("\"radius\": 3000"));
        assert!(result.contains("\"generatedAt\""));
        assert!(!result.contains("\"proxy\""));
    }

    #[test]
    fn test_proxy_origin_recorded() {
        let cleared = ClearResponse {
            entries: 4,
            radius_hints: 2,
            unique_elements: 0,
        };
        let result = format_json_from(&cleared, "http://127.0.0.1:8787").unwrap();
        let value: serde_json::Value = serde_json::from_str(&result).unwrap();

        assert_eq!(value["data"]["radiusHints"], 2);
        assert_eq!(value["meta"]["proxy"], "http://127.0.0.1:8787");
    }
}
