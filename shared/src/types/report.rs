//! Counter report data structures
//!
//! These types mirror the JSON document printed by the sampling command and
//! consumed by metric exporters:
//!
//! ```json
//! {"GpuMetrics": [{"GpuId": "0", "Metrics": [{"Field": "SQ_WAVES", "Value": "42"}]}]}
//! ```

use serde::{Deserialize, Serialize};

/// One aggregated counter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FieldValue {
    /// Counter name as requested on input
    pub field: String,

    /// Aggregated value rendered as text
    pub value: String,
}

impl FieldValue {
    /// Create a field entry from an aggregated numeric value
    pub fn new(field: impl Into<String>, value: f64) -> Self {
        Self {
            field: field.into(),
            value: value.to_string(),
        }
    }

    /// Parse the textual value back into a number
    pub fn numeric(&self) -> Option<f64> {
        self.value.parse().ok()
    }
}

/// All counters reported for one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMetrics {
    /// Device index in discovery order
    #[serde(rename = "GpuId")]
    pub gpu_id: String,

    #[serde(rename = "Metrics")]
    pub metrics: Vec<FieldValue>,
}

impl DeviceMetrics {
    /// Create an empty entry for the device at `index`
    pub fn new(index: usize) -> Self {
        Self {
            gpu_id: index.to_string(),
            metrics: Vec::new(),
        }
    }

    /// Append an aggregated counter value
    pub fn push(&mut self, field: impl Into<String>, value: f64) {
        self.metrics.push(FieldValue::new(field, value));
    }

    /// Look up the numeric value reported for `field`
    pub fn value_of(&self, field: &str) -> Option<f64> {
        self.metrics
            .iter()
            .find(|m| m.field == field)
            .and_then(FieldValue::numeric)
    }
}

/// Top-level counter report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuReport {
    #[serde(rename = "GpuMetrics")]
    pub gpus: Vec<DeviceMetrics>,
}

impl GpuReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the entry for a device index
    pub fn device(&self, index: usize) -> Option<&DeviceMetrics> {
        let id = index.to_string();
        self.gpus.iter().find(|g| g.gpu_id == id)
    }

    /// Total number of (device, counter) entries
    pub fn entry_count(&self) -> usize {
        self.gpus.iter().map(|g| g.metrics.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_json_shape() {
        let mut gpu = DeviceMetrics::new(0);
        gpu.push("SQ_WAVES", 7.0);
        let report = GpuReport { gpus: vec![gpu] };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["GpuMetrics"][0]["GpuId"], "0");
        assert_eq!(json["GpuMetrics"][0]["Metrics"][0]["Field"], "SQ_WAVES");
        assert_eq!(json["GpuMetrics"][0]["Metrics"][0]["Value"], "7");
    }

    #[test]
    fn test_parse_exporter_document() {
        let doc = r#"{"GpuMetrics": [
            {"GpuId": "0", "Metrics": [{"Field": "GRBM_COUNT", "Value": "1.5"}]},
            {"GpuId": "1", "Metrics": []}
        ]}"#;
        let report: GpuReport = serde_json::from_str(doc).unwrap();
        assert_eq!(report.gpus.len(), 2);
        assert_eq!(report.device(0).unwrap().value_of("GRBM_COUNT"), Some(1.5));
        assert!(report.device(1).unwrap().metrics.is_empty());
        assert_eq!(report.entry_count(), 1);
    }

    #[test]
    fn test_fractional_value_text() {
        let field = FieldValue::new("FETCH_SIZE", 2.25);
        assert_eq!(field.value, "2.25");
        assert_eq!(field.numeric(), Some(2.25));
    }

    #[test]
    fn test_missing_device() {
        let report = GpuReport::new();
        assert!(report.device(3).is_none());
    }
}
