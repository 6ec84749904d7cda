use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Risk-score contribution per spec §4.D ("each HIGH alert: +2; each MEDIUM: +1").
    pub fn risk_weight(&self) -> i32 {
        match self {
            Severity::High => 2,
            Severity::Medium => 1,
            Severity::Low => 0,
        }
    }
}

/// Fixed alert-type vocabulary, spec §4.D per-kind catalogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertType {
    // Wallet
    LargeTransaction,
    HighGasUsage,
    MultipleContractInteractions,
    PortfolioValueChange,
    SuspiciousActivity,
    // Token
    LargeTransfer,
    BurnDetected,
    WhaleMovement,
    VolumeSpike,
    SuspiciousPattern,
    // NFT
    MassTransfer,
    WhaleAccumulation,
    SuspiciousMinting,
    HighActivitySpike,
    WashTrading,
    // Shared
    WatchedWalletActivity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        severity: Severity,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            alert_type,
            severity,
            message: message.into(),
            timestamp: Utc::now(),
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataQuality {
    Complete,
    Partial,
    Limited,
    ServiceUnavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub items_fetched: usize,
    pub items_new: usize,
    pub data_quality: DataQuality,
}
