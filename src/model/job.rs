use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One of the three analysis kinds a Job can dispatch to (spec §3, §4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    WalletSnapshot,
    AnalyzeCoinFlows,
    AnalyzeNftMovements,
}

impl JobAction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "wallet_snapshot" => Some(Self::WalletSnapshot),
            "analyze_coin_flows" => Some(Self::AnalyzeCoinFlows),
            "analyze_nft_movements" => Some(Self::AnalyzeNftMovements),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WalletSnapshot => "wallet_snapshot",
            Self::AnalyzeCoinFlows => "analyze_coin_flows",
            Self::AnalyzeNftMovements => "analyze_nft_movements",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
}

impl Network {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "mainnet" => Some(Self::Mainnet),
            "testnet" => Some(Self::Testnet),
            "devnet" => Some(Self::Devnet),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Devnet => "devnet",
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        // Submission API default per spec §6.
        Self::Testnet
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Scheduled,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One append-only log line (spec §3 `logs[]`/`serviceLogs[]`, §9 "append-only log streams").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            message: message.into(),
            function: None,
            duration_ms: None,
            details: None,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: LogLevel::Warn,
            message: message.into(),
            function: None,
            duration_ms: None,
            details: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: LogLevel::Error,
            message: message.into(),
            function: None,
            duration_ms: None,
            details: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A durable job record (spec §3 "Job").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub action: JobAction,
    pub payload: HashMap<String, serde_json::Value>,
    pub network: Network,
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u32>,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub service_logs: Vec<LogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a submitter may set when creating a Job (spec §6 Submission API).
#[derive(Debug, Clone, Deserialize)]
pub struct JobSubmission {
    pub action: String,
    #[serde(default)]
    pub payload: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub interval_minutes: Option<u32>,
}

impl Job {
    /// Payload accessor for the entity address every analysis kind keys on.
    pub fn entity_address(&self) -> Option<&str> {
        self.payload.get("wallet")
            .or_else(|| self.payload.get("tokenAddress"))
            .or_else(|| self.payload.get("collectionAddress"))
            .or_else(|| self.payload.get("entityAddress"))
            .and_then(|v| v.as_str())
    }

    pub fn watched_addresses(&self) -> Vec<String> {
        self.payload
            .get("watchedAddresses")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_lowercase))
                    .collect()
            })
            .unwrap_or_default()
    }
}
