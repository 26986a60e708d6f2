//! Scan domain types
//!
//! JSON shapes returned by the scanning backend. Uploads and status polls
//! both answer with an [`UploadResponse`]; result fetches answer with a
//! [`ScanResultResponse`].

use serde::{Deserialize, Serialize};

/// Response envelope metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub code: u16,
}

impl Meta {
    /// Whether the backend reported a 2xx code for the request
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

impl Default for Meta {
    fn default() -> Self {
        Self { code: 200 }
    }
}

/// Scan phase marker reported by the backend
///
/// The backend sends single-letter markers. Anything it adds later is kept
/// verbatim in [`ScanPhase::Other`] and treated as still in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScanPhase {
    /// `B`: scan queued or running
    Busy,
    /// `R`: scan finished, result can be fetched
    Ready,
    /// `F`: backend failed to scan the artifact
    Failed,
    Other(String),
}

impl ScanPhase {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Busy => "B",
            Self::Ready => "R",
            Self::Failed => "F",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ScanPhase {
    fn from(s: String) -> Self {
        match s.as_str() {
            "B" => Self::Busy,
            "R" => Self::Ready,
            "F" => Self::Failed,
            _ => Self::Other(s),
        }
    }
}

impl From<ScanPhase> for String {
    fn from(phase: ScanPhase) -> Self {
        phase.as_str().to_string()
    }
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Busy => write!(f, "busy"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
            Self::Other(s) => write!(f, "unknown ({})", s),
        }
    }
}

/// Acknowledgement of an upload, also returned by status polls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub meta: Meta,
    pub results: UploadResults,
}

/// Body of an upload acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResults {
    /// Backend-assigned job id, used for status polls
    pub product_id: u64,
    /// Content fingerprint, used for result fetches
    pub sha1sum: String,
    pub status: ScanPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
}

impl UploadResponse {
    pub fn product_id(&self) -> u64 {
        self.results.product_id
    }

    pub fn sha1sum(&self) -> &str {
        &self.results.sha1sum
    }

    pub fn phase(&self) -> &ScanPhase {
        &self.results.status
    }
}

/// Final scan result for one artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResultResponse {
    #[serde(default)]
    pub meta: Meta,
    pub results: ScanResults,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResults {
    #[serde(default)]
    pub summary: Summary,
    #[serde(default)]
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub verdict: Verdict,
    #[serde(rename = "vuln-count", default)]
    pub vuln_count: VulnCount,
}

/// The backend's own prose verdict, informational only
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Verdict {
    #[serde(default)]
    pub short: String,
    #[serde(default)]
    pub detailed: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VulnCount {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub exact: u32,
    #[serde(default)]
    pub historical: u32,
}

/// A third-party component found inside the artifact
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Component {
    #[serde(default)]
    pub lib: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub vulns: Vec<ComponentVuln>,
}

/// A known vulnerability matched against a component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentVuln {
    pub vuln: Vuln,
    /// Whether the component version matched exactly (vs. historically)
    #[serde(default)]
    pub exact: bool,
    #[serde(default)]
    pub triage: Option<Vec<Triage>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vuln {
    pub cve: String,
    #[serde(default)]
    pub cvss: Option<f64>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// A triage decision recorded against a vulnerability
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Triage {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
}

impl ComponentVuln {
    /// Exact matches without any triage entry need attention
    pub fn is_untriaged(&self) -> bool {
        self.exact && self.triage.as_ref().is_none_or(|t| t.is_empty())
    }
}

impl Component {
    pub fn name(&self) -> &str {
        self.lib.as_deref().unwrap_or("<unknown>")
    }

    pub fn untriaged_count(&self) -> usize {
        self.vulns.iter().filter(|v| v.is_untriaged()).count()
    }
}

impl ScanResultResponse {
    /// Total untriaged vulnerabilities across all components
    pub fn untriaged_count(&self) -> usize {
        self.results
            .components
            .iter()
            .map(Component::untriaged_count)
            .sum()
    }

    /// A result is clean when no component has untriaged vulnerabilities
    pub fn is_clean(&self) -> bool {
        self.untriaged_count() == 0
    }

    /// Components carrying at least one untriaged vulnerability
    pub fn vulnerable_components(&self) -> impl Iterator<Item = &Component> {
        self.results
            .components
            .iter()
            .filter(|c| c.untriaged_count() > 0)
    }
}
