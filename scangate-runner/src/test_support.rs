//! Scripted in-memory backend for scheduler tests
//!
//! Each artifact name maps to a script describing how its upload, status
//! polls and result fetch behave. The backend counts concurrent calls so
//! tests can check the request ceiling and the result-fetch guard.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use scangate_core::domain::scan::{
    Component, ComponentVuln, Meta, ScanPhase, ScanResultResponse, ScanResults, UploadResponse,
    UploadResults, Vuln,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::repository::{Artifact, ScanRepository};

#[derive(Debug, Clone)]
pub enum UploadBehavior {
    /// Accepted; `ready_after` status polls before phase becomes ready
    /// (`Some(0)` means ready on upload, `None` never ready)
    Accepted { ready_after: Option<u32> },
    TransportError,
    Rejected(u16),
}

#[derive(Debug, Clone, Copy)]
pub enum ResultBehavior {
    Clean,
    Vulnerable,
    Error,
}

#[derive(Debug, Clone)]
pub struct ItemScript {
    pub upload: UploadBehavior,
    pub result: ResultBehavior,
}

impl ItemScript {
    pub fn clean(ready_after: u32) -> Self {
        Self {
            upload: UploadBehavior::Accepted {
                ready_after: Some(ready_after),
            },
            result: ResultBehavior::Clean,
        }
    }

    pub fn vulnerable(ready_after: u32) -> Self {
        Self {
            result: ResultBehavior::Vulnerable,
            ..Self::clean(ready_after)
        }
    }

    pub fn never_ready() -> Self {
        Self {
            upload: UploadBehavior::Accepted { ready_after: None },
            result: ResultBehavior::Clean,
        }
    }

    pub fn upload_error() -> Self {
        Self {
            upload: UploadBehavior::TransportError,
            result: ResultBehavior::Clean,
        }
    }
}

#[derive(Default)]
struct Product {
    name: String,
    polls: u32,
}

pub struct FakeBackend {
    scripts: HashMap<String, ItemScript>,
    products: Mutex<HashMap<u64, Product>>,
    latency: Duration,
    result_latency: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    calls: AtomicUsize,
    uploads: AtomicUsize,
    status_calls: AtomicUsize,
    result_calls: AtomicUsize,
    results_in_flight: Mutex<HashMap<String, usize>>,
    duplicate_result_fetches: AtomicUsize,
}

struct CallGuard<'a>(&'a FakeBackend);

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeBackend {
    pub fn new(scripts: impl IntoIterator<Item = (&'static str, ItemScript)>) -> Self {
        Self {
            scripts: scripts
                .into_iter()
                .map(|(name, script)| (name.to_string(), script))
                .collect(),
            products: Mutex::new(HashMap::new()),
            latency: Duration::from_millis(50),
            result_latency: Duration::from_millis(50),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            uploads: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            result_calls: AtomicUsize::new(0),
            results_in_flight: Mutex::new(HashMap::new()),
            duplicate_result_fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self.result_latency = latency;
        self
    }

    pub fn with_result_latency(mut self, latency: Duration) -> Self {
        self.result_latency = latency;
        self
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn result_calls(&self) -> usize {
        self.result_calls.load(Ordering::SeqCst)
    }

    pub fn duplicate_result_fetches(&self) -> usize {
        self.duplicate_result_fetches.load(Ordering::SeqCst)
    }

    fn enter(&self) -> CallGuard<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        CallGuard(self)
    }

    fn script(&self, name: &str) -> Result<&ItemScript> {
        self.scripts
            .get(name)
            .ok_or_else(|| anyhow!("no script for '{}'", name))
    }

    fn phase(script: &ItemScript, polls: u32) -> ScanPhase {
        match script.upload {
            UploadBehavior::Accepted {
                ready_after: Some(n),
            } if polls >= n => ScanPhase::Ready,
            _ => ScanPhase::Busy,
        }
    }

    fn ack(product_id: u64, name: &str, phase: ScanPhase, code: u16) -> UploadResponse {
        UploadResponse {
            meta: Meta { code },
            results: UploadResults {
                product_id,
                sha1sum: sha1sum_of(name),
                status: phase,
                report_url: None,
            },
        }
    }
}

pub fn sha1sum_of(name: &str) -> String {
    format!("sha1-{}", name)
}

pub fn vulnerable_result() -> ScanResultResponse {
    ScanResultResponse {
        meta: Meta::default(),
        results: ScanResults {
            components: vec![Component {
                lib: Some("openssl".to_string()),
                version: Some("1.0.1f".to_string()),
                vulns: vec![ComponentVuln {
                    vuln: Vuln {
                        cve: "CVE-2014-0160".to_string(),
                        cvss: Some(7.5),
                        summary: None,
                    },
                    exact: true,
                    triage: None,
                }],
            }],
            ..Default::default()
        },
    }
}

pub fn clean_result() -> ScanResultResponse {
    ScanResultResponse {
        meta: Meta::default(),
        results: ScanResults::default(),
    }
}

#[async_trait]
impl ScanRepository for FakeBackend {
    async fn submit(&self, _group: &str, artifact: &Artifact) -> Result<UploadResponse> {
        let _guard = self.enter();
        self.uploads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;

        let script = self.script(artifact.name())?;
        let product_id = {
            let mut products = self.products.lock().unwrap();
            let id = products.len() as u64 + 1;
            products.insert(
                id,
                Product {
                    name: artifact.name().to_string(),
                    polls: 0,
                },
            );
            id
        };

        match &script.upload {
            UploadBehavior::TransportError => Err(anyhow!("connection reset by peer")),
            UploadBehavior::Rejected(code) => Ok(Self::ack(
                product_id,
                artifact.name(),
                ScanPhase::Busy,
                *code,
            )),
            UploadBehavior::Accepted { .. } => Ok(Self::ack(
                product_id,
                artifact.name(),
                Self::phase(script, 0),
                200,
            )),
        }
    }

    async fn fetch_status(&self, product_id: u64) -> Result<UploadResponse> {
        let _guard = self.enter();
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;

        let (name, polls) = {
            let mut products = self.products.lock().unwrap();
            let product = products
                .get_mut(&product_id)
                .ok_or_else(|| anyhow!("unknown product {}", product_id))?;
            product.polls += 1;
            (product.name.clone(), product.polls)
        };
        let script = self.script(&name)?;
        Ok(Self::ack(product_id, &name, Self::phase(script, polls), 200))
    }

    async fn fetch_result(&self, sha1sum: &str) -> Result<ScanResultResponse> {
        let _guard = self.enter();
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut outstanding = self.results_in_flight.lock().unwrap();
            let count = outstanding.entry(sha1sum.to_string()).or_insert(0);
            if *count > 0 {
                self.duplicate_result_fetches.fetch_add(1, Ordering::SeqCst);
            }
            *count += 1;
        }

        tokio::time::sleep(self.result_latency).await;

        {
            let mut outstanding = self.results_in_flight.lock().unwrap();
            if let Some(count) = outstanding.get_mut(sha1sum) {
                *count -= 1;
            }
        }

        let name = sha1sum.trim_start_matches("sha1-");
        match self.script(name)?.result {
            ResultBehavior::Clean => Ok(clean_result()),
            ResultBehavior::Vulnerable => Ok(vulnerable_result()),
            ResultBehavior::Error => Err(anyhow!("scan backend answered 500: internal error")),
        }
    }
}
