//! Synthetic load for the demo application: steady traffic, bursts and
//! rest periods against a random mix of its endpoints.

use crate::utils::error::{Result, ServiceError};
use crate::utils::validation::{self, Validate};
use rand::seq::IndexedRandom;
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const ENDPOINTS: [&str; 7] = [
    "/",
    "/health",
    "/slow",
    "/error",
    "/users/1",
    "/users/2",
    "/users/3",
];

#[derive(Debug, Clone)]
pub struct TrafficConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub readiness_timeout: Duration,
    pub readiness_interval: Duration,
    /// `None` polls until the service answers.
    pub readiness_max_attempts: Option<u32>,
    pub cycle_duration: Duration,
    pub requests_per_second: usize,
    pub max_workers: usize,
    pub burst_size: usize,
    pub burst_workers: usize,
    pub rest: Duration,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout: Duration::from_secs(10),
            readiness_timeout: Duration::from_secs(5),
            readiness_interval: Duration::from_secs(2),
            readiness_max_attempts: None,
            cycle_duration: Duration::from_secs(30),
            requests_per_second: 2,
            max_workers: 10,
            burst_size: 50,
            burst_workers: 20,
            rest: Duration::from_secs(10),
        }
    }
}

impl Validate for TrafficConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_url("base_url", &self.base_url)?;
        validation::validate_positive_number("requests_per_second", self.requests_per_second, 1)?;
        validation::validate_positive_number("max_workers", self.max_workers, 1)?;
        validation::validate_positive_number("burst_workers", self.burst_workers, 1)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrafficReport {
    pub sent: usize,
    pub statuses: BTreeMap<u16, usize>,
    pub errors: usize,
}

impl TrafficReport {
    fn record(&mut self, outcome: Option<u16>) {
        self.sent += 1;
        match outcome {
            Some(status) => *self.statuses.entry(status).or_insert(0) += 1,
            None => self.errors += 1,
        }
    }

    pub fn merge(&mut self, other: &TrafficReport) {
        self.sent += other.sent;
        self.errors += other.errors;
        for (status, count) in &other.statuses {
            *self.statuses.entry(*status).or_insert(0) += count;
        }
    }

    pub fn succeeded(&self) -> usize {
        self.statuses
            .iter()
            .filter(|(status, _)| (200..300).contains(*status))
            .map(|(_, count)| count)
            .sum()
    }
}

pub struct TrafficGenerator {
    client: Client,
    config: TrafficConfig,
    endpoints: Vec<String>,
}

impl TrafficGenerator {
    pub fn new(config: TrafficConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            endpoints: ENDPOINTS.iter().map(|e| e.to_string()).collect(),
            config,
        })
    }

    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn config(&self) -> &TrafficConfig {
        &self.config
    }

    fn pick_endpoint(&self) -> String {
        self.endpoints
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_else(|| "/".to_string())
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    pub async fn make_request(&self, endpoint: &str) -> Option<u16> {
        fetch(self.client.clone(), self.url(endpoint), endpoint.to_string()).await
    }

    pub async fn wait_until_ready(&self) -> Result<()> {
        let url = self.url("/health");
        let mut attempts = 0u32;
        tracing::info!("Waiting for service to be ready...");

        loop {
            attempts += 1;
            let response = self
                .client
                .get(&url)
                .timeout(self.config.readiness_timeout)
                .send()
                .await;

            match response {
                Ok(r) if r.status().as_u16() == 200 => {
                    tracing::info!("Service is ready!");
                    return Ok(());
                }
                Ok(r) => tracing::info!("Service answered {}, waiting...", r.status()),
                Err(_) => tracing::info!("Service not ready, waiting..."),
            }

            if self
                .config
                .readiness_max_attempts
                .is_some_and(|max| attempts >= max)
            {
                return Err(ServiceError::ServerError {
                    message: format!("{} not ready after {} attempts", url, attempts),
                });
            }
            tokio::time::sleep(self.config.readiness_interval).await;
        }
    }

    /// Sends `requests_per_second` requests spaced evenly over each second,
    /// waiting for each second's batch, until `duration` has elapsed.
    pub async fn generate_traffic(&self, duration: Duration, requests_per_second: usize) -> TrafficReport {
        tracing::info!(
            "Starting traffic generation for {:?} at ~{} requests/second",
            duration,
            requests_per_second
        );

        let workers = Arc::new(Semaphore::new(self.config.max_workers));
        let spacing = Duration::from_secs_f64(1.0 / requests_per_second.max(1) as f64);
        let started = Instant::now();
        let mut report = TrafficReport::default();

        while started.elapsed() < duration {
            let mut batch = JoinSet::new();
            for _ in 0..requests_per_second {
                self.submit(&mut batch, &workers).await;
                tokio::time::sleep(spacing).await;
            }
            collect(&mut batch, &mut report).await;
        }

        tracing::info!("Traffic generation completed: {} requests", report.sent);
        report
    }

    pub async fn burst(&self) -> TrafficReport {
        tracing::info!("Generating burst traffic...");
        let workers = Arc::new(Semaphore::new(self.config.burst_workers));
        let mut batch = JoinSet::new();
        for _ in 0..self.config.burst_size {
            self.submit(&mut batch, &workers).await;
        }

        let mut report = TrafficReport::default();
        collect(&mut batch, &mut report).await;
        tracing::info!("Burst completed: {} requests", report.sent);
        report
    }

    /// Normal traffic, a burst, then a rest period; repeated until
    /// `shutdown` resolves or `max_cycles` cycles have run.
    pub async fn run_cycles<F>(&self, max_cycles: Option<usize>, shutdown: F) -> TrafficReport
    where
        F: Future<Output = ()>,
    {
        let mut total = TrafficReport::default();
        let mut completed = 0;
        tokio::pin!(shutdown);

        while max_cycles.map_or(true, |max| completed < max) {
            tracing::info!("Starting traffic cycle...");
            let cycle = async {
                let mut report = self
                    .generate_traffic(self.config.cycle_duration, self.config.requests_per_second)
                    .await;
                report.merge(&self.burst().await);
                tracing::info!("Resting for {:?}...", self.config.rest);
                tokio::time::sleep(self.config.rest).await;
                report
            };

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Stopping traffic generator...");
                    break;
                }
                report = cycle => {
                    total.merge(&report);
                    completed += 1;
                }
            }
        }

        total
    }

    async fn submit(&self, batch: &mut JoinSet<Option<u16>>, workers: &Arc<Semaphore>) {
        let Ok(permit) = workers.clone().acquire_owned().await else {
            return;
        };
        let endpoint = self.pick_endpoint();
        let url = self.url(&endpoint);
        let client = self.client.clone();
        batch.spawn(async move {
            let _permit = permit;
            fetch(client, url, endpoint).await
        });
    }
}

async fn fetch(client: Client, url: String, endpoint: String) -> Option<u16> {
    match client.get(&url).send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            tracing::info!("{} -> {}", endpoint, status);
            Some(status)
        }
        Err(e) => {
            tracing::warn!("{} -> Error: {}", endpoint, e);
            None
        }
    }
}

async fn collect(batch: &mut JoinSet<Option<u16>>, report: &mut TrafficReport) {
    while let Some(joined) = batch.join_next().await {
        report.record(joined.ok().flatten());
    }
}
