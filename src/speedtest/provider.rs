//! speedtest.net measurement provider over plain HTTP

use super::client_config::parse_client;
use super::servers::{
    is_unreachable, mean_latency_ms, pick_best, resource_url, RankedServer, Server, LATENCY_BODY,
    LATENCY_SAMPLES,
};
use super::MeasurementProvider;
use crate::{
    config::SpeedtestSettings,
    error::{AppError, Result},
    models::Measurement,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use reqwest::{header, Body, Client};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout_at;
use url::Url;

const USER_AGENT: &str = concat!("speedtest-recorder/", env!("CARGO_PKG_VERSION"));

const UPLOAD_PREFIX: &[u8] = b"content1=";
const UPLOAD_PATTERN: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const UPLOAD_CHUNK: usize = 10_240;

/// Transfer sizes and repeat counts for one measurement
#[derive(Debug, Clone, PartialEq)]
pub struct TransferPlan {
    /// Edge length N of the `randomNxN.jpg` images to fetch
    pub download_sizes: Vec<usize>,
    pub download_repeats: usize,
    /// Upload body sizes in bytes
    pub upload_sizes: Vec<usize>,
    pub upload_repeats: usize,
}

impl Default for TransferPlan {
    fn default() -> Self {
        Self {
            download_sizes: vec![350, 500, 750, 1000, 1500, 2000, 2500, 3000, 3500, 4000],
            download_repeats: 4,
            upload_sizes: vec![32_768, 65_536, 131_072, 262_144, 524_288, 1_048_576],
            upload_repeats: 4,
        }
    }
}

impl TransferPlan {
    fn download_jobs(&self) -> Vec<usize> {
        expand(&self.download_sizes, self.download_repeats)
    }

    fn upload_jobs(&self) -> Vec<usize> {
        expand(&self.upload_sizes, self.upload_repeats)
    }
}

fn expand(sizes: &[usize], repeats: usize) -> Vec<usize> {
    sizes
        .iter()
        .flat_map(|size| std::iter::repeat(*size).take(repeats))
        .collect()
}

/// Measurement provider backed by the public speedtest.net server fleet
pub struct SpeedtestNetProvider {
    client: Client,
    settings: SpeedtestSettings,
    plan: TransferPlan,
    best: Option<RankedServer>,
    client_info: Option<Value>,
    started_at: Option<DateTime<Utc>>,
    download: f64,
    upload: f64,
    bytes_received: u64,
    bytes_sent: u64,
}

impl SpeedtestNetProvider {
    /// Create a provider with the default transfer plan
    pub fn new(settings: SpeedtestSettings) -> Result<Self> {
        // whole-request timeouts are set per request; transfers stop at the test deadline
        let client = Client::builder()
            .connect_timeout(settings.timeout)
            .read_timeout(settings.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::measurement(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            settings,
            plan: TransferPlan::default(),
            best: None,
            client_info: None,
            started_at: None,
            download: 0.0,
            upload: 0.0,
            bytes_received: 0,
            bytes_sent: 0,
        })
    }

    /// Replace the transfer plan
    pub fn with_plan(mut self, plan: TransferPlan) -> Self {
        self.plan = plan;
        self
    }

    /// Selected server, once `select_best_server` succeeded
    pub fn best_server(&self) -> Option<&RankedServer> {
        self.best.as_ref()
    }

    /// Fetch the server list, nearest first
    pub async fn fetch_servers(&self) -> Result<Vec<Server>> {
        let servers = self
            .client
            .get(&self.settings.server_list_url)
            .header(header::CACHE_CONTROL, "no-cache")
            .timeout(self.settings.timeout)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<Server>>()
            .await?;
        Ok(servers)
    }

    /// Attributes of the `<client>` element of the configuration document
    pub async fn fetch_client_info(&self) -> Result<Value> {
        let document = self
            .client
            .get(&self.settings.config_url)
            .header(header::CACHE_CONTROL, "no-cache")
            .timeout(self.settings.timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_client(&document)
            .ok_or_else(|| AppError::measurement("speedtest configuration has no <client> element"))
    }

    /// Mean round trip to the server's `latency.txt`
    async fn measure_latency(&self, endpoint: &Url) -> Result<f64> {
        let latency_url = resource_url(endpoint, "latency.txt")?;
        let mut samples = Vec::with_capacity(LATENCY_SAMPLES);

        for attempt in 0..LATENCY_SAMPLES {
            let url = cache_busted(&latency_url, attempt);
            let start = Instant::now();
            let healthy = match self.client.get(url).timeout(self.settings.timeout).send().await {
                Ok(response) if response.status().is_success() => response
                    .text()
                    .await
                    .map(|body| body.trim() == LATENCY_BODY)
                    .unwrap_or(false),
                _ => false,
            };
            let elapsed = start.elapsed();
            samples.push(healthy.then_some(elapsed));
        }

        Ok(mean_latency_ms(&samples))
    }

    fn selected_endpoint(&self) -> Result<Url> {
        self.best
            .as_ref()
            .map(|best| best.endpoint.clone())
            .ok_or_else(|| AppError::measurement("No server selected; call select_best_server first"))
    }
}

#[async_trait]
impl MeasurementProvider for SpeedtestNetProvider {
    async fn select_best_server(&mut self) -> Result<()> {
        self.started_at = Some(Utc::now());
        self.client_info = self.fetch_client_info().await.ok();
        let servers = self.fetch_servers().await?;
        if servers.is_empty() {
            return Err(AppError::measurement("no speedtest servers available"));
        }

        let candidates = servers.len().min(self.settings.candidates);
        let mut ranked = Vec::with_capacity(candidates);
        for server in servers.into_iter().take(self.settings.candidates) {
            // malformed entries are skipped
            let Ok(endpoint) = server.endpoint(self.settings.secure) else {
                continue;
            };
            let latency_ms = self.measure_latency(&endpoint).await?;
            ranked.push(RankedServer {
                server,
                endpoint,
                latency_ms,
            });
        }

        let best = pick_best(ranked)
            .ok_or_else(|| AppError::measurement("no speedtest servers available"))?;
        if is_unreachable(best.latency_ms) {
            return Err(AppError::measurement(format!(
                "no reachable speedtest server among {} candidates; best was {}",
                candidates,
                best.server.describe()
            )));
        }

        self.best = Some(best);
        Ok(())
    }

    async fn download(&mut self, threads: usize) -> Result<f64> {
        let endpoint = self.selected_endpoint()?;
        let urls = self
            .plan
            .download_jobs()
            .into_iter()
            .enumerate()
            .map(|(i, size)| {
                resource_url(&endpoint, &format!("random{0}x{0}.jpg", size)).map(|url| cache_busted(&url, i))
            })
            .collect::<Result<Vec<Url>>>()?;

        let client = self.client.clone();
        let start = Instant::now();
        let deadline = start + self.settings.test_length;

        let received = stream::iter(urls)
            .map(move |url| {
                let client = client.clone();
                async move {
                    if Instant::now() >= deadline {
                        return Ok(0);
                    }
                    fetch_body(&client, url, deadline).await
                }
            })
            .buffer_unordered(threads.max(1))
            .try_fold(0u64, |total, bytes| async move { Ok::<u64, AppError>(total + bytes) })
            .await?;

        self.bytes_received = received;
        self.download = bits_per_second(received, start.elapsed());
        Ok(self.download)
    }

    async fn upload(&mut self, threads: usize) -> Result<f64> {
        let endpoint = self.selected_endpoint()?;
        let jobs = self.plan.upload_jobs();

        let client = self.client.clone();
        let start = Instant::now();
        let deadline = start + self.settings.test_length;

        let sent = stream::iter(jobs)
            .map(move |size| {
                let client = client.clone();
                let endpoint = endpoint.clone();
                async move {
                    if Instant::now() >= deadline {
                        return Ok(0);
                    }
                    post_body(&client, endpoint, size, deadline).await
                }
            })
            .buffer_unordered(threads.max(1))
            .try_fold(0u64, |total, bytes| async move { Ok::<u64, AppError>(total + bytes) })
            .await?;

        self.bytes_sent = sent;
        self.upload = bits_per_second(sent, start.elapsed());
        Ok(self.upload)
    }

    fn results(&self) -> Measurement {
        let mut measurement = Measurement::new(self.download, self.upload)
            .with_metadata("bytes_sent", Value::from(self.bytes_sent))
            .with_metadata("bytes_received", Value::from(self.bytes_received))
            .with_metadata("share", Value::Null);

        if let Some(best) = &self.best {
            measurement = measurement
                .with_metadata("ping", Value::from(best.latency_ms))
                .with_metadata("server", best.server.to_metadata(best.latency_ms));
        }
        if let Some(client) = &self.client_info {
            measurement = measurement.with_metadata("client", client.clone());
        }
        if let Some(started_at) = self.started_at {
            measurement = measurement.with_metadata("timestamp", Value::from(started_at.to_rfc3339()));
        }
        measurement
    }
}

/// Stream one download, keeping what arrived before the deadline or a stall
async fn fetch_body(client: &Client, url: Url, deadline: Instant) -> Result<u64> {
    let deadline = tokio::time::Instant::from_std(deadline);
    let request = client.get(url).header(header::CACHE_CONTROL, "no-cache").send();

    let mut response = match timeout_at(deadline, request).await {
        Ok(Ok(response)) => response.error_for_status()?,
        Ok(Err(e)) if e.is_timeout() => return Ok(0),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Ok(0),
    };

    let mut received = 0u64;
    loop {
        match timeout_at(deadline, response.chunk()).await {
            Ok(Ok(Some(chunk))) => received += chunk.len() as u64,
            Ok(Ok(None)) | Err(_) => break,
            Ok(Err(e)) if e.is_timeout() => break,
            Ok(Err(e)) => return Err(e.into()),
        }
    }
    Ok(received)
}

/// Stream one upload; an interrupted upload counts the chunks already handed over
async fn post_body(client: &Client, endpoint: Url, size: usize, deadline: Instant) -> Result<u64> {
    let handed_over = Arc::new(AtomicU64::new(0));
    let tally = Arc::clone(&handed_over);
    let chunks: Vec<Vec<u8>> = upload_payload(size)
        .chunks(UPLOAD_CHUNK)
        .map(<[u8]>::to_vec)
        .collect();
    let body = stream::iter(chunks).map(move |chunk| {
        tally.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        Ok::<Vec<u8>, std::io::Error>(chunk)
    });

    let request = client
        .post(endpoint)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::CONTENT_LENGTH, size)
        .body(Body::wrap_stream(body))
        .send();

    let deadline = tokio::time::Instant::from_std(deadline);
    match timeout_at(deadline, request).await {
        Ok(Ok(response)) => {
            let response = response.error_for_status()?;
            // the acknowledgement body is not part of the measurement
            let _ = timeout_at(deadline, response.bytes()).await;
            Ok(size as u64)
        }
        Ok(Err(e)) if e.is_timeout() => Ok(handed_over.load(Ordering::Relaxed)),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Ok(handed_over.load(Ordering::Relaxed)),
    }
}

/// `content1=` followed by a repeating alphanumeric pattern, exactly `size` bytes long
pub fn upload_payload(size: usize) -> Vec<u8> {
    let mut body = Vec::with_capacity(size);
    body.extend_from_slice(&UPLOAD_PREFIX[..UPLOAD_PREFIX.len().min(size)]);
    let remaining = size - body.len();
    body.extend(UPLOAD_PATTERN.iter().cycle().take(remaining));
    body
}

/// Throughput in bits per second
pub fn bits_per_second(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / secs
}

fn cache_busted(url: &Url, attempt: usize) -> Url {
    let mut url = url.clone();
    url.query_pairs_mut()
        .append_pair("x", &format!("{}.{}", Utc::now().timestamp_millis(), attempt));
    url
}
