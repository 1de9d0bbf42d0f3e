use std::io::{BufRead, BufReader, Read};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use rayon::{ThreadPool, ThreadPoolBuilder};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::KiraError;
use crate::progress::{ApiStatus, StatusHub};

pub type Body = Box<dyn Read + Send>;
pub type ByteStream = BufReader<Body>;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str) -> Result<Body, KiraError>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    fn get(&self, url: &str) -> Result<Body, KiraError> {
        (**self).get(url)
    }
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &Config) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-cu/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::Transport(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| KiraError::Transport(err.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<Body, KiraError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| KiraError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "replicon request failed".to_string());
            return Err(KiraError::HttpStatus { status, message });
        }
        Ok(Box::new(response))
    }
}

pub struct FetchService<T: HttpTransport> {
    transport: T,
    limiter: DirectLimiter,
    pool: ThreadPool,
    degraded: AtomicBool,
    status: Arc<StatusHub>,
    empty_body_retries: u32,
    empty_body_backoff: Duration,
}

impl<T: HttpTransport> FetchService<T> {
    pub fn new(transport: T, config: &Config, status: Arc<StatusHub>) -> Result<Self, KiraError> {
        let rate = NonZeroU32::new(config.requests_per_second).ok_or_else(|| {
            KiraError::InvalidConfig("requests_per_second must be at least 1".to_string())
        })?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.fetch_workers)
            .thread_name(|index| format!("kira-cu-fetch-{index}"))
            .build()
            .map_err(|err| KiraError::WorkerPool(err.to_string()))?;
        Ok(Self {
            transport,
            limiter: RateLimiter::direct(Quota::per_second(rate)),
            pool,
            degraded: AtomicBool::new(false),
            status,
            empty_body_retries: config.empty_body_retries,
            empty_body_backoff: config.empty_body_backoff(),
        })
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Fetches `url` and returns its body positioned at the first byte.
    ///
    /// Transport failures are returned at once. Empty bodies are retried
    /// `empty_body_retries` times with exponential backoff before failing with
    /// [`KiraError::EmptyResponse`].
    pub fn fetch(&self, url: &str) -> Result<ByteStream, KiraError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let (stream, has_data) = self.pool.install(|| self.request(url))?;
            if has_data {
                return Ok(stream);
            }
            if attempt > self.empty_body_retries {
                return Err(KiraError::EmptyResponse {
                    url: url.to_string(),
                    attempts: attempt,
                });
            }
            let delay = self.empty_body_backoff * 2u32.saturating_pow(attempt - 1);
            warn!(url = %url, attempt, delay_ms = delay.as_millis() as u64, "empty body, retrying");
            thread::sleep(delay);
        }
    }

    fn request(&self, url: &str) -> Result<(ByteStream, bool), KiraError> {
        self.acquire_permit();
        debug!(url = %url, "GET");
        let body = match self.transport.get(url) {
            Ok(body) => body,
            Err(err) => {
                self.degraded.store(true, Ordering::SeqCst);
                self.status.set_api(ApiStatus::offline());
                warn!(url = %url, error = %err, "replicon request failed");
                return Err(err);
            }
        };
        let mut stream = BufReader::new(body);
        let has_data = !stream
            .fill_buf()
            .map_err(|err| KiraError::Stream(format!("{url}: {err}")))?
            .is_empty();
        if has_data {
            self.status.set_api(if self.is_degraded() {
                ApiStatus::trouble()
            } else {
                ApiStatus::online()
            });
        }
        Ok((stream, has_data))
    }

    fn acquire_permit(&self) {
        let clock = DefaultClock::default();
        while let Err(not_until) = self.limiter.check() {
            thread::sleep(not_until.wait_time_from(clock.now()));
        }
    }
}
