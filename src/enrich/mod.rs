//! Enricher Client: one logical connection to the
//! external price/pair API, self-rate-limited on a mutex-guarded gap.

use anyhow::Result;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(300);
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
pub struct BaseToken {
    pub address: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Txns5m {
    pub buys: Option<u32>,
    pub sells: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxnsWindow {
    #[serde(rename = "m5")]
    pub m5: Txns5m,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VolumeWindow {
    #[serde(rename = "m5")]
    pub m5: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub socials: Vec<serde_json::Value>,
    #[serde(default)]
    pub websites: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairRecord {
    #[serde(rename = "baseToken")]
    pub base_token: BaseToken,
    #[serde(rename = "quoteToken")]
    pub quote_token: Option<BaseToken>,
    #[serde(rename = "priceUsd")]
    pub price_usd: Option<String>,
    #[serde(default)]
    pub liquidity: Liquidity,
    #[serde(rename = "marketCap")]
    pub market_cap: Option<f64>,
    pub fdv: Option<f64>,
    #[serde(default)]
    pub txns: TxnsWindow,
    #[serde(default)]
    pub volume: VolumeWindow,
    #[serde(default)]
    pub info: Info,
    #[serde(rename = "pairCreatedAt")]
    pub pair_created_at: Option<i64>,
    #[serde(rename = "chainId")]
    pub chain_id: Option<String>,
}

impl PairRecord {
    pub fn mcap(&self) -> f64 {
        self.market_cap.or(self.fdv).unwrap_or(0.0)
    }

    pub fn has_socials(&self) -> bool {
        !self.info.socials.is_empty() || !self.info.websites.is_empty()
    }
}

struct RateLimiter {
    last_request: Option<Instant>,
}

/// Thin HTTPS client over the DexScreener-shaped enrichment API.
pub struct EnrichClient {
    http: reqwest::Client,
    base_url: String,
    limiter: Mutex<RateLimiter>,
}

impl EnrichClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            limiter: Mutex::new(RateLimiter { last_request: None }),
        })
    }

    async fn throttle(&self) {
        let mut limiter = self.limiter.lock().await;
        if let Some(last) = limiter.last_request {
            let elapsed = last.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        limiter.last_request = Some(Instant::now());
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Option<T> {
        self.throttle().await;
        let resp = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(url, error = %e, "enrichment request failed");
                return None;
            }
        };

        if resp.status().as_u16() == 429 {
            warn!(url, "enrichment rate-limited, backing off");
            tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
            return None;
        }
        if !resp.status().is_success() {
            debug!(url, status = %resp.status(), "enrichment non-200");
            return None;
        }
        match resp.json::<T>().await {
            Ok(v) => Some(v),
            Err(e) => {
                debug!(url, error = %e, "enrichment decode failed");
                None
            }
        }
    }

    /// GET /tokens/v1/{chain}/{token}
    pub async fn pairs_for_token(&self, chain: &str, token: &str) -> Vec<PairRecord> {
        let url = format!("{}/tokens/v1/{}/{}", self.base_url, chain, token);
        self.get_json::<Vec<PairRecord>>(&url).await.unwrap_or_default()
    }

    /// GET /latest/dex/pairs/{chain}/{pair}
    pub async fn pair_by_id(&self, chain: &str, pair: &str) -> Option<PairRecord> {
        #[derive(Deserialize)]
        struct Envelope {
            pair: Option<PairRecord>,
        }
        let url = format!("{}/latest/dex/pairs/{}/{}", self.base_url, chain, pair);
        self.get_json::<Envelope>(&url).await.and_then(|e| e.pair)
    }

    /// GET /latest/dex/search?q=
    pub async fn search_by_symbol(&self, query: &str) -> Vec<PairRecord> {
        #[derive(Deserialize)]
        struct Envelope {
            #[serde(default)]
            pairs: Vec<PairRecord>,
        }
        let url = format!(
            "{}/latest/dex/search?q={}",
            self.base_url,
            urlencoding_minimal(query)
        );
        self.get_json::<Envelope>(&url)
            .await
            .map(|e| e.pairs)
            .unwrap_or_default()
    }

    pub fn best_liquidity_pair(pairs: &[PairRecord]) -> Option<&PairRecord> {
        pairs.iter().max_by(|a, b| {
            a.liquidity
                .usd
                .unwrap_or(0.0)
                .partial_cmp(&b.liquidity.usd.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}

/// Minimal query-param escaping; avoids pulling in a dedicated crate for one call site.
fn urlencoding_minimal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Copycat-check rule set. Returns true iff `candidate`
/// satisfies any of the three impersonation rules against `ours`.
pub fn is_copycat_match(ours_liquidity: f64, ours_has_socials: bool, ours_mcap: f64, candidate: &PairRecord) -> bool {
    let cand_liq = candidate.liquidity.usd.unwrap_or(0.0);
    if cand_liq > 10.0 * ours_liquidity {
        return true;
    }
    if candidate.has_socials() && !ours_has_socials && cand_liq > 2.0 * ours_liquidity {
        return true;
    }
    if candidate.mcap() > 100_000.0 && ours_mcap < 50_000.0 {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(liq: f64, socials: bool, mcap: f64) -> PairRecord {
        PairRecord {
            base_token: BaseToken { address: "0x1".into(), symbol: Some("FOO".into()), name: None },
            quote_token: None,
            price_usd: None,
            liquidity: Liquidity { usd: Some(liq) },
            market_cap: Some(mcap),
            fdv: None,
            txns: TxnsWindow::default(),
            volume: VolumeWindow::default(),
            info: Info {
                socials: if socials { vec![serde_json::json!({"type":"twitter"})] } else { vec![] },
                websites: vec![],
            },
            pair_created_at: None,
            chain_id: None,
        }
    }

    #[test]
    fn copycat_rule_1_liquidity_ratio() {
        assert!(is_copycat_match(1000.0, false, 0.0, &pair(20_000.0, false, 0.0)));
        assert!(!is_copycat_match(1000.0, false, 0.0, &pair(5_000.0, false, 0.0)));
    }

    #[test]
    fn copycat_rule_2_socials_and_liquidity() {
        assert!(is_copycat_match(1000.0, false, 0.0, &pair(2_500.0, true, 0.0)));
        assert!(!is_copycat_match(1000.0, true, 0.0, &pair(2_500.0, true, 0.0)));
    }

    #[test]
    fn copycat_rule_3_mcap_asymmetry() {
        assert!(is_copycat_match(1000.0, false, 10_000.0, &pair(0.0, false, 150_000.0)));
        assert!(!is_copycat_match(1000.0, false, 60_000.0, &pair(0.0, false, 150_000.0)));
    }
}
