//! reqwest-backed forum client

use crate::error::{ContestError, Result};
use crate::site::parser;
use crate::site::{CaptchaAnswer, CaptchaChallenge, ContestRef, SiteClient, SubmitOutcome};
use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, REFERER};
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Connection and session settings for the forum
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Forum root, e.g. `https://lolz.guru/`
    pub base_url: Url,
    /// Contests RSS feed, relative to `base_url`
    pub contests_feed_path: String,
    /// Renewable anti-bot cookie
    pub identity_cookie: String,
    pub user_agent: String,
    /// Extra headers sent with every request
    pub headers: BTreeMap<String, String>,
    /// Cookies seeded into the jar at startup
    pub cookies: BTreeMap<String, String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl SiteConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            contests_feed_path: "forums/contests/index.rss".to_string(),
            identity_cookie: "df_id".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Forum client owning the HTTP connection pool and the session cookies
pub struct HttpSiteClient {
    client: Client,
    jar: Arc<Jar>,
    config: SiteConfig,
}

impl HttpSiteClient {
    pub fn new(config: SiteConfig) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        for (name, value) in &config.cookies {
            jar.add_cookie_str(&format!("{}={}; Path=/", name, value), &config.base_url);
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ContestError::ConfigError(format!("header {}: {}", name, e)))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| ContestError::ConfigError(format!("header {}: {}", name, e)))?;
            headers.insert(header_name, header_value);
        }

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .cookie_provider(Arc::clone(&jar))
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ContestError::FetchError {
                url: "client_init".to_string(),
                source: e,
            })?;

        Ok(Self {
            client,
            jar,
            config,
        })
    }

    /// Current value of a session cookie
    pub fn cookie_value(&self, name: &str) -> Option<String> {
        let header = self.jar.cookies(&self.config.base_url)?;
        let cookies = header.to_str().ok()?;
        cookies.split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then(|| value.to_string())
        })
    }

    fn set_cookie(&self, name: &str, value: &str) {
        self.jar
            .add_cookie_str(&format!("{}={}; Path=/", name, value), &self.config.base_url);
    }

    fn remove_cookie(&self, name: &str) {
        self.jar
            .add_cookie_str(&format!("{}=; Max-Age=0; Path=/", name), &self.config.base_url);
    }

    fn make_url(&self, path: &str) -> Result<Url> {
        self.config
            .base_url
            .join(path)
            .map_err(|_| ContestError::InvalidUrl(path.to_string()))
    }

    async fn get_text(&self, url: &Url, referer: Option<&Url>) -> Result<String> {
        let mut request = self.client.get(url.clone());
        if let Some(referer) = referer {
            request = request.header(REFERER, referer.as_str());
        }

        let response = request.send().await.map_err(|e| ContestError::FetchError {
            url: url.to_string(),
            source: e,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContestError::HttpStatusError {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| ContestError::FetchError {
            url: url.to_string(),
            source: e,
        })?;

        debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

#[async_trait]
impl SiteClient for HttpSiteClient {
    async fn fetch_contest_list(&self) -> Result<Vec<ContestRef>> {
        let feed_url = self.make_url(&self.config.contests_feed_path)?;
        let body = self.get_text(&feed_url, None).await?;

        let contests = parser::extract_feed_links(&body)?
            .into_iter()
            .filter_map(|link| match self.config.base_url.join(&link) {
                Ok(url) => Some(ContestRef::new(url)),
                Err(e) => {
                    warn!("Skipping invalid contest link {}: {}", link, e);
                    None
                }
            })
            .collect();

        Ok(contests)
    }

    async fn fetch_thread_page(&self, contest: &ContestRef) -> Result<String> {
        self.get_text(contest.url(), Some(&self.config.base_url))
            .await
    }

    async fn submit_participation(
        &self,
        contest: &ContestRef,
        challenge: &CaptchaChallenge,
        answer: CaptchaAnswer,
    ) -> Result<SubmitOutcome> {
        let join_url = contest.participate_url();
        let thread_url = contest.url().as_str();

        let form = [
            ("captcha_hash", challenge.captcha_hash.clone()),
            ("captcha_type", "ClickCaptcha".to_string()),
            ("x", answer.x.to_string()),
            ("y", answer.y.to_string()),
            ("_xfRequestUri", contest.url().path().to_string()),
            ("_xfNoRedirect", "1".to_string()),
            ("_xfToken", challenge.csrf_token.clone()),
            ("_xfResponseType", "json".to_string()),
        ];

        let response = self
            .client
            .post(join_url.clone())
            .header(ACCEPT, "application/json, text/javascript, */*; q=0.01")
            .header(REFERER, thread_url)
            .header("X-Ajax-Referer", thread_url)
            .header("X-Requested-With", "XMLHttpRequest")
            .form(&form)
            .send()
            .await
            .map_err(|e| ContestError::FetchError {
                url: join_url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContestError::HttpStatusError {
                url: join_url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| ContestError::FetchError {
            url: join_url.to_string(),
            source: e,
        })?;
        debug!("Response from {}: {}", join_url, body);

        let json: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| ContestError::UnexpectedResponse {
                url: join_url.to_string(),
                reason: format!("participate response is not JSON: {}", e),
            })?;

        Ok(parser::parse_submit_response(&json))
    }

    fn has_cookie(&self, name: &str) -> bool {
        self.cookie_value(name).is_some()
    }

    async fn renew_identity_cookie(&self) -> Result<()> {
        let base_url = self.config.base_url.clone();

        // Without the old cookie the site serves the challenge script
        self.remove_cookie(&self.config.identity_cookie);

        let page = self.get_text(&base_url, None).await?;
        let src = parser::extract_script_src(&page)?.ok_or_else(|| {
            ContestError::IdentityRenewal("process script url not found".to_string())
        })?;
        let script_url = base_url
            .join(&src)
            .map_err(|e| ContestError::IdentityRenewal(format!("bad script url {}: {}", src, e)))?;

        let script = self.get_text(&script_url, Some(&base_url)).await?;
        let value = parser::extract_identity_value(&script)?;

        self.set_cookie(&self.config.identity_cookie, &value);
        info!("Renewed {} cookie", self.config.identity_cookie);
        Ok(())
    }
}
