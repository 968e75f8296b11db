use std::time::Duration;

use anyhow::{Context, Error as AnyhowError, Result};
use clap::Args;
use cookie::Cookie;
use derive_getters::Getters;
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Proxy, redirect::Policy};
use secrecy::SecretString;
use tracing::debug;

#[derive(Debug, Args, Getters, Clone, Copy)]
pub struct RetryArgs {
    ///Retries of a transient request failure before the part fails.
    #[arg(short='r',long,default_value_t=10)]
    pub max_no_retries: u32,
    ///Upper bound in seconds of the exponential backoff between retries.
    #[arg(short='d',long,default_value_t=10)]
    pub retry_delay_secs: u64,
}

impl RetryArgs {
    pub fn new(max_no_retries: u32, retry_delay_secs: u64) -> Self {
        Self { max_no_retries, retry_delay_secs }
    }
}

impl Default for RetryArgs {
    fn default() -> Self {
        Self { max_no_retries: 10, retry_delay_secs: 10 }
    }
}

#[derive(Args, Debug, Clone)]
pub struct HttpArgs {
    #[command(flatten)]
    pub retry_args: RetryArgs,
    /// Http basic authentication username.
    #[arg(short='U',long,env="MPDL_HTTP_USERNAME")]
    pub username: Option<String>,
    /// Http basic authentication password.
    #[arg(short='P',long,env="MPDL_HTTP_PASSWORD")]
    pub password: Option<SecretString>,
    ///Maximum redirects followed before a range request gives up.
    #[arg(long)]
    pub max_redirects: Option<usize>,
    /// Timeout in seconds of a single request, including streaming its body.
    #[arg(short='T',long,default_value_t=60)]
    pub timeout: u64,
    #[arg(short='p',long)]
    pub proxy_url: Option<String>,
    /// Extra headers sent with every request, e.g key1:value1,key2:value2.
    #[arg(long)]
    pub request_headers: Option<String>,
    /// Cookies sent with every request, e.g name1=value1; name2=value2.
    #[arg(long)]
    pub http_cookies: Option<String>,
}

impl Default for HttpArgs {
    fn default() -> Self {
        Self {
            retry_args: RetryArgs::default(),
            username: None,
            password: None,
            max_redirects: None,
            timeout: 60,
            proxy_url: None,
            request_headers: None,
            http_cookies: None,
        }
    }
}

impl TryFrom<&HttpArgs> for Client {
    type Error = AnyhowError;

    fn try_from(args: &HttpArgs) -> Result<Self, Self::Error> {
        let redirect = args.max_redirects.map_or_else(Policy::default, Policy::limited);
        let builder = Client::builder()
            .timeout(Duration::from_secs(args.timeout))
            .redirect(redirect)
            .default_headers(default_headers(args)?);
        let builder = match &args.proxy_url {
            Some(proxy_url) => builder.proxy(Proxy::all(proxy_url).with_context(|| format!("Invalid proxy url {proxy_url}"))?),
            None => builder.no_proxy(),
        };
        debug!(timeout = args.timeout, max_redirects = ?args.max_redirects, proxy = args.proxy_url.is_some(), "Building http client");
        Ok(builder.build()?)
    }
}

fn default_headers(args: &HttpArgs) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(raw) = &args.request_headers {
        for pair in raw.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
            let (name, value) = pair
                .split_once(':')
                .with_context(|| format!("Request header {pair} is not a key:value pair"))?;
            headers.insert(HeaderName::from_bytes(name.trim().as_bytes())?, HeaderValue::from_str(value.trim())?);
        }
    }
    if let Some(raw) = &args.http_cookies {
        let cookies = raw
            .split(';')
            .map(str::trim)
            .filter(|cookie| !cookie.is_empty())
            .map(|cookie| {
                Cookie::parse(cookie)
                    .map(|cookie| format!("{}={}", cookie.name(), cookie.value()))
                    .with_context(|| format!("Invalid cookie {cookie}"))
            })
            .collect::<Result<Vec<_>>>()?;
        headers.insert(COOKIE, HeaderValue::from_str(&cookies.join("; "))?);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_from_default_args() {
        assert!(Client::try_from(&HttpArgs::default()).is_ok());
    }

    #[test]
    fn test_client_rejects_bad_header() {
        let args = HttpArgs { request_headers: Some("bad header:value".into()), ..HttpArgs::default() };
        assert!(Client::try_from(&args).is_err());
        let args = HttpArgs { request_headers: Some("no-separator".into()), ..HttpArgs::default() };
        assert!(Client::try_from(&args).is_err());
    }

    #[test]
    fn test_default_headers() -> Result<()> {
        let args = HttpArgs {
            request_headers: Some("x-token: abc, accept:*/*".into()),
            http_cookies: Some("session=42; theme=dark".into()),
            ..HttpArgs::default()
        };
        let headers = default_headers(&args)?;
        assert_eq!(headers.get("x-token").map(HeaderValue::as_bytes), Some(&b"abc"[..]));
        assert_eq!(headers.get("accept").map(HeaderValue::as_bytes), Some(&b"*/*"[..]));
        assert_eq!(headers.get(COOKIE).map(HeaderValue::as_bytes), Some(&b"session=42; theme=dark"[..]));
        Ok(())
    }
}
