pub mod config;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::{Client, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use reqwest_tracing::TracingMiddleware;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc::channel;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use self::config::HttpArgs;
use crate::shared::{errors::TransferError, network::{BytesStream, DataTransport}};

pub struct HttpAdapter {
    client: ClientWithMiddleware,
    username: Option<String>,
    password: Option<SecretString>,
}

impl HttpAdapter {
    #[instrument(name="new_http_adapter",skip_all,fields(config=format!("{:?}", http_args)))]
    pub fn new(http_args: HttpArgs) -> Result<Self> {
        let retry_args = http_args.retry_args;
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(
                Duration::from_secs(1),
                Duration::from_secs((*retry_args.retry_delay_secs()).max(2)),
            )
            .build_with_max_retries(*retry_args.max_no_retries());
        let retry_middleware =
            RetryTransientMiddleware::new_with_policy(retry_policy); // Enable retry with exponential backoff.
        let try_client = Client::try_from(&http_args)
            .context("Can't create http client due to misconfiguration.")?;
        let client: ClientWithMiddleware = ClientBuilder::new(try_client)
            .with(TracingMiddleware::default()) // Enable built-in http client tracing and logging.
            .with(retry_middleware)
            .build();

        Ok(Self { client, username: http_args.username, password: http_args.password })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(
                username,
                self.password.as_ref().map(|password| password.expose_secret().to_owned()),
            ),
            None => request,
        }
    }
}

#[async_trait]
impl DataTransport for HttpAdapter {
    #[instrument(name="http_receive_range",skip(self, source),fields(source=%source))]
    async fn receive_range(&self, source: Url, range: [u64; 2]) -> Result<BytesStream, TransferError> {
        let [start, end] = range;
        let request = self.client.get(source.clone()).header(RANGE, format!("bytes={start}-{end}"));
        let resp = self.authorized(request).send().await?.error_for_status()?;
        if resp.status() != StatusCode::PARTIAL_CONTENT {
            error!(status = %resp.status(), "Server answered a range request without partial content");
            return Err(TransferError::RangeNotSupported { start, end });
        }

        let (tx, rx) = channel(256);
        tokio::spawn(async move {
            let mut resp = resp;
            loop {
                match resp.chunk().await {
                    Ok(Some(bytes)) => {
                        if tx.send(Ok(bytes)).await.is_err() {
                            debug!("Range receiver dropped, stop reading response body.");
                            break;
                        }
                    }
                    Ok(None) => {
                        break;
                    }
                    Err(err) => {
                        //Propagate error to receiver to handle it.
                        error!(error = %err, "Error reading response body of {source}");
                        let _ = tx.send(Err(TransferError::ReqwestClient(err))).await;
                        break;
                    }
                }
            }
        });
        Ok(ReceiverStream::new(rx).boxed())
    }

    #[instrument(name="http_total_bytes",skip(self, source),fields(source=%source))]
    async fn total_bytes(&self, source: Url) -> Result<Option<u64>, TransferError> {
        let request = self.client.head(source.clone());
        let resp = self.authorized(request).send().await?.error_for_status()?;
        let size_info = match resp.headers().get(CONTENT_LENGTH) {
            Some(header) => {
                let header_str = header.to_str().map_err(|err| {
                    TransferError::ParseError(format!("Can't convert response header CONTENT-LENGTH to string, caused by:{err}"))
                })?;
                info!(name = "download_size_ready", "Got download size.");
                Some(header_str.trim().parse::<u64>().map_err(|err| {
                    TransferError::ParseError(format!("Can't convert file size from http header to u64, caused by:{err}"))
                })?)
            }
            None => {
                warn!(
                    name = "no_download_size",
                    "Can't get download size for url {} ,in http header Content-Length", &source
                );
                None
            }
        };
        Ok(size_info)
    }
}
